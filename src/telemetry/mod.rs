pub mod config;
pub mod ctx;
pub mod ops;
pub mod writer;

use ctx::LogCtx;

pub fn fetch() -> LogCtx<ops::fetch::Fetch> { LogCtx { json: config::logs_are_json(), _marker: std::marker::PhantomData } }
