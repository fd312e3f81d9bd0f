use anyhow::Result;
use serde::Serialize;
use std::marker::PhantomData;
use tracing::{info, debug, warn, Span};

use crate::output::types::{Envelope, Meta};

pub trait PhaseSpan {
    fn name(&self) -> &'static str;
    fn span(&self) -> Span;
}

pub trait OpMarker {
    const NAME: &'static str;
    type Phase: PhaseSpan;
    fn root_span() -> Span;
}

pub struct LogCtx<O: OpMarker> {
    pub(crate) json: bool,
    pub(crate) _marker: PhantomData<O>,
}

impl<O: OpMarker> LogCtx<O> {
    fn op_name(&self) -> &'static str { O::NAME }

    pub fn root_span(&self) -> Span { O::root_span() }

    pub fn root_span_kv<'a, T>(&self, fields: T) -> Span
    where
        T: IntoIterator<Item = (&'a str, String)>,
    {
        let span = self.root_span();
        let details = kv_to_string(fields);
        if details.is_empty() {
            info!(op = %self.op_name(), "start");
        } else {
            info!(op = %self.op_name(), details = %details, "start");
        }
        span
    }

    pub fn span(&self, ph: &O::Phase) -> Span { ph.span() }

    pub fn span_kv<'a, T>(&self, ph: &O::Phase, fields: T) -> Span
    where
        T: IntoIterator<Item = (&'a str, String)>,
    {
        let span = self.span(ph);
        let details = kv_to_string(fields);
        if details.is_empty() {
            debug!(op = %self.op_name(), phase = ph.name(), "span_start");
        } else {
            debug!(op = %self.op_name(), phase = ph.name(), details = %details, "span_start");
        }
        span
    }

    pub fn info(&self, msg: impl AsRef<str>) { if self.json { info!(op = %self.op_name(), "{}", msg.as_ref()); } else { info!("{}", msg.as_ref()); } }

    pub fn debug_kv<'a, D>(&self, msg: &str, kv: D)
    where
        D: IntoIterator<Item = (&'a str, String)>,
    {
        if self.json { let details = kv_to_string(kv); debug!(op = %self.op_name(), details = %details, "{}", msg); }
        else { debug!("{}", msg); }
    }

    /// Wrap a result payload in the envelope tagged with this op.
    pub fn envelope<T: Serialize>(&self, result: &T, meta: Option<Meta>) -> Result<Envelope> {
        Ok(Envelope::result(self.op_name(), result, meta)?)
    }
}

impl LogCtx<crate::telemetry::ops::fetch::Fetch> {
    pub fn retry(&self, id: u64, attempt: u32, err: &dyn std::fmt::Display) {
        if self.json { debug!(op = %self.op_name(), id, attempt, error = %err, "retry"); }
        else { debug!("🔁 Retry TODO {} attempt={} error={}", id, attempt, err); }
    }

    pub fn permanent_failure(&self, id: u64, retries: u32, err: &dyn std::fmt::Display) {
        if self.json { warn!(op = %self.op_name(), id, retries, error = %err, "permanent_failure"); }
        else { warn!("❌ TODO {} failed after {} retries: {}", id, retries, err); }
    }

    pub fn totals(&self, attempted: usize, succeeded: usize, failed: usize, elapsed_secs: f64) {
        if self.json { info!(op = %self.op_name(), attempted, succeeded, failed, elapsed_secs, "fetch_totals"); }
        else { info!("📊 Fetch totals — attempted={} succeeded={} failed={} elapsed={:.2}s", attempted, succeeded, failed, elapsed_secs); }
    }
}

fn kv_to_string<'a, T>(kv: T) -> String
where
    T: IntoIterator<Item = (&'a str, String)>,
{
    let mut parts: Vec<String> = Vec::new();
    for (k, v) in kv { parts.push(format!("{}={}", k, v)); }
    parts.join(" ")
}
