use std::io::{self, Write};
use std::sync::Mutex;

use indicatif::ProgressBar;

static ACTIVE_BAR: Mutex<Option<ProgressBar>> = Mutex::new(None);

/// Log lines written while `bar` is attached are drawn around it instead of through it.
pub fn attach_progress(bar: &ProgressBar) {
    *ACTIVE_BAR.lock().unwrap_or_else(|e| e.into_inner()) = Some(bar.clone());
}

pub fn detach_progress() {
    *ACTIVE_BAR.lock().unwrap_or_else(|e| e.into_inner()) = None;
}

/// `MakeWriter` for the fmt layer.
pub fn progress_aware_stderr() -> ProgressAwareStderr { ProgressAwareStderr }

pub struct ProgressAwareStderr;

impl Write for ProgressAwareStderr {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        // clone out so the slot lock is not held while indicatif redraws
        let bar = ACTIVE_BAR.lock().unwrap_or_else(|e| e.into_inner()).clone();
        match bar {
            Some(pb) => pb.suspend(|| io::stderr().lock().write(buf)),
            None => io::stderr().lock().write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()
    }
}
