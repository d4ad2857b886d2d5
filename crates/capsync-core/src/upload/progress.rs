//! Upload progress reporting.

/// Receives a percentage in `0.0..=100.0`.
pub type ProgressCallback = Box<dyn Fn(f64) + Send + Sync>;

/// Share of the bar covered by byte transfer; the rest is metadata confirmation.
const TRANSFER_SHARE: f64 = 95.0;

/// Wraps the caller's callback and keeps the reported value non-decreasing.
/// 100 is only reported by `finish`.
pub(crate) struct ProgressReporter {
    callback: Option<ProgressCallback>,
    last: f64,
}

impl ProgressReporter {
    pub(crate) fn new(callback: Option<ProgressCallback>) -> Self {
        Self {
            callback,
            last: 0.0,
        }
    }

    pub(crate) fn silent() -> Self {
        Self::new(None)
    }

    /// Report `confirmed` of `total` bytes transferred.
    pub(crate) fn bytes(&mut self, confirmed: u64, total: u64) {
        let fraction = if total == 0 {
            1.0
        } else {
            (confirmed as f64 / total as f64).clamp(0.0, 1.0)
        };
        self.emit(fraction * TRANSFER_SHARE);
    }

    pub(crate) fn finish(&mut self) {
        self.emit(100.0);
    }

    fn emit(&mut self, percent: f64) {
        if percent < self.last {
            return;
        }
        self.last = percent;
        if let Some(cb) = &self.callback {
            cb(percent);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn recording() -> (ProgressReporter, Arc<Mutex<Vec<f64>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let cb: ProgressCallback = Box::new(move |p| sink.lock().unwrap().push(p));
        (ProgressReporter::new(Some(cb)), seen)
    }

    #[test]
    fn never_goes_backwards_and_ends_at_100() {
        let (mut r, seen) = recording();
        r.bytes(0, 100);
        r.bytes(50, 100);
        r.bytes(20, 100);
        r.bytes(100, 100);
        r.finish();
        let seen = seen.lock().unwrap().clone();
        assert_eq!(seen, vec![0.0, 47.5, 95.0, 100.0]);
    }

    #[test]
    fn empty_payload_counts_as_transferred() {
        let (mut r, seen) = recording();
        r.bytes(0, 0);
        assert_eq!(seen.lock().unwrap().as_slice(), &[95.0]);
    }
}
