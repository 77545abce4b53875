//! Timing helpers shared by every phase.

use std::time::Instant;

/// Records the elapsed time into a histogram when dropped.
pub struct TimingGuard {
    start: Instant,
    histogram_name: &'static str,
    labels: Vec<(&'static str, String)>,
}

impl TimingGuard {
    pub fn new(histogram_name: &'static str) -> Self {
        Self {
            start: Instant::now(),
            histogram_name,
            labels: Vec::new(),
        }
    }

    pub fn with_label(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.labels.push((key, value.into()));
        self
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }

    /// Stop timing now instead of at end of scope.
    pub fn finish(self) {}
}

impl Drop for TimingGuard {
    fn drop(&mut self) {
        let duration = self.elapsed_secs();
        let labels: Vec<::metrics::Label> = self
            .labels
            .iter()
            .map(|(k, v)| ::metrics::Label::new(*k, v.clone()))
            .collect();
        ::metrics::histogram!(self.histogram_name, labels).record(duration);
    }
}

pub fn time_operation(histogram_name: &'static str) -> TimingGuard {
    TimingGuard::new(histogram_name)
}
