use crate::{is_redirect_status, TargetRecord};
use serde::Serialize;

/// Run-level counters derived from the per-target records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Stats {
    pub total: usize,
    pub success: usize,
    pub errors: usize,
    pub timeouts: usize,
    pub redirects: usize,
}

impl Stats {
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.success as f64 / self.total as f64 * 100.0
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Aggregate {
    pub records: Vec<TargetRecord>,
    pub stats: Stats,
}

/// Whether an error message describes a timeout. Engines word this
/// differently, so the check is case-insensitive.
pub fn is_timeout_message(message: &str) -> bool {
    message.to_ascii_lowercase().contains("timeout")
}

/// Count outcomes over `records`. Pure: the same records always yield the
/// same stats, and the records are passed through untouched.
pub fn aggregate(records: Vec<TargetRecord>) -> Aggregate {
    let mut stats = Stats {
        total: records.len(),
        ..Default::default()
    };

    for record in &records {
        match record.capture.error.as_deref() {
            None => stats.success += 1,
            Some(message) => {
                stats.errors += 1;
                if is_timeout_message(message) {
                    stats.timeouts += 1;
                }
            }
        }

        if is_redirect_status(record.capture.first_status) {
            stats.redirects += 1;
        }
    }

    Aggregate { records, stats }
}
