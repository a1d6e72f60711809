use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// A visitor counts as active for this long after their last visit.
pub const ACTIVE_WINDOW_SECS: i64 = 5 * 60;

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VisitorSnapshot {
    pub active_visitors: usize,
    pub total_visits: u64,
    pub since: String,
}

#[derive(Debug)]
struct VisitorCounts {
    last_seen: HashMap<String, DateTime<Utc>>,
    total_visits: u64,
    since: DateTime<Utc>,
}

/// In-process visitor counter. Counts live in memory only and start from zero
/// on every restart.
#[derive(Clone, Debug)]
pub struct VisitorStats {
    inner: Arc<Mutex<VisitorCounts>>,
}

impl Default for VisitorStats {
    fn default() -> Self {
        VisitorStats::new()
    }
}

impl VisitorStats {
    pub fn new() -> Self {
        VisitorStats {
            inner: Arc::new(Mutex::new(VisitorCounts {
                last_seen: HashMap::new(),
                total_visits: 0,
                since: Utc::now(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VisitorCounts> {
        self.inner.lock().unwrap_or_else(|poisoned| {
            log::error!("Visitor stats mutex was poisoned! Continuing with the recovered counts.");
            poisoned.into_inner()
        })
    }

    pub fn record(&self, visitor: &str) -> VisitorSnapshot {
        self.record_at(visitor, Utc::now())
    }

    pub fn record_at(&self, visitor: &str, now: DateTime<Utc>) -> VisitorSnapshot {
        let mut counts = self.lock();
        counts.total_visits += 1;
        counts.last_seen.insert(visitor.to_string(), now);
        Self::snapshot_of(&counts, now)
    }

    pub fn snapshot(&self) -> VisitorSnapshot {
        self.snapshot_at(Utc::now())
    }

    pub fn snapshot_at(&self, now: DateTime<Utc>) -> VisitorSnapshot {
        Self::snapshot_of(&self.lock(), now)
    }

    fn snapshot_of(counts: &VisitorCounts, now: DateTime<Utc>) -> VisitorSnapshot {
        let cutoff = now - Duration::seconds(ACTIVE_WINDOW_SECS);
        VisitorSnapshot {
            active_visitors: counts.last_seen.values().filter(|seen| **seen >= cutoff).count(),
            total_visits: counts.total_visits,
            since: counts.since.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        }
    }

    /// Drops visitors outside the active window. Returns how many went.
    pub fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        let cutoff = now - Duration::seconds(ACTIVE_WINDOW_SECS);
        let mut counts = self.lock();
        let before = counts.last_seen.len();
        counts.last_seen.retain(|_, seen| *seen >= cutoff);
        before - counts.last_seen.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn active_window_and_sweep() {
        let stats = VisitorStats::new();
        let start = Utc::now();
        stats.record_at("1.1.1.1", start);
        stats.record_at("1.1.1.1", start);
        let snapshot = stats.record_at("2.2.2.2", start + Duration::seconds(200));
        assert_eq!(snapshot.active_visitors, 2);
        assert_eq!(snapshot.total_visits, 3);

        let later = start + Duration::seconds(ACTIVE_WINDOW_SECS + 10);
        assert_eq!(stats.snapshot_at(later).active_visitors, 1);
        assert_eq!(stats.sweep_at(later), 1);
        assert_eq!(stats.snapshot_at(later).total_visits, 3);
    }
}
