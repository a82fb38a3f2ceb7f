use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::config::BPS_SCALE;

#[derive(Debug, Clone)]
struct UptimeWindow {
    started_at: DateTime<Utc>,
    /// Distinct heartbeat intervals in which the worker checked in.
    beats: u64,
    last_interval: u64,
}

/// Heartbeat bookkeeping for jobs in execution.
///
/// Time is bucketed into `interval_secs` slots; a slot counts as "up" when at
/// least one heartbeat landed in it, so spamming heartbeats cannot inflate
/// the ratio.
pub struct UptimeTracker {
    interval_secs: u64,
    windows: DashMap<String, UptimeWindow>,
}

impl UptimeTracker {
    pub fn new(interval_secs: u64) -> Self {
        Self {
            interval_secs: interval_secs.max(1),
            windows: DashMap::new(),
        }
    }

    pub fn interval_secs(&self) -> u64 {
        self.interval_secs
    }

    fn slot(&self, started_at: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
        let elapsed = (now - started_at).num_seconds().max(0) as u64;
        elapsed / self.interval_secs
    }

    /// Opens the execution window; the opening heartbeat counts as the first beat.
    pub fn start(&self, job_id: &str, now: DateTime<Utc>) {
        self.windows.insert(
            job_id.to_string(),
            UptimeWindow {
                started_at: now,
                beats: 1,
                last_interval: 0,
            },
        );
    }

    pub fn beat(&self, job_id: &str, now: DateTime<Utc>) {
        if let Some(mut window) = self.windows.get_mut(job_id) {
            let slot = self.slot(window.started_at, now);
            if slot > window.last_interval {
                window.last_interval = slot;
                window.beats += 1;
            }
        }
    }

    pub fn finish(&self, job_id: &str) {
        self.windows.remove(job_id);
    }

    pub fn is_tracking(&self, job_id: &str) -> bool {
        self.windows.contains_key(job_id)
    }

    /// Observed over expected heartbeat slots in basis points, or `None`
    /// while fewer than `grace_intervals` slots have fully elapsed.
    pub fn ratio_bps(&self, job_id: &str, now: DateTime<Utc>, grace_intervals: u32) -> Option<u32> {
        let window = self.windows.get(job_id)?;
        let expected = self.slot(window.started_at, now);
        if expected == 0 || expected < u64::from(grace_intervals) {
            return None;
        }
        let observed = window.beats.min(expected);
        Some((observed * u64::from(BPS_SCALE) / expected) as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_ratio_waits_for_grace_period() {
        let tracker = UptimeTracker::new(10);
        let t0 = Utc::now();
        tracker.start("job-1", t0);
        assert_eq!(tracker.ratio_bps("job-1", t0 + Duration::seconds(25), 3), None);
        assert!(tracker.ratio_bps("job-1", t0 + Duration::seconds(30), 3).is_some());
    }

    #[test]
    fn test_steady_heartbeats_give_full_uptime() {
        let tracker = UptimeTracker::new(10);
        let t0 = Utc::now();
        tracker.start("job-1", t0);
        for i in 1..4 {
            tracker.beat("job-1", t0 + Duration::seconds(10 * i + 1));
        }
        assert_eq!(
            tracker.ratio_bps("job-1", t0 + Duration::seconds(40), 3),
            Some(10_000)
        );
    }

    #[test]
    fn test_silence_lowers_ratio_and_spam_does_not_help() {
        let tracker = UptimeTracker::new(10);
        let t0 = Utc::now();
        tracker.start("job-1", t0);
        for _ in 0..20 {
            tracker.beat("job-1", t0 + Duration::seconds(5));
        }
        assert_eq!(
            tracker.ratio_bps("job-1", t0 + Duration::seconds(40), 3),
            Some(2_500)
        );
    }

    #[test]
    fn test_finish_stops_tracking() {
        let tracker = UptimeTracker::new(10);
        tracker.start("job-1", Utc::now());
        assert!(tracker.is_tracking("job-1"));
        tracker.finish("job-1");
        assert!(!tracker.is_tracking("job-1"));
        assert_eq!(tracker.ratio_bps("job-1", Utc::now(), 0), None);
    }
}
