use chrono::{DateTime, TimeDelta, Utc};
use std::collections::VecDeque;

/// Sliding counter of order submissions over a trailing window.
///
/// An entry ages out once it is a full window old, so at exactly the window
/// boundary the slot it occupied is free again.
#[derive(Debug, Clone)]
pub struct OrderRateWindow {
    window: TimeDelta,
    limit: usize,
    submissions: VecDeque<DateTime<Utc>>,
}

impl OrderRateWindow {
    /// Standard 60-second window with the given submission limit.
    pub fn per_minute(limit: usize) -> Self {
        Self::new(TimeDelta::seconds(60), limit)
    }

    pub fn new(window: TimeDelta, limit: usize) -> Self {
        Self {
            window,
            limit,
            submissions: VecDeque::new(),
        }
    }

    /// True if a submission at `now` stays within the limit.
    pub fn would_admit(&mut self, now: DateTime<Utc>) -> bool {
        self.evict(now);
        self.submissions.len() < self.limit
    }

    /// Record an admitted submission.
    pub fn record(&mut self, now: DateTime<Utc>) {
        self.evict(now);
        self.submissions.push_back(now);
    }

    /// Submissions currently inside the window.
    pub fn count(&mut self, now: DateTime<Utc>) -> usize {
        self.evict(now);
        self.submissions.len()
    }

    fn evict(&mut self, now: DateTime<Utc>) {
        while let Some(earliest) = self.submissions.front() {
            if now - *earliest >= self.window {
                self.submissions.pop_front();
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_limit_enforced_within_window() {
        let t0 = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let mut window = OrderRateWindow::per_minute(3);

        for i in 0..3 {
            let now = t0 + TimeDelta::seconds(i);
            assert!(window.would_admit(now));
            window.record(now);
        }
        assert!(!window.would_admit(t0 + TimeDelta::seconds(10)));
    }

    #[test]
    fn test_exact_boundary_admits_after_age_out() {
        // The 61st order must be admitted at exactly the 60s boundary once
        // the 1st submission has aged out.
        let t0 = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let mut window = OrderRateWindow::per_minute(60);

        for i in 0..60 {
            window.record(t0 + TimeDelta::milliseconds(i * 100));
        }
        assert!(!window.would_admit(t0 + TimeDelta::seconds(59)));
        assert!(window.would_admit(t0 + TimeDelta::seconds(60)));
        assert_eq!(window.count(t0 + TimeDelta::seconds(60)), 59);
    }
}
