//! Per-identifier consumption history.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// One consumption event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogEntry {
    timestamp: Instant,
    points: f64,
}

impl LogEntry {
    /// Create an entry stamped at `timestamp`.
    pub fn new(timestamp: Instant, points: f64) -> Self {
        Self { timestamp, points }
    }

    /// When the points were consumed.
    pub fn timestamp(&self) -> Instant {
        self.timestamp
    }

    /// How many points were consumed.
    pub fn points(&self) -> f64 {
        self.points
    }
}

/// The event log for a single identifier.
///
/// Entries are kept oldest first. Windowed sums walk from the newest end and
/// trims pop from the oldest end, so neither touches entries it does not need.
#[derive(Debug, Clone, Default)]
pub struct Record {
    entries: VecDeque<LogEntry>,
}

impl Record {
    /// Create an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sum the points of every entry strictly newer than `now - window`.
    ///
    /// An entry stamped exactly at the cutoff is outside the window. When the
    /// cutoff is not representable every entry counts.
    pub fn windowed_sum(&self, window: Duration, now: Instant) -> f64 {
        let cutoff = now.checked_sub(window);
        self.entries
            .iter()
            .rev()
            .take_while(|entry| cutoff.map_or(true, |cutoff| entry.timestamp > cutoff))
            .map(LogEntry::points)
            .sum()
    }

    /// Record `points` consumed at `now`.
    pub fn append(&mut self, points: f64, now: Instant) {
        // Keep the log sorted even if a racing caller read the clock earlier.
        let timestamp = match self.entries.back() {
            Some(last) if last.timestamp > now => last.timestamp,
            _ => now,
        };
        self.entries.push_back(LogEntry::new(timestamp, points));
    }

    /// Drop every entry stamped at or before `cutoff`.
    ///
    /// Returns `true` when nothing is left.
    pub fn trim(&mut self, cutoff: Instant) -> bool {
        while self
            .entries
            .front()
            .is_some_and(|entry| entry.timestamp <= cutoff)
        {
            self.entries.pop_front();
        }
        self.entries.is_empty()
    }

    /// Sum of all retained entries regardless of age.
    ///
    /// This does not trim first, so entries past every window are counted
    /// until a [`trim`](Self::trim) removes them. Use
    /// [`windowed_sum`](Self::windowed_sum) for an age-bounded total.
    pub fn total_points(&self) -> f64 {
        self.entries.iter().map(LogEntry::points).sum()
    }

    /// Number of retained entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the record holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate entries oldest first.
    pub fn entries(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_empty_record() {
        let record = Record::new();
        assert!(record.is_empty());
        assert_eq!(record.windowed_sum(ms(1000), Instant::now()), 0.0);
    }

    #[test]
    fn test_windowed_sum_boundary() {
        let t0 = Instant::now();
        let mut record = Record::new();
        record.append(2.0, t0);
        record.append(3.0, t0 + ms(1));

        // First entry is exactly 1000ms old: excluded. Second is 999ms old: included.
        assert_eq!(record.windowed_sum(ms(1000), t0 + ms(1000)), 3.0);
        assert_eq!(record.windowed_sum(ms(1000), t0 + ms(999)), 5.0);
        assert_eq!(record.windowed_sum(ms(1000), t0 + ms(1001)), 0.0);
    }

    #[test]
    fn test_windowed_sum_does_not_mutate() {
        let t0 = Instant::now();
        let mut record = Record::new();
        record.append(1.0, t0);
        record.windowed_sum(ms(10), t0 + ms(100));
        assert_eq!(record.len(), 1);
    }

    #[test]
    fn test_zero_window_is_empty() {
        let t0 = Instant::now();
        let mut record = Record::new();
        record.append(4.0, t0);
        assert_eq!(record.windowed_sum(Duration::ZERO, t0), 0.0);
    }

    #[test]
    fn test_fractional_points() {
        let t0 = Instant::now();
        let mut record = Record::new();
        record.append(0.25, t0);
        record.append(0.5, t0);
        assert_eq!(record.windowed_sum(ms(10), t0), 0.75);
        assert_eq!(record.total_points(), 0.75);
    }

    #[test]
    fn test_total_points_counts_untrimmed_entries() {
        let t0 = Instant::now();
        let mut record = Record::new();
        record.append(2.0, t0);
        record.append(3.0, t0 + ms(500));

        let now = t0 + ms(2000);
        assert_eq!(record.windowed_sum(ms(1000), now), 0.0);
        assert_eq!(record.total_points(), 5.0);

        record.trim(t0);
        assert_eq!(record.total_points(), 3.0);
    }

    #[test]
    fn test_append_never_goes_backwards() {
        let t0 = Instant::now();
        let mut record = Record::new();
        record.append(1.0, t0 + ms(50));
        record.append(1.0, t0);

        let stamps: Vec<_> = record.entries().map(LogEntry::timestamp).collect();
        assert_eq!(stamps, vec![t0 + ms(50), t0 + ms(50)]);
    }

    #[test]
    fn test_trim_removes_at_and_before_cutoff() {
        let t0 = Instant::now();
        let mut record = Record::new();
        record.append(1.0, t0);
        record.append(2.0, t0 + ms(10));
        record.append(3.0, t0 + ms(20));

        assert!(!record.trim(t0 + ms(10)));
        let points: Vec<_> = record.entries().map(LogEntry::points).collect();
        assert_eq!(points, vec![3.0]);

        assert!(record.trim(t0 + ms(20)));
        assert!(record.is_empty());
    }

    #[test]
    fn test_trim_is_idempotent() {
        let t0 = Instant::now();
        let mut record = Record::new();
        record.append(1.0, t0);
        record.append(1.0, t0 + ms(10));

        record.trim(t0 + ms(5));
        let after_first: Vec<_> = record.entries().copied().collect();
        record.trim(t0 + ms(5));
        record.trim(t0);
        let after_repeat: Vec<_> = record.entries().copied().collect();
        assert_eq!(after_first, after_repeat);
    }
}
