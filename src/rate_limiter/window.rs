//! Sliding-window request log.
//!
//! ```text
//!     window_ms = 1000, now = 1500
//!
//!     stored:  [ 200,  450,  700, 1100, 1400 ]
//!                 ▲      ▲
//!                 └──────┴── older than now - window_ms (500), dropped
//!
//!     kept:    [ 700, 1100, 1400 ]  ──► count = 3
//! ```
//!
//! The log is bounded by `max_requests`: a request is appended only while the
//! pruned count is below the limit, and the whole sequence is rewritten on
//! every admitted request.

/// Timestamps (ms since epoch) of admitted requests inside the window.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WindowRecord {
    timestamps: Vec<u64>,
}

impl WindowRecord {
    /// Builds a record from stored timestamps, oldest first.
    pub fn from_timestamps(timestamps: Vec<u64>) -> Self {
        Self { timestamps }
    }

    /// Drops timestamps older than `now - window_ms`.
    ///
    /// A timestamp exactly at the window's trailing edge is kept.
    pub fn prune(&mut self, now: u64, window_ms: u64) {
        let window_start = now.saturating_sub(window_ms);
        self.timestamps.retain(|&t| t >= window_start);
    }

    /// Appends `now` if fewer than `limit` requests are in the record.
    ///
    /// Returns the new count on success, `None` if the limit is reached.
    pub fn try_record(&mut self, now: u64, limit: u32) -> Option<u32> {
        if self.len() >= limit {
            return None;
        }
        self.timestamps.push(now);
        Some(self.len())
    }

    /// Number of recorded requests.
    #[inline]
    pub fn len(&self) -> u32 {
        self.timestamps.len() as u32
    }

    /// Whether the record is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Recorded timestamps, oldest first.
    pub fn timestamps(&self) -> &[u64] {
        &self.timestamps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prune_drops_old_entries() {
        let mut record = WindowRecord::from_timestamps(vec![200, 450, 700, 1100, 1400]);
        record.prune(1500, 1000);
        assert_eq!(record.timestamps(), &[700, 1100, 1400]);
    }

    #[test]
    fn test_prune_keeps_trailing_edge() {
        let mut record = WindowRecord::from_timestamps(vec![500, 501]);
        record.prune(1500, 1000);
        assert_eq!(record.len(), 2);
    }

    #[test]
    fn test_prune_near_epoch_does_not_underflow() {
        let mut record = WindowRecord::from_timestamps(vec![0, 10]);
        record.prune(20, 1000);
        assert_eq!(record.len(), 2);
    }

    #[test]
    fn test_try_record_stops_at_limit() {
        let mut record = WindowRecord::default();
        assert_eq!(record.try_record(0, 3), Some(1));
        assert_eq!(record.try_record(100, 3), Some(2));
        assert_eq!(record.try_record(200, 3), Some(3));
        assert_eq!(record.try_record(300, 3), None);
        assert_eq!(record.len(), 3);
    }

    #[test]
    fn test_pruned_record_accepts_again() {
        let mut record = WindowRecord::from_timestamps(vec![0, 100, 200]);
        record.prune(1150, 1000);
        assert_eq!(record.timestamps(), &[200]);
        assert_eq!(record.try_record(1150, 3), Some(2));
    }
}
