//! # Sweeper
//!
//! Background housekeeping for the TTL store.
//!
//! ```text
//!     every cleanup_interval_ms:
//!
//!     entries > max_cache_entries ?
//!        │ yes                          │ no
//!        ▼                              ▼
//!     forced eviction               routine sweep
//!     ├─ target = entries / 2       ├─ lapsed TTL      → delete
//!     ├─ pass 1: all lapsed TTLs    ├─ expired ban     → delete
//!     ├─ pass 2: expired bans       └─ window          → prune, delete
//!     └─ pass 3: windows, outright                       if empty, else
//!                                                        re-store
//! ```
//!
//! The key list is snapshotted without any lock. Each per-entry mutation then
//! runs under the owning identity's stripe, so a sweep never interleaves with
//! a request's read-decide-write sequence for that identity.
//!
//! Eviction walks the store's native key order. It removes lapsed entries,
//! expired bans and whole windows; it makes no attempt to pick the least
//! recently used entries.

use super::{
    clock::Clock,
    limiter::{Engine, Entry, EntryKind},
};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

/// What one sweep cycle did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Whether the store was over capacity and forced eviction ran.
    pub forced: bool,
    /// Whether the cycle was skipped because another sweep was running.
    pub skipped: bool,
    /// Entries deleted.
    pub removed: usize,
    /// Window entries pruned and stored again.
    pub refreshed: usize,
    /// Store size when the cycle started.
    pub entries_before: usize,
    /// Store size when the cycle finished.
    pub entries_after: usize,
}

impl<C: Clock> Engine<C> {
    /// Runs one sweep cycle on the calling thread.
    pub(crate) fn sweep(&self) -> SweepReport {
        if self
            .sweep_in_progress
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            return SweepReport {
                skipped: true,
                ..SweepReport::default()
            };
        }
        let _guard = SweepGuard {
            flag: &self.sweep_in_progress,
        };

        let entries_before = self.store.len();
        let mut report = if entries_before > self.config.max_cache_entries {
            self.force_evict(entries_before)
        } else {
            self.routine_sweep()
        };
        report.entries_before = entries_before;
        report.entries_after = self.store.len();
        report
    }

    fn routine_sweep(&self) -> SweepReport {
        let now = self.store.now_ms();
        let window = Duration::from_millis(self.config.window_ms);
        let mut report = SweepReport::default();

        for key in self.store.keys() {
            let Some((kind, identity)) = EntryKind::parse(&key) else {
                if self.store.remove_expired(&key) {
                    report.removed += 1;
                }
                continue;
            };
            let _guard = self.locks.lock(identity);

            if self.store.remove_expired(&key) {
                report.removed += 1;
                continue;
            }

            match kind {
                EntryKind::Ban => {
                    if let Some(ban) = self.ban(&key) {
                        if !ban.is_active(now) && self.store.delete(&key) {
                            report.removed += 1;
                        }
                    }
                }
                EntryKind::Window => {
                    if let Some(mut record) = self.window(&key) {
                        record.prune(now, self.config.window_ms);
                        if record.is_empty() {
                            if self.store.delete(&key) {
                                report.removed += 1;
                            }
                        } else {
                            self.store.set(key.clone(), Entry::Window(record), window);
                            report.refreshed += 1;
                        }
                    }
                }
                EntryKind::Violation => {}
            }
        }

        self.counters.on_swept(report.removed as u64);
        if report.removed > 0 {
            debug!(
                "Sweep removed {} entries, refreshed {} windows",
                report.removed, report.refreshed
            );
        }
        report
    }

    fn force_evict(&self, entries: usize) -> SweepReport {
        let target = entries / 2;
        warn!(
            "Rate limit store over capacity ({} > {}), evicting up to {} entries",
            entries, self.config.max_cache_entries, target
        );

        let now = self.store.now_ms();
        let keys = self.store.keys();
        let mut removed = 0;

        // Lapsed entries of any kind are dead weight; reclaim all of them
        // even past the target.
        for key in &keys {
            let _guard = EntryKind::parse(key).map(|(_, identity)| self.locks.lock(identity));
            if self.store.remove_expired(key) {
                removed += 1;
            }
        }

        for key in &keys {
            if removed >= target {
                break;
            }
            let Some((EntryKind::Ban, identity)) = EntryKind::parse(key) else {
                continue;
            };
            let _guard = self.locks.lock(identity);
            if let Some(ban) = self.ban(key) {
                if !ban.is_active(now) && self.store.delete(key) {
                    removed += 1;
                }
            }
        }

        for key in &keys {
            if removed >= target {
                break;
            }
            let Some((EntryKind::Window, identity)) = EntryKind::parse(key) else {
                continue;
            };
            let _guard = self.locks.lock(identity);
            if self.store.delete(key) {
                removed += 1;
            }
        }

        self.counters.on_evicted(removed as u64);
        info!("Forced eviction removed {} entries (target was {})", removed, target);
        if removed < target {
            warn!(
                "Forced eviction incomplete: removed {}/{} entries",
                removed, target
            );
        }

        SweepReport {
            forced: true,
            removed,
            ..SweepReport::default()
        }
    }
}

/// RAII guard for the sweep flag.
///
/// Resets the flag even if the sweep panics or returns early.
struct SweepGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for SweepGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Handle to the background sweeper thread.
pub(crate) struct SweeperHandle {
    stop_tx: mpsc::Sender<()>,
    handle: thread::JoinHandle<()>,
}

impl SweeperHandle {
    /// Starts a thread that sweeps `engine` every `cleanup_interval_ms`
    /// until stopped.
    pub(crate) fn spawn<C: Clock>(engine: Arc<Engine<C>>) -> io::Result<Self> {
        let (stop_tx, stop_rx) = mpsc::channel();
        let interval = Duration::from_millis(engine.config.cleanup_interval_ms);

        let handle = thread::Builder::new()
            .name("rampart-sweeper".to_string())
            .spawn(move || {
                info!("Started sweeper thread (interval: {}ms)", interval.as_millis());

                loop {
                    match stop_rx.recv_timeout(interval) {
                        Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => {
                            info!("Sweeper thread stopping");
                            break;
                        }
                        Err(mpsc::RecvTimeoutError::Timeout) => {
                            let report = engine.sweep();
                            if report.entries_after > engine.config.max_cache_entries {
                                warn!(
                                    "High store usage: {} entries ({}% of capacity)",
                                    report.entries_after,
                                    (report.entries_after * 100) / engine.config.max_cache_entries
                                );
                            }
                        }
                    }
                }
            })?;

        Ok(Self { stop_tx, handle })
    }

    /// Signals the thread and joins it.
    pub(crate) fn stop(self) {
        // A send error means the thread already exited; join still reaps it.
        let _ = self.stop_tx.send(());
        if self.handle.join().is_err() {
            warn!("Sweeper thread panicked before shutdown");
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::rate_limiter::clock::{Clock, ManualClock};
    use crate::rate_limiter::config::RateLimitConfig;
    use crate::rate_limiter::limiter::{EntryKind, ProgressiveRateLimiter};
    use std::thread;
    use std::time::Duration;

    const START: u64 = 1_700_000_000_000;

    fn limiter(config: RateLimitConfig) -> (ProgressiveRateLimiter<ManualClock>, ManualClock) {
        let clock = ManualClock::new(START);
        let limiter = ProgressiveRateLimiter::without_sweeper(config, clock.clone()).unwrap();
        (limiter, clock)
    }

    fn ban(limiter: &ProgressiveRateLimiter<ManualClock>, identity: &str) {
        while limiter.check_rate_limit(identity).allowed {}
    }

    #[test]
    fn test_sweep_prunes_and_refreshes_windows() {
        let (limiter, clock) = limiter(RateLimitConfig::new(1_000, 10));
        limiter.check_rate_limit("old");
        clock.advance_ms(600);
        limiter.check_rate_limit("fresh");
        limiter.check_rate_limit("old");

        // "old" keeps only its second request; "fresh" keeps its only one
        clock.advance_ms(500);
        let report = limiter.sweep();
        assert!(!report.forced);
        assert_eq!(report.removed, 0);
        assert_eq!(report.refreshed, 2);

        // Nothing left in either window
        clock.advance_ms(600);
        let report = limiter.sweep();
        assert_eq!(report.removed, 2);
        assert_eq!(report.entries_after, 0);
    }

    #[test]
    fn test_refreshed_window_keeps_remaining_count() {
        let (limiter, clock) = limiter(RateLimitConfig::new(1_000, 3));
        limiter.check_rate_limit("X");
        clock.advance_ms(900);
        limiter.check_rate_limit("X");

        clock.advance_ms(200);
        limiter.sweep();
        let decision = limiter.check_rate_limit("X");
        assert_eq!(decision.remaining, 1);
    }

    #[test]
    fn test_sweep_removes_expired_bans_keeps_memory() {
        let (limiter, clock) = limiter(RateLimitConfig::new(1_000, 2));
        ban(&limiter, "X");
        let until = limiter.is_banned("X").ban_info.unwrap().ban_until;

        let report = limiter.sweep();
        assert_eq!(report.removed, 0);
        assert_eq!(report.entries_after, 2);

        clock.set_ms(until);
        let report = limiter.sweep();
        assert_eq!(report.removed, 1);
        assert_eq!(report.entries_after, 1);

        // The violation record survives and escalates the next ban
        ban(&limiter, "X");
        assert_eq!(limiter.is_banned("X").ban_info.unwrap().level, 2);
    }

    #[test]
    fn test_sweep_reclaims_lapsed_violation_memory() {
        let config = RateLimitConfig::new(1_000, 1).with_escalation_window_ms(120_000);
        let (limiter, clock) = limiter(config);
        ban(&limiter, "X");

        clock.advance_ms(120_001);
        let report = limiter.sweep();
        assert_eq!(report.removed, 2);
        assert_eq!(limiter.stats().entries, 0);
        assert_eq!(limiter.stats().swept, 2);
    }

    #[test]
    fn test_forced_eviction_halves_store() {
        let (limiter, _) = limiter(RateLimitConfig::new(60_000, 5).with_max_cache_entries(100));
        for i in 0..150 {
            limiter.check_rate_limit(&format!("10.0.{}.{}", i / 256, i % 256));
        }
        assert_eq!(limiter.stats().entries, 150);

        let report = limiter.sweep();
        assert!(report.forced);
        assert_eq!(report.removed, 75);
        assert_eq!(report.entries_after, 75);
        assert!(report.entries_after <= 100);
        assert_eq!(limiter.stats().evicted, 75);
    }

    #[test]
    fn test_forced_eviction_prefers_expired_bans() {
        let config = RateLimitConfig::new(60_000, 1).with_max_cache_entries(5);
        let (limiter, clock) = limiter(config);

        // Three bans, each with a violation record
        for id in ["a", "b", "c"] {
            ban(&limiter, id);
        }
        clock.advance_ms(60_000);

        // Two fresh windows push the store to 8 entries
        limiter.check_rate_limit("d");
        limiter.check_rate_limit("e");
        assert_eq!(limiter.stats().entries, 8);

        let report = limiter.sweep();
        assert!(report.forced);
        assert_eq!(report.removed, 4);

        // Expired bans went first, then one window; memory is never evicted
        for id in ["a", "b", "c"] {
            assert!(limiter.entry(EntryKind::Ban, id).is_none());
            assert!(limiter.entry(EntryKind::Violation, id).is_some());
        }
        let windows = ["d", "e"]
            .iter()
            .filter(|id| limiter.entry(EntryKind::Window, id).is_some())
            .count();
        assert_eq!(windows, 1);
    }

    #[test]
    fn test_forced_eviction_spares_active_bans() {
        let config = RateLimitConfig::new(60_000, 1).with_max_cache_entries(3);
        let (limiter, _) = limiter(config);
        for id in ["a", "b"] {
            ban(&limiter, id);
        }

        let report = limiter.sweep();
        assert!(report.forced);
        assert_eq!(report.removed, 0);
        assert!(limiter.is_banned("a").banned);
        assert!(limiter.is_banned("b").banned);
    }

    #[test]
    fn test_forced_eviction_reclaims_lapsed_memory() {
        let config = RateLimitConfig::new(60_000, 1)
            .with_ban_levels(vec![0, 10])
            .with_escalation_window_ms(100)
            .with_max_cache_entries(5);
        let (limiter, clock) = limiter(config);
        for i in 0..10 {
            ban(&limiter, &format!("10.0.0.{i}"));
        }
        assert_eq!(limiter.stats().entries, 20);

        // Every ban and violation record has lapsed
        clock.advance_ms(10_000);
        let report = limiter.sweep();
        assert!(report.forced);
        assert_eq!(report.removed, 20);
        assert_eq!(report.entries_after, 0);

        // A store of pure dead memory never stays over the cap
        for i in 0..10 {
            ban(&limiter, &format!("10.0.1.{i}"));
        }
        clock.advance_ms(10_000);
        for _ in 0..3 {
            let report = limiter.sweep();
            assert!(report.entries_after <= 5, "stuck at {} entries", report.entries_after);
        }
    }

    #[test]
    fn test_background_sweeper_runs_and_stops() {
        let clock = ManualClock::new(START);
        let config = RateLimitConfig::new(1_000, 10).with_cleanup_interval_ms(20);
        let limiter = ProgressiveRateLimiter::with_clock(config, clock.clone()).unwrap();

        for i in 0..10 {
            limiter.check_rate_limit(&format!("client{i}"));
        }
        clock.advance_ms(5_000);

        let mut remaining = limiter.stats().entries;
        for _ in 0..100 {
            if remaining == 0 {
                break;
            }
            thread::sleep(Duration::from_millis(10));
            remaining = limiter.stats().entries;
        }
        assert_eq!(remaining, 0);

        limiter.destroy();
        assert!(!limiter.is_sweeping());

        // No sweep after destroy: expired windows stay put
        limiter.check_rate_limit("late");
        clock.advance_ms(5_000);
        thread::sleep(Duration::from_millis(100));
        assert_eq!(limiter.stats().entries, 1);
        assert_eq!(clock.now_ms(), START + 10_000);
    }
}
