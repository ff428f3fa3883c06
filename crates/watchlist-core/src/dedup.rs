//! Sighting de-duplication with a coarse, whole-set cooldown reset.
//!
//! Each identity alerts at most once per window. The window is not sliding:
//! a [`ResetTimer`] clears the entire set every interval, so an identity seen
//! just before and just after a reset alerts twice.

use std::collections::HashSet;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Duration;

pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(900);

/// Names already alerted in the current window.
#[derive(Debug, Default)]
pub struct SightingDeduplicator {
    seen: Mutex<HashSet<String>>,
}

impl SightingDeduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        // Poisoning is ignored: the set carries no cross-entry invariant.
        self.seen.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record a sighting. Returns `true` if this is the first in the window
    /// and an alert should fire.
    pub fn check_and_insert(&self, name: &str) -> bool {
        let mut seen = self.lock();
        if seen.contains(name) {
            return false;
        }
        seen.insert(name.to_string())
    }

    /// Drop one name so its next sighting alerts again.
    pub fn forget(&self, name: &str) -> bool {
        self.lock().remove(name)
    }

    /// Forget every sighting.
    pub fn reset(&self) {
        let mut seen = self.lock();
        let cleared = seen.len();
        seen.clear();
        tracing::debug!(cleared, "sighting window reset");
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lock().contains(name)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

/// Background thread that resets a [`SightingDeduplicator`] every interval.
///
/// Stopping wakes the thread immediately; dropping the timer stops it.
pub struct ResetTimer {
    stop_tx: Option<mpsc::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl ResetTimer {
    /// Fails with `InvalidInput` for a zero interval.
    pub fn spawn(dedup: Arc<SightingDeduplicator>, interval: Duration) -> std::io::Result<Self> {
        if interval.is_zero() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "cooldown interval must be non-zero",
            ));
        }
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let handle = std::thread::Builder::new()
            .name("watchlist-cooldown".into())
            .spawn(move || {
                tracing::debug!(interval_secs = interval.as_secs(), "cooldown timer started");
                loop {
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => dedup.reset(),
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                tracing::debug!("cooldown timer stopped");
            })?;

        Ok(Self {
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        })
    }

    /// Signal the thread and wait for it to exit.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ResetTimer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_repeat_sightings_alert_once() {
        let dedup = SightingDeduplicator::new();
        let alerts: Vec<bool> = ["A", "A", "B", "A"]
            .iter()
            .map(|n| dedup.check_and_insert(n))
            .collect();
        assert_eq!(alerts, vec![true, false, true, false]);
        assert_eq!(alerts.iter().filter(|&&a| a).count(), 2);

        dedup.reset();
        assert!(dedup.is_empty());
        assert!(dedup.check_and_insert("A"));
    }

    #[test]
    fn test_forget_allows_realert() {
        let dedup = SightingDeduplicator::new();
        assert!(dedup.check_and_insert("A"));
        assert!(dedup.check_and_insert("B"));
        assert!(dedup.forget("A"));
        assert!(!dedup.forget("A"));
        assert!(dedup.contains("B"));
        assert!(dedup.check_and_insert("A"));
    }

    #[test]
    fn test_zero_interval_rejected() {
        let dedup = Arc::new(SightingDeduplicator::new());
        let err = ResetTimer::spawn(Arc::clone(&dedup), Duration::ZERO).err().unwrap();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidInput);
        assert_eq!(Arc::strong_count(&dedup), 1);
    }

    #[test]
    fn test_timer_resets_set() {
        let dedup = Arc::new(SightingDeduplicator::new());
        dedup.check_and_insert("A");
        let timer = ResetTimer::spawn(Arc::clone(&dedup), Duration::from_millis(20)).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while !dedup.is_empty() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(dedup.is_empty());
        timer.stop();
    }

    #[test]
    fn test_stop_is_prompt() {
        let dedup = Arc::new(SightingDeduplicator::new());
        let timer = ResetTimer::spawn(Arc::clone(&dedup), Duration::from_secs(3600)).unwrap();
        let started = Instant::now();
        timer.stop();
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_drop_stops_timer() {
        let dedup = Arc::new(SightingDeduplicator::new());
        {
            let _timer = ResetTimer::spawn(Arc::clone(&dedup), Duration::from_millis(1)).unwrap();
        }
        // The thread held the only other reference.
        assert_eq!(Arc::strong_count(&dedup), 1);
        dedup.check_and_insert("A");
        std::thread::sleep(Duration::from_millis(20));
        assert!(dedup.contains("A"));
    }

    #[test]
    fn test_concurrent_reset_and_insert_stay_consistent() {
        const WORKERS: usize = 4;
        const PER_WORKER: usize = 500;

        let dedup = Arc::new(SightingDeduplicator::new());
        let timer = ResetTimer::spawn(Arc::clone(&dedup), Duration::from_micros(200)).unwrap();

        let workers: Vec<_> = (0..WORKERS)
            .map(|w| {
                let dedup = Arc::clone(&dedup);
                std::thread::spawn(move || {
                    for i in 0..PER_WORKER {
                        let name = format!("w{w}-{i}");
                        // Names are distinct, so a reset can never turn a
                        // first sighting into a suppressed one.
                        assert!(dedup.check_and_insert(&name));
                        // Suppressed unless a reset landed in between.
                        let _ = dedup.check_and_insert(&name);
                    }
                })
            })
            .collect();
        for w in workers {
            w.join().unwrap();
        }
        timer.stop();

        // No more resets: every insert from here on must stick.
        for w in 0..WORKERS {
            for i in 0..PER_WORKER {
                dedup.check_and_insert(&format!("w{w}-{i}"));
            }
        }
        assert_eq!(dedup.len(), WORKERS * PER_WORKER);
        for w in 0..WORKERS {
            for i in 0..PER_WORKER {
                let name = format!("w{w}-{i}");
                assert!(dedup.contains(&name));
                assert!(!dedup.check_and_insert(&name));
            }
        }
    }
}
