//! [`CollisionMonitor`] – always-on collision watcher for simulated robots.
//!
//! The monitor polls a [`CollisionSensor`] at a fixed interval (20 ms by
//! default) on its own OS thread.  Every positive reading is stamped with the
//! current time and recorded into a shared [`CollisionHistory`]:
//!
//! - the *last collision*, and
//! - the *recent collisions*, a FIFO of at most
//!   [`RECENT_COLLISION_CAPACITY`] records, oldest first.
//!
//! Readings are not debounced: a contact that lasts 100 ms produces about
//! five records.  Callers that want contact events must debounce the
//! timestamp stream themselves.
//!
//! Once spawned the monitor runs until the process exits.  It cannot be
//! cancelled or restarted.  It only exists in simulation; on hardware no
//! monitor is spawned and no history exists.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use chrono::Utc;
use reachy_hal::CollisionSensor;
use reachy_types::{CollisionRecord, ReachyError};
use tracing::{debug, info, warn};

/// Maximum number of records kept in the recent-collision history.
pub const RECENT_COLLISION_CAPACITY: usize = 10;

/// Default sensor polling period.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(20);

// ────────────────────────────────────────────────────────────────────────────
// CollisionHistory
// ────────────────────────────────────────────────────────────────────────────

/// Consistent view of the collision state at one instant.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollisionSnapshot {
    pub last: Option<CollisionRecord>,
    /// Oldest first; `recent.last() == last.as_ref()` whenever non-empty.
    pub recent: Vec<CollisionRecord>,
}

#[derive(Debug, Default)]
struct HistoryState {
    last: Option<CollisionRecord>,
    recent: VecDeque<CollisionRecord>,
}

/// Shared last/recent collision state.
///
/// Clones share the same storage.  The monitor is the only writer; every
/// read returns an owned copy taken under the same lock as the writes, so a
/// reader never sees the last collision and the history disagree.
///
/// Code outside this crate can only read:
///
/// ```compile_fail
/// use reachy_kernel::CollisionHistory;
/// use reachy_types::CollisionRecord;
///
/// CollisionHistory::new().record(CollisionRecord::now());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CollisionHistory {
    state: Arc<Mutex<HistoryState>>,
}

impl CollisionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a collision, evicting the oldest entry when full.
    pub(crate) fn record(&self, record: CollisionRecord) {
        let mut state = self.lock();
        if state.recent.len() == RECENT_COLLISION_CAPACITY {
            state.recent.pop_front();
        }
        state.recent.push_back(record);
        state.last = Some(record);
    }

    pub fn last_collision(&self) -> Option<CollisionRecord> {
        self.lock().last
    }

    /// Recent collisions, oldest first.
    pub fn recent_collisions(&self) -> Vec<CollisionRecord> {
        self.lock().recent.iter().copied().collect()
    }

    pub fn snapshot(&self) -> CollisionSnapshot {
        let state = self.lock();
        CollisionSnapshot {
            last: state.last,
            recent: state.recent.iter().copied().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.lock().recent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().recent.is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HistoryState> {
        // A panicking reader cannot leave the state half-written: every
        // mutation happens inside `record` without intermediate panics.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// CollisionMonitor
// ────────────────────────────────────────────────────────────────────────────

/// Background poller feeding a [`CollisionHistory`].
pub struct CollisionMonitor {
    sensor: Arc<dyn CollisionSensor>,
    object_name: String,
    interval: Duration,
    history: CollisionHistory,
}

impl CollisionMonitor {
    /// Monitor `object_name` through `sensor`, writing into `history`.
    pub fn new(
        sensor: Arc<dyn CollisionSensor>,
        object_name: impl Into<String>,
        history: CollisionHistory,
    ) -> Self {
        Self {
            sensor,
            object_name: object_name.into(),
            interval: DEFAULT_POLL_INTERVAL,
            history,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// One loop iteration: query the sensor and record a hit.
    ///
    /// Returns whether a collision was recorded.  Sensor errors count as "no
    /// collision" for this poll.
    pub fn poll_once(&self) -> bool {
        match self.sensor.query_collision_state(&self.object_name) {
            Ok(true) => {
                self.history.record(CollisionRecord::new(Utc::now()));
                true
            }
            Ok(false) => false,
            Err(e) => {
                warn!(object = %self.object_name, error = %e, "collision query failed");
                false
            }
        }
    }

    /// Start the polling loop on a detached thread.
    ///
    /// # Errors
    ///
    /// [`ReachyError::HardwareFault`] if the OS refuses to spawn the thread.
    pub fn spawn(self) -> Result<(), ReachyError> {
        info!(
            object = %self.object_name,
            interval_ms = self.interval.as_millis() as u64,
            "starting collision monitor"
        );
        thread::Builder::new()
            .name("reachy-collision-monitor".to_string())
            .spawn(move || self.run())
            .map(|_detached| ())
            .map_err(|e| ReachyError::HardwareFault {
                component: "collision_monitor".to_string(),
                details: format!("failed to spawn monitor thread: {e}"),
            })
    }

    fn run(self) {
        loop {
            let started = Instant::now();
            self.poll_once();
            match self.interval.checked_sub(started.elapsed()) {
                Some(remaining) => thread::sleep(remaining),
                None => debug!(
                    overrun_ms = (started.elapsed() - self.interval).as_millis() as u64,
                    "collision poll overran its interval"
                ),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeDelta};
    use reachy_hal::{HardwareCollisionSensor, SimCollisionSensor};

    fn at(secs: i64) -> CollisionRecord {
        let base = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        CollisionRecord::new(base + TimeDelta::seconds(secs))
    }

    // ------------------------------------------------------------------
    // History
    // ------------------------------------------------------------------

    #[test]
    fn empty_history_has_no_last_collision() {
        let history = CollisionHistory::new();
        assert!(history.is_empty());
        assert!(history.last_collision().is_none());
        assert_eq!(history.snapshot(), CollisionSnapshot::default());
    }

    #[test]
    fn five_collisions_are_kept_in_arrival_order() {
        let history = CollisionHistory::new();
        for t in 1..=5 {
            history.record(at(t));
        }
        assert_eq!(history.last_collision(), Some(at(5)));
        assert_eq!(history.recent_collisions(), (1..=5).map(at).collect::<Vec<_>>());
    }

    #[test]
    fn eleventh_collision_evicts_the_oldest() {
        let history = CollisionHistory::new();
        for t in 1..=11 {
            history.record(at(t));
        }
        assert_eq!(history.len(), RECENT_COLLISION_CAPACITY);
        assert_eq!(history.recent_collisions(), (2..=11).map(at).collect::<Vec<_>>());
        assert_eq!(history.last_collision(), Some(at(11)));
    }

    #[test]
    fn history_never_exceeds_capacity() {
        let history = CollisionHistory::new();
        for t in 0..100 {
            history.record(at(t));
            assert!(history.len() <= RECENT_COLLISION_CAPACITY);
            let snap = history.snapshot();
            assert_eq!(snap.last.as_ref(), snap.recent.last());
        }
    }

    #[test]
    fn clones_share_storage() {
        let history = CollisionHistory::new();
        let reader = history.clone();
        history.record(at(1));
        assert_eq!(reader.last_collision(), Some(at(1)));
    }

    #[test]
    fn concurrent_readers_never_see_torn_state() {
        let history = CollisionHistory::new();
        let writer = history.clone();
        let handle = thread::spawn(move || {
            for t in 0..2_000 {
                writer.record(at(t));
            }
        });
        for _ in 0..2_000 {
            let snap = history.snapshot();
            assert!(snap.recent.len() <= RECENT_COLLISION_CAPACITY);
            assert_eq!(snap.last.as_ref(), snap.recent.last());
        }
        handle.join().unwrap();
    }

    // ------------------------------------------------------------------
    // Monitor
    // ------------------------------------------------------------------

    #[test]
    fn poll_once_records_only_positive_readings() {
        let sensor = SimCollisionSensor::new();
        let history = CollisionHistory::new();
        let monitor = CollisionMonitor::new(sensor.clone(), "Collision", history.clone());

        assert!(!monitor.poll_once());
        assert!(history.is_empty());

        sensor.set_colliding(true);
        assert!(monitor.poll_once());
        assert!(monitor.poll_once());
        // No debouncing: a sustained contact is recorded on every poll.
        assert_eq!(history.len(), 2);
        assert_eq!(history.last_collision(), history.recent_collisions().last().copied());
    }

    #[test]
    fn sensor_errors_are_treated_as_no_collision() {
        let history = CollisionHistory::new();
        let monitor =
            CollisionMonitor::new(Arc::new(HardwareCollisionSensor), "Collision", history.clone());
        assert!(!monitor.poll_once());
        assert!(history.is_empty());
    }

    #[test]
    fn spawned_monitor_keeps_polling_for_process_lifetime() {
        // The monitor thread is intentionally never stopped; it outlives
        // this test and exits with the test binary.
        let sensor = SimCollisionSensor::new();
        let history = CollisionHistory::new();
        CollisionMonitor::new(sensor.clone(), "Collision", history.clone())
            .with_interval(Duration::from_millis(2))
            .spawn()
            .unwrap();

        sensor.set_colliding(true);
        thread::sleep(Duration::from_millis(100));
        assert!(!history.is_empty());
        assert!(history.len() <= RECENT_COLLISION_CAPACITY);

        sensor.set_colliding(false);
        let before = sensor.query_count();
        thread::sleep(Duration::from_millis(50));
        assert!(sensor.query_count() > before);
    }
}
