//! [`PrimitiveManager`] – per-tick arbitration of concurrently running
//! primitives.
//!
//! Each call to [`PrimitiveManager::tick`] polls every running primitive for
//! its [`CommandVector`] and reduces them into one [`CombinedCommand`] by
//! summing, per motor, every contribution.  The sum is commutative and has no
//! priorities: a compliance offset simply adds on top of a base posture.
//! Which primitives may run together is decided by whoever calls
//! [`start`][PrimitiveManager::start], not here.
//!
//! The manager is the only writer of combined commands.  Primitives never see
//! the [`MotorBus`]; they hand their proposals back, and
//! [`tick_into`][PrimitiveManager::tick_into] writes the reduction.
//!
//! # Failure isolation
//!
//! Every attached primitive runs on its own thread.  A tick waits at most
//! the tick budget for each proposal, so a primitive that blocks cannot hold
//! up the others.  A proposal that returns an error, panics, or misses the
//! budget contributes nothing for that tick.  The failure is logged and
//! reported in the [`TickReport`]; every other primitive is still applied.
//! A primitive is polled again once its previous call has returned.
//!
//! # Example
//!
//! ```
//! use reachy_kernel::primitive::HoldPosture;
//! use reachy_kernel::primitive_manager::PrimitiveManager;
//! use reachy_types::CommandVector;
//!
//! let mut manager = PrimitiveManager::default();
//! manager
//!     .attach("base", Box::new(HoldPosture::new(CommandVector::new().with("m1", 10.0))))
//!     .unwrap();
//! manager
//!     .attach("offset", Box::new(HoldPosture::new(CommandVector::new().with("m1", 5.0).with("m2", 3.0))))
//!     .unwrap();
//! manager.start("base").unwrap();
//! manager.start("offset").unwrap();
//!
//! let report = manager.tick();
//! assert_eq!(report.combined.get("m1"), Some(15.0));
//! assert_eq!(report.combined.get("m2"), Some(3.0));
//! ```

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use reachy_hal::MotorBus;
use reachy_types::{CombinedCommand, CommandVector, PrimitiveState, ReachyError};
use tracing::{debug, info, warn};

use crate::primitive::{Lifecycle, Primitive};
use crate::worker::{CallError, PrimitiveWorker};

/// Default time a single proposal may take: one 50 Hz control period.
pub const DEFAULT_TICK_BUDGET: Duration = Duration::from_millis(20);

/// How long `start` and `stop` wait for a primitive's hooks.
pub const HOOK_TIMEOUT: Duration = Duration::from_secs(1);

/// Outcome of one control tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    /// Per-motor sum of every successful proposal.
    pub combined: CombinedCommand,
    /// One [`ReachyError::PrimitiveTickFailure`] per primitive whose proposal
    /// was discarded this tick.
    pub failures: Vec<ReachyError>,
    /// Driver errors raised while writing `combined` (only set by
    /// [`PrimitiveManager::tick_into`]).
    pub write_failures: Vec<ReachyError>,
    /// Number of running primitives polled.
    pub polled: usize,
}

struct Attached {
    worker: PrimitiveWorker,
    lifecycle: Lifecycle,
}

/// Owns attached primitives and reduces their proposals every tick.
pub struct PrimitiveManager {
    primitives: BTreeMap<String, Attached>,
    tick_budget: Duration,
    last_proposals: BTreeMap<String, CommandVector>,
    last_combined: CombinedCommand,
}

impl Default for PrimitiveManager {
    fn default() -> Self {
        Self::new(DEFAULT_TICK_BUDGET)
    }
}

impl PrimitiveManager {
    /// Create a manager whose proposals must each finish within
    /// `tick_budget`.
    pub fn new(tick_budget: Duration) -> Self {
        Self {
            primitives: BTreeMap::new(),
            tick_budget,
            last_proposals: BTreeMap::new(),
            last_combined: CombinedCommand::new(),
        }
    }

    pub fn tick_budget(&self) -> Duration {
        self.tick_budget
    }

    // -----------------------------------------------------------------------
    // Attachment & lifecycle
    // -----------------------------------------------------------------------

    /// Register `primitive` under `name` and move it onto its own thread.
    /// It starts out `Stopped`.
    ///
    /// # Errors
    ///
    /// - [`ReachyError::DuplicateName`] when `name` is already attached; the
    ///   existing attachment is left untouched;
    /// - [`ReachyError::HardwareFault`] if the thread cannot be spawned.
    pub fn attach(
        &mut self,
        name: impl Into<String>,
        primitive: Box<dyn Primitive>,
    ) -> Result<(), ReachyError> {
        let name = name.into();
        if self.primitives.contains_key(&name) {
            return Err(ReachyError::DuplicateName(name));
        }
        let worker = PrimitiveWorker::spawn(&name, primitive)?;
        debug!(primitive = %name, "primitive attached");
        self.primitives.insert(
            name,
            Attached {
                worker,
                lifecycle: Lifecycle::new(),
            },
        );
        Ok(())
    }

    /// Move `name` through `Starting` into `Running`.
    ///
    /// A start hook that errors or does not return within [`HOOK_TIMEOUT`]
    /// leaves the primitive `Stopped`.
    pub fn start(&mut self, name: &str) -> Result<(), ReachyError> {
        let attached = self.attached_mut(name)?;
        attached.lifecycle.begin_start(name)?;
        let outcome = attached.worker.start(HOOK_TIMEOUT).unwrap_or_else(|e| {
            Err(ReachyError::Unresponsive {
                primitive: name.to_string(),
                reason: e.reason(),
            })
        });
        match outcome {
            Ok(()) => {
                attached.lifecycle.finish_start(true);
                info!(primitive = name, "primitive running");
                Ok(())
            }
            Err(e) => {
                attached.lifecycle.finish_start(false);
                warn!(primitive = name, error = %e, "primitive failed to start");
                Err(e)
            }
        }
    }

    /// Move `name` through `Stopping` into `Stopped`.  Stopping a primitive
    /// that is not running is a no-op.
    pub fn stop(&mut self, name: &str) -> Result<(), ReachyError> {
        let attached = self.attached_mut(name)?;
        if attached.lifecycle.begin_stop() {
            if let Err(e) = attached.worker.stop(HOOK_TIMEOUT) {
                warn!(primitive = name, reason = %e.reason(), "stop hook did not complete");
            }
            attached.lifecycle.finish_stop();
            info!(primitive = name, "primitive stopped");
        }
        Ok(())
    }

    pub fn pause(&mut self, name: &str) -> Result<(), ReachyError> {
        self.attached_mut(name)?.lifecycle.pause(name)?;
        info!(primitive = name, "primitive paused");
        Ok(())
    }

    pub fn resume(&mut self, name: &str) -> Result<(), ReachyError> {
        self.attached_mut(name)?.lifecycle.resume(name)?;
        info!(primitive = name, "primitive resumed");
        Ok(())
    }

    /// Stop every attached primitive.
    pub fn stop_all(&mut self) {
        let names: Vec<String> = self.primitives.keys().cloned().collect();
        for name in names {
            // Names come from the map itself, so the lookup cannot fail.
            let _ = self.stop(&name);
        }
    }

    pub fn state(&self, name: &str) -> Option<PrimitiveState> {
        self.primitives.get(name).map(|a| a.lifecycle.state())
    }

    /// Names of every attached primitive, sorted.
    pub fn names(&self) -> Vec<String> {
        self.primitives.keys().cloned().collect()
    }

    /// Names of the primitives that will be polled on the next tick.
    pub fn active_names(&self) -> Vec<String> {
        self.primitives
            .iter()
            .filter(|(_, a)| a.lifecycle.is_active())
            .map(|(name, _)| name.clone())
            .collect()
    }

    // -----------------------------------------------------------------------
    // Arbitration
    // -----------------------------------------------------------------------

    /// Poll every running primitive and reduce their proposals.
    ///
    /// All proposals are requested first and then collected against one
    /// deadline, so a tick takes at most about one budget however many
    /// primitives overrun.
    pub fn tick(&mut self) -> TickReport {
        let budget = self.tick_budget;
        let mut report = TickReport::default();
        let mut proposals = BTreeMap::new();

        let mut requested = Vec::new();
        for (name, attached) in self.primitives.iter_mut() {
            if !attached.lifecycle.is_active() {
                continue;
            }
            report.polled += 1;
            let sent = attached.worker.request_proposal();
            requested.push((name, attached, sent));
        }

        let deadline = Instant::now() + budget;
        for (name, attached, sent) in requested {
            match sent.and_then(|()| attached.worker.collect_proposal(deadline)) {
                Ok(vector) => {
                    report.combined.accumulate(&vector);
                    proposals.insert(name.clone(), vector);
                }
                Err(e) => {
                    let reason = match e {
                        CallError::TimedOut => format!("no proposal within the {budget:?} budget"),
                        other => other.reason(),
                    };
                    warn!(primitive = %name, %reason, "discarding proposal for this tick");
                    report.failures.push(ReachyError::PrimitiveTickFailure {
                        primitive: name.clone(),
                        reason,
                    });
                }
            }
        }

        self.last_proposals = proposals;
        self.last_combined = report.combined.clone();
        report
    }

    /// [`tick`][Self::tick], then write the combined command to `bus`.
    pub fn tick_into(&mut self, bus: &mut MotorBus) -> TickReport {
        let mut report = self.tick();
        report.write_failures = bus.apply(&report.combined);
        report
    }

    /// The vector each primitive contributed on the most recent tick.
    /// Primitives whose proposal was discarded are absent.
    pub fn active_commands(&self) -> &BTreeMap<String, CommandVector> {
        &self.last_proposals
    }

    /// The combined command produced by the most recent tick.
    pub fn combined_command(&self) -> &CombinedCommand {
        &self.last_combined
    }

    fn attached_mut(&mut self, name: &str) -> Result<&mut Attached, ReachyError> {
        self.primitives
            .get_mut(name)
            .ok_or_else(|| ReachyError::UnknownPrimitive(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitive::HoldPosture;
    use reachy_hal::SimBus;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::thread;

    // ------------------------------------------------------------------
    // Test doubles
    // ------------------------------------------------------------------

    fn hold(pairs: &[(&str, f32)]) -> Box<HoldPosture> {
        Box::new(HoldPosture::new(
            pairs.iter().map(|(id, v)| (*id, *v)).collect(),
        ))
    }

    /// Fails while the shared flag is set, otherwise proposes `m1 = 1`.
    struct Flaky {
        failing: Arc<AtomicBool>,
        calls: Arc<AtomicUsize>,
    }

    impl Primitive for Flaky {
        fn propose(&mut self) -> Result<CommandVector, ReachyError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failing.load(Ordering::SeqCst) {
                return Err(ReachyError::HardwareFault {
                    component: "m1".to_string(),
                    details: "encoder glitch".to_string(),
                });
            }
            Ok(CommandVector::new().with("m1", 1.0))
        }
    }

    struct Panicking;

    impl Primitive for Panicking {
        fn propose(&mut self) -> Result<CommandVector, ReachyError> {
            panic!("replay buffer empty");
        }
    }

    struct Slow;

    impl Primitive for Slow {
        fn propose(&mut self) -> Result<CommandVector, ReachyError> {
            thread::sleep(Duration::from_millis(30));
            Ok(CommandVector::new().with("m1", 100.0))
        }
    }

    struct Blocks(Duration);

    impl Primitive for Blocks {
        fn propose(&mut self) -> Result<CommandVector, ReachyError> {
            thread::sleep(self.0);
            Ok(CommandVector::new().with("m2", 1000.0))
        }
    }

    struct HangsOnStart;

    impl Primitive for HangsOnStart {
        fn propose(&mut self) -> Result<CommandVector, ReachyError> {
            Ok(CommandVector::new())
        }
        fn on_start(&mut self) -> Result<(), ReachyError> {
            thread::sleep(HOOK_TIMEOUT * 3);
            Ok(())
        }
    }

    struct RefusesStart;

    impl Primitive for RefusesStart {
        fn propose(&mut self) -> Result<CommandVector, ReachyError> {
            Ok(CommandVector::new())
        }
        fn on_start(&mut self) -> Result<(), ReachyError> {
            Err(ReachyError::Config("no recording loaded".to_string()))
        }
    }

    struct CountsStops(Arc<AtomicUsize>);

    impl Primitive for CountsStops {
        fn propose(&mut self) -> Result<CommandVector, ReachyError> {
            Ok(CommandVector::new())
        }
        fn on_stop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn running(pairs: &[(&str, &[(&str, f32)])]) -> PrimitiveManager {
        let mut manager = PrimitiveManager::default();
        for (name, posture) in pairs {
            manager.attach(*name, hold(posture)).unwrap();
            manager.start(name).unwrap();
        }
        manager
    }

    // ------------------------------------------------------------------
    // Arbitration
    // ------------------------------------------------------------------

    #[test]
    fn overlapping_primitives_are_summed_per_motor() {
        let mut manager = running(&[("p1", &[("m1", 10.0)]), ("p2", &[("m1", 5.0), ("m2", 3.0)])]);
        let report = manager.tick();
        assert_eq!(report.combined.get("m1"), Some(15.0));
        assert_eq!(report.combined.get("m2"), Some(3.0));
        assert_eq!(report.combined.len(), 2);
        assert_eq!(report.polled, 2);
        assert!(report.failures.is_empty());
    }

    #[test]
    fn disjoint_primitives_pass_through_unchanged() {
        let mut manager = running(&[("a", &[("m1", -4.25)]), ("b", &[("m2", 7.5), ("m3", 0.0)])]);
        let report = manager.tick();
        assert_eq!(report.combined.get("m1"), Some(-4.25));
        assert_eq!(report.combined.get("m2"), Some(7.5));
        assert_eq!(report.combined.get("m3"), Some(0.0));
    }

    #[test]
    fn sum_holds_for_negative_and_zero_values() {
        for (a, b) in [(3.0, -3.0), (0.0, 0.0), (-1.5, -2.5), (0.0, 42.0), (-7.0, 0.0)] {
            let mut manager = running(&[("a", &[("m", a)]), ("b", &[("m", b)])]);
            assert_eq!(manager.tick().combined.get("m"), Some(a + b));
        }
    }

    #[test]
    fn stopped_and_paused_primitives_are_not_polled() {
        let mut manager = running(&[("a", &[("m1", 1.0)]), ("b", &[("m1", 2.0)])]);
        manager.attach("idle", hold(&[("m1", 100.0)])).unwrap();
        manager.pause("b").unwrap();

        let report = manager.tick();
        assert_eq!(report.combined.get("m1"), Some(1.0));
        assert_eq!(report.polled, 1);
        assert_eq!(manager.active_names(), vec!["a"]);

        manager.resume("b").unwrap();
        assert_eq!(manager.tick().combined.get("m1"), Some(3.0));
    }

    #[test]
    fn no_active_primitives_yields_empty_command() {
        let mut manager = PrimitiveManager::default();
        manager.attach("idle", hold(&[("m1", 1.0)])).unwrap();
        let report = manager.tick();
        assert!(report.combined.is_empty());
        assert_eq!(report.polled, 0);
    }

    #[test]
    fn tick_has_no_memory_of_previous_ticks() {
        let mut manager = running(&[("a", &[("m1", 1.0)])]);
        manager.tick();
        manager.stop("a").unwrap();
        let report = manager.tick();
        assert!(report.combined.is_empty());
        assert!(manager.active_commands().is_empty());
    }

    #[test]
    fn active_commands_lists_last_contributions() {
        let mut manager = running(&[("a", &[("m1", 1.0)]), ("b", &[("m2", 2.0)])]);
        manager.tick();
        let active = manager.active_commands();
        assert_eq!(active.len(), 2);
        assert_eq!(active["a"].get("m1"), Some(1.0));
        assert_eq!(active["b"].get("m2"), Some(2.0));
        assert_eq!(manager.combined_command().get("m2"), Some(2.0));
    }

    #[test]
    fn tick_into_writes_combined_command_to_bus() {
        let mut bus = SimBus::new().with_motor("m1").with_motor("m2").with_motor("m3").build();
        bus.set_motor_command("m3", 9.0).unwrap();
        let mut manager = running(&[("p1", &[("m1", 10.0)]), ("p2", &[("m1", 5.0), ("m2", 3.0)])]);

        let report = manager.tick_into(&mut bus);
        assert!(report.write_failures.is_empty());
        assert_eq!(bus.command("m1"), Some(15.0));
        assert_eq!(bus.command("m2"), Some(3.0));
        assert_eq!(bus.command("m3"), Some(9.0));
    }

    #[test]
    fn tick_into_reports_unknown_motor_without_aborting() {
        let mut bus = SimBus::new().with_motor("m1").build();
        let mut manager = running(&[("p", &[("ghost", 1.0), ("m1", 2.0)])]);
        let report = manager.tick_into(&mut bus);
        assert_eq!(report.write_failures.len(), 1);
        assert_eq!(bus.command("m1"), Some(2.0));
    }

    // ------------------------------------------------------------------
    // Failure isolation
    // ------------------------------------------------------------------

    #[test]
    fn failing_primitive_contributes_zero_for_that_tick_only() {
        let failing = Arc::new(AtomicBool::new(true));
        let calls = Arc::new(AtomicUsize::new(0));
        let mut manager = running(&[("base", &[("m1", 10.0)])]);
        manager
            .attach(
                "flaky",
                Box::new(Flaky {
                    failing: failing.clone(),
                    calls: calls.clone(),
                }),
            )
            .unwrap();
        manager.start("flaky").unwrap();

        let report = manager.tick();
        assert_eq!(report.combined.get("m1"), Some(10.0));
        assert_eq!(report.failures.len(), 1);
        assert!(matches!(
            &report.failures[0],
            ReachyError::PrimitiveTickFailure { primitive, .. } if primitive == "flaky"
        ));
        assert!(!manager.active_commands().contains_key("flaky"));

        failing.store(false, Ordering::SeqCst);
        let report = manager.tick();
        assert_eq!(report.combined.get("m1"), Some(11.0));
        assert!(report.failures.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(manager.state("flaky"), Some(PrimitiveState::Running));
    }

    #[test]
    fn panicking_primitive_does_not_halt_the_tick() {
        let mut manager = running(&[("base", &[("m1", 2.0)])]);
        manager.attach("replay", Box::new(Panicking)).unwrap();
        manager.start("replay").unwrap();

        let report = manager.tick();
        assert_eq!(report.combined.get("m1"), Some(2.0));
        match &report.failures[..] {
            [ReachyError::PrimitiveTickFailure { reason, .. }] => {
                assert!(reason.contains("replay buffer empty"))
            }
            other => panic!("unexpected failures: {other:?}"),
        }
        // Still polled next tick.
        assert_eq!(manager.tick().failures.len(), 1);
    }

    #[test]
    fn overrunning_proposal_is_discarded() {
        let mut manager = PrimitiveManager::new(Duration::from_millis(5));
        manager.attach("slow", Box::new(Slow)).unwrap();
        manager.attach("base", hold(&[("m1", 1.0)])).unwrap();
        manager.start("slow").unwrap();
        manager.start("base").unwrap();

        let report = manager.tick();
        assert_eq!(report.combined.get("m1"), Some(1.0));
        assert_eq!(report.failures.len(), 1);
    }

    #[test]
    fn blocking_primitive_does_not_stall_the_tick() {
        let mut manager = PrimitiveManager::new(Duration::from_millis(20));
        manager.attach("base", hold(&[("m2", 3.0)])).unwrap();
        manager.attach("hang", Box::new(Blocks(Duration::from_millis(500)))).unwrap();
        manager.start("base").unwrap();
        manager.start("hang").unwrap();

        let started = Instant::now();
        let report = manager.tick();
        assert!(started.elapsed() < Duration::from_millis(150), "tick took {:?}", started.elapsed());
        assert_eq!(report.combined.get("m2"), Some(3.0));
        assert!(matches!(
            &report.failures[..],
            [ReachyError::PrimitiveTickFailure { primitive, .. }] if primitive == "hang"
        ));

        // The blocked call is still running: the next tick skips it without
        // waiting and keeps applying the healthy primitive.
        let started = Instant::now();
        let report = manager.tick();
        assert!(started.elapsed() < Duration::from_millis(150), "tick took {:?}", started.elapsed());
        assert_eq!(report.combined.get("m2"), Some(3.0));
        assert_eq!(report.failures.len(), 1);
    }

    #[test]
    fn several_blocking_primitives_share_one_deadline() {
        let mut manager = PrimitiveManager::new(Duration::from_millis(20));
        for name in ["a", "b", "c", "d"] {
            manager.attach(name, Box::new(Blocks(Duration::from_millis(300)))).unwrap();
            manager.start(name).unwrap();
        }
        let started = Instant::now();
        let report = manager.tick();
        assert!(started.elapsed() < Duration::from_millis(150), "tick took {:?}", started.elapsed());
        assert_eq!(report.failures.len(), 4);
        assert!(report.combined.is_empty());
    }

    // ------------------------------------------------------------------
    // Attachment & lifecycle
    // ------------------------------------------------------------------

    #[test]
    fn duplicate_attach_fails_and_keeps_first() {
        let mut manager = PrimitiveManager::default();
        manager.attach("idle", hold(&[("m1", 1.0)])).unwrap();
        let err = manager.attach("idle", hold(&[("m1", 99.0)])).unwrap_err();
        assert_eq!(err, ReachyError::DuplicateName("idle".to_string()));
        assert_eq!(manager.names(), vec!["idle"]);

        manager.start("idle").unwrap();
        assert_eq!(manager.tick().combined.get("m1"), Some(1.0));
    }

    #[test]
    fn lifecycle_calls_on_unknown_name_fail() {
        let mut manager = PrimitiveManager::default();
        assert!(matches!(manager.start("ghost"), Err(ReachyError::UnknownPrimitive(_))));
        assert!(matches!(manager.stop("ghost"), Err(ReachyError::UnknownPrimitive(_))));
        assert!(manager.state("ghost").is_none());
    }

    #[test]
    fn failing_start_hook_leaves_primitive_stopped() {
        let mut manager = PrimitiveManager::default();
        manager.attach("play", Box::new(RefusesStart)).unwrap();
        assert!(matches!(manager.start("play"), Err(ReachyError::Config(_))));
        assert_eq!(manager.state("play"), Some(PrimitiveState::Stopped));
        assert_eq!(manager.tick().polled, 0);
    }

    #[test]
    fn hung_start_hook_times_out_and_leaves_primitive_stopped() {
        let mut manager = PrimitiveManager::default();
        manager.attach("goto_rest", Box::new(HangsOnStart)).unwrap();

        let started = Instant::now();
        let err = manager.start("goto_rest").unwrap_err();
        assert!(started.elapsed() < HOOK_TIMEOUT * 2);
        assert!(matches!(err, ReachyError::Unresponsive { primitive, .. } if primitive == "goto_rest"));
        assert_eq!(manager.state("goto_rest"), Some(PrimitiveState::Stopped));
    }

    #[test]
    fn stop_is_idempotent_and_runs_hook_once() {
        let stops = Arc::new(AtomicUsize::new(0));
        let mut manager = PrimitiveManager::default();
        manager.attach("record", Box::new(CountsStops(stops.clone()))).unwrap();
        manager.start("record").unwrap();

        manager.stop("record").unwrap();
        manager.stop("record").unwrap();
        manager.stop("record").unwrap();
        assert_eq!(stops.load(Ordering::SeqCst), 1);
        assert_eq!(manager.state("record"), Some(PrimitiveState::Stopped));
    }

    #[test]
    fn stop_all_stops_everything() {
        let mut manager = running(&[("a", &[("m1", 1.0)]), ("b", &[("m2", 1.0)])]);
        manager.pause("b").unwrap();
        manager.stop_all();
        assert!(manager.active_names().is_empty());
        assert_eq!(manager.state("b"), Some(PrimitiveState::Stopped));
    }
}
