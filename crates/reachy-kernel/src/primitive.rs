//! The [`Primitive`] output contract and its lifecycle.
//!
//! A primitive is an attachable unit of robot behavior.  Its body (idle
//! posture, demo playback, compliance, record/replay, …) lives outside the
//! core; the manager only needs two things from it:
//!
//! - a blocking [`Primitive::propose`] that returns this tick's
//!   [`CommandVector`] over the motors it controls;
//! - optional start/stop hooks, run when the lifecycle moves through
//!   `Starting` and `Stopping`.
//!
//! [`Lifecycle`] holds the state machine the manager drives:
//!
//! ```text
//! Stopped ─start─▶ Starting ─▶ Running ─stop─▶ Stopping ─▶ Stopped
//!                               │  ▲
//!                          pause│  │resume
//!                               ▼  │
//!                              Paused
//! ```

use std::fmt;

use reachy_types::{CommandVector, PrimitiveState, ReachyError};

/// A unit of autonomous behavior that proposes motor commands every tick
/// while it is running.
pub trait Primitive: Send {
    /// Produce this tick's proposal.
    ///
    /// Runs on the primitive's own thread.  An error, a panic, or no answer
    /// within one tick period makes the manager treat the proposal as
    /// all-zero for that tick.  A call that overruns is not repeated until
    /// it has returned.
    fn propose(&mut self) -> Result<CommandVector, ReachyError>;

    /// Called while the primitive is `Starting`.  An error aborts the start
    /// and returns the primitive to `Stopped`.
    fn on_start(&mut self) -> Result<(), ReachyError> {
        Ok(())
    }

    /// Called while the primitive is `Stopping`.
    fn on_stop(&mut self) {}
}

// ────────────────────────────────────────────────────────────────────────────
// Lifecycle
// ────────────────────────────────────────────────────────────────────────────

/// Lifecycle state machine of one attached primitive.
#[derive(Debug, Clone, Default)]
pub struct Lifecycle {
    state: PrimitiveState,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> PrimitiveState {
        self.state
    }

    /// Only running primitives are polled.
    pub fn is_active(&self) -> bool {
        self.state == PrimitiveState::Running
    }

    /// `Stopped → Starting`.
    pub fn begin_start(&mut self, name: &str) -> Result<(), ReachyError> {
        self.transition(name, "start", PrimitiveState::Stopped, PrimitiveState::Starting)
    }

    /// `Starting → Running` when the start hook succeeded, `Starting →
    /// Stopped` otherwise.
    pub fn finish_start(&mut self, started: bool) {
        if self.state == PrimitiveState::Starting {
            self.state = if started {
                PrimitiveState::Running
            } else {
                PrimitiveState::Stopped
            };
        }
    }

    /// `Running | Paused | Starting → Stopping`.
    ///
    /// Returns `false` when there is nothing to stop (already `Stopped` or
    /// `Stopping`), which makes repeated stops no-ops.
    pub fn begin_stop(&mut self) -> bool {
        match self.state {
            PrimitiveState::Running | PrimitiveState::Paused | PrimitiveState::Starting => {
                self.state = PrimitiveState::Stopping;
                true
            }
            PrimitiveState::Stopped | PrimitiveState::Stopping => false,
        }
    }

    /// `Stopping → Stopped`.
    pub fn finish_stop(&mut self) {
        if self.state == PrimitiveState::Stopping {
            self.state = PrimitiveState::Stopped;
        }
    }

    /// `Running → Paused`.
    pub fn pause(&mut self, name: &str) -> Result<(), ReachyError> {
        self.transition(name, "pause", PrimitiveState::Running, PrimitiveState::Paused)
    }

    /// `Paused → Running`.
    pub fn resume(&mut self, name: &str) -> Result<(), ReachyError> {
        self.transition(name, "resume", PrimitiveState::Paused, PrimitiveState::Running)
    }

    fn transition(
        &mut self,
        name: &str,
        action: &str,
        from: PrimitiveState,
        to: PrimitiveState,
    ) -> Result<(), ReachyError> {
        if self.state != from {
            return Err(ReachyError::InvalidTransition {
                primitive: name.to_string(),
                from: self.state,
                action: action.to_string(),
            });
        }
        self.state = to;
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Canonical names
// ────────────────────────────────────────────────────────────────────────────

/// The behaviors every Reachy robot is set up with, by canonical attach name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StandardPrimitive {
    TiringDemo,
    TurnCompliant,
    GotoRest,
    Idle,
    Record,
    Play,
}

impl StandardPrimitive {
    /// Attach order used at setup.
    pub const ALL: [StandardPrimitive; 6] = [
        StandardPrimitive::TiringDemo,
        StandardPrimitive::TurnCompliant,
        StandardPrimitive::GotoRest,
        StandardPrimitive::Idle,
        StandardPrimitive::Record,
        StandardPrimitive::Play,
    ];

    pub fn name(self) -> &'static str {
        match self {
            StandardPrimitive::TiringDemo => "tiring_demo",
            StandardPrimitive::TurnCompliant => "turn_compliant",
            StandardPrimitive::GotoRest => "goto_rest",
            StandardPrimitive::Idle => "idle",
            StandardPrimitive::Record => "record",
            StandardPrimitive::Play => "play",
        }
    }
}

impl fmt::Display for StandardPrimitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// HoldPosture
// ────────────────────────────────────────────────────────────────────────────

/// Proposes the same fixed posture on every tick.
///
/// Enough to express a rest or idle posture, and a base layer that additive
/// primitives can offset.
#[derive(Debug, Clone)]
pub struct HoldPosture {
    posture: CommandVector,
}

impl HoldPosture {
    pub fn new(posture: CommandVector) -> Self {
        Self { posture }
    }

    pub fn posture(&self) -> &CommandVector {
        &self.posture
    }
}

impl Primitive for HoldPosture {
    fn propose(&mut self) -> Result<CommandVector, ReachyError> {
        Ok(self.posture.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_cycle_through_every_state() {
        let mut lc = Lifecycle::new();
        assert_eq!(lc.state(), PrimitiveState::Stopped);

        lc.begin_start("p").unwrap();
        assert_eq!(lc.state(), PrimitiveState::Starting);
        assert!(!lc.is_active());

        lc.finish_start(true);
        assert!(lc.is_active());

        lc.pause("p").unwrap();
        assert_eq!(lc.state(), PrimitiveState::Paused);
        lc.resume("p").unwrap();
        assert_eq!(lc.state(), PrimitiveState::Running);

        assert!(lc.begin_stop());
        assert_eq!(lc.state(), PrimitiveState::Stopping);
        lc.finish_stop();
        assert_eq!(lc.state(), PrimitiveState::Stopped);
    }

    #[test]
    fn failed_start_returns_to_stopped() {
        let mut lc = Lifecycle::new();
        lc.begin_start("p").unwrap();
        lc.finish_start(false);
        assert_eq!(lc.state(), PrimitiveState::Stopped);
    }

    #[test]
    fn repeated_stop_is_noop() {
        let mut lc = Lifecycle::new();
        assert!(!lc.begin_stop());
        assert!(!lc.begin_stop());
        assert_eq!(lc.state(), PrimitiveState::Stopped);
    }

    #[test]
    fn paused_primitive_can_be_stopped() {
        let mut lc = Lifecycle::new();
        lc.begin_start("p").unwrap();
        lc.finish_start(true);
        lc.pause("p").unwrap();
        assert!(lc.begin_stop());
    }

    #[test]
    fn illegal_transitions_are_rejected() {
        let mut lc = Lifecycle::new();
        assert!(matches!(
            lc.pause("p"),
            Err(ReachyError::InvalidTransition { from: PrimitiveState::Stopped, .. })
        ));
        assert!(lc.resume("p").is_err());

        lc.begin_start("p").unwrap();
        lc.finish_start(true);
        assert!(lc.begin_start("p").is_err());
        assert_eq!(lc.state(), PrimitiveState::Running);
    }

    #[test]
    fn standard_names_are_unique() {
        let mut names: Vec<&str> = StandardPrimitive::ALL.iter().map(|p| p.name()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), StandardPrimitive::ALL.len());
        assert_eq!(StandardPrimitive::GotoRest.to_string(), "goto_rest");
    }

    #[test]
    fn hold_posture_proposes_same_vector_every_tick() {
        let posture = CommandVector::new().with("elbow_pitch", -90.0);
        let mut hold = HoldPosture::new(posture.clone());
        assert_eq!(hold.propose().unwrap(), posture);
        assert_eq!(hold.propose().unwrap(), posture);
    }
}
