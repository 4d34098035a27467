//! [`ControlLoop`] – fixed-rate driver of the primitive manager.
//!
//! Every period the loop calls [`Robot::tick`], which polls the running
//! primitives, sums their proposals, and writes the result to the motors.
//! Missed periods are skipped rather than replayed in a burst.
//!
//! The loop runs until the shared shutdown flag is raised, then stops every
//! primitive.  The collision monitor lives on its own thread and is not
//! affected by this loop.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info};

use crate::robot::Robot;

/// Fixed-rate control loop bound to one [`Robot`].
pub struct ControlLoop {
    robot: Arc<Robot>,
    period: Duration,
}

impl ControlLoop {
    /// Tick `robot` at its configured period.
    pub fn new(robot: Arc<Robot>) -> Self {
        let period = robot.tick_period();
        Self { robot, period }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Run until `shutdown` is set.  Returns the number of ticks executed.
    pub async fn run(self, shutdown: Arc<AtomicBool>) -> u64 {
        let mut interval = time::interval(self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(period_ms = self.period.as_millis() as u64, "control loop started");

        let mut ticks = 0u64;
        loop {
            interval.tick().await;
            if shutdown.load(Ordering::SeqCst) {
                break;
            }
            let report = self.robot.tick();
            ticks += 1;
            if !report.failures.is_empty() || !report.write_failures.is_empty() {
                debug!(
                    tick = ticks,
                    primitive_failures = report.failures.len(),
                    write_failures = report.write_failures.len(),
                    "tick completed with failures"
                );
            }
        }

        self.robot.with_manager(|m| m.stop_all());
        info!(ticks, "control loop stopped");
        ticks
    }

    /// Run on the current tokio runtime.
    pub fn spawn(self, shutdown: Arc<AtomicBool>) -> JoinHandle<u64> {
        tokio::spawn(self.run(shutdown))
    }
}
