//! [`Robot`] capabilities and the [`RobotBuilder`] setup path.
//!
//! Setup runs once, in this order:
//!
//! 1. in simulated mode, connect to the simulator (a failure aborts setup
//!    with [`ReachyError::Connection`] before any motor is touched);
//! 2. set every motor's moving speed;
//! 3. attach the configured primitives;
//! 4. in simulated mode, spawn the [`CollisionMonitor`];
//! 5. bind the joint chain to the variant's tip offset.
//!
//! The resulting [`Robot`] only exposes what setup populated.  On hardware
//! there is no collision history, so [`Robot::last_collision`] and
//! [`Robot::recent_collisions`] always return `None`.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use arc_swap::ArcSwap;
use nalgebra::Vector3;
use reachy_hal::simulator::DEFAULT_COLLISION_OBJECT;
use reachy_hal::{MotorBus, Simulator, SimulatorConfig};
use reachy_kernel::{
    CollisionHistory, CollisionMonitor, CollisionSnapshot, DEFAULT_POLL_INTERVAL, Primitive, PrimitiveManager,
    StandardPrimitive, TickReport,
};
use reachy_kinematics::{Joint, KinematicChain, RobotVariant};
use reachy_types::{CollisionRecord, ReachyError};
use tracing::{info, warn};

/// Moving speed applied to every motor at setup.
pub const DEFAULT_MOVING_SPEED: f32 = 50.0;

/// Control loop rate.
pub const DEFAULT_TICK_RATE_HZ: f64 = 50.0;

// ────────────────────────────────────────────────────────────────────────────
// Configuration
// ────────────────────────────────────────────────────────────────────────────

/// Whether the robot runs against a simulator or physical motors.
#[derive(Debug, Clone, PartialEq)]
pub enum RobotMode {
    Simulated(SimulatorConfig),
    Hardware,
}

/// Everything setup needs besides the drivers themselves.
#[derive(Debug, Clone, PartialEq)]
pub struct RobotConfig {
    pub variant: RobotVariant,
    pub mode: RobotMode,
    pub moving_speed: f32,
    pub tick_rate_hz: f64,
    pub collision_poll_interval: Duration,
    pub collision_object: String,
}

impl Default for RobotConfig {
    fn default() -> Self {
        Self {
            variant: RobotVariant::default(),
            mode: RobotMode::Hardware,
            moving_speed: DEFAULT_MOVING_SPEED,
            tick_rate_hz: DEFAULT_TICK_RATE_HZ,
            collision_poll_interval: DEFAULT_POLL_INTERVAL,
            collision_object: DEFAULT_COLLISION_OBJECT.to_string(),
        }
    }
}

impl RobotConfig {
    /// Simulated robot of `variant` using the default simulator address and
    /// the variant's scene.
    pub fn simulated(variant: RobotVariant) -> Self {
        Self {
            variant,
            mode: RobotMode::Simulated(SimulatorConfig::default()),
            ..Self::default()
        }
    }

    pub fn hardware(variant: RobotVariant) -> Self {
        Self {
            variant,
            ..Self::default()
        }
    }

    /// Period of one control tick.
    ///
    /// # Errors
    ///
    /// [`ReachyError::Config`] when the rate is not a positive finite number.
    pub fn tick_period(&self) -> Result<Duration, ReachyError> {
        if !self.tick_rate_hz.is_finite() || self.tick_rate_hz <= 0.0 {
            return Err(ReachyError::Config(format!(
                "tick rate must be positive, got {}",
                self.tick_rate_hz
            )));
        }
        Ok(Duration::from_secs_f64(1.0 / self.tick_rate_hz))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Robot
// ────────────────────────────────────────────────────────────────────────────

/// A set-up robot.  Share it as `Arc<Robot>` between the control loop and
/// external callers.
pub struct Robot {
    variant: RobotVariant,
    tick_period: Duration,
    motors: Mutex<MotorBus>,
    manager: Mutex<PrimitiveManager>,
    collisions: Option<CollisionHistory>,
    joints: Vec<Joint>,
    kinematic_chain: ArcSwap<KinematicChain>,
}

impl Robot {
    pub fn variant(&self) -> RobotVariant {
        self.variant
    }

    pub fn tick_period(&self) -> Duration {
        self.tick_period
    }

    pub fn is_simulated(&self) -> bool {
        self.collisions.is_some()
    }

    /// Run `f` with exclusive access to the primitive manager (attach,
    /// start, stop, inspect).  The lock is released when `f` returns.
    pub fn with_manager<R>(&self, f: impl FnOnce(&mut PrimitiveManager) -> R) -> R {
        f(&mut self.lock_manager())
    }

    /// Run `f` with exclusive access to the motor bus.
    pub fn with_motors<R>(&self, f: impl FnOnce(&mut MotorBus) -> R) -> R {
        f(&mut self.lock_motors())
    }

    /// Attach `primitive` under `name` after setup.
    pub fn attach_primitive(
        &self,
        name: impl Into<String>,
        primitive: Box<dyn Primitive>,
    ) -> Result<(), ReachyError> {
        self.lock_manager().attach(name, primitive)
    }

    /// Run one control tick and write the combined command to the motors.
    pub fn tick(&self) -> TickReport {
        // Lock order: manager, then motors.
        let mut manager = self.lock_manager();
        let mut motors = self.lock_motors();
        manager.tick_into(&mut motors)
    }

    fn lock_manager(&self) -> MutexGuard<'_, PrimitiveManager> {
        self.manager.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_motors(&self) -> MutexGuard<'_, MotorBus> {
        self.motors.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Last and recent collisions read together, present only in simulated
    /// mode.  The snapshot is an owned copy; only the collision monitor
    /// writes the history.
    pub fn collisions(&self) -> Option<CollisionSnapshot> {
        self.collisions.as_ref().map(CollisionHistory::snapshot)
    }

    pub fn last_collision(&self) -> Option<CollisionRecord> {
        self.collisions.as_ref()?.last_collision()
    }

    /// Recent collisions, oldest first.  `None` on hardware.
    pub fn recent_collisions(&self) -> Option<Vec<CollisionRecord>> {
        self.collisions.as_ref().map(CollisionHistory::recent_collisions)
    }

    /// The current kinematic chain.  The returned `Arc` stays valid and
    /// unchanged even if the chain is reconfigured afterwards.
    pub fn kinematic_chain(&self) -> Arc<KinematicChain> {
        self.kinematic_chain.load_full()
    }

    /// Bind the robot's joints to a new tip offset and swap the stored chain
    /// in one atomic step.
    pub fn configure_kinematic_chain(&self, tip: Vector3<f64>) -> Arc<KinematicChain> {
        let chain = Arc::new(KinematicChain::new(self.joints.clone(), tip));
        self.kinematic_chain.store(Arc::clone(&chain));
        info!(tip = ?tip, "kinematic chain configured");
        chain
    }
}

// ────────────────────────────────────────────────────────────────────────────
// RobotBuilder
// ────────────────────────────────────────────────────────────────────────────

/// Builds a [`Robot`] from a [`RobotConfig`], the motor drivers, the joint
/// chain, and the primitives to attach.
///
/// # Example
///
/// ```rust
/// use reachy_hal::{SimBus, SimSimulator};
/// use reachy_kernel::HoldPosture;
/// use reachy_kinematics::RobotVariant;
/// use reachy_runtime::robot::{RobotBuilder, RobotConfig};
/// use reachy_types::CommandVector;
///
/// let robot = RobotBuilder::new(RobotConfig::simulated(RobotVariant::Reachy), SimBus::new().with_arm().build())
///     .simulator(Box::new(SimSimulator::new()))
///     .primitive("idle", Box::new(HoldPosture::new(CommandVector::new().with("elbow_pitch", -90.0))))
///     .build()
///     .expect("simulated setup succeeds");
///
/// assert!(robot.is_simulated());
/// assert_eq!(robot.recent_collisions(), Some(Vec::new()));
/// ```
pub struct RobotBuilder {
    config: RobotConfig,
    motors: MotorBus,
    joints: Vec<Joint>,
    primitives: Vec<(String, Box<dyn Primitive>)>,
    simulator: Option<Box<dyn Simulator>>,
}

impl RobotBuilder {
    pub fn new(config: RobotConfig, motors: MotorBus) -> Self {
        Self {
            config,
            motors,
            joints: Vec::new(),
            primitives: Vec::new(),
            simulator: None,
        }
    }

    /// Joint chain of the robot model, base first.
    pub fn joints(mut self, joints: Vec<Joint>) -> Self {
        self.joints = joints;
        self
    }

    /// Attach `primitive` under `name` during setup.
    pub fn primitive(mut self, name: impl Into<String>, primitive: Box<dyn Primitive>) -> Self {
        self.primitives.push((name.into(), primitive));
        self
    }

    /// Attach the body of one of the standard behaviors under its canonical
    /// name.
    pub fn standard_primitive(self, kind: StandardPrimitive, primitive: Box<dyn Primitive>) -> Self {
        self.primitive(kind.name(), primitive)
    }

    /// Simulator to connect to in [`RobotMode::Simulated`].
    pub fn simulator(mut self, simulator: Box<dyn Simulator>) -> Self {
        self.simulator = Some(simulator);
        self
    }

    /// Run setup.
    ///
    /// # Errors
    ///
    /// - [`ReachyError::Connection`] when simulated and the simulator is
    ///   missing or unreachable;
    /// - [`ReachyError::DuplicateName`] when two primitives share a name;
    /// - [`ReachyError::HardwareFault`] when a motor rejects its speed limit
    ///   or the monitor thread cannot start;
    /// - [`ReachyError::Config`] for an invalid tick rate.
    pub fn build(self) -> Result<Robot, ReachyError> {
        let RobotBuilder {
            config,
            mut motors,
            joints,
            primitives,
            simulator,
        } = self;
        let tick_period = config.tick_period()?;
        let variant = config.variant;

        let sensor = match &config.mode {
            RobotMode::Simulated(sim_config) => {
                let simulator = simulator.ok_or_else(|| {
                    ReachyError::Connection("simulated mode requires a simulator".to_string())
                })?;
                let mut sim_config = sim_config.clone();
                if sim_config.scene.is_none() {
                    sim_config.scene = Some(variant.scene_file().into());
                }
                Some(simulator.connect(&sim_config)?)
            }
            RobotMode::Hardware => None,
        };

        motors.set_speed_limit_all(config.moving_speed)?;

        let mut manager = PrimitiveManager::new(tick_period);
        for (name, primitive) in primitives {
            manager.attach(name, primitive)?;
        }

        let collisions = match sensor {
            Some(sensor) => {
                let history = CollisionHistory::new();
                CollisionMonitor::new(sensor, config.collision_object.clone(), history.clone())
                    .with_interval(config.collision_poll_interval)
                    .spawn()?;
                Some(history)
            }
            None => {
                warn!("hardware mode: collision sensing unavailable, monitor not started");
                None
            }
        };

        let chain = KinematicChain::new(joints.clone(), variant.tip_offset());
        info!(
            variant = %variant,
            model = %variant.model_file(),
            motors = motors.len(),
            primitives = manager.names().len(),
            simulated = collisions.is_some(),
            "robot set up"
        );

        Ok(Robot {
            variant,
            tick_period,
            motors: Mutex::new(motors),
            manager: Mutex::new(manager),
            collisions,
            joints,
            kinematic_chain: ArcSwap::from_pointee(chain),
        })
    }
}
