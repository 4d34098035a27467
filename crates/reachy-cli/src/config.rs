//! Persisted settings – reads/writes `~/.reachy/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use reachy_hal::SimulatorConfig;
use reachy_kinematics::RobotVariant;
use reachy_runtime::{RobotConfig, RobotMode};
use reachy_types::ReachyError;
use serde::{Deserialize, Serialize};

/// User configuration stored in `~/.reachy/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Robot body to bring up.
    #[serde(default)]
    pub variant: RobotVariant,

    /// Run against the simulator instead of physical motors.
    #[serde(default = "default_simulated")]
    pub simulated: bool,

    #[serde(default = "default_simulator_host")]
    pub simulator_host: String,

    #[serde(default = "default_simulator_port")]
    pub simulator_port: u16,

    /// Control loop rate in Hz.
    #[serde(default = "default_tick_rate_hz")]
    pub tick_rate_hz: f64,

    /// Collision monitor period in milliseconds.
    #[serde(default = "default_collision_poll_ms")]
    pub collision_poll_ms: u64,

    /// Moving speed applied to every motor at setup.
    #[serde(default = "default_moving_speed")]
    pub moving_speed: f32,
}

fn default_simulated() -> bool {
    true
}
fn default_simulator_host() -> String {
    SimulatorConfig::default().host
}
fn default_simulator_port() -> u16 {
    SimulatorConfig::default().port
}
fn default_tick_rate_hz() -> f64 {
    reachy_runtime::robot::DEFAULT_TICK_RATE_HZ
}
fn default_collision_poll_ms() -> u64 {
    reachy_kernel::DEFAULT_POLL_INTERVAL.as_millis() as u64
}
fn default_moving_speed() -> f32 {
    reachy_runtime::robot::DEFAULT_MOVING_SPEED
}

impl Default for Config {
    fn default() -> Self {
        Self {
            variant: RobotVariant::default(),
            simulated: default_simulated(),
            simulator_host: default_simulator_host(),
            simulator_port: default_simulator_port(),
            tick_rate_hz: default_tick_rate_hz(),
            collision_poll_ms: default_collision_poll_ms(),
            moving_speed: default_moving_speed(),
        }
    }
}

impl Config {
    /// Translate into the runtime's typed configuration.
    ///
    /// # Errors
    ///
    /// [`ReachyError::Config`] when the collision period is zero.
    pub fn to_robot_config(&self) -> Result<RobotConfig, ReachyError> {
        if self.collision_poll_ms == 0 {
            return Err(ReachyError::Config(
                "collision_poll_ms must be greater than zero".to_string(),
            ));
        }
        let mode = if self.simulated {
            RobotMode::Simulated(SimulatorConfig {
                host: self.simulator_host.clone(),
                port: self.simulator_port,
                scene: None,
            })
        } else {
            RobotMode::Hardware
        };
        Ok(RobotConfig {
            variant: self.variant,
            mode,
            moving_speed: self.moving_speed,
            tick_rate_hz: self.tick_rate_hz,
            collision_poll_interval: Duration::from_millis(self.collision_poll_ms),
            ..RobotConfig::default()
        })
    }
}

/// Return the path to `~/.reachy/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".reachy").join("config.toml")
}

/// Load the config from disk.  Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, ReachyError> {
    load_from(&config_path())
}

pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, ReachyError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(|e| {
        ReachyError::Config(format!("failed to read config at {}: {e}", path.display()))
    })?;
    let mut cfg: Config = toml::from_str(&raw)
        .map_err(|e| ReachyError::Config(format!("failed to parse config: {e}")))?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Apply `REACHY_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `REACHY_VARIANT` | `variant` |
/// | `REACHY_SIMULATED` | `simulated` |
/// | `REACHY_SIMULATOR_HOST` | `simulator_host` |
/// | `REACHY_SIMULATOR_PORT` | `simulator_port` |
/// | `REACHY_TICK_RATE_HZ` | `tick_rate_hz` |
/// | `REACHY_COLLISION_POLL_MS` | `collision_poll_ms` |
/// | `REACHY_MOVING_SPEED` | `moving_speed` |
///
/// Values that fail to parse are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    apply_overrides(cfg, |key| std::env::var(key).ok());
}

/// Apply overrides read through `lookup`, keyed by variable name.
pub(crate) fn apply_overrides(cfg: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("REACHY_VARIANT")
        && let Ok(variant) = v.parse::<RobotVariant>()
    {
        cfg.variant = variant;
    }
    if let Some(v) = lookup("REACHY_SIMULATED")
        && let Ok(simulated) = v.trim().parse::<bool>()
    {
        cfg.simulated = simulated;
    }
    if let Some(v) = lookup("REACHY_SIMULATOR_HOST") {
        cfg.simulator_host = v;
    }
    if let Some(v) = lookup("REACHY_SIMULATOR_PORT")
        && let Ok(port) = v.parse::<u16>()
    {
        cfg.simulator_port = port;
    }
    if let Some(v) = lookup("REACHY_TICK_RATE_HZ")
        && let Ok(rate) = v.parse::<f64>()
    {
        cfg.tick_rate_hz = rate;
    }
    if let Some(v) = lookup("REACHY_COLLISION_POLL_MS")
        && let Ok(ms) = v.parse::<u64>()
    {
        cfg.collision_poll_ms = ms;
    }
    if let Some(v) = lookup("REACHY_MOVING_SPEED")
        && let Ok(speed) = v.parse::<f32>()
    {
        cfg.moving_speed = speed;
    }
}

/// Save the config to disk, creating `~/.reachy/` if necessary.
pub fn save(cfg: &Config) -> Result<(), ReachyError> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), ReachyError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            ReachyError::Config(format!("failed to create config directory: {e}"))
        })?;
    }
    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| ReachyError::Config(format!("failed to serialize config: {e}")))?;
    fs::write(path, raw).map_err(|e| {
        ReachyError::Config(format!("failed to write config at {}: {e}", path.display()))
    })
}
