//! `reachy` – bring up a robot and run its control loop.
//!
//! The binary:
//!
//! 1. installs the `tracing` subscriber (see `reachy_runtime::telemetry`);
//! 2. loads `~/.reachy/config.toml`, writing the defaults on first run;
//! 3. sets up the configured variant with in-process arm motors and, in
//!    simulated mode, an in-process simulator;
//! 4. starts the `idle` primitive and the fixed-rate control loop;
//! 5. prints a status line once per second until Ctrl-C.

mod config;

use std::error::Error;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::SecondsFormat;
use colored::Colorize;
use nalgebra::Vector3;
use reachy_hal::sim::ARM_MOTORS;
use reachy_hal::{SimBus, SimSimulator};
use reachy_kernel::{HoldPosture, StandardPrimitive};
use reachy_kinematics::Joint;
use reachy_runtime::{ControlLoop, Robot, RobotBuilder, init_tracing};
use reachy_types::CommandVector;
use tracing::{info, warn};

const STATUS_PERIOD: Duration = Duration::from_secs(1);

fn main() -> ExitCode {
    let _tracing = init_tracing("reachy");

    print_banner();

    let cfg = match config::load() {
        Ok(Some(cfg)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Ok(None) => first_run_config(),
        Err(e) => {
            eprintln!("{}: {e}", "Config error".red());
            return ExitCode::FAILURE;
        }
    };

    match run(cfg) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}: {e}", "Error".red().bold());
            ExitCode::FAILURE
        }
    }
}

/// Defaults plus environment overrides, saved so the next run finds a file.
fn first_run_config() -> config::Config {
    let mut cfg = config::Config::default();
    config::apply_env_overrides(&mut cfg);
    match config::save(&cfg) {
        Ok(()) => println!(
            "  {} Default config written to {}",
            "✓".green().bold(),
            config::config_path().display().to_string().bold()
        ),
        Err(e) => warn!(error = %e, "could not write default config"),
    }
    cfg
}

fn run(cfg: config::Config) -> Result<(), Box<dyn Error>> {
    let robot_config = cfg.to_robot_config()?;
    if !cfg.simulated {
        warn!("no physical motor drivers are available; driving in-process motors");
    }

    let robot = RobotBuilder::new(robot_config, SimBus::new().with_arm().build())
        .joints(arm_joints())
        .standard_primitive(StandardPrimitive::Idle, Box::new(HoldPosture::new(rest_posture())))
        .simulator(Box::new(SimSimulator::new()))
        .build()?;
    robot.with_manager(|m| m.start(StandardPrimitive::Idle.name()))?;
    let robot = Arc::new(robot);

    println!(
        "  {} {} is up ({}), tick {:?}\n",
        "✓".green().bold(),
        robot.variant().to_string().bold(),
        if robot.is_simulated() { "simulated" } else { "hardware" },
        robot.tick_period()
    );

    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = Arc::clone(&shutdown);
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – stopping primitives …".yellow().bold());
        shutdown_clone.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "failed to install Ctrl-C handler; stop the process externally");
    }

    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    let ticks = runtime.block_on(async {
        let control = ControlLoop::new(Arc::clone(&robot)).spawn(Arc::clone(&shutdown));

        let mut status = tokio::time::interval(STATUS_PERIOD);
        status.tick().await;
        while !shutdown.load(Ordering::SeqCst) {
            status.tick().await;
            print_status(&robot);
        }
        control.await
    })?;

    info!(ticks, "reachy stopped");
    println!("{}", "  ✓ Exiting.".green());
    Ok(())
}

fn print_status(robot: &Robot) {
    let combined = robot.with_manager(|m| m.combined_command().clone());
    let command = serde_json::to_string(&combined).unwrap_or_else(|_| "?".to_string());
    let collision = match robot.last_collision() {
        Some(record) => record
            .timestamp
            .to_rfc3339_opts(SecondsFormat::Millis, true)
            .red()
            .to_string(),
        None if robot.is_simulated() => "none".dimmed().to_string(),
        None => "n/a".dimmed().to_string(),
    };
    let active = robot.with_manager(|m| m.active_names()).join(", ");
    println!(
        "  [{}] command {}  last collision {}",
        active.cyan(),
        command,
        collision
    );
}

/// Arm geometry shared by both variants; only the tip differs.
fn arm_joints() -> Vec<Joint> {
    vec![
        Joint::revolute("shoulder_pitch", Vector3::zeros(), Vector3::y()),
        Joint::revolute("shoulder_roll", Vector3::zeros(), Vector3::x()),
        Joint::revolute("arm_yaw", Vector3::zeros(), Vector3::z()),
        Joint::revolute("elbow_pitch", Vector3::new(0.0, 0.0, -0.28), Vector3::y()),
        Joint::revolute("forearm_yaw", Vector3::zeros(), Vector3::z()),
        Joint::revolute("wrist_pitch", Vector3::new(0.0, 0.0, -0.25), Vector3::y()),
        Joint::revolute("wrist_roll", Vector3::new(0.0, 0.0, -0.0325), Vector3::x()),
    ]
}

/// Arm hanging down with the elbow slightly bent.
fn rest_posture() -> CommandVector {
    ARM_MOTORS
        .iter()
        .map(|&motor| (motor, if motor == "elbow_pitch" { -20.0 } else { 0.0 }))
        .collect()
}

fn print_banner() {
    println!();
    println!("{}", "  ┌──────────────────────────────┐".bold().cyan());
    println!("{}", "  │            Reachy            │".bold().cyan());
    println!("{}", "  └──────────────────────────────┘".bold().cyan());
    println!();
}
