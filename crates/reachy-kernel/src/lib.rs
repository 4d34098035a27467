//! `reachy-kernel` – arbitration and safety monitoring.
//!
//! # Modules
//!
//! - [`primitive`] – the [`Primitive`][primitive::Primitive] output contract,
//!   its [`Lifecycle`][primitive::Lifecycle] state machine, and the canonical
//!   [`StandardPrimitive`][primitive::StandardPrimitive] names.
//! - [`primitive_manager`] – [`PrimitiveManager`][primitive_manager::PrimitiveManager]:
//!   owns attached primitives and reduces the proposals of every running one
//!   into a single per-motor command each tick, by summation.
//! - [`collision_monitor`] – [`CollisionMonitor`][collision_monitor::CollisionMonitor]:
//!   the always-on background loop that polls the simulator's collision
//!   sensor and records hits into a bounded
//!   [`CollisionHistory`][collision_monitor::CollisionHistory].

pub mod collision_monitor;
pub mod primitive;
pub mod primitive_manager;
mod worker;

pub use collision_monitor::{
    CollisionHistory, CollisionMonitor, CollisionSnapshot, DEFAULT_POLL_INTERVAL,
    RECENT_COLLISION_CAPACITY,
};
pub use primitive::{HoldPosture, Lifecycle, Primitive, StandardPrimitive};
pub use primitive_manager::{DEFAULT_TICK_BUDGET, HOOK_TIMEOUT, PrimitiveManager, TickReport};
