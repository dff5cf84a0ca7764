//! Neon Grid Core -- the simulation engine for a power-grid management
//! game.
//!
//! The player wires generating facilities to an ever-growing town over
//! a dynamic, possibly cyclic network. Power reaches demand sites by a
//! breadth-first dispatch from every operational source; overloaded
//! sources and wires heat up and fail, unpowered customers lose
//! patience and eventually end the game.
//!
//! # Tick Pipeline
//!
//! [`session::Session::advance`] converts wall time to fixed 50 ms
//! ticks through the session time scale; each tick runs:
//!
//! 1. **Events** -- Expire timed events, schedule peak hour, run the
//!    minute-cadence rolls (nuclear, wind, low demand, disasters,
//!    maintenance) and hourly reactor decay.
//! 2. **Dispatch** -- Commercial demand oscillation, battery charge
//!    control, and the BFS power flow over the whole grid.
//! 3. **Thermal** -- Source heat (meltdown ends the game) and wire
//!    heat (burnouts remove the wire and re-dispatch).
//! 4. **Patience** -- Unpowered demand sites drain toward game over,
//!    subject to one-shot grace windows.
//! 5. **Economy** -- Once per game second: income, upkeep, subsidies.
//! 6. **Growth** -- Demand spawning, view expansion, records, and
//!    achievement checks.
//!
//! # Key Types
//!
//! - [`session::Session`] -- A full game: world, money, clocks, events,
//!   progression, and every player command.
//! - [`world::World`] -- Slotmap arena of entities and wires with
//!   insertion-ordered id lists.
//! - [`power`] -- Effective capacity and the BFS dispatch.
//! - [`fixed::Fixed64`] -- Q32.32 fixed-point type; all sim scalars use
//!   it so replays are bit-exact across platforms.
//! - [`save::SaveGame`] -- Versioned JSON save format.

pub mod command;
pub mod config;
pub mod economy;
pub mod entity;
pub mod events;
pub mod fixed;
pub mod geometry;
pub mod id;
pub mod notice;
pub mod power;
pub mod progress;
pub mod rng;
pub mod save;
pub mod session;
pub mod spawning;
pub mod thermal;
pub mod world;

pub use command::{CommandError, FacilityKind};
pub use config::{Config, Difficulty};
pub use fixed::{Fixed64, Millis, TICK_MS, Ticks};
pub use geometry::{Point, ViewExtent};
pub use id::{EntityId, LinkId};
pub use save::{SaveError, SaveGame};
pub use session::{AdvanceReport, GameOverReason, Session, SimEvent, Stats};
