//! # Riposte Core
//!
//! Server-authoritative action execution engine with a client prediction mirror.
//!
//! This crate turns a request to perform an ability ("swing sword", "fire
//! arrow", "charge a shield") into a time-phased sequence of gameplay effects,
//! and mirrors the same timing on clients so input feels instantaneous.
//!
//! ## Architecture
//!
//! - **Requests and definitions**: [`request::ActionRequest`] describes one
//!   play-through; [`definition::ActionDefinition`] holds the immutable
//!   per-ability constants, loaded once into a [`definition::DefinitionTable`].
//! - **Behaviors**: one [`behavior::ActionBehavior`] variant per
//!   [`definition::LogicKind`], built by a [`behavior::BehaviorRegistry`].
//! - **Server player**: [`server_player::ServerActionPlayer`] owns the per-entity
//!   queue, the blocking slot, background actions, buffs and notifications.
//! - **Client player**: [`client::ClientActionPlayer`] plays visual-only
//!   mirrors, reconciling anticipated and confirmed instances.
//! - **Collaborators**: the engine only talks to the world through the traits in
//!   [`world`]. [`arena::Arena`] is a deterministic in-memory implementation and
//!   [`simulation::Simulation`] is a fixed-step host built on it.
//!
//! ## Usage
//!
//! ```
//! use std::sync::Arc;
//! use glam::Vec3;
//! use riposte_core::definition::{ActionDefinition, DefinitionTable, LogicKind};
//! use riposte_core::entity::EntityTag;
//! use riposte_core::request::{ActionRequest, ActionType};
//! use riposte_core::simulation::Simulation;
//!
//! let mut table = DefinitionTable::new();
//! table
//!     .insert(ActionDefinition {
//!         amount: 10,
//!         range: 3.0,
//!         duration_seconds: 1.0,
//!         exec_time_seconds: 0.5,
//!         anim: "Attack1".into(),
//!         ..ActionDefinition::new(ActionType::TankBaseAttack, LogicKind::Melee)
//!     })
//!     .unwrap();
//!
//! let mut sim = Simulation::new(7, Arc::new(table));
//! let tank = sim.spawn_character(EntityTag::Hero, Vec3::ZERO, 100);
//! let imp = sim.spawn_character(EntityTag::Npc, Vec3::new(0.0, 0.0, 2.0), 30);
//!
//! sim.request_action(tank, ActionRequest::new(ActionType::TankBaseAttack)).unwrap();
//! sim.run_for(1.0);
//!
//! assert_eq!(sim.arena().hp(imp), Some(20));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod arena;
pub mod behavior;
pub mod behaviors;
pub mod client;
pub mod combat;
pub mod definition;
pub mod entity;
pub mod error;
pub mod events;
pub mod request;
pub mod server_player;
pub mod simulation;
pub mod world;

pub use behavior::{ActionBehavior, ActionContext, ActionCore, BuffableValue, GameplayActivity};
pub use definition::{ActionDefinition, BlockingMode, DefinitionTable, LogicKind};
pub use entity::EntityId;
pub use error::{ActionError, DefinitionError};
pub use request::{ActionRequest, ActionType, RequestId};
pub use server_player::ServerActionPlayer;

/// Fixed simulation timestep in seconds (60 Hz).
pub const FIXED_DT: f32 = 1.0 / 60.0;

#[cfg(test)]
mod tests;
