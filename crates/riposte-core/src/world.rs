//! Collaborator contracts between the action engine and the game world.
//!
//! The engine never owns physics, movement, health or networking. Behaviors
//! reach all of them through the traits in this module, bundled behind the
//! [`World`] umbrella trait so a single `&mut dyn World` can travel in the
//! [`ActionContext`](crate::behavior::ActionContext).
//!
//! # Architecture
//!
//! - [`EntityDirectory`]: look up entities by id. Every lookup may fail.
//! - [`SpatialQuery`]: overlap, sweep and line-of-sight queries.
//! - [`MovementController`]: pathing, forced movement and facing.
//! - [`HealthSink`]: hit point changes and revival.
//! - [`CharacterControl`]: active target, stealth and held objects.
//! - [`ActionBroadcast`]: animation cues and replication to clients.
//! - [`ProjectileLauncher`]: spawning projectiles and thrown objects.
//!
//! Any type that implements all seven gets [`World`] for free.
//! [`Arena`](crate::arena::Arena) is the in-memory implementation used by
//! tests and the simulation host.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::behavior::BuffableValue;
use crate::definition::ProjectileInfo;
use crate::entity::{EntityId, EntitySnapshot};
use crate::request::{ActionRequest, ActionType};

bitflags::bitflags! {
    /// Query layers.
    ///
    /// Heroes live on `PCS`; NPCs, breakables and props share `NPCS`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct Layers: u8 {
        /// Player characters.
        const PCS = 1 << 0;
        /// Everything that is not a player character.
        const NPCS = 1 << 1;
    }
}

// =============================================================================
// Value Types
// =============================================================================

/// A contact reported to the blocking behavior while it moves.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Collision {
    /// The entity that was touched.
    pub other: EntityId,
    /// Approximate contact point.
    pub point: Vec3,
}

/// Which client-side visuals a cancel broadcast should stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CancelScope {
    /// Every running visual of the entity.
    All,
    /// Only visuals playing this action type.
    ByType(ActionType),
}

// =============================================================================
// Contracts
// =============================================================================

/// Entity lookup.
pub trait EntityDirectory {
    /// Returns a snapshot of the entity, or `None` if it no longer exists.
    fn entity(&self, id: EntityId) -> Option<EntitySnapshot>;

    /// Returns the entity's buffed value of `kind`, or `None` if the entity has
    /// no action player (objects, despawned characters).
    fn buffed_value(&self, id: EntityId, kind: BuffableValue) -> Option<f32>;
}

/// Spatial queries against entities and static geometry.
pub trait SpatialQuery {
    /// Entities on `layers` whose position lies within `radius` of `center`,
    /// sorted by id.
    fn overlap_sphere(&self, center: Vec3, radius: f32, layers: Layers) -> Vec<EntityId>;

    /// Entities on `layers` inside a box of half-width `half_extent` swept from
    /// `origin` along `direction` for `range` meters, nearest first.
    fn sweep(
        &self,
        origin: Vec3,
        direction: Vec3,
        range: f32,
        half_extent: f32,
        layers: Layers,
    ) -> Vec<EntityId>;

    /// Tests the segment `from -> to` against static geometry.
    ///
    /// # Returns
    ///
    /// The first obstruction point, or `None` when the segment is clear.
    fn raycast(&self, from: Vec3, to: Vec3) -> Option<Vec3>;
}

/// Movement of characters.
pub trait MovementController {
    /// Walks `entity` to a point, replacing its current movement.
    fn set_movement_target(&mut self, entity: EntityId, destination: Vec3);

    /// Walks `entity` towards `target`, tracking it as it moves.
    fn follow_target(&mut self, entity: EntityId, target: EntityId);

    /// Stops any movement of `entity`, forced movement included.
    ///
    /// Callers that must not interrupt a charge or knockback check
    /// [`is_performing_forced_movement`](Self::is_performing_forced_movement)
    /// first.
    fn cancel_move(&mut self, entity: EntityId);

    /// Moves `entity` instantly.
    fn teleport(&mut self, entity: EntityId, position: Vec3);

    /// Turns `entity` to face `point` on the horizontal plane.
    fn look_at(&mut self, entity: EntityId, point: Vec3);

    /// Sets the facing of `entity` directly.
    fn set_forward(&mut self, entity: EntityId, forward: Vec3);

    /// Charges `entity` along its facing for `duration` seconds.
    fn start_forward_charge(&mut self, entity: EntityId, speed: f32, duration: f32);

    /// Pushes `entity` away from `source` for `duration` seconds.
    fn start_knockback(&mut self, entity: EntityId, source: Vec3, speed: f32, duration: f32);

    /// Returns `true` while `entity` is charging or being knocked back.
    fn is_performing_forced_movement(&self, entity: EntityId) -> bool;

    /// Returns `true` while `entity` has any movement in progress.
    fn is_moving(&self, entity: EntityId) -> bool;
}

/// Hit point changes.
pub trait HealthSink {
    /// Applies `delta` hit points to `target` (negative is damage).
    ///
    /// Implementations scale the delta by the target's buffs and notify the
    /// target's action player before applying it.
    fn receive_hp(&mut self, target: EntityId, inflicter: Option<EntityId>, delta: i32);

    /// Brings a fainted character back with `hp` hit points.
    fn revive(&mut self, target: EntityId, inflicter: Option<EntityId>, hp: i32);
}

/// Character state owned by the game rather than by actions.
pub trait CharacterControl {
    /// Sets or clears the active target of `entity`.
    fn set_target(&mut self, entity: EntityId, target: Option<EntityId>);

    /// Enters or leaves stealth.
    fn set_stealthed(&mut self, entity: EntityId, stealthed: bool);

    /// Attaches `object` to `holder`.
    ///
    /// # Returns
    ///
    /// `false` if either entity is missing or `object` is already held.
    fn attach(&mut self, holder: EntityId, object: EntityId) -> bool;

    /// Drops whatever `holder` is carrying.
    fn detach(&mut self, holder: EntityId);
}

/// Animation cues and replication of action state to clients.
pub trait ActionBroadcast {
    /// Fires an animation trigger on `entity`.
    fn play_cue(&mut self, entity: EntityId, cue: &str);

    /// Clears a pending animation trigger on `entity`.
    fn reset_cue(&mut self, entity: EntityId, cue: &str);

    /// Adds `delta` to an integer animator parameter of `entity`.
    fn adjust_animator_counter(&mut self, entity: EntityId, variable: &str, delta: i32);

    /// Sends a started action to every client.
    fn broadcast_action(&mut self, entity: EntityId, request: &ActionRequest);

    /// Tells clients a charge-up stopped at `percent`.
    fn broadcast_charge_stopped(&mut self, entity: EntityId, percent: f32);

    /// Tells clients to cancel visuals of `entity`.
    fn broadcast_cancel(&mut self, entity: EntityId, scope: CancelScope);
}

/// Spawning of projectiles and thrown objects.
pub trait ProjectileLauncher {
    /// Launches a projectile from `origin` along `direction`.
    fn launch_projectile(
        &mut self,
        owner: EntityId,
        projectile: &ProjectileInfo,
        origin: Vec3,
        direction: Vec3,
    );

    /// Throws a spawned object from `origin` along `forward`.
    fn toss(&mut self, owner: EntityId, prefab: &str, origin: Vec3, forward: Vec3);
}

/// Everything a behavior may touch.
pub trait World:
    EntityDirectory
    + SpatialQuery
    + MovementController
    + HealthSink
    + CharacterControl
    + ActionBroadcast
    + ProjectileLauncher
{
}

impl<T> World for T where
    T: EntityDirectory
        + SpatialQuery
        + MovementController
        + HealthSink
        + CharacterControl
        + ActionBroadcast
        + ProjectileLauncher
{
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layers_combine() {
        let both = Layers::PCS | Layers::NPCS;
        assert!(both.contains(Layers::PCS));
        assert!(both.intersects(Layers::NPCS));
        assert!(!Layers::PCS.intersects(Layers::NPCS));
    }

    #[test]
    fn cancel_scope_compares_by_type() {
        assert_eq!(
            CancelScope::ByType(ActionType::Stun),
            CancelScope::ByType(ActionType::Stun)
        );
        assert_ne!(CancelScope::All, CancelScope::ByType(ActionType::Stun));
    }
}
