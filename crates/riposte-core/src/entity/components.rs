//! Component storage for entities in the reference world.
//!
//! These structs back [`Arena`](crate::arena::Arena). The action engine never
//! touches them directly; it only sees the [`EntitySnapshot`] an entity
//! produces.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use super::{EntityFlags, EntityId, EntitySnapshot, EntityTag, LifeState};

// =============================================================================
// Transform
// =============================================================================

/// Position and facing of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransformState {
    /// World position.
    pub position: Vec3,
    /// Unit facing direction.
    pub forward: Vec3,
}

impl TransformState {
    /// Creates a transform facing `forward` (normalized, falls back to +Z).
    #[must_use]
    pub fn new(position: Vec3, forward: Vec3) -> Self {
        Self {
            position,
            forward: forward.try_normalize().unwrap_or(Vec3::Z),
        }
    }

    /// Turns to face `point` on the horizontal plane.
    ///
    /// Does nothing when `point` is directly above or below the entity.
    pub fn look_at(&mut self, point: Vec3) {
        let mut direction = point - self.position;
        direction.y = 0.0;
        if let Some(forward) = direction.try_normalize() {
            self.forward = forward;
        }
    }
}

impl Default for TransformState {
    fn default() -> Self {
        Self::new(Vec3::ZERO, Vec3::Z)
    }
}

// =============================================================================
// Vitals
// =============================================================================

/// Hit points and life state of a damageable entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VitalsState {
    /// Current hit points.
    pub hp: i32,
    /// Maximum hit points.
    pub max_hp: i32,
    /// Life state.
    pub life_state: LifeState,
}

impl VitalsState {
    /// Creates full-health vitals.
    #[must_use]
    pub const fn new(max_hp: i32) -> Self {
        Self {
            hp: max_hp,
            max_hp,
            life_state: LifeState::Alive,
        }
    }

    /// Adds `delta` to the hit points, clamped to `[0, max_hp]`.
    ///
    /// # Returns
    ///
    /// The hit points after the change.
    pub fn apply_delta(&mut self, delta: i32) -> i32 {
        self.hp = self.hp.saturating_add(delta).clamp(0, self.max_hp);
        self.hp
    }
}

impl Default for VitalsState {
    fn default() -> Self {
        Self::new(100)
    }
}

// =============================================================================
// Movement
// =============================================================================

/// What an entity's movement controller is currently doing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub enum MovementMode {
    /// Standing still.
    #[default]
    Idle,
    /// Walking to a fixed point.
    PathTo(Vec3),
    /// Walking towards another entity, re-reading its position every tick.
    Follow(EntityId),
    /// Charging forward at a fixed speed; cannot be overridden.
    ForwardCharge {
        /// Speed in m/s.
        speed: f32,
        /// Seconds left.
        remaining: f32,
    },
    /// Being pushed away; cannot be overridden.
    Knockback {
        /// Velocity in m/s.
        velocity: Vec3,
        /// Seconds left.
        remaining: f32,
    },
}

/// Movement controller state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MovementState {
    /// Current mode.
    pub mode: MovementMode,
    /// Walking speed in m/s.
    pub speed: f32,
}

impl MovementState {
    /// Default walking speed in m/s.
    pub const DEFAULT_SPEED: f32 = 5.0;

    /// Returns `true` while charging or being knocked back.
    #[must_use]
    pub const fn is_forced(&self) -> bool {
        matches!(
            self.mode,
            MovementMode::ForwardCharge { .. } | MovementMode::Knockback { .. }
        )
    }

    /// Returns `true` while any movement is in progress.
    #[must_use]
    pub const fn is_moving(&self) -> bool {
        !matches!(self.mode, MovementMode::Idle)
    }
}

impl Default for MovementState {
    fn default() -> Self {
        Self {
            mode: MovementMode::Idle,
            speed: Self::DEFAULT_SPEED,
        }
    }
}

// =============================================================================
// Entity
// =============================================================================

/// An entity stored in the reference world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Identifier.
    pub id: EntityId,
    /// Classification.
    pub tag: EntityTag,
    /// Position and facing.
    pub transform: TransformState,
    /// Hit points, for damageable entities.
    pub vitals: Option<VitalsState>,
    /// Movement controller.
    pub movement: MovementState,
    /// Special properties.
    pub flags: EntityFlags,
    /// Active target of a character.
    pub target: Option<EntityId>,
    /// Object held by a character.
    pub held: Option<EntityId>,
    /// Character holding this object.
    pub held_by: Option<EntityId>,
}

impl Entity {
    /// Creates an entity with no vitals at `position`, facing +Z.
    #[must_use]
    pub fn new(id: EntityId, tag: EntityTag, position: Vec3) -> Self {
        Self {
            id,
            tag,
            transform: TransformState::new(position, Vec3::Z),
            vitals: None,
            movement: MovementState::default(),
            flags: EntityFlags::empty(),
            target: None,
            held: None,
            held_by: None,
        }
    }

    /// Returns the entity's life state (`Alive` for entities without vitals).
    #[must_use]
    pub fn life_state(&self) -> LifeState {
        self.vitals.map_or(LifeState::Alive, |v| v.life_state)
    }

    /// Builds the read-only snapshot handed to the action engine.
    #[must_use]
    pub fn snapshot(&self) -> EntitySnapshot {
        EntitySnapshot {
            id: self.id,
            tag: self.tag,
            position: self.transform.position,
            forward: self.transform.forward,
            life_state: self.life_state(),
            flags: self.flags,
            target: self.target,
            held: self.held,
            held_by: self.held_by,
        }
    }
}
