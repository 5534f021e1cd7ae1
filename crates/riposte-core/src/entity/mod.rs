//! Entity identity and the read-only view the action engine has of an entity.
//!
//! The engine never owns entities. It identifies them by [`EntityId`] and asks
//! an [`EntityDirectory`](crate::world::EntityDirectory) for an
//! [`EntitySnapshot`] whenever it needs a pose or a status. A lookup may return
//! `None` at any time (the entity despawned) and every caller treats that as an
//! ordinary outcome.
//!
//! # Example
//!
//! ```
//! use glam::Vec3;
//! use riposte_core::entity::{EntityFlags, EntityId, EntitySnapshot, EntityTag, LifeState};
//!
//! let imp = EntitySnapshot {
//!     id: EntityId::new(3),
//!     tag: EntityTag::Npc,
//!     position: Vec3::new(1.0, 0.0, 2.0),
//!     forward: Vec3::Z,
//!     life_state: LifeState::Alive,
//!     flags: EntityFlags::empty(),
//!     target: None,
//!     held: None,
//!     held_by: None,
//! };
//!
//! assert!(imp.is_npc());
//! assert!(imp.is_damageable());
//! ```

pub mod components;

use glam::Vec3;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::world::Layers;

pub use components::{Entity, MovementMode, MovementState, TransformState, VitalsState};

/// Unique identifier for an entity.
///
/// `EntityId` is a newtype wrapper around `u64`. Identifiers are ordered by
/// their numeric value, which the reference world uses for deterministic
/// iteration.
///
/// # Example
///
/// ```
/// use riposte_core::entity::EntityId;
///
/// let id1 = EntityId::new(1);
/// let id2 = EntityId::new(2);
///
/// assert!(id1 < id2);
/// assert_eq!(id1.as_u64(), 1);
/// ```
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityId(u64);

impl EntityId {
    /// Creates a new `EntityId` from a raw `u64` value.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw `u64` value of this identifier.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({})", self.0)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for EntityId {
    fn from(id: u64) -> Self {
        Self::new(id)
    }
}

impl From<EntityId> for u64 {
    fn from(id: EntityId) -> Self {
        id.0
    }
}

/// Broad classification of an entity.
///
/// # Variants
///
/// - `Hero`: a player-controlled character
/// - `Npc`: an AI-controlled character (imps, the boss)
/// - `Breakable`: a damageable object that is not a character (pots, crystals)
/// - `Prop`: a non-damageable object (heavy items, thrown objects)
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityTag {
    /// Player-controlled character.
    Hero,
    /// AI-controlled character.
    Npc,
    /// Damageable object that is not a character.
    Breakable,
    /// Non-damageable object.
    Prop,
}

impl EntityTag {
    /// Returns `true` for heroes and NPCs.
    #[must_use]
    pub const fn is_character(self) -> bool {
        matches!(self, Self::Hero | Self::Npc)
    }

    /// Returns the query layer this entity lives on.
    ///
    /// Heroes are on the PC layer. Everything else shares the NPC layer, so
    /// player attacks can hit breakables and pick-ups can find props.
    #[must_use]
    pub const fn layer(self) -> Layers {
        match self {
            Self::Hero => Layers::PCS,
            Self::Npc | Self::Breakable | Self::Prop => Layers::NPCS,
        }
    }
}

impl fmt::Display for EntityTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hero => write!(f, "Hero"),
            Self::Npc => write!(f, "Npc"),
            Self::Breakable => write!(f, "Breakable"),
            Self::Prop => write!(f, "Prop"),
        }
    }
}

/// Life state of a damageable entity.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LifeState {
    /// Able to act and be damaged.
    #[default]
    Alive,
    /// Knocked out; heroes can be revived from this state.
    Fainted,
    /// Permanently out (NPCs, broken breakables).
    Dead,
}

impl fmt::Display for LifeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Alive => write!(f, "Alive"),
            Self::Fainted => write!(f, "Fainted"),
            Self::Dead => write!(f, "Dead"),
        }
    }
}

bitflags::bitflags! {
    /// Special per-entity properties.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct EntityFlags: u8 {
        /// A trampler that runs into this entity becomes stunned.
        const STUN_ON_TRAMPLE = 1 << 0;
        /// Damage inflicted by heroes is ignored.
        const NOT_DAMAGED_BY_PLAYERS = 1 << 1;
        /// Can be picked up.
        const HEAVY = 1 << 2;
        /// Hidden from other players.
        const STEALTHED = 1 << 3;
    }
}

/// Read-only view of an entity at the current tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    /// Entity identifier.
    pub id: EntityId,
    /// Classification.
    pub tag: EntityTag,
    /// World position.
    pub position: Vec3,
    /// Unit facing direction.
    pub forward: Vec3,
    /// Life state (props are always `Alive`).
    pub life_state: LifeState,
    /// Special properties.
    pub flags: EntityFlags,
    /// The character's active target, if any.
    pub target: Option<EntityId>,
    /// The object this character is holding, if any.
    pub held: Option<EntityId>,
    /// The character holding this object, if any.
    pub held_by: Option<EntityId>,
}

impl EntitySnapshot {
    /// Returns `true` for heroes and NPCs.
    #[must_use]
    pub const fn is_character(&self) -> bool {
        self.tag.is_character()
    }

    /// Returns `true` for AI-controlled characters.
    #[must_use]
    pub const fn is_npc(&self) -> bool {
        matches!(self.tag, EntityTag::Npc)
    }

    /// Returns `true` if the entity can currently take damage.
    #[must_use]
    pub fn is_damageable(&self) -> bool {
        !matches!(self.tag, EntityTag::Prop) && self.life_state == LifeState::Alive
    }

    /// Returns `true` if the entity can be selected as an active target.
    ///
    /// Allies are valid targets too, since friendly abilities need them.
    #[must_use]
    pub fn is_valid_target(&self) -> bool {
        self.is_damageable()
    }

    /// Squared distance to a point.
    #[must_use]
    pub fn distance_squared(&self, point: Vec3) -> f32 {
        self.position.distance_squared(point)
    }
}
