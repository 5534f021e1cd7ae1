//! World event log.
//!
//! The reference world records everything the action engine does to it as a
//! [`WorldEvent`]: replicated broadcasts, animation cues, hit point changes,
//! spawned projectiles. Tests assert against the log and the scenario runner
//! feeds the broadcast events to client mirrors.
//!
//! # Architecture
//!
//! Events are grouped by [`EventKind`] for filtering:
//! - `Broadcast`: what a networked game would send to clients
//! - `Animation`: animator triggers and counters on the server
//! - `Health`: hit point and life state changes
//! - `Character`: target, stealth and held object changes
//! - `Spawn`: projectiles and thrown objects
//!
//! Every event is wrapped in an [`EventRecord`] carrying a monotonically
//! increasing [`EventId`] and the tick it happened on.
//!
//! # Example
//!
//! ```
//! use riposte_core::entity::EntityId;
//! use riposte_core::events::{EventKind, EventLog, WorldEvent};
//!
//! let mut log = EventLog::new();
//! log.push(3, WorldEvent::CuePlayed { entity: EntityId::new(1), cue: "Attack1".into() });
//! log.push(3, WorldEvent::ChargeStopped { entity: EntityId::new(1), percent: 1.0 });
//!
//! assert_eq!(log.of_kind(EventKind::Broadcast).count(), 1);
//! assert_eq!(log.len(), 2);
//! ```

use glam::Vec3;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::entity::{EntityId, LifeState};
use crate::request::{ActionRequest, ActionType};
use crate::world::CancelScope;

// =============================================================================
// Identification
// =============================================================================

/// Unique, monotonically increasing identifier of a recorded event.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EventId(u64);

impl EventId {
    /// Creates a new `EventId`.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventId({})", self.0)
    }
}

// =============================================================================
// Events
// =============================================================================

/// Category of a [`WorldEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// Replicated to clients.
    Broadcast,
    /// Server-side animator state.
    Animation,
    /// Hit points and life state.
    Health,
    /// Target, stealth and held objects.
    Character,
    /// Projectiles and thrown objects.
    Spawn,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Broadcast => write!(f, "Broadcast"),
            Self::Animation => write!(f, "Animation"),
            Self::Health => write!(f, "Health"),
            Self::Character => write!(f, "Character"),
            Self::Spawn => write!(f, "Spawn"),
        }
    }
}

/// Something that happened in the world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WorldEvent {
    /// An action started and was sent to clients.
    ActionPlayed {
        /// Performer.
        entity: EntityId,
        /// The request as broadcast.
        request: ActionRequest,
    },
    /// A charge-up stopped.
    ChargeStopped {
        /// Performer.
        entity: EntityId,
        /// Final charge in `[0, 1]`.
        percent: f32,
    },
    /// Clients were told to cancel visuals.
    ActionsCancelled {
        /// Performer.
        entity: EntityId,
        /// Which visuals.
        scope: CancelScope,
    },
    /// An animation trigger fired.
    CuePlayed {
        /// Animated entity.
        entity: EntityId,
        /// Trigger name.
        cue: String,
    },
    /// An animation trigger was cleared.
    CueReset {
        /// Animated entity.
        entity: EntityId,
        /// Trigger name.
        cue: String,
    },
    /// An integer animator parameter changed.
    AnimatorCounterChanged {
        /// Animated entity.
        entity: EntityId,
        /// Parameter name.
        variable: String,
        /// Value after the change.
        value: i32,
    },
    /// Hit points changed.
    HpChanged {
        /// Entity whose hit points changed.
        target: EntityId,
        /// Who caused it.
        inflicter: Option<EntityId>,
        /// Applied change after buffs.
        delta: i32,
        /// Hit points after the change.
        hp: i32,
    },
    /// Life state changed.
    LifeStateChanged {
        /// Affected entity.
        entity: EntityId,
        /// New state.
        state: LifeState,
    },
    /// Active target changed.
    TargetChanged {
        /// Character whose target changed.
        entity: EntityId,
        /// New target.
        target: Option<EntityId>,
    },
    /// Stealth toggled.
    StealthChanged {
        /// Affected character.
        entity: EntityId,
        /// Whether the character is now hidden.
        stealthed: bool,
    },
    /// An object was picked up.
    ObjectAttached {
        /// Carrier.
        holder: EntityId,
        /// Carried object.
        object: EntityId,
    },
    /// An object was dropped.
    ObjectDetached {
        /// Former carrier.
        holder: EntityId,
        /// Dropped object.
        object: EntityId,
    },
    /// A projectile was launched.
    ProjectileLaunched {
        /// Shooter.
        owner: EntityId,
        /// Prefab name.
        prefab: String,
        /// Launch point.
        origin: Vec3,
        /// Flight direction.
        direction: Vec3,
        /// Damage per victim.
        damage: i32,
    },
    /// An object was thrown.
    ObjectTossed {
        /// Thrower.
        owner: EntityId,
        /// Prefab name.
        prefab: String,
        /// Release point.
        origin: Vec3,
        /// Throw direction.
        forward: Vec3,
    },
}

impl WorldEvent {
    /// Returns the category of this event.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::ActionPlayed { .. } | Self::ChargeStopped { .. } | Self::ActionsCancelled { .. } => {
                EventKind::Broadcast
            }
            Self::CuePlayed { .. } | Self::CueReset { .. } | Self::AnimatorCounterChanged { .. } => {
                EventKind::Animation
            }
            Self::HpChanged { .. } | Self::LifeStateChanged { .. } => EventKind::Health,
            Self::TargetChanged { .. }
            | Self::StealthChanged { .. }
            | Self::ObjectAttached { .. }
            | Self::ObjectDetached { .. } => EventKind::Character,
            Self::ProjectileLaunched { .. } | Self::ObjectTossed { .. } => EventKind::Spawn,
        }
    }

    /// Returns the broadcast request if this is an [`ActionPlayed`](Self::ActionPlayed) event.
    #[must_use]
    pub const fn as_played_action(&self) -> Option<(EntityId, &ActionRequest)> {
        match self {
            Self::ActionPlayed { entity, request } => Some((*entity, request)),
            _ => None,
        }
    }

    /// Returns `true` if this is a broadcast of `action_type` by `entity`.
    #[must_use]
    pub fn is_play_of(&self, entity: EntityId, action_type: ActionType) -> bool {
        matches!(
            self.as_played_action(),
            Some((who, request)) if who == entity && request.action_type == action_type
        )
    }
}

// =============================================================================
// Event Log
// =============================================================================

/// A recorded event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Unique id.
    pub id: EventId,
    /// Tick the event happened on.
    pub tick: u64,
    /// The event.
    pub event: WorldEvent,
}

/// Append-only list of recorded events.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventLog {
    next_id: u64,
    records: Vec<EventRecord>,
}

impl EventLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an event.
    pub fn push(&mut self, tick: u64, event: WorldEvent) -> EventId {
        let id = EventId::new(self.next_id);
        self.next_id += 1;
        self.records.push(EventRecord { id, tick, event });
        id
    }

    /// Iterates over every record in order.
    pub fn iter(&self) -> impl Iterator<Item = &EventRecord> + '_ {
        self.records.iter()
    }

    /// Iterates over records of one kind.
    pub fn of_kind(&self, kind: EventKind) -> impl Iterator<Item = &EventRecord> + '_ {
        self.records.iter().filter(move |r| r.event.kind() == kind)
    }

    /// Iterates over records with an id of at least `from`.
    pub fn since(&self, from: EventId) -> impl Iterator<Item = &EventRecord> + '_ {
        self.records.iter().filter(move |r| r.id >= from)
    }

    /// Id the next recorded event will get.
    #[must_use]
    pub const fn next_id(&self) -> EventId {
        EventId::new(self.next_id)
    }

    /// Removes and returns every record, keeping the id sequence.
    pub fn drain(&mut self) -> Vec<EventRecord> {
        std::mem::take(&mut self.records)
    }

    /// Number of records held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` if no records are held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
