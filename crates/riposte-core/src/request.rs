//! Action requests: the immutable record of one requested ability instance.
//!
//! An [`ActionRequest`] is built once per input event (or AI decision), sent to
//! the server player, copied into the behavior that plays it, and broadcast
//! back to observing clients. Its [`RequestId`] survives that whole round trip,
//! which is what lets a client match a server broadcast to the copy it already
//! anticipated.
//!
//! # Example
//!
//! ```
//! use glam::Vec3;
//! use riposte_core::entity::EntityId;
//! use riposte_core::request::{ActionRequest, ActionType, RequestId};
//!
//! let request = ActionRequest::new(ActionType::ArcherBaseAttack)
//!     .with_id(RequestId::new(12))
//!     .with_target(EntityId::new(4))
//!     .closing();
//!
//! assert_eq!(request.primary_target(), Some(EntityId::new(4)));
//! assert!(request.should_close);
//! assert!(!request.id.is_server_issued());
//! ```

use glam::Vec3;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::entity::EntityId;
use crate::error::ActionError;

// =============================================================================
// Action Type
// =============================================================================

/// Every ability the game knows about.
///
/// Definitions are keyed by this enum. `GeneralChase`, `GeneralTarget` and
/// `Stun` double as the prototypes the server player synthesizes or chains
/// into.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ActionType {
    /// Tank sword swing.
    TankBaseAttack,
    /// Archer arrow.
    ArcherBaseAttack,
    /// Mage bolt.
    MageBaseAttack,
    /// Rogue dagger swing.
    RogueBaseAttack,
    /// Imp claw swing.
    ImpBaseAttack,
    /// Boss club swing.
    ImpBossBaseAttack,
    /// Walk into range of a target.
    GeneralChase,
    /// Revive a fainted ally.
    GeneralRevive,
    /// Change the active target.
    GeneralTarget,
    /// Emote slot 1.
    Emote1,
    /// Emote slot 2.
    Emote2,
    /// Emote slot 3.
    Emote3,
    /// Emote slot 4.
    Emote4,
    /// Tank area attack.
    TankTestability,
    /// Tank charged shield.
    TankShieldBuff,
    /// Tank shield rush (trample).
    TankShieldRush,
    /// Boss trample.
    ImpBossTrampleAttack,
    /// Stunned state.
    Stun,
    /// Mage heal.
    MageHeal,
    /// Archer charged shot.
    ArcherChargedShot,
    /// Archer volley (area attack).
    ArcherVolley,
    /// Rogue stealth.
    RogueStealthMode,
    /// Rogue dash attack.
    RogueDashAttack,
    /// Imp toss.
    ImpToss,
    /// Pick up a heavy object.
    PickUp,
}

impl ActionType {
    /// Every action type, in declaration order.
    pub const ALL: [Self; 25] = [
        Self::TankBaseAttack,
        Self::ArcherBaseAttack,
        Self::MageBaseAttack,
        Self::RogueBaseAttack,
        Self::ImpBaseAttack,
        Self::ImpBossBaseAttack,
        Self::GeneralChase,
        Self::GeneralRevive,
        Self::GeneralTarget,
        Self::Emote1,
        Self::Emote2,
        Self::Emote3,
        Self::Emote4,
        Self::TankTestability,
        Self::TankShieldBuff,
        Self::TankShieldRush,
        Self::ImpBossTrampleAttack,
        Self::Stun,
        Self::MageHeal,
        Self::ArcherChargedShot,
        Self::ArcherVolley,
        Self::RogueStealthMode,
        Self::RogueDashAttack,
        Self::ImpToss,
        Self::PickUp,
    ];
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl FromStr for ActionType {
    type Err = ActionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|action| action.to_string() == s)
            .ok_or_else(|| ActionError::UnknownActionType(s.to_string()))
    }
}

// =============================================================================
// Request Identity
// =============================================================================

/// Identity of one request, stable from input through server broadcast.
///
/// Clients number their own requests from 1. Requests that were not issued by
/// a client (AI decisions, chained and synthesized actions) arrive
/// [`UNASSIGNED`](Self::UNASSIGNED) and receive an id with the high bit set
/// from the server player, so the two ranges never collide.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct RequestId(u64);

impl RequestId {
    /// Marker for a request that has not been numbered yet.
    pub const UNASSIGNED: Self = Self(0);

    const SERVER_BIT: u64 = 1 << 63;

    /// Creates a client-issued id.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Creates a server-issued id from a per-player serial number.
    #[must_use]
    pub const fn server(serial: u64) -> Self {
        Self(Self::SERVER_BIT | serial)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns `true` if the request has not been numbered yet.
    #[must_use]
    pub const fn is_unassigned(self) -> bool {
        self.0 == 0
    }

    /// Returns `true` for ids minted by a server player.
    #[must_use]
    pub const fn is_server_issued(self) -> bool {
        self.0 & Self::SERVER_BIT != 0
    }
}

impl fmt::Debug for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_server_issued() {
            write!(f, "RequestId(s{})", self.0 & !Self::SERVER_BIT)
        } else {
            write!(f, "RequestId({})", self.0)
        }
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// =============================================================================
// Action Request
// =============================================================================

/// One requested ability instance.
///
/// Behaviors own a mutable copy and may rewrite it before broadcasting (melee
/// narrows its target list, ranged attacks move the aim point to an
/// obstruction).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRequest {
    /// Identity used for client reconciliation.
    #[serde(default)]
    pub id: RequestId,
    /// Which ability to play.
    pub action_type: ActionType,
    /// Requested targets, primary first.
    #[serde(default)]
    pub target_ids: Vec<EntityId>,
    /// Requested world position (aim point, dash destination).
    #[serde(default)]
    pub position: Vec3,
    /// Requested facing direction; zero keeps the current facing.
    #[serde(default)]
    pub direction: Vec3,
    /// Free parameter (chase stopping distance).
    #[serde(default)]
    pub amount: f32,
    /// Walk into range of the target before playing.
    #[serde(default)]
    pub should_close: bool,
    /// Wait behind the current action instead of interrupting it.
    #[serde(default)]
    pub should_queue: bool,
    /// Stop any in-progress walk before playing.
    #[serde(default)]
    pub cancel_movement: bool,
}

impl ActionRequest {
    /// Creates an unnumbered request with no targets.
    #[must_use]
    pub fn new(action_type: ActionType) -> Self {
        Self {
            id: RequestId::UNASSIGNED,
            action_type,
            target_ids: Vec::new(),
            position: Vec3::ZERO,
            direction: Vec3::ZERO,
            amount: 0.0,
            should_close: false,
            should_queue: false,
            cancel_movement: false,
        }
    }

    /// Sets the request id.
    #[must_use]
    pub fn with_id(mut self, id: RequestId) -> Self {
        self.id = id;
        self
    }

    /// Appends a target.
    #[must_use]
    pub fn with_target(mut self, target: EntityId) -> Self {
        self.target_ids.push(target);
        self
    }

    /// Replaces the target list.
    #[must_use]
    pub fn with_targets(mut self, targets: Vec<EntityId>) -> Self {
        self.target_ids = targets;
        self
    }

    /// Sets the requested position.
    #[must_use]
    pub fn with_position(mut self, position: Vec3) -> Self {
        self.position = position;
        self
    }

    /// Sets the requested facing direction.
    #[must_use]
    pub fn with_direction(mut self, direction: Vec3) -> Self {
        self.direction = direction;
        self
    }

    /// Sets the free amount parameter.
    #[must_use]
    pub fn with_amount(mut self, amount: f32) -> Self {
        self.amount = amount;
        self
    }

    /// Marks the request as queued behind the current action.
    #[must_use]
    pub fn queued(mut self) -> Self {
        self.should_queue = true;
        self
    }

    /// Marks the request as needing to close distance first.
    #[must_use]
    pub fn closing(mut self) -> Self {
        self.should_close = true;
        self
    }

    /// Marks the request as cancelling in-progress movement.
    #[must_use]
    pub fn cancelling_movement(mut self) -> Self {
        self.cancel_movement = true;
        self
    }

    /// Returns the first requested target.
    #[must_use]
    pub fn primary_target(&self) -> Option<EntityId> {
        self.target_ids.first().copied()
    }

    /// Returns `true` if both requests would play out identically.
    ///
    /// Compares type, position, direction, amount and targets. Identity and
    /// the queue/close/cancel flags are ignored.
    #[must_use]
    pub fn is_equivalent(&self, other: &Self) -> bool {
        self.action_type == other.action_type
            && self.position == other.position
            && self.direction == other.direction
            && self.amount.to_bits() == other.amount.to_bits()
            && self.target_ids == other.target_ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod action_type_tests {
        use super::*;

        #[test]
        fn parses_display_names() {
            for action in ActionType::ALL {
                assert_eq!(action.to_string().parse::<ActionType>(), Ok(action));
            }
        }

        #[test]
        fn rejects_unknown_names() {
            assert_eq!(
                "DriveArrow".parse::<ActionType>(),
                Err(ActionError::UnknownActionType("DriveArrow".into()))
            );
        }
    }

    mod request_id_tests {
        use super::*;

        #[test]
        fn unassigned_is_zero() {
            assert!(RequestId::UNASSIGNED.is_unassigned());
            assert!(!RequestId::new(1).is_unassigned());
        }

        #[test]
        fn server_ids_never_collide_with_client_ids() {
            let server = RequestId::server(5);
            assert!(server.is_server_issued());
            assert_ne!(server, RequestId::new(5));
            assert!(!RequestId::new(5).is_server_issued());
        }

        #[test]
        fn debug_marks_server_ids() {
            assert_eq!(format!("{:?}", RequestId::server(3)), "RequestId(s3)");
            assert_eq!(format!("{:?}", RequestId::new(3)), "RequestId(3)");
        }
    }

    mod equivalence_tests {
        use super::*;

        #[test]
        fn ignores_identity_and_flags() {
            let a = ActionRequest::new(ActionType::MageBaseAttack)
                .with_id(RequestId::new(1))
                .with_target(EntityId::new(2));
            let b = ActionRequest::new(ActionType::MageBaseAttack)
                .with_id(RequestId::new(9))
                .with_target(EntityId::new(2))
                .queued()
                .closing();
            assert!(a.is_equivalent(&b));
        }

        #[test]
        fn differing_targets_are_not_equivalent() {
            let a = ActionRequest::new(ActionType::MageBaseAttack).with_target(EntityId::new(2));
            let b = ActionRequest::new(ActionType::MageBaseAttack).with_target(EntityId::new(3));
            assert!(!a.is_equivalent(&b));
        }

        #[test]
        fn differing_amounts_are_not_equivalent() {
            let a = ActionRequest::new(ActionType::GeneralChase).with_amount(1.0);
            let b = ActionRequest::new(ActionType::GeneralChase).with_amount(2.0);
            assert!(!a.is_equivalent(&b));
        }
    }

    #[test]
    fn deserializes_with_defaults() {
        let request: ActionRequest =
            serde_json::from_str(r#"{ "action_type": "TankBaseAttack" }"#).unwrap();
        assert_eq!(request.action_type, ActionType::TankBaseAttack);
        assert!(request.id.is_unassigned());
        assert!(request.target_ids.is_empty());
    }
}
