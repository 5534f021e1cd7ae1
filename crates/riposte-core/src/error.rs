//! Error types for the action engine.
//!
//! Declined actions and vanished targets are ordinary outcomes and never
//! surface here. These errors cover misconfiguration: a request for an
//! ability with no definition, or a definition whose data cannot drive its
//! logic.

use thiserror::Error;

use crate::definition::LogicKind;
use crate::entity::EntityId;
use crate::request::ActionType;

/// Errors raised while turning a request into a running behavior.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActionError {
    /// No definition was loaded for the requested type.
    #[error("no definition loaded for action type {0}")]
    MissingDefinition(ActionType),

    /// The entity has no action player.
    #[error("entity {0} has no action player")]
    UnknownEntity(EntityId),

    /// A name did not match any action type.
    #[error("unknown action type `{0}`")]
    UnknownActionType(String),

    /// No behavior constructor is registered for the logic kind.
    #[error("no behavior registered for logic {0}")]
    NoConstructor(LogicKind),

    /// The logic launches projectiles but the definition lists none.
    #[error("action {action} has no projectiles")]
    MissingProjectiles {
        /// Offending action type.
        action: ActionType,
    },

    /// A charged launcher needs more projectile tiers than were listed.
    #[error("action {action} needs at least {required} projectile tiers, found {found}")]
    TooFewProjectileTiers {
        /// Offending action type.
        action: ActionType,
        /// Minimum number of tiers.
        required: usize,
        /// Number of tiers listed.
        found: usize,
    },

    /// The logic throws a spawned object but the definition lists none.
    #[error("action {action} has nothing to spawn")]
    MissingSpawns {
        /// Offending action type.
        action: ActionType,
    },
}

/// Errors raised while loading or validating a definition table.
#[derive(Debug, Error)]
pub enum DefinitionError {
    /// The JSON document could not be parsed.
    #[error("failed to parse action definitions: {0}")]
    Parse(#[from] serde_json::Error),

    /// Two definitions share an action type.
    #[error("duplicate definition for action type {0}")]
    Duplicate(ActionType),

    /// A definition has out-of-range values.
    #[error("invalid definition for {action}: {reason}")]
    Invalid {
        /// Offending action type.
        action: ActionType,
        /// What is wrong with it.
        reason: String,
    },

    /// A definition cannot drive its logic.
    #[error(transparent)]
    Action(#[from] ActionError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_action() {
        let err = ActionError::TooFewProjectileTiers {
            action: ActionType::ArcherChargedShot,
            required: 2,
            found: 1,
        };
        assert_eq!(
            err.to_string(),
            "action ArcherChargedShot needs at least 2 projectile tiers, found 1"
        );
    }

    #[test]
    fn action_errors_convert_transparently() {
        let err: DefinitionError = ActionError::MissingDefinition(ActionType::Stun).into();
        assert_eq!(err.to_string(), "no definition loaded for action type Stun");
    }
}
