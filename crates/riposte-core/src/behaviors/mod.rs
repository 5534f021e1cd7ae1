//! Built-in ability behaviors, one per [`LogicKind`].
//!
//! - [`MeleeAction`]: swing at the foe in front
//! - [`AoeAction`]: area attack at a point
//! - [`ChaseAction`]: walk into range of a target
//! - [`ChargedShieldAction`], [`ChargedLaunchAction`]: hold to charge
//! - [`LaunchProjectileAction`], [`FxProjectileAction`]: ranged attacks
//! - [`TrampleAction`]: forward charge through everything in the way
//! - [`DashAttackAction`]: teleport and strike
//! - [`StealthAction`], [`StunnedAction`], [`EmoteAction`]: states and cosmetics
//! - [`TargetAction`], [`ReviveAction`], [`TossAction`], [`PickUpAction`]
//!
//! # Registration
//!
//! [`BehaviorRegistry::standard()`](crate::behavior::BehaviorRegistry::standard)
//! calls [`register_standard`], which maps every logic kind to the constructor
//! of its behavior. Constructors re-check the definition's data requirements so
//! a misconfigured definition fails before `start`.

mod aoe;
mod charged;
mod chase;
mod dash;
mod melee;
mod pick_up;
mod projectile;
mod simple;
mod stealth;
mod target;
mod toss;
mod trample;

pub use aoe::AoeAction;
pub use charged::{ChargedLaunchAction, ChargedShieldAction};
pub use chase::ChaseAction;
pub use dash::DashAttackAction;
pub use melee::MeleeAction;
pub use pick_up::PickUpAction;
pub use projectile::{FxProjectileAction, LaunchProjectileAction};
pub use simple::{EmoteAction, ReviveAction, StunnedAction};
pub use stealth::StealthAction;
pub use target::TargetAction;
pub use toss::TossAction;
pub use trample::TrampleAction;

use crate::behavior::{ActionBehavior, BehaviorRegistry};
use crate::definition::{ActionDefinition, LogicKind};
use crate::error::ActionError;

fn boxed<B: ActionBehavior + 'static>(behavior: B) -> Result<Box<dyn ActionBehavior>, ActionError> {
    Ok(Box::new(behavior))
}

fn checked(definition: &ActionDefinition) -> Result<(), ActionError> {
    definition.check_requirements()
}

/// Registers a constructor for every built-in logic kind.
pub fn register_standard(registry: &mut BehaviorRegistry) {
    registry.register(LogicKind::Melee, |_| boxed(MeleeAction::default()));
    registry.register(LogicKind::AoE, |_| boxed(AoeAction::default()));
    registry.register(LogicKind::Chase, |_| boxed(ChaseAction::default()));
    registry.register(LogicKind::ChargedShield, |_| {
        boxed(ChargedShieldAction::default())
    });
    registry.register(LogicKind::ChargedLaunchProjectile, |def| {
        checked(def)?;
        boxed(ChargedLaunchAction::default())
    });
    registry.register(LogicKind::RangedTargeted, |def| {
        checked(def)?;
        boxed(LaunchProjectileAction::default())
    });
    registry.register(LogicKind::RangedFxTargeted, |def| {
        checked(def)?;
        boxed(FxProjectileAction::default())
    });
    registry.register(LogicKind::Trample, |_| boxed(TrampleAction::default()));
    registry.register(LogicKind::DashAttack, |_| boxed(DashAttackAction::default()));
    registry.register(LogicKind::StealthMode, |_| boxed(StealthAction::default()));
    registry.register(LogicKind::Revive, |_| boxed(ReviveAction::default()));
    registry.register(LogicKind::Stunned, |_| boxed(StunnedAction));
    registry.register(LogicKind::Emote, |_| boxed(EmoteAction));
    registry.register(LogicKind::Target, |_| boxed(TargetAction::default()));
    registry.register(LogicKind::Toss, |def| {
        checked(def)?;
        boxed(TossAction::default())
    });
    registry.register(LogicKind::PickUp, |_| boxed(PickUpAction::default()));
}
