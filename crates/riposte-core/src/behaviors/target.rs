//! Active target selection.
//!
//! Not an ability: the result of a player selecting a character, or of the
//! player synthesizing one in front of a targeted request. It runs until the
//! target stops being valid. A request without a target clears the selection.

use crate::behavior::{ActionBehavior, ActionContext, ActionCore};
use crate::definition::LogicKind;
use crate::entity::EntityId;

/// Holds the owner's active target.
#[derive(Debug, Default)]
pub struct TargetAction {
    target: Option<EntityId>,
}

impl TargetAction {
    fn face(ctx: &mut ActionContext<'_>, owner: EntityId, target: EntityId) {
        if let Some(snapshot) = ctx.world.entity(target) {
            ctx.world.look_at(owner, snapshot.position);
        }
    }

    fn target_is_valid(&self, ctx: &ActionContext<'_>) -> bool {
        self.target
            .and_then(|id| ctx.world.entity(id))
            .is_some_and(|t| t.is_valid_target())
    }
}

impl ActionBehavior for TargetAction {
    fn start(&mut self, core: &mut ActionCore, ctx: &mut ActionContext<'_>) -> bool {
        let owner = core.owner();
        ctx.world.set_target(owner, None);
        ctx.cancel_other_actions(LogicKind::Target);

        self.target = core.primary_target();
        if !self.target_is_valid(ctx) {
            return false;
        }
        let Some(target) = self.target else {
            return false;
        };
        ctx.world.set_target(owner, Some(target));
        Self::face(ctx, owner, target);
        ctx.world.broadcast_action(owner, &core.request);
        true
    }

    fn update(&mut self, core: &mut ActionCore, ctx: &mut ActionContext<'_>) -> bool {
        let valid = self.target_is_valid(ctx);
        let owner = core.owner();
        if valid && ctx.running_action_count() == 1 && !ctx.world.is_moving(owner) {
            if let Some(target) = self.target {
                Self::face(ctx, owner, target);
            }
        }
        valid
    }

    fn cancel(&mut self, core: &mut ActionCore, ctx: &mut ActionContext<'_>) {
        let owner = core.owner();
        let current = ctx.world.entity(owner).and_then(|o| o.target);
        if current.is_some() && current == self.target {
            ctx.world.set_target(owner, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behavior::{InstanceId, PlayerCommand};
    use crate::request::{ActionRequest, ActionType};
    use crate::tests::helpers::{target_def, Harness, Rig};
    use crate::world::{CharacterControl, MovementController};
    use glam::Vec3;

    fn owner_target(h: &Harness, id: EntityId) -> Option<EntityId> {
        h.arena.snapshot(id).and_then(|s| s.target)
    }

    #[test]
    fn selects_and_faces_the_target() {
        let mut h = Harness::new();
        let tank = h.hero(Vec3::ZERO);
        let imp = h.npc(Vec3::new(3.0, 0.0, 0.0));
        let request = ActionRequest::new(ActionType::GeneralTarget).with_target(imp);
        let mut rig = Rig::new(tank, request, target_def());

        assert!(rig.start(&mut h));
        assert_eq!(owner_target(&h, tank), Some(imp));
        assert!((h.arena.snapshot(tank).unwrap().forward - Vec3::X).length() < 1e-5);
        assert_eq!(
            h.commands,
            vec![PlayerCommand::CancelByLogic {
                logic: LogicKind::Target,
                cancel_all: true,
                except: Some(InstanceId::new(0)),
            }]
        );
    }

    #[test]
    fn empty_request_clears_the_selection() {
        let mut h = Harness::new();
        let tank = h.hero(Vec3::ZERO);
        let imp = h.npc(Vec3::new(3.0, 0.0, 0.0));
        h.arena.set_target(tank, Some(imp));

        let mut rig = Rig::new(tank, ActionRequest::new(ActionType::GeneralTarget), target_def());
        assert!(!rig.start(&mut h));
        assert_eq!(owner_target(&h, tank), None);
    }

    #[test]
    fn ends_when_the_target_dies() {
        let mut h = Harness::new();
        let tank = h.hero(Vec3::ZERO);
        let imp = h.npc(Vec3::new(3.0, 0.0, 0.0));
        let request = ActionRequest::new(ActionType::GeneralTarget).with_target(imp);
        let mut rig = Rig::new(tank, request, target_def());

        assert!(rig.start(&mut h));
        assert!(!rig.run_for(&mut h, 1.0));
        h.arena.apply_hp(imp, Some(tank), -100);
        assert!(!rig.step(&mut h));
        rig.end(&mut h);
        assert_eq!(owner_target(&h, tank), None);
    }

    #[test]
    fn idle_owner_keeps_facing_a_moving_target() {
        let mut h = Harness::new();
        let tank = h.hero(Vec3::ZERO);
        let imp = h.npc(Vec3::new(3.0, 0.0, 0.0));
        let request = ActionRequest::new(ActionType::GeneralTarget).with_target(imp);
        let mut rig = Rig::new(tank, request, target_def());

        assert!(rig.start(&mut h));
        h.arena.teleport(imp, Vec3::new(0.0, 0.0, -3.0));
        assert!(rig.step(&mut h));
        assert!((h.arena.snapshot(tank).unwrap().forward + Vec3::Z).length() < 1e-5);
    }

    #[test]
    fn cancel_keeps_a_newer_selection() {
        let mut h = Harness::new();
        let tank = h.hero(Vec3::ZERO);
        let imp = h.npc(Vec3::new(3.0, 0.0, 0.0));
        let other = h.npc(Vec3::new(-3.0, 0.0, 0.0));
        let request = ActionRequest::new(ActionType::GeneralTarget).with_target(imp);
        let mut rig = Rig::new(tank, request, target_def());

        assert!(rig.start(&mut h));
        h.arena.set_target(tank, Some(other));
        rig.cancel(&mut h);
        assert_eq!(owner_target(&h, tank), Some(other));
    }
}
