//! Area-of-effect attack at a requested point.

use tracing::debug;

use crate::behavior::{ActionBehavior, ActionContext, ActionCore};
use crate::combat::target_layers;

/// Slack added to the definition range before a far-away aim point is
/// rejected, absorbing client/server position drift.
const RANGE_FUDGE: f32 = 1.0;

/// Damages everything hostile within `radius` of the aim point.
#[derive(Debug, Default)]
pub struct AoeAction {
    executed: bool,
}

impl AoeAction {
    fn perform(core: &ActionCore, ctx: &mut ActionContext<'_>) {
        let Some(owner) = ctx.world.entity(core.owner()) else {
            return;
        };
        let def = core.definition();
        let layers = target_layers(def.is_friendly, owner.is_npc());
        let hits = ctx
            .world
            .overlap_sphere(core.request.position, def.radius, layers);
        for id in hits {
            if ctx.world.entity(id).is_some_and(|e| e.is_damageable()) {
                ctx.world.receive_hp(id, Some(owner.id), -def.amount);
            }
        }
    }
}

impl ActionBehavior for AoeAction {
    fn start(&mut self, core: &mut ActionCore, ctx: &mut ActionContext<'_>) -> bool {
        let Some(owner) = ctx.world.entity(core.owner()) else {
            return false;
        };
        let distance = owner.position.distance(core.request.position);
        if distance > core.definition().range + RANGE_FUDGE {
            debug!(
                entity = %owner.id,
                action = %core.action_type(),
                distance,
                "aim point out of range"
            );
            return false;
        }

        core.request.target_ids.clear();
        ctx.trigger(owner.id, &core.definition().anim);
        ctx.world.broadcast_action(owner.id, &core.request);
        true
    }

    fn update(&mut self, core: &mut ActionCore, ctx: &mut ActionContext<'_>) -> bool {
        if !self.executed && core.time_running(ctx.now) >= core.definition().exec_time_seconds {
            self.executed = true;
            Self::perform(core, ctx);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;
    use crate::request::{ActionRequest, ActionType};
    use crate::tests::helpers::{aoe_def, Harness, Rig};
    use glam::Vec3;

    #[test]
    fn out_of_range_point_is_declined_silently() {
        let mut h = Harness::new();
        let archer = h.hero(Vec3::ZERO);
        let imp = h.npc(Vec3::new(0.0, 0.0, 10.0));
        let request =
            ActionRequest::new(ActionType::ArcherVolley).with_position(Vec3::new(0.0, 0.0, 10.0));
        let mut rig = Rig::new(archer, request, aoe_def());

        assert!(!rig.start(&mut h));
        assert_eq!(h.arena.events().of_kind(EventKind::Broadcast).count(), 0);
        assert_eq!(h.arena.hp(imp), Some(100));
    }

    #[test]
    fn fudge_admits_points_just_past_range() {
        let mut h = Harness::new();
        let archer = h.hero(Vec3::ZERO);
        let request =
            ActionRequest::new(ActionType::ArcherVolley).with_position(Vec3::new(0.0, 0.0, 5.8));
        let mut rig = Rig::new(archer, request, aoe_def());
        assert!(rig.start(&mut h));
    }

    #[test]
    fn damages_hostiles_in_radius_once() {
        let mut h = Harness::new();
        let archer = h.hero(Vec3::ZERO);
        let ally = h.hero(Vec3::new(0.0, 0.0, 4.5));
        let inside = h.npc(Vec3::new(1.0, 0.0, 4.0));
        let outside = h.npc(Vec3::new(0.0, 0.0, 7.0));
        let request = ActionRequest::new(ActionType::ArcherVolley)
            .with_position(Vec3::new(0.0, 0.0, 4.0))
            .with_target(inside);
        let mut rig = Rig::new(archer, request, aoe_def());

        assert!(rig.start(&mut h));
        assert!(rig.core.request.target_ids.is_empty());
        rig.run_for(&mut h, 0.9);

        assert_eq!(h.arena.hp(inside), Some(85));
        assert_eq!(h.arena.hp(outside), Some(100));
        assert_eq!(h.arena.hp(ally), Some(100));
    }
}
