//! Teleporting strike.
//!
//! The destination is fixed at start and the dasher faces it. The teleport
//! and the hit both happen in `end`, so a cancelled dash never moves. Once
//! past execution time the dasher is immune to damage.

use glam::Vec3;

use crate::behavior::{ActionBehavior, ActionContext, ActionCore, BuffableValue};
use crate::combat::{dash_destination, detect_melee_foe, target_layers};
use crate::world::CancelScope;

/// Dashes to the requested point and strikes on arrival.
#[derive(Debug, Default)]
pub struct DashAttackAction {
    destination: Vec3,
}

impl DashAttackAction {
    fn strike(core: &ActionCore, ctx: &mut ActionContext<'_>) {
        let Some(owner) = ctx.world.entity(core.owner()) else {
            return;
        };
        let def = core.definition();
        let layers = target_layers(def.is_friendly, owner.is_npc());
        let foe = detect_melee_foe(&*ctx.world, &owner, def.radius, layers, core.primary_target());
        if let Some(foe) = foe {
            ctx.world.receive_hp(foe, Some(owner.id), -def.amount);
        }
    }
}

impl ActionBehavior for DashAttackAction {
    fn start(&mut self, core: &mut ActionCore, ctx: &mut ActionContext<'_>) -> bool {
        let Some(owner) = ctx.world.entity(core.owner()) else {
            return false;
        };
        let range = core.definition().range;
        self.destination = dash_destination(
            &*ctx.world,
            owner.position,
            owner.forward,
            core.request.position,
            true,
            range,
            range,
        );

        ctx.world.look_at(owner.id, self.destination);
        ctx.trigger(owner.id, &core.definition().anim);
        ctx.world.broadcast_action(owner.id, &core.request);
        true
    }

    fn update(&mut self, _core: &mut ActionCore, _ctx: &mut ActionContext<'_>) -> bool {
        true
    }

    fn end(&mut self, core: &mut ActionCore, ctx: &mut ActionContext<'_>) {
        let owner = core.owner();
        ctx.trigger(owner, &core.definition().anim2);
        ctx.world.teleport(owner, self.destination);
        Self::strike(core, ctx);
    }

    fn cancel(&mut self, core: &mut ActionCore, ctx: &mut ActionContext<'_>) {
        let owner = core.owner();
        ctx.trigger(owner, &core.definition().other_animator_variable);
        ctx.world
            .broadcast_cancel(owner, CancelScope::ByType(core.action_type()));
    }

    fn buff_value(&self, core: &ActionCore, now: f32, kind: BuffableValue, value: &mut f32) {
        if kind == BuffableValue::PercentDamageReceived
            && core.time_running(now) >= core.definition().exec_time_seconds
        {
            *value *= 0.0;
        }
    }
}
