//! Throwing a spawned object.

use glam::Vec3;
use tracing::debug;

use crate::behavior::{ActionBehavior, ActionContext, ActionCore};

/// Thrown objects leave one meter ahead of the thrower, this far up.
const RELEASE_HEIGHT: f32 = 2.0;

/// Throws `spawns[0]` (or the first projectile's prefab) at execution time.
#[derive(Debug, Default)]
pub struct TossAction {
    thrown: bool,
}

impl TossAction {
    fn throw(&mut self, core: &ActionCore, ctx: &mut ActionContext<'_>) {
        if self.thrown {
            return;
        }
        self.thrown = true;

        let def = core.definition();
        let Some(prefab) = def
            .spawns
            .first()
            .or_else(|| def.projectiles.first().map(|p| &p.prefab))
        else {
            return;
        };
        let Some(owner) = ctx.world.entity(core.owner()) else {
            return;
        };
        let origin = owner.position + owner.forward + Vec3::Y * RELEASE_HEIGHT;
        debug!(entity = %owner.id, prefab = %prefab, "tossing");
        ctx.world.toss(owner.id, prefab, origin, owner.forward);
    }
}

impl ActionBehavior for TossAction {
    fn start(&mut self, core: &mut ActionCore, ctx: &mut ActionContext<'_>) -> bool {
        let owner = core.owner();
        if let Some(target) = core.primary_target().and_then(|id| ctx.world.entity(id)) {
            ctx.world.look_at(owner, target.position);
        }
        ctx.trigger(owner, &core.definition().anim);
        ctx.world.broadcast_action(owner, &core.request);
        true
    }

    fn update(&mut self, core: &mut ActionCore, ctx: &mut ActionContext<'_>) -> bool {
        if core.time_running(ctx.now) >= core.definition().exec_time_seconds {
            self.throw(core, ctx);
        }
        true
    }
}
