//! Melee swing.
//!
//! Hit detection runs twice: once at start to pick a provisional target (so
//! clients can show who is being swung at) and once at execution time to find
//! who is actually in reach. The provisional target is preferred if it is
//! still there.

use glam::Vec3;
use tracing::debug;

use crate::behavior::{ActionBehavior, ActionContext, ActionCore};
use crate::combat::{detect_melee_foe, target_layers};
use crate::entity::EntityId;

/// Short-range swing against the foe in front of the owner.
#[derive(Debug, Default)]
pub struct MeleeAction {
    executed: bool,
    provisional: Option<EntityId>,
}

impl MeleeAction {
    fn detect_foe(
        core: &ActionCore,
        ctx: &ActionContext<'_>,
        preferred: Option<EntityId>,
    ) -> Option<EntityId> {
        let owner = ctx.world.entity(core.owner())?;
        let def = core.definition();
        let layers = target_layers(def.is_friendly, owner.is_npc());
        detect_melee_foe(&*ctx.world, &owner, def.range, layers, preferred)
    }
}

impl ActionBehavior for MeleeAction {
    fn start(&mut self, core: &mut ActionCore, ctx: &mut ActionContext<'_>) -> bool {
        let Some(owner) = ctx.world.entity(core.owner()) else {
            return false;
        };
        let hint = core.primary_target().or(owner.target);
        self.provisional = Self::detect_foe(core, ctx, hint);
        if let Some(foe) = self.provisional {
            core.request.target_ids = vec![foe];
        }

        if core.request.direction != Vec3::ZERO {
            ctx.world.set_forward(owner.id, core.request.direction);
        }
        ctx.trigger(owner.id, &core.definition().anim);
        ctx.world.broadcast_action(owner.id, &core.request);
        true
    }

    fn update(&mut self, core: &mut ActionCore, ctx: &mut ActionContext<'_>) -> bool {
        let def = core.definition();
        if !self.executed && core.time_running(ctx.now) >= def.exec_time_seconds {
            self.executed = true;
            match Self::detect_foe(core, ctx, self.provisional) {
                Some(foe) => {
                    let amount = core.definition().amount;
                    ctx.world.receive_hp(foe, Some(core.owner()), -amount);
                }
                None => debug!(entity = %core.owner(), action = %core.action_type(), "swing missed"),
            }
        }
        true
    }
}
