//! Short behaviors with little state of their own.

use tracing::debug;

use crate::behavior::{ActionBehavior, ActionContext, ActionCore, BuffableValue};
use crate::entity::{EntityId, LifeState};

// =============================================================================
// Revive
// =============================================================================

/// Brings a fainted ally back at execution time.
#[derive(Debug, Default)]
pub struct ReviveAction {
    target: Option<EntityId>,
    exec_fired: bool,
    cancelled: bool,
}

impl ActionBehavior for ReviveAction {
    fn start(&mut self, core: &mut ActionCore, ctx: &mut ActionContext<'_>) -> bool {
        let owner = core.owner();
        let Some(target) = core.primary_target().filter(|&id| ctx.world.entity(id).is_some()) else {
            debug!(entity = %owner, "revive declined: target missing");
            return false;
        };
        self.target = Some(target);
        ctx.trigger(owner, &core.definition().anim);
        true
    }

    fn update(&mut self, core: &mut ActionCore, ctx: &mut ActionContext<'_>) -> bool {
        if self.exec_fired || core.time_running(ctx.now) < core.definition().exec_time_seconds {
            return true;
        }
        self.exec_fired = true;

        let fainted = self
            .target
            .and_then(|id| ctx.world.entity(id))
            .filter(|t| t.life_state == LifeState::Fainted);
        match fainted {
            Some(target) => {
                ctx.world
                    .revive(target.id, Some(core.owner()), core.definition().amount);
                true
            }
            None => {
                debug!(entity = %core.owner(), "revive target is not fainted");
                self.cancel(core, ctx);
                false
            }
        }
    }

    fn cancel(&mut self, core: &mut ActionCore, ctx: &mut ActionContext<'_>) {
        if !self.cancelled {
            self.cancelled = true;
            ctx.trigger(core.owner(), &core.definition().anim2);
        }
    }
}

// =============================================================================
// Stunned
// =============================================================================

/// Helpless state; damage taken is multiplied by `amount`.
#[derive(Debug)]
pub struct StunnedAction;

impl ActionBehavior for StunnedAction {
    fn start(&mut self, core: &mut ActionCore, ctx: &mut ActionContext<'_>) -> bool {
        ctx.trigger(core.owner(), &core.definition().anim);
        true
    }

    fn update(&mut self, _core: &mut ActionCore, _ctx: &mut ActionContext<'_>) -> bool {
        true
    }

    fn cancel(&mut self, core: &mut ActionCore, ctx: &mut ActionContext<'_>) {
        ctx.trigger(core.owner(), &core.definition().anim2);
    }

    #[allow(clippy::cast_precision_loss)]
    fn buff_value(&self, core: &ActionCore, _now: f32, kind: BuffableValue, value: &mut f32) {
        if kind == BuffableValue::PercentDamageReceived {
            *value *= core.definition().amount as f32;
        }
    }
}

// =============================================================================
// Emote
// =============================================================================

/// Plays an animation for the action's duration.
#[derive(Debug)]
pub struct EmoteAction;

impl ActionBehavior for EmoteAction {
    fn start(&mut self, core: &mut ActionCore, ctx: &mut ActionContext<'_>) -> bool {
        ctx.trigger(core.owner(), &core.definition().anim);
        true
    }

    fn update(&mut self, _core: &mut ActionCore, _ctx: &mut ActionContext<'_>) -> bool {
        true
    }

    fn cancel(&mut self, core: &mut ActionCore, ctx: &mut ActionContext<'_>) {
        ctx.trigger(core.owner(), &core.definition().anim2);
    }
}
