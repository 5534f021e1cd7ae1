//! Rogue stealth.
//!
//! Releases the blocking slot at execution time and hides the owner until it
//! attacks, gets hit or the action is cancelled.

use tracing::debug;

use crate::behavior::{ActionBehavior, ActionContext, ActionCore, GameplayActivity};
use crate::world::CancelScope;

/// Keeps the owner stealthed in the background.
#[derive(Debug, Default)]
pub struct StealthAction {
    started: bool,
    ended: bool,
}

impl StealthAction {
    fn end_stealth(&mut self, core: &ActionCore, ctx: &mut ActionContext<'_>) {
        if self.ended {
            return;
        }
        self.ended = true;
        let owner = core.owner();
        if self.started {
            debug!(entity = %owner, "leaving stealth");
            ctx.world.set_stealthed(owner, false);
        }
        ctx.world
            .broadcast_cancel(owner, CancelScope::ByType(core.action_type()));
    }
}

impl ActionBehavior for StealthAction {
    fn start(&mut self, core: &mut ActionCore, ctx: &mut ActionContext<'_>) -> bool {
        let owner = core.owner();
        ctx.trigger(owner, &core.definition().anim);
        ctx.world.broadcast_action(owner, &core.request);
        true
    }

    fn update(&mut self, core: &mut ActionCore, ctx: &mut ActionContext<'_>) -> bool {
        if !self.started
            && !self.ended
            && core.time_running(ctx.now) >= core.definition().exec_time_seconds
        {
            self.started = true;
            ctx.world.set_stealthed(core.owner(), true);
        }
        !self.ended
    }

    fn should_become_non_blocking(&self, core: &ActionCore, now: f32) -> bool {
        core.time_running(now) >= core.definition().exec_time_seconds
    }

    fn cancel(&mut self, core: &mut ActionCore, ctx: &mut ActionContext<'_>) {
        ctx.trigger(core.owner(), &core.definition().anim2);
        self.end_stealth(core, ctx);
    }

    fn on_gameplay_activity(
        &mut self,
        core: &mut ActionCore,
        ctx: &mut ActionContext<'_>,
        activity: GameplayActivity,
    ) {
        if matches!(
            activity,
            GameplayActivity::UsingAttackAction | GameplayActivity::AttackedByEnemy
        ) {
            self.end_stealth(core, ctx);
        }
    }
}
