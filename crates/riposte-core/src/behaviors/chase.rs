//! Walk into range of a target.
//!
//! Usually synthesized by the player in front of a `should_close` request, with
//! `amount` set to the follow-up ability's range.

use glam::Vec3;
use tracing::{debug, warn};

use crate::behavior::{ActionBehavior, ActionContext, ActionCore};
use crate::entity::EntityId;

/// How far the target may drift before the path is re-issued.
const REPATH_DISTANCE: f32 = 0.5;

/// Follows the primary target until within `request.amount` of it.
#[derive(Debug, Default)]
pub struct ChaseAction {
    target: Option<EntityId>,
    last_goal: Vec3,
}

impl ChaseAction {
    fn stop_walking(ctx: &mut ActionContext<'_>, owner: EntityId) {
        if !ctx.world.is_performing_forced_movement(owner) {
            ctx.world.cancel_move(owner);
        }
    }
}

impl ActionBehavior for ChaseAction {
    fn start(&mut self, core: &mut ActionCore, ctx: &mut ActionContext<'_>) -> bool {
        let owner = core.owner();
        let Some(target) = core.primary_target().and_then(|id| ctx.world.entity(id)) else {
            debug!(entity = %owner, "chase declined: no target");
            return false;
        };

        if core.request.direction != Vec3::ZERO {
            ctx.world.set_forward(owner, core.request.direction);
        }
        ctx.world.follow_target(owner, target.id);
        self.target = Some(target.id);
        self.last_goal = target.position;
        true
    }

    fn update(&mut self, core: &mut ActionCore, ctx: &mut ActionContext<'_>) -> bool {
        let owner = core.owner();
        let Some(target) = self.target.and_then(|id| ctx.world.entity(id)) else {
            warn!(entity = %owner, "chase target vanished");
            self.cancel(core, ctx);
            return false;
        };
        let Some(me) = ctx.world.entity(owner) else {
            return false;
        };

        let stop_distance = core.request.amount;
        if me.distance_squared(target.position) < stop_distance * stop_distance {
            ctx.world.look_at(owner, target.position);
            Self::stop_walking(ctx, owner);
            return false;
        }

        let drifted = target.position.distance(self.last_goal) > REPATH_DISTANCE;
        if !ctx.world.is_performing_forced_movement(owner) && (drifted || !ctx.world.is_moving(owner))
        {
            ctx.world.follow_target(owner, target.id);
            self.last_goal = target.position;
        }
        true
    }

    fn cancel(&mut self, core: &mut ActionCore, ctx: &mut ActionContext<'_>) {
        Self::stop_walking(ctx, core.owner());
    }
}
