//! Forward charge that runs through everything in its path.
//!
//! # Stages
//!
//! ```text
//! Windup (t < exec) ──▶ Charging (t < duration) ──▶ Complete
//! ```
//!
//! Entering `Charging` treats everything already within touch distance as a
//! collision, then starts the forward charge. Each entity is collided with at
//! most once per run.
//!
//! A hostile victim with a positive `ChanceToStunTramplers` (a fully charged
//! shield, for instance) may stun the trampler instead. A stunned trampler
//! stops, deals no further damage and chains into a stun.

use std::collections::BTreeSet;

use rand::Rng;
use tracing::debug;

use crate::arena::TOUCH_DISTANCE;
use crate::behavior::{ActionBehavior, ActionContext, ActionCore, BuffableValue};
use crate::entity::{EntityFlags, EntityId, EntitySnapshot};
use crate::request::{ActionRequest, ActionType};
use crate::world::{CancelScope, Collision, Layers};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum Stage {
    #[default]
    Windup,
    Charging,
    Complete,
}

/// Charge attack that damages and knocks back whatever it hits.
#[derive(Debug, Default)]
pub struct TrampleAction {
    stage: Stage,
    collided: BTreeSet<EntityId>,
    stunned: bool,
}

impl TrampleAction {
    fn current_stage(core: &ActionCore, now: f32) -> Stage {
        let elapsed = core.time_running(now);
        let def = core.definition();
        if elapsed < def.exec_time_seconds {
            Stage::Windup
        } else if elapsed < def.duration_seconds {
            Stage::Charging
        } else {
            Stage::Complete
        }
    }

    fn collide_with_nearby(&mut self, core: &ActionCore, ctx: &mut ActionContext<'_>) {
        let Some(owner) = ctx.world.entity(core.owner()) else {
            return;
        };
        let nearby = ctx
            .world
            .overlap_sphere(owner.position, TOUCH_DISTANCE, Layers::all());
        for other in nearby {
            self.collide(core, ctx, other);
        }
    }

    fn collide(&mut self, core: &ActionCore, ctx: &mut ActionContext<'_>, other: EntityId) {
        if !self.collided.insert(other) || other == core.owner() {
            return;
        }
        let (Some(me), Some(victim)) = (ctx.world.entity(core.owner()), ctx.world.entity(other))
        else {
            return;
        };

        if victim.is_character() {
            self.collide_with_victim(core, ctx, &me, &victim);
        } else if !self.stunned && victim.is_damageable() {
            let splash = core.definition().splash_damage;
            ctx.world.receive_hp(victim.id, Some(me.id), -splash);
            if victim.flags.contains(EntityFlags::STUN_ON_TRAMPLE) {
                self.stun_self(core, ctx);
            }
        }
    }

    fn collide_with_victim(
        &mut self,
        core: &ActionCore,
        ctx: &mut ActionContext<'_>,
        me: &EntitySnapshot,
        victim: &EntitySnapshot,
    ) {
        if self.stunned {
            return;
        }
        let def = core.definition();

        // Allies are knocked aside but not hurt.
        if me.is_npc() != victim.is_npc() {
            let chance = ctx
                .world
                .buffed_value(victim.id, BuffableValue::ChanceToStunTramplers)
                .unwrap_or(0.0);
            if chance > 0.0 && ctx.rng.gen::<f32>() < chance {
                debug!(entity = %me.id, victim = %victim.id, "trampler stunned by victim");
                self.stun_self(core, ctx);
                return;
            }

            let damage = if core.primary_target() == Some(victim.id) {
                def.amount
            } else {
                def.splash_damage
            };
            ctx.world.receive_hp(victim.id, Some(me.id), -damage);
        }

        ctx.world.start_knockback(
            victim.id,
            me.position,
            def.knockback_speed,
            def.knockback_duration,
        );
    }

    fn stun_self(&mut self, core: &ActionCore, ctx: &mut ActionContext<'_>) {
        if !self.stunned {
            ctx.world.cancel_move(core.owner());
            ctx.world.broadcast_cancel(core.owner(), CancelScope::All);
        }
        self.stunned = true;
    }
}

impl ActionBehavior for TrampleAction {
    fn start(&mut self, core: &mut ActionCore, ctx: &mut ActionContext<'_>) -> bool {
        let owner = core.owner();
        let aim = core
            .primary_target()
            .and_then(|id| ctx.world.entity(id))
            .map(|target| target.position);
        if let Some(point) = aim {
            ctx.world.look_at(owner, point);
        }

        let def = core.definition();
        if !def.anim2.is_empty() {
            ctx.world.reset_cue(owner, &def.anim2);
        }
        ctx.trigger(owner, &def.anim);
        ctx.world.broadcast_action(owner, &core.request);
        true
    }

    fn update(&mut self, core: &mut ActionCore, ctx: &mut ActionContext<'_>) -> bool {
        let stage = Self::current_stage(core, ctx.now);
        if stage != self.stage && stage == Stage::Charging {
            self.collide_with_nearby(core, ctx);
            let def = core.definition();
            ctx.world.start_forward_charge(
                core.owner(),
                def.move_speed,
                def.duration_seconds - def.exec_time_seconds,
            );
        }
        self.stage = stage;
        stage != Stage::Complete && !self.stunned
    }

    fn cancel(&mut self, core: &mut ActionCore, ctx: &mut ActionContext<'_>) {
        ctx.trigger(core.owner(), &core.definition().anim2);
    }

    fn chain_into_new_action(&mut self, _core: &ActionCore) -> Option<ActionRequest> {
        self.stunned.then(|| ActionRequest::new(ActionType::Stun))
    }

    fn on_collision_enter(
        &mut self,
        core: &mut ActionCore,
        ctx: &mut ActionContext<'_>,
        collision: &Collision,
    ) {
        if Self::current_stage(core, ctx.now) == Stage::Charging {
            self.collide(core, ctx, collision.other);
        }
    }
}
