//! Hold-to-charge abilities.
//!
//! Both variants charge from the moment they start and stop on the first of:
//! - the player releasing the input (`StoppedChargingUp`)
//! - the owner being hit (`AttackedByEnemy`)
//! - the charge reaching 100% at `exec_time_seconds`
//!
//! Stopping freezes the charge percentage and broadcasts it so client visuals
//! can finish with the same value.

use crate::behavior::{ActionBehavior, ActionContext, ActionCore, BuffableValue, GameplayActivity};
use crate::combat::percent_charged_up;

use super::projectile::launch_from_owner;

/// Charges within this distance of 100% count as full.
const FULL_CHARGE_EPSILON: f32 = 1e-4;

fn is_full_charge(percent: f32) -> bool {
    percent >= 1.0 - FULL_CHARGE_EPSILON
}

/// Projectile tier for a charge over `tiers` entries. A full charge always
/// gets the strongest tier.
fn tier_index(percent: f32, tiers: usize) -> usize {
    let last = tiers.saturating_sub(1);
    if is_full_charge(percent) {
        return last;
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    let index = (percent * last as f32) as usize;
    index.min(last)
}

fn charge_percent(core: &ActionCore, stopped_at: Option<f32>, now: f32) -> f32 {
    percent_charged_up(
        stopped_at,
        core.time_running(now),
        core.time_started(),
        core.definition().exec_time_seconds,
    )
}

fn face_initial_target(core: &ActionCore, ctx: &mut ActionContext<'_>) {
    let aim = core
        .primary_target()
        .and_then(|id| ctx.world.entity(id))
        .map(|target| target.position);
    if let Some(point) = aim {
        ctx.world.look_at(core.owner(), point);
    }
}

// =============================================================================
// Charged Shield
// =============================================================================

/// Damage reduction that grows with the charge.
///
/// Once stopped, the shield lingers for `effect_duration_seconds` in the
/// background. A full charge also stuns tramplers and raises the
/// invulnerability animator counter for as long as the shield lasts.
#[derive(Debug, Default)]
pub struct ChargedShieldAction {
    stopped_at: Option<f32>,
    counter_raised: bool,
}

impl ChargedShieldAction {
    fn stop_charging(&mut self, core: &ActionCore, ctx: &mut ActionContext<'_>) {
        if self.stopped_at.is_some() {
            return;
        }
        self.stopped_at = Some(ctx.now);
        let percent = charge_percent(core, self.stopped_at, ctx.now);
        let owner = core.owner();
        let def = core.definition();

        ctx.world.broadcast_charge_stopped(owner, percent);
        ctx.trigger(owner, &def.anim2);
        ctx.world.reset_cue(owner, &def.anim);
        if is_full_charge(percent) && !def.other_animator_variable.is_empty() {
            ctx.world
                .adjust_animator_counter(owner, &def.other_animator_variable, 1);
            self.counter_raised = true;
        }
    }
}

impl ActionBehavior for ChargedShieldAction {
    fn start(&mut self, core: &mut ActionCore, ctx: &mut ActionContext<'_>) -> bool {
        face_initial_target(core, ctx);
        let owner = core.owner();
        ctx.world.reset_cue(owner, &core.definition().anim2);
        ctx.trigger(owner, &core.definition().anim);
        ctx.world.broadcast_action(owner, &core.request);
        true
    }

    fn update(&mut self, core: &mut ActionCore, ctx: &mut ActionContext<'_>) -> bool {
        if self.stopped_at.is_none() && core.time_running(ctx.now) >= core.definition().exec_time_seconds {
            self.stop_charging(core, ctx);
        }
        self.stopped_at
            .map_or(true, |stop| ctx.now < stop + core.definition().effect_duration_seconds)
    }

    fn should_become_non_blocking(&self, _core: &ActionCore, _now: f32) -> bool {
        self.stopped_at.is_some()
    }

    fn cancel(&mut self, core: &mut ActionCore, ctx: &mut ActionContext<'_>) {
        self.stop_charging(core, ctx);
        if self.counter_raised {
            self.counter_raised = false;
            let variable = &core.definition().other_animator_variable;
            ctx.world.adjust_animator_counter(core.owner(), variable, -1);
        }
    }

    fn buff_value(&self, core: &ActionCore, now: f32, kind: BuffableValue, value: &mut f32) {
        let percent = charge_percent(core, self.stopped_at, now);
        match kind {
            BuffableValue::PercentDamageReceived => {
                let reduction = 0.5 + (percent * percent) / 2.0;
                *value *= 1.0 - reduction;
            }
            BuffableValue::ChanceToStunTramplers if is_full_charge(percent) => {
                *value = value.max(1.0);
            }
            _ => {}
        }
    }

    fn on_gameplay_activity(
        &mut self,
        core: &mut ActionCore,
        ctx: &mut ActionContext<'_>,
        activity: GameplayActivity,
    ) {
        if matches!(
            activity,
            GameplayActivity::AttackedByEnemy | GameplayActivity::StoppedChargingUp
        ) {
            self.stop_charging(core, ctx);
        }
    }
}

// =============================================================================
// Charged Launcher
// =============================================================================

/// Fires a stronger projectile the longer it charges.
///
/// The projectile tier is `floor(percent * (tiers - 1))`, and a full charge
/// always gets the last tier. Being hit while
/// charging spoils the shot: nothing is launched.
#[derive(Debug, Default)]
pub struct ChargedLaunchAction {
    stopped_at: Option<f32>,
    hit_by_attack: bool,
}

impl ChargedLaunchAction {
    fn stop_charging(&mut self, core: &ActionCore, ctx: &mut ActionContext<'_>) {
        if self.stopped_at.is_some() {
            return;
        }
        self.stopped_at = Some(ctx.now);
        let percent = charge_percent(core, self.stopped_at, ctx.now);
        let owner = core.owner();

        ctx.trigger(owner, &core.definition().anim2);
        ctx.world.broadcast_charge_stopped(owner, percent);
        if self.hit_by_attack {
            return;
        }

        let tiers = &core.definition().projectiles;
        if tiers.is_empty() {
            return;
        }
        launch_from_owner(core, ctx, &tiers[tier_index(percent, tiers.len())]);
    }
}

impl ActionBehavior for ChargedLaunchAction {
    fn start(&mut self, core: &mut ActionCore, ctx: &mut ActionContext<'_>) -> bool {
        face_initial_target(core, ctx);
        let owner = core.owner();
        ctx.trigger(owner, &core.definition().anim);
        ctx.world.broadcast_action(owner, &core.request);
        true
    }

    fn update(&mut self, core: &mut ActionCore, ctx: &mut ActionContext<'_>) -> bool {
        if self.stopped_at.is_none() && is_full_charge(charge_percent(core, None, ctx.now)) {
            self.stop_charging(core, ctx);
        }
        self.stopped_at.is_none()
    }

    fn end(&mut self, core: &mut ActionCore, ctx: &mut ActionContext<'_>) {
        self.stop_charging(core, ctx);
    }

    fn cancel(&mut self, core: &mut ActionCore, ctx: &mut ActionContext<'_>) {
        self.stop_charging(core, ctx);
    }

    fn on_gameplay_activity(
        &mut self,
        core: &mut ActionCore,
        ctx: &mut ActionContext<'_>,
        activity: GameplayActivity,
    ) {
        match activity {
            GameplayActivity::AttackedByEnemy => {
                self.hit_by_attack = true;
                self.stop_charging(core, ctx);
            }
            GameplayActivity::StoppedChargingUp => self.stop_charging(core, ctx),
            GameplayActivity::Healed | GameplayActivity::UsingAttackAction => {}
        }
    }
}
