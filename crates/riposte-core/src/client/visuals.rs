//! Visual variants, one per family of abilities.
//!
//! Server-side cues already reach every client through the animation stream,
//! so these variants only add what is purely cosmetic: graphics, missiles,
//! reticules and hit reactions. [`build_visual`] picks the variant for a
//! definition.

use glam::Vec3;

use super::visual::{ActionVisual, VisualContext, VisualCore, VisualEvent};
use crate::combat::percent_charged_up;
use crate::definition::{ActionDefinition, LogicKind};
use crate::entity::EntityId;
use crate::simulation::HIT_REACT_CUE;

/// Extra meters a melee victim may be from the attacker and still flinch.
pub const MELEE_REACT_PADDING: f32 = 3.0;

/// Seconds a trample runs before its graphics appear.
pub const TRAMPLE_GRAPHICS_DELAY: f32 = 0.3;

/// Anim event that marks a melee swing connecting.
pub const IMPACT_EVENT: &str = "impact";

/// Builds the visual for `definition`.
#[must_use]
pub fn build_visual(definition: &ActionDefinition) -> Box<dyn ActionVisual> {
    match definition.logic {
        LogicKind::Melee => Box::<MeleeVisual>::default(),
        LogicKind::RangedFxTargeted => Box::<FxProjectileVisual>::default(),
        LogicKind::ChargedShield => Box::<ChargedShieldVisual>::default(),
        LogicKind::ChargedLaunchProjectile => Box::<ChargedLauncherVisual>::default(),
        LogicKind::Trample => Box::<TrampleVisual>::default(),
        LogicKind::Target => Box::<TargetVisual>::default(),
        LogicKind::StealthMode => Box::<StealthVisual>::default(),
        LogicKind::DashAttack => Box::<DashVisual>::default(),
        _ => Box::new(GenericVisual),
    }
}

fn react_cue(core: &VisualCore) -> &str {
    let cue = core.definition().react_anim.as_str();
    if cue.is_empty() {
        HIT_REACT_CUE
    } else {
        cue
    }
}

// =============================================================================
// Generic
// =============================================================================

/// Plays the start animation unless the owner already predicted it.
#[derive(Debug, Default)]
pub struct GenericVisual;

impl ActionVisual for GenericVisual {
    fn on_start(&mut self, core: &mut VisualCore, ctx: &mut VisualContext<'_>) -> bool {
        if !core.was_anticipated() {
            ctx.trigger(core.owner(), &core.definition().anim);
        }
        true
    }
}

// =============================================================================
// Melee
// =============================================================================

/// Swing trails plus a single hit reaction on the victim.
#[derive(Debug, Default)]
pub struct MeleeVisual {
    impact_played: bool,
    graphics: Vec<String>,
}

impl MeleeVisual {
    fn spawn(&mut self, core: &VisualCore, ctx: &mut VisualContext<'_>) {
        if self.graphics.is_empty() {
            self.graphics = ctx.spawn_graphics(core.owner(), &core.definition().spawns);
        }
    }

    fn play_hit_react(&mut self, core: &VisualCore, ctx: &mut VisualContext<'_>) {
        if self.impact_played {
            return;
        }
        self.impact_played = true;

        let Some(target) = core.primary_target() else {
            return;
        };
        if target == core.owner() {
            return;
        }
        let (Some(owner), Some(victim)) = (ctx.view.entity(core.owner()), ctx.view.entity(target))
        else {
            return;
        };
        let reach = core.definition().range + MELEE_REACT_PADDING;
        if owner.position.distance_squared(victim.position) <= reach * reach {
            ctx.hit_react(target, react_cue(core));
        }
    }
}

impl ActionVisual for MeleeVisual {
    fn anticipate(&mut self, core: &mut VisualCore, ctx: &mut VisualContext<'_>) {
        self.spawn(core, ctx);
    }

    fn on_start(&mut self, core: &mut VisualCore, ctx: &mut VisualContext<'_>) -> bool {
        self.spawn(core, ctx);
        true
    }

    fn end(&mut self, core: &mut VisualCore, ctx: &mut VisualContext<'_>) {
        self.play_hit_react(core, ctx);
        ctx.shutdown(core.owner(), &mut self.graphics);
    }

    fn cancel(&mut self, core: &mut VisualCore, ctx: &mut VisualContext<'_>) {
        ctx.shutdown(core.owner(), &mut self.graphics);
    }

    fn on_anim_event(&mut self, core: &mut VisualCore, ctx: &mut VisualContext<'_>, id: &str) {
        if id == IMPACT_EVENT {
            self.play_hit_react(core, ctx);
        }
    }
}

// =============================================================================
// Charged Shield
// =============================================================================

/// Charge glow while holding, a shield bubble once fully charged.
///
/// `spawns[0]` is the charge graphic and `spawns[1]` the shield. The visual
/// lives on for `effect_duration_seconds` after the charge stops.
#[derive(Debug, Default)]
pub struct ChargedShieldVisual {
    charge: Vec<String>,
    shield: Vec<String>,
    stopped_at: Option<f32>,
}

impl ChargedShieldVisual {
    fn show_shield(&mut self, core: &VisualCore, ctx: &mut VisualContext<'_>) {
        if self.shield.is_empty() {
            if let Some(graphic) = core.definition().spawns.get(1) {
                self.shield = ctx.spawn_graphics(core.owner(), std::slice::from_ref(graphic));
            }
        }
    }

    fn percent(&self, core: &VisualCore, now: f32) -> f32 {
        percent_charged_up(
            self.stopped_at,
            core.time_running(now),
            core.time_started(),
            core.definition().exec_time_seconds,
        )
    }
}

impl ActionVisual for ChargedShieldVisual {
    fn anticipate(&mut self, core: &mut VisualCore, ctx: &mut VisualContext<'_>) {
        // a quick release of the previous charge may have left this set
        ctx.reset(core.owner(), &core.definition().anim2);
    }

    fn on_start(&mut self, core: &mut VisualCore, ctx: &mut VisualContext<'_>) -> bool {
        if let Some(graphic) = core.definition().spawns.first() {
            self.charge = ctx.spawn_graphics(core.owner(), std::slice::from_ref(graphic));
        }
        true
    }

    fn on_update(&mut self, core: &mut VisualCore, ctx: &mut VisualContext<'_>) -> bool {
        if self.percent(core, ctx.now) >= 1.0 {
            self.show_shield(core, ctx);
        }
        self.stopped_at
            .map_or(true, |stop| ctx.now < stop + core.definition().effect_duration_seconds)
    }

    fn cancel(&mut self, core: &mut VisualCore, ctx: &mut VisualContext<'_>) {
        ctx.shutdown(core.owner(), &mut self.charge);
        ctx.shutdown(core.owner(), &mut self.shield);
    }

    fn on_stopped_charging_up(
        &mut self,
        core: &mut VisualCore,
        ctx: &mut VisualContext<'_>,
        percent: f32,
    ) {
        if self.stopped_at.is_some() {
            return;
        }
        self.stopped_at = Some(ctx.now);
        ctx.shutdown(core.owner(), &mut self.charge);
        if percent >= 1.0 {
            self.show_shield(core, ctx);
        }
    }
}

// =============================================================================
// Charged Launcher
// =============================================================================

/// Charge graphics that vanish when the shot is released.
#[derive(Debug, Default)]
pub struct ChargedLauncherVisual {
    graphics: Vec<String>,
    stopped: bool,
}

impl ActionVisual for ChargedLauncherVisual {
    fn on_start(&mut self, core: &mut VisualCore, ctx: &mut VisualContext<'_>) -> bool {
        self.graphics = ctx.spawn_graphics(core.owner(), &core.definition().spawns);
        true
    }

    fn on_update(&mut self, _core: &mut VisualCore, _ctx: &mut VisualContext<'_>) -> bool {
        !self.stopped
    }

    fn cancel(&mut self, core: &mut VisualCore, ctx: &mut VisualContext<'_>) {
        ctx.shutdown(core.owner(), &mut self.graphics);
    }

    fn on_stopped_charging_up(
        &mut self,
        core: &mut VisualCore,
        ctx: &mut VisualContext<'_>,
        _percent: f32,
    ) {
        self.stopped = true;
        ctx.shutdown(core.owner(), &mut self.graphics);
    }
}

// =============================================================================
// FX Projectile
// =============================================================================

/// A cosmetic missile released at execution time.
#[derive(Debug, Default)]
pub struct FxProjectileVisual {
    flight: Option<f32>,
    landed: bool,
}

impl FxProjectileVisual {
    fn launch(core: &VisualCore, ctx: &mut VisualContext<'_>) -> f32 {
        let owner = core.owner();
        let origin = ctx.view.entity(owner).map_or(Vec3::ZERO, |o| o.position);
        let target = core.primary_target();
        let destination = target
            .and_then(|id| ctx.view.entity(id))
            .map_or(core.request.position, |t| t.position);
        let Some(projectile) = core.definition().projectiles.first() else {
            return 0.0;
        };
        let flight_seconds = if projectile.speed_m_s > 0.0 {
            origin.distance(destination) / projectile.speed_m_s
        } else {
            0.0
        };
        ctx.emit(VisualEvent::MissileLaunched {
            owner,
            prefab: projectile.prefab.clone(),
            target,
            destination,
            flight_seconds,
        });
        flight_seconds
    }
}

impl ActionVisual for FxProjectileVisual {
    fn on_update(&mut self, core: &mut VisualCore, ctx: &mut VisualContext<'_>) -> bool {
        let exec = core.definition().exec_time_seconds;
        let running = core.time_running(ctx.now);
        if running < exec {
            return true;
        }
        let flight = *self.flight.get_or_insert_with(|| Self::launch(core, ctx));
        running <= flight + exec
    }

    fn end(&mut self, core: &mut VisualCore, ctx: &mut VisualContext<'_>) {
        if self.flight.is_none() || self.landed {
            return;
        }
        self.landed = true;
        if let Some(target) = core.primary_target().filter(|&t| t != core.owner()) {
            ctx.hit_react(target, react_cue(core));
        }
    }

    fn cancel(&mut self, core: &mut VisualCore, ctx: &mut VisualContext<'_>) {
        if self.flight.is_some() && !self.landed {
            self.landed = true;
            ctx.emit(VisualEvent::MissileCancelled { owner: core.owner() });
        }
    }
}

// =============================================================================
// Trample
// =============================================================================

/// Dust and banners that appear shortly into the charge.
#[derive(Debug, Default)]
pub struct TrampleVisual {
    graphics: Option<Vec<String>>,
}

impl ActionVisual for TrampleVisual {
    fn on_update(&mut self, core: &mut VisualCore, ctx: &mut VisualContext<'_>) -> bool {
        if self.graphics.is_none() && core.time_running(ctx.now) >= TRAMPLE_GRAPHICS_DELAY {
            self.graphics = Some(ctx.spawn_graphics(core.owner(), &core.definition().spawns));
        }
        true
    }

    fn cancel(&mut self, core: &mut VisualCore, ctx: &mut VisualContext<'_>) {
        if let Some(graphics) = self.graphics.as_mut() {
            ctx.shutdown(core.owner(), graphics);
        }
    }
}

// =============================================================================
// Target
// =============================================================================

/// Reticule over the owner's active target, shown only to the owner.
#[derive(Debug, Default)]
pub struct TargetVisual {
    shown: Option<EntityId>,
}

impl TargetVisual {
    fn show(&mut self, owner: EntityId, target: Option<EntityId>, ctx: &mut VisualContext<'_>) {
        if self.shown == target {
            return;
        }
        if self.shown.take().is_some() {
            ctx.emit(VisualEvent::ReticuleHidden { owner });
        }
        let Some(target) = target else {
            return;
        };
        let (Some(o), Some(t)) = (ctx.view.entity(owner), ctx.view.entity(target)) else {
            return;
        };
        ctx.emit(VisualEvent::ReticuleShown {
            owner,
            target,
            hostile: t.is_npc() != o.is_npc(),
        });
        self.shown = Some(target);
    }
}

impl ActionVisual for TargetVisual {
    fn on_start(&mut self, core: &mut VisualCore, ctx: &mut VisualContext<'_>) -> bool {
        if ctx.is_local_owner() {
            self.show(core.owner(), core.primary_target(), ctx);
        }
        true
    }

    fn on_update(&mut self, core: &mut VisualCore, ctx: &mut VisualContext<'_>) -> bool {
        let current = ctx.view.entity(core.owner()).and_then(|o| o.target);
        if ctx.is_local_owner() {
            self.show(core.owner(), current, ctx);
        }
        current.is_some()
    }

    fn cancel(&mut self, core: &mut VisualCore, ctx: &mut VisualContext<'_>) {
        self.show(core.owner(), None, ctx);
    }
}

// =============================================================================
// Stealth
// =============================================================================

/// Shimmer the owner sees while hidden.
#[derive(Debug, Default)]
pub struct StealthVisual {
    graphics: Option<Vec<String>>,
}

impl ActionVisual for StealthVisual {
    fn on_update(&mut self, core: &mut VisualCore, ctx: &mut VisualContext<'_>) -> bool {
        if self.graphics.is_none()
            && ctx.is_local_owner()
            && core.time_running(ctx.now) >= core.definition().exec_time_seconds
        {
            self.graphics = Some(ctx.spawn_graphics(core.owner(), &core.definition().spawns));
        }
        true
    }

    fn cancel(&mut self, core: &mut VisualCore, ctx: &mut VisualContext<'_>) {
        if let Some(graphics) = self.graphics.as_mut() {
            ctx.shutdown(core.owner(), graphics);
        }
    }
}

// =============================================================================
// Dash
// =============================================================================

/// Stays alive for as long as the dash takes to cover its distance.
#[derive(Debug, Default)]
pub struct DashVisual {
    travel_seconds: f32,
}

impl ActionVisual for DashVisual {
    fn on_start(&mut self, core: &mut VisualCore, ctx: &mut VisualContext<'_>) -> bool {
        let speed = core.definition().move_speed;
        self.travel_seconds = match ctx.view.entity(core.owner()) {
            Some(owner) if speed > 0.0 => owner.position.distance(core.request.position) / speed,
            _ => 0.0,
        };
        true
    }

    fn on_update(&mut self, core: &mut VisualCore, ctx: &mut VisualContext<'_>) -> bool {
        core.time_running(ctx.now) < core.definition().exec_time_seconds + self.travel_seconds
    }
}
