//! Ranged attacks.
//!
//! [`LaunchProjectileAction`] spawns a physical projectile the world moves and
//! collides. [`FxProjectileAction`] only shows a missile on clients; the
//! server computes the impact time from the distance and applies the hit
//! itself.

use tracing::debug;

use crate::behavior::{ActionBehavior, ActionContext, ActionCore};
use crate::combat::{has_line_of_sight, is_eligible_target};
use crate::definition::ProjectileInfo;
use crate::entity::EntityId;
use crate::world::CancelScope;

/// Fires `projectile` from the owner's position along its facing.
pub(super) fn launch_from_owner(
    core: &ActionCore,
    ctx: &mut ActionContext<'_>,
    projectile: &ProjectileInfo,
) {
    let Some(owner) = ctx.world.entity(core.owner()) else {
        return;
    };
    debug!(entity = %owner.id, prefab = %projectile.prefab, "launching projectile");
    ctx.world
        .launch_projectile(owner.id, projectile, owner.position, owner.forward);
}

// =============================================================================
// Physical Projectile
// =============================================================================

/// Launches the first projectile at execution time.
#[derive(Debug, Default)]
pub struct LaunchProjectileAction {
    launched: bool,
}

impl LaunchProjectileAction {
    fn launch(&mut self, core: &ActionCore, ctx: &mut ActionContext<'_>) {
        if self.launched {
            return;
        }
        self.launched = true;
        if let Some(projectile) = core.definition().projectiles.first() {
            launch_from_owner(core, ctx, projectile);
        }
    }
}

impl ActionBehavior for LaunchProjectileAction {
    fn start(&mut self, core: &mut ActionCore, ctx: &mut ActionContext<'_>) -> bool {
        let owner = core.owner();
        ctx.world.set_forward(owner, core.request.direction);
        ctx.trigger(owner, &core.definition().anim);
        ctx.world.broadcast_action(owner, &core.request);
        true
    }

    fn update(&mut self, core: &mut ActionCore, ctx: &mut ActionContext<'_>) -> bool {
        if core.time_running(ctx.now) >= core.definition().exec_time_seconds {
            self.launch(core, ctx);
        }
        true
    }

    fn end(&mut self, core: &mut ActionCore, ctx: &mut ActionContext<'_>) {
        self.launch(core, ctx);
    }

    fn cancel(&mut self, core: &mut ActionCore, ctx: &mut ActionContext<'_>) {
        ctx.trigger(core.owner(), &core.definition().anim2);
    }
}

// =============================================================================
// FX Projectile
// =============================================================================

/// Visual-only projectile with a server-timed impact.
#[derive(Debug, Default)]
pub struct FxProjectileAction {
    impacted: bool,
    impact_time: f32,
    target: Option<EntityId>,
}

impl ActionBehavior for FxProjectileAction {
    fn start(&mut self, core: &mut ActionCore, ctx: &mut ActionContext<'_>) -> bool {
        let Some(owner) = ctx.world.entity(core.owner()) else {
            return false;
        };
        let def = core.definition();
        let Some(speed) = def.projectiles.first().map(|p| p.speed_m_s) else {
            return false;
        };
        let is_friendly = def.is_friendly;
        let exec_time = def.exec_time_seconds;

        let target = match core.primary_target() {
            Some(id) => {
                let found = ctx.world.entity(id);
                if found.is_none() {
                    debug!(entity = %owner.id, target = %id, "projectile target not found");
                }
                found.filter(|t| is_eligible_target(t, is_friendly, owner.is_npc()))
            }
            None => None,
        };
        self.target = target.as_ref().map(|t| t.id);

        let mut aim = target.map_or(core.request.position, |t| t.position);
        if let Err(obstruction) = has_line_of_sight(&*ctx.world, owner.position, aim) {
            debug!(entity = %owner.id, "line of sight blocked, retargeting");
            self.target = None;
            aim = obstruction;
            core.request.target_ids.clear();
            core.request.position = aim;
        }

        ctx.world.look_at(owner.id, aim);
        self.impact_time = exec_time + owner.position.distance(aim) / speed;
        ctx.trigger(owner.id, &core.definition().anim);
        ctx.world.broadcast_action(owner.id, &core.request);
        true
    }

    fn update(&mut self, core: &mut ActionCore, ctx: &mut ActionContext<'_>) -> bool {
        if !self.impacted && core.time_running(ctx.now) >= self.impact_time {
            self.impacted = true;
            if let (Some(target), Some(projectile)) =
                (self.target, core.definition().projectiles.first())
            {
                ctx.world
                    .receive_hp(target, Some(core.owner()), -projectile.damage);
            }
        }
        true
    }

    fn cancel(&mut self, core: &mut ActionCore, ctx: &mut ActionContext<'_>) {
        if !self.impacted {
            ctx.world
                .broadcast_cancel(core.owner(), CancelScope::ByType(core.action_type()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{ActionDefinition, LogicKind};
    use crate::events::{EventKind, WorldEvent};
    use crate::request::{ActionRequest, ActionType};
    use crate::tests::helpers::{projectile, Harness, Rig};
    use glam::Vec3;

    fn bow() -> ActionDefinition {
        ActionDefinition {
            exec_time_seconds: 0.2,
            duration_seconds: 0.6,
            anim: "Shoot".into(),
            anim2: "ShootCancel".into(),
            projectiles: vec![projectile("Arrow", 7)],
            ..ActionDefinition::new(ActionType::ArcherBaseAttack, LogicKind::RangedTargeted)
        }
    }

    fn bolt() -> ActionDefinition {
        ActionDefinition {
            exec_time_seconds: 0.5,
            duration_seconds: 2.0,
            anim: "Cast".into(),
            projectiles: vec![projectile("Bolt", 12)],
            ..ActionDefinition::new(ActionType::MageBaseAttack, LogicKind::RangedFxTargeted)
        }
    }

    fn launches(h: &Harness) -> usize {
        h.arena
            .events()
            .iter()
            .filter(|r| matches!(r.event, WorldEvent::ProjectileLaunched { .. }))
            .count()
    }

    mod launch_tests {
        use super::*;

        #[test]
        fn launches_once_at_exec_time() {
            let mut h = Harness::new();
            let archer = h.hero(Vec3::ZERO);
            let request = ActionRequest::new(ActionType::ArcherBaseAttack).with_direction(Vec3::X);
            let mut rig = Rig::new(archer, request, bow());

            assert!(rig.start(&mut h));
            assert!((h.arena.snapshot(archer).unwrap().forward - Vec3::X).length() < 1e-5);
            rig.run_for(&mut h, 0.1);
            assert_eq!(launches(&h), 0);
            rig.run_for(&mut h, 0.3);
            assert_eq!(launches(&h), 1);
            rig.end(&mut h);
            assert_eq!(launches(&h), 1);
        }

        #[test]
        fn end_guarantees_the_launch() {
            let mut h = Harness::new();
            let archer = h.hero(Vec3::ZERO);
            let mut rig = Rig::new(archer, ActionRequest::new(ActionType::ArcherBaseAttack), bow());

            assert!(rig.start(&mut h));
            rig.end(&mut h);
            assert_eq!(launches(&h), 1);
        }

        #[test]
        fn cancel_plays_anim2_without_launching() {
            let mut h = Harness::new();
            let archer = h.hero(Vec3::ZERO);
            let mut rig = Rig::new(archer, ActionRequest::new(ActionType::ArcherBaseAttack), bow());

            assert!(rig.start(&mut h));
            rig.cancel(&mut h);
            assert_eq!(launches(&h), 0);
            assert!(h.arena.events().iter().any(|r| matches!(
                &r.event,
                WorldEvent::CuePlayed { cue, .. } if cue == "ShootCancel"
            )));
        }
    }

    mod fx_tests {
        use super::*;

        #[test]
        fn impact_waits_for_flight_time() {
            let mut h = Harness::new();
            let mage = h.hero(Vec3::ZERO);
            let imp = h.npc(Vec3::new(0.0, 0.0, 10.0));
            let request = ActionRequest::new(ActionType::MageBaseAttack).with_target(imp);
            let mut rig = Rig::new(mage, request, bolt());

            assert!(rig.start(&mut h));
            // 0.5 s exec plus 10 m at 20 m/s.
            rig.run_for(&mut h, 0.9);
            assert_eq!(h.arena.hp(imp), Some(100));
            rig.run_for(&mut h, 0.2);
            assert_eq!(h.arena.hp(imp), Some(88));
            rig.run_for(&mut h, 0.5);
            assert_eq!(h.arena.hp(imp), Some(88));
        }

        #[test]
        fn blocked_shot_retargets_to_the_wall() {
            let mut h = Harness::new();
            let mage = h.hero(Vec3::ZERO);
            let imp = h.npc(Vec3::new(0.0, 0.0, 10.0));
            h.arena.add_obstacle(Vec3::new(0.0, 0.0, 5.0), 1.0);
            let request = ActionRequest::new(ActionType::MageBaseAttack).with_target(imp);
            let mut rig = Rig::new(mage, request, bolt());

            assert!(rig.start(&mut h));
            assert!(rig.core.request.target_ids.is_empty());
            assert!((rig.core.request.position.z - 4.0).abs() < 1e-3);
            rig.run_for(&mut h, 1.5);
            assert_eq!(h.arena.hp(imp), Some(100));
        }

        #[test]
        fn allies_are_not_valid_hostile_targets() {
            let mut h = Harness::new();
            let mage = h.hero(Vec3::ZERO);
            let ally = h.hero(Vec3::new(0.0, 0.0, 4.0));
            let request = ActionRequest::new(ActionType::MageBaseAttack).with_target(ally);
            let mut rig = Rig::new(mage, request, bolt());

            assert!(rig.start(&mut h));
            rig.run_for(&mut h, 1.5);
            assert_eq!(h.arena.hp(ally), Some(100));
        }

        #[test]
        fn cancel_before_impact_cancels_client_visuals() {
            let mut h = Harness::new();
            let mage = h.hero(Vec3::ZERO);
            let imp = h.npc(Vec3::new(0.0, 0.0, 10.0));
            let request = ActionRequest::new(ActionType::MageBaseAttack).with_target(imp);
            let mut rig = Rig::new(mage, request, bolt());

            assert!(rig.start(&mut h));
            rig.cancel(&mut h);
            let cancels = h
                .arena
                .events()
                .of_kind(EventKind::Broadcast)
                .filter(|r| {
                    r.event
                        == WorldEvent::ActionsCancelled {
                            entity: mage,
                            scope: CancelScope::ByType(ActionType::MageBaseAttack),
                        }
                })
                .count();
            assert_eq!(cancels, 1);
        }
    }
}
