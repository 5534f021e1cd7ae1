//! Picking up heavy objects.
//!
//! At execution time the owner sweeps straight ahead for `range` meters. The
//! nearest thing in front must be a heavy, unheld object; anything else is a
//! failed pick-up. A character that faints while holding drops the object.

use glam::Vec3;
use tracing::debug;

use crate::behavior::{ActionBehavior, ActionContext, ActionCore};
use crate::entity::{EntityFlags, EntityId, LifeState};
use crate::world::Layers;

/// Cue fired on the owner when nothing could be picked up.
pub const PICK_UP_FAILED_CUE: &str = "PickUpFailed";

/// Half-width of the pick-up rig.
const SWEEP_HALF_EXTENT: f32 = 0.25;

/// Grabs the heavy object in front of the owner.
#[derive(Debug, Default)]
pub struct PickUpAction {
    attempted: bool,
}

impl PickUpAction {
    fn try_pick_up(core: &mut ActionCore, ctx: &mut ActionContext<'_>) -> Option<EntityId> {
        let owner = ctx.world.entity(core.owner())?;
        let hits = ctx.world.sweep(
            owner.position,
            owner.forward,
            core.definition().range,
            SWEEP_HALF_EXTENT,
            Layers::NPCS,
        );
        let object = hits
            .into_iter()
            .find(|&id| id != owner.id)
            .and_then(|id| ctx.world.entity(id))?;
        if !object.flags.contains(EntityFlags::HEAVY) || object.held_by.is_some() {
            return None;
        }
        if !ctx.world.attach(owner.id, object.id) {
            return None;
        }

        core.request.target_ids = vec![object.id];
        ctx.world.set_target(owner.id, None);
        if core.request.direction != Vec3::ZERO {
            ctx.world.set_forward(owner.id, core.request.direction);
        }
        Some(object.id)
    }
}

impl ActionBehavior for PickUpAction {
    fn start(&mut self, core: &mut ActionCore, ctx: &mut ActionContext<'_>) -> bool {
        let owner = core.owner();
        let holding = ctx.world.entity(owner).is_some_and(|o| o.held.is_some());
        if !holding {
            ctx.trigger(owner, &core.definition().anim);
        }
        true
    }

    fn update(&mut self, core: &mut ActionCore, ctx: &mut ActionContext<'_>) -> bool {
        if self.attempted || core.time_running(ctx.now) <= core.definition().exec_time_seconds {
            return true;
        }
        self.attempted = true;

        match Self::try_pick_up(core, ctx) {
            Some(object) => {
                debug!(entity = %core.owner(), object = %object, "picked up");
                true
            }
            None => {
                debug!(entity = %core.owner(), "nothing to pick up");
                ctx.world.play_cue(core.owner(), PICK_UP_FAILED_CUE);
                false
            }
        }
    }

    fn cancel(&mut self, core: &mut ActionCore, ctx: &mut ActionContext<'_>) {
        let owner = core.owner();
        let fainted = ctx
            .world
            .entity(owner)
            .is_some_and(|o| o.life_state == LifeState::Fainted);
        if fainted {
            ctx.world.detach(owner);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::Arena;
    use crate::definition::{ActionDefinition, LogicKind};
    use crate::entity::EntityTag;
    use crate::events::WorldEvent;
    use crate::request::{ActionRequest, ActionType};
    use crate::tests::helpers::{Harness, Rig};
    use glam::Vec3;

    fn pick_up_def() -> ActionDefinition {
        ActionDefinition {
            range: 2.0,
            exec_time_seconds: 0.3,
            duration_seconds: 0.8,
            anim: "PickUp".into(),
            ..ActionDefinition::new(ActionType::PickUp, LogicKind::PickUp)
        }
    }

    fn heavy(arena: &mut Arena, position: Vec3) -> EntityId {
        let id = arena.spawn(EntityTag::Prop, position);
        arena.insert_flags(id, EntityFlags::HEAVY);
        id
    }

    fn failed(h: &Harness) -> bool {
        h.arena.events().iter().any(|r| matches!(
            &r.event,
            WorldEvent::CuePlayed { cue, .. } if cue == PICK_UP_FAILED_CUE
        ))
    }

    #[test]
    fn grabs_the_heavy_object_ahead() {
        let mut h = Harness::new();
        let tank = h.hero(Vec3::ZERO);
        let pot = heavy(&mut h.arena, Vec3::new(0.0, 0.0, 1.5));
        let mut rig = Rig::new(tank, ActionRequest::new(ActionType::PickUp), pick_up_def());

        assert!(rig.start(&mut h));
        assert!(!rig.run_for(&mut h, 0.5));
        assert_eq!(h.arena.snapshot(tank).unwrap().held, Some(pot));
        assert_eq!(rig.core.request.target_ids, vec![pot]);
        assert!(!failed(&h));
    }

    #[test]
    fn light_objects_fail() {
        let mut h = Harness::new();
        let tank = h.hero(Vec3::ZERO);
        let _crate = h.arena.spawn(EntityTag::Prop, Vec3::new(0.0, 0.0, 1.5));
        let mut rig = Rig::new(tank, ActionRequest::new(ActionType::PickUp), pick_up_def());

        assert!(rig.start(&mut h));
        assert!(rig.run_for(&mut h, 0.5));
        assert!(failed(&h));
        assert_eq!(h.arena.snapshot(tank).unwrap().held, None);
    }

    #[test]
    fn held_objects_cannot_be_taken() {
        let mut h = Harness::new();
        let tank = h.hero(Vec3::ZERO);
        let rogue = h.hero(Vec3::new(5.0, 0.0, 5.0));
        let pot = heavy(&mut h.arena, Vec3::new(0.0, 0.0, 1.5));
        if let Some(object) = h.arena.get_mut(pot) {
            object.held_by = Some(rogue);
        }

        let mut rig = Rig::new(tank, ActionRequest::new(ActionType::PickUp), pick_up_def());
        assert!(rig.start(&mut h));
        h.now = 0.5;
        assert!(!rig.update(&mut h));
        assert!(failed(&h));
        assert_eq!(h.arena.snapshot(tank).unwrap().held, None);
    }

    #[test]
    fn fainting_drops_the_object() {
        let mut h = Harness::new();
        let tank = h.hero(Vec3::ZERO);
        let pot = heavy(&mut h.arena, Vec3::new(0.0, 0.0, 1.5));
        let mut rig = Rig::new(tank, ActionRequest::new(ActionType::PickUp), pick_up_def());

        assert!(rig.start(&mut h));
        rig.run_for(&mut h, 0.5);
        h.arena.apply_hp(tank, None, -100);
        rig.cancel(&mut h);
        assert_eq!(h.arena.snapshot(tank).unwrap().held, None);
        assert_eq!(h.arena.snapshot(pot).unwrap().held_by, None);
    }
}
