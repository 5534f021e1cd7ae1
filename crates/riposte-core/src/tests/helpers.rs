//! Test helper functions for setting up arenas, behaviors and simulations.
//!
//! [`Harness`] owns the pieces an [`ActionContext`] borrows, so a single
//! behavior can be driven by hand without a player. [`Rig`] pairs a behavior
//! with its core and exposes each lifecycle callback as one call.

use std::sync::Arc;

use glam::Vec3;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::arena::Arena;
use crate::behavior::{
    ActionBehavior, ActionContext, ActionCore, BehaviorRegistry, BuffableValue, GameplayActivity,
    InstanceId, PlayerCommand,
};
use crate::definition::{ActionDefinition, BlockingMode, DefinitionTable, LogicKind, ProjectileInfo};
use crate::entity::{EntityId, EntityTag};
use crate::request::{ActionRequest, ActionType};
use crate::simulation::Simulation;
use crate::world::Collision;
use crate::FIXED_DT;

// =============================================================================
// Behavior Harness
// =============================================================================

/// Owns an arena, an RNG and a command buffer for driving behaviors directly.
pub struct Harness {
    /// The world behaviors act on.
    pub arena: Arena,
    /// RNG handed to every callback.
    pub rng: ChaCha8Rng,
    /// Commands the behaviors issued to their player.
    pub commands: Vec<PlayerCommand>,
    /// Current time in seconds.
    pub now: f32,
}

impl Harness {
    /// Creates a harness over an empty arena at time zero.
    pub fn new() -> Self {
        Self {
            arena: Arena::new(),
            rng: ChaCha8Rng::seed_from_u64(7),
            commands: Vec::new(),
            now: 0.0,
        }
    }

    /// Spawns a hero with 100 HP.
    pub fn hero(&mut self, position: Vec3) -> EntityId {
        self.arena.spawn_damageable(EntityTag::Hero, position, 100)
    }

    /// Spawns an NPC with 100 HP.
    pub fn npc(&mut self, position: Vec3) -> EntityId {
        self.arena.spawn_damageable(EntityTag::Npc, position, 100)
    }

    /// Builds a callback context reporting a single running action.
    pub fn ctx(&mut self) -> ActionContext<'_> {
        ActionContext::new(
            self.now,
            &mut self.arena,
            &mut self.rng,
            1,
            InstanceId::new(0),
            &mut self.commands,
        )
    }
}

/// A behavior paired with its core.
pub struct Rig {
    /// The shared state.
    pub core: ActionCore,
    /// The behavior under test.
    pub behavior: Box<dyn ActionBehavior>,
}

impl Rig {
    /// Builds the standard behavior for `definition`.
    pub fn new(owner: EntityId, request: ActionRequest, definition: ActionDefinition) -> Self {
        let behavior = BehaviorRegistry::standard()
            .build(&definition)
            .expect("definition should build");
        Self {
            core: ActionCore::new(owner, request, Arc::new(definition)),
            behavior,
        }
    }

    /// Stamps the start time and calls `start`.
    pub fn start(&mut self, harness: &mut Harness) -> bool {
        self.core.set_time_started(harness.now);
        let mut ctx = harness.ctx();
        self.behavior.start(&mut self.core, &mut ctx)
    }

    /// Calls `update`, folding in duration expiry the way the player does.
    pub fn update(&mut self, harness: &mut Harness) -> bool {
        let mut ctx = harness.ctx();
        let alive = self.behavior.update(&mut self.core, &mut ctx);
        alive && !self.core.is_expired(harness.now)
    }

    /// Advances one fixed step: integrates the arena, delivers the owner's
    /// contacts, then updates.
    pub fn step(&mut self, harness: &mut Harness) -> bool {
        harness.now += FIXED_DT;
        let report = harness.arena.integrate(FIXED_DT);
        for (charger, collision) in report.contacts {
            if charger == self.core.owner() {
                self.collide(harness, &collision);
            }
        }
        self.update(harness)
    }

    /// Steps until `update` reports termination or `seconds` pass.
    ///
    /// Returns `true` if the behavior terminated.
    pub fn run_for(&mut self, harness: &mut Harness, seconds: f32) -> bool {
        let deadline = harness.now + seconds;
        while harness.now < deadline {
            if !self.step(harness) {
                return true;
            }
        }
        false
    }

    /// Calls `end`.
    pub fn end(&mut self, harness: &mut Harness) {
        let mut ctx = harness.ctx();
        self.behavior.end(&mut self.core, &mut ctx);
    }

    /// Calls `cancel`.
    pub fn cancel(&mut self, harness: &mut Harness) {
        let mut ctx = harness.ctx();
        self.behavior.cancel(&mut self.core, &mut ctx);
    }

    /// Delivers a gameplay activity.
    pub fn activity(&mut self, harness: &mut Harness, activity: GameplayActivity) {
        let mut ctx = harness.ctx();
        self.behavior
            .on_gameplay_activity(&mut self.core, &mut ctx, activity);
    }

    /// Delivers a collision.
    pub fn collide(&mut self, harness: &mut Harness, collision: &Collision) {
        let mut ctx = harness.ctx();
        self.behavior
            .on_collision_enter(&mut self.core, &mut ctx, collision);
    }

    /// Buffs the unbuffed value of `kind` at `now`.
    pub fn buff(&self, kind: BuffableValue, now: f32) -> f32 {
        let mut value = kind.unbuffed();
        self.behavior.buff_value(&self.core, now, kind, &mut value);
        value
    }

    /// Polls `should_become_non_blocking`.
    pub fn releases_slot(&self, now: f32) -> bool {
        self.behavior.should_become_non_blocking(&self.core, now)
    }

    /// Calls `chain_into_new_action`.
    pub fn chain(&mut self) -> Option<ActionRequest> {
        self.behavior.chain_into_new_action(&self.core)
    }
}

// =============================================================================
// Definition Factories
// =============================================================================

/// A projectile tier.
pub fn projectile(prefab: &str, damage: i32) -> ProjectileInfo {
    ProjectileInfo {
        prefab: prefab.into(),
        speed_m_s: 20.0,
        range: 20.0,
        damage,
        max_victims: 1,
    }
}

/// Tank swing: 10 damage, 3 m, executes at 0.5 s of 1 s.
pub fn melee_def() -> ActionDefinition {
    ActionDefinition {
        amount: 10,
        range: 3.0,
        duration_seconds: 1.0,
        exec_time_seconds: 0.5,
        anim: "Attack1".into(),
        ..ActionDefinition::new(ActionType::TankBaseAttack, LogicKind::Melee)
    }
}

/// Imp claw: 5 damage, 2 m, interruptible.
pub fn imp_melee_def() -> ActionDefinition {
    ActionDefinition {
        amount: 5,
        range: 2.0,
        duration_seconds: 0.8,
        exec_time_seconds: 0.4,
        action_interruptible: true,
        anim: "Attack1".into(),
        ..ActionDefinition::new(ActionType::ImpBaseAttack, LogicKind::Melee)
    }
}

/// Chase prototype.
pub fn chase_def() -> ActionDefinition {
    ActionDefinition {
        action_interruptible: true,
        is_friendly: true,
        ..ActionDefinition::new(ActionType::GeneralChase, LogicKind::Chase)
    }
}

/// Target prototype: leaves the blocking slot as soon as it starts.
pub fn target_def() -> ActionDefinition {
    ActionDefinition {
        action_interruptible: true,
        blocking_mode: BlockingMode::OnlyDuringExecTime,
        is_friendly: true,
        ..ActionDefinition::new(ActionType::GeneralTarget, LogicKind::Target)
    }
}

/// Revive: brings a fainted ally back with 30 HP at 1 s of 1.5 s.
pub fn revive_def() -> ActionDefinition {
    ActionDefinition {
        amount: 30,
        range: 2.0,
        duration_seconds: 1.5,
        exec_time_seconds: 1.0,
        is_friendly: true,
        anim: "Revive".into(),
        anim2: "ReviveEnd".into(),
        ..ActionDefinition::new(ActionType::GeneralRevive, LogicKind::Revive)
    }
}

/// Stun prototype: takes double damage for 3 s.
pub fn stun_def() -> ActionDefinition {
    ActionDefinition {
        amount: 2,
        duration_seconds: 3.0,
        anim: "Stunned".into(),
        anim2: "StunEnd".into(),
        ..ActionDefinition::new(ActionType::Stun, LogicKind::Stunned)
    }
}

/// Shield charge: fully charged after 1 s, lingers 2 s.
pub fn shield_def() -> ActionDefinition {
    ActionDefinition {
        exec_time_seconds: 1.0,
        effect_duration_seconds: 2.0,
        anim: "ShieldCharge".into(),
        anim2: "ShieldEnd".into(),
        other_animator_variable: "Invincible".into(),
        ..ActionDefinition::new(ActionType::TankShieldBuff, LogicKind::ChargedShield)
    }
}

/// Area attack: 5 m range, 2 m radius, 15 damage at 0.5 s.
pub fn aoe_def() -> ActionDefinition {
    ActionDefinition {
        amount: 15,
        range: 5.0,
        radius: 2.0,
        duration_seconds: 1.0,
        exec_time_seconds: 0.5,
        anim: "Cast".into(),
        ..ActionDefinition::new(ActionType::ArcherVolley, LogicKind::AoE)
    }
}

/// Imp boss trample: 0.5 s windup, 1 s charge at 8 m/s.
pub fn trample_def() -> ActionDefinition {
    ActionDefinition {
        amount: 20,
        splash_damage: 8,
        duration_seconds: 1.5,
        exec_time_seconds: 0.5,
        move_speed: 8.0,
        knockback_speed: 6.0,
        knockback_duration: 0.3,
        anim: "Trample".into(),
        anim2: "TrampleEnd".into(),
        ..ActionDefinition::new(ActionType::ImpBossTrampleAttack, LogicKind::Trample)
    }
}

/// A table holding the standard prototypes plus the given definitions.
pub fn table_with(definitions: Vec<ActionDefinition>) -> Arc<DefinitionTable> {
    let mut table = DefinitionTable::new();
    for definition in [chase_def(), target_def(), stun_def()]
        .into_iter()
        .chain(definitions)
    {
        table.insert(definition).expect("valid test definition");
    }
    Arc::new(table)
}

/// The table used by the scenario tests.
pub fn standard_table() -> Arc<DefinitionTable> {
    table_with(vec![
        melee_def(),
        imp_melee_def(),
        shield_def(),
        aoe_def(),
        trample_def(),
        revive_def(),
        ActionDefinition {
            exec_time_seconds: 1.0,
            duration_seconds: 0.0,
            anim: "ChargeShot".into(),
            projectiles: vec![projectile("ArrowWeak", 5), projectile("ArrowStrong", 15)],
            ..ActionDefinition::new(
                ActionType::ArcherChargedShot,
                LogicKind::ChargedLaunchProjectile,
            )
        },
        ActionDefinition {
            exec_time_seconds: 0.2,
            duration_seconds: 0.6,
            anim: "Shoot".into(),
            projectiles: vec![projectile("Arrow", 7)],
            ..ActionDefinition::new(ActionType::ArcherBaseAttack, LogicKind::RangedTargeted)
        },
        ActionDefinition {
            exec_time_seconds: 0.4,
            duration_seconds: 1.0,
            reuse_time_seconds: 3.0,
            blocking_mode: BlockingMode::OnlyDuringExecTime,
            anim: "Stealth".into(),
            ..ActionDefinition::new(ActionType::RogueStealthMode, LogicKind::StealthMode)
        },
        ActionDefinition {
            amount: 25,
            range: 6.0,
            radius: 2.0,
            duration_seconds: 0.6,
            exec_time_seconds: 0.3,
            anim: "Dash".into(),
            ..ActionDefinition::new(ActionType::RogueDashAttack, LogicKind::DashAttack)
        },
    ])
}

// =============================================================================
// Simulation Setup
// =============================================================================

/// A tank at the origin facing +Z and an imp 2 m in front of it.
///
/// # Returns
///
/// `(simulation, tank, imp)`.
pub fn duel(seed: u64) -> (Simulation, EntityId, EntityId) {
    let mut sim = Simulation::new(seed, standard_table());
    let tank = sim.spawn_character(EntityTag::Hero, Vec3::ZERO, 100);
    let imp = sim.spawn_character(EntityTag::Npc, Vec3::new(0.0, 0.0, 2.0), 30);
    (sim, tank, imp)
}
