//! Fixed-step host that owns one action player per character.
//!
//! The `Simulation` wires [`ServerActionPlayer`]s to an [`Arena`] and applies
//! the character rules that sit around a player:
//!
//! - requests are ignored while the character is down or being shoved
//! - hostile requests raise `UsingAttackAction` before they are played
//! - received hit points raise `AttackedByEnemy`/`Healed` synchronously and are
//!   scaled by the victim's buffs
//! - a character that faints or dies drops everything it was doing
//!
//! # Tick
//!
//! Each [`step`](Simulation::step):
//!
//! 1. **INTEGRATE**: advance movement and projectiles by [`FIXED_DT`]
//! 2. **CONTACTS**: deliver new charge contacts to the charger's player
//! 3. **PROJECTILES**: apply projectile hits through the health rules
//! 4. **UPDATE**: run `on_update` for every player in entity id order
//!
//! # Re-entrancy
//!
//! A player is taken out of the player map while its callbacks run, so a
//! behavior can damage another character and that character's player reacts
//! at once. Notifications aimed at the running player itself are queued and
//! delivered when its callback returns. Its own buffs do not scale
//! self-inflicted changes.
//!
//! # Determinism
//!
//! Entities are iterated in id order and every player RNG is derived from
//! the master seed and the entity id, so the same seed and inputs replay
//! identically.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use glam::Vec3;
//! use riposte_core::definition::DefinitionTable;
//! use riposte_core::entity::EntityTag;
//! use riposte_core::simulation::Simulation;
//!
//! let mut sim = Simulation::new(42, Arc::new(DefinitionTable::new()));
//! let hero = sim.spawn_character(EntityTag::Hero, Vec3::ZERO, 100);
//!
//! for _ in 0..10 {
//!     sim.step();
//! }
//!
//! assert_eq!(sim.tick(), 10);
//! assert!(sim.player(hero).is_some());
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use glam::Vec3;
use tracing::{debug, trace};

use crate::arena::Arena;
use crate::behavior::{BehaviorRegistry, BuffableValue, GameplayActivity};
use crate::definition::{DefinitionTable, LogicKind, ProjectileInfo};
use crate::entity::{EntityId, EntitySnapshot, EntityTag, LifeState};
use crate::error::ActionError;
use crate::events::EventRecord;
use crate::request::ActionRequest;
use crate::server_player::{PlayOutcome, PlayerConfig, ServerActionPlayer};
use crate::world::{
    ActionBroadcast, CancelScope, CharacterControl, EntityDirectory, HealthSink, Layers,
    MovementController, ProjectileLauncher, SpatialQuery,
};
use crate::FIXED_DT;

/// Cue played on a character that takes damage.
pub const HIT_REACT_CUE: &str = "HitReact1";

// =============================================================================
// Simulation
// =============================================================================

/// An arena plus the action players of its characters.
pub struct Simulation {
    arena: Arena,
    players: BTreeMap<EntityId, ServerActionPlayer>,
    definitions: Arc<DefinitionTable>,
    registry: Arc<BehaviorRegistry>,
    config: PlayerConfig,
}

impl fmt::Debug for Simulation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Simulation")
            .field("tick", &self.tick())
            .field("entity_count", &self.arena.entity_count())
            .field("player_count", &self.players.len())
            .field("definition_count", &self.definitions.len())
            .field("master_seed", &self.config.seed)
            .finish()
    }
}

impl Simulation {
    /// Creates a simulation with the built-in behaviors and default tuning.
    ///
    /// # Arguments
    ///
    /// * `seed` - Master seed every player RNG is derived from
    /// * `definitions` - The ability definitions shared by every player
    ///
    /// # Example
    ///
    /// ```
    /// use std::sync::Arc;
    /// use riposte_core::definition::DefinitionTable;
    /// use riposte_core::simulation::Simulation;
    ///
    /// let sim = Simulation::new(12345, Arc::new(DefinitionTable::new()));
    /// assert_eq!(sim.tick(), 0);
    /// assert_eq!(sim.seed(), 12345);
    /// ```
    #[must_use]
    pub fn new(seed: u64, definitions: Arc<DefinitionTable>) -> Self {
        Self::with_config(
            definitions,
            Arc::new(BehaviorRegistry::standard()),
            PlayerConfig::default().with_seed(seed),
        )
    }

    /// Creates a simulation with a custom registry and configuration.
    #[must_use]
    pub fn with_config(
        definitions: Arc<DefinitionTable>,
        registry: Arc<BehaviorRegistry>,
        config: PlayerConfig,
    ) -> Self {
        Self {
            arena: Arena::new(),
            players: BTreeMap::new(),
            definitions,
            registry,
            config,
        }
    }

    /// Spawns a character with `hp` hit points and gives it an action player.
    pub fn spawn_character(&mut self, tag: EntityTag, position: Vec3, hp: i32) -> EntityId {
        let id = self.arena.spawn_damageable(tag, position, hp);
        self.players.insert(
            id,
            ServerActionPlayer::new(
                id,
                Arc::clone(&self.definitions),
                Arc::clone(&self.registry),
                self.config,
            ),
        );
        debug!(entity = %id, tag = %tag, "character spawned");
        id
    }

    // -------------------------------------------------------------------------
    // Inputs
    // -------------------------------------------------------------------------

    /// Hands a request to the entity's player.
    ///
    /// Requests from characters that are down or in forced movement are
    /// discarded. Hostile requests first tell the running actions that the
    /// character is attacking.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError::UnknownEntity`] if `entity` has no player, or the
    /// player's error for a missing or unusable definition.
    pub fn request_action(
        &mut self,
        entity: EntityId,
        request: ActionRequest,
    ) -> Result<PlayOutcome, ActionError> {
        let is_friendly = self.definitions.require(request.action_type)?.is_friendly;
        if !self.players.contains_key(&entity) {
            return Err(ActionError::UnknownEntity(entity));
        }
        if !self.can_act(entity) {
            debug!(entity = %entity, action = %request.action_type, "cannot act, request dropped");
            return Ok(PlayOutcome::Discarded);
        }
        if request.cancel_movement {
            self.arena.cancel_move(entity);
        }

        let now = self.now();
        let (arena, players) = (&mut self.arena, &mut self.players);
        if !is_friendly {
            dispatch(arena, players, now, entity, |player, world| {
                player.on_gameplay_activity(world, now, GameplayActivity::UsingAttackAction);
            });
        }
        dispatch(arena, players, now, entity, |player, world| {
            player.play_action(world, now, request)
        })
        .unwrap_or(Err(ActionError::UnknownEntity(entity)))
    }

    /// Walks the entity to `destination`.
    ///
    /// An interruptible blocking action is cancelled and the target selection
    /// is dropped. Ignored while the character cannot act.
    pub fn request_move(&mut self, entity: EntityId, destination: Vec3) {
        if !self.can_act(entity) {
            return;
        }
        let now = self.now();
        let definitions = Arc::clone(&self.definitions);
        dispatch(&mut self.arena, &mut self.players, now, entity, |player, world| {
            let interruptible = player
                .active_request()
                .and_then(|request| definitions.get(request.action_type))
                .is_some_and(|def| def.action_interruptible);
            if interruptible {
                player.clear_actions(world, now, false);
            }
            player.cancel_running_actions_by_logic(world, now, LogicKind::Target, true, None);
        });
        self.arena.set_movement_target(entity, destination);
    }

    /// Tells the entity's actions that the charge-up input was released.
    pub fn stop_charging(&mut self, entity: EntityId) {
        let now = self.now();
        dispatch(&mut self.arena, &mut self.players, now, entity, |player, world| {
            player.on_gameplay_activity(world, now, GameplayActivity::StoppedChargingUp);
        });
    }

    fn can_act(&self, entity: EntityId) -> bool {
        self.arena.life_state(entity) == Some(LifeState::Alive)
            && !self.arena.is_performing_forced_movement(entity)
    }

    // -------------------------------------------------------------------------
    // Stepping
    // -------------------------------------------------------------------------

    /// Advances the simulation by one fixed step.
    pub fn step(&mut self) {
        let tick = self.arena.current_tick() + 1;
        #[allow(clippy::cast_precision_loss)]
        let now = tick as f32 * FIXED_DT;

        // PHASE 1: INTEGRATE
        let report = self.arena.integrate(FIXED_DT);

        // PHASE 2: CONTACTS
        for (charger, collision) in &report.contacts {
            trace!(entity = %charger, other = %collision.other, "contact");
            dispatch(&mut self.arena, &mut self.players, now, *charger, |player, world| {
                player.collision_entered(world, now, collision);
            });
        }

        // PHASE 3: PROJECTILES
        for hit in &report.projectile_hits {
            let mut world = SimWorld::new(&mut self.arena, &mut self.players, now, None);
            world.receive_hp(hit.victim, Some(hit.owner), -hit.damage);
        }

        // PHASE 4: UPDATE
        let ids: Vec<EntityId> = self.players.keys().copied().collect();
        for id in ids {
            dispatch(&mut self.arena, &mut self.players, now, id, |player, world| {
                player.on_update(world, now);
            });
        }

        self.arena.advance_tick();
    }

    /// Steps for `seconds` of simulated time, rounded to whole steps.
    pub fn run_for(&mut self, seconds: f32) {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let steps = (seconds / FIXED_DT).round().max(0.0) as u64;
        for _ in 0..steps {
            self.step();
        }
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    /// The world state.
    #[must_use]
    pub fn arena(&self) -> &Arena {
        &self.arena
    }

    /// Mutable world state, for setup between steps.
    #[must_use]
    pub fn arena_mut(&mut self) -> &mut Arena {
        &mut self.arena
    }

    /// The action player of `entity`.
    #[must_use]
    pub fn player(&self, entity: EntityId) -> Option<&ServerActionPlayer> {
        self.players.get(&entity)
    }

    /// The buffed value of `kind` for `entity`.
    #[must_use]
    pub fn buffed_value(&self, entity: EntityId, kind: BuffableValue) -> Option<f32> {
        self.players
            .get(&entity)
            .map(|player| player.buffed_value(self.now(), kind))
    }

    /// Simulated seconds since the first step.
    #[must_use]
    pub fn now(&self) -> f32 {
        #[allow(clippy::cast_precision_loss)]
        let now = self.arena.current_tick() as f32 * FIXED_DT;
        now
    }

    /// Steps taken so far.
    #[must_use]
    pub fn tick(&self) -> u64 {
        self.arena.current_tick()
    }

    /// The master seed.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.config.seed
    }

    /// The shared definition table.
    #[must_use]
    pub fn definitions(&self) -> &Arc<DefinitionTable> {
        &self.definitions
    }

    /// Takes every recorded world event, oldest first.
    pub fn drain_events(&mut self) -> Vec<EventRecord> {
        self.arena.drain_events()
    }
}

// =============================================================================
// Player-Aware World
// =============================================================================

/// Work for the running player that must wait until its callback returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Deferred {
    Activity(GameplayActivity),
    Downed,
}

/// The arena as seen by a running player.
///
/// Everything is delegated to the arena except health and buffs, which are
/// routed through the victim's player.
struct SimWorld<'a> {
    arena: &'a mut Arena,
    players: &'a mut BTreeMap<EntityId, ServerActionPlayer>,
    now: f32,
    active: Option<EntityId>,
    deferred: Vec<Deferred>,
}

impl<'a> SimWorld<'a> {
    fn new(
        arena: &'a mut Arena,
        players: &'a mut BTreeMap<EntityId, ServerActionPlayer>,
        now: f32,
        active: Option<EntityId>,
    ) -> Self {
        Self {
            arena,
            players,
            now,
            active,
            deferred: Vec::new(),
        }
    }

    /// Notifies the victim's player and returns its modifier for `kind`.
    fn react(&mut self, target: EntityId, activity: GameplayActivity, kind: BuffableValue) -> f32 {
        if self.active == Some(target) {
            self.deferred.push(Deferred::Activity(activity));
            return 1.0;
        }
        let now = self.now;
        dispatch(&mut *self.arena, &mut *self.players, now, target, |player, world| {
            player.on_gameplay_activity(world, now, activity);
            player.buffed_value(now, kind)
        })
        .unwrap_or(1.0)
    }

    fn downed(&mut self, target: EntityId) {
        debug!(entity = %target, "downed, clearing actions");
        if self.active == Some(target) {
            self.deferred.push(Deferred::Downed);
            return;
        }
        let now = self.now;
        dispatch(&mut *self.arena, &mut *self.players, now, target, |player, world| {
            player.clear_actions(world, now, true);
        });
    }
}

/// Runs `f` on the player of `id` with the player taken out of the map.
///
/// Returns `None` if `id` has no player (or its player is already running).
fn dispatch<R>(
    arena: &mut Arena,
    players: &mut BTreeMap<EntityId, ServerActionPlayer>,
    now: f32,
    id: EntityId,
    f: impl FnOnce(&mut ServerActionPlayer, &mut SimWorld<'_>) -> R,
) -> Option<R> {
    let mut player = players.remove(&id)?;
    let mut world = SimWorld::new(arena, players, now, Some(id));
    let result = f(&mut player, &mut world);

    while !world.deferred.is_empty() {
        for deferred in std::mem::take(&mut world.deferred) {
            match deferred {
                Deferred::Activity(activity) => {
                    player.on_gameplay_activity(&mut world, now, activity);
                }
                Deferred::Downed => player.clear_actions(&mut world, now, true),
            }
        }
    }

    players.insert(id, player);
    Some(result)
}

impl EntityDirectory for SimWorld<'_> {
    fn entity(&self, id: EntityId) -> Option<EntitySnapshot> {
        self.arena.entity(id)
    }

    fn buffed_value(&self, id: EntityId, kind: BuffableValue) -> Option<f32> {
        self.players
            .get(&id)
            .map(|player| player.buffed_value(self.now, kind))
    }
}

impl SpatialQuery for SimWorld<'_> {
    fn overlap_sphere(&self, center: Vec3, radius: f32, layers: Layers) -> Vec<EntityId> {
        self.arena.overlap_sphere(center, radius, layers)
    }

    fn sweep(
        &self,
        origin: Vec3,
        direction: Vec3,
        range: f32,
        half_extent: f32,
        layers: Layers,
    ) -> Vec<EntityId> {
        self.arena.sweep(origin, direction, range, half_extent, layers)
    }

    fn raycast(&self, from: Vec3, to: Vec3) -> Option<Vec3> {
        self.arena.raycast(from, to)
    }
}

impl MovementController for SimWorld<'_> {
    fn set_movement_target(&mut self, entity: EntityId, destination: Vec3) {
        self.arena.set_movement_target(entity, destination);
    }

    fn follow_target(&mut self, entity: EntityId, target: EntityId) {
        self.arena.follow_target(entity, target);
    }

    fn cancel_move(&mut self, entity: EntityId) {
        self.arena.cancel_move(entity);
    }

    fn teleport(&mut self, entity: EntityId, position: Vec3) {
        self.arena.teleport(entity, position);
    }

    fn look_at(&mut self, entity: EntityId, point: Vec3) {
        self.arena.look_at(entity, point);
    }

    fn set_forward(&mut self, entity: EntityId, forward: Vec3) {
        self.arena.set_forward(entity, forward);
    }

    fn start_forward_charge(&mut self, entity: EntityId, speed: f32, duration: f32) {
        self.arena.start_forward_charge(entity, speed, duration);
    }

    fn start_knockback(&mut self, entity: EntityId, source: Vec3, speed: f32, duration: f32) {
        self.arena.start_knockback(entity, source, speed, duration);
    }

    fn is_performing_forced_movement(&self, entity: EntityId) -> bool {
        self.arena.is_performing_forced_movement(entity)
    }

    fn is_moving(&self, entity: EntityId) -> bool {
        self.arena.is_moving(entity)
    }
}

impl HealthSink for SimWorld<'_> {
    fn receive_hp(&mut self, target: EntityId, inflicter: Option<EntityId>, delta: i32) {
        let live_character = self
            .arena
            .snapshot(target)
            .is_some_and(|s| s.is_character() && s.life_state == LifeState::Alive);
        if !live_character {
            self.arena.apply_hp(target, inflicter, delta);
            return;
        }

        let modifier = if delta > 0 {
            self.react(target, GameplayActivity::Healed, BuffableValue::PercentHealingReceived)
        } else {
            self.react(target, GameplayActivity::AttackedByEnemy, BuffableValue::PercentDamageReceived)
        };
        #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
        let scaled = (delta as f32 * modifier) as i32;
        if delta < 0 {
            self.arena.play_cue(target, HIT_REACT_CUE);
        }
        trace!(entity = %target, delta, scaled, "hp received");

        let downed = self
            .arena
            .apply_hp(target, inflicter, scaled)
            .is_some_and(|outcome| outcome.downed);
        if downed {
            self.downed(target);
        }
    }

    fn revive(&mut self, target: EntityId, inflicter: Option<EntityId>, hp: i32) {
        self.arena.revive(target, inflicter, hp);
    }
}

impl CharacterControl for SimWorld<'_> {
    fn set_target(&mut self, entity: EntityId, target: Option<EntityId>) {
        self.arena.set_target(entity, target);
    }

    fn set_stealthed(&mut self, entity: EntityId, stealthed: bool) {
        self.arena.set_stealthed(entity, stealthed);
    }

    fn attach(&mut self, holder: EntityId, object: EntityId) -> bool {
        self.arena.attach(holder, object)
    }

    fn detach(&mut self, holder: EntityId) {
        self.arena.detach(holder);
    }
}

impl ActionBroadcast for SimWorld<'_> {
    fn play_cue(&mut self, entity: EntityId, cue: &str) {
        self.arena.play_cue(entity, cue);
    }

    fn reset_cue(&mut self, entity: EntityId, cue: &str) {
        self.arena.reset_cue(entity, cue);
    }

    fn adjust_animator_counter(&mut self, entity: EntityId, variable: &str, delta: i32) {
        self.arena.adjust_animator_counter(entity, variable, delta);
    }

    fn broadcast_action(&mut self, entity: EntityId, request: &ActionRequest) {
        self.arena.broadcast_action(entity, request);
    }

    fn broadcast_charge_stopped(&mut self, entity: EntityId, percent: f32) {
        self.arena.broadcast_charge_stopped(entity, percent);
    }

    fn broadcast_cancel(&mut self, entity: EntityId, scope: CancelScope) {
        self.arena.broadcast_cancel(entity, scope);
    }
}

impl ProjectileLauncher for SimWorld<'_> {
    fn launch_projectile(
        &mut self,
        owner: EntityId,
        info: &ProjectileInfo,
        origin: Vec3,
        direction: Vec3,
    ) {
        self.arena.launch_projectile(owner, info, origin, direction);
    }

    fn toss(&mut self, owner: EntityId, prefab: &str, origin: Vec3, forward: Vec3) {
        self.arena.toss(owner, prefab, origin, forward);
    }
}

// =============================================================================
// Tests
// =============================================================================
