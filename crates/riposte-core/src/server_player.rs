//! Per-entity action queue on the server.
//!
//! A [`ServerActionPlayer`] owns everything one character is doing:
//!
//! - the **queue**, whose head holds the blocking slot
//! - the **background** set of actions that released the slot but still run
//! - reuse timestamps, a pending chained request and a seeded RNG
//!
//! # Architecture
//!
//! Every public operation receives the world and the current time, runs the
//! affected behavior callbacks synchronously, then flushes the
//! [`PlayerCommand`]s those callbacks issued (cancelling sibling actions).
//!
//! ```text
//! play_action ──▶ [interrupt head?] ──▶ [depth cap] ──▶ queue.push_back
//!                                                      │
//!                              only entry? ──▶ start_head
//!
//! start_head: reuse check ─▶ synthesize Target ─▶ synthesize Chase ─▶ start
//!             (skip)          (single new target)   (should_close)    (decline = skip)
//! ```
//!
//! Per action the lifecycle is `Idle → Blocking → [Background] → Idle`, with
//! cancellation short-circuiting back to `Idle` and a chained request
//! re-entering `Blocking` on the next update.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use glam::Vec3;
//! use riposte_core::arena::Arena;
//! use riposte_core::behavior::BehaviorRegistry;
//! use riposte_core::definition::{ActionDefinition, DefinitionTable, LogicKind};
//! use riposte_core::entity::EntityTag;
//! use riposte_core::request::{ActionRequest, ActionType};
//! use riposte_core::server_player::{PlayOutcome, PlayerConfig, ServerActionPlayer};
//!
//! let mut table = DefinitionTable::new();
//! table
//!     .insert(ActionDefinition {
//!         duration_seconds: 1.0,
//!         anim: "Wave".into(),
//!         ..ActionDefinition::new(ActionType::Emote1, LogicKind::Emote)
//!     })
//!     .unwrap();
//!
//! let mut arena = Arena::new();
//! let hero = arena.spawn_damageable(EntityTag::Hero, Vec3::ZERO, 100);
//! let mut player = ServerActionPlayer::new(
//!     hero,
//!     Arc::new(table),
//!     Arc::new(BehaviorRegistry::standard()),
//!     PlayerConfig::default(),
//! );
//!
//! let outcome = player
//!     .play_action(&mut arena, 0.0, ActionRequest::new(ActionType::Emote1))
//!     .unwrap();
//! assert_eq!(outcome, PlayOutcome::Started);
//!
//! player.on_update(&mut arena, 1.0);
//! assert_eq!(player.running_action_count(), 0);
//! ```

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::behavior::{
    ActionBehavior, ActionContext, ActionCore, BehaviorRegistry, BuffableValue, GameplayActivity,
    InstanceId, PlayerCommand,
};
use crate::definition::{BlockingMode, DefinitionTable, LogicKind};
use crate::entity::EntityId;
use crate::error::ActionError;
use crate::request::{ActionRequest, ActionType, RequestId};
use crate::world::{Collision, World};

/// Queued blocking time (seconds) at which new requests are discarded.
pub const DEFAULT_MAX_QUEUE_TIME_DEPTH: f32 = 1.6;

/// Seconds a client keeps an unconfirmed anticipated action alive.
pub const DEFAULT_ANTICIPATION_TIMEOUT: f32 = 1.0;

/// Mixes an entity id into the host seed.
const SEED_MIX: u64 = 0x9E37_79B9_7F4A_7C15;

// =============================================================================
// Configuration
// =============================================================================

/// Tuning shared by every player of a host.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Requests are discarded once this much blocking time is queued.
    /// Default: 1.6 s.
    pub max_queue_time_depth: f32,
    /// How long a client waits for confirmation of an anticipated action.
    /// Default: 1.0 s.
    pub anticipation_timeout: f32,
    /// Host seed; each entity's RNG is derived from it and the entity id.
    pub seed: u64,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            max_queue_time_depth: DEFAULT_MAX_QUEUE_TIME_DEPTH,
            anticipation_timeout: DEFAULT_ANTICIPATION_TIMEOUT,
            seed: 0,
        }
    }
}

impl PlayerConfig {
    /// Returns a copy with a different host seed.
    #[must_use]
    pub const fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// The RNG seed of `entity`.
    #[must_use]
    pub const fn entity_seed(&self, entity: EntityId) -> u64 {
        self.seed ^ entity.as_u64().wrapping_mul(SEED_MIX)
    }
}

/// What happened to a played request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlayOutcome {
    /// The request is running, blocking or in the background.
    Started,
    /// The request waits behind other actions.
    Queued,
    /// The request was dropped: queue full, on cooldown or declined.
    Discarded,
}

// =============================================================================
// Running Actions
// =============================================================================

struct RunningAction {
    instance: InstanceId,
    core: ActionCore,
    behavior: Box<dyn ActionBehavior>,
    started: bool,
    /// A target selection was already put in front of this action.
    target_synthesized: bool,
}

impl RunningAction {
    /// Seconds this action occupies the blocking slot.
    fn blocking_time(&self) -> f32 {
        let def = self.core.definition();
        match def.blocking_mode {
            BlockingMode::OnlyDuringExecTime => def.exec_time_seconds,
            BlockingMode::EntireDuration => def.duration_seconds,
        }
    }

    /// Runs one behavior callback with a freshly assembled context.
    fn with_ctx<R>(
        &mut self,
        now: f32,
        world: &mut dyn World,
        rng: &mut ChaCha8Rng,
        commands: &mut Vec<PlayerCommand>,
        running: usize,
        f: impl FnOnce(&mut dyn ActionBehavior, &mut ActionCore, &mut ActionContext<'_>) -> R,
    ) -> R {
        let mut ctx = ActionContext::new(now, world, rng, running, self.instance, commands);
        f(self.behavior.as_mut(), &mut self.core, &mut ctx)
    }
}

impl fmt::Debug for RunningAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunningAction")
            .field("instance", &self.instance)
            .field("action", &self.core.action_type())
            .field("request", &self.core.request.id)
            .field("started", &self.started)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Server Action Player
// =============================================================================

/// Queue, blocking slot and background actions of one entity.
pub struct ServerActionPlayer {
    owner: EntityId,
    config: PlayerConfig,
    definitions: Arc<DefinitionTable>,
    registry: Arc<BehaviorRegistry>,
    queue: VecDeque<RunningAction>,
    background: Vec<RunningAction>,
    last_used: HashMap<ActionType, f32>,
    pending_chain: Option<ActionRequest>,
    next_request: u64,
    next_instance: u64,
    rng: ChaCha8Rng,
    commands: Vec<PlayerCommand>,
}

impl fmt::Debug for ServerActionPlayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerActionPlayer")
            .field("owner", &self.owner)
            .field("queue", &self.queue)
            .field("background", &self.background)
            .field("pending_chain", &self.pending_chain)
            .finish_non_exhaustive()
    }
}

impl ServerActionPlayer {
    /// Creates an idle player for `owner`.
    #[must_use]
    pub fn new(
        owner: EntityId,
        definitions: Arc<DefinitionTable>,
        registry: Arc<BehaviorRegistry>,
        config: PlayerConfig,
    ) -> Self {
        Self {
            owner,
            config,
            definitions,
            registry,
            queue: VecDeque::new(),
            background: Vec::new(),
            last_used: HashMap::new(),
            pending_chain: None,
            next_request: 0,
            next_instance: 0,
            rng: ChaCha8Rng::seed_from_u64(config.entity_seed(owner)),
            commands: Vec::new(),
        }
    }

    /// The entity this player drives.
    #[must_use]
    pub const fn owner(&self) -> EntityId {
        self.owner
    }

    /// The player's configuration.
    #[must_use]
    pub const fn config(&self) -> &PlayerConfig {
        &self.config
    }

    // -------------------------------------------------------------------------
    // Playing
    // -------------------------------------------------------------------------

    /// Plays or queues a request.
    ///
    /// A request that does not ask to queue interrupts the head when the head
    /// is interruptible (or names the new type in `interruptible_by`).
    /// Unnumbered requests receive a server-issued [`RequestId`].
    ///
    /// # Errors
    ///
    /// Returns an [`ActionError`] if the action type has no definition or its
    /// behavior cannot be built. Nothing is interrupted in that case.
    pub fn play_action(
        &mut self,
        world: &mut dyn World,
        now: f32,
        request: ActionRequest,
    ) -> Result<PlayOutcome, ActionError> {
        let outcome = self.enqueue(world, now, request);
        self.flush_commands(world, now);
        outcome
    }

    fn enqueue(
        &mut self,
        world: &mut dyn World,
        now: f32,
        mut request: ActionRequest,
    ) -> Result<PlayOutcome, ActionError> {
        let definition = Arc::clone(self.definitions.require(request.action_type)?);
        let behavior = self.registry.build(&definition)?;

        if !request.should_queue {
            let interrupts = self.queue.front().is_some_and(|head| {
                let def = head.core.definition();
                def.action_interruptible || def.can_be_interrupted_by(request.action_type)
            });
            if interrupts {
                debug!(entity = %self.owner, action = %request.action_type, "interrupting queue");
                self.clear(world, now, false);
            }
        }

        let depth = self.queue_time_depth(now);
        if depth >= self.config.max_queue_time_depth {
            debug!(
                entity = %self.owner,
                action = %request.action_type,
                depth,
                "queue full, request discarded"
            );
            return Ok(PlayOutcome::Discarded);
        }

        if request.id.is_unassigned() {
            request.id = self.mint_request_id();
        }
        let instance = self.mint_instance();
        trace!(entity = %self.owner, request = %request.id, action = %request.action_type, "queued");
        self.queue.push_back(RunningAction {
            instance,
            core: ActionCore::new(self.owner, request, definition),
            behavior,
            started: false,
            target_synthesized: false,
        });
        if self.queue.len() == 1 {
            self.start_head(world, now);
        }
        Ok(self.locate(instance))
    }

    fn locate(&self, instance: InstanceId) -> PlayOutcome {
        let head = self.queue.front().is_some_and(|h| h.instance == instance && h.started);
        if head || self.background.iter().any(|a| a.instance == instance) {
            PlayOutcome::Started
        } else if self.queue.iter().any(|a| a.instance == instance) {
            PlayOutcome::Queued
        } else {
            PlayOutcome::Discarded
        }
    }

    fn mint_request_id(&mut self) -> RequestId {
        self.next_request += 1;
        RequestId::server(self.next_request)
    }

    fn mint_instance(&mut self) -> InstanceId {
        self.next_instance += 1;
        InstanceId::new(self.next_instance)
    }

    /// Builds a player-issued request (target or chase) in front of the head.
    fn synthesized(&mut self, mut request: ActionRequest) -> Option<RunningAction> {
        let Some(definition) = self.definitions.get(request.action_type).map(Arc::clone) else {
            warn!(entity = %self.owner, action = %request.action_type, "no prototype to synthesize");
            return None;
        };
        let behavior = match self.registry.build(&definition) {
            Ok(behavior) => behavior,
            Err(error) => {
                warn!(entity = %self.owner, %error, "cannot synthesize action");
                return None;
            }
        };
        request.id = self.mint_request_id();
        Some(RunningAction {
            instance: self.mint_instance(),
            core: ActionCore::new(self.owner, request, definition),
            behavior,
            started: false,
            target_synthesized: false,
        })
    }

    /// Inserts a target action when the head names a single valid target the
    /// owner has not selected yet. Returns the head's new index.
    ///
    /// A request gets at most one target selection. Targets that are gone,
    /// down or unknown are left for the head's own behavior to deal with.
    fn synthesize_target(&mut self, world: &dyn World) -> usize {
        let Some(head) = self.queue.front_mut() else {
            return 0;
        };
        if head.target_synthesized || head.core.logic() == LogicKind::Target {
            return 0;
        }
        let &[target] = head.core.request.target_ids.as_slice() else {
            return 0;
        };
        let current = world.entity(self.owner).and_then(|o| o.target);
        if current == Some(target) {
            return 0;
        }
        if !world.entity(target).is_some_and(|t| t.is_valid_target()) {
            debug!(entity = %self.owner, target = %target, "target does not resolve, not selected");
            return 0;
        }
        head.target_synthesized = true;

        let request = ActionRequest::new(ActionType::GeneralTarget).with_target(target);
        match self.synthesized(request) {
            Some(action) => {
                debug!(entity = %self.owner, target = %target, "synthesized target");
                self.queue.push_front(action);
                1
            }
            None => 0,
        }
    }

    /// Inserts a chase in front of the action at `index` when it asks to
    /// close distance. The request only gets one chase.
    fn synthesize_chase(&mut self, index: usize) {
        let Some(base) = self.queue.get_mut(index) else {
            return;
        };
        let request = &mut base.core.request;
        if !request.should_close || request.target_ids.is_empty() {
            return;
        }
        request.should_close = false;
        let chase = ActionRequest::new(ActionType::GeneralChase)
            .with_targets(request.target_ids.clone())
            .with_amount(base.core.definition().range);

        if let Some(action) = self.synthesized(chase) {
            debug!(entity = %self.owner, "synthesized chase");
            self.queue.insert(index, action);
        }
    }

    /// Starts the head, skipping entries on cooldown or that decline.
    fn start_head(&mut self, world: &mut dyn World, now: f32) {
        while let Some(head) = self.queue.front() {
            let action_type = head.core.action_type();
            if !self.is_reuse_time_elapsed(action_type, now) {
                debug!(entity = %self.owner, action = %action_type, "on cooldown, skipped");
                self.queue.pop_front();
                continue;
            }

            let index = self.synthesize_target(world);
            self.synthesize_chase(index);

            let running = self.running_action_count();
            let Some(head) = self.queue.front_mut() else {
                return;
            };
            let action_type = head.core.action_type();
            head.core.set_time_started(now);
            let started = head.with_ctx(now, world, &mut self.rng, &mut self.commands, running, |b, core, ctx| {
                b.start(core, ctx)
            });
            if !started {
                debug!(entity = %self.owner, action = %action_type, "declined");
                self.queue.pop_front();
                continue;
            }
            head.started = true;
            debug!(entity = %self.owner, action = %action_type, request = %head.core.request.id, "started");

            let def = head.core.definition();
            let instant_background =
                def.exec_time_seconds == 0.0 && def.blocking_mode == BlockingMode::OnlyDuringExecTime;
            if def.action_interruptible && !world.is_performing_forced_movement(self.owner) {
                world.cancel_move(self.owner);
            }
            self.last_used.insert(action_type, now);

            if !instant_background {
                return;
            }
            if let Some(head) = self.queue.pop_front() {
                self.background.push(head);
            }
        }
    }

    /// Starts the next head unless a pending chain is about to supersede it.
    fn start_next(&mut self, world: &mut dyn World, now: f32) {
        if self.pending_chain.as_ref().map_or(true, |chain| chain.should_queue) {
            self.start_head(world, now);
        }
    }

    /// Ends the head, records its chain and starts the next one.
    fn finish_head(&mut self, world: &mut dyn World, now: f32) {
        let running = self.running_action_count();
        if let Some(mut head) = self.queue.pop_front() {
            let chained = head.with_ctx(now, world, &mut self.rng, &mut self.commands, running, |b, core, ctx| {
                b.end(core, ctx);
                b.chain_into_new_action(core)
            });
            trace!(entity = %self.owner, action = %head.core.action_type(), "ended");
            if let Some(chained) = chained {
                self.pending_chain = Some(chained);
            }
        }
        self.start_next(world, now);
    }

    // -------------------------------------------------------------------------
    // Ticking
    // -------------------------------------------------------------------------

    /// Advances every running action by one tick.
    ///
    /// Order: replay a pending chained request, release the blocking slot if
    /// the head asks to, update the head, then update background actions
    /// newest first.
    pub fn on_update(&mut self, world: &mut dyn World, now: f32) {
        if let Some(chained) = self.pending_chain.take() {
            debug!(entity = %self.owner, action = %chained.action_type, "playing chained action");
            if let Err(error) = self.enqueue(world, now, chained) {
                warn!(entity = %self.owner, %error, "chained action failed");
            }
        }
        if self.queue.front().is_some_and(|head| !head.started) {
            self.start_head(world, now);
        }

        let release = self
            .queue
            .front()
            .is_some_and(|head| head.behavior.should_become_non_blocking(&head.core, now));
        if release {
            if let Some(head) = self.queue.pop_front() {
                trace!(entity = %self.owner, action = %head.core.action_type(), "moved to background");
                self.background.push(head);
            }
            self.start_next(world, now);
        }

        let running = self.running_action_count();
        if let Some(head) = self.queue.front_mut() {
            if !Self::tick(head, now, world, &mut self.rng, &mut self.commands, running) {
                self.finish_head(world, now);
            }
        }

        for i in (0..self.background.len()).rev() {
            let running = self.running_action_count();
            let action = &mut self.background[i];
            if Self::tick(action, now, world, &mut self.rng, &mut self.commands, running) {
                continue;
            }
            let mut action = self.background.remove(i);
            let chained = action.with_ctx(now, world, &mut self.rng, &mut self.commands, running, |b, core, ctx| {
                b.end(core, ctx);
                b.chain_into_new_action(core)
            });
            trace!(entity = %self.owner, action = %action.core.action_type(), "background action ended");
            if chained.is_some() && self.pending_chain.is_none() {
                self.pending_chain = chained;
            }
        }

        self.flush_commands(world, now);
    }

    /// Updates one action; `false` once it stopped or its duration expired.
    fn tick(
        action: &mut RunningAction,
        now: f32,
        world: &mut dyn World,
        rng: &mut ChaCha8Rng,
        commands: &mut Vec<PlayerCommand>,
        running: usize,
    ) -> bool {
        let alive = action.with_ctx(now, world, rng, commands, running, |b, core, ctx| b.update(core, ctx));
        alive && !action.core.is_expired(now)
    }

    // -------------------------------------------------------------------------
    // Cancellation
    // -------------------------------------------------------------------------

    /// Cancels the head and drops the queue.
    ///
    /// The head's reuse timestamp is forgotten so it can be replayed at once.
    /// Background actions are cancelled too when `cancel_background` is set.
    pub fn clear_actions(&mut self, world: &mut dyn World, now: f32, cancel_background: bool) {
        self.clear(world, now, cancel_background);
        self.flush_commands(world, now);
    }

    fn clear(&mut self, world: &mut dyn World, now: f32, cancel_background: bool) {
        let running = self.running_action_count();
        if let Some(head) = self.queue.front_mut().filter(|head| head.started) {
            self.last_used.remove(&head.core.action_type());
            head.with_ctx(now, world, &mut self.rng, &mut self.commands, running, |b, core, ctx| {
                b.cancel(core, ctx);
            });
        }
        self.queue.clear();
        self.pending_chain = None;

        if cancel_background {
            for action in &mut self.background {
                action.with_ctx(now, world, &mut self.rng, &mut self.commands, running, |b, core, ctx| {
                    b.cancel(core, ctx);
                });
            }
            self.background.clear();
        }
    }

    /// Cancels running actions of `logic`, background first (newest first),
    /// then the head. `except` is spared.
    ///
    /// Without `cancel_all` only the first background match is cancelled. A
    /// cancelled head makes room for the next queued action.
    pub fn cancel_running_actions_by_logic(
        &mut self,
        world: &mut dyn World,
        now: f32,
        logic: LogicKind,
        cancel_all: bool,
        except: Option<InstanceId>,
    ) {
        self.cancel_by_logic(world, now, logic, cancel_all, except);
        self.flush_commands(world, now);
    }

    fn cancel_by_logic(
        &mut self,
        world: &mut dyn World,
        now: f32,
        logic: LogicKind,
        cancel_all: bool,
        except: Option<InstanceId>,
    ) {
        let matches = |action: &RunningAction| {
            action.core.logic() == logic && Some(action.instance) != except
        };

        for i in (0..self.background.len()).rev() {
            if !matches(&self.background[i]) {
                continue;
            }
            let running = self.running_action_count();
            let mut action = self.background.remove(i);
            action.with_ctx(now, world, &mut self.rng, &mut self.commands, running, |b, core, ctx| {
                b.cancel(core, ctx);
            });
            if !cancel_all {
                return;
            }
        }

        let head_matches = self
            .queue
            .front()
            .is_some_and(|head| head.started && matches(head));
        if head_matches {
            let running = self.running_action_count();
            if let Some(mut head) = self.queue.pop_front() {
                head.with_ctx(now, world, &mut self.rng, &mut self.commands, running, |b, core, ctx| {
                    b.cancel(core, ctx);
                });
            }
            self.start_next(world, now);
        }
    }

    fn flush_commands(&mut self, world: &mut dyn World, now: f32) {
        while !self.commands.is_empty() {
            for command in std::mem::take(&mut self.commands) {
                match command {
                    PlayerCommand::CancelByLogic {
                        logic,
                        cancel_all,
                        except,
                    } => self.cancel_by_logic(world, now, logic, cancel_all, except),
                }
            }
        }
    }

    // -------------------------------------------------------------------------
    // Notifications and Buffs
    // -------------------------------------------------------------------------

    /// Delivers `activity` to the head, then to every background action.
    pub fn on_gameplay_activity(
        &mut self,
        world: &mut dyn World,
        now: f32,
        activity: GameplayActivity,
    ) {
        let running = self.running_action_count();
        let head = self.queue.front_mut().filter(|head| head.started);
        for action in head.into_iter().chain(self.background.iter_mut()) {
            action.with_ctx(now, world, &mut self.rng, &mut self.commands, running, |b, core, ctx| {
                b.on_gameplay_activity(core, ctx, activity);
            });
        }
        self.flush_commands(world, now);
    }

    /// Folds every running action's modifier into the unbuffed value of
    /// `kind`.
    #[must_use]
    pub fn buffed_value(&self, now: f32, kind: BuffableValue) -> f32 {
        let mut value = kind.unbuffed();
        let head = self.queue.front().filter(|head| head.started);
        for action in head.into_iter().chain(self.background.iter()) {
            action.behavior.buff_value(&action.core, now, kind, &mut value);
        }
        value
    }

    /// Delivers a contact to the blocking action.
    pub fn collision_entered(&mut self, world: &mut dyn World, now: f32, collision: &Collision) {
        let running = self.running_action_count();
        if let Some(head) = self.queue.front_mut().filter(|head| head.started) {
            head.with_ctx(now, world, &mut self.rng, &mut self.commands, running, |b, core, ctx| {
                b.on_collision_enter(core, ctx, collision);
            });
        }
        self.flush_commands(world, now);
    }

    // -------------------------------------------------------------------------
    // Introspection
    // -------------------------------------------------------------------------

    /// The request holding the blocking slot.
    #[must_use]
    pub fn active_request(&self) -> Option<&ActionRequest> {
        self.queue
            .front()
            .filter(|head| head.started)
            .map(|head| &head.core.request)
    }

    /// Background actions plus the head, if any.
    #[must_use]
    pub fn running_action_count(&self) -> usize {
        self.background.len() + usize::from(!self.queue.is_empty())
    }

    /// Number of queued actions, head included.
    #[must_use]
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Action types of queued actions, head first.
    #[must_use]
    pub fn queued_types(&self) -> Vec<ActionType> {
        self.queue.iter().map(|a| a.core.action_type()).collect()
    }

    /// Action types running in the background, oldest first.
    #[must_use]
    pub fn background_types(&self) -> Vec<ActionType> {
        self.background.iter().map(|a| a.core.action_type()).collect()
    }

    /// Returns `false` while `action_type` is cooling down.
    #[must_use]
    pub fn is_reuse_time_elapsed(&self, action_type: ActionType, now: f32) -> bool {
        let reuse = self
            .definitions
            .get(action_type)
            .map_or(0.0, |def| def.reuse_time_seconds);
        if reuse <= 0.0 {
            return true;
        }
        self.last_used
            .get(&action_type)
            .map_or(true, |&used| now - used >= reuse)
    }

    /// Seconds of blocking time left in the queue.
    #[must_use]
    pub fn queue_time_depth(&self, now: f32) -> f32 {
        let Some(head) = self.queue.front() else {
            return 0.0;
        };
        let total: f32 = self.queue.iter().map(RunningAction::blocking_time).sum();
        let elapsed = if head.started {
            head.core.time_running(now)
        } else {
            0.0
        };
        total - elapsed
    }

    /// Returns `true` if a chained request waits for the next update.
    #[must_use]
    pub fn has_pending_chain(&self) -> bool {
        self.pending_chain.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::Arena;
    use crate::definition::ActionDefinition;
    use crate::entity::{EntityTag, LifeState};
    use crate::tests::helpers::{
        imp_melee_def, melee_def, shield_def, standard_table, stun_def, table_with,
    };
    use crate::world::{CharacterControl, MovementController};
    use glam::Vec3;
    use std::sync::Mutex;

    struct Fixture {
        arena: Arena,
        hero: EntityId,
        imp: EntityId,
        player: ServerActionPlayer,
    }

    fn fixture_with(table: Arc<DefinitionTable>, registry: BehaviorRegistry) -> Fixture {
        let mut arena = Arena::new();
        let hero = arena.spawn_damageable(EntityTag::Hero, Vec3::ZERO, 100);
        let imp = arena.spawn_damageable(EntityTag::Npc, Vec3::new(0.0, 0.0, 2.0), 100);
        let player = ServerActionPlayer::new(hero, table, Arc::new(registry), PlayerConfig::default());
        Fixture {
            arena,
            hero,
            imp,
            player,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(standard_table(), BehaviorRegistry::standard())
    }

    impl Fixture {
        fn play(&mut self, now: f32, request: ActionRequest) -> PlayOutcome {
            self.player
                .play_action(&mut self.arena, now, request)
                .expect("known action")
        }

        fn update(&mut self, now: f32) {
            self.player.on_update(&mut self.arena, now);
        }
    }

    // -------------------------------------------------------------------------
    // Lifecycle recording
    // -------------------------------------------------------------------------

    type Log = Arc<Mutex<Vec<String>>>;

    #[derive(Debug)]
    struct Recorder {
        log: Log,
        accept: bool,
        chain: Option<ActionType>,
    }

    impl Recorder {
        fn note(&self, core: &ActionCore, event: &str) {
            self.log
                .lock()
                .expect("log lock")
                .push(format!("{}:{event}", core.action_type()));
        }
    }

    impl ActionBehavior for Recorder {
        fn start(&mut self, core: &mut ActionCore, _ctx: &mut ActionContext<'_>) -> bool {
            self.note(core, "start");
            self.accept
        }

        fn update(&mut self, core: &mut ActionCore, _ctx: &mut ActionContext<'_>) -> bool {
            self.note(core, "update");
            true
        }

        fn end(&mut self, core: &mut ActionCore, _ctx: &mut ActionContext<'_>) {
            self.note(core, "end");
        }

        fn cancel(&mut self, core: &mut ActionCore, _ctx: &mut ActionContext<'_>) {
            self.note(core, "cancel");
        }

        fn chain_into_new_action(&mut self, _core: &ActionCore) -> Option<ActionRequest> {
            self.chain.map(ActionRequest::new)
        }
    }

    /// Emote1 accepts and chains into Emote2; Emote3 declines.
    fn recording_fixture() -> (Fixture, Log) {
        let log: Log = Arc::default();
        let mut registry = BehaviorRegistry::standard();
        let shared = Arc::clone(&log);
        registry.register(LogicKind::Emote, move |def| {
            let (accept, chain) = match def.action_type {
                ActionType::Emote1 => (true, Some(ActionType::Emote2)),
                ActionType::Emote3 => (false, None),
                _ => (true, None),
            };
            Ok(Box::new(Recorder {
                log: Arc::clone(&shared),
                accept,
                chain,
            }))
        });
        let emote = |action_type| ActionDefinition {
            duration_seconds: 0.5,
            ..ActionDefinition::new(action_type, LogicKind::Emote)
        };
        let table = table_with(vec![
            emote(ActionType::Emote1),
            emote(ActionType::Emote2),
            emote(ActionType::Emote3),
        ]);
        (fixture_with(table, registry), log)
    }

    fn entries(log: &Log) -> Vec<String> {
        log.lock().expect("log lock").clone()
    }

    mod queue_tests {
        use super::*;

        #[test]
        fn missing_definition_is_an_error() {
            let mut f = fixture();
            let result = f
                .player
                .play_action(&mut f.arena, 0.0, ActionRequest::new(ActionType::MageHeal));
            assert_eq!(
                result.unwrap_err(),
                ActionError::MissingDefinition(ActionType::MageHeal)
            );
            assert_eq!(f.player.running_action_count(), 0);
        }

        #[test]
        fn uninterruptible_head_queues_then_caps_depth() {
            let mut f = fixture();
            assert_eq!(f.play(0.0, ActionRequest::new(ActionType::TankBaseAttack)), PlayOutcome::Started);
            assert_eq!(f.play(0.0, ActionRequest::new(ActionType::TankBaseAttack)), PlayOutcome::Queued);
            assert!((f.player.queue_time_depth(0.0) - 2.0).abs() < 1e-5);
            assert_eq!(
                f.play(0.0, ActionRequest::new(ActionType::TankBaseAttack)),
                PlayOutcome::Discarded
            );
            assert_eq!(f.player.queue_len(), 2);
        }

        #[test]
        fn depth_shrinks_as_the_head_runs() {
            let mut f = fixture();
            f.play(0.0, ActionRequest::new(ActionType::TankBaseAttack));
            f.play(0.0, ActionRequest::new(ActionType::TankBaseAttack));
            assert!((f.player.queue_time_depth(0.5) - 1.5).abs() < 1e-5);
            assert_eq!(f.play(0.5, ActionRequest::new(ActionType::TankBaseAttack)), PlayOutcome::Queued);
        }

        #[test]
        fn interruptible_head_is_replaced() {
            let (mut f, log) = recording_fixture();
            let table = table_with(vec![ActionDefinition {
                action_interruptible: true,
                duration_seconds: 1.0,
                ..ActionDefinition::new(ActionType::Emote1, LogicKind::Emote)
            }, ActionDefinition {
                duration_seconds: 1.0,
                ..ActionDefinition::new(ActionType::Emote2, LogicKind::Emote)
            }]);
            f.player = ServerActionPlayer::new(
                f.hero,
                table,
                Arc::clone(&f.player.registry),
                PlayerConfig::default(),
            );

            f.play(0.0, ActionRequest::new(ActionType::Emote1));
            assert_eq!(f.play(0.1, ActionRequest::new(ActionType::Emote2)), PlayOutcome::Started);
            assert_eq!(entries(&log), ["Emote1:start", "Emote1:cancel", "Emote2:start"]);
            assert_eq!(f.player.queued_types(), [ActionType::Emote2]);
        }

        #[test]
        fn should_queue_never_interrupts() {
            let mut f = fixture();
            f.play(0.0, ActionRequest::new(ActionType::ImpBaseAttack));
            let outcome = f.play(0.0, ActionRequest::new(ActionType::TankBaseAttack).queued());
            assert_eq!(outcome, PlayOutcome::Queued);
            assert_eq!(
                f.player.queued_types(),
                [ActionType::ImpBaseAttack, ActionType::TankBaseAttack]
            );
        }

        #[test]
        fn requests_are_numbered_by_the_server() {
            let mut f = fixture();
            f.play(0.0, ActionRequest::new(ActionType::TankBaseAttack));
            let id = f.player.active_request().unwrap().id;
            assert!(id.is_server_issued());

            let mut g = fixture();
            g.play(0.0, ActionRequest::new(ActionType::TankBaseAttack).with_id(RequestId::new(9)));
            assert_eq!(g.player.active_request().unwrap().id, RequestId::new(9));
        }
    }

    mod lifecycle_tests {
        use super::*;

        #[test]
        fn declined_start_gets_no_other_callback() {
            let (mut f, log) = recording_fixture();
            assert_eq!(f.play(0.0, ActionRequest::new(ActionType::Emote3)), PlayOutcome::Discarded);
            f.update(0.1);
            f.player.clear_actions(&mut f.arena, 0.2, true);
            assert_eq!(entries(&log), ["Emote3:start"]);
        }

        #[test]
        fn natural_end_chains_on_the_next_update() {
            let (mut f, log) = recording_fixture();
            f.play(0.0, ActionRequest::new(ActionType::Emote1));
            f.update(0.5);
            assert!(f.player.has_pending_chain());
            assert_eq!(f.player.queue_len(), 0);

            f.update(0.6);
            assert_eq!(
                entries(&log),
                ["Emote1:start", "Emote1:update", "Emote1:end", "Emote2:start", "Emote2:update"]
            );
            assert_eq!(f.player.queued_types(), [ActionType::Emote2]);
        }

        #[test]
        fn cancelled_actions_do_not_chain() {
            let (mut f, log) = recording_fixture();
            f.play(0.0, ActionRequest::new(ActionType::Emote1));
            f.player.clear_actions(&mut f.arena, 0.1, false);
            f.update(0.2);
            assert_eq!(entries(&log), ["Emote1:start", "Emote1:cancel"]);
            assert!(!f.player.has_pending_chain());
        }

        #[test]
        fn chained_request_supersedes_the_queued_head() {
            let (mut f, log) = recording_fixture();
            f.play(0.0, ActionRequest::new(ActionType::Emote1));
            f.play(0.0, ActionRequest::new(ActionType::Emote3).queued());
            f.update(0.5);
            // The queued Emote3 must wait for the chain.
            assert_eq!(entries(&log), ["Emote1:start", "Emote1:update", "Emote1:end"]);
        }
    }

    mod start_tests {
        use super::*;

        #[test]
        fn reuse_time_skips_and_clear_forgets_it() {
            let mut f = fixture();
            assert_eq!(f.play(0.0, ActionRequest::new(ActionType::RogueStealthMode)), PlayOutcome::Started);
            f.update(0.5);
            assert_eq!(f.player.background_types(), [ActionType::RogueStealthMode]);
            assert!(!f.player.is_reuse_time_elapsed(ActionType::RogueStealthMode, 1.0));

            assert_eq!(f.play(1.0, ActionRequest::new(ActionType::RogueStealthMode)), PlayOutcome::Discarded);
            assert!(f.player.is_reuse_time_elapsed(ActionType::RogueStealthMode, 3.0));

            let mut g = fixture();
            g.play(0.0, ActionRequest::new(ActionType::RogueStealthMode));
            assert!(!g.player.is_reuse_time_elapsed(ActionType::RogueStealthMode, 0.1));
            g.player.clear_actions(&mut g.arena, 0.1, false);
            assert!(g.player.is_reuse_time_elapsed(ActionType::RogueStealthMode, 0.1));
        }

        #[test]
        fn targeted_close_request_synthesizes_target_then_chase() {
            let mut f = fixture();
            f.arena.teleport(f.imp, Vec3::new(0.0, 0.0, 8.0));
            let request = ActionRequest::new(ActionType::TankBaseAttack)
                .with_target(f.imp)
                .closing();

            assert_eq!(f.play(0.0, request), PlayOutcome::Queued);
            assert_eq!(f.player.background_types(), [ActionType::GeneralTarget]);
            assert_eq!(
                f.player.queued_types(),
                [ActionType::GeneralChase, ActionType::TankBaseAttack]
            );
            assert_eq!(f.arena.snapshot(f.hero).unwrap().target, Some(f.imp));
        }

        #[test]
        fn no_target_synthesized_for_the_current_target() {
            let mut f = fixture();
            f.arena.set_target(f.hero, Some(f.imp));
            let request = ActionRequest::new(ActionType::TankBaseAttack).with_target(f.imp);
            assert_eq!(f.play(0.0, request), PlayOutcome::Started);
            assert!(f.player.background_types().is_empty());
        }

        #[test]
        fn dead_target_is_not_selected() {
            let mut f = fixture();
            f.arena.apply_hp(f.imp, None, -1000);
            let request = ActionRequest::new(ActionType::TankBaseAttack).with_target(f.imp);

            assert_eq!(f.play(0.0, request), PlayOutcome::Started);
            assert!(f.player.background_types().is_empty());
            assert_eq!(f.arena.snapshot(f.hero).unwrap().target, None);

            f.update(0.5);
            f.update(1.0);
            assert_eq!(f.player.queue_len(), 0);
        }

        #[test]
        fn unknown_target_is_not_selected() {
            let mut f = fixture();
            let ghost = EntityId::new(999);
            let request = ActionRequest::new(ActionType::TankBaseAttack).with_target(ghost);

            assert_eq!(f.play(0.0, request), PlayOutcome::Started);
            assert!(f.player.background_types().is_empty());
            f.update(1.0);
            assert_eq!(f.player.queue_len(), 0);
        }

        #[test]
        fn queued_swing_at_a_target_that_died_meanwhile() {
            let mut f = fixture();
            f.play(0.0, ActionRequest::new(ActionType::TankShieldBuff));
            let swing = ActionRequest::new(ActionType::TankBaseAttack)
                .with_target(f.imp)
                .queued();
            assert_eq!(f.play(0.1, swing), PlayOutcome::Queued);
            f.arena.apply_hp(f.imp, None, -1000);

            f.player
                .on_gameplay_activity(&mut f.arena, 0.2, GameplayActivity::StoppedChargingUp);
            f.update(0.3);
            assert_eq!(f.player.queued_types(), [ActionType::TankBaseAttack]);
            f.update(1.5);
            assert_eq!(f.player.queue_len(), 0);
        }

        #[test]
        fn revive_reaches_a_fainted_ally() {
            let mut f = fixture();
            let ally = f.arena.spawn_damageable(EntityTag::Hero, Vec3::new(1.0, 0.0, 0.0), 100);
            f.arena.apply_hp(ally, None, -1000);
            assert_eq!(f.arena.life_state(ally), Some(LifeState::Fainted));

            let request = ActionRequest::new(ActionType::GeneralRevive).with_target(ally);
            assert_eq!(f.play(0.0, request), PlayOutcome::Started);
            assert!(f.player.background_types().is_empty());

            f.update(1.0);
            assert_eq!(f.arena.life_state(ally), Some(LifeState::Alive));
            assert_eq!(f.arena.hp(ally), Some(30));
            f.update(1.5);
            assert_eq!(f.player.queue_len(), 0);
        }

        #[test]
        fn selecting_a_new_target_cancels_the_old_selection() {
            let mut f = fixture();
            let other = f.arena.spawn_damageable(EntityTag::Npc, Vec3::new(3.0, 0.0, 0.0), 50);
            f.play(0.0, ActionRequest::new(ActionType::GeneralTarget).with_target(f.imp));
            f.play(0.1, ActionRequest::new(ActionType::GeneralTarget).with_target(other));
            assert_eq!(f.player.background_types(), [ActionType::GeneralTarget]);
            assert_eq!(f.arena.snapshot(f.hero).unwrap().target, Some(other));
        }

        #[test]
        fn interruptible_start_stops_walking() {
            let mut f = fixture();
            f.arena.set_movement_target(f.hero, Vec3::new(10.0, 0.0, 0.0));
            assert!(f.arena.is_moving(f.hero));
            f.play(0.0, ActionRequest::new(ActionType::ImpBaseAttack));
            assert!(!f.arena.is_moving(f.hero));
        }
    }

    mod cancel_tests {
        use super::*;

        #[test]
        fn cancel_by_logic_starts_the_next_head() {
            let mut f = fixture();
            f.play(0.0, ActionRequest::new(ActionType::TankShieldBuff));
            f.play(0.0, ActionRequest::new(ActionType::TankBaseAttack).queued());
            f.player
                .cancel_running_actions_by_logic(&mut f.arena, 0.1, LogicKind::ChargedShield, false, None);
            assert_eq!(f.player.queued_types(), [ActionType::TankBaseAttack]);
            assert!(f.player.active_request().is_some());
        }

        #[test]
        fn except_spares_the_caller() {
            let mut f = fixture();
            f.play(0.0, ActionRequest::new(ActionType::GeneralTarget).with_target(f.imp));
            let spared = f.player.background[0].instance;
            f.player
                .cancel_running_actions_by_logic(&mut f.arena, 0.1, LogicKind::Target, true, Some(spared));
            assert_eq!(f.player.background_types(), [ActionType::GeneralTarget]);
        }

        #[test]
        fn clear_can_keep_background_actions() {
            let mut f = fixture();
            f.play(0.0, ActionRequest::new(ActionType::GeneralTarget).with_target(f.imp));
            f.play(0.0, ActionRequest::new(ActionType::TankBaseAttack));
            f.player.clear_actions(&mut f.arena, 0.1, false);
            assert_eq!(f.player.queue_len(), 0);
            assert_eq!(f.player.running_action_count(), 1);
            f.player.clear_actions(&mut f.arena, 0.1, true);
            assert_eq!(f.player.running_action_count(), 0);
        }
    }

    mod buff_tests {
        use super::*;

        #[test]
        fn stacked_modifiers_compose() {
            let table = table_with(vec![shield_def(), melee_def(), imp_melee_def()]);
            let mut f = fixture_with(table, BehaviorRegistry::standard());
            assert!((f.player.buffed_value(0.0, BuffableValue::PercentDamageReceived) - 1.0).abs() < 1e-6);

            f.play(0.0, ActionRequest::new(ActionType::TankShieldBuff));
            f.update(0.5);
            f.player.on_gameplay_activity(&mut f.arena, 0.5, GameplayActivity::StoppedChargingUp);
            // 50% charge: 1 - (0.5 + 0.125)
            let shielded = f.player.buffed_value(0.5, BuffableValue::PercentDamageReceived);
            assert!((shielded - 0.375).abs() < 1e-5);

            f.update(0.55);
            assert_eq!(f.player.background_types(), [ActionType::TankShieldBuff]);
            f.play(0.6, ActionRequest::new(ActionType::Stun));
            let stunned = f.player.buffed_value(0.6, BuffableValue::PercentDamageReceived);
            assert!((stunned - 0.375 * stun_def().amount as f32).abs() < 1e-5);
        }

        #[test]
        fn rng_is_seeded_per_entity() {
            let config = PlayerConfig::default().with_seed(11);
            assert_ne!(
                config.entity_seed(EntityId::new(1)),
                config.entity_seed(EntityId::new(2))
            );
            assert_eq!(config.entity_seed(EntityId::new(1)), config.entity_seed(EntityId::new(1)));
        }
    }
}
