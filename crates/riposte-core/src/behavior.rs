//! The action behavior contract and the registry that builds behaviors.
//!
//! Every dispatched request becomes one behavior instance: a boxed
//! [`ActionBehavior`] for the request's [`LogicKind`], paired with an
//! [`ActionCore`] holding the request copy, the shared definition and the start
//! time. The [`ServerActionPlayer`](crate::server_player::ServerActionPlayer)
//! drives the instance through its lifecycle:
//!
//! ```text
//! start ──false──▶ (dropped, nothing else is called)
//!   │
//!   ▼ true
//! update (every tick, preceded by should_become_non_blocking while blocking)
//!   │
//!   ├── natural end ──▶ end ──▶ chain_into_new_action
//!   └── interrupted ──▶ cancel
//! ```
//!
//! # Context
//!
//! Callbacks receive an [`ActionContext`] carrying the current time, the
//! [`World`] and the entity's seeded RNG. Requests that affect the owner's own
//! player (cancelling sibling actions) are deferred as [`PlayerCommand`]s and
//! applied by the player right after the callback returns.
//!
//! # Example
//!
//! ```
//! use riposte_core::behavior::{ActionBehavior, ActionContext, ActionCore, BehaviorRegistry};
//! use riposte_core::definition::{ActionDefinition, LogicKind};
//! use riposte_core::request::ActionType;
//!
//! #[derive(Debug)]
//! struct Wave;
//!
//! impl ActionBehavior for Wave {
//!     fn start(&mut self, core: &mut ActionCore, ctx: &mut ActionContext<'_>) -> bool {
//!         ctx.trigger(core.owner(), &core.definition().anim);
//!         true
//!     }
//!
//!     fn update(&mut self, _core: &mut ActionCore, _ctx: &mut ActionContext<'_>) -> bool {
//!         true
//!     }
//! }
//!
//! let mut registry = BehaviorRegistry::new();
//! registry.register(LogicKind::Emote, |_def| Ok(Box::new(Wave)));
//!
//! let def = ActionDefinition::new(ActionType::Emote1, LogicKind::Emote);
//! assert!(registry.build(&def).is_ok());
//! assert!(registry
//!     .build(&ActionDefinition::new(ActionType::Stun, LogicKind::Stunned))
//!     .is_err());
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::definition::{ActionDefinition, BlockingMode, LogicKind};
use crate::entity::EntityId;
use crate::error::ActionError;
use crate::request::{ActionRequest, ActionType};
use crate::world::{Collision, World};

// =============================================================================
// Buffs and Notifications
// =============================================================================

/// A gameplay variable that running actions may modify.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BuffableValue {
    /// Multiplier on healing received. Unbuffed value is 1.
    PercentHealingReceived,
    /// Multiplier on damage received. Unbuffed value is 1.
    PercentDamageReceived,
    /// Chance that a trampler running into this character is stunned.
    /// Unbuffed value is 0.
    ChanceToStunTramplers,
}

impl BuffableValue {
    /// Returns the value before any action modifies it.
    #[must_use]
    pub const fn unbuffed(self) -> f32 {
        match self {
            Self::PercentHealingReceived | Self::PercentDamageReceived => 1.0,
            Self::ChanceToStunTramplers => 0.0,
        }
    }
}

impl fmt::Display for BuffableValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PercentHealingReceived => write!(f, "PercentHealingReceived"),
            Self::PercentDamageReceived => write!(f, "PercentDamageReceived"),
            Self::ChanceToStunTramplers => write!(f, "ChanceToStunTramplers"),
        }
    }
}

/// A notable event delivered to every running action of an entity.
///
/// `AttackedByEnemy` and `Healed` are delivered before the hit point change
/// is buffed and applied.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GameplayActivity {
    /// A hostile hit landed.
    AttackedByEnemy,
    /// Healing landed.
    Healed,
    /// The player released a charge-up input.
    StoppedChargingUp,
    /// The entity is about to perform a hostile action.
    UsingAttackAction,
}

impl fmt::Display for GameplayActivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AttackedByEnemy => write!(f, "AttackedByEnemy"),
            Self::Healed => write!(f, "Healed"),
            Self::StoppedChargingUp => write!(f, "StoppedChargingUp"),
            Self::UsingAttackAction => write!(f, "UsingAttackAction"),
        }
    }
}

// =============================================================================
// Core and Context
// =============================================================================

/// Identity of one behavior instance within its player.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InstanceId(u64);

impl InstanceId {
    /// Creates an instance id.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }
}

/// State shared by every behavior variant.
#[derive(Debug, Clone)]
pub struct ActionCore {
    owner: EntityId,
    /// The request being played. Behaviors may narrow targets or move the aim
    /// point before broadcasting it.
    pub request: ActionRequest,
    definition: Arc<ActionDefinition>,
    time_started: f32,
}

impl ActionCore {
    /// Creates the core for a freshly dispatched request.
    #[must_use]
    pub fn new(owner: EntityId, request: ActionRequest, definition: Arc<ActionDefinition>) -> Self {
        Self {
            owner,
            request,
            definition,
            time_started: 0.0,
        }
    }

    /// The entity performing the action.
    #[must_use]
    pub const fn owner(&self) -> EntityId {
        self.owner
    }

    /// The shared definition.
    #[must_use]
    pub fn definition(&self) -> &ActionDefinition {
        &self.definition
    }

    /// The shared definition handle.
    #[must_use]
    pub fn definition_arc(&self) -> &Arc<ActionDefinition> {
        &self.definition
    }

    /// The action type being played.
    #[must_use]
    pub fn action_type(&self) -> ActionType {
        self.definition.action_type
    }

    /// The logic driving the action.
    #[must_use]
    pub fn logic(&self) -> LogicKind {
        self.definition.logic
    }

    /// When `start` was called.
    #[must_use]
    pub const fn time_started(&self) -> f32 {
        self.time_started
    }

    pub(crate) fn set_time_started(&mut self, now: f32) {
        self.time_started = now;
    }

    /// Seconds since `start` was called.
    #[must_use]
    pub fn time_running(&self, now: f32) -> f32 {
        now - self.time_started
    }

    /// The first requested target.
    #[must_use]
    pub fn primary_target(&self) -> Option<EntityId> {
        self.request.primary_target()
    }

    /// Returns `true` once `duration_seconds` has elapsed.
    ///
    /// A non-positive duration never expires.
    #[must_use]
    pub fn is_expired(&self, now: f32) -> bool {
        let duration = self.definition.duration_seconds;
        duration > 0.0 && self.time_running(now) >= duration
    }
}

/// A request from a behavior to its own player, applied after the callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerCommand {
    /// Cancel running actions of a logic kind.
    CancelByLogic {
        /// Logic to cancel.
        logic: LogicKind,
        /// Cancel every match instead of the first.
        cancel_all: bool,
        /// Instance to spare.
        except: Option<InstanceId>,
    },
}

/// Everything a behavior callback may use besides its own state.
pub struct ActionContext<'a> {
    /// Current simulation time in seconds.
    pub now: f32,
    /// The game world.
    pub world: &'a mut dyn World,
    /// The owning entity's seeded RNG.
    pub rng: &'a mut ChaCha8Rng,
    running_actions: usize,
    instance: InstanceId,
    commands: &'a mut Vec<PlayerCommand>,
}

impl<'a> ActionContext<'a> {
    /// Creates a context for one callback.
    pub(crate) fn new(
        now: f32,
        world: &'a mut dyn World,
        rng: &'a mut ChaCha8Rng,
        running_actions: usize,
        instance: InstanceId,
        commands: &'a mut Vec<PlayerCommand>,
    ) -> Self {
        Self {
            now,
            world,
            rng,
            running_actions,
            instance,
            commands,
        }
    }

    /// Number of actions the owner is running, this one included.
    #[must_use]
    pub const fn running_action_count(&self) -> usize {
        self.running_actions
    }

    /// The instance receiving the callback.
    #[must_use]
    pub const fn instance(&self) -> InstanceId {
        self.instance
    }

    /// Cancels every other running action of `logic` once the callback returns.
    pub fn cancel_other_actions(&mut self, logic: LogicKind) {
        self.commands.push(PlayerCommand::CancelByLogic {
            logic,
            cancel_all: true,
            except: Some(self.instance),
        });
    }

    /// Fires an animation cue, skipping empty names.
    pub fn trigger(&mut self, entity: EntityId, cue: &str) {
        if !cue.is_empty() {
            self.world.play_cue(entity, cue);
        }
    }
}

impl fmt::Debug for ActionContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionContext")
            .field("now", &self.now)
            .field("running_actions", &self.running_actions)
            .field("instance", &self.instance)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Behavior Trait
// =============================================================================

/// Server-side logic of one ability.
///
/// Only `start` and `update` are required. Lifecycle guarantees:
/// - if `start` returns `false`, no other method is called on the instance
/// - exactly one of `end` or `cancel` is called on a started instance
/// - `chain_into_new_action` is called only after `end`
/// - `on_collision_enter` is only delivered while the instance is blocking
pub trait ActionBehavior: fmt::Debug + Send {
    /// Called once when the action takes the blocking slot.
    ///
    /// # Returns
    ///
    /// `false` to decline; the instance is dropped silently.
    fn start(&mut self, core: &mut ActionCore, ctx: &mut ActionContext<'_>) -> bool;

    /// Called once per tick while the action runs.
    ///
    /// # Returns
    ///
    /// `false` to stop. The player also stops the action when its duration
    /// expires.
    fn update(&mut self, core: &mut ActionCore, ctx: &mut ActionContext<'_>) -> bool;

    /// Polled before `update` while blocking.
    ///
    /// Defaults to releasing the slot at execution time for
    /// [`BlockingMode::OnlyDuringExecTime`] actions.
    fn should_become_non_blocking(&self, core: &ActionCore, now: f32) -> bool {
        let def = core.definition();
        def.blocking_mode == BlockingMode::OnlyDuringExecTime
            && core.time_running(now) >= def.exec_time_seconds
    }

    /// Called once on natural termination. Defaults to [`cancel`](Self::cancel).
    fn end(&mut self, core: &mut ActionCore, ctx: &mut ActionContext<'_>) {
        self.cancel(core, ctx);
    }

    /// Called on premature termination. Must release everything `start`
    /// acquired and tolerate repeated calls.
    fn cancel(&mut self, _core: &mut ActionCore, _ctx: &mut ActionContext<'_>) {}

    /// Called after `end`; a returned request is played on the next update.
    fn chain_into_new_action(&mut self, _core: &ActionCore) -> Option<ActionRequest> {
        None
    }

    /// Called while blocking when the owner touches another entity.
    fn on_collision_enter(
        &mut self,
        _core: &mut ActionCore,
        _ctx: &mut ActionContext<'_>,
        _collision: &Collision,
    ) {
    }

    /// Modifies a gameplay variable. Implementations multiply or take a max,
    /// never overwrite.
    fn buff_value(&self, _core: &ActionCore, _now: f32, _kind: BuffableValue, _value: &mut f32) {}

    /// Called for every [`GameplayActivity`] of the owner.
    fn on_gameplay_activity(
        &mut self,
        _core: &mut ActionCore,
        _ctx: &mut ActionContext<'_>,
        _activity: GameplayActivity,
    ) {
    }
}

// =============================================================================
// Behavior Registry
// =============================================================================

/// Builds a behavior for a definition.
pub type BehaviorConstructor = Arc<
    dyn Fn(&ActionDefinition) -> Result<Box<dyn ActionBehavior>, ActionError> + Send + Sync,
>;

/// Behavior constructors keyed by logic kind.
#[derive(Clone, Default)]
pub struct BehaviorRegistry {
    constructors: HashMap<LogicKind, BehaviorConstructor>,
}

impl BehaviorRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with a constructor for every built-in logic kind.
    #[must_use]
    pub fn standard() -> Self {
        let mut registry = Self::new();
        crate::behaviors::register_standard(&mut registry);
        registry
    }

    /// Registers (or replaces) the constructor for `logic`.
    pub fn register<F>(&mut self, logic: LogicKind, constructor: F)
    where
        F: Fn(&ActionDefinition) -> Result<Box<dyn ActionBehavior>, ActionError>
            + Send
            + Sync
            + 'static,
    {
        self.constructors.insert(logic, Arc::new(constructor));
    }

    /// Builds a behavior for `definition`.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError::NoConstructor`] if the logic is not registered,
    /// or whatever the constructor reports for misconfigured data.
    pub fn build(&self, definition: &ActionDefinition) -> Result<Box<dyn ActionBehavior>, ActionError> {
        let constructor = self
            .constructors
            .get(&definition.logic)
            .ok_or(ActionError::NoConstructor(definition.logic))?;
        constructor(definition)
    }

    /// Returns `true` if `logic` has a constructor.
    #[must_use]
    pub fn contains(&self, logic: LogicKind) -> bool {
        self.constructors.contains_key(&logic)
    }

    /// Number of registered logic kinds.
    #[must_use]
    pub fn len(&self) -> usize {
        self.constructors.len()
    }

    /// Returns `true` if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.constructors.is_empty()
    }
}

impl fmt::Debug for BehaviorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut logics: Vec<String> = self.constructors.keys().map(ToString::to_string).collect();
        logics.sort();
        f.debug_struct("BehaviorRegistry")
            .field("logics", &logics)
            .finish()
    }
}
