//! Visual-only action contract.
//!
//! A client never changes game state. Its [`ActionVisual`] instances read the
//! world through a [`ClientView`] and describe what should appear on screen by
//! emitting [`VisualEvent`]s into a [`VisualSink`].

use std::fmt;
use std::sync::Arc;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::definition::ActionDefinition;
use crate::entity::{EntityId, LifeState};
use crate::request::{ActionRequest, ActionType, RequestId};
use crate::world::{EntityDirectory, MovementController};

// =============================================================================
// Visual Events
// =============================================================================

/// Something a client should render.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum VisualEvent {
    /// An animation trigger fired locally.
    CueTriggered {
        /// Animated entity.
        entity: EntityId,
        /// Trigger name.
        cue: String,
    },
    /// An animation trigger was cleared locally.
    CueReset {
        /// Animated entity.
        entity: EntityId,
        /// Trigger name.
        cue: String,
    },
    /// A cosmetic graphic was spawned.
    GraphicSpawned {
        /// Character the graphic belongs to.
        owner: EntityId,
        /// Prefab name.
        graphic: String,
        /// Where it appeared.
        anchor: Vec3,
    },
    /// A cosmetic graphic began shutting down.
    GraphicShutdown {
        /// Character the graphic belongs to.
        owner: EntityId,
        /// Prefab name.
        graphic: String,
    },
    /// A victim flinched.
    HitReact {
        /// Flinching entity.
        entity: EntityId,
        /// Reaction trigger.
        cue: String,
    },
    /// A visual-only missile started flying.
    MissileLaunched {
        /// Shooter.
        owner: EntityId,
        /// Prefab name.
        prefab: String,
        /// Aimed-at character, if any.
        target: Option<EntityId>,
        /// Where the missile lands.
        destination: Vec3,
        /// Seconds until impact.
        flight_seconds: f32,
    },
    /// A visual-only missile vanished before landing.
    MissileCancelled {
        /// Shooter.
        owner: EntityId,
    },
    /// A target reticule appeared.
    ReticuleShown {
        /// Selecting character.
        owner: EntityId,
        /// Selected character.
        target: EntityId,
        /// Whether the selection is on the other side.
        hostile: bool,
    },
    /// The target reticule went away.
    ReticuleHidden {
        /// Selecting character.
        owner: EntityId,
    },
    /// The server never confirmed an anticipated action.
    AnticipationExpired {
        /// Predicting character.
        owner: EntityId,
        /// The unconfirmed request.
        request: RequestId,
    },
}

/// Receiver of [`VisualEvent`]s.
pub trait VisualSink {
    /// Records one event.
    fn emit(&mut self, event: VisualEvent);
}

impl VisualSink for Vec<VisualEvent> {
    fn emit(&mut self, event: VisualEvent) {
        self.push(event);
    }
}

// =============================================================================
// Client View
// =============================================================================

/// Read-only world state a client mirror consults.
pub trait ClientView: EntityDirectory {
    /// Returns `true` if `entity` is alive and not being shoved around.
    fn can_act(&self, entity: EntityId) -> bool;
}

impl<T: EntityDirectory + MovementController> ClientView for T {
    fn can_act(&self, entity: EntityId) -> bool {
        self.entity(entity)
            .is_some_and(|e| e.life_state == LifeState::Alive)
            && !self.is_performing_forced_movement(entity)
    }
}

/// Everything a visual callback may use besides its own state.
pub struct VisualContext<'a> {
    /// The client's clock in seconds.
    pub now: f32,
    /// The replicated world.
    pub view: &'a dyn ClientView,
    sink: &'a mut dyn VisualSink,
    local_owner: bool,
}

impl<'a> VisualContext<'a> {
    /// Creates a context for one round of callbacks.
    pub fn new(now: f32, view: &'a dyn ClientView, sink: &'a mut dyn VisualSink) -> Self {
        Self {
            now,
            view,
            sink,
            local_owner: false,
        }
    }

    /// Returns `true` if this client controls the acting character.
    #[must_use]
    pub const fn is_local_owner(&self) -> bool {
        self.local_owner
    }

    pub(crate) fn set_local_owner(&mut self, local_owner: bool) {
        self.local_owner = local_owner;
    }

    /// Emits a raw event.
    pub fn emit(&mut self, event: VisualEvent) {
        self.sink.emit(event);
    }

    /// Fires an animation cue, skipping empty names.
    pub fn trigger(&mut self, entity: EntityId, cue: &str) {
        if !cue.is_empty() {
            self.sink.emit(VisualEvent::CueTriggered {
                entity,
                cue: cue.to_owned(),
            });
        }
    }

    /// Clears an animation cue, skipping empty names.
    pub fn reset(&mut self, entity: EntityId, cue: &str) {
        if !cue.is_empty() {
            self.sink.emit(VisualEvent::CueReset {
                entity,
                cue: cue.to_owned(),
            });
        }
    }

    /// Spawns every graphic in `graphics` at the owner's position.
    ///
    /// # Returns
    ///
    /// The names actually spawned, for a later [`shutdown`](Self::shutdown).
    pub fn spawn_graphics(&mut self, owner: EntityId, graphics: &[String]) -> Vec<String> {
        let Some(anchor) = self.view.entity(owner).map(|o| o.position) else {
            return Vec::new();
        };
        for graphic in graphics {
            self.sink.emit(VisualEvent::GraphicSpawned {
                owner,
                graphic: graphic.clone(),
                anchor,
            });
        }
        graphics.to_vec()
    }

    /// Shuts down previously spawned graphics, leaving `graphics` empty.
    pub fn shutdown(&mut self, owner: EntityId, graphics: &mut Vec<String>) {
        for graphic in graphics.drain(..) {
            self.sink.emit(VisualEvent::GraphicShutdown { owner, graphic });
        }
    }

    /// Makes `entity` flinch.
    pub fn hit_react(&mut self, entity: EntityId, cue: &str) {
        self.sink.emit(VisualEvent::HitReact {
            entity,
            cue: cue.to_owned(),
        });
    }
}

impl fmt::Debug for VisualContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VisualContext")
            .field("now", &self.now)
            .field("local_owner", &self.local_owner)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Visual Core
// =============================================================================

/// State shared by every visual variant.
#[derive(Debug, Clone)]
pub struct VisualCore {
    owner: EntityId,
    /// The request being mirrored.
    pub request: ActionRequest,
    definition: Arc<ActionDefinition>,
    time_started: f32,
    anticipated: bool,
}

impl VisualCore {
    /// Creates the core for a freshly mirrored request.
    #[must_use]
    pub fn new(owner: EntityId, request: ActionRequest, definition: Arc<ActionDefinition>) -> Self {
        Self {
            owner,
            request,
            definition,
            time_started: 0.0,
            anticipated: false,
        }
    }

    /// The acting character.
    #[must_use]
    pub const fn owner(&self) -> EntityId {
        self.owner
    }

    /// The shared definition.
    #[must_use]
    pub fn definition(&self) -> &ActionDefinition {
        &self.definition
    }

    /// The action type being mirrored.
    #[must_use]
    pub fn action_type(&self) -> ActionType {
        self.definition.action_type
    }

    /// The first requested target.
    #[must_use]
    pub fn primary_target(&self) -> Option<EntityId> {
        self.request.primary_target()
    }

    /// When the visual started, or was anticipated.
    #[must_use]
    pub const fn time_started(&self) -> f32 {
        self.time_started
    }

    pub(crate) fn set_time_started(&mut self, now: f32) {
        self.time_started = now;
    }

    /// Seconds since the visual started.
    #[must_use]
    pub fn time_running(&self, now: f32) -> f32 {
        now - self.time_started
    }

    /// Returns `true` if the owning client predicted this action.
    #[must_use]
    pub const fn was_anticipated(&self) -> bool {
        self.anticipated
    }

    pub(crate) fn mark_anticipated(&mut self) {
        self.anticipated = true;
    }

    /// Returns `true` once `duration_seconds` has elapsed.
    #[must_use]
    pub fn is_expired(&self, now: f32) -> bool {
        let duration = self.definition.duration_seconds;
        duration > 0.0 && self.time_running(now) >= duration
    }
}

// =============================================================================
// Visual Trait
// =============================================================================

/// Client-side presentation of one ability.
///
/// Every method has a default. `on_start` and `on_update` keep the visual
/// alive by returning `true`; `end` falls through to `cancel`.
pub trait ActionVisual: fmt::Debug + Send {
    /// Called when the owning client predicts the action, before the server
    /// has confirmed it.
    fn anticipate(&mut self, _core: &mut VisualCore, _ctx: &mut VisualContext<'_>) {}

    /// Called when the server confirms the action.
    fn on_start(&mut self, _core: &mut VisualCore, _ctx: &mut VisualContext<'_>) -> bool {
        true
    }

    /// Called once per client tick while the action is confirmed.
    fn on_update(&mut self, _core: &mut VisualCore, _ctx: &mut VisualContext<'_>) -> bool {
        true
    }

    /// Called when the action ran its course.
    fn end(&mut self, core: &mut VisualCore, ctx: &mut VisualContext<'_>) {
        self.cancel(core, ctx);
    }

    /// Called when the action was stopped early.
    fn cancel(&mut self, _core: &mut VisualCore, _ctx: &mut VisualContext<'_>) {}

    /// Called when the owner's animation reaches a named event.
    fn on_anim_event(&mut self, _core: &mut VisualCore, _ctx: &mut VisualContext<'_>, _id: &str) {}

    /// Called when the server reports that a charge-up stopped.
    fn on_stopped_charging_up(
        &mut self,
        _core: &mut VisualCore,
        _ctx: &mut VisualContext<'_>,
        _percent: f32,
    ) {
    }
}
