//! Client prediction mirror.
//!
//! Every client keeps a [`ClientActionPlayer`] per visible character. It plays
//! visual-only [`ActionVisual`]s for the actions the server broadcasts, and on
//! the owning client it can start them early ("anticipation") so input feels
//! instantaneous.
//!
//! # Reconciliation
//!
//! An anticipated entry waits for the server's broadcast carrying the same
//! [`RequestId`]. The broadcast confirms it and calls `on_start` with the
//! entry marked as anticipated, so start cues are not replayed. An entry the
//! server never confirms is cancelled after the anticipation timeout. A
//! broadcast whose id was already confirmed is ignored, which makes a host
//! that both anticipates and receives its own broadcasts safe.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use glam::Vec3;
//! use riposte_core::arena::Arena;
//! use riposte_core::client::{ClientActionPlayer, VisualContext, VisualState};
//! use riposte_core::definition::{ActionDefinition, DefinitionTable, LogicKind};
//! use riposte_core::entity::EntityTag;
//! use riposte_core::request::{ActionRequest, ActionType, RequestId};
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
//! let mut mirror = ClientActionPlayer::new(hero, true, Arc::new(table));
//! let request = ActionRequest::new(ActionType::Emote1).with_id(RequestId::new(1));
//!
//! let mut sink = Vec::new();
//! let mut ctx = VisualContext::new(0.0, &arena, &mut sink);
//! assert!(mirror.anticipate_action(&mut ctx, &request).unwrap());
//! assert!(mirror.play_action(&mut ctx, &request).unwrap());
//! assert_eq!(mirror.states(), vec![VisualState::Confirmed]);
//! ```

mod visual;
mod visuals;

pub use visual::{ActionVisual, ClientView, VisualContext, VisualCore, VisualEvent, VisualSink};
pub use visuals::{
    build_visual, ChargedLauncherVisual, ChargedShieldVisual, DashVisual, FxProjectileVisual,
    GenericVisual, MeleeVisual, StealthVisual, TargetVisual, TrampleVisual, IMPACT_EVENT,
    MELEE_REACT_PADDING, TRAMPLE_GRAPHICS_DELAY,
};

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::definition::{DefinitionTable, LogicKind};
use crate::entity::EntityId;
use crate::error::ActionError;
use crate::events::WorldEvent;
use crate::request::{ActionRequest, ActionType, RequestId};
use crate::server_player::PlayerConfig;
use crate::world::CancelScope;

/// How many confirmed request ids a mirror remembers for deduplication.
pub const CONFIRMED_HISTORY: usize = 16;

/// Where a mirrored entry is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisualState {
    /// Predicted locally, waiting for the server.
    Anticipated,
    /// Started by a server broadcast.
    Confirmed,
    /// Never confirmed; about to be cancelled.
    Expired,
}

struct PlayingVisual {
    core: VisualCore,
    visual: Box<dyn ActionVisual>,
    state: VisualState,
}

impl fmt::Debug for PlayingVisual {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlayingVisual")
            .field("action_type", &self.core.action_type())
            .field("request", &self.core.request.id)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

/// Visual mirror of one character's actions.
#[derive(Debug)]
pub struct ClientActionPlayer {
    owner: EntityId,
    local_owner: bool,
    definitions: Arc<DefinitionTable>,
    config: PlayerConfig,
    playing: Vec<PlayingVisual>,
    confirmed: VecDeque<RequestId>,
}

impl ClientActionPlayer {
    /// Creates a mirror for `owner`.
    ///
    /// `local_owner` is `true` on the client that controls the character.
    #[must_use]
    pub fn new(owner: EntityId, local_owner: bool, definitions: Arc<DefinitionTable>) -> Self {
        Self::with_config(owner, local_owner, definitions, PlayerConfig::default())
    }

    /// Creates a mirror with explicit tuning.
    #[must_use]
    pub fn with_config(
        owner: EntityId,
        local_owner: bool,
        definitions: Arc<DefinitionTable>,
        config: PlayerConfig,
    ) -> Self {
        Self {
            owner,
            local_owner,
            definitions,
            config,
            playing: Vec::new(),
            confirmed: VecDeque::with_capacity(CONFIRMED_HISTORY),
        }
    }

    /// The mirrored character.
    #[must_use]
    pub const fn owner(&self) -> EntityId {
        self.owner
    }

    // -------------------------------------------------------------------------
    // Anticipation and confirmation
    // -------------------------------------------------------------------------

    /// Predicts `request` before the server confirms it.
    ///
    /// # Returns
    ///
    /// `true` if an anticipated entry was recorded. Prediction is skipped
    /// while the owner is animating or cannot act, for target selection, and
    /// for closing requests whose target is still out of range.
    ///
    /// # Errors
    ///
    /// [`ActionError::MissingDefinition`] if no definition exists for the type.
    pub fn anticipate_action(
        &mut self,
        ctx: &mut VisualContext<'_>,
        request: &ActionRequest,
    ) -> Result<bool, ActionError> {
        let definition = Arc::clone(self.definitions.require(request.action_type)?);
        if self.is_animating() || !ctx.view.can_act(self.owner) {
            return Ok(false);
        }
        if definition.logic == LogicKind::Target {
            return Ok(false);
        }
        if request.should_close && !self.target_in_range(ctx, request, definition.range) {
            return Ok(false);
        }

        ctx.set_local_owner(self.local_owner);
        let mut visual = visuals::build_visual(&definition);
        let mut core = VisualCore::new(self.owner, request.clone(), Arc::clone(&definition));
        core.set_time_started(ctx.now);
        core.mark_anticipated();
        visual.anticipate(&mut core, ctx);
        ctx.trigger(self.owner, &definition.anim_anticipation);

        trace!(entity = %self.owner, action = %request.action_type, "anticipated");
        self.playing.push(PlayingVisual {
            core,
            visual,
            state: VisualState::Anticipated,
        });
        Ok(true)
    }

    /// Plays a server broadcast.
    ///
    /// # Returns
    ///
    /// `true` if the broadcast is now playing. Duplicate broadcasts and
    /// visuals that decline to start return `false`.
    ///
    /// # Errors
    ///
    /// [`ActionError::MissingDefinition`] if no definition exists for the type.
    pub fn play_action(
        &mut self,
        ctx: &mut VisualContext<'_>,
        request: &ActionRequest,
    ) -> Result<bool, ActionError> {
        let definition = Arc::clone(self.definitions.require(request.action_type)?);
        if !request.id.is_unassigned() && self.confirmed.contains(&request.id) {
            trace!(entity = %self.owner, request = ?request.id, "duplicate broadcast");
            return Ok(false);
        }
        self.remember(request.id);
        ctx.set_local_owner(self.local_owner);

        let index = match self.find_anticipated(request) {
            Some(index) => {
                let entry = &mut self.playing[index];
                entry.core.request = request.clone();
                entry.core.set_time_started(ctx.now);
                entry.state = VisualState::Confirmed;
                index
            }
            None => {
                let visual = visuals::build_visual(&definition);
                let mut core = VisualCore::new(self.owner, request.clone(), definition);
                core.set_time_started(ctx.now);
                self.playing.push(PlayingVisual {
                    core,
                    visual,
                    state: VisualState::Confirmed,
                });
                self.playing.len() - 1
            }
        };

        let entry = &mut self.playing[index];
        if entry.visual.on_start(&mut entry.core, ctx) {
            debug!(entity = %self.owner, action = %request.action_type, "visual started");
            Ok(true)
        } else {
            self.playing.remove(index);
            Ok(false)
        }
    }

    /// Advances every confirmed visual and retires finished entries.
    pub fn on_update(&mut self, ctx: &mut VisualContext<'_>) {
        ctx.set_local_owner(self.local_owner);
        let timeout = self.config.anticipation_timeout;

        for index in (0..self.playing.len()).rev() {
            let entry = &mut self.playing[index];
            let keep = match entry.state {
                VisualState::Anticipated => entry.core.time_running(ctx.now) <= timeout,
                VisualState::Confirmed => {
                    entry.visual.on_update(&mut entry.core, ctx) && !entry.core.is_expired(ctx.now)
                }
                VisualState::Expired => false,
            };
            if keep {
                continue;
            }

            let mut entry = self.playing.remove(index);
            if entry.state == VisualState::Confirmed {
                entry.visual.end(&mut entry.core, ctx);
            } else {
                entry.state = VisualState::Expired;
                debug!(entity = %self.owner, request = ?entry.core.request.id, "anticipation expired");
                entry.visual.cancel(&mut entry.core, ctx);
                ctx.emit(VisualEvent::AnticipationExpired {
                    owner: self.owner,
                    request: entry.core.request.id,
                });
            }
        }
    }

    // -------------------------------------------------------------------------
    // Cancellation and notifications
    // -------------------------------------------------------------------------

    /// Cancels every playing visual.
    pub fn cancel_all_actions(&mut self, ctx: &mut VisualContext<'_>) {
        ctx.set_local_owner(self.local_owner);
        for mut entry in self.playing.drain(..) {
            entry.visual.cancel(&mut entry.core, ctx);
        }
    }

    /// Cancels every playing visual of `action_type`.
    pub fn cancel_actions_by_type(&mut self, ctx: &mut VisualContext<'_>, action_type: ActionType) {
        ctx.set_local_owner(self.local_owner);
        let mut index = 0;
        while index < self.playing.len() {
            if self.playing[index].core.action_type() == action_type {
                let mut entry = self.playing.remove(index);
                entry.visual.cancel(&mut entry.core, ctx);
            } else {
                index += 1;
            }
        }
    }

    /// Forwards a named animation event to every playing visual.
    pub fn on_anim_event(&mut self, ctx: &mut VisualContext<'_>, id: &str) {
        ctx.set_local_owner(self.local_owner);
        for entry in &mut self.playing {
            entry.visual.on_anim_event(&mut entry.core, ctx, id);
        }
    }

    /// Tells every playing visual the charge-up stopped at `percent`.
    pub fn on_stopped_charging_up(&mut self, ctx: &mut VisualContext<'_>, percent: f32) {
        ctx.set_local_owner(self.local_owner);
        for entry in &mut self.playing {
            entry.visual.on_stopped_charging_up(&mut entry.core, ctx, percent);
        }
    }

    /// Routes a server broadcast concerning this mirror's owner.
    ///
    /// Events about other entities and non-broadcast events are ignored.
    ///
    /// # Errors
    ///
    /// Propagates [`play_action`](Self::play_action) errors.
    pub fn apply_event(
        &mut self,
        ctx: &mut VisualContext<'_>,
        event: &WorldEvent,
    ) -> Result<(), ActionError> {
        match event {
            WorldEvent::ActionPlayed { entity, request } if *entity == self.owner => {
                self.play_action(ctx, request)?;
            }
            WorldEvent::ChargeStopped { entity, percent } if *entity == self.owner => {
                self.on_stopped_charging_up(ctx, *percent);
            }
            WorldEvent::ActionsCancelled { entity, scope } if *entity == self.owner => match scope {
                CancelScope::All => self.cancel_all_actions(ctx),
                CancelScope::ByType(action_type) => self.cancel_actions_by_type(ctx, *action_type),
            },
            _ => {}
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Introspection
    // -------------------------------------------------------------------------

    /// Number of entries playing, anticipated ones included.
    #[must_use]
    pub fn playing_count(&self) -> usize {
        self.playing.len()
    }

    /// Returns `true` while anything other than a target selection plays.
    #[must_use]
    pub fn is_animating(&self) -> bool {
        self.playing
            .iter()
            .any(|e| e.core.definition().logic != LogicKind::Target)
    }

    /// States of the playing entries, oldest first.
    #[must_use]
    pub fn states(&self) -> Vec<VisualState> {
        self.playing.iter().map(|e| e.state).collect()
    }

    /// Action types of the playing entries, oldest first.
    #[must_use]
    pub fn playing_types(&self) -> Vec<ActionType> {
        self.playing.iter().map(|e| e.core.action_type()).collect()
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    fn remember(&mut self, id: RequestId) {
        if id.is_unassigned() {
            return;
        }
        if self.confirmed.len() == CONFIRMED_HISTORY {
            self.confirmed.pop_front();
        }
        self.confirmed.push_back(id);
    }

    fn find_anticipated(&self, request: &ActionRequest) -> Option<usize> {
        self.playing.iter().position(|e| {
            e.state == VisualState::Anticipated
                && if e.core.request.id.is_unassigned() {
                    e.core.action_type() == request.action_type
                } else {
                    e.core.request.id == request.id
                }
        })
    }

    fn target_in_range(&self, ctx: &VisualContext<'_>, request: &ActionRequest, range: f32) -> bool {
        let Some(owner) = ctx.view.entity(self.owner) else {
            return false;
        };
        request
            .primary_target()
            .and_then(|id| ctx.view.entity(id))
            .is_some_and(|t| owner.position.distance_squared(t.position) <= range * range)
    }
}
