//! Ability definitions: the immutable per-ability constants.
//!
//! Definitions are authored as data, loaded once into a [`DefinitionTable`]
//! and shared by `Arc` between every behavior that plays them. Nothing in the
//! engine mutates a definition after load.
//!
//! # Loading
//!
//! [`DefinitionTable::from_json`] reads a JSON list of definitions. Every field
//! except `action_type` and `logic` is optional. The table is validated as it
//! is built, so a logic that needs projectiles or spawns fails at load time
//! rather than in the middle of a fight.
//!
//! # Example
//!
//! ```
//! use riposte_core::definition::{BlockingMode, DefinitionTable, LogicKind};
//! use riposte_core::request::ActionType;
//!
//! let table = DefinitionTable::from_json(r#"[
//!     { "action_type": "ImpBaseAttack", "logic": "Melee",
//!       "amount": 5, "range": 2.0, "duration_seconds": 0.8, "exec_time_seconds": 0.4 },
//!     { "action_type": "GeneralChase", "logic": "Chase", "action_interruptible": true }
//! ]"#).unwrap();
//!
//! let imp = table.get(ActionType::ImpBaseAttack).unwrap();
//! assert_eq!(imp.logic, LogicKind::Melee);
//! assert_eq!(imp.blocking_mode, BlockingMode::EntireDuration);
//! assert_eq!(table.len(), 2);
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ActionError, DefinitionError};
use crate::request::ActionType;

// =============================================================================
// Logic Kind
// =============================================================================

/// The block of code that drives an ability.
///
/// Many action types share one logic; a tank swing and an imp claw are both
/// `Melee`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogicKind {
    /// Short-range swing against the foe in front.
    Melee,
    /// Physical projectile launched at execution time.
    RangedTargeted,
    /// Visual-only projectile with server-side impact timing.
    RangedFxTargeted,
    /// Walk into range of a target.
    Chase,
    /// Bring a fainted ally back.
    Revive,
    /// Cosmetic animation.
    Emote,
    /// Area attack at a point.
    AoE,
    /// Forward charge that damages and knocks back whatever it hits.
    Trample,
    /// Hold to charge a damage-reducing shield.
    ChargedShield,
    /// Unable to act.
    Stunned,
    /// Select the active target.
    Target,
    /// Hold to charge a stronger projectile.
    ChargedLaunchProjectile,
    /// Turn invisible to other players.
    StealthMode,
    /// Teleport to a point and strike.
    DashAttack,
    /// Throw a spawned object.
    Toss,
    /// Grab a heavy object.
    PickUp,
}

impl fmt::Display for LogicKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Melee => "Melee",
            Self::RangedTargeted => "RangedTargeted",
            Self::RangedFxTargeted => "RangedFxTargeted",
            Self::Chase => "Chase",
            Self::Revive => "Revive",
            Self::Emote => "Emote",
            Self::AoE => "AoE",
            Self::Trample => "Trample",
            Self::ChargedShield => "ChargedShield",
            Self::Stunned => "Stunned",
            Self::Target => "Target",
            Self::ChargedLaunchProjectile => "ChargedLaunchProjectile",
            Self::StealthMode => "StealthMode",
            Self::DashAttack => "DashAttack",
            Self::Toss => "Toss",
            Self::PickUp => "PickUp",
        };
        write!(f, "{name}")
    }
}

/// How long an ability occupies the blocking slot.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlockingMode {
    /// Blocks until the ability ends.
    #[default]
    EntireDuration,
    /// Blocks until execution time, then keeps running in the background.
    OnlyDuringExecTime,
}

// =============================================================================
// Projectile Info
// =============================================================================

/// One projectile an ability can fire.
///
/// Charged launchers list several, weakest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectileInfo {
    /// Prefab name the host spawns.
    pub prefab: String,
    /// Flight speed in m/s.
    pub speed_m_s: f32,
    /// Maximum flight distance in meters.
    pub range: f32,
    /// Damage per victim.
    pub damage: i32,
    /// How many victims the projectile can pass through.
    #[serde(default = "ProjectileInfo::default_max_victims")]
    pub max_victims: u32,
}

impl ProjectileInfo {
    const fn default_max_victims() -> u32 {
        1
    }
}

// =============================================================================
// Action Definition
// =============================================================================

/// Immutable constants for one action type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionDefinition {
    /// The action type this defines.
    pub action_type: ActionType,
    /// The logic that plays it.
    pub logic: LogicKind,
    /// Nominal effect size (damage, healing, stun multiplier).
    #[serde(default)]
    pub amount: i32,
    /// Mana cost.
    #[serde(default)]
    pub mana_cost: i32,
    /// Maximum distance between performer and target.
    #[serde(default)]
    pub range: f32,
    /// Total running time; zero means the logic decides when to stop.
    #[serde(default)]
    pub duration_seconds: f32,
    /// When the main effect lands.
    #[serde(default)]
    pub exec_time_seconds: f32,
    /// How long a lingering effect lasts.
    #[serde(default)]
    pub effect_duration_seconds: f32,
    /// Cooldown after a successful start.
    #[serde(default)]
    pub reuse_time_seconds: f32,
    /// Animation trigger raised while awaiting server confirmation.
    #[serde(default)]
    pub anim_anticipation: String,
    /// Primary animation trigger.
    #[serde(default)]
    pub anim: String,
    /// Auxiliary animation trigger (ending a loop).
    #[serde(default)]
    pub anim2: String,
    /// Reaction animation played on victims.
    #[serde(default)]
    pub react_anim: String,
    /// Extra animator parameter used by the logic.
    #[serde(default)]
    pub other_animator_variable: String,
    /// Damage to non-primary victims.
    #[serde(default)]
    pub splash_damage: i32,
    /// Movement speed during a forced move.
    #[serde(default)]
    pub move_speed: f32,
    /// Knockback speed applied to victims.
    #[serde(default)]
    pub knockback_speed: f32,
    /// Knockback duration applied to victims.
    #[serde(default)]
    pub knockback_duration: f32,
    /// Radius of area effects.
    #[serde(default)]
    pub radius: f32,
    /// Whether a new non-queued request or a move request interrupts it.
    #[serde(default)]
    pub action_interruptible: bool,
    /// Action types that interrupt it even when it is not interruptible.
    #[serde(default)]
    pub interruptible_by: Vec<ActionType>,
    /// How long it occupies the blocking slot.
    #[serde(default)]
    pub blocking_mode: BlockingMode,
    /// Projectiles it can fire, weakest first.
    #[serde(default)]
    pub projectiles: Vec<ProjectileInfo>,
    /// Objects it can spawn.
    #[serde(default)]
    pub spawns: Vec<String>,
    /// Targets allies instead of foes.
    #[serde(default)]
    pub is_friendly: bool,
    /// Name shown in the action bar.
    #[serde(default)]
    pub displayed_name: String,
    /// Tooltip shown in the action bar.
    #[serde(default)]
    pub description: String,
}

impl ActionDefinition {
    /// Creates a definition with every optional field zeroed.
    ///
    /// Intended as the base for struct update syntax.
    #[must_use]
    pub fn new(action_type: ActionType, logic: LogicKind) -> Self {
        Self {
            action_type,
            logic,
            amount: 0,
            mana_cost: 0,
            range: 0.0,
            duration_seconds: 0.0,
            exec_time_seconds: 0.0,
            effect_duration_seconds: 0.0,
            reuse_time_seconds: 0.0,
            anim_anticipation: String::new(),
            anim: String::new(),
            anim2: String::new(),
            react_anim: String::new(),
            other_animator_variable: String::new(),
            splash_damage: 0,
            move_speed: 0.0,
            knockback_speed: 0.0,
            knockback_duration: 0.0,
            radius: 0.0,
            action_interruptible: false,
            interruptible_by: Vec::new(),
            blocking_mode: BlockingMode::EntireDuration,
            projectiles: Vec::new(),
            spawns: Vec::new(),
            is_friendly: false,
            displayed_name: String::new(),
            description: String::new(),
        }
    }

    /// Returns `true` if a new request of `action_type` may interrupt this one.
    #[must_use]
    pub fn can_be_interrupted_by(&self, action_type: ActionType) -> bool {
        self.action_interruptible || self.interruptible_by.contains(&action_type)
    }

    /// Checks that the data can drive the logic.
    ///
    /// # Errors
    ///
    /// Returns an [`ActionError`] when a projectile or spawn list the logic
    /// relies on is missing or too short.
    pub fn check_requirements(&self) -> Result<(), ActionError> {
        let action = self.action_type;
        match self.logic {
            LogicKind::RangedTargeted | LogicKind::RangedFxTargeted
                if self.projectiles.is_empty() =>
            {
                Err(ActionError::MissingProjectiles { action })
            }
            LogicKind::ChargedLaunchProjectile if self.projectiles.len() < 2 => {
                Err(ActionError::TooFewProjectileTiers {
                    action,
                    required: 2,
                    found: self.projectiles.len(),
                })
            }
            LogicKind::Toss if self.spawns.is_empty() && self.projectiles.is_empty() => {
                Err(ActionError::MissingSpawns { action })
            }
            _ => Ok(()),
        }
    }

    fn check_ranges(&self) -> Result<(), DefinitionError> {
        let fields = [
            ("range", self.range),
            ("duration_seconds", self.duration_seconds),
            ("exec_time_seconds", self.exec_time_seconds),
            ("effect_duration_seconds", self.effect_duration_seconds),
            ("reuse_time_seconds", self.reuse_time_seconds),
            ("move_speed", self.move_speed),
            ("knockback_speed", self.knockback_speed),
            ("knockback_duration", self.knockback_duration),
            ("radius", self.radius),
        ];
        for (name, value) in fields {
            if !value.is_finite() || value < 0.0 {
                return Err(DefinitionError::Invalid {
                    action: self.action_type,
                    reason: format!("{name} must be finite and non-negative, got {value}"),
                });
            }
        }
        if let Some(projectile) = self
            .projectiles
            .iter()
            .find(|p| !p.speed_m_s.is_finite() || p.speed_m_s <= 0.0)
        {
            return Err(DefinitionError::Invalid {
                action: self.action_type,
                reason: format!("projectile `{}` needs a positive speed", projectile.prefab),
            });
        }
        Ok(())
    }
}

// =============================================================================
// Definition Table
// =============================================================================

/// All loaded definitions, keyed by action type.
#[derive(Debug, Clone, Default)]
pub struct DefinitionTable {
    definitions: HashMap<ActionType, Arc<ActionDefinition>>,
}

impl DefinitionTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses and validates a JSON list of definitions.
    ///
    /// # Errors
    ///
    /// Returns [`DefinitionError::Parse`] for malformed JSON, and the errors of
    /// [`insert`](Self::insert) for duplicate or invalid entries.
    pub fn from_json(json: &str) -> Result<Self, DefinitionError> {
        let definitions: Vec<ActionDefinition> = serde_json::from_str(json)?;
        let mut table = Self::new();
        for definition in definitions {
            table.insert(definition)?;
        }
        debug!(count = table.len(), "loaded action definitions");
        Ok(table)
    }

    /// Validates and adds a definition.
    ///
    /// # Errors
    ///
    /// - [`DefinitionError::Duplicate`] if the action type is already present
    /// - [`DefinitionError::Invalid`] for negative or non-finite timings
    /// - [`DefinitionError::Action`] if the data cannot drive its logic
    pub fn insert(&mut self, definition: ActionDefinition) -> Result<(), DefinitionError> {
        if self.definitions.contains_key(&definition.action_type) {
            return Err(DefinitionError::Duplicate(definition.action_type));
        }
        definition.check_ranges()?;
        definition.check_requirements()?;
        self.definitions
            .insert(definition.action_type, Arc::new(definition));
        Ok(())
    }

    /// Returns the definition for `action_type`.
    #[must_use]
    pub fn get(&self, action_type: ActionType) -> Option<&Arc<ActionDefinition>> {
        self.definitions.get(&action_type)
    }

    /// Returns the definition for `action_type`, or an error naming it.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError::MissingDefinition`] if nothing was loaded.
    pub fn require(&self, action_type: ActionType) -> Result<&Arc<ActionDefinition>, ActionError> {
        self.get(action_type)
            .ok_or(ActionError::MissingDefinition(action_type))
    }

    /// Re-checks every definition.
    ///
    /// # Errors
    ///
    /// Returns the first problem found, in action type order.
    pub fn validate(&self) -> Result<(), DefinitionError> {
        let mut types: Vec<_> = self.definitions.keys().copied().collect();
        types.sort_unstable();
        for action_type in types {
            let definition = &self.definitions[&action_type];
            definition.check_ranges()?;
            definition.check_requirements()?;
        }
        Ok(())
    }

    /// Number of loaded definitions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    /// Returns `true` if nothing is loaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}
