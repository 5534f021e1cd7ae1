//! Combat resolution shared by several behaviors.
//!
//! - Melee foe selection: [`detect_melee_foe`], [`ideal_melee_foe`]
//! - Line of sight: [`has_line_of_sight`]
//! - Charge-up math: [`percent_charged_up`]
//! - Dash destinations: [`dash_destination`]
//! - Side filters: [`target_layers`], [`is_eligible_target`]
//!
//! Everything here is a pure function over the collaborator traits, so the
//! server behaviors and the tests share one implementation.

use glam::Vec3;

use crate::entity::{EntityId, EntitySnapshot};
use crate::world::{EntityDirectory, Layers, SpatialQuery};

/// Half-width of a character's hit box, used for melee sweeps.
pub const CHARACTER_HALF_EXTENT: f32 = 0.5;

/// Targets closer than this are treated as "no destination" by dashes.
pub const VERY_CLOSE_TELEPORT_RANGE: f32 = 1.0;

/// How far a dash stops short of an obstruction.
const OBSTRUCTION_STANDOFF: f32 = 0.5;

// =============================================================================
// Side Filters
// =============================================================================

/// Query layers an action should hit.
///
/// Hostile hero actions and friendly NPC actions hit NPCs; the other two
/// combinations hit heroes.
#[must_use]
pub const fn target_layers(is_friendly: bool, owner_is_npc: bool) -> Layers {
    if is_friendly ^ owner_is_npc {
        Layers::PCS
    } else {
        Layers::NPCS
    }
}

/// Returns `true` if `target` is on the side an action may affect.
///
/// Non-characters (breakables) are eligible for every action.
#[must_use]
pub fn is_eligible_target(target: &EntitySnapshot, is_friendly: bool, owner_is_npc: bool) -> bool {
    !target.is_character() || target.is_npc() != (is_friendly ^ owner_is_npc)
}

// =============================================================================
// Melee
// =============================================================================

/// Picks the foe a melee hit lands on.
///
/// Walks `hits` in order and keeps the first damageable entity, switching to
/// `preferred` if it shows up among them. `owner` is never selected.
#[must_use]
pub fn ideal_melee_foe<D>(
    hits: &[EntityId],
    preferred: Option<EntityId>,
    owner: EntityId,
    directory: &D,
) -> Option<EntityId>
where
    D: EntityDirectory + ?Sized,
{
    let mut found = None;
    for &id in hits {
        if id == owner {
            continue;
        }
        let Some(snapshot) = directory.entity(id) else {
            continue;
        };
        if snapshot.is_damageable() && (Some(id) == preferred || found.is_none()) {
            found = Some(id);
        }
    }
    found
}

/// Sweeps in front of `owner` and picks the ideal foe.
///
/// # Arguments
///
/// * `world` - Spatial queries and entity lookup
/// * `owner` - Snapshot of the attacker
/// * `range` - Reach of the swing in meters
/// * `layers` - Layers the swing can hit
/// * `preferred` - Foe to favor when several are in reach
#[must_use]
pub fn detect_melee_foe<W>(
    world: &W,
    owner: &EntitySnapshot,
    range: f32,
    layers: Layers,
    preferred: Option<EntityId>,
) -> Option<EntityId>
where
    W: SpatialQuery + EntityDirectory + ?Sized,
{
    let hits = world.sweep(
        owner.position,
        owner.forward,
        range,
        CHARACTER_HALF_EXTENT,
        layers,
    );
    ideal_melee_foe(&hits, preferred, owner.id, world)
}

// =============================================================================
// Line of Sight
// =============================================================================

/// Checks that nothing static blocks the segment `from -> to`.
///
/// # Errors
///
/// Returns the obstruction point when the view is blocked.
pub fn has_line_of_sight<S>(spatial: &S, from: Vec3, to: Vec3) -> Result<(), Vec3>
where
    S: SpatialQuery + ?Sized,
{
    match spatial.raycast(from, to) {
        Some(obstruction) => Err(obstruction),
        None => Ok(()),
    }
}

// =============================================================================
// Charge-up
// =============================================================================

/// Fraction of a charge-up completed, in `[0, 1]`.
///
/// Once stopped, the fraction is frozen at the stop time. A non-positive
/// `exec_time` counts as fully charged.
#[must_use]
pub fn percent_charged_up(
    stopped_at: Option<f32>,
    time_running: f32,
    time_started: f32,
    exec_time: f32,
) -> f32 {
    if exec_time <= 0.0 {
        return 1.0;
    }
    let charged = stopped_at.map_or(time_running, |stop| stop - time_started);
    (charged / exec_time).clamp(0.0, 1.0)
}

// =============================================================================
// Dash
// =============================================================================

/// Computes where a dash ends.
///
/// # Arguments
///
/// * `spatial` - Used for the obstruction test
/// * `origin` - Where the dash starts
/// * `forward` - Facing of the dasher
/// * `target` - Requested destination; zero means "none"
/// * `stop_at_obstructions` - Stop short of static geometry
/// * `very_close` - Distance to dash forward when there is no meaningful target
/// * `max_distance` - Longest allowed dash
///
/// # Returns
///
/// The destination, at the origin's height.
#[must_use]
pub fn dash_destination<S>(
    spatial: &S,
    origin: Vec3,
    forward: Vec3,
    target: Vec3,
    stop_at_obstructions: bool,
    very_close: f32,
    max_distance: f32,
) -> Vec3
where
    S: SpatialQuery + ?Sized,
{
    let mut destination = target;
    if target == Vec3::ZERO || origin.distance(target) <= VERY_CLOSE_TELEPORT_RANGE {
        destination = origin + forward * very_close;
    }

    let offset = destination - origin;
    if offset.length() > max_distance {
        destination = origin + offset.normalize_or_zero() * max_distance;
    }

    if stop_at_obstructions {
        if let Some(obstruction) = spatial.raycast(origin, destination) {
            let back = (obstruction - origin).normalize_or_zero() * OBSTRUCTION_STANDOFF;
            destination = if origin.distance(obstruction) > OBSTRUCTION_STANDOFF {
                obstruction - back
            } else {
                origin
            };
        }
    }

    destination.y = origin.y;
    destination
}
