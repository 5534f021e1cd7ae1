//! The in-memory reference world.
//!
//! The Arena stores every entity of a fight and implements all of the
//! collaborator contracts in [`world`](crate::world):
//! - Entity storage with deterministic iteration order (`BTreeMap`)
//! - Spatial indexing for overlap and sweep queries
//! - Sphere obstacles for line-of-sight and dash tests
//! - A kinematic movement integrator (walking, following, charges, knockback)
//! - Simple ballistic projectiles
//! - An [`EventLog`] of everything done to it
//!
//! # Architecture
//!
//! The Arena applies hit point changes *raw*: it has no action players, so
//! [`EntityDirectory::buffed_value`] always returns `None` and no gameplay
//! notifications are raised. The [`Simulation`](crate::simulation::Simulation)
//! host wraps the Arena to add buffs and notifications on top.
//!
//! Movement is not applied when a behavior asks for it; it only changes the
//! entity's [`MovementMode`]. [`Arena::integrate`] advances positions once per
//! tick and reports contacts made by charging entities and projectile hits in
//! a [`StepReport`] for the host to route.
//!
//! # Example
//!
//! ```
//! use glam::Vec3;
//! use riposte_core::arena::Arena;
//! use riposte_core::entity::EntityTag;
//! use riposte_core::world::{Layers, MovementController, SpatialQuery};
//!
//! let mut arena = Arena::new();
//! let hero = arena.spawn_damageable(EntityTag::Hero, Vec3::ZERO, 100);
//! let imp = arena.spawn_damageable(EntityTag::Npc, Vec3::new(0.0, 0.0, 3.0), 20);
//!
//! // Only the imp is on the NPC layer.
//! assert_eq!(arena.overlap_sphere(Vec3::ZERO, 5.0, Layers::NPCS), vec![imp]);
//!
//! arena.set_movement_target(hero, Vec3::new(0.0, 0.0, 1.0));
//! for _ in 0..60 {
//!     arena.integrate(1.0 / 60.0);
//! }
//! assert!(arena.snapshot(hero).unwrap().position.z > 0.9);
//! ```

use std::collections::{BTreeMap, BTreeSet, HashMap};

use glam::Vec3;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::behavior::BuffableValue;
use crate::combat::{target_layers, CHARACTER_HALF_EXTENT};
use crate::definition::ProjectileInfo;
use crate::entity::{
    Entity, EntityFlags, EntityId, EntitySnapshot, EntityTag, LifeState, MovementMode, VitalsState,
};
use crate::events::{EventLog, EventRecord, WorldEvent};
use crate::request::ActionRequest;
use crate::world::{
    ActionBroadcast, CancelScope, CharacterControl, Collision, EntityDirectory, HealthSink, Layers,
    MovementController, ProjectileLauncher, SpatialQuery,
};

/// Distance at which a charging entity touches another entity.
pub const TOUCH_DISTANCE: f32 = 1.0;

/// Distance a walker stops short of a fixed destination.
const ARRIVAL_TOLERANCE: f32 = 0.05;

/// Distance a follower keeps from the entity it follows.
const FOLLOW_STOP_DISTANCE: f32 = 2.0 * CHARACTER_HALF_EXTENT;

/// Radius of a projectile's hit volume.
const PROJECTILE_HIT_RADIUS: f32 = 0.5;

/// Where a carried object sits relative to its holder.
const HELD_OBJECT_OFFSET: Vec3 = Vec3::new(0.0, 1.5, 0.0);

// =============================================================================
// Spatial Index
// =============================================================================

/// Position index for proximity queries.
///
/// A full scan over a `HashMap`; arenas hold tens of entities. Query results
/// are sorted by id so iteration order never depends on hashing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpatialIndex {
    positions: HashMap<EntityId, Vec3>,
}

impl SpatialIndex {
    /// Creates a new empty spatial index.
    #[must_use]
    pub fn new() -> Self {
        Self {
            positions: HashMap::new(),
        }
    }

    /// Inserts or updates an entity's position.
    pub fn insert(&mut self, id: EntityId, pos: Vec3) {
        self.positions.insert(id, pos);
    }

    /// Removes an entity from the index.
    pub fn remove(&mut self, id: EntityId) {
        self.positions.remove(&id);
    }

    /// Returns the indexed position of an entity.
    #[must_use]
    pub fn get(&self, id: EntityId) -> Option<Vec3> {
        self.positions.get(&id).copied()
    }

    /// Entities within `radius` of `center` (boundary included), sorted by id.
    #[must_use]
    pub fn query_radius(&self, center: Vec3, radius: f32) -> Vec<EntityId> {
        let radius_sq = radius * radius;
        let mut results: Vec<EntityId> = self
            .positions
            .iter()
            .filter(|(_, pos)| center.distance_squared(**pos) <= radius_sq)
            .map(|(id, _)| *id)
            .collect();
        results.sort();
        results
    }

    /// Updates the position of an indexed entity.
    ///
    /// Returns `false` if the entity is not indexed.
    pub fn update(&mut self, id: EntityId, pos: Vec3) -> bool {
        match self.positions.get_mut(&id) {
            Some(slot) => {
                *slot = pos;
                true
            }
            None => false,
        }
    }

    /// Number of indexed entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Returns `true` if nothing is indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

// =============================================================================
// Static Geometry and Projectiles
// =============================================================================

/// A static spherical obstruction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Obstacle {
    /// Center of the sphere.
    pub center: Vec3,
    /// Radius of the sphere.
    pub radius: f32,
}

impl Obstacle {
    /// Returns `true` if a body of radius `margin` at `point` overlaps the obstacle.
    #[must_use]
    pub fn overlaps(&self, point: Vec3, margin: f32) -> bool {
        point.distance(self.center) < self.radius + margin
    }

    /// Distance along `from -> to` to the first intersection, if any.
    ///
    /// A segment starting inside the sphere intersects at distance zero.
    #[must_use]
    pub fn intersect_segment(&self, from: Vec3, to: Vec3) -> Option<f32> {
        let offset = to - from;
        let length = offset.length();
        let direction = offset.try_normalize()?;
        let m = from - self.center;
        let b = m.dot(direction);
        let c = m.length_squared() - self.radius * self.radius;
        if c > 0.0 && b > 0.0 {
            return None;
        }
        let discriminant = b * b - c;
        if discriminant < 0.0 {
            return None;
        }
        let t = (-b - discriminant.sqrt()).max(0.0);
        (t <= length).then_some(t)
    }
}

/// A projectile in flight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Projectile {
    /// Who fired it.
    pub owner: EntityId,
    /// Prefab name.
    pub prefab: String,
    /// Current position.
    pub position: Vec3,
    /// Unit flight direction.
    pub direction: Vec3,
    /// Speed in m/s.
    pub speed: f32,
    /// Meters left before it expires.
    pub remaining: f32,
    /// Damage per victim.
    pub damage: i32,
    /// Victims it can still pass through.
    pub victims_left: u32,
    /// Layers it can hit.
    pub layers: Layers,
    hit: BTreeSet<EntityId>,
}

/// A projectile reaching a victim.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProjectileHit {
    /// Who fired the projectile.
    pub owner: EntityId,
    /// Who was hit.
    pub victim: EntityId,
    /// Damage to apply.
    pub damage: i32,
}

/// Everything [`Arena::integrate`] found that the host has to route.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepReport {
    /// New contacts made by charging entities, as `(charger, collision)`.
    pub contacts: Vec<(EntityId, Collision)>,
    /// Projectile hits, in flight order.
    pub projectile_hits: Vec<ProjectileHit>,
}

/// Result of a raw hit point change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HpOutcome {
    /// Hit points after the change.
    pub hp: i32,
    /// Whether the change dropped the entity out of `Alive`.
    pub downed: bool,
}

// =============================================================================
// Arena
// =============================================================================

/// Deterministic in-memory world.
///
/// Entity ids are assigned monotonically and storage is a `BTreeMap`, so
/// iteration order, query results and therefore whole simulations are
/// reproducible.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Arena {
    next_id: u64,
    entities: BTreeMap<EntityId, Entity>,
    spatial: SpatialIndex,
    obstacles: Vec<Obstacle>,
    projectiles: Vec<Projectile>,
    /// Entities each charger has already touched during its current charge.
    contacts: BTreeMap<EntityId, BTreeSet<EntityId>>,
    animator_counters: BTreeMap<EntityId, BTreeMap<String, i32>>,
    events: EventLog,
    tick: u64,
}

impl Arena {
    /// Creates an empty arena at tick 0.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawns an entity without hit points.
    ///
    /// # Returns
    ///
    /// The id assigned to the new entity.
    pub fn spawn(&mut self, tag: EntityTag, position: Vec3) -> EntityId {
        let id = EntityId::new(self.next_id);
        self.next_id += 1;
        self.entities.insert(id, Entity::new(id, tag, position));
        self.spatial.insert(id, position);
        id
    }

    /// Spawns an entity with `hp` hit points (also its maximum).
    pub fn spawn_damageable(&mut self, tag: EntityTag, position: Vec3, hp: i32) -> EntityId {
        let id = self.spawn(tag, position);
        if let Some(entity) = self.entities.get_mut(&id) {
            entity.vitals = Some(VitalsState::new(hp));
        }
        id
    }

    /// Removes an entity, dropping anything it held or was held by.
    pub fn despawn(&mut self, id: EntityId) -> Option<Entity> {
        let entity = self.entities.remove(&id)?;
        self.spatial.remove(id);
        self.contacts.remove(&id);
        if let Some(object) = entity.held {
            if let Some(held) = self.entities.get_mut(&object) {
                held.held_by = None;
            }
        }
        if let Some(holder) = entity.held_by {
            if let Some(holder) = self.entities.get_mut(&holder) {
                holder.held = None;
            }
        }
        Some(entity)
    }

    /// Returns an entity by id.
    #[must_use]
    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    /// Returns a mutable entity by id.
    ///
    /// Call [`update_spatial`](Self::update_spatial) after moving it.
    #[must_use]
    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.get_mut(&id)
    }

    /// Entity ids in ascending order.
    pub fn entity_ids_sorted(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.entities.keys().copied()
    }

    /// Entities in ascending id order.
    pub fn entities_sorted(&self) -> impl Iterator<Item = &Entity> + '_ {
        self.entities.values()
    }

    /// Number of entities.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Returns `true` if the arena has no entities.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// The spatial index.
    #[must_use]
    pub fn spatial(&self) -> &SpatialIndex {
        &self.spatial
    }

    /// Re-indexes an entity after its position was changed through `get_mut`.
    pub fn update_spatial(&mut self, id: EntityId) {
        if let Some(entity) = self.entities.get(&id) {
            self.spatial.insert(id, entity.transform.position);
        }
    }

    /// Current tick, stamped on recorded events.
    #[must_use]
    pub const fn current_tick(&self) -> u64 {
        self.tick
    }

    /// Advances the tick counter.
    pub fn advance_tick(&mut self) {
        self.tick += 1;
    }

    /// Snapshot of an entity.
    #[must_use]
    pub fn snapshot(&self, id: EntityId) -> Option<EntitySnapshot> {
        self.entities.get(&id).map(Entity::snapshot)
    }

    /// Hit points of a damageable entity.
    #[must_use]
    pub fn hp(&self, id: EntityId) -> Option<i32> {
        self.entities.get(&id)?.vitals.map(|v| v.hp)
    }

    /// Life state of an entity.
    #[must_use]
    pub fn life_state(&self, id: EntityId) -> Option<LifeState> {
        self.entities.get(&id).map(Entity::life_state)
    }

    /// Forces the life state of a damageable entity.
    pub fn set_life_state(&mut self, id: EntityId, state: LifeState) {
        let Some(vitals) = self.entities.get_mut(&id).and_then(|e| e.vitals.as_mut()) else {
            return;
        };
        if vitals.life_state != state {
            vitals.life_state = state;
            self.record(WorldEvent::LifeStateChanged { entity: id, state });
        }
    }

    /// Adds special properties to an entity.
    pub fn insert_flags(&mut self, id: EntityId, flags: EntityFlags) {
        if let Some(entity) = self.entities.get_mut(&id) {
            entity.flags.insert(flags);
        }
    }

    /// Adds a static sphere obstruction.
    pub fn add_obstacle(&mut self, center: Vec3, radius: f32) {
        self.obstacles.push(Obstacle { center, radius });
    }

    /// Static obstructions.
    #[must_use]
    pub fn obstacles(&self) -> &[Obstacle] {
        &self.obstacles
    }

    /// Projectiles in flight.
    #[must_use]
    pub fn projectiles(&self) -> &[Projectile] {
        &self.projectiles
    }

    /// Value of an integer animator parameter (zero if never set).
    #[must_use]
    pub fn animator_counter(&self, id: EntityId, variable: &str) -> i32 {
        self.animator_counters
            .get(&id)
            .and_then(|vars| vars.get(variable))
            .copied()
            .unwrap_or(0)
    }

    /// The event log.
    #[must_use]
    pub fn events(&self) -> &EventLog {
        &self.events
    }

    /// Removes and returns every recorded event.
    pub fn drain_events(&mut self) -> Vec<EventRecord> {
        self.events.drain()
    }

    fn record(&mut self, event: WorldEvent) {
        self.events.push(self.tick, event);
    }

    // -------------------------------------------------------------------------
    // Health
    // -------------------------------------------------------------------------

    /// Applies a hit point change with no buffs.
    ///
    /// Ignored (returns `None`) when the target has no hit points, is not
    /// alive, is a non-character being healed, or is flagged
    /// [`EntityFlags::NOT_DAMAGED_BY_PLAYERS`] and a hero inflicted the damage.
    /// At zero hit points heroes faint and everything else dies.
    pub fn apply_hp(
        &mut self,
        target: EntityId,
        inflicter: Option<EntityId>,
        delta: i32,
    ) -> Option<HpOutcome> {
        let by_hero = inflicter
            .and_then(|id| self.entities.get(&id))
            .is_some_and(|e| e.tag == EntityTag::Hero);
        let entity = self.entities.get_mut(&target)?;
        if delta < 0 && by_hero && entity.flags.contains(EntityFlags::NOT_DAMAGED_BY_PLAYERS) {
            trace!(entity = %target, "damage from heroes ignored");
            return None;
        }
        if delta > 0 && !entity.tag.is_character() {
            return None;
        }
        let tag = entity.tag;
        let vitals = entity.vitals.as_mut()?;
        if vitals.life_state != LifeState::Alive {
            return None;
        }

        let hp = vitals.apply_delta(delta);
        let downed = hp == 0;
        if downed {
            vitals.life_state = if tag == EntityTag::Hero {
                LifeState::Fainted
            } else {
                LifeState::Dead
            };
            entity.movement.mode = MovementMode::Idle;
        }
        let state = vitals.life_state;

        self.record(WorldEvent::HpChanged {
            target,
            inflicter,
            delta,
            hp,
        });
        if downed {
            self.record(WorldEvent::LifeStateChanged {
                entity: target,
                state,
            });
        }
        Some(HpOutcome { hp, downed })
    }

    /// Brings a fainted entity back with `hp` hit points (at least one).
    ///
    /// Returns `false` if the target is not fainted.
    pub fn revive_entity(&mut self, target: EntityId, inflicter: Option<EntityId>, hp: i32) -> bool {
        let Some(vitals) = self.entities.get_mut(&target).and_then(|e| e.vitals.as_mut()) else {
            return false;
        };
        if vitals.life_state != LifeState::Fainted {
            return false;
        }
        let delta = hp.clamp(1, vitals.max_hp) - vitals.hp;
        let hp = vitals.apply_delta(delta);
        vitals.life_state = LifeState::Alive;
        self.record(WorldEvent::HpChanged {
            target,
            inflicter,
            delta,
            hp,
        });
        self.record(WorldEvent::LifeStateChanged {
            entity: target,
            state: LifeState::Alive,
        });
        true
    }

    // -------------------------------------------------------------------------
    // Integration
    // -------------------------------------------------------------------------

    /// Advances movement and projectiles by `dt` seconds.
    pub fn integrate(&mut self, dt: f32) -> StepReport {
        let mut report = StepReport::default();
        let ids: Vec<EntityId> = self.entities.keys().copied().collect();
        for id in ids {
            self.integrate_entity(id, dt, &mut report);
        }
        self.sync_held_objects();

        let mut projectiles = std::mem::take(&mut self.projectiles);
        projectiles.retain_mut(|projectile| self.advance_projectile(projectile, dt, &mut report));
        self.projectiles = projectiles;
        report
    }

    fn integrate_entity(&mut self, id: EntityId, dt: f32, report: &mut StepReport) {
        let Some(entity) = self.entities.get(&id) else {
            return;
        };
        let position = entity.transform.position;
        let forward = entity.transform.forward;
        let walk_speed = entity.movement.speed;
        let mode = entity.movement.mode;

        let (next, next_mode) = match mode {
            MovementMode::Idle => return,
            MovementMode::PathTo(destination) => {
                let (next, arrived) =
                    step_towards(position, destination, walk_speed * dt, ARRIVAL_TOLERANCE);
                let next_mode = if arrived { MovementMode::Idle } else { mode };
                (next, next_mode)
            }
            MovementMode::Follow(target) => match self.entities.get(&target) {
                Some(followed) => {
                    let goal = followed.transform.position;
                    let (next, _) =
                        step_towards(position, goal, walk_speed * dt, FOLLOW_STOP_DISTANCE);
                    (next, mode)
                }
                None => (position, MovementMode::Idle),
            },
            MovementMode::ForwardCharge { speed, remaining } => {
                let next = position + forward * speed * dt.min(remaining);
                let remaining = remaining - dt;
                let next_mode = if remaining > 0.0 {
                    MovementMode::ForwardCharge { speed, remaining }
                } else {
                    MovementMode::Idle
                };
                (next, next_mode)
            }
            MovementMode::Knockback {
                velocity,
                remaining,
            } => {
                let next = position + velocity * dt.min(remaining);
                let remaining = remaining - dt;
                let next_mode = if remaining > 0.0 {
                    MovementMode::Knockback {
                        velocity,
                        remaining,
                    }
                } else {
                    MovementMode::Idle
                };
                (next, next_mode)
            }
        };

        let blocked = self
            .obstacles
            .iter()
            .any(|o| o.overlaps(next, CHARACTER_HALF_EXTENT));
        let (next, next_mode) = if blocked {
            trace!(entity = %id, "movement blocked");
            (position, MovementMode::Idle)
        } else {
            (next, next_mode)
        };

        if let Some(entity) = self.entities.get_mut(&id) {
            if matches!(mode, MovementMode::PathTo(_) | MovementMode::Follow(_)) && next != position
            {
                entity.transform.look_at(next + (next - position));
            }
            entity.transform.position = next;
            entity.movement.mode = next_mode;
        }
        self.spatial.update(id, next);

        if matches!(mode, MovementMode::ForwardCharge { .. }) {
            self.collect_contacts(id, next, report);
            if !matches!(next_mode, MovementMode::ForwardCharge { .. }) {
                self.contacts.remove(&id);
            }
        }
    }

    fn collect_contacts(&mut self, charger: EntityId, position: Vec3, report: &mut StepReport) {
        let touching: Vec<(EntityId, Vec3)> = self
            .spatial
            .query_radius(position, TOUCH_DISTANCE)
            .into_iter()
            .filter(|&other| other != charger)
            .filter(|&other| {
                self.entities
                    .get(&other)
                    .is_some_and(|e| e.held_by != Some(charger))
            })
            .filter_map(|other| self.spatial.get(other).map(|p| (other, p)))
            .collect();

        let seen = self.contacts.entry(charger).or_default();
        for (other, other_position) in touching {
            if seen.insert(other) {
                report.contacts.push((
                    charger,
                    Collision {
                        other,
                        point: position.lerp(other_position, 0.5),
                    },
                ));
            }
        }
    }

    fn sync_held_objects(&mut self) {
        let carried: Vec<(EntityId, EntityId)> = self
            .entities
            .values()
            .filter_map(|e| e.held_by.map(|holder| (e.id, holder)))
            .collect();
        for (object, holder) in carried {
            let Some(anchor) = self.entities.get(&holder).map(|h| h.transform.position) else {
                continue;
            };
            if let Some(entity) = self.entities.get_mut(&object) {
                entity.transform.position = anchor + HELD_OBJECT_OFFSET;
            }
            self.spatial.update(object, anchor + HELD_OBJECT_OFFSET);
        }
    }

    fn advance_projectile(&self, projectile: &mut Projectile, dt: f32, report: &mut StepReport) -> bool {
        let step = (projectile.speed * dt).min(projectile.remaining);
        let from = projectile.position;
        let obstruction = self.raycast(from, from + projectile.direction * step);
        let travel = obstruction.map_or(step, |point| from.distance(point));

        let candidates = self.sweep(
            from,
            projectile.direction,
            travel,
            PROJECTILE_HIT_RADIUS,
            projectile.layers,
        );
        for victim in candidates {
            if victim == projectile.owner || projectile.hit.contains(&victim) {
                continue;
            }
            if !self.snapshot(victim).is_some_and(|s| s.is_damageable()) {
                continue;
            }
            projectile.hit.insert(victim);
            report.projectile_hits.push(ProjectileHit {
                owner: projectile.owner,
                victim,
                damage: projectile.damage,
            });
            projectile.victims_left = projectile.victims_left.saturating_sub(1);
            if projectile.victims_left == 0 {
                return false;
            }
        }

        projectile.position = from + projectile.direction * travel;
        projectile.remaining -= step;
        obstruction.is_none() && projectile.remaining > 0.0
    }
}

/// Moves from `from` towards `to` by at most `max_step`, stopping
/// `stop_distance` short. Returns the new point and whether it arrived.
fn step_towards(from: Vec3, to: Vec3, max_step: f32, stop_distance: f32) -> (Vec3, bool) {
    let offset = to - from;
    let distance = offset.length();
    if distance <= stop_distance {
        return (from, true);
    }
    let travel = (distance - stop_distance).min(max_step);
    let next = from + offset / distance * travel;
    (next, distance - travel <= stop_distance + f32::EPSILON)
}

// =============================================================================
// Collaborator Contracts
// =============================================================================

impl EntityDirectory for Arena {
    fn entity(&self, id: EntityId) -> Option<EntitySnapshot> {
        self.snapshot(id)
    }

    fn buffed_value(&self, _id: EntityId, _kind: BuffableValue) -> Option<f32> {
        None
    }
}

impl SpatialQuery for Arena {
    fn overlap_sphere(&self, center: Vec3, radius: f32, layers: Layers) -> Vec<EntityId> {
        self.spatial
            .query_radius(center, radius)
            .into_iter()
            .filter(|id| {
                self.entities
                    .get(id)
                    .is_some_and(|e| e.tag.layer().intersects(layers))
            })
            .collect()
    }

    fn sweep(
        &self,
        origin: Vec3,
        direction: Vec3,
        range: f32,
        half_extent: f32,
        layers: Layers,
    ) -> Vec<EntityId> {
        let Some(direction) = direction.try_normalize() else {
            return Vec::new();
        };
        let mut hits: Vec<(f32, EntityId)> = self
            .entities
            .values()
            .filter(|e| e.tag.layer().intersects(layers))
            .filter_map(|e| {
                let relative = e.transform.position - origin;
                let along = relative.dot(direction);
                let lateral = (relative - direction * along).length();
                (along >= 0.0 && along <= range + half_extent && lateral <= half_extent)
                    .then_some((along, e.id))
            })
            .collect();
        hits.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        hits.into_iter().map(|(_, id)| id).collect()
    }

    fn raycast(&self, from: Vec3, to: Vec3) -> Option<Vec3> {
        let direction = (to - from).try_normalize()?;
        self.obstacles
            .iter()
            .filter_map(|o| o.intersect_segment(from, to))
            .min_by(f32::total_cmp)
            .map(|t| from + direction * t)
    }
}

impl MovementController for Arena {
    fn set_movement_target(&mut self, entity: EntityId, destination: Vec3) {
        if let Some(e) = self.entities.get_mut(&entity) {
            e.movement.mode = MovementMode::PathTo(destination);
        }
    }

    fn follow_target(&mut self, entity: EntityId, target: EntityId) {
        if let Some(e) = self.entities.get_mut(&entity) {
            e.movement.mode = MovementMode::Follow(target);
        }
    }

    fn cancel_move(&mut self, entity: EntityId) {
        if let Some(e) = self.entities.get_mut(&entity) {
            e.movement.mode = MovementMode::Idle;
        }
        self.contacts.remove(&entity);
    }

    fn teleport(&mut self, entity: EntityId, position: Vec3) {
        if let Some(e) = self.entities.get_mut(&entity) {
            e.transform.position = position;
            self.spatial.update(entity, position);
        }
    }

    fn look_at(&mut self, entity: EntityId, point: Vec3) {
        if let Some(e) = self.entities.get_mut(&entity) {
            e.transform.look_at(point);
        }
    }

    fn set_forward(&mut self, entity: EntityId, forward: Vec3) {
        if let (Some(e), Some(forward)) = (self.entities.get_mut(&entity), forward.try_normalize()) {
            e.transform.forward = forward;
        }
    }

    fn start_forward_charge(&mut self, entity: EntityId, speed: f32, duration: f32) {
        if let Some(e) = self.entities.get_mut(&entity) {
            e.movement.mode = MovementMode::ForwardCharge {
                speed,
                remaining: duration,
            };
            self.contacts.remove(&entity);
        }
    }

    fn start_knockback(&mut self, entity: EntityId, source: Vec3, speed: f32, duration: f32) {
        if let Some(e) = self.entities.get_mut(&entity) {
            let mut away = e.transform.position - source;
            away.y = 0.0;
            let direction = away.try_normalize().unwrap_or(-e.transform.forward);
            e.movement.mode = MovementMode::Knockback {
                velocity: direction * speed,
                remaining: duration,
            };
        }
    }

    fn is_performing_forced_movement(&self, entity: EntityId) -> bool {
        self.entities
            .get(&entity)
            .is_some_and(|e| e.movement.is_forced())
    }

    fn is_moving(&self, entity: EntityId) -> bool {
        self.entities
            .get(&entity)
            .is_some_and(|e| e.movement.is_moving())
    }
}

impl HealthSink for Arena {
    fn receive_hp(&mut self, target: EntityId, inflicter: Option<EntityId>, delta: i32) {
        self.apply_hp(target, inflicter, delta);
    }

    fn revive(&mut self, target: EntityId, inflicter: Option<EntityId>, hp: i32) {
        self.revive_entity(target, inflicter, hp);
    }
}

impl CharacterControl for Arena {
    fn set_target(&mut self, entity: EntityId, target: Option<EntityId>) {
        let Some(e) = self.entities.get_mut(&entity) else {
            return;
        };
        if e.target != target {
            e.target = target;
            self.record(WorldEvent::TargetChanged { entity, target });
        }
    }

    fn set_stealthed(&mut self, entity: EntityId, stealthed: bool) {
        let Some(e) = self.entities.get_mut(&entity) else {
            return;
        };
        if e.flags.contains(EntityFlags::STEALTHED) != stealthed {
            e.flags.set(EntityFlags::STEALTHED, stealthed);
            self.record(WorldEvent::StealthChanged { entity, stealthed });
        }
    }

    fn attach(&mut self, holder: EntityId, object: EntityId) -> bool {
        if holder == object {
            return false;
        }
        let free = matches!(
            (self.entities.get(&holder), self.entities.get(&object)),
            (Some(h), Some(o)) if h.held.is_none() && o.held_by.is_none()
        );
        if !free {
            return false;
        }
        if let Some(h) = self.entities.get_mut(&holder) {
            h.held = Some(object);
        }
        if let Some(o) = self.entities.get_mut(&object) {
            o.held_by = Some(holder);
        }
        self.sync_held_objects();
        self.record(WorldEvent::ObjectAttached { holder, object });
        true
    }

    fn detach(&mut self, holder: EntityId) {
        let Some(h) = self.entities.get_mut(&holder) else {
            return;
        };
        let Some(object) = h.held.take() else {
            return;
        };
        let ground = h.transform.position + h.transform.forward;
        if let Some(o) = self.entities.get_mut(&object) {
            o.held_by = None;
            o.transform.position = ground;
            self.spatial.update(object, ground);
        }
        self.record(WorldEvent::ObjectDetached { holder, object });
    }
}

impl ActionBroadcast for Arena {
    fn play_cue(&mut self, entity: EntityId, cue: &str) {
        self.record(WorldEvent::CuePlayed {
            entity,
            cue: cue.to_owned(),
        });
    }

    fn reset_cue(&mut self, entity: EntityId, cue: &str) {
        self.record(WorldEvent::CueReset {
            entity,
            cue: cue.to_owned(),
        });
    }

    fn adjust_animator_counter(&mut self, entity: EntityId, variable: &str, delta: i32) {
        let slot = self
            .animator_counters
            .entry(entity)
            .or_default()
            .entry(variable.to_owned())
            .or_insert(0);
        *slot += delta;
        let value = *slot;
        self.record(WorldEvent::AnimatorCounterChanged {
            entity,
            variable: variable.to_owned(),
            value,
        });
    }

    fn broadcast_action(&mut self, entity: EntityId, request: &ActionRequest) {
        self.record(WorldEvent::ActionPlayed {
            entity,
            request: request.clone(),
        });
    }

    fn broadcast_charge_stopped(&mut self, entity: EntityId, percent: f32) {
        self.record(WorldEvent::ChargeStopped { entity, percent });
    }

    fn broadcast_cancel(&mut self, entity: EntityId, scope: CancelScope) {
        self.record(WorldEvent::ActionsCancelled { entity, scope });
    }
}

impl ProjectileLauncher for Arena {
    fn launch_projectile(
        &mut self,
        owner: EntityId,
        projectile: &ProjectileInfo,
        origin: Vec3,
        direction: Vec3,
    ) {
        let Some(shooter) = self.entities.get(&owner) else {
            return;
        };
        let direction = direction.try_normalize().unwrap_or(shooter.transform.forward);
        let layers = target_layers(false, shooter.tag == EntityTag::Npc);
        self.projectiles.push(Projectile {
            owner,
            prefab: projectile.prefab.clone(),
            position: origin,
            direction,
            speed: projectile.speed_m_s,
            remaining: projectile.range,
            damage: projectile.damage,
            victims_left: projectile.max_victims.max(1),
            layers,
            hit: BTreeSet::new(),
        });
        self.record(WorldEvent::ProjectileLaunched {
            owner,
            prefab: projectile.prefab.clone(),
            origin,
            direction,
            damage: projectile.damage,
        });
    }

    fn toss(&mut self, owner: EntityId, prefab: &str, origin: Vec3, forward: Vec3) {
        self.record(WorldEvent::ObjectTossed {
            owner,
            prefab: prefab.to_owned(),
            origin,
            forward,
        });
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;

    const DT: f32 = 1.0 / 60.0;

    mod spatial_index_tests {
        use super::*;

        #[test]
        fn query_radius_returns_sorted_results() {
            let mut index = SpatialIndex::new();
            index.insert(EntityId::new(5), Vec3::new(1.0, 0.0, 0.0));
            index.insert(EntityId::new(2), Vec3::new(2.0, 0.0, 0.0));
            index.insert(EntityId::new(8), Vec3::new(0.0, 0.0, 3.0));

            let results = index.query_radius(Vec3::ZERO, 10.0);
            assert_eq!(
                results,
                vec![EntityId::new(2), EntityId::new(5), EntityId::new(8)]
            );
        }

        #[test]
        fn query_radius_includes_boundary() {
            let mut index = SpatialIndex::new();
            index.insert(EntityId::new(1), Vec3::new(0.0, 0.0, 4.0));
            assert_eq!(index.query_radius(Vec3::ZERO, 4.0), vec![EntityId::new(1)]);
            assert!(index.query_radius(Vec3::ZERO, 3.9).is_empty());
        }

        #[test]
        fn update_nonexistent_returns_false() {
            let mut index = SpatialIndex::new();
            assert!(!index.update(EntityId::new(999), Vec3::ZERO));
            assert!(index.is_empty());
        }
    }

    mod query_tests {
        use super::*;

        #[test]
        fn spawn_assigns_sequential_ids() {
            let mut arena = Arena::new();
            let a = arena.spawn(EntityTag::Prop, Vec3::ZERO);
            let b = arena.spawn_damageable(EntityTag::Npc, Vec3::ZERO, 5);
            assert_eq!(a, EntityId::new(0));
            assert_eq!(b, EntityId::new(1));
            assert_eq!(arena.entity_count(), 2);
            assert_eq!(arena.hp(a), None);
            assert_eq!(arena.hp(b), Some(5));
        }

        #[test]
        fn sweep_orders_by_distance_and_filters_layers() {
            let mut arena = Arena::new();
            let far = arena.spawn_damageable(EntityTag::Npc, Vec3::new(0.0, 0.0, 2.5), 5);
            let near = arena.spawn_damageable(EntityTag::Npc, Vec3::new(0.2, 0.0, 1.0), 5);
            let _hero = arena.spawn_damageable(EntityTag::Hero, Vec3::new(0.0, 0.0, 1.5), 5);
            let _wide = arena.spawn_damageable(EntityTag::Npc, Vec3::new(2.0, 0.0, 1.0), 5);

            let hits = arena.sweep(Vec3::ZERO, Vec3::Z, 3.0, 0.5, Layers::NPCS);
            assert_eq!(hits, vec![near, far]);
        }

        #[test]
        fn zero_direction_sweep_finds_nothing() {
            let mut arena = Arena::new();
            arena.spawn_damageable(EntityTag::Npc, Vec3::ZERO, 5);
            assert!(arena
                .sweep(Vec3::ZERO, Vec3::ZERO, 3.0, 0.5, Layers::all())
                .is_empty());
        }

        #[test]
        fn raycast_reports_nearest_obstruction() {
            let mut arena = Arena::new();
            arena.add_obstacle(Vec3::new(0.0, 0.0, 8.0), 1.0);
            arena.add_obstacle(Vec3::new(0.0, 0.0, 5.0), 1.0);

            let hit = arena.raycast(Vec3::ZERO, Vec3::new(0.0, 0.0, 10.0)).unwrap();
            assert!((hit.z - 4.0).abs() < 1e-4);
            assert!(arena.raycast(Vec3::ZERO, Vec3::new(0.0, 0.0, 3.0)).is_none());
            assert!(arena.raycast(Vec3::ZERO, Vec3::new(5.0, 0.0, 0.0)).is_none());
        }
    }

    mod health_tests {
        use super::*;

        #[test]
        fn heroes_faint_and_npcs_die() {
            let mut arena = Arena::new();
            let hero = arena.spawn_damageable(EntityTag::Hero, Vec3::ZERO, 10);
            let imp = arena.spawn_damageable(EntityTag::Npc, Vec3::ZERO, 10);

            let outcome = arena.apply_hp(hero, Some(imp), -25).unwrap();
            assert_eq!(outcome, HpOutcome { hp: 0, downed: true });
            assert_eq!(arena.life_state(hero), Some(LifeState::Fainted));

            arena.apply_hp(imp, Some(hero), -10);
            assert_eq!(arena.life_state(imp), Some(LifeState::Dead));
        }

        #[test]
        fn downed_entities_ignore_further_changes() {
            let mut arena = Arena::new();
            let hero = arena.spawn_damageable(EntityTag::Hero, Vec3::ZERO, 10);
            arena.apply_hp(hero, None, -10);
            assert!(arena.apply_hp(hero, None, 5).is_none());
            assert_eq!(arena.hp(hero), Some(0));
        }

        #[test]
        fn revive_only_works_on_fainted() {
            let mut arena = Arena::new();
            let hero = arena.spawn_damageable(EntityTag::Hero, Vec3::ZERO, 50);
            assert!(!arena.revive_entity(hero, None, 20));

            arena.apply_hp(hero, None, -50);
            assert!(arena.revive_entity(hero, None, 20));
            assert_eq!(arena.hp(hero), Some(20));
            assert_eq!(arena.life_state(hero), Some(LifeState::Alive));
        }

        #[test]
        fn protected_breakables_ignore_heroes() {
            let mut arena = Arena::new();
            let hero = arena.spawn_damageable(EntityTag::Hero, Vec3::ZERO, 10);
            let imp = arena.spawn_damageable(EntityTag::Npc, Vec3::ZERO, 10);
            let crystal = arena.spawn_damageable(EntityTag::Breakable, Vec3::ZERO, 10);
            arena.insert_flags(crystal, EntityFlags::NOT_DAMAGED_BY_PLAYERS);

            assert!(arena.apply_hp(crystal, Some(hero), -5).is_none());
            assert_eq!(arena.apply_hp(crystal, Some(imp), -5).map(|o| o.hp), Some(5));
        }

        #[test]
        fn hp_changes_are_logged() {
            let mut arena = Arena::new();
            let imp = arena.spawn_damageable(EntityTag::Npc, Vec3::ZERO, 10);
            arena.apply_hp(imp, None, -10);
            assert_eq!(arena.events().of_kind(EventKind::Health).count(), 2);
        }
    }

    mod movement_tests {
        use super::*;

        #[test]
        fn walkers_arrive_and_go_idle() {
            let mut arena = Arena::new();
            let hero = arena.spawn_damageable(EntityTag::Hero, Vec3::ZERO, 10);
            arena.set_movement_target(hero, Vec3::new(2.0, 0.0, 0.0));
            for _ in 0..60 {
                arena.integrate(DT);
            }
            let snapshot = arena.snapshot(hero).unwrap();
            assert!((snapshot.position.x - 2.0).abs() < 0.1);
            assert!((snapshot.forward - Vec3::X).length() < 1e-4);
            assert!(!arena.is_moving(hero));
        }

        #[test]
        fn charges_report_each_contact_once() {
            let mut arena = Arena::new();
            let boss = arena.spawn_damageable(EntityTag::Npc, Vec3::ZERO, 100);
            let hero = arena.spawn_damageable(EntityTag::Hero, Vec3::new(0.0, 0.0, 2.0), 10);
            arena.start_forward_charge(boss, 6.0, 1.0);

            let mut contacts = Vec::new();
            for _ in 0..60 {
                contacts.extend(arena.integrate(DT).contacts);
            }
            assert_eq!(contacts.len(), 1);
            assert_eq!(contacts[0].0, boss);
            assert_eq!(contacts[0].1.other, hero);
            assert!(!arena.is_performing_forced_movement(boss));
        }

        #[test]
        fn knockback_pushes_away_from_source() {
            let mut arena = Arena::new();
            let hero = arena.spawn_damageable(EntityTag::Hero, Vec3::new(1.0, 0.0, 0.0), 10);
            arena.start_knockback(hero, Vec3::ZERO, 4.0, 0.5);
            assert!(arena.is_performing_forced_movement(hero));
            for _ in 0..40 {
                arena.integrate(DT);
            }
            let x = arena.snapshot(hero).unwrap().position.x;
            assert!((x - 3.0).abs() < 0.1);
        }

        #[test]
        fn obstacles_stop_movement() {
            let mut arena = Arena::new();
            let hero = arena.spawn_damageable(EntityTag::Hero, Vec3::ZERO, 10);
            arena.add_obstacle(Vec3::new(0.0, 0.0, 3.0), 1.0);
            arena.set_movement_target(hero, Vec3::new(0.0, 0.0, 6.0));
            for _ in 0..120 {
                arena.integrate(DT);
            }
            assert!(arena.snapshot(hero).unwrap().position.z < 1.6);
            assert!(!arena.is_moving(hero));
        }
    }

    mod character_tests {
        use super::*;

        #[test]
        fn attach_refuses_held_objects() {
            let mut arena = Arena::new();
            let a = arena.spawn_damageable(EntityTag::Hero, Vec3::ZERO, 10);
            let b = arena.spawn_damageable(EntityTag::Hero, Vec3::X, 10);
            let rock = arena.spawn(EntityTag::Prop, Vec3::Z);

            assert!(arena.attach(a, rock));
            assert!(!arena.attach(b, rock));
            assert_eq!(arena.snapshot(rock).unwrap().held_by, Some(a));

            arena.detach(a);
            assert!(arena.snapshot(a).unwrap().held.is_none());
            assert!(arena.attach(b, rock));
        }

        #[test]
        fn animator_counters_accumulate() {
            let mut arena = Arena::new();
            let tank = arena.spawn_damageable(EntityTag::Hero, Vec3::ZERO, 10);
            arena.adjust_animator_counter(tank, "Invincible", 1);
            arena.adjust_animator_counter(tank, "Invincible", 1);
            arena.adjust_animator_counter(tank, "Invincible", -1);
            assert_eq!(arena.animator_counter(tank, "Invincible"), 1);
            assert_eq!(arena.animator_counter(tank, "Other"), 0);
        }
    }

    mod projectile_tests {
        use super::*;

        fn arrow(max_victims: u32) -> ProjectileInfo {
            ProjectileInfo {
                prefab: "Arrow".into(),
                speed_m_s: 30.0,
                range: 10.0,
                damage: 7,
                max_victims,
            }
        }

        #[test]
        fn hits_the_first_foe_in_line() {
            let mut arena = Arena::new();
            let archer = arena.spawn_damageable(EntityTag::Hero, Vec3::ZERO, 10);
            let first = arena.spawn_damageable(EntityTag::Npc, Vec3::new(0.0, 0.0, 3.0), 10);
            let _second = arena.spawn_damageable(EntityTag::Npc, Vec3::new(0.0, 0.0, 6.0), 10);

            arena.launch_projectile(archer, &arrow(1), Vec3::ZERO, Vec3::Z);
            let mut hits = Vec::new();
            for _ in 0..60 {
                hits.extend(arena.integrate(DT).projectile_hits);
            }
            assert_eq!(hits.len(), 1);
            assert_eq!(hits[0].victim, first);
            assert!(arena.projectiles().is_empty());
        }

        #[test]
        fn piercing_projectiles_pass_through() {
            let mut arena = Arena::new();
            let archer = arena.spawn_damageable(EntityTag::Hero, Vec3::ZERO, 10);
            arena.spawn_damageable(EntityTag::Npc, Vec3::new(0.0, 0.0, 3.0), 10);
            arena.spawn_damageable(EntityTag::Npc, Vec3::new(0.0, 0.0, 6.0), 10);

            arena.launch_projectile(archer, &arrow(3), Vec3::ZERO, Vec3::Z);
            let mut hits = 0;
            for _ in 0..60 {
                hits += arena.integrate(DT).projectile_hits.len();
            }
            assert_eq!(hits, 2);
        }

        #[test]
        fn walls_stop_projectiles() {
            let mut arena = Arena::new();
            let archer = arena.spawn_damageable(EntityTag::Hero, Vec3::ZERO, 10);
            arena.spawn_damageable(EntityTag::Npc, Vec3::new(0.0, 0.0, 6.0), 10);
            arena.add_obstacle(Vec3::new(0.0, 0.0, 3.0), 1.0);

            arena.launch_projectile(archer, &arrow(1), Vec3::ZERO, Vec3::Z);
            let mut hits = 0;
            for _ in 0..60 {
                hits += arena.integrate(DT).projectile_hits.len();
            }
            assert_eq!(hits, 0);
            assert!(arena.projectiles().is_empty());
        }
    }
}
