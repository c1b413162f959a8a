// Actors and the host-owned actor table.
//
// `Actor` is a typed component struct: every field the magic subsystem
// reads or writes is a named, typed field, keyed by the actor's stable id.
// There is no string-keyed scratch store — what the core persists, it
// persists through these fields.
//
// `ActorWorld` is the id→actor table plus the world clock. The host owns
// it and passes it `&mut` into every core entry point; the core itself
// owns only auxiliary maps (cooldowns, pending charges, pending
// reincarnations, destiny records) keyed by `ActorId`. Lookups return
// `Option` — a dangling id resolves to `None` and the caller no-ops.
//
// See also: `types.rs` for the id and enum types, `system.rs` for the
// entry points that borrow the world.
//
// **Critical constraint: determinism.** Actor ids are handed out from a
// monotonic counter and actors live in a `BTreeMap`, so iteration order is
// stable across runs and platforms.

use crate::types::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

// ---------------------------------------------------------------------------
// Social links
// ---------------------------------------------------------------------------

/// References from an actor into the host's social graph. All by id; the
/// host resolves them. Snapshotted wholesale at death.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SocialLinks {
    pub culture: Option<CultureId>,
    pub language: Option<LanguageId>,
    pub religion: Option<ReligionId>,
    pub clan: Option<ClanId>,
    pub family: Option<FamilyId>,
    pub plot: Option<PlotId>,
    pub city: Option<CityId>,
    pub army: Option<ArmyId>,
    pub kingdom: Option<KingdomId>,
}

/// Slow-moving wellbeing gauges, distinct from the combat resource pools.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Vitals {
    pub nutrition: f32,
    pub stamina: f32,
    pub happiness: f32,
}

impl Default for Vitals {
    fn default() -> Self {
        Self {
            nutrition: 100.0,
            stamina: 100.0,
            happiness: 50.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Actor
// ---------------------------------------------------------------------------

/// A single actor. The host simulation owns the authoritative copy; the
/// magic core reads and writes it through `ActorWorld` lookups.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Actor {
    pub id: ActorId,

    /// Current display name.
    pub name: String,
    /// Previous names, oldest first. Reincarnation appends here; consecutive
    /// duplicates are collapsed on append.
    pub naming_history: Vec<String>,
    /// Player-favorited flag. Survives reincarnation.
    pub favorite: bool,
    /// Preferred food, if the actor has picked one.
    pub preferred_food: Option<String>,

    pub position: Tile,

    // Progression.
    pub level: u32,
    pub experience: f32,
    pub renown: i32,
    pub money: i32,
    pub kills: u32,
    pub generation: u32,
    pub births: u32,
    pub loot: u32,

    /// Per-stat values. Absent entries read as 0.
    pub stats: BTreeMap<Stat, f32>,
    /// The actor's full trait set.
    pub traits: BTreeSet<TraitId>,
    pub social: SocialLinks,
    pub vitals: Vitals,

    // Resource pools.
    pub health: f32,
    pub health_max: f32,
    pub mana: f32,
    pub mana_max: f32,

    // Champion bookkeeping.
    pub champion: Option<ChampionKind>,
    /// Bodies left for limited-lives archetypes. `None` for everyone else.
    pub remaining_lives: Option<u32>,
    /// Decrementing counter for the soul archetype. Does not gate restores.
    pub soul_count: u32,
    /// A sealed antagonist no longer counts as an active threat.
    pub sealed: bool,

    // Combat signals, written by the host's combat layer.
    pub in_combat: bool,
    pub attack_target: Option<ActorId>,
    /// The hero this actor follows, for party members.
    pub leader: Option<ActorId>,

    /// Where the core last asked the host to path this actor. The host's
    /// movement layer consumes this; the core only reissues it when the
    /// destination actually changes.
    pub move_target: Option<Tile>,

    /// Timed status effects with remaining seconds. Decayed each tick.
    pub statuses: BTreeMap<StatusEffect, f32>,

    pub is_adult: bool,
    pub is_alive: bool,
}

impl Actor {
    /// A living adult with empty progression at the given position.
    pub fn new(id: ActorId, name: impl Into<String>, position: Tile) -> Self {
        Self {
            id,
            name: name.into(),
            naming_history: Vec::new(),
            favorite: false,
            preferred_food: None,
            position,
            level: 1,
            experience: 0.0,
            renown: 0,
            money: 0,
            kills: 0,
            generation: 0,
            births: 0,
            loot: 0,
            stats: BTreeMap::new(),
            traits: BTreeSet::new(),
            social: SocialLinks::default(),
            vitals: Vitals::default(),
            health: 100.0,
            health_max: 100.0,
            mana: 50.0,
            mana_max: 50.0,
            champion: None,
            remaining_lives: None,
            soul_count: 0,
            sealed: false,
            in_combat: false,
            attack_target: None,
            leader: None,
            move_target: None,
            statuses: BTreeMap::new(),
            is_adult: true,
            is_alive: true,
        }
    }

    /// Read a stat; absent entries are 0.
    pub fn stat(&self, stat: Stat) -> f32 {
        self.stats.get(&stat).copied().unwrap_or(0.0)
    }

    /// Add a delta to a stat, creating the entry if needed.
    pub fn add_stat(&mut self, stat: Stat, delta: f32) {
        *self.stats.entry(stat).or_insert(0.0) += delta;
    }

    pub fn has_trait(&self, id: &TraitId) -> bool {
        self.traits.contains(id)
    }

    /// Apply a timed status. Re-applying extends to the longer remaining
    /// time; it never shortens one already running.
    pub fn apply_status(&mut self, status: StatusEffect, seconds: f32) {
        let entry = self.statuses.entry(status).or_insert(0.0);
        if seconds > *entry {
            *entry = seconds;
        }
    }

    pub fn clear_status(&mut self, status: StatusEffect) {
        self.statuses.remove(&status);
    }

    pub fn has_status(&self, status: StatusEffect) -> bool {
        self.statuses.contains_key(&status)
    }

    /// Fill every resource pool to its maximum.
    pub fn refill_pools(&mut self) {
        self.health = self.health_max;
        self.mana = self.mana_max;
        self.vitals.stamina = 100.0;
    }
}

// ---------------------------------------------------------------------------
// ActorWorld
// ---------------------------------------------------------------------------

/// The id→actor table, world clock, and spawn facility. Owned by the host,
/// borrowed by the core per call.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ActorWorld {
    /// All actors, keyed by id. BTreeMap for deterministic iteration.
    pub actors: BTreeMap<ActorId, Actor>,
    /// Monotonic id counter. Ids are never reused.
    next_actor_id: u32,
    /// Accumulated simulation time in seconds.
    pub world_time: f64,
    /// Host-advanced calendar year. The reincarnation queue is keyed on it.
    pub current_year: u32,
    /// The rally point champions relocate to while gathering resolve.
    pub sacred_site: Option<Tile>,
}

impl Default for ActorWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl ActorWorld {
    pub fn new() -> Self {
        Self {
            actors: BTreeMap::new(),
            next_actor_id: 1,
            world_time: 0.0,
            current_year: 0,
            sacred_site: None,
        }
    }

    /// Spawn a living adult actor and return its id.
    pub fn spawn(&mut self, name: impl Into<String>, position: Tile) -> ActorId {
        let id = ActorId(self.next_actor_id);
        self.next_actor_id += 1;
        self.actors.insert(id, Actor::new(id, name, position));
        id
    }

    /// Spawn a newborn near the given tile. Used as the reincarnation host
    /// of last resort when no eligible body exists.
    pub fn spawn_infant(&mut self, near: Tile) -> ActorId {
        let id = self.spawn("Unnamed", near);
        if let Some(actor) = self.actors.get_mut(&id) {
            actor.is_adult = false;
            actor.generation = 0;
        }
        id
    }

    pub fn actor(&self, id: ActorId) -> Option<&Actor> {
        self.actors.get(&id)
    }

    pub fn actor_mut(&mut self, id: ActorId) -> Option<&mut Actor> {
        self.actors.get_mut(&id)
    }

    /// A living actor, or `None` when the id is dangling or the body died.
    pub fn living(&self, id: ActorId) -> Option<&Actor> {
        self.actors.get(&id).filter(|a| a.is_alive)
    }

    pub fn living_mut(&mut self, id: ActorId) -> Option<&mut Actor> {
        self.actors.get_mut(&id).filter(|a| a.is_alive)
    }

    /// Discard an actor entirely. The host calls this after its own death
    /// pipeline (and after `MagicSystem::on_actor_death`) has run.
    pub fn remove(&mut self, id: ActorId) {
        self.actors.remove(&id);
    }

    /// Decay every timed status by `dt`, dropping the expired ones.
    pub fn decay_statuses(&mut self, dt: f32) {
        for actor in self.actors.values_mut() {
            actor.statuses.retain(|_, remaining| {
                *remaining -= dt;
                *remaining > 0.0
            });
        }
    }
}
