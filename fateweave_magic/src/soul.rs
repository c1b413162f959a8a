// Soul transfer — identity capture at death, restoration onto a new body.
//
// A dying champion's entire identity is deep-copied into an immutable
// `SoulSnapshot` at the instant of death, before the host discards the
// actor. The `ReincarnationScheduler` holds the snapshot in a year-keyed
// queue and, when the due year arrives, finds or creates a host body and
// writes every captured field back onto it.
//
// Restoration rules:
// - The host body is the first living non-adult non-champion in id order;
//   when none exists, a newborn is spawned near the recorded tile.
// - The host's entire trait set is replaced by the snapshot's list. Ids
//   unknown to the `TraitRegistry` are skipped, not fatal — registries
//   change between save and load.
// - Stats are restored first, then every resource pool refills to its
//   maximum, then the champion's defining trait is re-applied so the
//   host's downstream champion setup runs.
// - Consecutive duplicate names collapse in the naming history, and the
//   host's pre-restoration name is appended only when it differs from the
//   snapshot's name.
//
// A restoration that finds nothing to restore onto is retried on a later
// pass instead of being dropped; an entry is only garbage-collected when
// both its snapshot and its fallen actor are gone.
//
// See also: `system.rs` for the per-archetype death policies that decide
// who reincarnates at all, `actor.rs` for the fields captured here.

use crate::actor::{Actor, ActorWorld, SocialLinks, Vitals};
use crate::event::{MagicEvent, MagicEventKind};
use crate::types::{ActorId, ChampionKind, Stat, Tile, TraitId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// An immutable capture of a champion's identity and progression, taken at
/// death. Every field is an owned deep copy — nothing here points into the
/// dying actor, which may be destroyed or reused immediately after.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SoulSnapshot {
    pub name: String,
    pub naming_history: Vec<String>,
    pub favorite: bool,
    pub preferred_food: Option<String>,

    pub level: u32,
    pub experience: f32,
    pub renown: i32,
    pub money: i32,
    pub kills: u32,
    pub generation: u32,
    pub births: u32,
    pub loot: u32,

    pub stats: BTreeMap<Stat, f32>,
    pub traits: Vec<TraitId>,
    pub social: SocialLinks,
    pub vitals: Vitals,

    pub champion: Option<ChampionKind>,
    pub remaining_lives: Option<u32>,
    pub soul_count: u32,
}

impl SoulSnapshot {
    /// Deep-copy every identity field off the dying actor.
    pub fn capture(actor: &Actor) -> Self {
        Self {
            name: actor.name.clone(),
            naming_history: actor.naming_history.clone(),
            favorite: actor.favorite,
            preferred_food: actor.preferred_food.clone(),
            level: actor.level,
            experience: actor.experience,
            renown: actor.renown,
            money: actor.money,
            kills: actor.kills,
            generation: actor.generation,
            births: actor.births,
            loot: actor.loot,
            stats: actor.stats.clone(),
            traits: actor.traits.iter().cloned().collect(),
            social: actor.social.clone(),
            vitals: actor.vitals.clone(),
            champion: actor.champion,
            remaining_lives: actor.remaining_lives,
            soul_count: actor.soul_count,
        }
    }
}

// ---------------------------------------------------------------------------
// Trait registry
// ---------------------------------------------------------------------------

/// The set of trait ids the current game session knows about. Snapshots may
/// reference traits from an older session; restoration silently skips them.
#[derive(Clone, Debug, Default)]
pub struct TraitRegistry {
    known: BTreeSet<TraitId>,
}

impl TraitRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a trait id. Duplicate registration is a no-op.
    pub fn define(&mut self, id: TraitId) {
        self.known.insert(id);
    }

    pub fn contains(&self, id: &TraitId) -> bool {
        self.known.contains(id)
    }

    pub fn len(&self) -> usize {
        self.known.len()
    }

    pub fn is_empty(&self) -> bool {
        self.known.is_empty()
    }
}

/// The trait that marks an actor as a champion of the given archetype.
/// Re-applied last during restoration so the host's champion-setup logic
/// sees a fully restored body.
pub fn defining_trait(kind: ChampionKind) -> TraitId {
    TraitId::new(match kind {
        ChampionKind::Hero => "hero",
        ChampionKind::DemonLord => "demon_lord",
        ChampionKind::Mentor => "mentor",
        ChampionKind::HeroPartyMember => "hero_party",
        ChampionKind::God => "god",
    })
}

/// Append a name, collapsing consecutive duplicates.
fn push_name(history: &mut Vec<String>, name: &str) {
    if history.last().map(|s| s.as_str()) != Some(name) {
        history.push(name.to_string());
    }
}

// ---------------------------------------------------------------------------
// Restoration
// ---------------------------------------------------------------------------

/// Write a snapshot onto a host body, creating one if necessary.
///
/// Returns the host's id, or `None` when nothing could be restored this
/// pass (the caller retries later).
pub fn restore(
    world: &mut ActorWorld,
    registry: &TraitRegistry,
    snapshot: &SoulSnapshot,
    spawn_tile: Tile,
) -> Option<ActorId> {
    let candidate = world
        .actors
        .values()
        .find(|a| a.is_alive && !a.is_adult && a.champion.is_none())
        .map(|a| a.id);
    let host_id = match candidate {
        Some(id) => id,
        None => world.spawn_infant(spawn_tile),
    };

    let host = world.actor_mut(host_id)?;

    // Naming history: collapse the snapshot's run of names, then record
    // what the host used to be called — unless it already matches.
    let old_name = host.name.clone();
    let mut history = Vec::new();
    for name in &snapshot.naming_history {
        push_name(&mut history, name);
    }
    if old_name != snapshot.name {
        push_name(&mut history, &old_name);
    }
    host.naming_history = history;
    host.name = snapshot.name.clone();

    host.favorite = snapshot.favorite;
    host.preferred_food = snapshot.preferred_food.clone();
    host.level = snapshot.level;
    host.experience = snapshot.experience;
    host.renown = snapshot.renown;
    host.money = snapshot.money;
    host.kills = snapshot.kills;
    host.generation = snapshot.generation;
    host.births = snapshot.births;
    host.loot = snapshot.loot;
    host.social = snapshot.social.clone();
    host.vitals = snapshot.vitals.clone();

    // The snapshot's trait list replaces the host's set wholesale; ids the
    // registry no longer knows are dropped.
    host.traits = snapshot
        .traits
        .iter()
        .filter(|id| registry.contains(id))
        .cloned()
        .collect();

    // Stats first, then pools to their maxima.
    host.stats = snapshot.stats.clone();
    host.refill_pools();

    host.remaining_lives = snapshot.remaining_lives;
    host.soul_count = snapshot.soul_count;

    // Defining trait last: this is what triggers champion setup downstream.
    if let Some(kind) = snapshot.champion {
        host.champion = Some(kind);
        host.traits.insert(defining_trait(kind));
    }

    Some(host_id)
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// A soul waiting for its restoration year.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PendingReincarnation {
    pub fallen: ActorId,
    /// `None` once consumed; an entry with no snapshot and no fallen actor
    /// left in the world is garbage.
    pub snapshot: Option<SoulSnapshot>,
    pub spawn_tile: Tile,
    pub due_year: u32,
}

/// The year-keyed reincarnation queue, keyed by fallen actor.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ReincarnationScheduler {
    pending: BTreeMap<ActorId, PendingReincarnation>,
}

impl ReincarnationScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a captured soul. Re-scheduling a fallen actor that already
    /// has a pending entry is a no-op. A zero delay attempts the restore
    /// immediately; if that fails the entry is queued for the current year
    /// and retried by `advance`.
    ///
    /// Returns the host id when an immediate restore happened.
    #[allow(clippy::too_many_arguments)]
    pub fn schedule(
        &mut self,
        world: &mut ActorWorld,
        registry: &TraitRegistry,
        fallen: ActorId,
        snapshot: SoulSnapshot,
        spawn_tile: Tile,
        delay_years: u32,
        events: &mut Vec<MagicEvent>,
    ) -> Option<ActorId> {
        if self.pending.contains_key(&fallen) {
            return None;
        }
        if delay_years == 0 {
            if let Some(host) = restore(world, registry, &snapshot, spawn_tile) {
                events.push(MagicEvent {
                    time: world.world_time,
                    kind: MagicEventKind::Reincarnated { fallen, host },
                });
                return Some(host);
            }
        }
        let due_year = world.current_year + delay_years;
        self.pending.insert(
            fallen,
            PendingReincarnation {
                fallen,
                snapshot: Some(snapshot),
                spawn_tile,
                due_year,
            },
        );
        events.push(MagicEvent {
            time: world.world_time,
            kind: MagicEventKind::ReincarnationScheduled { fallen, due_year },
        });
        None
    }

    /// Scan the queue: drop garbage, restore what is due. A failed restore
    /// keeps its entry for the next pass.
    pub fn advance(
        &mut self,
        world: &mut ActorWorld,
        registry: &TraitRegistry,
        events: &mut Vec<MagicEvent>,
    ) {
        let ids: Vec<ActorId> = self.pending.keys().copied().collect();
        for id in ids {
            let (is_garbage, due) = match self.pending.get(&id) {
                Some(entry) => (
                    entry.snapshot.is_none() && world.actor(entry.fallen).is_none(),
                    world.current_year >= entry.due_year,
                ),
                None => continue,
            };
            if is_garbage {
                self.pending.remove(&id);
                continue;
            }
            if !due {
                continue;
            }

            let (snapshot, spawn_tile) = match self.pending.get_mut(&id) {
                Some(entry) => (entry.snapshot.take(), entry.spawn_tile),
                None => continue,
            };
            let Some(snapshot) = snapshot else {
                continue;
            };
            match restore(world, registry, &snapshot, spawn_tile) {
                Some(host) => {
                    self.pending.remove(&id);
                    events.push(MagicEvent {
                        time: world.world_time,
                        kind: MagicEventKind::Reincarnated { fallen: id, host },
                    });
                }
                None => {
                    // Nothing to restore onto this pass; retry later.
                    if let Some(entry) = self.pending.get_mut(&id) {
                        entry.snapshot = Some(snapshot);
                    }
                }
            }
        }
    }

    pub fn is_pending(&self, fallen: ActorId) -> bool {
        self.pending.contains_key(&fallen)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}
