// Destiny state machines — the threat-response orchestrator.
//
// Every champion with a destiny role steps through the same abstract cycle:
// `NormalLife → AwareOfThreat → Preparing → {Responding ⇄ Fighting}`, with
// per-state randomized decision windows. Two independent instances of the
// machine run side by side: one table for the Hero role (heroes and
// mentors), one for the HeroParty role (the hero's followers). An actor's
// record in one table never touches the other.
//
// The threat is any living, unsealed antagonist champion. When no threat
// exists, every record snaps back to `NormalLife` and the rally-visited
// flag clears, so the whole cycle can repeat on the next threat.
//
// Transition rules:
// - `elapsed` resets to zero on every transition.
// - The decision window is re-rolled on every transition, never mid-state.
// - Missing actors, targets, or context make a step a no-op; the machine
//   never panics and never leaves an actor without a state.
//
// Movement is requested through `Actor::move_target` and deduplicated per
// record: a path order is only reissued when the destination tile actually
// changes, so followers don't spam the host's pathfinder every tick.
//
// The companion bond (HeroParty only) accumulates while follower and hero
// fight together, decays apart, and grants/revokes flat stat bonuses at two
// thresholds. `apply_bond_level` is idempotent: re-applying the current
// level changes nothing.
//
// See also: `config.rs` for the window ranges and thresholds, `event.rs`
// for `DestinyChanged`/`BondLevelChanged`, `actor.rs` for the combat
// signals this machine reads.
//
// **Critical constraint: determinism.** Role membership is gathered in
// id order from the `BTreeMap`, and every roll draws from the shared
// `SimRng`, so two worlds with the same seed step identically.

use crate::actor::{Actor, ActorWorld};
use crate::config::{MagicConfig, PowerWeights};
use crate::event::{MagicEvent, MagicEventKind};
use crate::types::{ActorId, ChampionKind, DestinyRole, DestinyState, Tile};
use fateweave_prng::SimRng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// Per-actor, per-role destiny bookkeeping.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DestinyRecord {
    pub state: DestinyState,
    /// Seconds accumulated in the current state.
    pub elapsed: f32,
    /// The decision window rolled at the last transition.
    pub window: f32,
    /// Whether the one-time rally relocation has fired this threat episode.
    pub visited_rally: bool,
    /// The last destination issued to the host's pathfinder.
    pub last_move_order: Option<Tile>,
}

impl Default for DestinyRecord {
    fn default() -> Self {
        Self {
            state: DestinyState::NormalLife,
            elapsed: 0.0,
            window: 0.0,
            visited_rally: false,
            last_move_order: None,
        }
    }
}

/// Companion bond accumulator for a HeroParty follower.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct BondRecord {
    /// Accumulated bond seconds.
    pub time: f32,
    /// The bond level whose bonuses are currently applied (0, 1, or 2).
    pub level: u8,
}

// ---------------------------------------------------------------------------
// Power score
// ---------------------------------------------------------------------------

/// The champion power score: a dot product of the configured weights with
/// the actor's progression numbers. Tuning data, not code.
pub fn power_score(actor: &Actor, weights: &PowerWeights) -> f32 {
    let stat_sum: f32 = actor.stats.values().sum();
    weights.level * actor.level as f32
        + weights.kills * actor.kills as f32
        + weights.renown * actor.renown as f32
        + weights.stats * stat_sum
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Both destiny tables plus the bond table.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DestinyEngine {
    hero_records: BTreeMap<ActorId, DestinyRecord>,
    party_records: BTreeMap<ActorId, DestinyRecord>,
    bonds: BTreeMap<ActorId, BondRecord>,
}

/// The first living, unsealed antagonist champion, in id order.
pub fn find_threat(world: &ActorWorld) -> Option<ActorId> {
    world
        .actors
        .values()
        .find(|a| a.is_alive && a.champion == Some(ChampionKind::DemonLord) && !a.sealed)
        .map(|a| a.id)
}

/// Mean tile of the living combatants near the threat — where the fight
/// actually is, as opposed to where the threat is standing.
fn battle_zone(world: &ActorWorld, threat_pos: Tile, radius_sq: f32) -> Option<Tile> {
    let mut count = 0i32;
    let (mut sum_x, mut sum_z) = (0i64, 0i64);
    for actor in world.actors.values() {
        if actor.is_alive && actor.in_combat && actor.position.dist_sq(threat_pos) <= radius_sq {
            sum_x += actor.position.x as i64;
            sum_z += actor.position.z as i64;
            count += 1;
        }
    }
    if count == 0 {
        return None;
    }
    Some(Tile::new(
        (sum_x / count as i64) as i32,
        (sum_z / count as i64) as i32,
    ))
}

/// Issue a path order only when the destination actually changed.
fn issue_move(world: &mut ActorWorld, rec: &mut DestinyRecord, id: ActorId, dest: Tile) {
    if rec.last_move_order == Some(dest) {
        return;
    }
    if let Some(actor) = world.actor_mut(id) {
        actor.move_target = Some(dest);
        rec.last_move_order = Some(dest);
    }
}

fn transition(
    rec: &mut DestinyRecord,
    id: ActorId,
    role: DestinyRole,
    to: DestinyState,
    window: f32,
    time: f64,
    events: &mut Vec<MagicEvent>,
) {
    let from = rec.state;
    rec.state = to;
    rec.elapsed = 0.0;
    rec.window = window;
    events.push(MagicEvent {
        time,
        kind: MagicEventKind::DestinyChanged { actor: id, role, from, to },
    });
}

impl DestinyEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// The current state of an actor's record in the given role table.
    pub fn state_of(&self, role: DestinyRole, id: ActorId) -> Option<DestinyState> {
        match role {
            DestinyRole::Hero => self.hero_records.get(&id).map(|r| r.state),
            DestinyRole::HeroParty => self.party_records.get(&id).map(|r| r.state),
        }
    }

    pub fn bond(&self, id: ActorId) -> Option<&BondRecord> {
        self.bonds.get(&id)
    }

    /// Advance every tracked champion by `dt` seconds.
    pub fn tick(
        &mut self,
        world: &mut ActorWorld,
        config: &MagicConfig,
        rng: &mut SimRng,
        dt: f32,
        events: &mut Vec<MagicEvent>,
    ) {
        self.collect_garbage(world);

        let Some(threat) = find_threat(world) else {
            self.reset_all(world, events);
            self.tick_bonds(world, config, dt, events);
            return;
        };

        let heroes: Vec<ActorId> = world
            .actors
            .values()
            .filter(|a| {
                a.is_alive
                    && matches!(a.champion, Some(ChampionKind::Hero | ChampionKind::Mentor))
            })
            .map(|a| a.id)
            .collect();
        let party: Vec<ActorId> = world
            .actors
            .values()
            .filter(|a| a.is_alive && a.champion == Some(ChampionKind::HeroPartyMember))
            .map(|a| a.id)
            .collect();

        for id in heroes {
            self.step_hero(world, config, rng, dt, id, threat, events);
        }
        for id in party {
            self.step_party(world, config, rng, dt, id, threat, events);
        }
        self.tick_bonds(world, config, dt, events);
    }

    /// Snap every record back to `NormalLife` (threat gone). Clears the
    /// rally flag so the relocation fires again on the next threat.
    fn reset_all(&mut self, world: &ActorWorld, events: &mut Vec<MagicEvent>) {
        for (role, records) in [
            (DestinyRole::Hero, &mut self.hero_records),
            (DestinyRole::HeroParty, &mut self.party_records),
        ] {
            for (&id, rec) in records.iter_mut() {
                if rec.state != DestinyState::NormalLife {
                    transition(
                        rec,
                        id,
                        role,
                        DestinyState::NormalLife,
                        0.0,
                        world.world_time,
                        events,
                    );
                }
                rec.visited_rally = false;
                rec.last_move_order = None;
            }
        }
    }

    /// Drop records whose actor is gone or dead.
    fn collect_garbage(&mut self, world: &ActorWorld) {
        self.hero_records.retain(|&id, _| world.living(id).is_some());
        self.party_records.retain(|&id, _| world.living(id).is_some());
        self.bonds.retain(|&id, _| world.living(id).is_some());
    }

    #[allow(clippy::too_many_arguments)]
    fn step_hero(
        &mut self,
        world: &mut ActorWorld,
        config: &MagicConfig,
        rng: &mut SimRng,
        dt: f32,
        id: ActorId,
        threat: ActorId,
        events: &mut Vec<MagicEvent>,
    ) {
        let Some((pos, in_combat, power)) = world
            .living(id)
            .map(|a| (a.position, a.in_combat, power_score(a, &config.power_weights)))
        else {
            return;
        };
        let Some(threat_pos) = world.living(threat).map(|a| a.position) else {
            return;
        };
        let p = &config.hero;
        let time = world.world_time;
        let rec = self.hero_records.entry(id).or_default();

        match rec.state {
            DestinyState::NormalLife => {
                // A hero notices the threat the moment it exists.
                transition(
                    rec,
                    id,
                    DestinyRole::Hero,
                    DestinyState::AwareOfThreat,
                    p.decision_window.roll(rng),
                    time,
                    events,
                );
                if !rec.visited_rally {
                    if let Some(site) = world.sacred_site {
                        issue_move(world, rec, id, site);
                        rec.visited_rally = true;
                    }
                }
            }
            DestinyState::AwareOfThreat => {
                rec.elapsed += dt;
                let near = pos.dist_sq(threat_pos) <= p.response_range_sq;
                let strong = power >= p.power_threshold;
                if rec.elapsed >= rec.window || near || strong {
                    transition(
                        rec,
                        id,
                        DestinyRole::Hero,
                        DestinyState::Preparing,
                        p.decision_window.roll(rng),
                        time,
                        events,
                    );
                }
            }
            DestinyState::Preparing => {
                rec.elapsed += dt;
                let ready = pos.dist_sq(threat_pos) <= p.response_range_sq
                    || in_combat
                    || power >= p.power_threshold;
                if ready {
                    transition(
                        rec,
                        id,
                        DestinyRole::Hero,
                        DestinyState::Responding,
                        p.decision_window.roll(rng),
                        time,
                        events,
                    );
                } else if rec.elapsed >= rec.window {
                    // Not ready: cycle back through the rally point. The
                    // timer resets but the window is kept — it only
                    // re-rolls on a real transition.
                    if let Some(site) = world.sacred_site {
                        issue_move(world, rec, id, site);
                    }
                    rec.elapsed = 0.0;
                }
            }
            DestinyState::Responding => {
                rec.elapsed += dt;
                let dist_sq = pos.dist_sq(threat_pos);
                let dest = if dist_sq > p.response_range_sq {
                    battle_zone(world, threat_pos, p.response_range_sq).unwrap_or(threat_pos)
                } else {
                    threat_pos
                };
                issue_move(world, rec, id, dest);
                if dist_sq <= p.combat_enter_dist_sq && in_combat {
                    transition(
                        rec,
                        id,
                        DestinyRole::Hero,
                        DestinyState::Fighting,
                        p.decision_window.roll(rng),
                        time,
                        events,
                    );
                }
            }
            DestinyState::Fighting => {
                rec.elapsed += dt;
                let dist_sq = pos.dist_sq(threat_pos);
                if dist_sq > p.combat_exit_dist_sq || !in_combat {
                    transition(
                        rec,
                        id,
                        DestinyRole::Hero,
                        DestinyState::Responding,
                        p.decision_window.roll(rng),
                        time,
                        events,
                    );
                }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn step_party(
        &mut self,
        world: &mut ActorWorld,
        config: &MagicConfig,
        rng: &mut SimRng,
        dt: f32,
        id: ActorId,
        threat: ActorId,
        events: &mut Vec<MagicEvent>,
    ) {
        let Some((pos, in_combat, leader)) = world
            .living(id)
            .map(|a| (a.position, a.in_combat, a.leader))
        else {
            return;
        };
        let Some(threat_pos) = world.living(threat).map(|a| a.position) else {
            return;
        };
        // (position, fighting, target) of the leader, when it resolves.
        let leader_info = leader
            .and_then(|l| world.living(l))
            .map(|a| (a.position, a.in_combat, a.attack_target));
        let p = &config.party;
        let time = world.world_time;
        let rec = self.party_records.entry(id).or_default();

        match rec.state {
            DestinyState::NormalLife => {
                if rec.window <= 0.0 {
                    rec.window = p.aware_window.roll(rng);
                }
                rec.elapsed += dt;
                if rec.elapsed >= rec.window {
                    if rng.random_bool(p.awareness_chance) {
                        transition(
                            rec,
                            id,
                            DestinyRole::HeroParty,
                            DestinyState::AwareOfThreat,
                            p.aware_window.roll(rng),
                            time,
                            events,
                        );
                        if !rec.visited_rally {
                            if let Some(site) = world.sacred_site {
                                issue_move(world, rec, id, site);
                                rec.visited_rally = true;
                            }
                        }
                    } else {
                        // Failed the awareness roll: stay dormant, try again
                        // after another full window.
                        rec.elapsed = 0.0;
                    }
                }
            }
            DestinyState::AwareOfThreat => {
                rec.elapsed += dt;
                if rec.elapsed >= rec.window {
                    transition(
                        rec,
                        id,
                        DestinyRole::HeroParty,
                        DestinyState::Preparing,
                        p.preparing_window.roll(rng),
                        time,
                        events,
                    );
                }
            }
            DestinyState::Preparing => {
                rec.elapsed += dt;
                let ready = in_combat
                    || should_assist(pos, leader_info, p.assist_dist_sq)
                    || pos.dist_sq(threat_pos) <= config.hero.response_range_sq;
                if ready {
                    transition(
                        rec,
                        id,
                        DestinyRole::HeroParty,
                        DestinyState::Responding,
                        p.responding_window.roll(rng),
                        time,
                        events,
                    );
                } else if rec.elapsed >= rec.window {
                    if let Some(site) = world.sacred_site {
                        issue_move(world, rec, id, site);
                    }
                    rec.elapsed = 0.0;
                }
            }
            DestinyState::Responding => {
                rec.elapsed += dt;
                // Followers stick to their hero; a leaderless member falls
                // back to hunting the threat like a hero would.
                let dest = match leader_info {
                    Some((leader_pos, _, _)) => leader_pos,
                    None => battle_zone(world, threat_pos, config.hero.response_range_sq)
                        .unwrap_or(threat_pos),
                };
                issue_move(world, rec, id, dest);

                let engaged = match leader_info {
                    Some(_) => should_assist(pos, leader_info, p.assist_dist_sq),
                    None => pos.dist_sq(threat_pos) <= p.combat_enter_dist_sq,
                };
                if engaged && in_combat {
                    transition(
                        rec,
                        id,
                        DestinyRole::HeroParty,
                        DestinyState::Fighting,
                        p.responding_window.roll(rng),
                        time,
                        events,
                    );
                }
            }
            DestinyState::Fighting => {
                rec.elapsed += dt;
                // Mirror the leader's combat target while the leader fights.
                if let Some((_, true, Some(target))) = leader_info {
                    if let Some(actor) = world.actor_mut(id) {
                        actor.attack_target = Some(target);
                    }
                }
                let still_engaged = in_combat
                    && match leader_info {
                        Some((leader_pos, leader_fighting, _)) => {
                            leader_fighting && pos.dist_sq(leader_pos) <= p.combat_exit_dist_sq
                        }
                        None => pos.dist_sq(threat_pos) <= p.combat_exit_dist_sq,
                    };
                if !still_engaged {
                    transition(
                        rec,
                        id,
                        DestinyRole::HeroParty,
                        DestinyState::Responding,
                        p.responding_window.roll(rng),
                        time,
                        events,
                    );
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Bond
    // -----------------------------------------------------------------------

    fn tick_bonds(
        &mut self,
        world: &mut ActorWorld,
        config: &MagicConfig,
        dt: f32,
        events: &mut Vec<MagicEvent>,
    ) {
        let followers: Vec<(ActorId, ActorId)> = world
            .actors
            .values()
            .filter(|a| a.is_alive && a.champion == Some(ChampionKind::HeroPartyMember))
            .filter_map(|a| a.leader.map(|l| (a.id, l)))
            .collect();

        for (id, leader) in followers {
            let Some((pos, in_combat)) = world.living(id).map(|a| (a.position, a.in_combat))
            else {
                continue;
            };
            let Some((leader_pos, leader_fighting)) =
                world.living(leader).map(|a| (a.position, a.in_combat))
            else {
                continue;
            };

            let together = in_combat
                && leader_fighting
                && pos.dist_sq(leader_pos) <= config.bond.near_dist_sq;

            let (time, current) = {
                let rec = self.bonds.entry(id).or_default();
                if together {
                    rec.time += config.bond.gain_per_second * dt;
                } else {
                    rec.time = (rec.time - config.bond.decay_per_second * dt).max(0.0);
                }
                (rec.time, rec.level)
            };

            let desired = if time >= config.bond.level_two_threshold {
                2
            } else if time >= config.bond.level_one_threshold {
                1
            } else {
                0
            };
            if desired != current {
                self.apply_bond_level(world, id, desired, config, events);
            }
        }
    }

    /// Move a follower to the given bond level, swapping stat bonuses.
    /// Idempotent: applying the level already in force is a no-op, so a
    /// level is never double-stacked.
    pub fn apply_bond_level(
        &mut self,
        world: &mut ActorWorld,
        follower: ActorId,
        level: u8,
        config: &MagicConfig,
        events: &mut Vec<MagicEvent>,
    ) -> bool {
        let rec = self.bonds.entry(follower).or_default();
        if rec.level == level {
            return false;
        }
        let old = rec.level;
        rec.level = level;
        if let Some(actor) = world.actor_mut(follower) {
            if let Some(bonus) = bond_bonus(old, config) {
                for (&stat, &delta) in bonus {
                    actor.add_stat(stat, -delta);
                }
            }
            if let Some(bonus) = bond_bonus(level, config) {
                for (&stat, &delta) in bonus {
                    actor.add_stat(stat, delta);
                }
            }
        }
        events.push(MagicEvent {
            time: world.world_time,
            kind: MagicEventKind::BondLevelChanged { follower, level },
        });
        true
    }
}

/// A fighting leader close enough pulls its follower into the fray.
fn should_assist(
    pos: Tile,
    leader_info: Option<(Tile, bool, Option<ActorId>)>,
    assist_dist_sq: f32,
) -> bool {
    match leader_info {
        Some((leader_pos, leader_fighting, _)) => {
            leader_fighting && pos.dist_sq(leader_pos) <= assist_dist_sq
        }
        None => false,
    }
}

fn bond_bonus(level: u8, config: &MagicConfig) -> Option<&BTreeMap<crate::types::Stat, f32>> {
    match level {
        1 => Some(&config.bond.level_one_bonus),
        2 => Some(&config.bond.level_two_bonus),
        _ => None,
    }
}
