// The spellcasting pipeline: gating, charge-up, and resolution.
//
// A cast request flows through `queue()`: the gating checks each produce a
// distinct `CastRejection` value (never a panic), and a passing request
// either resolves immediately (no charge phase) or becomes a
// `SpellChargeRequest` counting down in the pending table.
//
// At most one request is in flight per actor at any time. There are no
// locks — the whole core runs inside the host's single tick callback, so
// the invariant is a map presence check.
//
// Cancellation is implicit: a request whose caster has been destroyed or
// killed is dropped on the next `advance()` pass, statuses cleared, effect
// never run.
//
// See also: `cooldown.rs` (cooldowns are recorded here, only after a
// successful cast), `spell.rs` for the definitions, `config.rs` for the
// pacing parameters.

use crate::actor::ActorWorld;
use crate::config::MagicConfig;
use crate::cooldown::CooldownTracker;
use crate::event::{MagicEvent, MagicEventKind};
use crate::spell::{SpellCatalog, SpellDefinition};
use crate::types::{ActorId, SpellId, StatusEffect};
use fateweave_prng::SimRng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Request and result types
// ---------------------------------------------------------------------------

/// An in-flight charging cast.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SpellChargeRequest {
    pub actor: ActorId,
    pub spell: SpellId,
    pub target: ActorId,
    /// Seconds until the cast resolves.
    pub remaining: f32,
}

/// How an accepted cast request was handled.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum CastQueued {
    /// The spell had no charge phase and resolved on the spot.
    Immediate,
    /// The cast is charging and will resolve in `duration` seconds.
    Charging { duration: f32 },
}

/// Why a cast request was refused. Every precondition failure is a value
/// returned to the caller; nothing here is fatal.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum CastRejection {
    #[error("the magic system has not been started")]
    NotStarted,
    #[error("unknown spell {0}")]
    UnknownSpell(SpellId),
    #[error("caster {0} is missing or dead")]
    CasterMissing(ActorId),
    #[error("caster level {have} is below the required {need}")]
    LevelTooLow { have: u32, need: u32 },
    #[error("spell cannot be used while in combat")]
    ForbiddenInCombat,
    #[error("not enough mana ({have} of {need})")]
    NotEnoughMana { have: f32, need: f32 },
    #[error("target is closer than the spell's minimum distance")]
    TargetTooClose,
    #[error("spell is still cooling down")]
    CoolingDown,
    #[error("caster already has a cast charging")]
    ChargeInFlight,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Pending charge requests, keyed by caster. The key uniqueness IS the
/// one-in-flight-per-actor invariant.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SpellChargeEngine {
    pending: BTreeMap<ActorId, SpellChargeRequest>,
}

impl SpellChargeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Gate and queue a cast request.
    #[allow(clippy::too_many_arguments)]
    pub fn queue(
        &mut self,
        world: &mut ActorWorld,
        catalog: &SpellCatalog,
        cooldowns: &mut CooldownTracker,
        config: &MagicConfig,
        rng: &mut SimRng,
        caster: ActorId,
        spell: &SpellId,
        target: Option<ActorId>,
        events: &mut Vec<MagicEvent>,
    ) -> Result<CastQueued, CastRejection> {
        let def = catalog
            .get(spell)
            .ok_or_else(|| CastRejection::UnknownSpell(spell.clone()))?;

        let (level, in_combat, mana, caster_pos) = match world.living(caster) {
            Some(a) => (a.level, a.in_combat, a.mana, a.position),
            None => return Err(CastRejection::CasterMissing(caster)),
        };

        if level < def.required_level {
            return Err(CastRejection::LevelTooLow {
                have: level,
                need: def.required_level,
            });
        }
        if in_combat && !def.can_be_used_in_combat {
            return Err(CastRejection::ForbiddenInCombat);
        }

        // An explicit target that no longer resolves falls back to the
        // caster, same as an absent one.
        let target_id = target
            .filter(|t| world.living(*t).is_some())
            .unwrap_or(caster);

        if def.min_distance > 0.0 && target_id != caster {
            let target_pos = world
                .living(target_id)
                .map(|t| t.position)
                .unwrap_or(caster_pos);
            if caster_pos.dist_sq(target_pos) < def.min_distance * def.min_distance {
                return Err(CastRejection::TargetTooClose);
            }
        }

        if def.cooldown > 0.0
            && !cooldowns.is_ready(
                caster,
                spell,
                def.cooldown,
                world.world_time,
                in_combat,
                config.spellcast.combat_frequency_multiplier,
            )
        {
            return Err(CastRejection::CoolingDown);
        }

        let cost = def.mana_cost as f32;
        if mana < cost {
            return Err(CastRejection::NotEnoughMana { have: mana, need: cost });
        }

        if def.charge_duration <= 0.0 {
            // No charge phase: the cast commits and resolves on the spot.
            if let Some(a) = world.living_mut(caster) {
                a.mana -= cost;
            }
            resolve_cast(world, def, cooldowns, config, rng, caster, target_id, events);
            return Ok(CastQueued::Immediate);
        }

        if self.pending.contains_key(&caster) {
            return Err(CastRejection::ChargeInFlight);
        }

        if let Some(a) = world.living_mut(caster) {
            a.mana -= cost;
            a.apply_status(StatusEffect::Charging, def.charge_duration);
        }
        self.pending.insert(
            caster,
            SpellChargeRequest {
                actor: caster,
                spell: spell.clone(),
                target: target_id,
                remaining: def.charge_duration,
            },
        );
        events.push(MagicEvent {
            time: world.world_time,
            kind: MagicEventKind::SpellChargeStarted {
                caster,
                spell: spell.clone(),
            },
        });
        Ok(CastQueued::Charging {
            duration: def.charge_duration,
        })
    }

    /// Count every live request down by `dt`; abort the invalid, resolve
    /// the due.
    #[allow(clippy::too_many_arguments)]
    pub fn advance(
        &mut self,
        world: &mut ActorWorld,
        catalog: &SpellCatalog,
        cooldowns: &mut CooldownTracker,
        config: &MagicConfig,
        rng: &mut SimRng,
        dt: f32,
        events: &mut Vec<MagicEvent>,
    ) {
        let ids: Vec<ActorId> = self.pending.keys().copied().collect();
        for id in ids {
            if world.living(id).is_none() {
                // Caster destroyed or dead mid-charge: drop without executing.
                if let Some(request) = self.pending.remove(&id) {
                    if let Some(actor) = world.actor_mut(id) {
                        actor.clear_status(StatusEffect::Charging);
                    }
                    events.push(MagicEvent {
                        time: world.world_time,
                        kind: MagicEventKind::SpellChargeAborted {
                            caster: id,
                            spell: request.spell,
                        },
                    });
                }
                continue;
            }

            let due = match self.pending.get_mut(&id) {
                Some(request) => {
                    request.remaining -= dt;
                    request.remaining <= 0.0
                }
                None => false,
            };
            if !due {
                continue;
            }

            if let Some(request) = self.pending.remove(&id) {
                match catalog.get(&request.spell) {
                    Some(def) => resolve_cast(
                        world,
                        def,
                        cooldowns,
                        config,
                        rng,
                        request.actor,
                        request.target,
                        events,
                    ),
                    None => {
                        // Catalog changed under a live request (mod unload).
                        if let Some(actor) = world.actor_mut(id) {
                            actor.clear_status(StatusEffect::Charging);
                        }
                    }
                }
            }
        }
    }

    /// The spell an actor is currently charging, if any. Read by the
    /// host's tooltip/UI layer.
    pub fn charging_spell(&self, actor: ActorId) -> Option<&SpellId> {
        self.pending.get(&actor).map(|r| &r.spell)
    }

    pub fn has_pending(&self, actor: ActorId) -> bool {
        self.pending.contains_key(&actor)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// The final cast chance: base chance, plus the range bonus faded by
/// distance, plus the caster's mage-rank bonus, clamped to [0, 1].
fn cast_chance(def: &SpellDefinition, distance: f32, level: u32, config: &MagicConfig) -> f32 {
    let range_multiplier = if def.range_falloff_distance > 0.0 {
        (1.0 - distance / def.range_falloff_distance).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let rank = if config.spellcast.rank_level_step > 0 {
        level / config.spellcast.rank_level_step
    } else {
        0
    };
    let rank_bonus = (rank as f32 * config.spellcast.rank_chance_bonus).min(1.0);
    (def.chance + def.range_bonus * range_multiplier + rank_bonus).clamp(0.0, 1.0)
}

/// Resolve a committed cast: status choreography, the chance roll, the
/// effect call, and cooldown recording on success.
#[allow(clippy::too_many_arguments)]
fn resolve_cast(
    world: &mut ActorWorld,
    def: &SpellDefinition,
    cooldowns: &mut CooldownTracker,
    config: &MagicConfig,
    rng: &mut SimRng,
    caster: ActorId,
    target: ActorId,
    events: &mut Vec<MagicEvent>,
) {
    let (caster_pos, level) = match world.living(caster) {
        Some(a) => (a.position, a.level),
        None => return,
    };
    // The target may have died during the charge; fall back to the caster.
    let target = if world.living(target).is_some() {
        target
    } else {
        caster
    };
    let (target_pos, tile) = match world.living(target) {
        Some(t) => (t.position, t.position),
        None => (caster_pos, caster_pos),
    };

    let casting_seconds = (def.charge_duration * 0.5 + 0.5).max(0.5);
    if let Some(a) = world.actor_mut(caster) {
        a.clear_status(StatusEffect::Charging);
        a.apply_status(StatusEffect::Casting, casting_seconds);
    }

    let chance = cast_chance(def, caster_pos.dist(target_pos), level, config);
    if !rng.random_bool(chance as f64) {
        if let Some(a) = world.actor_mut(caster) {
            a.clear_status(StatusEffect::Casting);
        }
        events.push(MagicEvent {
            time: world.world_time,
            kind: MagicEventKind::SpellFizzled {
                caster,
                spell: def.id.clone(),
            },
        });
        return;
    }

    if (def.effect)(world, caster, target, tile) {
        if let Some(a) = world.actor_mut(caster) {
            a.apply_status(
                StatusEffect::SpellRecovery,
                def.cooldown.max(config.spellcast.recovery_min_seconds),
            );
        }
        if def.cooldown > 0.0 {
            cooldowns.record(caster, &def.id, world.world_time);
        }
        events.push(MagicEvent {
            time: world.world_time,
            kind: MagicEventKind::SpellCast {
                caster,
                spell: def.id.clone(),
                target,
            },
        });
    } else {
        // Failed attempts are free to retry.
        if let Some(a) = world.actor_mut(caster) {
            a.clear_status(StatusEffect::Casting);
        }
        events.push(MagicEvent {
            time: world.world_time,
            kind: MagicEventKind::SpellFizzled {
                caster,
                spell: def.id.clone(),
            },
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spell::{CastEntity, CastTarget};
    use crate::types::Tile;

    fn zap(world: &mut ActorWorld, _caster: ActorId, target: ActorId, _tile: Tile) -> bool {
        match world.actor_mut(target) {
            Some(t) => {
                t.health -= 10.0;
                true
            }
            None => false,
        }
    }

    fn mark_target(world: &mut ActorWorld, _caster: ActorId, target: ActorId, _tile: Tile) -> bool {
        if let Some(t) = world.actor_mut(target) {
            t.renown += 1;
        }
        true
    }

    fn dud(_world: &mut ActorWorld, _caster: ActorId, _target: ActorId, _tile: Tile) -> bool {
        false
    }

    fn spell(id: &str, charge: f32, cooldown: f32, effect: crate::spell::SpellEffectFn) -> crate::spell::SpellDefinition {
        crate::spell::SpellDefinition {
            id: SpellId::new(id),
            cast_target: CastTarget::Enemy,
            cast_entity: CastEntity::UnitsOnly,
            chance: 1.0,
            mana_cost: 10,
            required_level: 1,
            cooldown,
            range_bonus: 0.0,
            range_falloff_distance: 0.0,
            min_distance: 0.0,
            charge_duration: charge,
            is_attack_spell: true,
            can_be_used_in_combat: true,
            effect,
        }
    }

    struct Fixture {
        world: ActorWorld,
        catalog: SpellCatalog,
        cooldowns: CooldownTracker,
        config: MagicConfig,
        rng: SimRng,
        engine: SpellChargeEngine,
        events: Vec<MagicEvent>,
        caster: ActorId,
        victim: ActorId,
    }

    impl Fixture {
        fn new() -> Self {
            let mut world = ActorWorld::new();
            let caster = world.spawn("caster", Tile::new(0, 0));
            let victim = world.spawn("victim", Tile::new(5, 0));
            world.actor_mut(caster).unwrap().level = 5;
            Self {
                world,
                catalog: SpellCatalog::new(),
                cooldowns: CooldownTracker::new(),
                config: MagicConfig::default(),
                rng: SimRng::new(42),
                engine: SpellChargeEngine::new(),
                events: Vec::new(),
                caster,
                victim,
            }
        }

        fn queue(&mut self, id: &str, target: Option<ActorId>) -> Result<CastQueued, CastRejection> {
            self.engine.queue(
                &mut self.world,
                &self.catalog,
                &mut self.cooldowns,
                &self.config,
                &mut self.rng,
                self.caster,
                &SpellId::new(id),
                target,
                &mut self.events,
            )
        }

        fn advance(&mut self, dt: f32) {
            self.engine.advance(
                &mut self.world,
                &self.catalog,
                &mut self.cooldowns,
                &self.config,
                &mut self.rng,
                dt,
                &mut self.events,
            );
        }
    }

    #[test]
    fn immediate_cast_executes_and_records_cooldown() {
        let mut fx = Fixture::new();
        fx.catalog.define(spell("zap", 0.0, 2.0, zap));

        let result = fx.queue("zap", Some(fx.victim)).unwrap();
        assert_eq!(result, CastQueued::Immediate);
        assert_eq!(fx.world.actor(fx.victim).unwrap().health, 90.0);
        assert_eq!(fx.world.actor(fx.caster).unwrap().mana, 40.0);
        assert!(fx
            .world
            .actor(fx.caster)
            .unwrap()
            .has_status(StatusEffect::SpellRecovery));
        assert!(fx.cooldowns.last_cast(fx.caster, &SpellId::new("zap")).is_some());

        // Same world time: the cooldown now rejects.
        assert_eq!(fx.queue("zap", Some(fx.victim)), Err(CastRejection::CoolingDown));
    }

    #[test]
    fn charge_slot_is_exclusive() {
        let mut fx = Fixture::new();
        fx.catalog.define(spell("ember", 3.0, 0.0, zap));
        fx.catalog.define(spell("gale", 2.0, 0.0, zap));

        assert_eq!(
            fx.queue("ember", Some(fx.victim)).unwrap(),
            CastQueued::Charging { duration: 3.0 }
        );
        assert_eq!(fx.queue("gale", Some(fx.victim)), Err(CastRejection::ChargeInFlight));
        assert_eq!(fx.engine.pending_count(), 1);
        assert_eq!(
            fx.engine.charging_spell(fx.caster),
            Some(&SpellId::new("ember"))
        );
        assert!(fx
            .world
            .actor(fx.caster)
            .unwrap()
            .has_status(StatusEffect::Charging));
    }

    #[test]
    fn charge_finalizes_after_countdown() {
        let mut fx = Fixture::new();
        fx.catalog.define(spell("ember", 3.0, 0.0, zap));
        fx.queue("ember", Some(fx.victim)).unwrap();

        fx.advance(1.5);
        assert_eq!(fx.engine.pending_count(), 1);
        assert_eq!(fx.world.actor(fx.victim).unwrap().health, 100.0);

        fx.advance(1.5);
        assert_eq!(fx.engine.pending_count(), 0);
        assert_eq!(fx.world.actor(fx.victim).unwrap().health, 90.0);
        let caster = fx.world.actor(fx.caster).unwrap();
        assert!(!caster.has_status(StatusEffect::Charging));
        assert!(caster.has_status(StatusEffect::Casting));
        assert!(fx
            .events
            .iter()
            .any(|e| matches!(e.kind, MagicEventKind::SpellCast { .. })));
    }

    #[test]
    fn charge_aborts_when_caster_dies() {
        let mut fx = Fixture::new();
        fx.catalog.define(spell("ember", 3.0, 0.0, zap));
        fx.queue("ember", Some(fx.victim)).unwrap();

        fx.world.actor_mut(fx.caster).unwrap().is_alive = false;
        fx.advance(5.0);

        assert_eq!(fx.engine.pending_count(), 0);
        assert_eq!(fx.world.actor(fx.victim).unwrap().health, 100.0);
        assert!(!fx
            .world
            .actor(fx.caster)
            .unwrap()
            .has_status(StatusEffect::Charging));
        assert!(fx
            .events
            .iter()
            .any(|e| matches!(e.kind, MagicEventKind::SpellChargeAborted { .. })));
    }

    #[test]
    fn gating_rejections() {
        let mut fx = Fixture::new();
        let mut needy = spell("greater", 0.0, 0.0, zap);
        needy.required_level = 20;
        fx.catalog.define(needy);
        assert_eq!(
            fx.queue("greater", None),
            Err(CastRejection::LevelTooLow { have: 5, need: 20 })
        );

        let mut pricey = spell("pricey", 0.0, 0.0, zap);
        pricey.mana_cost = 1000;
        fx.catalog.define(pricey);
        assert!(matches!(
            fx.queue("pricey", None),
            Err(CastRejection::NotEnoughMana { .. })
        ));
        // A rejected cast spends nothing.
        assert_eq!(fx.world.actor(fx.caster).unwrap().mana, 50.0);

        let mut ranged = spell("ranged", 0.0, 0.0, zap);
        ranged.min_distance = 20.0;
        fx.catalog.define(ranged);
        assert_eq!(
            fx.queue("ranged", Some(fx.victim)),
            Err(CastRejection::TargetTooClose)
        );

        let mut peaceful = spell("peaceful", 0.0, 0.0, zap);
        peaceful.can_be_used_in_combat = false;
        fx.catalog.define(peaceful);
        fx.world.actor_mut(fx.caster).unwrap().in_combat = true;
        assert_eq!(fx.queue("peaceful", None), Err(CastRejection::ForbiddenInCombat));

        assert_eq!(
            fx.queue("no_such_spell", None),
            Err(CastRejection::UnknownSpell(SpellId::new("no_such_spell")))
        );

        fx.world.actor_mut(fx.caster).unwrap().is_alive = false;
        fx.catalog.define(spell("zap", 0.0, 0.0, zap));
        assert_eq!(
            fx.queue("zap", None),
            Err(CastRejection::CasterMissing(fx.caster))
        );
    }

    #[test]
    fn fizzle_records_no_cooldown() {
        let mut fx = Fixture::new();
        let mut hopeless = spell("hopeless", 0.0, 2.0, zap);
        hopeless.chance = 0.0;
        fx.catalog.define(hopeless);

        let result = fx.queue("hopeless", Some(fx.victim)).unwrap();
        assert_eq!(result, CastQueued::Immediate);
        assert_eq!(fx.world.actor(fx.victim).unwrap().health, 100.0);
        assert!(fx
            .cooldowns
            .last_cast(fx.caster, &SpellId::new("hopeless"))
            .is_none());
        // The commitment still cost mana; only the cooldown is waived.
        assert_eq!(fx.world.actor(fx.caster).unwrap().mana, 40.0);
        assert!(fx
            .events
            .iter()
            .any(|e| matches!(e.kind, MagicEventKind::SpellFizzled { .. })));
        // Free to retry immediately.
        assert_eq!(fx.queue("hopeless", Some(fx.victim)).unwrap(), CastQueued::Immediate);
    }

    #[test]
    fn effect_failure_records_no_cooldown() {
        let mut fx = Fixture::new();
        fx.catalog.define(spell("dud", 0.0, 2.0, dud));
        fx.queue("dud", Some(fx.victim)).unwrap();
        assert!(fx.cooldowns.last_cast(fx.caster, &SpellId::new("dud")).is_none());
        assert!(!fx
            .world
            .actor(fx.caster)
            .unwrap()
            .has_status(StatusEffect::SpellRecovery));
    }

    #[test]
    fn absent_target_defaults_to_caster() {
        let mut fx = Fixture::new();
        fx.catalog.define(spell("bless", 0.0, 0.0, mark_target));
        fx.queue("bless", None).unwrap();
        assert_eq!(fx.world.actor(fx.caster).unwrap().renown, 1);
        assert_eq!(fx.world.actor(fx.victim).unwrap().renown, 0);
    }

    #[test]
    fn dead_target_falls_back_to_caster_at_resolution() {
        let mut fx = Fixture::new();
        fx.catalog.define(spell("bolt", 2.0, 0.0, mark_target));
        fx.queue("bolt", Some(fx.victim)).unwrap();
        fx.world.actor_mut(fx.victim).unwrap().is_alive = false;
        fx.advance(2.0);
        assert_eq!(fx.world.actor(fx.caster).unwrap().renown, 1);
    }

    #[test]
    fn cast_chance_math() {
        let config = MagicConfig::default();
        let mut def = spell("calc", 0.0, 0.0, zap);
        def.chance = 0.2;
        def.range_bonus = 0.4;
        def.range_falloff_distance = 10.0;

        // Point blank: full range bonus. Level 5 → rank 0 → no rank bonus.
        let close = cast_chance(&def, 0.0, 5, &config);
        assert!((close - 0.6).abs() < 1e-6);

        // Half the falloff distance: half the bonus.
        let mid = cast_chance(&def, 5.0, 5, &config);
        assert!((mid - 0.4).abs() < 1e-6);

        // Beyond falloff: base chance only.
        let far = cast_chance(&def, 25.0, 5, &config);
        assert!((far - 0.2).abs() < 1e-6);

        // Rank bonus: level 30 → rank 3 → +0.15 with default tuning.
        let ranked = cast_chance(&def, 25.0, 30, &config);
        assert!((ranked - 0.35).abs() < 1e-6);

        // Never above 1.
        def.chance = 0.9;
        def.range_bonus = 5.0;
        assert_eq!(cast_chance(&def, 0.0, 90, &config), 1.0);
    }
}
