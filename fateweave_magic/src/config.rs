// Data-driven configuration for the magic subsystem.
//
// All tunable parameters live in `MagicConfig`, loaded from JSON at startup
// and never mutated at runtime. The core reads from the config instead of
// using magic numbers, so balance iteration never needs a recompile.
//
// Parameters are grouped into nested structs per concern: destiny decision
// windows and proximity thresholds per role (`HeroDestinyParams`,
// `PartyDestinyParams`), the companion bond curve (`BondParams`),
// spellcasting pacing (`SpellcastParams`), the champion power score
// (`PowerWeights`), and reincarnation delays (`ReincarnationParams`).
//
// See also: `destiny.rs` which consumes the window ranges and thresholds,
// `charge.rs` for the spellcast pacing, `soul.rs` for the delays.
//
// **Critical constraint: determinism.** Config values feed directly into
// simulation decisions. Two runs must use identical configs for identical
// results.

use crate::types::Stat;
use fateweave_prng::SimRng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// Decision windows
// ---------------------------------------------------------------------------

/// A uniform range a decision window is rolled from, in seconds.
///
/// A fresh window is rolled on every destiny transition and never re-rolled
/// mid-state.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct WindowRange {
    pub min: f32,
    pub max: f32,
}

impl WindowRange {
    pub const fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    /// Roll a window length from this range.
    pub fn roll(&self, rng: &mut SimRng) -> f32 {
        if self.min >= self.max {
            return self.min;
        }
        rng.range_f32(self.min, self.max)
    }
}

// ---------------------------------------------------------------------------
// Destiny parameters per role
// ---------------------------------------------------------------------------

/// Threat-response tuning for the Hero role (heroes and mentors).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HeroDestinyParams {
    /// Decision window used in every state, rolled per transition.
    pub decision_window: WindowRange,
    /// Squared distance to the threat below which the hero skips the
    /// remaining wait and advances immediately.
    pub response_range_sq: f32,
    /// Power score above which the hero advances without waiting.
    pub power_threshold: f32,
    /// Squared distance entering close-range combat (Responding → Fighting).
    pub combat_enter_dist_sq: f32,
    /// Squared distance leaving close-range combat (Fighting → Responding).
    /// Larger than the enter threshold so the boundary has hysteresis.
    pub combat_exit_dist_sq: f32,
}

/// Threat-response tuning for the HeroParty role (the hero's followers).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PartyDestinyParams {
    /// Window a dormant member waits before each awareness roll.
    pub aware_window: WindowRange,
    /// Window for the Preparing state.
    pub preparing_window: WindowRange,
    /// Window for the Responding state.
    pub responding_window: WindowRange,
    /// Chance the awareness roll succeeds when its window elapses. A failed
    /// roll resets the timer and the member stays dormant.
    pub awareness_chance: f64,
    /// Squared distance entering close-range combat around the leader.
    pub combat_enter_dist_sq: f32,
    /// Squared distance leaving close-range combat.
    pub combat_exit_dist_sq: f32,
    /// Squared distance within which a fighting leader pulls followers in.
    pub assist_dist_sq: f32,
}

// ---------------------------------------------------------------------------
// Companion bond
// ---------------------------------------------------------------------------

/// The follower↔leader bond accumulator curve.
///
/// Bond time grows while both are in combat and mutually near, decays
/// otherwise. Crossing a threshold grants the matching flat stat bonuses
/// exactly once; dropping back below revokes them.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BondParams {
    /// Squared distance within which the pair counts as "together".
    pub near_dist_sq: f32,
    /// Bond seconds gained per second fighting together.
    pub gain_per_second: f32,
    /// Bond seconds lost per second apart or out of combat.
    pub decay_per_second: f32,
    /// Accumulated bond time that unlocks level 1.
    pub level_one_threshold: f32,
    /// Accumulated bond time that unlocks level 2.
    pub level_two_threshold: f32,
    /// Flat stat bonuses granted at level 1.
    pub level_one_bonus: BTreeMap<Stat, f32>,
    /// Flat stat bonuses granted at level 2 (replace the level 1 bonuses,
    /// they do not stack on top of them).
    pub level_two_bonus: BTreeMap<Stat, f32>,
}

// ---------------------------------------------------------------------------
// Spellcasting
// ---------------------------------------------------------------------------

/// Pacing parameters for the spellcasting pipeline.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SpellcastParams {
    /// Cooldowns are divided by this while the caster is in combat, so
    /// champions cast more often mid-fight.
    pub combat_frequency_multiplier: f32,
    /// Floor on the post-cast recovery status duration, in seconds.
    pub recovery_min_seconds: f32,
    /// Levels per mage rank. Rank = level / step.
    pub rank_level_step: u32,
    /// Flat cast-chance bonus per mage rank, capped at 1.0 total.
    pub rank_chance_bonus: f32,
}

// ---------------------------------------------------------------------------
// Power score
// ---------------------------------------------------------------------------

/// Weights of the champion power score. The score is a dot product of these
/// with (level, kills, renown, summed stat values) — tuning data, not code.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PowerWeights {
    pub level: f32,
    pub kills: f32,
    pub renown: f32,
    pub stats: f32,
}

// ---------------------------------------------------------------------------
// Reincarnation
// ---------------------------------------------------------------------------

/// Delays between a champion's death and the attempt to restore its soul
/// onto a new body, in world years. Zero means the restore is attempted
/// synchronously at death.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReincarnationParams {
    pub demon_lord_delay_years: u32,
    pub god_delay_years: u32,
}

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level configuration. Loaded from JSON, never mutated at runtime.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MagicConfig {
    pub hero: HeroDestinyParams,
    pub party: PartyDestinyParams,
    pub bond: BondParams,
    pub spellcast: SpellcastParams,
    pub power_weights: PowerWeights,
    pub reincarnation: ReincarnationParams,
}

impl Default for MagicConfig {
    fn default() -> Self {
        let mut level_one_bonus = BTreeMap::new();
        level_one_bonus.insert(Stat::Health, 10.0);
        level_one_bonus.insert(Stat::Damage, 2.0);
        let mut level_two_bonus = BTreeMap::new();
        level_two_bonus.insert(Stat::Health, 25.0);
        level_two_bonus.insert(Stat::Damage, 5.0);

        Self {
            hero: HeroDestinyParams {
                decision_window: WindowRange::new(4.0, 7.0),
                response_range_sq: 10_000.0,
                power_threshold: 250.0,
                combat_enter_dist_sq: 196.0,
                combat_exit_dist_sq: 576.0,
            },
            party: PartyDestinyParams {
                aware_window: WindowRange::new(10.0, 20.0),
                preparing_window: WindowRange::new(3.0, 6.0),
                responding_window: WindowRange::new(3.0, 6.0),
                awareness_chance: 0.3,
                combat_enter_dist_sq: 196.0,
                combat_exit_dist_sq: 576.0,
                assist_dist_sq: 400.0,
            },
            bond: BondParams {
                near_dist_sq: 256.0,
                gain_per_second: 1.0,
                decay_per_second: 0.5,
                level_one_threshold: 30.0,
                level_two_threshold: 90.0,
                level_one_bonus,
                level_two_bonus,
            },
            spellcast: SpellcastParams {
                combat_frequency_multiplier: 2.0,
                recovery_min_seconds: 5.0,
                rank_level_step: 10,
                rank_chance_bonus: 0.05,
            },
            power_weights: PowerWeights {
                level: 10.0,
                kills: 1.0,
                renown: 0.5,
                stats: 1.0,
            },
            reincarnation: ReincarnationParams {
                demon_lord_delay_years: 3,
                god_delay_years: 1,
            },
        }
    }
}
