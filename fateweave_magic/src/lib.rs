// fateweave_magic — pure Rust champion behavior / magic simulation core.
//
// This crate is the behavioral core of the champion subsystem of a
// life-simulation game: it decides, tick by tick, how champion actors
// (heroes, a demon lord, mentors, hero-party followers, gods) respond to
// threats, drives the data-driven spellcasting pipeline with charge-up and
// cooldown semantics, and implements soul-transfer reincarnation. It has
// zero engine dependencies and can be tested, benchmarked, and run
// headless.
//
// Module overview:
// - `system.rs`:   `MagicSystem` — the host-facing entry points, two-phase
//                  init, observer registry, save/load.
// - `actor.rs`:    Typed `Actor` components + `ActorWorld` id→actor table.
// - `destiny.rs`:  Threat-response state machines (Hero and HeroParty
//                  roles) + the companion bond accumulator.
// - `charge.rs`:   Spell charge requests, cast gating, resolution.
// - `cooldown.rs`: Per-actor per-spell cooldown tracking.
// - `spell.rs`:    `SpellCatalog` + immutable data-driven definitions.
// - `soul.rs`:     Soul snapshots, the trait registry, the year-keyed
//                  reincarnation scheduler.
// - `config.rs`:   `MagicConfig` — every tunable parameter.
// - `event.rs`:    `MagicEvent` narrative output events.
// - `prng`:        Re-exported from `fateweave_prng` — xoshiro256++ with
//                  SplitMix64 seeding.
// - `types.rs`:    Ids, tiles, champion/destiny/status/stat enums.
//
// The host simulation owns the `ActorWorld` and calls `on_tick` once per
// simulation step; this crate owns only its auxiliary maps and never holds
// a live actor reference across ticks.
//
// **Critical constraint: determinism.** The core is a pure function of
// (seed, config, call sequence). All randomness comes from the re-exported
// PRNG, all iteration happens over `BTreeMap`s, and there is no system
// time and no OS entropy.

pub mod actor;
pub mod charge;
pub mod config;
pub mod cooldown;
pub mod destiny;
pub mod event;
pub use fateweave_prng as prng;
pub mod soul;
pub mod spell;
pub mod system;
pub mod types;
