// Core types shared across the magic subsystem.
//
// Defines stable identifiers (actor ids assigned by the host world, string
// ids for data-driven spells and traits), the 2D tile coordinate used for
// proximity checks, and the foundational enums: champion archetypes, destiny
// states, status effects, and stats. All types derive `Serialize` and
// `Deserialize` for save/load.
//
// Identity is always a stable integer or string id, never a live reference:
// an actor referenced by id may have been destroyed, and every lookup
// returns an `Option` (see `actor.rs`).

use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Actor identity
// ---------------------------------------------------------------------------

/// Stable identifier for an actor, assigned by the host world.
///
/// Ids are never reused within a running world, so a dangling id simply
/// fails to resolve instead of aliasing a new actor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActorId(pub u32);

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ActorId({})", self.0)
    }
}

// ---------------------------------------------------------------------------
// Data-driven string ids
// ---------------------------------------------------------------------------

/// Identifier for a spell in the catalog. String-keyed so mods can add
/// spells without touching an enum, and so cooldown entries keep
/// human-readable keys in saves.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SpellId(pub String);

impl SpellId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for SpellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier for a trait in the host's trait registry. Trait sets are
/// snapshotted at death and re-applied at reincarnation; ids unknown to the
/// registry at restore time are skipped (registries change between saves).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TraitId(pub String);

impl TraitId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for TraitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Social link ids — compact host-assigned integers
// ---------------------------------------------------------------------------

macro_rules! host_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub u32);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }
    };
}

host_id!(/// Identifier for a culture.
CultureId);
host_id!(/// Identifier for a language.
LanguageId);
host_id!(/// Identifier for a religion.
ReligionId);
host_id!(/// Identifier for a clan.
ClanId);
host_id!(/// Identifier for a family.
FamilyId);
host_id!(/// Identifier for a story plot.
PlotId);
host_id!(/// Identifier for a city.
CityId);
host_id!(/// Identifier for an army.
ArmyId);
host_id!(/// Identifier for a kingdom.
KingdomId);

// ---------------------------------------------------------------------------
// Spatial
// ---------------------------------------------------------------------------

/// A position on the host's 2D tile grid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Tile {
    pub x: i32,
    pub z: i32,
}

impl Tile {
    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// Squared euclidean distance. All proximity thresholds in the config
    /// are expressed as squared distances so this never needs a sqrt.
    pub fn dist_sq(self, other: Self) -> f32 {
        let dx = (self.x - other.x) as f32;
        let dz = (self.z - other.z) as f32;
        dx * dx + dz * dz
    }

    /// Euclidean distance. Used only for range-falloff math.
    pub fn dist(self, other: Self) -> f32 {
        self.dist_sq(other).sqrt()
    }
}

impl fmt::Display for Tile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.z)
    }
}

// ---------------------------------------------------------------------------
// Champion archetypes and destiny
// ---------------------------------------------------------------------------

/// The uniquely-tracked actor archetypes with bespoke behavior rules.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ChampionKind {
    Hero,
    DemonLord,
    Mentor,
    HeroPartyMember,
    God,
}

/// Which destiny table an actor's record lives in. Hero and Mentor share
/// the Hero-role machine; party members get their own machine with its own
/// timers, so an actor that is both (never in practice) would have two
/// independent state+timer pairs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DestinyRole {
    Hero,
    HeroParty,
}

/// The current phase of a champion's threat-response cycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DestinyState {
    #[default]
    NormalLife,
    AwareOfThreat,
    Preparing,
    Responding,
    Fighting,
}

impl DestinyState {
    /// Integer mapping for hosts that persist the state as a plain field.
    /// This is the only place the enum touches an integer representation.
    pub fn as_index(self) -> u8 {
        match self {
            DestinyState::NormalLife => 0,
            DestinyState::AwareOfThreat => 1,
            DestinyState::Preparing => 2,
            DestinyState::Responding => 3,
            DestinyState::Fighting => 4,
        }
    }

    /// Inverse of `as_index`. Unknown values fall back to `NormalLife`
    /// rather than failing — an old save never wedges the machine.
    pub fn from_index(index: u8) -> Self {
        match index {
            1 => DestinyState::AwareOfThreat,
            2 => DestinyState::Preparing,
            3 => DestinyState::Responding,
            4 => DestinyState::Fighting,
            _ => DestinyState::NormalLife,
        }
    }
}

// ---------------------------------------------------------------------------
// Statuses and stats
// ---------------------------------------------------------------------------

/// Timed status effects this core applies to actors. The host renders them;
/// the core decays their remaining time each tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StatusEffect {
    /// The actor is committed to a charging cast and vulnerable.
    Charging,
    /// The cast is resolving.
    Casting,
    /// Post-cast recovery.
    SpellRecovery,
}

/// The per-actor stat axes tracked by the host and snapshotted at death.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Stat {
    Health,
    Damage,
    Armor,
    Speed,
    Intelligence,
}
