// Narrative events emitted by the magic core.
//
// The tick loop and the command entry points return `MagicEvent`s describing
// what happened: casts resolving, destinies shifting, souls captured and
// restored. The host's UI / event log consumes them. This is the core's
// observability surface — the simulation layer carries no logger, so the
// tick loop stays pure and deterministic.
//
// See also: `system.rs` where events are collected per tick, `destiny.rs`
// and `soul.rs` for the emitters.

use crate::types::*;
use serde::{Deserialize, Serialize};

/// A narrative event, stamped with the world time it happened at.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MagicEvent {
    pub time: f64,
    pub kind: MagicEventKind,
}

/// What happened.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum MagicEventKind {
    /// A charge-up cast has been queued.
    SpellChargeStarted { caster: ActorId, spell: SpellId },
    /// A cast resolved and its effect ran.
    SpellCast {
        caster: ActorId,
        spell: SpellId,
        target: ActorId,
    },
    /// A cast resolved but fizzled (chance roll or effect failure).
    /// The attempt was free: no cooldown was recorded.
    SpellFizzled { caster: ActorId, spell: SpellId },
    /// A charging cast was dropped because its caster became invalid.
    SpellChargeAborted { caster: ActorId, spell: SpellId },
    /// An actor's destiny state changed.
    DestinyChanged {
        actor: ActorId,
        role: DestinyRole,
        from: DestinyState,
        to: DestinyState,
    },
    /// A follower's bond with its hero crossed a threshold.
    BondLevelChanged { follower: ActorId, level: u8 },
    /// A dying champion's identity was captured.
    SoulCaptured { fallen: ActorId },
    /// A captured soul is waiting for its restoration year.
    ReincarnationScheduled { fallen: ActorId, due_year: u32 },
    /// A soul was restored onto a new body.
    Reincarnated { fallen: ActorId, host: ActorId },
}
