// Per-actor, per-spell cooldown tracking.
//
// The tracker stores the world time of each actor's last successful cast of
// each spell. Entries are created lazily: an absent entry means the spell
// has never been cast and the cooldown is satisfied. While the caster is in
// combat the effective cooldown shrinks by the configured frequency
// multiplier, so champions cast more often mid-fight.
//
// Zero-cooldown spells bypass the tracker entirely — `charge.rs` neither
// queries nor records them.
//
// See also: `charge.rs` for when cooldowns are recorded (only after a
// successful cast), `config.rs` for the combat frequency multiplier.

use crate::types::{ActorId, SpellId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Last-cast world times, keyed actor → spell. The nested map keeps the
/// JSON form string-keyed for saves.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CooldownTracker {
    last_cast: BTreeMap<ActorId, BTreeMap<SpellId, f64>>,
}

impl CooldownTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `actor` may cast `spell` again at world time `now`.
    ///
    /// `cooldown` is the spell's configured cooldown in seconds;
    /// `combat_multiplier` divides it while the caster is in combat.
    pub fn is_ready(
        &self,
        actor: ActorId,
        spell: &SpellId,
        cooldown: f32,
        now: f64,
        in_combat: bool,
        combat_multiplier: f32,
    ) -> bool {
        if cooldown <= 0.0 {
            return true;
        }
        let last = match self.last_cast.get(&actor).and_then(|m| m.get(spell)) {
            Some(&t) => t,
            None => return true,
        };
        let effective = if in_combat && combat_multiplier > 0.0 {
            cooldown / combat_multiplier
        } else {
            cooldown
        };
        now - last >= effective as f64
    }

    /// Record a cast at world time `now`, overwriting any previous entry.
    pub fn record(&mut self, actor: ActorId, spell: &SpellId, now: f64) {
        self.last_cast
            .entry(actor)
            .or_default()
            .insert(spell.clone(), now);
    }

    /// Drop every entry for an actor. Called when the actor is discarded.
    pub fn forget_actor(&mut self, actor: ActorId) {
        self.last_cast.remove(&actor);
    }

    /// The recorded last-cast time, for the host's save layer and tooltips.
    pub fn last_cast(&self, actor: ActorId, spell: &SpellId) -> Option<f64> {
        self.last_cast.get(&actor).and_then(|m| m.get(spell)).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MULT: f32 = 2.0;

    fn spell() -> SpellId {
        SpellId::new("fireball")
    }

    #[test]
    fn absent_entry_is_ready() {
        let tracker = CooldownTracker::new();
        assert!(tracker.is_ready(ActorId(1), &spell(), 10.0, 0.0, false, MULT));
    }

    #[test]
    fn cooldown_two_seconds_out_of_combat() {
        let mut tracker = CooldownTracker::new();
        tracker.record(ActorId(1), &spell(), 10.0);
        assert!(!tracker.is_ready(ActorId(1), &spell(), 2.0, 11.5, false, MULT));
        assert!(tracker.is_ready(ActorId(1), &spell(), 2.0, 12.0, false, MULT));
    }

    #[test]
    fn combat_halves_the_wait() {
        let mut tracker = CooldownTracker::new();
        tracker.record(ActorId(1), &spell(), 10.0);
        // Effective cooldown in combat: 2.0 / 2.0 = 1.0s.
        assert!(!tracker.is_ready(ActorId(1), &spell(), 2.0, 10.5, true, MULT));
        assert!(tracker.is_ready(ActorId(1), &spell(), 2.0, 11.0, true, MULT));
    }

    #[test]
    fn zero_cooldown_always_ready() {
        let mut tracker = CooldownTracker::new();
        tracker.record(ActorId(1), &spell(), 10.0);
        assert!(tracker.is_ready(ActorId(1), &spell(), 0.0, 10.0, false, MULT));
    }

    #[test]
    fn record_overwrites() {
        let mut tracker = CooldownTracker::new();
        tracker.record(ActorId(1), &spell(), 10.0);
        tracker.record(ActorId(1), &spell(), 20.0);
        assert_eq!(tracker.last_cast(ActorId(1), &spell()), Some(20.0));
        assert!(!tracker.is_ready(ActorId(1), &spell(), 5.0, 21.0, false, MULT));
    }

    #[test]
    fn actors_do_not_share_cooldowns() {
        let mut tracker = CooldownTracker::new();
        tracker.record(ActorId(1), &spell(), 10.0);
        assert!(tracker.is_ready(ActorId(2), &spell(), 60.0, 10.0, false, MULT));
    }

    #[test]
    fn forget_actor_clears_entries() {
        let mut tracker = CooldownTracker::new();
        tracker.record(ActorId(1), &spell(), 10.0);
        tracker.forget_actor(ActorId(1));
        assert!(tracker.is_ready(ActorId(1), &spell(), 60.0, 10.0, false, MULT));
    }

    #[test]
    fn serialization_keeps_string_keys() {
        let mut tracker = CooldownTracker::new();
        tracker.record(ActorId(7), &spell(), 42.0);
        let json = serde_json::to_string(&tracker).unwrap();
        let restored: CooldownTracker = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.last_cast(ActorId(7), &spell()), Some(42.0));
    }
}
