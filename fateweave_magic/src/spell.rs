// Spell catalog — data-driven spell definitions.
//
// All behavioral differences between spells are expressed as data in
// `SpellDefinition`, keyed by `SpellId` in the catalog. The casting
// pipeline (`charge.rs`) has a single code path that reads targeting rules,
// costs, and pacing from the definition at runtime — no code branching per
// spell. The actual world mutation is an opaque effect function supplied by
// the host when it registers the spell.
//
// The catalog is built during `MagicSystem::configure` and never mutated
// after `start()`. Registering an id twice is an idempotent no-op so mods
// can be reloaded without a fatal error.
//
// See also: `charge.rs` for the pipeline that consumes definitions,
// `system.rs` for the two-phase init that installs the catalog.

use crate::actor::ActorWorld;
use crate::types::{ActorId, SpellId, Tile};
use std::collections::BTreeMap;

/// The opaque world mutation a spell performs. Returns whether the cast
/// did anything; a `false` return means the attempt was free (no cooldown).
pub type SpellEffectFn = fn(&mut ActorWorld, ActorId, ActorId, Tile) -> bool;

/// Who a spell may be aimed at.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CastTarget {
    Himself,
    Friendly,
    Enemy,
    Region,
}

/// What a spell resolves against.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CastEntity {
    UnitsOnly,
    Tile,
}

/// An immutable spell definition. Created once at startup; the pipeline
/// only ever reads it.
#[derive(Clone, Debug)]
pub struct SpellDefinition {
    pub id: SpellId,
    pub cast_target: CastTarget,
    pub cast_entity: CastEntity,
    /// Base success chance in [0, 1], before range and rank bonuses.
    pub chance: f32,
    pub mana_cost: i32,
    pub required_level: u32,
    /// Seconds between casts. 0 means no cooldown is ever tracked.
    pub cooldown: f32,
    /// Flat chance bonus at point-blank range, fading with distance.
    pub range_bonus: f32,
    /// Distance at which the range bonus has fully faded. 0 disables it.
    pub range_falloff_distance: f32,
    /// Targets closer than this are rejected. 0 disables the check.
    pub min_distance: f32,
    /// Seconds the caster is committed before the cast resolves.
    /// 0 resolves immediately with no charge phase.
    pub charge_duration: f32,
    pub is_attack_spell: bool,
    pub can_be_used_in_combat: bool,
    pub effect: SpellEffectFn,
}

/// Static registry mapping spell ids to their immutable definitions.
#[derive(Clone, Debug, Default)]
pub struct SpellCatalog {
    spells: BTreeMap<SpellId, SpellDefinition>,
}

impl SpellCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a definition. A duplicate id is a no-op, keeping the first
    /// registration — mods may be reloaded.
    pub fn define(&mut self, definition: SpellDefinition) {
        self.spells.entry(definition.id.clone()).or_insert(definition);
    }

    /// Pure lookup.
    pub fn get(&self, id: &SpellId) -> Option<&SpellDefinition> {
        self.spells.get(id)
    }

    pub fn len(&self) -> usize {
        self.spells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spells.is_empty()
    }

    /// All registered ids, in order.
    pub fn ids(&self) -> impl Iterator<Item = &SpellId> {
        self.spells.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_op_effect(_: &mut ActorWorld, _: ActorId, _: ActorId, _: Tile) -> bool {
        true
    }

    fn definition(id: &str, mana_cost: i32) -> SpellDefinition {
        SpellDefinition {
            id: SpellId::new(id),
            cast_target: CastTarget::Enemy,
            cast_entity: CastEntity::UnitsOnly,
            chance: 1.0,
            mana_cost,
            required_level: 1,
            cooldown: 2.0,
            range_bonus: 0.0,
            range_falloff_distance: 0.0,
            min_distance: 0.0,
            charge_duration: 0.0,
            is_attack_spell: true,
            can_be_used_in_combat: true,
            effect: no_op_effect,
        }
    }

    #[test]
    fn define_and_get() {
        let mut catalog = SpellCatalog::new();
        catalog.define(definition("fireball", 10));
        let def = catalog.get(&SpellId::new("fireball")).unwrap();
        assert_eq!(def.mana_cost, 10);
        assert!(catalog.get(&SpellId::new("frostbolt")).is_none());
    }

    #[test]
    fn duplicate_registration_keeps_first() {
        let mut catalog = SpellCatalog::new();
        catalog.define(definition("fireball", 10));
        catalog.define(definition("fireball", 99));
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.get(&SpellId::new("fireball")).unwrap().mana_cost, 10);
    }

    #[test]
    fn ids_iterate_in_order() {
        let mut catalog = SpellCatalog::new();
        catalog.define(definition("zephyr", 1));
        catalog.define(definition("arc", 1));
        let ids: Vec<&SpellId> = catalog.ids().collect();
        assert_eq!(ids, vec![&SpellId::new("arc"), &SpellId::new("zephyr")]);
    }
}
