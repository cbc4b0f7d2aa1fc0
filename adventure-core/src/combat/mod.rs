//! Combat: participants, enemy templates, and the encounter state machine.

pub mod bestiary;
mod combatant;
mod encounter;

pub use bestiary::{enemy_template, BestiaryError, EnemyTemplate};
pub use combatant::{Combatant, CombatantKind};
pub use encounter::{
    ActionError, AttackOutcome, CharacterSync, CombatLogEntry, CombatOutcome, CombatResolution,
    CombatStatus, CombatantId, CombatantStatus, EffectKind, Encounter, EncounterError,
    EncounterState, SpellEffect, SpellOutcome, TargetEffect, TurnAdvance,
};
