//! Turn-based encounter state machine.
//!
//! An [`Encounter`] moves through three states:
//!
//! - `Idle`: combatants are registered in order.
//! - `Active`: initiative has been rolled and turns advance.
//! - `Ended`: terminal. The [`CombatResolution`] produced on the way in
//!   carries the final health and conditions of every combatant that came
//!   from a [`Character`](crate::character::Character).
//!
//! Dice are passed in by the caller so an encounter never owns a
//! randomness source.

use super::bestiary::{enemy_template, BestiaryError};
use super::combatant::{Combatant, CombatantKind};
use crate::character::{Character, CharacterId, Conditions, Party};
use crate::dice::{DiceEngine, DiceError, DiceNotation, DiceRollResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Hard failures: the request itself was invalid for this encounter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncounterError {
    #[error("Cannot start combat without combatants")]
    NoCombatants,
    #[error("Combatants can only be added before combat starts")]
    NotIdle,
    #[error("Combat has already ended")]
    AlreadyEnded,
    #[error("No combatant with id {0}")]
    UnknownCombatant(usize),
    #[error(transparent)]
    Bestiary(#[from] BestiaryError),
}

/// Soft failures reported inside an action outcome.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActionError {
    #[error("{0} is unconscious and cannot act")]
    ActorUnconscious(String),
    #[error("{0} is already unconscious")]
    TargetUnconscious(String),
    #[error("Invalid dice roll: {notation}")]
    InvalidNotation {
        notation: String,
        #[source]
        source: DiceError,
    },
}

/// Position of a combatant in the roster (registration order).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CombatantId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncounterState {
    Idle,
    Active,
    Ended,
}

/// A combat log line tagged with the round it happened in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombatLogEntry {
    pub round: u32,
    pub text: String,
}

impl fmt::Display for CombatLogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[Round {}] {}", self.round, self.text)
    }
}

// ============================================================================
// Outcomes
// ============================================================================

#[derive(Debug, Clone)]
pub struct AttackOutcome {
    pub attacker: String,
    pub target: String,
    /// `None` when the attack never happened.
    pub attack_roll: Option<i32>,
    pub target_ac: i32,
    pub hit: bool,
    pub damage: i32,
    pub damage_roll: Option<DiceRollResult>,
    pub target_health: i32,
    pub target_unconscious: bool,
    pub error: Option<ActionError>,
}

impl AttackOutcome {
    fn refused(attacker: &Combatant, target: &Combatant, error: ActionError) -> Self {
        Self {
            attacker: attacker.name.clone(),
            target: target.name.clone(),
            attack_roll: None,
            target_ac: target.armor_class,
            hit: false,
            damage: 0,
            damage_roll: None,
            target_health: target.health,
            target_unconscious: !target.conscious,
            error: Some(error),
        }
    }
}

/// What a spell does to each of its targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SpellEffect {
    Damage { damage: String },
    Healing { healing: String },
    /// Any other effect kind. Applies nothing.
    #[serde(other)]
    Unsupported,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectKind {
    Damage,
    Healing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetEffect {
    pub target: String,
    pub kind: EffectKind,
    pub amount: i32,
    pub target_health: i32,
}

#[derive(Debug, Clone)]
pub struct SpellOutcome {
    pub caster: String,
    pub spell: String,
    pub targets: Vec<String>,
    pub effects: Vec<TargetEffect>,
    pub error: Option<ActionError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CombatOutcome {
    Victory,
    Defeat,
    Ended,
}

impl CombatOutcome {
    pub fn message(&self) -> &'static str {
        match self {
            CombatOutcome::Victory => "Victory! All enemies have been defeated!",
            CombatOutcome::Defeat => "Defeat! All players have fallen unconscious!",
            CombatOutcome::Ended => "Combat ended!",
        }
    }
}

/// Final state of one character-backed combatant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacterSync {
    pub character: CharacterId,
    pub health: i32,
    pub conditions: Conditions,
}

/// Produced once when an encounter ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CombatResolution {
    pub name: String,
    pub outcome: CombatOutcome,
    pub syncs: Vec<CharacterSync>,
}

impl CombatResolution {
    /// Copy final health and conditions onto the party's characters.
    /// Returns how many characters were updated.
    pub fn apply(&self, party: &mut Party) -> usize {
        let mut applied = 0;
        for sync in &self.syncs {
            match party.get_mut(sync.character) {
                Some(character) => {
                    character.set_health(sync.health);
                    character.conditions = sync.conditions.clone();
                    applied += 1;
                }
                None => tracing::warn!(character = %sync.character, "Combat sync target not in party"),
            }
        }
        applied
    }
}

/// Result of [`Encounter::next_turn`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnAdvance {
    /// Encounter is not active; nothing happened.
    Inactive,
    Next,
    NewRound(u32),
    Ended(CombatResolution),
}

/// Read-only snapshot for front ends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CombatStatus {
    pub active: bool,
    pub name: String,
    pub round: u32,
    pub current_turn: Option<String>,
    pub combatants: Vec<CombatantStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CombatantStatus {
    pub name: String,
    pub kind: CombatantKind,
    pub health: String,
    pub conscious: bool,
    pub conditions: Vec<String>,
    pub initiative: i32,
}

// ============================================================================
// Encounter
// ============================================================================

#[derive(Debug, Clone)]
pub struct Encounter {
    name: String,
    roster: Vec<Combatant>,
    turn_order: Vec<CombatantId>,
    turn_index: usize,
    round: u32,
    state: EncounterState,
    log: Vec<CombatLogEntry>,
}

impl Encounter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            roster: Vec::new(),
            turn_order: Vec::new(),
            turn_index: 0,
            round: 0,
            state: EncounterState::Idle,
            log: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> EncounterState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == EncounterState::Active
    }

    pub fn round(&self) -> u32 {
        self.round
    }

    pub fn roster(&self) -> &[Combatant] {
        &self.roster
    }

    pub fn turn_order(&self) -> impl Iterator<Item = &Combatant> {
        self.turn_order.iter().map(|id| &self.roster[id.0])
    }

    pub fn turn_order_len(&self) -> usize {
        self.turn_order.len()
    }

    pub fn combatant(&self, id: CombatantId) -> Option<&Combatant> {
        self.roster.get(id.0)
    }

    /// First combatant with this name, ignoring case.
    pub fn find(&self, name: &str) -> Option<CombatantId> {
        self.roster
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
            .map(CombatantId)
    }

    // ---- registration -----------------------------------------------------

    pub fn add_combatant(&mut self, combatant: Combatant) -> Result<CombatantId, EncounterError> {
        if self.state != EncounterState::Idle {
            return Err(EncounterError::NotIdle);
        }
        self.roster.push(combatant);
        Ok(CombatantId(self.roster.len() - 1))
    }

    pub fn add_player(&mut self, character: &Character) -> Result<CombatantId, EncounterError> {
        self.add_combatant(Combatant::from_character(character))
    }

    pub fn add_enemy(
        &mut self,
        name: impl Into<String>,
        health: i32,
        armor_class: i32,
    ) -> Result<CombatantId, EncounterError> {
        self.add_combatant(Combatant::new(name, CombatantKind::Enemy, health, armor_class))
    }

    pub fn add_npc(
        &mut self,
        name: impl Into<String>,
        health: i32,
        armor_class: i32,
    ) -> Result<CombatantId, EncounterError> {
        self.add_combatant(Combatant::new(name, CombatantKind::Npc, health, armor_class))
    }

    /// Add an enemy from the bestiary. Without an explicit name the
    /// template's display name is used, numbered if already taken.
    pub fn add_enemy_from_template(
        &mut self,
        kind: &str,
        name: Option<&str>,
    ) -> Result<CombatantId, EncounterError> {
        let template = enemy_template(kind)?;
        let name = match name {
            Some(name) => name.to_string(),
            None => self.unique_name(&template.display_name()),
        };
        self.add_enemy(name, template.health, template.armor_class)
    }

    fn unique_name(&self, base: &str) -> String {
        if self.find(base).is_none() {
            return base.to_string();
        }
        (2..)
            .map(|n| format!("{} {}", base, n))
            .find(|candidate| self.find(candidate).is_none())
            .unwrap_or_else(|| base.to_string())
    }

    // ---- lifecycle --------------------------------------------------------

    /// Roll initiative and begin round 1.
    pub fn start(&mut self, dice: &mut DiceEngine) -> Result<(), EncounterError> {
        match self.state {
            EncounterState::Idle => {}
            EncounterState::Active => return Err(EncounterError::NotIdle),
            EncounterState::Ended => return Err(EncounterError::AlreadyEnded),
        }
        if self.roster.is_empty() {
            return Err(EncounterError::NoCombatants);
        }

        for i in 0..self.roster.len() {
            let initiative = dice.d20(0).total();
            self.roster[i].initiative = initiative;
            let line = format!("{} rolled {} for initiative", self.roster[i].name, initiative);
            self.log(line);
        }

        // Stable sort: ties keep registration order.
        let mut order: Vec<CombatantId> = (0..self.roster.len()).map(CombatantId).collect();
        order.sort_by(|a, b| self.roster[b.0].initiative.cmp(&self.roster[a.0].initiative));
        self.turn_order = order;
        self.turn_index = 0;

        let summary = self
            .turn_order()
            .map(|c| format!("{} ({})", c.name, c.initiative))
            .collect::<Vec<_>>()
            .join(", ");
        self.log(format!("Initiative order: {}", summary));

        self.state = EncounterState::Active;
        self.round = 1;
        self.log(format!("Combat started: {}", self.name));
        tracing::info!(encounter = %self.name, combatants = self.roster.len(), "Combat started");
        Ok(())
    }

    pub fn current_combatant(&self) -> Option<&Combatant> {
        if !self.is_active() {
            return None;
        }
        let id = self.turn_order.get(self.turn_index)?;
        self.roster.get(id.0)
    }

    /// Advance the turn. Wrapping around starts a new round, drops
    /// unconscious combatants from the turn order, and may end combat.
    pub fn next_turn(&mut self) -> TurnAdvance {
        if !self.is_active() {
            return TurnAdvance::Inactive;
        }

        self.turn_index += 1;
        if self.turn_index < self.turn_order.len() {
            return TurnAdvance::Next;
        }

        self.turn_index = 0;
        self.round += 1;
        self.log(format!("Round {} begins", self.round));
        tracing::debug!(encounter = %self.name, round = self.round, "New round");

        let roster = &self.roster;
        self.turn_order.retain(|id| roster[id.0].conscious);

        if self.should_end_combat() {
            return match self.end_combat() {
                Ok(resolution) => TurnAdvance::Ended(resolution),
                Err(_) => TurnAdvance::Inactive,
            };
        }
        TurnAdvance::NewRound(self.round)
    }

    /// True when every player or every enemy is unconscious. NPCs are not
    /// counted for either side.
    pub fn should_end_combat(&self) -> bool {
        self.conscious_count(Combatant::is_player) == 0 || self.conscious_count(Combatant::is_enemy) == 0
    }

    fn conscious_count(&self, side: fn(&Combatant) -> bool) -> usize {
        self.roster.iter().filter(|c| side(c) && c.conscious).count()
    }

    /// End the encounter and report what needs syncing back to characters.
    /// Can only happen once.
    pub fn end_combat(&mut self) -> Result<CombatResolution, EncounterError> {
        if self.state == EncounterState::Ended {
            return Err(EncounterError::AlreadyEnded);
        }
        self.state = EncounterState::Ended;

        let players = self.conscious_count(Combatant::is_player);
        let enemies = self.conscious_count(Combatant::is_enemy);
        let outcome = if players > 0 && enemies == 0 {
            CombatOutcome::Victory
        } else if players == 0 {
            CombatOutcome::Defeat
        } else {
            CombatOutcome::Ended
        };
        self.log(outcome.message().to_string());
        tracing::info!(encounter = %self.name, ?outcome, round = self.round, "Combat ended");

        let syncs = self
            .roster
            .iter()
            .filter_map(|c| {
                c.character.map(|character| CharacterSync {
                    character,
                    health: c.health,
                    conditions: c.conditions.clone(),
                })
            })
            .collect();

        Ok(CombatResolution {
            name: self.name.clone(),
            outcome,
            syncs,
        })
    }

    // ---- actions ----------------------------------------------------------

    fn check_action(&self, ids: &[CombatantId]) -> Result<(), EncounterError> {
        if self.state == EncounterState::Ended {
            return Err(EncounterError::AlreadyEnded);
        }
        match ids.iter().find(|id| id.0 >= self.roster.len()) {
            Some(id) => Err(EncounterError::UnknownCombatant(id.0)),
            None => Ok(()),
        }
    }

    /// d20 against the target's armor class; a hit deals at least 1 damage.
    pub fn attack(
        &mut self,
        dice: &mut DiceEngine,
        attacker: CombatantId,
        target: CombatantId,
        damage: &str,
    ) -> Result<AttackOutcome, EncounterError> {
        self.check_action(&[attacker, target])?;

        let (attacker_c, target_c) = (&self.roster[attacker.0], &self.roster[target.0]);
        if !attacker_c.conscious {
            let error = ActionError::ActorUnconscious(attacker_c.name.clone());
            return Ok(AttackOutcome::refused(attacker_c, target_c, error));
        }
        if !target_c.conscious {
            let error = ActionError::TargetUnconscious(target_c.name.clone());
            return Ok(AttackOutcome::refused(attacker_c, target_c, error));
        }

        let attacker_name = attacker_c.name.clone();
        let target_name = target_c.name.clone();
        let target_ac = target_c.armor_class;
        let attack_roll = dice.d20(0).total();
        let hit = attack_roll >= target_ac;

        let mut outcome = AttackOutcome {
            attacker: attacker_name.clone(),
            target: target_name.clone(),
            attack_roll: Some(attack_roll),
            target_ac,
            hit,
            damage: 0,
            damage_roll: None,
            target_health: target_c.health,
            target_unconscious: false,
            error: None,
        };

        if !hit {
            self.log(format!(
                "{} attacks {} but misses! (rolled {} vs AC {})",
                attacker_name, target_name, attack_roll, target_ac
            ));
            return Ok(outcome);
        }

        let roll = match dice.parse_and_roll(damage) {
            Ok(roll) => roll,
            Err(source) => {
                outcome.error = Some(ActionError::InvalidNotation {
                    notation: damage.to_string(),
                    source,
                });
                return Ok(outcome);
            }
        };

        let amount = roll.total().max(1);
        let target_c = &mut self.roster[target.0];
        target_c.take_damage(amount);
        let (health, health_display, conscious) = (target_c.health, target_c.health_display(), target_c.conscious);

        outcome.damage = amount;
        outcome.damage_roll = Some(roll);
        outcome.target_health = health;
        outcome.target_unconscious = !conscious;

        self.log(format!(
            "{} hits {} for {} damage! ({}: {} HP)",
            attacker_name, target_name, amount, target_name, health_display
        ));
        if !conscious {
            self.log(format!("{} falls unconscious!", target_name));
        }
        Ok(outcome)
    }

    /// Apply a spell effect to each target independently.
    pub fn cast_spell(
        &mut self,
        dice: &mut DiceEngine,
        caster: CombatantId,
        spell: &str,
        targets: &[CombatantId],
        effect: &SpellEffect,
    ) -> Result<SpellOutcome, EncounterError> {
        let mut ids = vec![caster];
        ids.extend_from_slice(targets);
        self.check_action(&ids)?;

        let caster_name = self.roster[caster.0].name.clone();
        let mut outcome = SpellOutcome {
            caster: caster_name.clone(),
            spell: spell.to_string(),
            targets: targets.iter().map(|t| self.roster[t.0].name.clone()).collect(),
            effects: Vec::new(),
            error: None,
        };

        if !self.roster[caster.0].conscious {
            outcome.error = Some(ActionError::ActorUnconscious(caster_name));
            return Ok(outcome);
        }

        let (kind, notation) = match effect {
            SpellEffect::Damage { damage } => (EffectKind::Damage, damage),
            SpellEffect::Healing { healing } => (EffectKind::Healing, healing),
            SpellEffect::Unsupported => {
                tracing::debug!(spell, "Skipping unsupported spell effect");
                return Ok(outcome);
            }
        };
        let notation: DiceNotation = match notation.parse() {
            Ok(n) => n,
            Err(source) => {
                outcome.error = Some(ActionError::InvalidNotation {
                    notation: notation.clone(),
                    source,
                });
                return Ok(outcome);
            }
        };

        for &target in targets {
            // Notation already validated, so rolling cannot fail.
            let amount = match dice.roll(notation.sides, notation.count, notation.modifier) {
                Ok(roll) => roll.total(),
                Err(_) => continue,
            };
            let target_c = &mut self.roster[target.0];
            let target_name = target_c.name.clone();
            let line = match kind {
                EffectKind::Damage => {
                    target_c.take_damage(amount);
                    format!("{} casts {} on {} for {} damage!", caster_name, spell, target_name, amount)
                }
                EffectKind::Healing => {
                    target_c.heal(amount);
                    format!("{} casts {} on {}, healing {} HP!", caster_name, spell, target_name, amount)
                }
            };
            outcome.effects.push(TargetEffect {
                target: target_name,
                kind,
                amount,
                target_health: target_c.health,
            });
            self.log(line);
        }
        Ok(outcome)
    }

    // ---- projections ------------------------------------------------------

    pub fn status(&self) -> CombatStatus {
        CombatStatus {
            active: self.is_active(),
            name: self.name.clone(),
            round: self.round,
            current_turn: self.current_combatant().map(|c| c.name.clone()),
            combatants: self
                .roster
                .iter()
                .map(|c| CombatantStatus {
                    name: c.name.clone(),
                    kind: c.kind,
                    health: c.health_display(),
                    conscious: c.conscious,
                    conditions: c.conditions.names(),
                    initiative: c.initiative,
                })
                .collect(),
        }
    }

    /// The last `last_n` log entries, oldest first.
    pub fn combat_log(&self, last_n: usize) -> &[CombatLogEntry] {
        let start = self.log.len().saturating_sub(last_n);
        &self.log[start..]
    }

    fn log(&mut self, text: String) {
        self.log.push(CombatLogEntry {
            round: self.round,
            text,
        });
    }
}
