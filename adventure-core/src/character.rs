//! Persistent player characters.
//!
//! Contains ability scores, hit points, conditions, inventory, experience
//! and levelling, plus the [`CharacterBuilder`] used at creation time and
//! the [`Party`] that combat resolves back-references against.

use crate::dice::{ability_modifier, Advantage, DiceEngine, DiceRollResult};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Errors from character construction and lookups.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CharacterError {
    #[error("Unknown ability: {0}")]
    UnknownAbility(String),
    #[error("Character name is required")]
    MissingName,
}

// ============================================================================
// ID Types
// ============================================================================

/// Unique identifier for characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CharacterId(pub Uuid);

impl CharacterId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CharacterId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CharacterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Ability Scores
// ============================================================================

/// The six ability scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Ability {
    Strength,
    Dexterity,
    Constitution,
    Intelligence,
    Wisdom,
    Charisma,
}

impl Ability {
    pub fn abbreviation(&self) -> &'static str {
        match self {
            Ability::Strength => "STR",
            Ability::Dexterity => "DEX",
            Ability::Constitution => "CON",
            Ability::Intelligence => "INT",
            Ability::Wisdom => "WIS",
            Ability::Charisma => "CHA",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Ability::Strength => "Strength",
            Ability::Dexterity => "Dexterity",
            Ability::Constitution => "Constitution",
            Ability::Intelligence => "Intelligence",
            Ability::Wisdom => "Wisdom",
            Ability::Charisma => "Charisma",
        }
    }

    pub fn all() -> [Ability; 6] {
        [
            Ability::Strength,
            Ability::Dexterity,
            Ability::Constitution,
            Ability::Intelligence,
            Ability::Wisdom,
            Ability::Charisma,
        ]
    }
}

impl FromStr for Ability {
    type Err = CharacterError;

    /// Accepts full names or three-letter abbreviations, any case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Ability::all()
            .into_iter()
            .find(|a| {
                a.name().eq_ignore_ascii_case(wanted) || a.abbreviation().eq_ignore_ascii_case(wanted)
            })
            .ok_or_else(|| CharacterError::UnknownAbility(s.to_string()))
    }
}

impl fmt::Display for Ability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.abbreviation())
    }
}

/// Ability scores container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbilityScores {
    pub strength: u8,
    pub dexterity: u8,
    pub constitution: u8,
    pub intelligence: u8,
    pub wisdom: u8,
    pub charisma: u8,
}

impl AbilityScores {
    pub fn new(str: u8, dex: u8, con: u8, int: u8, wis: u8, cha: u8) -> Self {
        Self {
            strength: str,
            dexterity: dex,
            constitution: con,
            intelligence: int,
            wisdom: wis,
            charisma: cha,
        }
    }

    /// Roll each score with 4d6 drop lowest, in STR..CHA order.
    pub fn rolled(dice: &mut DiceEngine) -> Self {
        let mut next = || dice.ability_score_roll().total() as u8;
        Self::new(next(), next(), next(), next(), next(), next())
    }

    pub fn get(&self, ability: Ability) -> u8 {
        match ability {
            Ability::Strength => self.strength,
            Ability::Dexterity => self.dexterity,
            Ability::Constitution => self.constitution,
            Ability::Intelligence => self.intelligence,
            Ability::Wisdom => self.wisdom,
            Ability::Charisma => self.charisma,
        }
    }

    pub fn set(&mut self, ability: Ability, value: u8) {
        match ability {
            Ability::Strength => self.strength = value,
            Ability::Dexterity => self.dexterity = value,
            Ability::Constitution => self.constitution = value,
            Ability::Intelligence => self.intelligence = value,
            Ability::Wisdom => self.wisdom = value,
            Ability::Charisma => self.charisma = value,
        }
    }

    pub fn modifier(&self, ability: Ability) -> i32 {
        ability_modifier(self.get(ability))
    }
}

impl Default for AbilityScores {
    fn default() -> Self {
        Self::new(10, 10, 10, 10, 10, 10)
    }
}

// ============================================================================
// Classes
// ============================================================================

/// Character classes. Names outside the standard twelve are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CharacterClass {
    Barbarian,
    Bard,
    Cleric,
    Druid,
    Fighter,
    Monk,
    Paladin,
    Ranger,
    Rogue,
    Sorcerer,
    Warlock,
    Wizard,
    Custom(String),
}

impl CharacterClass {
    /// Hit die size used for starting hit points.
    pub fn hit_die(&self) -> i32 {
        match self {
            CharacterClass::Barbarian => 12,
            CharacterClass::Fighter | CharacterClass::Paladin | CharacterClass::Ranger => 10,
            CharacterClass::Sorcerer | CharacterClass::Wizard => 6,
            CharacterClass::Bard
            | CharacterClass::Cleric
            | CharacterClass::Druid
            | CharacterClass::Monk
            | CharacterClass::Rogue
            | CharacterClass::Warlock
            | CharacterClass::Custom(_) => 8,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            CharacterClass::Barbarian => "Barbarian",
            CharacterClass::Bard => "Bard",
            CharacterClass::Cleric => "Cleric",
            CharacterClass::Druid => "Druid",
            CharacterClass::Fighter => "Fighter",
            CharacterClass::Monk => "Monk",
            CharacterClass::Paladin => "Paladin",
            CharacterClass::Ranger => "Ranger",
            CharacterClass::Rogue => "Rogue",
            CharacterClass::Sorcerer => "Sorcerer",
            CharacterClass::Warlock => "Warlock",
            CharacterClass::Wizard => "Wizard",
            CharacterClass::Custom(name) => name,
        }
    }
}

impl FromStr for CharacterClass {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_lowercase().as_str() {
            "barbarian" => CharacterClass::Barbarian,
            "bard" => CharacterClass::Bard,
            "cleric" => CharacterClass::Cleric,
            "druid" => CharacterClass::Druid,
            "fighter" => CharacterClass::Fighter,
            "monk" => CharacterClass::Monk,
            "paladin" => CharacterClass::Paladin,
            "ranger" => CharacterClass::Ranger,
            "rogue" => CharacterClass::Rogue,
            "sorcerer" => CharacterClass::Sorcerer,
            "warlock" => CharacterClass::Warlock,
            "wizard" => CharacterClass::Wizard,
            _ => CharacterClass::Custom(s.trim().to_string()),
        })
    }
}

impl fmt::Display for CharacterClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

// ============================================================================
// Conditions
// ============================================================================

/// Status conditions. Anything the narrative invents lands in `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Condition {
    Blinded,
    Charmed,
    Deafened,
    Frightened,
    Grappled,
    Incapacitated,
    Invisible,
    Paralyzed,
    Petrified,
    Poisoned,
    Prone,
    Restrained,
    Stunned,
    Unconscious,
    Other(String),
}

impl Condition {
    pub fn name(&self) -> &str {
        match self {
            Condition::Blinded => "Blinded",
            Condition::Charmed => "Charmed",
            Condition::Deafened => "Deafened",
            Condition::Frightened => "Frightened",
            Condition::Grappled => "Grappled",
            Condition::Incapacitated => "Incapacitated",
            Condition::Invisible => "Invisible",
            Condition::Paralyzed => "Paralyzed",
            Condition::Petrified => "Petrified",
            Condition::Poisoned => "Poisoned",
            Condition::Prone => "Prone",
            Condition::Restrained => "Restrained",
            Condition::Stunned => "Stunned",
            Condition::Unconscious => "Unconscious",
            Condition::Other(name) => name,
        }
    }
}

impl FromStr for Condition {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        const KNOWN: [Condition; 14] = [
            Condition::Blinded,
            Condition::Charmed,
            Condition::Deafened,
            Condition::Frightened,
            Condition::Grappled,
            Condition::Incapacitated,
            Condition::Invisible,
            Condition::Paralyzed,
            Condition::Petrified,
            Condition::Poisoned,
            Condition::Prone,
            Condition::Restrained,
            Condition::Stunned,
            Condition::Unconscious,
        ];
        let wanted = s.trim();
        Ok(KNOWN
            .into_iter()
            .find(|c| c.name().eq_ignore_ascii_case(wanted))
            .unwrap_or_else(|| Condition::Other(wanted.to_string())))
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Insertion-ordered set of conditions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Conditions(Vec<Condition>);

impl Conditions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the condition was not already present.
    pub fn add(&mut self, condition: Condition) -> bool {
        if self.has(&condition) {
            return false;
        }
        self.0.push(condition);
        true
    }

    /// Returns true if the condition was present.
    pub fn remove(&mut self, condition: &Condition) -> bool {
        let before = self.0.len();
        self.0.retain(|c| c != condition);
        self.0.len() != before
    }

    pub fn has(&self, condition: &Condition) -> bool {
        self.0.contains(condition)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Condition> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn names(&self) -> Vec<String> {
        self.0.iter().map(|c| c.name().to_string()).collect()
    }
}

impl FromIterator<Condition> for Conditions {
    fn from_iter<I: IntoIterator<Item = Condition>>(iter: I) -> Self {
        let mut conditions = Conditions::new();
        for condition in iter {
            conditions.add(condition);
        }
        conditions
    }
}

// ============================================================================
// Hit Points and Health
// ============================================================================

/// Hit points tracking. `current` never drops below 0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HitPoints {
    pub current: i32,
    pub maximum: i32,
    pub temporary: i32,
}

impl HitPoints {
    pub fn new(maximum: i32) -> Self {
        Self {
            current: maximum,
            maximum,
            temporary: 0,
        }
    }

    /// Temporary hit points soak damage first; the remainder comes off
    /// `current`, floored at 0.
    pub fn take_damage(&mut self, amount: i32) -> DamageResult {
        let amount = amount.max(0);
        let temp_hp_lost = amount.min(self.temporary);
        self.temporary -= temp_hp_lost;

        let health_lost = (amount - temp_hp_lost).min(self.current);
        self.current -= health_lost;

        DamageResult {
            damage_taken: amount,
            temp_hp_lost,
            health_lost,
            current_health: self.current,
            unconscious: self.current <= 0,
        }
    }

    pub fn heal(&mut self, amount: i32) -> HealResult {
        let old = self.current;
        self.current = self.current.saturating_add(amount.max(0)).min(self.maximum);
        HealResult {
            healing_attempted: amount,
            healing_applied: self.current - old,
            current_health: self.current,
            fully_healed: self.current >= self.maximum,
        }
    }

    /// Temporary hit points don't stack; the larger pool wins.
    pub fn add_temp_hp(&mut self, amount: i32) {
        self.temporary = self.temporary.max(amount);
    }

    pub fn is_unconscious(&self) -> bool {
        self.current <= 0
    }

    pub fn ratio(&self) -> f32 {
        if self.maximum <= 0 {
            return 0.0;
        }
        (self.current as f32 / self.maximum as f32).max(0.0)
    }
}

/// Result of taking damage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DamageResult {
    pub damage_taken: i32,
    pub temp_hp_lost: i32,
    pub health_lost: i32,
    pub current_health: i32,
    pub unconscious: bool,
}

/// Result of healing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealResult {
    pub healing_attempted: i32,
    pub healing_applied: i32,
    pub current_health: i32,
    pub fully_healed: bool,
}

// ============================================================================
// Character
// ============================================================================

/// XP needed per level.
pub const XP_PER_LEVEL: u32 = 1000;

/// `1 + floor(experience / 1000)`.
pub fn level_for_experience(experience: u32) -> u32 {
    1 + experience / XP_PER_LEVEL
}

/// Items every new character starts with.
pub const STARTING_INVENTORY: [&str; 3] = ["Basic weapon", "Starting armor", "Adventurer's pack"];

/// Gold every new character starts with.
pub const STARTING_GOLD: u32 = 100;

/// A level-up triggered by experience.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelUp {
    pub from: u32,
    pub to: u32,
    pub hp_gained: i32,
}

/// Result of an ability check against a difficulty class.
#[derive(Debug, Clone)]
pub struct AbilityCheck {
    pub ability: Ability,
    pub difficulty: i32,
    pub roll: DiceRollResult,
    pub success: bool,
    pub margin: i32,
}

/// A persistent player character.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Character {
    pub id: CharacterId,
    pub name: String,
    pub class: CharacterClass,
    level: u32,
    experience: u32,

    pub ability_scores: AbilityScores,
    pub hit_points: HitPoints,
    pub armor_class: i32,

    pub gold: u32,
    pub inventory: Vec<String>,
    pub conditions: Conditions,
}

impl Character {
    /// Character with derived hit points and armor class.
    pub fn new(name: impl Into<String>, class: CharacterClass, ability_scores: AbilityScores) -> Self {
        let max_health = starting_hit_points(&class, &ability_scores);
        let armor_class = 10 + ability_scores.modifier(Ability::Dexterity);
        Self {
            id: CharacterId::new(),
            name: name.into(),
            class,
            level: 1,
            experience: 0,
            ability_scores,
            hit_points: HitPoints::new(max_health),
            armor_class,
            gold: STARTING_GOLD,
            inventory: STARTING_INVENTORY.iter().map(|s| s.to_string()).collect(),
            conditions: Conditions::new(),
        }
    }

    pub fn level(&self) -> u32 {
        self.level
    }

    pub fn experience(&self) -> u32 {
        self.experience
    }

    pub fn health(&self) -> i32 {
        self.hit_points.current
    }

    pub fn max_health(&self) -> i32 {
        self.hit_points.maximum
    }

    pub fn temporary_hp(&self) -> i32 {
        self.hit_points.temporary
    }

    pub fn modifier(&self, ability: Ability) -> i32 {
        self.ability_scores.modifier(ability)
    }

    /// Modifier lookup by ability name ("strength", "DEX", ...).
    pub fn get_modifier(&self, ability: &str) -> Result<i32, CharacterError> {
        Ok(self.modifier(ability.parse()?))
    }

    pub fn take_damage(&mut self, amount: i32) -> DamageResult {
        self.hit_points.take_damage(amount)
    }

    pub fn heal(&mut self, amount: i32) -> HealResult {
        self.hit_points.heal(amount)
    }

    pub fn add_temp_hp(&mut self, amount: i32) {
        self.hit_points.add_temp_hp(amount);
    }

    /// Overwrite health from an external source (end-of-combat sync),
    /// clamped into `0..=max_health`.
    pub fn set_health(&mut self, health: i32) {
        self.hit_points.current = health.clamp(0, self.hit_points.maximum);
    }

    pub fn add_condition(&mut self, condition: Condition) -> bool {
        self.conditions.add(condition)
    }

    pub fn remove_condition(&mut self, condition: &Condition) -> bool {
        self.conditions.remove(condition)
    }

    pub fn has_condition(&self, condition: &Condition) -> bool {
        self.conditions.has(condition)
    }

    pub fn add_item(&mut self, item: impl Into<String>) {
        self.inventory.push(item.into());
    }

    /// Removes the first matching item.
    pub fn remove_item(&mut self, item: &str) -> bool {
        match self.inventory.iter().position(|i| i == item) {
            Some(pos) => {
                self.inventory.remove(pos);
                true
            }
            None => false,
        }
    }

    pub fn has_item(&self, item: &str) -> bool {
        self.inventory.iter().any(|i| i == item)
    }

    /// Add experience and level up as the thresholds are crossed.
    ///
    /// Each level gained adds `max(1, 5 + CON modifier)` to maximum health
    /// and heals the same amount.
    pub fn gain_experience(&mut self, xp: u32) -> Option<LevelUp> {
        self.experience = self.experience.saturating_add(xp);
        let new_level = level_for_experience(self.experience);
        if new_level <= self.level {
            return None;
        }

        let per_level = (5 + self.modifier(Ability::Constitution)).max(1);
        let levels = i32::try_from(new_level - self.level).unwrap_or(i32::MAX);
        let hp_gained = per_level.saturating_mul(levels);
        self.hit_points.maximum = self.hit_points.maximum.saturating_add(hp_gained);
        self.hit_points.current = self.hit_points.current.saturating_add(hp_gained);

        let from = self.level;
        self.level = new_level;
        Some(LevelUp {
            from,
            to: new_level,
            hp_gained,
        })
    }

    pub fn make_ability_check(
        &self,
        dice: &mut DiceEngine,
        ability: Ability,
        difficulty: i32,
        advantage: Advantage,
    ) -> AbilityCheck {
        let roll = dice.ability_check_with(self.ability_scores.get(ability), advantage);
        AbilityCheck {
            ability,
            difficulty,
            success: roll.meets_dc(difficulty),
            margin: roll.total().saturating_sub(difficulty),
            roll,
        }
    }

    pub fn is_alive(&self) -> bool {
        self.health() > 0
    }

    pub fn is_conscious(&self) -> bool {
        self.health() > 0 && !self.has_condition(&Condition::Unconscious)
    }

    /// One-line health/conditions summary for status displays.
    pub fn status_summary(&self) -> String {
        let percent = if self.max_health() > 0 {
            i64::from(self.health()) * 100 / i64::from(self.max_health())
        } else {
            0
        };
        let health = match percent {
            p if p <= 0 => "Unconscious",
            p if p <= 25 => "Critically wounded",
            p if p <= 50 => "Badly hurt",
            p if p <= 75 => "Wounded",
            _ => "Healthy",
        };

        let mut parts = vec![health.to_string()];
        if !self.conditions.is_empty() {
            parts.push(format!("Conditions: {}", self.conditions.names().join(", ")));
        }
        if self.temporary_hp() > 0 {
            parts.push(format!("Temporary HP: {}", self.temporary_hp()));
        }
        parts.join(" | ")
    }
}

/// Hit die plus CON modifier, never below 1.
pub fn starting_hit_points(class: &CharacterClass, scores: &AbilityScores) -> i32 {
    (class.hit_die() + scores.modifier(Ability::Constitution)).max(1)
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for new characters.
///
/// Hit points and armor class are derived from class and ability scores
/// unless set explicitly.
#[derive(Debug, Clone, Default)]
pub struct CharacterBuilder {
    name: Option<String>,
    class: Option<CharacterClass>,
    ability_scores: Option<AbilityScores>,
    max_health: Option<i32>,
    armor_class: Option<i32>,
    gold: Option<u32>,
    inventory: Option<Vec<String>>,
}

impl CharacterBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn class(mut self, class: CharacterClass) -> Self {
        self.class = Some(class);
        self
    }

    pub fn ability_scores(mut self, scores: AbilityScores) -> Self {
        self.ability_scores = Some(scores);
        self
    }

    pub fn max_health(mut self, max_health: i32) -> Self {
        self.max_health = Some(max_health);
        self
    }

    pub fn armor_class(mut self, armor_class: i32) -> Self {
        self.armor_class = Some(armor_class);
        self
    }

    pub fn gold(mut self, gold: u32) -> Self {
        self.gold = Some(gold);
        self
    }

    pub fn inventory(mut self, items: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.inventory = Some(items.into_iter().map(Into::into).collect());
        self
    }

    pub fn build(self) -> Result<Character, CharacterError> {
        let name = self
            .name
            .filter(|n| !n.trim().is_empty())
            .ok_or(CharacterError::MissingName)?;
        let class = self.class.unwrap_or(CharacterClass::Fighter);
        let scores = self.ability_scores.unwrap_or_default();

        let mut character = Character::new(name, class, scores);
        if let Some(max_health) = self.max_health {
            character.hit_points = HitPoints::new(max_health.max(1));
        }
        if let Some(armor_class) = self.armor_class {
            character.armor_class = armor_class;
        }
        if let Some(gold) = self.gold {
            character.gold = gold;
        }
        if let Some(inventory) = self.inventory {
            character.inventory = inventory;
        }
        Ok(character)
    }
}

// ============================================================================
// Party
// ============================================================================

/// The characters taking part in a session, in join order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Party {
    members: Vec<Character>,
}

impl Party {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a character, replacing any existing member with the same id.
    pub fn insert(&mut self, character: Character) -> CharacterId {
        let id = character.id;
        match self.members.iter_mut().find(|c| c.id == id) {
            Some(existing) => *existing = character,
            None => self.members.push(character),
        }
        id
    }

    pub fn remove(&mut self, id: CharacterId) -> Option<Character> {
        let pos = self.members.iter().position(|c| c.id == id)?;
        Some(self.members.remove(pos))
    }

    pub fn get(&self, id: CharacterId) -> Option<&Character> {
        self.members.iter().find(|c| c.id == id)
    }

    pub fn get_mut(&mut self, id: CharacterId) -> Option<&mut Character> {
        self.members.iter_mut().find(|c| c.id == id)
    }

    pub fn by_name(&self, name: &str) -> Option<&Character> {
        self.members.iter().find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Character> {
        self.members.iter()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{sample_fighter, ScriptedDice};
    use proptest::prelude::*;

    fn wizard() -> Character {
        Character::new(
            "Elminster",
            CharacterClass::Wizard,
            AbilityScores::new(8, 14, 12, 18, 13, 10),
        )
    }

    #[test]
    fn test_ability_modifier_floor_division() {
        let scores = AbilityScores::new(8, 9, 10, 11, 12, 20);
        assert_eq!(scores.modifier(Ability::Strength), -1);
        assert_eq!(scores.modifier(Ability::Dexterity), -1);
        assert_eq!(scores.modifier(Ability::Constitution), 0);
        assert_eq!(scores.modifier(Ability::Intelligence), 0);
        assert_eq!(scores.modifier(Ability::Wisdom), 1);
        assert_eq!(scores.modifier(Ability::Charisma), 5);
    }

    #[test]
    fn test_get_modifier_by_name() {
        let character = wizard();
        assert_eq!(character.get_modifier("intelligence"), Ok(4));
        assert_eq!(character.get_modifier("DEX"), Ok(2));
        assert_eq!(
            character.get_modifier("luck"),
            Err(CharacterError::UnknownAbility("luck".to_string()))
        );
    }

    #[test]
    fn test_derived_hit_points_and_armor_class() {
        let character = wizard();
        // d6 + CON(+1)
        assert_eq!(character.max_health(), 7);
        assert_eq!(character.health(), 7);
        assert_eq!(character.armor_class, 12);
    }

    #[test]
    fn test_unknown_class_uses_d8_and_minimum_one() {
        let class: CharacterClass = "Artificer".parse().unwrap();
        assert_eq!(class, CharacterClass::Custom("Artificer".to_string()));
        assert_eq!(class.hit_die(), 8);

        let frail = Character::new("Frail", CharacterClass::Wizard, AbilityScores::new(10, 10, 1, 10, 10, 10));
        assert_eq!(frail.max_health(), 1);
    }

    #[test]
    fn test_builder_overrides() {
        let character = CharacterBuilder::new()
            .name("Brakka")
            .class(CharacterClass::Barbarian)
            .max_health(30)
            .armor_class(15)
            .build()
            .unwrap();
        assert_eq!(character.max_health(), 30);
        assert_eq!(character.armor_class, 15);
        assert_eq!(character.gold, STARTING_GOLD);
        assert_eq!(character.inventory.len(), 3);

        assert_eq!(
            CharacterBuilder::new().build().unwrap_err(),
            CharacterError::MissingName
        );
    }

    #[test]
    fn test_temp_hp_absorbs_first() {
        let mut character = sample_fighter("Temp");
        let before = character.health();
        character.add_temp_hp(5);

        let result = character.take_damage(8);
        assert_eq!(result.temp_hp_lost, 5);
        assert_eq!(result.health_lost, 3);
        assert_eq!(character.health(), before - 3);
        assert_eq!(character.temporary_hp(), 0);
    }

    #[test]
    fn test_damage_floors_at_zero() {
        let mut character = wizard();
        let result = character.take_damage(100);
        assert_eq!(result.health_lost, 7);
        assert_eq!(character.health(), 0);
        assert!(result.unconscious);
        assert!(!character.is_alive());
    }

    #[test]
    fn test_heal_clamps() {
        let mut character = wizard();
        character.take_damage(5);
        let result = character.heal(10);
        assert_eq!(result.healing_applied, 5);
        assert!(result.fully_healed);
        assert_eq!(character.health(), character.max_health());
    }

    #[test]
    fn test_heal_saturates() {
        let mut character = wizard();
        character.take_damage(3);
        let result = character.heal(i32::MAX);
        assert_eq!(result.healing_applied, 3);
        assert_eq!(character.health(), character.max_health());

        let mut giant = CharacterBuilder::new().name("Giant").max_health(i32::MAX).build().unwrap();
        giant.take_damage(1);
        giant.heal(i32::MAX);
        assert_eq!(giant.health(), i32::MAX);
        assert_eq!(giant.status_summary(), "Healthy");
    }

    #[test]
    fn test_ability_check_extreme_difficulty() {
        let character = wizard();
        let mut dice = DiceEngine::with_source(ScriptedDice::new([10]));
        let check = character.make_ability_check(&mut dice, Ability::Strength, i32::MIN, Advantage::Normal);
        assert!(check.success);
        assert_eq!(check.margin, i32::MAX);
    }

    #[test]
    fn test_conditions_are_idempotent() {
        let mut character = wizard();
        assert!(character.add_condition(Condition::Poisoned));
        assert!(!character.add_condition(Condition::Poisoned));
        assert_eq!(character.conditions.len(), 1);
        assert!(character.remove_condition(&Condition::Poisoned));
        assert!(!character.remove_condition(&Condition::Poisoned));
        assert!(!character.has_condition(&Condition::Poisoned));

        let parsed: Condition = "unconscious".parse().unwrap();
        assert_eq!(parsed, Condition::Unconscious);
        let custom: Condition = "Blessed".parse().unwrap();
        assert_eq!(custom, Condition::Other("Blessed".to_string()));
    }

    #[test]
    fn test_level_up() {
        let mut character = wizard();
        let max_before = character.max_health();
        character.take_damage(3);

        assert!(character.gain_experience(999).is_none());
        assert_eq!(character.level(), 1);

        let level_up = character.gain_experience(1001).unwrap();
        // 2000 XP -> level 3, +6 (5 + CON 1) per level
        assert_eq!(level_up, LevelUp { from: 1, to: 3, hp_gained: 12 });
        assert_eq!(character.max_health(), max_before + 12);
        assert_eq!(character.health(), max_before - 3 + 12);
    }

    #[test]
    fn test_level_up_minimum_one_hp() {
        let mut character = Character::new(
            "Sickly",
            CharacterClass::Fighter,
            AbilityScores::new(10, 10, 1, 10, 10, 10),
        );
        let max_before = character.max_health();
        let level_up = character.gain_experience(1000).unwrap();
        assert_eq!(level_up.hp_gained, 1);
        assert_eq!(character.max_health(), max_before + 1);
    }

    #[test]
    fn test_inventory() {
        let mut character = wizard();
        character.add_item("Spellbook");
        assert!(character.has_item("Spellbook"));
        assert!(character.remove_item("Spellbook"));
        assert!(!character.remove_item("Spellbook"));
    }

    #[test]
    fn test_ability_check_success_and_margin() {
        let character = wizard();
        let mut dice = DiceEngine::with_source(ScriptedDice::new([11]));
        let check = character.make_ability_check(&mut dice, Ability::Intelligence, 15, Advantage::Normal);
        assert_eq!(check.roll.total(), 15);
        assert!(check.success);
        assert_eq!(check.margin, 0);
    }

    #[test]
    fn test_status_summary() {
        let mut character = sample_fighter("Status");
        assert_eq!(character.status_summary(), "Healthy");
        character.add_condition(Condition::Prone);
        character.add_temp_hp(4);
        let max = character.max_health();
        character.set_health(max / 4);
        assert_eq!(
            character.status_summary(),
            "Critically wounded | Conditions: Prone | Temporary HP: 4"
        );
    }

    #[test]
    fn test_party_lookup() {
        let mut party = Party::new();
        let id = party.insert(wizard());
        assert_eq!(party.len(), 1);
        assert!(party.get(id).is_some());
        assert!(party.by_name("elminster").is_some());
        assert!(party.remove(id).is_some());
        assert!(party.is_empty());
    }

    proptest! {
        #[test]
        fn prop_damage_accounting(temp in 0i32..20, amount in 0i32..100, con in 3u8..=18) {
            let mut character = Character::new("Prop", CharacterClass::Fighter, AbilityScores::new(10, 10, con, 10, 10, 10));
            character.add_temp_hp(temp);
            let health_before = character.health();

            let result = character.take_damage(amount);
            prop_assert!(character.health() >= 0);
            prop_assert_eq!(result.temp_hp_lost + result.health_lost, amount.min(temp + health_before));
        }
    }
}
