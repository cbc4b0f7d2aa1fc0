use crate::character::{Character, CharacterId, Condition, Conditions};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which side a combatant fights on. NPCs count for neither side when
/// deciding whether combat is over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CombatantKind {
    Player,
    Npc,
    Enemy,
}

impl CombatantKind {
    pub fn name(&self) -> &'static str {
        match self {
            CombatantKind::Player => "player",
            CombatantKind::Npc => "npc",
            CombatantKind::Enemy => "enemy",
        }
    }
}

impl fmt::Display for CombatantKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Combat participant.
///
/// A combatant built from a [`Character`] copies its stats on entry and keeps
/// only the character's id. Damage taken during combat stays here until the
/// encounter ends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Combatant {
    pub name: String,
    pub kind: CombatantKind,
    pub health: i32,
    pub max_health: i32,
    pub armor_class: i32,
    pub initiative: i32,
    pub conscious: bool,
    pub conditions: Conditions,
    pub character: Option<CharacterId>,
}

impl Combatant {
    pub fn new(name: impl Into<String>, kind: CombatantKind, health: i32, armor_class: i32) -> Self {
        let health = health.max(0);
        let mut combatant = Self {
            name: name.into(),
            kind,
            health,
            max_health: health,
            armor_class,
            initiative: 0,
            conscious: true,
            conditions: Conditions::new(),
            character: None,
        };
        if health == 0 {
            combatant.knock_out();
        }
        combatant
    }

    pub fn from_character(character: &Character) -> Self {
        let mut combatant = Self {
            name: character.name.clone(),
            kind: CombatantKind::Player,
            health: character.health(),
            max_health: character.max_health(),
            armor_class: character.armor_class,
            initiative: 0,
            conscious: true,
            conditions: character.conditions.clone(),
            character: Some(character.id),
        };
        if !character.is_conscious() {
            combatant.knock_out();
        }
        combatant
    }

    pub fn is_player(&self) -> bool {
        self.kind == CombatantKind::Player
    }

    pub fn is_enemy(&self) -> bool {
        self.kind == CombatantKind::Enemy
    }

    /// Returns the damage actually removed from health.
    pub fn take_damage(&mut self, amount: i32) -> i32 {
        let lost = amount.max(0).min(self.health);
        self.health -= lost;
        if self.health == 0 {
            self.knock_out();
        }
        lost
    }

    /// Returns the healing actually applied. Any healing above zero health
    /// brings a combatant back to consciousness.
    pub fn heal(&mut self, amount: i32) -> i32 {
        let old = self.health;
        self.health = self.health.saturating_add(amount.max(0)).min(self.max_health);
        if self.health > 0 && !self.conscious {
            self.conscious = true;
            self.conditions.remove(&Condition::Unconscious);
        }
        self.health - old
    }

    fn knock_out(&mut self) {
        self.conscious = false;
        self.conditions.add(Condition::Unconscious);
    }

    pub fn health_display(&self) -> String {
        format!("{}/{}", self.health, self.max_health)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sample_fighter;

    #[test]
    fn test_from_character_copies_stats() {
        let fighter = sample_fighter("Roland");
        let combatant = Combatant::from_character(&fighter);
        assert_eq!(combatant.name, "Roland");
        assert_eq!(combatant.kind, CombatantKind::Player);
        assert_eq!(combatant.health, fighter.health());
        assert_eq!(combatant.armor_class, fighter.armor_class);
        assert_eq!(combatant.character, Some(fighter.id));
    }

    #[test]
    fn test_damage_knocks_out() {
        let mut goblin = Combatant::new("Goblin", CombatantKind::Enemy, 7, 15);
        assert_eq!(goblin.take_damage(10), 7);
        assert_eq!(goblin.health, 0);
        assert!(!goblin.conscious);
        assert!(goblin.conditions.has(&Condition::Unconscious));
    }

    #[test]
    fn test_heal_revives() {
        let mut goblin = Combatant::new("Goblin", CombatantKind::Enemy, 7, 15);
        goblin.take_damage(7);
        assert_eq!(goblin.heal(20), 7);
        assert!(goblin.conscious);
        assert!(!goblin.conditions.has(&Condition::Unconscious));
    }
}
