//! Enemy templates that combat setup can reference by key.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BestiaryError {
    #[error("Unknown enemy type: {0}")]
    UnknownEnemyType(String),
}

/// Base stats for a kind of enemy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnemyTemplate {
    pub key: &'static str,
    pub health: i32,
    pub armor_class: i32,
    pub damage: &'static str,
}

impl EnemyTemplate {
    const fn new(key: &'static str, health: i32, armor_class: i32, damage: &'static str) -> Self {
        Self {
            key,
            health,
            armor_class,
            damage,
        }
    }

    /// Display name derived from the key: `dragon_wyrmling` -> `Dragon Wyrmling`.
    pub fn display_name(&self) -> String {
        self.key
            .split('_')
            .filter(|w| !w.is_empty())
            .map(|word| {
                let mut chars = word.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

lazy_static::lazy_static! {
    /// Standard enemy templates.
    pub static ref ENEMIES: Vec<EnemyTemplate> = vec![
        EnemyTemplate::new("goblin", 7, 15, "1d6"),
        EnemyTemplate::new("orc", 15, 13, "1d8+3"),
        EnemyTemplate::new("skeleton", 13, 13, "1d6+2"),
        EnemyTemplate::new("wolf", 11, 13, "2d4+2"),
        EnemyTemplate::new("bandit", 11, 12, "1d6+1"),
        EnemyTemplate::new("ogre", 59, 11, "2d8+4"),
        EnemyTemplate::new("dragon_wyrmling", 75, 17, "2d10+4"),
    ];
}

/// Look up a template. Keys match case-insensitively and spaces are
/// treated as underscores.
pub fn enemy_template(kind: &str) -> Result<&'static EnemyTemplate, BestiaryError> {
    let key = kind.trim().to_lowercase().replace(' ', "_");
    ENEMIES
        .iter()
        .find(|t| t.key == key)
        .ok_or_else(|| BestiaryError::UnknownEnemyType(kind.to_string()))
}
