//! Text-adventure engine core.
//!
//! This crate provides:
//! - Dice rolling with `XdY+Z` notation and an injectable randomness source
//! - Characters with ability scores, hit points, conditions and levelling
//! - A turn-based encounter state machine
//! - An append-only story log with context windows and save/load
//! - A turn pipeline around an external narrator, and a per-channel
//!   session registry
//!
//! # Quick Start
//!
//! ```ignore
//! use adventure_core::{EngineConfig, OfflineNarrator, SessionRegistry};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = EngineConfig::from_env();
//!     let narrator = Arc::new(OfflineNarrator::new(config.personality));
//!     let registry = SessionRegistry::with_json_files(config, narrator);
//!
//!     let session = registry.session("tavern").await?;
//!     let mut session = session.lock().await;
//!     let report = session.take_turn("I look around the tavern", None).await;
//!     println!("{}", report.narration);
//!
//!     session.save().await?;
//!     Ok(())
//! }
//! ```

pub mod character;
pub mod combat;
pub mod config;
pub mod dice;
pub mod game;
pub mod narrator;
pub mod persist;
pub mod registry;
pub mod store;
pub mod story;
pub mod testing;

// Primary public API
pub use character::{Ability, AbilityScores, Character, CharacterBuilder, CharacterClass, CharacterId, Condition, Party};
pub use combat::{Combatant, CombatantKind, Encounter, EncounterError, SpellEffect, TurnAdvance};
pub use config::EngineConfig;
pub use dice::{Advantage, DiceEngine, DiceError, DiceRollResult, RollSummary};
pub use game::{GameSession, SessionError, TurnReport};
pub use narrator::{NarrationError, NarrationRequest, Narrator, OfflineNarrator, Personality};
pub use persist::{JsonFileBackend, MemoryBackend, PersistError, SessionBackend};
pub use registry::SessionRegistry;
pub use store::{list_sessions, LoadStatus, SessionState, SessionStore, SessionSummary};
pub use story::{EventKind, StoryEvent};
