//! Testing utilities.
//!
//! - [`ScriptedDice`] makes every roll deterministic
//! - [`ScriptedNarrator`], [`FailingNarrator`] and [`SlowNarrator`] stand in
//!   for a real text generator
//! - [`TestHarness`] wires them into an in-memory [`GameSession`]

use crate::character::{AbilityScores, Character, CharacterClass, CharacterId};
use crate::config::EngineConfig;
use crate::dice::{DiceEngine, DieSource};
use crate::game::{GameSession, TurnReport};
use crate::narrator::{NarrationError, NarrationRequest, Narrator};
use crate::persist::MemoryBackend;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Die source that returns a fixed sequence, starting over when it runs out.
///
/// Values are clamped into range by the [`DiceEngine`], so a script can use
/// 0 or 99 to mean "lowest" or "highest".
#[derive(Debug, Clone)]
pub struct ScriptedDice {
    values: Vec<u32>,
    next: usize,
}

impl ScriptedDice {
    pub fn new(values: impl IntoIterator<Item = u32>) -> Self {
        Self {
            values: values.into_iter().collect(),
            next: 0,
        }
    }
}

impl DieSource for ScriptedDice {
    fn roll_die(&mut self, _sides: u32) -> u32 {
        if self.values.is_empty() {
            return 1;
        }
        let value = self.values[self.next % self.values.len()];
        self.next += 1;
        value
    }
}

/// Narrator that replays queued responses and records every request.
#[derive(Debug, Default)]
pub struct ScriptedNarrator {
    responses: Mutex<VecDeque<String>>,
    requests: Mutex<Vec<NarrationRequest>>,
}

impl ScriptedNarrator {
    /// Returned once the queue is empty.
    pub const EXHAUSTED: &'static str = "The story continues.";

    pub fn new(responses: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().map(Into::into).collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub async fn queue(&self, response: impl Into<String>) {
        self.responses.lock().await.push_back(response.into());
    }

    pub async fn requests(&self) -> Vec<NarrationRequest> {
        self.requests.lock().await.clone()
    }
}

#[async_trait]
impl Narrator for ScriptedNarrator {
    async fn narrate(&self, request: &NarrationRequest) -> Result<String, NarrationError> {
        self.requests.lock().await.push(request.clone());
        Ok(self
            .responses
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Self::EXHAUSTED.to_string()))
    }
}

/// Narrator that always fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct FailingNarrator;

#[async_trait]
impl Narrator for FailingNarrator {
    async fn narrate(&self, _request: &NarrationRequest) -> Result<String, NarrationError> {
        Err(NarrationError::Unavailable("no narrator configured".to_string()))
    }
}

/// Narrator that sleeps before answering.
#[derive(Debug, Clone, Copy)]
pub struct SlowNarrator {
    delay: Duration,
}

impl SlowNarrator {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl Narrator for SlowNarrator {
    async fn narrate(&self, _request: &NarrationRequest) -> Result<String, NarrationError> {
        tokio::time::sleep(self.delay).await;
        Ok("Eventually, something happens.".to_string())
    }
}

/// Level 1 fighter: STR 16, DEX 14, CON 15, INT 10, WIS 12, CHA 8.
/// 12 HP, AC 12.
pub fn sample_fighter(name: &str) -> Character {
    Character::new(name, CharacterClass::Fighter, AbilityScores::new(16, 14, 15, 10, 12, 8))
}

/// Level 1 wizard: STR 8, DEX 14, CON 12, INT 16, WIS 13, CHA 10.
/// 7 HP, AC 12.
pub fn sample_wizard(name: &str) -> Character {
    Character::new(name, CharacterClass::Wizard, AbilityScores::new(8, 14, 12, 16, 13, 10))
}

/// In-memory game session with scripted dice and narration.
pub struct TestHarness {
    pub session: GameSession,
    pub backend: Arc<MemoryBackend>,
    pub narrator: Arc<ScriptedNarrator>,
    pub hero: CharacterId,
}

impl TestHarness {
    /// A session holding one fighter named "Hero". Every die rolls 10.
    pub fn new() -> Self {
        Self::with_dice([10])
    }

    pub fn with_dice(values: impl IntoIterator<Item = u32>) -> Self {
        Self::with_config(EngineConfig::default(), values)
    }

    pub fn with_config(config: EngineConfig, values: impl IntoIterator<Item = u32>) -> Self {
        let backend = Arc::new(MemoryBackend::new());
        let narrator = Arc::new(ScriptedNarrator::default());
        let mut session = GameSession::new("harness", config, backend.clone(), narrator.clone())
            .with_dice(DiceEngine::with_source(ScriptedDice::new(values)));
        let hero = session.add_character(sample_fighter("Hero"));
        Self {
            session,
            backend,
            narrator,
            hero,
        }
    }

    /// Queue the narrator's next response.
    pub async fn expect_narrative(&self, text: impl Into<String>) -> &Self {
        self.narrator.queue(text).await;
        self
    }

    pub async fn input(&mut self, action: &str) -> TurnReport {
        self.session.take_turn(action, None).await
    }

    pub fn hero(&self) -> &Character {
        match self.session.party().get(self.hero) {
            Some(hero) => hero,
            None => panic!("hero missing from party"),
        }
    }

    pub fn hero_hp(&self) -> (i32, i32) {
        let hero = self.hero();
        (hero.health(), hero.max_health())
    }

    pub fn in_combat(&self) -> bool {
        self.session.in_combat()
    }

    pub fn last_narrative(&self) -> Option<&str> {
        self.session
            .store()
            .history()
            .iter()
            .rev()
            .find(|e| e.kind() == crate::story::EventKind::DmResponse)
            .map(|e| e.content())
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
