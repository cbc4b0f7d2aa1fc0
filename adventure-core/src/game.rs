//! GameSession - one table of play.
//!
//! Ties a [`SessionStore`], the [`Party`], at most one [`Encounter`], a
//! [`DiceEngine`] and a [`Narrator`] together and runs the turn pipeline:
//!
//! 1. record the player's action (and roll, if any)
//! 2. ask the narrator for a response, falling back to canned text on
//!    failure or timeout
//! 3. record the response
//! 4. advance the encounter turn, syncing the party if combat ends

use crate::character::{AbilityCheck, Ability, Character, CharacterError, CharacterId, Party};
use crate::combat::{
    AttackOutcome, CombatResolution, CombatStatus, Encounter, EncounterError, SpellEffect, SpellOutcome,
    TurnAdvance,
};
use crate::config::EngineConfig;
use crate::dice::{Advantage, DiceEngine, DiceError, DiceRollResult, RollSummary};
use crate::narrator::{fallback_response, NarrationError, NarrationRequest, Narrator};
use crate::persist::{PersistError, SessionBackend};
use crate::store::{LoadStatus, SessionStore};
use std::sync::Arc;
use thiserror::Error;

/// Damage used when an attack doesn't name its own.
pub const DEFAULT_WEAPON_DAMAGE: &str = "1d6";

/// Errors from GameSession operations.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Dice error: {0}")]
    Dice(#[from] DiceError),

    #[error("Character error: {0}")]
    Character(#[from] CharacterError),

    #[error("Encounter error: {0}")]
    Encounter(#[from] EncounterError),

    #[error("Persistence error: {0}")]
    Persist(#[from] PersistError),

    #[error("Not in combat")]
    NotInCombat,

    #[error("Combat already in progress: {0}")]
    CombatInProgress(String),

    #[error("No combatant named '{0}'")]
    UnknownCombatant(String),

    #[error("Character {0} is not in the party")]
    UnknownCharacter(CharacterId),
}

/// What happened during one call to [`GameSession::take_turn`].
#[derive(Debug, Clone)]
pub struct TurnReport {
    pub narration: String,
    /// Set when the narrator failed and the fallback text was used.
    pub narration_error: Option<NarrationError>,
    /// `None` outside combat.
    pub advance: Option<TurnAdvance>,
}

impl TurnReport {
    pub fn used_fallback(&self) -> bool {
        self.narration_error.is_some()
    }

    pub fn combat_ended(&self) -> Option<&CombatResolution> {
        match &self.advance {
            Some(TurnAdvance::Ended(resolution)) => Some(resolution),
            _ => None,
        }
    }
}

pub struct GameSession {
    config: EngineConfig,
    store: SessionStore,
    party: Party,
    encounter: Option<Encounter>,
    dice: DiceEngine,
    narrator: Arc<dyn Narrator>,
}

impl GameSession {
    pub fn new(
        session_id: impl Into<String>,
        config: EngineConfig,
        backend: Arc<dyn SessionBackend>,
        narrator: Arc<dyn Narrator>,
    ) -> Self {
        let store = SessionStore::new(session_id, backend).with_autosave_every(config.autosave_every);
        Self {
            config,
            store,
            party: Party::new(),
            encounter: None,
            dice: DiceEngine::new(),
            narrator,
        }
    }

    /// Replace the dice engine, e.g. with a scripted one.
    pub fn with_dice(mut self, dice: DiceEngine) -> Self {
        self.dice = dice;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn session_id(&self) -> &str {
        self.store.session_id()
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Direct access to the story log and scene state.
    pub fn store_mut(&mut self) -> &mut SessionStore {
        &mut self.store
    }

    pub fn party(&self) -> &Party {
        &self.party
    }

    pub fn party_mut(&mut self) -> &mut Party {
        &mut self.party
    }

    pub fn add_character(&mut self, character: Character) -> CharacterId {
        self.party.insert(character)
    }

    pub fn encounter(&self) -> Option<&Encounter> {
        self.encounter.as_ref()
    }

    pub fn in_combat(&self) -> bool {
        self.encounter.as_ref().map(Encounter::is_active).unwrap_or(false)
    }

    pub fn dice_mut(&mut self) -> &mut DiceEngine {
        &mut self.dice
    }

    /// Context string for the narrator, using the configured window.
    pub fn context(&self) -> String {
        self.store.get_context(self.config.context_window)
    }

    // ---- turn pipeline ----------------------------------------------------

    pub async fn take_turn(&mut self, action: &str, roll: Option<RollSummary>) -> TurnReport {
        self.store.add_player_action(action, roll.as_ref()).await;

        let request = NarrationRequest::new(self.context(), action, roll);
        let narration = narrate(Arc::clone(&self.narrator), self.config.narration_timeout, &request).await;
        let (narration, narration_error) = match narration {
            Ok(text) => (text, None),
            Err(e) => {
                tracing::warn!(session = %self.session_id(), error = %e, "Narration failed, using fallback");
                (fallback_response(self.config.personality), Some(e))
            }
        };

        self.store
            .add_dm_response(narration.clone(), Some(self.config.personality.key()))
            .await;

        let advance = match self.encounter.as_mut() {
            Some(encounter) if encounter.is_active() => Some(encounter.next_turn()),
            _ => None,
        };
        if let Some(TurnAdvance::Ended(resolution)) = &advance {
            self.finish_encounter(resolution).await;
        }

        TurnReport {
            narration,
            narration_error,
            advance,
        }
    }

    // ---- dice -------------------------------------------------------------

    pub fn roll(&mut self, notation: &str) -> Result<DiceRollResult, SessionError> {
        Ok(self.dice.parse_and_roll(notation)?)
    }

    pub fn ability_check(
        &mut self,
        character: CharacterId,
        ability: &str,
        difficulty: i32,
        advantage: Advantage,
    ) -> Result<AbilityCheck, SessionError> {
        let ability: Ability = ability.parse()?;
        let character = self
            .party
            .get(character)
            .ok_or(SessionError::UnknownCharacter(character))?;
        Ok(character.make_ability_check(&mut self.dice, ability, difficulty, advantage))
    }

    // ---- combat -----------------------------------------------------------

    /// Start an encounter with the whole party against enemies from the
    /// bestiary.
    pub async fn start_combat(&mut self, name: &str, enemies: &[&str]) -> Result<&Encounter, SessionError> {
        if let Some(current) = self.encounter.as_ref().filter(|e| e.is_active()) {
            return Err(SessionError::CombatInProgress(current.name().to_string()));
        }

        let mut encounter = Encounter::new(name);
        for character in self.party.iter() {
            encounter.add_player(character)?;
        }
        for kind in enemies {
            encounter.add_enemy_from_template(kind, None)?;
        }
        encounter.start(&mut self.dice)?;

        self.store.start_combat(name).await;
        Ok(self.encounter.insert(encounter))
    }

    fn active_encounter(&mut self) -> Result<&mut Encounter, SessionError> {
        self.encounter
            .as_mut()
            .filter(|e| e.is_active())
            .ok_or(SessionError::NotInCombat)
    }

    pub fn attack(
        &mut self,
        attacker: &str,
        target: &str,
        damage: Option<&str>,
    ) -> Result<AttackOutcome, SessionError> {
        let dice = &mut self.dice;
        let encounter = self
            .encounter
            .as_mut()
            .filter(|e| e.is_active())
            .ok_or(SessionError::NotInCombat)?;
        let attacker_id = encounter
            .find(attacker)
            .ok_or_else(|| SessionError::UnknownCombatant(attacker.to_string()))?;
        let target_id = encounter
            .find(target)
            .ok_or_else(|| SessionError::UnknownCombatant(target.to_string()))?;

        Ok(encounter.attack(dice, attacker_id, target_id, damage.unwrap_or(DEFAULT_WEAPON_DAMAGE))?)
    }

    pub fn cast_spell(
        &mut self,
        caster: &str,
        spell: &str,
        targets: &[&str],
        effect: &SpellEffect,
    ) -> Result<SpellOutcome, SessionError> {
        let dice = &mut self.dice;
        let encounter = self
            .encounter
            .as_mut()
            .filter(|e| e.is_active())
            .ok_or(SessionError::NotInCombat)?;
        let caster_id = encounter
            .find(caster)
            .ok_or_else(|| SessionError::UnknownCombatant(caster.to_string()))?;
        let target_ids = targets
            .iter()
            .map(|t| encounter.find(t).ok_or_else(|| SessionError::UnknownCombatant(t.to_string())))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(encounter.cast_spell(dice, caster_id, spell, &target_ids, effect)?)
    }

    /// End the current encounter early.
    pub async fn end_combat(&mut self) -> Result<CombatResolution, SessionError> {
        let resolution = self.active_encounter()?.end_combat()?;
        self.finish_encounter(&resolution).await;
        Ok(resolution)
    }

    async fn finish_encounter(&mut self, resolution: &CombatResolution) {
        let synced = resolution.apply(&mut self.party);
        tracing::info!(
            session = %self.session_id(),
            encounter = %resolution.name,
            outcome = ?resolution.outcome,
            synced,
            "Encounter finished"
        );
        self.store.end_combat().await;
    }

    pub fn combat_status(&self) -> Option<CombatStatus> {
        self.encounter.as_ref().map(Encounter::status)
    }

    // ---- persistence ------------------------------------------------------

    pub async fn save(&mut self) -> Result<(), SessionError> {
        self.store.save().await?;
        tracing::info!(session = %self.session_id(), "Session saved");
        Ok(())
    }

    /// Replace the story state with the saved record, if any.
    ///
    /// Encounters are never persisted, so a record saved mid-fight comes back
    /// with its combat closed and a "Combat ended" event appended.
    pub async fn load(&mut self) -> Result<LoadStatus, SessionError> {
        Ok(self.restore().await?)
    }

    pub(crate) async fn restore(&mut self) -> Result<LoadStatus, PersistError> {
        let status = self.store.load().await?;
        if status == LoadStatus::Loaded {
            self.encounter = None;
            if self.store.in_combat() {
                tracing::warn!(
                    session = %self.session_id(),
                    encounter = ?self.store.state().current_encounter,
                    "Saved session was mid-combat; closing the encounter"
                );
                self.store.end_combat().await;
            }
        }
        Ok(status)
    }
}

async fn narrate(
    narrator: Arc<dyn Narrator>,
    timeout: std::time::Duration,
    request: &NarrationRequest,
) -> Result<String, NarrationError> {
    match tokio::time::timeout(timeout, narrator.narrate(request)).await {
        Ok(result) => result,
        Err(_) => Err(NarrationError::TimedOut),
    }
}

impl std::fmt::Debug for GameSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameSession")
            .field("store", &self.store)
            .field("party", &self.party.len())
            .field("in_combat", &self.in_combat())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::narrator::Personality;
    use crate::persist::MemoryBackend;
    use crate::story::EventKind;
    use crate::testing::{sample_fighter, FailingNarrator, ScriptedDice, ScriptedNarrator, SlowNarrator};
    use std::time::Duration;

    fn session(narrator: Arc<dyn Narrator>) -> GameSession {
        GameSession::new("table", EngineConfig::default(), Arc::new(MemoryBackend::new()), narrator)
    }

    #[tokio::test]
    async fn test_turn_order_of_events() {
        let narrator = Arc::new(ScriptedNarrator::new(["The chest creaks open."]));
        let mut game = session(narrator.clone());

        let report = game.take_turn("open the chest", Some(RollSummary::new("1d20", 12))).await;
        assert_eq!(report.narration, "The chest creaks open.");
        assert!(!report.used_fallback());
        assert!(report.advance.is_none());

        let kinds: Vec<_> = game.store().history().iter().map(|e| e.kind()).collect();
        assert_eq!(kinds, vec![EventKind::PlayerAction, EventKind::DiceRoll, EventKind::DmResponse]);
        assert_eq!(game.store().history()[2].metadata()["personality"], "serious");

        // The narrator sees the action it is answering.
        let requests = narrator.requests().await;
        assert!(requests[0].context.ends_with("Player: open the chest\nRoll: 1d20: 12"));
        assert_eq!(requests[0].roll, Some(RollSummary::new("1d20", 12)));
    }

    #[tokio::test]
    async fn test_failed_narration_uses_fallback() {
        let mut game = session(Arc::new(FailingNarrator));
        let report = game.take_turn("sing", None).await;
        assert!(report.used_fallback());
        assert_eq!(report.narration, fallback_response(Personality::Serious));
        assert_eq!(game.store().history().last().unwrap().content(), report.narration);
    }

    #[tokio::test]
    async fn test_slow_narration_times_out() {
        let config = EngineConfig::default().with_narration_timeout(Duration::from_millis(10));
        let mut game = GameSession::new(
            "slow",
            config,
            Arc::new(MemoryBackend::new()),
            Arc::new(SlowNarrator::new(Duration::from_secs(5))),
        );
        let report = game.take_turn("wait", None).await;
        assert_eq!(report.narration_error, Some(NarrationError::TimedOut));
        assert_eq!(game.store().history().len(), 2);
    }

    #[tokio::test]
    async fn test_combat_flow_syncs_party() {
        let mut game = session(Arc::new(ScriptedNarrator::default()))
            // initiative: hero 20, goblin 1; attack 20; damage 6+1 over two hits
            .with_dice(DiceEngine::with_source(ScriptedDice::new([20, 1, 20, 6, 20, 6])));
        let hero = game.add_character(sample_fighter("Hero"));

        game.start_combat("Goblin Ambush", &["goblin"]).await.unwrap();
        assert!(game.store().in_combat());
        assert!(matches!(
            game.start_combat("Again", &["orc"]).await,
            Err(SessionError::CombatInProgress(_))
        ));

        let outcome = game.attack("Hero", "Goblin", None).unwrap();
        assert!(outcome.hit);
        assert_eq!(outcome.damage, 6);
        game.take_turn("I swing again", None).await;

        let outcome = game.attack("Hero", "Goblin", None).unwrap();
        assert!(outcome.target_unconscious);

        let report = game.take_turn("I check the body", None).await;
        let resolution = report.combat_ended().expect("combat should end on the new round");
        assert_eq!(resolution.outcome, crate::combat::CombatOutcome::Victory);
        assert!(!game.in_combat());
        assert!(!game.store().in_combat());
        assert_eq!(game.party().get(hero).unwrap().health(), 12);
        assert_eq!(
            game.store().history().last().unwrap().content(),
            "Combat ended: Goblin Ambush"
        );
    }

    #[tokio::test]
    async fn test_attack_requires_combat_and_known_names() {
        let mut game = session(Arc::new(ScriptedNarrator::default()));
        assert!(matches!(game.attack("a", "b", None), Err(SessionError::NotInCombat)));

        game.add_character(sample_fighter("Hero"));
        game.start_combat("Cellar", &["wolf"]).await.unwrap();
        assert!(matches!(
            game.attack("Hero", "Dragon", None),
            Err(SessionError::UnknownCombatant(name)) if name == "Dragon"
        ));
    }

    #[tokio::test]
    async fn test_end_combat_early() {
        let mut game = session(Arc::new(ScriptedNarrator::default()));
        game.add_character(sample_fighter("Hero"));
        game.start_combat("Standoff", &["bandit"]).await.unwrap();
        let resolution = game.end_combat().await.unwrap();
        assert_eq!(resolution.outcome, crate::combat::CombatOutcome::Ended);
        assert!(matches!(game.end_combat().await, Err(SessionError::NotInCombat)));
    }

    #[tokio::test]
    async fn test_unknown_enemy_type() {
        let mut game = session(Arc::new(ScriptedNarrator::default()));
        let err = game.start_combat("Nope", &["beholder"]).await.unwrap_err();
        assert!(matches!(err, SessionError::Encounter(EncounterError::Bestiary(_))));
        assert!(!game.store().in_combat());
    }

    #[test]
    fn test_roll_and_ability_check() {
        let mut game = session(Arc::new(ScriptedNarrator::default()))
            .with_dice(DiceEngine::with_source(ScriptedDice::new([3, 4, 10])));
        let hero = game.add_character(sample_fighter("Hero"));

        assert_eq!(game.roll("2d6+1").unwrap().total(), 8);
        assert!(matches!(game.roll("lots"), Err(SessionError::Dice(DiceError::InvalidDiceNotation(_)))));

        let check = game.ability_check(hero, "str", 13, Advantage::Normal).unwrap();
        assert_eq!(check.roll.total(), 13);
        assert!(check.success);
        assert!(matches!(
            game.ability_check(hero, "luck", 10, Advantage::Normal),
            Err(SessionError::Character(CharacterError::UnknownAbility(_)))
        ));
    }
}
