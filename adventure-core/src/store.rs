//! Session state: the append-only story log, context building for the
//! narrator, and save/load through a [`SessionBackend`].

use crate::dice::RollSummary;
use crate::persist::{PersistError, SessionBackend};
use crate::story::{EventKind, Metadata, StoryEvent};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Location every new session starts in.
pub const DEFAULT_LOCATION: &str = "Starting Village";

/// Default number of appended events between automatic saves.
pub const DEFAULT_AUTOSAVE_EVERY: u32 = 3;

fn default_location() -> String {
    DEFAULT_LOCATION.to_string()
}

/// Everything persisted for a session. Serializes as the durable record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub session_id: String,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub last_saved: Option<DateTime<Utc>>,
    #[serde(default)]
    pub turn_count: u32,
    #[serde(default = "default_location")]
    pub current_location: String,
    #[serde(default)]
    pub active_npcs: Vec<String>,
    #[serde(default)]
    pub current_scene: String,
    #[serde(default)]
    pub session_notes: Vec<String>,
    #[serde(default)]
    pub in_combat: bool,
    #[serde(default)]
    pub current_encounter: Option<String>,
    #[serde(default)]
    pub story_history: Vec<StoryEvent>,
}

impl SessionState {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            created_at: Utc::now(),
            last_saved: None,
            turn_count: 0,
            current_location: default_location(),
            active_npcs: Vec::new(),
            current_scene: String::new(),
            session_notes: Vec::new(),
            in_combat: false,
            current_encounter: None,
            story_history: Vec::new(),
        }
    }
}

/// Result of [`SessionStore::load`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStatus {
    Loaded,
    /// No record exists; the in-memory state is untouched.
    NotFound,
}

/// Lightweight listing entry for a saved session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub last_saved: Option<DateTime<Utc>>,
    pub turn_count: u32,
    pub current_location: String,
}

impl From<&SessionState> for SessionSummary {
    fn from(state: &SessionState) -> Self {
        Self {
            session_id: state.session_id.clone(),
            created_at: state.created_at,
            last_saved: state.last_saved,
            turn_count: state.turn_count,
            current_location: state.current_location.clone(),
        }
    }
}

/// Summaries of every readable session record, most recently saved first.
/// Records that fail to read or parse are skipped.
pub async fn list_sessions(backend: &dyn SessionBackend) -> Result<Vec<SessionSummary>, PersistError> {
    let mut sessions = Vec::new();
    for key in backend.list().await? {
        let contents = match backend.read(&key).await {
            Ok(Some(contents)) => contents,
            Ok(None) => continue,
            Err(e) => {
                tracing::debug!(key, error = %e, "Skipping unreadable session record");
                continue;
            }
        };
        match serde_json::from_str::<SessionState>(&contents) {
            Ok(state) => sessions.push(SessionSummary::from(&state)),
            Err(e) => tracing::debug!(key, error = %e, "Skipping unparsable session record"),
        }
    }

    sessions.sort_by(|a, b| b.last_saved.cmp(&a.last_saved));
    Ok(sessions)
}

/// One session's story log plus the backend it persists to.
pub struct SessionStore {
    state: SessionState,
    backend: Arc<dyn SessionBackend>,
    autosave_every: u32,
}

impl SessionStore {
    pub fn new(session_id: impl Into<String>, backend: Arc<dyn SessionBackend>) -> Self {
        Self {
            state: SessionState::new(session_id),
            backend,
            autosave_every: DEFAULT_AUTOSAVE_EVERY,
        }
    }

    /// Save automatically whenever the turn counter hits a multiple of
    /// `every`. Zero turns autosave off.
    pub fn with_autosave_every(mut self, every: u32) -> Self {
        self.autosave_every = every;
        self
    }

    pub fn session_id(&self) -> &str {
        &self.state.session_id
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn history(&self) -> &[StoryEvent] {
        &self.state.story_history
    }

    pub fn turn_count(&self) -> u32 {
        self.state.turn_count
    }

    pub fn in_combat(&self) -> bool {
        self.state.in_combat
    }

    // ---- story log --------------------------------------------------------

    /// Append an event and bump the turn counter. Autosave failures are
    /// logged, never returned.
    pub async fn add_story_event(&mut self, kind: EventKind, content: impl Into<String>, metadata: Option<Metadata>) {
        let event = StoryEvent::new(kind, content, metadata.unwrap_or_default());
        self.state.story_history.push(event);
        self.state.turn_count += 1;

        if self.autosave_every > 0 && self.state.turn_count % self.autosave_every == 0 {
            match self.save().await {
                Ok(()) => tracing::debug!(session = %self.state.session_id, turn = self.state.turn_count, "Autosaved"),
                Err(e) => tracing::warn!(session = %self.state.session_id, error = %e, "Autosave failed"),
            }
        }
    }

    /// Record a player action, followed by its dice roll if there was one.
    pub async fn add_player_action(&mut self, action: impl Into<String>, roll: Option<&RollSummary>) {
        let mut metadata = Metadata::new();
        if let Some(roll) = roll {
            metadata.insert("dice_result".into(), Value::Object(roll_metadata(roll)));
        }
        self.add_story_event(EventKind::PlayerAction, action, Some(metadata)).await;

        if let Some(roll) = roll {
            self.add_story_event(EventKind::DiceRoll, roll.to_string(), Some(roll_metadata(roll)))
                .await;
        }
    }

    pub async fn add_dm_response(&mut self, response: impl Into<String>, personality: Option<&str>) {
        let mut metadata = Metadata::new();
        if let Some(personality) = personality {
            metadata.insert("personality".into(), Value::from(personality));
        }
        self.add_story_event(EventKind::DmResponse, response, Some(metadata)).await;
    }

    /// Transcript handed to the narrator: a header describing the scene, a
    /// blank line, then the last `last_n` events oldest first. With no
    /// history (or `last_n == 0`) the header and blank line are still returned.
    pub fn get_context(&self, last_n: usize) -> String {
        let state = &self.state;
        let mut lines = Vec::new();

        if !state.current_location.is_empty() {
            lines.push(format!("Current Location: {}", state.current_location));
        }
        if !state.current_scene.is_empty() {
            lines.push(format!("Current Scene: {}", state.current_scene));
        }
        if !state.active_npcs.is_empty() {
            lines.push(format!("Active NPCs: {}", state.active_npcs.join(", ")));
        }
        if state.in_combat {
            lines.push("Status: Currently in combat".to_string());
        }
        lines.push(String::new());

        let start = state.story_history.len().saturating_sub(last_n);
        lines.extend(state.story_history[start..].iter().map(|e| e.to_string()));
        lines.join("\n")
    }

    // ---- scene ------------------------------------------------------------

    pub async fn start_combat(&mut self, encounter: impl Into<String>) {
        let encounter = encounter.into();
        self.state.in_combat = true;
        self.state.current_encounter = Some(encounter.clone());
        self.add_story_event(EventKind::System, format!("Combat started: {}", encounter), None)
            .await;
    }

    /// Does nothing unless combat is in progress.
    pub async fn end_combat(&mut self) {
        if !self.state.in_combat {
            return;
        }
        let encounter = self
            .state
            .current_encounter
            .take()
            .unwrap_or_else(|| "Unknown encounter".to_string());
        self.state.in_combat = false;
        self.add_story_event(EventKind::System, format!("Combat ended: {}", encounter), None)
            .await;
    }

    pub fn set_location(&mut self, location: impl Into<String>) {
        self.state.current_location = location.into();
    }

    pub fn set_scene(&mut self, scene: impl Into<String>) {
        self.state.current_scene = scene.into();
    }

    /// Returns false if the NPC was already active.
    pub fn add_npc(&mut self, name: impl Into<String>) -> bool {
        let name = name.into();
        if self.state.active_npcs.contains(&name) {
            return false;
        }
        self.state.active_npcs.push(name);
        true
    }

    pub fn remove_npc(&mut self, name: &str) -> bool {
        let before = self.state.active_npcs.len();
        self.state.active_npcs.retain(|n| n != name);
        self.state.active_npcs.len() != before
    }

    pub fn add_note(&mut self, note: impl Into<String>) {
        self.state.session_notes.push(note.into());
    }

    // ---- persistence ------------------------------------------------------

    /// Write the full state, including the whole story log.
    pub async fn save(&mut self) -> Result<(), PersistError> {
        let previous = self.state.last_saved.replace(Utc::now());
        let result = match serde_json::to_string_pretty(&self.state) {
            Ok(contents) => self.backend.write(&self.state.session_id, &contents).await,
            Err(e) => Err(e.into()),
        };
        if result.is_err() {
            self.state.last_saved = previous;
        }
        result
    }

    /// Replace the in-memory state with the stored record, if any.
    ///
    /// A record that exists but can't be parsed is reported as
    /// [`PersistError::Corrupted`] and the in-memory state is left alone.
    pub async fn load(&mut self) -> Result<LoadStatus, PersistError> {
        let session_id = self.state.session_id.clone();
        let Some(contents) = self.backend.read(&session_id).await? else {
            tracing::debug!(session = %session_id, "No saved session");
            return Ok(LoadStatus::NotFound);
        };

        let mut loaded: SessionState = serde_json::from_str(&contents).map_err(|e| {
            tracing::warn!(session = %session_id, error = %e, "Session record is corrupted");
            PersistError::Corrupted {
                session_id: session_id.clone(),
                reason: e.to_string(),
            }
        })?;
        loaded.session_id = session_id;
        self.state = loaded;
        tracing::info!(
            session = %self.state.session_id,
            events = self.state.story_history.len(),
            "Session loaded"
        );
        Ok(LoadStatus::Loaded)
    }

    pub async fn session_exists(&self) -> Result<bool, PersistError> {
        self.backend.exists(&self.state.session_id).await
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("session_id", &self.state.session_id)
            .field("turn_count", &self.state.turn_count)
            .field("autosave_every", &self.autosave_every)
            .finish_non_exhaustive()
    }
}

fn roll_metadata(roll: &RollSummary) -> Metadata {
    let mut metadata = Metadata::new();
    metadata.insert("description".into(), Value::from(roll.description.as_str()));
    metadata.insert("total".into(), Value::from(roll.total));
    metadata
}
