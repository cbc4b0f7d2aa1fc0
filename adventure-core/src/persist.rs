//! Durable storage for session records and characters.
//!
//! Session records are opaque JSON strings keyed by session id; the
//! [`SessionBackend`] trait only moves those strings around. Parsing and
//! version handling live with the types being stored.

use crate::character::Character;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tokio::sync::RwLock;

/// Errors from persistence operations.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A record exists but could not be read back.
    #[error("Session record '{session_id}' is corrupted: {reason}")]
    Corrupted { session_id: String, reason: String },

    #[error("Version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },
}

/// Keyed storage for raw session records.
#[async_trait]
pub trait SessionBackend: Send + Sync {
    /// Store `contents` under `key`, replacing any previous record.
    async fn write(&self, key: &str, contents: &str) -> Result<(), PersistError>;

    /// `Ok(None)` when no record exists.
    async fn read(&self, key: &str) -> Result<Option<String>, PersistError>;

    /// Keys of every stored record, in no particular order.
    async fn list(&self) -> Result<Vec<String>, PersistError>;

    async fn exists(&self, key: &str) -> Result<bool, PersistError> {
        Ok(self.read(key).await?.is_some())
    }
}

/// Replace anything that isn't alphanumeric, `-` or `_` so keys are safe as
/// file names.
///
/// The mapping is lossy: `a/b` and `a_b` share a file. Keys that already use
/// only those characters map to themselves, and applying it twice changes
/// nothing, so stems returned by `list` read back the same record.
pub fn sanitize_key(key: &str) -> String {
    key.chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

// ============================================================================
// JSON files
// ============================================================================

/// One `<key>.json` file per record under a directory.
///
/// Keys go through [`sanitize_key`], so two ids that differ only in
/// punctuation address the same file.
#[derive(Debug, Clone)]
pub struct JsonFileBackend {
    dir: PathBuf,
}

impl JsonFileBackend {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", sanitize_key(key)))
    }
}

#[async_trait]
impl SessionBackend for JsonFileBackend {
    async fn write(&self, key: &str, contents: &str) -> Result<(), PersistError> {
        fs::create_dir_all(&self.dir).await?;
        fs::write(self.path_for(key), contents).await?;
        Ok(())
    }

    async fn read(&self, key: &str) -> Result<Option<String>, PersistError> {
        match fs::read_to_string(self.path_for(key)).await {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self) -> Result<Vec<String>, PersistError> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut keys = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().map(|e| e == "json").unwrap_or(false) {
                if let Some(stem) = path.file_stem() {
                    keys.push(stem.to_string_lossy().to_string());
                }
            }
        }
        Ok(keys)
    }

    async fn exists(&self, key: &str) -> Result<bool, PersistError> {
        Ok(fs::try_exists(self.path_for(key)).await?)
    }
}

// ============================================================================
// In memory
// ============================================================================

/// Records held in a map. Useful for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    records: RwLock<HashMap<String, String>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a record verbatim, bypassing serialization.
    pub async fn insert_raw(&self, key: impl Into<String>, contents: impl Into<String>) {
        self.records.write().await.insert(key.into(), contents.into());
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }
}

#[async_trait]
impl SessionBackend for MemoryBackend {
    async fn write(&self, key: &str, contents: &str) -> Result<(), PersistError> {
        self.records
            .write()
            .await
            .insert(key.to_string(), contents.to_string());
        Ok(())
    }

    async fn read(&self, key: &str) -> Result<Option<String>, PersistError> {
        Ok(self.records.read().await.get(key).cloned())
    }

    async fn list(&self) -> Result<Vec<String>, PersistError> {
        Ok(self.records.read().await.keys().cloned().collect())
    }
}

// ============================================================================
// Characters
// ============================================================================

/// Current character save version.
const CHARACTER_SAVE_VERSION: u32 = 1;

/// A character saved on its own, outside any session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedCharacter {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    pub character: Character,
}

impl SavedCharacter {
    pub fn new(character: Character) -> Self {
        Self {
            version: CHARACTER_SAVE_VERSION,
            saved_at: Utc::now(),
            character,
        }
    }

    pub async fn save_json(&self, path: impl AsRef<Path>) -> Result<(), PersistError> {
        let content = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(path, content).await?;
        Ok(())
    }

    pub async fn load_json(path: impl AsRef<Path>) -> Result<Self, PersistError> {
        let content = fs::read_to_string(path).await?;
        let saved: Self = serde_json::from_str(&content)?;

        if saved.version != CHARACTER_SAVE_VERSION {
            return Err(PersistError::VersionMismatch {
                expected: CHARACTER_SAVE_VERSION,
                found: saved.version,
            });
        }

        Ok(saved)
    }
}

/// Default file name for a character save.
pub fn character_save_path(base_dir: impl AsRef<Path>, name: &str) -> PathBuf {
    base_dir
        .as_ref()
        .join(format!("{}_character.json", sanitize_key(name)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sample_fighter;
    use tempfile::TempDir;

    #[test]
    fn test_sanitize_key() {
        assert_eq!(sanitize_key("channel-42"), "channel-42");
        assert_eq!(sanitize_key("../etc/passwd"), "___etc_passwd");
        assert_eq!(sanitize_key("guild:123 chan"), "guild_123_chan");
    }

    #[tokio::test]
    async fn test_punctuation_variants_share_a_file() {
        let temp = TempDir::new().unwrap();
        let backend = JsonFileBackend::new(temp.path());
        assert_eq!(sanitize_key("a/b"), sanitize_key("a_b"));
        assert_eq!(sanitize_key(&sanitize_key("guild/#1")), sanitize_key("guild/#1"));

        backend.write("a/b", "{}").await.unwrap();
        assert_eq!(backend.read("a_b").await.unwrap().as_deref(), Some("{}"));
        assert_eq!(backend.list().await.unwrap(), vec!["a_b"]);
    }

    #[tokio::test]
    async fn test_json_backend_roundtrip() {
        let temp = TempDir::new().unwrap();
        let backend = JsonFileBackend::new(temp.path().join("sessions"));

        assert_eq!(backend.read("abc").await.unwrap(), None);
        assert!(!backend.exists("abc").await.unwrap());
        assert!(backend.list().await.unwrap().is_empty());

        backend.write("abc", "{\"a\": 1}").await.unwrap();
        assert_eq!(backend.read("abc").await.unwrap().as_deref(), Some("{\"a\": 1}"));
        assert!(backend.exists("abc").await.unwrap());
        assert!(backend.path_for("abc").ends_with("abc.json"));
        assert_eq!(backend.list().await.unwrap(), vec!["abc".to_string()]);
    }

    #[tokio::test]
    async fn test_json_backend_ignores_other_files() {
        let temp = TempDir::new().unwrap();
        let backend = JsonFileBackend::new(temp.path());
        backend.write("one", "{}").await.unwrap();
        tokio::fs::write(temp.path().join("notes.txt"), "hello").await.unwrap();
        assert_eq!(backend.list().await.unwrap(), vec!["one".to_string()]);
    }

    #[tokio::test]
    async fn test_memory_backend() {
        let backend = MemoryBackend::new();
        backend.write("x", "1").await.unwrap();
        backend.insert_raw("y", "2").await;
        assert_eq!(backend.len().await, 2);
        assert_eq!(backend.read("y").await.unwrap().as_deref(), Some("2"));
        assert!(backend.exists("x").await.unwrap());
        assert!(!backend.exists("z").await.unwrap());
    }

    #[tokio::test]
    async fn test_character_save_load() {
        let temp = TempDir::new().unwrap();
        let mut character = sample_fighter("Thorin");
        character.add_item("Rope");
        character.gain_experience(1500);
        let path = character_save_path(temp.path(), &character.name);

        SavedCharacter::new(character.clone()).save_json(&path).await.unwrap();
        let loaded = SavedCharacter::load_json(&path).await.unwrap();

        assert_eq!(loaded.character.id, character.id);
        assert_eq!(loaded.character.level(), 2);
        assert_eq!(loaded.character.max_health(), character.max_health());
        assert!(loaded.character.has_item("Rope"));
    }

    #[tokio::test]
    async fn test_character_version_mismatch() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("old.json");
        let mut saved = SavedCharacter::new(sample_fighter("Old"));
        saved.version = 99;
        saved.save_json(&path).await.unwrap();

        let err = SavedCharacter::load_json(&path).await.unwrap_err();
        assert!(matches!(err, PersistError::VersionMismatch { expected: 1, found: 99 }));
    }
}
