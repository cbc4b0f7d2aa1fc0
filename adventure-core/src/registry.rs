//! Keyed registry of independent game sessions.
//!
//! Each session sits behind its own mutex, so at most one mutating
//! operation runs per session while different sessions proceed in
//! parallel. The registry lock is only held to look up or insert entries.

use crate::config::EngineConfig;
use crate::game::GameSession;
use crate::narrator::Narrator;
use crate::persist::{JsonFileBackend, PersistError, SessionBackend};
use crate::store::LoadStatus;
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

pub type SharedSession = Arc<Mutex<GameSession>>;

pub struct SessionRegistry {
    config: EngineConfig,
    backend: Arc<dyn SessionBackend>,
    narrator: Arc<dyn Narrator>,
    sessions: RwLock<HashMap<String, SharedSession>>,
}

impl SessionRegistry {
    pub fn new(config: EngineConfig, backend: Arc<dyn SessionBackend>, narrator: Arc<dyn Narrator>) -> Self {
        Self {
            config,
            backend,
            narrator,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Registry persisting to JSON files under `config.sessions_dir`.
    pub fn with_json_files(config: EngineConfig, narrator: Arc<dyn Narrator>) -> Self {
        let backend = Arc::new(JsonFileBackend::new(config.sessions_dir.clone()));
        Self::new(config, backend, narrator)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn backend(&self) -> Arc<dyn SessionBackend> {
        Arc::clone(&self.backend)
    }

    /// Get a session, creating it and loading any saved state on first use.
    ///
    /// A corrupted record is returned as an error and nothing is registered.
    pub async fn session(&self, id: &str) -> Result<SharedSession, PersistError> {
        if let Some(session) = self.sessions.read().await.get(id) {
            return Ok(Arc::clone(session));
        }

        let mut session = GameSession::new(
            id,
            self.config.clone(),
            Arc::clone(&self.backend),
            Arc::clone(&self.narrator),
        );
        match session.restore().await? {
            LoadStatus::Loaded => tracing::info!(session = id, "Resumed saved session"),
            LoadStatus::NotFound => tracing::debug!(session = id, "Starting new session"),
        }

        // Another caller may have won the race while we were loading.
        let mut sessions = self.sessions.write().await;
        let entry = sessions
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(session)));
        Ok(Arc::clone(entry))
    }

    pub async fn get(&self, id: &str) -> Option<SharedSession> {
        self.sessions.read().await.get(id).cloned()
    }

    /// Drop a session from the registry without saving it.
    pub async fn remove(&self, id: &str) -> Option<SharedSession> {
        self.sessions.write().await.remove(id)
    }

    /// Ids of the live sessions, sorted.
    pub async fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Save every live session concurrently. Returns each session's result,
    /// sorted by id.
    pub async fn save_all(&self) -> Vec<(String, Result<(), PersistError>)> {
        let sessions: Vec<(String, SharedSession)> = self
            .sessions
            .read()
            .await
            .iter()
            .map(|(id, s)| (id.clone(), Arc::clone(s)))
            .collect();

        let mut results = join_all(sessions.into_iter().map(|(id, session)| async move {
            let result = session.lock().await.store_mut().save().await;
            if let Err(e) = &result {
                tracing::warn!(session = %id, error = %e, "Failed to save session");
            }
            (id, result)
        }))
        .await;
        results.sort_by(|a, b| a.0.cmp(&b.0));
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persist::MemoryBackend;
    use crate::testing::ScriptedNarrator;

    fn registry() -> (SessionRegistry, Arc<MemoryBackend>) {
        let backend = Arc::new(MemoryBackend::new());
        let registry = SessionRegistry::new(
            EngineConfig::default(),
            backend.clone(),
            Arc::new(ScriptedNarrator::default()),
        );
        (registry, backend)
    }

    #[tokio::test]
    async fn test_same_id_same_session() {
        let (registry, _) = registry();
        let a = registry.session("channel-1").await.unwrap();
        let b = registry.session("channel-1").await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        registry.session("channel-2").await.unwrap();
        assert_eq!(registry.ids().await, vec!["channel-1", "channel-2"]);
    }

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let (registry, _) = registry();
        let a = registry.session("a").await.unwrap();
        let b = registry.session("b").await.unwrap();

        a.lock().await.take_turn("look", None).await;
        assert_eq!(a.lock().await.store().turn_count(), 2);
        assert_eq!(b.lock().await.store().turn_count(), 0);
    }

    #[tokio::test]
    async fn test_hydrates_saved_state() {
        let (registry, backend) = registry();
        {
            let session = registry.session("saved").await.unwrap();
            let mut session = session.lock().await;
            session.store_mut().set_location("Lighthouse");
            session.save().await.unwrap();
        }
        registry.remove("saved").await;
        assert!(registry.is_empty().await);

        let session = registry.session("saved").await.unwrap();
        assert_eq!(session.lock().await.store().state().current_location, "Lighthouse");
        assert_eq!(backend.len().await, 1);
    }

    #[tokio::test]
    async fn test_corrupted_record_not_registered() {
        let (registry, backend) = registry();
        backend.insert_raw("bad", "not json").await;
        assert!(matches!(registry.session("bad").await, Err(PersistError::Corrupted { .. })));
        assert!(registry.get("bad").await.is_none());
    }

    #[tokio::test]
    async fn test_save_all() {
        let (registry, backend) = registry();
        registry.session("one").await.unwrap();
        registry.session("two").await.unwrap();

        let results = registry.save_all().await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0, "one");
        assert!(results.iter().all(|(_, r)| r.is_ok()));
        assert_eq!(backend.len().await, 2);
    }

    #[tokio::test]
    async fn test_concurrent_turns_across_sessions() {
        let (registry, _) = registry();
        let registry = Arc::new(registry);

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let registry = Arc::clone(&registry);
                tokio::spawn(async move {
                    let session = registry.session(&format!("table-{}", i)).await.unwrap();
                    let mut session = session.lock().await;
                    for _ in 0..3 {
                        session.take_turn("wait", None).await;
                    }
                    session.store().turn_count()
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.await.unwrap(), 6);
        }
        assert_eq!(registry.len().await, 4);
    }
}
