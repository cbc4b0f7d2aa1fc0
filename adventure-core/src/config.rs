//! Engine configuration.

use crate::narrator::Personality;
use crate::store::DEFAULT_AUTOSAVE_EVERY;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Configuration shared by every session an engine runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Directory holding one JSON record per session.
    pub sessions_dir: PathBuf,

    /// Appended events between automatic saves. Zero disables autosave.
    pub autosave_every: u32,

    /// Number of story events included in the narrator's context.
    pub context_window: usize,

    /// How long to wait for the narrator before using the fallback text.
    pub narration_timeout: Duration,

    /// Narrator voice.
    pub personality: Personality,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sessions_dir: PathBuf::from("sessions"),
            autosave_every: DEFAULT_AUTOSAVE_EVERY,
            context_window: 10,
            narration_timeout: Duration::from_secs(30),
            personality: Personality::Serious,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read overrides from the environment, loading `.env` first if present.
    ///
    /// - `ADVENTURE_SESSIONS_DIR`
    /// - `ADVENTURE_AUTOSAVE_EVERY`
    /// - `ADVENTURE_CONTEXT_WINDOW`
    /// - `ADVENTURE_NARRATION_TIMEOUT_SECS`
    /// - `ADVENTURE_PERSONALITY`
    ///
    /// Values that don't parse are ignored with a warning.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(dir) = lookup("ADVENTURE_SESSIONS_DIR").filter(|d| !d.trim().is_empty()) {
            config.sessions_dir = PathBuf::from(dir);
        }
        if let Some(every) = parse_var(&lookup, "ADVENTURE_AUTOSAVE_EVERY") {
            config.autosave_every = every;
        }
        if let Some(window) = parse_var(&lookup, "ADVENTURE_CONTEXT_WINDOW") {
            config.context_window = window;
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "ADVENTURE_NARRATION_TIMEOUT_SECS") {
            config.narration_timeout = Duration::from_secs(secs);
        }
        if let Some(personality) = parse_var(&lookup, "ADVENTURE_PERSONALITY") {
            config.personality = personality;
        }

        config
    }

    pub fn with_sessions_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.sessions_dir = dir.into();
        self
    }

    pub fn with_autosave_every(mut self, every: u32) -> Self {
        self.autosave_every = every;
        self
    }

    pub fn with_context_window(mut self, events: usize) -> Self {
        self.context_window = events;
        self
    }

    pub fn with_narration_timeout(mut self, timeout: Duration) -> Self {
        self.narration_timeout = timeout;
        self
    }

    pub fn with_personality(mut self, personality: Personality) -> Self {
        self.personality = personality;
        self
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(key, value = %raw, error = %e, "Ignoring invalid config value");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_builder() {
        let config = EngineConfig::new()
            .with_sessions_dir("/tmp/saves")
            .with_autosave_every(5)
            .with_context_window(4)
            .with_personality(Personality::Chaotic);

        assert_eq!(config.sessions_dir, PathBuf::from("/tmp/saves"));
        assert_eq!(config.autosave_every, 5);
        assert_eq!(config.context_window, 4);
        assert_eq!(config.personality, Personality::Chaotic);
        assert_eq!(config.narration_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_from_lookup() {
        let config = EngineConfig::from_lookup(lookup(&[
            ("ADVENTURE_SESSIONS_DIR", "data/sessions"),
            ("ADVENTURE_AUTOSAVE_EVERY", "6"),
            ("ADVENTURE_NARRATION_TIMEOUT_SECS", "5"),
            ("ADVENTURE_PERSONALITY", "mysterious"),
        ]));
        assert_eq!(config.sessions_dir, PathBuf::from("data/sessions"));
        assert_eq!(config.autosave_every, 6);
        assert_eq!(config.context_window, 10);
        assert_eq!(config.narration_timeout, Duration::from_secs(5));
        assert_eq!(config.personality, Personality::Mysterious);
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = EngineConfig::from_lookup(lookup(&[
            ("ADVENTURE_AUTOSAVE_EVERY", "often"),
            ("ADVENTURE_PERSONALITY", "grumpy"),
        ]));
        assert_eq!(config, EngineConfig::default());
    }
}
