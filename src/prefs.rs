//! Persisted client preferences.
//!
//! Only the last used player name survives between sessions, so joining a
//! lobby doesn't need to ask for it again.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::PrefsError;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preferences {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_player_name: Option<String>,
}

/// Somewhere preferences can be loaded from and saved to.
pub trait PreferenceStore {
    fn load(&self) -> Result<Preferences, PrefsError>;
    fn save(&mut self, prefs: &Preferences) -> Result<(), PrefsError>;
}

/// In-memory store; forgets everything when dropped.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    prefs: Preferences,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_player_name(name: impl Into<String>) -> Self {
        Self {
            prefs: Preferences {
                last_player_name: Some(name.into()),
            },
        }
    }
}

impl PreferenceStore for MemoryStore {
    fn load(&self) -> Result<Preferences, PrefsError> {
        Ok(self.prefs.clone())
    }

    fn save(&mut self, prefs: &Preferences) -> Result<(), PrefsError> {
        self.prefs = prefs.clone();
        Ok(())
    }
}

/// JSON file store. A missing file reads as empty preferences.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PreferenceStore for JsonFileStore {
    fn load(&self) -> Result<Preferences, PrefsError> {
        match fs::read_to_string(&self.path) {
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No preferences file yet");
                Ok(Preferences::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn save(&mut self, prefs: &Preferences) -> Result<(), PrefsError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(prefs)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_memory_store() {
        let mut store = MemoryStore::new();
        assert_eq!(store.load().unwrap(), Preferences::default());

        let prefs = Preferences {
            last_player_name: Some("Ada".to_string()),
        };
        store.save(&prefs).unwrap();
        assert_eq!(store.load().unwrap(), prefs);
    }

    #[test]
    fn test_json_file_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = JsonFileStore::new(dir.path().join("nested").join("prefs.json"));

        // Missing file is not an error
        assert_eq!(store.load().unwrap(), Preferences::default());

        store
            .save(&Preferences {
                last_player_name: Some("Ada".to_string()),
            })
            .unwrap();

        let reopened = JsonFileStore::new(store.path());
        assert_eq!(
            reopened.load().unwrap().last_player_name.as_deref(),
            Some("Ada")
        );
    }

    #[test]
    fn test_json_file_store_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.json");
        fs::write(&path, "{not json").unwrap();

        let store = JsonFileStore::new(&path);
        assert!(matches!(store.load(), Err(PrefsError::Json(_))));
    }
}
