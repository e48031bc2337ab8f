//! Pairing token persistence.
//!
//! The meeting client hands out a token once the user approves this device,
//! and rotates it with `tokenRefresh` frames. The latest value is written to
//! disk on every change and read back at startup so a restart does not
//! require pairing again.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenState {
    #[serde(rename = "token", default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

/// Shared, file-backed token holder. Clones share the same state.
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: Option<PathBuf>,
    state: Arc<Mutex<TokenState>>,
}

impl TokenStore {
    /// Read the token file, starting empty when it does not exist or cannot be parsed.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let state = match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<TokenState>(&content) {
                Ok(state) => {
                    info!(
                        "Loaded pairing token from {:?} (token present: {})",
                        path,
                        state.access_token.is_some()
                    );
                    state
                }
                Err(e) => {
                    warn!("Ignoring unreadable token file {:?}: {}", path, e);
                    TokenState::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No token file at {:?}, device is not paired yet", path);
                TokenState::default()
            }
            Err(e) => {
                warn!("Failed to read token file {:?}: {}", path, e);
                TokenState::default()
            }
        };

        Self {
            path: Some(path),
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// A store that never touches disk.
    pub fn in_memory(state: TokenState) -> Self {
        Self {
            path: None,
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn snapshot(&self) -> TokenState {
        self.lock().clone()
    }

    pub fn access_token(&self) -> Option<String> {
        self.lock().access_token.clone()
    }

    /// Store a token received through `tokenRefresh` and persist it.
    pub fn update_access_token(&self, token: &str) -> Result<()> {
        let state = {
            let mut state = self.lock();
            if state.access_token.as_deref() == Some(token) {
                return Ok(());
            }
            state.access_token = Some(token.to_string());
            state.clone()
        };
        info!("Pairing token refreshed");
        self.persist(&state)
    }

    /// Forget the access token, e.g. after the meeting client rejected it.
    pub fn clear_access_token(&self) -> Result<()> {
        let state = {
            let mut state = self.lock();
            if state.access_token.take().is_none() {
                return Ok(());
            }
            state.clone()
        };
        info!("Pairing token cleared");
        self.persist(&state)
    }

    pub fn clear(&self) -> Result<()> {
        let state = {
            let mut state = self.lock();
            *state = TokenState::default();
            state.clone()
        };
        self.persist(&state)
    }

    fn persist(&self, state: &TokenState) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create token directory")?;
        }

        let content = serde_json::to_string_pretty(state).context("Failed to serialize token")?;
        let staging = path.with_extension("json.tmp");
        std::fs::write(&staging, content).context("Failed to write token file")?;
        std::fs::rename(&staging, path).context("Failed to replace token file")?;

        debug!("Token state written to {:?}", path);
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, TokenState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::load(dir.path().join("token.json"));
        assert_eq!(store.snapshot(), TokenState::default());
    }

    #[test]
    fn test_update_persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");

        let store = TokenStore::load(&path);
        store.update_access_token("abc-123").unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["token"], "abc-123");

        let reloaded = TokenStore::load(&path);
        assert_eq!(reloaded.access_token().as_deref(), Some("abc-123"));
    }

    #[test]
    fn test_refresh_token_survives_access_token_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        std::fs::write(&path, r#"{"token":"old","refreshToken":"r-1"}"#).unwrap();

        let store = TokenStore::load(&path);
        store.update_access_token("new").unwrap();
        store.clear_access_token().unwrap();

        let reloaded = TokenStore::load(&path).snapshot();
        assert_eq!(reloaded.access_token, None);
        assert_eq!(reloaded.refresh_token.as_deref(), Some("r-1"));
    }

    #[test]
    fn test_clones_share_state() {
        let store = TokenStore::in_memory(TokenState::default());
        let other = store.clone();
        other.update_access_token("shared").unwrap();
        assert_eq!(store.access_token().as_deref(), Some("shared"));
    }

    #[test]
    fn test_corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(TokenStore::load(&path).access_token().is_none());
    }
}
