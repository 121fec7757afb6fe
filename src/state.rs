use std::path::PathBuf;

use async_trait::async_trait;
use tracing::debug;

use spinneret_core::{CrawlError, SavedState, StateStore};

/// File-backed state store: one JSON document per session key under a
/// directory. The reference implementation of the persistence seam; anything
/// else (a database, an object store) plugs in through the same trait.
pub struct JsonStateStore {
    dir: PathBuf,
}

impl JsonStateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, session_key: &str) -> PathBuf {
        let safe: String = session_key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{safe}.json"))
    }
}

#[async_trait]
impl StateStore for JsonStateStore {
    async fn load_state(&self, session_key: &str) -> Result<Option<SavedState>, CrawlError> {
        let path = self.path_for(session_key);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(CrawlError::State {
                    op: "load",
                    session_key: session_key.to_string(),
                    cause: e.to_string(),
                })
            }
        };
        let state = serde_json::from_slice(&bytes).map_err(|e| CrawlError::State {
            op: "load",
            session_key: session_key.to_string(),
            cause: format!("corrupt state file {}: {e}", path.display()),
        })?;
        debug!(session_key, path = %path.display(), "state loaded");
        Ok(Some(state))
    }

    async fn save_state(&self, session_key: &str, state: &SavedState) -> Result<(), CrawlError> {
        let wrap = |e: std::io::Error| CrawlError::State {
            op: "save",
            session_key: session_key.to_string(),
            cause: e.to_string(),
        };
        tokio::fs::create_dir_all(&self.dir).await.map_err(wrap)?;
        let path = self.path_for(session_key);
        let bytes = serde_json::to_vec_pretty(state).map_err(|e| CrawlError::State {
            op: "save",
            session_key: session_key.to_string(),
            cause: e.to_string(),
        })?;
        // Write-then-rename so a crash never leaves a torn state file.
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &bytes).await.map_err(wrap)?;
        tokio::fs::rename(&tmp, &path).await.map_err(wrap)?;
        debug!(session_key, path = %path.display(), "state saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store(tag: &str) -> (JsonStateStore, PathBuf) {
        let dir = std::env::temp_dir().join(format!("spinneret-state-{tag}-{}", std::process::id()));
        (JsonStateStore::new(&dir), dir)
    }

    #[tokio::test]
    async fn round_trips_saved_state() {
        let (store, dir) = temp_store("roundtrip");
        let state = SavedState {
            pending_urls: vec!["https://ex.com/a".into()],
            visited_urls: vec!["https://ex.com/".into(), "https://ex.com/b".into()],
        };
        store.save_state("session-1", &state).await.unwrap();
        let loaded = store.load_state("session-1").await.unwrap().unwrap();
        assert_eq!(loaded.pending_urls, state.pending_urls);
        assert_eq!(loaded.visited_urls, state.visited_urls);
        let _ = tokio::fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn missing_session_loads_as_none() {
        let (store, dir) = temp_store("missing");
        assert!(store.load_state("nope").await.unwrap().is_none());
        let _ = tokio::fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn session_keys_are_sanitized_into_filenames() {
        let (store, dir) = temp_store("sanitize");
        let state = SavedState::default();
        store.save_state("a/b c:d", &state).await.unwrap();
        assert!(store.load_state("a/b c:d").await.unwrap().is_some());
        let _ = tokio::fs::remove_dir_all(&dir).await;
    }
}
