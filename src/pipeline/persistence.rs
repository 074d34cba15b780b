// Session save/load; the binary calls these on startup and on quit
use std::path::{Path, PathBuf};

use crate::pipeline::session::SessionState;

const FRETLAB_DIR: &str = ".fretlab";
const SESSION_FILE: &str = "session.json";

// <session_dir>/.fretlab/session.json
pub fn session_file_path(session_dir: &Path) -> PathBuf {
    session_dir.join(FRETLAB_DIR).join(SESSION_FILE)
}

// Missing or unreadable files give None; the caller starts fresh
pub fn load_session(session_dir: &Path) -> Option<SessionState> {
    let path = session_file_path(session_dir);
    let data = std::fs::read_to_string(&path).ok()?;
    match serde_json::from_str::<SessionState>(&data) {
        Ok(mut state) => {
            state.sanitize();
            Some(state)
        }
        Err(e) => {
            log::warn!("ignoring unreadable session {}: {e}", path.display());
            None
        }
    }
}

// Save the session, making .fretlab/ if it doesn't exist yet
pub fn save_session(session_dir: &Path, state: &SessionState) -> anyhow::Result<()> {
    let path = session_file_path(session_dir);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(state)?;
    std::fs::write(&path, json)?;
    log::info!("session saved to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = SessionState::default();
        state.bpm = 96.0;
        state.effects_preset = "hall".into();
        save_session(dir.path(), &state).unwrap();
        assert!(dir.path().join(".fretlab").join("session.json").exists());
        assert_eq!(load_session(dir.path()), Some(state));
    }

    #[test]
    fn test_missing_or_corrupt_session() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(load_session(dir.path()), None);
        let path = session_file_path(dir.path());
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{ nope").unwrap();
        assert_eq!(load_session(dir.path()), None);
    }

    #[test]
    fn test_partial_file_gets_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = session_file_path(dir.path());
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, r#"{ "bpm": 100.0 }"#).unwrap();
        let state = load_session(dir.path()).unwrap();
        assert_eq!(state.bpm, 100.0);
        assert_eq!(state.parts.len(), 5);
    }
}
