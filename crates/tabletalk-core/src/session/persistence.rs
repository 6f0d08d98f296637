//! Session persistence
//!
//! Sessions are saved as JSON transcripts under the platform data directory
//! and re-verified for request/result pairing on load, so a corrupted or
//! hand-edited file cannot put the controller into an invalid state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{Error, Result};
use crate::gate::PendingConfirmation;
use crate::message::Message;

use super::Session;

/// A session transcript as stored on disk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedSession {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub seed: String,
    pub messages: Vec<Message>,
    /// Suspended confirmation, when the session was saved mid-question
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_confirmation: Option<PendingConfirmation>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SavedSession {
    /// Snapshot a live session under the given id
    pub fn from_session(id: impl Into<String>, session: &Session) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: None,
            seed: session.seed.clone(),
            messages: session.messages.clone(),
            pending_confirmation: session.pending_confirmation.clone(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Rebuild a live session, verifying the pairing invariant. A pending
    /// confirmation saved with the transcript comes back with it, so the
    /// next user message is still routed through the gate.
    pub fn into_session(self) -> Result<Session> {
        let mut session = Session::restore(self.seed, self.messages)?;
        session.pending_confirmation = self.pending_confirmation;
        Ok(session)
    }
}

/// Directory where session files live
pub fn sessions_dir() -> Result<PathBuf> {
    let base = dirs::data_dir()
        .ok_or_else(|| Error::Session("could not determine data directory".to_string()))?;
    Ok(base.join("tabletalk").join("sessions"))
}

fn session_path(dir: &Path, id: &str) -> PathBuf {
    dir.join(format!("{id}.json"))
}

/// Write a session snapshot into `dir`, creating it as needed
pub fn save(dir: &Path, saved: &SavedSession) -> Result<()> {
    std::fs::create_dir_all(dir)?;
    let path = session_path(dir, &saved.id);
    let json = serde_json::to_string_pretty(saved)?;
    std::fs::write(&path, json)?;
    debug!(path = %path.display(), "session saved");
    Ok(())
}

/// Load a session snapshot by id
pub fn load(dir: &Path, id: &str) -> Result<SavedSession> {
    let path = session_path(dir, id);
    let json = std::fs::read_to_string(&path)?;
    Ok(serde_json::from_str(&json)?)
}

/// List saved session ids, newest first by update time
pub fn list(dir: &Path) -> Result<Vec<SavedSession>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut sessions = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if entry.path().extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let json = std::fs::read_to_string(entry.path())?;
        match serde_json::from_str::<SavedSession>(&json) {
            Ok(saved) => sessions.push(saved),
            Err(e) => debug!(path = %entry.path().display(), error = %e, "skipping unreadable session file"),
        }
    }
    sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
    Ok(sessions)
}

/// Delete a saved session by id
pub fn delete(dir: &Path, id: &str) -> Result<()> {
    std::fs::remove_file(session_path(dir, id))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::CapabilityOutcome;

    fn sample_session() -> Session {
        let mut session = Session::new("rules");
        session.push(Message::user("hi"));
        session.push(Message::assistant("hello"));
        session
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let saved = SavedSession::from_session("abc", &sample_session());
        save(dir.path(), &saved).unwrap();

        let loaded = load(dir.path(), "abc").unwrap();
        assert_eq!(loaded.id, "abc");
        let session = loaded.into_session().unwrap();
        assert_eq!(session.len(), 3);
        assert_eq!(session.seed, "rules");
    }

    #[test]
    fn test_pending_confirmation_survives_round_trip() {
        use crate::gate::ConfirmationKind;
        use serde_json::json;

        let dir = tempfile::tempdir().unwrap();
        let mut session = sample_session();
        session.pending_confirmation = Some(PendingConfirmation {
            capability: "create_record".to_string(),
            arguments: json!({ "table": "projects", "data": { "status": "in progress" } }),
            kind: ConfirmationKind::Field {
                field: "status".to_string(),
                user_value: "in progress".to_string(),
                suggested_value: "In progress".to_string(),
                valid_options: vec!["Planned".to_string(), "In progress".to_string()],
            },
        });

        save(dir.path(), &SavedSession::from_session("held", &session)).unwrap();
        let restored = load(dir.path(), "held").unwrap().into_session().unwrap();

        let pending = restored.pending_confirmation.expect("pending kept");
        assert_eq!(pending.capability, "create_record");
        assert!(matches!(pending.kind, ConfirmationKind::Field { .. }));
    }

    #[test]
    fn test_load_rejects_broken_pairing() {
        let dir = tempfile::tempdir().unwrap();
        let mut saved = SavedSession::from_session("bad", &sample_session());
        saved.messages.push(Message::capability_result(
            "lookup",
            "dangling",
            CapabilityOutcome::ok(None),
        ));
        save(dir.path(), &saved).unwrap();

        let loaded = load(dir.path(), "bad").unwrap();
        assert!(loaded.into_session().is_err());
    }

    #[test]
    fn test_list_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        save(dir.path(), &SavedSession::from_session("one", &sample_session())).unwrap();
        save(dir.path(), &SavedSession::from_session("two", &sample_session())).unwrap();

        let sessions = list(dir.path()).unwrap();
        assert_eq!(sessions.len(), 2);

        delete(dir.path(), "one").unwrap();
        assert_eq!(list(dir.path()).unwrap().len(), 1);
    }

    #[test]
    fn test_list_missing_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(list(&dir.path().join("nope")).unwrap().is_empty());
    }
}
