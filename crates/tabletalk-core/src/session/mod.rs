//! Session state and the turn loop
//!
//! A session owns the ordered message history, the optional pending
//! confirmation, and the turn counter. The controller in
//! [`controller`] drives turns against it.

pub mod controller;
pub mod persistence;
pub mod truncate;

pub use controller::{SessionController, TurnReply};
pub use persistence::SavedSession;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::gate::PendingConfirmation;
use crate::message::{Message, verify_pairing};

/// Where the controller is in the turn lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Ready for the next user message
    Idle,
    /// A suspended invocation is waiting on a yes/no reply
    AwaitingConfirmation,
    /// A turn is in flight
    Processing,
}

/// One conversation: seed, history, and confirmation bookkeeping
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Seed text, kept separately so reset can rebuild the history
    pub seed: String,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_confirmation: Option<PendingConfirmation>,
    /// Completed turns since creation or the last reset
    pub turns: usize,
}

impl Session {
    /// Start a fresh session seeded with the given system text
    pub fn new(seed: impl Into<String>) -> Self {
        let seed = seed.into();
        Self {
            messages: vec![Message::system(seed.clone())],
            seed,
            pending_confirmation: None,
            turns: 0,
        }
    }

    /// Clear history back to the seed, dropping any pending confirmation
    pub fn reset(&mut self) {
        self.messages = vec![Message::system(self.seed.clone())];
        self.pending_confirmation = None;
        self.turns = 0;
    }

    /// Rebuild a session from a persisted transcript, verifying the
    /// request/result pairing first
    pub fn restore(seed: impl Into<String>, messages: Vec<Message>) -> Result<Self> {
        verify_pairing(&messages)?;
        let seed = seed.into();
        let messages = if messages.is_empty() {
            vec![Message::system(seed.clone())]
        } else {
            messages
        };
        Ok(Self {
            seed,
            messages,
            pending_confirmation: None,
            turns: 0,
        })
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::CapabilityOutcome;

    #[test]
    fn test_new_session_has_seed() {
        let session = Session::new("rules");
        assert_eq!(session.len(), 1);
        assert!(matches!(session.messages[0], Message::System { .. }));
    }

    #[test]
    fn test_reset_restores_seed_only() {
        let mut session = Session::new("rules");
        session.push(Message::user("hi"));
        session.push(Message::assistant("hello"));
        session.turns = 1;

        session.reset();
        assert_eq!(session.len(), 1);
        assert_eq!(session.turns, 0);
        assert_eq!(session.messages[0].content_as_text(), "rules");
    }

    #[test]
    fn test_restore_rejects_broken_pairing() {
        let messages = vec![
            Message::system("rules"),
            Message::capability_result("list_records", "orphan", CapabilityOutcome::ok(None)),
        ];
        assert!(Session::restore("rules", messages).is_err());
    }
}
