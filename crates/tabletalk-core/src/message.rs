//! Conversation messages
//!
//! `Message` is a closed tagged union over the four roles a transcript can
//! contain. Router logic pattern-matches exhaustively instead of probing for
//! attributes, and the pairing rule between capability requests and their
//! results is checked by [`verify_pairing`].

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::capability::CapabilityOutcome;
use crate::error::{Error, Result};

/// A single capability invocation requested by the decision model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityRequest {
    /// Unique id pairing this request with its result message
    pub request_id: String,
    /// Name of the capability to invoke
    pub capability: String,
    /// Arguments as provided by the model (validated at dispatch time)
    #[serde(default)]
    pub arguments: serde_json::Value,
}

impl CapabilityRequest {
    /// Create a request with a fresh id
    pub fn new(capability: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            capability: capability.into(),
            arguments,
        }
    }

    /// Create a request with a caller-supplied id (e.g. the provider's call id)
    pub fn with_id(
        request_id: impl Into<String>,
        capability: impl Into<String>,
        arguments: serde_json::Value,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            capability: capability.into(),
            arguments,
        }
    }
}

/// One entry in a session's ordered message history
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Message {
    /// The seed message carrying the capability catalogue and operating rules
    System { content: String },
    /// User input
    User { content: String },
    /// Assistant output; `requests` is non-empty when the model asked to
    /// invoke capabilities instead of (or alongside) answering
    Assistant {
        content: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        requests: Vec<CapabilityRequest>,
    },
    /// Structured result of one capability invocation, matched to its
    /// request by `request_id`
    CapabilityResult {
        capability: String,
        request_id: String,
        payload: CapabilityOutcome,
    },
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self::System {
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::User {
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::Assistant {
            content: content.into(),
            requests: Vec::new(),
        }
    }

    pub fn assistant_with_requests(
        content: impl Into<String>,
        requests: Vec<CapabilityRequest>,
    ) -> Self {
        Self::Assistant {
            content: content.into(),
            requests,
        }
    }

    pub fn capability_result(
        capability: impl Into<String>,
        request_id: impl Into<String>,
        payload: CapabilityOutcome,
    ) -> Self {
        Self::CapabilityResult {
            capability: capability.into(),
            request_id: request_id.into(),
            payload,
        }
    }

    /// Text content for display/logging
    pub fn content_as_text(&self) -> String {
        match self {
            Self::System { content } | Self::User { content } => content.clone(),
            Self::Assistant { content, .. } => content.clone(),
            Self::CapabilityResult { payload, .. } => {
                serde_json::to_string(payload).unwrap_or_default()
            }
        }
    }

    /// Capability requests carried by an assistant message (empty otherwise)
    pub fn requests(&self) -> &[CapabilityRequest] {
        match self {
            Self::Assistant { requests, .. } => requests,
            _ => &[],
        }
    }
}

/// Check the tool-call pairing invariant over a message sequence.
///
/// Every assistant message carrying capability requests must be immediately
/// followed by one `CapabilityResult` per request (matched by `request_id`)
/// before any other user/assistant message, and no result may appear without
/// its requesting assistant message. Used when restoring persisted sessions
/// and asserted by the truncation tests.
pub fn verify_pairing(messages: &[Message]) -> Result<()> {
    let mut i = 0;
    while i < messages.len() {
        match &messages[i] {
            Message::Assistant { requests, .. } if !requests.is_empty() => {
                let mut expected: HashSet<&str> =
                    requests.iter().map(|r| r.request_id.as_str()).collect();
                let mut j = i + 1;
                while !expected.is_empty() {
                    match messages.get(j) {
                        Some(Message::CapabilityResult { request_id, .. }) => {
                            if !expected.remove(request_id.as_str()) {
                                return Err(Error::Session(format!(
                                    "capability result '{request_id}' does not match a pending request"
                                )));
                            }
                            j += 1;
                        }
                        _ => {
                            return Err(Error::Session(format!(
                                "assistant message at index {i} is missing {} capability result(s)",
                                expected.len()
                            )));
                        }
                    }
                }
                i = j;
            }
            Message::CapabilityResult { request_id, .. } => {
                return Err(Error::Session(format!(
                    "orphan capability result '{request_id}' at index {i}"
                )));
            }
            _ => i += 1,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::CapabilityOutcome;

    fn request(id: &str) -> CapabilityRequest {
        CapabilityRequest::with_id(id, "create_record", serde_json::json!({}))
    }

    fn result(id: &str) -> Message {
        Message::capability_result("create_record", id, CapabilityOutcome::ok(None))
    }

    #[test]
    fn test_serde_round_trip() {
        let msg = Message::assistant_with_requests("", vec![request("r1")]);
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"role\":\"assistant\""));

        let back: Message = serde_json::from_str(&json).unwrap();
        match back {
            Message::Assistant { requests, .. } => assert_eq!(requests[0].request_id, "r1"),
            _ => panic!("expected assistant message"),
        }
    }

    #[test]
    fn test_pairing_ok() {
        let messages = vec![
            Message::system("seed"),
            Message::user("create a project"),
            Message::assistant_with_requests("", vec![request("a"), request("b")]),
            result("b"),
            result("a"),
            Message::assistant("done"),
        ];
        assert!(verify_pairing(&messages).is_ok());
    }

    #[test]
    fn test_pairing_missing_result() {
        let messages = vec![
            Message::user("hi"),
            Message::assistant_with_requests("", vec![request("a")]),
            Message::assistant("done"),
        ];
        assert!(verify_pairing(&messages).is_err());
    }

    #[test]
    fn test_pairing_orphan_result() {
        let messages = vec![Message::user("hi"), result("a")];
        assert!(verify_pairing(&messages).is_err());
    }

    #[test]
    fn test_pairing_mismatched_id() {
        let messages = vec![
            Message::assistant_with_requests("", vec![request("a")]),
            result("z"),
        ];
        assert!(verify_pairing(&messages).is_err());
    }
}
