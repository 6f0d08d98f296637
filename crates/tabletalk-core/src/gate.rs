//! Confirmation gate
//!
//! Inspects capability outcomes for suspension flags and manages the yes/no
//! workflow that follows. The gate is pure bookkeeping: it parses replies,
//! renders prompts, and on an affirmative reply produces the corrected
//! arguments for re-invocation. The controller owns the actual state.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::capability::CapabilityOutcome;
use crate::message::CapabilityRequest;

/// Why an invocation was suspended
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConfirmationKind {
    /// A field value did not validate exactly but a close match exists
    Field {
        field: String,
        user_value: String,
        suggested_value: String,
        valid_options: Vec<String>,
    },
    /// The capability wants a go-ahead before proceeding as-is
    Generic { reason: String },
}

/// A suspended invocation waiting on the user's yes/no
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingConfirmation {
    pub capability: String,
    pub arguments: Value,
    pub kind: ConfirmationKind,
}

/// Inspect one invocation outcome for suspension flags.
///
/// Field confirmation takes precedence when a capability sets both flags.
pub fn inspect(request: &CapabilityRequest, outcome: &CapabilityOutcome) -> Option<PendingConfirmation> {
    if outcome.requires_field_confirmation {
        let kind = ConfirmationKind::Field {
            field: outcome.field.clone().unwrap_or_default(),
            user_value: outcome.user_value.clone().unwrap_or_default(),
            suggested_value: outcome.suggested_value.clone().unwrap_or_default(),
            valid_options: outcome.valid_options.clone(),
        };
        return Some(PendingConfirmation {
            capability: request.capability.clone(),
            arguments: request.arguments.clone(),
            kind,
        });
    }

    if outcome.requires_confirmation {
        let reason = outcome
            .message
            .clone()
            .unwrap_or_else(|| "This operation needs your confirmation.".to_string());
        return Some(PendingConfirmation {
            capability: request.capability.clone(),
            arguments: request.arguments.clone(),
            kind: ConfirmationKind::Generic { reason },
        });
    }

    None
}

/// Classification of a user reply while a confirmation is pending
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    Affirmative,
    Negative,
    Unrecognized,
}

const AFFIRMATIVE: &[&str] = &["yes", "y", "proceed", "ok", "confirm"];
const NEGATIVE: &[&str] = &["no", "n", "cancel", "abort"];

/// Parse a raw user reply. Matching is case-insensitive on the trimmed
/// input; anything outside the two vocabularies is unrecognized.
pub fn parse_reply(input: &str) -> Reply {
    let normalized = input.trim().to_lowercase();
    if AFFIRMATIVE.contains(&normalized.as_str()) {
        Reply::Affirmative
    } else if NEGATIVE.contains(&normalized.as_str()) {
        Reply::Negative
    } else {
        Reply::Unrecognized
    }
}

/// Render the question shown when an invocation first suspends
pub fn render_prompt(pending: &PendingConfirmation) -> String {
    match &pending.kind {
        ConfirmationKind::Field {
            field,
            user_value,
            suggested_value,
            valid_options,
        } => {
            let options = if valid_options.is_empty() {
                String::new()
            } else {
                format!(" Valid options are: {}.", valid_options.join(", "))
            };
            format!(
                "'{user_value}' is not a valid value for {field}. \
                 Did you mean '{suggested_value}'?{options} (yes/no)"
            )
        }
        ConfirmationKind::Generic { reason } => format!("{reason} (yes/no)"),
    }
}

/// Render the reminder shown when a reply was not recognized
pub fn render_reprompt(pending: &PendingConfirmation) -> String {
    let subject = match &pending.kind {
        ConfirmationKind::Field {
            field,
            suggested_value,
            ..
        } => format!("use '{suggested_value}' for {field}"),
        ConfirmationKind::Generic { .. } => "proceed".to_string(),
    };
    format!(
        "I still need a yes or no: should I {subject}? \
         Reply 'yes' to continue or 'no' to cancel."
    )
}

/// What the controller should do after a reply to a pending confirmation
#[derive(Debug, Clone)]
pub enum ResumeAction {
    /// Re-invoke the capability with corrected arguments
    Reinvoke {
        capability: String,
        arguments: Value,
        /// Short transcript note recording the user's consent
        note: String,
    },
    /// Drop the pending invocation
    Cancelled { note: String },
    /// Ask again; the confirmation stays pending
    Reprompt { prompt: String },
}

/// Resolve a pending confirmation against a user reply.
///
/// On an affirmative field reply the suggested value replaces the user's
/// original one: inside the `data` object when the arguments carry one,
/// at the top level otherwise. Generic confirmations get a `confirmed`
/// flag so the capability skips its own gate on the second pass.
pub fn resume(pending: &PendingConfirmation, reply: Reply) -> ResumeAction {
    match reply {
        Reply::Affirmative => match &pending.kind {
            ConfirmationKind::Field {
                field,
                suggested_value,
                ..
            } => {
                let mut arguments = pending.arguments.clone();
                patch_field(&mut arguments, field, suggested_value);
                ResumeAction::Reinvoke {
                    capability: pending.capability.clone(),
                    arguments,
                    note: format!("Yes, use '{suggested_value}' for {field}."),
                }
            }
            ConfirmationKind::Generic { .. } => {
                let mut arguments = pending.arguments.clone();
                if let Some(obj) = arguments.as_object_mut() {
                    obj.insert("confirmed".to_string(), json!(true));
                }
                ResumeAction::Reinvoke {
                    capability: pending.capability.clone(),
                    arguments,
                    note: "Yes, proceed.".to_string(),
                }
            }
        },
        Reply::Negative => ResumeAction::Cancelled {
            note: "Okay, I've cancelled that operation. Nothing was changed.".to_string(),
        },
        Reply::Unrecognized => ResumeAction::Reprompt {
            prompt: render_reprompt(pending),
        },
    }
}

fn patch_field(arguments: &mut Value, field: &str, value: &str) {
    if let Some(data) = arguments.get_mut("data").and_then(Value::as_object_mut) {
        data.insert(field.to_string(), json!(value));
        return;
    }
    if let Some(obj) = arguments.as_object_mut() {
        obj.insert(field.to_string(), json!(value));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field_pending() -> PendingConfirmation {
        PendingConfirmation {
            capability: "create_record".to_string(),
            arguments: json!({
                "table": "projects",
                "data": { "name": "Atlas", "status": "in progress" }
            }),
            kind: ConfirmationKind::Field {
                field: "status".to_string(),
                user_value: "in progress".to_string(),
                suggested_value: "In progress".to_string(),
                valid_options: vec!["Planned".to_string(), "In progress".to_string()],
            },
        }
    }

    #[test]
    fn test_parse_reply_vocabularies() {
        assert_eq!(parse_reply("  YES "), Reply::Affirmative);
        assert_eq!(parse_reply("proceed"), Reply::Affirmative);
        assert_eq!(parse_reply("ok"), Reply::Affirmative);
        assert_eq!(parse_reply("N"), Reply::Negative);
        assert_eq!(parse_reply("abort"), Reply::Negative);
        assert_eq!(parse_reply("maybe"), Reply::Unrecognized);
        assert_eq!(parse_reply("yes please"), Reply::Unrecognized);
        // Punctuation is not stripped; only the bare words match
        assert_eq!(parse_reply("ok!"), Reply::Unrecognized);
        assert_eq!(parse_reply("yes."), Reply::Unrecognized);
    }

    #[test]
    fn test_inspect_field_takes_precedence() {
        let request = CapabilityRequest::with_id("r1", "create_record", json!({}));
        let mut outcome = CapabilityOutcome::needs_field_confirmation(
            "status",
            "in progress",
            "In progress",
            vec![],
            "did you mean",
        );
        outcome.requires_confirmation = true;

        let pending = inspect(&request, &outcome).unwrap();
        assert!(matches!(pending.kind, ConfirmationKind::Field { .. }));
    }

    #[test]
    fn test_inspect_clear() {
        let request = CapabilityRequest::with_id("r1", "read_record", json!({}));
        assert!(inspect(&request, &CapabilityOutcome::ok(None)).is_none());
    }

    #[test]
    fn test_affirmative_patches_data_field() {
        let action = resume(&field_pending(), Reply::Affirmative);
        match action {
            ResumeAction::Reinvoke { arguments, .. } => {
                assert_eq!(arguments["data"]["status"], "In progress");
                assert_eq!(arguments["data"]["name"], "Atlas");
            }
            other => panic!("unexpected action: {other:?}"),
        }
    }

    #[test]
    fn test_affirmative_patches_top_level_when_no_data() {
        let pending = PendingConfirmation {
            arguments: json!({ "table": "projects", "status": "done" }),
            ..field_pending()
        };
        match resume(&pending, Reply::Affirmative) {
            ResumeAction::Reinvoke { arguments, .. } => {
                assert_eq!(arguments["status"], "In progress");
            }
            other => panic!("unexpected action: {other:?}"),
        }
    }

    #[test]
    fn test_generic_affirmative_sets_confirmed() {
        let pending = PendingConfirmation {
            capability: "create_record".to_string(),
            arguments: json!({ "table": "projects", "data": {} }),
            kind: ConfirmationKind::Generic {
                reason: "No name given. Create anyway?".to_string(),
            },
        };
        match resume(&pending, Reply::Affirmative) {
            ResumeAction::Reinvoke { arguments, .. } => {
                assert_eq!(arguments["confirmed"], true);
            }
            other => panic!("unexpected action: {other:?}"),
        }
    }

    #[test]
    fn test_negative_cancels() {
        assert!(matches!(
            resume(&field_pending(), Reply::Negative),
            ResumeAction::Cancelled { .. }
        ));
    }

    #[test]
    fn test_unrecognized_reprompts() {
        match resume(&field_pending(), Reply::Unrecognized) {
            ResumeAction::Reprompt { prompt } => assert!(prompt.contains("yes or no")),
            other => panic!("unexpected action: {other:?}"),
        }
    }

    #[test]
    fn test_prompt_mentions_options() {
        let prompt = render_prompt(&field_pending());
        assert!(prompt.contains("In progress"));
        assert!(prompt.contains("Valid options"));
    }
}
