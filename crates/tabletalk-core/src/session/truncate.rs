//! History truncation
//!
//! Keeps the seed message plus a bounded tail of recent messages, widening
//! the cut when it would land inside a request/result pair. Runs after every
//! completed turn so cost stays proportional to the tail, not the session.

use tracing::debug;

use crate::message::Message;

/// Truncate `messages` in place to the seed plus roughly `tail` recent
/// messages.
///
/// If the tail would start at a `CapabilityResult` whose requesting
/// assistant message lies before the cut, the cut moves back to that
/// assistant message so the pair survives intact. The seed (a leading
/// `System` message) is always kept.
pub fn truncate(messages: &mut Vec<Message>, tail: usize) {
    let head = usize::from(matches!(messages.first(), Some(Message::System { .. })));
    if messages.len() <= head + tail {
        return;
    }

    let mut cut = messages.len() - tail;

    // Ids produced by assistant messages inside the kept tail; a result with
    // any other id is orphaned by this cut
    let mut kept_ids: Vec<&str> = Vec::new();
    for msg in &messages[cut..] {
        match msg {
            Message::Assistant { requests, .. } if !requests.is_empty() => {
                kept_ids.extend(requests.iter().map(|r| r.request_id.as_str()));
            }
            Message::CapabilityResult { request_id, .. } => {
                if !kept_ids.iter().any(|id| *id == request_id.as_str()) {
                    // Widen to include the requesting assistant message
                    let requester = messages[head..cut]
                        .iter()
                        .rposition(|m| !m.requests().is_empty())
                        .map(|pos| head + pos);
                    if let Some(idx) = requester {
                        debug!(from = cut, to = idx, "widening truncation cut to keep pairing");
                        cut = idx;
                    }
                    break;
                }
            }
            Message::User { .. } => break,
            _ => {}
        }
    }

    messages.drain(head..cut);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::CapabilityOutcome;
    use crate::message::{CapabilityRequest, verify_pairing};

    fn request(id: &str) -> CapabilityRequest {
        CapabilityRequest::with_id(id, "list_records", serde_json::json!({}))
    }

    fn result(id: &str) -> Message {
        Message::capability_result("list_records", id, CapabilityOutcome::ok(None))
    }

    fn exchange(n: usize) -> Vec<Message> {
        vec![
            Message::user(format!("question {n}")),
            Message::assistant(format!("answer {n}")),
        ]
    }

    #[test]
    fn test_short_history_untouched() {
        let mut messages = vec![Message::system("seed"), Message::user("hi")];
        truncate(&mut messages, 16);
        assert_eq!(messages.len(), 2);
    }

    #[test]
    fn test_plain_truncation_keeps_seed_and_tail() {
        let mut messages = vec![Message::system("seed")];
        for n in 0..10 {
            messages.extend(exchange(n));
        }
        truncate(&mut messages, 4);

        assert_eq!(messages.len(), 5);
        assert!(matches!(messages[0], Message::System { .. }));
        assert_eq!(messages[1].content_as_text(), "question 8");
    }

    #[test]
    fn test_cut_inside_pair_widens_to_requesting_assistant() {
        let mut messages = vec![Message::system("seed")];
        for n in 0..5 {
            messages.extend(exchange(n));
        }
        messages.push(Message::user("list everything"));
        messages.push(Message::assistant_with_requests("", vec![request("a"), request("b")]));
        messages.push(result("a"));
        messages.push(result("b"));
        messages.push(Message::assistant("here you go"));

        // A tail of 3 starts at result("b"), orphaning the pair
        truncate(&mut messages, 3);

        assert!(verify_pairing(&messages).is_ok());
        assert!(!messages[1].requests().is_empty());
        assert_eq!(messages.len(), 5);
    }

    #[test]
    fn test_tail_with_complete_pair_not_widened() {
        let mut messages = vec![Message::system("seed")];
        for n in 0..5 {
            messages.extend(exchange(n));
        }
        messages.push(Message::user("list everything"));
        messages.push(Message::assistant_with_requests("", vec![request("a")]));
        messages.push(result("a"));
        messages.push(Message::assistant("here you go"));

        truncate(&mut messages, 4);

        assert!(verify_pairing(&messages).is_ok());
        assert_eq!(messages.len(), 5);
        assert_eq!(messages[1].content_as_text(), "list everything");
    }

    #[test]
    fn test_pairing_holds_across_repeated_truncation() {
        let mut messages = vec![Message::system("seed")];
        for n in 0..20 {
            messages.push(Message::user(format!("turn {n}")));
            let id = format!("r{n}");
            messages.push(Message::assistant_with_requests("", vec![request(&id)]));
            messages.push(result(&id));
            messages.push(Message::assistant(format!("done {n}")));
            truncate(&mut messages, 6);
            assert!(verify_pairing(&messages).is_ok());
            assert!(messages.len() <= 1 + 6 + 3);
        }
    }

    #[test]
    fn test_no_seed_history() {
        let mut messages = Vec::new();
        for n in 0..6 {
            messages.extend(exchange(n));
        }
        truncate(&mut messages, 4);
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].content_as_text(), "question 4");
    }
}
