//! Scripted adapter for tests and offline development.
//!
//! Replays queued outcomes in order, recording how many calls of each kind
//! were made so tests can assert on routing behavior.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::capability::CapabilitySpec;
use crate::error::{Error, Result};
use crate::message::{CapabilityRequest, Message};

use super::{DecisionAdapter, DecisionOutcome};

/// One scripted streaming reply
enum StreamScript {
    /// Emit these chunks, then finish with their concatenation
    Chunks(Vec<String>),
    /// Emit these chunks, then fail mid-stream
    FailAfter(Vec<String>, String),
}

#[derive(Default)]
pub struct ScriptedAdapter {
    decisions: Mutex<VecDeque<Result<DecisionOutcome>>>,
    streams: Mutex<VecDeque<StreamScript>>,
    peeks: Mutex<VecDeque<bool>>,
    presentations: Mutex<VecDeque<Result<String>>>,
    decide_calls: AtomicUsize,
    stream_calls: AtomicUsize,
    peek_calls: AtomicUsize,
    present_calls: AtomicUsize,
}

impl ScriptedAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a direct-answer decision
    pub fn push_direct(&self, text: impl Into<String>) {
        self.decisions
            .lock()
            .push_back(Ok(DecisionOutcome::Direct(text.into())));
    }

    /// Queue an invoke decision
    pub fn push_invoke(&self, requests: Vec<CapabilityRequest>) {
        self.decisions
            .lock()
            .push_back(Ok(DecisionOutcome::Invoke(requests)));
    }

    /// Queue a decision failure
    pub fn push_failure(&self, reason: impl Into<String>) {
        self.decisions
            .lock()
            .push_back(Err(Error::Adapter(reason.into())));
    }

    /// Queue a streaming reply delivered as the given chunks
    pub fn push_stream(&self, chunks: &[&str]) {
        self.streams.lock().push_back(StreamScript::Chunks(
            chunks.iter().map(|c| c.to_string()).collect(),
        ));
    }

    /// Queue a streaming reply that fails after emitting the given chunks
    pub fn push_stream_failure(&self, chunks: &[&str], reason: impl Into<String>) {
        self.streams.lock().push_back(StreamScript::FailAfter(
            chunks.iter().map(|c| c.to_string()).collect(),
            reason.into(),
        ));
    }

    /// Queue a peek verdict (`true` = capability path)
    pub fn push_peek(&self, needs_capability: bool) {
        self.peeks.lock().push_back(needs_capability);
    }

    /// Queue a presentation rewrite
    pub fn push_presentation(&self, text: impl Into<String>) {
        self.presentations.lock().push_back(Ok(text.into()));
    }

    /// Queue a presentation failure
    pub fn push_presentation_failure(&self, reason: impl Into<String>) {
        self.presentations
            .lock()
            .push_back(Err(Error::Adapter(reason.into())));
    }

    pub fn decide_calls(&self) -> usize {
        self.decide_calls.load(Ordering::SeqCst)
    }

    pub fn stream_calls(&self) -> usize {
        self.stream_calls.load(Ordering::SeqCst)
    }

    pub fn peek_calls(&self) -> usize {
        self.peek_calls.load(Ordering::SeqCst)
    }

    pub fn present_calls(&self) -> usize {
        self.present_calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl DecisionAdapter for ScriptedAdapter {
    async fn decide(
        &self,
        _history: &[Message],
        _catalog: &[CapabilitySpec],
    ) -> Result<DecisionOutcome> {
        self.decide_calls.fetch_add(1, Ordering::SeqCst);
        self.decisions
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(Error::Adapter("scripted decisions exhausted".to_string())))
    }

    async fn decide_stream(
        &self,
        _history: &[Message],
        chunks: mpsc::Sender<String>,
    ) -> Result<String> {
        self.stream_calls.fetch_add(1, Ordering::SeqCst);
        let script = self
            .streams
            .lock()
            .pop_front()
            .ok_or_else(|| Error::Adapter("scripted streams exhausted".to_string()))?;

        match script {
            StreamScript::Chunks(parts) => {
                let mut full = String::new();
                for part in parts {
                    full.push_str(&part);
                    if chunks.send(part).await.is_err() {
                        return Err(Error::Adapter("output channel closed".to_string()));
                    }
                }
                Ok(full)
            }
            StreamScript::FailAfter(parts, reason) => {
                for part in parts {
                    let _ = chunks.send(part).await;
                }
                Err(Error::Adapter(reason))
            }
        }
    }

    async fn peek(&self, _history: &[Message]) -> Result<bool> {
        self.peek_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.peeks.lock().pop_front().unwrap_or(true))
    }

    fn supports_presentation(&self) -> bool {
        !self.presentations.lock().is_empty()
    }

    async fn present(&self, _history: &[Message]) -> Result<String> {
        self.present_calls.fetch_add(1, Ordering::SeqCst);
        self.presentations.lock().pop_front().unwrap_or_else(|| {
            Err(Error::Adapter(
                "scripted presentations exhausted".to_string(),
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_decisions_replay_in_order() {
        let adapter = ScriptedAdapter::new();
        adapter.push_direct("first");
        adapter.push_failure("down");

        match adapter.decide(&[], &[]).await.unwrap() {
            DecisionOutcome::Direct(text) => assert_eq!(text, "first"),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(adapter.decide(&[], &[]).await.is_err());
        assert_eq!(adapter.decide_calls(), 2);
    }

    #[tokio::test]
    async fn test_stream_delivers_chunks() {
        let adapter = ScriptedAdapter::new();
        adapter.push_stream(&["Hel", "lo"]);

        let (tx, mut rx) = mpsc::channel(8);
        let full = adapter.decide_stream(&[], tx).await.unwrap();
        assert_eq!(full, "Hello");
        assert_eq!(rx.recv().await.unwrap(), "Hel");
        assert_eq!(rx.recv().await.unwrap(), "lo");
    }

    #[tokio::test]
    async fn test_stream_failure_after_chunks() {
        let adapter = ScriptedAdapter::new();
        adapter.push_stream_failure(&["partial"], "connection reset");

        let (tx, mut rx) = mpsc::channel(8);
        assert!(adapter.decide_stream(&[], tx).await.is_err());
        assert_eq!(rx.recv().await.unwrap(), "partial");
    }

    #[tokio::test]
    async fn test_peek_defaults_to_capability_path() {
        let adapter = ScriptedAdapter::new();
        adapter.push_peek(false);
        assert!(!adapter.peek(&[]).await.unwrap());
        assert!(adapter.peek(&[]).await.unwrap());
    }
}
