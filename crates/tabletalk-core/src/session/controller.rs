//! Session controller
//!
//! Drives one turn at a time: routes user input to either a direct answer or
//! capability invocations, runs the confirmation workflow when an invocation
//! suspends, and keeps the history bounded. All model and capability calls
//! happen here so the rest of the crate stays synchronous bookkeeping.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::adapter::{DecisionAdapter, DecisionOutcome};
use crate::capability::{CapabilityOutcome, CapabilityRegistry, CapabilitySpec};
use crate::config::AgentConfig;
use crate::error::{Error, Result};
use crate::gate::{self, ResumeAction};
use crate::message::{CapabilityRequest, Message};
use crate::prompt::SystemPrompt;

use super::{Session, SessionState, truncate};

/// Commands that clear the conversation instead of being routed
const RESET_COMMANDS: &[&str] = &["/reset", "/clear", "reset"];

const EMPTY_INPUT_NOTICE: &str = "Please type a message.";
const RESET_NOTICE: &str = "Conversation cleared. What would you like to do?";

/// What a completed turn hands back to the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnReply {
    /// Final answer; the turn is over
    Answer(String),
    /// A question the user must answer yes/no before the turn can finish
    ConfirmationPrompt(String),
}

impl TurnReply {
    pub fn text(&self) -> &str {
        match self {
            Self::Answer(t) | Self::ConfirmationPrompt(t) => t,
        }
    }
}

/// Turn-loop state machine over one [`Session`]
pub struct SessionController {
    session: Session,
    registry: Arc<CapabilityRegistry>,
    adapter: Arc<dyn DecisionAdapter>,
    config: AgentConfig,
    state: SessionState,
    catalog: Vec<CapabilitySpec>,
}

impl SessionController {
    /// Create a controller with a fresh session seeded from the registry's
    /// catalogue
    pub fn new(
        adapter: Arc<dyn DecisionAdapter>,
        registry: Arc<CapabilityRegistry>,
        config: AgentConfig,
    ) -> Self {
        let catalog = registry.list();
        let seed = SystemPrompt::new()
            .with_catalog(&catalog)
            .with_current_date(chrono::Local::now().format("%Y-%m-%d").to_string())
            .build();
        Self {
            session: Session::new(seed),
            registry,
            adapter,
            config,
            state: SessionState::Idle,
            catalog,
        }
    }

    /// Continue an existing session (e.g. restored from disk). A session
    /// carrying a pending confirmation picks up where it left off: the next
    /// message is treated as the yes/no reply.
    pub fn attach_session(&mut self, session: Session) {
        self.state = if session.pending_confirmation.is_some() {
            SessionState::AwaitingConfirmation
        } else {
            SessionState::Idle
        };
        self.session = session;
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Process one user message and run the turn to completion.
    ///
    /// Returns [`TurnReply::ConfirmationPrompt`] when an invocation
    /// suspended; the next `submit` call is then treated as the yes/no
    /// reply. Adapter and timeout failures roll the history back so the
    /// same input can be retried.
    pub async fn submit(&mut self, input: &str) -> Result<TurnReply> {
        if self.state == SessionState::Processing {
            return Err(Error::Busy);
        }

        let input = input.trim();
        if input.is_empty() {
            return Ok(TurnReply::Answer(EMPTY_INPUT_NOTICE.to_string()));
        }

        // Reset works even while a confirmation is pending
        if RESET_COMMANDS.contains(&input.to_lowercase().as_str()) {
            info!("session reset requested");
            self.session.reset();
            self.state = SessionState::Idle;
            return Ok(TurnReply::Answer(RESET_NOTICE.to_string()));
        }

        if self.session.pending_confirmation.is_some() {
            return self.resume_confirmation(input).await;
        }

        self.run_turn(input).await
    }

    /// Streaming variant of [`submit`](Self::submit).
    ///
    /// When the peek classifier routes the turn to a direct answer, content
    /// deltas are forwarded through `chunks` as they arrive. Capability
    /// turns run on the blocking path and deliver the final text as a
    /// single chunk. The returned reply always carries the full text.
    pub async fn submit_streaming(
        &mut self,
        input: &str,
        chunks: mpsc::Sender<String>,
    ) -> Result<TurnReply> {
        if self.state == SessionState::Processing {
            return Err(Error::Busy);
        }

        let trimmed = input.trim();
        let wants_stream = !trimmed.is_empty()
            && !RESET_COMMANDS.contains(&trimmed.to_lowercase().as_str())
            && self.session.pending_confirmation.is_none()
            && self.config.enable_peek;

        if wants_stream {
            // Peek failures degrade to the capability path rather than
            // failing the turn
            let needs_capability = match self.adapter.peek(&self.session.messages).await {
                Ok(verdict) => verdict,
                Err(e) => {
                    warn!(error = %e, "peek failed, falling back to capability path");
                    true
                }
            };

            if !needs_capability {
                return self.run_streaming_turn(trimmed, chunks).await;
            }
        }

        let reply = self.submit(input).await?;
        let _ = chunks.send(reply.text().to_string()).await;
        Ok(reply)
    }

    async fn run_streaming_turn(
        &mut self,
        input: &str,
        chunks: mpsc::Sender<String>,
    ) -> Result<TurnReply> {
        self.state = SessionState::Processing;
        self.session.push(Message::user(input));
        let checkpoint = self.session.len();

        let call = self.adapter.decide_stream(&self.session.messages, chunks);
        let result = timeout(Duration::from_secs(self.config.decision_timeout_secs), call)
            .await
            .map_err(|_| Error::Timeout(self.config.decision_timeout_secs))
            .and_then(|r| r);

        match result {
            Ok(text) => {
                self.session.push(Message::assistant(text.clone()));
                self.finish_turn();
                Ok(TurnReply::Answer(text))
            }
            Err(e) => {
                // Drop any partial assistant output so a retry replays cleanly
                self.session.messages.truncate(checkpoint);
                self.state = SessionState::Idle;
                Err(e)
            }
        }
    }

    async fn run_turn(&mut self, input: &str) -> Result<TurnReply> {
        self.state = SessionState::Processing;
        self.session.push(Message::user(input));
        let checkpoint = self.session.len();

        match self.drive_rounds().await {
            Ok(reply) => {
                if matches!(reply, TurnReply::ConfirmationPrompt(_)) {
                    self.session.turns += 1;
                    self.state = SessionState::AwaitingConfirmation;
                } else {
                    self.finish_turn();
                }
                Ok(reply)
            }
            Err(e) => {
                if matches!(e, Error::Adapter(_) | Error::Timeout(_)) {
                    self.session.messages.truncate(checkpoint);
                }
                self.state = SessionState::Idle;
                Err(e)
            }
        }
    }

    /// Alternate decide/invoke until the model answers directly or an
    /// invocation suspends
    async fn drive_rounds(&mut self) -> Result<TurnReply> {
        let mut rounds = 0;
        loop {
            rounds += 1;
            if rounds > self.config.max_capability_rounds {
                warn!(rounds, "capability round limit reached");
                return Err(Error::TooManyRounds(self.config.max_capability_rounds));
            }

            let call = self.adapter.decide(&self.session.messages, &self.catalog);
            let outcome = timeout(Duration::from_secs(self.config.decision_timeout_secs), call)
                .await
                .map_err(|_| Error::Timeout(self.config.decision_timeout_secs))??;

            match outcome {
                DecisionOutcome::Direct(draft) => {
                    // The rewrite pass only applies to answers built from
                    // capability results
                    let text = if rounds > 1 {
                        self.maybe_present(draft).await
                    } else {
                        draft
                    };
                    self.session.push(Message::assistant(text.clone()));
                    return Ok(TurnReply::Answer(text));
                }
                DecisionOutcome::Invoke(requests) => {
                    debug!(count = requests.len(), round = rounds, "invoking capabilities");
                    self.session
                        .push(Message::assistant_with_requests("", requests.clone()));

                    // Execute the whole batch so every request gets its
                    // result message, then suspend on the first flagged one
                    let mut first_pending = None;
                    for request in &requests {
                        let outcome = self.invoke_with_timeout(request).await;
                        if first_pending.is_none() {
                            first_pending = gate::inspect(request, &outcome);
                        }
                        self.session.push(Message::capability_result(
                            &request.capability,
                            &request.request_id,
                            outcome,
                        ));
                    }

                    if let Some(pending) = first_pending {
                        let prompt = gate::render_prompt(&pending);
                        self.session.pending_confirmation = Some(pending);
                        self.session.push(Message::assistant(prompt.clone()));
                        return Ok(TurnReply::ConfirmationPrompt(prompt));
                    }
                }
            }
        }
    }

    /// Handle the user's reply to a pending confirmation
    async fn resume_confirmation(&mut self, input: &str) -> Result<TurnReply> {
        self.state = SessionState::Processing;
        // Taken up front; re-armed below on a reprompt
        let pending = match self.session.pending_confirmation.take() {
            Some(p) => p,
            None => {
                self.state = SessionState::Idle;
                return Err(Error::Session("no confirmation pending".to_string()));
            }
        };

        let reply = gate::parse_reply(input);
        self.session.push(Message::user(input));

        match gate::resume(&pending, reply) {
            ResumeAction::Reprompt { prompt } => {
                self.session.push(Message::assistant(prompt.clone()));
                self.session.pending_confirmation = Some(pending);
                self.state = SessionState::AwaitingConfirmation;
                Ok(TurnReply::ConfirmationPrompt(prompt))
            }
            ResumeAction::Cancelled { note } => {
                info!(capability = %pending.capability, "confirmation declined");
                self.session.push(Message::assistant(note.clone()));
                self.finish_turn();
                Ok(TurnReply::Answer(note))
            }
            ResumeAction::Reinvoke {
                capability,
                arguments,
                ..
            } => {
                info!(capability = %capability, "confirmation accepted, re-invoking");
                let request = CapabilityRequest::new(&capability, arguments);
                self.session
                    .push(Message::assistant_with_requests("", vec![request.clone()]));

                let outcome = self.invoke_with_timeout(&request).await;
                let next_pending = gate::inspect(&request, &outcome);
                let summary = summarize_outcome(&outcome);
                self.session.push(Message::capability_result(
                    &request.capability,
                    &request.request_id,
                    outcome,
                ));

                // A different field may still need fixing; the confirmed
                // value itself no longer trips the gate
                if let Some(pending) = next_pending {
                    let prompt = gate::render_prompt(&pending);
                    self.session.pending_confirmation = Some(pending);
                    self.session.push(Message::assistant(prompt.clone()));
                    self.state = SessionState::AwaitingConfirmation;
                    return Ok(TurnReply::ConfirmationPrompt(prompt));
                }

                self.session.push(Message::assistant(summary.clone()));
                self.finish_turn();
                Ok(TurnReply::Answer(summary))
            }
        }
    }

    /// Invoke one capability, converting a timeout into a failed outcome so
    /// the turn keeps its request/result pairing
    async fn invoke_with_timeout(&self, request: &CapabilityRequest) -> CapabilityOutcome {
        let secs = self.config.capability_timeout_secs;
        let call = self
            .registry
            .invoke(&request.capability, request.arguments.clone());
        match timeout(Duration::from_secs(secs), call).await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(capability = %request.capability, secs, "capability timed out");
                CapabilityOutcome::failure(format!(
                    "capability '{}' timed out after {secs} seconds",
                    request.capability
                ))
            }
        }
    }

    /// Optional rewrite of a direct answer; any failure falls back to the
    /// draft
    async fn maybe_present(&self, draft: String) -> String {
        if !self.config.enable_presentation || !self.adapter.supports_presentation() {
            return draft;
        }

        let mut preview = self.session.messages.clone();
        preview.push(Message::assistant(draft.clone()));

        match self.adapter.present(&preview).await {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) => draft,
            Err(e) => {
                warn!(error = %e, "presentation pass failed, using draft");
                draft
            }
        }
    }

    fn finish_turn(&mut self) {
        self.session.turns += 1;
        truncate::truncate(&mut self.session.messages, self.config.history_tail);
        self.state = SessionState::Idle;
    }
}

fn summarize_outcome(outcome: &CapabilityOutcome) -> String {
    if let Some(message) = &outcome.message {
        return message.clone();
    }
    if outcome.success {
        "Done.".to_string()
    } else {
        format!(
            "That didn't work: {}",
            outcome.error.as_deref().unwrap_or("unknown error")
        )
    }
}
