//! GenAI-based decision adapter
//!
//! Uses the genai framework to reach multiple LLM providers with manual
//! capability control, so the controller can gate invocations before they
//! run. Streaming is used for every call to avoid idle-connection timeouts;
//! non-streaming entry points simply accumulate the stream.

use futures::StreamExt;
use genai::Client;
use genai::WebConfig;
use genai::chat::{ChatMessage, ChatRequest, ChatStreamEvent, Tool, ToolCall, ToolResponse};
use genai::resolver::{AuthData, AuthResolver};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::capability::CapabilitySpec;
use crate::error::{Error, Result};
use crate::message::{CapabilityRequest, Message};
use crate::prompt::{PEEK_SYSTEM_PROMPT, PRESENTATION_SYSTEM_PROMPT};

use super::{DecisionAdapter, DecisionOutcome};

/// Supported LLM provider families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAI,
    Anthropic,
    Gemini,
    Groq,
    DeepSeek,
    Ollama,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAI => "openai",
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::Gemini => "gemini",
            ProviderKind::Groq => "groq",
            ProviderKind::DeepSeek => "deepseek",
            ProviderKind::Ollama => "ollama",
        }
    }

    /// Default decision model for this provider
    pub fn default_model(&self) -> &'static str {
        match self {
            ProviderKind::OpenAI => "gpt-4o-mini",
            ProviderKind::Anthropic => "claude-sonnet-4-5-20250929",
            ProviderKind::Gemini => "gemini-2.0-flash",
            ProviderKind::Groq => "llama-3.3-70b-versatile",
            ProviderKind::DeepSeek => "deepseek-chat",
            ProviderKind::Ollama => "llama3.2",
        }
    }

    /// Environment variable holding the API key
    pub fn api_key_env(&self) -> Option<&'static str> {
        match self {
            ProviderKind::OpenAI => Some("OPENAI_API_KEY"),
            ProviderKind::Anthropic => Some("ANTHROPIC_API_KEY"),
            ProviderKind::Gemini => Some("GEMINI_API_KEY"),
            ProviderKind::Groq => Some("GROQ_API_KEY"),
            ProviderKind::DeepSeek => Some("DEEPSEEK_API_KEY"),
            ProviderKind::Ollama => None,
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(ProviderKind::OpenAI),
            "anthropic" => Ok(ProviderKind::Anthropic),
            "gemini" | "google" => Ok(ProviderKind::Gemini),
            "groq" => Ok(ProviderKind::Groq),
            "deepseek" => Ok(ProviderKind::DeepSeek),
            "ollama" => Ok(ProviderKind::Ollama),
            _ => Err(format!("Unknown provider: {}", s)),
        }
    }
}

/// Accumulated result of one model call
#[derive(Debug, Default)]
struct CallResult {
    content: String,
    requests: Vec<CapabilityRequest>,
}

/// Decision adapter backed by genai
pub struct GenAiAdapter {
    client: Client,
    provider: ProviderKind,
    model: String,
    /// Small model for the pre-classification pass; peeking is disabled
    /// when unset
    peek_model: Option<String>,
    /// Model for the presentation rewrite pass; disabled when unset
    presentation_model: Option<String>,
}

impl GenAiAdapter {
    /// Default timeout for LLM API requests (5 minutes)
    const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

    fn default_web_config() -> WebConfig {
        WebConfig::default()
            .with_timeout(Self::DEFAULT_TIMEOUT)
            .with_connect_timeout(Duration::from_secs(30))
    }

    /// Create an adapter that resolves API keys from environment variables
    pub fn new(provider: ProviderKind, model: Option<&str>) -> Self {
        let client = Client::builder()
            .with_web_config(Self::default_web_config())
            .build();
        Self {
            client,
            provider,
            model: model.unwrap_or(provider.default_model()).to_string(),
            peek_model: None,
            presentation_model: None,
        }
    }

    /// Create an adapter with an explicit API key
    pub fn with_api_key(provider: ProviderKind, api_key: &str, model: Option<&str>) -> Self {
        let api_key = api_key.to_string();
        let auth_resolver = AuthResolver::from_resolver_fn(
            move |_model_iden| -> std::result::Result<Option<AuthData>, genai::resolver::Error> {
                Ok(Some(AuthData::from_single(api_key.clone())))
            },
        );

        let client = Client::builder()
            .with_web_config(Self::default_web_config())
            .with_auth_resolver(auth_resolver)
            .build();

        Self {
            client,
            provider,
            model: model.unwrap_or(provider.default_model()).to_string(),
            peek_model: None,
            presentation_model: None,
        }
    }

    /// Enable the peek pre-classifier with the given small model
    pub fn with_peek_model(mut self, model: impl Into<String>) -> Self {
        self.peek_model = Some(model.into());
        self
    }

    /// Enable the presentation rewrite pass with the given model
    pub fn with_presentation_model(mut self, model: impl Into<String>) -> Self {
        self.presentation_model = Some(model.into());
        self
    }

    pub fn provider(&self) -> ProviderKind {
        self.provider
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Convert session history into a genai request.
    ///
    /// The system seed becomes the request system prompt. Assistant messages
    /// carrying requests are sent as tool-call messages; capability results
    /// go out as `ToolResponse` entries keyed by request id, keeping the
    /// provider-side pairing intact.
    fn build_request(&self, history: &[Message]) -> ChatRequest {
        let mut chat_req = ChatRequest::default();

        for msg in history {
            match msg {
                Message::System { content } => {
                    chat_req = chat_req.with_system(content.as_str());
                }
                Message::User { content } => {
                    chat_req = chat_req.append_message(ChatMessage::user(content.as_str()));
                }
                Message::Assistant { content, requests } => {
                    if requests.is_empty() {
                        chat_req = chat_req.append_message(ChatMessage::assistant(content.as_str()));
                    } else {
                        // Providers expect tool calls in a single assistant
                        // message; any accompanying text is dropped
                        let tool_calls: Vec<ToolCall> = requests
                            .iter()
                            .map(|r| ToolCall {
                                call_id: r.request_id.clone(),
                                fn_name: r.capability.clone(),
                                fn_arguments: r.arguments.clone(),
                                thought_signatures: None,
                            })
                            .collect();
                        chat_req = chat_req.append_message(tool_calls);
                    }
                }
                Message::CapabilityResult {
                    request_id, payload, ..
                } => {
                    let content = serde_json::to_string(payload).unwrap_or_default();
                    chat_req =
                        chat_req.append_message(ToolResponse::new(request_id.clone(), content));
                }
            }
        }

        chat_req
    }

    /// Run one call to completion, accumulating content and tool calls from
    /// the stream. `chunks` forwards content deltas as they arrive.
    async fn run_call(
        &self,
        model: &str,
        chat_req: ChatRequest,
        chunks: Option<&mpsc::Sender<String>>,
    ) -> Result<CallResult> {
        let stream_res = self
            .client
            .exec_chat_stream(model, chat_req, None)
            .await
            .map_err(|e| {
                error!(error = ?e, model, "LLM request failed");
                Error::Adapter(format!("{:?}", e))
            })?;

        let mut result = CallResult::default();
        let mut stream = stream_res.stream;

        while let Some(event) = stream.next().await {
            match event {
                Ok(ChatStreamEvent::Chunk(chunk)) => {
                    if let Some(tx) = chunks {
                        if tx.send(chunk.content.clone()).await.is_err() {
                            // Receiver gone: cancel the stream by dropping it
                            return Err(Error::Adapter("output channel closed".to_string()));
                        }
                    }
                    result.content.push_str(&chunk.content);
                }
                Ok(ChatStreamEvent::ReasoningChunk(chunk)) => {
                    debug!(model, len = chunk.content.len(), "reasoning chunk");
                }
                Ok(ChatStreamEvent::ToolCallChunk(tc)) => {
                    let tool_call = tc.tool_call;
                    result.requests.push(CapabilityRequest::with_id(
                        tool_call.call_id,
                        tool_call.fn_name,
                        tool_call.fn_arguments,
                    ));
                }
                Ok(ChatStreamEvent::End(_)) => break,
                Ok(ChatStreamEvent::Start) | Ok(ChatStreamEvent::ThoughtSignatureChunk(_)) => {}
                Err(e) => {
                    error!(error = ?e, model, "LLM stream error");
                    return Err(Error::Adapter(format!("{:?}", e)));
                }
            }
        }

        Ok(result)
    }
}

#[async_trait::async_trait]
impl DecisionAdapter for GenAiAdapter {
    async fn decide(
        &self,
        history: &[Message],
        catalog: &[CapabilitySpec],
    ) -> Result<DecisionOutcome> {
        let mut chat_req = self.build_request(history);

        if !catalog.is_empty() {
            let tools: Vec<Tool> = catalog
                .iter()
                .map(|spec| {
                    Tool::new(&spec.name)
                        .with_description(&spec.description)
                        .with_schema(spec.input_schema.clone())
                })
                .collect();
            chat_req = chat_req.with_tools(tools);
        }

        let result = self.run_call(&self.model, chat_req, None).await?;

        if result.requests.is_empty() {
            Ok(DecisionOutcome::Direct(result.content))
        } else {
            Ok(DecisionOutcome::Invoke(result.requests))
        }
    }

    async fn decide_stream(
        &self,
        history: &[Message],
        chunks: mpsc::Sender<String>,
    ) -> Result<String> {
        // No catalogue attached: this path is only taken when peeking
        // classified the turn as a direct answer
        let chat_req = self.build_request(history);
        let result = self.run_call(&self.model, chat_req, Some(&chunks)).await?;
        Ok(result.content)
    }

    async fn peek(&self, history: &[Message]) -> Result<bool> {
        let Some(peek_model) = &self.peek_model else {
            return Ok(true);
        };

        // Reuse the conversational turns under the classifier prompt instead
        // of the full seed
        let mut chat_req = ChatRequest::default().with_system(PEEK_SYSTEM_PROMPT);
        for msg in history {
            match msg {
                Message::User { content } => {
                    chat_req = chat_req.append_message(ChatMessage::user(content.as_str()));
                }
                Message::Assistant { content, requests } if requests.is_empty() => {
                    chat_req = chat_req.append_message(ChatMessage::assistant(content.as_str()));
                }
                _ => {}
            }
        }

        let result = self.run_call(peek_model, chat_req, None).await?;
        let verdict = result.content.trim().eq_ignore_ascii_case("TOOL");
        debug!(model = %peek_model, verdict, "peek classification");
        Ok(verdict)
    }

    fn supports_presentation(&self) -> bool {
        self.presentation_model.is_some()
    }

    async fn present(&self, history: &[Message]) -> Result<String> {
        let Some(presentation_model) = &self.presentation_model else {
            return Err(Error::Adapter(
                "presentation pass not configured".to_string(),
            ));
        };

        let mut chat_req = self.build_request(history);
        chat_req = chat_req.with_system(PRESENTATION_SYSTEM_PROMPT);

        let result = self.run_call(presentation_model, chat_req, None).await?;
        Ok(result.content)
    }
}

/// Create an adapter from provider settings, resolving the API key from an
/// explicit value first and the provider's environment variable second
pub fn create_adapter(
    provider: ProviderKind,
    api_key: Option<&str>,
    model: Option<&str>,
) -> GenAiAdapter {
    let resolved = api_key.map(str::to_string).or_else(|| {
        provider
            .api_key_env()
            .and_then(|var| std::env::var(var).ok())
    });

    match resolved {
        Some(key) => GenAiAdapter::with_api_key(provider, &key, model),
        None => GenAiAdapter::new(provider, model),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_kind_round_trip() {
        let kind: ProviderKind = "anthropic".parse().unwrap();
        assert_eq!(kind, ProviderKind::Anthropic);
        assert_eq!(kind.to_string(), "anthropic");
    }

    #[test]
    fn test_unknown_provider() {
        assert!("notreal".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn test_default_models_are_nonempty() {
        for kind in [
            ProviderKind::OpenAI,
            ProviderKind::Anthropic,
            ProviderKind::Gemini,
            ProviderKind::Groq,
            ProviderKind::DeepSeek,
            ProviderKind::Ollama,
        ] {
            assert!(!kind.default_model().is_empty());
        }
    }
}
