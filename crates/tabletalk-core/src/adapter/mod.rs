//! Decision model adapters
//!
//! The session controller talks to its LLM through the [`DecisionAdapter`]
//! trait. The production implementation is [`GenAiAdapter`] (any provider the
//! genai framework supports); [`ScriptedAdapter`] replays canned outcomes for
//! tests and offline development.

mod genai_adapter;
mod scripted;

pub use genai_adapter::{GenAiAdapter, ProviderKind, create_adapter};
pub use scripted::ScriptedAdapter;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::capability::CapabilitySpec;
use crate::error::{Error, Result};
use crate::message::{CapabilityRequest, Message};

/// What the decision model chose to do with the current history
#[derive(Debug, Clone)]
pub enum DecisionOutcome {
    /// Answer the user directly with this text
    Direct(String),
    /// Invoke one or more capabilities before answering
    Invoke(Vec<CapabilityRequest>),
}

impl DecisionOutcome {
    pub fn is_invoke(&self) -> bool {
        matches!(self, Self::Invoke(_))
    }
}

/// Interface between the session controller and a decision model.
///
/// `decide` is the routing call: given the history and the capability
/// catalogue it returns either a direct answer or a batch of capability
/// requests. The other methods are optional refinements with conservative
/// defaults so a minimal adapter only has to implement two of them.
#[async_trait]
pub trait DecisionAdapter: Send + Sync {
    /// One routing decision over the full history, capability catalogue
    /// attached.
    async fn decide(
        &self,
        history: &[Message],
        catalog: &[CapabilitySpec],
    ) -> Result<DecisionOutcome>;

    /// Stream a direct (no-capability) reply chunk by chunk into `chunks`,
    /// returning the accumulated full text. A dropped receiver means the
    /// caller went away; implementations should stop and return an error.
    async fn decide_stream(
        &self,
        history: &[Message],
        chunks: mpsc::Sender<String>,
    ) -> Result<String>;

    /// Cheap pre-classification: does this history likely need a capability?
    /// `true` routes to the blocking tool path, `false` to the streaming
    /// direct path. The default assumes capabilities may be needed.
    async fn peek(&self, _history: &[Message]) -> Result<bool> {
        Ok(true)
    }

    /// Whether [`present`](Self::present) is available on this adapter.
    fn supports_presentation(&self) -> bool {
        false
    }

    /// Rewrite the latest draft answer for presentation, given the history
    /// that produced it.
    async fn present(&self, _history: &[Message]) -> Result<String> {
        Err(Error::Adapter(
            "presentation pass not supported by this adapter".to_string(),
        ))
    }
}
