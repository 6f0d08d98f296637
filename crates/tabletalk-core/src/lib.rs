//! Tabletalk core library
//!
//! A conversational controller over a structured record store: user input is
//! routed between direct LLM answers and capability invocations, suspended
//! invocations run a yes/no confirmation workflow, and history is truncated
//! without ever splitting a capability request from its result.
//!
//! The main entry point is [`SessionController`]; wire it up with a
//! [`CapabilityRegistry`] (see [`store::register_store_capabilities`]) and a
//! [`DecisionAdapter`] implementation.

pub mod adapter;
pub mod capability;
pub mod config;
pub mod error;
pub mod gate;
pub mod message;
pub mod prompt;
pub mod session;
pub mod store;

pub use adapter::{DecisionAdapter, DecisionOutcome, GenAiAdapter, ProviderKind, ScriptedAdapter};
pub use capability::{Capability, CapabilityOutcome, CapabilityRegistry, CapabilitySpec};
pub use config::AgentConfig;
pub use error::{CapabilityError, Error, Result};
pub use message::{CapabilityRequest, Message, verify_pairing};
pub use session::{Session, SessionController, SessionState, TurnReply};
pub use store::{RecordStore, register_store_capabilities};
