//! Capability system
//!
//! Capabilities are the operations the decision model can invoke. Each
//! capability has a name and description for the model, a JSON schema for its
//! arguments, and an async `invoke` method. Every invocation produces a
//! [`CapabilityOutcome`] with a uniform shape so the confirmation gate can
//! inspect results without knowing capability-specific payloads.

pub mod schema;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::CapabilityError;

/// Uniform result of one capability invocation.
///
/// Failures are data, not errors: a handler fault or validation rejection
/// becomes `success: false` so the turn loop never crashes on a bad call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CapabilityOutcome {
    /// Whether the operation completed
    pub success: bool,
    /// Error description when `success` is false
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// The operation is suspended pending a generic yes/no confirmation
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub requires_confirmation: bool,
    /// The operation is suspended pending a field-value correction
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub requires_field_confirmation: bool,
    /// Human-readable summary (success notice or confirmation question)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Field under confirmation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    /// The value the user originally supplied for `field`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_value: Option<String>,
    /// The corrected value to use if the user confirms
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_value: Option<String>,
    /// Closed set of accepted values for `field`, when known
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub valid_options: Vec<String>,
    /// Capability-specific payload (records, counts, ids)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl CapabilityOutcome {
    /// Successful outcome with an optional payload
    pub fn ok(data: Option<Value>) -> Self {
        Self {
            success: true,
            data,
            ..Default::default()
        }
    }

    /// Successful outcome with a summary message
    pub fn ok_with_message(message: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            data,
            ..Default::default()
        }
    }

    /// Failed outcome
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }

    /// Suspend for a generic "proceed anyway?" confirmation
    pub fn needs_confirmation(message: impl Into<String>) -> Self {
        Self {
            success: false,
            requires_confirmation: true,
            message: Some(message.into()),
            ..Default::default()
        }
    }

    /// Suspend for a field-value correction confirmation
    pub fn needs_field_confirmation(
        field: impl Into<String>,
        user_value: impl Into<String>,
        suggested_value: impl Into<String>,
        valid_options: Vec<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            success: false,
            requires_field_confirmation: true,
            field: Some(field.into()),
            user_value: Some(user_value.into()),
            suggested_value: Some(suggested_value.into()),
            valid_options,
            message: Some(message.into()),
            ..Default::default()
        }
    }
}

/// Capability description passed to the decision model as its tool catalogue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilitySpec {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// Core trait for all capabilities
#[async_trait]
pub trait Capability: Send + Sync {
    /// Name the decision model uses to invoke this capability
    fn name(&self) -> &str;

    /// Description of what the capability does
    fn description(&self) -> &str;

    /// JSON schema for the arguments
    fn input_schema(&self) -> Value;

    /// Perform one unit of work against the backing store.
    ///
    /// Expected failure modes (missing record, unknown table) must be
    /// returned as `Ok(CapabilityOutcome { success: false, .. })`; only
    /// unexpected faults should surface as `Err`, and those are caught by
    /// the registry.
    async fn invoke(&self, args: Value) -> Result<CapabilityOutcome, CapabilityError>;

    /// Catalogue entry for the decision model
    fn spec(&self) -> CapabilitySpec {
        CapabilitySpec {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: self.input_schema(),
        }
    }
}

/// Registry of capabilities, fixed after startup.
///
/// The registry is side-effect-free bookkeeping: it validates arguments,
/// dispatches to handlers, and wraps every fault as a failed outcome so
/// nothing escapes past this boundary.
#[derive(Default)]
pub struct CapabilityRegistry {
    capabilities: HashMap<String, Arc<dyn Capability>>,
    /// Registration order, for a stable catalogue
    order: Vec<String>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a capability. Later registrations with the same name replace
    /// earlier ones.
    pub fn register(&mut self, capability: Arc<dyn Capability>) {
        let name = capability.name().to_string();
        if self.capabilities.insert(name.clone(), capability).is_none() {
            self.order.push(name);
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Capability>> {
        self.capabilities.get(name).cloned()
    }

    /// Catalogue in registration order
    pub fn list(&self) -> Vec<CapabilitySpec> {
        self.order
            .iter()
            .filter_map(|name| self.capabilities.get(name))
            .map(|c| c.spec())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.capabilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }

    /// Validate arguments and dispatch to the named capability.
    ///
    /// Never fails: unknown names, schema violations, and handler faults all
    /// come back as `success: false` outcomes for the model to react to.
    pub async fn invoke(&self, name: &str, args: Value) -> CapabilityOutcome {
        let Some(capability) = self.get(name) else {
            warn!(capability = name, "unknown capability requested");
            return CapabilityOutcome::failure(format!(
                "unknown capability '{name}'. Available: {}",
                self.order.join(", ")
            ));
        };

        if let Err(reason) = schema::validate(&capability.input_schema(), &args) {
            debug!(capability = name, %reason, "argument validation failed");
            return CapabilityOutcome::failure(format!("invalid arguments: {reason}"));
        }

        match capability.invoke(args).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(capability = name, error = %e, "capability handler fault");
                CapabilityOutcome::failure(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Echo;

    #[async_trait]
    impl Capability for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "Echo the provided text back"
        }

        fn input_schema(&self) -> Value {
            json!({
                "type": "object",
                "properties": { "text": { "type": "string" } },
                "required": ["text"]
            })
        }

        async fn invoke(&self, args: Value) -> Result<CapabilityOutcome, CapabilityError> {
            Ok(CapabilityOutcome::ok(Some(json!({
                "text": args["text"]
            }))))
        }
    }

    struct Faulty;

    #[async_trait]
    impl Capability for Faulty {
        fn name(&self) -> &str {
            "faulty"
        }

        fn description(&self) -> &str {
            "Always faults"
        }

        fn input_schema(&self) -> Value {
            json!({ "type": "object", "properties": {} })
        }

        async fn invoke(&self, _args: Value) -> Result<CapabilityOutcome, CapabilityError> {
            Err(CapabilityError::ExecutionFailed("backend unreachable".into()))
        }
    }

    fn registry() -> CapabilityRegistry {
        let mut registry = CapabilityRegistry::new();
        registry.register(Arc::new(Echo));
        registry.register(Arc::new(Faulty));
        registry
    }

    #[tokio::test]
    async fn test_invoke_ok() {
        let outcome = registry().invoke("echo", json!({ "text": "hi" })).await;
        assert!(outcome.success);
        assert_eq!(outcome.data.unwrap()["text"], "hi");
    }

    #[tokio::test]
    async fn test_unknown_capability_is_data_not_error() {
        let outcome = registry().invoke("nope", json!({})).await;
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("unknown capability"));
    }

    #[tokio::test]
    async fn test_missing_required_argument() {
        let outcome = registry().invoke("echo", json!({})).await;
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("invalid arguments"));
    }

    #[tokio::test]
    async fn test_handler_fault_is_wrapped() {
        let outcome = registry().invoke("faulty", json!({})).await;
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("backend unreachable"));
    }

    #[test]
    fn test_list_in_registration_order() {
        let specs = registry().list();
        assert_eq!(specs[0].name, "echo");
        assert_eq!(specs[1].name, "faulty");
    }

    #[test]
    fn test_outcome_serialization_omits_defaults() {
        let json = serde_json::to_string(&CapabilityOutcome::ok(None)).unwrap();
        assert!(!json.contains("requires_confirmation"));
        assert!(!json.contains("valid_options"));
    }
}
