//! System prompt assembly
//!
//! The seed message combines the operating rules with a rendered capability
//! catalogue and the current date, so the decision model knows what it can
//! invoke and how to phrase confirmations.

use crate::capability::CapabilitySpec;

/// Operating rules for the decision model
pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You are Tabletalk, an assistant that manages a structured record store through capabilities.

Rules:
- Use a capability whenever the user asks to create, read, update, delete, list, or search records, or asks about store statistics. Answer directly only for greetings, general questions, and follow-ups that need no data.
- Never invent record contents. If a capability result says an operation failed, tell the user what went wrong and suggest a correction; do not retry the same call unchanged.
- When a capability result asks for confirmation, relay its question to the user verbatim and wait for their answer. Do not decide on their behalf.
- When listing or searching, summarize the returned records clearly. Mention ids so the user can refer to specific records later.
- Dates and times come from the current_datetime capability; do not guess them.
- Keep answers short and concrete."#;

/// Classifier prompt for the peek pass
pub const PEEK_SYSTEM_PROMPT: &str = r#"You are a router. Given the conversation, decide whether answering the latest user message requires using a data capability (creating, reading, updating, deleting, listing, searching records, or store statistics).

Reply with exactly the word TOOL if a capability is required. Otherwise reply with the single word CHAT. Output nothing else."#;

/// Rewrite prompt for the presentation pass
pub const PRESENTATION_SYSTEM_PROMPT: &str = r#"You polish draft answers for a record-store assistant. Rewrite the last assistant draft so it is clear, friendly, and concise. Preserve every fact, id, and number exactly. Do not add information that is not in the draft. Output only the rewritten answer."#;

/// Builder for the session seed message
#[derive(Debug, Clone, Default)]
pub struct SystemPrompt {
    base: Option<String>,
    catalog: Vec<CapabilitySpec>,
    current_date: Option<String>,
}

impl SystemPrompt {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the default operating rules
    pub fn with_base(mut self, base: impl Into<String>) -> Self {
        self.base = Some(base.into());
        self
    }

    /// Attach the capability catalogue
    pub fn with_catalog(mut self, catalog: &[CapabilitySpec]) -> Self {
        self.catalog = catalog.to_vec();
        self
    }

    /// Include the current date line
    pub fn with_current_date(mut self, date: impl Into<String>) -> Self {
        self.current_date = Some(date.into());
        self
    }

    /// Render the final seed text
    pub fn build(self) -> String {
        let mut sections = vec![self.base.unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string())];

        if !self.catalog.is_empty() {
            let mut listing = String::from("Available capabilities:");
            for spec in &self.catalog {
                listing.push_str(&format!("\n- {}: {}", spec.name, spec.description));
            }
            sections.push(listing);
        }

        if let Some(date) = self.current_date {
            sections.push(format!("Current date: {date}"));
        }

        sections.join("\n\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_prompt() {
        let prompt = SystemPrompt::new().build();
        assert!(prompt.contains("Tabletalk"));
    }

    #[test]
    fn test_catalog_and_date_sections() {
        let catalog = vec![CapabilitySpec {
            name: "list_records".to_string(),
            description: "List records from a table".to_string(),
            input_schema: json!({}),
        }];
        let prompt = SystemPrompt::new()
            .with_catalog(&catalog)
            .with_current_date("2026-08-23")
            .build();
        assert!(prompt.contains("- list_records: List records from a table"));
        assert!(prompt.contains("Current date: 2026-08-23"));
    }

    #[test]
    fn test_custom_base_replaces_default() {
        let prompt = SystemPrompt::new().with_base("Custom rules.").build();
        assert!(prompt.starts_with("Custom rules."));
        assert!(!prompt.contains("Tabletalk"));
    }
}
