//! Record store capabilities
//!
//! The CRUD, search, and stats operations exposed to the decision model.
//! Create and update validate enumerated fields through
//! [`validate_field`](super::validate_field) and suspend with confirmation
//! flags instead of failing outright when a close match exists.

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use std::sync::Arc;

use crate::capability::{Capability, CapabilityOutcome, CapabilityRegistry};
use crate::error::CapabilityError;

use super::{FieldValidation, RecordStore, TABLES, enum_options, validate_field};

fn table_list() -> String {
    TABLES.join(", ")
}

fn data_object(args: &Value) -> Map<String, Value> {
    args.get("data")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default()
}

/// Check every enumerated field in `data`. Returns a suspended or failed
/// outcome on the first problem, `None` when everything validates.
fn check_enumerated_fields(table: &str, data: &Map<String, Value>) -> Option<CapabilityOutcome> {
    for (field, value) in data {
        if enum_options(table, field).is_none() {
            continue;
        }
        let Some(value) = value.as_str() else {
            continue;
        };
        match validate_field(table, field, value) {
            FieldValidation::Valid => {}
            FieldValidation::Suggest { suggested, options } => {
                return Some(CapabilityOutcome::needs_field_confirmation(
                    field,
                    value,
                    &suggested,
                    options,
                    format!("'{value}' is not a valid {field}. Did you mean '{suggested}'?"),
                ));
            }
            FieldValidation::Invalid { options } => {
                return Some(CapabilityOutcome::failure(format!(
                    "'{value}' is not a valid {field} for {table}. Valid options: {}",
                    options.join(", ")
                )));
            }
        }
    }
    None
}

fn required_table(args: &Value) -> Result<String, CapabilityError> {
    args.get("table")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| CapabilityError::InvalidArguments("'table' is required".to_string()))
}

fn required_id(args: &Value) -> Result<u64, CapabilityError> {
    args.get("id")
        .and_then(Value::as_u64)
        .ok_or_else(|| CapabilityError::InvalidArguments("'id' is required".to_string()))
}

/// Create a record, gating empty names behind a generic confirmation
pub struct CreateRecord {
    store: Arc<RecordStore>,
}

#[async_trait]
impl Capability for CreateRecord {
    fn name(&self) -> &str {
        "create_record"
    }

    fn description(&self) -> &str {
        "Create a new record in a table. Provide the field values in 'data'."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "table": {
                    "type": "string",
                    "description": format!("One of: {}", table_list())
                },
                "data": {
                    "type": "object",
                    "description": "Field values for the new record, e.g. name, status"
                },
                "confirmed": {
                    "type": "boolean",
                    "description": "Set after the user approved creating without a name"
                }
            },
            "required": ["table", "data"]
        })
    }

    async fn invoke(&self, args: Value) -> Result<CapabilityOutcome, CapabilityError> {
        let table = required_table(&args)?;
        let data = data_object(&args);
        let confirmed = args.get("confirmed").and_then(Value::as_bool).unwrap_or(false);

        let name_empty = data
            .get("name")
            .and_then(Value::as_str)
            .map(|s| s.trim().is_empty())
            .unwrap_or(true);
        if name_empty && !confirmed {
            return Ok(CapabilityOutcome::needs_confirmation(format!(
                "You're about to create a record in '{table}' without a name. Create it anyway?"
            )));
        }

        if let Some(outcome) = check_enumerated_fields(&table, &data) {
            return Ok(outcome);
        }

        match self.store.insert(&table, data) {
            Ok(row) => Ok(CapabilityOutcome::ok_with_message(
                format!("Created {table} record #{}.", row["id"]),
                Some(row),
            )),
            Err(e) => Ok(CapabilityOutcome::failure(e)),
        }
    }
}

/// Fetch one record by id
pub struct ReadRecord {
    store: Arc<RecordStore>,
}

#[async_trait]
impl Capability for ReadRecord {
    fn name(&self) -> &str {
        "read_record"
    }

    fn description(&self) -> &str {
        "Fetch a single record by table and id."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "table": { "type": "string", "description": format!("One of: {}", table_list()) },
                "id": { "type": "integer" }
            },
            "required": ["table", "id"]
        })
    }

    async fn invoke(&self, args: Value) -> Result<CapabilityOutcome, CapabilityError> {
        let table = required_table(&args)?;
        let id = required_id(&args)?;
        match self.store.get(&table, id) {
            Ok(Some(row)) => Ok(CapabilityOutcome::ok(Some(row))),
            Ok(None) => Ok(CapabilityOutcome::failure(format!(
                "no record with id {id} in '{table}'"
            ))),
            Err(e) => Ok(CapabilityOutcome::failure(e)),
        }
    }
}

/// Merge new field values into an existing record
pub struct UpdateRecord {
    store: Arc<RecordStore>,
}

#[async_trait]
impl Capability for UpdateRecord {
    fn name(&self) -> &str {
        "update_record"
    }

    fn description(&self) -> &str {
        "Update fields of an existing record. Only the fields in 'data' change."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "table": { "type": "string", "description": format!("One of: {}", table_list()) },
                "id": { "type": "integer" },
                "data": { "type": "object", "description": "Fields to change" }
            },
            "required": ["table", "id", "data"]
        })
    }

    async fn invoke(&self, args: Value) -> Result<CapabilityOutcome, CapabilityError> {
        let table = required_table(&args)?;
        let id = required_id(&args)?;
        let data = data_object(&args);

        if data.is_empty() {
            return Ok(CapabilityOutcome::failure("no fields to update"));
        }
        if let Some(outcome) = check_enumerated_fields(&table, &data) {
            return Ok(outcome);
        }

        match self.store.update(&table, id, data) {
            Ok(row) => Ok(CapabilityOutcome::ok_with_message(
                format!("Updated {table} record #{id}."),
                Some(row),
            )),
            Err(e) => Ok(CapabilityOutcome::failure(e)),
        }
    }
}

/// Remove a record by id
pub struct DeleteRecord {
    store: Arc<RecordStore>,
}

#[async_trait]
impl Capability for DeleteRecord {
    fn name(&self) -> &str {
        "delete_record"
    }

    fn description(&self) -> &str {
        "Delete a record by table and id. This cannot be undone."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "table": { "type": "string", "description": format!("One of: {}", table_list()) },
                "id": { "type": "integer" }
            },
            "required": ["table", "id"]
        })
    }

    async fn invoke(&self, args: Value) -> Result<CapabilityOutcome, CapabilityError> {
        let table = required_table(&args)?;
        let id = required_id(&args)?;
        match self.store.delete(&table, id) {
            Ok(row) => Ok(CapabilityOutcome::ok_with_message(
                format!("Deleted {table} record #{id}."),
                Some(row),
            )),
            Err(e) => Ok(CapabilityOutcome::failure(e)),
        }
    }
}

const LIST_DEFAULT_LIMIT: usize = 20;
const LIST_MAX_LIMIT: usize = 100;

/// List records with optional equality filters
pub struct ListRecords {
    store: Arc<RecordStore>,
}

#[async_trait]
impl Capability for ListRecords {
    fn name(&self) -> &str {
        "list_records"
    }

    fn description(&self) -> &str {
        "List records from a table, optionally filtered by exact field values."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "table": { "type": "string", "description": format!("One of: {}", table_list()) },
                "filters": { "type": "object", "description": "Field/value pairs records must match" },
                "limit": { "type": "integer", "description": "Maximum records to return (default 20, max 100)" }
            },
            "required": ["table"]
        })
    }

    async fn invoke(&self, args: Value) -> Result<CapabilityOutcome, CapabilityError> {
        let table = required_table(&args)?;
        let filters = args
            .get("filters")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        let limit = args
            .get("limit")
            .and_then(Value::as_u64)
            .map(|l| (l as usize).clamp(1, LIST_MAX_LIMIT))
            .unwrap_or(LIST_DEFAULT_LIMIT);

        match self.store.list(&table, &filters, limit) {
            Ok(rows) => Ok(CapabilityOutcome::ok_with_message(
                format!("Found {} record(s) in '{table}'.", rows.len()),
                Some(json!({ "count": rows.len(), "records": rows })),
            )),
            Err(e) => Ok(CapabilityOutcome::failure(e)),
        }
    }
}

const SEARCH_DEFAULT_MIN: u8 = 60;
const SEARCH_FALLBACK_MIN: u8 = 30;
const SEARCH_FALLBACK_TOP: usize = 5;

/// Fuzzy search across a table's string fields
pub struct SearchRecords {
    store: Arc<RecordStore>,
}

#[async_trait]
impl Capability for SearchRecords {
    fn name(&self) -> &str {
        "search_records"
    }

    fn description(&self) -> &str {
        "Fuzzy-search a table by text. Finds records even when the query has typos."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "table": { "type": "string", "description": format!("One of: {}", table_list()) },
                "query": { "type": "string" },
                "min_similarity": { "type": "integer", "description": "Match threshold 0-100 (default 60)" }
            },
            "required": ["table", "query"]
        })
    }

    async fn invoke(&self, args: Value) -> Result<CapabilityOutcome, CapabilityError> {
        let table = required_table(&args)?;
        let query = args
            .get("query")
            .and_then(Value::as_str)
            .ok_or_else(|| CapabilityError::InvalidArguments("'query' is required".to_string()))?;
        let min = args
            .get("min_similarity")
            .and_then(Value::as_u64)
            .map(|m| m.min(100) as u8)
            .unwrap_or(SEARCH_DEFAULT_MIN);

        let hits = match self.store.search(&table, query, min) {
            Ok(hits) => hits,
            Err(e) => return Ok(CapabilityOutcome::failure(e)),
        };

        if !hits.is_empty() {
            let records: Vec<Value> = hits
                .into_iter()
                .map(|(score, row)| json!({ "score": score, "record": row }))
                .collect();
            return Ok(CapabilityOutcome::ok_with_message(
                format!("Found {} match(es) for '{query}' in '{table}'.", records.len()),
                Some(json!({ "matches": records })),
            ));
        }

        // No direct hits: offer weaker candidates as suggestions
        let suggestions: Vec<Value> = self
            .store
            .search(&table, query, SEARCH_FALLBACK_MIN)
            .unwrap_or_default()
            .into_iter()
            .take(SEARCH_FALLBACK_TOP)
            .map(|(score, row)| json!({ "score": score, "record": row }))
            .collect();

        Ok(CapabilityOutcome::ok_with_message(
            format!("No matches for '{query}' in '{table}'."),
            Some(json!({ "matches": [], "suggestions": suggestions })),
        ))
    }
}

/// Row counts for every table
pub struct StoreStats {
    store: Arc<RecordStore>,
}

#[async_trait]
impl Capability for StoreStats {
    fn name(&self) -> &str {
        "store_stats"
    }

    fn description(&self) -> &str {
        "Record counts for every table in the store."
    }

    fn input_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn invoke(&self, _args: Value) -> Result<CapabilityOutcome, CapabilityError> {
        let stats = self.store.stats();
        let total: usize = stats.iter().map(|(_, n)| n).sum();
        let tables: Map<String, Value> = stats
            .into_iter()
            .map(|(name, count)| (name, json!(count)))
            .collect();
        Ok(CapabilityOutcome::ok(Some(json!({
            "total": total,
            "tables": tables
        }))))
    }
}

/// Current date and time
pub struct CurrentDatetime;

#[async_trait]
impl Capability for CurrentDatetime {
    fn name(&self) -> &str {
        "current_datetime"
    }

    fn description(&self) -> &str {
        "The current date and time. Use this instead of guessing dates."
    }

    fn input_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn invoke(&self, _args: Value) -> Result<CapabilityOutcome, CapabilityError> {
        let now = chrono::Local::now();
        Ok(CapabilityOutcome::ok(Some(json!({
            "datetime": now.to_rfc3339(),
            "date": now.format("%Y-%m-%d").to_string(),
            "time": now.format("%H:%M:%S").to_string(),
            "weekday": now.format("%A").to_string()
        }))))
    }
}

/// Register the full store capability set on a registry
pub fn register_store_capabilities(registry: &mut CapabilityRegistry, store: Arc<RecordStore>) {
    registry.register(Arc::new(CreateRecord { store: store.clone() }));
    registry.register(Arc::new(ReadRecord { store: store.clone() }));
    registry.register(Arc::new(UpdateRecord { store: store.clone() }));
    registry.register(Arc::new(DeleteRecord { store: store.clone() }));
    registry.register(Arc::new(ListRecords { store: store.clone() }));
    registry.register(Arc::new(SearchRecords { store: store.clone() }));
    registry.register(Arc::new(StoreStats { store }));
    registry.register(Arc::new(CurrentDatetime));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> (CapabilityRegistry, Arc<RecordStore>) {
        let store = Arc::new(RecordStore::new());
        let mut registry = CapabilityRegistry::new();
        register_store_capabilities(&mut registry, store.clone());
        (registry, store)
    }

    #[tokio::test]
    async fn test_create_with_valid_fields() {
        let (registry, store) = registry();
        let outcome = registry
            .invoke(
                "create_record",
                json!({ "table": "projects", "data": { "name": "Atlas", "status": "Planned" } }),
            )
            .await;
        assert!(outcome.success, "{:?}", outcome.error);
        assert!(store.get("projects", 1).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_create_without_name_needs_confirmation() {
        let (registry, store) = registry();
        let outcome = registry
            .invoke("create_record", json!({ "table": "tasks", "data": {} }))
            .await;
        assert!(outcome.requires_confirmation);
        assert!(store.get("tasks", 1).unwrap().is_none());

        // Confirmed retry goes through
        let outcome = registry
            .invoke(
                "create_record",
                json!({ "table": "tasks", "data": {}, "confirmed": true }),
            )
            .await;
        assert!(outcome.success);
    }

    #[tokio::test]
    async fn test_create_with_case_mismatch_suspends() {
        let (registry, store) = registry();
        let outcome = registry
            .invoke(
                "create_record",
                json!({ "table": "projects", "data": { "name": "Atlas", "status": "on hold" } }),
            )
            .await;
        assert!(outcome.requires_field_confirmation);
        assert_eq!(outcome.field.as_deref(), Some("status"));
        assert_eq!(outcome.suggested_value.as_deref(), Some("On hold"));
        assert!(store.get("projects", 1).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_create_with_invalid_enum_fails() {
        let (registry, _) = registry();
        let outcome = registry
            .invoke(
                "create_record",
                json!({ "table": "clients", "data": { "name": "Acme", "type": "zzzzzz" } }),
            )
            .await;
        assert!(!outcome.success);
        assert!(!outcome.requires_field_confirmation);
        assert!(outcome.error.unwrap().contains("Prospect"));
    }

    #[tokio::test]
    async fn test_read_missing_record() {
        let (registry, _) = registry();
        let outcome = registry
            .invoke("read_record", json!({ "table": "projects", "id": 99 }))
            .await;
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("99"));
    }

    #[tokio::test]
    async fn test_update_validates_enums() {
        let (registry, store) = registry();
        store
            .insert("projects", data(&[("name", "Atlas"), ("status", "Planned")]))
            .unwrap();

        let outcome = registry
            .invoke(
                "update_record",
                json!({ "table": "projects", "id": 1, "data": { "status": "completed" } }),
            )
            .await;
        assert!(outcome.requires_field_confirmation);

        let outcome = registry
            .invoke(
                "update_record",
                json!({ "table": "projects", "id": 1, "data": { "status": "Completed" } }),
            )
            .await;
        assert!(outcome.success);
        assert_eq!(store.get("projects", 1).unwrap().unwrap()["status"], "Completed");
    }

    #[tokio::test]
    async fn test_delete_round_trip() {
        let (registry, store) = registry();
        store.insert("goals", data(&[("name", "Q3 revenue")])).unwrap();

        let outcome = registry
            .invoke("delete_record", json!({ "table": "goals", "id": 1 }))
            .await;
        assert!(outcome.success);
        assert!(store.get("goals", 1).unwrap().is_none());

        let outcome = registry
            .invoke("delete_record", json!({ "table": "goals", "id": 1 }))
            .await;
        assert!(!outcome.success);
    }

    #[tokio::test]
    async fn test_list_with_filters_and_limit_clamp() {
        let (registry, store) = registry();
        for n in 0..3 {
            store
                .insert(
                    "tasks",
                    data(&[("name", &format!("task {n}")), ("status", "Backlog")]),
                )
                .unwrap();
        }

        let outcome = registry
            .invoke(
                "list_records",
                json!({ "table": "tasks", "filters": { "status": "backlog" }, "limit": 500 }),
            )
            .await;
        assert!(outcome.success);
        assert_eq!(outcome.data.unwrap()["count"], 3);
    }

    #[tokio::test]
    async fn test_search_falls_back_to_suggestions() {
        let (registry, store) = registry();
        store
            .insert("projects", data(&[("name", "Website redesign")]))
            .unwrap();

        let outcome = registry
            .invoke(
                "search_records",
                json!({ "table": "projects", "query": "webzite r", "min_similarity": 95 }),
            )
            .await;
        assert!(outcome.success);
        let data = outcome.data.unwrap();
        assert_eq!(data["matches"].as_array().unwrap().len(), 0);
        assert!(!data["suggestions"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stats_and_datetime() {
        let (registry, store) = registry();
        store.insert("users", data(&[("name", "Lee")])).unwrap();

        let outcome = registry.invoke("store_stats", json!({})).await;
        assert!(outcome.success);
        let data = outcome.data.unwrap();
        assert_eq!(data["total"], 1);
        assert_eq!(data["tables"]["users"], 1);

        let outcome = registry.invoke("current_datetime", json!({})).await;
        assert!(outcome.success);
        assert!(outcome.data.unwrap()["date"].is_string());
    }

    fn data(pairs: &[(&str, &str)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), json!(v)))
            .collect()
    }
}
