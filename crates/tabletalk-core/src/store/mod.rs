//! In-memory record store
//!
//! A small multi-table store with auto-increment ids, enumerated fields,
//! and fuzzy search. Tables and their enumerated values are fixed at
//! compile time; rows are free-form JSON objects plus bookkeeping fields.

pub mod capabilities;

pub use capabilities::register_store_capabilities;

use chrono::Utc;
use parking_lot::RwLock;
use serde_json::{Map, Value, json};
use std::collections::HashMap;

/// Tables the store knows about
pub const TABLES: &[&str] = &["projects", "tasks", "clients", "users", "goals", "milestones"];

/// Enumerated values for a table field, when the field is enumerated
pub fn enum_options(table: &str, field: &str) -> Option<&'static [&'static str]> {
    match (table, field) {
        ("projects", "status") => Some(&["Planned", "In progress", "Completed", "On hold"]),
        ("projects", "priority") => Some(&["Low", "Medium", "High"]),
        ("tasks", "status") => Some(&["Backlog", "Next (P2)", "In progress", "Completed"]),
        ("tasks", "priority") => Some(&["Low", "Medium", "High"]),
        ("clients", "type") => Some(&["Prospect", "Active", "Past"]),
        ("goals", "status") => Some(&["Planned", "In progress", "Completed"]),
        ("milestones", "status") => Some(&["Backlog", "Completed"]),
        _ => None,
    }
}

/// Result of checking a value against a field's enumerated options
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValidation {
    /// Exact match, or the field is not enumerated
    Valid,
    /// Not an exact match but close enough to suggest
    Suggest {
        suggested: String,
        options: Vec<String>,
    },
    /// No plausible match
    Invalid { options: Vec<String> },
}

/// Validate a value against a field's options. A case-insensitive match or
/// a close fuzzy match yields a suggestion for the confirmation workflow.
pub fn validate_field(table: &str, field: &str, value: &str) -> FieldValidation {
    let Some(options) = enum_options(table, field) else {
        return FieldValidation::Valid;
    };

    if options.contains(&value) {
        return FieldValidation::Valid;
    }

    let owned: Vec<String> = options.iter().map(|o| o.to_string()).collect();

    if let Some(exact) = options.iter().find(|o| o.eq_ignore_ascii_case(value)) {
        return FieldValidation::Suggest {
            suggested: exact.to_string(),
            options: owned,
        };
    }

    let best = options
        .iter()
        .map(|o| (similarity(&value.to_lowercase(), &o.to_lowercase()), *o))
        .max_by_key(|(score, _)| *score);
    if let Some((score, candidate)) = best {
        if score >= 60 {
            return FieldValidation::Suggest {
                suggested: candidate.to_string(),
                options: owned,
            };
        }
    }

    FieldValidation::Invalid { options: owned }
}

/// Levenshtein ratio in percent between two strings
pub fn similarity(a: &str, b: &str) -> u8 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 100;
    }

    // Single-row Levenshtein
    let mut row: Vec<usize> = (0..=b.len()).collect();
    for (i, ca) in a.iter().enumerate() {
        let mut prev = row[0];
        row[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = if ca == cb { prev } else { prev + 1 };
            prev = row[j + 1];
            row[j + 1] = cost.min(row[j] + 1).min(prev + 1);
        }
    }
    let distance = row[b.len()];

    (((total - distance) * 100) / total) as u8
}

struct Table {
    next_id: u64,
    rows: Vec<Value>,
}

/// Thread-safe in-memory store
pub struct RecordStore {
    inner: RwLock<HashMap<String, Table>>,
}

impl Default for RecordStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordStore {
    pub fn new() -> Self {
        let tables = TABLES
            .iter()
            .map(|name| {
                (
                    name.to_string(),
                    Table {
                        next_id: 1,
                        rows: Vec::new(),
                    },
                )
            })
            .collect();
        Self {
            inner: RwLock::new(tables),
        }
    }

    /// Insert a row, assigning an id and timestamps. Returns the stored row.
    pub fn insert(&self, table: &str, data: Map<String, Value>) -> Result<Value, String> {
        let mut inner = self.inner.write();
        let t = inner
            .get_mut(table)
            .ok_or_else(|| unknown_table(table))?;

        let now = Utc::now().to_rfc3339();
        let mut row = data;
        row.insert("id".to_string(), json!(t.next_id));
        row.insert("created_at".to_string(), json!(now));
        row.insert("updated_at".to_string(), json!(now));
        t.next_id += 1;

        let row = Value::Object(row);
        t.rows.push(row.clone());
        Ok(row)
    }

    pub fn get(&self, table: &str, id: u64) -> Result<Option<Value>, String> {
        let inner = self.inner.read();
        let t = inner.get(table).ok_or_else(|| unknown_table(table))?;
        Ok(t.rows.iter().find(|r| r["id"] == id).cloned())
    }

    /// Merge `data` into an existing row, refreshing `updated_at`
    pub fn update(&self, table: &str, id: u64, data: Map<String, Value>) -> Result<Value, String> {
        let mut inner = self.inner.write();
        let t = inner.get_mut(table).ok_or_else(|| unknown_table(table))?;
        let row = t
            .rows
            .iter_mut()
            .find(|r| r["id"] == id)
            .ok_or_else(|| format!("no record with id {id} in '{table}'"))?;

        if let Some(obj) = row.as_object_mut() {
            for (key, value) in data {
                if key == "id" || key == "created_at" {
                    continue;
                }
                obj.insert(key, value);
            }
            obj.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));
        }
        Ok(row.clone())
    }

    /// Remove a row, returning it
    pub fn delete(&self, table: &str, id: u64) -> Result<Value, String> {
        let mut inner = self.inner.write();
        let t = inner.get_mut(table).ok_or_else(|| unknown_table(table))?;
        let pos = t
            .rows
            .iter()
            .position(|r| r["id"] == id)
            .ok_or_else(|| format!("no record with id {id} in '{table}'"))?;
        Ok(t.rows.remove(pos))
    }

    /// List rows matching every filter, up to `limit`. String comparisons
    /// are case-insensitive.
    pub fn list(
        &self,
        table: &str,
        filters: &Map<String, Value>,
        limit: usize,
    ) -> Result<Vec<Value>, String> {
        let inner = self.inner.read();
        let t = inner.get(table).ok_or_else(|| unknown_table(table))?;
        Ok(t.rows
            .iter()
            .filter(|row| {
                filters.iter().all(|(key, wanted)| match row.get(key) {
                    Some(Value::String(have)) => wanted
                        .as_str()
                        .map(|w| have.eq_ignore_ascii_case(w))
                        .unwrap_or(false),
                    Some(have) => have == wanted,
                    None => false,
                })
            })
            .take(limit)
            .cloned()
            .collect())
    }

    /// Fuzzy search over string fields; returns `(score, row)` pairs sorted
    /// by score, best first
    pub fn search(
        &self,
        table: &str,
        query: &str,
        min_score: u8,
    ) -> Result<Vec<(u8, Value)>, String> {
        let inner = self.inner.read();
        let t = inner.get(table).ok_or_else(|| unknown_table(table))?;
        let needle = query.to_lowercase();

        let mut hits: Vec<(u8, Value)> = t
            .rows
            .iter()
            .filter_map(|row| {
                let score = row
                    .as_object()?
                    .values()
                    .filter_map(Value::as_str)
                    .map(|s| {
                        let hay = s.to_lowercase();
                        // Substring hits count as strong matches even when
                        // the edit distance is large
                        if hay.contains(&needle) {
                            90
                        } else {
                            similarity(&needle, &hay)
                        }
                    })
                    .max()?;
                (score >= min_score).then(|| (score, row.clone()))
            })
            .collect();
        hits.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(hits)
    }

    /// Row count per table
    pub fn stats(&self) -> Vec<(String, usize)> {
        let inner = self.inner.read();
        let mut counts: Vec<(String, usize)> = TABLES
            .iter()
            .map(|name| {
                (
                    name.to_string(),
                    inner.get(*name).map(|t| t.rows.len()).unwrap_or(0),
                )
            })
            .collect();
        counts.sort_by(|a, b| a.0.cmp(&b.0));
        counts
    }
}

fn unknown_table(table: &str) -> String {
    format!("unknown table '{table}'. Available tables: {}", TABLES.join(", "))
}
