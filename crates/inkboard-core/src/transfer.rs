//! JSON export and validating import of a board's marks.

use crate::marks::Mark;
use serde_json::Value;
use std::collections::HashSet;
use thiserror::Error;

/// Errors raised while importing marks.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("Invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("Expected a JSON array of marks")]
    NotAnArray,
    #[error("No valid marks found ({dropped} invalid)")]
    NoValidMarks { dropped: usize },
}

pub type TransferResult<T> = Result<T, TransferError>;

/// Outcome of a successful import.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportReport {
    pub marks: Vec<Mark>,
    /// Elements that were malformed or duplicated.
    pub dropped: usize,
}

/// Serialize marks as a pretty-printed JSON array.
pub fn export_json(marks: &[Mark]) -> TransferResult<String> {
    Ok(serde_json::to_string_pretty(marks)?)
}

/// Parse and validate an exported JSON array.
///
/// Malformed and duplicate elements are dropped. A non-empty array without
/// a single valid element is an error.
pub fn import_json(json: &str) -> TransferResult<ImportReport> {
    let value: Value = serde_json::from_str(json)?;
    let Value::Array(items) = value else {
        return Err(TransferError::NotAnArray);
    };
    let total = items.len();
    let marks = sanitize(items);
    let dropped = total - marks.len();
    if total > 0 && marks.is_empty() {
        return Err(TransferError::NoValidMarks { dropped });
    }
    if dropped > 0 {
        log::warn!("Import dropped {dropped} of {total} elements");
    }
    Ok(ImportReport { marks, dropped })
}

/// Extract valid marks from stored content.
///
/// Anything that is not an array yields no marks; invalid elements are skipped.
pub fn marks_from_value(value: Value) -> Vec<Mark> {
    match value {
        Value::Array(items) => {
            let total = items.len();
            let marks = sanitize(items);
            if marks.len() != total {
                log::warn!("Discarded {} invalid marks from stored content", total - marks.len());
            }
            marks
        }
        Value::Null => Vec::new(),
        other => {
            log::warn!("Stored content is not an array ({})", kind(&other));
            Vec::new()
        }
    }
}

fn sanitize(items: Vec<Value>) -> Vec<Mark> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter_map(|item| serde_json::from_value::<Mark>(item).ok())
        .filter(Mark::is_well_formed)
        .filter(|mark| seen.insert(mark.id.clone()))
        .collect()
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
