//! Loading documents and other records from JSON / JSON-lines files.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;

use crate::error::{Error, Result};
use crate::types::{Document, Fields, Payload};

/// Where a record's body text comes from: an ordered list of field names,
/// the first non-empty string wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextSource {
    Auto,
    Summary,
    Full,
    Combined,
    Fields(Vec<String>),
}

impl Default for TextSource {
    fn default() -> Self {
        Self::Auto
    }
}

impl TextSource {
    pub fn field_order(&self) -> Vec<&str> {
        match self {
            Self::Auto => vec!["auto_summary", "text", "content", "cert_subject"],
            Self::Summary => vec!["auto_summary"],
            Self::Full => vec!["cert_subject"],
            Self::Combined => vec!["text"],
            Self::Fields(names) => names.iter().map(String::as_str).collect(),
        }
    }
}

/// Field order used when pulling text back out of a stored payload.
pub const PAYLOAD_TEXT_ORDER: [&str; 2] = ["text", "content"];

/// Longest value, in characters, a stored payload field keeps.
pub const MAX_FIELD_CHARS: usize = 1000;

/// First non-empty string among `order` in `record`.
pub fn resolve_text<'a>(record: &'a Map<String, Value>, order: &[&str]) -> Option<&'a str> {
    resolve_text_field(record, order).map(|(_, text)| text)
}

/// Like [`resolve_text`], also returning the key the text came from.
pub fn resolve_text_field<'a, 'k>(record: &'a Map<String, Value>, order: &[&'k str]) -> Option<(&'k str, &'a str)> {
    order
        .iter()
        .filter_map(|key| record.get(*key).and_then(Value::as_str).map(|s| (*key, s)))
        .find(|(_, s)| !s.trim().is_empty())
}

fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((cut, _)) => s[..cut].to_string(),
        None => s.to_string(),
    }
}

/// Text of a stored payload: the chunk text, then a `content` field.
pub fn payload_text(payload: &Payload) -> Option<&str> {
    PAYLOAD_TEXT_ORDER
        .iter()
        .filter_map(|key| match *key {
            "text" => Some(payload.text.as_str()),
            other => payload.fields.get(other).map(String::as_str),
        })
        .find(|s| !s.trim().is_empty())
}

/// Reads a file holding either a JSON array of objects or one JSON object
/// per line. Blank lines are ignored.
pub fn read_json_records(path: &Path) -> Result<Vec<Map<String, Value>>> {
    let raw = fs::read_to_string(path)?;
    parse_json_records(&raw)
}

pub fn parse_json_records(raw: &str) -> Result<Vec<Map<String, Value>>> {
    if raw.trim_start().starts_with('[') {
        let values: Vec<Value> = serde_json::from_str(raw)?;
        return values
            .into_iter()
            .enumerate()
            .map(|(i, v)| into_object(v, i + 1))
            .collect();
    }
    raw.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            let value: Value = serde_json::from_str(line)
                .map_err(|e| Error::InvalidRecord { line: i + 1, reason: e.to_string() })?;
            into_object(value, i + 1)
        })
        .collect()
}

fn into_object(value: Value, line: usize) -> Result<Map<String, Value>> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(Error::InvalidRecord { line, reason: format!("expected an object, got {other}") }),
    }
}

/// Builds a document from one record. Returns `Ok(None)` when no text field
/// resolves.
///
/// The field the body came from is not copied into `fields`, since every
/// chunk carries its own text. Other string fields are cut to
/// [`MAX_FIELD_CHARS`].
pub fn record_to_document(record: &Map<String, Value>, source: &TextSource, line: usize) -> Result<Option<Document>> {
    let id = match record.get("id") {
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => return Err(Error::InvalidRecord { line, reason: "missing `id`".into() }),
    };
    let order = source.field_order();
    let Some((body_key, body)) = resolve_text_field(record, &order) else {
        return Ok(None);
    };

    let mut fields = Fields::new();
    for (key, value) in record {
        if key == "id" || key == body_key {
            continue;
        }
        let rendered = match value {
            Value::Null => continue,
            Value::String(s) => truncate_chars(s, MAX_FIELD_CHARS),
            Value::Bool(_) | Value::Number(_) | Value::Array(_) | Value::Object(_) => value.to_string(),
        };
        fields.insert(key.clone(), rendered);
    }
    Ok(Some(Document { id, fields, body: body.to_string() }))
}

/// Loads every document in `path`, skipping records without text.
#[tracing::instrument(skip(source), fields(path = %path.display()))]
pub fn load_documents(path: &Path, source: &TextSource) -> Result<Vec<Document>> {
    let records = read_json_records(path)?;
    let mut docs = Vec::with_capacity(records.len());
    let mut skipped = 0usize;
    for (i, record) in records.iter().enumerate() {
        match record_to_document(record, source, i + 1)? {
            Some(doc) => docs.push(doc),
            None => skipped += 1,
        }
    }
    if skipped > 0 {
        tracing::warn!(skipped, "records without resolvable text were skipped");
    }
    tracing::info!(documents = docs.len(), "loaded documents");
    Ok(docs)
}
