//! Arrow layout of a collection.
//!
//! Fixed columns hold the point id, the vector and the built-in payload keys.
//! `fields_json` keeps every document field; fields named at creation time
//! additionally get their own nullable column so they can be filtered on.
use arrow_schema::{DataType, Field, Schema};
use std::sync::Arc;

use hybridrag_core::error::{Error, Result};

pub const ID: &str = "id";
pub const VECTOR: &str = "vector";
pub const TEXT: &str = "text";
pub const DOC_ID: &str = "doc_id";
pub const DATA_SOURCE: &str = "data_source";
pub const CHUNK_INDEX: &str = "chunk_index";
pub const TOTAL_CHUNKS: &str = "total_chunks";
pub const CHUNK_START: &str = "chunk_start";
pub const CHUNK_END: &str = "chunk_end";
pub const EMBEDDING_MODEL: &str = "embedding_model";
pub const EMBEDDING_PROVIDER: &str = "embedding_provider";
pub const INDEXED_AT: &str = "indexed_at";
pub const FIELDS_JSON: &str = "fields_json";
pub const DISTANCE: &str = "_distance";

pub const STRING_COLUMNS: [&str; 6] = [ID, TEXT, DOC_ID, DATA_SOURCE, EMBEDDING_MODEL, EMBEDDING_PROVIDER];
pub const INT_COLUMNS: [&str; 4] = [CHUNK_INDEX, TOTAL_CHUNKS, CHUNK_START, CHUNK_END];

const RESERVED: [&str; 14] = [
    ID, VECTOR, TEXT, DOC_ID, DATA_SOURCE, CHUNK_INDEX, TOTAL_CHUNKS, CHUNK_START, CHUNK_END,
    EMBEDDING_MODEL, EMBEDDING_PROVIDER, INDEXED_AT, FIELDS_JSON, DISTANCE,
];

pub fn is_reserved(name: &str) -> bool {
    RESERVED.contains(&name)
}

/// Payload field names must be plain identifiers and must not shadow a
/// fixed column.
pub fn validate_payload_field(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = chars.next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid {
        return Err(Error::config(format!("payload field `{name}` must be an ASCII identifier")));
    }
    if is_reserved(name) {
        return Err(Error::config(format!("payload field `{name}` collides with a built-in column")));
    }
    Ok(())
}

pub fn validate_collection_name(name: &str) -> Result<()> {
    let ok = !name.is_empty()
        && name.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if ok {
        Ok(())
    } else {
        Err(Error::config(format!("invalid collection name `{name}`")))
    }
}

fn vector_type(dim: i32) -> DataType {
    DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dim)
}

pub fn build_points_schema(dim: usize, payload_fields: &[String]) -> Result<Arc<Schema>> {
    let dim = i32::try_from(dim).map_err(|_| Error::config(format!("vector size {dim} is too large")))?;
    if dim <= 0 {
        return Err(Error::config("vector size must be at least 1"));
    }
    let mut fields = vec![
        Field::new(ID, DataType::Utf8, false),
        Field::new(VECTOR, vector_type(dim), true),
        Field::new(TEXT, DataType::Utf8, false),
        Field::new(DOC_ID, DataType::Utf8, false),
        Field::new(DATA_SOURCE, DataType::Utf8, false),
        Field::new(CHUNK_INDEX, DataType::Int64, false),
        Field::new(TOTAL_CHUNKS, DataType::Int64, false),
        Field::new(CHUNK_START, DataType::Int64, false),
        Field::new(CHUNK_END, DataType::Int64, false),
        Field::new(EMBEDDING_MODEL, DataType::Utf8, false),
        Field::new(EMBEDDING_PROVIDER, DataType::Utf8, false),
        Field::new(INDEXED_AT, DataType::Utf8, true),
        Field::new(FIELDS_JSON, DataType::Utf8, false),
    ];
    for name in payload_fields {
        validate_payload_field(name)?;
        fields.push(Field::new(name, DataType::Utf8, true));
    }
    Ok(Arc::new(Schema::new(fields)))
}

/// Vector size of an existing collection schema.
pub fn vector_size(schema: &Schema) -> Option<usize> {
    match schema.field_with_name(VECTOR).ok()?.data_type() {
        DataType::FixedSizeList(_, n) => usize::try_from(*n).ok(),
        _ => None,
    }
}

/// Extra filterable payload columns of an existing collection.
pub fn payload_fields(schema: &Schema) -> Vec<String> {
    schema
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .filter(|n| !is_reserved(n))
        .collect()
}
