//! Translation of payload filters into LanceDB SQL predicates.
use hybridrag_core::error::{Error, Result};
use hybridrag_core::types::Filter;

use crate::schema::{INT_COLUMNS, STRING_COLUMNS};

pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// `None` for an empty filter. Keys must be built-in columns or payload
/// fields declared when the collection was created.
pub fn to_predicate(filter: &Filter, payload_fields: &[String]) -> Result<Option<String>> {
    if filter.is_empty() {
        return Ok(None);
    }
    let mut clauses = Vec::with_capacity(filter.must.len());
    for (key, value) in &filter.must {
        let clause = if INT_COLUMNS.contains(&key.as_str()) {
            let n: i64 = value
                .parse()
                .map_err(|_| Error::InvalidFilter(format!("`{key}` expects an integer, got `{value}`")))?;
            format!("`{key}` = {n}")
        } else if STRING_COLUMNS.contains(&key.as_str()) || payload_fields.iter().any(|f| f == key) {
            format!("`{key}` = {}", quote_literal(value))
        } else {
            return Err(Error::InvalidFilter(format!(
                "`{key}` is not filterable; declare it in index.payload_fields when creating the collection"
            )));
        };
        clauses.push(clause);
    }
    Ok(Some(clauses.join(" AND ")))
}

pub fn ids_predicate(ids: &[String]) -> String {
    let list: Vec<String> = ids.iter().map(|id| quote_literal(id)).collect();
    format!("`id` IN ({})", list.join(", "))
}
