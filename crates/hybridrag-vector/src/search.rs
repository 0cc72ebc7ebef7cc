//! Reads and deletes: similarity search, scroll, retrieve, count and
//! delete-by-filter.
use arrow_array::cast::AsArray;
use arrow_array::types::{Float32Type, Int64Type};
use arrow_array::{Array, Float32Array, Int64Array, RecordBatch, StringArray};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase, Select};
use lancedb::DistanceType;

use hybridrag_core::error::{Error, Result};
use hybridrag_core::traits::VectorSearch;
use hybridrag_core::types::{Fields, Filter, Payload, Point, SearchHit, SearchParams, SourceKind};

use crate::filter::{ids_predicate, to_predicate};
use crate::schema;
use crate::table::{store_err, VectorIndex};

pub(crate) fn string_col<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| Error::connectivity(format!("column `{name}` missing or not utf8")))
}

fn int_col<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a Int64Array> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_primitive_opt::<Int64Type>())
        .ok_or_else(|| Error::connectivity(format!("column `{name}` missing or not int64")))
}

fn to_usize(v: i64) -> usize {
    usize::try_from(v).unwrap_or_default()
}

/// Decodes the payload of row `i`. Per-field columns are ignored in favour
/// of `fields_json`, which holds every field.
fn payload_at(batch: &RecordBatch, i: usize) -> Result<Payload> {
    let indexed_at = string_col(batch, schema::INDEXED_AT)?;
    let fields: Fields = serde_json::from_str(string_col(batch, schema::FIELDS_JSON)?.value(i))?;
    Ok(Payload {
        text: string_col(batch, schema::TEXT)?.value(i).to_string(),
        doc_id: string_col(batch, schema::DOC_ID)?.value(i).to_string(),
        data_source: string_col(batch, schema::DATA_SOURCE)?.value(i).to_string(),
        chunk_index: to_usize(int_col(batch, schema::CHUNK_INDEX)?.value(i)),
        total_chunks: to_usize(int_col(batch, schema::TOTAL_CHUNKS)?.value(i)),
        chunk_start: to_usize(int_col(batch, schema::CHUNK_START)?.value(i)),
        chunk_end: to_usize(int_col(batch, schema::CHUNK_END)?.value(i)),
        fields,
        embedding_model: string_col(batch, schema::EMBEDDING_MODEL)?.value(i).to_string(),
        embedding_provider: string_col(batch, schema::EMBEDDING_PROVIDER)?.value(i).to_string(),
        indexed_at: (!indexed_at.is_null(i)).then(|| indexed_at.value(i).to_string()),
    })
}

fn vector_at(batch: &RecordBatch, i: usize) -> Result<Vec<f32>> {
    let list = batch
        .column_by_name(schema::VECTOR)
        .and_then(|c| c.as_fixed_size_list_opt())
        .ok_or_else(|| Error::connectivity("column `vector` missing"))?;
    let values = list.value(i);
    let floats = values
        .as_primitive_opt::<Float32Type>()
        .ok_or_else(|| Error::connectivity("vector items are not f32"))?;
    Ok(floats.values().to_vec())
}

fn payload_columns() -> Vec<&'static str> {
    vec![
        schema::ID,
        schema::TEXT,
        schema::DOC_ID,
        schema::DATA_SOURCE,
        schema::CHUNK_INDEX,
        schema::TOTAL_CHUNKS,
        schema::CHUNK_START,
        schema::CHUNK_END,
        schema::EMBEDDING_MODEL,
        schema::EMBEDDING_PROVIDER,
        schema::INDEXED_AT,
        schema::FIELDS_JSON,
    ]
}

impl VectorIndex {
    async fn predicate(&self, table: &lancedb::Table, filter: Option<&Filter>) -> Result<Option<String>> {
        match filter {
            Some(f) if !f.is_empty() => to_predicate(f, &self.declared_fields(table).await?),
            _ => Ok(None),
        }
    }

    /// Up to `top_k` points by descending cosine similarity.
    #[tracing::instrument(skip(self, query, params), fields(top_k = params.top_k))]
    pub async fn search(&self, collection: &str, query: &[f32], params: &SearchParams) -> Result<Vec<SearchHit>> {
        if params.top_k == 0 {
            return Ok(Vec::new());
        }
        let table = self.table(collection).await?;
        let predicate = self.predicate(&table, params.filter.as_ref()).await?;

        let mut q = table
            .vector_search(query.to_vec())
            .map_err(store_err)?
            .distance_type(DistanceType::Cosine)
            .select(Select::columns(&payload_columns()))
            .limit(params.top_k);
        if let Some(p) = predicate {
            q = q.only_if(p);
        }
        let batches: Vec<RecordBatch> =
            q.execute().await.map_err(store_err)?.try_collect().await.map_err(store_err)?;

        let mut hits = Vec::new();
        for batch in &batches {
            let ids = string_col(batch, schema::ID)?;
            let distance = batch
                .column_by_name(schema::DISTANCE)
                .and_then(|c| c.as_any().downcast_ref::<Float32Array>());
            for i in 0..batch.num_rows() {
                let score = distance.map_or(0.0, |d| 1.0 - d.value(i));
                if params.score_threshold.is_some_and(|t| score < t) {
                    continue;
                }
                hits.push(SearchHit {
                    id: ids.value(i).to_string(),
                    score,
                    source: SourceKind::Vector,
                    payload: Some(payload_at(batch, i)?),
                });
            }
        }
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(params.top_k);
        tracing::debug!(hits = hits.len(), "dense search");
        Ok(hits)
    }

    pub async fn count(&self, collection: &str, filter: Option<&Filter>) -> Result<usize> {
        let table = self.table(collection).await?;
        let predicate = self.predicate(&table, filter).await?;
        table.count_rows(predicate).await.map_err(store_err)
    }

    /// Every matching `(id, payload)` pair, up to `limit`.
    pub async fn scroll(
        &self,
        collection: &str,
        filter: Option<&Filter>,
        limit: Option<usize>,
    ) -> Result<Vec<(String, Payload)>> {
        let table = self.table(collection).await?;
        let predicate = self.predicate(&table, filter).await?;
        let available = table.count_rows(predicate.clone()).await.map_err(store_err)?;
        let limit = limit.map_or(available, |l| l.min(available));
        if limit == 0 {
            return Ok(Vec::new());
        }

        let mut q = table.query().select(Select::columns(&payload_columns())).limit(limit);
        if let Some(p) = predicate {
            q = q.only_if(p);
        }
        let batches: Vec<RecordBatch> =
            q.execute().await.map_err(store_err)?.try_collect().await.map_err(store_err)?;

        let mut out = Vec::with_capacity(limit);
        for batch in &batches {
            let ids = string_col(batch, schema::ID)?;
            for i in 0..batch.num_rows() {
                out.push((ids.value(i).to_string(), payload_at(batch, i)?));
            }
        }
        Ok(out)
    }

    /// Points with the given ids, vectors included, in no particular order.
    pub async fn retrieve(&self, collection: &str, ids: &[String]) -> Result<Vec<Point>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let table = self.table(collection).await?;
        let batches: Vec<RecordBatch> = table
            .query()
            .only_if(ids_predicate(ids))
            .limit(ids.len())
            .execute()
            .await
            .map_err(store_err)?
            .try_collect()
            .await
            .map_err(store_err)?;

        let mut out = Vec::with_capacity(ids.len());
        for batch in &batches {
            let col = string_col(batch, schema::ID)?;
            for i in 0..batch.num_rows() {
                out.push(Point { id: col.value(i).to_string(), vector: vector_at(batch, i)?, payload: payload_at(batch, i)? });
            }
        }
        Ok(out)
    }

    /// Removes every point matching `filter` and returns how many went away.
    /// An empty filter is refused rather than treated as "delete all".
    #[tracing::instrument(skip(self, filter))]
    pub async fn delete_by_filter(&self, collection: &str, filter: &Filter) -> Result<usize> {
        let table = self.table(collection).await?;
        let predicate = self
            .predicate(&table, Some(filter))
            .await?
            .ok_or_else(|| Error::InvalidFilter("refusing to delete with an empty filter".into()))?;

        let before = table.count_rows(Some(predicate.clone())).await.map_err(store_err)?;
        if before == 0 {
            return Ok(0);
        }
        table.delete(&predicate).await.map_err(store_err)?;
        let after = table.count_rows(Some(predicate)).await.map_err(store_err)?;
        let removed = before.saturating_sub(after);
        tracing::info!(before, after, removed, "deleted points by filter");
        Ok(removed)
    }

    /// Binds this index to one collection for use as a dense retriever.
    pub fn collection(&self, name: impl Into<String>) -> CollectionSearch {
        CollectionSearch { index: self.clone(), name: name.into() }
    }
}

/// A [`VectorSearch`] over one named collection.
#[derive(Clone)]
pub struct CollectionSearch {
    index: VectorIndex,
    name: String,
}

impl CollectionSearch {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }
}

#[async_trait]
impl VectorSearch for CollectionSearch {
    async fn search(&self, query: &[f32], params: &SearchParams) -> Result<Vec<SearchHit>> {
        self.index.search(&self.name, query, params).await
    }
}
