//! Batched, idempotent point writes.
use arrow_array::types::Float32Type;
use arrow_array::{ArrayRef, FixedSizeListArray, Int64Array, RecordBatch, RecordBatchIterator, StringArray};
use arrow_schema::Schema;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use hybridrag_core::error::{Error, Result};
use hybridrag_core::types::Point;

use crate::schema;
use crate::table::{store_err, VectorIndex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpsertReport {
    /// Points written, after collapsing duplicate ids in the input.
    pub written: usize,
    pub batches: usize,
}

fn string_array<'a>(values: impl Iterator<Item = &'a str>) -> ArrayRef {
    Arc::new(StringArray::from_iter_values(values))
}

fn int_array(values: impl Iterator<Item = usize>) -> ArrayRef {
    Arc::new(Int64Array::from_iter_values(values.map(|n| i64::try_from(n).unwrap_or(i64::MAX))))
}

/// Keeps the last occurrence of every id, in first-seen order.
fn dedupe_last_wins(points: &[Point]) -> Vec<&Point> {
    let mut slot: HashMap<&str, usize> = HashMap::new();
    let mut out: Vec<&Point> = Vec::with_capacity(points.len());
    for p in points {
        match slot.get(p.id.as_str()) {
            Some(&i) => out[i] = p,
            None => {
                slot.insert(p.id.as_str(), out.len());
                out.push(p);
            }
        }
    }
    out
}

pub(crate) fn points_to_record_batch(points: &[&Point], arrow_schema: Arc<Schema>, dim: usize) -> Result<RecordBatch> {
    let dim_i32 = i32::try_from(dim).map_err(|_| Error::config("vector size too large"))?;
    let payload_fields = schema::payload_fields(&arrow_schema);

    let vectors = FixedSizeListArray::from_iter_primitive::<Float32Type, _, _>(
        points.iter().map(|p| Some(p.vector.iter().copied().map(Some))),
        dim_i32,
    );
    let fields_json = points
        .iter()
        .map(|p| serde_json::to_string(&p.payload.fields))
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut columns: Vec<ArrayRef> = vec![
        string_array(points.iter().map(|p| p.id.as_str())),
        Arc::new(vectors),
        string_array(points.iter().map(|p| p.payload.text.as_str())),
        string_array(points.iter().map(|p| p.payload.doc_id.as_str())),
        string_array(points.iter().map(|p| p.payload.data_source.as_str())),
        int_array(points.iter().map(|p| p.payload.chunk_index)),
        int_array(points.iter().map(|p| p.payload.total_chunks)),
        int_array(points.iter().map(|p| p.payload.chunk_start)),
        int_array(points.iter().map(|p| p.payload.chunk_end)),
        string_array(points.iter().map(|p| p.payload.embedding_model.as_str())),
        string_array(points.iter().map(|p| p.payload.embedding_provider.as_str())),
        Arc::new(StringArray::from(points.iter().map(|p| p.payload.indexed_at.clone()).collect::<Vec<_>>())),
        Arc::new(StringArray::from(fields_json)),
    ];
    for field in &payload_fields {
        let values: Vec<Option<String>> = points.iter().map(|p| p.payload.fields.get(field).cloned()).collect();
        columns.push(Arc::new(StringArray::from(values)));
    }

    RecordBatch::try_new(arrow_schema, columns).map_err(|e| Error::connectivity(format!("record batch: {e}")))
}

/// Feeds `items` to `write` in batches of `batch_size` and returns the number
/// of batches. The first failing batch stops the run with
/// [`Error::PartialUpsert`], counting what earlier batches committed.
async fn write_in_batches<'a, T, F, Fut>(items: &'a [T], batch_size: usize, pb: &ProgressBar, mut write: F) -> Result<usize>
where
    F: FnMut(&'a [T]) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let total = items.len();
    let committed = AtomicUsize::new(0);
    let mut batches = 0usize;
    for batch in items.chunks(batch_size.max(1)) {
        if let Err(e) = write(batch).await {
            let done = committed.load(Ordering::SeqCst);
            pb.abandon_with_message("upsert failed");
            tracing::error!(committed = done, failed = total - done, error = %e, "upsert batch failed");
            return Err(Error::PartialUpsert { committed: done, failed: total - done, message: e.to_string() });
        }
        let done = committed.fetch_add(batch.len(), Ordering::SeqCst) + batch.len();
        batches += 1;
        pb.set_position(done as u64);
        tracing::debug!(done, total, "upserted batch");
    }
    Ok(batches)
}

impl VectorIndex {
    /// Writes `points`, overwriting any stored point with the same id.
    ///
    /// Points are sent in batches of `upsert_batch_size`. If a batch fails,
    /// the error reports how many points earlier batches committed.
    #[tracing::instrument(skip(self, points), fields(points = points.len()))]
    pub async fn upsert(&self, collection: &str, points: &[Point]) -> Result<UpsertReport> {
        let table = self.table(collection).await?;
        let arrow_schema = table.schema().await.map_err(store_err)?;
        let dim = schema::vector_size(&arrow_schema).unwrap_or_default();
        if let Some(bad) = points.iter().find(|p| p.vector.len() != dim) {
            return Err(Error::DimensionMismatch { expected: dim, actual: bad.vector.len() });
        }

        let unique = dedupe_last_wins(points);
        let total = unique.len();
        if total == 0 {
            return Ok(UpsertReport { written: 0, batches: 0 });
        }

        let pb = if self.show_progress { ProgressBar::new(total as u64) } else { ProgressBar::hidden() };
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} points ({percent}%) {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );

        let table = &table;
        let arrow_schema = &arrow_schema;
        let batches = write_in_batches(&unique, self.batch_size, &pb, move |batch| {
            self.write_batch(table, batch, arrow_schema.clone(), dim)
        })
        .await?;
        pb.finish_with_message("done");
        tracing::info!(written = total, batches, "upsert complete");
        Ok(UpsertReport { written: total, batches })
    }

    async fn write_batch(
        &self,
        table: &lancedb::Table,
        batch: &[&Point],
        arrow_schema: Arc<Schema>,
        dim: usize,
    ) -> Result<()> {
        let record_batch = points_to_record_batch(batch, arrow_schema.clone(), dim)?;
        let reader = Box::new(RecordBatchIterator::new(vec![Ok(record_batch)].into_iter(), arrow_schema));
        let mut mi = table.merge_insert(&[schema::ID]);
        mi.when_matched_update_all(None).when_not_matched_insert_all();
        match tokio::time::timeout(self.timeout, mi.execute(reader)).await {
            Ok(res) => res.map(|_| ()).map_err(store_err),
            Err(_) => Err(Error::connectivity(format!("upsert batch timed out after {:?}", self.timeout))),
        }
    }
}
