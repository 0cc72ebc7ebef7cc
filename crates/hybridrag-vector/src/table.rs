//! LanceDB connection and collection housekeeping.
//!
//! A collection is one LanceDB table. Creating is idempotent; recreating is
//! destructive and must be confirmed explicitly.
use arrow_array::RecordBatchIterator;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase, Select};
use lancedb::{connect, Connection, Table};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use hybridrag_core::config::IndexSettings;
use hybridrag_core::error::{Error, Result};

use crate::schema::{self, build_points_schema, validate_collection_name};

/// Maps store errors onto the shared taxonomy.
pub(crate) fn store_err(e: lancedb::Error) -> Error {
    match e {
        lancedb::Error::TableNotFound { .. } => Error::CollectionNotFound(e.to_string()),
        other => Error::connectivity(other),
    }
}

pub async fn open_db(uri: &str) -> Result<Connection> {
    connect(uri).execute().await.map_err(store_err)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionSpec {
    pub name: String,
    pub vector_size: usize,
    /// Payload fields stored as their own filterable columns.
    pub payload_fields: Vec<String>,
}

impl CollectionSpec {
    pub fn new(name: impl Into<String>, vector_size: usize) -> Self {
        Self { name: name.into(), vector_size, payload_fields: Vec::new() }
    }

    #[must_use]
    pub fn with_payload_fields(mut self, fields: Vec<String>) -> Self {
        self.payload_fields = fields;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateMode {
    /// Create only when missing; an existing collection is left untouched.
    IfMissing,
    /// Drop and recreate. Refused unless `confirm` is set.
    Recreate { confirm: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    Created,
    AlreadyExists,
    Recreated,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionInfo {
    pub name: String,
    pub points_count: usize,
    pub vector_size: usize,
    pub distance: String,
    pub payload_fields: Vec<String>,
    pub embedding_model: Option<String>,
    pub embedding_provider: Option<String>,
}

/// Handle on a LanceDB database holding any number of collections.
#[derive(Clone)]
pub struct VectorIndex {
    pub(crate) db: Connection,
    pub(crate) batch_size: usize,
    pub(crate) timeout: Duration,
    pub(crate) show_progress: bool,
}

impl VectorIndex {
    pub async fn open(uri: &str, settings: &IndexSettings) -> Result<Self> {
        if settings.upsert_batch_size == 0 {
            return Err(Error::config("index.upsert_batch_size must be at least 1"));
        }
        Ok(Self {
            db: open_db(uri).await?,
            batch_size: settings.upsert_batch_size,
            timeout: Duration::from_secs(settings.timeout_secs),
            show_progress: true,
        })
    }

    #[must_use]
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub async fn collection_exists(&self, name: &str) -> Result<bool> {
        let names = self.db.table_names().execute().await.map_err(store_err)?;
        Ok(names.iter().any(|n| n == name))
    }

    pub(crate) async fn table(&self, name: &str) -> Result<Table> {
        self.db.open_table(name).execute().await.map_err(|e| match e {
            lancedb::Error::TableNotFound { .. } => Error::CollectionNotFound(name.to_string()),
            other => Error::connectivity(other),
        })
    }

    /// Payload columns declared on an existing collection.
    pub(crate) async fn declared_fields(&self, table: &Table) -> Result<Vec<String>> {
        let schema = table.schema().await.map_err(store_err)?;
        Ok(schema::payload_fields(&schema))
    }

    #[tracing::instrument(skip(self, spec), fields(collection = %spec.name, size = spec.vector_size))]
    pub async fn create_collection(&self, spec: &CollectionSpec, mode: CreateMode) -> Result<CreateOutcome> {
        validate_collection_name(&spec.name)?;
        let arrow_schema = build_points_schema(spec.vector_size, &spec.payload_fields)?;
        let exists = self.collection_exists(&spec.name).await?;

        let outcome = match (exists, mode) {
            (true, CreateMode::IfMissing) => {
                let table = self.table(&spec.name).await?;
                let existing = table.schema().await.map_err(store_err)?;
                if let Some(actual) = schema::vector_size(&existing) {
                    if actual != spec.vector_size {
                        return Err(Error::DimensionMismatch { expected: spec.vector_size, actual });
                    }
                }
                tracing::debug!("collection already exists");
                return Ok(CreateOutcome::AlreadyExists);
            }
            (_, CreateMode::Recreate { confirm: false }) => {
                return Err(Error::config(format!(
                    "recreating collection `{}` deletes all of its points and must be confirmed",
                    spec.name
                )));
            }
            (true, CreateMode::Recreate { confirm: true }) => {
                self.drop_collection(&spec.name).await?;
                CreateOutcome::Recreated
            }
            (false, _) => CreateOutcome::Created,
        };

        let iter = RecordBatchIterator::new(vec![].into_iter(), arrow_schema.clone());
        self.db
            .create_table(&spec.name, Box::new(iter))
            .execute()
            .await
            .map_err(store_err)?;
        tracing::info!(?outcome, "collection ready");
        Ok(outcome)
    }

    pub async fn drop_collection(&self, name: &str) -> Result<()> {
        self.db.drop_table(name, &[]).await.map_err(store_err)?;
        tracing::warn!(collection = name, "collection dropped");
        Ok(())
    }

    pub async fn get_info(&self, name: &str) -> Result<CollectionInfo> {
        let table = self.table(name).await?;
        let arrow_schema = table.schema().await.map_err(store_err)?;
        let points_count = table.count_rows(None).await.map_err(store_err)?;

        let mut embedding_model = None;
        let mut embedding_provider = None;
        if points_count > 0 {
            let batches: Vec<_> = table
                .query()
                .select(Select::columns(&[schema::EMBEDDING_MODEL, schema::EMBEDDING_PROVIDER]))
                .limit(1)
                .execute()
                .await
                .map_err(store_err)?
                .try_collect()
                .await
                .map_err(store_err)?;
            if let Some(batch) = batches.iter().find(|b| b.num_rows() > 0) {
                embedding_model = Some(crate::search::string_col(batch, schema::EMBEDDING_MODEL)?.value(0).to_string());
                embedding_provider =
                    Some(crate::search::string_col(batch, schema::EMBEDDING_PROVIDER)?.value(0).to_string());
            }
        }

        Ok(CollectionInfo {
            name: name.to_string(),
            points_count,
            vector_size: schema::vector_size(&arrow_schema).unwrap_or_default(),
            distance: "cosine".into(),
            payload_fields: schema::payload_fields(&arrow_schema),
            embedding_model,
            embedding_provider,
        })
    }
}
