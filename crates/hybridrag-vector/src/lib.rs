//! hybridrag-vector
//!
//! Persistent dense index on LanceDB. One collection is one table holding
//! `(id, vector, payload)` rows; similarity is always cosine.
//!
//! Typical flow:
//! 1) `VectorIndex::open` on a database directory
//! 2) `create_collection` (idempotent) or `ingest`, which creates on demand
//! 3) `search` / `scroll` / `delete_by_filter`
pub mod filter;
pub mod ingest;
pub mod schema;
pub mod search;
pub mod table;
pub mod writer;

pub use ingest::{point_id, IngestOptions, IngestReport};
pub use search::CollectionSearch;
pub use table::{open_db, CollectionInfo, CollectionSpec, CreateMode, CreateOutcome, VectorIndex};
pub use writer::UpsertReport;
