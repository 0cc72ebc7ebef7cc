//! hybridrag-hybrid
//!
//! Fuses dense (vector) and sparse (BM25) rankings with weighted reciprocal
//! rank fusion. The sparse side is an immutable snapshot that is rebuilt
//! wholesale and swapped in; readers never see a half-built index.
pub mod engine;
pub mod fusion;
pub mod multi;

pub use engine::{HybridQuery, HybridSearchEngine, SparseSnapshot};
pub use fusion::{reciprocal_rank_fusion, WeightedList, RRF_K};
pub use multi::merge_best;
