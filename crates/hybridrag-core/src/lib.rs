//! Shared building blocks for the hybridrag retrieval engine: domain types,
//! the error taxonomy, configuration, chunking and record loading.

pub mod chunker;
pub mod config;
pub mod document;
pub mod error;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
