//! # Ingest Module
//!
//! Turns one daily drill log into canonical rows: metadata is validated first, the column
//! mapping is resolved once from the header row, then each data row is normalized.

pub mod field;
pub mod ingestor;
pub mod metadata;
pub mod normalizer;
pub mod resolver;
