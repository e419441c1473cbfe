//! ragdb-text
//!
//! Lexical retrieval: BM25 over chunk text using an in-memory Tantivy index
//! with a lower-cased whitespace analyzer.

pub mod sparse;
pub mod tantivy_utils;

pub use sparse::{min_max_normalize, SparseRetriever};
