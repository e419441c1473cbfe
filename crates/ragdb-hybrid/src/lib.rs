//! ragdb-hybrid
//!
//! Composition layer: weighted score fusion over a dense and a sparse
//! retriever, the factory that turns a `StrategyConfig` into a retriever, and
//! the pipeline entry point `run(query, top_k)`.

pub mod factory;
pub mod fusion;
pub mod pipeline;

pub use factory::{RetrieverFactory, DEFAULT_ALPHA};
pub use fusion::{fuse, HybridRetriever};
pub use pipeline::RetrievalPipeline;
