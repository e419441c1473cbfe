#![deny(dead_code)]
#![deny(unused_variables)]
#![deny(unused_imports)]

pub mod artifacts;
pub mod config;
pub mod corpus;
pub mod error;
pub mod normalize;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
pub use traits::{Embedder, Retriever};
pub use types::{Chunk, ChunkMetadata, RetrievalConfig, RetrievalResult, VectorRecord};
