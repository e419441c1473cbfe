//! ragdb-vector
//!
//! Dense retrieval: a flat inner-product index, the retriever that embeds
//! queries against it, and the offline writer for its on-disk artifacts.

pub mod artifacts;
pub mod dense;
pub mod index;

pub use artifacts::{write_dense_artifacts, DenseArtifacts};
pub use dense::DenseRetriever;
pub use index::{FlatIpIndex, Neighbors, SENTINEL_ROW};
