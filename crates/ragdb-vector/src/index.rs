//! Exact inner-product index over unit-length rows.
//!
//! Rows are stored row-major in one buffer. Because indexed rows and queries
//! are both L2-normalized, the inner product is the cosine similarity.

use std::path::Path;

use serde::{Deserialize, Serialize};

use ragdb_core::artifacts::{read_json, write_json, SubjectPaths};
use ragdb_core::error::{Error, Result};

/// Row id reported for result slots that have no matching row.
pub const SENTINEL_ROW: i64 = -1;

const FORMAT_VERSION: u32 = 1;
const METRIC: &str = "inner_product";

#[derive(Debug, Serialize, Deserialize)]
struct IndexFile {
    version: u32,
    metric: String,
    dim: usize,
    rows: usize,
    data: Vec<f32>,
}

/// Result of [`FlatIpIndex::search`]: exactly `k` parallel slots in
/// descending score order. Slots past the last real row carry
/// [`SENTINEL_ROW`] and `f32::MIN`.
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbors {
    pub scores: Vec<f32>,
    pub rows: Vec<i64>,
}

impl Neighbors {
    pub fn iter(&self) -> impl Iterator<Item = (f32, i64)> + '_ {
        self.scores.iter().copied().zip(self.rows.iter().copied())
    }
}

#[derive(Debug, Clone)]
pub struct FlatIpIndex {
    dim: usize,
    rows: usize,
    data: Vec<f32>,
}

impl FlatIpIndex {
    pub fn build(vectors: &[Vec<f32>]) -> Result<Self> {
        let first = vectors
            .first()
            .ok_or_else(|| Error::InvalidInput("cannot build an index over zero vectors".to_string()))?;
        let dim = first.len();
        if dim == 0 {
            return Err(Error::InvalidInput("vectors have zero dimension".to_string()));
        }
        let mut data = Vec::with_capacity(vectors.len() * dim);
        for (row, v) in vectors.iter().enumerate() {
            if v.len() != dim {
                return Err(Error::Consistency(format!("row {row} has dimension {}, expected {dim}", v.len())));
            }
            if v.iter().any(|x| !x.is_finite()) {
                return Err(Error::InvalidInput(format!("row {row} contains non-finite values")));
            }
            data.extend_from_slice(v);
        }
        Ok(Self { dim, rows: vectors.len(), data })
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn len(&self) -> usize {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    pub fn row(&self, i: usize) -> Option<&[f32]> {
        (i < self.rows).then(|| &self.data[i * self.dim..(i + 1) * self.dim])
    }

    /// The `k` rows with the largest inner product against `query`.
    ///
    /// Equal scores are ordered by ascending row, so the result is a pure
    /// function of the index contents and the query. A `k` too large to
    /// allocate the padded result for is a config error; callers that only
    /// want real rows should pass `k.min(self.len())`.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Neighbors> {
        if k == 0 {
            return Err(Error::InvalidConfig("k must be a positive integer".to_string()));
        }
        if query.len() != self.dim {
            return Err(Error::Consistency(format!(
                "query dimension {} does not match index dimension {}",
                query.len(),
                self.dim
            )));
        }

        let scores: Vec<f32> = self
            .data
            .chunks_exact(self.dim)
            .map(|row| row.iter().zip(query).map(|(a, b)| a * b).sum())
            .collect();

        let cmp = |a: &usize, b: &usize| scores[*b].total_cmp(&scores[*a]).then(a.cmp(b));
        let take = k.min(self.rows);
        let mut order: Vec<usize> = (0..self.rows).collect();
        if take > 0 && take < order.len() {
            order.select_nth_unstable_by(take - 1, cmp);
            order.truncate(take);
        }
        order.sort_by(cmp);

        let mut out = Neighbors { scores: Vec::new(), rows: Vec::new() };
        out.scores
            .try_reserve_exact(k)
            .and_then(|()| out.rows.try_reserve_exact(k))
            .map_err(|e| Error::InvalidConfig(format!("k={k} exceeds what the index can return: {e}")))?;
        for row in order {
            out.scores.push(scores[row]);
            out.rows.push(row as i64);
        }
        while out.rows.len() < k {
            out.scores.push(f32::MIN);
            out.rows.push(SENTINEL_ROW);
        }
        Ok(out)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = IndexFile {
            version: FORMAT_VERSION,
            metric: METRIC.to_string(),
            dim: self.dim,
            rows: self.rows,
            data: self.data.clone(),
        };
        write_json(path, &file)
    }

    /// Loads `vector.index` for a subject, validating its header and contents.
    pub fn load(paths: &SubjectPaths) -> Result<Self> {
        let path = paths.index();
        let file: IndexFile = read_json(paths, &path)?;
        let malformed = |reason: String| Error::MalformedArtifact { path: path.clone(), reason };
        if file.version != FORMAT_VERSION {
            return Err(malformed(format!("unsupported index version {}", file.version)));
        }
        if file.metric != METRIC {
            return Err(malformed(format!("unsupported metric '{}'", file.metric)));
        }
        if file.dim == 0 || file.rows == 0 {
            return Err(malformed(format!("empty index ({} rows x {} dims)", file.rows, file.dim)));
        }
        if file.data.len() != file.rows * file.dim {
            return Err(malformed(format!(
                "{} values stored for {} rows x {} dims",
                file.data.len(),
                file.rows,
                file.dim
            )));
        }
        if file.data.iter().any(|x| !x.is_finite()) {
            return Err(malformed("index contains non-finite values".to_string()));
        }
        Ok(Self { dim: file.dim, rows: file.rows, data: file.data })
    }
}
