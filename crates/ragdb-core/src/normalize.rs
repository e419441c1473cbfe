//! L2 normalization shared by the offline artifact writer and query time.
//!
//! Indexed rows and query vectors go through the same function, so an inner
//! product between them equals cosine similarity.

use crate::error::{Error, Result};

pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Returns `v / ||v||`. Fails on non-finite components or a zero norm.
pub fn l2_normalize(v: &[f32]) -> Result<Vec<f32>> {
    if v.is_empty() {
        return Err(Error::InvalidInput("cannot normalize an empty vector".to_string()));
    }
    if let Some(pos) = v.iter().position(|x| !x.is_finite()) {
        return Err(Error::InvalidInput(format!("non-finite value at component {pos}; cannot normalize")));
    }
    let norm = l2_norm(v);
    if norm == 0.0 || !norm.is_finite() {
        return Err(Error::InvalidInput(format!("vector norm is {norm}; cannot normalize")));
    }
    Ok(v.iter().map(|x| x / norm).collect())
}

/// Row-wise [`l2_normalize`]; the error names the offending row.
pub fn l2_normalize_rows(rows: &[Vec<f32>]) -> Result<Vec<Vec<f32>>> {
    rows.iter()
        .enumerate()
        .map(|(i, row)| {
            l2_normalize(row).map_err(|e| match e {
                Error::InvalidInput(msg) => Error::InvalidInput(format!("row {i}: {msg}")),
                other => other,
            })
        })
        .collect()
}
