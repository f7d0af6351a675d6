//! Feature vectors and the canonical form used to key them.
//!
//! The incentive layer treats features opaquely: it only ever needs equality,
//! hashing, and a stable serialization (the market's commitment hashes are
//! taken over the serialized form). Two representations are supported, dense
//! numeric vectors and sparse index/value lists.

use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// A classification label. The simulator only exercises binary labels but
/// nothing in the incentive layer assumes that.
pub type Label = u32;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FeatureVector {
    Dense(Vec<f64>),
    Sparse(Vec<(u32, f64)>),
}

impl FeatureVector {
    pub fn dense(values: impl Into<Vec<f64>>) -> Self {
        FeatureVector::Dense(values.into())
    }

    pub fn sparse(pairs: impl Into<Vec<(u32, f64)>>) -> Self {
        FeatureVector::Sparse(pairs.into())
    }

    /// The canonical, key-ready form: sparse pairs sorted by index with
    /// explicit zeros dropped, and `-0.0` folded into `0.0` everywhere so
    /// value-equal vectors key identically.
    pub fn canonicalize(&self) -> FeatureVector {
        match self {
            FeatureVector::Dense(values) => {
                FeatureVector::Dense(values.iter().map(|v| fold_zero(*v)).collect())
            }
            FeatureVector::Sparse(pairs) => {
                let mut canonical: Vec<(u32, f64)> = pairs
                    .iter()
                    .filter(|(_, v)| *v != 0.0)
                    .map(|(i, v)| (*i, fold_zero(*v)))
                    .collect();
                canonical.sort_by_key(|(i, _)| *i);
                FeatureVector::Sparse(canonical)
            }
        }
    }

    /// The vector as `(index, value)` pairs, however it is represented.
    pub fn pairs(&self) -> Vec<(u32, f64)> {
        match self {
            FeatureVector::Dense(values) => values
                .iter()
                .enumerate()
                .map(|(i, v)| (i as u32, *v))
                .collect(),
            FeatureVector::Sparse(pairs) => pairs.clone(),
        }
    }
}

fn fold_zero(v: f64) -> f64 {
    if v == 0.0 {
        0.0
    } else {
        v
    }
}

// Equality and hashing go through IEEE bit patterns so the type can key a
// map. Callers canonicalize first; NaNs never appear in well-formed inputs
// but bit equality keeps the impl total regardless.
impl PartialEq for FeatureVector {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (FeatureVector::Dense(a), FeatureVector::Dense(b)) => {
                a.len() == b.len()
                    && a.iter().zip(b).all(|(x, y)| x.to_bits() == y.to_bits())
            }
            (FeatureVector::Sparse(a), FeatureVector::Sparse(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .zip(b)
                        .all(|((i, x), (j, y))| i == j && x.to_bits() == y.to_bits())
            }
            _ => false,
        }
    }
}

impl Eq for FeatureVector {}

impl Hash for FeatureVector {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            FeatureVector::Dense(values) => {
                state.write_u8(0);
                for v in values {
                    state.write_u64(v.to_bits());
                }
            }
            FeatureVector::Sparse(pairs) => {
                state.write_u8(1);
                for (i, v) in pairs {
                    state.write_u32(*i);
                    state.write_u64(v.to_bits());
                }
            }
        }
    }
}
