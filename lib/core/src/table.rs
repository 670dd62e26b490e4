//! Trained embedding table: one row per indicator, row-major `(rows, dim)`.

use crate::relation::Indicator;
use crate::simd::{dot_product_simd, norm_simd, normalize_in_place};
use crate::{Error, Result};
use ordered_float::OrderedFloat;
use rand::Rng;
use rand_distr::StandardNormal;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawTable")]
pub struct EmbeddingTable {
    rows: usize,
    dim: usize,
    data: Vec<f32>,
}

/// Unchecked wire form; deserialization goes through [`EmbeddingTable::from_flat`].
#[derive(Deserialize)]
struct RawTable {
    rows: usize,
    dim: usize,
    data: Vec<f32>,
}

impl TryFrom<RawTable> for EmbeddingTable {
    type Error = Error;

    fn try_from(raw: RawTable) -> Result<Self> {
        Self::from_flat(raw.rows, raw.dim, raw.data)
    }
}

impl EmbeddingTable {
    /// Wrap a flat row-major buffer.
    pub fn from_flat(rows: usize, dim: usize, data: Vec<f32>) -> Result<Self> {
        let expected = rows
            .checked_mul(dim)
            .ok_or_else(|| Error::shape("embedding table buffer", usize::MAX, data.len()))?;
        if data.len() != expected {
            return Err(Error::shape("embedding table buffer", expected, data.len()));
        }
        Ok(Self { rows, dim, data })
    }

    /// Build from per-row vectors; every row must have the same length.
    pub fn from_rows(rows: Vec<Vec<f32>>) -> Result<Self> {
        let dim = rows.first().map(Vec::len).unwrap_or(0);
        let mut data = Vec::with_capacity(rows.len() * dim);
        for row in &rows {
            if row.len() != dim {
                return Err(Error::shape("embedding row", dim, row.len()));
            }
            data.extend_from_slice(row);
        }
        Ok(Self {
            rows: rows.len(),
            dim,
            data,
        })
    }

    /// Gaussian rows projected onto the unit sphere.
    pub fn random_unit<R: Rng>(rows: usize, dim: usize, rng: &mut R) -> Self {
        let data = (0..rows * dim)
            .map(|_| rng.sample::<f32, _>(StandardNormal))
            .collect();
        let mut table = Self { rows, dim, data };
        table.normalize_rows();
        table
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    #[inline]
    #[must_use]
    pub fn dim(&self) -> usize {
        self.dim
    }

    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    #[inline]
    #[must_use]
    pub fn into_inner(self) -> Vec<f32> {
        self.data
    }

    /// Row `index`. Panics when out of range; see [`EmbeddingTable::get`].
    #[inline]
    #[must_use]
    pub fn row(&self, index: Indicator) -> &[f32] {
        &self.data[index * self.dim..(index + 1) * self.dim]
    }

    #[inline]
    #[must_use]
    pub fn get(&self, index: Indicator) -> Option<&[f32]> {
        (index < self.rows).then(|| self.row(index))
    }

    /// Dot product of two rows (cosine similarity when rows are unit-norm).
    #[inline]
    #[must_use]
    pub fn dot(&self, a: Indicator, b: Indicator) -> f32 {
        dot_product_simd(self.row(a), self.row(b))
    }

    pub fn check_index(&self, index: Indicator) -> Result<()> {
        if index >= self.rows {
            return Err(Error::IndexOutOfRange {
                index,
                num_indicators: self.rows,
            });
        }
        Ok(())
    }

    /// Project every row back onto the unit sphere.
    pub fn normalize_rows(&mut self) {
        if self.dim == 0 {
            return;
        }
        self.data
            .par_chunks_mut(self.dim)
            .for_each(|row| {
                normalize_in_place(row);
            });
    }

    /// Largest `| ||row|| - 1 |` over all rows.
    #[must_use]
    pub fn max_norm_deviation(&self) -> f32 {
        if self.dim == 0 {
            return 0.0;
        }
        self.data
            .chunks_exact(self.dim)
            .map(|row| (norm_simd(row) - 1.0).abs())
            .fold(0.0, f32::max)
    }

    #[must_use]
    pub fn is_unit_norm(&self, tolerance: f32) -> bool {
        self.max_norm_deviation() <= tolerance
    }

    /// The `k` rows most similar (dot product) to `index`, best first,
    /// excluding `index` itself.
    pub fn nearest(&self, index: Indicator, k: usize) -> Result<Vec<(Indicator, f32)>> {
        self.check_index(index)?;
        let mut scored: Vec<(Indicator, f32)> = (0..self.rows)
            .into_par_iter()
            .filter(|&other| other != index)
            .map(|other| (other, self.dot(index, other)))
            .collect();
        scored.sort_by_key(|&(other, score)| (std::cmp::Reverse(OrderedFloat(score)), other));
        scored.truncate(k);
        Ok(scored)
    }
}
