//! Phrase selection and phrase similarity lookup.
//!
//! [`PhraseSelector`] trims a candidate list down to `top_n` phrases by
//! mixing corpus frequency with how central each phrase is among the other
//! candidates. [`PhraseIndex`] answers nearest-phrase queries over a fixed set.

use crate::provider::{EmbeddingProvider, DEFAULT_MAX_LENGTH};
use crate::simd::dot_product_simd;
use crate::{Error, Result, Vector};
use ordered_float::OrderedFloat;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    pub frequency_weight: f32,
    pub similarity_weight: f32,
    pub max_length: usize,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            frequency_weight: 0.7,
            similarity_weight: 0.3,
            max_length: DEFAULT_MAX_LENGTH,
        }
    }
}

/// Full pairwise cosine similarity matrix, row-major `n x n`, diagonal included.
pub fn cosine_matrix(vectors: &[Vector]) -> Vec<f32> {
    let unit: Vec<Vector> = vectors.iter().map(Vector::normalized).collect();
    let n = unit.len();
    let mut matrix = vec![0.0f32; n * n];
    if n == 0 {
        return matrix;
    }
    matrix
        .par_chunks_mut(n)
        .enumerate()
        .for_each(|(i, row)| {
            for (j, cell) in row.iter_mut().enumerate() {
                *cell = dot_product_simd(unit[i].as_slice(), unit[j].as_slice());
            }
        });
    matrix
}

pub struct PhraseSelector<P> {
    provider: P,
    config: SelectorConfig,
}

impl<P: EmbeddingProvider> PhraseSelector<P> {
    pub fn new(provider: P) -> Self {
        Self::with_config(provider, SelectorConfig::default())
    }

    pub fn with_config(provider: P, config: SelectorConfig) -> Self {
        Self { provider, config }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Per-phrase scores `w_f * freq / max(freq) + w_s * mean_similarity`.
    ///
    /// Mean similarity averages a full row of the cosine matrix, so each
    /// phrase's similarity to itself counts too. A non-positive maximum
    /// frequency contributes zero frequency signal.
    pub fn scores<S: AsRef<str>>(&self, phrases: &[S], frequencies: &[f64]) -> Result<Vec<f32>> {
        if frequencies.len() != phrases.len() {
            return Err(Error::shape("frequencies", phrases.len(), frequencies.len()));
        }
        let n = phrases.len();
        if n == 0 {
            return Ok(Vec::new());
        }

        let texts: Vec<&str> = phrases.iter().map(AsRef::as_ref).collect();
        let vectors = self.provider.embed_batch(&texts, self.config.max_length)?;
        if vectors.len() != n {
            return Err(Error::shape("embedding batch", n, vectors.len()));
        }
        let sim = cosine_matrix(&vectors);

        let max_freq = frequencies.iter().copied().fold(f64::MIN, f64::max);
        let scores = (0..n)
            .map(|i| {
                let freq = if max_freq > 0.0 {
                    (frequencies[i] / max_freq) as f32
                } else {
                    0.0
                };
                let mean_sim = sim[i * n..(i + 1) * n].iter().sum::<f32>() / n as f32;
                self.config.frequency_weight * freq + self.config.similarity_weight * mean_sim
            })
            .collect();
        Ok(scores)
    }

    /// Keep the `top_n` best-scoring phrases.
    ///
    /// With `phrases.len() <= top_n` the input is returned unchanged.
    /// Otherwise indices are stably sorted by ascending score (ties keep input
    /// order) and the last `top_n` are returned, lowest score first.
    pub fn select_top_phrases<S: AsRef<str>>(
        &self,
        phrases: &[S],
        frequencies: &[f64],
        top_n: usize,
    ) -> Result<Vec<String>> {
        if frequencies.len() != phrases.len() {
            return Err(Error::shape("frequencies", phrases.len(), frequencies.len()));
        }
        if phrases.len() <= top_n {
            return Ok(phrases.iter().map(|p| p.as_ref().to_string()).collect());
        }

        let scores = self.scores(phrases, frequencies)?;
        let mut order: Vec<usize> = (0..phrases.len()).collect();
        order.sort_by_key(|&i| OrderedFloat(scores[i]));

        Ok(order[order.len() - top_n..]
            .iter()
            .map(|&i| phrases[i].as_ref().to_string())
            .collect())
    }
}

/// Phrases embedded once, queried by cosine similarity
pub struct PhraseIndex {
    phrases: Vec<String>,
    vectors: Vec<Vector>,
}

impl PhraseIndex {
    pub fn build<P: EmbeddingProvider, S: AsRef<str>>(provider: &P, phrases: &[S]) -> Result<Self> {
        let texts: Vec<&str> = phrases.iter().map(AsRef::as_ref).collect();
        let vectors = provider
            .embed_batch(&texts, DEFAULT_MAX_LENGTH)?
            .into_iter()
            .map(|v| v.normalized())
            .collect::<Vec<_>>();
        if vectors.len() != texts.len() {
            return Err(Error::shape("embedding batch", texts.len(), vectors.len()));
        }
        Ok(Self {
            phrases: texts.into_iter().map(str::to_string).collect(),
            vectors,
        })
    }

    pub fn len(&self) -> usize {
        self.phrases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phrases.is_empty()
    }

    /// `k` indexed phrases closest to `query`, best first.
    pub fn most_similar<P: EmbeddingProvider>(
        &self,
        provider: &P,
        query: &str,
        k: usize,
    ) -> Result<Vec<(String, f32)>> {
        let query = provider.embed(query)?.normalized();
        if !self.vectors.is_empty() && query.dim() != self.vectors[0].dim() {
            return Err(Error::shape("query embedding", self.vectors[0].dim(), query.dim()));
        }
        let mut hits: Vec<(usize, f32)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(i, v)| (i, query.dot(v)))
            .collect();
        hits.sort_by_key(|&(i, score)| (std::cmp::Reverse(OrderedFloat(score)), i));
        Ok(hits
            .into_iter()
            .take(k)
            .map(|(i, score)| (self.phrases[i].clone(), score))
            .collect())
    }
}
