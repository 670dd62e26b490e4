//! Embedding provider contract and a deterministic hashing provider.
//!
//! Anything that turns text into fixed-length vectors implements
//! [`EmbeddingProvider`]. Implementations must be deterministic for a given
//! model state and truncate inputs to `max_length` token units.

use crate::{Result, Vector};
use ahash::RandomState;

/// Truncation length used when callers do not pass one explicitly
pub const DEFAULT_MAX_LENGTH: usize = 128;

/// Inference-mode text embedding
pub trait EmbeddingProvider {
    /// Output dimension `D`
    fn dim(&self) -> usize;

    /// Embed `texts` into `texts.len()` vectors of dimension [`dim`](Self::dim),
    /// without tracking gradients.
    fn embed_batch(&self, texts: &[&str], max_length: usize) -> Result<Vec<Vector>>;

    /// Single-item convenience over [`embed_batch`](Self::embed_batch).
    fn embed(&self, text: &str) -> Result<Vector> {
        let mut out = self.embed_batch(&[text], DEFAULT_MAX_LENGTH)?;
        out.pop().ok_or(crate::Error::shape("embedding batch", 1, 0))
    }
}

impl<P: EmbeddingProvider + ?Sized> EmbeddingProvider for &P {
    fn dim(&self) -> usize {
        (**self).dim()
    }

    fn embed_batch(&self, texts: &[&str], max_length: usize) -> Result<Vec<Vector>> {
        (**self).embed_batch(texts, max_length)
    }
}

// Fixed seeds keep bucket assignment stable across processes.
const HASH_SEEDS: [u64; 4] = [
    0x243f_6a88_85a3_08d3,
    0x1319_8a2e_0370_7344,
    0xa409_3822_299f_31d0,
    0x082e_fa98_ec4e_6c89,
];

fn hasher() -> RandomState {
    RandomState::with_seeds(HASH_SEEDS[0], HASH_SEEDS[1], HASH_SEEDS[2], HASH_SEEDS[3])
}

/// Lowercased whitespace tokens, truncated to `max_tokens`
pub fn tokenize(text: &str, max_tokens: usize) -> Vec<String> {
    text.split_whitespace()
        .take(max_tokens)
        .map(str::to_lowercase)
        .collect()
}

/// Stable bucket id for a token in a vocabulary of `buckets` slots
#[inline]
pub fn token_bucket(token: &str, buckets: usize) -> usize {
    (hasher().hash_one(token) % buckets.max(1) as u64) as usize
}

/// Non-trainable provider: hashed word and character-trigram counts,
/// L2-normalized. Useful as a baseline and for phrase selection when no
/// trained encoder is at hand.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dim: usize,
}

impl HashingEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(1) }
    }

    fn embed_one(&self, text: &str, max_length: usize) -> Vector {
        let mut components = vec![0.0f32; self.dim];
        for word in tokenize(text, max_length) {
            components[token_bucket(&word, self.dim)] += 2.0;

            let padded: Vec<char> = format!(" {} ", word).chars().collect();
            for tri in padded.windows(3) {
                let gram: String = tri.iter().collect();
                components[token_bucket(&gram, self.dim)] += 1.0;
            }
        }
        let mut vector = Vector::new(components);
        vector.normalize();
        vector
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(64)
    }
}

impl EmbeddingProvider for HashingEmbedder {
    fn dim(&self) -> usize {
        self.dim
    }

    fn embed_batch(&self, texts: &[&str], max_length: usize) -> Result<Vec<Vector>> {
        Ok(texts
            .iter()
            .map(|text| self.embed_one(text, max_length))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_truncates() {
        let tokens = tokenize("Lateral  Movement via SMB", 3);
        assert_eq!(tokens, vec!["lateral", "movement", "via"]);
    }

    #[test]
    fn test_token_bucket_is_stable() {
        assert_eq!(token_bucket("ransomware", 4096), token_bucket("ransomware", 4096));
        assert!(token_bucket("ransomware", 17) < 17);
    }

    #[test]
    fn test_hashing_embedder_deterministic_and_unit() {
        let embedder = HashingEmbedder::new(64);
        let a = embedder.embed("credential dumping").unwrap();
        let b = embedder.embed("credential dumping").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.dim(), 64);
        assert!((a.norm() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_hashing_embedder_similarity_ordering() {
        let embedder = HashingEmbedder::new(128);
        let base = embedder.embed("phishing email attachment").unwrap();
        let near = embedder.embed("phishing email link").unwrap();
        let far = embedder.embed("kernel driver rootkit").unwrap();
        assert!(base.cosine_similarity(&near) > base.cosine_similarity(&far));
    }
}
