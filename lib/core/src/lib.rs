//! # spherix Core
//!
//! Core library for spherix indicator embeddings.
//!
//! This crate holds everything that does not need automatic differentiation:
//!
//! - [`RelationMap`] - child -> parents hierarchy over integer indicators
//! - [`sampler`] - (anchor, positive) phrase pairs and labelled relation pairs
//! - [`EmbeddingTable`] - a trained `(N, dim)` table handed to scorers
//! - [`FidelityScorer`] - the Hierarchical Fidelity Score (HFS)
//! - [`PhraseSelector`] - frequency + centrality phrase selection
//! - [`EmbeddingProvider`] - the text embedding contract
//!
//! ## Example
//!
//! ```rust
//! use spherix_core::{EmbeddingTable, FidelityScorer, RelationMap};
//! use rand::{rngs::StdRng, SeedableRng};
//!
//! let mut relations = RelationMap::new();
//! relations.add_relation(1, &[0]);
//! relations.add_relation(2, &[0]);
//!
//! let table = EmbeddingTable::from_rows(vec![
//!     vec![1.0, 0.0],
//!     vec![0.8, 0.6],
//!     vec![0.6, 0.8],
//! ]).unwrap();
//!
//! let mut rng = StdRng::seed_from_u64(42);
//! let hfs = FidelityScorer::new(&relations)
//!     .compute_hfs(Some(&table), &mut rng)
//!     .unwrap();
//! assert!((0.0..=1.0).contains(&hfs));
//! ```

pub mod error;
pub mod fidelity;
pub mod provider;
pub mod relation;
pub mod sampler;
pub mod selector;
pub mod table;
pub mod vector;

/// Similarity kernels
///
/// Provides hardware-accelerated dot products:
/// - AVX2/FMA on x86_64
/// - unrolled scalar code elsewhere
pub mod simd;

pub use error::{Error, Result};
pub use fidelity::{FidelityScorer, HfsReport};
pub use provider::{EmbeddingProvider, HashingEmbedder, DEFAULT_MAX_LENGTH};
pub use relation::{Indicator, RelationEntry, RelationMap};
pub use sampler::{PairSample, PhrasePair, DEFAULT_NEGATIVES_PER_INDICATOR};
pub use selector::{PhraseIndex, PhraseSelector, SelectorConfig};
pub use table::EmbeddingTable;
pub use vector::Vector;
