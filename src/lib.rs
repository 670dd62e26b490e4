//! # spherix
//!
//! Indicator embeddings for threat intelligence phrase sets.
//!
//! spherix has two training pipelines and the tools to judge and consume
//! their output:
//!
//! - **Contrastive fine-tuning**: a text encoder learns that a phrase and a
//!   lightly augmented copy of it belong together (in-batch InfoNCE)
//! - **Hyperspherical embeddings**: every indicator gets a unit-norm vector
//!   such that children sit close to their parents
//! - **Hierarchical Fidelity Score (HFS)**: fraction of (child, parent) edges
//!   where the parent is closer to the child than a random unrelated indicator
//! - **Phrase selection**: rank phrases by frequency and semantic centrality
//!
//! ## Quick Start
//!
//! ### As a CLI
//!
//! ```bash
//! spherix hyper --relations relations.json --num-indicators 40 --save ./snapshots
//! spherix hfs --snapshot ./snapshots/attack-tree/attack-tree-....snapshot
//! ```
//!
//! ### As a Library
//!
//! ```rust,no_run
//! use spherix::prelude::*;
//!
//! let config = HypersphericalConfig {
//!     num_indicators: 4,
//!     seed: Some(1),
//!     ..Default::default()
//! };
//! let mut trainer = HypersphericalTrainer::new(config);
//! trainer.add_relation(1, &[0]);
//! trainer.add_relation(2, &[0]);
//! trainer.add_relation(3, &[1]);
//!
//! let table = trainer.train().unwrap();
//! let hfs = trainer.compute_hfs().unwrap();
//! println!("{} rows, HFS {:.3}", table.len(), hfs);
//! ```
//!
//! ## Crate Structure
//!
//! - `spherix-core` - relation maps, samplers, HFS scoring, phrase selection
//! - `spherix-train` - candle-based contrastive and hyperspherical trainers
//! - `spherix-storage` - checksummed snapshots of trained tables

// Re-export core types
pub use spherix_core::{
    EmbeddingProvider, EmbeddingTable, Error, FidelityScorer, HashingEmbedder, HfsReport,
    Indicator, PairSample, PhraseIndex, PhrasePair, PhraseSelector, RelationMap, Result,
    SelectorConfig, Vector,
};

// Re-export training
pub use spherix_train::{
    ContrastiveConfig, ContrastiveTrainer, EncoderConfig, HashedTokenEncoder,
    HypersphericalConfig, HypersphericalTrainer, TrainableEncoder, TrainingReport,
};

// Re-export storage
pub use spherix_storage::{EmbeddingSnapshot, SnapshotManager};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        ContrastiveConfig, ContrastiveTrainer, EmbeddingProvider, EmbeddingSnapshot,
        EmbeddingTable, EncoderConfig, Error, FidelityScorer, HashedTokenEncoder,
        HashingEmbedder, HfsReport, HypersphericalConfig, HypersphericalTrainer, Indicator,
        PhraseSelector, RelationMap, Result, SelectorConfig, SnapshotManager, Vector,
    };
}

/// Sampling helpers used by the trainers
pub mod sampler {
    pub use spherix_core::sampler::{augment_phrase, negative_pool, phrase_pairs, relation_samples};
}
