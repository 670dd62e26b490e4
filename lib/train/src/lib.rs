//! # spherix Train
//!
//! Gradient-based training for spherix, built on candle.
//!
//! - [`ContrastiveTrainer`] fine-tunes a [`TrainableEncoder`] on phrase
//!   pairs with in-batch InfoNCE
//! - [`HypersphericalTrainer`] learns one unit-norm row per indicator from a
//!   [`RelationMap`](spherix_core::RelationMap)
//!
//! ## Example
//!
//! ```rust,no_run
//! use spherix_train::{HypersphericalConfig, HypersphericalTrainer};
//!
//! let config = HypersphericalConfig {
//!     num_indicators: 3,
//!     seed: Some(7),
//!     ..Default::default()
//! };
//! let mut trainer = HypersphericalTrainer::new(config);
//! trainer.add_relation(1, &[0]);
//! trainer.add_relation(2, &[0]);
//!
//! let table = trainer.train().unwrap();
//! assert!(table.is_unit_norm(1e-4));
//! println!("HFS = {:.3}", trainer.compute_hfs().unwrap());
//! ```

pub mod config;
pub mod contrastive;
pub mod encoder;
pub mod error;
pub mod hyperspherical;
pub mod loss;
pub mod report;

pub use config::{ContrastiveConfig, EncoderConfig, HypersphericalConfig};
pub use contrastive::ContrastiveTrainer;
pub use encoder::{HashedTokenEncoder, TrainableEncoder};
pub use error::{Error, Result};
pub use hyperspherical::{HypersphericalTrainer, SphereTable};
pub use loss::{bce_with_logits, info_nce_loss, unit_rows};
pub use report::TrainingReport;

pub use candle_core::Device;
