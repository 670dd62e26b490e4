//! Contrastive phrase fine-tuning.
//!
//! Each epoch every phrase is paired with a freshly augmented view of itself;
//! batches of pairs are scored with in-batch InfoNCE and the encoder's
//! parameters take one Adam step per batch.

use candle_core::Tensor;
use candle_nn::{AdamW, Optimizer};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use spherix_core::sampler::phrase_pairs;
use spherix_core::PhrasePair;
use tracing::{debug, info, warn};

use crate::config::ContrastiveConfig;
use crate::encoder::TrainableEncoder;
use crate::hyperspherical::adam;
use crate::loss::{info_nce_loss, scalar};
use crate::report::TrainingReport;
use crate::Result;

pub struct ContrastiveTrainer<E> {
    encoder: E,
    config: ContrastiveConfig,
    optimizer: AdamW,
    rng: StdRng,
    report: TrainingReport,
}

impl<E: TrainableEncoder> ContrastiveTrainer<E> {
    pub fn new(encoder: E, config: ContrastiveConfig) -> Result<Self> {
        config.validate()?;
        let optimizer = adam(encoder.trainable_vars(), config.learning_rate)?;
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Ok(Self {
            encoder,
            config,
            optimizer,
            rng,
            report: TrainingReport::default(),
        })
    }

    pub fn encoder(&self) -> &E {
        &self.encoder
    }

    pub fn into_encoder(self) -> E {
        self.encoder
    }

    pub fn config(&self) -> &ContrastiveConfig {
        &self.config
    }

    /// Losses of the most recent [`train_contrastive`](Self::train_contrastive) call.
    pub fn report(&self) -> &TrainingReport {
        &self.report
    }

    /// InfoNCE over `pairs`, attached to the encoder graph.
    pub fn batch_loss(&self, pairs: &[PhrasePair]) -> Result<Tensor> {
        let anchors: Vec<&str> = pairs.iter().map(|p| p.anchor.as_str()).collect();
        let positives: Vec<&str> = pairs.iter().map(|p| p.positive.as_str()).collect();
        let a = self.encoder.forward(&anchors, self.config.max_length)?;
        let p = self.encoder.forward(&positives, self.config.max_length)?;
        info_nce_loss(&a, &p, self.config.temperature)
    }

    /// One optimizer step on `pairs`; returns the batch loss.
    pub fn train_step(&mut self, pairs: &[PhrasePair]) -> Result<f32> {
        let loss = self.batch_loss(pairs)?;
        self.optimizer.backward_step(&loss)?;
        scalar(&loss)
    }

    /// [`train_contrastive`](Self::train_contrastive) for `config.epochs` epochs.
    pub fn train<S: AsRef<str>>(&mut self, phrases: &[S]) -> Result<()> {
        let epochs = self.config.epochs;
        self.train_contrastive(phrases, epochs)
    }

    /// Fine-tune the encoder in place for `epochs` epochs over `phrases`.
    ///
    /// There is no convergence check. A failing batch aborts the run; steps
    /// already taken are not rolled back.
    pub fn train_contrastive<S: AsRef<str>>(&mut self, phrases: &[S], epochs: usize) -> Result<()> {
        let mut report = TrainingReport::default();
        if phrases.is_empty() {
            warn!("no phrases to train on");
            self.report = report;
            return Ok(());
        }
        info!(
            phrases = phrases.len(),
            epochs,
            batch_size = self.config.batch_size,
            "starting contrastive training"
        );

        for epoch in 1..=epochs {
            let mut pairs = phrase_pairs(phrases, &mut self.rng);
            pairs.shuffle(&mut self.rng);

            let mut total = 0.0f64;
            let mut batches = 0usize;
            for batch in pairs.chunks(self.config.batch_size) {
                let loss = self.train_step(batch)?;
                debug!(epoch, batch = batches, loss, "contrastive step");
                total += loss as f64;
                batches += 1;
            }
            let avg = total / batches as f64;
            report.record_epoch(avg, batches);
            info!(epoch, avg_loss = avg, "contrastive training");
        }

        self.report = report;
        Ok(())
    }
}
