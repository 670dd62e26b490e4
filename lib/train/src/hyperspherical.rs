//! Hyperspherical indicator embeddings.
//!
//! Each indicator owns one row of a learned table that lives on the unit
//! sphere. Training pulls parent/child rows together and pushes sampled
//! non-parents apart with a temperature-scaled binary cross-entropy on the
//! row dot products. Two operations keep rows on the sphere:
//!
//! - read-time normalization ([`unit_rows`]) of every looked-up row before
//!   the similarity is taken, and
//! - [`SphereTable::project`], which rescales the whole table after every
//!   optimizer step.

use candle_core::{Device, Tensor, Var};
use candle_nn::{AdamW, Optimizer, ParamsAdamW};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use spherix_core::sampler::relation_samples;
use spherix_core::{
    EmbeddingTable, Error as CoreError, FidelityScorer, HfsReport, Indicator, PairSample,
    RelationMap,
};
use tracing::{debug, info};

use crate::config::HypersphericalConfig;
use crate::loss::{bce_with_logits, scalar, unit_rows};
use crate::report::TrainingReport;
use crate::Result;

/// Adam without weight decay.
pub(crate) fn adam(vars: Vec<Var>, learning_rate: f64) -> Result<AdamW> {
    let params = ParamsAdamW {
        lr: learning_rate,
        weight_decay: 0.0,
        ..Default::default()
    };
    Ok(AdamW::new(vars, params)?)
}

/// The trainable table and its optimizer state.
pub struct SphereTable {
    table: Var,
    optimizer: AdamW,
    num_indicators: usize,
    dim: usize,
}

impl SphereTable {
    /// Random unit rows.
    pub fn new(
        num_indicators: usize,
        dim: usize,
        learning_rate: f64,
        rng: &mut StdRng,
        device: &Device,
    ) -> Result<Self> {
        let init = EmbeddingTable::random_unit(num_indicators, dim, rng);
        Self::from_table(&init, learning_rate, device)
    }

    /// Continue from an existing table (rows are projected onto the sphere).
    pub fn from_table(init: &EmbeddingTable, learning_rate: f64, device: &Device) -> Result<Self> {
        let (num_indicators, dim) = (init.len(), init.dim());
        let tensor = Tensor::from_slice(init.as_slice(), (num_indicators, dim), device)?;
        let table = Var::from_tensor(&tensor)?;
        let optimizer = adam(vec![table.clone()], learning_rate)?;
        let sphere = Self {
            table,
            optimizer,
            num_indicators,
            dim,
        };
        sphere.project()?;
        Ok(sphere)
    }

    pub fn num_indicators(&self) -> usize {
        self.num_indicators
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Temperature-scaled similarity logits for `(left, right)` index pairs.
    pub fn logits(&self, left: &Tensor, right: &Tensor, temperature: f64) -> Result<Tensor> {
        let table = self.table.as_tensor();
        let a = unit_rows(&table.index_select(left, 0)?)?;
        let b = unit_rows(&table.index_select(right, 0)?)?;
        let sim = (a * b)?.sum(1)?;
        Ok(sim.affine(1.0 / temperature, 0.0)?)
    }

    /// One optimizer step on `batch`, followed by projection. Returns the
    /// batch loss.
    pub fn step(&mut self, batch: &[PairSample], temperature: f64) -> Result<f32> {
        if batch.is_empty() {
            return Ok(0.0);
        }
        for sample in batch {
            for index in [sample.left, sample.right] {
                if index >= self.num_indicators {
                    return Err(CoreError::IndexOutOfRange {
                        index,
                        num_indicators: self.num_indicators,
                    }
                    .into());
                }
            }
        }

        let device = self.table.device().clone();
        let left: Vec<u32> = batch.iter().map(|s| s.left as u32).collect();
        let right: Vec<u32> = batch.iter().map(|s| s.right as u32).collect();
        let labels: Vec<f32> = batch.iter().map(|s| s.label).collect();

        let left = Tensor::from_vec(left, batch.len(), &device)?;
        let right = Tensor::from_vec(right, batch.len(), &device)?;
        let labels = Tensor::from_vec(labels, batch.len(), &device)?;

        let logits = self.logits(&left, &right, temperature)?;
        let loss = bce_with_logits(&logits, &labels)?;
        self.optimizer.backward_step(&loss)?;
        self.project()?;

        scalar(&loss)
    }

    /// Rescale every row of the table to unit norm, in place.
    pub fn project(&self) -> Result<()> {
        let projected = unit_rows(self.table.as_tensor())?.detach();
        self.table.set(&projected)?;
        Ok(())
    }

    /// Copy of the current table.
    pub fn snapshot(&self) -> Result<EmbeddingTable> {
        let data = self.table.as_tensor().flatten_all()?.to_vec1::<f32>()?;
        Ok(EmbeddingTable::from_flat(self.num_indicators, self.dim, data)?)
    }
}

/// Relation map in, unit-sphere embedding table out.
pub struct HypersphericalTrainer {
    relations: RelationMap,
    config: HypersphericalConfig,
    device: Device,
    rng: StdRng,
    table: Option<EmbeddingTable>,
    report: TrainingReport,
}

impl HypersphericalTrainer {
    pub fn new(config: HypersphericalConfig) -> Self {
        Self::with_device(config, Device::Cpu)
    }

    pub fn with_device(config: HypersphericalConfig, device: Device) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            relations: RelationMap::new(),
            config,
            device,
            rng,
            table: None,
            report: TrainingReport::default(),
        }
    }

    /// Start from an existing relation map.
    pub fn with_relations(mut self, relations: RelationMap) -> Self {
        self.relations = relations;
        self
    }

    pub fn add_relation(&mut self, child: Indicator, parents: &[Indicator]) {
        self.relations.add_relation(child, parents);
    }

    pub fn relations(&self) -> &RelationMap {
        &self.relations
    }

    pub fn config(&self) -> &HypersphericalConfig {
        &self.config
    }

    pub fn report(&self) -> &TrainingReport {
        &self.report
    }

    /// The trained table, or [`CoreError::NotTrained`].
    pub fn embeddings(&self) -> Result<&EmbeddingTable> {
        self.table.as_ref().ok_or_else(|| CoreError::NotTrained.into())
    }

    /// Override the run parameters and train.
    ///
    /// The overrides are kept only if the run succeeds; on error the previous
    /// config is restored.
    pub fn train_hyperspherical(
        &mut self,
        num_indicators: usize,
        batch_size: usize,
        epochs: usize,
        learning_rate: f64,
    ) -> Result<EmbeddingTable> {
        let candidate = HypersphericalConfig {
            num_indicators,
            batch_size,
            epochs,
            learning_rate,
            ..self.config.clone()
        };
        candidate.validate()?;

        let previous = std::mem::replace(&mut self.config, candidate);
        let result = self.train();
        if result.is_err() {
            self.config = previous;
        }
        result
    }

    /// Train from a fresh random table for `config.epochs` epochs.
    ///
    /// Samples are built once per call from the current relations and
    /// reshuffled every epoch. Any failing batch aborts the whole run and
    /// leaves the previously trained table (if any) in place.
    pub fn train(&mut self) -> Result<EmbeddingTable> {
        self.config.validate()?;
        let cfg = self.config.clone();
        self.relations.validate(cfg.num_indicators)?;

        let mut samples = relation_samples(
            &self.relations,
            cfg.num_indicators,
            cfg.negatives_per_indicator,
            &mut self.rng,
        )?;
        let positives = samples.iter().filter(|s| s.is_positive()).count();
        info!(
            indicators = cfg.num_indicators,
            samples = samples.len(),
            positives,
            "starting hyperspherical training"
        );

        let mut sphere = SphereTable::new(
            cfg.num_indicators,
            cfg.dim,
            cfg.learning_rate,
            &mut self.rng,
            &self.device,
        )?;
        let mut report = TrainingReport::default();

        for epoch in 1..=cfg.epochs {
            samples.shuffle(&mut self.rng);
            let mut epoch_loss = 0.0f64;
            let mut batches = 0usize;
            for batch in samples.chunks(cfg.batch_size) {
                let loss = sphere.step(batch, cfg.temperature)?;
                debug!(epoch, batch = batches, loss, "hyperspherical step");
                epoch_loss += loss as f64;
                batches += 1;
            }
            let avg = if batches > 0 { epoch_loss / batches as f64 } else { 0.0 };
            report.record_epoch(avg, batches);

            if let Some(avg_loss) = report.summary_at(epoch, cfg.report_every) {
                info!(epoch, avg_loss, "hyperspherical training");
            }
        }

        let table = sphere.snapshot()?;
        self.table = Some(table.clone());
        self.report = report;
        Ok(table)
    }

    /// HFS of the trained table against the current relations.
    pub fn evaluate(&mut self) -> Result<HfsReport> {
        let scorer = FidelityScorer::new(&self.relations);
        Ok(scorer.evaluate(self.table.as_ref(), &mut self.rng)?)
    }

    pub fn compute_hfs(&mut self) -> Result<f64> {
        self.evaluate().map(|report| report.score)
    }

    /// HFS averaged over `rounds` contrast draws.
    pub fn compute_hfs_averaged(&mut self, rounds: usize) -> Result<f64> {
        let scorer = FidelityScorer::new(&self.relations);
        Ok(scorer.evaluate_averaged(self.table.as_ref(), rounds, &mut self.rng)?)
    }
}
