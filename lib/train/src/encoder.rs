//! Trainable text encoders.
//!
//! [`TrainableEncoder`] extends the inference-only
//! [`EmbeddingProvider`](spherix_core::EmbeddingProvider) with a
//! gradient-tracking forward pass and access to the parameters an optimizer
//! should update. [`HashedTokenEncoder`] is the built-in implementation.

use std::collections::HashMap;
use std::path::Path;

use candle_core::{DType, Device, Tensor, Var};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use spherix_core::provider::{token_bucket, tokenize};
use spherix_core::{EmbeddingProvider, Vector};

use crate::config::EncoderConfig;
use crate::Result;

pub trait TrainableEncoder: EmbeddingProvider {
    /// Embeddings `[texts.len(), dim]` still attached to the parameter graph.
    fn forward(&self, texts: &[&str], max_length: usize) -> Result<Tensor>;

    /// Parameters updated by fine-tuning.
    fn trainable_vars(&self) -> Vec<Var>;

    fn device(&self) -> &Device;
}

/// Hashed-vocabulary encoder with a learned `[CLS]` slot.
///
/// Input text is split on whitespace, lowercased, and truncated so that
/// `[CLS]` plus the tokens fit in `max_length` units. Tokens map to rows of a
/// bucketed embedding table. One mixing layer combines `[CLS]` with the mean
/// token context:
///
/// ```text
/// h_cls = tanh((cls + mean(tokens)) W + b)
/// ```
///
/// and the first-position state `h_cls` is the sentence embedding.
pub struct HashedTokenEncoder {
    config: EncoderConfig,
    token_embeddings: Var,
    cls: Var,
    mix_weight: Var,
    mix_bias: Var,
    device: Device,
}

fn gaussian(rng: &mut StdRng, len: usize, std: f32) -> Vec<f32> {
    (0..len)
        .map(|_| rng.sample::<f32, _>(StandardNormal) * std)
        .collect()
}

impl HashedTokenEncoder {
    pub fn new(config: EncoderConfig, device: &Device) -> Result<Self> {
        config.validate()?;
        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let (buckets, dim) = (config.buckets, config.dim);

        let token_embeddings = Tensor::from_vec(gaussian(&mut rng, buckets * dim, 0.1), (buckets, dim), device)?;
        let cls = Tensor::from_vec(gaussian(&mut rng, dim, 0.1), (1, dim), device)?;

        // Identity plus noise so the untrained encoder roughly preserves the
        // bag-of-tokens geometry.
        let mut weight = gaussian(&mut rng, dim * dim, 0.01);
        for i in 0..dim {
            weight[i * dim + i] += 1.0;
        }
        let mix_weight = Tensor::from_vec(weight, (dim, dim), device)?;
        let mix_bias = Tensor::zeros(dim, DType::F32, device)?;

        Ok(Self {
            config,
            token_embeddings: Var::from_tensor(&token_embeddings)?,
            cls: Var::from_tensor(&cls)?,
            mix_weight: Var::from_tensor(&mix_weight)?,
            mix_bias: Var::from_tensor(&mix_bias)?,
            device: device.clone(),
        })
    }

    pub fn config(&self) -> &EncoderConfig {
        &self.config
    }

    fn named_vars(&self) -> [(&'static str, &Var); 4] {
        [
            ("token_embeddings", &self.token_embeddings),
            ("cls", &self.cls),
            ("mix.weight", &self.mix_weight),
            ("mix.bias", &self.mix_bias),
        ]
    }

    /// Row-stochastic `[n, buckets]` matrix averaging each text's tokens.
    fn token_weights(&self, texts: &[&str], max_length: usize) -> Result<Tensor> {
        let buckets = self.config.buckets;
        let mut weights = vec![0.0f32; texts.len() * buckets];
        for (row, text) in texts.iter().enumerate() {
            let tokens = tokenize(text, max_length.saturating_sub(1));
            if tokens.is_empty() {
                continue;
            }
            let share = 1.0 / tokens.len() as f32;
            for token in &tokens {
                weights[row * buckets + token_bucket(token, buckets)] += share;
            }
        }
        Ok(Tensor::from_vec(weights, (texts.len(), buckets), &self.device)?)
    }

    /// Write parameters as safetensors.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let tensors: HashMap<String, Tensor> = self
            .named_vars()
            .iter()
            .map(|(name, var)| (name.to_string(), var.as_tensor().clone()))
            .collect();
        candle_core::safetensors::save(&tensors, path)?;
        Ok(())
    }

    /// Overwrite parameters from a safetensors file written by [`save`](Self::save).
    pub fn load<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let tensors = candle_core::safetensors::load(path, &self.device)?;
        for (name, var) in self.named_vars() {
            let tensor = tensors.get(name).ok_or_else(|| {
                spherix_core::Error::Serialization(format!("missing tensor '{}'", name))
            })?;
            if tensor.dims() != var.dims() {
                return Err(spherix_core::Error::shape(
                    "encoder parameter",
                    var.elem_count(),
                    tensor.elem_count(),
                )
                .into());
            }
            var.set(tensor)?;
        }
        Ok(())
    }
}

impl TrainableEncoder for HashedTokenEncoder {
    fn forward(&self, texts: &[&str], max_length: usize) -> Result<Tensor> {
        let context = self
            .token_weights(texts, max_length)?
            .matmul(self.token_embeddings.as_tensor())?;
        let hidden = context.broadcast_add(self.cls.as_tensor())?;
        let out = hidden
            .matmul(self.mix_weight.as_tensor())?
            .broadcast_add(self.mix_bias.as_tensor())?
            .tanh()?;
        Ok(out)
    }

    fn trainable_vars(&self) -> Vec<Var> {
        self.named_vars().iter().map(|(_, var)| (*var).clone()).collect()
    }

    fn device(&self) -> &Device {
        &self.device
    }
}

impl EmbeddingProvider for HashedTokenEncoder {
    fn dim(&self) -> usize {
        self.config.dim
    }

    fn embed_batch(&self, texts: &[&str], max_length: usize) -> spherix_core::Result<Vec<Vector>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let rows = self
            .forward(texts, max_length)?
            .detach()
            .to_vec2::<f32>()
            .map_err(crate::Error::from)?;
        Ok(rows.into_iter().map(Vector::new).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoder(seed: u64) -> HashedTokenEncoder {
        let config = EncoderConfig {
            buckets: 256,
            dim: 16,
            max_length: 128,
            seed: Some(seed),
        };
        HashedTokenEncoder::new(config, &Device::Cpu).unwrap()
    }

    #[test]
    fn test_forward_shape() {
        let enc = encoder(1);
        let out = enc.forward(&["lateral movement", "c2 beacon", ""], 128).unwrap();
        assert_eq!(out.dims(), &[3, 16]);
    }

    #[test]
    fn test_deterministic_for_seed() {
        let a = encoder(5).embed("registry run key").unwrap();
        let b = encoder(5).embed("registry run key").unwrap();
        assert_eq!(a, b);
        let batch = encoder(5).embed_batch(&["registry run key"], 128).unwrap();
        assert_eq!(batch[0], a);
    }

    #[test]
    fn test_truncation_at_max_length() {
        let enc = encoder(2);
        let long = "alpha beta gamma delta";
        let truncated = enc.embed_batch(&[long], 3).unwrap();
        let prefix = enc.embed_batch(&["alpha beta"], 3).unwrap();
        assert_eq!(truncated[0], prefix[0]);
    }

    #[test]
    fn test_trainable_vars() {
        let enc = encoder(3);
        let vars = enc.trainable_vars();
        assert_eq!(vars.len(), 4);
        assert_eq!(vars[0].dims(), &[256, 16]);
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("encoder.safetensors");
        let original = encoder(4);
        original.save(&path).unwrap();

        let other = encoder(99);
        assert_ne!(
            other.embed("token theft").unwrap(),
            original.embed("token theft").unwrap()
        );
        other.load(&path).unwrap();
        assert_eq!(
            other.embed("token theft").unwrap(),
            original.embed("token theft").unwrap()
        );
    }
}
