//! Training configuration.
//!
//! Every config deserializes with missing fields filled from `Default`, so a
//! JSON file only needs to name the values it changes.

use serde::{Deserialize, Serialize};
use spherix_core::{Error, DEFAULT_MAX_LENGTH, DEFAULT_NEGATIVES_PER_INDICATOR};

fn invalid(msg: impl Into<String>) -> Error {
    Error::InvalidConfig(msg.into())
}

fn check_positive(name: &str, value: f64) -> Result<(), Error> {
    if !value.is_finite() || value <= 0.0 {
        return Err(invalid(format!("{} must be > 0, got {}", name, value)));
    }
    Ok(())
}

/// Contrastive phrase fine-tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContrastiveConfig {
    /// Run length used by [`ContrastiveTrainer::train`](crate::ContrastiveTrainer::train);
    /// `train_contrastive` takes its own epoch count.
    pub epochs: usize,
    pub batch_size: usize,
    pub temperature: f64,
    pub learning_rate: f64,
    pub max_length: usize,
    pub seed: Option<u64>,
}

impl Default for ContrastiveConfig {
    fn default() -> Self {
        Self {
            epochs: 3,
            batch_size: 16,
            temperature: 0.07,
            learning_rate: 2e-5,
            max_length: DEFAULT_MAX_LENGTH,
            seed: None,
        }
    }
}

impl ContrastiveConfig {
    pub fn validate(&self) -> Result<(), Error> {
        if self.batch_size == 0 {
            return Err(invalid("batch_size must be at least 1"));
        }
        if self.max_length == 0 {
            return Err(invalid("max_length must be at least 1"));
        }
        check_positive("temperature", self.temperature)?;
        check_positive("learning_rate", self.learning_rate)
    }
}

/// Hyperspherical indicator embedding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HypersphericalConfig {
    pub num_indicators: usize,
    pub dim: usize,
    pub batch_size: usize,
    pub epochs: usize,
    pub learning_rate: f64,
    pub temperature: f64,
    pub negatives_per_indicator: usize,
    /// Log that epoch's average loss every this many epochs
    pub report_every: usize,
    pub seed: Option<u64>,
}

impl Default for HypersphericalConfig {
    fn default() -> Self {
        Self {
            num_indicators: 0,
            dim: 64,
            batch_size: 32,
            epochs: 100,
            learning_rate: 0.01,
            temperature: 0.1,
            negatives_per_indicator: DEFAULT_NEGATIVES_PER_INDICATOR,
            report_every: 10,
            seed: None,
        }
    }
}

impl HypersphericalConfig {
    pub fn validate(&self) -> Result<(), Error> {
        if self.num_indicators == 0 {
            return Err(invalid("num_indicators must be at least 1"));
        }
        if self.dim == 0 {
            return Err(invalid("dim must be at least 1"));
        }
        if self.batch_size == 0 {
            return Err(invalid("batch_size must be at least 1"));
        }
        check_positive("temperature", self.temperature)?;
        check_positive("learning_rate", self.learning_rate)
    }
}

/// Built-in hashed-token encoder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    /// Hashed vocabulary size
    pub buckets: usize,
    pub dim: usize,
    /// Truncation length in token units, `[CLS]` included
    pub max_length: usize,
    pub seed: Option<u64>,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            buckets: 4096,
            dim: 64,
            max_length: DEFAULT_MAX_LENGTH,
            seed: None,
        }
    }
}

impl EncoderConfig {
    pub fn validate(&self) -> Result<(), Error> {
        if self.buckets == 0 || self.dim == 0 {
            return Err(invalid("buckets and dim must be at least 1"));
        }
        if self.max_length < 2 {
            return Err(invalid("max_length must leave room for one token after [CLS]"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let c = ContrastiveConfig::default();
        assert!((c.temperature - 0.07).abs() < 1e-12);
        assert!((c.learning_rate - 2e-5).abs() < 1e-12);
        assert_eq!(c.max_length, 128);

        let h = HypersphericalConfig::default();
        assert_eq!(h.epochs, 100);
        assert!((h.temperature - 0.1).abs() < 1e-12);
        assert!((h.learning_rate - 0.01).abs() < 1e-12);
        assert_eq!(h.negatives_per_indicator, 5);
        assert_eq!(h.report_every, 10);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let h: HypersphericalConfig =
            serde_json::from_str(r#"{"num_indicators": 12, "epochs": 5}"#).unwrap();
        assert_eq!(h.num_indicators, 12);
        assert_eq!(h.epochs, 5);
        assert_eq!(h.dim, 64);
        assert!(h.validate().is_ok());
    }

    #[test]
    fn test_validation() {
        assert!(HypersphericalConfig::default().validate().is_err());
        let bad = ContrastiveConfig {
            temperature: 0.0,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
        let bad = ContrastiveConfig {
            batch_size: 0,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
        let bad = EncoderConfig {
            max_length: 1,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }
}
