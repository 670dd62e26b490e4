use serde::{Deserialize, Serialize};

/// Per-epoch average loss of one training run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    pub epoch_losses: Vec<f64>,
    /// Optimizer steps taken
    pub steps: usize,
}

impl TrainingReport {
    pub fn record_epoch(&mut self, avg_loss: f64, steps: usize) {
        self.epoch_losses.push(avg_loss);
        self.steps += steps;
    }

    pub fn final_loss(&self) -> Option<f64> {
        self.epoch_losses.last().copied()
    }

    pub fn epochs(&self) -> usize {
        self.epoch_losses.len()
    }

    /// Average loss of 1-based `epoch` when it falls on a reporting boundary.
    pub fn summary_at(&self, epoch: usize, every: usize) -> Option<f64> {
        if every == 0 || epoch == 0 || epoch % every != 0 {
            return None;
        }
        self.epoch_losses.get(epoch - 1).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_is_that_epochs_average() {
        let mut report = TrainingReport::default();
        for epoch in 1..=20 {
            report.record_epoch(epoch as f64, 2);
        }
        assert_eq!(report.steps, 40);
        assert_eq!(report.summary_at(10, 10), Some(10.0));
        assert_eq!(report.summary_at(20, 10), Some(20.0));
        assert_eq!(report.summary_at(15, 10), None);
        assert_eq!(report.summary_at(10, 0), None);
        assert_eq!(report.summary_at(30, 10), None);
    }
}
