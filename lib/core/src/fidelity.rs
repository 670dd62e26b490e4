//! Hierarchical Fidelity Score.
//!
//! For each (child, parent) edge the parent should be closer to the child
//! than a randomly drawn indicator that is neither the child nor one of its
//! parents. HFS is the fraction of evaluated edges where that holds.
//!
//! The contrast indicator is resampled on every call, so the score is
//! stochastic; pass a seeded RNG for a reproducible value or use
//! [`FidelityScorer::evaluate_averaged`].

use crate::relation::RelationMap;
use crate::table::EmbeddingTable;
use crate::{Error, Result};
use rand::seq::IndexedRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Outcome of one scoring pass
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HfsReport {
    /// `correct / evaluated`, 0.0 when nothing was evaluated
    pub score: f64,
    pub correct: usize,
    pub evaluated: usize,
    /// Edges with no valid contrast indicator, plus self-loop edges.
    ///
    /// An unguarded scorer would compare a self-loop `(c, c)` like any other
    /// edge; here it is never evaluated and always lands in this count.
    pub skipped: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct FidelityScorer<'a> {
    relations: &'a RelationMap,
}

impl<'a> FidelityScorer<'a> {
    pub fn new(relations: &'a RelationMap) -> Self {
        Self { relations }
    }

    /// Score `table` against the relation map.
    ///
    /// `table` is `None` before any training run; that is
    /// [`Error::NotTrained`]. Rows are used as stored (no re-normalization).
    pub fn evaluate<R: Rng>(
        &self,
        table: Option<&EmbeddingTable>,
        rng: &mut R,
    ) -> Result<HfsReport> {
        let table = table.ok_or(Error::NotTrained)?;
        self.relations.validate(table.len())?;

        let mut report = HfsReport {
            score: 0.0,
            correct: 0,
            evaluated: 0,
            skipped: 0,
        };

        for child in self.relations.children() {
            let parents = self.relations.parents(child);
            let contrasts: Vec<usize> = (0..table.len())
                .filter(|j| *j != child && !parents.contains(j))
                .collect();

            for &parent in parents {
                if parent == child {
                    report.skipped += 1;
                    continue;
                }
                let Some(&contrast) = contrasts.choose(rng) else {
                    report.skipped += 1;
                    continue;
                };

                report.evaluated += 1;
                if table.dot(child, parent) > table.dot(child, contrast) {
                    report.correct += 1;
                }
            }
        }

        if report.skipped > 0 {
            tracing::debug!(skipped = report.skipped, "edges without a usable contrast");
        }
        if report.evaluated > 0 {
            report.score = report.correct as f64 / report.evaluated as f64;
        }
        Ok(report)
    }

    /// HFS as a bare number.
    pub fn compute_hfs<R: Rng>(&self, table: Option<&EmbeddingTable>, rng: &mut R) -> Result<f64> {
        self.evaluate(table, rng).map(|report| report.score)
    }

    /// Mean HFS over `rounds` independent contrast draws.
    pub fn evaluate_averaged<R: Rng>(
        &self,
        table: Option<&EmbeddingTable>,
        rounds: usize,
        rng: &mut R,
    ) -> Result<f64> {
        if rounds == 0 {
            return Err(Error::InvalidConfig("rounds must be at least 1".into()));
        }
        let mut total = 0.0;
        for _ in 0..rounds {
            total += self.compute_hfs(table, rng)?;
        }
        Ok(total / rounds as f64)
    }
}
