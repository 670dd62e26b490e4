//! Training pair construction.
//!
//! Two samplers feed the two trainers:
//!
//! - Phrase augmentation for contrastive fine-tuning: each phrase becomes an
//!   (anchor, positive) pair where the positive may have one word dropped.
//! - Relation sampling for hyperspherical training: every (parent, child) edge
//!   is a positive, and each indicator contributes up to a fixed number of
//!   non-parent negatives.

use crate::relation::{Indicator, RelationMap};
use crate::Result;
use rand::seq::index;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Negatives drawn per indicator when not configured otherwise
pub const DEFAULT_NEGATIVES_PER_INDICATOR: usize = 5;

/// Word-drop augmentation only fires on phrases longer than this
const MIN_WORDS_FOR_DROP: usize = 3;

/// Labelled index pair for hyperspherical training
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PairSample {
    pub left: Indicator,
    pub right: Indicator,
    /// 1.0 for a parent-child edge, 0.0 for an unrelated pair
    pub label: f32,
}

impl PairSample {
    #[inline]
    pub fn positive(parent: Indicator, child: Indicator) -> Self {
        Self {
            left: parent,
            right: child,
            label: 1.0,
        }
    }

    #[inline]
    pub fn negative(indicator: Indicator, other: Indicator) -> Self {
        Self {
            left: indicator,
            right: other,
            label: 0.0,
        }
    }

    #[inline]
    pub fn is_positive(&self) -> bool {
        self.label > 0.5
    }
}

/// Anchor phrase and its stochastic positive view
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhrasePair {
    pub anchor: String,
    pub positive: String,
}

/// Produce a positive view of `phrase`.
///
/// Phrases with more than three words lose one uniformly chosen word with
/// probability 0.5; everything else is returned unchanged.
pub fn augment_phrase<R: Rng>(phrase: &str, rng: &mut R) -> String {
    let words: Vec<&str> = phrase.split_whitespace().collect();
    if words.len() > MIN_WORDS_FOR_DROP && rng.random_bool(0.5) {
        let drop = rng.random_range(0..words.len());
        return words
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != drop)
            .map(|(_, w)| *w)
            .collect::<Vec<_>>()
            .join(" ");
    }
    phrase.to_string()
}

/// One (anchor, positive) pair per phrase, in input order.
pub fn phrase_pairs<S: AsRef<str>, R: Rng>(phrases: &[S], rng: &mut R) -> Vec<PhrasePair> {
    phrases
        .iter()
        .map(|phrase| {
            let anchor = phrase.as_ref();
            PhrasePair {
                anchor: anchor.to_string(),
                positive: augment_phrase(anchor, rng),
            }
        })
        .collect()
}

/// Relation-derived samples over `num_indicators` indicators.
///
/// Output order: all positives `(parent, child, 1.0)` in edge order, then for
/// each indicator `i` in `0..num_indicators` up to `negatives_per_indicator`
/// samples `(i, j, 0.0)` with `j` drawn without replacement from the indices
/// not listed as parents of `i`. The pool includes `i` itself. An indicator
/// whose pool is empty contributes no negatives.
pub fn relation_samples<R: Rng>(
    relations: &RelationMap,
    num_indicators: usize,
    negatives_per_indicator: usize,
    rng: &mut R,
) -> Result<Vec<PairSample>> {
    relations.validate(num_indicators)?;

    let mut samples: Vec<PairSample> = relations
        .edges()
        .map(|(child, parent)| PairSample::positive(parent, child))
        .collect();

    for i in 0..num_indicators {
        let pool = negative_pool(relations, i, num_indicators);
        let take = negatives_per_indicator.min(pool.len());
        if take == 0 {
            continue;
        }
        for picked in index::sample(rng, pool.len(), take) {
            samples.push(PairSample::negative(i, pool[picked]));
        }
    }

    Ok(samples)
}

/// Indices in `0..num_indicators` that are not parents of `indicator`.
pub fn negative_pool(
    relations: &RelationMap,
    indicator: Indicator,
    num_indicators: usize,
) -> Vec<Indicator> {
    let parents = relations.parents(indicator);
    (0..num_indicators)
        .filter(|j| !parents.contains(j))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    #[test]
    fn test_augment_short_phrase_unchanged() {
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..50 {
            assert_eq!(augment_phrase("dns tunneling", &mut rng), "dns tunneling");
            assert_eq!(augment_phrase("beacon", &mut rng), "beacon");
            assert_eq!(augment_phrase("a b c", &mut rng), "a b c");
        }
    }

    #[test]
    fn test_augment_long_phrase_drops_at_most_one_word() {
        let mut rng = StdRng::seed_from_u64(2);
        let phrase = "scheduled task created for persistence";
        let mut dropped = 0;
        for _ in 0..200 {
            let view = augment_phrase(phrase, &mut rng);
            let n = view.split_whitespace().count();
            assert!(n == 5 || n == 4);
            if n == 4 {
                dropped += 1;
                assert!(view.split_whitespace().all(|w| phrase.contains(w)));
            }
        }
        // p = 0.5 over 200 draws
        assert!(dropped > 50 && dropped < 150, "dropped {}", dropped);
    }

    #[test]
    fn test_phrase_pairs_keep_anchor() {
        let mut rng = StdRng::seed_from_u64(3);
        let phrases = vec!["one two three four five".to_string(), "solo".to_string()];
        let pairs = phrase_pairs(&phrases, &mut rng);
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].anchor, phrases[0]);
        assert_eq!(pairs[1].positive, "solo");
    }

    #[test]
    fn test_relation_samples_small_map() {
        let mut relations = RelationMap::new();
        relations.add_relation(0, &[1, 2]);
        let mut rng = StdRng::seed_from_u64(4);
        let samples = relation_samples(&relations, 3, 5, &mut rng).unwrap();

        assert_eq!(
            &samples[..2],
            &[PairSample::positive(1, 0), PairSample::positive(2, 0)]
        );

        let negatives = &samples[2..];
        // pools: 0 -> {0}; 1 -> {0, 1, 2}; 2 -> {0, 1, 2}
        assert_eq!(negatives.len(), 1 + 3 + 3);
        for i in 0..3 {
            let drawn: Vec<_> = negatives.iter().filter(|s| s.left == i).collect();
            let distinct: HashSet<_> = drawn.iter().map(|s| s.right).collect();
            assert_eq!(distinct.len(), drawn.len());
            assert!(drawn.iter().all(|s| s.label == 0.0));
            assert!(drawn.iter().all(|s| !relations.is_parent(i, s.right)));
        }
        assert_eq!(negatives[0], PairSample::negative(0, 0));
    }

    #[test]
    fn test_relation_samples_caps_negatives() {
        let relations = RelationMap::new();
        let mut rng = StdRng::seed_from_u64(5);
        let samples = relation_samples(&relations, 10, 5, &mut rng).unwrap();
        assert_eq!(samples.len(), 50);
    }

    #[test]
    fn test_relation_samples_empty_pool() {
        let mut relations = RelationMap::new();
        relations.add_relation(0, &[0, 1]);
        let mut rng = StdRng::seed_from_u64(6);
        let samples = relation_samples(&relations, 2, 5, &mut rng).unwrap();
        assert_eq!(samples.iter().filter(|s| s.left == 0 && !s.is_positive()).count(), 0);
    }

    #[test]
    fn test_relation_samples_out_of_range() {
        let mut relations = RelationMap::new();
        relations.add_relation(0, &[3]);
        let mut rng = StdRng::seed_from_u64(7);
        assert!(relation_samples(&relations, 3, 5, &mut rng).is_err());
    }
}
