//! Parent-child relations between indicators.
//!
//! A [`RelationMap`] records, for each child indicator, the ordered list of
//! its parents. Children keep the order in which they were first seen and
//! parents keep the order of their first insertion; re-adding a parent is a
//! no-op.

use crate::{Error, Result};
use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Integer identifier of an indicator, `0..num_indicators`
pub type Indicator = usize;

type Parents = SmallVec<[Indicator; 4]>;

/// Serialized form of one child's parent list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationEntry {
    pub child: Indicator,
    pub parents: Vec<Indicator>,
}

/// Child -> ordered, de-duplicated parents
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<RelationEntry>", into = "Vec<RelationEntry>")]
pub struct RelationMap {
    entries: Vec<(Indicator, Parents)>,
    index: AHashMap<Indicator, usize>,
}

impl RelationMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `parents` for `child`. Parents already recorded for this child
    /// are skipped, so repeating a call leaves the map unchanged.
    ///
    /// A child listed as its own parent is stored as given.
    pub fn add_relation(&mut self, child: Indicator, parents: &[Indicator]) {
        let slot = match self.index.get(&child) {
            Some(&slot) => slot,
            None => {
                self.entries.push((child, Parents::new()));
                self.index.insert(child, self.entries.len() - 1);
                self.entries.len() - 1
            }
        };

        let list = &mut self.entries[slot].1;
        for &parent in parents {
            if parent == child {
                tracing::warn!(indicator = child, "indicator recorded as its own parent");
            }
            if !list.contains(&parent) {
                list.push(parent);
            }
        }
    }

    /// Parents of `child`, empty when the child has no recorded relations
    #[must_use]
    pub fn parents(&self, child: Indicator) -> &[Indicator] {
        self.index
            .get(&child)
            .map(|&slot| self.entries[slot].1.as_slice())
            .unwrap_or(&[])
    }

    #[inline]
    #[must_use]
    pub fn is_parent(&self, child: Indicator, candidate: Indicator) -> bool {
        self.parents(child).contains(&candidate)
    }

    /// Children in first-seen order
    pub fn children(&self) -> impl Iterator<Item = Indicator> + '_ {
        self.entries.iter().map(|(child, _)| *child)
    }

    /// Every `(child, parent)` edge, children in first-seen order
    pub fn edges(&self) -> impl Iterator<Item = (Indicator, Indicator)> + '_ {
        self.entries
            .iter()
            .flat_map(|(child, parents)| parents.iter().map(move |p| (*child, *p)))
    }

    #[must_use]
    pub fn num_edges(&self) -> usize {
        self.entries.iter().map(|(_, parents)| parents.len()).sum()
    }

    #[must_use]
    pub fn num_children(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.num_edges() == 0
    }

    /// Children that list themselves among their parents
    #[must_use]
    pub fn self_loops(&self) -> Vec<Indicator> {
        self.entries
            .iter()
            .filter(|(child, parents)| parents.contains(child))
            .map(|(child, _)| *child)
            .collect()
    }

    /// One past the largest indicator mentioned anywhere in the map
    #[must_use]
    pub fn min_num_indicators(&self) -> usize {
        self.edges()
            .map(|(child, parent)| child.max(parent) + 1)
            .max()
            .unwrap_or(0)
    }

    /// Fail when any child or parent is `>= num_indicators`.
    pub fn validate(&self, num_indicators: usize) -> Result<()> {
        for (child, parent) in self.edges() {
            for index in [child, parent] {
                if index >= num_indicators {
                    return Err(Error::IndexOutOfRange {
                        index,
                        num_indicators,
                    });
                }
            }
        }
        Ok(())
    }
}

impl From<Vec<RelationEntry>> for RelationMap {
    fn from(entries: Vec<RelationEntry>) -> Self {
        let mut map = RelationMap::new();
        for entry in entries {
            map.add_relation(entry.child, &entry.parents);
        }
        map
    }
}

impl From<RelationMap> for Vec<RelationEntry> {
    fn from(map: RelationMap) -> Self {
        map.entries
            .into_iter()
            .map(|(child, parents)| RelationEntry {
                child,
                parents: parents.into_vec(),
            })
            .collect()
    }
}
