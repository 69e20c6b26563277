use std::collections::{BTreeMap, BTreeSet};
use tabcompare_common::{DatasetId, Membership, NormalizedKey};
use tracing::debug;

/// Exclusive and common key sets derived from a membership map
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetAlgebraOutcome {
    /// Keys held by exactly one dataset, sorted, per dataset
    pub exclusive: BTreeMap<DatasetId, Vec<NormalizedKey>>,
    /// Keys held by every participating dataset, sorted
    pub common: Vec<NormalizedKey>,
    /// Keys held by two or more datasets
    pub shared_count: usize,
}

impl SetAlgebraOutcome {
    pub fn exclusive_keys(&self, id: &DatasetId) -> &[NormalizedKey] {
        self.exclusive.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn exclusive_count(&self, id: &DatasetId) -> usize {
        self.exclusive_keys(id).len()
    }
}

pub struct SetAlgebraEngine;

impl SetAlgebraEngine {
    /// Classify every key in a single pass over the membership map.
    ///
    /// `participating` is the set of datasets that contributed at least one key;
    /// a key is common when its membership equals that set. With a single
    /// participating dataset every key is both exclusive and common.
    pub fn compute(
        membership: &Membership,
        participating: &BTreeSet<DatasetId>,
    ) -> SetAlgebraOutcome {
        let mut outcome = SetAlgebraOutcome {
            exclusive: participating
                .iter()
                .map(|id| (id.clone(), Vec::new()))
                .collect(),
            ..SetAlgebraOutcome::default()
        };

        for (key, present_in) in membership {
            if present_in.len() == 1 {
                if let Some(only) = present_in.iter().next() {
                    outcome
                        .exclusive
                        .entry(only.clone())
                        .or_default()
                        .push(key.clone());
                }
            } else {
                outcome.shared_count += 1;
            }

            if !participating.is_empty() && present_in == participating {
                outcome.common.push(key.clone());
            }
        }

        debug!(
            "Set algebra: {} keys, {} common, {} shared",
            membership.len(),
            outcome.common.len(),
            outcome.shared_count
        );
        outcome
    }
}
