use crate::key_resolver::KeyedDataset;
use crate::normalize::ValueNormalizer;
use std::collections::{BTreeMap, BTreeSet};
use tabcompare_common::{DatasetId, Membership, NormalizedKey};
use tracing::debug;

/// Row counts of one dataset as seen by the aggregator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DatasetCounts {
    pub total_rows: usize,
    pub dropped_rows: usize,
}

impl DatasetCounts {
    pub fn compared_rows(&self) -> usize {
        self.total_rows - self.dropped_rows
    }
}

/// Keys of every dataset merged into one sorted membership map
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Aggregation {
    pub membership: Membership,
    pub counts: BTreeMap<DatasetId, DatasetCounts>,
}

impl Aggregation {
    /// Register a dataset so it is reported even when every row is dropped
    pub fn register(&mut self, id: &DatasetId) {
        self.counts.entry(id.clone()).or_default();
    }

    pub fn record_key(&mut self, id: &DatasetId, key: NormalizedKey) {
        self.counts.entry(id.clone()).or_default().total_rows += 1;
        self.membership.entry(key).or_default().insert(id.clone());
    }

    pub fn record_dropped(&mut self, id: &DatasetId) {
        let counts = self.counts.entry(id.clone()).or_default();
        counts.total_rows += 1;
        counts.dropped_rows += 1;
    }

    /// Sorted, deduplicated union of the keys of all datasets
    pub fn all_keys(&self) -> Vec<NormalizedKey> {
        self.membership.keys().cloned().collect()
    }

    /// Datasets that contributed at least one key
    pub fn participating(&self) -> BTreeSet<DatasetId> {
        self.counts
            .iter()
            .filter(|(_, counts)| counts.compared_rows() > 0)
            .map(|(id, _)| id.clone())
            .collect()
    }
}

/// Builds key membership from datasets keyed on a single column
#[derive(Debug, Clone, Copy, Default)]
pub struct MembershipAggregator {
    normalizer: ValueNormalizer,
}

impl MembershipAggregator {
    pub fn new(normalizer: ValueNormalizer) -> Self {
        Self { normalizer }
    }

    pub fn aggregate(&self, datasets: &[KeyedDataset<'_>]) -> Aggregation {
        let mut aggregation = Aggregation::default();
        for keyed in datasets {
            self.aggregate_dataset(keyed, &mut aggregation);
        }
        aggregation
    }

    /// Fold one dataset into `aggregation`
    pub fn aggregate_dataset(&self, keyed: &KeyedDataset<'_>, aggregation: &mut Aggregation) {
        let id = &keyed.dataset.id;
        aggregation.register(id);

        for row in &keyed.dataset.rows {
            match self.normalizer.normalize(row.get(&keyed.key_column)) {
                Some(key) => aggregation.record_key(id, key),
                None => aggregation.record_dropped(id),
            }
        }

        let counts = aggregation.counts[id];
        debug!(
            "Collected {} keys from {} ({} rows dropped)",
            counts.compared_rows(),
            id,
            counts.dropped_rows
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabcompare_common::{CellValue, Dataset, Row};

    fn keyed_dataset(name: &str, values: Vec<CellValue>) -> Dataset {
        let rows = values
            .into_iter()
            .map(|value| [("id", value)].into_iter().collect::<Row>())
            .collect();
        Dataset::new(DatasetId::new(name, None), vec!["id".to_string()], rows)
    }

    fn keyed<'a>(dataset: &'a Dataset) -> KeyedDataset<'a> {
        KeyedDataset {
            dataset,
            key_column: "id".to_string(),
        }
    }

    #[test]
    fn test_keys_are_sorted_and_deduplicated() {
        let a = keyed_dataset("a.csv", vec!["y".into(), "x".into(), "y".into()]);
        let b = keyed_dataset("b.csv", vec!["z".into(), "y".into()]);

        let aggregation = MembershipAggregator::default().aggregate(&[keyed(&a), keyed(&b)]);

        let keys: Vec<&str> = aggregation.membership.keys().map(|k| k.as_str()).collect();
        assert_eq!(keys, vec!["x", "y", "z"]);
        assert_eq!(aggregation.membership[&NormalizedKey::from("y")].len(), 2);
        assert_eq!(aggregation.counts[&a.id].total_rows, 3);
        assert_eq!(aggregation.counts[&b.id].total_rows, 2);
    }

    #[test]
    fn test_blank_keys_are_counted_not_compared() {
        let a = keyed_dataset(
            "a.csv",
            vec!["x".into(), CellValue::Null, " ".into(), "".into()],
        );

        let aggregation = MembershipAggregator::default().aggregate(&[keyed(&a)]);

        assert_eq!(aggregation.all_keys(), vec![NormalizedKey::from("x")]);
        assert_eq!(
            aggregation.counts[&a.id],
            DatasetCounts {
                total_rows: 4,
                dropped_rows: 3
            }
        );
    }

    #[test]
    fn test_fully_dropped_dataset_is_registered_but_not_participating() {
        let a = keyed_dataset("a.csv", vec!["x".into()]);
        let b = keyed_dataset("b.csv", vec![CellValue::Null]);

        let aggregation = MembershipAggregator::default().aggregate(&[keyed(&a), keyed(&b)]);

        assert!(aggregation.counts.contains_key(&b.id));
        let participating = aggregation.participating();
        assert!(participating.contains(&a.id));
        assert!(!participating.contains(&b.id));
    }

    #[test]
    fn test_numeric_variants_collapse_to_one_key() {
        let a = keyed_dataset("a.csv", vec![CellValue::from(1_i64)]);
        let b = keyed_dataset("b.csv", vec![CellValue::from(1.0)]);
        let c = keyed_dataset("c.csv", vec![CellValue::from("1")]);

        let aggregation =
            MembershipAggregator::default().aggregate(&[keyed(&a), keyed(&b), keyed(&c)]);

        assert_eq!(aggregation.membership.len(), 1);
        assert_eq!(aggregation.membership[&NormalizedKey::from("1")].len(), 3);
    }
}
