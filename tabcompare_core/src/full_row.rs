use crate::key_resolver::common_columns;
use crate::membership::Aggregation;
use crate::normalize::ValueNormalizer;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use tabcompare_common::{Dataset, DatasetId, NormalizedKey, Row};
use tracing::debug;

/// Compares datasets that have no key column by the values of all shared columns.
///
/// Each row is reduced to a token (the JSON array of its normalized cells) and
/// stored in a per-dataset hash index, so uniqueness checks cost one lookup per
/// other dataset instead of a scan over its rows.
#[derive(Debug, Clone)]
pub struct FullRowComparator {
    normalizer: ValueNormalizer,
    columns: Vec<String>,
    index: HashMap<DatasetId, HashSet<NormalizedKey>>,
}

impl FullRowComparator {
    /// Row identity uses the columns shared by all `datasets`, minus `ignored_columns`
    pub fn new(datasets: &[&Dataset], normalizer: ValueNormalizer, ignored_columns: &[String]) -> Self {
        let mut columns = common_columns(datasets.iter().copied());
        columns.retain(|column| !ignored_columns.contains(column));
        debug!("Full-row identity over {} columns: {:?}", columns.len(), columns);

        Self {
            normalizer,
            columns,
            index: HashMap::new(),
        }
    }

    pub fn compared_columns(&self) -> &[String] {
        &self.columns
    }

    /// Token for a row, or `None` when every compared cell is blank
    pub fn row_key(&self, row: &Row) -> Option<NormalizedKey> {
        let cells: Vec<String> = self
            .columns
            .iter()
            .map(|column| self.normalizer.cell_token(row.get(column)))
            .collect();

        if cells.iter().all(String::is_empty) {
            return None;
        }
        Some(NormalizedKey::new(Value::from(cells).to_string()))
    }

    /// Fold one dataset into `aggregation` and into the row index
    pub fn aggregate_dataset(&mut self, dataset: &Dataset, aggregation: &mut Aggregation) {
        aggregation.register(&dataset.id);
        let mut rows = HashSet::with_capacity(dataset.rows.len());

        for row in &dataset.rows {
            match self.row_key(row) {
                Some(key) => {
                    rows.insert(key.clone());
                    aggregation.record_key(&dataset.id, key);
                }
                None => aggregation.record_dropped(&dataset.id),
            }
        }

        debug!("Indexed {} distinct rows of {}", rows.len(), dataset.id);
        self.index.insert(dataset.id.clone(), rows);
    }

    /// True when no other indexed dataset holds a row equal to `row` on the compared columns
    pub fn is_unique_to(&self, row: &Row, dataset: &DatasetId) -> bool {
        let Some(key) = self.row_key(row) else {
            return false;
        };

        self.index
            .iter()
            .filter(|(id, _)| *id != dataset)
            .all(|(_, rows)| !rows.contains(&key))
    }
}
