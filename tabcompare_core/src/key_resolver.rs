use std::collections::{HashMap, HashSet};
use tabcompare_common::{Dataset, DatasetId, KeyResolutionError, SkipInfo};
use tracing::{debug, warn};

/// Which column identifies a record in each dataset
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySelection {
    /// The same column name in every dataset
    Shared(String),
    /// One column per dataset; datasets missing from the map fall back to
    /// their own `key_column`
    PerDataset(HashMap<DatasetId, String>),
    /// No key designated: compare whole rows
    FullRow,
}

impl KeySelection {
    pub fn shared_key(&self) -> Option<&str> {
        match self {
            KeySelection::Shared(name) => Some(name),
            _ => None,
        }
    }
}

/// A dataset together with the column its records are keyed on
#[derive(Debug, Clone)]
pub struct KeyedDataset<'a> {
    pub dataset: &'a Dataset,
    pub key_column: String,
}

/// Datasets that survived key resolution, grouped by comparison mode
#[derive(Debug, Clone)]
pub enum KeyPlan<'a> {
    Keyed(Vec<KeyedDataset<'a>>),
    FullRow(Vec<&'a Dataset>),
}

impl<'a> KeyPlan<'a> {
    pub fn len(&self) -> usize {
        match self {
            KeyPlan::Keyed(datasets) => datasets.len(),
            KeyPlan::FullRow(datasets) => datasets.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone)]
pub struct Resolution<'a> {
    pub plan: KeyPlan<'a>,
    pub skipped: Vec<SkipInfo>,
}

/// Decides the key column of every dataset and routes unusable ones to `skipped`
#[derive(Debug, Clone, Default)]
pub struct KeyResolver {
    require_key: bool,
}

impl KeyResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse full-row fallback: without a key every dataset is skipped
    pub fn with_require_key(mut self, require_key: bool) -> Self {
        self.require_key = require_key;
        self
    }

    pub fn resolve<'a>(&self, datasets: &'a [Dataset], selection: &KeySelection) -> Resolution<'a> {
        let mut skipped = Vec::new();

        // a dataset id counts once; later copies are skipped
        let mut seen = HashSet::new();
        let mut unique = Vec::with_capacity(datasets.len());
        for dataset in datasets {
            if seen.insert(&dataset.id) {
                unique.push(dataset);
            } else {
                let err = KeyResolutionError::Duplicate(dataset.id.clone());
                warn!("Skipping {}: {}", dataset.id, err);
                skipped.push(skip_info(dataset, &err));
            }
        }

        if let KeySelection::FullRow = selection {
            if !self.require_key {
                debug!("No key selected, {} datasets enter full-row mode", unique.len());
                return Resolution {
                    plan: KeyPlan::FullRow(unique),
                    skipped,
                };
            }
        }

        let mut keyed = Vec::new();
        for dataset in unique {
            match self.key_for(dataset, selection) {
                Ok(key_column) => {
                    debug!("{} keyed on '{}'", dataset.id, key_column);
                    keyed.push(KeyedDataset {
                        dataset,
                        key_column,
                    });
                }
                Err(err) => {
                    warn!("Skipping {}: {}", dataset.id, err);
                    skipped.push(skip_info(dataset, &err));
                }
            }
        }

        Resolution {
            plan: KeyPlan::Keyed(keyed),
            skipped,
        }
    }

    fn key_for(
        &self,
        dataset: &Dataset,
        selection: &KeySelection,
    ) -> Result<String, KeyResolutionError> {
        let column = match selection {
            KeySelection::Shared(name) => name.clone(),
            KeySelection::PerDataset(mapping) => mapping
                .get(&dataset.id)
                .or(dataset.key_column.as_ref())
                .cloned()
                .ok_or_else(|| KeyResolutionError::MissingAssignment(dataset.id.clone()))?,
            KeySelection::FullRow => {
                return Err(KeyResolutionError::KeyRequired(dataset.id.clone()));
            }
        };

        if dataset.has_column(&column) {
            Ok(column)
        } else {
            Err(KeyResolutionError::KeyNotFound {
                dataset: dataset.id.clone(),
                column,
            })
        }
    }
}

/// Diagnostic record for a dataset excluded during resolution
pub fn skip_info(dataset: &Dataset, err: &KeyResolutionError) -> SkipInfo {
    SkipInfo {
        dataset: dataset.id.clone(),
        reason: err.to_string(),
        available_columns: dataset.columns.clone(),
    }
}

/// Columns present in every dataset, in the order of the first dataset
pub fn common_columns<'a, I>(datasets: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a Dataset>,
{
    let mut datasets = datasets.into_iter();
    let Some(first) = datasets.next() else {
        return Vec::new();
    };

    let mut common: Vec<String> = Vec::new();
    for column in &first.columns {
        if !common.contains(column) {
            common.push(column.clone());
        }
    }

    for dataset in datasets {
        common.retain(|column| dataset.has_column(column));
    }
    common
}
