use crate::events::{emit, ProgressEvent, ProgressTx};
use crate::full_row::FullRowComparator;
use crate::key_resolver::{skip_info, KeyPlan, KeyResolver, KeySelection};
use crate::loader::{DatasetLoader, SourceSpec};
use crate::membership::{Aggregation, MembershipAggregator};
use crate::normalize::{NormalizeOptions, ValueNormalizer};
use crate::set_algebra::{SetAlgebraEngine, SetAlgebraOutcome};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use tabcompare_common::{
    CompareConfig, ComparisonMode, ComparisonResult, Dataset, DatasetId, DatasetSummary,
    ErrorInfo, KeyResolutionError, Result, RunState, TabCompareError,
};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default)]
pub struct CompareOptions {
    pub normalize: NormalizeOptions,
    /// Skip datasets without a key instead of comparing full rows
    pub require_key: bool,
    /// Columns left out of full-row identity
    pub ignored_columns: Vec<String>,
    /// Source whose key column labels the report
    pub primary: Option<PathBuf>,
}

impl From<&CompareConfig> for CompareOptions {
    fn from(config: &CompareConfig) -> Self {
        Self {
            normalize: NormalizeOptions::from(config),
            require_key: config.require_key,
            ignored_columns: config.ignored_columns.clone(),
            primary: None,
        }
    }
}

/// Drives one comparison from loading to the final result.
///
/// A run moves through `Init`, `Loading`, `KeyResolution`, `Aggregating`,
/// `SetAlgebra` and ends in `Done` or `Failed`. Every transition is logged and,
/// when a progress channel is attached, reported as a [`ProgressEvent`].
/// Datasets that fail to load or have no usable key are recorded in the result
/// instead of aborting the run.
#[derive(Debug, Clone, Default)]
pub struct ComparisonOrchestrator {
    options: CompareOptions,
    progress: Option<ProgressTx>,
}

impl ComparisonOrchestrator {
    pub fn new(options: CompareOptions) -> Self {
        Self {
            options,
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: ProgressTx) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Load every source and compare the resulting datasets
    pub fn run<L: DatasetLoader + ?Sized>(
        &self,
        loader: &L,
        sources: &[SourceSpec],
        selection: &KeySelection,
    ) -> Result<ComparisonResult> {
        self.run_with_cancel(loader, sources, selection, None)
    }

    /// Load every source and compare the resulting datasets, with cancellation
    pub fn run_with_cancel<L: DatasetLoader + ?Sized>(
        &self,
        loader: &L,
        sources: &[SourceSpec],
        selection: &KeySelection,
        cancel: Option<&AtomicBool>,
    ) -> Result<ComparisonResult> {
        let mut run = RunTracker::new(self.progress.as_ref());
        if sources.is_empty() {
            return Err(run.fail(TabCompareError::NoInputs));
        }

        run.enter(RunState::Loading, format!("Loading {} sources", sources.len()));
        let mut datasets = Vec::with_capacity(sources.len());
        let mut errors = Vec::new();

        for (index, source) in sources.iter().enumerate() {
            run.check_cancelled(cancel)?;
            match loader.load(source) {
                Ok(mut dataset) => {
                    if source.key_column.is_some() {
                        dataset.key_column = source.key_column.clone();
                    }
                    debug!(
                        "Loaded {} ({} rows, {} columns)",
                        dataset.id,
                        dataset.row_count(),
                        dataset.columns.len()
                    );
                    datasets.push(dataset);
                }
                Err(err) => {
                    warn!("{}", err);
                    errors.push(ErrorInfo {
                        source: err.source_id,
                        error: err.reason,
                    });
                }
            }
            run.step(source.to_string(), index + 1, sources.len());
        }

        self.compare(&mut run, &datasets, errors, selection, cancel)
    }

    /// Compare datasets that are already in memory
    pub fn compare_datasets(
        &self,
        datasets: &[Dataset],
        selection: &KeySelection,
    ) -> Result<ComparisonResult> {
        self.compare_datasets_with_cancel(datasets, selection, None)
    }

    /// Compare datasets that are already in memory, with cancellation
    pub fn compare_datasets_with_cancel(
        &self,
        datasets: &[Dataset],
        selection: &KeySelection,
        cancel: Option<&AtomicBool>,
    ) -> Result<ComparisonResult> {
        let mut run = RunTracker::new(self.progress.as_ref());
        if datasets.is_empty() {
            return Err(run.fail(TabCompareError::NoInputs));
        }
        self.compare(&mut run, datasets, Vec::new(), selection, cancel)
    }

    fn compare(
        &self,
        run: &mut RunTracker<'_>,
        datasets: &[Dataset],
        errors: Vec<ErrorInfo>,
        selection: &KeySelection,
        cancel: Option<&AtomicBool>,
    ) -> Result<ComparisonResult> {
        run.check_cancelled(cancel)?;
        run.enter(
            RunState::KeyResolution,
            format!("Resolving keys of {} datasets", datasets.len()),
        );

        let resolution = KeyResolver::new()
            .with_require_key(self.options.require_key)
            .resolve(datasets, selection);
        let mut skipped = resolution.skipped;
        let normalizer = ValueNormalizer::new(self.options.normalize);

        let mut aggregation = Aggregation::default();
        let (mode, compared_columns, ordered) = match resolution.plan {
            KeyPlan::Keyed(keyed) => {
                if keyed.is_empty() {
                    return Err(run.fail(TabCompareError::EmptyResult { skipped, errors }));
                }

                run.enter(
                    RunState::Aggregating,
                    format!("Collecting keys from {} datasets", keyed.len()),
                );
                let aggregator = MembershipAggregator::new(normalizer);
                for (index, entry) in keyed.iter().enumerate() {
                    run.check_cancelled(cancel)?;
                    aggregator.aggregate_dataset(entry, &mut aggregation);
                    run.step(entry.dataset.id.to_string(), index + 1, keyed.len());
                }

                let ordered: Vec<(&Dataset, Option<String>)> = keyed
                    .into_iter()
                    .map(|entry| (entry.dataset, Some(entry.key_column)))
                    .collect();
                (ComparisonMode::KeyColumn, Vec::new(), ordered)
            }
            KeyPlan::FullRow(candidates) => {
                if candidates.is_empty() {
                    return Err(run.fail(TabCompareError::EmptyResult { skipped, errors }));
                }

                let mut comparator = FullRowComparator::new(
                    &candidates,
                    normalizer,
                    &self.options.ignored_columns,
                );
                if comparator.compared_columns().is_empty() {
                    for dataset in &candidates {
                        let err = KeyResolutionError::NoSharedColumns(dataset.id.clone());
                        warn!("Skipping {}: {}", dataset.id, err);
                        skipped.push(skip_info(dataset, &err));
                    }
                    return Err(run.fail(TabCompareError::EmptyResult { skipped, errors }));
                }

                run.enter(
                    RunState::Aggregating,
                    format!(
                        "Indexing rows of {} datasets over {} columns",
                        candidates.len(),
                        comparator.compared_columns().len()
                    ),
                );
                for (index, dataset) in candidates.iter().enumerate() {
                    run.check_cancelled(cancel)?;
                    comparator.aggregate_dataset(dataset, &mut aggregation);
                    run.step(dataset.id.to_string(), index + 1, candidates.len());
                }

                let columns = comparator.compared_columns().to_vec();
                let ordered = candidates.into_iter().map(|dataset| (dataset, None)).collect();
                (ComparisonMode::FullRow, columns, ordered)
            }
        };

        run.check_cancelled(cancel)?;
        let participating = aggregation.participating();
        if participating.is_empty() {
            for (dataset, _) in &ordered {
                let err = KeyResolutionError::NoValues(dataset.id.clone());
                warn!("Skipping {}: {}", dataset.id, err);
                skipped.push(skip_info(dataset, &err));
            }
            return Err(run.fail(TabCompareError::EmptyResult { skipped, errors }));
        }
        run.enter(
            RunState::SetAlgebra,
            format!(
                "Classifying {} keys across {} datasets",
                aggregation.membership.len(),
                participating.len()
            ),
        );
        let outcome = SetAlgebraEngine::compute(&aggregation.membership, &participating);

        let datasets = self.summarize(&ordered, &aggregation, &outcome);
        let key_label = match mode {
            ComparisonMode::FullRow => None,
            ComparisonMode::KeyColumn => selection
                .shared_key()
                .map(str::to_string)
                .or_else(|| key_label_from(&datasets, &participating)),
        };

        let result = ComparisonResult {
            mode,
            key_label,
            compared_columns,
            datasets,
            all_keys: aggregation.all_keys(),
            membership: aggregation.membership,
            common_keys: outcome.common,
            skipped,
            errors,
        };

        run.enter(
            RunState::Done,
            format!(
                "{} keys, {} common, {} datasets skipped, {} failed",
                result.all_keys.len(),
                result.common_keys.len(),
                result.skipped.len(),
                result.errors.len()
            ),
        );
        Ok(result)
    }

    fn summarize(
        &self,
        ordered: &[(&Dataset, Option<String>)],
        aggregation: &Aggregation,
        outcome: &SetAlgebraOutcome,
    ) -> Vec<DatasetSummary> {
        ordered
            .iter()
            .map(|(dataset, key_column)| {
                let counts = aggregation
                    .counts
                    .get(&dataset.id)
                    .copied()
                    .unwrap_or_default();
                let exclusive_keys = outcome.exclusive_keys(&dataset.id).to_vec();

                DatasetSummary {
                    id: dataset.id.clone(),
                    total_rows: counts.total_rows,
                    dropped_rows: counts.dropped_rows,
                    exclusive_count: exclusive_keys.len(),
                    exclusive_keys,
                    key_column: key_column.clone(),
                    sheet_id: dataset.id.sheet_name.clone(),
                    is_primary: self
                        .options
                        .primary
                        .as_deref()
                        .map_or(false, |primary| dataset.id.is_from(primary)),
                }
            })
            .collect()
    }
}

/// Label for per-dataset keys: the primary dataset's key, else the first participating one
fn key_label_from(
    summaries: &[DatasetSummary],
    participating: &BTreeSet<DatasetId>,
) -> Option<String> {
    summaries
        .iter()
        .find(|summary| summary.is_primary)
        .or_else(|| {
            summaries
                .iter()
                .find(|summary| participating.contains(&summary.id))
        })
        .or_else(|| summaries.first())
        .and_then(|summary| summary.key_column.clone())
}

/// Current state of a run plus the channel its transitions are reported on
struct RunTracker<'a> {
    state: RunState,
    progress: Option<&'a ProgressTx>,
}

impl<'a> RunTracker<'a> {
    fn new(progress: Option<&'a ProgressTx>) -> Self {
        let tracker = Self {
            state: RunState::Init,
            progress,
        };
        emit(tracker.progress, ProgressEvent::stage(RunState::Init, "Starting comparison"));
        tracker
    }

    fn enter(&mut self, state: RunState, detail: String) {
        info!("{}: {}", state, detail);
        self.state = state;
        emit(self.progress, ProgressEvent::stage(state, detail));
    }

    fn step(&self, detail: String, current: usize, total: usize) {
        emit(
            self.progress,
            ProgressEvent::step(self.state, detail, current, total),
        );
    }

    fn check_cancelled(&mut self, cancel: Option<&AtomicBool>) -> Result<()> {
        if cancel.map_or(false, |flag| flag.load(Ordering::Relaxed)) {
            return Err(self.fail(TabCompareError::Cancelled(self.state)));
        }
        Ok(())
    }

    /// Move to `Failed` and hand the error back to the caller
    fn fail(&mut self, err: TabCompareError) -> TabCompareError {
        warn!("Comparison failed during {}: {}", self.state, err);
        let detail = err.to_string();
        self.state = RunState::Failed;
        emit(self.progress, ProgressEvent::stage(RunState::Failed, detail));
        err
    }
}
