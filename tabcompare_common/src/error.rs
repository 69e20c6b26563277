use crate::{DatasetId, ErrorInfo, RunState, SkipInfo};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TabCompareError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("No input files found")]
    NoInputs,

    #[error(
        "No usable datasets: {} skipped, {} failed to load",
        .skipped.len(),
        .errors.len()
    )]
    EmptyResult {
        skipped: Vec<SkipInfo>,
        errors: Vec<ErrorInfo>,
    },

    #[error("Comparison cancelled during {0}")]
    Cancelled(RunState),
}

impl TabCompareError {
    /// State the run was in when it moved to `Failed`, for run-level errors.
    pub fn failed_in(&self) -> Option<RunState> {
        match self {
            TabCompareError::NoInputs => Some(RunState::Init),
            TabCompareError::EmptyResult { .. } => Some(RunState::KeyResolution),
            TabCompareError::Cancelled(state) => Some(*state),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, TabCompareError>;

/// A source could not be read into a dataset.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Failed to load {source_id}: {reason}")]
pub struct LoadError {
    pub source_id: String,
    pub reason: String,
}

impl LoadError {
    pub fn new(source_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            reason: reason.into(),
        }
    }
}

/// Why a dataset could not take part in the comparison.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyResolutionError {
    #[error("Key column '{column}' not found in {dataset}")]
    KeyNotFound { dataset: DatasetId, column: String },

    #[error("No key column assigned to {0}")]
    MissingAssignment(DatasetId),

    #[error("A key column is required but none was selected for {0}")]
    KeyRequired(DatasetId),

    #[error("{0} shares no columns with the other datasets")]
    NoSharedColumns(DatasetId),

    #[error("{0} was given more than once")]
    Duplicate(DatasetId),

    #[error("{0} has no non-blank values to compare")]
    NoValues(DatasetId),
}

impl KeyResolutionError {
    pub fn dataset(&self) -> &DatasetId {
        match self {
            KeyResolutionError::KeyNotFound { dataset, .. } => dataset,
            KeyResolutionError::MissingAssignment(dataset)
            | KeyResolutionError::KeyRequired(dataset)
            | KeyResolutionError::NoSharedColumns(dataset)
            | KeyResolutionError::Duplicate(dataset)
            | KeyResolutionError::NoValues(dataset) => dataset,
        }
    }
}
