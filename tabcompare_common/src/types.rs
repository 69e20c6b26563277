use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};

/// Identity of one dataset: a file, optionally narrowed to one sheet of a workbook
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DatasetId {
    pub source_path: PathBuf,
    pub sheet_name: Option<String>,
}

impl DatasetId {
    pub fn new(source_path: impl Into<PathBuf>, sheet_name: Option<String>) -> Self {
        Self {
            source_path: source_path.into(),
            sheet_name,
        }
    }

    /// File name of the source, falling back to the full path
    pub fn file_name(&self) -> String {
        self.source_path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| self.source_path.to_string_lossy().to_string())
    }

    pub fn is_from(&self, path: &Path) -> bool {
        self.source_path == path
    }
}

impl fmt::Display for DatasetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.sheet_name {
            Some(sheet) => write!(f, "{} - {}", self.file_name(), sheet),
            None => write!(f, "{}", self.file_name()),
        }
    }
}

/// A single spreadsheet cell
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    #[default]
    Null,
    Boolean(bool),
    Number(f64),
    Text(String),
}

impl CellValue {
    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Text(value.to_string())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::Text(value)
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

impl From<i64> for CellValue {
    fn from(value: i64) -> Self {
        CellValue::Number(value as f64)
    }
}

impl From<bool> for CellValue {
    fn from(value: bool) -> Self {
        CellValue::Boolean(value)
    }
}

static NULL_CELL: CellValue = CellValue::Null;

/// One table row, addressed by column name
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Row(BTreeMap<String, CellValue>);

impl Row {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Value of a column; columns the row does not have read as null
    pub fn get(&self, column: &str) -> &CellValue {
        self.0.get(column).unwrap_or(&NULL_CELL)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<CellValue>> FromIterator<(K, V)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(column, value)| (column.into(), value.into()))
                .collect(),
        )
    }
}

/// A loaded table; immutable for the duration of a comparison run
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    pub id: DatasetId,
    /// Column names in sheet order
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    /// Key column designated for this dataset by whoever loaded it
    pub key_column: Option<String>,
}

impl Dataset {
    pub fn new(id: DatasetId, columns: Vec<String>, rows: Vec<Row>) -> Self {
        Self {
            id,
            columns,
            rows,
            key_column: None,
        }
    }

    pub fn with_key_column(mut self, column: impl Into<String>) -> Self {
        self.key_column = Some(column.into());
        self
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

/// Canonical comparison token derived from a cell or a whole row
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NormalizedKey(String);

impl NormalizedKey {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NormalizedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NormalizedKey {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Datasets holding each key, sorted by key
pub type Membership = BTreeMap<NormalizedKey, BTreeSet<DatasetId>>;

/// A dataset excluded from the comparison
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkipInfo {
    pub dataset: DatasetId,
    pub reason: String,
    /// Columns the dataset does have, for diagnostics
    pub available_columns: Vec<String>,
}

/// A source that failed to load
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorInfo {
    pub source: String,
    pub error: String,
}

/// Stage of a comparison run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RunState {
    Init,
    Loading,
    KeyResolution,
    Aggregating,
    SetAlgebra,
    Done,
    Failed,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Done | RunState::Failed)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Init => "init",
            RunState::Loading => "loading",
            RunState::KeyResolution => "key resolution",
            RunState::Aggregating => "aggregating",
            RunState::SetAlgebra => "set algebra",
            RunState::Done => "done",
            RunState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// How record identity was decided
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComparisonMode {
    /// One key column per dataset
    KeyColumn,
    /// Every shared column jointly
    FullRow,
}

/// Per-dataset counts of a finished comparison
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetSummary {
    pub id: DatasetId,
    /// Rows read from the source, including dropped ones
    pub total_rows: usize,
    /// Rows whose key was null or blank
    pub dropped_rows: usize,
    pub exclusive_count: usize,
    /// Keys found only in this dataset, sorted
    pub exclusive_keys: Vec<NormalizedKey>,
    pub key_column: Option<String>,
    pub sheet_id: Option<String>,
    pub is_primary: bool,
}

impl DatasetSummary {
    pub fn compared_rows(&self) -> usize {
        self.total_rows - self.dropped_rows
    }

    /// Share of the dataset's rows that are exclusive to it, in percent
    pub fn exclusive_percentage(&self) -> f64 {
        if self.total_rows == 0 {
            0.0
        } else {
            self.exclusive_count as f64 / self.total_rows as f64 * 100.0
        }
    }
}

/// Outcome of one comparison run, handed to the report renderer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonResult {
    pub mode: ComparisonMode,
    /// Heading under which keys are reported
    pub key_label: Option<String>,
    /// Columns forming the row identity in full-row mode
    pub compared_columns: Vec<String>,
    pub datasets: Vec<DatasetSummary>,
    pub all_keys: Vec<NormalizedKey>,
    pub membership: Membership,
    /// Keys present in every participating dataset
    pub common_keys: Vec<NormalizedKey>,
    pub skipped: Vec<SkipInfo>,
    pub errors: Vec<ErrorInfo>,
}

impl ComparisonResult {
    pub fn summary(&self, id: &DatasetId) -> Option<&DatasetSummary> {
        self.datasets.iter().find(|summary| &summary.id == id)
    }

    pub fn is_present(&self, key: &NormalizedKey, id: &DatasetId) -> bool {
        self.membership
            .get(key)
            .map_or(false, |present_in| present_in.contains(id))
    }

    /// Keys held by two or more datasets
    pub fn shared_count(&self) -> usize {
        self.membership
            .values()
            .filter(|present_in| present_in.len() > 1)
            .count()
    }
}

/// Comparison settings read from `tabcompare.toml`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompareConfig {
    /// Shared key column used when none is given on the command line
    #[serde(default)]
    pub default_key_column: Option<String>,

    /// Skip datasets instead of falling back to full-row comparison
    #[serde(default)]
    pub require_key: bool,

    #[serde(default = "default_true")]
    pub trim_whitespace: bool,

    #[serde(default = "default_true")]
    pub case_sensitive: bool,

    /// Keep naive number formatting (`1.0` stays `1.0`)
    #[serde(default)]
    pub legacy_numeric: bool,

    /// Columns left out of full-row identity
    #[serde(default)]
    pub ignored_columns: Vec<String>,

    /// File name patterns picked up when a directory is given as input
    #[serde(default = "default_input_patterns")]
    pub input_patterns: Vec<String>,

    /// Enable portable mode (config alongside binary)
    #[serde(default)]
    pub portable_mode: bool,
}

impl Default for CompareConfig {
    fn default() -> Self {
        Self {
            default_key_column: None,
            require_key: false,
            trim_whitespace: true,
            case_sensitive: true,
            legacy_numeric: false,
            ignored_columns: Vec::new(),
            input_patterns: default_input_patterns(),
            portable_mode: false,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_input_patterns() -> Vec<String> {
    ["*.xlsx", "*.xlsm", "*.xls", "*.csv"]
        .iter()
        .map(|pattern| pattern.to_string())
        .collect()
}
