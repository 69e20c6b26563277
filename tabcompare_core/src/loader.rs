#[cfg(feature = "excel-source")]
use calamine::{open_workbook_auto, Data, Reader};
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use tabcompare_common::{CellValue, Dataset, DatasetId, LoadError, Row};
use tracing::debug;

/// One table to load: a file and, for workbooks, the sheet to read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSpec {
    pub path: PathBuf,
    /// `None` reads the first sheet
    pub sheet: Option<String>,
    /// Key column for this source when keys are assigned per dataset
    pub key_column: Option<String>,
}

impl SourceSpec {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            sheet: None,
            key_column: None,
        }
    }

    pub fn with_sheet(mut self, sheet: impl Into<String>) -> Self {
        self.sheet = Some(sheet.into());
        self
    }

    pub fn with_key_column(mut self, column: impl Into<String>) -> Self {
        self.key_column = Some(column.into());
        self
    }

    pub fn dataset_id(&self) -> DatasetId {
        DatasetId::new(self.path.clone(), self.sheet.clone())
    }
}

impl fmt::Display for SourceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.sheet {
            Some(sheet) => write!(f, "{}#{}", self.path.display(), sheet),
            None => write!(f, "{}", self.path.display()),
        }
    }
}

/// Turns a source into an in-memory dataset
pub trait DatasetLoader {
    fn load(&self, source: &SourceSpec) -> Result<Dataset, LoadError>;
}

/// Reads CSV files and Excel/ODS workbooks from disk
#[derive(Debug, Clone, Copy, Default)]
pub struct FileLoader;

impl FileLoader {
    pub fn new() -> Self {
        Self
    }
}

impl DatasetLoader for FileLoader {
    fn load(&self, source: &SourceSpec) -> Result<Dataset, LoadError> {
        let fail = |reason: String| LoadError::new(source.to_string(), reason);

        let (columns, rows) = if is_csv_file(&source.path) {
            if source.sheet.is_some() {
                return Err(fail("CSV files have no sheets".to_string()));
            }
            read_csv(&source.path).map_err(fail)?
        } else if is_excel_file(&source.path) {
            read_sheet(&source.path, source.sheet.as_deref()).map_err(fail)?
        } else {
            return Err(fail("Unsupported file type".to_string()));
        };

        debug!("Read {} rows from {}", rows.len(), source);
        let mut dataset = Dataset::new(source.dataset_id(), columns, rows);
        dataset.key_column = source.key_column.clone();
        Ok(dataset)
    }
}

#[cfg(feature = "csv-source")]
fn read_csv(path: &Path) -> Result<(Vec<String>, Vec<Row>), String> {
    let delimiter = if has_extension(path, &["tsv"]) { b'\t' } else { b',' };
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_path(path)
        .map_err(|e| format!("Failed to open CSV file: {}", e))?;

    let headers = reader
        .headers()
        .map_err(|e| format!("Failed to read CSV headers: {}", e))?
        .iter()
        .map(|s| s.to_string())
        .collect();
    let columns = normalize_headers(headers);

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| format!("Failed to read CSV record: {}", e))?;
        let row: Row = columns
            .iter()
            .zip(record.iter())
            .map(|(column, cell)| {
                let value = if cell.is_empty() {
                    CellValue::Null
                } else {
                    CellValue::from(cell)
                };
                (column.as_str(), value)
            })
            .collect();
        rows.push(row);
    }
    Ok((columns, rows))
}

#[cfg(not(feature = "csv-source"))]
fn read_csv(_path: &Path) -> Result<(Vec<String>, Vec<Row>), String> {
    Err("CSV support is not enabled".to_string())
}

#[cfg(feature = "excel-source")]
fn read_sheet(path: &Path, sheet: Option<&str>) -> Result<(Vec<String>, Vec<Row>), String> {
    let mut workbook =
        open_workbook_auto(path).map_err(|e| format!("Failed to open workbook: {}", e))?;

    let name = match sheet {
        Some(name) => name.to_string(),
        None => workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or_else(|| "Workbook has no sheets".to_string())?,
    };
    let range = workbook
        .worksheet_range(&name)
        .map_err(|e| format!("Failed to read sheet '{}': {}", name, e))?;

    // the range starts at the first used cell; columns stay anchored at A
    let offset = range.start().map_or(0, |(_, column)| column as usize);
    let mut cells = range.rows();
    let Some(header_row) = cells.next() else {
        return Ok((Vec::new(), Vec::new()));
    };
    let headers = std::iter::repeat(String::new())
        .take(offset)
        .chain(header_row.iter().map(|cell| cell.to_string()))
        .collect();
    let columns = normalize_headers(headers);

    let rows = cells
        .map(|cells| {
            columns
                .iter()
                .skip(offset)
                .zip(cells)
                .map(|(column, cell)| (column.as_str(), cell_value(cell)))
                .collect::<Row>()
        })
        .collect();
    Ok((columns, rows))
}

#[cfg(not(feature = "excel-source"))]
fn read_sheet(_path: &Path, _sheet: Option<&str>) -> Result<(Vec<String>, Vec<Row>), String> {
    Err("Excel support is not enabled".to_string())
}

#[cfg(feature = "excel-source")]
fn cell_value(cell: &Data) -> CellValue {
    match cell {
        Data::Empty | Data::Error(_) => CellValue::Null,
        Data::String(text) => CellValue::Text(text.clone()),
        Data::Float(number) => CellValue::Number(*number),
        Data::Int(number) => CellValue::from(*number),
        Data::Bool(flag) => CellValue::Boolean(*flag),
        // dates and durations keep their display form
        other => CellValue::Text(other.to_string()),
    }
}

/// Sheet names of a workbook; CSV files have none
pub fn sheet_names(path: &Path) -> Result<Vec<String>, LoadError> {
    if is_csv_file(path) {
        return Ok(Vec::new());
    }
    if !is_excel_file(path) {
        return Err(LoadError::new(
            path.display().to_string(),
            "Unsupported file type",
        ));
    }
    workbook_sheet_names(path).map_err(|reason| LoadError::new(path.display().to_string(), reason))
}

#[cfg(feature = "excel-source")]
fn workbook_sheet_names(path: &Path) -> Result<Vec<String>, String> {
    let workbook =
        open_workbook_auto(path).map_err(|e| format!("Failed to open workbook: {}", e))?;
    Ok(workbook.sheet_names())
}

#[cfg(not(feature = "excel-source"))]
fn workbook_sheet_names(_path: &Path) -> Result<Vec<String>, String> {
    Err("Excel support is not enabled".to_string())
}

/// Files in `dir` matching any of `patterns`, sorted and without Office lock files
pub fn discover_files(dir: &Path, patterns: &[String]) -> Result<Vec<PathBuf>, LoadError> {
    let mut found = BTreeSet::new();

    for pattern in patterns {
        let full = dir.join(pattern);
        let entries = glob::glob(&full.to_string_lossy())
            .map_err(|e| LoadError::new(dir.display().to_string(), e.to_string()))?;

        for path in entries.flatten() {
            let is_lock_file = path
                .file_name()
                .map_or(false, |name| name.to_string_lossy().starts_with("~$"));
            if path.is_file() && !is_lock_file {
                found.insert(path);
            }
        }
    }

    debug!("Found {} input files in {}", found.len(), dir.display());
    Ok(found.into_iter().collect())
}

/// Trim header names, name blank ones `Unnamed: <index>` and suffix duplicates `.1`, `.2`
pub fn normalize_headers(raw: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut columns = Vec::with_capacity(raw.len());

    for (index, name) in raw.into_iter().enumerate() {
        let trimmed = name.trim();
        let base = if trimmed.is_empty() {
            format!("Unnamed: {}", index)
        } else {
            trimmed.to_string()
        };

        let mut candidate = base.clone();
        let mut suffix = 0;
        while seen.contains(&candidate) {
            suffix += 1;
            candidate = format!("{}.{}", base, suffix);
        }
        seen.insert(candidate.clone());
        columns.push(candidate);
    }
    columns
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .map_or(false, |ext| extensions.contains(&ext.as_str()))
}

/// Check if a file path appears to be a CSV based on extension
pub fn is_csv_file(path: &Path) -> bool {
    has_extension(path, &["csv", "tsv"])
}

/// Check if a file path appears to be a workbook based on extension
pub fn is_excel_file(path: &Path) -> bool {
    has_extension(path, &["xlsx", "xlsm", "xlsb", "xls", "ods"])
}
