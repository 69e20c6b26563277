use anyhow::{anyhow, bail, Context};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::collections::HashSet;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;
use tabcompare_common::{
    ensure_config, load_config, ComparisonMode, ComparisonResult, ErrorInfo, SkipInfo,
    TabCompareError,
};
use tabcompare_core::{
    common_columns, discover_files, is_excel_file, sheet_names, CompareOptions,
    ComparisonOrchestrator, DatasetLoader, FileLoader, KeySelection, NumericPolicy, ProgressEvent,
    SourceSpec,
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tabcompare")]
#[command(author = "TabCompare Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Find which records are unique to or shared between spreadsheets", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compare two or more spreadsheets by key column or by whole rows
    #[command(
        after_help = "CSV cells are compared as written: a CSV value `1.0` does not match the workbook number 1."
    )]
    Compare {
        /// Input files (`data.xlsx`, `data.xlsx#Sheet2`, `data.csv`) or directories
        #[arg(required = true)]
        inputs: Vec<String>,

        /// Key column shared by every input
        #[arg(short = 'c', long, conflicts_with = "keys")]
        column: Option<String>,

        /// Key column of one input, as SOURCE=COLUMN (can be specified multiple times)
        #[arg(short = 'k', long = "key", value_name = "SOURCE=COLUMN")]
        keys: Vec<String>,

        /// Compare every sheet of each workbook instead of the first one
        #[arg(long)]
        all_sheets: bool,

        /// Input whose key column labels the report
        #[arg(long)]
        primary: Option<PathBuf>,

        /// Skip inputs without a key instead of comparing whole rows
        #[arg(long)]
        require_key: bool,

        /// Column to leave out of whole-row comparison (can be specified multiple times)
        #[arg(long = "ignore-column", value_name = "COLUMN")]
        ignore_columns: Vec<String>,

        /// Treat keys that differ only in case as equal
        #[arg(long)]
        case_insensitive: bool,

        /// Keep the float suffix of integral numbers (`1.0` does not match `1`)
        #[arg(long)]
        legacy_numeric: bool,

        /// Output results as JSON (machine-readable)
        #[arg(long)]
        json: bool,

        /// Disable colored output
        #[arg(long)]
        no_color: bool,

        /// List every key with the inputs it appears in
        #[arg(long)]
        show_keys: bool,
    },

    /// List the sheets and columns of each input and the columns they share
    Columns {
        /// Input files or directories
        #[arg(required = true)]
        inputs: Vec<String>,

        /// Read every sheet of each workbook
        #[arg(long)]
        all_sheets: bool,
    },

    /// Show the config file, creating it with defaults when missing
    Config {
        /// Keep the config file next to the executable
        #[arg(long)]
        portable: bool,
    },
}

struct CompareArgs {
    inputs: Vec<String>,
    column: Option<String>,
    keys: Vec<String>,
    all_sheets: bool,
    primary: Option<PathBuf>,
    require_key: bool,
    ignore_columns: Vec<String>,
    case_insensitive: bool,
    legacy_numeric: bool,
    json: bool,
    no_color: bool,
    show_keys: bool,
}

fn main() {
    // Initialize tracing to stderr (so JSON output can go cleanly to stdout)
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let outcome = match cli.command {
        Commands::Compare {
            inputs,
            column,
            keys,
            all_sheets,
            primary,
            require_key,
            ignore_columns,
            case_insensitive,
            legacy_numeric,
            json,
            no_color,
            show_keys,
        } => run_compare(CompareArgs {
            inputs,
            column,
            keys,
            all_sheets,
            primary,
            require_key,
            ignore_columns,
            case_insensitive,
            legacy_numeric,
            json,
            no_color,
            show_keys,
        }),
        Commands::Columns { inputs, all_sheets } => run_columns(&inputs, all_sheets),
        Commands::Config { portable } => run_config(portable),
    };

    if let Err(e) = outcome {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

fn run_compare(args: CompareArgs) -> anyhow::Result<()> {
    let loaded = load_config(false)?;
    let mut config = loaded.config;
    if loaded.exists {
        info!("Using config {}", loaded.path.display());
    }

    config.require_key |= args.require_key;
    config.legacy_numeric |= args.legacy_numeric;
    if args.case_insensitive {
        config.case_sensitive = false;
    }
    config.ignored_columns.extend(args.ignore_columns);

    let mut sources = expand_inputs(&args.inputs, &config.input_patterns, args.all_sheets)?;
    for assignment in &args.keys {
        let (source, column) = parse_key_assignment(assignment)?;
        assign_key(&mut sources, &source, &column)?;
    }

    let selection = match args.column.or_else(|| {
        if args.keys.is_empty() {
            config.default_key_column.clone()
        } else {
            None
        }
    }) {
        Some(column) => KeySelection::Shared(column),
        None if !args.keys.is_empty() => KeySelection::PerDataset(Default::default()),
        None => KeySelection::FullRow,
    };

    let mut options = CompareOptions::from(&config);
    options.primary = args.primary;
    if options.normalize.numeric_policy == NumericPolicy::Legacy {
        info!("Using legacy number formatting");
    }

    info!("Comparing {} sources", sources.len());
    let result = match compare_with_progress(options, sources, selection, args.json)? {
        Ok(result) => result,
        Err(TabCompareError::EmptyResult { skipped, errors }) => {
            print_problems(&skipped, &errors);
            bail!(
                "Nothing to compare: {} inputs skipped, {} failed to load",
                skipped.len(),
                errors.len()
            );
        }
        Err(e) => return Err(e.into()),
    };

    if args.json {
        let report = build_json_report(&result, args.show_keys);
        let output = serde_json::to_string_pretty(&report)?;
        println!("{output}");
        return Ok(());
    }

    let use_color = !args.no_color && std::io::stdout().is_terminal();
    print_report(&result, args.show_keys, use_color);
    Ok(())
}

/// Run the comparison on a worker thread while the main thread renders progress
fn compare_with_progress(
    options: CompareOptions,
    sources: Vec<SourceSpec>,
    selection: KeySelection,
    quiet: bool,
) -> anyhow::Result<tabcompare_common::Result<ComparisonResult>> {
    let (tx, rx) = crossbeam::channel::unbounded();
    let orchestrator = ComparisonOrchestrator::new(options).with_progress(tx);
    let worker = thread::spawn(move || orchestrator.run(&FileLoader::new(), &sources, &selection));

    let spinner = if quiet {
        ProgressBar::hidden()
    } else {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(ProgressStyle::with_template("{spinner:.cyan} {msg}")?);
        spinner.enable_steady_tick(Duration::from_millis(100));
        spinner
    };

    for event in rx.iter() {
        spinner.set_message(progress_message(&event));
    }
    spinner.finish_and_clear();

    worker
        .join()
        .map_err(|_| anyhow!("Comparison worker panicked"))
}

fn progress_message(event: &ProgressEvent) -> String {
    match (event.current, event.total) {
        (Some(current), Some(total)) => {
            format!("[{}] {} ({}/{})", event.stage, event.detail, current, total)
        }
        _ => format!("[{}] {}", event.stage, event.detail),
    }
}

fn run_columns(inputs: &[String], all_sheets: bool) -> anyhow::Result<()> {
    let loaded = load_config(false)?;
    let sources = expand_inputs(inputs, &loaded.config.input_patterns, all_sheets)?;
    if sources.is_empty() {
        bail!("No input files found");
    }

    let loader = FileLoader::new();
    let mut datasets = Vec::new();
    for source in &sources {
        if !all_sheets && is_excel_file(&source.path) && source.sheet.is_none() {
            if let Ok(names) = sheet_names(&source.path) {
                println!("{} sheets: {}", source.path.display(), names.join(", "));
            }
        }

        match loader.load(source) {
            Ok(dataset) => {
                println!("{}: {}", dataset.id, dataset.columns.join(", "));
                datasets.push(dataset);
            }
            Err(e) => warn!("{}", e),
        }
    }

    if datasets.len() > 1 {
        let shared = common_columns(&datasets);
        println!();
        if shared.is_empty() {
            println!("No columns shared by all inputs");
        } else {
            println!("Shared columns: {}", shared.join(", "));
        }
    }
    Ok(())
}

fn run_config(portable: bool) -> anyhow::Result<()> {
    let loaded = ensure_config(portable)?;
    let mode = if loaded.portable { "portable" } else { "user" };
    if loaded.exists {
        println!("Config file ({}): {}", mode, loaded.path.display());
    } else {
        println!("Created config file ({}): {}", mode, loaded.path.display());
    }
    println!("{}", serde_json::to_string_pretty(&loaded.config)?);
    Ok(())
}

/// Turn command-line inputs into sources: directories are expanded with `patterns`,
/// `file#Sheet` selects a sheet, and `all_sheets` splits workbooks per sheet.
/// A source named twice is kept once.
fn expand_inputs(
    inputs: &[String],
    patterns: &[String],
    all_sheets: bool,
) -> anyhow::Result<Vec<SourceSpec>> {
    let mut sources = Vec::new();

    for input in inputs {
        let (path, sheet) = parse_input(input);
        if path.is_dir() {
            let files = discover_files(&path, patterns)
                .with_context(|| format!("Failed to list {}", path.display()))?;
            if files.is_empty() {
                warn!("No matching files in {}", path.display());
            }
            for file in files {
                sources.extend(sources_for_file(file, None, all_sheets));
            }
        } else {
            sources.extend(sources_for_file(path, sheet, all_sheets));
        }
    }

    let mut seen = HashSet::new();
    sources.retain(|source| {
        let first = seen.insert(source.dataset_id());
        if !first {
            warn!("Ignoring repeated input {}", source);
        }
        first
    });
    Ok(sources)
}

fn sources_for_file(path: PathBuf, sheet: Option<String>, all_sheets: bool) -> Vec<SourceSpec> {
    if let Some(sheet) = sheet {
        return vec![SourceSpec::new(path).with_sheet(sheet)];
    }
    if all_sheets && is_excel_file(&path) {
        match sheet_names(&path) {
            Ok(names) if !names.is_empty() => {
                return names
                    .into_iter()
                    .map(|name| SourceSpec::new(path.clone()).with_sheet(name))
                    .collect();
            }
            Ok(_) => {}
            // the loader reports the failure for this source
            Err(e) => warn!("{}", e),
        }
    }
    vec![SourceSpec::new(path)]
}

/// Split `file#Sheet` unless the whole input names an existing path
fn parse_input(input: &str) -> (PathBuf, Option<String>) {
    if Path::new(input).exists() {
        return (PathBuf::from(input), None);
    }
    match input.rsplit_once('#') {
        Some((file, sheet)) if !file.is_empty() && !sheet.is_empty() => {
            (PathBuf::from(file), Some(sheet.to_string()))
        }
        _ => (PathBuf::from(input), None),
    }
}

fn parse_key_assignment(assignment: &str) -> anyhow::Result<(String, String)> {
    let Some((source, column)) = assignment.split_once('=') else {
        bail!("Invalid key assignment '{}', expected SOURCE=COLUMN", assignment);
    };
    let (source, column) = (source.trim(), column.trim());
    if source.is_empty() || column.is_empty() {
        bail!("Invalid key assignment '{}', expected SOURCE=COLUMN", assignment);
    }
    Ok((source.to_string(), column.to_string()))
}

/// Set the key column of every source named by `source`: its full input form,
/// its path, or its file name
fn assign_key(sources: &mut [SourceSpec], source: &str, column: &str) -> anyhow::Result<()> {
    let mut matched = false;
    for spec in sources.iter_mut() {
        let file_name = spec
            .path
            .file_name()
            .map(|name| name.to_string_lossy().to_string());
        if spec.to_string() == source
            || spec.path == Path::new(source)
            || file_name.as_deref() == Some(source)
        {
            spec.key_column = Some(column.to_string());
            matched = true;
        }
    }

    if !matched {
        bail!("Key assignment '{}={}' matches no input", source, column);
    }
    Ok(())
}

fn print_problems(skipped: &[SkipInfo], errors: &[ErrorInfo]) {
    for skip in skipped {
        eprintln!("Skipped {}: {}", skip.dataset, skip.reason);
        eprintln!("  Available columns: {}", skip.available_columns.join(", "));
    }
    for err in errors {
        eprintln!("Failed to read {}: {}", err.source, err.error);
    }
}

fn print_report(result: &ComparisonResult, show_keys: bool, use_color: bool) {
    let paint = |text: &str, code: &str| {
        if use_color {
            format!("{}{}\x1b[0m", code, text)
        } else {
            text.to_string()
        }
    };

    println!("{}", "=".repeat(80));
    match result.mode {
        ComparisonMode::KeyColumn => println!(
            "Key column: {}",
            result.key_label.as_deref().unwrap_or("(per input)")
        ),
        ComparisonMode::FullRow => {
            println!("Whole-row comparison on: {}", result.compared_columns.join(", "))
        }
    }
    println!("{}", "=".repeat(80));

    for summary in &result.datasets {
        let marker = if summary.is_primary { " (primary)" } else { "" };
        let key = summary
            .key_column
            .as_deref()
            .map(|column| format!(" [key: {}]", column))
            .unwrap_or_default();
        println!(
            "  {}{}{}: {} unique of {} rows ({:.1}%)",
            summary.id,
            key,
            marker,
            paint(&summary.exclusive_count.to_string(), "\x1b[33m"),
            summary.total_rows,
            summary.exclusive_percentage()
        );
        if summary.dropped_rows > 0 {
            println!("      {} rows without a value were not compared", summary.dropped_rows);
        }
    }

    println!("{}", "-".repeat(80));
    println!("  Distinct keys:   {}", result.all_keys.len());
    println!(
        "  In every input:  {}",
        paint(&result.common_keys.len().to_string(), "\x1b[32m")
    );
    println!("  In two or more:  {}", result.shared_count());

    if !result.skipped.is_empty() || !result.errors.is_empty() {
        println!("{}", "-".repeat(80));
        for skip in &result.skipped {
            println!("  {} {}: {}", paint("skipped", "\x1b[31m"), skip.dataset, skip.reason);
            println!("      Available columns: {}", skip.available_columns.join(", "));
        }
        for err in &result.errors {
            println!("  {} {}: {}", paint("failed", "\x1b[31m"), err.source, err.error);
        }
    }

    if show_keys {
        println!("{}", "-".repeat(80));
        let header: Vec<String> = result.datasets.iter().map(|s| s.id.to_string()).collect();
        println!("  {} | {}", result.key_label.as_deref().unwrap_or("key"), header.join(" | "));
        for key in &result.all_keys {
            let marks: Vec<String> = result
                .datasets
                .iter()
                .map(|summary| {
                    if result.is_present(key, &summary.id) {
                        paint("yes", "\x1b[32m")
                    } else {
                        paint("no", "\x1b[31m")
                    }
                })
                .collect();
            println!("  {} | {}", key, marks.join(" | "));
        }
    }
    println!("{}", "=".repeat(80));
}

#[derive(Serialize)]
struct JsonReport<'a> {
    generated_at: String,
    mode: ComparisonMode,
    key_label: Option<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    compared_columns: Vec<&'a str>,
    summary: JsonSummary,
    datasets: Vec<JsonDataset<'a>>,
    common_keys: Vec<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    keys: Option<Vec<JsonKey<'a>>>,
    skipped: &'a [SkipInfo],
    errors: &'a [ErrorInfo],
}

#[derive(Serialize)]
struct JsonSummary {
    total_keys: usize,
    common: usize,
    shared: usize,
    datasets: usize,
    skipped: usize,
    errors: usize,
}

#[derive(Serialize)]
struct JsonDataset<'a> {
    name: String,
    path: String,
    sheet: Option<&'a str>,
    key_column: Option<&'a str>,
    total_rows: usize,
    dropped_rows: usize,
    exclusive_count: usize,
    exclusive_percentage: f64,
    is_primary: bool,
    exclusive_keys: Vec<&'a str>,
}

#[derive(Serialize)]
struct JsonKey<'a> {
    key: &'a str,
    present_in: Vec<String>,
}

fn build_json_report(result: &ComparisonResult, show_keys: bool) -> JsonReport<'_> {
    let datasets = result
        .datasets
        .iter()
        .map(|summary| JsonDataset {
            name: summary.id.to_string(),
            path: summary.id.source_path.to_string_lossy().to_string(),
            sheet: summary.sheet_id.as_deref(),
            key_column: summary.key_column.as_deref(),
            total_rows: summary.total_rows,
            dropped_rows: summary.dropped_rows,
            exclusive_count: summary.exclusive_count,
            exclusive_percentage: summary.exclusive_percentage(),
            is_primary: summary.is_primary,
            exclusive_keys: summary.exclusive_keys.iter().map(|k| k.as_str()).collect(),
        })
        .collect();

    let keys = show_keys.then(|| {
        result
            .membership
            .iter()
            .map(|(key, present_in)| JsonKey {
                key: key.as_str(),
                present_in: present_in.iter().map(|id| id.to_string()).collect(),
            })
            .collect()
    });

    JsonReport {
        generated_at: chrono::Local::now().to_rfc3339(),
        mode: result.mode,
        key_label: result.key_label.as_deref(),
        compared_columns: result.compared_columns.iter().map(String::as_str).collect(),
        summary: JsonSummary {
            total_keys: result.all_keys.len(),
            common: result.common_keys.len(),
            shared: result.shared_count(),
            datasets: result.datasets.len(),
            skipped: result.skipped.len(),
            errors: result.errors.len(),
        },
        datasets,
        common_keys: result.common_keys.iter().map(|k| k.as_str()).collect(),
        keys,
        skipped: &result.skipped,
        errors: &result.errors,
    }
}
