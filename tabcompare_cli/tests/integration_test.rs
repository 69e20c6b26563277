use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

/// Helper struct to manage input files
struct TestFixture {
    _temp_dir: TempDir,
    input_dir: PathBuf,
}

impl TestFixture {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let input_dir = temp_dir.path().join("inputs");
        fs::create_dir(&input_dir).expect("Failed to create input dir");

        TestFixture {
            _temp_dir: temp_dir,
            input_dir,
        }
    }

    /// Write a CSV file into the input directory and return its path as a string
    fn create_csv(&self, name: &str, content: &str) -> String {
        let file_path = self.input_dir.join(name);
        fs::write(&file_path, content).expect("Failed to write file");
        file_path.to_string_lossy().to_string()
    }

    fn dir(&self) -> &Path {
        &self.input_dir
    }
}

/// Helper to run the CLI binary with an isolated config directory
fn run_cli(args: &[&str]) -> std::process::Output {
    let exe = env!("CARGO_BIN_EXE_tabcompare_cli");
    let config_dir = TempDir::new().expect("Failed to create config dir");
    Command::new(exe)
        .args(args)
        .env("XDG_CONFIG_HOME", config_dir.path())
        .env("APPDATA", config_dir.path())
        .env("HOME", config_dir.path())
        .output()
        .expect("Failed to execute command")
}

/// Helper to run CLI and expect success
fn run_cli_success(args: &[&str]) -> std::process::Output {
    let output = run_cli(args);
    if !output.status.success() {
        eprintln!("STDOUT:\n{}", String::from_utf8_lossy(&output.stdout));
        eprintln!("STDERR:\n{}", String::from_utf8_lossy(&output.stderr));
        panic!("Command failed with status: {}", output.status);
    }
    output
}

#[test]
fn test_shared_key_text_report() {
    let fixture = TestFixture::new();
    let a = fixture.create_csv("a.csv", "id,name\n1,Ann\n2,Bob\n");
    let b = fixture.create_csv("b.csv", "id,city\n2,LA\n3,SF\n");

    let output = run_cli_success(&["compare", &a, &b, "-c", "id"]);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Key column: id"));
    assert!(stdout.contains("a.csv [key: id]: 1 unique of 2 rows (50.0%)"));
    assert!(stdout.contains("In every input:  1"));
    assert!(!stdout.contains("\x1b["));
}

#[test]
fn test_show_keys_lists_presence() {
    let fixture = TestFixture::new();
    let a = fixture.create_csv("a.csv", "id\n1\n2\n");
    let b = fixture.create_csv("b.csv", "id\n2\n");

    let output = run_cli_success(&["compare", &a, &b, "--column", "id", "--show-keys"]);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("id | a.csv | b.csv"));
    assert!(stdout.contains("1 | yes | no"));
    assert!(stdout.contains("2 | yes | yes"));
}

#[test]
fn test_directory_input_uses_patterns() {
    let fixture = TestFixture::new();
    fixture.create_csv("a.csv", "id\n1\n");
    fixture.create_csv("b.csv", "id\n1\n2\n");
    fixture.create_csv("notes.txt", "not a table");

    let output = run_cli_success(&[
        "compare",
        fixture.dir().to_str().unwrap(),
        "-c",
        "id",
        "--json",
    ]);

    let json: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("Output should be valid JSON");
    assert_eq!(json["summary"]["datasets"], 2);
    assert_eq!(json["summary"]["errors"], 0);
}

#[test]
fn test_missing_key_column_is_reported_as_skipped() {
    let fixture = TestFixture::new();
    let a = fixture.create_csv("a.csv", "id\n1\n");
    let b = fixture.create_csv("b.csv", "id\n1\n");
    let c = fixture.create_csv("c.csv", "code\n1\n");

    let output = run_cli_success(&["compare", &a, &b, &c, "-c", "id"]);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("skipped c.csv: Key column 'id' not found in c.csv"));
    assert!(stdout.contains("Available columns: code"));
}

#[test]
fn test_no_usable_inputs_fails() {
    let fixture = TestFixture::new();
    let a = fixture.create_csv("a.csv", "code\n1\n");
    let b = fixture.create_csv("b.csv", "ref\n1\n");

    let output = run_cli(&["compare", &a, &b, "-c", "id"]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Skipped a.csv"));
    assert!(stderr.contains("Nothing to compare"));
}

#[test]
fn test_empty_directory_fails_with_no_inputs() {
    let fixture = TestFixture::new();

    let output = run_cli(&["compare", fixture.dir().to_str().unwrap(), "-c", "id"]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("No input files found"));
}

#[test]
fn test_invalid_key_assignment_fails() {
    let fixture = TestFixture::new();
    let a = fixture.create_csv("a.csv", "id\n1\n");

    let output = run_cli(&["compare", &a, "-k", "a.csv"]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("expected SOURCE=COLUMN"));
}

#[test]
fn test_columns_lists_shared_columns() {
    let fixture = TestFixture::new();
    let a = fixture.create_csv("a.csv", "id,name,city\n1,Ann,LA\n");
    let b = fixture.create_csv("b.csv", "name,id\nBob,2\n");

    let output = run_cli_success(&["columns", &a, &b]);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("a.csv: id, name, city"));
    assert!(stdout.contains("b.csv: name, id"));
    assert!(stdout.contains("Shared columns: id, name"));
}

#[test]
fn test_columns_lists_workbook_sheets() {
    let book = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../tabcompare_core/tests/fixtures/people.xlsx");

    let output = run_cli_success(&["columns", book.to_str().unwrap()]);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("sheets: People, Archive"));
    assert!(stdout.contains("people.xlsx - People: id, name, score, active, joined, status"));
}

#[test]
fn test_compare_help_notes_csv_text_cells() {
    let output = run_cli_success(&["compare", "--help"]);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("CSV cells are compared as written"));
}
