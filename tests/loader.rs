mod common;

use common::{TestWorkspace, fixture_path};
use table_scout::{
    config::Config,
    data::Value,
    error::ScoutError,
    loader::{LoadMode, LoadedTable, Loader},
    validate::{SheetSelector, Validator},
};

fn load(config: &Config, path: &std::path::Path, sheet: Option<&str>, mode: LoadMode) -> Result<LoadedTable, ScoutError> {
    let file = Validator::new(config).validate_file(path)?;
    let selector = sheet.map(SheetSelector::parse);
    Loader::new(config).load(&file, selector.as_ref(), mode)
}

fn cell(loaded: &LoadedTable, column: &str, row: usize) -> Option<Value> {
    loaded.dataset.column(column).expect("column").data.get(row)
}

#[test]
fn legacy_encoding_and_semicolons_are_detected() {
    let loaded = load(&Config::default(), &fixture_path("latin1.csv"), None, LoadMode::Full)
        .expect("load");
    assert_eq!(loaded.source.encoding.as_deref(), Some("windows-1252"));
    assert_eq!(loaded.source.delimiter.as_deref(), Some(";"));
    assert_eq!(loaded.dataset.column_names(), vec!["name", "city", "score"]);
    assert_eq!(cell(&loaded, "name", 0), Some(Value::String("José".into())));
    assert_eq!(cell(&loaded, "city", 0), Some(Value::String("Málaga".into())));
    assert_eq!(cell(&loaded, "score", 1), Some(Value::Integer(9)));
}

#[test]
fn sampled_loads_stop_early_and_estimate_the_total() {
    let config = Config {
        profile_sample_rows: 3,
        ..Config::default()
    };
    let loaded = load(&config, &fixture_path("sales.csv"), None, LoadMode::Sampled(3))
        .expect("load");
    assert_eq!(loaded.dataset.row_count(), 3);
    assert!(loaded.sampled);
    assert!(!loaded.total_rows_exact);
    assert!(loaded.total_rows > 3);

    let whole = load(&config, &fixture_path("sales.csv"), None, LoadMode::Sampled(100))
        .expect("load");
    assert_eq!(whole.total_rows, 8);
    assert!(whole.total_rows_exact);
    assert!(!whole.sampled);

    let full = load(&config, &fixture_path("sales.csv"), None, LoadMode::Full).expect("load");
    assert_eq!(full.dataset.row_count(), 8);
    assert!(!full.sampled);
    assert_eq!(cell(&full, "Sales", 5), None);
    assert_eq!(cell(&full, "Units", 4), None);
}

#[test]
fn over_wide_lines_are_skipped_when_sampling_and_fatal_otherwise() {
    let workspace = TestWorkspace::new();
    let path = workspace.write("ragged.csv", "a,b\n1,2\n3,4,5\n6\n");

    let sampled = load(&Config::default(), &path, None, LoadMode::Sampled(100)).expect("load");
    assert_eq!(sampled.dataset.row_count(), 2);
    assert_eq!(cell(&sampled, "b", 1), None);
    assert!(sampled.warnings.iter().any(|w| w.contains("Skipped 1 malformed")));

    let err = load(&Config::default(), &path, None, LoadMode::Full).expect_err("ragged");
    assert_eq!(err.error_type(), "DATA_ERROR");
    assert!(err.to_string().contains("line 3"));
}

#[test]
fn headers_are_deduplicated_and_named() {
    let workspace = TestWorkspace::new();
    let path = workspace.write("headers.csv", "a,a,\n1,2,3\n");
    let loaded = load(&Config::default(), &path, None, LoadMode::Full).expect("load");
    assert_eq!(loaded.dataset.column_names(), vec!["a", "a.1", "Unnamed: 2"]);
}

#[test]
fn placeholder_tokens_load_as_nulls() {
    let workspace = TestWorkspace::new();
    let path = workspace.write("nulls.csv", "v\n1\nNA\nnull\n-\n4\n");
    let loaded = load(&Config::default(), &path, None, LoadMode::Full).expect("load");
    let column = loaded.dataset.column("v").expect("column");
    assert_eq!(column.data.null_count(), 3);
    assert_eq!(cell(&loaded, "v", 4), Some(Value::Integer(4)));
}

#[test]
fn workbook_sheets_load_by_name_or_index() {
    let path = fixture_path("regions.xlsx");
    let first = load(&Config::default(), &path, None, LoadMode::Full).expect("load");
    assert_eq!(first.source.sheet_names, vec!["Sales", "Targets"]);
    assert_eq!(first.source.sheet.as_deref(), Some("Sales"));
    assert_eq!(first.dataset.column_names(), vec!["Region", "Sales"]);
    assert_eq!(first.total_rows, 4);
    assert!(first.total_rows_exact);

    let second = load(&Config::default(), &path, Some("1"), LoadMode::Full).expect("load");
    assert_eq!(second.source.sheet.as_deref(), Some("Targets"));
    assert_eq!(cell(&second, "Target", 0), Some(Value::Integer(20)));

    let err = load(&Config::default(), &path, Some("Budget"), LoadMode::Full).expect_err("sheet");
    assert_eq!(err.error_type(), "INVALID_SHEET_NAME");
    assert!(err.to_string().contains("Sales, Targets"));
}

#[test]
fn validation_rejects_bad_paths_and_types() {
    let workspace = TestWorkspace::new();
    let config = Config::default();
    let validator = Validator::new(&config);

    let notes = workspace.write("notes.json", "{}");
    let err = validator.validate_file(&notes).expect_err("extension");
    assert_eq!(err.error_type(), "UNSUPPORTED_FILE_TYPE");

    let err = validator.validate_file(workspace.path()).expect_err("directory");
    assert_eq!(err.error_type(), "INVALID_FILE_PATH");

    let err = validator
        .validate_file(&workspace.path().join("..").join("escape.csv"))
        .expect_err("traversal");
    assert_eq!(err.error_type(), "INVALID_FILE_PATH");

    let err = validator
        .validate_file(&workspace.path().join("absent.csv"))
        .expect_err("missing");
    assert_eq!(err.error_type(), "FILE_NOT_FOUND");

    let upper = workspace.write("DATA.CSV", "a\n1\n");
    assert!(validator.validate_file(&upper).is_ok());
}
