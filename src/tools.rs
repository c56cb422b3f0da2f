//! The three operations the crate exposes: metadata discovery, column
//! interpretation and code execution. Each returns a serializable response
//! on success and a [`ScoutError`] otherwise; [`respond`] turns either into
//! the JSON document the caller receives.

use std::{
    path::{Path, PathBuf},
    time::Instant,
};

use itertools::Itertools;
use log::{error, info};
use serde::Serialize;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::{
    config::Config,
    error::{Result, ScoutError},
    executor::Executor,
    frequency::{ColumnInterpretation, interpret_columns},
    loader::{LoadMode, LoadedTable, Loader, SourceInfo},
    memory::{MemoryMonitor, MemorySample},
    optimize::Optimization,
    profile::{ColumnProfile, DatasetSummary, SuggestedOperation, profile_dataset},
    result::{ExecutionResult, ResultFormatter},
    validate::{SheetSelector, Validator},
};

#[derive(Debug, Clone, Serialize)]
pub struct MemoryEstimate {
    pub estimated_bytes: usize,
    pub unoptimized_bytes: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetadataResponse {
    pub success: bool,
    #[serde(flatten)]
    pub source: SourceInfo,
    /// Rows actually profiled; at most `profile_sample_rows`.
    pub row_count: usize,
    pub total_rows: usize,
    /// `total_rows` was projected from the bytes left unread past the sample.
    pub total_rows_estimated: bool,
    pub sampled: bool,
    pub column_count: usize,
    pub columns: Vec<ColumnProfile>,
    pub summary: DatasetSummary,
    pub warnings: Vec<String>,
    pub suggested_operations: Vec<SuggestedOperation>,
    pub memory: MemoryEstimate,
    pub optimizations: Vec<Optimization>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileInfo {
    pub file_type: String,
    pub size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sheet: Option<String>,
    pub total_rows: usize,
    pub total_columns: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct InterpretResponse {
    pub success: bool,
    pub columns_interpretation: Vec<ColumnInterpretation>,
    pub file_info: FileInfo,
}

#[derive(Debug, Clone)]
pub struct RunCodeRequest {
    pub file_path: PathBuf,
    pub sheet: Option<String>,
    pub code: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunCodeResponse {
    pub success: bool,
    pub request_id: Uuid,
    #[serde(flatten)]
    pub result: ExecutionResult,
    pub execution_time: f64,
    pub memory_delta: Option<i64>,
    pub output: Vec<String>,
}

fn parse_sheet(validator: &Validator, sheet: Option<&str>) -> Result<Option<SheetSelector>> {
    let selector = sheet.map(SheetSelector::parse);
    validator.validate_sheet(selector.as_ref())?;
    Ok(selector)
}

fn load(
    config: &Config,
    path: &Path,
    sheet: Option<&str>,
    mode: LoadMode,
) -> Result<LoadedTable> {
    let validator = Validator::new(config);
    let file = validator.validate_file(path)?;
    let selector = parse_sheet(&validator, sheet)?;
    Loader::new(config).load(&file, selector.as_ref(), mode)
}

/// [`load`] with resident memory sampled around it.
fn tracked_load(
    config: &Config,
    monitor: &MemoryMonitor,
    path: &Path,
    sheet: Option<&str>,
    mode: LoadMode,
) -> (Result<LoadedTable>, Option<MemorySample>) {
    monitor.track("load", || load(config, path, sheet, mode))
}

/// Profiles a bounded sample of the file.
pub fn read_metadata(config: &Config, path: &Path, sheet: Option<&str>) -> Result<MetadataResponse> {
    let monitor = MemoryMonitor::new(config);
    let mode = LoadMode::Sampled(config.profile_sample_rows);
    let loaded = tracked_load(config, &monitor, path, sheet, mode).0?;
    let profile = profile_dataset(&loaded.dataset);
    info!(
        "Profile built for {}: {} column(s), {} suggestion(s)",
        path.display(),
        profile.columns.len(),
        profile.suggested_operations.len()
    );
    Ok(MetadataResponse {
        success: true,
        row_count: loaded.dataset.row_count(),
        total_rows: loaded.total_rows,
        total_rows_estimated: !loaded.total_rows_exact,
        sampled: loaded.sampled,
        column_count: loaded.dataset.column_count(),
        columns: profile.columns,
        summary: profile.summary,
        warnings: loaded.warnings.into_iter().unique().collect(),
        suggested_operations: profile.suggested_operations,
        memory: MemoryEstimate {
            estimated_bytes: loaded.optimization.memory_after,
            unoptimized_bytes: loaded.optimization.memory_before,
        },
        optimizations: loaded.optimization.changes,
        source: loaded.source,
    })
}

/// Full, unsampled value distribution for each requested column.
pub fn interpret_column(
    config: &Config,
    path: &Path,
    columns: &[String],
    sheet: Option<&str>,
) -> Result<InterpretResponse> {
    let names = Validator::new(config).validate_column_names(columns)?;
    let monitor = MemoryMonitor::new(config);
    let loaded = tracked_load(config, &monitor, path, sheet, LoadMode::Full).0?;
    let interpretations = interpret_columns(&loaded.dataset, &names);
    let missing = interpretations
        .iter()
        .filter(|entry| entry.error.is_some())
        .map(|entry| entry.column_name.as_str())
        .join(", ");
    if !missing.is_empty() {
        info!("Requested column(s) not present: {missing}");
    }
    Ok(InterpretResponse {
        success: true,
        columns_interpretation: interpretations,
        file_info: FileInfo {
            file_type: loaded.source.file_type,
            size: loaded.source.size,
            encoding: loaded.source.encoding,
            sheet: loaded.source.sheet,
            total_rows: loaded.dataset.row_count(),
            total_columns: loaded.dataset.column_count(),
        },
    })
}

/// Everything a run gathered, whether or not it succeeded.
#[derive(Default)]
struct Execution {
    output: Vec<String>,
    samples: Vec<MemorySample>,
}

impl Execution {
    fn run(
        &mut self,
        config: &Config,
        request: &RunCodeRequest,
        monitor: &MemoryMonitor,
    ) -> Result<ExecutionResult> {
        let executor = Executor::new(config);
        let program = executor.prepare(&request.code)?;
        let (loaded, sample) = tracked_load(
            config,
            monitor,
            &request.file_path,
            request.sheet.as_deref(),
            LoadMode::Full,
        );
        self.samples.extend(sample);
        let loaded = loaded?;
        let (outcome, sample) = monitor.track("execute", || {
            executor.evaluate(&program, loaded.dataset)
        });
        self.samples.extend(sample);
        self.output = outcome.output;
        ResultFormatter::new(config.output_record_cap).format(&outcome.result?)
    }
}

/// Runs submitted code against the full table; failures become an `error` kind result.
pub fn run_code(config: &Config, request: &RunCodeRequest) -> RunCodeResponse {
    let request_id = Uuid::new_v4();
    info!(
        "Request {request_id}: running {} char(s) of code against {}",
        request.code.chars().count(),
        request.file_path.display()
    );
    let started = Instant::now();
    let monitor = MemoryMonitor::new(config);
    let mut execution = Execution::default();
    let outcome = execution.run(config, request, &monitor);
    let execution_time = started.elapsed().as_secs_f64();
    let memory_delta = total_delta(&execution.samples);
    match outcome {
        Ok(result) => RunCodeResponse {
            success: true,
            request_id,
            result,
            execution_time,
            memory_delta,
            output: execution.output,
        },
        Err(err) => {
            error!("Request {request_id} failed: {err}");
            RunCodeResponse {
                success: false,
                request_id,
                result: ExecutionResult::from(&err),
                execution_time,
                memory_delta,
                output: execution.output,
            }
        }
    }
}

fn total_delta(samples: &[MemorySample]) -> Option<i64> {
    if samples.is_empty() {
        None
    } else {
        Some(samples.iter().map(|sample| sample.delta).sum())
    }
}

/// Serializes a successful response, or the uniform error shape on failure.
pub fn respond<T: Serialize>(outcome: Result<T>) -> (bool, JsonValue) {
    match outcome.and_then(|response| {
        serde_json::to_value(&response)
            .map_err(|err| ScoutError::formatting("response", err.to_string()))
    }) {
        Ok(json) => (true, json),
        Err(err) => {
            error!("{}: {err}", err.error_type());
            let json = serde_json::to_value(err.to_response()).unwrap_or_else(|_| {
                serde_json::json!({
                    "success": false,
                    "error_type": err.error_type(),
                    "message": err.to_string(),
                })
            });
            (false, json)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::*;

    fn sales_file(dir: &Path) -> PathBuf {
        let path = dir.join("sales.csv");
        fs::write(
            &path,
            "Region,Sales\nNorth,10\nSouth,5\nNorth,7\nEast,1\n",
        )
        .expect("write fixture");
        path
    }

    #[test]
    fn metadata_reports_source_and_profile() {
        let dir = tempdir().expect("temp dir");
        let path = sales_file(dir.path());
        let response = read_metadata(&Config::default(), &path, None).expect("metadata");
        assert_eq!(response.source.file_type, "csv");
        assert_eq!(response.total_rows, 4);
        assert!(!response.total_rows_estimated);
        assert!(!response.sampled);
        assert_eq!(response.columns.len(), 2);
        let json = serde_json::to_value(&response).expect("json");
        assert_eq!(json["delimiter"], ",");
        assert_eq!(json["success"], true);
    }

    #[test]
    fn interpretation_carries_file_info() {
        let dir = tempdir().expect("temp dir");
        let path = sales_file(dir.path());
        let response = interpret_column(
            &Config::default(),
            &path,
            &["Region".to_string(), "Missing".to_string()],
            None,
        )
        .expect("interpret");
        assert_eq!(response.file_info.total_rows, 4);
        assert_eq!(response.file_info.total_columns, 2);
        assert!(response.columns_interpretation[0].error.is_none());
        assert!(response.columns_interpretation[1].error.is_some());
    }

    #[test]
    fn run_code_flattens_the_result_kind() {
        let dir = tempdir().expect("temp dir");
        let request = RunCodeRequest {
            file_path: sales_file(dir.path()),
            sheet: None,
            code: "print(len(df))\nresult = df['Sales'].sum()".to_string(),
        };
        let response = run_code(&Config::default(), &request);
        assert!(response.success);
        let json = serde_json::to_value(&response).expect("json");
        assert_eq!(json["kind"], "scalar");
        assert_eq!(json["value"], 23);
        assert_eq!(json["output"], serde_json::json!(["4"]));
    }

    #[test]
    fn run_code_failures_use_the_error_kind() {
        let dir = tempdir().expect("temp dir");
        let request = RunCodeRequest {
            file_path: sales_file(dir.path()),
            sheet: None,
            code: "total = 1".to_string(),
        };
        let unmonitored = Config {
            enable_memory_monitoring: false,
            ..Config::default()
        };
        let response = run_code(&unmonitored, &request);
        assert!(!response.success);
        let json = serde_json::to_value(&response).expect("json");
        assert_eq!(json["kind"], "error");
        assert_eq!(json["error_type"], "CODE_EXECUTION_ERROR");
        assert!(json["memory_delta"].is_null());
    }

    #[test]
    fn failed_runs_keep_output_and_stage_samples() {
        let dir = tempdir().expect("temp dir");
        let request = RunCodeRequest {
            file_path: sales_file(dir.path()),
            sheet: None,
            code: "print('checkpoint')\nresult = df['nope'].sum()".to_string(),
        };
        let monitor = MemoryMonitor::new(&Config::default());
        let mut execution = Execution::default();
        let err = execution
            .run(&Config::default(), &request, &monitor)
            .expect_err("missing column");
        assert_eq!(err.error_type(), "CODE_EXECUTION_ERROR");
        assert_eq!(execution.output, vec!["checkpoint".to_string()]);
        if MemoryMonitor::current_usage().is_some() {
            assert_eq!(execution.samples.len(), 2);
            assert!(total_delta(&execution.samples).is_some());
        }
    }

    #[test]
    fn denied_code_collects_no_samples() {
        let dir = tempdir().expect("temp dir");
        let request = RunCodeRequest {
            file_path: sales_file(dir.path()),
            sheet: None,
            code: "import os\nresult = 1".to_string(),
        };
        let response = run_code(&Config::default(), &request);
        assert!(!response.success);
        assert!(response.memory_delta.is_none());
        assert!(response.output.is_empty());
    }

    #[test]
    fn respond_wraps_errors_uniformly() {
        let (ok, json) = respond(read_metadata(
            &Config::default(),
            Path::new("definitely/missing.csv"),
            None,
        ));
        assert!(!ok);
        assert_eq!(json["success"], false);
        assert_eq!(json["error_type"], "FILE_NOT_FOUND");
        assert!(json["suggestion"].is_string());
    }
}
