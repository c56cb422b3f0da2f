#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use table_scout::{
    config::Config,
    tools::{self, RunCodeRequest, RunCodeResponse},
};
use tempfile::{TempDir, tempdir};

/// Returns the absolute path to a fixture under `tests/data`.
pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("data")
        .join(name)
}

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        self.write_bytes(name, contents.as_bytes())
    }

    pub fn write_bytes(&self, name: &str, contents: &[u8]) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        fs::write(&path, contents).expect("write temp file");
        path
    }
}

/// Region/Sales pairs used by the grouping checks: North 17, South 5, East 1.
pub const REGION_SALES: &str = "Region,Sales\nNorth,10\nSouth,5\nNorth,7\nEast,1\n";

/// Runs `code` against `path` with the default configuration and returns the JSON response.
pub fn run_json(path: &Path, code: &str) -> serde_json::Value {
    run_json_with(&Config::default(), path, code)
}

pub fn run_json_with(config: &Config, path: &Path, code: &str) -> serde_json::Value {
    let response = run(config, path, code);
    serde_json::to_value(&response).expect("serialize response")
}

pub fn run(config: &Config, path: &Path, code: &str) -> RunCodeResponse {
    tools::run_code(
        config,
        &RunCodeRequest {
            file_path: path.to_path_buf(),
            sheet: None,
            code: code.to_string(),
        },
    )
}
