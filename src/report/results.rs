// src/report/results.rs

//! Machine-readable results file.
//!
//! Written once when the run starts (with `end_time = null`) and again when
//! it ends, each time through `<file>.inprogress` plus a rename so readers
//! never see a half-written document.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dag::JobRecord;
use crate::engine::StopReason;
use crate::errors::{HarnessError, Result};
use crate::fs::FileSystem;
use crate::race::RaceSet;
use crate::report::Stats;
use crate::types::RaceCheckMode;

/// Run-level metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarnessInfo {
    /// Version of the harness that produced the file.
    pub version: String,
    pub start_time: f64,
    /// `None` while the run is in progress (or if it died).
    pub end_time: Option<f64>,
    pub slots: usize,
    /// Root spec file.
    pub spec: PathBuf,
    #[serde(default)]
    pub race_check: RaceCheckMode,
    #[serde(default)]
    pub stop: Option<StopReason>,
}

/// Top-level results document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultsFile {
    pub harness: HarnessInfo,
    pub stats: Stats,
    pub tests: Vec<JobRecord>,
    #[serde(default)]
    pub races: Vec<RaceSet>,
}

impl ResultsFile {
    pub fn is_complete(&self) -> bool {
        self.harness.end_time.is_some()
    }
}

fn in_progress_path(path: &Path) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(".inprogress");
    PathBuf::from(name)
}

/// Atomically replace the results file at `path`.
pub fn write_results(fs: &dyn FileSystem, path: &Path, results: &ResultsFile) -> Result<()> {
    let json = serde_json::to_vec_pretty(results)?;
    let tmp = in_progress_path(path);
    fs.write(&tmp, &json)?;
    fs.rename(&tmp, path)?;
    debug!(path = %path.display(), complete = results.is_complete(), "wrote results file");
    Ok(())
}

/// Load a complete results file for replay.
pub fn load_results(fs: &dyn FileSystem, path: &Path) -> Result<ResultsFile> {
    if !fs.exists(path) {
        return Err(HarnessError::ConfigError(format!(
            "no results file at {}; run the suite first",
            path.display()
        )));
    }
    let text = fs.read_to_string(path)?;
    let results: ResultsFile = serde_json::from_str(&text)?;
    if !results.is_complete() {
        return Err(HarnessError::ConfigError(format!(
            "results file {} is from a run that did not finish",
            path.display()
        )));
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::mock::MockFileSystem;

    fn results(end_time: Option<f64>) -> ResultsFile {
        ResultsFile {
            harness: HarnessInfo {
                version: "0.1.0".into(),
                start_time: 1.0,
                end_time,
                slots: 2,
                spec: PathBuf::from("tests.toml"),
                race_check: RaceCheckMode::Warn,
                stop: None,
            },
            stats: Stats::default(),
            tests: Vec::new(),
            races: Vec::new(),
        }
    }

    #[test]
    fn written_file_loads_back() {
        let fs = MockFileSystem::new();
        let path = Path::new(".testharness/results.json");
        write_results(&fs, path, &results(Some(2.0))).unwrap();

        assert!(!fs.exists(Path::new(".testharness/results.json.inprogress")));
        assert_eq!(load_results(&fs, path).unwrap(), results(Some(2.0)));
    }

    #[test]
    fn incomplete_file_is_refused() {
        let fs = MockFileSystem::new();
        let path = Path::new("results.json");
        write_results(&fs, path, &results(None)).unwrap();
        let err = load_results(&fs, path).unwrap_err();
        assert!(err.to_string().contains("did not finish"));
    }
}
