use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// What to do with race conditions found after the run.
///
/// - `Off`: do not run the race checker at all.
/// - `Warn`: print the race section but leave the exit code alone.
/// - `Error`: print the race section and fail the run (CI gate).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RaceCheckMode {
    Off,
    #[default]
    Warn,
    Error,
}

impl FromStr for RaceCheckMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "off" => Ok(RaceCheckMode::Off),
            "warn" => Ok(RaceCheckMode::Warn),
            "error" => Ok(RaceCheckMode::Error),
            other => Err(format!(
                "invalid race_check: {other} (expected \"off\", \"warn\" or \"error\")"
            )),
        }
    }
}

/// Kind of tester selected for a test in the spec file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TesterType {
    /// Pass/fail on the exit code only.
    #[default]
    RunCommand,
    /// Exit code plus expectations on the captured output.
    RunApp,
    /// Exit code plus existence checks on files in the working directory.
    CheckFiles,
}
