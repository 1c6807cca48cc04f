// src/tester/check_files.rs

use std::path::PathBuf;

use anyhow::Result;

use crate::config::TestConfig;
use crate::dag::JobStatus;
use crate::fs::FileSystem;
use crate::tester::{output_header, ResultContext, RunCommand, Tester, Verdict};

/// Runs a command and checks which files it left behind.
#[derive(Debug, Clone)]
pub struct CheckFiles {
    pub base: RunCommand,
    /// Must exist afterwards, relative to the working directory.
    pub check_files: Vec<PathBuf>,
    /// Must not exist afterwards.
    pub check_not_exists: Vec<PathBuf>,
}

impl CheckFiles {
    pub fn from_config(base: RunCommand, cfg: &TestConfig) -> Self {
        Self {
            base,
            check_files: cfg.check_files.clone(),
            check_not_exists: cfg.check_not_exists.clone(),
        }
    }
}

fn list(paths: &[&PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

impl Tester for CheckFiles {
    fn prepare(&self, fs: &dyn FileSystem, modified_files: &[PathBuf]) -> Result<()> {
        self.base.prepare(fs, modified_files)
    }

    fn build_command(&self) -> Vec<String> {
        self.base.build_command()
    }

    fn process_result(&self, ctx: &ResultContext<'_>) -> Verdict {
        if let Some(verdict) = self.base.check_exit(ctx) {
            return verdict;
        }

        let missing: Vec<&PathBuf> = self
            .check_files
            .iter()
            .filter(|f| !ctx.fs.exists(&ctx.working_dir.join(f)))
            .collect();
        if !missing.is_empty() {
            let mut output = ctx.output.to_string();
            output_header(&mut output, "Missing files:", &list(&missing));
            return Verdict::with_status(JobStatus::Failed, "MISSING FILES", output);
        }

        let unexpected: Vec<&PathBuf> = self
            .check_not_exists
            .iter()
            .filter(|f| ctx.fs.exists(&ctx.working_dir.join(f)))
            .collect();
        if !unexpected.is_empty() {
            let mut output = ctx.output.to_string();
            output_header(&mut output, "Files that should not exist:", &list(&unexpected));
            return Verdict::with_status(JobStatus::Failed, "UNEXPECTED FILES", output);
        }

        Verdict::passed(ctx.output)
    }
}
