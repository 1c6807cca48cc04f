// src/tester/run_command.rs

use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::debug;

use crate::config::TestConfig;
use crate::dag::JobStatus;
use crate::fs::FileSystem;
use crate::tester::{output_header, ResultContext, Tester, Verdict};

/// Runs a command and checks how it terminated.
#[derive(Debug, Clone)]
pub struct RunCommand {
    pub argv: Vec<String>,
    pub expect_exit_code: i32,
    pub should_crash: bool,
    pub delete_output_before_running: bool,
}

impl RunCommand {
    pub fn new(argv: Vec<String>) -> Self {
        Self {
            argv,
            expect_exit_code: 0,
            should_crash: false,
            delete_output_before_running: false,
        }
    }

    pub fn from_config(cfg: &TestConfig) -> Self {
        Self {
            argv: cfg.argv(),
            expect_exit_code: cfg.expect_exit_code,
            should_crash: cfg.should_crash,
            delete_output_before_running: cfg.delete_output_before_running,
        }
    }

    /// Exit code / signal checks shared by every tester.
    ///
    /// Returns `None` when the process terminated as expected.
    pub(crate) fn check_exit(&self, ctx: &ResultContext<'_>) -> Option<Verdict> {
        let mut output = ctx.output.to_string();

        match (ctx.signal, ctx.exit_code) {
            (Some(_), _) if self.should_crash => None,
            (Some(signal), _) => {
                output_header(&mut output, "Terminated by signal:", &signal.to_string());
                Some(Verdict::with_status(
                    JobStatus::Crashed,
                    format!("CRASH (signal {signal})"),
                    output,
                ))
            }
            (None, _) if self.should_crash => {
                output_header(
                    &mut output,
                    "Expected the process to crash, but it exited normally.",
                    &format!("Exit Code: {}", ctx.exit_code.unwrap_or_default()),
                );
                Some(Verdict::with_status(JobStatus::Failed, "NO CRASH", output))
            }
            (None, Some(code)) if code != self.expect_exit_code => {
                output_header(
                    &mut output,
                    "Exit code mismatch:",
                    &format!("Exit Code: {code}\nExpected: {}", self.expect_exit_code),
                );
                Some(Verdict::with_status(
                    JobStatus::Failed,
                    format!("EXIT CODE {code} != {}", self.expect_exit_code),
                    output,
                ))
            }
            _ => None,
        }
    }
}

impl Tester for RunCommand {
    fn prepare(&self, fs: &dyn FileSystem, modified_files: &[PathBuf]) -> Result<()> {
        if !self.delete_output_before_running {
            return Ok(());
        }
        for path in modified_files {
            let removed = fs
                .remove_if_exists(path)
                .with_context(|| format!("removing stale output {}", path.display()))?;
            if removed {
                debug!(path = %path.display(), "removed stale output");
            }
        }
        Ok(())
    }

    fn build_command(&self) -> Vec<String> {
        self.argv.clone()
    }

    fn process_result(&self, ctx: &ResultContext<'_>) -> Verdict {
        self.check_exit(ctx)
            .unwrap_or_else(|| Verdict::passed(ctx.output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::mock::MockFileSystem;
    use std::path::Path;

    fn ctx<'a>(exit_code: Option<i32>, signal: Option<i32>) -> ResultContext<'a> {
        ResultContext {
            fs: &crate::fs::RealFileSystem,
            working_dir: Path::new("."),
            exit_code,
            signal,
            output: "hello\n",
        }
    }

    #[test]
    fn zero_exit_passes() {
        let t = RunCommand::new(vec!["true".into()]);
        let v = t.process_result(&ctx(Some(0), None));
        assert_eq!(v.status, JobStatus::Passed);
        assert_eq!(v.output, "hello\n");
    }

    #[test]
    fn unexpected_exit_code_fails_with_reason() {
        let t = RunCommand::new(vec!["false".into()]);
        let v = t.process_result(&ctx(Some(3), None));
        assert_eq!(v.status, JobStatus::Failed);
        assert_eq!(v.reason.as_deref(), Some("EXIT CODE 3 != 0"));
        assert!(v.output.contains("Exit Code: 3"));
    }

    #[test]
    fn signal_is_a_crash_unless_expected() {
        let mut t = RunCommand::new(vec!["app".into()]);
        let v = t.process_result(&ctx(None, Some(11)));
        assert_eq!(v.status, JobStatus::Crashed);

        t.should_crash = true;
        assert_eq!(t.process_result(&ctx(None, Some(11))).status, JobStatus::Passed);
        assert_eq!(t.process_result(&ctx(Some(0), None)).status, JobStatus::Failed);
    }

    #[test]
    fn prepare_removes_stale_outputs_only_when_asked() {
        let fs = MockFileSystem::new();
        fs.add_file("/w/out.e", "stale");
        fs.add_file("/w/keep.txt", "input");
        let outputs = vec![PathBuf::from("/w/out.e"), PathBuf::from("/w/never_written.e")];

        let mut t = RunCommand::new(vec!["app".into()]);
        t.prepare(&fs, &outputs).unwrap();
        assert!(fs.exists(Path::new("/w/out.e")));

        t.delete_output_before_running = true;
        t.prepare(&fs, &outputs).unwrap();
        assert_eq!(fs.paths(), vec![PathBuf::from("/w/keep.txt")]);
    }
}
