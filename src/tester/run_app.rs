// src/tester/run_app.rs

use std::path::PathBuf;

use anyhow::Result;
use regex::RegexBuilder;

use crate::config::TestConfig;
use crate::dag::JobStatus;
use crate::fs::FileSystem;
use crate::tester::{output_header, ResultContext, RunCommand, Tester, Verdict};

/// Runs an application and checks its output on top of the exit status.
#[derive(Debug, Clone)]
pub struct RunApp {
    pub base: RunCommand,
    pub expect_out: Option<String>,
    pub absent_out: Option<String>,
    pub expect_err: Option<String>,
    pub match_literal: bool,
    pub errors: Vec<String>,
}

impl RunApp {
    pub fn from_config(base: RunCommand, cfg: &TestConfig) -> Self {
        Self {
            base,
            expect_out: cfg.expect_out.clone(),
            absent_out: cfg.absent_out.clone(),
            expect_err: cfg.expect_err.clone(),
            match_literal: cfg.match_literal,
            errors: cfg.effective_errors(),
        }
    }

    fn check_output(&self, output: &str) -> Option<(String, String, String)> {
        if let Some(pattern) = &self.expect_err {
            if !matches(output, pattern, self.match_literal) {
                return Some((
                    "EXPECTED ERROR MISSING".to_string(),
                    "Unable to match the following pattern against the program's output:"
                        .to_string(),
                    pattern.clone(),
                ));
            }
        }
        if let Some(pattern) = &self.expect_out {
            if !matches(output, pattern, self.match_literal) {
                return Some((
                    "EXPECTED OUTPUT MISSING".to_string(),
                    "Unable to match the following pattern against the program's output:"
                        .to_string(),
                    pattern.clone(),
                ));
            }
        }
        if let Some(pattern) = &self.absent_out {
            if matches(output, pattern, self.match_literal) {
                return Some((
                    "OUTPUT NOT ABSENT".to_string(),
                    "Matched the following pattern, which should be absent:".to_string(),
                    pattern.clone(),
                ));
            }
        }
        // An expected error message replaces the generic error scan.
        if self.expect_err.is_none() {
            if let Some(err) = self.errors.iter().find(|e| output.contains(e.as_str())) {
                return Some((
                    "ERRMSG".to_string(),
                    "The following error message was found in the output:".to_string(),
                    err.clone(),
                ));
            }
        }
        None
    }
}

/// Match `pattern` against `output`, either literally or as a regex.
///
/// Regexes run in multi-line mode with `.` matching newlines. Patterns are
/// validated at load time; one that fails to compile here never matches.
pub fn matches(output: &str, pattern: &str, literal: bool) -> bool {
    if literal {
        return output.contains(pattern);
    }
    RegexBuilder::new(pattern)
        .multi_line(true)
        .dot_matches_new_line(true)
        .build()
        .map(|re| re.is_match(output))
        .unwrap_or(false)
}

impl Tester for RunApp {
    fn prepare(&self, fs: &dyn FileSystem, modified_files: &[PathBuf]) -> Result<()> {
        self.base.prepare(fs, modified_files)
    }

    fn build_command(&self) -> Vec<String> {
        self.base.build_command()
    }

    fn process_result(&self, ctx: &ResultContext<'_>) -> Verdict {
        // A crash says more than whatever output it left behind.
        if ctx.signal.is_some() {
            return self.base.process_result(ctx);
        }

        if let Some((reason, title, body)) = self.check_output(ctx.output) {
            let mut output = ctx.output.to_string();
            output_header(&mut output, &title, &body);
            return Verdict::with_status(JobStatus::Failed, reason, output);
        }

        self.base.process_result(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn app() -> RunApp {
        RunApp {
            base: RunCommand::new(vec!["app".into()]),
            expect_out: None,
            absent_out: None,
            expect_err: None,
            match_literal: false,
            errors: vec!["ERROR".into()],
        }
    }

    fn run(t: &RunApp, code: i32, output: &str) -> Verdict {
        t.process_result(&ResultContext {
            fs: &crate::fs::RealFileSystem,
            working_dir: Path::new("."),
            exit_code: Some(code),
            signal: None,
            output,
        })
    }

    #[test]
    fn expect_out_is_a_multiline_regex() {
        let mut t = app();
        t.expect_out = Some(r"^Solve\s+Converged.*done$".into());
        assert_eq!(run(&t, 0, "start\nSolve  Converged\nmore\ndone\n").status, JobStatus::Passed);
        let v = run(&t, 0, "Solve Failed\n");
        assert_eq!(v.status, JobStatus::Failed);
        assert_eq!(v.reason.as_deref(), Some("EXPECTED OUTPUT MISSING"));
    }

    #[test]
    fn literal_matching_ignores_regex_syntax() {
        let mut t = app();
        t.match_literal = true;
        t.absent_out = Some("a.b".into());
        assert_eq!(run(&t, 0, "axb\n").status, JobStatus::Passed);
        assert_eq!(run(&t, 0, "a.b\n").status, JobStatus::Failed);
    }

    #[test]
    fn error_message_fails_a_zero_exit() {
        let t = app();
        let v = run(&t, 0, "*** ERROR ***\n");
        assert_eq!(v.status, JobStatus::Failed);
        assert_eq!(v.reason.as_deref(), Some("ERRMSG"));
    }

    #[test]
    fn expected_error_replaces_error_scan() {
        let mut t = app();
        t.base.expect_exit_code = 1;
        t.expect_err = Some("ERROR: bad input".into());
        assert_eq!(run(&t, 1, "ERROR: bad input\n").status, JobStatus::Passed);
        assert_eq!(run(&t, 1, "ok\n").status, JobStatus::Failed);
    }
}
