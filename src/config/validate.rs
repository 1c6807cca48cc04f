// src/config/validate.rs

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use regex::Regex;

use crate::config::model::{RawSpecFile, SpecFile, PREREQ_ALL};
use crate::errors::{HarnessError, Result};

impl TryFrom<RawSpecFile> for SpecFile {
    type Error = HarnessError;

    fn try_from(raw: RawSpecFile) -> std::result::Result<Self, Self::Error> {
        validate_spec(&raw)?;
        Ok(SpecFile::new_unchecked(raw.harness, raw.test))
    }
}

/// Validate a raw spec file without consuming it.
pub fn validate_spec(cfg: &RawSpecFile) -> Result<()> {
    ensure_has_tests(cfg)?;
    validate_harness_section(cfg)?;
    validate_tests(cfg)?;
    validate_prereqs(cfg)?;
    validate_dag(cfg)?;
    Ok(())
}

fn ensure_has_tests(cfg: &RawSpecFile) -> Result<()> {
    // A root file may only hold `[harness]` and pull tests in via `include`.
    if cfg.test.is_empty() && cfg.harness.include.is_empty() {
        return Err(HarnessError::ConfigError(
            "spec must contain at least one [test.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_harness_section(cfg: &RawSpecFile) -> Result<()> {
    let h = &cfg.harness;

    if h.slots == Some(0) {
        return Err(HarnessError::ConfigError(
            "[harness].slots must be >= 1 (got 0)".to_string(),
        ));
    }
    if h.default_timeout == 0 {
        return Err(HarnessError::ConfigError(
            "[harness].default_timeout must be >= 1 (got 0)".to_string(),
        ));
    }
    if h.max_output_bytes == 0 {
        return Err(HarnessError::ConfigError(
            "[harness].max_output_bytes must be >= 1 (got 0)".to_string(),
        ));
    }
    if h.max_failures == Some(0) {
        return Err(HarnessError::ConfigError(
            "[harness].max_failures must be >= 1 (got 0)".to_string(),
        ));
    }

    Ok(())
}

fn validate_tests(cfg: &RawSpecFile) -> Result<()> {
    for (name, test) in cfg.test.iter() {
        match (&test.cmd, &test.command) {
            (Some(_), Some(_)) => {
                return Err(HarnessError::ConfigError(format!(
                    "test '{name}' sets both `cmd` and `command`"
                )));
            }
            (None, None) => {
                return Err(HarnessError::ConfigError(format!(
                    "test '{name}' needs either `cmd` or `command`"
                )));
            }
            (None, Some(argv)) if argv.is_empty() => {
                return Err(HarnessError::ConfigError(format!(
                    "test '{name}' has an empty `command`"
                )));
            }
            _ => {}
        }

        if test.processors == 0 || test.threads == 0 {
            return Err(HarnessError::ConfigError(format!(
                "test '{name}' must use at least one processor and one thread"
            )));
        }
        if test.processors.checked_mul(test.threads).is_none() {
            return Err(HarnessError::ConfigError(format!(
                "test '{name}' asks for more slots than can be counted ({} processors x {} threads)",
                test.processors, test.threads
            )));
        }

        if test.timeout == Some(0) {
            return Err(HarnessError::ConfigError(format!(
                "test '{name}' has a zero `timeout`"
            )));
        }

        if !test.match_literal {
            for (field, pattern) in [
                ("expect_out", &test.expect_out),
                ("absent_out", &test.absent_out),
                ("expect_err", &test.expect_err),
            ] {
                if let Some(pattern) = pattern {
                    Regex::new(pattern).map_err(|e| {
                        HarnessError::ConfigError(format!(
                            "test '{name}' has an invalid `{field}` pattern: {e}"
                        ))
                    })?;
                }
            }
        }
    }
    Ok(())
}

fn validate_prereqs(cfg: &RawSpecFile) -> Result<()> {
    let uses_all = cfg
        .test
        .values()
        .any(|t| t.prereq.iter().any(|p| p == PREREQ_ALL));

    if uses_all && cfg.test.contains_key(PREREQ_ALL) {
        return Err(HarnessError::ConfigError(format!(
            "a test named '{PREREQ_ALL}' cannot coexist with `prereq = [\"{PREREQ_ALL}\"]`"
        )));
    }

    for (name, test) in cfg.test.iter() {
        for prereq in test.prereq.iter() {
            if prereq == PREREQ_ALL {
                continue;
            }
            if !cfg.test.contains_key(prereq) {
                return Err(HarnessError::UnknownJob {
                    missing: prereq.clone(),
                    referenced_by: name.clone(),
                });
            }
            if prereq == name {
                return Err(HarnessError::ConfigError(format!(
                    "test '{name}' cannot depend on itself in `prereq`"
                )));
            }
        }
    }
    Ok(())
}

/// Names of the tests a test depends on, with `ALL` expanded.
pub(crate) fn expanded_prereqs<'a>(
    all_tests: impl Iterator<Item = &'a String> + Clone,
    name: &str,
    prereqs: &'a [String],
) -> Vec<&'a str> {
    let mut out: Vec<&str> = Vec::new();
    for prereq in prereqs {
        if prereq == PREREQ_ALL {
            out.extend(
                all_tests
                    .clone()
                    .map(String::as_str)
                    .filter(|other| *other != name),
            );
        } else {
            out.push(prereq.as_str());
        }
    }
    out.sort_unstable();
    out.dedup();
    out
}

fn validate_dag(cfg: &RawSpecFile) -> Result<()> {
    // Edge direction: prereq -> test
    // For:
    //   [test.B]
    //   prereq = ["A"]
    // we add edge A -> B.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for name in cfg.test.keys() {
        graph.add_node(name.as_str());
    }

    for (name, test) in cfg.test.iter() {
        for dep in expanded_prereqs(cfg.test.keys(), name, &test.prereq) {
            graph.add_edge(dep, name.as_str(), ());
        }
    }

    // A topological sort will fail if there is a cycle.
    match toposort(&graph, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => {
            let node = cycle.node_id();
            Err(HarnessError::Cycle(format!(
                "cycle detected in prerequisites involving test '{}'",
                node
            )))
        }
    }
}
