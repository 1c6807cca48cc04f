#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use testharness::config::{HarnessSection, RawSpecFile, SpecFile, TestConfig};
use testharness::dag::JobSpec;
use testharness::types::TesterType;

/// Builder for `SpecFile` to simplify test setup.
pub struct SpecFileBuilder {
    spec: RawSpecFile,
}

impl SpecFileBuilder {
    pub fn new() -> Self {
        Self {
            spec: RawSpecFile {
                harness: HarnessSection::default(),
                test: BTreeMap::new(),
            },
        }
    }

    pub fn with_test(mut self, name: &str, test: TestConfig) -> Self {
        self.spec.test.insert(name.to_string(), test);
        self
    }

    pub fn slots(mut self, slots: usize) -> Self {
        self.spec.harness.slots = Some(slots);
        self
    }

    pub fn raw(self) -> RawSpecFile {
        self.spec
    }

    pub fn build(self) -> SpecFile {
        SpecFile::try_from(self.spec).expect("Failed to build valid spec from builder")
    }
}

impl Default for SpecFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `TestConfig`.
pub struct TestConfigBuilder {
    test: TestConfig,
}

impl TestConfigBuilder {
    pub fn new(cmd: &str) -> Self {
        Self {
            test: TestConfig {
                cmd: Some(cmd.to_string()),
                ..TestConfig::default()
            },
        }
    }

    pub fn prereq(mut self, dep: &str) -> Self {
        self.test.prereq.push(dep.to_string());
        self
    }

    pub fn tester(mut self, tester: TesterType) -> Self {
        self.test.tester = tester;
        self
    }

    pub fn modified_file(mut self, path: &str) -> Self {
        self.test.modified_files.push(PathBuf::from(path));
        self
    }

    pub fn processors(mut self, n: usize) -> Self {
        self.test.processors = n;
        self
    }

    pub fn timeout(mut self, secs: u64) -> Self {
        self.test.timeout = Some(secs);
        self
    }

    pub fn expect_out(mut self, pattern: &str) -> Self {
        self.test.expect_out = Some(pattern.to_string());
        self
    }

    pub fn build(self) -> TestConfig {
        self.test
    }
}

/// Builder for `JobSpec`, for driving the scheduler and runtime directly.
pub struct JobSpecBuilder {
    spec: JobSpec,
}

impl JobSpecBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            spec: JobSpec::new(name, vec!["true".to_string()]),
        }
    }

    /// Command run through `sh -c`.
    pub fn sh(name: &str, script: &str) -> Self {
        Self {
            spec: JobSpec::new(
                name,
                vec!["sh".to_string(), "-c".to_string(), script.to_string()],
            ),
        }
    }

    pub fn prereq(mut self, dep: &str) -> Self {
        self.spec.prereqs.push(dep.to_string());
        self
    }

    pub fn slots(mut self, n: usize) -> Self {
        self.spec.processors = n;
        self
    }

    pub fn modified_file(mut self, path: &str) -> Self {
        self.spec.modified_files.push(PathBuf::from(path));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.spec.timeout = timeout;
        self
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.spec.working_dir = dir.into();
        self
    }

    pub fn skip(mut self, reason: &str) -> Self {
        self.spec.skip = Some(reason.to_string());
        self
    }

    pub fn build(self) -> JobSpec {
        self.spec
    }
}
