// tests/config_errors.rs

mod common;
use crate::common::{write_file, TestResult};

use tempfile::TempDir;

use testharness::config::{load_and_validate, load_suite, SpecFile};
use testharness::errors::HarnessError;
use testharness::types::TesterType;
use testharness_test_utils::{SpecFileBuilder, TestConfigBuilder};

#[test]
fn prerequisite_cycle_is_rejected() -> TestResult {
    let dir = TempDir::new()?;
    let path = write_file(
        dir.path(),
        "tests.toml",
        r#"
[test.A]
cmd = "true"
prereq = ["C"]

[test.B]
cmd = "true"
prereq = ["A"]

[test.C]
cmd = "true"
prereq = ["B"]
"#,
    );

    let err = load_and_validate(&path).unwrap_err();
    assert!(matches!(err, HarnessError::Cycle(_)), "got {err:?}");
    assert!(err.is_configuration());
    Ok(())
}

#[test]
fn unknown_prerequisite_is_rejected() -> TestResult {
    let dir = TempDir::new()?;
    let path = write_file(
        dir.path(),
        "tests.toml",
        r#"
[test.solve]
cmd = "true"
prereq = ["mesh"]
"#,
    );

    match load_and_validate(&path).unwrap_err() {
        HarnessError::UnknownJob {
            missing,
            referenced_by,
        } => {
            assert_eq!(missing, "mesh");
            assert_eq!(referenced_by, "solve");
        }
        other => panic!("expected UnknownJob, got {other:?}"),
    }
    Ok(())
}

#[test]
fn cmd_and_command_are_mutually_exclusive() -> TestResult {
    let dir = TempDir::new()?;
    let path = write_file(
        dir.path(),
        "tests.toml",
        r#"
[test.both]
cmd = "true"
command = ["true"]
"#,
    );

    let err = load_and_validate(&path).unwrap_err();
    assert!(err.to_string().contains("both `cmd` and `command`"), "{err}");
    Ok(())
}

#[test]
fn invalid_toml_is_a_configuration_error() -> TestResult {
    let dir = TempDir::new()?;
    let path = write_file(dir.path(), "tests.toml", "[test.broken\ncmd = ");

    let err = load_and_validate(&path).unwrap_err();
    assert!(matches!(err, HarnessError::TomlError(_)));
    assert!(err.is_configuration());
    Ok(())
}

#[test]
fn missing_spec_file_is_reported() {
    let err = load_and_validate("/no/such/dir/tests.toml").unwrap_err();
    assert!(err.to_string().contains("reading spec file"));
}

#[test]
fn zero_slots_and_bad_patterns_are_rejected() {
    let raw = SpecFileBuilder::new()
        .slots(0)
        .with_test("t", TestConfigBuilder::new("true").build())
        .raw();
    assert!(SpecFile::try_from(raw).is_err());

    let raw = SpecFileBuilder::new()
        .with_test(
            "t",
            TestConfigBuilder::new("true")
                .tester(TesterType::RunApp)
                .expect_out("unclosed (group")
                .build(),
        )
        .raw();
    let err = SpecFile::try_from(raw).unwrap_err();
    assert!(err.to_string().contains("invalid `expect_out` pattern"), "{err}");
}

#[test]
fn slot_count_overflow_is_rejected() -> TestResult {
    let dir = TempDir::new()?;
    let path = write_file(
        dir.path(),
        "tests.toml",
        r#"
[test.huge]
cmd = "true"
processors = 4294967296
threads = 4294967296
"#,
    );

    let err = load_suite(&path).unwrap_err();
    assert!(err.is_configuration());
    assert!(err.to_string().contains("more slots than can be counted"), "{err}");

    let mut cfg = TestConfigBuilder::new("true").build();
    cfg.processors = usize::MAX;
    cfg.threads = 2;
    assert_eq!(cfg.slots(), usize::MAX);
    Ok(())
}

#[test]
fn all_placeholder_passes_validation() {
    let spec = SpecFileBuilder::new()
        .with_test("a", TestConfigBuilder::new("true").build())
        .with_test("b", TestConfigBuilder::new("true").build())
        .with_test("report", TestConfigBuilder::new("true").prereq("ALL").build())
        .build();
    assert_eq!(spec.test["report"].prereq, vec!["ALL"]);
}

#[test]
fn included_file_problems_surface_from_load_suite() -> TestResult {
    let dir = TempDir::new()?;
    let root = write_file(
        dir.path(),
        "tests.toml",
        r#"
[harness]
include = ["sub/tests.toml"]
"#,
    );
    write_file(
        dir.path(),
        "sub/tests.toml",
        r#"
[test.inner]
cmd = "true"
prereq = ["nowhere"]
"#,
    );

    let err = load_suite(&root).unwrap_err();
    assert!(matches!(err, HarnessError::UnknownJob { .. }), "got {err:?}");

    write_file(
        dir.path(),
        "sub/tests.toml",
        r#"
[test.inner]
cmd = "true"
"#,
    );
    let suite = load_suite(&root)?;
    assert_eq!(suite.num_tests(), 1);
    assert_eq!(suite.groups[1].id, "sub");
    Ok(())
}
