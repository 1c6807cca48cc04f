// src/config/loader.rs

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::config::model::{HarnessSection, RawSpecFile, SpecFile};
use crate::errors::{HarnessError, Result};

/// A root spec file plus everything it includes.
#[derive(Debug, Clone)]
pub struct Suite {
    /// `[harness]` section of the root file.
    pub harness: HarnessSection,
    /// Directory containing the root file.
    pub root_dir: PathBuf,
    /// One group per spec file, root first.
    pub groups: Vec<SpecGroup>,
}

/// Tests from a single spec file.
#[derive(Debug, Clone)]
pub struct SpecGroup {
    /// Group identifier; empty for the root file.
    pub id: String,
    /// Directory of the spec file; working directories are relative to it.
    pub dir: PathBuf,
    pub spec: SpecFile,
}

impl Suite {
    pub fn num_tests(&self) -> usize {
        self.groups.iter().map(|g| g.spec.test.len()).sum()
    }
}

/// Load a spec file from a given path and return the raw `RawSpecFile`.
///
/// This only performs TOML deserialization; it does **not** perform semantic
/// validation. Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawSpecFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|e| {
        HarnessError::ConfigError(format!("reading spec file {}: {e}", path.display()))
    })?;

    let spec: RawSpecFile = toml::from_str(&contents)?;

    Ok(spec)
}

/// Load a spec file from path and run validation.
///
/// - Reads TOML.
/// - Applies defaults (handled by `serde` + `Default` impls).
/// - Checks for:
///   - `cmd` / `command` consistency,
///   - unknown `prereq` references,
///   - prerequisite cycles,
///   - basic harness config sanity.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<SpecFile> {
    let raw = load_from_path(&path)?;
    let spec = SpecFile::try_from(raw)?;
    Ok(spec)
}

/// Load the root spec file and every file listed in its `include`.
///
/// Included files are one level deep: their own `[harness]` sections
/// (including nested `include`s) are ignored.
pub fn load_suite(path: impl AsRef<Path>) -> Result<Suite> {
    let path = path.as_ref();
    let root = load_and_validate(path)?;
    let root_dir = spec_dir(path);

    let mut groups = vec![SpecGroup {
        id: String::new(),
        dir: root_dir.clone(),
        spec: root.clone(),
    }];
    let mut seen: HashSet<String> = HashSet::new();

    for include in root.harness.include.iter() {
        let include_path = root_dir.join(include);
        let spec = load_and_validate(&include_path)?;

        if !spec.harness.include.is_empty() {
            warn!(
                file = %include_path.display(),
                "nested `include` in an included spec file is ignored"
            );
        }

        let id = group_id(include);
        if !seen.insert(id.clone()) {
            return Err(HarnessError::ConfigError(format!(
                "two included spec files map to the same group '{id}'"
            )));
        }

        debug!(group = %id, tests = spec.test.len(), "loaded included spec file");

        groups.push(SpecGroup {
            id,
            dir: spec_dir(&include_path),
            spec,
        });
    }

    let suite = Suite {
        harness: root.harness,
        root_dir,
        groups,
    };

    if suite.num_tests() == 0 {
        return Err(HarnessError::ConfigError(
            "no [test.<name>] sections found in the spec or its includes".to_string(),
        ));
    }

    Ok(suite)
}

/// Directory a spec file lives in, `.` for a bare filename.
pub fn spec_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Group id for an included file: its directory relative to the root, or
/// the file stem when it sits next to the root file.
fn group_id(include: &Path) -> String {
    let dir = include
        .parent()
        .map(|p| {
            p.components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .filter(|c| c != ".")
                .collect::<Vec<_>>()
                .join("/")
        })
        .unwrap_or_default();

    if dir.is_empty() {
        include
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    } else {
        dir
    }
}
