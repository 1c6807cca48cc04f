// src/pedantic/mod.rs

//! Working-directory snapshots used to detect the files a job modified.
//!
//! A snapshot maps every non-hidden file under a directory to the blake3
//! hash of its contents. Diffing the snapshots taken before spawn and after
//! exit yields the files the job created, changed or deleted.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use blake3::Hasher;
use tracing::debug;

use crate::fs::FileSystem;

/// File path to content hash.
pub type Snapshot = BTreeMap<PathBuf, String>;

/// Hash everything readable from `reader`.
pub fn hash_reader(mut reader: impl Read) -> Result<String> {
    let mut hasher = Hasher::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize().to_hex().to_string())
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('.'))
}

/// Recursively hash every non-hidden file under `root`.
///
/// Files that vanish between listing and hashing are left out.
pub fn snapshot_dir(fs: &dyn FileSystem, root: &Path) -> Result<Snapshot> {
    let mut snapshot = Snapshot::new();
    let mut stack = vec![root.to_path_buf()];

    while let Some(dir) = stack.pop() {
        let entries = fs
            .read_dir(&dir)
            .with_context(|| format!("listing {} for snapshot", dir.display()))?;
        for entry in entries {
            if is_hidden(&entry) {
                continue;
            }
            if fs.is_dir(&entry) {
                stack.push(entry);
            } else if let Ok(reader) = fs.open_read(&entry) {
                snapshot.insert(entry, hash_reader(reader)?);
            }
        }
    }

    debug!(root = %root.display(), files = snapshot.len(), "took working dir snapshot");
    Ok(snapshot)
}

/// Files created, changed or deleted between two snapshots, sorted.
pub fn diff(before: &Snapshot, after: &Snapshot) -> Vec<PathBuf> {
    let mut changed: Vec<PathBuf> = after
        .iter()
        .filter(|(path, hash)| before.get(*path) != Some(*hash))
        .map(|(path, _)| path.clone())
        .collect();
    changed.extend(
        before
            .keys()
            .filter(|path| !after.contains_key(*path))
            .cloned(),
    );
    changed.sort();
    changed
}
