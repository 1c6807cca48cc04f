// src/fs/mock.rs

use std::collections::BTreeMap;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{anyhow, Result};

use super::FileSystem;

/// In-memory filesystem for tests. Directories exist implicitly as the
/// ancestors of stored files.
#[derive(Debug, Clone, Default)]
pub struct MockFileSystem {
    files: Arc<Mutex<BTreeMap<PathBuf, Vec<u8>>>>,
}

impl MockFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file(&self, path: impl AsRef<Path>, content: impl Into<Vec<u8>>) {
        self.files()
            .insert(path.as_ref().to_path_buf(), content.into());
    }

    pub fn remove_file(&self, path: impl AsRef<Path>) -> bool {
        self.files().remove(path.as_ref()).is_some()
    }

    /// All stored file paths, sorted.
    pub fn paths(&self) -> Vec<PathBuf> {
        self.files().keys().cloned().collect()
    }

    fn files(&self) -> MutexGuard<'_, BTreeMap<PathBuf, Vec<u8>>> {
        self.files.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl FileSystem for MockFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String> {
        let bytes = self
            .files()
            .get(path)
            .cloned()
            .ok_or_else(|| anyhow!("file not found: {}", path.display()))?;
        String::from_utf8(bytes).map_err(|e| anyhow!("invalid UTF-8 in {}: {e}", path.display()))
    }

    fn open_read(&self, path: &Path) -> Result<Box<dyn Read + Send>> {
        let bytes = self
            .files()
            .get(path)
            .cloned()
            .ok_or_else(|| anyhow!("file not found: {}", path.display()))?;
        Ok(Box::new(Cursor::new(bytes)))
    }

    fn write(&self, path: &Path, contents: &[u8]) -> Result<()> {
        self.add_file(path, contents);
        Ok(())
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        let mut files = self.files();
        let bytes = files
            .remove(from)
            .ok_or_else(|| anyhow!("file not found: {}", from.display()))?;
        files.insert(to.to_path_buf(), bytes);
        Ok(())
    }

    fn remove_if_exists(&self, path: &Path) -> Result<bool> {
        Ok(self.files().remove(path).is_some())
    }

    fn exists(&self, path: &Path) -> bool {
        self.is_file(path) || self.is_dir(path)
    }

    fn is_file(&self, path: &Path) -> bool {
        self.files().contains_key(path)
    }

    fn is_dir(&self, path: &Path) -> bool {
        self.files()
            .keys()
            .any(|p| p != path && p.starts_with(path))
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let files = self.files();
        let mut children: Vec<PathBuf> = files
            .keys()
            .filter_map(|p| {
                let rest = p.strip_prefix(path).ok()?;
                let first = rest.components().next()?;
                Some(path.join(first))
            })
            .collect();
        children.dedup();
        if children.is_empty() {
            return Err(anyhow!("not a directory or not found: {}", path.display()));
        }
        Ok(children)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directories_are_derived_from_files() {
        let fs = MockFileSystem::new();
        fs.add_file("/w/a.txt", "a");
        fs.add_file("/w/sub/b.txt", "b");
        fs.add_file("/w/sub/c.txt", "c");

        assert!(fs.is_dir(Path::new("/w/sub")));
        assert!(!fs.is_dir(Path::new("/w/a.txt")));
        assert_eq!(
            fs.read_dir(Path::new("/w")).unwrap(),
            vec![PathBuf::from("/w/a.txt"), PathBuf::from("/w/sub")]
        );
    }

    #[test]
    fn rename_replaces_target() {
        let fs = MockFileSystem::new();
        fs.add_file("r.json.inprogress", "new");
        fs.add_file("r.json", "old");
        fs.rename(Path::new("r.json.inprogress"), Path::new("r.json")).unwrap();
        assert_eq!(fs.read_to_string(Path::new("r.json")).unwrap(), "new");
        assert!(!fs.exists(Path::new("r.json.inprogress")));
    }
}
