//! Persistence for step directories.
//!
//! The chain only ever talks to a [`StepStore`]; [`DirStore`] is the real
//! filesystem layout (`<root>/<id>/<file>`), [`MemoryStore`] keeps the same
//! shape in maps for tests.

use crate::error::{ChainError, ChainResult};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path, PathBuf};

pub const INFO_FILE: &str = "info.log";
pub const COEF_FILE: &str = "_coef.log";
pub const INPUT_ARTIFACT: &str = "_init.aig";
pub const RESULT_LOG: &str = "_result.log";
pub const FINAL_ARTIFACT: &str = "final.aig";

pub trait StepStore {
    fn root(&self) -> &Path;

    /// Names of the subdirectories directly under the root.
    fn step_names(&self) -> ChainResult<Vec<String>>;

    fn count_steps(&self) -> ChainResult<usize> {
        Ok(self.step_names()?.len())
    }

    fn step_dir(&self, id: usize) -> PathBuf {
        self.root().join(id.to_string())
    }

    /// Fails with `StepCreation` if the directory already exists.
    fn create_step_dir(&mut self, id: usize) -> ChainResult<PathBuf>;

    /// Returns false when there was nothing to remove.
    fn remove_step(&mut self, name: &str) -> ChainResult<bool>;

    fn read_text(&self, id: usize, file: &str) -> ChainResult<Option<String>>;

    fn write_text(&mut self, id: usize, file: &str, contents: &str) -> ChainResult<()>;

    fn exists(&self, id: usize, file: &str) -> bool;

    fn has_artifact(&self, source: &Path) -> bool;

    /// Copy an artifact from anywhere into step `id` under `file`.
    fn import_artifact(&mut self, source: &Path, id: usize, file: &str) -> ChainResult<()>;
}

#[derive(Debug, Clone)]
pub struct DirStore {
    root: PathBuf,
}

impl DirStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl StepStore for DirStore {
    fn root(&self) -> &Path {
        &self.root
    }

    fn step_names(&self) -> ChainResult<Vec<String>> {
        let entries = fs::read_dir(&self.root).map_err(|e| ChainError::io(&self.root, e))?;
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| ChainError::io(&self.root, e))?;
            if entry.path().is_dir() {
                names.push(entry.file_name().to_string_lossy().to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    fn create_step_dir(&mut self, id: usize) -> ChainResult<PathBuf> {
        let dir = self.step_dir(id);
        if dir.exists() {
            return Err(ChainError::StepCreation {
                id,
                reason: format!("'{}' already exists", dir.display()),
            });
        }
        fs::create_dir(&dir).map_err(|e| ChainError::io(&dir, e))?;
        Ok(dir)
    }

    fn remove_step(&mut self, name: &str) -> ChainResult<bool> {
        let dir = self.root.join(name);
        if !dir.is_dir() {
            return Ok(false);
        }
        fs::remove_dir_all(&dir).map_err(|e| ChainError::io(&dir, e))?;
        Ok(true)
    }

    fn read_text(&self, id: usize, file: &str) -> ChainResult<Option<String>> {
        let path = self.step_dir(id).join(file);
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ChainError::io(path, e)),
        }
    }

    fn write_text(&mut self, id: usize, file: &str, contents: &str) -> ChainResult<()> {
        let path = self.step_dir(id).join(file);
        fs::write(&path, contents).map_err(|e| ChainError::io(path, e))
    }

    fn exists(&self, id: usize, file: &str) -> bool {
        self.step_dir(id).join(file).exists()
    }

    fn has_artifact(&self, source: &Path) -> bool {
        source.is_file()
    }

    fn import_artifact(&mut self, source: &Path, id: usize, file: &str) -> ChainResult<()> {
        if !source.is_file() {
            return Err(ChainError::StepCreation {
                id,
                reason: format!("artifact '{}' does not exist", source.display()),
            });
        }
        let target = self.step_dir(id).join(file);
        fs::copy(source, &target).map_err(|e| ChainError::io(&target, e))?;
        Ok(())
    }
}

/// In-memory stand-in for [`DirStore`]. Paths under the root resolve to
/// stored steps; anything else must be registered with [`MemoryStore::put_external`].
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    root: PathBuf,
    steps: BTreeMap<String, BTreeMap<String, Vec<u8>>>,
    external: BTreeMap<PathBuf, Vec<u8>>,
}

impl MemoryStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    pub fn put_external(&mut self, path: impl Into<PathBuf>, bytes: impl Into<Vec<u8>>) {
        self.external.insert(path.into(), bytes.into());
    }

    pub fn put_file(&mut self, id: usize, file: &str, bytes: impl Into<Vec<u8>>) {
        self.steps
            .entry(id.to_string())
            .or_default()
            .insert(file.to_string(), bytes.into());
    }

    pub fn file(&self, id: usize, file: &str) -> Option<&[u8]> {
        self.steps
            .get(&id.to_string())
            .and_then(|files| files.get(file))
            .map(Vec::as_slice)
    }

    fn resolve(&self, path: &Path) -> Option<&Vec<u8>> {
        if let Ok(relative) = path.strip_prefix(&self.root) {
            let mut parts = relative.components().filter_map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy().to_string()),
                _ => None,
            });
            if let (Some(step), Some(file), None) = (parts.next(), parts.next(), parts.next()) {
                return self.steps.get(&step).and_then(|files| files.get(&file));
            }
        }
        self.external.get(path)
    }
}

impl StepStore for MemoryStore {
    fn root(&self) -> &Path {
        &self.root
    }

    fn step_names(&self) -> ChainResult<Vec<String>> {
        Ok(self.steps.keys().cloned().collect())
    }

    fn create_step_dir(&mut self, id: usize) -> ChainResult<PathBuf> {
        let name = id.to_string();
        if self.steps.contains_key(&name) {
            return Err(ChainError::StepCreation {
                id,
                reason: format!("step '{}' already exists", name),
            });
        }
        self.steps.insert(name, BTreeMap::new());
        Ok(self.step_dir(id))
    }

    fn remove_step(&mut self, name: &str) -> ChainResult<bool> {
        Ok(self.steps.remove(name).is_some())
    }

    fn read_text(&self, id: usize, file: &str) -> ChainResult<Option<String>> {
        Ok(self
            .file(id, file)
            .map(|bytes| String::from_utf8_lossy(bytes).to_string()))
    }

    fn write_text(&mut self, id: usize, file: &str, contents: &str) -> ChainResult<()> {
        let dir = self.step_dir(id);
        let files = self.steps.get_mut(&id.to_string()).ok_or_else(|| {
            ChainError::io(dir, std::io::Error::from(std::io::ErrorKind::NotFound))
        })?;
        files.insert(file.to_string(), contents.as_bytes().to_vec());
        Ok(())
    }

    fn exists(&self, id: usize, file: &str) -> bool {
        self.file(id, file).is_some()
    }

    fn has_artifact(&self, source: &Path) -> bool {
        self.resolve(source).is_some()
    }

    fn import_artifact(&mut self, source: &Path, id: usize, file: &str) -> ChainResult<()> {
        let bytes = self
            .resolve(source)
            .cloned()
            .ok_or_else(|| ChainError::StepCreation {
                id,
                reason: format!("artifact '{}' does not exist", source.display()),
            })?;
        self.put_file(id, file, bytes);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dir_store_counts_only_directories() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir(tmp.path().join("0")).unwrap();
        fs::create_dir(tmp.path().join("1")).unwrap();
        fs::write(tmp.path().join("patchchain.toml"), "").unwrap();

        let store = DirStore::new(tmp.path());
        assert_eq!(store.count_steps().unwrap(), 2);
        assert_eq!(store.step_names().unwrap(), vec!["0", "1"]);
    }

    #[test]
    fn dir_store_refuses_existing_step() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = DirStore::new(tmp.path());
        store.create_step_dir(0).unwrap();
        let err = store.create_step_dir(0).unwrap_err();
        assert!(matches!(err, ChainError::StepCreation { id: 0, .. }));
    }

    #[test]
    fn dir_store_reads_missing_file_as_none() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = DirStore::new(tmp.path());
        store.create_step_dir(0).unwrap();
        assert!(store.read_text(0, RESULT_LOG).unwrap().is_none());
        store.write_text(0, RESULT_LOG, "done\n").unwrap();
        assert_eq!(store.read_text(0, RESULT_LOG).unwrap().as_deref(), Some("done\n"));
    }

    #[test]
    fn memory_store_imports_from_sibling_step() {
        let mut store = MemoryStore::new("/runs/x");
        store.put_file(0, FINAL_ARTIFACT, b"aig".to_vec());
        store.create_step_dir(1).unwrap();
        store
            .import_artifact(Path::new("/runs/x/0/final.aig"), 1, INPUT_ARTIFACT)
            .unwrap();
        assert_eq!(store.file(1, INPUT_ARTIFACT), Some(&b"aig"[..]));

        let err = store
            .import_artifact(Path::new("/runs/x/0/missing.aig"), 1, INPUT_ARTIFACT)
            .unwrap_err();
        assert!(matches!(err, ChainError::StepCreation { id: 1, .. }));
    }
}
