// src/fs/mock.rs

use std::collections::{BTreeMap, BTreeSet};
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::{Result, anyhow};

use super::FileSystem;

#[derive(Debug, Clone)]
enum MockEntry {
    File(Vec<u8>),
    Dir(BTreeSet<String>),
}

/// In-memory filesystem for tests.
///
/// Parent directories are created implicitly by [`add_file`]. Clones share
/// the same tree, so a test can keep one handle to mutate files while a
/// provider holds another.
///
/// [`add_file`]: MockFileSystem::add_file
#[derive(Debug, Clone, Default)]
pub struct MockFileSystem {
    entries: Arc<Mutex<BTreeMap<PathBuf, MockEntry>>>,
}

impl MockFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<PathBuf, MockEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create or overwrite a file.
    pub fn add_file(&self, path: impl AsRef<Path>, content: impl Into<Vec<u8>>) {
        let path = path.as_ref().to_path_buf();
        let mut entries = self.lock();
        link_into_parent(&mut entries, &path);
        entries.insert(path, MockEntry::File(content.into()));
    }

    /// Remove a file; returns whether it existed.
    pub fn remove_file(&self, path: impl AsRef<Path>) -> bool {
        let path = path.as_ref();
        let mut entries = self.lock();
        if !matches!(entries.get(path), Some(MockEntry::File(_))) {
            return false;
        }
        entries.remove(path);
        if let (Some(parent), Some(name)) = (path.parent(), file_name(path)) {
            if let Some(MockEntry::Dir(children)) = entries.get_mut(parent) {
                children.remove(&name);
            }
        }
        true
    }
}

fn file_name(path: &Path) -> Option<String> {
    path.file_name().map(|n| n.to_string_lossy().into_owned())
}

/// Register `path` as a child of its parent, creating ancestors as needed.
fn link_into_parent(entries: &mut BTreeMap<PathBuf, MockEntry>, path: &Path) {
    let (Some(parent), Some(name)) = (path.parent(), file_name(path)) else {
        return;
    };
    if !entries.contains_key(parent) {
        link_into_parent(entries, parent);
        entries.insert(parent.to_path_buf(), MockEntry::Dir(BTreeSet::new()));
    }
    if let Some(MockEntry::Dir(children)) = entries.get_mut(parent) {
        children.insert(name);
    }
}

impl FileSystem for MockFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String> {
        match self.lock().get(path) {
            Some(MockEntry::File(content)) => String::from_utf8(content.clone())
                .map_err(|e| anyhow!("invalid UTF-8 in {:?}: {}", path, e)),
            Some(MockEntry::Dir(_)) => Err(anyhow!("is a directory: {:?}", path)),
            None => Err(anyhow!("file not found: {:?}", path)),
        }
    }

    fn open_read(&self, path: &Path) -> Result<Box<dyn Read + Send>> {
        match self.lock().get(path) {
            Some(MockEntry::File(content)) => Ok(Box::new(Cursor::new(content.clone()))),
            Some(MockEntry::Dir(_)) => Err(anyhow!("is a directory: {:?}", path)),
            None => Err(anyhow!("file not found: {:?}", path)),
        }
    }

    fn write(&self, path: &Path, contents: &[u8]) -> Result<()> {
        self.add_file(path, contents);
        Ok(())
    }

    fn append(&self, path: &Path, contents: &[u8]) -> Result<()> {
        let mut entries = self.lock();
        match entries.get_mut(path) {
            Some(MockEntry::File(existing)) => existing.extend_from_slice(contents),
            Some(MockEntry::Dir(_)) => return Err(anyhow!("is a directory: {:?}", path)),
            None => {
                link_into_parent(&mut entries, path);
                entries.insert(path.to_path_buf(), MockEntry::File(contents.to_vec()));
            }
        }
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        self.lock().contains_key(path)
    }

    fn is_file(&self, path: &Path) -> bool {
        matches!(self.lock().get(path), Some(MockEntry::File(_)))
    }

    fn is_dir(&self, path: &Path) -> bool {
        matches!(self.lock().get(path), Some(MockEntry::Dir(_)))
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>> {
        match self.lock().get(path) {
            Some(MockEntry::Dir(children)) => {
                Ok(children.iter().map(|name| path.join(name)).collect())
            }
            _ => Err(anyhow!("not a directory or not found: {:?}", path)),
        }
    }
}
