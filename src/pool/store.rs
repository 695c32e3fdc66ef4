use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// File-system capability used by registry persistence.
///
/// Injected so the core is testable without real disk I/O; persistence is
/// the only part of the crate that touches storage.
pub trait FileStore: Send + Sync {
    fn exists(&self, path: &Path) -> bool;
    fn load(&self, path: &Path) -> io::Result<Vec<u8>>;
    fn save(&self, path: &Path, data: &[u8]) -> io::Result<()>;
    fn remove(&self, path: &Path) -> io::Result<()>;
}

/// Real-disk implementation backed by `std::fs`.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiskStore;

impl FileStore for DiskStore {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn load(&self, path: &Path) -> io::Result<Vec<u8>> {
        std::fs::read(path)
    }

    fn save(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        std::fs::write(path, data)
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        std::fs::remove_file(path)
    }
}

/// In-memory implementation for tests and diskless embedders.
#[derive(Debug, Default)]
pub struct MemoryStore {
    files: Mutex<HashMap<PathBuf, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned() -> io::Error {
    io::Error::new(io::ErrorKind::Other, "memory store lock poisoned")
}

impl FileStore for MemoryStore {
    fn exists(&self, path: &Path) -> bool {
        self.files.lock().map(|files| files.contains_key(path)).unwrap_or(false)
    }

    fn load(&self, path: &Path) -> io::Result<Vec<u8>> {
        let files = self.files.lock().map_err(|_| poisoned())?;
        files
            .get(path)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no such file"))
    }

    fn save(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        self.files.lock().map_err(|_| poisoned())?.insert(path.to_path_buf(), data.to_vec());
        Ok(())
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        self.files
            .lock()
            .map_err(|_| poisoned())?
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no such file"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_roundtrip() {
        let store = MemoryStore::new();
        let path = Path::new("registry.bin");

        assert!(!store.exists(path));
        assert!(store.load(path).is_err());

        store.save(path, b"payload").unwrap();
        assert!(store.exists(path));
        assert_eq!(store.load(path).unwrap(), b"payload");

        store.remove(path).unwrap();
        assert!(!store.exists(path));
        assert!(store.remove(path).is_err());
    }

    #[test]
    fn disk_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.bin");
        let store = DiskStore;

        assert!(!store.exists(&path));
        store.save(&path, b"payload").unwrap();
        assert!(store.exists(&path));
        assert_eq!(store.load(&path).unwrap(), b"payload");

        store.remove(&path).unwrap();
        assert!(!store.exists(&path));
    }
}
