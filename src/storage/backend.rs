use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::NamedTempFile;
use crate::common::{FaceAuthError, Result};

/// Flat durable key/value storage. Each key is read and written independently;
/// there is no cross-key transaction.
pub trait KeyValueBackend: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    fn put(&self, key: &str, value: &[u8]) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// One file per key inside a directory.
#[derive(Debug, Clone)]
pub struct DirBackend {
    dir: PathBuf,
}

impl DirBackend {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        tracing::debug!("Key-value store at {:?}", dir);
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.bin", key))
    }
}

impl KeyValueBackend for DirBackend {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(fs::read(path)?))
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        let path = self.path_for(key);

        // Write next to the target and rename so readers never see half a record
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(value)?;
        tmp.as_file().sync_all()?;
        let file = tmp
            .persist(&path)
            .map_err(|e| FaceAuthError::Storage(format!("Failed to persist {}: {}", key, e.error)))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = file.metadata()?.permissions();
            perms.set_mode(0o600);
            file.set_permissions(perms)?;
        }
        #[cfg(not(unix))]
        drop(file);

        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let path = self.path_for(key);
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }
}

/// Process-lifetime storage for tests and throwaway sessions.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>>> {
        self.entries
            .lock()
            .map_err(|_| FaceAuthError::Storage("memory backend lock poisoned".into()))
    }
}

impl KeyValueBackend for MemoryBackend {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries()?.get(key).cloned())
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        self.entries()?.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries()?.remove(key);
        Ok(())
    }
}

impl<B: KeyValueBackend + ?Sized> KeyValueBackend for std::sync::Arc<B> {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        (**self).get(key)
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        (**self).put(key, value)
    }

    fn remove(&self, key: &str) -> Result<()> {
        (**self).remove(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn dir_backend_put_get_remove() {
        let tmp = TempDir::new().unwrap();
        let backend = DirBackend::new(tmp.path().join("store")).unwrap();

        assert_eq!(backend.get("attempt_history").unwrap(), None);
        backend.put("attempt_history", b"abc").unwrap();
        assert_eq!(backend.get("attempt_history").unwrap(), Some(b"abc".to_vec()));

        backend.put("attempt_history", b"defg").unwrap();
        assert_eq!(backend.get("attempt_history").unwrap(), Some(b"defg".to_vec()));

        backend.remove("attempt_history").unwrap();
        assert_eq!(backend.get("attempt_history").unwrap(), None);
        // Removing again is fine
        backend.remove("attempt_history").unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn dir_backend_files_are_private() {
        use std::os::unix::fs::PermissionsExt;
        let tmp = TempDir::new().unwrap();
        let backend = DirBackend::new(tmp.path()).unwrap();
        backend.put("enrolled_descriptor", b"x").unwrap();
        let mode = fs::metadata(tmp.path().join("enrolled_descriptor.bin"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn memory_backend_keys_are_independent() {
        let backend = MemoryBackend::new();
        backend.put("a", b"1").unwrap();
        backend.put("b", b"2").unwrap();
        backend.remove("a").unwrap();
        assert_eq!(backend.get("a").unwrap(), None);
        assert_eq!(backend.get("b").unwrap(), Some(b"2".to_vec()));
    }
}
