//! Directory-backed store for persistent storage.

use crate::backend::{entry_size, validate_key, DurableStore, StoreConfig};
use crate::error::StorageResult;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

const ENTRY_EXT: &str = "bin";
const TEMP_EXT: &str = "tmp";

/// A directory-backed durable store.
///
/// Each key lives in its own file. Data survives process restarts.
///
/// # Durability
///
/// Writes go to a temporary file that is synced and then renamed over the
/// entry, so a crash leaves either the old or the new value.
///
/// # Thread Safety
///
/// This store is thread-safe. An in-memory index of entry sizes is kept under
/// a lock and serializes writers.
///
/// # Example
///
/// ```no_run
/// use partsync_storage::{DurableStore, FileStore};
/// use std::path::Path;
///
/// let store = FileStore::open(Path::new("cache")).unwrap();
/// store.put("users", b"{\"records\":[]}").unwrap();
/// ```
#[derive(Debug)]
pub struct FileStore {
    dir: PathBuf,
    config: StoreConfig,
    sizes: RwLock<BTreeMap<String, u64>>,
}

impl FileStore {
    /// Opens or creates a store in `dir` with the default quota.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or scanned.
    pub fn open(dir: &Path) -> StorageResult<Self> {
        Self::open_with_config(dir, StoreConfig::default())
    }

    /// Opens or creates a store in `dir` with `config`.
    ///
    /// Leftover temporary files from interrupted writes are removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or scanned.
    pub fn open_with_config(dir: &Path, config: StoreConfig) -> StorageResult<Self> {
        fs::create_dir_all(dir)?;

        let mut sizes = BTreeMap::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            match path.extension().and_then(|e| e.to_str()) {
                Some(TEMP_EXT) => {
                    tracing::debug!(path = %path.display(), "removing stale temp file");
                    fs::remove_file(&path)?;
                }
                Some(ENTRY_EXT) => {
                    let Some(key) = path
                        .file_stem()
                        .and_then(|s| s.to_str())
                        .and_then(decode_file_name)
                    else {
                        tracing::warn!(path = %path.display(), "skipping unrecognized entry");
                        continue;
                    };
                    let len = entry.metadata()?.len();
                    sizes.insert(key.clone(), entry_size(&key, len as usize));
                }
                _ => {}
            }
        }

        Ok(Self {
            dir: dir.to_path_buf(),
            config,
            sizes: RwLock::new(sizes),
        })
    }

    /// Returns the store directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", encode_file_name(key), ENTRY_EXT))
    }

    fn temp_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", encode_file_name(key), TEMP_EXT))
    }
}

impl DurableStore for FileStore {
    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        match fs::read(self.entry_path(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn put(&self, key: &str, value: &[u8]) -> StorageResult<()> {
        validate_key(key)?;
        let mut sizes = self.sizes.write();

        let current: u64 = sizes.values().sum();
        let old = sizes.get(key).copied().unwrap_or(0);
        let new = entry_size(key, value.len());
        self.config.check_quota(current, old, new)?;

        let temp = self.temp_path(key);
        {
            let mut file = fs::File::create(&temp)?;
            file.write_all(value)?;
            file.sync_all()?;
        }
        if let Err(e) = fs::rename(&temp, self.entry_path(key)) {
            let _ = fs::remove_file(&temp);
            return Err(e.into());
        }

        sizes.insert(key.to_string(), new);
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<bool> {
        let mut sizes = self.sizes.write();
        match fs::remove_file(self.entry_path(key)) {
            Ok(()) => {
                sizes.remove(key);
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(sizes.remove(key).is_some()),
            Err(e) => Err(e.into()),
        }
    }

    fn keys(&self) -> StorageResult<Vec<String>> {
        Ok(self.sizes.read().keys().cloned().collect())
    }

    fn usage_bytes(&self) -> u64 {
        self.sizes.read().values().sum()
    }

    fn quota_bytes(&self) -> Option<u64> {
        self.config.quota_bytes
    }
}

/// Escapes a key into a portable file name.
///
/// ASCII alphanumerics, `-` and `_` pass through; every other byte becomes
/// `%XX`.
fn encode_file_name(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for byte in key.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{:02X}", byte));
        }
    }
    out
}

fn decode_file_name(name: &str) -> Option<String> {
    let bytes = name.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = name.get(i + 1..i + 3)?;
            if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
                return None;
            }
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}
