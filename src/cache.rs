use std::{
    collections::BTreeMap,
    fs::File,
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use fs4::fs_std::FileExt;
use log::{debug, trace, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const VERSION: u32 = 1;
const CACHE_FILE_NAME: &str = "pypi_cache.json";

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache location {location} is not a directory")]
    BadLocation { location: String },
    #[error("Cache lock cannot be acquired: {0}")]
    Lock(std::io::Error),
    #[error("Failed to write cache file: {0}")]
    Write(std::io::Error),
    #[error("IO error: {0}")]
    IO(#[from] std::io::Error),
}

/// Persistent content-hash to download-URL mapping shared across runs.
///
/// The cache is purely a network-call saver: an absent, unreadable or
/// wrong-version cache file degrades to an empty cache and never fails a run.
/// An advisory lock on the cache directory is held for the lifetime of this
/// value so concurrent invocations do not race the read-modify-write cycle.
pub struct UrlCache {
    location: PathBuf,
    data: BTreeMap<String, String>,
    dirty: bool,
    _lock: File,
}

#[derive(Serialize, Deserialize)]
struct CacheDocument {
    version: u32,
    data: BTreeMap<String, String>,
}

impl UrlCache {
    /// Opens the cache under the given directory, creating it if needed.
    pub fn open(location: PathBuf) -> Result<UrlCache, CacheError> {
        if location.exists() {
            if !location.is_dir() {
                return Err(CacheError::BadLocation {
                    location: location.to_str().unwrap_or("").to_string(),
                });
            }
        } else {
            std::fs::create_dir_all(&location)?;
        }

        let lock = Self::acquire_lock(&location)?;
        let data = Self::load(&location.join(CACHE_FILE_NAME));

        Ok(UrlCache {
            location,
            data,
            dirty: false,
            _lock: lock,
        })
    }

    /// Per-user cache directory: `~/Library/Caches/wheelfetch` on macOS,
    /// `$XDG_CACHE_HOME/wheelfetch` (default `~/.cache/wheelfetch`) elsewhere.
    pub fn default_location() -> PathBuf {
        let base = if cfg!(target_os = "macos") {
            home::home_dir().map(|home| home.join("Library/Caches"))
        } else {
            std::env::var_os("XDG_CACHE_HOME")
                .map(PathBuf::from)
                .or_else(|| home::home_dir().map(|home| home.join(".cache")))
        };
        base.unwrap_or_else(|| PathBuf::from(".")).join("wheelfetch")
    }

    pub fn get(&self, sha256: &str) -> Option<&str> {
        self.data.get(sha256).map(String::as_str)
    }

    pub fn insert(&mut self, sha256: String, url: String) {
        self.data.insert(sha256, url);
        self.dirty = true;
    }

    /// Writes the cache back to disk if any entry was added. The new content
    /// is published with write-then-rename so a pre-existing file is never
    /// left truncated.
    pub fn flush(&mut self) -> Result<(), CacheError> {
        if !self.dirty {
            return Ok(());
        }

        let document = CacheDocument {
            version: VERSION,
            data: std::mem::take(&mut self.data),
        };
        let result = Self::publish(&self.location, &document);
        self.data = document.data;
        result?;

        debug!(
            "Saved {} resolved urls to {}",
            self.data.len(),
            self.location.join(CACHE_FILE_NAME).display()
        );
        self.dirty = false;
        Ok(())
    }

    fn publish(location: &Path, document: &CacheDocument) -> Result<(), CacheError> {
        let file = tempfile::NamedTempFile::new_in(location).map_err(CacheError::Write)?;
        serde_json::to_writer_pretty(&file, document)
            .map_err(|error| CacheError::Write(error.into()))?;
        file.persist(location.join(CACHE_FILE_NAME))
            .map_err(|error| CacheError::Write(error.error))?;
        Ok(())
    }

    fn load(path: &Path) -> BTreeMap<String, String> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(_) => return BTreeMap::new(),
        };
        match serde_json::from_str::<CacheDocument>(&content) {
            Ok(document) if document.version == VERSION => document.data,
            Ok(document) => {
                warn!(
                    "Discarding cache file {} with unsupported version {}",
                    path.display(),
                    document.version
                );
                BTreeMap::new()
            }
            Err(error) => {
                warn!("Discarding unreadable cache file {}: {}", path.display(), error);
                BTreeMap::new()
            }
        }
    }

    fn acquire_lock(location: &Path) -> Result<File, CacheError> {
        let path = location.join(".lock");
        trace!("Acquiring a lock on the cache location: {}", path.display());
        let file = File::create(&path).map_err(CacheError::Lock)?;
        let start = Instant::now();
        loop {
            match file.try_lock_exclusive() {
                Ok(_) => return Ok(file),
                Err(error)
                    if error.raw_os_error() == fs4::lock_contended_error().raw_os_error()
                        && start.elapsed().as_secs() < 300 =>
                {
                    debug!("Failed to acquire a lock on {}, retrying", path.display());
                    std::thread::sleep(Duration::from_secs(1));
                }
                Err(error) => return Err(CacheError::Lock(error)),
            }
        }
    }
}
