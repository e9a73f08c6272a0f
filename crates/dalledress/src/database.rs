//! Versioned attribute-database cache.
//!
//! The embedded archive is parsed once into indexed form and persisted as
//! gzipped JSON under `<dataDir>/cache/databases_<version>.json.gz`. The
//! on-disk copy is adopted only when its source hash still matches the
//! embedded archive; any disk problem degrades to an in-memory build.

use std::borrow::Cow;
use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::archive;
use crate::attribute::DATABASE_ORDER;
use crate::error::{DalleError, Result};
use crate::fsutil;

const DEFAULT_VERSION: &str = "v0.1.0";
const CACHE_PREFIX: &str = "databases_";
const CACHE_SUFFIX: &str = ".json.gz";
const LEGACY_CACHE_FILE: &str = "databases.json.gz";

/// A single row from a CSV database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseRecord {
    /// Primary identifier, the first comma-separated field trimmed.
    pub key: String,
    /// All column values, version prefix removed.
    pub values: Vec<String>,
}

impl DatabaseRecord {
    /// The record as the raw line derivation selects from.
    pub fn line(&self) -> String {
        self.values.join(",")
    }
}

/// Indexed form of one database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseIndex {
    pub name: String,
    pub version: String,
    pub records: Vec<DatabaseRecord>,
    /// Key → record index.
    pub lookup: HashMap<String, usize>,
}

impl DatabaseIndex {
    /// Record lines surviving a substring whitelist. An empty whitelist
    /// passes everything; a result that filters down to nothing yields
    /// the single record `none`.
    pub fn lines_filtered(&self, filter: &[String]) -> Vec<String> {
        let mut lines: Vec<String> = if filter.is_empty() {
            self.records.iter().map(DatabaseRecord::line).collect()
        } else {
            self.records
                .iter()
                .map(DatabaseRecord::line)
                .filter(|line| filter.iter().any(|f| line.contains(f.as_str())))
                .collect()
        };
        if lines.is_empty() {
            lines.push("none".to_string());
        }
        lines
    }
}

/// The persisted cache: every database index plus provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseCache {
    pub version: String,
    pub timestamp: i64,
    pub databases: HashMap<String, DatabaseIndex>,
    #[serde(rename = "sourceHash")]
    pub source_hash: String,
}

/// Loads, builds and serves database indexes.
///
/// Single writer during [`load_or_build`](Self::load_or_build) and
/// [`invalidate`](Self::invalidate); concurrent readers afterwards.
pub struct DatabaseCacheManager {
    cache_dir: PathBuf,
    archive: Cow<'static, [u8]>,
    state: RwLock<Option<DatabaseCache>>,
}

impl DatabaseCacheManager {
    /// Manager over the embedded archive.
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self::with_archive(cache_dir, Cow::Borrowed(archive::EMBEDDED_DATABASES))
    }

    /// Manager over an explicit archive (tests).
    pub fn with_archive(cache_dir: impl Into<PathBuf>, archive: Cow<'static, [u8]>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            archive,
            state: RwLock::new(None),
        }
    }

    /// SHA-256 of the backing archive, hex encoded.
    pub fn source_hash(&self) -> String {
        format!("{:x}", Sha256::digest(&self.archive))
    }

    /// Ensure the in-memory cache is populated, adopting a valid on-disk
    /// copy or rebuilding from the archive. Disk failures degrade: the
    /// build proceeds in memory with a logged warning.
    pub fn load_or_build(&self) -> Result<()> {
        let mut state = self.state.write();
        if state.is_some() {
            return Ok(());
        }
        let source_hash = self.source_hash();
        let version = self.extract_version();
        let cache_file = self.cache_path(&version);
        if let Some(cache) = self.try_load(&cache_file, &source_hash) {
            info!(version = %cache.version, count = cache.databases.len(), "loaded database cache");
            *state = Some(cache);
            return Ok(());
        }
        info!(version = %version, "building database cache from embedded archive");
        let cache = self.build(&version, &source_hash)?;
        if let Err(err) = self.save(&cache_file, &cache) {
            warn!(file = %cache_file.display(), error = %err, "could not persist database cache");
        }
        *state = Some(cache);
        Ok(())
    }

    /// Serve one database index, falling back to a just-in-time build
    /// from the archive when the cache was never loaded.
    pub fn get_database(&self, name: &str) -> Result<DatabaseIndex> {
        if let Some(state) = self.state.read().as_ref()
            && let Some(idx) = state.databases.get(name)
        {
            return Ok(idx.clone());
        }
        debug!(name, "database cache cold, building index on demand");
        self.build_index(name)
    }

    /// Drop the in-memory state and every on-disk cache file, versioned
    /// or legacy.
    pub fn invalidate(&self) -> Result<()> {
        let mut state = self.state.write();
        *state = None;
        let entries = match std::fs::read_dir(&self.cache_dir) {
            Ok(entries) => entries,
            Err(_) => return Ok(()),
        };
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            let versioned = name.starts_with(CACHE_PREFIX) && name.ends_with(CACHE_SUFFIX);
            if versioned || name == LEGACY_CACHE_FILE {
                if let Err(err) = std::fs::remove_file(entry.path()) {
                    warn!(file = %name, error = %err, "could not remove cache file");
                }
            }
        }
        info!("database cache invalidated");
        Ok(())
    }

    fn cache_path(&self, version: &str) -> PathBuf {
        self.cache_dir
            .join(format!("{CACHE_PREFIX}{version}{CACHE_SUFFIX}"))
    }

    /// Version from the first data row of the first configured database,
    /// `v0.1.0` when absent or unreadable.
    fn extract_version(&self) -> String {
        let Ok(lines) = archive::read_csv_from(&self.archive, DATABASE_ORDER[0]) else {
            return DEFAULT_VERSION.to_string();
        };
        lines
            .get(1)
            .and_then(|line| version_prefix(line))
            .unwrap_or(DEFAULT_VERSION)
            .to_string()
    }

    fn try_load(&self, path: &Path, source_hash: &str) -> Option<DatabaseCache> {
        let bytes = std::fs::read(path).ok()?;
        let mut json = Vec::new();
        GzDecoder::new(bytes.as_slice())
            .read_to_end(&mut json)
            .ok()?;
        let cache: DatabaseCache = serde_json::from_slice(&json).ok()?;
        if cache.source_hash != source_hash {
            info!(
                cached = %&cache.source_hash[..8.min(cache.source_hash.len())],
                current = %&source_hash[..8],
                "database cache outdated, rebuilding"
            );
            return None;
        }
        Some(cache)
    }

    fn save(&self, path: &Path, cache: &DatabaseCache) -> Result<()> {
        let json = serde_json::to_vec(cache)
            .map_err(|e| DalleError::cache_io("encoding cache", std::io::Error::other(e)))?;
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(&json)
            .map_err(|e| DalleError::cache_io("compressing cache", e))?;
        let compressed = encoder
            .finish()
            .map_err(|e| DalleError::cache_io("compressing cache", e))?;
        fsutil::write_atomic(path, &compressed)
    }

    fn build(&self, version: &str, source_hash: &str) -> Result<DatabaseCache> {
        let mut databases = HashMap::new();
        for name in DATABASE_ORDER {
            let idx = self.build_index(name)?;
            databases.insert(name.to_string(), idx);
        }
        Ok(DatabaseCache {
            version: version.to_string(),
            timestamp: chrono::Utc::now().timestamp(),
            databases,
            source_hash: source_hash.to_string(),
        })
    }

    fn build_index(&self, name: &str) -> Result<DatabaseIndex> {
        let lines = archive::read_csv_from(&self.archive, name)?;
        if lines.is_empty() {
            return Err(DalleError::not_found(format!("database {name} is empty")));
        }
        let mut records = Vec::with_capacity(lines.len().saturating_sub(1));
        let mut lookup = HashMap::new();
        let mut version = None;
        for line in &lines[1..] {
            if version.is_none() {
                version = version_prefix(line).map(String::from);
            }
            let clean = strip_version_prefix(line);
            let values: Vec<String> = clean.split(',').map(String::from).collect();
            let key = values[0].trim().to_string();
            if key.is_empty() {
                continue;
            }
            lookup.insert(key.clone(), records.len());
            records.push(DatabaseRecord { key, values });
        }
        Ok(DatabaseIndex {
            name: name.to_string(),
            version: version.unwrap_or_else(|| DEFAULT_VERSION.to_string()),
            records,
            lookup,
        })
    }
}

/// The `v<major>.<minor>.<patch>` prefix of a line, when present.
fn version_prefix(line: &str) -> Option<&str> {
    let head = line.split(',').next()?;
    let rest = head.strip_prefix('v')?;
    if !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit() || c == '.') {
        Some(head)
    } else {
        None
    }
}

/// A line with any `v<x>,` prefix removed.
fn strip_version_prefix(line: &str) -> &str {
    match version_prefix(line) {
        Some(prefix) => &line[prefix.len() + 1..],
        None => line,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use tempfile::TempDir;

    fn test_archive(version_row: &str) -> Vec<u8> {
        let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
        for name in DATABASE_ORDER {
            let body = format!(
                "version,word,detail\n{version_row}alpha {name},first\nbeta {name},second\ncharlie {name},third\n"
            );
            let path = format!("databases/{name}.csv");
            let mut header = tar::Header::new_gnu();
            header.set_size(body.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, path.as_str(), body.as_bytes())
                .unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap()
    }

    fn manager(dir: &Path, version_row: &str) -> DatabaseCacheManager {
        DatabaseCacheManager::with_archive(dir, Cow::Owned(test_archive(version_row)))
    }

    #[test]
    fn version_prefix_detection() {
        assert_eq!(version_prefix("v0.1.0,apple"), Some("v0.1.0"));
        assert_eq!(version_prefix("v2.10.3,apple"), Some("v2.10.3"));
        assert_eq!(version_prefix("vivid,apple"), None);
        assert_eq!(version_prefix("apple,red"), None);
        assert_eq!(strip_version_prefix("v0.1.0,apple,red"), "apple,red");
        assert_eq!(strip_version_prefix("apple,red"), "apple,red");
    }

    #[test]
    fn build_skips_header_and_strips_prefix() {
        let tmp = TempDir::new().unwrap();
        let mgr = manager(tmp.path(), "v0.2.0,");
        let idx = mgr.get_database("nouns").unwrap();
        assert_eq!(idx.version, "v0.2.0");
        assert_eq!(idx.records.len(), 3);
        assert_eq!(idx.records[0].key, "alpha nouns");
        assert_eq!(idx.records[0].line(), "alpha nouns,first");
        assert_eq!(idx.lookup["charlie nouns"], 2);
    }

    #[test]
    fn cache_round_trips_bit_identical() {
        let tmp = TempDir::new().unwrap();
        let mgr = manager(tmp.path(), "v0.2.0,");
        mgr.load_or_build().unwrap();
        let before = mgr.state.read().clone().unwrap();

        let mgr2 = manager(tmp.path(), "v0.2.0,");
        mgr2.load_or_build().unwrap();
        let after = mgr2.state.read().clone().unwrap();
        assert_eq!(before, after);
        assert!(tmp.path().join("databases_v0.2.0.json.gz").exists());
    }

    #[test]
    fn stale_source_hash_triggers_rebuild() {
        let tmp = TempDir::new().unwrap();
        manager(tmp.path(), "v0.2.0,").load_or_build().unwrap();

        // Same version, different rows: the hash no longer matches.
        let changed = DatabaseCacheManager::with_archive(
            tmp.path(),
            Cow::Owned(test_archive("v0.2.0,extra ")),
        );
        changed.load_or_build().unwrap();
        let state = changed.state.read().clone().unwrap();
        assert_eq!(state.source_hash, changed.source_hash());
        assert_eq!(state.databases["nouns"].records[0].key, "extra alpha nouns");
    }

    #[test]
    fn missing_version_defaults() {
        let tmp = TempDir::new().unwrap();
        let mgr = manager(tmp.path(), "");
        assert_eq!(mgr.extract_version(), DEFAULT_VERSION);
    }

    #[test]
    fn invalidate_removes_versioned_and_legacy_files() {
        let tmp = TempDir::new().unwrap();
        let mgr = manager(tmp.path(), "v0.2.0,");
        mgr.load_or_build().unwrap();
        std::fs::write(tmp.path().join(LEGACY_CACHE_FILE), b"old").unwrap();
        mgr.invalidate().unwrap();
        assert!(!tmp.path().join("databases_v0.2.0.json.gz").exists());
        assert!(!tmp.path().join(LEGACY_CACHE_FILE).exists());
        assert!(mgr.state.read().is_none());
    }

    #[test]
    fn filtered_lines_fall_back_to_none() {
        let tmp = TempDir::new().unwrap();
        let mgr = manager(tmp.path(), "");
        let idx = mgr.get_database("colors").unwrap();
        assert_eq!(idx.lines_filtered(&[]).len(), 3);
        let narrowed = idx.lines_filtered(&["beta".to_string()]);
        assert_eq!(narrowed, vec!["beta colors,second".to_string()]);
        let emptied = idx.lines_filtered(&["zzz".to_string()]);
        assert_eq!(emptied, vec!["none".to_string()]);
    }
}
