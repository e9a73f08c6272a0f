//! Series configuration and its on-disk store.
//!
//! A series is a named bundle of per-database substring whitelists plus a
//! soft-delete tombstone. Series JSON lives under `<dataDir>/series/`;
//! the store validates every suffix so no operation can escape the
//! series or output directories.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{DalleError, Result};
use crate::fsutil;

/// Filter configuration for one series.
///
/// The twelve vectors are substring whitelists keyed by logical database
/// name; an empty vector passes every record of that database.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Series {
    pub suffix: String,
    pub deleted: bool,
    pub last: u64,
    #[serde(rename = "modifiedAt", skip_serializing_if = "String::is_empty")]
    pub modified_at: String,
    pub adverbs: Vec<String>,
    pub adjectives: Vec<String>,
    pub nouns: Vec<String>,
    pub emotions: Vec<String>,
    pub occupations: Vec<String>,
    pub actions: Vec<String>,
    pub artstyles: Vec<String>,
    pub litstyles: Vec<String>,
    pub colors: Vec<String>,
    pub orientations: Vec<String>,
    pub gazes: Vec<String>,
    pub backstyles: Vec<String>,
}

impl Series {
    pub fn new(suffix: impl Into<String>) -> Self {
        Self {
            suffix: suffix.into(),
            ..Self::default()
        }
    }

    /// The whitelist for a logical database name. The mapping is explicit
    /// and total over the configured databases; anything else is empty.
    pub fn filter_for(&self, database: &str) -> &[String] {
        match database {
            "adverbs" => &self.adverbs,
            "adjectives" => &self.adjectives,
            "nouns" => &self.nouns,
            "emotions" => &self.emotions,
            "occupations" => &self.occupations,
            "actions" => &self.actions,
            "artstyles" => &self.artstyles,
            "litstyles" => &self.litstyles,
            "colors" => &self.colors,
            "orientations" => &self.orientations,
            "gazes" => &self.gazes,
            "backstyles" => &self.backstyles,
            _ => &[],
        }
    }
}

/// Normalize a series name: lowercase, spaces to dashes, dashes trimmed.
pub fn normalize_series_name(name: &str) -> String {
    name.to_lowercase()
        .replace(' ', "-")
        .trim_matches('-')
        .to_string()
}

/// Field to order a series listing by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeriesSortField {
    Suffix,
    ModifiedAt,
    Last,
}

/// Stable in-place sort of a series listing.
pub fn sort_series(items: &mut [Series], field: SeriesSortField, ascending: bool) {
    items.sort_by(|a, b| {
        let ord = match field {
            SeriesSortField::Suffix => a.suffix.cmp(&b.suffix),
            SeriesSortField::ModifiedAt => a.modified_at.cmp(&b.modified_at),
            SeriesSortField::Last => a.last.cmp(&b.last),
        };
        if ascending { ord } else { ord.reverse() }
    });
}

/// Reads and writes series JSON beneath the data directory.
pub struct SeriesStore {
    series_dir: PathBuf,
    output_dir: PathBuf,
}

impl SeriesStore {
    pub fn new(series_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            series_dir: series_dir.into(),
            output_dir: output_dir.into(),
        }
    }

    /// Load a series by name, creating and persisting the default when
    /// the file is missing or empty.
    pub fn load_series(&self, name: &str) -> Result<Series> {
        let suffix = self.checked_suffix(name)?;
        let path = self.series_path(&suffix);
        let raw = fsutil::read_string_or_empty(&path);
        if raw.is_empty() {
            info!(suffix = %suffix, "series file absent, creating default");
            let series = Series::new(&suffix);
            self.save_series(&series, 0)?;
            return Ok(series);
        }
        let mut series: Series = serde_json::from_str(&raw)
            .map_err(|e| DalleError::series_io(&path, e.to_string()))?;
        series.suffix = normalize_series_name(&series.suffix);
        if series.suffix.is_empty() {
            series.suffix = suffix;
        }
        Ok(series)
    }

    /// Persist a series with the given progress counter, atomically.
    pub fn save_series(&self, series: &Series, last: u64) -> Result<()> {
        let suffix = self.checked_suffix(&series.suffix)?;
        let mut out = series.clone();
        out.suffix = suffix.clone();
        out.last = last;
        out.modified_at = Utc::now().to_rfc3339();
        let json = serde_json::to_vec_pretty(&out)
            .map_err(|e| DalleError::series_io(self.series_path(&suffix), e.to_string()))?;
        fsutil::write_atomic(&self.series_path(&suffix), &json)
    }

    /// Soft-delete: set the tombstone and park the output directory at
    /// `<suffix>.deleted`.
    pub fn delete_series(&self, suffix: &str) -> Result<()> {
        let suffix = self.checked_suffix(suffix)?;
        let mut series = self.load_series(&suffix)?;
        series.deleted = true;
        self.save_series(&series, series.last)?;
        let live = self.output_dir.join(&suffix);
        let parked = self.output_dir.join(format!("{suffix}.deleted"));
        if live.is_dir() {
            std::fs::rename(&live, &parked)
                .map_err(|e| DalleError::series_io(&live, e.to_string()))?;
        }
        info!(suffix = %suffix, "series soft-deleted");
        Ok(())
    }

    /// Reverse a soft delete.
    pub fn undelete_series(&self, suffix: &str) -> Result<()> {
        let suffix = self.checked_suffix(suffix)?;
        let mut series = self.load_series(&suffix)?;
        series.deleted = false;
        self.save_series(&series, series.last)?;
        let live = self.output_dir.join(&suffix);
        let parked = self.output_dir.join(format!("{suffix}.deleted"));
        if parked.is_dir() {
            std::fs::rename(&parked, &live)
                .map_err(|e| DalleError::series_io(&parked, e.to_string()))?;
        }
        info!(suffix = %suffix, "series undeleted");
        Ok(())
    }

    /// Permanently remove the series JSON and both output directories.
    pub fn remove_series(&self, suffix: &str) -> Result<()> {
        let suffix = self.checked_suffix(suffix)?;
        let path = self.series_path(&suffix);
        if path.is_file() {
            std::fs::remove_file(&path).map_err(|e| DalleError::series_io(&path, e.to_string()))?;
        }
        for dir in [
            self.output_dir.join(&suffix),
            self.output_dir.join(format!("{suffix}.deleted")),
        ] {
            if dir.is_dir()
                && let Err(err) = std::fs::remove_dir_all(&dir)
            {
                warn!(dir = %dir.display(), error = %err, "could not remove output directory");
            }
        }
        info!(suffix = %suffix, "series removed");
        Ok(())
    }

    /// Duplicate a series under a new suffix; refuses an existing target.
    pub fn duplicate_series(&self, from: &str, to: &str) -> Result<Series> {
        let from = self.checked_suffix(from)?;
        let to = self.checked_suffix(to)?;
        if from == to {
            return Err(DalleError::invalid_input("duplicate target equals source"));
        }
        if !self.series_path(&from).is_file() {
            return Err(DalleError::not_found(format!("series {from}")));
        }
        if self.series_path(&to).is_file() {
            return Err(DalleError::invalid_input(format!("series {to} exists")));
        }
        let mut series = self.load_series(&from)?;
        series.suffix = to;
        self.save_series(&series, series.last)?;
        Ok(series)
    }

    /// Every parsable series on disk, `modifiedAt` stamped from the file.
    pub fn load_all(&self) -> Vec<Series> {
        let mut items = Vec::new();
        let Ok(entries) = std::fs::read_dir(&self.series_dir) else {
            return items;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Ok(raw) = std::fs::read_to_string(&path) else {
                continue;
            };
            let Ok(mut series) = serde_json::from_str::<Series>(&raw) else {
                continue;
            };
            if let Ok(meta) = entry.metadata()
                && let Ok(mtime) = meta.modified()
            {
                series.modified_at = DateTime::<Utc>::from(mtime).to_rfc3339();
            }
            items.push(series);
        }
        items
    }

    /// Suffixes of the series files present on disk.
    pub fn list_series(&self) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(&self.series_dir) else {
            return Vec::new();
        };
        let mut names: Vec<String> = entries
            .flatten()
            .filter_map(|e| {
                let name = e.file_name().to_string_lossy().into_owned();
                name.strip_suffix(".json").map(String::from)
            })
            .collect();
        names.sort();
        names
    }

    fn series_path(&self, suffix: &str) -> PathBuf {
        self.series_dir.join(format!("{suffix}.json"))
    }

    /// Normalize and reject any suffix that could escape the series or
    /// output directories.
    fn checked_suffix(&self, name: &str) -> Result<String> {
        let suffix = normalize_series_name(name);
        if suffix.is_empty() {
            return Err(DalleError::invalid_input("empty series suffix"));
        }
        if suffix.contains('/') || suffix.contains('\\') || suffix.contains("..") {
            return Err(DalleError::invalid_input(format!(
                "series suffix {suffix:?} escapes the series directory"
            )));
        }
        debug_assert!(self.series_path(&suffix).starts_with(&self.series_dir));
        debug_assert!(self.output_dir.join(&suffix).starts_with(&self.output_dir));
        Ok(suffix)
    }
}
