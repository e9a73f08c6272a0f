//! Per-series runtime contexts and their LRU+TTL cache.
//!
//! A `Context` bundles a series, its filtered databases, the prompt
//! renderers and a memoization map of built dresses. Contexts are
//! expensive to build (series JSON + database reload), so the cache keeps
//! the most recently used ones alive and lets idle ones age out.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::attribute::{self, SLOT_TABLE};
use crate::config::{DEFAULT_CONTEXT_TTL, DEFAULT_MAX_CONTEXTS};
use crate::dress::{DalleDress, valid_filename};
use crate::error::Result;
use crate::fsutil;
use crate::prompt::PromptRenderer;
use crate::series::Series;

/// Per-series bundle of filtered databases, renderers and built dresses.
pub struct Context {
    pub series: Series,
    /// Database name → filtered record lines.
    pub databases: HashMap<String, Vec<String>>,
    pub renderer: PromptRenderer,
    output_dir: PathBuf,
    dress_cache: Mutex<HashMap<String, DalleDress>>,
}

impl Context {
    pub fn new(
        series: Series,
        databases: HashMap<String, Vec<String>>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            series,
            databases,
            renderer: PromptRenderer,
            output_dir: output_dir.into(),
            dress_cache: Mutex::new(HashMap::new()),
        }
    }

    /// Build or retrieve the dress for an address. Prompts render eagerly
    /// and are reported to the series output tree; a previously enhanced
    /// prompt on disk is picked up so re-runs keep their enhancement.
    pub fn make_dalle_dress(&self, address: &str) -> Result<DalleDress> {
        let mut cache = self.dress_cache.lock();
        if let Some(found) = cache.get(address) {
            debug!(address, "returning cached dress");
            return Ok(found.clone());
        }

        let seed = attribute::seed_from_address(address)?;
        let file_name = valid_filename(address);
        if let Some(found) = cache.get(&file_name) {
            debug!(address, "returning cached dress");
            return Ok(found.clone());
        }
        debug!(address, series = %self.series.suffix, "building dress");

        let attribs = attribute::derive_attributes(&seed, &self.databases)?;
        let mut dress = DalleDress {
            original: address.to_string(),
            file_name: file_name.clone(),
            seed,
            series: self.series.suffix.clone(),
            ..Default::default()
        };
        for attr in &attribs {
            dress.seed_chunks.push(attr.bytes.clone());
            dress
                .selected_tokens
                .push(attr.value.split(',').next().unwrap_or_default().to_string());
            dress.selected_records.push(attr.value.clone());
            dress.attrib_map.insert(attr.name.clone(), attr.clone());
        }
        dress.attribs = attribs;

        dress.data_prompt = self.renderer.data(&dress);
        self.report_on(&dress, "data", "txt", &dress.data_prompt);
        dress.title_prompt = self.renderer.title(&dress);
        self.report_on(&dress, "title", "txt", &dress.title_prompt);
        dress.terse_prompt = self.renderer.terse(&dress);
        self.report_on(&dress, "terse", "txt", &dress.terse_prompt);
        dress.prompt = self.renderer.prompt(&dress);
        self.report_on(&dress, "prompt", "txt", &dress.prompt);

        let enhanced_file = self
            .series_dir()
            .join("enhanced")
            .join(format!("{file_name}.txt"));
        dress.enhanced_prompt = fsutil::read_string_or_empty(&enhanced_file);

        cache.insert(file_name, dress.clone());
        cache.insert(address.to_string(), dress.clone());
        Ok(dress)
    }

    /// Write one generated artifact under the series output tree. Output
    /// reporting is advisory: failures log and the build continues.
    pub fn report_on(&self, dress: &DalleDress, loc: &str, ext: &str, value: &str) {
        let dir = self.series_dir().join(loc);
        let path = dir.join(format!("{}.{ext}", dress.file_name));
        if let Err(err) = fsutil::ensure_dir(&dir)
            .and_then(|_| fsutil::write_atomic(&path, value.as_bytes()))
        {
            tracing::warn!(path = %path.display(), error = %err, "could not report artifact");
        }
    }

    /// Number of memoized dresses (tests).
    pub fn dress_count(&self) -> usize {
        // Both the address and filename keys point at the same dress.
        self.dress_cache.lock().len()
    }

    fn series_dir(&self) -> PathBuf {
        self.output_dir.join(&self.series.suffix)
    }
}

/// Verify the slot table maps only onto loaded databases.
pub fn databases_cover_slots(databases: &HashMap<String, Vec<String>>) -> bool {
    SLOT_TABLE.iter().all(|(_, db)| databases.contains_key(*db))
}

struct ManagedContext {
    ctx: Arc<Context>,
    last_used: Instant,
}

struct CacheInner {
    items: HashMap<String, ManagedContext>,
    order: Vec<String>,
}

/// LRU+TTL cache of per-series contexts.
///
/// The mutex guards only the map and order list; context construction
/// happens outside it so no I/O runs under the lock.
pub struct ContextCache {
    inner: Mutex<CacheInner>,
    max_contexts: usize,
    ttl: Duration,
}

impl ContextCache {
    /// Zero or default-suppressing values keep the defaults (20 contexts,
    /// 30 minutes).
    pub fn new(max_contexts: usize, ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                items: HashMap::new(),
                order: Vec::new(),
            }),
            max_contexts: if max_contexts == 0 {
                DEFAULT_MAX_CONTEXTS
            } else {
                max_contexts
            },
            ttl: if ttl.is_zero() { DEFAULT_CONTEXT_TTL } else { ttl },
        }
    }

    /// Fetch the context for a series, building it on miss via the
    /// supplied constructor (which runs outside the cache lock).
    pub fn get_or_build(
        &self,
        series: &str,
        build: impl FnOnce() -> Result<Context>,
    ) -> Result<Arc<Context>> {
        {
            let mut inner = self.inner.lock();
            if let Some(found) = inner.items.get_mut(series) {
                found.last_used = Instant::now();
                let ctx = found.ctx.clone();
                bump_order(&mut inner.order, series);
                return Ok(ctx);
            }
        }

        let built = Arc::new(build()?);
        let mut inner = self.inner.lock();
        // A racing builder may have inserted meanwhile; keep the first.
        if let Some(found) = inner.items.get_mut(series) {
            found.last_used = Instant::now();
            let ctx = found.ctx.clone();
            bump_order(&mut inner.order, series);
            return Ok(ctx);
        }
        info!(series, "caching new context");
        inner.items.insert(
            series.to_string(),
            ManagedContext {
                ctx: built.clone(),
                last_used: Instant::now(),
            },
        );
        inner.order.push(series.to_string());
        self.enforce_limits(&mut inner);
        Ok(built)
    }

    /// Number of cached contexts (tests).
    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Evict idle entries past the TTL, then trim LRU overflow.
    fn enforce_limits(&self, inner: &mut CacheInner) {
        let now = Instant::now();
        let expired: Vec<String> = inner
            .items
            .iter()
            .filter(|(_, mc)| now.duration_since(mc.last_used) > self.ttl)
            .map(|(k, _)| k.clone())
            .collect();
        for key in &expired {
            inner.items.remove(key);
        }
        inner.order.retain(|k| inner.items.contains_key(k));

        while inner.items.len() > self.max_contexts {
            let oldest = inner
                .order
                .iter()
                .min_by_key(|k| inner.items[k.as_str()].last_used)
                .cloned();
            let Some(oldest) = oldest else { break };
            debug!(series = %oldest, "evicting least recently used context");
            inner.items.remove(&oldest);
            inner.order.retain(|k| k != &oldest);
        }
    }
}

fn bump_order(order: &mut Vec<String>, series: &str) {
    if let Some(pos) = order.iter().position(|s| s == series) {
        let entry = order.remove(pos);
        order.push(entry);
    }
}
