//! The composition root and generation orchestrator.
//!
//! A `Dalle` owns every collaborator — configuration, HTTP client,
//! database cache, series store, context cache, singleflight locks,
//! progress manager, enhancer, image requester and annotator — and walks
//! one request through the canonical phases. There are no global
//! singletons: tests build a fresh instance per case.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::annotate::{CopyAnnotator, ImageAnnotator};
use crate::config::DalleConfig;
use crate::context::{Context, ContextCache};
use crate::database::DatabaseCacheManager;
use crate::dress::valid_filename;
use crate::enhance::Enhancer;
use crate::error::{DalleError, Result};
use crate::fsutil;
use crate::image::{ImageData, ImageRequester};
use crate::locks::{SingleflightLocks, normalize_ttl};
use crate::progress::{Phase, ProgressManager};
use crate::series::{SeriesStore, normalize_series_name};

/// Sentinel wrapped around every enhanced prompt before the image call.
const NO_TEXT_GUARD: &str = " DO NOT PUT TEXT IN THE IMAGE. ";

/// The assembled service.
pub struct Dalle {
    config: Arc<DalleConfig>,
    databases: DatabaseCacheManager,
    series_store: SeriesStore,
    contexts: ContextCache,
    locks: SingleflightLocks,
    progress: ProgressManager,
    enhancer: Enhancer,
    images: ImageRequester,
}

impl Dalle {
    /// Assemble a service with the pass-through annotator.
    pub fn new(config: DalleConfig) -> Result<Self> {
        Self::with_annotator(config, Arc::new(CopyAnnotator))
    }

    /// Assemble a service with an injected annotator.
    pub fn with_annotator(config: DalleConfig, annotator: Arc<dyn ImageAnnotator>) -> Result<Self> {
        let config = Arc::new(config);
        let client = reqwest::Client::new();
        let databases = DatabaseCacheManager::new(config.cache_dir());
        if let Err(err) = databases.load_or_build() {
            warn!(error = %err, "database cache unavailable, serving from embedded archive");
        }
        let series_store = SeriesStore::new(config.series_dir(), config.output_dir());
        let contexts = ContextCache::new(config.max_contexts, config.context_ttl);
        let progress = ProgressManager::new(config.metrics_dir(), config.archive_runs);
        let enhancer = Enhancer::new(client.clone(), config.clone());
        let images = ImageRequester::new(client, config.clone(), annotator);
        Ok(Self {
            config,
            databases,
            series_store,
            contexts,
            locks: SingleflightLocks::new(),
            progress,
            enhancer,
            images,
        })
    }

    pub fn config(&self) -> &DalleConfig {
        &self.config
    }

    pub fn progress(&self) -> &ProgressManager {
        &self.progress
    }

    pub fn series_store(&self) -> &SeriesStore {
        &self.series_store
    }

    pub fn databases(&self) -> &DatabaseCacheManager {
        &self.databases
    }

    /// Number of live cached contexts (tests).
    pub fn context_count(&self) -> usize {
        self.contexts.len()
    }

    /// Suffixes of the series configured on disk.
    pub fn list_series(&self) -> Vec<String> {
        self.series_store.list_series()
    }

    /// Whether a series is acceptable given an optional allow list.
    pub fn is_valid_series(series: &str, list: &[String]) -> bool {
        list.is_empty() || list.iter().any(|s| s == series)
    }

    /// Generate (or short-circuit to) the annotated image for an address
    /// within a series. Returns the deterministic annotated path; its
    /// absence after an error is the external failure signal.
    pub async fn generate_annotated_image(
        &self,
        series: &str,
        address: &str,
        skip_image: bool,
        lock_ttl: Duration,
    ) -> Result<PathBuf> {
        if address.is_empty() {
            return Err(DalleError::invalid_input("address required"));
        }
        let series = normalize_series_name(series);
        let skip_image = skip_image || self.config.skip_image;
        self.locks.sweep();
        let lock_ttl = normalize_ttl(lock_ttl);

        let annotated_path = self
            .config
            .output_dir()
            .join(&series)
            .join("annotated")
            .join(format!("{}.png", valid_filename(address)));

        // Fast path: the artifact already exists and nobody is working on
        // it. Emit a minimal completed cache-hit run for observers.
        if annotated_path.is_file() && !self.progress.has_run(&series, address) {
            info!(series = %series, address, "annotated image already exists");
            let ctx = self.get_context(&series)?;
            let dress = ctx.make_dalle_dress(address)?;
            self.progress.start_run(&series, address, dress);
            self.progress.mark_cache_hit(&series, address);
            self.progress.transition(&series, address, Phase::BasePrompts);
            let path_str = annotated_path.display().to_string();
            self.progress.update_dress(&series, address, |d| {
                d.cache_hit = true;
                d.completed = true;
                d.annotated_path = path_str;
            });
            self.progress.complete(&series, address);
            return Ok(annotated_path);
        }

        let key = format!("{series}:{address}");
        if !self.locks.acquire(&key, lock_ttl) {
            info!(series = %series, address, "generation already in flight");
            return Ok(annotated_path);
        }
        let result = self
            .run_generation(&series, address, skip_image, &annotated_path)
            .await;
        self.locks.release(&key);
        result
    }

    async fn run_generation(
        &self,
        series: &str,
        address: &str,
        skip_image: bool,
        annotated_path: &Path,
    ) -> Result<PathBuf> {
        let ctx = self.get_context(series)?;
        let dress = ctx.make_dalle_dress(address)?;
        self.progress.start_run(series, address, dress.clone());
        self.progress.transition(series, address, Phase::BasePrompts);

        let outcome = self
            .advance_phases(&ctx, series, address, skip_image, annotated_path)
            .await;
        if let Err(err) = outcome {
            warn!(series, address, error = %err, "generation failed");
            self.progress.fail(series, address, &err.to_string());
            return Err(err);
        }

        self.progress.update_dress(series, address, |d| {
            d.completed = true;
        });
        self.progress.transition(series, address, Phase::Completed);
        self.progress.complete(series, address);
        info!(series, address, path = %annotated_path.display(), "generation finished");
        Ok(annotated_path.to_path_buf())
    }

    async fn advance_phases(
        &self,
        ctx: &Context,
        series: &str,
        address: &str,
        skip_image: bool,
        annotated_path: &Path,
    ) -> Result<()> {
        if skip_image {
            self.progress.skip(series, address, Phase::EnhancePrompt);
            self.progress.skip(series, address, Phase::ImagePrep);
            self.progress.skip(series, address, Phase::ImageWait);
            self.progress.skip(series, address, Phase::ImageDownload);
            self.progress.transition(series, address, Phase::Annotate);
            fsutil::ensure_parent_dir(annotated_path)?;
            tokio::fs::write(annotated_path, b"").await?;
            return Ok(());
        }

        let mut dress = ctx.make_dalle_dress(address)?;
        self.progress.transition(series, address, Phase::EnhancePrompt);
        let author = ctx.renderer.author(&dress);
        let enhanced = self.enhancer.enhance(&dress.prompt, &author).await?;
        let enhanced = format!("{NO_TEXT_GUARD}{enhanced}{NO_TEXT_GUARD}");
        dress.enhanced_prompt = enhanced.clone();
        ctx.report_on(&dress, "enhanced", "txt", &enhanced);
        ctx.report_on(&dress, "selector", "json", &dress.to_json());
        self.progress.update_dress(series, address, |d| {
            d.enhanced_prompt = enhanced.clone();
        });

        let data = ImageData {
            enhanced_prompt: dress.enhanced_prompt.clone(),
            terse_prompt: dress.terse_prompt.clone(),
            series: series.to_string(),
            file_name: dress.file_name.clone(),
            address: address.to_string(),
        };
        let generated_dir = self.config.output_dir().join(series).join("generated");
        let outcome = self
            .images
            .request_image(&generated_dir, &data, &self.progress)
            .await?;
        self.progress.update_dress(series, address, |d| {
            d.image_url = outcome.image_url.clone();
            d.generated_path = outcome.generated_path.display().to_string();
            d.annotated_path = outcome.annotated_path.display().to_string();
            d.download_mode = outcome.mode.as_str().to_string();
        });
        Ok(())
    }

    fn get_context(&self, series: &str) -> Result<Arc<Context>> {
        self.contexts
            .get_or_build(series, || self.build_context(series))
    }

    /// Construct the per-series context: load (or default) the series
    /// JSON, then reload its filtered databases.
    fn build_context(&self, series: &str) -> Result<Context> {
        let series = self.series_store.load_series(series)?;
        let mut databases = std::collections::HashMap::new();
        for name in crate::attribute::DATABASE_ORDER {
            let index = match self.databases.get_database(name) {
                Ok(index) => index,
                // Historical archives carried `viewpoints` where the
                // canonical name is `orientations`.
                Err(DalleError::NotFound { .. }) if name == "orientations" => {
                    warn!("orientations database missing, falling back to viewpoints");
                    self.databases.get_database("viewpoints")?
                }
                Err(err) => return Err(err),
            };
            let filtered = index.lines_filtered(series.filter_for(name));
            databases.insert(name.to_string(), filtered);
        }
        info!(series = %series.suffix, count = databases.len(), "loaded databases for series");
        Ok(Context::new(series, databases, self.config.output_dir()))
    }
}
