//! Image generation, download and annotation hand-off.
//!
//! The requester owns the external image call: it sizes the request from
//! the enhanced prompt, POSTs it, downloads the returned URL (or decodes
//! the documented `b64_json` fallback), writes the generated PNG and
//! hands the terse prompt to the annotator. Progress transitions happen
//! here, bracketing the actual network activity.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use tracing::{debug, info};

use crate::annotate::ImageAnnotator;
use crate::config::DalleConfig;
use crate::error::{DalleError, Result};
use crate::fsutil;
use crate::openai::{ImageRequest, ImageResponse, provider_error};
use crate::progress::{Phase, ProgressManager};

/// Inputs to one image request, lifted off the dress.
#[derive(Debug, Clone)]
pub struct ImageData {
    pub enhanced_prompt: String,
    pub terse_prompt: String,
    pub series: String,
    pub file_name: String,
    pub address: String,
}

/// How the image bytes were obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadMode {
    Url,
    Base64,
    Placeholder,
}

impl DownloadMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Url => "url",
            Self::Base64 => "b64",
            Self::Placeholder => "placeholder",
        }
    }
}

/// Result bookkeeping the pipeline copies back onto the dress.
#[derive(Debug, Clone)]
pub struct ImageOutcome {
    pub image_url: String,
    pub generated_path: PathBuf,
    pub annotated_path: PathBuf,
    pub mode: DownloadMode,
}

/// Calls the image-generation endpoint and materializes the artifacts.
pub struct ImageRequester {
    client: reqwest::Client,
    config: Arc<DalleConfig>,
    annotator: Arc<dyn ImageAnnotator>,
}

impl ImageRequester {
    pub fn new(
        client: reqwest::Client,
        config: Arc<DalleConfig>,
        annotator: Arc<dyn ImageAnnotator>,
    ) -> Self {
        Self {
            client,
            config,
            annotator,
        }
    }

    /// Request, download and annotate one image. `output_dir` is the
    /// series' `generated` directory; the annotated sibling is derived
    /// from it.
    pub async fn request_image(
        &self,
        output_dir: &Path,
        data: &ImageData,
        progress: &ProgressManager,
    ) -> Result<ImageOutcome> {
        let start = Instant::now();
        let generated_dir = output_dir.to_path_buf();
        let annotated_dir = annotated_sibling(output_dir);
        fsutil::ensure_dir(&generated_dir)?;
        fsutil::ensure_dir(&annotated_dir)?;

        let generated_path = generated_dir.join(format!("{}.png", data.file_name));
        let annotated_path = annotated_dir.join(format!("{}.png", data.file_name));

        let Some(api_key) = self.config.api_key.as_deref() else {
            // Fail open: no credential means an empty placeholder so the
            // pipeline still completes deterministically.
            info!(file = %data.file_name, "no api key, writing placeholder annotated file");
            tokio::fs::write(&annotated_path, b"").await?;
            return Ok(ImageOutcome {
                image_url: String::new(),
                generated_path,
                annotated_path,
                mode: DownloadMode::Placeholder,
            });
        };

        progress.transition(&data.series, &data.address, Phase::ImagePrep);
        let payload = ImageRequest {
            prompt: data.enhanced_prompt.clone(),
            n: 1,
            quality: self.config.quality.clone(),
            model: self.config.image_model.clone(),
            style: "vivid".to_string(),
            size: size_for_prompt(&data.enhanced_prompt).to_string(),
        };
        debug!(file = %data.file_name, size = %payload.size, quality = %payload.quality, "posting image request");

        progress.transition(&data.series, &data.address, Phase::ImageWait);
        let response = self
            .client
            .post(&self.config.image_url)
            .bearer_auth(api_key)
            .timeout(self.config.image_timeout)
            .json(&payload)
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        info!(file = %data.file_name, status = %status, elapsed = ?start.elapsed(), "image request responded");
        if !status.is_success() {
            return Err(provider_error(status.as_u16(), &body));
        }

        let parsed: ImageResponse = serde_json::from_str(&body)
            .map_err(|e| DalleError::invalid_input(format!("malformed image response: {e}")))?;
        let Some(datum) = parsed.data.first() else {
            return Err(DalleError::not_found("no images returned"));
        };

        let (bytes, image_url, mode) = match (&datum.url, &datum.b64_json) {
            (Some(url), _) if !url.is_empty() => {
                debug!(file = %data.file_name, "downloading image");
                let image_response = self
                    .client
                    .get(url)
                    .timeout(self.config.image_timeout)
                    .send()
                    .await?;
                if !image_response.status().is_success() {
                    return Err(provider_error(image_response.status().as_u16(), ""));
                }
                progress.transition(&data.series, &data.address, Phase::ImageDownload);
                let bytes = image_response.bytes().await?;
                (bytes.to_vec(), url.clone(), DownloadMode::Url)
            }
            (_, Some(b64)) if !b64.is_empty() => {
                progress.transition(&data.series, &data.address, Phase::ImageDownload);
                let bytes = BASE64.decode(b64).map_err(|e| {
                    DalleError::invalid_input(format!("undecodable b64_json payload: {e}"))
                })?;
                (bytes, String::new(), DownloadMode::Base64)
            }
            _ => return Err(DalleError::not_found("image datum carries neither url nor b64_json")),
        };

        // Remove-then-create keeps retries safe on platforms where an
        // open handle blocks truncation.
        let _ = tokio::fs::remove_file(&generated_path).await;
        tokio::fs::write(&generated_path, &bytes).await?;

        progress.transition(&data.series, &data.address, Phase::Annotate);
        self.annotator
            .annotate(&data.terse_prompt, &generated_path, &annotated_path)
            .await
            .map_err(|e| match e {
                annotate @ DalleError::AnnotateFailed { .. } => annotate,
                other => DalleError::annotate_failed(other.to_string()),
            })?;
        info!(file = %data.file_name, path = %annotated_path.display(), elapsed = ?start.elapsed(), "image saved");

        Ok(ImageOutcome {
            image_url,
            generated_path,
            annotated_path,
            mode,
        })
    }
}

/// Image size keyed off orientation keywords in the enhanced prompt.
fn size_for_prompt(prompt: &str) -> &'static str {
    if prompt.contains("horizontal") {
        "1792x1024"
    } else if prompt.contains("vertical") {
        "1024x1792"
    } else {
        "1024x1024"
    }
}

/// The `annotated` directory beside a `generated` directory.
fn annotated_sibling(generated: &Path) -> PathBuf {
    match generated.parent() {
        Some(parent) => parent.join("annotated"),
        None => PathBuf::from("annotated"),
    }
}
