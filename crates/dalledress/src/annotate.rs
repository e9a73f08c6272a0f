//! Image annotation seam.
//!
//! Compositing a caption onto the generated image is an external concern;
//! the pipeline only depends on this capability trait. The default
//! implementation carries the image across unchanged so the pipeline is
//! complete without a compositing toolchain.

use std::path::Path;

use async_trait::async_trait;

use crate::error::{DalleError, Result};

/// Writes an annotated copy of a generated image.
#[async_trait]
pub trait ImageAnnotator: Send + Sync {
    /// Compose `caption` onto the image at `source`, writing the result
    /// to `target`.
    async fn annotate(&self, caption: &str, source: &Path, target: &Path) -> Result<()>;
}

/// Pass-through annotator: copies the generated bytes to the annotated
/// location without compositing.
pub struct CopyAnnotator;

#[async_trait]
impl ImageAnnotator for CopyAnnotator {
    async fn annotate(&self, _caption: &str, source: &Path, target: &Path) -> Result<()> {
        tokio::fs::copy(source, target)
            .await
            .map_err(|e| DalleError::annotate_failed(format!("copying {}: {e}", source.display())))?;
        Ok(())
    }
}
