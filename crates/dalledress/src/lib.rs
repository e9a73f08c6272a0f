//! # dalledress
//!
//! Deterministic, address-seeded AI image generation.
//!
//! Given a 64-hex-character address and a series name, the library
//! derives a reproducible attribute set from the address bytes, renders a
//! family of text prompts, optionally enhances the main prompt through a
//! chat-completion endpoint, requests an image from an image-generation
//! endpoint, downloads it, annotates it with a caption and records
//! per-phase progress with long-running EMA timing statistics.
//!
//! The entry point is [`Dalle`]: a composition root owning the database
//! cache, series store, context cache, singleflight locks and progress
//! manager. One call drives the whole pipeline:
//!
//! ```no_run
//! use dalledress::{Dalle, DalleConfig};
//! use std::time::Duration;
//!
//! # async fn demo() -> dalledress::Result<()> {
//! let dalle = Dalle::new(DalleConfig::from_env())?;
//! let path = dalle
//!     .generate_annotated_image("empty", &format!("0x{}", "ab".repeat(32)), false, Duration::ZERO)
//!     .await?;
//! println!("annotated image at {}", path.display());
//! # Ok(())
//! # }
//! ```

pub mod annotate;
pub mod archive;
pub mod attribute;
pub mod config;
pub mod context;
pub mod database;
pub mod dress;
pub mod enhance;
pub mod error;
mod fsutil;
pub mod image;
pub mod locks;
pub mod openai;
pub mod pipeline;
pub mod progress;
pub mod prompt;
pub mod series;

pub use annotate::{CopyAnnotator, ImageAnnotator};
pub use attribute::{Attribute, DATABASE_ORDER, SLOT_COUNT, SLOT_TABLE};
pub use config::DalleConfig;
pub use context::{Context, ContextCache};
pub use database::{DatabaseCacheManager, DatabaseIndex, DatabaseRecord};
pub use dress::DalleDress;
pub use error::{DalleError, Result};
pub use pipeline::Dalle;
pub use progress::{ORDERED_PHASES, Phase, ProgressManager, ProgressReport};
pub use series::{Series, SeriesStore};
