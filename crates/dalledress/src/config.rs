//! Library configuration and data-directory resolution.
//!
//! All knobs resolve from the environment with sensible defaults so the
//! library works unconfigured; tests construct a config directly against
//! a temp directory instead of touching process-global state.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::warn;

/// Environment variable naming the base data directory.
pub const ENV_DATA_DIR: &str = "TB_DALLE_DATA_DIR";
/// Set to `1` to skip prompt enhancement entirely.
pub const ENV_NO_ENHANCE: &str = "TB_DALLE_NO_ENHANCE";
/// Set to `1` to skip the image-generation phases (used by tests).
pub const ENV_SKIP_IMAGE: &str = "TB_DALLE_SKIP_IMAGE";
/// Set to `1` to archive a JSON snapshot of every finished run.
pub const ENV_ARCHIVE_RUNS: &str = "TB_DALLE_ARCHIVE_RUNS";
/// Override for the chat-completion endpoint (testing).
pub const ENV_CHAT_URL: &str = "TB_DALLE_CHAT_URL";
/// Override for the image-generation endpoint (testing).
pub const ENV_IMAGE_URL: &str = "TB_DALLE_IMAGE_URL";
/// Enhancement timeout override, in seconds.
pub const ENV_ENHANCE_TIMEOUT: &str = "TB_DALLE_ENHANCE_TIMEOUT";
/// Image request/download timeout override, in seconds.
pub const ENV_IMAGE_TIMEOUT: &str = "TB_DALLE_IMAGE_TIMEOUT";
/// Image quality passed to the provider.
pub const ENV_QUALITY: &str = "TB_DALLE_QUALITY";
/// Credential for the external provider.
pub const ENV_API_KEY: &str = "OPENAI_API_KEY";

const DEFAULT_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";
const DEFAULT_IMAGE_URL: &str = "https://api.openai.com/v1/images/generations";
const DEFAULT_CHAT_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_IMAGE_TIMEOUT: Duration = Duration::from_secs(300);

/// Default cap on cached per-series contexts.
pub const DEFAULT_MAX_CONTEXTS: usize = 20;
/// Default idle TTL for cached contexts.
pub const DEFAULT_CONTEXT_TTL: Duration = Duration::from_secs(30 * 60);

/// Resolved configuration for one `Dalle` service instance.
#[derive(Debug, Clone)]
pub struct DalleConfig {
    /// Base directory for series, caches, outputs and metrics.
    pub data_dir: PathBuf,
    /// Provider credential; absent means enhance short-circuits and the
    /// image requester fails open with a placeholder.
    pub api_key: Option<String>,
    /// Chat-completion endpoint.
    pub chat_url: String,
    /// Image-generation endpoint.
    pub image_url: String,
    /// Chat model identifier.
    pub chat_model: String,
    /// Image model identifier.
    pub image_model: String,
    /// Image quality (`standard` unless overridden).
    pub quality: String,
    /// Disables the enhancement call even when a key is present.
    pub enhance_disabled: bool,
    /// Skips the image phases of the pipeline.
    pub skip_image: bool,
    /// Archive a per-run JSON snapshot under `metrics/runs/`.
    pub archive_runs: bool,
    /// Timeout for the chat-completion call.
    pub chat_timeout: Duration,
    /// Timeout for the image request and download.
    pub image_timeout: Duration,
    /// Context cache sizing; zero preserves the default.
    pub max_contexts: usize,
    /// Context cache idle TTL; zero preserves the default.
    pub context_ttl: Duration,
}

impl DalleConfig {
    /// Resolve the whole configuration from the environment.
    pub fn from_env() -> Self {
        Self::with_data_dir(resolve_data_dir(None))
    }

    /// Build a configuration rooted at an explicit data directory, with
    /// every other knob still environment-resolved. The form tests use.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            api_key: env_opt(ENV_API_KEY),
            chat_url: env_or(ENV_CHAT_URL, DEFAULT_CHAT_URL),
            image_url: env_or(ENV_IMAGE_URL, DEFAULT_IMAGE_URL),
            chat_model: "gpt-4".to_string(),
            image_model: "dall-e-3".to_string(),
            quality: env_or(ENV_QUALITY, "standard"),
            enhance_disabled: env_flag(ENV_NO_ENHANCE),
            skip_image: env_flag(ENV_SKIP_IMAGE),
            archive_runs: env_flag(ENV_ARCHIVE_RUNS),
            chat_timeout: env_secs(ENV_ENHANCE_TIMEOUT).unwrap_or(DEFAULT_CHAT_TIMEOUT),
            image_timeout: env_secs(ENV_IMAGE_TIMEOUT).unwrap_or(DEFAULT_IMAGE_TIMEOUT),
            max_contexts: DEFAULT_MAX_CONTEXTS,
            context_ttl: DEFAULT_CONTEXT_TTL,
        }
    }

    pub fn output_dir(&self) -> PathBuf {
        self.data_dir.join("output")
    }

    pub fn series_dir(&self) -> PathBuf {
        self.data_dir.join("series")
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.data_dir.join("cache")
    }

    pub fn metrics_dir(&self) -> PathBuf {
        self.data_dir.join("metrics")
    }
}

/// Resolve the base data directory: explicit value > `TB_DALLE_DATA_DIR` >
/// `<home>/.local/share/trueblocks/dalle`. The chosen directory must be
/// writable; otherwise a process-temp fallback is used so the library
/// never aborts at startup.
pub fn resolve_data_dir(explicit: Option<&Path>) -> PathBuf {
    let mut dir = match explicit {
        Some(p) => p.to_path_buf(),
        None => match env_opt(ENV_DATA_DIR) {
            Some(v) => PathBuf::from(v),
            None => default_data_dir(),
        },
    };
    if dir.is_relative()
        && let Ok(cwd) = std::env::current_dir()
    {
        dir = cwd.join(dir);
    }
    match ensure_writable(&dir) {
        Ok(()) => dir,
        Err(err) => {
            let fallback = std::env::temp_dir().join("dalledress-fallback");
            warn!(
                dir = %dir.display(),
                fallback = %fallback.display(),
                error = %err,
                "data dir not writable, using temp fallback"
            );
            let _ = std::fs::create_dir_all(&fallback);
            fallback
        }
    }
}

fn default_data_dir() -> PathBuf {
    match env_opt("HOME") {
        Some(home) if !home.is_empty() => PathBuf::from(home)
            .join(".local")
            .join("share")
            .join("trueblocks")
            .join("dalle"),
        _ => PathBuf::from("."),
    }
}

/// Ensure a directory exists and accepts writes, probing with a sentinel.
pub fn ensure_writable(path: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(path)?;
    let sentinel = path.join(".write_test");
    std::fs::write(&sentinel, b"ok")?;
    let _ = std::fs::remove_file(&sentinel);
    Ok(())
}

fn env_opt(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn env_or(name: &str, default: &str) -> String {
    env_opt(name).unwrap_or_else(|| default.to_string())
}

fn env_flag(name: &str) -> bool {
    matches!(env_opt(name).as_deref(), Some("1") | Some("true"))
}

fn env_secs(name: &str) -> Option<Duration> {
    env_opt(name)?.parse::<u64>().ok().map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn with_data_dir_uses_defaults() {
        let tmp = TempDir::new().unwrap();
        let cfg = DalleConfig::with_data_dir(tmp.path());
        assert_eq!(cfg.chat_timeout, DEFAULT_CHAT_TIMEOUT);
        assert_eq!(cfg.image_timeout, DEFAULT_IMAGE_TIMEOUT);
        assert_eq!(cfg.quality, "standard");
        assert_eq!(cfg.max_contexts, DEFAULT_MAX_CONTEXTS);
        assert_eq!(cfg.output_dir(), tmp.path().join("output"));
        assert_eq!(cfg.series_dir(), tmp.path().join("series"));
    }

    #[test]
    fn ensure_writable_creates_nested_dirs() {
        let tmp = TempDir::new().unwrap();
        let nested = tmp.path().join("a").join("b");
        assert!(ensure_writable(&nested).is_ok());
        assert!(nested.is_dir());
        assert!(!nested.join(".write_test").exists());
    }

    #[test]
    fn resolve_prefers_explicit_dir() {
        let tmp = TempDir::new().unwrap();
        let dir = resolve_data_dir(Some(&tmp.path().join("explicit")));
        assert!(dir.ends_with("explicit"));
        assert!(dir.is_dir());
    }
}
