//! Configuration management for Crosscast

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::SecretString;

use crate::error::{BackendError, BackendResult, ConfigError, Result};
use crate::orchestrator::ConcurrencyMode;
use crate::upload::poller::{PollerConfig, DEFAULT_MAX_WAIT, DEFAULT_POLL_INTERVAL};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub defaults: DefaultsConfig,
    #[serde(default)]
    pub processing: ProcessingConfig,
    #[serde(default)]
    pub media: MediaConfig,
    pub alpha: Option<AlphaConfig>,
    pub beta: Option<BetaConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Backends to publish to when none are named; empty means all enabled
    #[serde(default)]
    pub backends: Vec<String>,
    #[serde(default)]
    pub mode: ConcurrencyMode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingConfig {
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_max_wait_secs")]
    pub max_wait_secs: u64,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            max_wait_secs: default_max_wait_secs(),
        }
    }
}

fn default_poll_interval_secs() -> u64 {
    DEFAULT_POLL_INTERVAL.as_secs()
}

fn default_max_wait_secs() -> u64 {
    DEFAULT_MAX_WAIT.as_secs()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: String,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: default_ffmpeg_path(),
        }
    }
}

fn default_ffmpeg_path() -> String {
    "ffmpeg".to_string()
}

/// Image, link and fixed-chunk video backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlphaConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub api_base: String,
    pub token_file: String,
    #[serde(default = "default_alpha_max_images")]
    pub max_images: usize,
    pub max_video_bytes: Option<u64>,
    /// Size of each uploaded video segment
    #[serde(default = "default_video_chunk_bytes")]
    pub video_chunk_bytes: u64,
    /// Remux videos with ffmpeg (faststart) before uploading
    #[serde(default)]
    pub remux_video: bool,
    /// Cut post text to `ALPHA_MAX_TEXT_CHARS` characters
    #[serde(default)]
    pub truncate_text: bool,
}

impl AlphaConfig {
    pub fn new(api_base: impl Into<String>, token_file: impl Into<String>) -> Self {
        Self {
            enabled: true,
            api_base: api_base.into(),
            token_file: token_file.into(),
            max_images: default_alpha_max_images(),
            max_video_bytes: None,
            video_chunk_bytes: default_video_chunk_bytes(),
            remux_video: false,
            truncate_text: false,
        }
    }
}

/// Image, link and server-planned chunked video backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BetaConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub api_base: String,
    pub token_file: String,
    #[serde(default = "default_beta_max_images")]
    pub max_images: usize,
    pub max_video_bytes: Option<u64>,
    /// Remux videos with ffmpeg (faststart) before uploading
    #[serde(default)]
    pub remux_video: bool,
}

impl BetaConfig {
    pub fn new(api_base: impl Into<String>, token_file: impl Into<String>) -> Self {
        Self {
            enabled: true,
            api_base: api_base.into(),
            token_file: token_file.into(),
            max_images: default_beta_max_images(),
            max_video_bytes: None,
            remux_video: false,
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_alpha_max_images() -> usize {
    4
}

fn default_beta_max_images() -> usize {
    9
}

fn default_video_chunk_bytes() -> u64 {
    4 * 1024 * 1024
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).map_err(ConfigError::ParseError)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.processing.poll_interval_secs == 0 {
            return Err(ConfigError::MissingField(
                "processing.poll_interval_secs must be greater than zero".to_string(),
            )
            .into());
        }
        if let Some(alpha) = &self.alpha {
            if alpha.api_base.trim().is_empty() {
                return Err(ConfigError::MissingField("alpha.api_base".to_string()).into());
            }
        }
        if let Some(beta) = &self.beta {
            if beta.api_base.trim().is_empty() {
                return Err(ConfigError::MissingField("beta.api_base".to_string()).into());
            }
        }
        Ok(())
    }

    /// Enabled backend names, alpha first
    pub fn enabled_backends(&self) -> Vec<String> {
        let mut names = Vec::new();
        if self.alpha.as_ref().is_some_and(|a| a.enabled) {
            names.push("alpha".to_string());
        }
        if self.beta.as_ref().is_some_and(|b| b.enabled) {
            names.push("beta".to_string());
        }
        names
    }

    /// Backends targeted when the caller names none
    pub fn default_targets(&self) -> Vec<String> {
        if self.defaults.backends.is_empty() {
            self.enabled_backends()
        } else {
            self.defaults.backends.clone()
        }
    }

    pub fn poller_config(&self) -> PollerConfig {
        PollerConfig {
            poll_interval: Duration::from_secs(self.processing.poll_interval_secs),
            max_wait: Duration::from_secs(self.processing.max_wait_secs),
        }
    }

    /// Create a default configuration
    pub fn default_config() -> Self {
        Self {
            alpha: Some(AlphaConfig::new(
                "https://alpha.example.com/api",
                "~/.config/crosscast/alpha.token",
            )),
            beta: Some(BetaConfig::new(
                "https://beta.example.com/api",
                "~/.config/crosscast/beta.token",
            )),
            ..Default::default()
        }
    }
}

/// Read a bearer token from `token_file` (tilde expanded)
///
/// # Errors
///
/// Returns `BackendError::Authentication` if the file cannot be read or
/// contains only whitespace.
pub fn read_token(backend: &str, token_file: &str) -> BackendResult<SecretString> {
    let path = PathBuf::from(shellexpand::tilde(token_file).to_string());
    let content = std::fs::read_to_string(&path).map_err(|e| {
        BackendError::Authentication(format!(
            "Failed to read {} token file {}: {}",
            backend,
            path.display(),
            e
        ))
    })?;

    let token = content.trim();
    if token.is_empty() {
        return Err(BackendError::Authentication(format!(
            "{} token file {} is empty",
            backend,
            path.display()
        )));
    }

    Ok(SecretString::from(token.to_string()))
}

/// Resolve the configuration file path (XDG config dir unless overridden)
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("CROSSCAST_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("crosscast").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CrosscastError;
    use secrecy::ExposeSecret;
    use serial_test::serial;
    use std::io::Write;

    const FULL: &str = r#"
[defaults]
backends = ["beta"]
mode = "sequential"

[processing]
poll_interval_secs = 2
max_wait_secs = 60

[media]
ffmpeg_path = "/usr/local/bin/ffmpeg"

[alpha]
api_base = "https://alpha.test/api"
token_file = "/tmp/alpha.token"
max_images = 2
video_chunk_bytes = 65536
truncate_text = true

[beta]
enabled = false
api_base = "https://beta.test/api"
token_file = "/tmp/beta.token"
max_images = 6
max_video_bytes = 1048576
remux_video = true
"#;

    #[test]
    fn test_parse_full_config() {
        let config = Config::parse(FULL).unwrap();

        assert_eq!(config.defaults.backends, vec!["beta"]);
        assert_eq!(config.defaults.mode, ConcurrencyMode::Sequential);
        assert_eq!(config.media.ffmpeg_path, "/usr/local/bin/ffmpeg");

        let alpha = config.alpha.as_ref().unwrap();
        assert!(alpha.enabled);
        assert_eq!(alpha.max_images, 2);
        assert_eq!(alpha.video_chunk_bytes, 65536);
        assert!(alpha.truncate_text);
        assert!(!alpha.remux_video);

        let beta = config.beta.as_ref().unwrap();
        assert!(!beta.enabled);
        assert_eq!(beta.max_images, 6);
        assert_eq!(beta.max_video_bytes, Some(1048576));
        assert!(beta.remux_video);

        let poller = config.poller_config();
        assert_eq!(poller.poll_interval, Duration::from_secs(2));
        assert_eq!(poller.max_wait, Duration::from_secs(60));
    }

    #[test]
    fn test_defaults_apply_to_minimal_config() {
        let config = Config::parse(
            r#"
[alpha]
api_base = "https://alpha.test"
token_file = "t"
"#,
        )
        .unwrap();

        assert_eq!(config.defaults.mode, ConcurrencyMode::Parallel);
        assert_eq!(config.processing.poll_interval_secs, 5);
        assert_eq!(config.processing.max_wait_secs, 300);
        assert_eq!(config.media.ffmpeg_path, "ffmpeg");
        let alpha = config.alpha.as_ref().unwrap();
        assert_eq!(alpha.max_images, 4);
        assert_eq!(alpha.video_chunk_bytes, 4 * 1024 * 1024);
        assert!(!alpha.truncate_text);
        assert!(config.beta.is_none());
    }

    #[test]
    fn test_enabled_backends_order() {
        let config = Config::default_config();
        assert_eq!(config.enabled_backends(), vec!["alpha", "beta"]);

        let config = Config::parse(FULL).unwrap();
        assert_eq!(config.enabled_backends(), vec!["alpha"]);
        assert_eq!(config.default_targets(), vec!["beta"]);
    }

    #[test]
    fn test_empty_config_enables_nothing() {
        let config = Config::parse("").unwrap();
        assert!(config.enabled_backends().is_empty());
        assert!(config.default_targets().is_empty());
    }

    #[test]
    fn test_invalid_toml() {
        let result = Config::parse("[alpha\napi_base = ");
        assert!(matches!(
            result,
            Err(CrosscastError::Config(ConfigError::ParseError(_)))
        ));
    }

    #[test]
    fn test_zero_poll_interval_rejected() {
        let result = Config::parse("[processing]\npoll_interval_secs = 0\n");
        assert!(matches!(
            result,
            Err(CrosscastError::Config(ConfigError::MissingField(_)))
        ));
    }

    #[test]
    fn test_missing_file() {
        let result = Config::load_from_path(Path::new("/nonexistent/crosscast/config.toml"));
        assert!(matches!(
            result,
            Err(CrosscastError::Config(ConfigError::ReadError(_)))
        ));
    }

    #[test]
    fn test_read_token_trims() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "  secret-token  ").unwrap();

        let token = read_token("alpha", file.path().to_str().unwrap()).unwrap();
        assert_eq!(token.expose_secret(), "secret-token");
    }

    #[test]
    fn test_read_token_empty_is_auth_error() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let err = read_token("beta", file.path().to_str().unwrap()).unwrap_err();
        assert!(matches!(err, BackendError::Authentication(_)));
        assert!(err.to_string().contains("empty"));
    }

    #[test]
    fn test_read_token_missing_is_auth_error() {
        let err = read_token("beta", "/nonexistent/beta.token").unwrap_err();
        assert!(matches!(err, BackendError::Authentication(_)));
    }

    #[test]
    #[serial]
    fn test_config_path_from_env() {
        std::env::set_var("CROSSCAST_CONFIG", "/tmp/custom/crosscast.toml");
        let path = resolve_config_path().unwrap();
        std::env::remove_var("CROSSCAST_CONFIG");

        assert_eq!(path, PathBuf::from("/tmp/custom/crosscast.toml"));
    }

    #[test]
    #[serial]
    fn test_config_path_default() {
        std::env::remove_var("CROSSCAST_CONFIG");
        let path = resolve_config_path().unwrap();
        assert!(path.ends_with("crosscast/config.toml"));
    }
}
