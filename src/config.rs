//! Layered configuration for checkloop.
//!
//! Values come from, in increasing precedence:
//!
//! 1. built-in defaults (every field has one)
//! 2. `checkloop.toml`: `--config`, else `./checkloop.toml`, else
//!    `<user config dir>/checkloop/checkloop.toml`
//! 3. `CHECKLOOP_*` environment variables (a `.env` file is loaded first)
//! 4. command-line flags, applied by the caller

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::generation::PathMarkers;
use crate::http::RetryPolicy;

pub const CONFIG_FILE_NAME: &str = "checkloop.toml";

/// Which iteration steps the engine runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineMode {
    /// Real generation and review services.
    Live,
    /// Deterministic fake steps, no upstream services needed.
    #[default]
    Scripted,
}

impl std::fmt::Display for EngineMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Live => write!(f, "live"),
            Self::Scripted => write!(f, "scripted"),
        }
    }
}

impl std::str::FromStr for EngineMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "live" => Ok(Self::Live),
            "scripted" => Ok(Self::Scripted),
            other => bail!("Invalid engine mode '{}': expected 'live' or 'scripted'", other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub host: String,
    pub port: u16,
    pub cors_permissive: bool,
    /// Externally reachable base URL, used for stored preview links.
    /// Defaults to `http://{host}:{port}`.
    pub public_url: Option<String>,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            cors_permissive: false,
            public_url: None,
        }
    }
}

impl ServerSection {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn public_base(&self) -> String {
        self.public_url
            .clone()
            .unwrap_or_else(|| format!("http://{}", self.bind_addr()))
            .trim_end_matches('/')
            .to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSection {
    pub mode: EngineMode,
    /// Per-step delay of the scripted engine.
    pub scripted_delay_ms: u64,
    /// Iteration on which the scripted checker starts passing.
    pub scripted_pass_on: u32,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            mode: EngineMode::default(),
            scripted_delay_ms: 500,
            scripted_pass_on: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySection {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 8_000,
        }
    }
}

impl RetrySection {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSection {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    /// Requested output kind as a file extension.
    pub output_format: String,
    pub poll_interval_ms: u64,
    pub max_poll_attempts: u32,
    pub not_found_retries: u32,
    pub not_found_backoff_ms: u64,
    pub request_timeout_secs: u64,
    pub retry: RetrySection,
    pub markers: PathMarkers,
}

impl Default for GenerationSection {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key: None,
            output_format: "pptx".to_string(),
            poll_interval_ms: 3_000,
            max_poll_attempts: 200,
            not_found_retries: 5,
            not_found_backoff_ms: 2_000,
            request_timeout_secs: 60,
            retry: RetrySection::default(),
            markers: PathMarkers::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewSection {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub model: String,
    pub supports_documents: bool,
    pub request_timeout_secs: u64,
    pub retry: RetrySection,
}

impl Default for ReviewSection {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key: None,
            model: "gpt-4o".to_string(),
            supports_documents: true,
            request_timeout_secs: 120,
            retry: RetrySection::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrySection {
    pub ttl_secs: u64,
    pub sweep_interval_secs: u64,
}

impl Default for RegistrySection {
    fn default() -> Self {
        Self {
            ttl_secs: 24 * 60 * 60,
            sweep_interval_secs: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamSection {
    pub heartbeat_secs: u64,
}

impl Default for StreamSection {
    fn default() -> Self {
        Self { heartbeat_secs: 15 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionSection {
    /// Conversion backend. Previews and PDF review copies are skipped when unset.
    pub base_url: Option<String>,
    pub max_preview_pages: u32,
    pub request_timeout_secs: u64,
}

impl Default for ConversionSection {
    fn default() -> Self {
        Self {
            base_url: None,
            max_preview_pages: 10,
            request_timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    pub artifact_ttl_secs: u64,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            artifact_ttl_secs: 24 * 60 * 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Default filter directive; `RUST_LOG` takes precedence.
    pub level: String,
    pub json: bool,
    /// Directory for daily-rotated log files. Console only when unset.
    pub dir: Option<PathBuf>,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            dir: None,
        }
    }
}

/// The complete checkloop.toml structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerSection,
    pub engine: EngineSection,
    pub generation: GenerationSection,
    pub review: ReviewSection,
    pub registry: RegistrySection,
    pub stream: StreamSection,
    pub conversion: ConversionSection,
    pub storage: StorageSection,
    pub logging: LoggingSection,
}

/// Problems found by [`Config::validate`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationReport {
    /// Prevent the server from starting.
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid config file: {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse checkloop.toml")
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = self.to_toml()?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize checkloop.toml")
    }

    /// Locate the config file: the explicit path (which must exist), else the
    /// working directory, else the user config directory.
    pub fn discover(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
        if let Some(path) = explicit {
            if !path.exists() {
                bail!("Config file not found: {}", path.display());
            }
            return Ok(Some(path.to_path_buf()));
        }
        let local = PathBuf::from(CONFIG_FILE_NAME);
        if local.exists() {
            return Ok(Some(local));
        }
        Ok(Self::user_config_path().filter(|p| p.exists()))
    }

    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("checkloop").join(CONFIG_FILE_NAME))
    }

    /// Load file and environment layers. Returns the config and the file it
    /// came from, if any.
    pub fn resolve(explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>)> {
        let path = Self::discover(explicit)?;
        let mut config = match &path {
            Some(p) => Self::load(p)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok((config, path))
    }

    /// Apply `CHECKLOOP_*` overrides read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("CHECKLOOP_HOST") {
            self.server.host = v;
        }
        if let Some(v) = get("CHECKLOOP_PORT") {
            self.server.port = v
                .trim()
                .parse()
                .with_context(|| format!("CHECKLOOP_PORT is not a valid port: {}", v))?;
        }
        if let Some(v) = get("CHECKLOOP_PUBLIC_URL") {
            self.server.public_url = Some(v);
        }
        if let Some(v) = get("CHECKLOOP_ENGINE_MODE") {
            self.engine.mode = v.parse()?;
        }
        if let Some(v) = get("CHECKLOOP_GENERATION_URL") {
            self.generation.base_url = Some(v);
        }
        if let Some(v) = get("CHECKLOOP_GENERATION_API_KEY") {
            self.generation.api_key = Some(v);
        }
        if let Some(v) = get("CHECKLOOP_REVIEW_URL") {
            self.review.base_url = Some(v);
        }
        if let Some(v) = get("CHECKLOOP_REVIEW_API_KEY") {
            self.review.api_key = Some(v);
        }
        if let Some(v) = get("CHECKLOOP_REVIEW_MODEL") {
            self.review.model = v;
        }
        if let Some(v) = get("CHECKLOOP_CONVERSION_URL") {
            self.conversion.base_url = Some(v);
        }
        if let Some(v) = get("CHECKLOOP_LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Some(v) = get("CHECKLOOP_LOG_JSON") {
            self.logging.json = v != "false" && v != "0";
        }
        Ok(())
    }

    pub fn validate(&self) -> ValidationReport {
        let mut report = ValidationReport::default();

        if self.engine.mode == EngineMode::Live {
            if self.generation.base_url.is_none() {
                report
                    .errors
                    .push("engine.mode = \"live\" requires generation.base_url".to_string());
            }
            if self.review.base_url.is_none() {
                report
                    .errors
                    .push("engine.mode = \"live\" requires review.base_url".to_string());
            }
            if self.generation.api_key.is_none() {
                report
                    .warnings
                    .push("generation.api_key is not set; requests are sent unauthenticated".to_string());
            }
            if self.review.api_key.is_none() {
                report
                    .warnings
                    .push("review.api_key is not set; requests are sent unauthenticated".to_string());
            }
        }
        if self.engine.scripted_pass_on == 0 {
            report
                .errors
                .push("engine.scripted_pass_on must be at least 1".to_string());
        }
        if self.generation.output_format.trim().is_empty() {
            report
                .errors
                .push("generation.output_format must not be empty".to_string());
        }
        if self.generation.max_poll_attempts == 0 {
            report
                .errors
                .push("generation.max_poll_attempts must be at least 1".to_string());
        }
        if self.generation.request_timeout_secs == 0 || self.review.request_timeout_secs == 0 {
            report
                .errors
                .push("request timeouts must be at least 1 second".to_string());
        }
        if self.stream.heartbeat_secs == 0 {
            report
                .errors
                .push("stream.heartbeat_secs must be at least 1".to_string());
        }
        if self.registry.ttl_secs < 60 {
            report.warnings.push(format!(
                "registry.ttl_secs = {} is very short; runs may expire mid-flight",
                self.registry.ttl_secs
            ));
        }
        if self.registry.sweep_interval_secs == 0 {
            report
                .errors
                .push("registry.sweep_interval_secs must be at least 1".to_string());
        }
        for (name, retry) in [("generation", &self.generation.retry), ("review", &self.review.retry)] {
            if retry.initial_backoff_ms > retry.max_backoff_ms {
                report.warnings.push(format!(
                    "{}.retry.initial_backoff_ms exceeds max_backoff_ms",
                    name
                ));
            }
        }
        report
    }

    /// Fail with every validation error joined, if any.
    pub fn ensure_valid(&self) -> Result<()> {
        let report = self.validate();
        if !report.is_ok() {
            bail!("Invalid configuration:\n  - {}", report.errors.join("\n  - "));
        }
        Ok(())
    }

    pub fn registry_ttl(&self) -> Duration {
        Duration::from_secs(self.registry.ttl_secs)
    }

    pub fn artifact_ttl(&self) -> Duration {
        Duration::from_secs(self.storage.artifact_ttl_secs)
    }

    pub fn heartbeat(&self) -> Duration {
        Duration::from_secs(self.stream.heartbeat_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.engine.mode, EngineMode::Scripted);
        assert_eq!(config.stream.heartbeat_secs, 15);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_partial_file_keeps_defaults() {
        let config = Config::parse(
            r#"
            [server]
            port = 8080

            [generation]
            base_url = "https://gen.example.com"
            poll_interval_ms = 1000
            "#,
        )
        .unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.generation.poll_interval_ms, 1000);
        assert_eq!(config.generation.max_poll_attempts, 200);
        assert_eq!(config.generation.markers, PathMarkers::default());
    }

    #[test]
    fn test_parse_rejects_bad_mode() {
        assert!(Config::parse("[engine]\nmode = \"turbo\"").is_err());
    }

    #[test]
    fn test_env_overrides_file() {
        let mut config = Config::parse("[server]\nport = 8080").unwrap();
        config
            .apply_env(env(&[
                ("CHECKLOOP_PORT", "9090"),
                ("CHECKLOOP_ENGINE_MODE", "live"),
                ("CHECKLOOP_GENERATION_API_KEY", "gen-key"),
                ("CHECKLOOP_REVIEW_URL", "https://judge"),
            ]))
            .unwrap();
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.engine.mode, EngineMode::Live);
        assert_eq!(config.generation.api_key.as_deref(), Some("gen-key"));
        assert_eq!(config.review.base_url.as_deref(), Some("https://judge"));
    }

    #[test]
    fn test_env_invalid_port_is_error() {
        let mut config = Config::default();
        let err = config.apply_env(env(&[("CHECKLOOP_PORT", "http")])).unwrap_err();
        assert!(err.to_string().contains("CHECKLOOP_PORT"));
    }

    #[test]
    fn test_live_mode_requires_base_urls() {
        let mut config = Config::default();
        config.engine.mode = EngineMode::Live;
        let report = config.validate();
        assert_eq!(report.errors.len(), 2);
        assert!(config.ensure_valid().is_err());

        config.generation.base_url = Some("https://gen".into());
        config.review.base_url = Some("https://judge".into());
        let report = config.validate();
        assert!(report.is_ok());
        assert_eq!(report.warnings.len(), 2);
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE_NAME);
        let mut config = Config::default();
        config.review.model = "judge-large".into();
        config.conversion.base_url = Some("http://convert:9000".into());
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_discover_explicit_missing_file() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(Config::discover(Some(&missing)).is_err());
    }

    #[test]
    fn test_public_base_defaults_to_bind_addr() {
        let mut server = ServerSection::default();
        assert_eq!(server.public_base(), "http://127.0.0.1:3000");
        server.public_url = Some("https://checkloop.example.com/".into());
        assert_eq!(server.public_base(), "https://checkloop.example.com");
    }
}
