use anyhow::{anyhow, Context, Result};
use lettre::message::Mailbox;
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;
use zeroize::Zeroizing;

pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.5;
const DEFAULT_SMTP_PORT: u16 = 465;
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_VIDEO_INPUT: &str = "video.mp4";
const DEFAULT_VIDEO_OUTPUT: &str = "output_video.mp4";
const DEFAULT_LOG_PATH: &str = "log.txt";

const ENV_KEYS: &[&str] = &[
    "VISIONGUARD_ENDPOINT",
    "VISIONGUARD_KEY",
    "VISIONGUARD_THRESHOLD",
    "VISIONGUARD_TIMEOUT_SECS",
    "VISIONGUARD_SMTP_HOST",
    "VISIONGUARD_SMTP_PORT",
    "VISIONGUARD_SMTP_USER",
    "VISIONGUARD_SMTP_PASSWORD",
    "VISIONGUARD_SMTP_FROM",
    "VISIONGUARD_RECIPIENT",
    "VISIONGUARD_INPUT",
    "VISIONGUARD_OUTPUT",
    "VISIONGUARD_LOG",
];

/// Environment variables read by `PipelineConfig::load`, besides `VISIONGUARD_CONFIG`.
pub fn env_keys() -> &'static [&'static str] {
    ENV_KEYS
}

// ----------------------------------------------------------------------------
// Secrets
// ----------------------------------------------------------------------------

/// A credential that is zeroized on drop and never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(Zeroizing<String>);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(Zeroizing::new(value.into()))
    }

    pub fn expose(&self) -> &str {
        self.0.as_str()
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

// ----------------------------------------------------------------------------
// File layer
// ----------------------------------------------------------------------------

#[derive(Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    inference: Option<InferenceConfigFile>,
    confidence_threshold: Option<f64>,
    smtp: Option<SmtpConfigFile>,
    recipient: Option<String>,
    paths: Option<PathsConfigFile>,
}

#[derive(Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct InferenceConfigFile {
    endpoint: Option<String>,
    key: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct SmtpConfigFile {
    host: Option<String>,
    port: Option<u16>,
    user: Option<String>,
    password: Option<String>,
    from: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PathsConfigFile {
    video_input: Option<String>,
    video_output: Option<String>,
    log: Option<PathBuf>,
}

// ----------------------------------------------------------------------------
// Resolved configuration
// ----------------------------------------------------------------------------

/// Everything one pipeline run needs, resolved and validated up front.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub inference: InferenceSettings,
    /// Predictions at or above this probability are kept.
    pub confidence_threshold: f64,
    pub smtp: SmtpSettings,
    /// The single address alerts are delivered to.
    pub recipient: String,
    pub paths: PathSettings,
}

#[derive(Debug, Clone)]
pub struct InferenceSettings {
    pub endpoint: Url,
    pub key: Secret,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: Secret,
    /// Sender mailbox; defaults to `user`.
    pub from: String,
}

#[derive(Debug, Clone)]
pub struct PathSettings {
    pub video_input: String,
    pub video_output: String,
    pub log_path: PathBuf,
}

/// Command-line values that win over file and environment.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub endpoint: Option<String>,
    pub confidence_threshold: Option<f64>,
    pub video_input: Option<String>,
    pub video_output: Option<String>,
    pub log_path: Option<PathBuf>,
}

impl PipelineConfig {
    /// Load from `VISIONGUARD_CONFIG` (if set) and the environment.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("VISIONGUARD_CONFIG")
            .ok()
            .filter(|path| !path.trim().is_empty());
        Self::load_from(config_path.as_deref().map(Path::new))
    }

    /// Load from an explicit config file (if any), then apply the environment.
    pub fn load_from(config_path: Option<&Path>) -> Result<Self> {
        Self::load_with(config_path, &ConfigOverrides::default())
    }

    /// Full layering: file, then environment, then `overrides`, then validation.
    pub fn load_with(config_path: Option<&Path>, overrides: &ConfigOverrides) -> Result<Self> {
        let file_cfg = match config_path {
            Some(path) => read_config_file(path)?,
            None => ConfigFile::default(),
        };
        let mut layers = ConfigLayers::from_file(file_cfg);
        layers.apply_env()?;
        layers.apply_overrides(overrides);
        let cfg = layers.resolve()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Check every field. Called at load and again before a run opens anything.
    pub fn validate(&self) -> Result<()> {
        match self.inference.endpoint.scheme() {
            "http" | "https" => {}
            other => {
                return Err(anyhow!(
                    "inference endpoint must use http or https, got '{}'",
                    other
                ))
            }
        }
        if self.inference.key.is_empty() {
            return Err(anyhow!("inference key must not be empty"));
        }
        if self.inference.timeout.is_zero() {
            return Err(anyhow!("inference timeout must be greater than zero"));
        }
        if !self.confidence_threshold.is_finite()
            || !(0.0..=1.0).contains(&self.confidence_threshold)
        {
            return Err(anyhow!(
                "confidence threshold must be within 0..=1, got {}",
                self.confidence_threshold
            ));
        }
        if self.smtp.host.trim().is_empty() {
            return Err(anyhow!("smtp host must not be empty"));
        }
        if self.smtp.port == 0 {
            return Err(anyhow!("smtp port must be greater than zero"));
        }
        if self.smtp.user.trim().is_empty() {
            return Err(anyhow!("smtp user must not be empty"));
        }
        if self.smtp.password.is_empty() {
            return Err(anyhow!("smtp password must not be empty"));
        }
        self.smtp
            .from
            .parse::<Mailbox>()
            .map_err(|e| anyhow!("smtp sender '{}' is not a mailbox: {}", self.smtp.from, e))?;
        self.recipient
            .parse::<Mailbox>()
            .map_err(|e| anyhow!("recipient '{}' is not a mailbox: {}", self.recipient, e))?;
        if self.paths.video_input.trim().is_empty() {
            return Err(anyhow!("video input path must not be empty"));
        }
        if self.paths.video_output.trim().is_empty() {
            return Err(anyhow!("video output path must not be empty"));
        }
        if self.paths.log_path.as_os_str().is_empty() {
            return Err(anyhow!("log path must not be empty"));
        }
        Ok(())
    }
}

/// Partially specified settings, merged layer by layer.
#[derive(Default)]
struct ConfigLayers {
    endpoint: Option<String>,
    key: Option<String>,
    timeout_secs: Option<u64>,
    confidence_threshold: Option<f64>,
    smtp_host: Option<String>,
    smtp_port: Option<u16>,
    smtp_user: Option<String>,
    smtp_password: Option<String>,
    smtp_from: Option<String>,
    recipient: Option<String>,
    video_input: Option<String>,
    video_output: Option<String>,
    log_path: Option<PathBuf>,
}

impl ConfigLayers {
    fn from_file(file: ConfigFile) -> Self {
        let inference = file.inference.unwrap_or_default();
        let smtp = file.smtp.unwrap_or_default();
        let paths = file.paths.unwrap_or_default();
        Self {
            endpoint: inference.endpoint,
            key: inference.key,
            timeout_secs: inference.timeout_secs,
            confidence_threshold: file.confidence_threshold,
            smtp_host: smtp.host,
            smtp_port: smtp.port,
            smtp_user: smtp.user,
            smtp_password: smtp.password,
            smtp_from: smtp.from,
            recipient: file.recipient,
            video_input: paths.video_input,
            video_output: paths.video_output,
            log_path: paths.log,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        set_from_env(&mut self.endpoint, "VISIONGUARD_ENDPOINT");
        set_from_env(&mut self.key, "VISIONGUARD_KEY");
        set_from_env(&mut self.smtp_host, "VISIONGUARD_SMTP_HOST");
        set_from_env(&mut self.smtp_user, "VISIONGUARD_SMTP_USER");
        set_from_env(&mut self.smtp_password, "VISIONGUARD_SMTP_PASSWORD");
        set_from_env(&mut self.smtp_from, "VISIONGUARD_SMTP_FROM");
        set_from_env(&mut self.recipient, "VISIONGUARD_RECIPIENT");
        set_from_env(&mut self.video_input, "VISIONGUARD_INPUT");
        set_from_env(&mut self.video_output, "VISIONGUARD_OUTPUT");
        if let Some(log) = non_empty_env("VISIONGUARD_LOG") {
            self.log_path = Some(PathBuf::from(log));
        }
        if let Some(threshold) = non_empty_env("VISIONGUARD_THRESHOLD") {
            let value: f64 = threshold
                .trim()
                .parse()
                .map_err(|_| anyhow!("VISIONGUARD_THRESHOLD must be a number"))?;
            self.confidence_threshold = Some(value);
        }
        if let Some(timeout) = non_empty_env("VISIONGUARD_TIMEOUT_SECS") {
            let value: u64 = timeout.trim().parse().map_err(|_| {
                anyhow!("VISIONGUARD_TIMEOUT_SECS must be an integer number of seconds")
            })?;
            self.timeout_secs = Some(value);
        }
        if let Some(port) = non_empty_env("VISIONGUARD_SMTP_PORT") {
            let value: u16 = port
                .trim()
                .parse()
                .map_err(|_| anyhow!("VISIONGUARD_SMTP_PORT must be a port number"))?;
            self.smtp_port = Some(value);
        }
        Ok(())
    }

    fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(endpoint) = &overrides.endpoint {
            self.endpoint = Some(endpoint.clone());
        }
        if let Some(threshold) = overrides.confidence_threshold {
            self.confidence_threshold = Some(threshold);
        }
        if let Some(input) = &overrides.video_input {
            self.video_input = Some(input.clone());
        }
        if let Some(output) = &overrides.video_output {
            self.video_output = Some(output.clone());
        }
        if let Some(log) = &overrides.log_path {
            self.log_path = Some(log.clone());
        }
    }

    fn resolve(self) -> Result<PipelineConfig> {
        let endpoint = self
            .endpoint
            .ok_or_else(|| missing("inference endpoint", "VISIONGUARD_ENDPOINT"))?;
        let endpoint = Url::parse(endpoint.trim())
            .with_context(|| format!("inference endpoint '{}' is not a URL", endpoint))?;
        let key = self
            .key
            .ok_or_else(|| missing("inference key", "VISIONGUARD_KEY"))?;
        let smtp_host = self
            .smtp_host
            .ok_or_else(|| missing("smtp host", "VISIONGUARD_SMTP_HOST"))?;
        let smtp_user = self
            .smtp_user
            .ok_or_else(|| missing("smtp user", "VISIONGUARD_SMTP_USER"))?;
        let smtp_password = self
            .smtp_password
            .ok_or_else(|| missing("smtp password", "VISIONGUARD_SMTP_PASSWORD"))?;
        let recipient = self
            .recipient
            .ok_or_else(|| missing("recipient", "VISIONGUARD_RECIPIENT"))?;
        let smtp_from = self.smtp_from.unwrap_or_else(|| smtp_user.clone());

        Ok(PipelineConfig {
            inference: InferenceSettings {
                endpoint,
                key: Secret::new(key),
                timeout: Duration::from_secs(self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)),
            },
            confidence_threshold: self
                .confidence_threshold
                .unwrap_or(DEFAULT_CONFIDENCE_THRESHOLD),
            smtp: SmtpSettings {
                host: smtp_host,
                port: self.smtp_port.unwrap_or(DEFAULT_SMTP_PORT),
                user: smtp_user,
                password: Secret::new(smtp_password),
                from: smtp_from,
            },
            recipient,
            paths: PathSettings {
                video_input: self
                    .video_input
                    .unwrap_or_else(|| DEFAULT_VIDEO_INPUT.to_string()),
                video_output: self
                    .video_output
                    .unwrap_or_else(|| DEFAULT_VIDEO_OUTPUT.to_string()),
                log_path: self
                    .log_path
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_PATH)),
            },
        })
    }
}

fn missing(what: &str, env_key: &str) -> anyhow::Error {
    anyhow!(
        "{} is not configured (set it in the config file or {})",
        what,
        env_key
    )
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

fn set_from_env(slot: &mut Option<String>, key: &str) {
    if let Some(value) = non_empty_env(key) {
        *slot = Some(value);
    }
}

fn read_config_file(path: &Path) -> Result<ConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg: ConfigFile = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> PipelineConfig {
        PipelineConfig {
            inference: InferenceSettings {
                endpoint: Url::parse("https://vision.example.com/predict").unwrap(),
                key: Secret::new("prediction-key"),
                timeout: Duration::from_secs(5),
            },
            confidence_threshold: 0.5,
            smtp: SmtpSettings {
                host: "smtp.example.com".to_string(),
                port: 465,
                user: "guard@example.com".to_string(),
                password: Secret::new("hunter2"),
                from: "guard@example.com".to_string(),
            },
            recipient: "security@example.com".to_string(),
            paths: PathSettings {
                video_input: "video.mp4".to_string(),
                video_output: "out.mp4".to_string(),
                log_path: PathBuf::from("log.txt"),
            },
        }
    }

    #[test]
    fn accepts_complete_config() {
        valid().validate().unwrap();
    }

    #[test]
    fn rejects_threshold_outside_unit_interval() {
        for bad in [-0.1, 1.01, f64::NAN, f64::INFINITY] {
            let mut cfg = valid();
            cfg.confidence_threshold = bad;
            assert!(cfg.validate().is_err(), "threshold {}", bad);
        }
        let mut cfg = valid();
        cfg.confidence_threshold = 1.0;
        cfg.validate().unwrap();
    }

    #[test]
    fn rejects_bad_endpoint_scheme_and_empty_key() {
        let mut cfg = valid();
        cfg.inference.endpoint = Url::parse("ftp://vision.example.com").unwrap();
        assert!(cfg.validate().is_err());

        let mut cfg = valid();
        cfg.inference.key = Secret::new("  ");
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_invalid_recipient() {
        let mut cfg = valid();
        cfg.recipient = "not an address".to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let rendered = format!("{:?}", valid());
        assert!(!rendered.contains("prediction-key"));
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("Secret(***)"));
    }

    #[test]
    fn resolve_requires_endpoint() {
        let layers = ConfigLayers {
            key: Some("k".to_string()),
            ..ConfigLayers::default()
        };
        let err = layers.resolve().err().unwrap();
        assert!(err.to_string().contains("VISIONGUARD_ENDPOINT"));
    }

    #[test]
    fn resolve_fills_defaults() {
        let layers = ConfigLayers {
            endpoint: Some("https://vision.example.com/predict".to_string()),
            key: Some("k".to_string()),
            smtp_host: Some("smtp.example.com".to_string()),
            smtp_user: Some("guard@example.com".to_string()),
            smtp_password: Some("pw".to_string()),
            recipient: Some("security@example.com".to_string()),
            ..ConfigLayers::default()
        };
        let cfg = layers.resolve().unwrap();
        assert_eq!(cfg.confidence_threshold, DEFAULT_CONFIDENCE_THRESHOLD);
        assert_eq!(cfg.smtp.port, 465);
        assert_eq!(cfg.smtp.from, "guard@example.com");
        assert_eq!(cfg.inference.timeout, Duration::from_secs(30));
        assert_eq!(cfg.paths.video_input, "video.mp4");
        assert_eq!(cfg.paths.video_output, "output_video.mp4");
        assert_eq!(cfg.paths.log_path, PathBuf::from("log.txt"));
        cfg.validate().unwrap();
    }
}
