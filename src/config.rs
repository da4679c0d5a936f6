//! Service configuration.
//!
//! Sources, later overriding earlier:
//! 1. built-in defaults
//! 2. `orchestrator.toml` in the working directory, or the file passed
//!    with `--config`
//! 3. environment variables prefixed `ORCHESTRATOR__`, with `__` between
//!    nested keys (`ORCHESTRATOR__HTTP__TIMEOUT_MS=2000`)
//! 4. the flat variables older deployments use (`PREDICTION_BASE_URL`,
//!    `HTTP_TIMEOUT_SECONDS`, ...)
//!
//! A `.env` file is read into the process environment first.

use crate::application::services::PipelineConfig;
use crate::infrastructure::upstream::error::UpstreamService;
use crate::infrastructure::upstream::http_client::UpstreamClientConfig;
use crate::infrastructure::upstream::retry::{DEFAULT_RETRYABLE_STATUSES, RetryPolicy};
use ::config::{Config, Environment, File};
use axum::http::HeaderName;
use serde::Deserialize;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Default configuration file, looked up without extension.
pub const DEFAULT_CONFIG_FILE: &str = "orchestrator";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "ORCHESTRATOR";

/// Flat environment variables and the keys they set.
const LEGACY_STRING_VARS: [(&str, &str); 4] = [
    ("MEMBER_DATA_BASE_URL", "upstreams.member_history.base_url"),
    ("PREDICTION_BASE_URL", "upstreams.prediction.base_url"),
    ("OFFER_BASE_URL", "upstreams.offer_engine.base_url"),
    ("REQUEST_ID_HEADER", "server.correlation_header"),
];
const LEGACY_INT_VARS: [(&str, &str); 2] = [
    ("HTTP_MAX_RETRIES", "http.max_retries"),
    ("HTTP_CONCURRENCY_LIMIT", "http.concurrency_limit"),
];
const LEGACY_SECONDS_VARS: [(&str, &str); 2] = [
    ("HTTP_TIMEOUT_SECONDS", "http.timeout_ms"),
    ("HTTP_RETRY_BACKOFF_SECONDS", "http.backoff_base_ms"),
];

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A source could not be read or deserialized.
    #[error("failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),

    /// A value was read but is not acceptable.
    #[error("invalid configuration value for {key}: {message}")]
    Invalid {
        /// Dotted configuration key.
        key: String,
        /// What is wrong with it.
        message: String,
    },
}

impl ConfigError {
    fn invalid(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Invalid {
            key: key.into(),
            message: message.into(),
        }
    }
}

/// Listener settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Socket address to bind.
    pub listen_addr: String,
    /// Header carrying the correlation id in and out.
    pub correlation_header: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8000".to_string(),
            correlation_header: "X-Request-ID".to_string(),
        }
    }
}

/// Location of one backend service.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ServiceSettings {
    /// Base URL, `http` or `https`.
    pub base_url: String,
}

/// Locations of all backend services.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct UpstreamSettings {
    /// Member-history store.
    pub member_history: ServiceSettings,
    /// Prediction service.
    pub prediction: ServiceSettings,
    /// Offer engine.
    pub offer_engine: ServiceSettings,
}

impl Default for UpstreamSettings {
    fn default() -> Self {
        Self {
            member_history: ServiceSettings {
                base_url: "http://localhost:8001".to_string(),
            },
            prediction: ServiceSettings {
                base_url: "http://localhost:8002".to_string(),
            },
            offer_engine: ServiceSettings {
                base_url: "http://localhost:8003".to_string(),
            },
        }
    }
}

/// Outbound HTTP behaviour shared by all upstreams.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    /// Timeout of a single attempt.
    pub timeout_ms: u64,
    /// Budget for one call including retries.
    pub call_budget_ms: u64,
    /// Extra attempts after the first.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub backoff_base_ms: u64,
    /// Cap on the retry delay.
    pub backoff_max_ms: u64,
    /// Add random jitter to retry delays.
    pub jitter: bool,
    /// Statuses treated as transient.
    pub retryable_statuses: Vec<u16>,
    /// Maximum in-flight requests per upstream.
    pub concurrency_limit: usize,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout_ms: 5000,
            call_budget_ms: 15000,
            max_retries: 2,
            backoff_base_ms: 150,
            backoff_max_ms: 2000,
            jitter: true,
            retryable_statuses: DEFAULT_RETRYABLE_STATUSES.to_vec(),
            concurrency_limit: 50,
        }
    }
}

/// Pipeline behaviour.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// Deadline from history fetch to offer assignment; unset means none.
    pub request_deadline_ms: Option<u64>,
}

/// Logging output.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// Filter used when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Complete service configuration, immutable after loading.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Listener.
    pub server: ServerSettings,
    /// Backend locations.
    pub upstreams: UpstreamSettings,
    /// Outbound HTTP.
    pub http: HttpSettings,
    /// Pipeline.
    pub pipeline: PipelineSettings,
    /// Logging.
    pub log: LogSettings,
}

impl Settings {
    /// Loads settings from `.env`, the config file and the process
    /// environment.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a source is unreadable or a value is invalid.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        // A missing .env is normal.
        let _ = dotenvy::dotenv();
        let env: HashMap<String, String> = std::env::vars().collect();
        Self::load_from(path, &env)
    }

    /// Loads settings using `env` in place of the process environment.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a source is unreadable or a value is invalid.
    pub fn load_from(
        path: Option<&Path>,
        env: &HashMap<String, String>,
    ) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        builder = match path {
            Some(path) => builder.add_source(File::from(path).required(true)),
            None => builder.add_source(File::with_name(DEFAULT_CONFIG_FILE).required(false)),
        };

        let prefixed: HashMap<String, String> = env
            .iter()
            .filter(|(k, _)| k.starts_with(CONFIG_ENV_PREFIX))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        builder = builder.add_source(
            Environment::with_prefix(CONFIG_ENV_PREFIX)
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("http.retryable_statuses")
                .source(Some(prefixed)),
        );

        for (var, key) in LEGACY_STRING_VARS {
            builder = builder.set_override_option(key, env.get(var).cloned())?;
        }
        for (var, key) in LEGACY_INT_VARS {
            let value = env
                .get(var)
                .map(|raw| {
                    raw.trim()
                        .parse::<i64>()
                        .map_err(|_| ConfigError::invalid(var, "must be an integer"))
                })
                .transpose()?;
            builder = builder.set_override_option(key, value)?;
        }
        for (var, key) in LEGACY_SECONDS_VARS {
            let value = env
                .get(var)
                .map(|raw| seconds_to_millis(var, raw))
                .transpose()?;
            builder = builder.set_override_option(key, value)?;
        }

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validated()
    }

    /// Checks values and normalises base URLs.
    fn validated(mut self) -> Result<Self, ConfigError> {
        self.server
            .listen_addr
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::invalid("server.listen_addr", e.to_string()))?;
        HeaderName::from_bytes(self.server.correlation_header.trim().as_bytes())
            .map_err(|e| ConfigError::invalid("server.correlation_header", e.to_string()))?;
        self.server.correlation_header = self.server.correlation_header.trim().to_string();

        for (key, service) in [
            ("upstreams.member_history.base_url", &mut self.upstreams.member_history),
            ("upstreams.prediction.base_url", &mut self.upstreams.prediction),
            ("upstreams.offer_engine.base_url", &mut self.upstreams.offer_engine),
        ] {
            service.base_url = normalize_base_url(key, &service.base_url)?;
        }

        let http = &self.http;
        if http.timeout_ms == 0 {
            return Err(ConfigError::invalid("http.timeout_ms", "must be positive"));
        }
        if http.call_budget_ms == 0 {
            return Err(ConfigError::invalid("http.call_budget_ms", "must be positive"));
        }
        if http.backoff_max_ms < http.backoff_base_ms {
            return Err(ConfigError::invalid(
                "http.backoff_max_ms",
                "must not be below http.backoff_base_ms",
            ));
        }
        if http.concurrency_limit == 0 {
            return Err(ConfigError::invalid(
                "http.concurrency_limit",
                "must be positive",
            ));
        }
        if let Some(status) = http
            .retryable_statuses
            .iter()
            .find(|s| !(100..=599).contains(*s))
        {
            return Err(ConfigError::invalid(
                "http.retryable_statuses",
                format!("{} is not an HTTP status code", status),
            ));
        }
        if self.pipeline.request_deadline_ms == Some(0) {
            return Err(ConfigError::invalid(
                "pipeline.request_deadline_ms",
                "must be positive when set",
            ));
        }

        Ok(self)
    }

    /// Returns the parsed listen address.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if the address does not parse.
    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.server
            .listen_addr
            .parse()
            .map_err(|e: std::net::AddrParseError| {
                ConfigError::invalid("server.listen_addr", e.to_string())
            })
    }

    /// Returns the correlation header as a lowercase header name.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if the header name is not valid.
    pub fn correlation_header(&self) -> Result<HeaderName, ConfigError> {
        HeaderName::from_bytes(self.server.correlation_header.as_bytes())
            .map_err(|e| ConfigError::invalid("server.correlation_header", e.to_string()))
    }

    /// Returns the retry policy shared by all upstreams.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::default()
            .with_max_retries(self.http.max_retries)
            .with_delays(
                Duration::from_millis(self.http.backoff_base_ms),
                Duration::from_millis(self.http.backoff_max_ms),
            )
            .with_jitter(self.http.jitter)
            .with_retryable_statuses(self.http.retryable_statuses.clone())
    }

    /// Builds the client configuration for one upstream.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if the correlation header is not valid.
    pub fn client_config(
        &self,
        service: UpstreamService,
    ) -> Result<UpstreamClientConfig, ConfigError> {
        let base_url = match service {
            UpstreamService::MemberHistory => &self.upstreams.member_history.base_url,
            UpstreamService::Prediction => &self.upstreams.prediction.base_url,
            UpstreamService::OfferEngine => &self.upstreams.offer_engine.base_url,
        };
        Ok(UpstreamClientConfig::new(base_url.clone())
            .with_attempt_timeout(Duration::from_millis(self.http.timeout_ms))
            .with_call_budget(Duration::from_millis(self.http.call_budget_ms))
            .with_retry(self.retry_policy())
            .with_max_concurrency(self.http.concurrency_limit)
            .with_correlation_header(self.correlation_header()?))
    }

    /// Returns the pipeline configuration.
    #[must_use]
    pub fn pipeline_config(&self) -> PipelineConfig {
        match self.pipeline.request_deadline_ms {
            Some(ms) => PipelineConfig::default().with_request_deadline(Duration::from_millis(ms)),
            None => PipelineConfig::default(),
        }
    }
}

fn normalize_base_url(key: &str, raw: &str) -> Result<String, ConfigError> {
    let trimmed = raw.trim().trim_end_matches('/');
    let url = reqwest::Url::parse(trimmed).map_err(|e| ConfigError::invalid(key, e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::invalid(key, "scheme must be http or https"));
    }
    if url.host_str().is_none() {
        return Err(ConfigError::invalid(key, "missing host"));
    }
    Ok(trimmed.to_string())
}

fn seconds_to_millis(var: &str, raw: &str) -> Result<i64, ConfigError> {
    let seconds: f64 = raw
        .trim()
        .parse()
        .map_err(|_| ConfigError::invalid(var, "must be a number of seconds"))?;
    if !seconds.is_finite() || seconds < 0.0 {
        return Err(ConfigError::invalid(var, "must be a non-negative number of seconds"));
    }
    Ok((seconds * 1000.0).round() as i64)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    fn load(pairs: &[(&str, &str)]) -> Result<Settings, ConfigError> {
        let dir = std::env::temp_dir().join(format!("orchestrator-cfg-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("empty.toml");
        std::fs::File::create(&path).unwrap();
        Settings::load_from(Some(&path), &env(pairs))
    }

    #[test]
    fn defaults() {
        let settings = load(&[]).unwrap();
        assert_eq!(settings.server.listen_addr, "0.0.0.0:8000");
        assert_eq!(settings.server.correlation_header, "X-Request-ID");
        assert_eq!(settings.upstreams.prediction.base_url, "http://localhost:8002");
        assert_eq!(settings.http.timeout_ms, 5000);
        assert_eq!(settings.http.max_retries, 2);
        assert_eq!(settings.http.retryable_statuses, vec![429, 502, 503, 504]);
        assert_eq!(settings.pipeline.request_deadline_ms, None);
        assert!(settings.http.jitter);
        assert!(!settings.log.json);
    }

    #[test]
    fn file_then_env_override() {
        let dir = std::env::temp_dir().join(format!("orchestrator-cfg-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("orchestrator.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            "[http]\ntimeout_ms = 1000\nmax_retries = 4\n\n[upstreams.offer_engine]\nbase_url = \"http://offers:9000/\""
        )
        .unwrap();

        let settings = Settings::load_from(
            Some(&path),
            &env(&[
                ("ORCHESTRATOR__HTTP__MAX_RETRIES", "1"),
                ("ORCHESTRATOR__PIPELINE__REQUEST_DEADLINE_MS", "2500"),
            ]),
        )
        .unwrap();

        assert_eq!(settings.http.timeout_ms, 1000);
        assert_eq!(settings.http.max_retries, 1);
        assert_eq!(settings.upstreams.offer_engine.base_url, "http://offers:9000");
        assert_eq!(settings.pipeline.request_deadline_ms, Some(2500));
    }

    #[test]
    fn legacy_variables_apply() {
        let settings = load(&[
            ("PREDICTION_BASE_URL", "http://ml:8080/"),
            ("HTTP_TIMEOUT_SECONDS", "2.5"),
            ("HTTP_RETRY_BACKOFF_SECONDS", "0.3"),
            ("HTTP_MAX_RETRIES", "5"),
            ("HTTP_CONCURRENCY_LIMIT", "8"),
            ("REQUEST_ID_HEADER", "X-Correlation-ID"),
        ])
        .unwrap();

        assert_eq!(settings.upstreams.prediction.base_url, "http://ml:8080");
        assert_eq!(settings.http.timeout_ms, 2500);
        assert_eq!(settings.http.backoff_base_ms, 300);
        assert_eq!(settings.http.max_retries, 5);
        assert_eq!(settings.http.concurrency_limit, 8);
        assert_eq!(
            settings.correlation_header().unwrap().as_str(),
            "x-correlation-id"
        );
    }

    fn invalid_key(err: ConfigError) -> String {
        match err {
            ConfigError::Invalid { key, .. } => key,
            other => format!("not a validation error: {}", other),
        }
    }

    #[test]
    fn rejects_bad_url() {
        let err = load(&[("OFFER_BASE_URL", "ftp://offers")]).unwrap_err();
        assert_eq!(invalid_key(err), "upstreams.offer_engine.base_url");
    }

    #[test]
    fn rejects_bad_header() {
        let err = load(&[("REQUEST_ID_HEADER", "bad header")]).unwrap_err();
        assert_eq!(invalid_key(err), "server.correlation_header");
    }

    #[test]
    fn rejects_bad_legacy_number() {
        let err = load(&[("HTTP_MAX_RETRIES", "lots")]).unwrap_err();
        assert_eq!(invalid_key(err), "HTTP_MAX_RETRIES");
    }

    #[test]
    fn client_config_uses_http_settings() {
        let settings = load(&[
            ("ORCHESTRATOR__HTTP__CONCURRENCY_LIMIT", "3"),
            ("ORCHESTRATOR__HTTP__JITTER", "false"),
        ])
        .unwrap();
        let config = settings.client_config(UpstreamService::OfferEngine).unwrap();
        assert_eq!(config.base_url, "http://localhost:8003");
        assert_eq!(config.max_concurrency, 3);
        assert_eq!(config.attempt_timeout, Duration::from_millis(5000));
        assert_eq!(config.retry.max_retries, 2);
        assert!(!config.retry.jitter);
        assert_eq!(config.correlation_header.as_str(), "x-request-id");
    }

    #[test]
    fn pipeline_deadline_optional() {
        let settings = load(&[]).unwrap();
        assert!(settings.pipeline_config().request_deadline.is_none());
    }
}
