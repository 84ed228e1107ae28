//! Process-wide configuration, convention over configuration.
//!
//! A single [`SdkConfig`] record is initialized once from hardcoded defaults
//! overridden by `STKAI_*` environment variables, then frozen. Call
//! [`configure`] at application startup to replace it wholesale; call
//! [`current`] for a snapshot. Components capture the values they need at
//! construction time rather than re-reading the global on every call.
//!
//! Precedence, highest first:
//!
//! 1. Options passed to client constructors
//! 2. A record installed via [`configure`]
//! 3. Environment variables (`STKAI_*`)
//! 4. Hardcoded defaults

use std::sync::{Arc, OnceLock, RwLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Credentials for the self-authenticating transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthSettings {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    /// OAuth2 token endpoint for the client-credentials flow.
    pub token_url: String,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            token_url: "https://idm.stackspot.com/oidc/oauth/token".to_string(),
        }
    }
}

/// Defaults for the remote-quick-command surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RqcSettings {
    pub request_timeout: Duration,
    pub max_retries: u32,
    /// Initial retry backoff, in seconds; doubles per attempt.
    pub backoff_factor: f64,
    pub poll_interval: Duration,
    pub poll_max_duration: Duration,
    pub max_workers: usize,
}

impl Default for RqcSettings {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(20),
            max_retries: 3,
            backoff_factor: 0.5,
            poll_interval: Duration::from_secs(5),
            poll_max_duration: Duration::from_secs(600),
            max_workers: 8,
        }
    }
}

/// Defaults for the agent surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSettings {
    pub base_url: String,
    pub request_timeout: Duration,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            base_url: "https://genai-code-buddy-api.stackspot.com".to_string(),
            request_timeout: Duration::from_secs(60),
        }
    }
}

/// Defaults for the file-upload surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileUploadSettings {
    pub request_timeout: Duration,
    pub max_workers: usize,
}

impl Default for FileUploadSettings {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(60),
            max_workers: 8,
        }
    }
}

/// The process-wide configuration record.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SdkConfig {
    pub auth: AuthSettings,
    pub rqc: RqcSettings,
    pub agent: AgentSettings,
    pub file_upload: FileUploadSettings,
}

impl SdkConfig {
    /// Builds a record from defaults overridden by `STKAI_*` environment
    /// variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(id) = env_string("STKAI_CLIENT_ID") {
            config.auth.client_id = Some(id);
        }
        if let Some(secret) = env_string("STKAI_CLIENT_SECRET") {
            config.auth.client_secret = Some(secret);
        }
        if let Some(url) = env_string("STKAI_AUTH_TOKEN_URL") {
            config.auth.token_url = url;
        }

        if let Some(secs) = env_f64("STKAI_RQC_REQUEST_TIMEOUT") {
            config.rqc.request_timeout = Duration::from_secs_f64(secs);
        }
        if let Some(retries) = env_parse::<u32>("STKAI_RQC_MAX_RETRIES") {
            config.rqc.max_retries = retries;
        }
        if let Some(factor) = env_f64("STKAI_RQC_BACKOFF_FACTOR") {
            config.rqc.backoff_factor = factor;
        }
        if let Some(secs) = env_f64("STKAI_RQC_POLL_INTERVAL") {
            config.rqc.poll_interval = Duration::from_secs_f64(secs);
        }
        if let Some(secs) = env_f64("STKAI_RQC_POLL_MAX_DURATION") {
            config.rqc.poll_max_duration = Duration::from_secs_f64(secs);
        }
        if let Some(workers) = env_parse::<usize>("STKAI_RQC_MAX_WORKERS") {
            config.rqc.max_workers = workers;
        }

        if let Some(url) = env_string("STKAI_AGENT_BASE_URL") {
            config.agent.base_url = url;
        }
        if let Some(secs) = env_f64("STKAI_AGENT_REQUEST_TIMEOUT") {
            config.agent.request_timeout = Duration::from_secs_f64(secs);
        }

        if let Some(secs) = env_f64("STKAI_FILE_UPLOAD_REQUEST_TIMEOUT") {
            config.file_upload.request_timeout = Duration::from_secs_f64(secs);
        }
        if let Some(workers) = env_parse::<usize>("STKAI_FILE_UPLOAD_MAX_WORKERS") {
            config.file_upload.max_workers = workers;
        }

        config
    }
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn env_f64(name: &str) -> Option<f64> {
    env_parse::<f64>(name).filter(|v| *v >= 0.0)
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = env_string(name)?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(var = name, value = %raw, "ignoring unparseable environment override");
            None
        }
    }
}

static GLOBAL: OnceLock<RwLock<Arc<SdkConfig>>> = OnceLock::new();

fn global() -> &'static RwLock<Arc<SdkConfig>> {
    GLOBAL.get_or_init(|| RwLock::new(Arc::new(SdkConfig::from_env())))
}

/// Returns a snapshot of the current configuration.
///
/// The snapshot is immutable; a later [`configure`] does not affect values
/// already captured.
pub fn current() -> Arc<SdkConfig> {
    global().read().unwrap().clone()
}

/// Replaces the process-wide configuration.
///
/// Components capture configuration at construction; replacing the record
/// only affects components constructed afterwards.
pub fn configure(config: SdkConfig) {
    *global().write().unwrap() = Arc::new(config);
}
