//! Server configuration.
//!
//! Loaded from a single TOML file. The `[[apps]]` table uses flat,
//! human-editable fields (`api_key_env` / `api_key`, …) rather than the
//! `SecretRef` enum the rest of the crate works with; [`load_config`]
//! resolves each app's raw config into [`supasaasy_core::types::AppConfig`],
//! rejecting or warning on direct secrets per the configured mode.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use supasaasy_core::types::{AppConfig, ConnectorAppConfig, SecretRef};

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_worker_poll_interval_ms() -> u64 {
    5_000
}

fn default_scheduler_poll_interval_ms() -> u64 {
    30_000
}

fn default_worker_wall_clock_ms() -> u64 {
    30_000
}

fn default_admin_rate_limit() -> u32 {
    10
}

fn default_webhook_rate_limit() -> u32 {
    100
}

fn default_true() -> bool {
    true
}

/// `[server]` table: bind address, execution mode, and tunables that have no
/// natural home on an individual app or schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Rejects direct (non-`_env`) secrets at config-load time.
    #[serde(default)]
    pub production: bool,
    /// `false` runs `/sync` inline and blocks the caller until it finishes;
    /// `true` enqueues a durable job and returns `202` immediately.
    #[serde(default)]
    pub durable_jobs: bool,
    #[serde(default = "default_worker_poll_interval_ms")]
    pub worker_poll_interval_ms: u64,
    #[serde(default = "default_worker_wall_clock_ms")]
    pub worker_wall_clock_ms: u64,
    #[serde(default = "default_scheduler_poll_interval_ms")]
    pub scheduler_poll_interval_ms: u64,
    #[serde(default = "default_admin_rate_limit")]
    pub admin_rate_limit_per_minute: u32,
    #[serde(default = "default_webhook_rate_limit")]
    pub webhook_rate_limit_per_minute: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            production: false,
            durable_jobs: false,
            worker_poll_interval_ms: default_worker_poll_interval_ms(),
            worker_wall_clock_ms: default_worker_wall_clock_ms(),
            scheduler_poll_interval_ms: default_scheduler_poll_interval_ms(),
            admin_rate_limit_per_minute: default_admin_rate_limit(),
            webhook_rate_limit_per_minute: default_webhook_rate_limit(),
        }
    }
}

/// `[webhook_logging]` table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebhookLoggingConfig {
    #[serde(default)]
    pub enabled: bool,
}

/// `[auth]` table. Reserved for the admin-auth toggle; `/sync` always
/// requires `ADMIN_API_KEY` today, so this currently only disables the
/// worker/scheduler loops in single-shot deployments that want a bare
/// webhook receiver.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// One `[[sync_schedules]]` entry: an incremental sync fired on a cron
/// schedule for a single app_key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncScheduleConfig {
    pub app_key: String,
    /// Standard five-field cron expression (`min hour day month weekday`).
    pub cron: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// Raw `[[apps]].config` shape as written in the TOML file: flat optional
/// fields rather than the `SecretRef` enum, so operators can write either
/// `api_key_env = "STRIPE_API_KEY"` or (for local dev only) `api_key = "sk_test_..."`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConnectorConfig {
    pub api_key: Option<String>,
    pub api_key_env: Option<String>,
    pub webhook_secret: Option<String>,
    pub webhook_secret_env: Option<String>,
    pub sync_from: Option<DateTime<Utc>>,
    pub sync_resources: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawAppConfig {
    pub app_key: String,
    pub name: String,
    pub connector: String,
    #[serde(default)]
    pub config: RawConnectorConfig,
}

#[derive(Debug, Clone, Deserialize)]
struct RawConfig {
    #[serde(default)]
    server: ServerConfig,
    #[serde(default)]
    apps: Vec<RawAppConfig>,
    #[serde(default)]
    sync_schedules: Vec<SyncScheduleConfig>,
    #[serde(default)]
    webhook_logging: WebhookLoggingConfig,
    #[serde(default)]
    auth: AuthConfig,
}

/// Fully resolved configuration: raw secrets turned into `SecretRef`s,
/// `app_key` formats validated. Anything that fails to resolve is a load
/// error, not a runtime one — a bad config should fail startup, not the
/// first request that touches it.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub server: ServerConfig,
    pub apps: Vec<AppConfig>,
    pub sync_schedules: Vec<SyncScheduleConfig>,
    pub webhook_logging: WebhookLoggingConfig,
    pub auth: AuthConfig,
    /// Non-fatal advisories (e.g. a direct secret outside production mode).
    pub warnings: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(String),
    #[error("failed to parse config file: {0}")]
    Parse(String),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Loads and resolves configuration from a TOML file at `path`.
pub fn load_config(path: &str) -> Result<ResolvedConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
    parse_config(&content)
}

fn parse_config(content: &str) -> Result<ResolvedConfig, ConfigError> {
    let raw: RawConfig = toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;

    let mut warnings = Vec::new();
    let mut apps = Vec::with_capacity(raw.apps.len());
    for raw_app in raw.apps {
        apps.push(resolve_app(raw_app, raw.server.production, &mut warnings)?);
    }

    for schedule in &raw.sync_schedules {
        if !apps.iter().any(|a| a.app_key == schedule.app_key) {
            return Err(ConfigError::Invalid(format!(
                "sync_schedules entry references unknown app_key '{}'",
                schedule.app_key
            )));
        }
        super::scheduler::parse_cron(&schedule.cron)
            .map_err(|e| ConfigError::Invalid(format!("schedule for '{}': {e}", schedule.app_key)))?;
    }

    Ok(ResolvedConfig {
        server: raw.server,
        apps,
        sync_schedules: raw.sync_schedules,
        webhook_logging: raw.webhook_logging,
        auth: raw.auth,
        warnings,
    })
}

fn resolve_app(
    raw: RawAppConfig,
    production: bool,
    warnings: &mut Vec<String>,
) -> Result<AppConfig, ConfigError> {
    if !is_valid_app_key(&raw.app_key) {
        return Err(ConfigError::Invalid(format!(
            "app_key '{}' must match ^[A-Za-z0-9_-]+$",
            raw.app_key
        )));
    }

    let api_key = resolve_secret(
        &raw.app_key,
        "api_key",
        raw.config.api_key,
        raw.config.api_key_env,
        production,
        warnings,
    )?;
    let webhook_secret = resolve_secret(
        &raw.app_key,
        "webhook_secret",
        raw.config.webhook_secret,
        raw.config.webhook_secret_env,
        production,
        warnings,
    )?;

    Ok(AppConfig {
        app_key: raw.app_key,
        name: raw.name,
        connector: raw.connector,
        config: ConnectorAppConfig {
            api_key,
            webhook_secret,
            sync_from: raw.config.sync_from,
            sync_resources: raw.config.sync_resources,
        },
    })
}

fn resolve_secret(
    app_key: &str,
    field: &str,
    direct: Option<String>,
    env: Option<String>,
    production: bool,
    warnings: &mut Vec<String>,
) -> Result<SecretRef, ConfigError> {
    match (direct, env) {
        (Some(_), Some(_)) => Err(ConfigError::Invalid(format!(
            "app '{app_key}': '{field}' and '{field}_env' are mutually exclusive"
        ))),
        (Some(value), None) => {
            if production {
                return Err(ConfigError::Invalid(format!(
                    "app '{app_key}': '{field}' must be supplied via '{field}_env' in production mode"
                )));
            }
            warnings.push(format!(
                "app '{app_key}': '{field}' is a direct secret; prefer '{field}_env'"
            ));
            Ok(SecretRef::Direct(value))
        }
        (None, Some(var)) => Ok(SecretRef::Env(var)),
        (None, None) => Err(ConfigError::Invalid(format!(
            "app '{app_key}': missing '{field}' or '{field}_env'"
        ))),
    }
}

fn is_valid_app_key(app_key: &str) -> bool {
    !app_key.is_empty()
        && app_key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}
