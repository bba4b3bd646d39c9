use std::str::FromStr;
use std::time::Duration;

use spotline_cloud::ec2::LaunchSpec;
use spotline_core::dispatch::{
    DEFAULT_HEARTBEAT_TIMEOUT, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_INSTANCES,
    DEFAULT_RUNNER_PROGRESS_MINUTES, DEFAULT_SCHEDULER_INTERVAL, DEFAULT_SPOT_VALID_FOR,
    DEFAULT_TASK_KIND,
};
use spotline_core::error::CoreError;

use crate::auth::callback_token::CallbackTokenConfig;

/// Default instance class for pipeline workers.
pub const DEFAULT_INSTANCE_TYPE: &str = "c5d.4xlarge";

/// Default lifetime of a cached preferred zone.
const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60 * 60);

/// Read `name` from the environment and parse it, falling back to `default`.
///
/// # Panics
///
/// Panics if the variable is set but does not parse.
fn env_or<T>(name: &str, default: T) -> T
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .unwrap_or_else(|e| panic!("{name} is invalid ('{raw}'): {e}")),
        Err(_) => default,
    }
}

/// Non-empty value of `name`, if set.
fn env_opt(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_list(name: &str, default: &str) -> Vec<String> {
    std::env::var(name)
        .unwrap_or_else(|_| default.into())
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development
/// except the callback secret.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins for the results API.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Externally reachable base URL embedded in callback URLs.
    pub public_base_url: String,
    /// Requeues allowed before a task is permanently failed.
    pub max_attempts: i16,
    /// Callback token signing configuration.
    pub callback: CallbackTokenConfig,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default                    |
    /// |------------------------|----------------------------|
    /// | `HOST`                 | `0.0.0.0`                  |
    /// | `PORT`                 | `3000`                     |
    /// | `CORS_ORIGINS`         | none                       |
    /// | `REQUEST_TIMEOUT_SECS` | `30`                       |
    /// | `PUBLIC_BASE_URL`      | `http://localhost:{PORT}`  |
    /// | `MAX_ATTEMPTS`         | `3`                        |
    ///
    /// See [`CallbackTokenConfig::from_env`] for the token variables.
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let port: u16 = env_or("PORT", 3000);
        let cors_origins = env_list("CORS_ORIGINS", "");
        let request_timeout_secs: u64 = env_or("REQUEST_TIMEOUT_SECS", 30);

        let public_base_url = env_opt("PUBLIC_BASE_URL")
            .unwrap_or_else(|| format!("http://localhost:{port}"))
            .trim_end_matches('/')
            .to_string();

        let max_attempts: i16 = env_or("MAX_ATTEMPTS", DEFAULT_MAX_ATTEMPTS);
        assert!(max_attempts >= 0, "MAX_ATTEMPTS must not be negative");

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            public_base_url,
            max_attempts,
            callback: CallbackTokenConfig::from_env(),
        }
    }
}

/// Scheduler loop configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub enabled: bool,
    pub interval: Duration,
    /// Task kind this controller provisions instances for.
    pub task_kind: String,
    /// Size of the provisioning window (queued + running tasks).
    pub max_instances: i64,
    pub max_attempts: i16,
    /// Running tasks silent for longer than this are reclaimed.
    pub heartbeat_timeout: Duration,
    /// Provider region. When unset the controller asks the metadata
    /// service at startup and skips provisioning if that fails too.
    pub region: Option<String>,
    /// Zone used when price discovery fails. Defaults to the region's
    /// first candidate zone.
    pub default_zone: Option<String>,
    pub instance_type: String,
    pub spot_valid_for: Duration,
    /// `--progress` value baked into the bootstrap script.
    pub runner_progress_minutes: u32,
    pub cache_ttl: Duration,
    pub launch: LaunchSpec,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: DEFAULT_SCHEDULER_INTERVAL,
            task_kind: DEFAULT_TASK_KIND.to_string(),
            max_instances: DEFAULT_MAX_INSTANCES,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            heartbeat_timeout: DEFAULT_HEARTBEAT_TIMEOUT,
            region: None,
            default_zone: None,
            instance_type: DEFAULT_INSTANCE_TYPE.to_string(),
            spot_valid_for: DEFAULT_SPOT_VALID_FOR,
            runner_progress_minutes: DEFAULT_RUNNER_PROGRESS_MINUTES,
            cache_ttl: DEFAULT_CACHE_TTL,
            launch: LaunchSpec::default(),
        }
    }
}

impl SchedulerConfig {
    /// Load scheduler configuration from environment variables.
    ///
    /// | Env Var                       | Default          |
    /// |-------------------------------|------------------|
    /// | `SCHEDULER_ENABLED`           | `true`           |
    /// | `SCHEDULER_INTERVAL_SECS`     | `900`            |
    /// | `SCHEDULER_TASK_KIND`         | `Pipeline`       |
    /// | `MAX_INSTANCES`               | `5`              |
    /// | `MAX_ATTEMPTS`                | `3`              |
    /// | `HEARTBEAT_TIMEOUT_SECS`      | `660`            |
    /// | `AWS_REGION`                  | metadata service |
    /// | `AWS_AVAILABILITY_ZONE`       | `{region}a`      |
    /// | `INSTANCE_TYPE`               | `c5d.4xlarge`    |
    /// | `IMAGE_ID`                    | --               |
    /// | `INSTANCE_PROFILE_ARN`        | --               |
    /// | `SECURITY_GROUP_IDS`          | --               |
    /// | `SPOT_VALID_FOR_SECS`         | `300`            |
    /// | `RUNNER_PROGRESS_MINUTES`     | `5`              |
    /// | `PROVISIONING_CACHE_TTL_SECS` | `3600`           |
    ///
    /// # Panics
    ///
    /// Panics if [`validate`](Self::validate) rejects the result.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let enabled: bool = env_or("SCHEDULER_ENABLED", defaults.enabled);

        let secs = |name: &str, default: Duration| {
            Duration::from_secs(env_or(name, default.as_secs()))
        };

        let launch = LaunchSpec {
            image_id: env_opt("IMAGE_ID").unwrap_or_default(),
            instance_profile_arn: env_opt("INSTANCE_PROFILE_ARN"),
            security_group_ids: env_list("SECURITY_GROUP_IDS", ""),
        };

        let config = Self {
            enabled,
            interval: secs("SCHEDULER_INTERVAL_SECS", defaults.interval),
            task_kind: env_opt("SCHEDULER_TASK_KIND").unwrap_or(defaults.task_kind),
            max_instances: env_or("MAX_INSTANCES", defaults.max_instances),
            max_attempts: env_or("MAX_ATTEMPTS", defaults.max_attempts),
            heartbeat_timeout: secs("HEARTBEAT_TIMEOUT_SECS", defaults.heartbeat_timeout),
            region: env_opt("AWS_REGION"),
            default_zone: env_opt("AWS_AVAILABILITY_ZONE"),
            instance_type: env_opt("INSTANCE_TYPE").unwrap_or(defaults.instance_type),
            spot_valid_for: secs("SPOT_VALID_FOR_SECS", defaults.spot_valid_for),
            runner_progress_minutes: env_or(
                "RUNNER_PROGRESS_MINUTES",
                defaults.runner_progress_minutes,
            ),
            cache_ttl: secs("PROVISIONING_CACHE_TTL_SECS", defaults.cache_ttl),
            launch,
        };
        if let Err(e) = config.validate() {
            panic!("Invalid scheduler configuration: {e}");
        }
        config
    }

    /// Reject settings the store or the provider would refuse at runtime.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.max_instances < 0 {
            return Err(CoreError::Validation(
                "MAX_INSTANCES must not be negative".to_string(),
            ));
        }
        if self.max_attempts < 0 {
            return Err(CoreError::Validation(
                "MAX_ATTEMPTS must not be negative".to_string(),
            ));
        }
        if self.enabled && self.launch.image_id.is_empty() {
            return Err(CoreError::Validation(
                "IMAGE_ID must be set when the scheduler is enabled".to_string(),
            ));
        }
        Ok(())
    }
}
