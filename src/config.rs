//! Process configuration, resolved once at startup from the environment.

use std::time::Duration;

use thiserror::Error;
use tracing::info;

use crate::webhooks::policies::ExcludedNamespaces;
use crate::webhooks::WEBHOOK_PORT;

/// Value of `PROJECT` meaning "discover from credentials"
pub const PROJECT_NOT_SET: &str = "none";
/// Default Pub/Sub topic name
pub const DEFAULT_TOPIC: &str = "kadvice";
/// Default per-publish deadline
pub const DEFAULT_PUBLISH_TIMEOUT_SECS: u64 = 30;

const ENV_PROJECT: &str = "PROJECT";
const ENV_TOPIC: &str = "TOPIC";
const ENV_PORT: &str = "PORT";
const ENV_EXCLUDED_NAMESPACES: &str = "EXCLUDED_NAMESPACES";
const ENV_PUBLISH_TIMEOUT: &str = "PUBLISH_TIMEOUT_SECS";
const ENV_EMULATOR_HOST: &str = "PUBSUB_EMULATOR_HOST";

/// Error type for configuration loading
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// A variable is set but cannot be parsed
    #[error("Invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },

    /// A variable must not be empty
    #[error("Required value not set: {0}")]
    Missing(&'static str),
}

/// Resolved service configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// GCP project owning the topic; `None` means discover it
    pub project: Option<String>,
    /// Pub/Sub topic name
    pub topic: String,
    /// HTTP listen port
    pub port: u16,
    /// Namespaces whose events are dropped
    pub excluded_namespaces: ExcludedNamespaces,
    /// Deadline for a single publish
    pub publish_timeout: Duration,
    /// Pub/Sub emulator `host:port`, if any
    pub emulator_host: Option<String>,
}

impl Config {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using `lookup` to read variables.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &'static str, default: &str| -> String {
            match lookup(key) {
                Some(value) => {
                    let value = value.trim().to_string();
                    info!(key, value = %value, "Configuration");
                    value
                }
                None => {
                    info!(key, value = %default, "Configuration (not set, using default)");
                    default.to_string()
                }
            }
        };

        let project = var(ENV_PROJECT, PROJECT_NOT_SET);
        let project = (!project.is_empty() && project != PROJECT_NOT_SET).then_some(project);

        let topic = var(ENV_TOPIC, DEFAULT_TOPIC);
        if topic.is_empty() {
            return Err(ConfigError::Missing(ENV_TOPIC));
        }

        let port = parse_number::<u16>(ENV_PORT, var(ENV_PORT, &WEBHOOK_PORT.to_string()))?;

        let excluded_namespaces = match lookup(ENV_EXCLUDED_NAMESPACES) {
            Some(value) => value
                .parse::<ExcludedNamespaces>()
                .unwrap_or_else(|never| match never {}),
            None => ExcludedNamespaces::default(),
        };
        info!(key = ENV_EXCLUDED_NAMESPACES, value = %excluded_namespaces, "Configuration");

        let timeout_secs = parse_number::<u64>(
            ENV_PUBLISH_TIMEOUT,
            var(ENV_PUBLISH_TIMEOUT, &DEFAULT_PUBLISH_TIMEOUT_SECS.to_string()),
        )?;
        if timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                key: ENV_PUBLISH_TIMEOUT,
                value: "0".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }

        let emulator_host = lookup(ENV_EMULATOR_HOST)
            .map(|host| host.trim().to_string())
            .filter(|host| !host.is_empty());

        Ok(Self {
            project,
            topic,
            port,
            excluded_namespaces,
            publish_timeout: Duration::from_secs(timeout_secs),
            emulator_host,
        })
    }
}

fn parse_number<T>(key: &'static str, value: String) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.parse::<T>().map_err(|e| ConfigError::Invalid {
        key,
        reason: e.to_string(),
        value,
    })
}
