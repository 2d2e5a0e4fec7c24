//! File and environment configuration.
//!
//! Sources are applied in order, later ones overriding earlier ones:
//!
//! 1. An optional configuration file (YAML, TOML or JSON, by extension)
//! 2. Environment variables prefixed `SQS_COURIER__` with `__` separating
//!    nested keys, e.g. `SQS_COURIER__CONSUMER__HANDLER_TIMEOUT_MS=10000`
//!
//! Every field has a default, so an empty environment yields a usable
//! configuration.

use crate::error::{ConfigurationError, SqsError, ValidationError};
use crate::options::{ConsumerOptions, ProducerOptions, MAX_MESSAGES_PER_FETCH};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;

/// Environment variable prefix
pub const ENV_PREFIX: &str = "SQS_COURIER";

/// Longest delivery delay SQS accepts, in seconds
pub const MAX_DELAY_SECONDS: u64 = 900;

/// Longest long-poll wait SQS accepts, in seconds
pub const MAX_WAIT_TIME_SECONDS: u64 = 20;

/// Longest visibility timeout SQS accepts, in seconds
pub const MAX_VISIBILITY_TIMEOUT_SECONDS: u64 = 43_200;

/// Complete configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CourierConfig {
    pub aws: AwsSettings,
    pub consumer: ConsumerSettings,
    pub producer: ProducerSettings,
}

/// Connection settings for AWS SQS
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AwsSettings {
    /// Region; falls back to the SDK's provider chain when unset
    pub region: Option<String>,
    /// Custom endpoint, e.g. a local SQS emulator
    pub endpoint_url: Option<String>,
    /// Named profile from the shared AWS config files
    pub profile: Option<String>,
}

/// Consumer loop settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsumerSettings {
    pub max_messages_per_fetch: i32,
    /// Zero uses the queue's own visibility timeout
    pub visibility_timeout_seconds: u64,
    pub wait_time_seconds: u64,
    pub fetch_retry_delay_ms: u64,
    pub handler_timeout_ms: u64,
    pub auto_delete_on_success: bool,
    pub dedup_attempt_id: Option<String>,
    pub debug: bool,
}

impl Default for ConsumerSettings {
    fn default() -> Self {
        Self {
            max_messages_per_fetch: MAX_MESSAGES_PER_FETCH,
            visibility_timeout_seconds: 0,
            wait_time_seconds: 0,
            fetch_retry_delay_ms: 5_000,
            handler_timeout_ms: 5_000,
            auto_delete_on_success: false,
            dedup_attempt_id: None,
            debug: false,
        }
    }
}

/// Producer settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProducerSettings {
    pub delay_seconds: u64,
    /// Message group for FIFO queues
    pub group_id: Option<String>,
    pub debug: bool,
}

impl CourierConfig {
    /// Load from an optional file plus the process environment, then validate
    pub fn load(path: Option<&Path>) -> Result<Self, SqsError> {
        Self::load_with_env(path, None)
    }

    /// Load with an explicit environment instead of the process one
    pub fn load_with_env(
        path: Option<&Path>,
        env: Option<HashMap<String, String>>,
    ) -> Result<Self, SqsError> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(::config::File::from(path).required(true));
        }

        let config = builder
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true)
                    .source(env),
            )
            .build()
            .map_err(|e| ConfigurationError::Parsing {
                message: e.to_string(),
            })?;

        let loaded: CourierConfig =
            config
                .try_deserialize()
                .map_err(|e| ConfigurationError::Parsing {
                    message: e.to_string(),
                })?;

        loaded.validate()?;
        Ok(loaded)
    }

    /// Reject values SQS would refuse
    pub fn validate(&self) -> Result<(), ValidationError> {
        let consumer = &self.consumer;
        if !(1..=MAX_MESSAGES_PER_FETCH).contains(&consumer.max_messages_per_fetch) {
            return Err(ValidationError::OutOfRange {
                field: "consumer.max_messages_per_fetch".to_string(),
                message: format!("must be between 1 and {}", MAX_MESSAGES_PER_FETCH),
            });
        }
        if consumer.wait_time_seconds > MAX_WAIT_TIME_SECONDS {
            return Err(ValidationError::OutOfRange {
                field: "consumer.wait_time_seconds".to_string(),
                message: format!("must be at most {}", MAX_WAIT_TIME_SECONDS),
            });
        }
        if consumer.visibility_timeout_seconds > MAX_VISIBILITY_TIMEOUT_SECONDS {
            return Err(ValidationError::OutOfRange {
                field: "consumer.visibility_timeout_seconds".to_string(),
                message: format!("must be at most {}", MAX_VISIBILITY_TIMEOUT_SECONDS),
            });
        }
        if consumer.handler_timeout_ms == 0 {
            return Err(ValidationError::OutOfRange {
                field: "consumer.handler_timeout_ms".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        if self.producer.delay_seconds > MAX_DELAY_SECONDS {
            return Err(ValidationError::OutOfRange {
                field: "producer.delay_seconds".to_string(),
                message: format!("must be at most {} (15 minutes)", MAX_DELAY_SECONDS),
            });
        }
        if let Some(endpoint) = &self.aws.endpoint_url {
            if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
                return Err(ValidationError::InvalidFormat {
                    field: "aws.endpoint_url".to_string(),
                    message: "must be an http or https URL".to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn consumer_options(&self) -> ConsumerOptions {
        let settings = &self.consumer;
        let mut options = ConsumerOptions::new()
            .with_max_messages_per_fetch(settings.max_messages_per_fetch)
            .with_visibility_timeout(Duration::from_secs(settings.visibility_timeout_seconds))
            .with_wait_time(Duration::from_secs(settings.wait_time_seconds))
            .with_fetch_retry_delay(Duration::from_millis(settings.fetch_retry_delay_ms))
            .with_handler_timeout(Duration::from_millis(settings.handler_timeout_ms))
            .with_auto_delete_on_success(settings.auto_delete_on_success)
            .with_debug(settings.debug);
        if let Some(id) = &settings.dedup_attempt_id {
            options = options.with_dedup_attempt_id(id.clone());
        }
        options
    }

    pub fn producer_options(&self) -> ProducerOptions {
        let settings = &self.producer;
        let mut options = ProducerOptions::new()
            .with_delay(Duration::from_secs(settings.delay_seconds))
            .with_debug(settings.debug);
        if let Some(group) = &settings.group_id {
            options = options.with_group_id(group.clone());
        }
        options
    }
}
