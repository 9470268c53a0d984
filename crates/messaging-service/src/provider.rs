//! Provider selection and configuration.
//!
//! Configuration is an explicit [`MessagingConfig`] value handed to the
//! [`MessagingServiceFactory`](crate::client::MessagingServiceFactory) or to a
//! provider constructor. Loading it from the environment is a separate step
//! ([`MessagingConfig::from_env`]) so tests can build configurations side by
//! side without touching process state.
//!
//! Recognised environment keys and their defaults:
//!
//! | key                          | default        |
//! |------------------------------|----------------|
//! | `MESSAGING_SERVICE_PROVIDER` | `sqs`          |
//! | `MESSAGING_SERVICE_REGION`   | `eu-central-1` |
//! | `MESSAGING_SERVICE_ENDPOINT` | regional SQS   |
//! | `SQS_VISIBILITY_TIMEOUT`     | `20`           |
//! | `SQS_MAX_NUMBER_OF_MESSAGES` | `10`           |
//! | `SQS_API_CALL_TIMEOUT`       | `30`           |
//! | `AWS_ACCESS_KEY_ID`          | -              |
//! | `AWS_SECRET_ACCESS_KEY`      | -              |
//! | `AWS_SESSION_TOKEN`          | -              |

use crate::error::ConfigurationError;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_REGION: &str = "eu-central-1";
pub const DEFAULT_WAIT_TIME_SECONDS: u32 = 20;
pub const DEFAULT_MAX_NUMBER_OF_MESSAGES: u32 = 10;
pub const DEFAULT_API_CALL_TIMEOUT_SECONDS: u64 = 30;

/// SQS will not hold a receive call open for longer than this.
pub const MAX_WAIT_TIME_SECONDS: u32 = 20;
/// SQS returns at most this many messages per receive call.
pub const MAX_NUMBER_OF_MESSAGES: u32 = 10;

/// Closed set of messaging backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Sqs,
    /// Reserved; construction fails with "not implemented".
    PubSub,
    /// Reserved; construction fails with "not implemented".
    EventGrid,
}

impl ProviderKind {
    /// Whether a working implementation exists for this provider
    pub fn is_implemented(&self) -> bool {
        match self {
            Self::Sqs => true,
            Self::PubSub => false,
            Self::EventGrid => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sqs => "sqs",
            Self::PubSub => "pubsub",
            Self::EventGrid => "eventgrid",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqs" => Ok(Self::Sqs),
            "pubsub" => Ok(Self::PubSub),
            "eventgrid" => Ok(Self::EventGrid),
            _ => Err(ConfigurationError::UnknownProvider {
                name: s.to_string(),
            }),
        }
    }
}

/// Static credentials used to sign provider requests
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct AwsCredentials {
    pub access_key_id: String,
    #[serde(serialize_with = "redact")]
    pub secret_access_key: String,
    #[serde(serialize_with = "redact_optional")]
    pub session_token: Option<String>,
}

impl fmt::Debug for AwsCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field(
                "session_token",
                &self.session_token.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

fn redact<S: Serializer>(_value: &str, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str("<redacted>")
}

fn redact_optional<S: Serializer>(
    value: &Option<String>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match value {
        Some(_) => serializer.serialize_some("<redacted>"),
        None => serializer.serialize_none(),
    }
}

/// Configuration for messaging clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessagingConfig {
    pub provider: ProviderKind,
    pub region: String,
    /// Endpoint override, e.g. a LocalStack URL. Defaults to the regional SQS endpoint.
    pub endpoint: Option<String>,
    /// How long a receive call waits for at least one message (long-poll)
    pub wait_time_seconds: u32,
    /// Upper bound on messages returned by one receive call
    pub max_number_of_messages: u32,
    /// Client-side timeout for a single API call, must exceed the long-poll wait
    pub api_call_timeout_seconds: u64,
    pub credentials: Option<AwsCredentials>,
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Sqs,
            region: DEFAULT_REGION.to_string(),
            endpoint: None,
            wait_time_seconds: DEFAULT_WAIT_TIME_SECONDS,
            max_number_of_messages: DEFAULT_MAX_NUMBER_OF_MESSAGES,
            api_call_timeout_seconds: DEFAULT_API_CALL_TIMEOUT_SECONDS,
            credentials: None,
        }
    }
}

/// Raw environment values, keyed by the lower-cased variable name
#[derive(Debug, Default, Deserialize)]
struct EnvSettings {
    messaging_service_provider: Option<String>,
    messaging_service_region: Option<String>,
    messaging_service_endpoint: Option<String>,
    sqs_visibility_timeout: Option<u32>,
    sqs_max_number_of_messages: Option<u32>,
    sqs_api_call_timeout: Option<u64>,
    aws_access_key_id: Option<String>,
    aws_secret_access_key: Option<String>,
    aws_session_token: Option<String>,
}

impl MessagingConfig {
    /// Load configuration from the process environment
    ///
    /// # Errors
    ///
    /// Returns an error if a variable cannot be parsed, the provider name is
    /// unknown, or the resulting configuration fails [`validate`](Self::validate).
    pub fn from_env() -> Result<Self, ConfigurationError> {
        Self::load(config::Environment::default())
    }

    /// Load configuration from an explicit set of environment-style variables
    ///
    /// Behaves like [`from_env`](Self::from_env) but never reads process state.
    pub fn from_env_map(variables: HashMap<String, String>) -> Result<Self, ConfigurationError> {
        Self::load(config::Environment::default().source(Some(variables)))
    }

    fn load(environment: config::Environment) -> Result<Self, ConfigurationError> {
        let settings: EnvSettings = config::Config::builder()
            .add_source(environment.ignore_empty(true))
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| ConfigurationError::Load {
                message: e.to_string(),
            })?;

        let defaults = Self::default();

        let provider = match settings.messaging_service_provider {
            Some(name) => name.parse()?,
            None => defaults.provider,
        };

        let credentials = match (settings.aws_access_key_id, settings.aws_secret_access_key) {
            (Some(access_key_id), Some(secret_access_key)) => Some(AwsCredentials {
                access_key_id,
                secret_access_key,
                session_token: settings.aws_session_token,
            }),
            _ => None,
        };

        let config = Self {
            provider,
            region: settings
                .messaging_service_region
                .unwrap_or(defaults.region),
            endpoint: settings.messaging_service_endpoint,
            wait_time_seconds: settings
                .sqs_visibility_timeout
                .unwrap_or(defaults.wait_time_seconds),
            max_number_of_messages: settings
                .sqs_max_number_of_messages
                .unwrap_or(defaults.max_number_of_messages),
            api_call_timeout_seconds: settings
                .sqs_api_call_timeout
                .unwrap_or(defaults.api_call_timeout_seconds),
            credentials,
        };

        config.validate()?;
        Ok(config)
    }

    /// Check the configuration against provider limits
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::Invalid`] naming the offending key.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.region.trim().is_empty() {
            return Err(invalid("MESSAGING_SERVICE_REGION", "must not be empty"));
        }

        if self.max_number_of_messages == 0 || self.max_number_of_messages > MAX_NUMBER_OF_MESSAGES
        {
            return Err(invalid(
                "SQS_MAX_NUMBER_OF_MESSAGES",
                &format!("must be between 1 and {}", MAX_NUMBER_OF_MESSAGES),
            ));
        }

        if self.wait_time_seconds > MAX_WAIT_TIME_SECONDS {
            return Err(invalid(
                "SQS_VISIBILITY_TIMEOUT",
                &format!("must be between 0 and {}", MAX_WAIT_TIME_SECONDS),
            ));
        }

        if self.api_call_timeout_seconds <= u64::from(self.wait_time_seconds) {
            return Err(invalid(
                "SQS_API_CALL_TIMEOUT",
                "must be longer than the long-poll wait time",
            ));
        }

        if let Some(endpoint) = &self.endpoint {
            url::Url::parse(endpoint)
                .map_err(|e| invalid("MESSAGING_SERVICE_ENDPOINT", &e.to_string()))?;
        }

        Ok(())
    }

    /// Endpoint requests are sent to
    pub fn resolved_endpoint(&self) -> String {
        self.endpoint
            .clone()
            .unwrap_or_else(|| format!("https://sqs.{}.amazonaws.com", self.region))
    }
}

fn invalid(key: &str, message: &str) -> ConfigurationError {
    ConfigurationError::Invalid {
        key: key.to_string(),
        message: message.to_string(),
    }
}

#[cfg(test)]
#[path = "provider_tests.rs"]
mod tests;
