//! Error types for messaging operations.

use crate::provider::ProviderKind;
use thiserror::Error;

/// Boxed error used to carry the provider-level cause of a domain error.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Cloud-agnostic error type for all messaging operations
///
/// Provider failures are translated into this taxonomy by the provider's error
/// mapper. The original provider error is always kept as the [`source`] of the
/// rate limit, missing queue, timeout and generic provider variants.
///
/// [`source`]: std::error::Error::source
#[derive(Debug, Error)]
pub enum MessagingError {
    #[error("Rate limit exceeded: {message}")]
    RateLimit {
        message: String,
        #[source]
        source: BoxError,
    },

    #[error("Queue does not exist: {queue_name}")]
    NoSuchQueue {
        queue_name: String,
        #[source]
        source: BoxError,
    },

    #[error("API call timed out: {message}")]
    ApiTimeout {
        message: String,
        #[source]
        source: BoxError,
    },

    #[error("Messaging provider error: {message}")]
    Provider {
        message: String,
        #[source]
        source: BoxError,
    },

    /// Receive failures are not classified; they end the subscription as-is.
    #[error("Receiving messages from queue '{queue_name}' failed")]
    Receive {
        queue_name: String,
        #[source]
        source: BoxError,
    },

    #[error("Message handler failed for message {message_id}")]
    Handler {
        message_id: String,
        #[source]
        source: BoxError,
    },

    #[error("Dead letter queue not implemented; message {message_id} was abandoned")]
    DeadLetterNotImplemented { message_id: String },

    #[error("Receiver is already subscribed to queue '{queue_name}'")]
    AlreadySubscribed { queue_name: String },

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl MessagingError {
    /// Check if error is transient and the operation may be retried after a back-off
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RateLimit { .. } => true,
            Self::ApiTimeout { .. } => true,
            Self::NoSuchQueue { .. } => false,
            Self::Provider { .. } => false,
            Self::Receive { .. } => false,
            Self::Handler { .. } => false,
            Self::DeadLetterNotImplemented { .. } => false,
            Self::AlreadySubscribed { .. } => false,
            Self::Configuration(_) => false,
            Self::Validation(_) => false,
        }
    }
}

/// Configuration errors, raised while loading configuration or constructing a provider
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Invalid configuration for {key}: {message}")]
    Invalid { key: String, message: String },

    #[error("Unknown messaging service provider: {name}")]
    UnknownProvider { name: String },

    #[error("{provider} not implemented")]
    ProviderNotImplemented { provider: ProviderKind },

    #[error("Configuration loading failed: {message}")]
    Load { message: String },

    #[error("Failed to initialise {provider} client: {message}")]
    Client {
        provider: ProviderKind,
        message: String,
    },
}

/// Validation errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    Required { field: String },

    #[error("Invalid format for {field}: {message}")]
    InvalidFormat { field: String, message: String },
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
