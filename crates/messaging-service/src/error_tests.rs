//! Tests for error types.

use super::*;
use std::error::Error as _;

fn cause(message: &str) -> BoxError {
    Box::new(std::io::Error::new(std::io::ErrorKind::Other, message.to_string()))
}

#[test]
fn test_error_transience() {
    assert!(MessagingError::RateLimit {
        message: "slow down".to_string(),
        source: cause("OverLimit"),
    }
    .is_transient());

    assert!(MessagingError::ApiTimeout {
        message: "timed out".to_string(),
        source: cause("timeout"),
    }
    .is_transient());

    assert!(!MessagingError::NoSuchQueue {
        queue_name: "Ghost".to_string(),
        source: cause("NonExistentQueue"),
    }
    .is_transient());

    assert!(!MessagingError::Provider {
        message: "boom".to_string(),
        source: cause("InternalError"),
    }
    .is_transient());

    assert!(!MessagingError::DeadLetterNotImplemented {
        message_id: "123".to_string(),
    }
    .is_transient());
}

#[test]
fn test_source_is_preserved() {
    let error = MessagingError::RateLimit {
        message: "slow down".to_string(),
        source: cause("OverLimit: too many in-flight messages"),
    };

    let source = error.source().expect("rate limit errors carry their cause");
    assert_eq!(source.to_string(), "OverLimit: too many in-flight messages");
}

#[test]
fn test_provider_not_implemented_message() {
    let error = ConfigurationError::ProviderNotImplemented {
        provider: ProviderKind::PubSub,
    };
    assert_eq!(error.to_string(), "pubsub not implemented");

    let wrapped: MessagingError = error.into();
    assert!(matches!(
        wrapped,
        MessagingError::Configuration(ConfigurationError::ProviderNotImplemented { .. })
    ));
}

#[test]
fn test_no_such_queue_names_queue() {
    let error = MessagingError::NoSuchQueue {
        queue_name: "Ghost".to_string(),
        source: cause("missing"),
    };
    assert_eq!(error.to_string(), "Queue does not exist: Ghost");
}
