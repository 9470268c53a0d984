//! Translation of SQS failures into the messaging error taxonomy.

use super::SqsError;
use crate::error::MessagingError;

/// Error codes SQS uses when a caller is being throttled
const RATE_LIMIT_CODES: &[&str] = &[
    "OverLimit",
    "Throttling",
    "ThrottlingException",
    "RequestThrottled",
    "AWS.SimpleQueueService.RequestThrottled",
];

/// Error codes SQS uses for a queue that does not exist
const MISSING_QUEUE_CODES: &[&str] = &["AWS.SimpleQueueService.NonExistentQueue", "QueueDoesNotExist"];

/// Classify an SQS failure
///
/// Throttling becomes [`MessagingError::RateLimit`], a missing queue becomes
/// [`MessagingError::NoSuchQueue`], a client-side call timeout becomes
/// [`MessagingError::ApiTimeout`] and everything else is a generic
/// [`MessagingError::Provider`]. The SQS error is kept as the source.
pub fn map_sqs_error(error: SqsError, queue_name: &str) -> MessagingError {
    if is_rate_limited(&error) {
        return MessagingError::RateLimit {
            message: error.to_string(),
            source: Box::new(error),
        };
    }

    if is_missing_queue(&error) {
        return MessagingError::NoSuchQueue {
            queue_name: queue_name.to_string(),
            source: Box::new(error),
        };
    }

    if matches!(error, SqsError::Timeout(_)) {
        return MessagingError::ApiTimeout {
            message: error.to_string(),
            source: Box::new(error),
        };
    }

    MessagingError::Provider {
        message: error.to_string(),
        source: Box::new(error),
    }
}

fn is_rate_limited(error: &SqsError) -> bool {
    match error {
        SqsError::Service { code, status, .. } => {
            *status == 429 || RATE_LIMIT_CODES.contains(&code.as_str())
        }
        _ => false,
    }
}

fn is_missing_queue(error: &SqsError) -> bool {
    error
        .code()
        .map(|code| MISSING_QUEUE_CODES.contains(&code))
        .unwrap_or(false)
}

#[cfg(test)]
#[path = "errors_tests.rs"]
mod tests;
