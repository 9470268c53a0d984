//! AWS SQS provider.
//!
//! The provider is split along the seam between the cloud-agnostic clients and
//! the SQS API itself:
//!
//! - [`SqsApi`] is the backend contract: queue URL lookup, send, long-poll
//!   receive and delete.
//! - [`HttpSqsClient`] implements it against the SQS query API with AWS
//!   Signature V4 request signing.
//! - [`InMemorySqs`] implements it in process, for tests and local development.
//! - [`SqsMessageSender`] and [`SqsMessageReceiver`] implement the
//!   [`MessageSender`](crate::client::MessageSender) and
//!   [`MessageReceiver`](crate::client::MessageReceiver) contracts on top of any
//!   [`SqsApi`].
//! - [`map_sqs_error`] translates [`SqsError`] into [`MessagingError`].

use crate::error::MessagingError;
use crate::resolver::QueueAddressResolver;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

mod errors;
mod http;
mod memory;
mod receiver;
mod sender;

pub use errors::map_sqs_error;
pub use http::HttpSqsClient;
pub use memory::{InMemorySqs, SqsCall, SqsOperation};
pub use receiver::SqsMessageReceiver;
pub use sender::SqsMessageSender;

/// Data type tag used for every attribute this crate sends.
pub const STRING_DATA_TYPE: &str = "String";

// ============================================================================
// Error Types
// ============================================================================

/// AWS SQS specific errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SqsError {
    /// SQS answered with an error document
    #[error("{code}: {message}")]
    Service {
        code: String,
        message: String,
        status: u16,
    },

    /// The HTTP call did not complete within the configured API call timeout
    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Malformed SQS response: {0}")]
    Response(String),
}

impl SqsError {
    pub fn service(code: impl Into<String>, message: impl Into<String>, status: u16) -> Self {
        Self::Service {
            code: code.into(),
            message: message.into(),
            status,
        }
    }

    /// SQS error code, for service errors
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Service { code, .. } => Some(code),
            _ => None,
        }
    }
}

// ============================================================================
// Wire Types
// ============================================================================

/// Typed attribute value as SQS stores it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageAttributeValue {
    pub data_type: String,
    pub string_value: Option<String>,
    pub binary_value: Option<String>,
}

impl MessageAttributeValue {
    /// String-typed attribute value
    pub fn string(value: impl Into<String>) -> Self {
        Self {
            data_type: STRING_DATA_TYPE.to_string(),
            string_value: Some(value.into()),
            binary_value: None,
        }
    }

    /// Value flattened to text; binary values stay base64 encoded
    pub fn into_text(self) -> String {
        self.string_value.or(self.binary_value).unwrap_or_default()
    }
}

/// Parameters of a SendMessage call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendMessageRequest {
    pub body: String,
    pub message_attributes: BTreeMap<String, MessageAttributeValue>,
    pub message_group_id: Option<String>,
    pub message_deduplication_id: Option<String>,
}

/// A message as returned by ReceiveMessage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqsMessage {
    pub message_id: String,
    pub receipt_handle: String,
    pub body: String,
    pub message_attributes: HashMap<String, MessageAttributeValue>,
}

// ============================================================================
// Backend Contract
// ============================================================================

/// Operations the SQS clients need from the service
#[async_trait]
pub trait SqsApi: Send + Sync {
    /// Resolve a queue name to its URL
    async fn get_queue_url(&self, queue_name: &str) -> Result<String, SqsError>;

    /// Send a message, returning the SQS message id
    async fn send_message(
        &self,
        queue_url: &str,
        request: &SendMessageRequest,
    ) -> Result<String, SqsError>;

    /// Long-poll for up to `max_number_of_messages`, waiting up to
    /// `wait_time_seconds` for the first one. All message attributes are
    /// requested.
    async fn receive_messages(
        &self,
        queue_url: &str,
        max_number_of_messages: u32,
        wait_time_seconds: u32,
    ) -> Result<Vec<SqsMessage>, SqsError>;

    /// Delete one delivery using its receipt handle
    async fn delete_message(&self, queue_url: &str, receipt_handle: &str) -> Result<(), SqsError>;
}

/// Backend handle and queue URL cache owned by a single client
pub(crate) struct SqsConnection {
    api: Arc<dyn SqsApi>,
    resolver: QueueAddressResolver,
}

impl SqsConnection {
    pub(crate) fn new(api: Arc<dyn SqsApi>) -> Self {
        Self {
            api,
            resolver: QueueAddressResolver::new(),
        }
    }

    pub(crate) fn api(&self) -> &dyn SqsApi {
        self.api.as_ref()
    }

    pub(crate) fn resolver(&self) -> &QueueAddressResolver {
        &self.resolver
    }

    /// Queue URL for a name, looked up through the cache
    pub(crate) async fn queue_url(&self, queue_name: &str) -> Result<String, MessagingError> {
        let api = &self.api;
        self.resolver
            .resolve_with(queue_name, |name| async move {
                api.get_queue_url(&name)
                    .await
                    .map_err(|e| map_sqs_error(e, &name))
            })
            .await
    }
}
