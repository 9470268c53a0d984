//! SQS implementation of [`MessageSender`].

use super::{
    map_sqs_error, HttpSqsClient, MessageAttributeValue, SendMessageRequest, SqsApi,
    SqsConnection,
};
use crate::client::MessageSender;
use crate::error::MessagingError;
use crate::message::OutboundMessage;
use crate::provider::{MessagingConfig, ProviderKind};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

#[cfg(test)]
#[path = "sender_tests.rs"]
mod tests;

/// Sends messages to SQS queues
///
/// Queue URLs are looked up on first use and cached for the lifetime of the
/// sender.
pub struct SqsMessageSender {
    connection: SqsConnection,
}

impl SqsMessageSender {
    /// Create a sender talking to SQS over HTTP
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `config` is invalid.
    pub fn new(config: &MessagingConfig) -> Result<Self, MessagingError> {
        config.validate()?;
        let client = HttpSqsClient::new(config)?;
        Ok(Self::with_api(Arc::new(client)))
    }

    /// Create a sender on top of any [`SqsApi`] backend
    pub fn with_api(api: Arc<dyn SqsApi>) -> Self {
        Self {
            connection: SqsConnection::new(api),
        }
    }

    /// Pre-populate the queue URL cache, skipping the lookup for `queue_name`
    pub async fn seed_queue_url(&self, queue_name: &str, queue_url: &str) {
        self.connection.resolver().seed(queue_name, queue_url).await;
    }

    /// Send one message, returning the SQS message id
    ///
    /// Attributes are sent as `String` attributes. The partition key becomes
    /// the message group id and the deduplication id is passed through; both
    /// are only accepted by FIFO queues.
    pub async fn send(
        &self,
        queue_name: &str,
        message: &OutboundMessage,
    ) -> Result<String, MessagingError> {
        let queue_url = self.connection.queue_url(queue_name).await?;

        let request = SendMessageRequest {
            body: message.payload().to_string(),
            message_attributes: message
                .attributes()
                .iter()
                .map(|(k, v)| (k.clone(), MessageAttributeValue::string(v.as_str())))
                .collect(),
            message_group_id: message.partition_key().map(str::to_string),
            message_deduplication_id: message.deduplication_id().map(str::to_string),
        };

        let message_id = self
            .connection
            .api()
            .send_message(&queue_url, &request)
            .await
            .map_err(|e| map_sqs_error(e, queue_name))?;

        debug!(
            queue_name = %queue_name,
            message_id = %message_id,
            attribute_count = request.message_attributes.len(),
            "Message sent"
        );

        Ok(message_id)
    }

    /// Release the connection
    pub fn close(self) {
        info!("Closing SQS sender");
        drop(self.connection);
    }
}

#[async_trait]
impl MessageSender for SqsMessageSender {
    async fn send_message(
        &self,
        queue_name: &str,
        message: &OutboundMessage,
    ) -> Result<String, MessagingError> {
        self.send(queue_name, message).await
    }

    fn close(self: Box<Self>) {
        SqsMessageSender::close(*self);
    }

    fn provider_kind(&self) -> ProviderKind {
        ProviderKind::Sqs
    }
}
