//! SQS implementation of [`MessageReceiver`].
//!
//! The subscription loop:
//!
//! ```text
//! resolve queue URL
//! while stop not requested:
//!     batch = ReceiveMessage(max, wait)        // long poll
//!     for message in batch (in order):
//!         verdict = handler(message)
//!         Processed -> DeleteMessage(receipt handle)
//!         Skipped   -> leave for redelivery
//!         Abandoned -> fail: dead letter routing is not implemented
//! ```
//!
//! The stop flag is only checked between batches, so stopping from inside the
//! handler lets the rest of the current batch be handled first.

use super::{map_sqs_error, HttpSqsClient, SqsApi, SqsConnection, SqsMessage};
use crate::client::{MessageHandler, MessageReceiver, StopHandle};
use crate::error::MessagingError;
use crate::message::{InboundMessage, ProcessingVerdict};
use crate::provider::{MessagingConfig, MAX_NUMBER_OF_MESSAGES};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[cfg(test)]
#[path = "receiver_tests.rs"]
mod tests;

/// Long-polling consumer for SQS queues
pub struct SqsMessageReceiver {
    connection: SqsConnection,
    max_number_of_messages: u32,
    wait_time_seconds: u32,
    running: AtomicBool,
    stop: StopHandle,
}

/// Marks the receiver stopped when the subscription ends, however it ends
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl SqsMessageReceiver {
    /// Create a receiver talking to SQS over HTTP
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `config` is invalid.
    pub fn new(config: &MessagingConfig) -> Result<Self, MessagingError> {
        let client = HttpSqsClient::new(config)?;
        Self::with_api(Arc::new(client), config)
    }

    /// Create a receiver on top of any [`SqsApi`] backend
    ///
    /// Only the batch size and wait time are taken from `config`.
    pub fn with_api(
        api: Arc<dyn SqsApi>,
        config: &MessagingConfig,
    ) -> Result<Self, MessagingError> {
        config.validate()?;
        Ok(Self {
            connection: SqsConnection::new(api),
            max_number_of_messages: config.max_number_of_messages,
            wait_time_seconds: config.wait_time_seconds,
            running: AtomicBool::new(false),
            stop: StopHandle::new(),
        })
    }

    /// Receive up to `max_messages` without waiting and without a handler
    ///
    /// `max_messages` is clamped to the range SQS accepts. The messages stay
    /// invisible for the queue's visibility window; complete them with
    /// [`complete_message`](Self::complete_message) or let them be redelivered.
    ///
    /// # Errors
    ///
    /// Returns the classified SQS error.
    pub async fn receive_messages(
        &self,
        queue_name: &str,
        max_messages: u32,
    ) -> Result<Vec<InboundMessage>, MessagingError> {
        let queue_url = self.connection.queue_url(queue_name).await?;
        let max = max_messages.clamp(1, MAX_NUMBER_OF_MESSAGES);

        let messages = self
            .connection
            .api()
            .receive_messages(&queue_url, max, 0)
            .await
            .map_err(|e| map_sqs_error(e, queue_name))?;

        Ok(messages.into_iter().map(to_inbound).collect())
    }

    /// Delete a delivery using its completion handle
    ///
    /// # Errors
    ///
    /// Returns the classified SQS error, e.g. for an expired handle.
    pub async fn complete_message(
        &self,
        queue_name: &str,
        completion_handle: &str,
    ) -> Result<(), MessagingError> {
        let queue_url = self.connection.queue_url(queue_name).await?;
        self.connection
            .api()
            .delete_message(&queue_url, completion_handle)
            .await
            .map_err(|e| map_sqs_error(e, queue_name))
    }

    async fn poll_loop(
        &self,
        queue_name: &str,
        queue_url: &str,
        handler: &dyn MessageHandler,
    ) -> Result<(), MessagingError> {
        while !self.stop.is_stop_requested() {
            let batch = self
                .connection
                .api()
                .receive_messages(
                    queue_url,
                    self.max_number_of_messages,
                    self.wait_time_seconds,
                )
                .await
                .map_err(|e| MessagingError::Receive {
                    queue_name: queue_name.to_string(),
                    source: Box::new(e),
                })?;

            if batch.is_empty() {
                continue;
            }
            debug!(queue_name = %queue_name, count = batch.len(), "Received batch");

            for message in batch {
                self.dispatch(queue_name, queue_url, handler, message).await?;
            }
        }

        Ok(())
    }

    /// Hand one delivery to the handler and act on its verdict
    async fn dispatch(
        &self,
        queue_name: &str,
        queue_url: &str,
        handler: &dyn MessageHandler,
        message: SqsMessage,
    ) -> Result<(), MessagingError> {
        let receipt_handle = message.receipt_handle.clone();
        let inbound = to_inbound(message);
        let message_id = inbound.id().to_string();

        let verdict = handler
            .handle(inbound)
            .await
            .map_err(|source| MessagingError::Handler {
                message_id: message_id.clone(),
                source,
            })?;

        match verdict {
            ProcessingVerdict::Processed => {
                self.connection
                    .api()
                    .delete_message(queue_url, &receipt_handle)
                    .await
                    .map_err(|e| map_sqs_error(e, queue_name))?;
                debug!(
                    queue_name = %queue_name,
                    message_id = %message_id,
                    "Message processed and deleted"
                );
            }
            ProcessingVerdict::Skipped => {
                debug!(
                    queue_name = %queue_name,
                    message_id = %message_id,
                    "Message skipped, left for redelivery"
                );
            }
            ProcessingVerdict::Abandoned => {
                warn!(
                    queue_name = %queue_name,
                    message_id = %message_id,
                    "Message abandoned but no dead letter queue is available"
                );
                return Err(MessagingError::DeadLetterNotImplemented { message_id });
            }
        }

        Ok(())
    }
}

/// Build the inbound envelope, flattening attribute values to text
fn to_inbound(message: SqsMessage) -> InboundMessage {
    let attributes = message
        .message_attributes
        .into_iter()
        .map(|(name, value)| (name, value.into_text()))
        .collect();

    InboundMessage::from_parts(
        message.message_id,
        Some(message.receipt_handle),
        message.body,
        attributes,
    )
}

#[async_trait]
impl MessageReceiver for SqsMessageReceiver {
    async fn subscribe(
        &self,
        queue_name: &str,
        handler: &dyn MessageHandler,
    ) -> Result<(), MessagingError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(MessagingError::AlreadySubscribed {
                queue_name: queue_name.to_string(),
            });
        }
        let _running = RunningGuard(&self.running);
        self.stop.reset();

        let queue_url = self.connection.queue_url(queue_name).await?;
        info!(
            queue_name = %queue_name,
            max_number_of_messages = self.max_number_of_messages,
            wait_time_seconds = self.wait_time_seconds,
            "Subscription started"
        );

        let result = self.poll_loop(queue_name, &queue_url, handler).await;
        match &result {
            Ok(()) => info!(queue_name = %queue_name, "Subscription stopped"),
            Err(e) => warn!(queue_name = %queue_name, error = %e, "Subscription ended with error"),
        }
        result
    }

    fn stop(&self) {
        self.stop.stop();
    }

    fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}
