//! Client contracts for sending and consuming messages.
//!
//! - [`MessageSender`] sends one [`OutboundMessage`] to a named queue.
//! - [`MessageReceiver`] runs a polling subscription on a named queue, handing
//!   every delivery to a [`MessageHandler`] and acting on its
//!   [`ProcessingVerdict`].
//! - [`MessagingServiceFactory`] picks the implementation for a
//!   [`MessagingConfig`].
//!
//! A subscription occupies the task that calls
//! [`subscribe`](MessageReceiver::subscribe) until it is stopped, so callers
//! usually spawn it and keep a [`StopHandle`] to end it from elsewhere.

use crate::error::{BoxError, ConfigurationError, MessagingError};
use crate::message::{InboundMessage, OutboundMessage, ProcessingVerdict};
use crate::provider::{MessagingConfig, ProviderKind};
use crate::providers::{SqsMessageReceiver, SqsMessageSender};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;

/// Error a handler may return to end the subscription
pub type HandlerError = BoxError;

/// User code invoked once per delivery
///
/// Handlers run on the subscription's task; a handler that never returns
/// stalls the subscription.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: InboundMessage) -> Result<ProcessingVerdict, HandlerError>;
}

/// Plain closures returning a verdict are handlers
#[async_trait]
impl<F> MessageHandler for F
where
    F: Fn(InboundMessage) -> ProcessingVerdict + Send + Sync,
{
    async fn handle(&self, message: InboundMessage) -> Result<ProcessingVerdict, HandlerError> {
        Ok(self(message))
    }
}

/// Sends messages to queues
#[async_trait]
pub trait MessageSender: Send + Sync {
    /// Send one message, returning the provider-assigned message id
    ///
    /// # Errors
    ///
    /// Provider failures are classified: throttling is
    /// [`MessagingError::RateLimit`], a missing queue is
    /// [`MessagingError::NoSuchQueue`] and a call timeout is
    /// [`MessagingError::ApiTimeout`].
    async fn send_message(
        &self,
        queue_name: &str,
        message: &OutboundMessage,
    ) -> Result<String, MessagingError>;

    /// Release the backend connection
    fn close(self: Box<Self>);

    fn provider_kind(&self) -> ProviderKind;
}

/// Polling consumer bound to one queue at a time
///
/// A receiver is either stopped or running a single subscription.
#[async_trait]
pub trait MessageReceiver: Send + Sync {
    /// Poll `queue_name` and dispatch every delivery to `handler` until stopped
    ///
    /// Each iteration long-polls for a batch and handles its messages in the
    /// order received. `Processed` deliveries are deleted before the next
    /// message is handled, `Skipped` deliveries are left for redelivery and an
    /// `Abandoned` delivery ends the subscription with
    /// [`MessagingError::DeadLetterNotImplemented`].
    ///
    /// Returns `Ok(())` once [`stop`](Self::stop) is observed at the top of
    /// the loop. A stop requested during a receive call takes effect after that
    /// call's batch has been handled.
    ///
    /// # Errors
    ///
    /// Fails with [`MessagingError::AlreadySubscribed`] if a subscription is
    /// already running, and ends the subscription on the first receive,
    /// handler or delete failure.
    async fn subscribe(
        &self,
        queue_name: &str,
        handler: &dyn MessageHandler,
    ) -> Result<(), MessagingError>;

    /// Ask the running subscription to exit. Safe to call from the handler.
    fn stop(&self);

    /// Handle that can stop this receiver from another task
    fn stop_handle(&self) -> StopHandle;

    /// Whether a subscription is currently running
    fn is_running(&self) -> bool;
}

/// Shared stop flag of a receiver
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    requested: Arc<AtomicBool>,
}

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// Clear a previous request when a new subscription starts
    pub(crate) fn reset(&self) {
        self.requested.store(false, Ordering::SeqCst);
    }
}

/// Factory for creating messaging clients for the configured provider
pub struct MessagingServiceFactory;

impl MessagingServiceFactory {
    /// Create a sender for the configured provider
    ///
    /// # Errors
    ///
    /// Reserved providers fail with [`ConfigurationError::ProviderNotImplemented`];
    /// an invalid configuration fails before any connection is made.
    pub fn create_sender(
        config: &MessagingConfig,
    ) -> Result<Box<dyn MessageSender>, MessagingError> {
        match config.provider {
            ProviderKind::Sqs => Ok(Box::new(SqsMessageSender::new(config)?)),
            provider @ (ProviderKind::PubSub | ProviderKind::EventGrid) => {
                Err(ConfigurationError::ProviderNotImplemented { provider }.into())
            }
        }
    }

    /// Create a receiver for the configured provider
    ///
    /// # Errors
    ///
    /// Same as [`create_sender`](Self::create_sender).
    pub fn create_receiver(
        config: &MessagingConfig,
    ) -> Result<Box<dyn MessageReceiver>, MessagingError> {
        match config.provider {
            ProviderKind::Sqs => Ok(Box::new(SqsMessageReceiver::new(config)?)),
            provider @ (ProviderKind::PubSub | ProviderKind::EventGrid) => {
                Err(ConfigurationError::ProviderNotImplemented { provider }.into())
            }
        }
    }
}
