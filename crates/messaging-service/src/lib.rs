//! # Messaging Service
//!
//! Cloud-agnostic message sending and polling consumers over queue services.
//!
//! This library provides:
//! - Immutable message envelopes built through accumulating builders
//! - A sender that resolves queue names to addresses once and sends messages
//! - A long-polling receiver that dispatches every delivery to a handler and
//!   acknowledges it according to the handler's verdict
//! - Classification of provider failures into rate limit, missing queue,
//!   timeout and generic errors
//! - Provider selection from an explicit configuration value
//!
//! ## Module Organization
//!
//! - [`error`] - Error types for all messaging operations
//! - [`message`] - Outbound and inbound envelopes and processing verdicts
//! - [`provider`] - Provider kinds and configuration
//! - [`resolver`] - Queue address cache
//! - [`client`] - Sender, receiver and handler contracts plus the factory
//! - [`providers`] - Provider implementations (AWS SQS)
//!
//! ## Example
//!
//! ```no_run
//! use messaging_service::{
//!     InboundMessage, MessageReceiver, MessageSender, MessagingConfig,
//!     MessagingServiceFactory, OutboundMessage, ProcessingVerdict,
//! };
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = MessagingConfig::from_env()?;
//!
//! let sender = MessagingServiceFactory::create_sender(&config)?;
//! let message = OutboundMessage::for_payload("Hello World")
//!     .attribute("attr1", "value1")
//!     .build()?;
//! sender.send_message("MyQ", &message).await?;
//!
//! let receiver = MessagingServiceFactory::create_receiver(&config)?;
//! let stop = receiver.stop_handle();
//! let handler = move |message: InboundMessage| {
//!     println!("{}", message.payload());
//!     stop.stop();
//!     ProcessingVerdict::Processed
//! };
//! receiver.subscribe("MyQ", &handler).await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod message;
pub mod provider;
pub mod providers;
pub mod resolver;

// Re-export commonly used types at crate root for convenience
pub use client::{
    HandlerError, MessageHandler, MessageReceiver, MessageSender, MessagingServiceFactory,
    StopHandle,
};
pub use error::{BoxError, ConfigurationError, MessagingError, ValidationError};
pub use message::{
    InboundMessage, InboundMessageBuilder, OutboundMessage, OutboundMessageBuilder,
    ProcessingVerdict,
};
pub use provider::{AwsCredentials, MessagingConfig, ProviderKind};
pub use providers::{
    InMemorySqs, SqsCall, SqsError, SqsMessageReceiver, SqsMessageSender, SqsOperation,
};
pub use resolver::QueueAddressResolver;

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
