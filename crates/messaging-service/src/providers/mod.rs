//! Messaging provider implementations.
//!
//! Each provider implements the [`MessageSender`](crate::client::MessageSender)
//! and [`MessageReceiver`](crate::client::MessageReceiver) contracts for one
//! backend. SQS is the only implemented provider.

pub mod sqs;

pub use sqs::{
    map_sqs_error, HttpSqsClient, InMemorySqs, SqsApi, SqsCall, SqsError, SqsMessageReceiver,
    SqsMessageSender, SqsOperation,
};
