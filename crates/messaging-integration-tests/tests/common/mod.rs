//! Common test utilities for messaging-service integration tests
//!
//! This module provides:
//! - A fixture wiring a sender and a receiver to one in-memory SQS backend
//! - A recording handler with a configurable verdict and message budget
//! - Helpers for running a subscription on its own task

#![allow(dead_code)]

use async_trait::async_trait;
use messaging_service::{
    HandlerError, InMemorySqs, InboundMessage, MessageHandler, MessageReceiver, MessagingConfig,
    MessagingError, ProcessingVerdict, SqsMessageReceiver, SqsMessageSender, StopHandle,
};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Duration;

/// Sender and receiver sharing one in-memory backend
pub struct Fixture {
    pub sqs: InMemorySqs,
    pub sender: SqsMessageSender,
    pub receiver: Arc<SqsMessageReceiver>,
}

impl Fixture {
    /// Fixture whose receiver long-polls for `wait_time_seconds`
    pub fn new(wait_time_seconds: u32) -> Self {
        let sqs = InMemorySqs::new();
        let config = MessagingConfig {
            wait_time_seconds,
            ..MessagingConfig::default()
        };

        let sender = SqsMessageSender::with_api(Arc::new(sqs.clone()));
        let receiver = SqsMessageReceiver::with_api(Arc::new(sqs.clone()), &config)
            .expect("default configuration is valid");

        Self {
            sqs,
            sender,
            receiver: Arc::new(receiver),
        }
    }

    /// Run a subscription on its own task
    pub fn spawn_subscription(
        &self,
        queue_name: &str,
        handler: Arc<RecordingHandler>,
    ) -> JoinHandle<Result<(), MessagingError>> {
        let receiver = Arc::clone(&self.receiver);
        let queue_name = queue_name.to_string();
        tokio::spawn(async move { receiver.subscribe(&queue_name, handler.as_ref()).await })
    }
}

/// Handler recording every delivery it sees
pub struct RecordingHandler {
    stop: StopHandle,
    verdict: ProcessingVerdict,
    stop_after: Option<usize>,
    seen: Mutex<Vec<InboundMessage>>,
}

impl RecordingHandler {
    pub fn new(stop: StopHandle, verdict: ProcessingVerdict, stop_after: Option<usize>) -> Self {
        Self {
            stop,
            verdict,
            stop_after,
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn seen(&self) -> Vec<InboundMessage> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessageHandler for RecordingHandler {
    async fn handle(&self, message: InboundMessage) -> Result<ProcessingVerdict, HandlerError> {
        let mut seen = self.seen.lock().unwrap();
        seen.push(message);
        if self.stop_after.is_some_and(|limit| seen.len() >= limit) {
            self.stop.stop();
        }
        Ok(self.verdict)
    }
}

/// Wait for a spawned subscription, failing the test if it does not end in time
pub async fn join_subscription(
    task: JoinHandle<Result<(), MessagingError>>,
) -> Result<(), MessagingError> {
    tokio::time::timeout(Duration::from_secs(10), task)
        .await
        .expect("subscription did not stop in time")
        .expect("subscription task panicked")
}
