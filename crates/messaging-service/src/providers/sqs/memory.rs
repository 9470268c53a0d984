//! In-process SQS backend for testing and development.
//!
//! [`InMemorySqs`] implements [`SqsApi`] with the parts of SQS behaviour the
//! clients depend on:
//! - queues addressed by name and URL
//! - FIFO delivery order within a queue
//! - visibility windows: a received message is hidden until it is deleted or
//!   its window expires, after which it is delivered again with a new receipt
//!   handle
//! - long polling that returns as soon as a message arrives
//! - deduplication on FIFO queues (names ending in `.fifo`): a deduplication
//!   id seen in the last five minutes is accepted without enqueueing again,
//!   even if the first message was already deleted
//!
//! Every call is recorded so tests can assert on exactly what a client did,
//! and failures can be queued per operation with [`InMemorySqs::fail_next`].

use super::{SendMessageRequest, SqsApi, SqsError, SqsMessage};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;
use tokio::time::{Duration, Instant};

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;

const QUEUE_URL_PREFIX: &str = "https://sqs.in-memory.local/000000000000/";
const DEFAULT_VISIBILITY_TIMEOUT: Duration = Duration::from_secs(30);
const POLL_INTERVAL: Duration = Duration::from_millis(50);
const DEDUPLICATION_INTERVAL: Duration = Duration::from_secs(300);
const FIFO_SUFFIX: &str = ".fifo";

// ============================================================================
// Call Recording
// ============================================================================

/// API operations of the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqsOperation {
    GetQueueUrl,
    SendMessage,
    ReceiveMessages,
    DeleteMessage,
}

/// A recorded call with its arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqsCall {
    GetQueueUrl {
        queue_name: String,
    },
    SendMessage {
        queue_url: String,
        request: SendMessageRequest,
    },
    ReceiveMessages {
        queue_url: String,
        max_number_of_messages: u32,
        wait_time_seconds: u32,
    },
    DeleteMessage {
        queue_url: String,
        receipt_handle: String,
    },
}

impl SqsCall {
    pub fn operation(&self) -> SqsOperation {
        match self {
            Self::GetQueueUrl { .. } => SqsOperation::GetQueueUrl,
            Self::SendMessage { .. } => SqsOperation::SendMessage,
            Self::ReceiveMessages { .. } => SqsOperation::ReceiveMessages,
            Self::DeleteMessage { .. } => SqsOperation::DeleteMessage,
        }
    }
}

// ============================================================================
// Internal Storage Structures
// ============================================================================

#[derive(Clone)]
struct StoredMessage {
    message: SqsMessage,
    visible_at: Instant,
}

struct InMemoryQueue {
    messages: VecDeque<StoredMessage>,
    visibility_timeout: Duration,
    fifo: bool,
    /// Deduplication id to (message id, time first sent)
    sent_deduplication_ids: HashMap<String, (String, Instant)>,
}

impl InMemoryQueue {
    /// Message id of an earlier send with the same deduplication id, if still
    /// inside the deduplication interval
    fn duplicate_of(&mut self, deduplication_id: &str, now: Instant) -> Option<String> {
        self.sent_deduplication_ids
            .retain(|_, (_, sent_at)| now.duration_since(*sent_at) < DEDUPLICATION_INTERVAL);
        self.sent_deduplication_ids
            .get(deduplication_id)
            .map(|(message_id, _)| message_id.clone())
    }

    /// Hand out up to `max` visible messages, hiding each for the visibility window
    fn take_visible(&mut self, max: usize, now: Instant) -> Vec<SqsMessage> {
        let visibility_timeout = self.visibility_timeout;
        self.messages
            .iter_mut()
            .filter(|stored| stored.visible_at <= now)
            .take(max)
            .map(|stored| {
                stored.message.receipt_handle = uuid::Uuid::new_v4().to_string();
                stored.visible_at = now + visibility_timeout;
                stored.message.clone()
            })
            .collect()
    }
}

#[derive(Default)]
struct State {
    queues: HashMap<String, InMemoryQueue>,
    calls: Vec<SqsCall>,
    failures: HashMap<SqsOperation, VecDeque<SqsError>>,
}

impl State {
    /// Record a call and return the failure queued for its operation, if any
    fn record(&mut self, call: SqsCall) -> Result<(), SqsError> {
        let operation = call.operation();
        self.calls.push(call);
        match self
            .failures
            .get_mut(&operation)
            .and_then(VecDeque::pop_front)
        {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn queue_mut(&mut self, queue_url: &str) -> Result<&mut InMemoryQueue, SqsError> {
        queue_url
            .strip_prefix(QUEUE_URL_PREFIX)
            .and_then(|name| self.queues.get_mut(name))
            .ok_or_else(non_existent_queue)
    }
}

fn non_existent_queue() -> SqsError {
    SqsError::service(
        "AWS.SimpleQueueService.NonExistentQueue",
        "The specified queue does not exist for this wsdl version.",
        400,
    )
}

struct Inner {
    state: Mutex<State>,
    arrivals: Notify,
}

// ============================================================================
// Public API
// ============================================================================

/// In-memory [`SqsApi`] implementation
///
/// Clones share the same queues, so one clone can be handed to a client while
/// the test keeps another for setup and inspection.
#[derive(Clone)]
pub struct InMemorySqs {
    inner: Arc<Inner>,
}

impl Default for InMemorySqs {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemorySqs {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::default()),
                arrivals: Notify::new(),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Create a queue with a 30 second visibility timeout, returning its URL
    pub fn create_queue(&self, queue_name: &str) -> String {
        self.create_queue_with_visibility_timeout(queue_name, DEFAULT_VISIBILITY_TIMEOUT)
    }

    /// Create a queue, returning its URL. Creating an existing queue is a no-op.
    pub fn create_queue_with_visibility_timeout(
        &self,
        queue_name: &str,
        visibility_timeout: Duration,
    ) -> String {
        self.state()
            .queues
            .entry(queue_name.to_string())
            .or_insert_with(|| InMemoryQueue {
                messages: VecDeque::new(),
                visibility_timeout,
                fifo: queue_name.ends_with(FIFO_SUFFIX),
                sent_deduplication_ids: HashMap::new(),
            });
        queue_url_for(queue_name)
    }

    /// Number of messages stored in a queue, visible or not
    pub fn queue_depth(&self, queue_name: &str) -> usize {
        self.state()
            .queues
            .get(queue_name)
            .map(|queue| queue.messages.len())
            .unwrap_or(0)
    }

    /// Every call made so far, in order
    pub fn calls(&self) -> Vec<SqsCall> {
        self.state().calls.clone()
    }

    /// Number of calls made for one operation
    pub fn call_count(&self, operation: SqsOperation) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|call| call.operation() == operation)
            .count()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    /// Make the next call of `operation` fail with `error`
    ///
    /// Failures queue up: calling this twice fails the next two calls.
    pub fn fail_next(&self, operation: SqsOperation, error: SqsError) {
        self.state()
            .failures
            .entry(operation)
            .or_default()
            .push_back(error);
    }
}

/// URL the in-memory backend assigns to a queue name
fn queue_url_for(queue_name: &str) -> String {
    format!("{}{}", QUEUE_URL_PREFIX, queue_name)
}

#[async_trait]
impl SqsApi for InMemorySqs {
    async fn get_queue_url(&self, queue_name: &str) -> Result<String, SqsError> {
        let mut state = self.state();
        state.record(SqsCall::GetQueueUrl {
            queue_name: queue_name.to_string(),
        })?;

        if state.queues.contains_key(queue_name) {
            Ok(queue_url_for(queue_name))
        } else {
            Err(non_existent_queue())
        }
    }

    async fn send_message(
        &self,
        queue_url: &str,
        request: &SendMessageRequest,
    ) -> Result<String, SqsError> {
        let message_id = {
            let mut state = self.state();
            state.record(SqsCall::SendMessage {
                queue_url: queue_url.to_string(),
                request: request.clone(),
            })?;
            let queue = state.queue_mut(queue_url)?;
            let now = Instant::now();

            // Standard queues ignore deduplication ids
            let deduplication_id = request
                .message_deduplication_id
                .as_ref()
                .filter(|_| queue.fifo);
            if let Some(dedup) = deduplication_id {
                if let Some(existing) = queue.duplicate_of(dedup, now) {
                    return Ok(existing);
                }
            }

            let message_id = uuid::Uuid::new_v4().to_string();
            if let Some(dedup) = deduplication_id {
                queue
                    .sent_deduplication_ids
                    .insert(dedup.clone(), (message_id.clone(), now));
            }
            queue.messages.push_back(StoredMessage {
                message: SqsMessage {
                    message_id: message_id.clone(),
                    receipt_handle: String::new(),
                    body: request.body.clone(),
                    message_attributes: request
                        .message_attributes
                        .iter()
                        .map(|(k, v)| (k.clone(), v.clone()))
                        .collect(),
                },
                visible_at: now,
            });
            message_id
        };

        self.inner.arrivals.notify_waiters();
        Ok(message_id)
    }

    async fn receive_messages(
        &self,
        queue_url: &str,
        max_number_of_messages: u32,
        wait_time_seconds: u32,
    ) -> Result<Vec<SqsMessage>, SqsError> {
        {
            let mut state = self.state();
            state.record(SqsCall::ReceiveMessages {
                queue_url: queue_url.to_string(),
                max_number_of_messages,
                wait_time_seconds,
            })?;
            state.queue_mut(queue_url)?;
        }

        let max = max_number_of_messages as usize;
        let deadline = Instant::now() + Duration::from_secs(u64::from(wait_time_seconds));

        loop {
            let arrival = self.inner.arrivals.notified();
            let now = Instant::now();
            let messages = self.state().queue_mut(queue_url)?.take_visible(max, now);

            if !messages.is_empty() || now >= deadline {
                return Ok(messages);
            }

            // Woken by a send, or by the interval so expiring windows are noticed
            let wake = deadline.min(now + POLL_INTERVAL);
            let _ = tokio::time::timeout_at(wake, arrival).await;
        }
    }

    async fn delete_message(&self, queue_url: &str, receipt_handle: &str) -> Result<(), SqsError> {
        let mut state = self.state();
        state.record(SqsCall::DeleteMessage {
            queue_url: queue_url.to_string(),
            receipt_handle: receipt_handle.to_string(),
        })?;

        let queue = state.queue_mut(queue_url)?;
        let position = queue
            .messages
            .iter()
            .position(|stored| stored.message.receipt_handle == receipt_handle)
            .ok_or_else(|| {
                SqsError::service(
                    "ReceiptHandleIsInvalid",
                    format!("The receipt handle \"{}\" is not valid.", receipt_handle),
                    400,
                )
            })?;
        queue.messages.remove(position);
        Ok(())
    }
}
