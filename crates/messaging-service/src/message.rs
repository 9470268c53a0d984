//! Message envelopes exchanged with the messaging providers.
//!
//! [`OutboundMessage`] is what callers send, [`InboundMessage`] is what the
//! receive path hands to a [`MessageHandler`](crate::client::MessageHandler), and
//! [`ProcessingVerdict`] is the handler's answer deciding what happens to the
//! delivery.
//!
//! Attribute values are plain strings. String is the lowest common denominator
//! across queue services, so richer attribute types are not modelled.

use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ============================================================================
// Outbound
// ============================================================================

/// A message to be sent to a queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    payload: String,
    partition_key: Option<String>,
    deduplication_id: Option<String>,
    attributes: HashMap<String, String>,
}

impl OutboundMessage {
    /// Start building a message
    pub fn builder() -> OutboundMessageBuilder {
        OutboundMessageBuilder::default()
    }

    /// Start building a message with the given payload
    pub fn for_payload(payload: impl Into<String>) -> OutboundMessageBuilder {
        OutboundMessageBuilder::default().payload(payload)
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    /// Grouping key for ordered delivery on providers that support it
    pub fn partition_key(&self) -> Option<&str> {
        self.partition_key.as_deref()
    }

    /// Explicit deduplication id for providers with deduplicating queues
    pub fn deduplication_id(&self) -> Option<&str> {
        self.deduplication_id.as_deref()
    }

    pub fn attributes(&self) -> &HashMap<String, String> {
        &self.attributes
    }
}

/// Accumulating builder for [`OutboundMessage`]
///
/// Every step updates the same builder, so attributes added before the payload
/// are kept.
#[derive(Debug, Clone, Default)]
pub struct OutboundMessageBuilder {
    payload: Option<String>,
    partition_key: Option<String>,
    deduplication_id: Option<String>,
    attributes: HashMap<String, String>,
}

impl OutboundMessageBuilder {
    pub fn payload(mut self, payload: impl Into<String>) -> Self {
        self.payload = Some(payload.into());
        self
    }

    pub fn partition_key(mut self, partition_key: impl Into<String>) -> Self {
        self.partition_key = Some(partition_key.into());
        self
    }

    pub fn deduplication_id(mut self, deduplication_id: impl Into<String>) -> Self {
        self.deduplication_id = Some(deduplication_id.into());
        self
    }

    /// Add a single attribute, replacing any previous value for the key
    pub fn attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Add all attributes from an iterator of key/value pairs
    pub fn attributes<I, K, V>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.attributes
            .extend(attributes.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Finish the message
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::Required`] if no payload was given.
    pub fn build(self) -> Result<OutboundMessage, ValidationError> {
        let payload = self.payload.ok_or_else(|| ValidationError::Required {
            field: "payload".to_string(),
        })?;

        Ok(OutboundMessage {
            payload,
            partition_key: self.partition_key,
            deduplication_id: self.deduplication_id,
            attributes: self.attributes,
        })
    }
}

// ============================================================================
// Inbound
// ============================================================================

/// A message delivered from a queue
///
/// The completion handle identifies this particular delivery. A redelivered
/// message keeps its id but gets a new handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    id: String,
    completion_handle: Option<String>,
    payload: String,
    attributes: HashMap<String, String>,
}

impl InboundMessage {
    pub fn builder() -> InboundMessageBuilder {
        InboundMessageBuilder::default()
    }

    pub(crate) fn from_parts(
        id: String,
        completion_handle: Option<String>,
        payload: String,
        attributes: HashMap<String, String>,
    ) -> Self {
        Self {
            id,
            completion_handle,
            payload,
            attributes,
        }
    }

    /// Provider-assigned message id
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Token required to acknowledge this delivery
    pub fn completion_handle(&self) -> Option<&str> {
        self.completion_handle.as_deref()
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    pub fn attributes(&self) -> &HashMap<String, String> {
        &self.attributes
    }

    /// Look up a single attribute value
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }
}

/// Accumulating builder for [`InboundMessage`]
#[derive(Debug, Clone, Default)]
pub struct InboundMessageBuilder {
    id: Option<String>,
    completion_handle: Option<String>,
    payload: Option<String>,
    attributes: HashMap<String, String>,
}

impl InboundMessageBuilder {
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn completion_handle(mut self, handle: impl Into<String>) -> Self {
        self.completion_handle = Some(handle.into());
        self
    }

    pub fn payload(mut self, payload: impl Into<String>) -> Self {
        self.payload = Some(payload.into());
        self
    }

    pub fn attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn attributes<I, K, V>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.attributes
            .extend(attributes.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Finish the message
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::Required`] if the id or payload is missing.
    pub fn build(self) -> Result<InboundMessage, ValidationError> {
        let id = self.id.ok_or_else(|| ValidationError::Required {
            field: "id".to_string(),
        })?;
        let payload = self.payload.ok_or_else(|| ValidationError::Required {
            field: "payload".to_string(),
        })?;

        Ok(InboundMessage {
            id,
            completion_handle: self.completion_handle,
            payload,
            attributes: self.attributes,
        })
    }
}

// ============================================================================
// Verdict
// ============================================================================

/// Outcome of handling a single delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingVerdict {
    /// Handled successfully; the delivery is acknowledged and removed from the queue.
    Processed,
    /// Not consumed; the message stays in the queue and is redelivered once its
    /// visibility window expires.
    Skipped,
    /// Permanently faulty. Dead-letter routing is not implemented, so the
    /// consumer stops with [`MessagingError::DeadLetterNotImplemented`].
    ///
    /// [`MessagingError::DeadLetterNotImplemented`]: crate::error::MessagingError::DeadLetterNotImplemented
    Abandoned,
}

impl std::fmt::Display for ProcessingVerdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::Processed => "processed",
            Self::Skipped => "skipped",
            Self::Abandoned => "abandoned",
        };
        write!(f, "{}", text)
    }
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
