//! Tests for the SQS message sender.

use super::*;
use crate::providers::sqs::{InMemorySqs, SqsCall, SqsError, SqsOperation};
use std::collections::BTreeMap;

fn sender_with_queue(queue_name: &str) -> (SqsMessageSender, InMemorySqs, String) {
    let sqs = InMemorySqs::new();
    let url = sqs.create_queue(queue_name);
    let sender = SqsMessageSender::with_api(Arc::new(sqs.clone()));
    (sender, sqs, url)
}

fn sent_requests(sqs: &InMemorySqs) -> Vec<SendMessageRequest> {
    sqs.calls()
        .into_iter()
        .filter_map(|call| match call {
            SqsCall::SendMessage { request, .. } => Some(request),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_send_translates_message_to_request() {
    let (sender, sqs, _) = sender_with_queue("MyQ");
    let message = OutboundMessage::for_payload("Hello World")
        .attribute("attr1", "value1")
        .attribute("attr2", "value2")
        .partition_key("orders")
        .deduplication_id("order-42")
        .build()
        .unwrap();

    sender.send("MyQ", &message).await.unwrap();

    let mut expected_attributes = BTreeMap::new();
    expected_attributes.insert("attr1".to_string(), MessageAttributeValue::string("value1"));
    expected_attributes.insert("attr2".to_string(), MessageAttributeValue::string("value2"));

    assert_eq!(
        sent_requests(&sqs),
        vec![SendMessageRequest {
            body: "Hello World".to_string(),
            message_attributes: expected_attributes,
            message_group_id: Some("orders".to_string()),
            message_deduplication_id: Some("order-42".to_string()),
        }]
    );
}

#[tokio::test]
async fn test_send_without_partition_key_omits_group_id() {
    let (sender, sqs, _) = sender_with_queue("MyQ");
    let message = OutboundMessage::for_payload("plain").build().unwrap();

    sender.send("MyQ", &message).await.unwrap();

    let requests = sent_requests(&sqs);
    assert_eq!(requests[0].message_group_id, None);
    assert_eq!(requests[0].message_deduplication_id, None);
    assert!(requests[0].message_attributes.is_empty());
}

#[tokio::test]
async fn test_send_returns_message_id_and_enqueues() {
    let (sender, sqs, _) = sender_with_queue("MyQ");
    let message = OutboundMessage::for_payload("hello").build().unwrap();

    let id = sender.send("MyQ", &message).await.unwrap();

    assert!(!id.is_empty());
    assert_eq!(sqs.queue_depth("MyQ"), 1);
}

#[tokio::test]
async fn test_queue_url_is_looked_up_once() {
    let (sender, sqs, url) = sender_with_queue("MyQ");
    let message = OutboundMessage::for_payload("hello").build().unwrap();

    for _ in 0..3 {
        sender.send("MyQ", &message).await.unwrap();
    }

    assert_eq!(sqs.call_count(SqsOperation::GetQueueUrl), 1);
    assert!(sqs.calls().iter().all(|call| match call {
        SqsCall::SendMessage { queue_url, .. } => queue_url == &url,
        _ => true,
    }));
}

#[tokio::test]
async fn test_seeded_queue_url_skips_lookup() {
    let (sender, sqs, url) = sender_with_queue("MyQ");
    sender.seed_queue_url("MyQ", &url).await;

    let message = OutboundMessage::for_payload("hello").build().unwrap();
    sender.send("MyQ", &message).await.unwrap();

    assert_eq!(sqs.call_count(SqsOperation::GetQueueUrl), 0);
}

#[tokio::test]
async fn test_send_to_missing_queue_is_no_such_queue() {
    let (sender, sqs, _) = sender_with_queue("MyQ");
    let message = OutboundMessage::for_payload("hello").build().unwrap();

    let error = sender.send("Ghost", &message).await.unwrap_err();

    match error {
        MessagingError::NoSuchQueue { queue_name, .. } => assert_eq!(queue_name, "Ghost"),
        other => panic!("expected NoSuchQueue, got {:?}", other),
    }
    assert_eq!(sqs.call_count(SqsOperation::SendMessage), 0);
}

#[tokio::test]
async fn test_over_limit_on_send_is_rate_limit() {
    let (sender, sqs, _) = sender_with_queue("MyQ");
    sqs.fail_next(
        SqsOperation::SendMessage,
        SqsError::service("OverLimit", "Too many in-flight messages", 403),
    );
    let message = OutboundMessage::for_payload("hello").build().unwrap();

    let error = sender.send("MyQ", &message).await.unwrap_err();

    assert!(matches!(error, MessagingError::RateLimit { .. }));
    assert!(error.is_transient());
}

#[tokio::test]
async fn test_failed_lookup_is_retried_on_next_send() {
    let (sender, sqs, _) = sender_with_queue("MyQ");
    sqs.fail_next(
        SqsOperation::GetQueueUrl,
        SqsError::Timeout("timed out".to_string()),
    );
    let message = OutboundMessage::for_payload("hello").build().unwrap();

    let error = sender.send("MyQ", &message).await.unwrap_err();
    assert!(matches!(error, MessagingError::ApiTimeout { .. }));

    sender.send("MyQ", &message).await.unwrap();
    assert_eq!(sqs.call_count(SqsOperation::GetQueueUrl), 2);
}

#[tokio::test]
async fn test_sender_through_trait_object() {
    let (sender, sqs, _) = sender_with_queue("MyQ");
    let sender: Box<dyn MessageSender> = Box::new(sender);
    let message = OutboundMessage::for_payload("hello").build().unwrap();

    sender.send_message("MyQ", &message).await.unwrap();
    assert_eq!(sender.provider_kind(), ProviderKind::Sqs);
    sender.close();

    assert_eq!(sqs.queue_depth("MyQ"), 1);
}

#[test]
fn test_new_rejects_invalid_config() {
    let config = MessagingConfig {
        max_number_of_messages: 0,
        ..MessagingConfig::default()
    };

    let result = SqsMessageSender::new(&config);
    assert!(matches!(result, Err(MessagingError::Configuration(_))));
}
