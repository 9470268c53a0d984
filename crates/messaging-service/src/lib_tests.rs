//! Tests for the messaging-service library module.

use super::*;
use std::sync::{Arc, Mutex};

#[tokio::test]
async fn test_send_and_subscribe_through_crate_root_exports() {
    let sqs = InMemorySqs::new();
    sqs.create_queue("MyQ");

    let sender = SqsMessageSender::with_api(Arc::new(sqs.clone()));
    let config = MessagingConfig {
        wait_time_seconds: 0,
        ..MessagingConfig::default()
    };
    let receiver = SqsMessageReceiver::with_api(Arc::new(sqs.clone()), &config).unwrap();

    let message = OutboundMessage::for_payload("Hello World")
        .attribute("attr1", "value1")
        .build()
        .unwrap();
    sender.send_message("MyQ", &message).await.unwrap();

    let stop = receiver.stop_handle();
    let received = Mutex::new(Vec::new());
    let handler = |message: InboundMessage| {
        received.lock().unwrap().push(message);
        stop.stop();
        ProcessingVerdict::Processed
    };
    receiver.subscribe("MyQ", &handler).await.unwrap();

    let received = received.into_inner().unwrap();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].payload(), "Hello World");
    assert_eq!(received[0].attribute("attr1"), Some("value1"));
    assert_eq!(sqs.queue_depth("MyQ"), 0);
}

#[test]
fn test_default_config_selects_sqs() {
    let config = MessagingConfig::default();
    assert_eq!(config.provider, ProviderKind::Sqs);
    assert!(config.validate().is_ok());
}
