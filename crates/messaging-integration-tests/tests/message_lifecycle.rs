//! End-to-end message lifecycle: send, subscribe, verdict handling.

mod common;

use common::{join_subscription, Fixture, RecordingHandler};
use messaging_service::{
    MessageReceiver, MessageSender, MessagingError, OutboundMessage, ProcessingVerdict,
    SqsOperation,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::time::Duration;

#[tokio::test]
async fn test_hello_world_round_trip_with_concurrent_subscription() {
    // Arrange
    let fixture = Fixture::new(1);
    fixture
        .sqs
        .create_queue_with_visibility_timeout("MyQ", Duration::from_millis(200));
    let handler = Arc::new(RecordingHandler::new(
        fixture.receiver.stop_handle(),
        ProcessingVerdict::Processed,
        Some(1),
    ));
    let subscription = fixture.spawn_subscription("MyQ", Arc::clone(&handler));

    // Act
    let message = OutboundMessage::for_payload("Hello World")
        .attribute("attr1", "value1")
        .attribute("attr2", "value2")
        .build()
        .unwrap();
    fixture.sender.send_message("MyQ", &message).await.unwrap();
    join_subscription(subscription).await.unwrap();

    // Assert
    let seen = handler.seen();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].payload(), "Hello World");
    assert_eq!(
        seen[0].attributes(),
        &HashMap::from([
            ("attr1".to_string(), "value1".to_string()),
            ("attr2".to_string(), "value2".to_string()),
        ])
    );
    assert_eq!(fixture.sqs.call_count(SqsOperation::DeleteMessage), 1);

    // Deleted, so not redelivered once the visibility window has passed
    tokio::time::sleep(Duration::from_millis(300)).await;
    let redelivered = fixture.receiver.receive_messages("MyQ", 10).await.unwrap();
    assert!(redelivered.is_empty());
    assert_eq!(fixture.sqs.queue_depth("MyQ"), 0);
}

#[tokio::test]
async fn test_batch_of_three_stops_without_another_receive() {
    // Arrange
    let fixture = Fixture::new(0);
    fixture.sqs.create_queue("MyQ");
    for payload in ["one", "two", "three"] {
        let message = OutboundMessage::for_payload(payload).build().unwrap();
        fixture.sender.send_message("MyQ", &message).await.unwrap();
    }
    let handler = RecordingHandler::new(
        fixture.receiver.stop_handle(),
        ProcessingVerdict::Processed,
        Some(3),
    );

    // Act
    fixture.receiver.subscribe("MyQ", &handler).await.unwrap();

    // Assert
    let payloads: Vec<_> = handler
        .seen()
        .iter()
        .map(|m| m.payload().to_string())
        .collect();
    assert_eq!(payloads, vec!["one", "two", "three"]);
    assert_eq!(fixture.sqs.call_count(SqsOperation::ReceiveMessages), 1);
    assert_eq!(fixture.sqs.call_count(SqsOperation::DeleteMessage), 3);
}

#[tokio::test]
async fn test_skipped_message_is_redelivered_with_new_handle() {
    // Arrange
    let fixture = Fixture::new(0);
    fixture
        .sqs
        .create_queue_with_visibility_timeout("MyQ", Duration::from_millis(100));
    let message = OutboundMessage::for_payload("later").build().unwrap();
    fixture.sender.send_message("MyQ", &message).await.unwrap();

    let handler = RecordingHandler::new(
        fixture.receiver.stop_handle(),
        ProcessingVerdict::Skipped,
        Some(1),
    );

    // Act
    fixture.receiver.subscribe("MyQ", &handler).await.unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;
    let redelivered = fixture.receiver.receive_messages("MyQ", 10).await.unwrap();

    // Assert
    let first = &handler.seen()[0];
    assert_eq!(fixture.sqs.call_count(SqsOperation::DeleteMessage), 0);
    assert_eq!(redelivered.len(), 1);
    assert_eq!(redelivered[0].id(), first.id());
    assert_ne!(redelivered[0].completion_handle(), first.completion_handle());
}

#[tokio::test]
async fn test_abandoned_message_fails_and_stays_queued() {
    let fixture = Fixture::new(0);
    fixture.sqs.create_queue("MyQ");
    let message = OutboundMessage::for_payload("poison").build().unwrap();
    fixture.sender.send_message("MyQ", &message).await.unwrap();

    let handler = RecordingHandler::new(
        fixture.receiver.stop_handle(),
        ProcessingVerdict::Abandoned,
        None,
    );
    let error = fixture
        .receiver
        .subscribe("MyQ", &handler)
        .await
        .unwrap_err();

    assert!(matches!(
        error,
        MessagingError::DeadLetterNotImplemented { .. }
    ));
    assert_eq!(fixture.sqs.queue_depth("MyQ"), 1);
    assert!(!fixture.receiver.is_running());
}

#[tokio::test]
async fn test_attribute_maps_survive_the_round_trip() {
    let fixture = Fixture::new(0);
    fixture.sqs.create_queue("MyQ");

    let cases: Vec<HashMap<String, String>> = vec![
        HashMap::new(),
        HashMap::from([("single".to_string(), "value".to_string())]),
        HashMap::from([
            ("empty".to_string(), String::new()),
            ("spaces".to_string(), "a value with spaces".to_string()),
            ("unicode".to_string(), "grüße 👋".to_string()),
            ("symbols".to_string(), "a=b&c<d>".to_string()),
        ]),
        (0..10)
            .map(|i| (format!("key-{}", i), format!("value-{}", i)))
            .collect(),
    ];

    for attributes in cases {
        let message = OutboundMessage::for_payload("payload")
            .attributes(attributes.clone())
            .build()
            .unwrap();
        fixture.sender.send_message("MyQ", &message).await.unwrap();

        let received = fixture.receiver.receive_messages("MyQ", 1).await.unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].attributes(), &attributes);

        let handle = received[0].completion_handle().unwrap();
        fixture.receiver.complete_message("MyQ", handle).await.unwrap();
    }
}

#[tokio::test]
async fn test_independent_receivers_on_separate_queues() {
    let first = Fixture::new(0);
    first.sqs.create_queue("QueueA");
    let second = Fixture::new(0);
    second.sqs.create_queue("QueueB");

    for (fixture, queue) in [(&first, "QueueA"), (&second, "QueueB")] {
        let message = OutboundMessage::for_payload(queue).build().unwrap();
        fixture.sender.send_message(queue, &message).await.unwrap();
    }

    let handler_a = Arc::new(RecordingHandler::new(
        first.receiver.stop_handle(),
        ProcessingVerdict::Processed,
        Some(1),
    ));
    let handler_b = Arc::new(RecordingHandler::new(
        second.receiver.stop_handle(),
        ProcessingVerdict::Processed,
        Some(1),
    ));

    let task_a = first.spawn_subscription("QueueA", Arc::clone(&handler_a));
    let task_b = second.spawn_subscription("QueueB", Arc::clone(&handler_b));
    join_subscription(task_a).await.unwrap();
    join_subscription(task_b).await.unwrap();

    assert_eq!(handler_a.seen()[0].payload(), "QueueA");
    assert_eq!(handler_b.seen()[0].payload(), "QueueB");
}
