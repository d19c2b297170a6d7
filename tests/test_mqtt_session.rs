//! Session behavior of the MQTT client against an in-process broker
//!
//! Plain TCP keeps these tests about the MQTT exchange itself: connect,
//! subscribe, deliver, lose the connection, come back, disconnect.


use fake_broker::FakeBroker;
use mqtt_tls_subscriber::config::TopicSet;
use mqtt_tls_subscriber::subscriber::DISCONNECT_GRACE;
use mqtt_tls_subscriber::testing::{RecordedEvent, RecordingEvents};
use mqtt_tls_subscriber::transport::mqtt::{ConnectionState, MqttClient, SubscriptionAck};
use rumqttc::MqttOptions;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

const EVENT_TIMEOUT: Duration = Duration::from_secs(10);

async fn next_events(
    rx: &mut mpsc::UnboundedReceiver<RecordedEvent>,
    count: usize,
) -> Vec<RecordedEvent> {
    let mut events = Vec::with_capacity(count);
    for _ in 0..count {
        let event = tokio::time::timeout(EVENT_TIMEOUT, rx.recv())
            .await
            .expect("timed out waiting for a session event")
            .expect("event channel closed");
        events.push(event);
    }
    events
}

fn expected_filters() -> Vec<(String, u8)> {
    TopicSet::device_defaults()
        .iter()
        .map(|(topic, qos)| (topic.to_string(), qos))
        .collect()
}

fn full_grant() -> RecordedEvent {
    RecordedEvent::Connected(Ok(SubscriptionAck {
        granted: TopicSet::device_defaults(),
        rejected: Vec::new(),
    }))
}

#[tokio::test]
async fn test_session_subscribes_receives_and_disconnects() {
    let broker = FakeBroker::plain().await;
    let mut client =
        MqttClient::with_options(MqttOptions::new("session-test", "127.0.0.1", broker.port()));
    let (events, mut recorded) = RecordingEvents::new(TopicSet::device_defaults());

    let broker_task = tokio::spawn(async move {
        let mut conn = broker.accept().await.unwrap();
        conn.expect_connect().await.unwrap();
        conn.send_connack().await.unwrap();
        let filters = conn.grant_subscription().await.unwrap();
        conn.send_publish("topic/device/speed", b"42").await.unwrap();
        conn.expect_disconnect().await.unwrap();
        filters
    });

    client.connect(Arc::new(events)).await.unwrap();
    assert_eq!(client.connection_state(), ConnectionState::Connected);

    // The SUBACK and the PUBLISH race through different tasks
    let events = next_events(&mut recorded, 2).await;
    assert!(events.contains(&full_grant()), "got {events:?}");
    assert!(events.contains(&RecordedEvent::Message {
        topic: "topic/device/speed".to_string(),
        payload: b"42".to_vec(),
    }));

    let started = Instant::now();
    client.disconnect(DISCONNECT_GRACE).await.unwrap();
    assert!(started.elapsed() < DISCONNECT_GRACE);
    assert_eq!(client.connection_state(), ConnectionState::Terminated);

    let filters = tokio::time::timeout(EVENT_TIMEOUT, broker_task)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(filters, expected_filters());
}

#[tokio::test]
async fn test_refused_subscription_is_reported() {
    let broker = FakeBroker::plain().await;
    let mut client =
        MqttClient::with_options(MqttOptions::new("refused-sub", "127.0.0.1", broker.port()));
    let (events, mut recorded) = RecordingEvents::new(TopicSet::device_defaults());

    let broker_task = tokio::spawn(async move {
        let mut conn = broker.accept().await.unwrap();
        conn.expect_connect().await.unwrap();
        conn.send_connack().await.unwrap();
        let (packet_id, _) = conn.expect_subscribe().await.unwrap();
        // pressure granted, speed refused, temperature granted at QoS 0
        conn.send_suback(packet_id, &[0x00, 0x80, 0x00]).await.unwrap();
        conn.expect_disconnect().await.unwrap();
    });

    client.connect(Arc::new(events)).await.unwrap();

    let events = next_events(&mut recorded, 1).await;
    match &events[0] {
        RecordedEvent::Connected(Ok(ack)) => {
            assert_eq!(ack.rejected, vec!["topic/device/speed".to_string()]);
            assert_eq!(ack.granted.len(), 2);
            assert_eq!(ack.granted.get("topic/device/speed"), None);
        }
        other => panic!("expected a subscription outcome, got {other:?}"),
    }

    client.disconnect(DISCONNECT_GRACE).await.unwrap();
    tokio::time::timeout(EVENT_TIMEOUT, broker_task)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_connection_loss_reconnects_and_resubscribes() {
    let broker = FakeBroker::plain().await;
    let mut client =
        MqttClient::with_options(MqttOptions::new("reconnect-test", "127.0.0.1", broker.port()));
    let (events, mut recorded) = RecordingEvents::new(TopicSet::device_defaults());

    let broker_task = tokio::spawn(async move {
        let mut first = broker.accept().await.unwrap();
        first.expect_connect().await.unwrap();
        first.send_connack().await.unwrap();
        first.grant_subscription().await.unwrap();
        first.close().await.unwrap();

        let mut second = broker.accept().await.unwrap();
        second.expect_connect().await.unwrap();
        second.send_connack().await.unwrap();
        let filters = second.grant_subscription().await.unwrap();
        second.expect_disconnect().await.unwrap();
        filters
    });

    client.connect(Arc::new(events)).await.unwrap();

    let events = next_events(&mut recorded, 3).await;
    let grants = events.iter().filter(|e| **e == full_grant()).count();
    let losses = events
        .iter()
        .filter(|e| matches!(e, RecordedEvent::ConnectionLost(_)))
        .count();
    assert_eq!(grants, 2, "got {events:?}");
    assert_eq!(losses, 1, "got {events:?}");
    assert_eq!(client.connection_state(), ConnectionState::Connected);

    client.disconnect(DISCONNECT_GRACE).await.unwrap();
    let filters = tokio::time::timeout(EVENT_TIMEOUT, broker_task)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(filters, expected_filters());
}

#[tokio::test]
async fn test_connection_lost_right_after_connack_still_connects() {
    let broker = FakeBroker::plain().await;
    let mut client =
        MqttClient::with_options(MqttOptions::new("early-loss", "127.0.0.1", broker.port()));
    let (events, mut recorded) = RecordingEvents::new(TopicSet::device_defaults());

    // Hang up right after CONNACK and stop listening, so no reconnect succeeds
    let broker_task = tokio::spawn(async move {
        let mut conn = broker.accept().await.unwrap();
        conn.expect_connect().await.unwrap();
        conn.send_connack().await.unwrap();
        conn.close().await.unwrap();
        drop(broker);
    });

    tokio::time::timeout(EVENT_TIMEOUT, client.connect(Arc::new(events)))
        .await
        .expect("connect should complete on CONNACK")
        .unwrap();

    let mut seen = Vec::new();
    while !seen
        .iter()
        .any(|e| matches!(e, RecordedEvent::ConnectionLost(_)))
    {
        seen.extend(next_events(&mut recorded, 1).await);
    }

    client.disconnect(DISCONNECT_GRACE).await.unwrap();
    assert_eq!(client.connection_state(), ConnectionState::Terminated);
    broker_task.await.unwrap();
}

#[tokio::test]
async fn test_disconnect_gives_up_after_grace() {
    let broker = FakeBroker::plain().await;
    let mut client =
        MqttClient::with_options(MqttOptions::new("grace-test", "127.0.0.1", broker.port()));
    let (events, mut recorded) = RecordingEvents::new(TopicSet::device_defaults());

    let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
    let broker_task = tokio::spawn(async move {
        let mut conn = broker.accept().await.unwrap();
        conn.expect_connect().await.unwrap();
        conn.send_connack().await.unwrap();
        conn.grant_subscription().await.unwrap();
        // Keep the socket open until the test is done
        let _ = release_rx.await;
        drop(conn);
    });

    client.connect(Arc::new(events)).await.unwrap();
    next_events(&mut recorded, 1).await;

    // Whether or not the DISCONNECT is flushed in time, the call is bounded
    let grace = Duration::from_millis(200);
    let started = Instant::now();
    client.disconnect(grace).await.unwrap();
    assert!(started.elapsed() < grace + Duration::from_secs(1));
    assert_eq!(client.connection_state(), ConnectionState::Terminated);

    let _ = release_tx.send(());
    broker_task.await.unwrap();
}
