//! Mock implementations for testing
//!
//! Provides mock Session, TopicSubscriber and SessionEvents implementations
//! to test the subscriber without a broker.

use crate::config::TopicSet;
use crate::transport::mqtt::{ConnectionState, MqttError, SubscriptionAck};
use crate::transport::{Session, SessionEvents, TopicSubscriber};
use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Mock subscriber recording every SUBSCRIBE request
#[derive(Debug, Default)]
pub struct MockSubscriber {
    requests: Mutex<Vec<TopicSet>>,
    should_fail: bool,
}

impl MockSubscriber {
    /// Grants every requested topic at the requested QoS
    pub fn granting_all() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            should_fail: true,
            ..Default::default()
        }
    }

    pub fn requests(&self) -> Vec<TopicSet> {
        lock(&self.requests).clone()
    }
}

#[async_trait]
impl TopicSubscriber for MockSubscriber {
    async fn subscribe(&self, topics: &TopicSet) -> Result<SubscriptionAck, MqttError> {
        lock(&self.requests).push(topics.clone());

        if self.should_fail {
            return Err(MqttError::SubscriptionFailedStr(
                "Mock subscription failure".to_string(),
            ));
        }

        Ok(SubscriptionAck {
            granted: topics.clone(),
            rejected: Vec::new(),
        })
    }
}

/// Mock session that connects instantly and runs `on_connect` inline
#[derive(Debug, Default)]
pub struct MockSession {
    connect_calls: usize,
    disconnect_graces: Vec<Duration>,
    state: ConnectionState,
    subscriber: Arc<MockSubscriber>,
    should_fail: bool,
}

impl MockSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_failure() -> Self {
        Self {
            should_fail: true,
            ..Default::default()
        }
    }

    /// The subscriber handed to `on_connect`
    pub fn subscriber(&self) -> Arc<MockSubscriber> {
        self.subscriber.clone()
    }

    pub fn connect_calls(&self) -> usize {
        self.connect_calls
    }

    pub fn disconnect_graces(&self) -> Vec<Duration> {
        self.disconnect_graces.clone()
    }
}

#[async_trait]
impl Session for MockSession {
    async fn connect(&mut self, events: Arc<dyn SessionEvents>) -> Result<(), MqttError> {
        self.connect_calls += 1;

        if self.should_fail {
            self.state = ConnectionState::Failed("Mock connection failure".to_string());
            return Err(MqttError::ConnectionFailedStr(
                "Mock connection failure".to_string(),
            ));
        }

        self.state = ConnectionState::Connected;
        events.on_connect(self.subscriber.clone()).await;
        Ok(())
    }

    async fn disconnect(&mut self, grace: Duration) -> Result<(), MqttError> {
        self.disconnect_graces.push(grace);
        self.state = ConnectionState::Terminated;
        Ok(())
    }

    fn connection_state(&self) -> ConnectionState {
        self.state.clone()
    }
}

/// Callback observed by [`RecordingEvents`]
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedEvent {
    /// `on_connect` ran; holds the outcome of its SUBSCRIBE
    Connected(Result<SubscriptionAck, String>),
    ConnectionLost(String),
    Message { topic: String, payload: Vec<u8> },
}

/// Session callbacks that subscribe like the real subscriber and forward
/// everything they see to a channel
#[derive(Debug)]
pub struct RecordingEvents {
    topics: TopicSet,
    tx: mpsc::UnboundedSender<RecordedEvent>,
}

impl RecordingEvents {
    pub fn new(topics: TopicSet) -> (Self, mpsc::UnboundedReceiver<RecordedEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { topics, tx }, rx)
    }
}

#[async_trait]
impl SessionEvents for RecordingEvents {
    async fn on_connect(&self, subscriber: Arc<dyn TopicSubscriber>) {
        let outcome = subscriber
            .subscribe(&self.topics)
            .await
            .map_err(|e| e.to_string());
        let _ = self.tx.send(RecordedEvent::Connected(outcome));
    }

    fn on_connection_lost(&self, cause: &dyn std::error::Error) {
        let _ = self
            .tx
            .send(RecordedEvent::ConnectionLost(cause.to_string()));
    }

    async fn on_message(&self, topic: &str, payload: &[u8]) {
        let _ = self.tx.send(RecordedEvent::Message {
            topic: topic.to_string(),
            payload: payload.to_vec(),
        });
    }
}
