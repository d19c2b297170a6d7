//! Transport layer for the subscriber
//!
//! This module provides the session abstraction used by the lifecycle
//! controller and its MQTT implementation. The controller only talks to the
//! traits below, so tests can swap the broker session for a mock.

use crate::config::TopicSet;
use std::sync::Arc;
use std::time::Duration;

pub mod mqtt;

use mqtt::{ConnectionState, MqttError, SubscriptionAck};

/// A broker session that can be opened once and closed once
#[async_trait::async_trait]
pub trait Session: Send {
    /// Open the session and wait for the broker to acknowledge it.
    ///
    /// `events` is invoked from the session's background task for the whole
    /// lifetime of the connection, including reconnects.
    async fn connect(&mut self, events: Arc<dyn SessionEvents>) -> Result<(), MqttError>;

    /// Close the session, waiting at most `grace` for in-flight work
    async fn disconnect(&mut self, grace: Duration) -> Result<(), MqttError>;

    /// Get current connection state
    fn connection_state(&self) -> ConnectionState;
}

/// Callbacks raised by a [`Session`]
#[async_trait::async_trait]
pub trait SessionEvents: Send + Sync {
    /// The broker acknowledged a connection (first connect or reconnect)
    async fn on_connect(&self, subscriber: Arc<dyn TopicSubscriber>);

    /// An established connection dropped
    fn on_connection_lost(&self, cause: &dyn std::error::Error);

    /// A PUBLISH arrived on a subscribed topic
    async fn on_message(&self, topic: &str, payload: &[u8]);
}

/// Issues SUBSCRIBE requests on a live session
#[async_trait::async_trait]
pub trait TopicSubscriber: Send + Sync {
    /// Subscribe to every topic in one request and wait for the SUBACK
    async fn subscribe(&self, topics: &TopicSet) -> Result<SubscriptionAck, MqttError>;
}
