//! Pure connection state management for the MQTT session
//!
//! This module contains the connection state machine, transport errors and
//! the construction of rumqttc options from a [`ConnectionProfile`].

use super::tls::TrustStore;
use crate::config::ConnectionProfile;
use rumqttc::MqttOptions;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Keep-alive interval sent in CONNECT
pub const KEEP_ALIVE: Duration = Duration::from_secs(30);
/// Upper bound on waiting for the first ConnAck
pub const CONNECT_CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(30);
/// Upper bound on waiting for a SubAck
pub const SUBACK_TIMEOUT: Duration = Duration::from_secs(30);
/// Pause between a lost connection and the next dial
pub const RECONNECT_DELAY: Duration = Duration::from_secs(1);
/// Capacity of the request channel between client handle and event loop
pub const REQUEST_CHANNEL_CAPACITY: usize = 10;

/// Connection state of the broker session
#[derive(Debug, Clone, Default, PartialEq)]
pub enum ConnectionState {
    /// Created, not yet started
    #[default]
    Idle,
    /// First connection attempt in flight
    Connecting,
    /// ConnAck received, session usable
    Connected,
    /// Established connection dropped
    ConnectionLost(String),
    /// Dialing again (attempt count since the last ConnAck)
    Reconnecting(u32),
    /// First connection attempt failed; nothing is retried
    Failed(String),
    /// DISCONNECT requested, waiting for the event loop to stop
    Disconnecting,
    /// Event loop stopped for good
    Terminated,
}

/// Events that drive [`ConnectionState`] transitions
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    ConnectStarted,
    ConnAckReceived,
    InitialConnectFailed(String),
    ConnectionLost(String),
    ReconnectionStarted(u32),
    DisconnectRequested,
    EventLoopStopped,
}

/// MQTT transport errors
#[derive(Debug, Error)]
pub enum MqttError {
    #[error("Connection failed: {0}")]
    ConnectionFailedStr(String),
    #[error("Subscription failed")]
    SubscriptionFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Subscription failed: {0}")]
    SubscriptionFailedStr(String),
    #[error("Not connected - current state: {state:?}")]
    NotConnected { state: ConnectionState },
}

/// Determine the next state after a connection event (pure function)
pub fn determine_next_state(current: &ConnectionState, event: ConnectionEvent) -> ConnectionState {
    match event {
        ConnectionEvent::ConnectStarted => ConnectionState::Connecting,
        ConnectionEvent::ConnAckReceived => {
            if matches!(current, ConnectionState::Reconnecting(_)) {
                info!("MQTT reconnection successful");
            }
            ConnectionState::Connected
        }
        ConnectionEvent::InitialConnectFailed(reason) => {
            error!("MQTT initial connection failed: {}", reason);
            ConnectionState::Failed(reason)
        }
        ConnectionEvent::ConnectionLost(reason) => {
            warn!("MQTT connection lost: {}", reason);
            ConnectionState::ConnectionLost(reason)
        }
        ConnectionEvent::ReconnectionStarted(attempt) => {
            info!("Starting reconnection attempt {}", attempt);
            ConnectionState::Reconnecting(attempt)
        }
        ConnectionEvent::DisconnectRequested => ConnectionState::Disconnecting,
        ConnectionEvent::EventLoopStopped => match current {
            ConnectionState::Failed(_) => current.clone(),
            _ => ConnectionState::Terminated,
        },
    }
}

/// Client identifier actually sent to the broker; rumqttc refuses empty ids
pub fn resolve_client_id(configured: &str) -> String {
    let trimmed = configured.trim();
    if trimmed.is_empty() {
        format!("subscriber-{}", Uuid::new_v4().simple())
    } else {
        trimmed.to_string()
    }
}

/// Build rumqttc options from the profile and trust store
pub fn configure_mqtt_options(profile: &ConnectionProfile, trust: &TrustStore) -> MqttOptions {
    let client_id = resolve_client_id(&profile.client_id);
    if client_id != profile.client_id {
        info!(client_id = %client_id, "No client ID configured, generated one");
    }

    let mut mqtt_options = MqttOptions::new(client_id, &profile.broker_host, profile.broker_port);
    mqtt_options.set_keep_alive(KEEP_ALIVE);
    mqtt_options.set_clean_session(true);

    if profile.has_credentials() {
        mqtt_options.set_credentials(&profile.username, &profile.password);
    }

    mqtt_options.set_transport(trust.transport());
    mqtt_options
}
