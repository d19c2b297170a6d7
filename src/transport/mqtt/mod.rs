//! MQTT 3.1.1 session over TLS
//!
//! This module separates pure functions from I/O operations:
//!
//! - [`connection`] - Pure connection state management and configuration
//! - [`message_handler`] - Pure event routing and SUBACK interpretation
//! - [`tls`] - CA trust store construction
//! - [`client`] - Impure I/O operations and coordination
//!
//! # Usage
//!
//! ```rust,no_run
//! use mqtt_tls_subscriber::config::{ProfileSource, StaticProfile};
//! use mqtt_tls_subscriber::transport::mqtt::{build_trust, MqttClient};
//! use mqtt_tls_subscriber::subscriber::SubscriberEvents;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let profile = StaticProfile::default().load_profile()?;
//! let trust = build_trust(&profile.certificate_path)?;
//!
//! let mut client = MqttClient::new(&profile, &trust);
//! client
//!     .connect(Arc::new(SubscriberEvents::new(profile.topics.clone())))
//!     .await?;
//! client.disconnect(Duration::from_millis(2000)).await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod connection;
pub mod message_handler;
pub mod tls;

// Re-export public types for convenience
pub use client::{MqttClient, PendingSubAck, SubscriptionHandle};
pub use connection::{
    configure_mqtt_options, determine_next_state, resolve_client_id, ConnectionEvent,
    ConnectionState, MqttError,
};
pub use message_handler::{EventRoute, MessageHandler, SubscriptionAck};
pub use tls::{build_trust, TrustError, TrustStore};
