//! MQTT TLS Subscriber
//!
//! A long-running MQTT 3.1.1 subscriber that connects to a broker over TLS,
//! trusting only the CA certificate it is given, subscribes to a fixed set of
//! topics and logs every message it receives until SIGINT or SIGTERM.
//!
//! # Overview
//!
//! - [`config`] - connection profile, topic set and the two profile sources
//! - [`cli`] - command-line flags for the flag-driven binary
//! - [`transport`] - session traits and the rumqttc-backed MQTT client
//! - [`subscriber`] - callbacks, connection lifecycle and signal handling
//! - [`observability`] - logging setup
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use mqtt_tls_subscriber::config::StaticProfile;
//! use mqtt_tls_subscriber::subscriber::{run_subscriber, ShutdownSignals};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let signals = ShutdownSignals::register()?;
//! run_subscriber(&StaticProfile::default(), signals.recv()).await?;
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod observability;
pub mod subscriber;
pub mod testing;
pub mod transport;

pub use config::{ConnectionProfile, ProfileSource, StaticProfile, TopicSet};
pub use error::{SubscriberError, SubscriberResult};
pub use subscriber::{run_subscriber, ShutdownReason, ShutdownSignals};
pub use transport::mqtt::MqttClient;
