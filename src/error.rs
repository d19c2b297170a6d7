//! Crate-level error type for the subscriber
//!
//! Each module owns its own error enum; this type aggregates them so the
//! binaries have a single place to turn failures into an exit status.

use crate::config::ConfigError;
use crate::transport::mqtt::{MqttError, TrustError};
use thiserror::Error;

/// Main error type for subscriber operations
#[derive(Debug, Error)]
pub enum SubscriberError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("TLS trust error: {0}")]
    Trust(#[from] TrustError),

    #[error("Transport error: {0}")]
    Transport(#[from] MqttError),

    #[error("Signal registration failed: {0}")]
    Signal(#[source] std::io::Error),
}

impl SubscriberError {
    /// Whether the failure happened before any network activity was attempted
    pub fn is_startup_failure(&self) -> bool {
        matches!(
            self,
            SubscriberError::Config(_) | SubscriberError::Trust(_) | SubscriberError::Signal(_)
        )
    }
}

/// Result type for subscriber operations
pub type SubscriberResult<T> = Result<T, SubscriberError>;
