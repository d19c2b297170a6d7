//! SIGINT/SIGTERM handling
//!
//! Handlers are installed by [`ShutdownSignals::register`], which the binaries
//! call before anything else. A signal that arrives before [`ShutdownSignals::recv`]
//! is awaited stays buffered and is returned by the first `recv`.

use crate::error::SubscriberError;
use futures::stream::StreamExt;
use signal_hook::consts::signal::{SIGINT, SIGTERM};
use signal_hook_tokio::Signals;
use std::fmt;
use tracing::debug;

/// Why the subscriber is shutting down
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// SIGINT
    Interrupt,
    /// SIGTERM
    Terminate,
    /// The signal stream ended without delivering a signal
    SignalStreamClosed,
}

impl ShutdownReason {
    fn from_signal(signal: i32) -> Self {
        match signal {
            SIGINT => ShutdownReason::Interrupt,
            SIGTERM => ShutdownReason::Terminate,
            other => {
                debug!(signal = other, "Unexpected signal, treating as termination");
                ShutdownReason::Terminate
            }
        }
    }
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownReason::Interrupt => write!(f, "SIGINT"),
            ShutdownReason::Terminate => write!(f, "SIGTERM"),
            ShutdownReason::SignalStreamClosed => write!(f, "signal stream closed"),
        }
    }
}

/// Registered SIGINT and SIGTERM handlers
pub struct ShutdownSignals {
    signals: Signals,
}

impl ShutdownSignals {
    /// Install handlers for SIGINT and SIGTERM
    pub fn register() -> Result<Self, SubscriberError> {
        let signals = Signals::new([SIGINT, SIGTERM]).map_err(SubscriberError::Signal)?;
        debug!("Registered SIGINT and SIGTERM handlers");
        Ok(Self { signals })
    }

    /// Wait for the first termination signal
    pub async fn recv(mut self) -> ShutdownReason {
        match self.signals.next().await {
            Some(signal) => ShutdownReason::from_signal(signal),
            None => ShutdownReason::SignalStreamClosed,
        }
    }
}
