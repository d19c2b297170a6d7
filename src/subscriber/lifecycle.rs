//! Connection lifecycle: connect, wait for shutdown, disconnect

use super::shutdown::ShutdownReason;
use crate::lifecycle_span;
use crate::transport::mqtt::MqttError;
use crate::transport::{Session, SessionEvents};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, Instrument};

/// Time allowed for in-flight work when disconnecting
pub const DISCONNECT_GRACE: Duration = Duration::from_millis(2000);

/// Drives one session from connect to disconnect
pub struct SubscriberLifecycle<S>
where
    S: Session,
{
    session: S,
    events: Arc<dyn SessionEvents>,
    grace: Duration,
}

impl<S> SubscriberLifecycle<S>
where
    S: Session,
{
    pub fn new(session: S, events: Arc<dyn SessionEvents>) -> Self {
        Self {
            session,
            events,
            grace: DISCONNECT_GRACE,
        }
    }

    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Get the session for testing
    pub fn session(&self) -> &S {
        &self.session
    }

    /// Connect, block until `shutdown` resolves, then disconnect.
    ///
    /// `shutdown` is only awaited once the connection is confirmed; a failed
    /// connect returns immediately without polling it.
    pub async fn run<F>(&mut self, shutdown: F) -> Result<ShutdownReason, MqttError>
    where
        F: Future<Output = ShutdownReason> + Send,
    {
        let span = lifecycle_span!(grace_ms = self.grace.as_millis() as u64);
        async move {
            self.session.connect(self.events.clone()).await?;
            info!("Subscriber running, waiting for SIGINT or SIGTERM");

            let reason = shutdown.await;
            info!("Received {}, disconnecting", reason);

            self.session.disconnect(self.grace).await?;
            info!("Subscriber disconnected");
            Ok(reason)
        }
        .instrument(span)
        .await
    }
}
