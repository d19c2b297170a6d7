//! The subscriber itself: profile in, TLS session up, log until told to stop
//!
//! [`run_subscriber`] is shared by both binaries; they differ only in the
//! [`ProfileSource`] they pass in.

pub mod events;
pub mod lifecycle;
pub mod shutdown;

pub use events::SubscriberEvents;
pub use lifecycle::{SubscriberLifecycle, DISCONNECT_GRACE};
pub use shutdown::{ShutdownReason, ShutdownSignals};

use crate::config::ProfileSource;
use crate::error::SubscriberResult;
use crate::transport::mqtt::{build_trust, MqttClient};
use std::future::Future;
use std::sync::Arc;
use tracing::info;

/// Load the profile, build the trust store, then run a TLS session until
/// `shutdown` resolves.
///
/// Configuration and certificate problems are reported before any network
/// activity. A failed first connection returns without awaiting `shutdown`.
pub async fn run_subscriber<P, F>(source: &P, shutdown: F) -> SubscriberResult<ShutdownReason>
where
    P: ProfileSource + ?Sized,
    F: Future<Output = ShutdownReason> + Send,
{
    let profile = source.load_profile()?;
    info!(
        broker = %profile.broker_address(),
        client_id = %profile.client_id,
        topics = %profile.topics,
        "Loaded connection profile"
    );

    let trust = build_trust(&profile.certificate_path)?;
    info!(
        path = %trust.source().display(),
        certificates = trust.certificate_count(),
        "Loaded CA certificate"
    );

    let client = MqttClient::new(&profile, &trust);
    let events = Arc::new(SubscriberEvents::new(profile.topics.clone()));
    let mut lifecycle = SubscriberLifecycle::new(client, events);

    Ok(lifecycle.run(shutdown).await?)
}
