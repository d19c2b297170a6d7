//! Signal handling: a signal raised before anyone waits is not lost
//!
//! Kept in its own test binary because it raises real signals at the process.

use mqtt_tls_subscriber::subscriber::{ShutdownReason, ShutdownSignals};
use signal_hook::consts::signal::SIGTERM;
use std::time::Duration;

#[tokio::test]
async fn test_signal_before_wait_is_observed() {
    let signals = ShutdownSignals::register().unwrap();

    // Raised while startup would still be running
    signal_hook::low_level::raise(SIGTERM).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let reason = tokio::time::timeout(Duration::from_secs(5), signals.recv())
        .await
        .expect("pending SIGTERM should be delivered");
    assert_eq!(reason, ShutdownReason::Terminate);
}
