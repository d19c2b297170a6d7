//! Flag-driven TLS subscriber
//!
//! Connection settings come from command-line flags (with environment
//! fallbacks), see `tls-subscriber --help`.

use mqtt_tls_subscriber::cli::SubscriberArgs;
use mqtt_tls_subscriber::observability::init_default_logging;
use mqtt_tls_subscriber::subscriber::{run_subscriber, ShutdownSignals};
use std::process;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    // Handlers go in first so an early SIGTERM is not lost
    let signals = match ShutdownSignals::register() {
        Ok(signals) => signals,
        Err(e) => {
            eprintln!("{e}");
            process::exit(1);
        }
    };

    let args = SubscriberArgs::parse_normalized();

    init_default_logging();

    info!("Starting tls-subscriber v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run_subscriber(&args, signals.recv()).await {
        error!("Subscriber failed: {}", e);
        process::exit(1);
    }

    info!("Application shutdown complete");
}
