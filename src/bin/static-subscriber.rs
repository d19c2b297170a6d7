//! TLS subscriber with compiled-in connection settings
//!
//! Connects to `localhost:1883` as `static-subscriber`, trusting `ssl_cert.crt`
//! from the working directory. Takes no arguments.

use mqtt_tls_subscriber::config::StaticProfile;
use mqtt_tls_subscriber::observability::init_default_logging;
use mqtt_tls_subscriber::subscriber::{run_subscriber, ShutdownSignals};
use std::process;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let signals = match ShutdownSignals::register() {
        Ok(signals) => signals,
        Err(e) => {
            eprintln!("{e}");
            process::exit(1);
        }
    };

    init_default_logging();

    info!("Starting static-subscriber v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run_subscriber(&StaticProfile::default(), signals.recv()).await {
        error!("Subscriber failed: {}", e);
        process::exit(1);
    }

    info!("Application shutdown complete");
}
