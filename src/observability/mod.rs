//! Observability for the subscriber
//!
//! Structured logging through `tracing`, configured from the environment.

pub mod logging;

// Re-export for convenience
pub use logging::{init_default_logging, init_logging, parse_level, LogFormat};

// Span macros for structured logging
pub use logging::{lifecycle_span, mqtt_span};
