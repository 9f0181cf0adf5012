//! Telemetry utilities for connection observability.

/// Standardized span constructors for relay client tracing.
pub mod spans {
    use tracing::{info_span, Span};

    /// Create a span for one relay connection.
    pub fn connection(host: &str, port: u16) -> Span {
        info_span!("relay", host = %host, port = port)
    }

    /// Create a span for applying one inbound message.
    pub fn apply(id: Option<&str>) -> Span {
        info_span!("apply", id = id.unwrap_or(""))
    }
}
