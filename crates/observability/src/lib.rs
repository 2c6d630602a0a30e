//! Process-wide tracing setup shared by the scholaris binaries.

pub mod subscriber;

pub use subscriber::{LogFormat, LogSettings};

/// Initialize tracing with `RUST_LOG` filtering, falling back to the
/// settings' default directive.
///
/// Safe to call multiple times; only the first call installs a subscriber.
pub fn init(settings: &LogSettings) {
    subscriber::init(settings);
}
