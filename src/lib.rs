//! BACnet gateway: change-of-value subscriptions bridged to MQTT
//!
//! This library discovers BACnet devices and their objects, keeps a
//! change-of-value subscription alive for every object, publishes value
//! changes to an MQTT broker and turns inbound MQTT messages into
//! present-value writes. The field-bus protocol engine itself is supplied by
//! the caller through [`protocol::ProtocolEngine`].

pub mod bridge;
pub mod core;
pub mod discovery;
pub mod protocol;
pub mod util;

// Re-export commonly used items
pub use self::bridge::{Bridge, PollingLoop, Publisher, ValueUpdate, WriteCommand};
pub use self::core::{BridgeConfig, Error, Result};
pub use self::protocol::{EngineEvent, ProtocolEngine};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
