//! Protocol engine interface module
//!
//! This module defines the seam between the gateway and the field-bus
//! protocol engine, the application-data codec used to decode reply
//! payloads, and the canonical string form of values.

pub mod codec;
pub mod engine;
pub mod value;

#[cfg(test)]
pub(crate) mod mock;

pub use self::codec::ApplicationDataCodec;
pub use self::engine::{
    ConfirmedService,
    CovNotification,
    EngineEvent,
    PropertyValue,
    ProtocolEngine,
    ReadPropertyAck,
    SubscribeCov,
};
pub use self::value::{parse_value, to_canonical_string};
