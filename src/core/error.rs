use std::io;
use thiserror::Error;

use super::types::{Address, ApplicationTag, DeviceId, ObjectId};

/// Custom error types for the gateway
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Unresolved source address: {0}")]
    UnresolvedSource(Address),

    #[error("Unknown object type: {0}")]
    UnknownObjectType(String),

    #[error("Unknown subscription for device {device}, object {object}")]
    UnknownSubscription { device: DeviceId, object: ObjectId },

    #[error("Unable to parse {input:?} as {tag}")]
    ValueParse { tag: ApplicationTag, input: String },

    #[error("Request rejected by engine: {0}")]
    RequestRejected(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Messaging fabric error: {0}")]
    Fabric(String),
}

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Creates a new decode error
    pub fn decode(msg: impl Into<String>) -> Self {
        Error::Decode(msg.into())
    }

    /// Creates a new value parse error
    pub fn value_parse(tag: ApplicationTag, input: impl Into<String>) -> Self {
        Error::ValueParse {
            tag,
            input: input.into(),
        }
    }

    /// Creates a new engine rejection error
    pub fn rejected(msg: impl Into<String>) -> Self {
        Error::RequestRejected(msg.into())
    }

    /// Creates a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Creates a new messaging fabric error
    pub fn fabric(msg: impl Into<String>) -> Self {
        Error::Fabric(msg.into())
    }
}
