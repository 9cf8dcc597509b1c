//! Core types and traits for the gateway
//!
//! This module contains the fundamental building blocks used throughout the library.

pub mod config;
pub mod error;
pub mod serde;
pub mod types;

pub use self::config::{BridgeConfig, MqttSettings};
pub use self::error::{Error, Result};
pub use self::types::{
    Address,
    ApplicationTag,
    ApplicationValue,
    ArrayIndex,
    Date,
    DeviceId,
    InvokeId,
    ObjectId,
    ObjectType,
    PropertyId,
    Time,
};
