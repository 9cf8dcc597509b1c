use std::time::Duration;

use bytes::Bytes;

use crate::core::{Address, ApplicationValue, ArrayIndex, DeviceId, InvokeId, ObjectId, PropertyId, Result};

/// Confirmed services the gateway issues
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmedService {
    ReadProperty,
    WriteProperty,
    SubscribeCov,
    CovNotification,
}

/// Parameters of a SubscribeCOV request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeCov {
    /// Process identifier echoed back in notifications
    pub subscriber_process_id: u32,
    /// Object whose changes are reported
    pub monitored_object: ObjectId,
    /// Cancel instead of subscribe
    pub cancellation: bool,
    /// Ask for confirmed notifications
    pub confirmed_notifications: bool,
    /// Requested lifetime in seconds
    pub lifetime: u32,
}

/// Decoded ReadProperty-ACK
#[derive(Debug, Clone, PartialEq)]
pub struct ReadPropertyAck {
    /// Object that was read
    pub object: ObjectId,
    /// Property that was read
    pub property: PropertyId,
    /// Array index that was read
    pub array_index: ArrayIndex,
    /// Raw application-tagged property value
    pub application_data: Bytes,
}

/// One changed property carried in a COV notification
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyValue {
    pub property: PropertyId,
    pub array_index: ArrayIndex,
    pub value: ApplicationValue,
    pub priority: Option<u8>,
}

/// Decoded COV notification
#[derive(Debug, Clone, PartialEq)]
pub struct CovNotification {
    pub subscriber_process_id: u32,
    pub initiating_device: DeviceId,
    pub monitored_object: ObjectId,
    /// Seconds left on the subscription
    pub time_remaining: u32,
    pub values: Vec<PropertyValue>,
}

/// Everything the engine can hand back to the gateway
///
/// Each variant stands in for one callback registration point of the
/// protocol stack; the engine yields them from [`ProtocolEngine::receive`].
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// I-Am received and registered in the engine's address table
    DeviceAnnounced { source: Address },
    /// ReadProperty-ACK for an earlier request
    ReadPropertyAck {
        source: Address,
        invoke_id: InvokeId,
        ack: ReadPropertyAck,
    },
    /// Confirmed or unconfirmed COV notification (confirmed ones already acknowledged)
    CovNotification {
        source: Address,
        confirmed: bool,
        notification: CovNotification,
    },
    /// SimpleACK for a confirmed request
    SimpleAck {
        source: Address,
        invoke_id: InvokeId,
        service: ConfirmedService,
    },
    /// Error PDU for a confirmed request
    Error {
        source: Address,
        invoke_id: InvokeId,
        service: ConfirmedService,
        error_class: u32,
        error_code: u32,
    },
    /// Abort PDU
    Abort {
        source: Address,
        invoke_id: InvokeId,
        reason: u8,
        server: bool,
    },
    /// Reject PDU
    Reject {
        source: Address,
        invoke_id: InvokeId,
        reason: u8,
    },
    /// A confirmed request ran out of retries
    Timeout { invoke_id: InvokeId },
}

/// The field-bus protocol engine the gateway drives
///
/// Implementations own framing, addressing, transport and invoke-id
/// bookkeeping. All methods are called from the polling thread; request
/// methods never wait for the reply and fail with
/// [`Error::RequestRejected`](crate::core::Error::RequestRejected) when the
/// request cannot be queued (for example, no free invoke id).
pub trait ProtocolEngine {
    /// Waits up to `timeout` for the next inbound event
    fn receive(&mut self, timeout: Duration) -> Option<EngineEvent>;

    /// Advances the transaction state machine timers
    fn expire_timers(&mut self, elapsed: Duration);

    /// Periodic datalink housekeeping (foreign device registration and the like)
    fn maintain(&mut self, _elapsed: Duration) {}

    /// Maps a source address to the device it belongs to
    fn resolve_device(&self, source: &Address) -> Option<DeviceId>;

    /// Broadcasts a global Who-Is
    fn send_who_is(&mut self) -> Result<()>;

    /// Issues a confirmed ReadProperty
    fn read_property(
        &mut self,
        device: DeviceId,
        object: ObjectId,
        property: PropertyId,
        array_index: ArrayIndex,
    ) -> Result<InvokeId>;

    /// Issues a confirmed WriteProperty
    fn write_property(
        &mut self,
        device: DeviceId,
        object: ObjectId,
        property: PropertyId,
        value: &ApplicationValue,
        priority: Option<u8>,
        array_index: ArrayIndex,
    ) -> Result<InvokeId>;

    /// Issues a confirmed SubscribeCOV
    fn subscribe_cov(&mut self, device: DeviceId, request: &SubscribeCov) -> Result<InvokeId>;
}
