//! Recording engine used by the unit tests

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio_util::codec::Encoder;

use super::codec::ApplicationDataCodec;
use super::engine::{EngineEvent, ProtocolEngine, SubscribeCov};
use crate::core::{Address, ApplicationValue, ArrayIndex, DeviceId, Error, InvokeId, ObjectId, PropertyId, Result};

/// A request the gateway handed to the engine
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    WhoIs,
    Read {
        device: DeviceId,
        object: ObjectId,
        property: PropertyId,
        array_index: ArrayIndex,
    },
    Write {
        device: DeviceId,
        object: ObjectId,
        property: PropertyId,
        value: ApplicationValue,
        priority: Option<u8>,
        array_index: ArrayIndex,
    },
    Subscribe {
        device: DeviceId,
        request: SubscribeCov,
    },
}

#[derive(Default)]
pub struct MockEngine {
    pub requests: Vec<Request>,
    pub inbound: VecDeque<EngineEvent>,
    pub addresses: HashMap<Address, DeviceId>,
    /// Reject every confirmed request while set
    pub reject: bool,
    pub timer_ticks: Vec<Duration>,
    pub maintenance_ticks: Vec<Duration>,
    next_invoke_id: InvokeId,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a device and returns the address it answers from
    pub fn with_device(mut self, device: DeviceId) -> (Self, Address) {
        let address = address_of(device);
        self.addresses.insert(address.clone(), device);
        (self, address)
    }

    pub fn subscriptions(&self) -> Vec<(DeviceId, ObjectId)> {
        self.requests
            .iter()
            .filter_map(|request| match request {
                Request::Subscribe { device, request } => Some((*device, request.monitored_object)),
                _ => None,
            })
            .collect()
    }

    pub fn reads(&self) -> Vec<(DeviceId, PropertyId)> {
        self.requests
            .iter()
            .filter_map(|request| match request {
                Request::Read { device, property, .. } => Some((*device, *property)),
                _ => None,
            })
            .collect()
    }

    fn confirmed(&mut self, request: Request) -> Result<InvokeId> {
        if self.reject {
            return Err(Error::rejected("no free invoke id"));
        }
        self.requests.push(request);
        self.next_invoke_id = self.next_invoke_id.wrapping_add(1);
        Ok(self.next_invoke_id)
    }
}

impl ProtocolEngine for MockEngine {
    fn receive(&mut self, _timeout: Duration) -> Option<EngineEvent> {
        self.inbound.pop_front()
    }

    fn expire_timers(&mut self, elapsed: Duration) {
        self.timer_ticks.push(elapsed);
    }

    fn maintain(&mut self, elapsed: Duration) {
        self.maintenance_ticks.push(elapsed);
    }

    fn resolve_device(&self, source: &Address) -> Option<DeviceId> {
        self.addresses.get(source).copied()
    }

    fn send_who_is(&mut self) -> Result<()> {
        self.requests.push(Request::WhoIs);
        Ok(())
    }

    fn read_property(
        &mut self,
        device: DeviceId,
        object: ObjectId,
        property: PropertyId,
        array_index: ArrayIndex,
    ) -> Result<InvokeId> {
        self.confirmed(Request::Read {
            device,
            object,
            property,
            array_index,
        })
    }

    fn write_property(
        &mut self,
        device: DeviceId,
        object: ObjectId,
        property: PropertyId,
        value: &ApplicationValue,
        priority: Option<u8>,
        array_index: ArrayIndex,
    ) -> Result<InvokeId> {
        self.confirmed(Request::Write {
            device,
            object,
            property,
            value: value.clone(),
            priority,
            array_index,
        })
    }

    fn subscribe_cov(&mut self, device: DeviceId, request: &SubscribeCov) -> Result<InvokeId> {
        self.confirmed(Request::Subscribe {
            device,
            request: request.clone(),
        })
    }
}

/// Deterministic BACnet/IP-style address for a device
pub fn address_of(device: DeviceId) -> Address {
    let mut mac = vec![10, 0, 0, 0, 0xBA, 0xC0];
    mac[2..4].copy_from_slice(&((device.0 & 0xFFFF) as u16).to_be_bytes());
    Address::local(mac)
}

/// Encodes values the way they travel in a ReadProperty-ACK
pub fn encode(values: &[ApplicationValue]) -> Bytes {
    let mut codec = ApplicationDataCodec::new();
    let mut buf = BytesMut::new();
    for value in values {
        codec.encode(value, &mut buf).expect("encoding never fails");
    }
    buf.freeze()
}
