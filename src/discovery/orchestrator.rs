use std::collections::HashMap;
use std::time::{Duration, SystemTime};

use bytes::BytesMut;
use tokio_util::codec::Decoder;
use tracing::{debug, info, warn};

use super::directory::DeviceDirectory;
use super::ledger::SubscriptionLedger;
use super::subscribe_request;
use crate::core::{
    Address, ApplicationValue, ArrayIndex, BridgeConfig, DeviceId, Error, InvokeId, ObjectId, PropertyId, Result,
};
use crate::protocol::{ApplicationDataCodec, ProtocolEngine, ReadPropertyAck};

/// Discovery progress of one device
///
/// A device without a state has not been seen yet. `invoke_id` is `None`
/// when the engine refused the request; the stalled-step check issues it
/// again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryState {
    /// Waiting for the object list
    ObjectListRequested {
        invoke_id: Option<InvokeId>,
        sent_at: SystemTime,
    },
    /// Object list handled, waiting for the device name
    NameRequested {
        invoke_id: Option<InvokeId>,
        sent_at: SystemTime,
    },
    /// Discovery finished
    Ready,
}

impl DiscoveryState {
    fn sent_at(&self) -> Option<(Option<InvokeId>, SystemTime)> {
        match *self {
            DiscoveryState::ObjectListRequested { invoke_id, sent_at }
            | DiscoveryState::NameRequested { invoke_id, sent_at } => Some((invoke_id, sent_at)),
            DiscoveryState::Ready => None,
        }
    }
}

/// Discovery counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiscoveryStats {
    pub announcements: u64,
    pub object_lists_received: u64,
    pub names_received: u64,
    pub decode_failures: u64,
    pub unresolved_sources: u64,
    pub rejected_requests: u64,
    pub subscriptions_sent: u64,
    pub step_retries: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    ObjectList,
    Name,
}

impl Step {
    fn property(self) -> PropertyId {
        match self {
            Step::ObjectList => PropertyId::OBJECT_LIST,
            Step::Name => PropertyId::OBJECT_NAME,
        }
    }

    fn pending(self, invoke_id: Option<InvokeId>, sent_at: SystemTime) -> DiscoveryState {
        match self {
            Step::ObjectList => DiscoveryState::ObjectListRequested { invoke_id, sent_at },
            Step::Name => DiscoveryState::NameRequested { invoke_id, sent_at },
        }
    }
}

/// Drives each device from announcement to subscribed and named
pub struct DiscoveryOrchestrator {
    states: HashMap<DeviceId, DiscoveryState>,
    stats: DiscoveryStats,
    lifetime: u32,
    step_timeout: Option<Duration>,
}

impl DiscoveryOrchestrator {
    /// Creates a new orchestrator
    pub fn new(config: &BridgeConfig) -> Self {
        DiscoveryOrchestrator {
            states: HashMap::new(),
            stats: DiscoveryStats::default(),
            lifetime: config.lifetime_secs(),
            step_timeout: config.step_timeout,
        }
    }

    pub fn state(&self, device_id: DeviceId) -> Option<DiscoveryState> {
        self.states.get(&device_id).copied()
    }

    pub fn stats(&self) -> DiscoveryStats {
        self.stats
    }

    /// Handles an I-Am from `source`
    pub fn handle_announcement<E: ProtocolEngine>(
        &mut self,
        engine: &mut E,
        source: &Address,
        now: SystemTime,
    ) -> Result<()> {
        let device_id = self.resolve(&*engine, source)?;
        self.stats.announcements += 1;

        match self.states.get(&device_id).copied() {
            Some(DiscoveryState::Ready) => {
                debug!(device = %device_id, "announcement from discovered device");
                Ok(())
            }
            Some(DiscoveryState::NameRequested { .. }) => self.request(engine, device_id, Step::Name, now),
            Some(DiscoveryState::ObjectListRequested { .. }) | None => {
                info!(device = %device_id, source = %source, "discovering device");
                self.request(engine, device_id, Step::ObjectList, now)
            }
        }
    }

    /// Handles a ReadProperty-ACK from `source`
    ///
    /// Replies for anything other than the object list or name of a device
    /// object are ignored.
    pub fn handle_read_property_ack<E: ProtocolEngine>(
        &mut self,
        engine: &mut E,
        directory: &mut DeviceDirectory,
        ledger: &mut SubscriptionLedger,
        source: &Address,
        ack: &ReadPropertyAck,
        now: SystemTime,
    ) -> Result<()> {
        let device_id = self.resolve(&*engine, source)?;
        if !ack.object.object_type.is_device() {
            debug!(device = %device_id, object = %ack.object, "ignoring read reply for non-device object");
            return Ok(());
        }

        match ack.property {
            PropertyId::OBJECT_LIST => self.handle_object_list(engine, directory, ledger, device_id, ack, now),
            PropertyId::OBJECT_NAME => {
                self.handle_name(directory, device_id, ack);
                Ok(())
            }
            other => {
                debug!(device = %device_id, property = %other, "ignoring read reply");
                Ok(())
            }
        }
    }

    /// Re-issues every pending step older than the step timeout
    ///
    /// Returns the number of steps issued again.
    pub fn retry_stalled<E: ProtocolEngine>(&mut self, engine: &mut E, now: SystemTime) -> usize {
        let Some(timeout) = self.step_timeout else {
            return 0;
        };

        let mut stalled: Vec<(DeviceId, Step)> = self
            .states
            .iter()
            .filter_map(|(device_id, state)| {
                let (invoke_id, sent_at) = state.sent_at()?;
                let waited = now.duration_since(sent_at).unwrap_or(Duration::ZERO);
                if invoke_id.is_some() && waited < timeout {
                    return None;
                }
                let step = match state {
                    DiscoveryState::NameRequested { .. } => Step::Name,
                    _ => Step::ObjectList,
                };
                Some((*device_id, step))
            })
            .collect();
        stalled.sort_by_key(|(device_id, _)| *device_id);

        for (device_id, step) in &stalled {
            debug!(device = %device_id, step = ?step, "discovery step stalled, asking again");
            self.stats.step_retries += 1;
            // Failures are counted and logged by request
            let _ = self.request(engine, *device_id, *step, now);
        }
        stalled.len()
    }

    fn resolve<E: ProtocolEngine>(&mut self, engine: &E, source: &Address) -> Result<DeviceId> {
        engine.resolve_device(source).ok_or_else(|| {
            self.stats.unresolved_sources += 1;
            debug!(source = %source, "no device for source address");
            Error::UnresolvedSource(source.clone())
        })
    }

    fn request<E: ProtocolEngine>(
        &mut self,
        engine: &mut E,
        device_id: DeviceId,
        step: Step,
        now: SystemTime,
    ) -> Result<()> {
        let device_object = ObjectId::device(device_id);
        match engine.read_property(device_id, device_object, step.property(), ArrayIndex::All) {
            Ok(invoke_id) => {
                debug!(device = %device_id, invoke_id, property = %step.property(), "read requested");
                self.states.insert(device_id, step.pending(Some(invoke_id), now));
                Ok(())
            }
            Err(err) => {
                self.stats.rejected_requests += 1;
                warn!(device = %device_id, property = %step.property(), error = %err, "read request rejected");
                if self.states.contains_key(&device_id) {
                    self.states.insert(device_id, step.pending(None, now));
                }
                Err(err)
            }
        }
    }

    fn handle_object_list<E: ProtocolEngine>(
        &mut self,
        engine: &mut E,
        directory: &mut DeviceDirectory,
        ledger: &mut SubscriptionLedger,
        device_id: DeviceId,
        ack: &ReadPropertyAck,
        now: SystemTime,
    ) -> Result<()> {
        let objects = match decode_object_list(&ack.application_data) {
            Ok(objects) => objects,
            Err(err) => {
                self.stats.decode_failures += 1;
                warn!(device = %device_id, error = %err, "discarding undecodable object list");
                return Err(err);
            }
        };
        self.stats.object_lists_received += 1;
        info!(device = %device_id, objects = objects.len(), "object list received");

        for object in objects.iter().filter(|object| !object.object_type.is_device()) {
            ledger.seed(device_id, *object);
            let request = subscribe_request(device_id, *object, self.lifetime);
            match engine.subscribe_cov(device_id, &request) {
                Ok(invoke_id) => {
                    self.stats.subscriptions_sent += 1;
                    debug!(device = %device_id, object = %object, invoke_id, "subscription requested");
                }
                Err(err) => {
                    // Seeded entries are already expired, so the next sweep tries again
                    self.stats.rejected_requests += 1;
                    warn!(device = %device_id, object = %object, error = %err, "subscription rejected");
                }
            }
        }

        directory.upsert(device_id, objects);
        // Pending even if the engine refuses the name read
        self.states.insert(device_id, Step::Name.pending(None, now));
        self.request(engine, device_id, Step::Name, now)
    }

    fn handle_name(&mut self, directory: &mut DeviceDirectory, device_id: DeviceId, ack: &ReadPropertyAck) {
        match decode_name(&ack.application_data) {
            Ok(name) => {
                self.stats.names_received += 1;
                info!(device = %device_id, name = %name, "device name received");
                if !directory.set_name(device_id, name) {
                    return;
                }
            }
            Err(err) => {
                self.stats.decode_failures += 1;
                warn!(device = %device_id, error = %err, "undecodable device name");
                if directory.lookup(device_id).is_none() {
                    return;
                }
            }
        }
        self.states.insert(device_id, DiscoveryState::Ready);
        info!(device = %device_id, "device ready");
    }
}

/// Decodes an object-list reply, failing on any malformed or non-identifier value
fn decode_object_list(data: &[u8]) -> Result<Vec<ObjectId>> {
    let mut codec = ApplicationDataCodec::new();
    let mut buf = BytesMut::from(data);
    let mut objects = Vec::new();
    while let Some(value) = codec.decode_eof(&mut buf)? {
        match value {
            ApplicationValue::ObjectId(object) => objects.push(object),
            other => {
                return Err(Error::decode(format!(
                    "object list entry {} is {}, expected object identifier",
                    objects.len(),
                    other.tag()
                )))
            }
        }
    }
    Ok(objects)
}

fn decode_name(data: &[u8]) -> Result<String> {
    let mut codec = ApplicationDataCodec::new();
    let mut buf = BytesMut::from(data);
    match codec.decode_eof(&mut buf)? {
        Some(ApplicationValue::CharacterString(name)) => Ok(name),
        Some(other) => Err(Error::decode(format!("device name is {}", other.tag()))),
        None => Err(Error::decode("empty device name reply")),
    }
}
