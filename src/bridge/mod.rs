//! Bridge between engine events and the messaging fabric
//!
//! [`Bridge`] owns the device directory, the subscription ledger and the
//! discovery state. It is driven from the polling loop: engine events go
//! through [`Bridge::dispatch`], periodic work through [`Bridge::renew`] and
//! [`Bridge::retry_stalled`], and write commands through [`Bridge::write`].

pub mod mqtt;
pub mod notification;
pub mod poller;
pub mod topic;
pub mod write;

pub use self::mqtt::{MqttFabric, MqttPublisher};
pub use self::notification::apply_notification;
pub use self::poller::PollingLoop;
pub use self::topic::{ValueUpdate, WriteCommand};
pub use self::write::write_present_value;

use std::time::SystemTime;

use tracing::{debug, warn};

use crate::core::{BridgeConfig, InvokeId, Result};
use crate::discovery::{
    DeviceDirectory, DiscoveryOrchestrator, RenewalReport, RenewalScheduler, SubscriptionLedger,
};
use crate::protocol::{EngineEvent, ProtocolEngine};

/// Sink for outbound value messages
///
/// Publishing is fire-and-forget; implementations log their own failures.
pub trait Publisher {
    fn publish(&self, topic: &str, payload: &str);
}

impl<P: Publisher + ?Sized> Publisher for Box<P> {
    fn publish(&self, topic: &str, payload: &str) {
        (**self).publish(topic, payload)
    }
}

/// Gateway state and the handlers that act on it
pub struct Bridge<P> {
    directory: DeviceDirectory,
    ledger: SubscriptionLedger,
    orchestrator: DiscoveryOrchestrator,
    renewal: RenewalScheduler,
    publisher: P,
    topic_out: String,
}

impl<P: Publisher> Bridge<P> {
    /// Creates a bridge with empty state
    pub fn new(config: &BridgeConfig, publisher: P) -> Self {
        Bridge {
            directory: DeviceDirectory::new(),
            ledger: SubscriptionLedger::new(),
            orchestrator: DiscoveryOrchestrator::new(config),
            renewal: RenewalScheduler::new(config),
            publisher,
            topic_out: config.mqtt.topic_out.clone(),
        }
    }

    pub fn directory(&self) -> &DeviceDirectory {
        &self.directory
    }

    pub fn ledger(&self) -> &SubscriptionLedger {
        &self.ledger
    }

    pub fn orchestrator(&self) -> &DiscoveryOrchestrator {
        &self.orchestrator
    }

    pub fn publisher(&self) -> &P {
        &self.publisher
    }

    /// Handles one event from the engine
    ///
    /// Failures are logged where they happen; nothing here stops the loop.
    pub fn dispatch<E: ProtocolEngine>(&mut self, engine: &mut E, event: EngineEvent, now: SystemTime) {
        match event {
            EngineEvent::DeviceAnnounced { source } => {
                let _ = self.orchestrator.handle_announcement(engine, &source, now);
            }
            EngineEvent::ReadPropertyAck { source, ack, .. } => {
                let _ = self.orchestrator.handle_read_property_ack(
                    engine,
                    &mut self.directory,
                    &mut self.ledger,
                    &source,
                    &ack,
                    now,
                );
            }
            EngineEvent::CovNotification { notification, .. } => {
                if let Some(update) = apply_notification(&mut self.ledger, &notification, now) {
                    let topic = topic::outbound_topic(&self.topic_out, &update);
                    self.publisher.publish(&topic, &update.value);
                }
            }
            EngineEvent::SimpleAck {
                source,
                invoke_id,
                service,
            } => {
                debug!(source = %source, invoke_id, service = ?service, "request acknowledged");
            }
            EngineEvent::Error {
                source,
                invoke_id,
                service,
                error_class,
                error_code,
            } => {
                warn!(
                    source = %source,
                    invoke_id,
                    service = ?service,
                    error_class,
                    error_code,
                    "request failed"
                );
            }
            EngineEvent::Abort {
                source,
                invoke_id,
                reason,
                server,
            } => {
                warn!(source = %source, invoke_id, reason, server, "request aborted");
            }
            EngineEvent::Reject {
                source,
                invoke_id,
                reason,
            } => {
                warn!(source = %source, invoke_id, reason, "request rejected by peer");
            }
            EngineEvent::Timeout { invoke_id } => {
                warn!(invoke_id, "request timed out");
            }
        }
    }

    /// Runs one renewal sweep
    pub fn renew<E: ProtocolEngine>(&mut self, engine: &mut E, now: SystemTime) -> RenewalReport {
        let report = self.renewal.sweep(engine, &self.ledger, now);
        if report != RenewalReport::default() {
            debug!(
                sent = report.sent,
                rejected = report.rejected,
                deferred = report.deferred,
                "renewal sweep"
            );
        }
        report
    }

    /// Re-issues discovery steps that never got an answer
    pub fn retry_stalled<E: ProtocolEngine>(&mut self, engine: &mut E, now: SystemTime) -> usize {
        self.orchestrator.retry_stalled(engine, now)
    }

    /// Issues a write command
    pub fn write<E: ProtocolEngine>(&mut self, engine: &mut E, command: &WriteCommand) -> Result<InvokeId> {
        write_present_value(engine, &self.ledger, command).map_err(|err| {
            warn!(
                device = %command.device_id,
                object_type = %command.object_type,
                instance = command.instance,
                error = %err,
                "write command dropped"
            );
            err
        })
    }
}
