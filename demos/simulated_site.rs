//! Runs the gateway against a simulated building
//!
//! Two devices answer Who-Is, report their object lists and names, accept
//! subscriptions and send a change-of-value notification whenever a value
//! drifts or is written. Values are published to MQTT when `MQTT_HOST` is
//! set and logged otherwise.
//!
//! ```text
//! MQTT_HOST=localhost cargo run --example simulated_site
//! mosquitto_pub -t bacnet-in/1001/analog-value/2 -m 21.5
//! ```

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bacnet_gateway::core::{
    Address, ApplicationValue, ArrayIndex, BridgeConfig, DeviceId, Error, InvokeId, ObjectId, ObjectType, PropertyId,
    Result,
};
use bacnet_gateway::bridge::MqttFabric;
use bacnet_gateway::protocol::{
    ApplicationDataCodec, ConfirmedService, CovNotification, EngineEvent, PropertyValue, ProtocolEngine,
    ReadPropertyAck, SubscribeCov,
};
use bacnet_gateway::util::init_tracing;
use bacnet_gateway::{PollingLoop, Publisher};
use bytes::BytesMut;
use tokio::sync::mpsc;
use tokio_util::codec::Encoder;
use tracing::info;

/// How often simulated inputs drift
const DRIFT_INTERVAL: Duration = Duration::from_secs(10);

struct SimulatedDevice {
    name: String,
    address: Address,
    values: BTreeMap<ObjectId, ApplicationValue>,
    subscribed: BTreeMap<ObjectId, Instant>,
}

/// Engine that answers requests from an in-memory site
struct SimulatedEngine {
    devices: HashMap<DeviceId, SimulatedDevice>,
    pending: VecDeque<EngineEvent>,
    next_invoke_id: InvokeId,
    last_drift: Instant,
    step: u32,
}

impl SimulatedEngine {
    fn new() -> Self {
        let mut devices = HashMap::new();
        devices.insert(
            DeviceId(1001),
            SimulatedDevice::new(
                "AHU-1",
                1,
                [
                    (ObjectId::new(ObjectType::ANALOG_INPUT, 1), ApplicationValue::Real(72.5)),
                    (ObjectId::new(ObjectType::ANALOG_VALUE, 2), ApplicationValue::Real(21.0)),
                    (ObjectId::new(ObjectType::BINARY_OUTPUT, 3), ApplicationValue::Enumerated(0)),
                ],
            ),
        );
        devices.insert(
            DeviceId(2002),
            SimulatedDevice::new(
                "Boiler",
                2,
                [
                    (ObjectId::new(ObjectType::ANALOG_INPUT, 1), ApplicationValue::Real(140.0)),
                    (ObjectId::new(ObjectType::MULTI_STATE_VALUE, 1), ApplicationValue::Unsigned(1)),
                ],
            ),
        );

        SimulatedEngine {
            devices,
            pending: VecDeque::new(),
            next_invoke_id: 0,
            last_drift: Instant::now(),
            step: 0,
        }
    }

    fn invoke_id(&mut self) -> InvokeId {
        self.next_invoke_id = self.next_invoke_id.wrapping_add(1);
        self.next_invoke_id
    }

    fn device(&self, device_id: DeviceId) -> Result<&SimulatedDevice> {
        self.devices
            .get(&device_id)
            .ok_or_else(|| Error::rejected(format!("no route to device {}", device_id)))
    }

    fn notify(&mut self, device_id: DeviceId, object: ObjectId) {
        let Some(device) = self.devices.get(&device_id) else {
            return;
        };
        let (Some(value), Some(since)) = (device.values.get(&object), device.subscribed.get(&object)) else {
            return;
        };
        let time_remaining = 300u32.saturating_sub(since.elapsed().as_secs() as u32);
        self.pending.push_back(EngineEvent::CovNotification {
            source: device.address.clone(),
            confirmed: true,
            notification: CovNotification {
                subscriber_process_id: device_id.0,
                initiating_device: device_id,
                monitored_object: object,
                time_remaining,
                values: vec![PropertyValue {
                    property: PropertyId::PRESENT_VALUE,
                    array_index: ArrayIndex::All,
                    value: value.clone(),
                    priority: None,
                }],
            },
        });
    }

    fn drift(&mut self) {
        self.step += 1;
        let delta = if self.step % 2 == 0 { 0.5 } else { -0.25 };
        let mut changed = Vec::new();
        for (device_id, device) in &mut self.devices {
            for (object, value) in &mut device.values {
                if object.object_type == ObjectType::ANALOG_INPUT {
                    if let ApplicationValue::Real(current) = value {
                        *current += delta;
                        changed.push((*device_id, *object));
                    }
                }
            }
        }
        for (device_id, object) in changed {
            self.notify(device_id, object);
        }
    }
}

impl SimulatedDevice {
    fn new<const N: usize>(name: &str, host: u8, values: [(ObjectId, ApplicationValue); N]) -> Self {
        SimulatedDevice {
            name: name.to_string(),
            address: Address::local(vec![192, 168, 1, host, 0xBA, 0xC0]),
            values: values.into_iter().collect(),
            subscribed: BTreeMap::new(),
        }
    }
}

fn encode(values: &[ApplicationValue]) -> Result<bytes::Bytes> {
    let mut codec = ApplicationDataCodec::new();
    let mut buf = BytesMut::new();
    for value in values {
        codec.encode(value, &mut buf)?;
    }
    Ok(buf.freeze())
}

impl ProtocolEngine for SimulatedEngine {
    fn receive(&mut self, timeout: Duration) -> Option<EngineEvent> {
        if self.last_drift.elapsed() >= DRIFT_INTERVAL {
            self.last_drift = Instant::now();
            self.drift();
        }
        match self.pending.pop_front() {
            Some(event) => Some(event),
            None => {
                std::thread::sleep(timeout);
                None
            }
        }
    }

    fn expire_timers(&mut self, _elapsed: Duration) {}

    fn resolve_device(&self, source: &Address) -> Option<DeviceId> {
        self.devices
            .iter()
            .find(|(_, device)| device.address == *source)
            .map(|(device_id, _)| *device_id)
    }

    fn send_who_is(&mut self) -> Result<()> {
        let sources: Vec<Address> = self.devices.values().map(|device| device.address.clone()).collect();
        self.pending
            .extend(sources.into_iter().map(|source| EngineEvent::DeviceAnnounced { source }));
        Ok(())
    }

    fn read_property(
        &mut self,
        device_id: DeviceId,
        object: ObjectId,
        property: PropertyId,
        array_index: ArrayIndex,
    ) -> Result<InvokeId> {
        let device = self.device(device_id)?;
        let values = match property {
            PropertyId::OBJECT_LIST => std::iter::once(ObjectId::device(device_id))
                .chain(device.values.keys().copied())
                .map(ApplicationValue::ObjectId)
                .collect(),
            PropertyId::OBJECT_NAME => vec![ApplicationValue::CharacterString(device.name.clone())],
            other => return Err(Error::rejected(format!("{} is not simulated", other))),
        };
        let ack = ReadPropertyAck {
            object,
            property,
            array_index,
            application_data: encode(&values)?,
        };
        let source = device.address.clone();
        let invoke_id = self.invoke_id();
        self.pending.push_back(EngineEvent::ReadPropertyAck { source, invoke_id, ack });
        Ok(invoke_id)
    }

    fn write_property(
        &mut self,
        device_id: DeviceId,
        object: ObjectId,
        _property: PropertyId,
        value: &ApplicationValue,
        _priority: Option<u8>,
        _array_index: ArrayIndex,
    ) -> Result<InvokeId> {
        let invoke_id = self.invoke_id();
        let device = self
            .devices
            .get_mut(&device_id)
            .ok_or_else(|| Error::rejected(format!("no route to device {}", device_id)))?;
        device.values.insert(object, value.clone());
        let source = device.address.clone();
        self.pending.push_back(EngineEvent::SimpleAck {
            source,
            invoke_id,
            service: ConfirmedService::WriteProperty,
        });
        self.notify(device_id, object);
        Ok(invoke_id)
    }

    fn subscribe_cov(&mut self, device_id: DeviceId, request: &SubscribeCov) -> Result<InvokeId> {
        let invoke_id = self.invoke_id();
        let device = self
            .devices
            .get_mut(&device_id)
            .ok_or_else(|| Error::rejected(format!("no route to device {}", device_id)))?;
        device.subscribed.insert(request.monitored_object, Instant::now());
        let source = device.address.clone();
        self.pending.push_back(EngineEvent::SimpleAck {
            source,
            invoke_id,
            service: ConfirmedService::SubscribeCov,
        });
        // Initial notification, as a real device would send
        self.notify(device_id, request.monitored_object);
        Ok(invoke_id)
    }
}

/// Logs values instead of publishing them
struct LogPublisher;

impl Publisher for LogPublisher {
    fn publish(&self, topic: &str, payload: &str) {
        info!(topic, payload, "value");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = BridgeConfig::from_env()?;
    config.validate()?;
    init_tracing(config.debug);

    let (command_tx, command_rx) = mpsc::channel(config.command_queue_capacity);
    let shutdown = Arc::new(AtomicBool::new(false));

    let fabric = if std::env::var("MQTT_HOST").is_ok() {
        Some(MqttFabric::start(&config.mqtt, command_tx))
    } else {
        info!("MQTT_HOST not set, logging values instead of publishing");
        drop(command_tx);
        None
    };
    let publisher: Box<dyn Publisher + Send> = match &fabric {
        Some(fabric) => Box::new(fabric.publisher()),
        None => Box::new(LogPublisher),
    };

    let loop_config = config.clone();
    let loop_shutdown = shutdown.clone();
    let worker = tokio::task::spawn_blocking(move || {
        let mut poller = PollingLoop::new(
            &loop_config,
            SimulatedEngine::new(),
            publisher,
            command_rx,
            loop_shutdown,
        );
        poller.run();
        poller.bridge().orchestrator().stats()
    });

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    shutdown.store(true, Ordering::Relaxed);

    match worker.await {
        Ok(stats) => info!(?stats, "discovery summary"),
        Err(err) => return Err(Error::fabric(format!("polling loop panicked: {}", err))),
    }
    if let Some(fabric) = fabric {
        fabric.shutdown().await?;
    }
    Ok(())
}
