//! MQTT side of the messaging fabric
//!
//! The client's event loop runs on a tokio task. Inbound publishes under the
//! command prefix are turned into [`WriteCommand`]s and queued for the
//! polling loop; outbound values go out through [`MqttPublisher`].

use std::time::Duration;

use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, Publish, QoS};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::topic::{command_filter, parse_command, WriteCommand};
use super::Publisher;
use crate::core::{Error, MqttSettings, Result};

/// Requests the client can queue before the event loop drains them
const CLIENT_CAPACITY: usize = 10;

/// Connected MQTT client plus its event-loop task
pub struct MqttFabric {
    client: AsyncClient,
    task: JoinHandle<()>,
}

impl MqttFabric {
    /// Starts the client and its event loop
    ///
    /// Must be called from within a tokio runtime. The connection is made
    /// (and remade) by the event loop; the command subscription is renewed on
    /// every connection acknowledgement.
    pub fn start(settings: &MqttSettings, commands: mpsc::Sender<WriteCommand>) -> Self {
        let mut options = MqttOptions::new(&settings.client_id, &settings.host, settings.port);
        options.set_keep_alive(settings.keep_alive);

        let (client, eventloop) = AsyncClient::new(options, CLIENT_CAPACITY);
        info!(host = %settings.host, port = settings.port, "connecting to MQTT broker");

        let task = tokio::spawn(run_event_loop(
            eventloop,
            client.clone(),
            settings.topic_in.clone(),
            commands,
        ));

        MqttFabric { client, task }
    }

    /// Publisher handle for the polling loop
    pub fn publisher(&self) -> MqttPublisher {
        MqttPublisher {
            client: self.client.clone(),
        }
    }

    /// Disconnects from the broker and stops the event loop
    pub async fn shutdown(self) -> Result<()> {
        let result = self
            .client
            .disconnect()
            .await
            .map_err(|err| Error::fabric(err.to_string()));
        self.task.abort();
        result
    }
}

/// Fire-and-forget publisher backed by the MQTT client
#[derive(Clone)]
pub struct MqttPublisher {
    client: AsyncClient,
}

impl Publisher for MqttPublisher {
    fn publish(&self, topic: &str, payload: &str) {
        if let Err(err) = self
            .client
            .try_publish(topic, QoS::AtMostOnce, false, payload.as_bytes().to_vec())
        {
            warn!(topic, error = %err, "failed to publish value");
        }
    }
}

async fn run_event_loop(
    mut eventloop: EventLoop,
    client: AsyncClient,
    topic_in: String,
    commands: mpsc::Sender<WriteCommand>,
) {
    let filter = command_filter(&topic_in);
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                info!(filter = %filter, "connected to MQTT broker");
                if let Err(err) = client.try_subscribe(filter.as_str(), QoS::AtLeastOnce) {
                    warn!(filter = %filter, error = %err, "failed to subscribe to commands");
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                if !route_publish(&topic_in, &publish, &commands) {
                    break;
                }
            }
            Ok(_) => {}
            Err(err) => {
                warn!(error = %err, "MQTT connection error");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }
    info!("MQTT event loop stopped");
}

/// Queues the command carried by `publish`, if any
///
/// Returns `false` once the polling loop has dropped its receiver.
fn route_publish(topic_in: &str, publish: &Publish, commands: &mpsc::Sender<WriteCommand>) -> bool {
    let Some(command) = parse_command(topic_in, &publish.topic, &publish.payload) else {
        return true;
    };
    debug!(topic = %publish.topic, "write command received");

    match commands.try_send(command) {
        Ok(()) => true,
        Err(TrySendError::Full(command)) => {
            warn!(
                device = %command.device_id,
                object_type = %command.object_type,
                instance = command.instance,
                "command queue full, dropping write"
            );
            true
        }
        Err(TrySendError::Closed(_)) => false,
    }
}
