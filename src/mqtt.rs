use std::time::Duration;

use rumqttc::{
    AsyncClient, ClientError, ConnectionError, Event, EventLoop, MqttOptions, Outgoing, Packet,
    QoS,
};
use tracing::{debug, error, info, warn};

use crate::settings::ReportSettings;

/// Queued publishes the client holds while the event loop is busy or reconnecting.
const REQUEST_CAPACITY: usize = 16;
/// Connection attempts before giving up on a broker that never answered.
const MAX_CONNECT_RETRIES: u32 = 5;

/// Publishes report payloads to one broker topic.
///
/// `publish` never waits: when the request queue is full the payload is refused,
/// like the scheduler never waits on its consumer.
pub struct MqttPublisher {
    client: AsyncClient,
    topic: String,
}

impl MqttPublisher {
    /// Build the client. Nothing touches the network until the returned event loop
    /// is driven with [`drive`].
    pub fn new(settings: &ReportSettings) -> (Self, EventLoop) {
        let client_id = format!("seismometer-{}", uuid::Uuid::new_v4());
        let mut options = MqttOptions::new(client_id, settings.broker.clone(), settings.port);
        options.set_keep_alive(Duration::from_secs(30));

        let (client, eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);
        let publisher = Self {
            client,
            topic: settings.topic.clone(),
        };
        (publisher, eventloop)
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn publish(&self, payload: String) -> Result<(), ClientError> {
        self.client.try_publish(self.topic.as_str(), QoS::AtMostOnce, false, payload)
    }

    pub async fn disconnect(&self) {
        if let Err(e) = self.client.disconnect().await {
            debug!("MQTT disconnect request not queued: {}", e);
        }
    }
}

/// Poll the client's event loop until it disconnects.
///
/// Fails if the broker never accepts a connection within `MAX_CONNECT_RETRIES`
/// attempts. After the first successful connection, errors are retried forever.
pub async fn drive(mut eventloop: EventLoop) -> Result<(), ConnectionError> {
    let mut connected = false;
    let mut failures = 0u32;

    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                let (host, port) = eventloop.mqtt_options.broker_address();
                info!("Connected to MQTT broker {}:{} ({:?})", host, port, ack.code);
                connected = true;
                failures = 0;
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                info!("MQTT client disconnected");
                return Ok(());
            }
            Ok(_) => {}
            Err(e) => {
                failures += 1;
                if !connected && failures >= MAX_CONNECT_RETRIES {
                    error!("MQTT broker unreachable after {} attempts: {}", failures, e);
                    return Err(e);
                }
                warn!("MQTT connection error: {}. Retrying in 1s.", e);
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }
}
