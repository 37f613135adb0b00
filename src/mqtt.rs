// src/mqtt.rs
use std::time::Duration;

use log::{debug, info, warn};
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};

use crate::config::BrokerConfig;
use crate::drivers::TelemetrySource;

const REQUEST_CAPACITY: usize = 32;

/// Client options for `broker`; `role` keeps ids unique per process and purpose.
pub fn options(broker: &BrokerConfig, role: &str) -> MqttOptions {
    let client_id = format!("{}-{}-{}", broker.client_id, role, std::process::id());
    let mut options = MqttOptions::new(client_id, broker.host.clone(), broker.port);
    options.set_keep_alive(Duration::from_secs(broker.keep_alive_secs));
    options
}

pub fn connect(broker: &BrokerConfig, role: &str) -> (AsyncClient, EventLoop) {
    AsyncClient::new(options(broker, role), REQUEST_CAPACITY)
}

/// Subscription to the telemetry topic. Re-subscribes after every reconnect.
pub struct MqttSource {
    client: AsyncClient,
    eventloop: EventLoop,
    topic: String,
    endpoint: String,
    reconnect_delay: Duration,
}

impl MqttSource {
    pub fn connect(broker: &BrokerConfig) -> Self {
        let (client, eventloop) = connect(broker, "ingest");
        Self {
            client,
            eventloop,
            topic: broker.topic.clone(),
            endpoint: format!("{}:{}", broker.host, broker.port),
            reconnect_delay: Duration::from_millis(broker.reconnect_delay_ms),
        }
    }
}

impl TelemetrySource for MqttSource {
    async fn next_payload(&mut self) -> Option<Vec<u8>> {
        loop {
            match self.eventloop.poll().await {
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    return Some(publish.payload.to_vec());
                }
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    info!("connected to MQTT broker {}", self.endpoint);
                    if let Err(err) = self.client.subscribe(&self.topic, QoS::AtMostOnce).await {
                        warn!("subscribe to {} failed: {err}", self.topic);
                    }
                }
                Ok(Event::Incoming(Packet::SubAck(_))) => {
                    info!("subscribed to topic {}", self.topic);
                }
                Ok(other) => debug!("mqtt event: {other:?}"),
                Err(err) => {
                    warn!(
                        "MQTT connection to {} failed: {err}; retrying in {:?}",
                        self.endpoint, self.reconnect_delay
                    );
                    tokio::time::sleep(self.reconnect_delay).await;
                }
            }
        }
    }

    async fn close(&mut self) {
        if let Err(err) = self.client.try_disconnect() {
            debug!("mqtt disconnect: {err}");
        }
        info!("telemetry subscription to {} closed", self.topic);
    }
}
