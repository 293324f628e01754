use log::{debug, error, warn};
use serde::Serialize;

use crate::mqtt_wrapper::{MqttWrapper, QoS};
use crate::payload::BridgeStatus;

pub static AVAILABILITY: &str = "availability";
pub static STATUS: &str = "status";
pub static INFO: &str = "info";
pub static POWER_LIMIT: &str = "maxPower_W";
pub static BRIDGE_STATUS: &str = "_status";

static AVAILABLE: &str = "1";
static NOT_AVAILABLE: &str = "0";

/// Builds the topics a device publishes under below the base topic.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Topics {
    base: String,
}

impl Topics {
    pub fn new(base: &str) -> Self {
        Self {
            base: base.trim_end_matches('/').to_string(),
        }
    }

    pub fn device(&self, segment: &str, leaf: &str) -> String {
        format!("{}/{segment}/{leaf}", self.base)
    }

    pub fn availability(&self, segment: &str) -> String {
        self.device(segment, AVAILABILITY)
    }

    pub fn status(&self, segment: &str) -> String {
        self.device(segment, STATUS)
    }

    pub fn info(&self, segment: &str) -> String {
        self.device(segment, INFO)
    }

    pub fn power_limit(&self, segment: &str) -> String {
        self.device(segment, POWER_LIMIT)
    }

    pub fn power_limit_command(&self, segment: &str) -> String {
        format!("{}/set", self.power_limit(segment))
    }

    pub fn bridge_status(&self) -> String {
        format!("{}/{BRIDGE_STATUS}", self.base)
    }

    /// Extracts the device segment from a power-limit command topic.
    pub fn parse_power_limit_command<'t>(&self, topic: &'t str) -> Option<&'t str> {
        let segment = topic
            .strip_prefix(self.base.as_str())?
            .strip_prefix('/')?
            .strip_suffix("/set")?
            .strip_suffix(POWER_LIMIT)?
            .strip_suffix('/')?;
        (!segment.is_empty()).then_some(segment)
    }
}

/// Publishing side of the broker connection, shared by every device
/// reconciliation and the command dispatcher.
///
/// Publishing never fails from the caller's perspective: while the transport
/// is disconnected a message is dropped with a warning, transport errors are
/// logged.
#[derive(Clone)]
pub struct Publisher<MQTT: MqttWrapper> {
    client: MQTT,
    topics: Topics,
}

impl<MQTT: MqttWrapper> Publisher<MQTT> {
    pub fn new(client: MQTT, base_topic: &str) -> Self {
        Self {
            client,
            topics: Topics::new(base_topic),
        }
    }

    pub fn topics(&self) -> &Topics {
        &self.topics
    }

    pub fn publish_json<T: Serialize>(&self, topic: &str, payload: &T, retain: bool) {
        match serde_json::to_string(payload) {
            Ok(payload) => self.publish_raw(topic, &payload, retain),
            Err(e) => error!("Failed to serialize payload for {topic}: {e}"),
        }
    }

    pub fn publish_raw(&self, topic: &str, payload: &str, retain: bool) {
        if !self.client.is_connected() {
            warn!("MQTT client not connected. Cannot publish to topic: {topic}");
            return;
        }
        debug!("Publishing to {topic} (retain: {retain}) with payload {payload}");
        if let Err(e) =
            self.client
                .publish(topic, QoS::AtMostOnce, retain, payload.as_bytes().to_vec())
        {
            error!("Failed to publish message to topic {topic}: {e:?}");
        }
    }

    pub fn subscribe(&self, topic: &str) {
        debug!("Subscribing to {topic}");
        if let Err(e) = self.client.subscribe(topic, QoS::AtMostOnce) {
            warn!("Subscription to {topic} failed: {e:?}");
        }
    }

    pub fn publish_availability(&self, segment: &str, online: bool) {
        let payload = if online { AVAILABLE } else { NOT_AVAILABLE };
        self.publish_raw(&self.topics.availability(segment), payload, true);
    }

    /// Removes the retained availability of a segment that is no longer used.
    pub fn clear_availability(&self, segment: &str) {
        self.publish_raw(&self.topics.availability(segment), "", true);
    }

    pub fn publish_bridge_status(&self, uptime_s: u64) {
        self.publish_json(
            &self.topics.bridge_status(),
            &BridgeStatus::alive(uptime_s),
            true,
        );
    }

    pub fn subscribe_power_limit_command(&self, segment: &str) {
        self.subscribe(&self.topics.power_limit_command(segment));
    }
}
