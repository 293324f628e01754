use log::info;

use crate::mqtt_wrapper::MqttWrapper;
use crate::publisher::{Publisher, Topics};

pub use crate::home_assistant_config::{Availability, DeviceConfig, EntityConfig};

/// Home Assistant entity platforms used by the catalog.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Component {
    Sensor,
    BinarySensor,
    Number,
}

impl Component {
    pub fn as_str(self) -> &'static str {
        match self {
            Component::Sensor => "sensor",
            Component::BinarySensor => "binary_sensor",
            Component::Number => "number",
        }
    }
}

#[derive(Clone, Copy, Debug)]
enum Kind {
    Power,
    Energy,
    Problem,
    PowerLimit,
}

impl Kind {
    fn component(self) -> Component {
        match self {
            Kind::Power | Kind::Energy => Component::Sensor,
            Kind::Problem => Component::BinarySensor,
            Kind::PowerLimit => Component::Number,
        }
    }
}

struct Descriptor {
    key: &'static str,
    name: &'static str,
    kind: Kind,
}

const fn entry(key: &'static str, name: &'static str, kind: Kind) -> Descriptor {
    Descriptor { key, name, kind }
}

// keys match the field names of the status payload, except for the power
// limit which has its own topic
static CATALOG: [Descriptor; 14] = [
    entry("channel1Power_W", "Channel 1 Power", Kind::Power),
    entry("channel1EnergySinceStartup_kWh", "Channel 1 Energy Since Startup", Kind::Energy),
    entry("channel1EnergyLifetime_kWh", "Channel 1 Energy Lifetime", Kind::Energy),
    entry("channel2Power_W", "Channel 2 Power", Kind::Power),
    entry("channel2EnergySinceStartup_kWh", "Channel 2 Energy Since Startup", Kind::Energy),
    entry("channel2EnergyLifetime_kWh", "Channel 2 Energy Lifetime", Kind::Energy),
    entry("totalPower_W", "Total Power", Kind::Power),
    entry("totalEnergySinceStartup_kWh", "Total Energy Since Startup", Kind::Energy),
    entry("totalEnergyLifetime_kWh", "Total Energy Lifetime", Kind::Energy),
    entry("isOffGrid", "Off-Grid", Kind::Problem),
    entry("isOutputFault", "Output Fault", Kind::Problem),
    entry("isChannel1ShortCircuit", "Channel 1 Short Circuit", Kind::Problem),
    entry("isChannel2ShortCircuit", "Channel 2 Short Circuit", Kind::Problem),
    entry("maxPower_W", "Maximum Power Output", Kind::PowerLimit),
];

/// One retained discovery message.
#[derive(Clone, Debug, PartialEq)]
pub struct DiscoveryMessage {
    pub topic: String,
    pub component: Component,
    pub config: EntityConfig,
}

/// Generates Home Assistant MQTT discovery messages for a device.
#[derive(Clone, Debug)]
pub struct HomeAssistant {
    discovery_prefix: String,
    topics: Topics,
}

impl HomeAssistant {
    pub fn new(discovery_prefix: &str, base_topic: &str) -> Self {
        Self {
            discovery_prefix: discovery_prefix.trim_end_matches('/').to_string(),
            topics: Topics::new(base_topic),
        }
    }

    /// Builds the full catalog for one device, in catalog order.
    ///
    /// `bounds` are the known power-limit bounds, used as the range of the
    /// writable power-limit entity.
    pub fn discovery_messages(
        &self,
        device_id: &str,
        label: Option<&str>,
        segment: &str,
        bounds: Option<(f64, f64)>,
    ) -> Vec<DiscoveryMessage> {
        let device = DeviceConfig::new(
            label.unwrap_or(device_id).to_string(),
            device_id.to_string(),
        );
        let availability = Availability::new(self.topics.availability(segment));
        let status_topic = self.topics.status(segment);

        CATALOG
            .iter()
            .map(|d| {
                let config = match d.kind {
                    Kind::Power => {
                        EntityConfig::power(&status_topic, &device, &availability, d.name, d.key)
                    }
                    Kind::Energy => {
                        EntityConfig::energy(&status_topic, &device, &availability, d.name, d.key)
                    }
                    Kind::Problem => {
                        EntityConfig::problem(&status_topic, &device, &availability, d.name, d.key)
                    }
                    Kind::PowerLimit => EntityConfig::power_limit(
                        &self.topics.power_limit(segment),
                        &self.topics.power_limit_command(segment),
                        &device,
                        &availability,
                        d.name,
                        d.key,
                        "maximumPowerOutput_W",
                        bounds,
                    ),
                };
                let component = d.kind.component();
                DiscoveryMessage {
                    topic: format!(
                        "{}/{}/{}/{}/config",
                        self.discovery_prefix,
                        component.as_str(),
                        device_id,
                        d.key
                    ),
                    component,
                    config,
                }
            })
            .collect()
    }

    pub fn publish<MQTT: MqttWrapper>(
        &self,
        publisher: &Publisher<MQTT>,
        device_id: &str,
        label: Option<&str>,
        segment: &str,
        bounds: Option<(f64, f64)>,
    ) {
        // configs let home assistant know what entities are available and where to find them
        info!("Publishing Home Assistant discovery messages for device {device_id}");
        for message in self.discovery_messages(device_id, label, segment, bounds) {
            publisher.publish_json(&message.topic, &message.config, true);
        }
    }
}
