use serde::Serialize;

/// `DeviceConfig` is used to define the configuration for a Home Assistant device
/// in the MQTT discovery protocol and is used to group entities together.
///
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct DeviceConfig {
    pub identifiers: Vec<String>,
    pub name: String,
    pub model: String,
    pub manufacturer: String,
    pub sw_version: String, // Software version of the application that supplies the discovered MQTT item.
}

impl DeviceConfig {
    pub fn new(name: String, identifier: String) -> Self {
        Self {
            identifiers: vec![identifier],
            name,
            model: "EZ1 Microinverter".to_string(),
            manufacturer: "APsystems".to_string(),
            // Rust compiler sets the CARGO_PKG_VERSION environment from the Cargo.toml .
            sw_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Availability settings shared by every entity of a device.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct Availability {
    pub availability_topic: String,
    pub payload_available: &'static str,
    pub payload_not_available: &'static str,
}

impl Availability {
    pub fn new(availability_topic: String) -> Self {
        Self {
            availability_topic,
            payload_available: "1",
            payload_not_available: "0",
        }
    }
}

/// `EntityConfig` is used to define the configuration for a Home Assistant
/// sensor, binary sensor or number entity in the MQTT discovery protocol.
///
/// More information about the MQTT discovery protocol can be found here:
/// https://www.home-assistant.io/docs/mqtt/discovery/
///
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct EntityConfig {
    pub unique_id: String, //  A globally unique identifier for the entity.
    pub name: String,
    pub state_topic: String,
    pub value_template: String, // A template to extract a value from the mqtt message.
    pub device: DeviceConfig,
    #[serde(flatten)]
    pub availability: Availability,
    // exclude optional if they are not provided
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_topic: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_of_measurement: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_class: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_class: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload_on: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload_off: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
}

impl EntityConfig {
    fn base(
        state_topic: &str,
        device: &DeviceConfig,
        availability: &Availability,
        key: &str,
        name: &str,
        value_field: &str,
    ) -> Self {
        EntityConfig {
            unique_id: format!("{}_{}", device.identifiers[0], key),
            name: name.to_string(),
            state_topic: state_topic.to_string(),
            value_template: format!("{{{{ value_json.{} }}}}", value_field),
            device: device.clone(),
            availability: availability.clone(),
            command_topic: None,
            unit_of_measurement: None,
            device_class: None,
            state_class: None,
            payload_on: None,
            payload_off: None,
            min: None,
            max: None,
            step: None,
            mode: None,
        }
    }

    pub fn power(
        state_topic: &str,
        device: &DeviceConfig,
        availability: &Availability,
        name: &str,
        key: &str,
    ) -> Self {
        Self {
            unit_of_measurement: Some("W".to_string()),
            device_class: Some("power".to_string()),
            state_class: Some("measurement".to_string()),
            ..Self::base(state_topic, device, availability, key, name, key)
        }
    }

    pub fn energy(
        state_topic: &str,
        device: &DeviceConfig,
        availability: &Availability,
        name: &str,
        key: &str,
    ) -> Self {
        Self {
            unit_of_measurement: Some("kWh".to_string()),
            device_class: Some("energy".to_string()),
            state_class: Some("total_increasing".to_string()),
            ..Self::base(state_topic, device, availability, key, name, key)
        }
    }

    pub fn problem(
        state_topic: &str,
        device: &DeviceConfig,
        availability: &Availability,
        name: &str,
        key: &str,
    ) -> Self {
        Self {
            device_class: Some("problem".to_string()),
            payload_on: Some(true),
            payload_off: Some(false),
            ..Self::base(state_topic, device, availability, key, name, key)
        }
    }

    /// Writable power limit. `state_topic` carries the current limit payload.
    #[allow(clippy::too_many_arguments)]
    pub fn power_limit(
        state_topic: &str,
        command_topic: &str,
        device: &DeviceConfig,
        availability: &Availability,
        name: &str,
        key: &str,
        value_field: &str,
        bounds: Option<(f64, f64)>,
    ) -> Self {
        Self {
            command_topic: Some(command_topic.to_string()),
            unit_of_measurement: Some("W".to_string()),
            device_class: Some("power".to_string()),
            min: bounds.map(|(min, _)| min),
            max: bounds.map(|(_, max)| max),
            step: Some(1.0),
            mode: Some("box".to_string()),
            ..Self::base(state_topic, device, availability, key, name, value_field)
        }
    }
}
