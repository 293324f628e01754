use std::collections::HashSet;
use std::path::PathBuf;
use std::str::FromStr;
use std::{env, fs};

use anyhow::{bail, Context};
use ez12mqtt::device::DeviceSettings;
use ez12mqtt::mqtt_config::MqttConfig;
use log::{error, info};
use serde_derive::Deserialize;

static DEFAULT_BASE_TOPIC: &str = "ez12mqtt";
static DEFAULT_DISCOVERY_PREFIX: &str = "homeassistant";
static DEFAULT_POLL_INTERVAL: u64 = 30;

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
pub struct DeviceConfig {
    pub ip: String,
    pub nickname: Option<String>,
    pub description: Option<String>,
}

impl From<&DeviceConfig> for DeviceSettings {
    fn from(config: &DeviceConfig) -> Self {
        DeviceSettings {
            address: config.ip.clone(),
            label: config.nickname.clone(),
            description: config.description.clone(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct HomeAssistantConfig {
    pub enable: bool,
    pub discovery_prefix: String,
}

impl Default for HomeAssistantConfig {
    fn default() -> Self {
        Self {
            enable: false,
            discovery_prefix: DEFAULT_DISCOVERY_PREFIX.to_string(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    pub devices: Vec<DeviceConfig>,
    pub mqtt: MqttConfig,
    pub base_topic: String,
    /// Seconds between two polls of the same device.
    pub poll_interval: u64,
    pub home_assistant: HomeAssistantConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            devices: Vec::new(),
            mqtt: MqttConfig {
                host: "localhost".to_string(),
                ..Default::default()
            },
            base_topic: DEFAULT_BASE_TOPIC.to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            home_assistant: HomeAssistantConfig::default(),
        }
    }
}

impl Config {
    /// Loads `config.toml` if there is one, applies environment overrides
    /// and validates the result.
    pub fn load() -> anyhow::Result<Config> {
        let contents = match locate_config_file() {
            Some(path) => {
                info!("loading configuration from {}", path.display());
                Some(
                    fs::read_to_string(&path)
                        .with_context(|| format!("could not read {}", path.display()))?,
                )
            }
            None => {
                info!("no config.toml found, configuring from environment only");
                None
            }
        };
        Self::from_sources(contents.as_deref(), |key| env::var(key).ok())
    }

    pub fn from_sources(
        file: Option<&str>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> anyhow::Result<Config> {
        let mut config = match file {
            Some(contents) => toml::from_str(contents).context("config.toml unparsable")?,
            None => Config::default(),
        };
        let mut errors = config.apply_env(lookup);
        errors.extend(config.validate());

        if !errors.is_empty() {
            errors.iter().for_each(|e| error!("{e}"));
            bail!("invalid configuration: {}", errors.join(" "));
        }
        Ok(config)
    }

    pub fn device_settings(&self) -> Vec<DeviceSettings> {
        self.devices.iter().map(DeviceSettings::from).collect()
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Vec<String> {
        let mut errors = Vec::new();

        let devices = parse_devices(&lookup);
        if !devices.is_empty() {
            self.devices = devices;
        }
        // $MQTT_HOST
        if let Some(host) = lookup("MQTT_HOST") {
            self.mqtt.host = host;
        }
        // $MQTT_PORT (optional)
        if let Some(port) = parse_var(&lookup, "MQTT_PORT", &mut errors) {
            self.mqtt.port = Some(port);
        }
        // $MQTT_USER and $MQTT_PASSWORD (optional)
        if let Some(username) = lookup("MQTT_USER") {
            self.mqtt.username = Some(username);
        }
        if let Some(password) = lookup("MQTT_PASSWORD") {
            self.mqtt.password = Some(password);
        }
        if let Some(client_id) = lookup("MQTT_CLIENT_ID") {
            self.mqtt.client_id = Some(client_id);
        }
        if let Some(tls) = parse_flag(&lookup, "MQTT_TLS", &mut errors) {
            self.mqtt.tls = Some(tls);
        }
        if let Some(base_topic) = lookup("MQTT_BASE_TOPIC") {
            self.base_topic = base_topic;
        }
        if let Some(interval) = parse_var(&lookup, "POLL_INTERVAL", &mut errors) {
            self.poll_interval = interval;
        }
        if let Some(enable) = parse_flag(&lookup, "HOMEASSISTANT_ENABLE", &mut errors) {
            self.home_assistant.enable = enable;
        }
        if let Some(prefix) = lookup("HOMEASSISTANT_DISCOVERY_PREFIX") {
            self.home_assistant.discovery_prefix = prefix;
        }
        errors
    }

    fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.devices.is_empty() {
            errors.push("At least one device must be configured using DEVICE_n_IP.".to_string());
        }
        if self.devices.iter().any(|d| d.ip.trim().is_empty()) {
            errors.push("Every configured device needs an ip.".to_string());
        }
        let mut labels = HashSet::new();
        for label in self.devices.iter().filter_map(|d| d.nickname.as_deref()) {
            if !is_topic_segment(label) {
                errors.push(format!("Device nickname {label:?} is not usable as a topic."));
            }
            if !labels.insert(label) {
                errors.push(format!("Device nickname {label:?} is used twice."));
            }
        }
        if !self.mqtt.is_valid() {
            errors.push("MQTT_HOST is required.".to_string());
        }
        if self.base_topic.is_empty() || self.base_topic.contains(['#', '+']) {
            errors.push("MQTT_BASE_TOPIC is required and must not contain wildcards.".to_string());
        }
        if self.poll_interval == 0 {
            errors.push("POLL_INTERVAL must be a positive number.".to_string());
        }
        if self.home_assistant.enable && self.home_assistant.discovery_prefix.is_empty() {
            errors.push("HOMEASSISTANT_DISCOVERY_PREFIX must not be empty.".to_string());
        }
        errors
    }
}

/// Reads `DEVICE_1_*`, `DEVICE_2_*`, ... until the first missing ip.
fn parse_devices(lookup: &impl Fn(&str) -> Option<String>) -> Vec<DeviceConfig> {
    let non_empty = |key: String| lookup(&key).filter(|v| !v.trim().is_empty());
    let mut devices = Vec::new();
    for i in 1.. {
        let Some(ip) = lookup(&format!("DEVICE_{i}_IP")) else {
            break;
        };
        if ip.trim().is_empty() {
            error!("DEVICE_{i}_IP is defined but empty. Skipping device {i}.");
            continue;
        }
        devices.push(DeviceConfig {
            ip: ip.trim().to_string(),
            nickname: non_empty(format!("DEVICE_{i}_NICKNAME")),
            description: non_empty(format!("DEVICE_{i}_DESCRIPTION")),
        });
    }
    devices
}

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    errors: &mut Vec<String>,
) -> Option<T> {
    let value = lookup(key)?;
    match value.trim().parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            errors.push(format!("{key} must be a number, got {value:?}."));
            None
        }
    }
}

fn parse_flag(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    errors: &mut Vec<String>,
) -> Option<bool> {
    let value = lookup(key)?;
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => {
            errors.push(format!("{key} must be true or false, got {value:?}."));
            None
        }
    }
}

fn is_topic_segment(label: &str) -> bool {
    !label.is_empty() && !label.contains(['/', '#', '+'])
}

// load configuration from current working dir, or relative to executable if former location fails
fn locate_config_file() -> Option<PathBuf> {
    let mut candidates = Vec::new();
    if let Ok(mut path) = env::current_dir() {
        path.push("config.toml");
        candidates.push(path);
    }
    if let Ok(mut path) = env::current_exe() {
        path.pop();
        path.push("config.toml");
        candidates.push(path);
    }
    candidates.into_iter().find(|path| path.exists())
}
