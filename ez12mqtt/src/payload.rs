use serde::Serialize;

use crate::api::{AlarmInfo, DeviceInfo, OutputData};

/// Value the device uses for a raised alarm flag.
static ALARM_RAISED: &str = "1";

/// Current time as unix seconds, the timestamp format of every payload.
pub fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Per-poll state published to `<base>/<device>/status`.
///
/// Built through [`StatusPayload::new`] only: the output group and the alarm
/// group are each filled from one fetch result, so a group is either
/// completely present or completely null.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusPayload {
    pub observed_at: i64,
    pub is_online: bool,
    #[serde(rename = "deviceLastSeenAt")]
    pub last_seen_at: Option<i64>,
    #[serde(rename = "channel1Power_W")]
    pub channel1_power: Option<f64>,
    #[serde(rename = "channel1EnergySinceStartup_kWh")]
    pub channel1_energy_since_startup: Option<f64>,
    #[serde(rename = "channel1EnergyLifetime_kWh")]
    pub channel1_energy_lifetime: Option<f64>,
    #[serde(rename = "channel2Power_W")]
    pub channel2_power: Option<f64>,
    #[serde(rename = "channel2EnergySinceStartup_kWh")]
    pub channel2_energy_since_startup: Option<f64>,
    #[serde(rename = "channel2EnergyLifetime_kWh")]
    pub channel2_energy_lifetime: Option<f64>,
    #[serde(rename = "totalPower_W")]
    pub total_power: Option<f64>,
    #[serde(rename = "totalEnergySinceStartup_kWh")]
    pub total_energy_since_startup: Option<f64>,
    #[serde(rename = "totalEnergyLifetime_kWh")]
    pub total_energy_lifetime: Option<f64>,
    pub is_off_grid: Option<bool>,
    pub is_output_fault: Option<bool>,
    pub is_channel1_short_circuit: Option<bool>,
    pub is_channel2_short_circuit: Option<bool>,
}

impl StatusPayload {
    pub fn new(
        observed_at: i64,
        is_online: bool,
        last_seen_at: Option<i64>,
        output: Option<&OutputData>,
        alarm: Option<&AlarmInfo>,
    ) -> Self {
        let raised = |flag: &str| flag == ALARM_RAISED;
        Self {
            observed_at,
            is_online,
            last_seen_at,
            channel1_power: output.map(|o| o.p1),
            channel1_energy_since_startup: output.map(|o| o.e1),
            channel1_energy_lifetime: output.map(|o| o.te1),
            channel2_power: output.map(|o| o.p2),
            channel2_energy_since_startup: output.map(|o| o.e2),
            channel2_energy_lifetime: output.map(|o| o.te2),
            total_power: output.map(|o| o.p1 + o.p2),
            total_energy_since_startup: output.map(|o| o.e1 + o.e2),
            total_energy_lifetime: output.map(|o| o.te1 + o.te2),
            is_off_grid: alarm.map(|a| raised(&a.og)),
            is_output_fault: alarm.map(|a| raised(&a.oe)),
            is_channel1_short_circuit: alarm.map(|a| raised(&a.isce1)),
            is_channel2_short_circuit: alarm.map(|a| raised(&a.isce2)),
        }
    }
}

/// Identity published once per online transition to `<base>/<device>/info`.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InfoPayload {
    pub observed_at: i64,
    pub device_identifier: String,
    pub device_version: String,
    #[serde(rename = "wifiNetworkSSID")]
    pub wifi_network_ssid: String,
    #[serde(rename = "deviceIPAddress")]
    pub device_ip_address: String,
    #[serde(rename = "minimumPowerOutput_W")]
    pub minimum_power_output: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_description: Option<String>,
}

impl InfoPayload {
    pub fn new(observed_at: i64, info: &DeviceInfo, description: Option<&str>) -> Self {
        Self {
            observed_at,
            device_identifier: info.device_id.clone(),
            device_version: info.dev_ver.clone(),
            wifi_network_ssid: info.ssid.clone(),
            device_ip_address: info.ip_addr.clone(),
            minimum_power_output: info.min_power_w(),
            device_description: description.map(str::to_string),
        }
    }
}

/// Current power limit, published retained to `<base>/<device>/maxPower_W`.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PowerLimitPayload {
    pub observed_at: i64,
    #[serde(rename = "maximumPowerOutput_W")]
    pub maximum_power_output: f64,
}

/// Process-wide liveness, published retained to `<base>/_status`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BridgeStatus {
    pub online: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uptime_s: Option<u64>,
}

impl BridgeStatus {
    pub fn alive(uptime_s: u64) -> Self {
        Self {
            online: true,
            uptime_s: Some(uptime_s),
        }
    }

    /// Payload registered as the broker's last will.
    pub fn gone() -> Self {
        Self {
            online: false,
            uptime_s: None,
        }
    }
}
