use std::time::{Duration, Instant};

use async_trait::async_trait;
use log::{debug, error, warn};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_derive::Deserialize;

/// Port the EZ1 local API listens on.
pub static DEVICE_PORT: u16 = 8050;
static REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
static SUCCESS: &str = "SUCCESS";

/// Envelope every endpoint wraps its payload in.
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    data: T,
    message: String,
    #[serde(rename = "deviceId", default)]
    device_id: Option<String>,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    pub device_id: String,
    pub dev_ver: String,
    pub ssid: String,
    pub ip_addr: String,
    pub min_power: String,
    /// Hardware ceiling. Commands are bounded by the current limit from
    /// `getMaxPower` instead, so lowering the limit also lowers the highest
    /// value a later command may set.
    pub max_power: String,
}

impl DeviceInfo {
    pub fn min_power_w(&self) -> Option<f64> {
        parse_watts(&self.min_power)
    }
}

/// Instantaneous power (W) and energy counters (kWh) for both channels.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq)]
pub struct OutputData {
    pub p1: f64,
    pub e1: f64,
    pub te1: f64,
    pub p2: f64,
    pub e2: f64,
    pub te2: f64,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct MaxPower {
    pub power: String,
}

impl MaxPower {
    pub fn watts(&self) -> Option<f64> {
        parse_watts(&self.power)
    }
}

/// Alarm flags as reported by the device, `"1"` meaning raised.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct AlarmInfo {
    pub og: String,
    pub isce1: String,
    pub isce2: String,
    pub oe: String,
}

fn parse_watts(value: &str) -> Option<f64> {
    value.trim().parse::<f64>().ok().filter(|w| w.is_finite())
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("device unreachable: {0}")]
    Unreachable(#[source] reqwest::Error),
    #[error("request failed: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("malformed response body: {0}")]
    Malformed(#[source] reqwest::Error),
    #[error("device answered with message {0:?}")]
    NotSuccessful(String),
}

impl ApiError {
    fn from_request(e: reqwest::Error) -> Self {
        if e.is_connect() || e.is_timeout() {
            ApiError::Unreachable(e)
        } else if e.is_decode() {
            ApiError::Malformed(e)
        } else {
            ApiError::Transport(e)
        }
    }
}

/// Read and write access to one device.
///
/// Every call is independently fallible and answers `None` on any failure;
/// callers never see the cause, only that the value is absent this time.
#[async_trait]
pub trait DeviceApi: Send + Sync {
    async fn device_info(&self) -> Option<DeviceInfo>;

    async fn output_data(&self) -> Option<OutputData>;

    async fn max_power(&self) -> Option<MaxPower>;

    async fn alarm(&self) -> Option<AlarmInfo>;

    async fn set_max_power(&self, power: i64) -> Option<MaxPower>;
}

/// HTTP client for the EZ1 local API.
pub struct Ez1Api {
    client: Client,
    base_url: String,
}

impl Ez1Api {
    /// Creates a client for the device at `address`. A bare host gets the
    /// default API port appended.
    pub fn new(address: &str) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        let base_url = if address.contains(':') {
            format!("http://{address}")
        } else {
            format!("http://{address}:{DEVICE_PORT}")
        };
        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn request<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, ApiError> {
        let url = format!("{}{}", self.base_url, endpoint);
        let started = Instant::now();
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(ApiError::from_request)?;
        let status = response.status();
        let body: ApiResponse<T> = response.json().await.map_err(ApiError::from_request)?;
        debug!(
            "API response from {url} in {}ms, status {status}, message {}, device {}",
            started.elapsed().as_millis(),
            body.message,
            body.device_id.as_deref().unwrap_or("-")
        );

        if body.message == SUCCESS {
            Ok(body.data)
        } else {
            Err(ApiError::NotSuccessful(body.message))
        }
    }

    async fn get<T: DeserializeOwned>(&self, endpoint: &str) -> Option<T> {
        match self.request(endpoint).await {
            Ok(data) => Some(data),
            Err(e @ ApiError::Unreachable(_)) => {
                debug!("{}{endpoint}: device offline or unreachable ({e})", self.base_url);
                None
            }
            Err(e @ (ApiError::NotSuccessful(_) | ApiError::Malformed(_))) => {
                warn!("{}{endpoint}: {e}", self.base_url);
                None
            }
            Err(e) => {
                error!("Error fetching {}{endpoint}: {e}", self.base_url);
                None
            }
        }
    }
}

#[async_trait]
impl DeviceApi for Ez1Api {
    async fn device_info(&self) -> Option<DeviceInfo> {
        self.get("/getDeviceInfo").await
    }

    async fn output_data(&self) -> Option<OutputData> {
        self.get("/getOutputData").await
    }

    async fn max_power(&self) -> Option<MaxPower> {
        self.get("/getMaxPower").await
    }

    async fn alarm(&self) -> Option<AlarmInfo> {
        self.get("/getAlarm").await
    }

    async fn set_max_power(&self, power: i64) -> Option<MaxPower> {
        self.get(&format!("/setMaxPower?p={power}")).await
    }
}
