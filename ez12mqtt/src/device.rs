use log::{info, warn};

/// Static per-device settings as configured at startup.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeviceSettings {
    pub address: String,
    pub label: Option<String>,
    pub description: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum NetworkState {
    Unknown,
    Online,
    Offline,
}

impl NetworkState {
    pub fn from_reachable(reachable: bool) -> Self {
        if reachable {
            NetworkState::Online
        } else {
            NetworkState::Offline
        }
    }

    pub fn is_online(self) -> bool {
        self == NetworkState::Online
    }
}

/// The outcome of feeding one poll's observation into a device record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Transition {
    pub from: NetworkState,
    pub to: NetworkState,
}

impl Transition {
    pub fn changed(&self) -> bool {
        self.from != self.to
    }

    pub fn came_online(&self) -> bool {
        !self.from.is_online() && self.to.is_online()
    }

    pub fn went_offline(&self) -> bool {
        self.from.is_online() && !self.to.is_online()
    }
}

/// A flag that can be raised once and never lowered.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Latch(bool);

impl Latch {
    pub fn is_set(&self) -> bool {
        self.0
    }

    /// Raises the latch. Returns `true` only for the call that raised it.
    pub fn set(&mut self) -> bool {
        !std::mem::replace(&mut self.0, true)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, thiserror::Error)]
pub enum CommandRejection {
    #[error("not an integer")]
    Unparseable,
    #[error("power bounds not yet known")]
    BoundsUnknown,
    #[error("{value} W outside of [{min}, {max}] W")]
    OutOfRange { value: i64, min: f64, max: f64 },
}

/// Everything the bridge knows about one device.
///
/// The record is owned by exactly one reconciliation sequence; the only
/// mutations are the ones below, each of which keeps the record's invariants:
/// the topic segment changes at most once, the one-shot latches are never
/// lowered and `last_seen` never decreases.
#[derive(Clone, Debug)]
pub struct DeviceRecord {
    settings: DeviceSettings,
    device_id: Option<String>,
    topic: String,
    state: NetworkState,
    last_seen: Option<i64>,
    min_power: Option<f64>,
    max_power: Option<f64>,
    info_published: Latch,
    discovery_published: Latch,
}

impl DeviceRecord {
    pub fn new(settings: DeviceSettings) -> Self {
        let topic = match &settings.label {
            Some(label) => label.clone(),
            None => placeholder_topic(&settings.address),
        };
        Self {
            settings,
            device_id: None,
            topic,
            state: NetworkState::Unknown,
            last_seen: None,
            min_power: None,
            max_power: None,
            info_published: Latch::default(),
            discovery_published: Latch::default(),
        }
    }

    pub fn address(&self) -> &str {
        &self.settings.address
    }

    pub fn label(&self) -> Option<&str> {
        self.settings.label.as_deref()
    }

    pub fn description(&self) -> Option<&str> {
        self.settings.description.as_deref()
    }

    pub fn device_id(&self) -> Option<&str> {
        self.device_id.as_deref()
    }

    /// Topic segment all of this device's topics are published under.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Whether the topic segment is final, i.e. it will never change again.
    pub fn has_stable_topic(&self) -> bool {
        self.settings.label.is_some() || self.device_id.is_some()
    }

    pub fn state(&self) -> NetworkState {
        self.state
    }

    pub fn is_online(&self) -> bool {
        self.state.is_online()
    }

    pub fn last_seen(&self) -> Option<i64> {
        self.last_seen
    }

    pub fn power_bounds(&self) -> Option<(f64, f64)> {
        self.min_power.zip(self.max_power)
    }

    pub fn info_published(&self) -> bool {
        self.info_published.is_set()
    }

    pub fn discovery_published(&self) -> bool {
        self.discovery_published.is_set()
    }

    /// Records whether this poll's output readings were present.
    pub fn observe(&mut self, reachable: bool, now: i64) -> Transition {
        let transition = Transition {
            from: self.state,
            to: NetworkState::from_reachable(reachable),
        };
        self.state = transition.to;
        if transition.changed() && transition.to.is_online() {
            self.last_seen = Some(self.last_seen.map_or(now, |seen| seen.max(now)));
        }
        transition
    }

    /// Stores the identifier reported by the device.
    ///
    /// Returns `true` if the topic segment moved as a consequence, which
    /// happens once at most, for unlabelled devices.
    pub fn assign_identity(&mut self, device_id: &str) -> bool {
        match &self.device_id {
            Some(known) => {
                if known != device_id {
                    warn!(
                        "Device {} now reports id {device_id}, keeping {known}",
                        self.settings.address
                    );
                }
                false
            }
            None => {
                self.device_id = Some(device_id.to_string());
                if self.settings.label.is_some() {
                    return false;
                }
                info!(
                    "Device {} identified as {device_id}, publishing under that topic",
                    self.settings.address
                );
                self.topic = device_id.to_string();
                true
            }
        }
    }

    pub fn set_min_power(&mut self, watts: f64) {
        self.min_power = Some(watts);
    }

    /// Upper command bound, taken from the device's current power limit.
    pub fn set_max_power(&mut self, watts: f64) {
        self.max_power = Some(watts);
    }

    pub fn mark_info_published(&mut self) -> bool {
        self.info_published.set()
    }

    pub fn mark_discovery_published(&mut self) -> bool {
        self.discovery_published.set()
    }

    /// Validates an inbound power-limit command against the known bounds.
    pub fn check_power_limit(&self, command: &str) -> Result<i64, CommandRejection> {
        let value: i64 = command
            .trim()
            .parse()
            .map_err(|_| CommandRejection::Unparseable)?;
        let (min, max) = self.power_bounds().ok_or(CommandRejection::BoundsUnknown)?;
        let watts = value as f64;
        if watts < min || watts > max {
            return Err(CommandRejection::OutOfRange { value, min, max });
        }
        Ok(value)
    }
}

/// Topic segment used for an unlabelled device until its identifier is known.
fn placeholder_topic(address: &str) -> String {
    address
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// A device record paired with the accessor used to reach it.
pub struct Device<A> {
    pub api: A,
    pub record: DeviceRecord,
}
