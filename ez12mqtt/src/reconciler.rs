use log::{debug, info, warn};

use crate::api::DeviceApi;
use crate::device::{DeviceRecord, Transition};
use crate::home_assistant::HomeAssistant;
use crate::mqtt_wrapper::MqttWrapper;
use crate::payload::{unix_now, InfoPayload, PowerLimitPayload, StatusPayload};
use crate::publisher::Publisher;

/// What one poll of one device did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollReport {
    pub transition: Transition,
    /// The device's topic segment was assigned during this poll.
    pub topic_assigned: bool,
    pub discovery_published: bool,
}

/// Brings a device's published MQTT state in line with what the device
/// reports.
#[derive(Clone)]
pub struct Reconciler<MQTT: MqttWrapper> {
    publisher: Publisher<MQTT>,
    discovery: Option<HomeAssistant>,
}

impl<MQTT: MqttWrapper> Reconciler<MQTT> {
    pub fn new(publisher: Publisher<MQTT>, discovery: Option<HomeAssistant>) -> Self {
        Self {
            publisher,
            discovery,
        }
    }

    pub fn publisher(&self) -> &Publisher<MQTT> {
        &self.publisher
    }

    /// Polls one device and publishes the result.
    ///
    /// Publication order is availability, status, power limit, then on a
    /// transition to online: info, power limit and discovery. Discovery is
    /// held back until the device's identity and both power bounds are known.
    pub async fn poll<A: DeviceApi>(&self, api: &A, record: &mut DeviceRecord) -> PollReport {
        debug!("Polling device {}", record.address());

        let (output, alarm) = futures::join!(api.output_data(), api.alarm());
        let now = unix_now();
        let transition = record.observe(output.is_some(), now);
        let topics = self.publisher.topics();

        if transition.changed() {
            self.publisher
                .publish_availability(record.topic(), record.is_online());
        }

        let status = StatusPayload::new(
            now,
            record.is_online(),
            record.last_seen(),
            output.as_ref(),
            alarm.as_ref(),
        );
        self.publisher
            .publish_json(&topics.status(record.topic()), &status, false);

        let mut report = PollReport {
            transition,
            topic_assigned: false,
            discovery_published: false,
        };
        if !record.is_online() {
            if transition.went_offline() {
                warn!("Device {} went offline.", record.address());
            }
            return report;
        }

        self.refresh_power_limit(api, record).await;

        // a device that came online without answering the identity request is
        // asked again on every following poll until it does
        if transition.came_online() || !record.info_published() {
            if transition.came_online() {
                info!("Device {} is now online. Fetching info.", record.address());
            }
            report.topic_assigned = self.publish_identity(api, record).await;
            self.refresh_power_limit(api, record).await;
        }
        report.discovery_published = self.publish_discovery(record);
        report
    }

    /// Fetches the device identity, stores it and publishes the info topic.
    ///
    /// Returns `true` if the device's topic segment was assigned.
    async fn publish_identity<A: DeviceApi>(&self, api: &A, record: &mut DeviceRecord) -> bool {
        let Some(info) = api.device_info().await else {
            warn!("Could not fetch identity of device {}", record.address());
            return false;
        };

        let placeholder = record.topic().to_string();
        let topic_assigned = record.assign_identity(&info.device_id);
        if topic_assigned {
            self.publisher.clear_availability(&placeholder);
            self.publisher
                .publish_availability(record.topic(), record.is_online());
            self.publisher
                .subscribe_power_limit_command(record.topic());
        }
        match info.min_power_w() {
            Some(min) => record.set_min_power(min),
            None => warn!(
                "Device {} reported unusable minimum power {:?}",
                record.address(),
                info.min_power
            ),
        }

        let payload = InfoPayload::new(unix_now(), &info, record.description());
        self.publisher
            .publish_json(&self.publisher.topics().info(record.topic()), &payload, true);
        debug!("Published info topic for {}", record.topic());
        record.mark_info_published();
        topic_assigned
    }

    /// Fetches the current power limit, stores it as the upper bound for
    /// commands and publishes it retained.
    pub async fn refresh_power_limit<A: DeviceApi>(&self, api: &A, record: &mut DeviceRecord) {
        let Some(limit) = api.max_power().await else {
            return;
        };
        let Some(watts) = limit.watts() else {
            warn!(
                "Device {} reported unusable power limit {:?}",
                record.address(),
                limit.power
            );
            return;
        };
        record.set_max_power(watts);
        let payload = PowerLimitPayload {
            observed_at: unix_now(),
            maximum_power_output: watts,
        };
        self.publisher.publish_json(
            &self.publisher.topics().power_limit(record.topic()),
            &payload,
            true,
        );
        debug!("Published maxPower_W topic for {}", record.topic());
    }

    fn publish_discovery(&self, record: &mut DeviceRecord) -> bool {
        let Some(discovery) = &self.discovery else {
            return false;
        };
        if record.discovery_published() {
            return false;
        }
        let Some(device_id) = record.device_id() else {
            return false;
        };
        let Some(bounds) = record.power_bounds() else {
            debug!("Holding back discovery for {device_id} until its power bounds are known");
            return false;
        };
        discovery.publish(
            &self.publisher,
            device_id,
            record.label(),
            record.topic(),
            Some(bounds),
        );
        record.mark_discovery_published()
    }

    /// Marks the device unavailable if it is online, for a shutdown.
    pub fn announce_shutdown(&self, record: &DeviceRecord) {
        if record.is_online() {
            self.publisher.publish_availability(record.topic(), false);
        }
    }
}
