use log::{debug, error, info, warn};

use crate::api::DeviceApi;
use crate::device::{CommandRejection, Device};
use crate::mqtt_wrapper::MqttWrapper;
use crate::reconciler::Reconciler;

#[derive(Clone, Debug, PartialEq)]
pub enum CommandOutcome {
    Rejected(CommandRejection),
    /// The device refused or did not answer the write.
    WriteFailed,
    /// The limit was written and the power-limit topic republished.
    Applied(i64),
}

/// Turns power-limit commands into writes against the device.
#[derive(Clone)]
pub struct CommandDispatcher<MQTT: MqttWrapper> {
    reconciler: Reconciler<MQTT>,
}

impl<MQTT: MqttWrapper> CommandDispatcher<MQTT> {
    pub fn new(reconciler: Reconciler<MQTT>) -> Self {
        Self { reconciler }
    }

    /// Applies one command payload to the device it was addressed to.
    pub async fn apply<A: DeviceApi>(&self, device: &mut Device<A>, payload: &str) -> CommandOutcome {
        let Device { api, record } = device;

        let power = match record.check_power_limit(payload) {
            Ok(power) => power,
            Err(rejection) => {
                warn!(
                    "Invalid power value received for {}: {payload:?} ({rejection})",
                    record.topic()
                );
                return CommandOutcome::Rejected(rejection);
            }
        };

        info!("Setting max power for {} to {power}", record.topic());
        if api.set_max_power(power).await.is_none() {
            error!("Failed to set max power for {}", record.topic());
            return CommandOutcome::WriteFailed;
        }
        debug!(
            "setMaxPower successful for {}. Re-publishing maxPower topic.",
            record.topic()
        );
        self.reconciler.refresh_power_limit(&*api, record).await;
        CommandOutcome::Applied(power)
    }
}
