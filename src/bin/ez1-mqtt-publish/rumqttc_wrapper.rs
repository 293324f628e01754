use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ez12mqtt::{
    mqtt_config::MqttConfig,
    mqtt_wrapper::{self, MqttEvent},
    payload::BridgeStatus,
    publisher::Topics,
};
use log::{debug, info, warn};
use rumqttc::{
    tokio_rustls::rustls::{ClientConfig, RootCertStore},
    AsyncClient, Event, EventLoop, Incoming, LastWill, MqttOptions, Outgoing, Transport,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

static RECONNECT_DELAY: Duration = Duration::from_secs(1);

#[derive(Clone)]
pub struct RumqttcWrapper {
    client: AsyncClient,
    connected: Arc<AtomicBool>,
}

fn match_qos(qos: mqtt_wrapper::QoS) -> rumqttc::QoS {
    match qos {
        mqtt_wrapper::QoS::AtMostOnce => rumqttc::QoS::AtMostOnce,
        mqtt_wrapper::QoS::AtLeastOnce => rumqttc::QoS::AtLeastOnce,
        mqtt_wrapper::QoS::ExactlyOnce => rumqttc::QoS::ExactlyOnce,
    }
}

impl mqtt_wrapper::MqttWrapper for RumqttcWrapper {
    fn subscribe(&self, topic: &str, qos: mqtt_wrapper::QoS) -> anyhow::Result<()> {
        Ok(self.client.try_subscribe(topic, match_qos(qos))?)
    }

    fn publish<S, V>(
        &self,
        topic: S,
        qos: mqtt_wrapper::QoS,
        retain: bool,
        payload: V,
    ) -> anyhow::Result<()>
    where
        S: Clone + Into<String>,
        V: Clone + Into<Vec<u8>>,
    {
        Ok(self
            .client
            .try_publish(topic, match_qos(qos), retain, payload)?)
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }
}

impl RumqttcWrapper {
    /// Creates the client and spawns the task driving its event loop.
    ///
    /// Connection state changes and inbound messages are delivered through
    /// the returned receiver. The join handle finishes once the client
    /// disconnected on request.
    pub fn new(
        config: &MqttConfig,
        base_topic: &str,
    ) -> anyhow::Result<(Self, mpsc::Receiver<MqttEvent>, JoinHandle<()>)> {
        let client_id = config
            .client_id
            .clone()
            .unwrap_or_else(|| format!("ez12mqtt_{:x}", std::process::id()));
        let mut mqttoptions = MqttOptions::new(client_id, &config.host, config.port_or_default());
        mqttoptions.set_keep_alive(Duration::from_secs(5));
        mqttoptions.set_clean_session(true);
        mqttoptions.set_last_will(LastWill::new(
            Topics::new(base_topic).bridge_status(),
            serde_json::to_vec(&BridgeStatus::gone())?,
            rumqttc::QoS::AtLeastOnce,
            true,
        ));

        if config.use_tls() {
            // Use rustls-native-certs to load root certificates from the operating system.
            let mut roots = RootCertStore::empty();
            let native = rustls_native_certs::load_native_certs();
            for e in &native.errors {
                warn!("could not load platform certificate: {e}");
            }
            for cert in native.certs {
                if let Err(e) = roots.add(cert) {
                    warn!("skipping platform certificate: {e}");
                }
            }

            let client_config = ClientConfig::builder()
                .with_root_certificates(roots)
                .with_no_client_auth();

            mqttoptions.set_transport(Transport::tls_with_config(client_config.into()));
        }

        //parse the mqtt authentication options
        if let Some((username, password)) = match (&config.username, &config.password) {
            (None, None) => None,
            (None, Some(_)) => None,
            (Some(username), None) => Some((username.clone(), "".into())),
            (Some(username), Some(password)) => Some((username.clone(), password.clone())),
        } {
            mqttoptions.set_credentials(username, password);
        }

        info!(
            "Attempting to connect to MQTT broker at {}:{}",
            config.host,
            config.port_or_default()
        );
        let (client, eventloop) = AsyncClient::new(mqttoptions, 512);
        let connected = Arc::new(AtomicBool::new(false));
        let (events, receiver) = mpsc::channel(64);
        let handle = tokio::spawn(drive(eventloop, connected.clone(), events));

        Ok((Self { client, connected }, receiver, handle))
    }

    pub async fn disconnect(&self) -> anyhow::Result<()> {
        Ok(self.client.disconnect().await?)
    }
}

// keep polling the event loop to make sure outgoing messages get sent; rumqttc
// reconnects on the next poll after an error
async fn drive(mut eventloop: EventLoop, connected: Arc<AtomicBool>, events: mpsc::Sender<MqttEvent>) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                info!("Successfully connected to MQTT broker.");
                connected.store(true, Ordering::Relaxed);
                if events.send(MqttEvent::Connected).await.is_err() {
                    break;
                }
            }
            Ok(Event::Incoming(Incoming::Publish(publish))) => {
                let event = MqttEvent::Message {
                    topic: publish.topic,
                    payload: publish.payload.to_vec(),
                };
                if events.send(event).await.is_err() {
                    break;
                }
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                info!("Disconnected from MQTT broker.");
                connected.store(false, Ordering::Relaxed);
                break;
            }
            Ok(event) => debug!("mqtt event: {event:?}"),
            Err(e) => {
                if connected.swap(false, Ordering::Relaxed) {
                    warn!("MQTT connection closed: {e}");
                } else {
                    debug!("MQTT connection error: {e}");
                }
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        }
    }
}
