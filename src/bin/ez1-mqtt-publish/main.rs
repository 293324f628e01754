mod config;
mod logging;
mod rumqttc_wrapper;

use std::process::ExitCode;
use std::time::{Duration, Instant};

use anyhow::Context;
use config::Config;
use ez12mqtt::api::Ez1Api;
use ez12mqtt::device::{Device, DeviceRecord};
use ez12mqtt::fleet::Fleet;
use ez12mqtt::home_assistant::HomeAssistant;
use ez12mqtt::mqtt_wrapper::MqttEvent;
use ez12mqtt::publisher::Publisher;
use ez12mqtt::reconciler::Reconciler;
use rumqttc_wrapper::RumqttcWrapper;
use tokio::sync::mpsc;
use tokio::time::{interval_at, timeout};

use log::{error, info, warn};

static HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
static SHUTDOWN_FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> ExitCode {
    logging::init_logger();
    info!("Running revision: {}", env!("GIT_HASH"));
    if std::env::args().len() > 1 {
        error!("Arguments passed. Tool is configured by config.toml and environment variables");
    }

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            error!("{e:#}");
            return ExitCode::FAILURE;
        }
    };

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Application crashed: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Config) -> anyhow::Result<()> {
    let started = Instant::now();

    let devices = config
        .device_settings()
        .into_iter()
        .map(|settings| {
            info!(
                "device {} ({})",
                settings.address,
                settings.label.as_deref().unwrap_or("no nickname")
            );
            let api = Ez1Api::new(&settings.address)
                .with_context(|| format!("creating HTTP client for {}", settings.address))?;
            Ok(Device {
                api,
                record: DeviceRecord::new(settings),
            })
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    let (client, mut events, event_loop) = RumqttcWrapper::new(&config.mqtt, &config.base_topic)?;
    let publisher = Publisher::new(client.clone(), &config.base_topic);

    let discovery = if config.home_assistant.enable {
        info!("Publishing Home Assistant discovery messages");
        Some(HomeAssistant::new(
            &config.home_assistant.discovery_prefix,
            &config.base_topic,
        ))
    } else {
        info!("Home Assistant discovery disabled");
        None
    };
    let reconciler = Reconciler::new(publisher.clone(), discovery);

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    // retained state published before the broker accepted us would be lost
    tokio::select! {
        _ = &mut shutdown => return Ok(()),
        connected = wait_for_connection(&mut events) => {
            if !connected {
                anyhow::bail!("MQTT event loop stopped before connecting");
            }
        }
    }

    info!("polling every {}s", config.poll_interval);
    let mut fleet = Fleet::spawn(
        devices,
        reconciler,
        Duration::from_secs(config.poll_interval),
    );
    info!("Bridging {} device(s)", fleet.len());
    publisher.publish_bridge_status(started.elapsed().as_secs());
    subscribe_commands(&publisher, &fleet);

    let mut heartbeat = interval_at(
        tokio::time::Instant::now() + HEARTBEAT_INTERVAL,
        HEARTBEAT_INTERVAL,
    );

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            assignment = fleet.next_assignment() => match assignment {
                Some(assignment) => fleet.route(assignment),
                None => anyhow::bail!("device workers stopped"),
            },
            _ = heartbeat.tick() => {
                publisher.publish_bridge_status(started.elapsed().as_secs());
            }
            event = events.recv() => match event {
                Some(MqttEvent::Connected) => {
                    publisher.publish_bridge_status(started.elapsed().as_secs());
                    subscribe_commands(&publisher, &fleet);
                }
                Some(MqttEvent::Message { topic, payload }) => {
                    fleet.deliver(&topic, &payload);
                }
                None => anyhow::bail!("MQTT event loop stopped"),
            },
        }
    }

    info!("Shutting down...");
    if timeout(SHUTDOWN_FLUSH_TIMEOUT, fleet.shutdown()).await.is_err() {
        warn!("Device workers did not stop within {SHUTDOWN_FLUSH_TIMEOUT:?}");
    }
    if let Err(e) = client.disconnect().await {
        warn!("MQTT disconnect failed: {e:#}");
    }
    if timeout(SHUTDOWN_FLUSH_TIMEOUT, event_loop).await.is_err() {
        warn!("MQTT client did not flush within {SHUTDOWN_FLUSH_TIMEOUT:?}");
    }
    Ok(())
}

fn subscribe_commands(publisher: &Publisher<RumqttcWrapper>, fleet: &Fleet) {
    fleet
        .command_segments()
        .for_each(|segment| publisher.subscribe_power_limit_command(segment));
}

/// Waits for the first broker connection. Messages arriving before it are
/// dropped, nothing is subscribed yet.
async fn wait_for_connection(events: &mut mpsc::Receiver<MqttEvent>) -> bool {
    while let Some(event) = events.recv().await {
        if event == MqttEvent::Connected {
            return true;
        }
    }
    false
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
