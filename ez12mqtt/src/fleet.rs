use std::collections::HashMap;
use std::time::Duration;

use futures::future::join_all;
use log::{debug, info, warn};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use crate::api::DeviceApi;
use crate::command::CommandDispatcher;
use crate::device::Device;
use crate::mqtt_wrapper::MqttWrapper;
use crate::publisher::Topics;
use crate::reconciler::Reconciler;

static PENDING_COMMANDS: usize = 4;

/// Stable index of a device within a [`Fleet`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DeviceKey(usize);

/// Where an inbound message went.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delivery {
    /// The topic is not a power-limit command topic.
    Ignored,
    UnknownDevice,
    /// Handed to the device's worker.
    Queued,
    /// The device's worker has too many commands pending or is gone.
    Dropped,
}

/// A device's topic segment moved from its placeholder to its identifier.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TopicAssignment {
    pub key: DeviceKey,
    pub topic: String,
}

struct WorkerHandle {
    commands: mpsc::Sender<String>,
    task: JoinHandle<()>,
}

/// Every configured device, each reconciled by a worker task of its own.
///
/// A worker exclusively owns its device record. It polls on its own
/// schedule, so a slow device only delays itself, and applies the commands
/// routed to it between polls.
pub struct Fleet {
    topics: Topics,
    workers: Vec<WorkerHandle>,
    // only segments that will never change again are routable
    routes: HashMap<String, DeviceKey>,
    assignments: mpsc::Receiver<TopicAssignment>,
    shutdown: watch::Sender<bool>,
}

impl Fleet {
    /// Spawns one worker per device. Must be called from within a tokio
    /// runtime.
    pub fn spawn<A, MQTT>(
        devices: Vec<Device<A>>,
        reconciler: Reconciler<MQTT>,
        poll_interval: Duration,
    ) -> Self
    where
        A: DeviceApi + 'static,
        MQTT: MqttWrapper + Clone + Send + Sync + 'static,
    {
        let topics = reconciler.publisher().topics().clone();
        let (shutdown, shutdown_rx) = watch::channel(false);
        let (assigned, assignments) = mpsc::channel(devices.len().max(1));
        let mut routes = HashMap::new();

        let workers = devices
            .into_iter()
            .enumerate()
            .map(|(idx, device)| {
                let key = DeviceKey(idx);
                if device.record.has_stable_topic() {
                    routes.insert(device.record.topic().to_string(), key);
                }
                let (commands, inbox) = mpsc::channel(PENDING_COMMANDS);
                let worker = Worker {
                    key,
                    device,
                    dispatcher: CommandDispatcher::new(reconciler.clone()),
                    reconciler: reconciler.clone(),
                    poll_interval,
                    inbox,
                    assigned: assigned.clone(),
                    shutdown: shutdown_rx.clone(),
                };
                WorkerHandle {
                    commands,
                    task: tokio::spawn(worker.run()),
                }
            })
            .collect();

        Self {
            topics,
            workers,
            routes,
            assignments,
            shutdown,
        }
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    pub fn key_for_topic(&self, segment: &str) -> Option<DeviceKey> {
        self.routes.get(segment).copied()
    }

    /// Segments whose power-limit command topic should be subscribed.
    pub fn command_segments(&self) -> impl Iterator<Item = &str> {
        self.routes.keys().map(String::as_str)
    }

    /// Waits for the next device to learn its identifier topic. Returns
    /// `None` once every worker has stopped.
    pub async fn next_assignment(&mut self) -> Option<TopicAssignment> {
        self.assignments.recv().await
    }

    pub fn route(&mut self, assignment: TopicAssignment) {
        debug!("Routing commands for {} to {:?}", assignment.topic, assignment.key);
        self.routes.insert(assignment.topic, assignment.key);
    }

    /// Hands an inbound message to the worker of the device it addresses.
    /// Never waits for the device.
    pub fn deliver(&self, topic: &str, payload: &[u8]) -> Delivery {
        let payload = String::from_utf8_lossy(payload);
        debug!("Received message on topic {topic}: {payload}");

        let Some(segment) = self.topics.parse_power_limit_command(topic) else {
            return Delivery::Ignored;
        };
        let Some(worker) = self
            .key_for_topic(segment)
            .and_then(|key| self.workers.get(key.0))
        else {
            warn!("Received power limit command for unknown device: {segment}");
            return Delivery::UnknownDevice;
        };
        match worker.commands.try_send(payload.into_owned()) {
            Ok(()) => Delivery::Queued,
            Err(e) => {
                warn!("Dropping power limit command for {segment}: {e}");
                Delivery::Dropped
            }
        }
    }

    /// Stops every worker. Online devices are marked unavailable on the way
    /// out; a poll in flight is abandoned.
    pub async fn shutdown(self) {
        if self.shutdown.send(true).is_err() {
            debug!("All device workers already stopped");
        }
        let tasks = self.workers.into_iter().map(|worker| worker.task);
        for result in join_all(tasks).await {
            if let Err(e) = result {
                warn!("Device worker failed: {e}");
            }
        }
        info!("All device workers stopped");
    }
}

struct Worker<A, MQTT: MqttWrapper> {
    key: DeviceKey,
    device: Device<A>,
    reconciler: Reconciler<MQTT>,
    dispatcher: CommandDispatcher<MQTT>,
    poll_interval: Duration,
    inbox: mpsc::Receiver<String>,
    assigned: mpsc::Sender<TopicAssignment>,
    shutdown: watch::Receiver<bool>,
}

impl<A: DeviceApi, MQTT: MqttWrapper + Sync> Worker<A, MQTT> {
    async fn run(mut self) {
        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.shutdown.changed() => break,
                _ = ticker.tick() => {
                    if !self.poll().await {
                        break;
                    }
                }
                command = self.inbox.recv() => match command {
                    Some(payload) => {
                        self.dispatcher.apply(&mut self.device, &payload).await;
                    }
                    None => break,
                },
            }
        }
        self.reconciler.announce_shutdown(&self.device.record);
    }

    /// Returns `false` if shutdown was requested while polling.
    async fn poll(&mut self) -> bool {
        let Device { api, record } = &mut self.device;
        let report = tokio::select! {
            report = self.reconciler.poll(&*api, record) => report,
            _ = self.shutdown.changed() => return false,
        };
        if report.topic_assigned {
            let assignment = TopicAssignment {
                key: self.key,
                topic: self.device.record.topic().to_string(),
            };
            if self.assigned.send(assignment).await.is_err() {
                debug!("Fleet no longer tracks topic assignments");
            }
        }
        true
    }
}
