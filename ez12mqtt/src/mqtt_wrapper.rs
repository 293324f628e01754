#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QoS {
    AtMostOnce,
    AtLeastOnce,
    ExactlyOnce,
}

/// Events a transport hands back to the application.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MqttEvent {
    /// The broker accepted a (re)connection. Subscriptions must be reissued.
    Connected,
    /// A message arrived on one of the subscribed topics.
    Message { topic: String, payload: Vec<u8> },
}

pub trait MqttWrapper {
    // This trait provides an interface that decouples library code from an
    // implementation of the MQTT client. On library calling code, one needs to
    // wrap the MQTT implementation, i.e. the client, in a new type that in
    // turn implements this trait. Implementations are shared between the
    // reconciler and the command dispatcher, hence `&self` everywhere.

    fn subscribe(&self, topic: &str, qos: QoS) -> anyhow::Result<()>;

    fn publish<S, V>(&self, topic: S, qos: QoS, retain: bool, payload: V) -> anyhow::Result<()>
    where
        S: Clone + Into<String>,
        V: Clone + Into<Vec<u8>>;

    fn is_connected(&self) -> bool;
}
