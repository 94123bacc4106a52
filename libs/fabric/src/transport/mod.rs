use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result};

pub mod facade;
pub mod memory;

pub use self::facade::{Subscription, TransportFacade};
pub use self::memory::{MemoryBroker, MemoryTransport};

/// Callback invoked for every inbound `(topic, payload)`
///
/// Called from the transport's delivery task, one message at a time, in
/// arrival order. Must not block.
pub type MessageCallback = Arc<dyn Fn(&str, &[u8]) + Send + Sync>;

/// Callback invoked every time a connection is (re)established
pub type ConnectCallback = Arc<dyn Fn() + Send + Sync>;

/// Delivery guarantee requested from the broker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum QoS {
    AtMostOnce,
    #[default]
    AtLeastOnce,
    ExactlyOnce,
}

impl TryFrom<u8> for QoS {
    type Error = Error;

    fn try_from(level: u8) -> Result<Self> {
        match level {
            0 => Ok(Self::AtMostOnce),
            1 => Ok(Self::AtLeastOnce),
            2 => Ok(Self::ExactlyOnce),
            other => Err(Error::Config(format!("invalid QoS level {other}"))),
        }
    }
}

impl From<QoS> for u8 {
    fn from(qos: QoS) -> Self {
        match qos {
            QoS::AtMostOnce => 0,
            QoS::AtLeastOnce => 1,
            QoS::ExactlyOnce => 2,
        }
    }
}

/// Broker connection parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectOptions {
    pub host: String,
    pub port: u16,
    pub keepalive: Duration,
    pub client_id: Option<String>,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            keepalive: Duration::from_secs(60),
            client_id: None,
        }
    }
}

impl ConnectOptions {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    pub fn keepalive(mut self, keepalive: Duration) -> Self {
        self.keepalive = keepalive;
        self
    }

    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }
}

/// Publish/subscribe client connection
///
/// Implementations own connection management, keepalive and delivery. Each
/// operation reports its own failure; retrying is up to the implementation.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Connect to the broker and invoke the connect callback on success
    async fn connect(&self, options: &ConnectOptions) -> Result<()>;

    /// Subscribe to a topic filter
    async fn subscribe(&self, topic: &str, qos: QoS) -> Result<()>;

    /// Publish a payload to a topic
    async fn publish(&self, topic: &str, payload: &[u8], qos: QoS, retain: bool) -> Result<()>;

    /// Close the connection
    async fn close(&self) -> Result<()>;

    /// Install the inbound message callback, replacing any previous one
    fn set_message_callback(&self, callback: MessageCallback);

    /// Install the connection-established callback, replacing any previous one
    fn set_connect_callback(&self, callback: ConnectCallback);
}
