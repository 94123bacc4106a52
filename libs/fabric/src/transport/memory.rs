//! In-process broker
//!
//! Routes publishes to every connected session with a matching topic filter.
//! Each session delivers through its own task, so a client sees its messages
//! serially and in publish order.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::topic;
use crate::transport::{ConnectCallback, ConnectOptions, MessageCallback, QoS, Transport};

struct Delivery {
    topic: String,
    payload: Vec<u8>,
}

struct Session {
    id: u64,
    client_id: String,
    filters: Vec<String>,
    outbox: mpsc::UnboundedSender<Delivery>,
}

struct BrokerState {
    online: bool,
    next_id: u64,
    sessions: Vec<Session>,
}

/// Shared in-memory broker, cheap to clone
#[derive(Clone)]
pub struct MemoryBroker {
    state: Arc<Mutex<BrokerState>>,
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self {
            state: Arc::new(Mutex::new(BrokerState {
                online: true,
                next_id: 0,
                sessions: Vec::new(),
            })),
        }
    }
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a client transport attached to this broker
    pub fn transport(&self) -> MemoryTransport {
        MemoryTransport::new(self.clone())
    }

    /// Refuse (or accept again) new connections
    pub fn set_online(&self, online: bool) {
        self.state.lock().online = online;
    }

    /// Drop every session together with its subscriptions
    pub fn restart(&self) {
        let mut state = self.state.lock();
        info!(sessions = state.sessions.len(), "broker restart");
        state.sessions.clear();
    }

    pub fn session_count(&self) -> usize {
        self.state.lock().sessions.len()
    }

    fn open_session(&self, client_id: String) -> Result<(u64, mpsc::UnboundedReceiver<Delivery>)> {
        let mut state = self.state.lock();
        if !state.online {
            return Err(Error::Connect("broker is not accepting connections".to_string()));
        }
        let (outbox, inbox) = mpsc::unbounded_channel();
        state.next_id += 1;
        let id = state.next_id;
        state.sessions.push(Session {
            id,
            client_id,
            filters: Vec::new(),
            outbox,
        });
        Ok((id, inbox))
    }

    fn close_session(&self, id: u64) {
        self.state.lock().sessions.retain(|s| s.id != id);
    }

    fn has_session(&self, id: u64) -> bool {
        self.state.lock().sessions.iter().any(|s| s.id == id)
    }

    fn subscribe(&self, id: u64, filter: &str) -> Result<()> {
        let mut state = self.state.lock();
        let session = state
            .sessions
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or(Error::NotConnected)?;
        if !session.filters.iter().any(|f| f == filter) {
            session.filters.push(filter.to_string());
        }
        Ok(())
    }

    fn publish(&self, id: u64, topic: &str, payload: &[u8]) -> Result<()> {
        let state = self.state.lock();
        if !state.sessions.iter().any(|s| s.id == id) {
            return Err(Error::NotConnected);
        }
        for session in &state.sessions {
            if !session.filters.iter().any(|f| topic::matches(f, topic)) {
                continue;
            }
            let delivery = Delivery {
                topic: topic.to_string(),
                payload: payload.to_vec(),
            };
            if session.outbox.send(delivery).is_err() {
                debug!(client_id = %session.client_id, "session delivery task has stopped");
            }
        }
        Ok(())
    }
}

/// Client connection to a [`MemoryBroker`]
pub struct MemoryTransport {
    broker: MemoryBroker,
    session: Mutex<Option<u64>>,
    on_message: Arc<RwLock<Option<MessageCallback>>>,
    on_connect: RwLock<Option<ConnectCallback>>,
}

impl MemoryTransport {
    pub fn new(broker: MemoryBroker) -> Self {
        Self {
            broker,
            session: Mutex::new(None),
            on_message: Arc::default(),
            on_connect: RwLock::new(None),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.session
            .lock()
            .map(|id| self.broker.has_session(id))
            .unwrap_or(false)
    }

    fn session_id(&self) -> Result<u64> {
        (*self.session.lock()).ok_or(Error::NotConnected)
    }
}

#[async_trait::async_trait]
impl Transport for MemoryTransport {
    async fn connect(&self, options: &ConnectOptions) -> Result<()> {
        let client_id = options
            .client_id
            .clone()
            .unwrap_or_else(|| format!("{}:{}", options.host, options.port));
        let (id, mut inbox) = self.broker.open_session(client_id)?;

        if let Some(previous) = self.session.lock().replace(id) {
            self.broker.close_session(previous);
        }

        let on_message = self.on_message.clone();
        tokio::spawn(async move {
            while let Some(delivery) = inbox.recv().await {
                let callback = on_message.read().clone();
                if let Some(callback) = callback {
                    callback(&delivery.topic, &delivery.payload);
                }
            }
            debug!(session = id, "delivery task finished");
        });

        let on_connect = self.on_connect.read().clone();
        if let Some(on_connect) = on_connect {
            on_connect();
        }
        Ok(())
    }

    async fn subscribe(&self, topic: &str, _qos: QoS) -> Result<()> {
        self.broker
            .subscribe(self.session_id()?, topic)
            .map_err(|e| Error::Subscribe {
                topic: topic.to_string(),
                reason: e.to_string(),
            })
    }

    async fn publish(&self, topic: &str, payload: &[u8], _qos: QoS, _retain: bool) -> Result<()> {
        self.broker
            .publish(self.session_id()?, topic, payload)
            .map_err(|e| Error::Publish {
                topic: topic.to_string(),
                reason: e.to_string(),
            })
    }

    async fn close(&self) -> Result<()> {
        if let Some(id) = self.session.lock().take() {
            self.broker.close_session(id);
        }
        Ok(())
    }

    fn set_message_callback(&self, callback: MessageCallback) {
        *self.on_message.write() = Some(callback);
    }

    fn set_connect_callback(&self, callback: ConnectCallback) {
        *self.on_connect.write() = Some(callback);
    }
}
