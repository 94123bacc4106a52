use fimp_core::{Address, Message};
use indexmap::IndexMap;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::topic;

/// Inbound message together with where it arrived
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub topic: String,
    pub address: Address,
    pub message: Message,
}

/// Selects inbound messages for a channel
///
/// Unset fields match anything. The topic is an MQTT-style filter and may
/// contain `+` and `#` wildcards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageFilter {
    pub topic: Option<String>,
    pub service: Option<String>,
    pub msg_type: Option<String>,
}

impl MessageFilter {
    /// Filter accepting every message
    pub fn any() -> Self {
        Self::default()
    }

    pub fn topic(topic: impl Into<String>) -> Self {
        Self {
            topic: Some(topic.into()),
            ..Self::default()
        }
    }

    pub fn service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }

    pub fn msg_type(mut self, msg_type: impl Into<String>) -> Self {
        self.msg_type = Some(msg_type.into());
        self
    }

    pub fn matches(&self, topic: &str, message: &Message) -> bool {
        self.topic.as_deref().map_or(true, |f| topic::matches(f, topic))
            && self.service.as_deref().map_or(true, |s| s == message.service)
            && self.msg_type.as_deref().map_or(true, |t| t == message.msg_type)
    }
}

struct Route {
    filter: MessageFilter,
    sender: mpsc::Sender<InboundMessage>,
}

/// Fans inbound messages out to named, filtered, bounded channels
///
/// Routing never waits: a message for a full channel is dropped for that
/// channel, and channels whose receiver is gone are unregistered.
#[derive(Default)]
pub struct ChannelRouter {
    routes: RwLock<IndexMap<String, Route>>,
}

impl ChannelRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a channel, replacing any channel with the same name
    pub fn register(
        &self,
        name: impl Into<String>,
        filter: MessageFilter,
        capacity: usize,
    ) -> mpsc::Receiver<InboundMessage> {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        self.routes
            .write()
            .insert(name.into(), Route { filter, sender });
        receiver
    }

    pub fn unregister(&self, name: &str) -> bool {
        self.routes.write().shift_remove(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.routes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.read().is_empty()
    }

    /// Forward a message to every matching channel, returns how many took it
    pub fn route(&self, topic: &str, address: &Address, message: &Message) -> usize {
        let mut delivered = 0;
        let mut closed = Vec::new();

        for (name, route) in self.routes.read().iter() {
            if !route.filter.matches(topic, message) {
                continue;
            }
            let inbound = InboundMessage {
                topic: topic.to_string(),
                address: address.clone(),
                message: message.clone(),
            };
            match route.sender.try_send(inbound) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(channel = %name, topic, "channel full, message dropped");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => closed.push(name.clone()),
            }
        }

        if !closed.is_empty() {
            let mut routes = self.routes.write();
            for name in closed {
                debug!(channel = %name, "removing closed channel");
                routes.shift_remove(&name);
            }
        }
        delivered
    }
}
