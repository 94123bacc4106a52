use std::sync::Arc;

use parking_lot::RwLock;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::transport::{ConnectOptions, MessageCallback, QoS, Transport};

/// A topic the client has asked to receive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub topic: String,
    pub qos: QoS,
}

/// Thin adapter over a [`Transport`] that remembers subscriptions
///
/// Every subscription made through the facade is re-issued whenever the
/// transport reports a new connection. The connect callback may fire on a
/// thread the transport owns, so re-subscription is spawned on the runtime
/// captured when the facade was built or last connected.
#[derive(Clone)]
pub struct TransportFacade {
    transport: Arc<dyn Transport>,
    subscriptions: Arc<RwLock<Vec<Subscription>>>,
    runtime: Arc<RwLock<Option<Handle>>>,
    default_qos: QoS,
}

impl TransportFacade {
    pub fn new(transport: Arc<dyn Transport>, default_qos: QoS) -> Self {
        let subscriptions: Arc<RwLock<Vec<Subscription>>> = Arc::default();
        let runtime = Arc::new(RwLock::new(Handle::try_current().ok()));

        let weak_transport = Arc::downgrade(&transport);
        let known = subscriptions.clone();
        let captured = runtime.clone();
        transport.set_connect_callback(Arc::new(move || {
            let Some(transport) = weak_transport.upgrade() else {
                return;
            };
            let subs = known.read().clone();
            if subs.is_empty() {
                return;
            }
            let handle = captured.read().clone();
            let Some(runtime) = handle.or_else(|| Handle::try_current().ok()) else {
                warn!("no runtime available to re-issue subscriptions");
                return;
            };
            info!(count = subs.len(), "re-issuing subscriptions");
            runtime.spawn(async move {
                for sub in subs {
                    if let Err(e) = transport.subscribe(&sub.topic, sub.qos).await {
                        warn!(topic = %sub.topic, error = %e, "re-subscribe failed");
                    }
                }
            });
        }));

        Self {
            transport,
            subscriptions,
            runtime,
            default_qos,
        }
    }

    pub fn default_qos(&self) -> QoS {
        self.default_qos
    }

    /// Connect the underlying transport
    pub async fn connect(&self, options: &ConnectOptions) -> Result<()> {
        *self.runtime.write() = Some(Handle::current());
        self.transport.connect(options).await?;
        info!(host = %options.host, port = options.port, "connected");
        Ok(())
    }

    /// Subscribe to `topic`; already known topics are not subscribed again
    pub async fn subscribe(&self, topic: &str, qos: Option<QoS>) -> Result<()> {
        if self.is_subscribed(topic) {
            return Ok(());
        }
        let qos = qos.unwrap_or(self.default_qos);
        self.transport.subscribe(topic, qos).await?;

        let mut subs = self.subscriptions.write();
        if !subs.iter().any(|s| s.topic == topic) {
            debug!(topic, "subscribed");
            subs.push(Subscription {
                topic: topic.to_string(),
                qos,
            });
        }
        Ok(())
    }

    pub async fn publish(&self, topic: &str, payload: &[u8], qos: Option<QoS>) -> Result<()> {
        self.transport
            .publish(topic, payload, qos.unwrap_or(self.default_qos), false)
            .await
    }

    pub async fn close(&self) -> Result<()> {
        self.transport.close().await
    }

    /// Install the inbound message callback
    pub fn on_message(&self, callback: MessageCallback) {
        self.transport.set_message_callback(callback);
    }

    pub fn is_subscribed(&self, topic: &str) -> bool {
        self.subscriptions.read().iter().any(|s| s.topic == topic)
    }

    pub fn subscriptions(&self) -> Vec<Subscription> {
        self.subscriptions.read().clone()
    }
}
