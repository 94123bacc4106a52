//! Request/response over publish/subscribe
//!
//! A request is published on one topic and its response is expected on
//! another. [`CorrelationEngine`] registers a pending entry before publishing,
//! lets the transport's delivery task complete it, and removes it once the
//! caller has its answer, timed out or was cancelled.

use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;

use fimp_core::{Address, Message};
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::channel::{ChannelRouter, InboundMessage, MessageFilter};
use crate::codec::{Codec, JsonCodec};
use crate::config::FimpConfig;
use crate::error::{Error, Result};
use crate::pending::{PendingRequest, PendingRequestTable};
use crate::transport::{ConnectOptions, QoS, Transport, TransportFacade};

/// Stand-in deadline for timeouts too large to add to the current instant
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// Handler receiving every decoded inbound message
pub type MessageHandler = Arc<dyn Fn(&str, &Address, &Message) + Send + Sync>;

/// Constraints on which response may complete a request
///
/// Empty fields accept anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseFilter {
    pub service: String,
    pub msg_type: String,
}

impl ResponseFilter {
    pub fn any() -> Self {
        Self::default()
    }

    pub fn service(mut self, service: impl Into<String>) -> Self {
        self.service = service.into();
        self
    }

    pub fn msg_type(mut self, msg_type: impl Into<String>) -> Self {
        self.msg_type = msg_type.into();
        self
    }
}

#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Also require `response.corid == request.uid`
    pub match_by_correlation_id: bool,
    /// Timeout used by [`CorrelationEngine::request`]
    pub default_timeout: Duration,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            match_by_correlation_id: false,
            default_timeout: Duration::from_secs(60),
        }
    }
}

struct EngineInner<C> {
    facade: TransportFacade,
    codec: C,
    pending: PendingRequestTable,
    handler: RwLock<Option<MessageHandler>>,
    channels: ChannelRouter,
    options: EngineOptions,
}

impl<C: Codec> EngineInner<C> {
    fn dispatch(&self, topic: &str, payload: &[u8]) {
        let message = match self.codec.decode(payload) {
            Ok(message) => message,
            Err(e) => {
                warn!(topic, error = %e, "dropping undecodable message");
                return;
            }
        };
        let address = Address::parse(topic);

        let completed =
            self.pending
                .match_and_complete(topic, &message, self.options.match_by_correlation_id);
        trace!(topic, %message, completed, "inbound message");

        let handler = self.handler.read().clone();
        if let Some(handler) = handler {
            handler(topic, &address, &message);
        }
        self.channels.route(topic, &address, &message);
    }
}

/// Removes its pending entry when the request is finished or dropped
struct PendingGuard<'a> {
    table: &'a PendingRequestTable,
    uid: &'a str,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.table.remove(self.uid);
    }
}

/// Send-and-wait client on top of a [`TransportFacade`]
///
/// Cheap to clone; clones share the pending table and handlers.
pub struct CorrelationEngine<C = JsonCodec> {
    inner: Arc<EngineInner<C>>,
}

impl<C> Clone for CorrelationEngine<C> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl CorrelationEngine<JsonCodec> {
    /// Build an engine with the JSON codec from configuration
    pub fn from_config(transport: Arc<dyn Transport>, config: &FimpConfig) -> Result<Self> {
        config.validate()?;
        let facade = TransportFacade::new(transport, QoS::try_from(config.broker.qos)?);
        let codec = if config.requests.emit_corid {
            JsonCodec::with_corid()
        } else {
            JsonCodec::new()
        };
        let options = EngineOptions {
            match_by_correlation_id: config.requests.match_by_correlation_id,
            default_timeout: config.requests.timeout(),
        };
        Ok(Self::new(facade, codec, options))
    }
}

impl<C: Codec + 'static> CorrelationEngine<C> {
    /// Create an engine and take over the facade's inbound callback
    pub fn new(facade: TransportFacade, codec: C, options: EngineOptions) -> Self {
        let inner = Arc::new_cyclic(|weak: &Weak<EngineInner<C>>| {
            let weak = weak.clone();
            facade.on_message(Arc::new(move |topic: &str, payload: &[u8]| {
                if let Some(inner) = weak.upgrade() {
                    inner.dispatch(topic, payload);
                }
            }));
            EngineInner {
                facade,
                codec,
                pending: PendingRequestTable::new(),
                handler: RwLock::new(None),
                channels: ChannelRouter::new(),
                options,
            }
        });
        Self { inner }
    }

    pub fn facade(&self) -> &TransportFacade {
        &self.inner.facade
    }

    pub fn options(&self) -> &EngineOptions {
        &self.inner.options
    }

    pub async fn connect(&self, options: &ConnectOptions) -> Result<()> {
        self.inner.facade.connect(options).await
    }

    pub async fn close(&self) -> Result<()> {
        self.inner.facade.close().await
    }

    pub async fn subscribe(&self, topic: &str) -> Result<()> {
        self.inner.facade.subscribe(topic, None).await
    }

    /// Encode and publish a message
    pub async fn publish(&self, topic: &str, message: &Message) -> Result<()> {
        let payload = self.inner.codec.encode(message)?;
        self.inner.facade.publish(topic, &payload, None).await
    }

    pub async fn publish_to(&self, address: &Address, message: &Message) -> Result<()> {
        self.publish(&address.serialize(), message).await
    }

    /// Install the handler that sees every decoded inbound message
    ///
    /// Runs on the transport's delivery task, in addition to request matching.
    pub fn set_message_handler<F>(&self, handler: F)
    where
        F: Fn(&str, &Address, &Message) + Send + Sync + 'static,
    {
        *self.inner.handler.write() = Some(Arc::new(handler));
    }

    pub fn clear_message_handler(&self) {
        *self.inner.handler.write() = None;
    }

    /// Receive inbound messages matching `filter` on a bounded channel
    ///
    /// Does not subscribe; the topic must be subscribed separately.
    pub fn register_channel(
        &self,
        name: impl Into<String>,
        filter: MessageFilter,
        capacity: usize,
    ) -> mpsc::Receiver<InboundMessage> {
        self.inner.channels.register(name, filter, capacity)
    }

    pub fn unregister_channel(&self, name: &str) -> bool {
        self.inner.channels.unregister(name)
    }

    /// Number of requests currently awaiting a response
    pub fn pending_count(&self) -> usize {
        self.inner.pending.len()
    }

    /// Send a request and wait for any response on `response_topic`,
    /// using the configured default timeout
    pub async fn request(
        &self,
        request_topic: &str,
        request: Message,
        response_topic: &str,
    ) -> Result<Option<Message>> {
        let timeout = self.inner.options.default_timeout;
        self.send_request(request_topic, request, response_topic, ResponseFilter::any(), timeout)
            .await
    }

    /// Publish `request` and wait up to `timeout` for a matching response
    ///
    /// The timeout covers subscribing and publishing as well as the wait.
    /// Returns `Ok(None)` on timeout. Errors from subscribing or publishing,
    /// or a uid that is already pending, are returned as `Err`. The pending
    /// entry is gone by the time this returns, whatever the outcome.
    pub async fn send_request(
        &self,
        request_topic: &str,
        request: Message,
        response_topic: &str,
        filter: ResponseFilter,
        timeout: Duration,
    ) -> Result<Option<Message>> {
        self.send_request_until(
            request_topic,
            request,
            response_topic,
            filter,
            timeout,
            std::future::pending(),
        )
        .await
    }

    /// Like [`send_request`](Self::send_request), but also gives up with
    /// `Ok(None)` as soon as `cancel` completes
    pub async fn send_request_until<F>(
        &self,
        request_topic: &str,
        mut request: Message,
        response_topic: &str,
        filter: ResponseFilter,
        timeout: Duration,
        cancel: F,
    ) -> Result<Option<Message>>
    where
        F: Future<Output = ()>,
    {
        request.ensure_identity();
        let uid = request.uid.clone();

        let (entry, response) =
            PendingRequest::new(uid.as_str(), response_topic, filter.service, filter.msg_type);
        self.inner.pending.register(entry)?;
        let _guard = PendingGuard {
            table: &self.inner.pending,
            uid: &uid,
        };
        debug!(%uid, request_topic, response_topic, "request pending");

        let now = tokio::time::Instant::now();
        let deadline = now
            .checked_add(timeout)
            .unwrap_or_else(|| now + FAR_FUTURE);
        let exchange = async {
            self.inner.facade.subscribe(response_topic, None).await?;
            let payload = self.inner.codec.encode(&request)?;
            self.inner
                .facade
                .publish(request_topic, &payload, None)
                .await?;
            Ok::<_, Error>(response.await.ok())
        };

        tokio::select! {
            outcome = tokio::time::timeout_at(deadline, exchange) => match outcome {
                Ok(Ok(Some(message))) => {
                    debug!(%uid, "request completed");
                    Ok(Some(message))
                }
                Ok(Ok(None)) => Ok(None),
                Ok(Err(e)) => Err(e),
                Err(_) => {
                    debug!(%uid, ?timeout, "request timed out");
                    Ok(None)
                }
            },
            _ = cancel => {
                debug!(%uid, "request cancelled");
                Ok(None)
            }
        }
    }
}
