use std::sync::Arc;
use std::time::Duration;

use fimp_fabric::{
    error::{Error, Result},
    transport::{
        ConnectCallback, MemoryBroker, MemoryTransport, MessageCallback, Transport,
        TransportFacade,
    },
    ConnectOptions, QoS,
};
use parking_lot::Mutex;
use tokio::sync::mpsc;

const TOPIC: &str = "pt:j1/mt:evt/rt:dev/rn:test/ad:1/sv:out_bin_switch/ad:1";

/// Transport whose inbound payloads are forwarded to a channel
fn recording_transport(
    broker: &MemoryBroker,
) -> (Arc<MemoryTransport>, mpsc::UnboundedReceiver<(String, Vec<u8>)>) {
    let transport = Arc::new(broker.transport());
    let (tx, rx) = mpsc::unbounded_channel();
    transport.set_message_callback(Arc::new(move |topic: &str, payload: &[u8]| {
        let _ = tx.send((topic.to_string(), payload.to_vec()));
    }));
    (transport, rx)
}

async fn recv(rx: &mut mpsc::UnboundedReceiver<(String, Vec<u8>)>) -> (String, Vec<u8>) {
    tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("delivery timed out")
        .expect("delivery channel closed")
}

#[tokio::test]
async fn memory_publish_reaches_subscriber() {
    let broker = MemoryBroker::new();
    let (subscriber, mut rx) = recording_transport(&broker);
    let publisher = broker.transport();

    subscriber.connect(&ConnectOptions::default()).await.unwrap();
    publisher.connect(&ConnectOptions::default()).await.unwrap();
    subscriber.subscribe(TOPIC, QoS::AtLeastOnce).await.unwrap();

    publisher
        .publish(TOPIC, b"hello", QoS::AtLeastOnce, false)
        .await
        .unwrap();

    let (topic, payload) = recv(&mut rx).await;
    assert_eq!(topic, TOPIC);
    assert_eq!(payload, b"hello");
}

#[tokio::test]
async fn memory_delivery_preserves_order() {
    let broker = MemoryBroker::new();
    let (subscriber, mut rx) = recording_transport(&broker);

    subscriber.connect(&ConnectOptions::default()).await.unwrap();
    subscriber.subscribe("pt:j1/mt:evt/#", QoS::AtLeastOnce).await.unwrap();

    for payload in [b"first".to_vec(), b"second".to_vec(), b"third".to_vec()] {
        subscriber
            .publish(TOPIC, &payload, QoS::AtLeastOnce, false)
            .await
            .unwrap();
    }

    for expected in [b"first".to_vec(), b"second".to_vec(), b"third".to_vec()] {
        assert_eq!(recv(&mut rx).await.1, expected);
    }
}

#[tokio::test]
async fn memory_skips_non_matching_topics() {
    let broker = MemoryBroker::new();
    let (subscriber, mut rx) = recording_transport(&broker);

    subscriber.connect(&ConnectOptions::default()).await.unwrap();
    subscriber.subscribe(TOPIC, QoS::AtMostOnce).await.unwrap();
    subscriber
        .publish("pt:j1/mt:cmd/rt:app/rn:other/ad:1", b"x", QoS::AtMostOnce, false)
        .await
        .unwrap();

    let result = tokio::time::timeout(Duration::from_millis(100), rx.recv()).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn connect_refused_when_broker_offline() {
    let broker = MemoryBroker::new();
    broker.set_online(false);
    let transport = broker.transport();

    match transport.connect(&ConnectOptions::default()).await {
        Err(Error::Connect(_)) => {}
        other => panic!("Expected Connect error, got {:?}", other),
    }
    assert!(!transport.is_connected());
}

#[tokio::test]
async fn publish_requires_connection() {
    let broker = MemoryBroker::new();
    let transport = broker.transport();

    match transport.publish(TOPIC, b"x", QoS::AtLeastOnce, false).await {
        Err(Error::NotConnected) => {}
        other => panic!("Expected NotConnected, got {:?}", other),
    }
    assert!(transport.subscribe(TOPIC, QoS::AtLeastOnce).await.is_err());
}

#[tokio::test]
async fn close_ends_session() {
    let broker = MemoryBroker::new();
    let transport = broker.transport();

    transport.connect(&ConnectOptions::default()).await.unwrap();
    assert_eq!(broker.session_count(), 1);

    transport.close().await.unwrap();
    assert_eq!(broker.session_count(), 0);
    assert!(!transport.is_connected());
}

#[tokio::test]
async fn facade_records_subscriptions_once() {
    let broker = MemoryBroker::new();
    let facade = TransportFacade::new(Arc::new(broker.transport()), QoS::AtLeastOnce);

    facade.connect(&ConnectOptions::default()).await.unwrap();
    facade.subscribe(TOPIC, None).await.unwrap();
    facade.subscribe(TOPIC, Some(QoS::ExactlyOnce)).await.unwrap();

    let subs = facade.subscriptions();
    assert_eq!(subs.len(), 1);
    assert_eq!(subs[0].topic, TOPIC);
    assert_eq!(subs[0].qos, QoS::AtLeastOnce);
}

#[tokio::test]
async fn facade_does_not_record_failed_subscription() {
    let broker = MemoryBroker::new();
    let facade = TransportFacade::new(Arc::new(broker.transport()), QoS::AtLeastOnce);

    assert!(facade.subscribe(TOPIC, None).await.is_err());
    assert!(!facade.is_subscribed(TOPIC));
}

#[tokio::test]
async fn facade_resubscribes_after_reconnect() {
    let broker = MemoryBroker::new();
    let (transport, mut rx) = recording_transport(&broker);
    let facade = TransportFacade::new(transport.clone(), QoS::AtLeastOnce);
    let publisher = broker.transport();
    publisher.connect(&ConnectOptions::default()).await.unwrap();

    facade.connect(&ConnectOptions::default()).await.unwrap();
    facade.subscribe(TOPIC, None).await.unwrap();

    broker.restart();
    assert!(!transport.is_connected());
    publisher.connect(&ConnectOptions::default()).await.unwrap();
    facade.connect(&ConnectOptions::default()).await.unwrap();

    // Re-subscription runs on a spawned task; publish until it lands
    let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
    loop {
        publisher
            .publish(TOPIC, b"again", QoS::AtLeastOnce, false)
            .await
            .unwrap();
        if let Ok(Some((topic, _))) =
            tokio::time::timeout(Duration::from_millis(20), rx.recv()).await
        {
            assert_eq!(topic, TOPIC);
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "subscription was not restored"
        );
    }
}

/// Transport that fires its connect callback from its own network thread
#[derive(Default)]
struct ThreadedTransport {
    subscribed: Mutex<Vec<String>>,
    on_connect: Mutex<Option<ConnectCallback>>,
}

#[async_trait::async_trait]
impl Transport for ThreadedTransport {
    async fn connect(&self, _options: &ConnectOptions) -> Result<()> {
        if let Some(callback) = self.on_connect.lock().clone() {
            std::thread::spawn(move || callback()).join().unwrap();
        }
        Ok(())
    }

    async fn subscribe(&self, topic: &str, _qos: QoS) -> Result<()> {
        self.subscribed.lock().push(topic.to_string());
        Ok(())
    }

    async fn publish(&self, _topic: &str, _payload: &[u8], _qos: QoS, _retain: bool) -> Result<()> {
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }

    fn set_message_callback(&self, _callback: MessageCallback) {}

    fn set_connect_callback(&self, callback: ConnectCallback) {
        *self.on_connect.lock() = Some(callback);
    }
}

#[tokio::test]
async fn facade_resubscribes_when_connect_fires_off_runtime() {
    let transport = Arc::new(ThreadedTransport::default());
    let facade = TransportFacade::new(transport.clone(), QoS::AtLeastOnce);

    facade.connect(&ConnectOptions::default()).await.unwrap();
    facade.subscribe(TOPIC, None).await.unwrap();
    facade.connect(&ConnectOptions::default()).await.unwrap();

    let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
    while transport.subscribed.lock().len() < 2 {
        assert!(
            tokio::time::Instant::now() < deadline,
            "subscription was not restored: {:?}",
            transport.subscribed.lock()
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(*transport.subscribed.lock(), vec![TOPIC.to_string(), TOPIC.to_string()]);
}

#[test]
fn qos_levels() {
    assert_eq!(QoS::try_from(0u8).unwrap(), QoS::AtMostOnce);
    assert_eq!(u8::from(QoS::ExactlyOnce), 2);
    assert!(matches!(QoS::try_from(3u8), Err(Error::Config(_))));
}
