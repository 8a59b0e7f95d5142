//! Broker connection lifecycle.
//!
//! [`TransportClient`] is an explicitly constructed handle (clone it freely)
//! around one MQTT session. Reconnection after the link drops is left to the
//! MQTT event loop; the client only reports the transitions to its observers
//! and re-issues remembered subscriptions once the session is back.

use dashmap::DashMap;
use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS,
};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::backoff::Backoff;
use crate::error::TransportError;
use crate::observers::{ObserverRegistry, Subscription};
use crate::options::{QosLevel, SubscribeOptions, TransportOptions};

const DISCONNECT_FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    /// Session dropped; the event loop is trying to get it back
    Reconnecting,
    /// The last connect attempt failed
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// `disconnect()` was called
    Requested,
    /// The link went down underneath us
    Offline(String),
}

/// A publish received from the broker. The payload is passed through untouched.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QosLevel,
}

/// Outgoing payload. `Json` values are serialized before sending.
#[derive(Debug, Clone)]
pub enum Payload {
    Bytes(Vec<u8>),
    Text(String),
    Json(serde_json::Value),
}

impl Payload {
    fn into_bytes(self) -> Result<Vec<u8>, TransportError> {
        match self {
            Payload::Bytes(bytes) => Ok(bytes),
            Payload::Text(text) => Ok(text.into_bytes()),
            Payload::Json(value) => {
                serde_json::to_vec(&value).map_err(|err| TransportError::Serialize(err.to_string()))
            }
        }
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Payload::Bytes(bytes)
    }
}

impl From<&[u8]> for Payload {
    fn from(bytes: &[u8]) -> Self {
        Payload::Bytes(bytes.to_vec())
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Payload::Text(text)
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Payload::Text(text.to_string())
    }
}

impl From<serde_json::Value> for Payload {
    fn from(value: serde_json::Value) -> Self {
        Payload::Json(value)
    }
}

struct Session {
    client: AsyncClient,
    cancel: CancellationToken,
    pump: JoinHandle<()>,
}

/// Result of the most recently finished connect attempt.
#[derive(Default)]
struct ConnectGate {
    last: Option<Result<(), TransportError>>,
}

struct Shared {
    options: TransportOptions,
    session: Mutex<Option<Session>>,
    connect_gate: tokio::sync::Mutex<ConnectGate>,
    attempts_completed: AtomicU64,
    status_tx: watch::Sender<ConnectionStatus>,
    subscriptions: DashMap<String, QosLevel>,
    messages: ObserverRegistry<IncomingMessage>,
    connects: ObserverRegistry<()>,
    disconnects: ObserverRegistry<DisconnectReason>,
    errors: ObserverRegistry<TransportError>,
}

impl Shared {
    fn session(&self) -> MutexGuard<'_, Option<Session>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_status(&self, status: ConnectionStatus) {
        self.status_tx.send_replace(status);
    }

    fn report_error(&self, error: TransportError) {
        self.errors.notify(&error);
    }
}

#[derive(Clone)]
pub struct TransportClient {
    shared: Arc<Shared>,
}

impl TransportClient {
    pub fn new(options: TransportOptions) -> Self {
        let (status_tx, _) = watch::channel(ConnectionStatus::Disconnected);
        Self {
            shared: Arc::new(Shared {
                options,
                session: Mutex::new(None),
                connect_gate: tokio::sync::Mutex::new(ConnectGate::default()),
                attempts_completed: AtomicU64::new(0),
                status_tx,
                subscriptions: DashMap::new(),
                messages: ObserverRegistry::new("message"),
                connects: ObserverRegistry::new("connect"),
                disconnects: ObserverRegistry::new("disconnect"),
                errors: ObserverRegistry::new("error"),
            }),
        }
    }

    pub fn options(&self) -> &TransportOptions {
        &self.shared.options
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.shared.status_tx.borrow()
    }

    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.shared.status_tx.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.status() == ConnectionStatus::Connected
    }

    /// Open the broker session.
    ///
    /// Callers that arrive while an attempt is in flight wait for it and share
    /// its result instead of starting another. A failed attempt leaves no
    /// session behind, so calling `connect` again starts a fresh attempt.
    pub async fn connect(&self) -> Result<(), TransportError> {
        let seen = self.shared.attempts_completed.load(Ordering::Acquire);
        let mut gate = self.shared.connect_gate.lock().await;

        if self.shared.attempts_completed.load(Ordering::Acquire) != seen {
            if let Some(result) = gate.last.clone() {
                tracing::debug!("joined in-flight connect attempt");
                return result;
            }
        }
        if self.shared.session().is_some() {
            return Ok(());
        }

        let result = self.open_session().await;
        if let Err(err) = &result {
            tracing::warn!(
                host = %self.shared.options.host,
                port = self.shared.options.port,
                error = %err,
                "broker connect failed"
            );
            self.shared.set_status(ConnectionStatus::Error);
            self.shared.report_error(err.clone());
        }

        gate.last = Some(result.clone());
        self.shared.attempts_completed.fetch_add(1, Ordering::AcqRel);
        result
    }

    async fn open_session(&self) -> Result<(), TransportError> {
        let options = &self.shared.options;
        self.shared.set_status(ConnectionStatus::Connecting);

        let mut mqtt_options = MqttOptions::new(&options.client_id, &options.host, options.port);
        mqtt_options.set_keep_alive(options.keep_alive);
        mqtt_options.set_clean_session(true);
        if let (Some(username), Some(password)) = (&options.username, &options.password) {
            mqtt_options.set_credentials(username, password);
        }

        let (client, mut eventloop) = AsyncClient::new(mqtt_options, options.channel_capacity);

        match tokio::time::timeout(options.connect_timeout, wait_for_connack(&mut eventloop)).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => return Err(err),
            Err(_) => return Err(TransportError::ConnectTimeout(options.connect_timeout)),
        }

        tracing::info!(
            host = %options.host,
            port = options.port,
            client_id = %options.client_id,
            "connected to broker"
        );

        let cancel = CancellationToken::new();
        let pump = tokio::spawn(run_event_pump(
            Arc::clone(&self.shared),
            eventloop,
            client.clone(),
            cancel.clone(),
        ));
        *self.shared.session() = Some(Session {
            client: client.clone(),
            cancel,
            pump,
        });

        self.shared.set_status(ConnectionStatus::Connected);
        resubscribe(&self.shared, &client);
        self.shared.connects.notify(&());
        Ok(())
    }

    /// Close the session. A no-op when not connected.
    pub async fn disconnect(&self) -> Result<(), TransportError> {
        let Some(mut session) = self.shared.session().take() else {
            return Ok(());
        };

        if let Err(err) = session.client.disconnect().await {
            tracing::debug!(error = %err, "disconnect request not delivered");
        }
        if tokio::time::timeout(DISCONNECT_FLUSH_TIMEOUT, &mut session.pump)
            .await
            .is_err()
        {
            session.cancel.cancel();
            session.pump.abort();
        }
        session.cancel.cancel();

        self.shared.set_status(ConnectionStatus::Disconnected);
        tracing::info!("disconnected from broker");
        self.shared.disconnects.notify(&DisconnectReason::Requested);
        Ok(())
    }

    fn client(&self) -> Result<AsyncClient, TransportError> {
        self.shared
            .session()
            .as_ref()
            .map(|session| session.client.clone())
            .ok_or(TransportError::NotInitialized)
    }

    pub async fn subscribe(&self, topic: &str, options: SubscribeOptions) -> Result<(), TransportError> {
        let client = self.client()?;
        client
            .subscribe(topic, QoS::from(options.qos))
            .await
            .map_err(|err| TransportError::Client(err.to_string()))?;
        self.shared.subscriptions.insert(topic.to_string(), options.qos);
        tracing::info!(topic = %topic, qos = options.qos.level(), "subscribed");
        Ok(())
    }

    pub async fn unsubscribe(&self, topic: &str) -> Result<(), TransportError> {
        let client = self.client()?;
        client
            .unsubscribe(topic)
            .await
            .map_err(|err| TransportError::Client(err.to_string()))?;
        self.shared.subscriptions.remove(topic);
        tracing::info!(topic = %topic, "unsubscribed");
        Ok(())
    }

    /// Topics that will be re-subscribed after a reconnect.
    pub fn subscriptions(&self) -> Vec<(String, QosLevel)> {
        self.shared
            .subscriptions
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect()
    }

    pub async fn publish(
        &self,
        topic: &str,
        payload: impl Into<Payload>,
        qos: QosLevel,
    ) -> Result<(), TransportError> {
        let client = self.client()?;
        let bytes = payload.into().into_bytes()?;
        client
            .publish(topic, QoS::from(qos), false, bytes)
            .await
            .map_err(|err| TransportError::Client(err.to_string()))
    }

    /// Serialize `value` to JSON and publish it.
    pub async fn publish_json<T: Serialize>(
        &self,
        topic: &str,
        value: &T,
        qos: QosLevel,
    ) -> Result<(), TransportError> {
        let value =
            serde_json::to_value(value).map_err(|err| TransportError::Serialize(err.to_string()))?;
        self.publish(topic, Payload::Json(value), qos).await
    }

    pub fn on_message<F>(&self, observer: F) -> Subscription
    where
        F: Fn(&IncomingMessage) + Send + Sync + 'static,
    {
        self.shared.messages.register(observer)
    }

    pub fn on_connect<F>(&self, observer: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.shared.connects.register(move |_: &()| observer())
    }

    pub fn on_disconnect<F>(&self, observer: F) -> Subscription
    where
        F: Fn(&DisconnectReason) + Send + Sync + 'static,
    {
        self.shared.disconnects.register(observer)
    }

    pub fn on_error<F>(&self, observer: F) -> Subscription
    where
        F: Fn(&TransportError) + Send + Sync + 'static,
    {
        self.shared.errors.register(observer)
    }
}

async fn wait_for_connack(eventloop: &mut EventLoop) -> Result<(), TransportError> {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                return match ack.code {
                    ConnectReturnCode::Success => Ok(()),
                    code => Err(TransportError::Connection(format!("broker refused: {:?}", code))),
                };
            }
            Ok(_) => {}
            Err(err) => return Err(TransportError::Connection(err.to_string())),
        }
    }
}

fn resubscribe(shared: &Shared, client: &AsyncClient) {
    for entry in shared.subscriptions.iter() {
        if let Err(err) = client.try_subscribe(entry.key().as_str(), QoS::from(*entry.value())) {
            tracing::warn!(topic = %entry.key(), error = %err, "re-subscribe failed");
            shared.report_error(TransportError::Client(err.to_string()));
        }
    }
}

async fn run_event_pump(
    shared: Arc<Shared>,
    mut eventloop: EventLoop,
    client: AsyncClient,
    cancel: CancellationToken,
) {
    let mut backoff = Backoff::new(shared.options.repoll_delay, shared.options.repoll_delay_max);
    let mut online = true;

    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = eventloop.poll() => event,
        };

        match event {
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let message = IncomingMessage {
                    topic: publish.topic,
                    payload: publish.payload.to_vec(),
                    qos: publish.qos.into(),
                };
                shared.messages.notify(&message);
            }
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                backoff.reset();
                if !online {
                    online = true;
                    tracing::info!("broker session restored");
                    shared.set_status(ConnectionStatus::Connected);
                    resubscribe(&shared, &client);
                    shared.connects.notify(&());
                }
            }
            Ok(Event::Incoming(Packet::SubAck(_))) => {
                tracing::debug!("subscription acknowledged");
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                tracing::debug!("disconnect sent; stopping event pump");
                break;
            }
            Ok(_) => {}
            Err(err) => {
                let reason = err.to_string();
                if online {
                    online = false;
                    tracing::warn!(error = %reason, "broker connection lost; reconnecting");
                    shared.set_status(ConnectionStatus::Reconnecting);
                    shared.disconnects.notify(&DisconnectReason::Offline(reason.clone()));
                } else {
                    tracing::debug!(error = %reason, "reconnect attempt failed");
                }
                shared.report_error(TransportError::Connection(reason));

                let delay = backoff.fail();
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn unreachable_client() -> TransportClient {
        // Nothing listens on port 1 locally; the connect fails fast.
        let options = TransportOptions::from_url("mqtt://127.0.0.1:1", "fleet-test")
            .unwrap()
            .with_connect_timeout(Duration::from_secs(2));
        TransportClient::new(options)
    }

    #[tokio::test]
    async fn test_subscribe_before_connect_fails_fast() {
        let client = unreachable_client();
        let err = client
            .subscribe("fleet/+/location", SubscribeOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err, TransportError::NotInitialized);

        let err = client.publish("fleet/D1/location", "{}", QosLevel::AtLeastOnce).await.unwrap_err();
        assert_eq!(err, TransportError::NotInitialized);
        assert_eq!(client.status(), ConnectionStatus::Disconnected);
    }

    #[tokio::test]
    async fn test_failed_connect_reports_error_and_can_retry() {
        let client = unreachable_client();
        let errors = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&errors);
        let _subscription = client.on_error(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(client.connect().await.is_err());
        assert_eq!(client.status(), ConnectionStatus::Error);
        assert_eq!(errors.load(Ordering::SeqCst), 1);

        // No leaked "connecting" state: a second call makes a new attempt.
        assert!(client.connect().await.is_err());
        assert_eq!(errors.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_concurrent_connects_share_one_attempt() {
        let client = unreachable_client();
        let errors = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&errors);
        let _subscription = client.on_error(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let (first, second, third) = tokio::join!(client.connect(), client.connect(), client.connect());
        assert!(first.is_err() && second.is_err() && third.is_err());
        assert_eq!(errors.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_disconnect_without_session_is_noop() {
        let client = unreachable_client();
        let notified = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&notified);
        let _subscription = client.on_disconnect(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        client.disconnect().await.unwrap();
        assert_eq!(notified.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_json_payload_is_serialized() {
        let bytes = Payload::from(serde_json::json!({"vehicleId": "D1"}))
            .into_bytes()
            .unwrap();
        assert_eq!(bytes, br#"{"vehicleId":"D1"}"#.to_vec());
        assert_eq!(Payload::from("raw").into_bytes().unwrap(), b"raw".to_vec());
    }
}
