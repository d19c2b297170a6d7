//! Impure I/O operations for MQTT client
//!
//! This module handles all impure I/O operations including network communication,
//! async coordination, and integration with the rumqttc client.
//!
//! rumqttc is poll-driven: nothing happens unless the event loop is polled. A
//! supervisor task owns the [`EventLoop`], polls it for the whole session and
//! turns events into [`SessionEvents`] callbacks. The `on_connect` callback
//! runs in its own task because it waits for a SUBACK that only the supervisor
//! can deliver.

use super::connection::{
    configure_mqtt_options, determine_next_state, ConnectionEvent, ConnectionState, MqttError,
    CONNECT_CONFIRMATION_TIMEOUT, RECONNECT_DELAY, REQUEST_CHANNEL_CAPACITY, SUBACK_TIMEOUT,
};
use super::message_handler::{EventRoute, MessageHandler, SubscriptionAck};
use super::tls::TrustStore;
use crate::config::{ConnectionProfile, TopicSet};
use crate::mqtt_span;
use crate::transport::{Session, SessionEvents, TopicSubscriber};
use async_trait::async_trait;
use rumqttc::{AsyncClient, EventLoop, MqttOptions, SubscribeReasonCode};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn, Instrument};

type SubAckSender = oneshot::Sender<Vec<SubscribeReasonCode>>;

/// Outcome of the first connection attempt, reported once by the supervisor
type ConnectOutcome = Result<(), String>;

/// Single-slot rendezvous between a subscriber waiting for a SUBACK and the
/// supervisor that receives it.
///
/// Arming a new wait drops any previous one. Cancelling drops the sender, which
/// makes the waiting receiver fail immediately.
#[derive(Debug, Clone, Default)]
pub struct PendingSubAck {
    slot: Arc<Mutex<Option<SubAckSender>>>,
}

impl PendingSubAck {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arm(&self) -> oneshot::Receiver<Vec<SubscribeReasonCode>> {
        let (tx, rx) = oneshot::channel();
        if self.lock().replace(tx).is_some() {
            warn!("Replaced a SUBACK wait that was never answered");
        }
        rx
    }

    /// Deliver return codes to the armed waiter. Returns false if nobody was waiting.
    pub fn complete(&self, return_codes: Vec<SubscribeReasonCode>) -> bool {
        match self.lock().take() {
            Some(tx) => tx.send(return_codes).is_ok(),
            None => false,
        }
    }

    pub fn cancel(&self) {
        self.lock().take();
    }

    pub fn is_armed(&self) -> bool {
        self.lock().is_some()
    }

    fn lock(&self) -> MutexGuard<'_, Option<SubAckSender>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Cloneable handle handed to `on_connect` for issuing SUBSCRIBE requests
#[derive(Clone)]
pub struct SubscriptionHandle {
    client: AsyncClient,
    pending: PendingSubAck,
    state_rx: watch::Receiver<ConnectionState>,
    suback_timeout: Duration,
}

#[async_trait]
impl TopicSubscriber for SubscriptionHandle {
    async fn subscribe(&self, topics: &TopicSet) -> Result<SubscriptionAck, MqttError> {
        if topics.is_empty() {
            return Err(MqttError::SubscriptionFailedStr(
                "No topics to subscribe to".to_string(),
            ));
        }

        let state = self.state_rx.borrow().clone();
        if state != ConnectionState::Connected {
            return Err(MqttError::NotConnected { state });
        }

        // Arm before sending so a fast SUBACK cannot slip past
        let ack_rx = self.pending.arm();
        let filters = MessageHandler::build_subscribe_filters(topics);
        if let Err(e) = self.client.subscribe_many(filters).await {
            self.pending.cancel();
            return Err(MqttError::SubscriptionFailed(Box::new(e)));
        }
        debug!(target: "mqtt_transport", "SUBSCRIBE queued for {}", topics);

        match tokio::time::timeout(self.suback_timeout, ack_rx).await {
            Ok(Ok(return_codes)) => Ok(SubscriptionAck::from_return_codes(topics, &return_codes)),
            Ok(Err(_)) => Err(MqttError::SubscriptionFailedStr(
                "Connection closed before SUBACK".to_string(),
            )),
            Err(_) => {
                self.pending.cancel();
                Err(MqttError::SubscriptionFailedStr(format!(
                    "SUBACK timeout after {:?}",
                    self.suback_timeout
                )))
            }
        }
    }
}

/// Background task state: everything the event loop needs besides the loop itself
struct Supervisor {
    events: Arc<dyn SessionEvents>,
    subscriber: SubscriptionHandle,
    pending: PendingSubAck,
    state_tx: watch::Sender<ConnectionState>,
    shutdown_rx: watch::Receiver<bool>,
    reconnect_delay: Duration,
}

impl Supervisor {
    fn transition(&self, event: ConnectionEvent) {
        self.state_tx
            .send_modify(|state| *state = determine_next_state(state, event));
    }

    fn shutdown_requested(&self) -> bool {
        *self.shutdown_rx.borrow()
    }

    fn spawn_on_connect(&self) {
        let events = self.events.clone();
        let subscriber: Arc<dyn TopicSubscriber> = Arc::new(self.subscriber.clone());
        tokio::spawn(
            async move {
                events.on_connect(subscriber).await;
            }
            .in_current_span(),
        );
    }

    /// Poll until stopped. `confirmation` fires on the first ConnAck or on the
    /// failure of the first attempt, whatever the state does afterwards.
    async fn run(
        self,
        mut event_loop: EventLoop,
        confirmation: oneshot::Sender<ConnectOutcome>,
    ) {
        info!("Starting MQTT event loop supervisor");
        let mut confirmation = Some(confirmation);
        let mut connected = false;
        let mut ever_connected = false;
        let mut reconnect_attempts = 0u32;

        loop {
            match event_loop.poll().await {
                Ok(event) => {
                    let keep_polling = self
                        .process_event_route(
                            MessageHandler::route_mqtt_event(&event),
                            &mut connected,
                            &mut ever_connected,
                            &mut reconnect_attempts,
                        )
                        .await;

                    if ever_connected {
                        if let Some(tx) = confirmation.take() {
                            let _ = tx.send(Ok(()));
                        }
                    }
                    if !keep_polling {
                        break;
                    }
                }
                Err(e) => {
                    if self.shutdown_requested() {
                        debug!("Event loop closed during shutdown: {}", e);
                        break;
                    }

                    if !ever_connected {
                        self.transition(ConnectionEvent::InitialConnectFailed(e.to_string()));
                        if let Some(tx) = confirmation.take() {
                            let _ = tx.send(Err(e.to_string()));
                        }
                        break;
                    }

                    if connected {
                        connected = false;
                        self.pending.cancel();
                        self.transition(ConnectionEvent::ConnectionLost(e.to_string()));
                        self.events.on_connection_lost(&e);
                    } else {
                        warn!(
                            attempt = reconnect_attempts,
                            "Reconnection attempt failed: {}",
                            e
                        );
                    }

                    reconnect_attempts += 1;
                    self.transition(ConnectionEvent::ReconnectionStarted(reconnect_attempts));
                    if !interruptible_sleep(self.shutdown_rx.clone(), self.reconnect_delay).await {
                        break;
                    }
                    // rumqttc dials again on the next poll
                }
            }
        }

        self.pending.cancel();
        self.transition(ConnectionEvent::EventLoopStopped);
        info!("MQTT event loop stopped");
    }

    /// Returns true to keep polling, false to stop the supervisor
    async fn process_event_route(
        &self,
        route: EventRoute,
        connected: &mut bool,
        ever_connected: &mut bool,
        reconnect_attempts: &mut u32,
    ) -> bool {
        match route {
            EventRoute::ConnectionAcknowledged { session_present } => {
                debug!(session_present, "ConnAck received");
                *connected = true;
                *ever_connected = true;
                *reconnect_attempts = 0;
                self.transition(ConnectionEvent::ConnAckReceived);
                self.spawn_on_connect();
                true
            }
            EventRoute::MessageReceived {
                topic,
                payload,
                retain,
            } => {
                debug!(
                    target: "mqtt_transport",
                    topic = %topic,
                    retain,
                    bytes = payload.len(),
                    "PUBLISH received"
                );
                self.events.on_message(&topic, &payload).await;
                true
            }
            EventRoute::SubscriptionAcknowledged {
                packet_id,
                return_codes,
            } => {
                debug!(target: "mqtt_transport", "SUBACK {}: {:?}", packet_id, return_codes);
                if !self.pending.complete(return_codes) {
                    debug!(target: "mqtt_transport", "SUBACK {} had no waiter", packet_id);
                }
                true
            }
            EventRoute::Disconnected => {
                warn!("Broker sent DISCONNECT");
                true
            }
            EventRoute::DisconnectSent => {
                info!("DISCONNECT sent to broker");
                false
            }
            EventRoute::InfrastructureEvent(event_str) => {
                debug!(target: "mqtt_transport", "MQTT event: {}", event_str);
                true
            }
            EventRoute::OutgoingEvent => true,
        }
    }
}

/// Perform interruptible sleep with shutdown monitoring
/// Returns true if sleep completed, false if shutdown requested
async fn interruptible_sleep(mut shutdown_rx: watch::Receiver<bool>, delay: Duration) -> bool {
    if *shutdown_rx.borrow() {
        return false;
    }

    tokio::select! {
        _ = shutdown_rx.changed() => {
            if *shutdown_rx.borrow() {
                info!("Shutdown signal received during reconnection delay, stopping");
                return false;
            }
            true
        }
        _ = tokio::time::sleep(delay) => {
            true
        }
    }
}

/// MQTT 3.1.1 session over a rumqttc event loop
pub struct MqttClient {
    client: AsyncClient,
    event_loop: Option<EventLoop>,
    broker_address: String,
    state_tx: watch::Sender<ConnectionState>,
    state_rx: watch::Receiver<ConnectionState>,
    shutdown_tx: watch::Sender<bool>,
    pending_suback: PendingSubAck,
    supervisor_handle: Option<JoinHandle<()>>,
}

impl MqttClient {
    /// Build a client for `profile` that trusts only `trust`
    pub fn new(profile: &ConnectionProfile, trust: &TrustStore) -> Self {
        Self::with_options(configure_mqtt_options(profile, trust))
    }

    /// Build a client from ready-made options
    pub fn with_options(options: MqttOptions) -> Self {
        let (host, port) = options.broker_address();
        let (client, event_loop) = AsyncClient::new(options, REQUEST_CHANNEL_CAPACITY);
        let ((state_tx, state_rx), (shutdown_tx, _)) = Self::setup_connection_channels();

        Self {
            client,
            event_loop: Some(event_loop),
            broker_address: format!("{host}:{port}"),
            state_tx,
            state_rx,
            shutdown_tx,
            pending_suback: PendingSubAck::new(),
            supervisor_handle: None,
        }
    }

    /// Create connection state and shutdown channels
    #[allow(clippy::type_complexity)]
    fn setup_connection_channels() -> (
        (
            watch::Sender<ConnectionState>,
            watch::Receiver<ConnectionState>,
        ),
        (watch::Sender<bool>, watch::Receiver<bool>),
    ) {
        let state_channels = watch::channel(ConnectionState::Idle);
        let shutdown_channels = watch::channel(false);
        (state_channels, shutdown_channels)
    }

    /// Wait for the supervisor to confirm the first connection attempt
    async fn wait_for_connection_confirmation(
        confirmation: oneshot::Receiver<ConnectOutcome>,
        timeout: Duration,
    ) -> Result<(), MqttError> {
        match tokio::time::timeout(timeout, confirmation).await {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(reason))) => Err(MqttError::ConnectionFailedStr(reason)),
            Ok(Err(_)) => Err(MqttError::ConnectionFailedStr(
                "Event loop stopped before ConnAck".to_string(),
            )),
            Err(_) => Err(MqttError::ConnectionFailedStr(
                "ConnAck timeout - no connection confirmation received".to_string(),
            )),
        }
    }

    fn subscription_handle(&self) -> SubscriptionHandle {
        SubscriptionHandle {
            client: self.client.clone(),
            pending: self.pending_suback.clone(),
            state_rx: self.state_rx.clone(),
            suback_timeout: SUBACK_TIMEOUT,
        }
    }

    /// Start the supervisor and wait for the first ConnAck.
    ///
    /// If the first connection attempt fails nothing is retried: the
    /// supervisor stops and the error is returned.
    pub async fn connect(&mut self, events: Arc<dyn SessionEvents>) -> Result<(), MqttError> {
        let event_loop = self.event_loop.take().ok_or_else(|| {
            MqttError::ConnectionFailedStr("Event loop already started".to_string())
        })?;

        info!(broker = %self.broker_address, "Connecting to MQTT broker");
        self.state_tx.send_modify(|state| {
            *state = determine_next_state(state, ConnectionEvent::ConnectStarted)
        });

        let supervisor = Supervisor {
            events,
            subscriber: self.subscription_handle(),
            pending: self.pending_suback.clone(),
            state_tx: self.state_tx.clone(),
            shutdown_rx: self.shutdown_tx.subscribe(),
            reconnect_delay: RECONNECT_DELAY,
        };
        let (confirm_tx, confirm_rx) = oneshot::channel();
        let span = mqtt_span!(broker = %self.broker_address);
        self.supervisor_handle = Some(tokio::spawn(
            supervisor.run(event_loop, confirm_tx).instrument(span),
        ));

        let confirmation =
            Self::wait_for_connection_confirmation(confirm_rx, CONNECT_CONFIRMATION_TIMEOUT).await;

        if let Err(e) = confirmation {
            self.shutdown_tx.send_replace(true);
            if let Some(handle) = self.supervisor_handle.take() {
                handle.abort();
            }
            return Err(e);
        }

        info!(broker = %self.broker_address, "Connected to MQTT broker");
        Ok(())
    }

    /// Queue a DISCONNECT and wait at most `grace` for the supervisor to stop
    pub async fn disconnect(&mut self, grace: Duration) -> Result<(), MqttError> {
        let Some(mut handle) = self.supervisor_handle.take() else {
            debug!("Disconnect requested without an active session");
            self.state_tx.send_replace(ConnectionState::Terminated);
            return Ok(());
        };

        self.state_tx.send_modify(|state| {
            *state = determine_next_state(state, ConnectionEvent::DisconnectRequested)
        });
        self.shutdown_tx.send_replace(true);

        if let Err(e) = self.client.try_disconnect() {
            warn!("Failed to queue DISCONNECT: {}", e);
        }

        match tokio::time::timeout(grace, &mut handle).await {
            Ok(Ok(())) => {
                info!("Event loop task shut down gracefully");
            }
            Ok(Err(e)) if !e.is_cancelled() => {
                warn!("Event loop task ended with error: {}", e);
            }
            Ok(Err(_)) => {}
            Err(_) => {
                warn!(
                    grace_ms = grace.as_millis() as u64,
                    "Event loop task didn't stop within grace period, forcing abort"
                );
                handle.abort();
            }
        }

        self.pending_suback.cancel();
        self.state_tx.send_replace(ConnectionState::Terminated);
        info!("MQTT client disconnected");
        Ok(())
    }

    /// Get current connection state
    pub fn connection_state(&self) -> ConnectionState {
        self.state_rx.borrow().clone()
    }

    pub fn broker_address(&self) -> &str {
        &self.broker_address
    }
}

#[async_trait]
impl Session for MqttClient {
    async fn connect(&mut self, events: Arc<dyn SessionEvents>) -> Result<(), MqttError> {
        MqttClient::connect(self, events).await
    }

    async fn disconnect(&mut self, grace: Duration) -> Result<(), MqttError> {
        MqttClient::disconnect(self, grace).await
    }

    fn connection_state(&self) -> ConnectionState {
        MqttClient::connection_state(self)
    }
}

impl Drop for MqttClient {
    fn drop(&mut self) {
        // Signal shutdown to background tasks if they're still running
        self.shutdown_tx.send_replace(true);

        // Abort the event loop task if it's still running
        if let Some(handle) = self.supervisor_handle.take() {
            handle.abort();
        }
    }
}
