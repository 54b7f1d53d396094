use crate::config::ClientConfig;
use crate::connection_manager::{ConnectionManager, ConnectionState, Connector, DisconnectReason};
use async_trait::async_trait;
use log::{debug, error, info, warn};
use serde_json::Value;
use shared::{
    timestamp_secs, Action, ActionExecutionResult, ActionRegistry, Connection, ConnectionError,
    Envelope, MessageType, Protocol, TransportEvent, TransportStats,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;

/// What the session surfaces to the application
#[derive(Debug, Clone)]
pub enum ClientEvent {
    ActionResult {
        action_id: String,
        result: ActionExecutionResult,
    },
    /// A world-changing action another player performed
    RemoteAction(Action),
    ServerError {
        code: String,
        message: String,
    },
    Disconnected {
        reason: String,
    },
}

struct Session {
    connection: Arc<Connection>,
    /// Held until authentication completes, then handed to the forwarder
    events: Option<mpsc::UnboundedReceiver<TransportEvent>>,
    forwarder: Option<JoinHandle<()>>,
}

/// TCP implementation of [`Connector`]. Every transport it opens forwards its
/// events into one long-lived channel, so reconnects are invisible to the
/// consumer of that channel.
pub struct TcpConnector {
    config: ClientConfig,
    protocol: Arc<Protocol>,
    session: Mutex<Option<Session>>,
    player_id: Mutex<Option<String>>,
    inbound: mpsc::UnboundedSender<TransportEvent>,
}

impl TcpConnector {
    pub fn new(
        config: ClientConfig,
        inbound: mpsc::UnboundedSender<TransportEvent>,
    ) -> Self {
        Self {
            config,
            protocol: Arc::new(Protocol::new()),
            session: Mutex::new(None),
            player_id: Mutex::new(None),
            inbound,
        }
    }

    pub fn protocol(&self) -> &Arc<Protocol> {
        &self.protocol
    }

    pub async fn player_id(&self) -> Option<String> {
        self.player_id.lock().await.clone()
    }

    async fn connection(&self) -> Result<Arc<Connection>, ConnectionError> {
        self.session
            .lock()
            .await
            .as_ref()
            .map(|session| Arc::clone(&session.connection))
            .ok_or(ConnectionError::NotConnected)
    }

    pub async fn send_frame(&self, frame: Vec<u8>) -> Result<(), ConnectionError> {
        self.connection().await?.send_frame(frame)
    }

    pub async fn send_action(&self, action: &Action) -> Result<(), ConnectionError> {
        self.connection().await?.send_action(action)
    }

    async fn close_session(&self, session: Session) {
        if session.connection.is_alive() {
            match self.protocol.disconnect("Client disconnect") {
                Ok(frame) => {
                    if let Err(e) = session.connection.send_frame(frame) {
                        debug!("Could not send disconnect: {}", e);
                    }
                }
                Err(e) => warn!("Failed to pack disconnect: {}", e),
            }
        }
        session.connection.stop().await;
        if let Some(forwarder) = session.forwarder {
            forwarder.abort();
        }
    }
}

async fn await_connect_response(
    events: &mut mpsc::UnboundedReceiver<TransportEvent>,
) -> Option<Envelope> {
    while let Some(event) = events.recv().await {
        match event {
            TransportEvent::Message(envelope)
                if envelope.message_type == MessageType::ConnectResponse =>
            {
                return Some(envelope)
            }
            TransportEvent::Message(envelope) => {
                debug!("Ignoring {} before authentication", envelope.message_type)
            }
            TransportEvent::Disconnected { reason } => {
                warn!("Connection lost during authentication: {}", reason);
                return None;
            }
        }
    }
    None
}

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self) -> Result<(), ConnectionError> {
        if let Some(previous) = self.session.lock().await.take() {
            self.close_session(previous).await;
        }

        let (connection, events) = Connection::connect(
            &self.config.address(),
            self.config.connect_timeout,
            self.config.queue_capacity,
            Arc::clone(&self.protocol),
        )
        .await?;

        *self.session.lock().await = Some(Session {
            connection: Arc::new(connection),
            events: Some(events),
            forwarder: None,
        });
        Ok(())
    }

    async fn authenticate(&self) -> Result<(), ConnectionError> {
        let (connection, mut events) = {
            let mut session = self.session.lock().await;
            let session = session.as_mut().ok_or(ConnectionError::NotConnected)?;
            let events = session.events.take().ok_or(ConnectionError::NotConnected)?;
            (Arc::clone(&session.connection), events)
        };

        connection.send_frame(self.protocol.connect(&self.config.player_name)?)?;

        let response = timeout(self.config.auth_timeout, await_connect_response(&mut events))
            .await
            .map_err(|_| {
                ConnectionError::Authentication("timed out waiting for connect response".into())
            })?
            .ok_or(ConnectionError::NotConnected)?;

        if !response.bool_field("success").unwrap_or(false) {
            let message = response.str_field("error_message").unwrap_or("rejected");
            return Err(ConnectionError::Authentication(message.to_string()));
        }
        let player_id = response
            .str_field("player_id")
            .ok_or_else(|| ConnectionError::Authentication("missing player id".into()))?
            .to_string();
        info!("Authenticated as {}", player_id);
        *self.player_id.lock().await = Some(player_id);

        let inbound = self.inbound.clone();
        let forwarder = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if inbound.send(event).is_err() {
                    break;
                }
            }
        });
        if let Some(session) = self.session.lock().await.as_mut() {
            session.forwarder = Some(forwarder);
        }
        Ok(())
    }

    async fn send_ping(&self) -> Result<(), ConnectionError> {
        let frame = self.protocol.ping()?;
        self.send_frame(frame).await
    }

    async fn transport_stats(&self) -> Option<TransportStats> {
        let connection = self.connection().await.ok()?;
        Some(connection.stats().await)
    }

    async fn disconnect(&self) {
        if let Some(session) = self.session.lock().await.take() {
            self.close_session(session).await;
        }
    }
}

/// A player session: connection lifecycle, action submission and result
/// tracking
pub struct Client {
    connector: Arc<TcpConnector>,
    manager: ConnectionManager,
    registry: Arc<Mutex<ActionRegistry>>,
    events: mpsc::UnboundedReceiver<ClientEvent>,
    dispatcher: JoinHandle<()>,
}

impl Client {
    /// Connects, authenticates and starts health monitoring
    pub async fn connect(config: ClientConfig) -> Result<Self, ConnectionError> {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let connector = Arc::new(TcpConnector::new(config.clone(), inbound_tx));
        let manager = ConnectionManager::new(connector.clone(), &config);
        let registry = Arc::new(Mutex::new(ActionRegistry::new()));

        let dispatcher = tokio::spawn(dispatch_loop(
            inbound_rx,
            events_tx,
            Arc::clone(&connector),
            manager.clone(),
            Arc::clone(&registry),
        ));

        if let Err(e) = manager.connect().await {
            dispatcher.abort();
            return Err(e);
        }
        manager.start_monitoring().await;

        Ok(Self {
            connector,
            manager,
            registry,
            events: events_rx,
            dispatcher,
        })
    }

    pub fn manager(&self) -> &ConnectionManager {
        &self.manager
    }

    pub async fn player_id(&self) -> Option<String> {
        self.connector.player_id().await
    }

    /// Stamps `action` with this session's player id, registers it and sends
    /// it. Returns the action id to match against the eventual result.
    pub async fn send_action(&self, mut action: Action) -> Result<String, ConnectionError> {
        if self.manager.state().await != ConnectionState::Authenticated {
            return Err(ConnectionError::NotConnected);
        }
        let player_id = self
            .connector
            .player_id()
            .await
            .ok_or(ConnectionError::NotConnected)?;
        action.set_player_id(player_id);

        let action_id = action.action_id().to_string();
        self.registry.lock().await.register(action.clone());

        if let Err(e) = self.connector.send_action(&action).await {
            self.registry.lock().await.cancel_action(&action_id);
            return Err(e);
        }
        debug!("Sent action {}", action);
        Ok(action_id)
    }

    pub async fn next_event(&mut self) -> Option<ClientEvent> {
        self.events.recv().await
    }

    /// Waits for the result of `action_id`. Other events received meanwhile
    /// are dropped.
    pub async fn wait_for_result(
        &mut self,
        action_id: &str,
        wait: Duration,
    ) -> Option<ActionExecutionResult> {
        let events = &mut self.events;
        timeout(wait, async {
            while let Some(event) = events.recv().await {
                match event {
                    ClientEvent::ActionResult {
                        action_id: id,
                        result,
                    } if id == action_id => return Some(result),
                    ClientEvent::Disconnected { .. } => return None,
                    other => debug!("Skipping {:?} while waiting for {}", other, action_id),
                }
            }
            None
        })
        .await
        .ok()
        .flatten()
    }

    pub async fn action_result(&self, action_id: &str) -> Option<ActionExecutionResult> {
        self.registry
            .lock()
            .await
            .get_action_result(action_id)
            .cloned()
    }

    pub async fn disconnect(self) {
        self.manager.disconnect().await;
        self.dispatcher.abort();
    }
}

async fn dispatch_loop(
    mut inbound: mpsc::UnboundedReceiver<TransportEvent>,
    events: mpsc::UnboundedSender<ClientEvent>,
    connector: Arc<TcpConnector>,
    manager: ConnectionManager,
    registry: Arc<Mutex<ActionRegistry>>,
) {
    while let Some(event) = inbound.recv().await {
        let envelope = match event {
            TransportEvent::Message(envelope) => envelope,
            TransportEvent::Disconnected { reason } => {
                let _ = events.send(ClientEvent::Disconnected { reason });
                manager
                    .handle_connection_lost(DisconnectReason::ConnectionLost)
                    .await;
                continue;
            }
        };

        manager.record_message_received().await;

        match envelope.message_type {
            MessageType::Pong => {
                if let Some(sent) = envelope.data.get("ping_time").and_then(Value::as_f64) {
                    manager.record_ping((timestamp_secs() - sent) * 1000.0).await;
                }
            }
            MessageType::Ping => {
                let ping_time = envelope
                    .data
                    .get("ping_time")
                    .and_then(Value::as_f64)
                    .unwrap_or(envelope.timestamp);
                match connector.protocol().pong(ping_time) {
                    Ok(frame) => {
                        if let Err(e) = connector.send_frame(frame).await {
                            warn!("Failed to answer ping: {}", e);
                        }
                    }
                    Err(e) => error!("Failed to pack pong: {}", e),
                }
            }
            MessageType::ActionResult => match envelope.to_action_result() {
                Ok((action_id, result)) => {
                    info!("Action {} -> {:?}: {}", action_id, result.result, result.message);
                    registry.lock().await.complete(&action_id, result.clone());
                    let _ = events.send(ClientEvent::ActionResult { action_id, result });
                }
                Err(e) => warn!("Malformed action result: {}", e),
            },
            MessageType::Action(_) => match envelope.to_action() {
                Ok(action) => {
                    let _ = events.send(ClientEvent::RemoteAction(action));
                }
                Err(e) => warn!("Malformed replicated action: {}", e),
            },
            MessageType::Error => {
                let code = envelope.str_field("error_code").unwrap_or("unknown").to_string();
                let message = envelope.str_field("error_message").unwrap_or_default().to_string();
                warn!("Server error {}: {}", code, message);
                let _ = events.send(ClientEvent::ServerError { code, message });
            }
            MessageType::Disconnect => {
                let reason = envelope
                    .str_field("reason")
                    .unwrap_or("Server disconnect")
                    .to_string();
                info!("Server closed the session: {}", reason);
                let _ = events.send(ClientEvent::Disconnected { reason });
                connector.disconnect().await;
                manager
                    .handle_connection_lost(DisconnectReason::ServerShutdown)
                    .await;
            }
            other => debug!("Unhandled message type {}", other),
        }
    }
}
