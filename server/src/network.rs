//! Server network layer: TCP accept loop, per-client transports and the main
//! loop that routes messages into the game state

use crate::client_manager::ClientManager;
use crate::config::ServerConfig;
use crate::game::GameState;
use log::{debug, error, info, warn};
use serde::Serialize;
use serde_json::Value;
use shared::protocol::PROTOCOL_VERSION;
use shared::{
    Action, ActionExecutionResult, Connection, Envelope, MessageType, Protocol, TransportEvent,
};
use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

/// Messages sent from network tasks to the main server loop
pub enum ServerMessage {
    Connected {
        addr: SocketAddr,
        connection: Arc<Connection>,
    },
    MessageReceived {
        addr: SocketAddr,
        envelope: Envelope,
    },
    ConnectionClosed {
        addr: SocketAddr,
        reason: String,
    },
    ClientTimeout {
        player_id: String,
        addr: SocketAddr,
    },
    Shutdown,
}

/// Sent to clients in a successful connect response
#[derive(Serialize)]
struct ServerInfo<'a> {
    server_name: &'a str,
    protocol_version: u32,
    max_clients: usize,
    world_size: u32,
}

/// Lets another task stop a running [`Server`]
#[derive(Clone)]
pub struct ServerHandle {
    server_tx: mpsc::UnboundedSender<ServerMessage>,
}

impl ServerHandle {
    pub fn shutdown(&self) {
        if self.server_tx.send(ServerMessage::Shutdown).is_err() {
            debug!("Server already stopped");
        }
    }
}

/// Main server coordinating client transports and the authoritative game
pub struct Server {
    config: ServerConfig,
    listener: Option<TcpListener>,
    local_addr: SocketAddr,
    protocol: Arc<Protocol>,
    clients: Arc<RwLock<ClientManager>>,
    connections: HashMap<SocketAddr, Arc<Connection>>,
    game_state: GameState,

    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    tasks: Vec<JoinHandle<()>>,
}

impl Server {
    pub async fn bind(config: ServerConfig) -> io::Result<Self> {
        let listener = TcpListener::bind(config.address()).await?;
        let local_addr = listener.local_addr()?;
        info!("Server listening on {}", local_addr);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let clients = ClientManager::new(config.max_clients, config.client_timeout);
        let game_state = GameState::new(config.world_size, config.spawn_point);

        Ok(Server {
            config,
            listener: Some(listener),
            local_addr,
            protocol: Arc::new(Protocol::new()),
            clients: Arc::new(RwLock::new(clients)),
            connections: HashMap::new(),
            game_state,
            server_tx,
            server_rx,
            tasks: Vec::new(),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            server_tx: self.server_tx.clone(),
        }
    }

    pub fn game_state(&self) -> &GameState {
        &self.game_state
    }

    /// Spawns the task that accepts TCP clients and starts their transports
    fn spawn_acceptor(&mut self) {
        let Some(listener) = self.listener.take() else {
            return;
        };
        let server_tx = self.server_tx.clone();
        let protocol = Arc::clone(&self.protocol);
        let queue_capacity = self.config.queue_capacity;

        self.tasks.push(tokio::spawn(async move {
            loop {
                let (stream, addr) = match listener.accept().await {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        error!("Error accepting connection: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        continue;
                    }
                };

                let (connection, events) =
                    match Connection::from_stream(stream, queue_capacity, Arc::clone(&protocol)) {
                        Ok(started) => started,
                        Err(e) => {
                            warn!("Failed to start transport for {}: {}", addr, e);
                            continue;
                        }
                    };

                debug!("Accepted connection from {}", addr);
                let connected = ServerMessage::Connected {
                    addr,
                    connection: Arc::new(connection),
                };
                if server_tx.send(connected).is_err() {
                    break;
                }
                tokio::spawn(forward_events(addr, events, server_tx.clone()));
            }
        }));
    }

    /// Spawns the task that drops clients which stopped talking
    fn spawn_timeout_checker(&mut self) {
        let clients = Arc::clone(&self.clients);
        let server_tx = self.server_tx.clone();

        self.tasks.push(tokio::spawn(async move {
            let mut interval = interval(Duration::from_secs(1));

            loop {
                interval.tick().await;

                let timed_out = {
                    let mut clients_guard = clients.write().await;
                    clients_guard.check_timeouts()
                };

                for session in timed_out {
                    let message = ServerMessage::ClientTimeout {
                        player_id: session.player_id,
                        addr: session.addr,
                    };
                    if let Err(e) = server_tx.send(message) {
                        error!("Failed to send timeout message: {}", e);
                        return;
                    }
                }
            }
        }));
    }

    fn send_frame(&self, addr: SocketAddr, frame: Result<Vec<u8>, shared::ProtocolError>) {
        let Some(connection) = self.connections.get(&addr) else {
            debug!("No connection for {}", addr);
            return;
        };
        match frame {
            Ok(frame) => {
                if let Err(e) = connection.send_frame(frame) {
                    warn!("Failed to queue message for {}: {}", addr, e);
                }
            }
            Err(e) => error!("Failed to pack message for {}: {}", addr, e),
        }
    }

    async fn broadcast_action(&self, action: &Action) {
        let frame = match self.protocol.action(action) {
            Ok(frame) => frame,
            Err(e) => {
                error!("Failed to pack broadcast: {}", e);
                return;
            }
        };

        let recipients = self.clients.read().await.get_client_addrs();
        for (player_id, addr) in recipients {
            if player_id == action.player_id() {
                continue;
            }
            self.send_frame(addr, Ok(frame.clone()));
        }
    }

    async fn close_connection(&mut self, addr: SocketAddr) {
        if let Some(connection) = self.connections.remove(&addr) {
            connection.stop().await;
        }
    }

    async fn drop_client(&mut self, addr: SocketAddr) {
        let player_id = {
            let mut clients = self.clients.write().await;
            let player_id = clients.find_client_by_addr(addr).map(str::to_string);
            if let Some(player_id) = &player_id {
                clients.remove_client(player_id);
            }
            player_id
        };
        if let Some(player_id) = player_id {
            self.game_state.remove_player(&player_id);
        }
    }

    fn server_info(&self) -> Value {
        let info = ServerInfo {
            server_name: &self.config.server_name,
            protocol_version: PROTOCOL_VERSION,
            max_clients: self.config.max_clients,
            world_size: self.config.world_size,
        };
        serde_json::to_value(info).unwrap_or(Value::Null)
    }

    async fn handle_connect(&mut self, addr: SocketAddr, envelope: &Envelope) {
        let player_name = envelope.str_field("player_name").unwrap_or("player");
        info!("Client connecting from {} as {}", addr, player_name);

        // A repeated CONNECT on the same transport replaces the old session
        self.drop_client(addr).await;

        let player_id = self.clients.write().await.add_client(addr, player_name);
        match player_id {
            Some(player_id) => {
                self.game_state.add_player(&player_id);
                let response = self.protocol.connect_response(
                    true,
                    Some(&player_id),
                    None,
                    self.server_info(),
                );
                self.send_frame(addr, response);
            }
            None => {
                warn!("Rejecting {}: server full", addr);
                let response =
                    self.protocol
                        .connect_response(false, None, Some("Server full"), Value::Null);
                self.send_frame(addr, response);
                self.close_connection(addr).await;
            }
        }
    }

    async fn handle_action_message(&mut self, addr: SocketAddr, envelope: &Envelope) {
        let player_id = {
            let clients = self.clients.read().await;
            clients.find_client_by_addr(addr).map(str::to_string)
        };
        let Some(player_id) = player_id else {
            let frame = self
                .protocol
                .error("not_authenticated", "Send CONNECT before actions");
            self.send_frame(addr, frame);
            return;
        };

        match envelope.to_action() {
            Ok(mut action) => {
                // Never trust the sender's claimed identity
                action.set_player_id(player_id.as_str());
                self.clients.write().await.add_action(&player_id, action);
            }
            Err(e) => {
                warn!("Malformed action from {}: {}", player_id, e);
                let frame = self.protocol.error("invalid_action", &e.to_string());
                self.send_frame(addr, frame);
            }
        }
    }

    /// Processes incoming messages and updates game state
    async fn handle_message(&mut self, addr: SocketAddr, envelope: Envelope) {
        self.clients.write().await.touch_addr(addr);

        match envelope.message_type {
            MessageType::Connect => self.handle_connect(addr, &envelope).await,
            MessageType::Ping => {
                let ping_time = envelope
                    .data
                    .get("ping_time")
                    .and_then(Value::as_f64)
                    .unwrap_or(envelope.timestamp);
                let frame = self.protocol.pong(ping_time);
                self.send_frame(addr, frame);
            }
            MessageType::Pong => {}
            MessageType::Disconnect => {
                let reason = envelope.str_field("reason").unwrap_or("unspecified");
                info!("Client at {} disconnected: {}", addr, reason);
                self.drop_client(addr).await;
                self.close_connection(addr).await;
            }
            MessageType::Action(_) => self.handle_action_message(addr, &envelope).await,
            other => warn!("Unexpected message type {} from {}", other, addr),
        }
    }

    /// Runs every queued action through the game state, answers each sender
    /// and replicates successful world changes to everyone else
    async fn process_actions(&mut self) {
        let actions = self.clients.write().await.take_chronological_actions();
        if actions.is_empty() {
            return;
        }

        let recipients: HashMap<String, SocketAddr> = self
            .clients
            .read()
            .await
            .get_client_addrs()
            .into_iter()
            .collect();

        for action in actions {
            let replica = action.clone();
            let result = self.game_state.apply_action(action);
            self.report_result(&replica, &result, recipients.get(replica.player_id()));

            if result.is_success() && replica.action_type().changes_world() {
                self.broadcast_action(&replica).await;
            }
        }
    }

    fn report_result(
        &self,
        action: &Action,
        result: &ActionExecutionResult,
        addr: Option<&SocketAddr>,
    ) {
        debug!("{} -> {:?}: {}", action, result.result, result.message);
        if let Some(addr) = addr {
            let frame =
                self.protocol
                    .action_result(action.action_id(), action.player_id(), result);
            self.send_frame(*addr, frame);
        }
    }

    async fn shutdown(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }

        let addrs: Vec<SocketAddr> = self.connections.keys().copied().collect();
        for addr in addrs {
            self.send_frame(addr, self.protocol.disconnect("Server shutdown"));
            self.close_connection(addr).await;
        }
    }

    /// Main server loop coordinating all operations
    pub async fn run(&mut self) -> io::Result<()> {
        self.spawn_acceptor();
        self.spawn_timeout_checker();

        let mut tick_interval = interval(self.config.tick_duration);
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("Server started successfully");

        loop {
            tokio::select! {
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::Connected { addr, connection }) => {
                            self.connections.insert(addr, connection);
                        }
                        Some(ServerMessage::MessageReceived { addr, envelope }) => {
                            self.handle_message(addr, envelope).await;
                        }
                        Some(ServerMessage::ConnectionClosed { addr, reason }) => {
                            info!("Connection from {} closed: {}", addr, reason);
                            self.drop_client(addr).await;
                            self.close_connection(addr).await;
                        }
                        Some(ServerMessage::ClientTimeout { player_id, addr }) => {
                            warn!("Client {} timed out", player_id);
                            self.game_state.remove_player(&player_id);
                            self.close_connection(addr).await;
                        }
                        Some(ServerMessage::Shutdown) | None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                },

                _ = tick_interval.tick() => {
                    self.process_actions().await;
                    self.game_state.tick += 1;

                    if self.game_state.tick % 600 == 0 {
                        let stats = self.game_state.handler_stats();
                        debug!(
                            "Tick {}: {} clients, {} actions processed ({:.1}% successful)",
                            self.game_state.tick,
                            self.game_state.player_count(),
                            stats.actions_processed,
                            stats.success_rate
                        );
                    }
                },
            }
        }

        self.shutdown().await;
        Ok(())
    }
}

/// Forwards one transport's events into the main loop until it closes
async fn forward_events(
    addr: SocketAddr,
    mut events: mpsc::UnboundedReceiver<TransportEvent>,
    server_tx: mpsc::UnboundedSender<ServerMessage>,
) {
    while let Some(event) = events.recv().await {
        let message = match event {
            TransportEvent::Message(envelope) => ServerMessage::MessageReceived { addr, envelope },
            TransportEvent::Disconnected { reason } => ServerMessage::ConnectionClosed { addr, reason },
        };
        if server_tx.send(message).is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::protocol::{unpack_payload, FrameDecoder};
    use shared::ActionKind;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use tokio::time::timeout;

    fn test_config(max_clients: usize) -> ServerConfig {
        ServerConfig {
            port: 0,
            max_clients,
            tick_duration: Duration::from_millis(10),
            ..ServerConfig::default()
        }
    }

    async fn start(config: ServerConfig) -> (SocketAddr, ServerHandle, JoinHandle<io::Result<()>>) {
        let mut server = Server::bind(config).await.unwrap();
        let addr = server.local_addr();
        let handle = server.handle();
        let task = tokio::spawn(async move { server.run().await });
        (addr, handle, task)
    }

    /// Minimal raw peer speaking the frame format directly
    struct RawPeer {
        stream: TcpStream,
        protocol: Protocol,
        decoder: FrameDecoder,
    }

    impl RawPeer {
        async fn connect(addr: SocketAddr) -> Self {
            Self {
                stream: TcpStream::connect(addr).await.unwrap(),
                protocol: Protocol::new(),
                decoder: FrameDecoder::new(),
            }
        }

        async fn send(&mut self, frame: Vec<u8>) {
            self.stream.write_all(&frame).await.unwrap();
        }

        async fn recv(&mut self) -> Envelope {
            let mut buffer = [0u8; 4096];
            loop {
                if let Some(payload) = self.decoder.next_payload().unwrap() {
                    return unpack_payload(&payload).unwrap();
                }
                let len = timeout(Duration::from_secs(2), self.stream.read(&mut buffer))
                    .await
                    .expect("timed out waiting for server")
                    .unwrap();
                assert!(len > 0, "server closed the connection");
                self.decoder.push(&buffer[..len]);
            }
        }
    }

    #[tokio::test]
    async fn test_connect_and_ping() {
        let (addr, handle, task) = start(test_config(4)).await;
        let mut peer = RawPeer::connect(addr).await;

        let frame = peer.protocol.connect("alice").unwrap();
        peer.send(frame).await;
        let response = peer.recv().await;
        assert_eq!(response.message_type, MessageType::ConnectResponse);
        assert_eq!(response.bool_field("success"), Some(true));
        assert_eq!(response.str_field("player_id"), Some("player_1"));

        let frame = peer.protocol.ping().unwrap();
        peer.send(frame).await;
        assert_eq!(peer.recv().await.message_type, MessageType::Pong);

        handle.shutdown();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_full_server_rejects_connect() {
        let (addr, handle, task) = start(test_config(1)).await;

        let mut first = RawPeer::connect(addr).await;
        let frame = first.protocol.connect("alice").unwrap();
        first.send(frame).await;
        assert_eq!(first.recv().await.bool_field("success"), Some(true));

        let mut second = RawPeer::connect(addr).await;
        let frame = second.protocol.connect("bob").unwrap();
        second.send(frame).await;
        let response = second.recv().await;
        assert_eq!(response.bool_field("success"), Some(false));
        assert_eq!(response.str_field("error_message"), Some("Server full"));

        handle.shutdown();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_action_before_connect_is_refused() {
        let (addr, handle, task) = start(test_config(4)).await;
        let mut peer = RawPeer::connect(addr).await;

        let action = Action::new("mallory", ActionKind::Stop);
        let frame = peer.protocol.action(&action).unwrap();
        peer.send(frame).await;

        let reply = peer.recv().await;
        assert_eq!(reply.message_type, MessageType::Error);
        assert_eq!(reply.str_field("error_code"), Some("not_authenticated"));

        handle.shutdown();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_action_is_stamped_with_session_player() {
        let (addr, handle, task) = start(test_config(4)).await;
        let mut peer = RawPeer::connect(addr).await;

        let frame = peer.protocol.connect("alice").unwrap();
        peer.send(frame).await;
        peer.recv().await;

        let action = Action::new("someone_else", ActionKind::Stop);
        let frame = peer.protocol.action(&action).unwrap();
        peer.send(frame).await;

        let reply = peer.recv().await;
        assert_eq!(reply.message_type, MessageType::ActionResult);
        assert_eq!(reply.player_id.as_deref(), Some("player_1"));
        let (action_id, result) = reply.to_action_result().unwrap();
        assert_eq!(action_id, action.action_id());
        assert!(result.is_success());

        handle.shutdown();
        task.await.unwrap().unwrap();
    }
}
