//! Client session management and action buffering for the server
//!
//! This module handles the server-side roster of authenticated clients:
//! - Session lifecycle (connect, disconnect, timeout)
//! - Per-client action queues, drained in timestamp order each tick
//! - Inactivity tracking and capacity enforcement

use log::info;
use shared::{Action, ActionQueue};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// An authenticated client and the actions it has sent but the game loop has
/// not yet processed
pub struct ClientSession {
    /// Player id assigned by the server
    pub player_id: String,
    pub player_name: String,
    /// Peer address of the TCP connection
    pub addr: SocketAddr,
    /// Last time anything arrived from this client
    pub last_seen: Instant,
    pub actions_received: u64,
    pending_actions: ActionQueue,
}

impl ClientSession {
    pub fn new(player_id: impl Into<String>, player_name: impl Into<String>, addr: SocketAddr) -> Self {
        Self {
            player_id: player_id.into(),
            player_name: player_name.into(),
            addr,
            last_seen: Instant::now(),
            actions_received: 0,
            pending_actions: ActionQueue::new(),
        }
    }

    pub fn touch(&mut self) {
        self.last_seen = Instant::now();
    }

    /// Buffers an action. A full queue drops its oldest entry.
    pub fn add_action(&mut self, action: Action) {
        self.touch();
        self.actions_received += 1;
        self.pending_actions.enqueue(action);
    }

    pub fn pending_len(&self) -> usize {
        self.pending_actions.len()
    }

    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

/// Roster of connected clients, keyed by player id
pub struct ClientManager {
    clients: HashMap<String, ClientSession>,
    next_client_id: u32,
    max_clients: usize,
    client_timeout: Duration,
}

impl ClientManager {
    pub fn new(max_clients: usize, client_timeout: Duration) -> Self {
        Self {
            clients: HashMap::new(),
            next_client_id: 1,
            max_clients,
            client_timeout,
        }
    }

    /// Registers a client, returning its new player id, or `None` when the
    /// server is full
    pub fn add_client(&mut self, addr: SocketAddr, player_name: &str) -> Option<String> {
        if self.clients.len() >= self.max_clients {
            return None;
        }

        let player_id = format!("player_{}", self.next_client_id);
        self.next_client_id += 1;

        info!("Client {} ({}) connected from {}", player_id, player_name, addr);
        self.clients.insert(
            player_id.clone(),
            ClientSession::new(player_id.clone(), player_name, addr),
        );
        Some(player_id)
    }

    pub fn remove_client(&mut self, player_id: &str) -> Option<ClientSession> {
        let session = self.clients.remove(player_id)?;
        info!("Client {} disconnected", session.player_id);
        Some(session)
    }

    pub fn find_client_by_addr(&self, addr: SocketAddr) -> Option<&str> {
        self.clients
            .values()
            .find(|session| session.addr == addr)
            .map(|session| session.player_id.as_str())
    }

    pub fn get(&self, player_id: &str) -> Option<&ClientSession> {
        self.clients.get(player_id)
    }

    /// Marks the client at `addr` as active
    pub fn touch_addr(&mut self, addr: SocketAddr) {
        if let Some(session) = self.clients.values_mut().find(|s| s.addr == addr) {
            session.touch();
        }
    }

    pub fn add_action(&mut self, player_id: &str, action: Action) -> bool {
        match self.clients.get_mut(player_id) {
            Some(session) => {
                session.add_action(action);
                true
            }
            None => false,
        }
    }

    /// Drains every client's queue, ordered by action timestamp across clients
    pub fn take_chronological_actions(&mut self) -> Vec<Action> {
        let mut actions: Vec<Action> = self
            .clients
            .values_mut()
            .flat_map(|session| std::iter::from_fn(move || session.pending_actions.dequeue()))
            .collect();

        actions.sort_by(|a, b| a.timestamp().total_cmp(&b.timestamp()));
        actions
    }

    /// Removes clients silent for longer than the configured timeout and
    /// returns their sessions
    pub fn check_timeouts(&mut self) -> Vec<ClientSession> {
        let timeout = self.client_timeout;
        let timed_out: Vec<String> = self
            .clients
            .values()
            .filter(|session| session.is_timed_out(timeout))
            .map(|session| session.player_id.clone())
            .collect();

        timed_out
            .iter()
            .filter_map(|player_id| self.remove_client(player_id))
            .collect()
    }

    /// Player ids and addresses, for routing broadcasts
    pub fn get_client_addrs(&self) -> Vec<(String, SocketAddr)> {
        self.clients
            .values()
            .map(|session| (session.player_id.clone(), session.addr))
            .collect()
    }

    pub fn max_clients(&self) -> usize {
        self.max_clients
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
