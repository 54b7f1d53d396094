//! Framed transport over a byte stream
//!
//! A [`Connection`] owns two tasks once started: a receiver that reads the
//! stream, reassembles frames and forwards them as [`TransportEvent`]s, and a
//! sender that drains a bounded outbound queue onto the stream. Both stop on a
//! shared shutdown signal. Loss of the stream flips the connected flag and is
//! reported as [`TransportEvent::Disconnected`].

use crate::actions::Action;
use crate::protocol::{Envelope, FrameDecoder, MessageType, Protocol, ProtocolError};
use crate::timestamp_secs;
use log::{debug, error, info, warn};
use serde::Serialize;
use serde_json::{Map, Value};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;

const READ_BUFFER_SIZE: usize = 4096;
/// How long the sender waits on an empty queue before re-checking its flags
const SEND_POLL_INTERVAL: Duration = Duration::from_secs(1);
const JOIN_TIMEOUT: Duration = Duration::from_secs(1);
pub const DEFAULT_QUEUE_CAPACITY: usize = 1000;

#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("failed to connect to {addr}: {source}")]
    Connect { addr: String, source: io::Error },

    #[error("connection to {addr} timed out after {after:?}")]
    Timeout { addr: String, after: Duration },

    #[error("connection is closed")]
    NotConnected,

    #[error("outbound queue is full")]
    QueueFull,

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Events surfaced by the receiver task, in stream order
#[derive(Debug, Clone)]
pub enum TransportEvent {
    Message(Envelope),
    /// The stream was lost. Not emitted for a local [`Connection::stop`].
    Disconnected { reason: String },
}

/// I/O counters for one connection
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TransportStats {
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub messages_sent: u64,
    pub messages_received: u64,
    pub errors: u64,
    /// Unix time of the last completed read or write
    pub last_activity: f64,
    pub connected_at: f64,
}

impl TransportStats {
    fn started_now() -> Self {
        let now = timestamp_secs();
        Self {
            last_activity: now,
            connected_at: now,
            ..Self::default()
        }
    }

    pub fn uptime(&self) -> Duration {
        Duration::from_secs_f64((timestamp_secs() - self.connected_at).max(0.0))
    }

    pub fn idle_for(&self) -> Duration {
        Duration::from_secs_f64((timestamp_secs() - self.last_activity).max(0.0))
    }
}

/// A started transport: a handle for sending plus the background tasks
pub struct Connection {
    peer: String,
    protocol: Arc<Protocol>,
    outbound: mpsc::Sender<Vec<u8>>,
    connected: Arc<AtomicBool>,
    shutdown: watch::Sender<bool>,
    stats: Arc<Mutex<TransportStats>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Connection {
    /// Opens a TCP connection to `addr` and starts its tasks
    pub async fn connect(
        addr: &str,
        connect_timeout: Duration,
        queue_capacity: usize,
        protocol: Arc<Protocol>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<TransportEvent>), ConnectionError> {
        let stream = match timeout(connect_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => {
                return Err(ConnectionError::Connect {
                    addr: addr.to_string(),
                    source,
                })
            }
            Err(_) => {
                return Err(ConnectionError::Timeout {
                    addr: addr.to_string(),
                    after: connect_timeout,
                })
            }
        };
        info!("Connected to {}", addr);
        Self::from_stream(stream, queue_capacity, protocol)
    }

    /// Starts tasks on an already established TCP stream
    pub fn from_stream(
        stream: TcpStream,
        queue_capacity: usize,
        protocol: Arc<Protocol>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<TransportEvent>), ConnectionError> {
        stream.set_nodelay(true)?;
        let peer = stream
            .peer_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        let (reader, writer) = stream.into_split();
        Ok(Self::start(reader, writer, peer, queue_capacity, protocol))
    }

    /// Starts the receiver and sender tasks over any reader/writer pair
    pub fn start<R, W>(
        reader: R,
        writer: W,
        peer: impl Into<String>,
        queue_capacity: usize,
        protocol: Arc<Protocol>,
    ) -> (Self, mpsc::UnboundedReceiver<TransportEvent>)
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let peer = peer.into();
        let (outbound_tx, outbound_rx) = mpsc::channel(queue_capacity.max(1));
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let connected = Arc::new(AtomicBool::new(true));
        let stats = Arc::new(Mutex::new(TransportStats::started_now()));

        let receiver = tokio::spawn(receive_loop(
            reader,
            peer.clone(),
            events_tx,
            Arc::clone(&connected),
            Arc::clone(&stats),
            shutdown_rx.clone(),
        ));
        let sender = tokio::spawn(send_loop(
            writer,
            peer.clone(),
            outbound_rx,
            Arc::clone(&connected),
            Arc::clone(&stats),
            shutdown_rx,
        ));

        let connection = Self {
            peer,
            protocol,
            outbound: outbound_tx,
            connected,
            shutdown: shutdown_tx,
            stats,
            tasks: Mutex::new(vec![receiver, sender]),
        };
        (connection, events_rx)
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub fn protocol(&self) -> &Arc<Protocol> {
        &self.protocol
    }

    pub fn is_alive(&self) -> bool {
        self.connected.load(Ordering::SeqCst) && !*self.shutdown.borrow()
    }

    /// Queues an already packed frame
    pub fn send_frame(&self, frame: Vec<u8>) -> Result<(), ConnectionError> {
        if !self.is_alive() {
            return Err(ConnectionError::NotConnected);
        }
        self.outbound.try_send(frame).map_err(|e| match e {
            TrySendError::Full(_) => ConnectionError::QueueFull,
            TrySendError::Closed(_) => ConnectionError::NotConnected,
        })
    }

    /// Packs and queues a message
    pub fn send_message(
        &self,
        message_type: MessageType,
        data: Map<String, Value>,
        player_id: Option<&str>,
    ) -> Result<(), ConnectionError> {
        let frame = self.protocol.pack_message(message_type, data, player_id)?;
        self.send_frame(frame)
    }

    pub fn send_action(&self, action: &Action) -> Result<(), ConnectionError> {
        let frame = self.protocol.action(action)?;
        self.send_frame(frame)
    }

    pub async fn stats(&self) -> TransportStats {
        self.stats.lock().await.clone()
    }

    /// Signals both tasks to stop and waits up to a second for each
    pub async fn stop(&self) {
        let _ = self.shutdown.send(true);

        let handles: Vec<JoinHandle<()>> = self.tasks.lock().await.drain(..).collect();
        for mut handle in handles {
            if timeout(JOIN_TIMEOUT, &mut handle).await.is_err() {
                warn!("Transport task for {} did not stop in time, aborting", self.peer);
                handle.abort();
            }
        }

        self.connected.store(false, Ordering::SeqCst);
        debug!("Connection to {} stopped", self.peer);
    }
}

async fn receive_loop<R>(
    mut reader: R,
    peer: String,
    events: mpsc::UnboundedSender<TransportEvent>,
    connected: Arc<AtomicBool>,
    stats: Arc<Mutex<TransportStats>>,
    mut shutdown: watch::Receiver<bool>,
) where
    R: AsyncRead + Unpin,
{
    let mut buffer = [0u8; READ_BUFFER_SIZE];
    let mut decoder = FrameDecoder::new();

    let lost = loop {
        if *shutdown.borrow() || !connected.load(Ordering::SeqCst) {
            break None;
        }

        let read = tokio::select! {
            _ = shutdown.changed() => break None,
            read = reader.read(&mut buffer) => read,
        };

        let len = match read {
            Ok(0) => break Some("Connection closed by remote".to_string()),
            Ok(len) => len,
            Err(e) => {
                stats.lock().await.errors += 1;
                break Some(format!("Receive error: {e}"));
            }
        };

        stats.lock().await.bytes_received += len as u64;
        decoder.push(&buffer[..len]);

        loop {
            match decoder.next_frame() {
                Ok(Some(envelope)) => {
                    {
                        let mut stats = stats.lock().await;
                        stats.messages_received += 1;
                        stats.last_activity = timestamp_secs();
                    }
                    if events.send(TransportEvent::Message(envelope)).is_err() {
                        debug!("Event receiver for {} dropped", peer);
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!("Discarding receive buffer from {}: {}", peer, e);
                    stats.lock().await.errors += 1;
                    break;
                }
            }
        }
    };

    connected.store(false, Ordering::SeqCst);
    if let Some(reason) = lost {
        info!("Connection to {} lost: {}", peer, reason);
        let _ = events.send(TransportEvent::Disconnected { reason });
    }
}

async fn write_frame<W>(writer: &mut W, frame: &[u8]) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(frame).await?;
    writer.flush().await
}

async fn record_write(stats: &Mutex<TransportStats>, len: usize) {
    let mut stats = stats.lock().await;
    stats.bytes_sent += len as u64;
    stats.messages_sent += 1;
    stats.last_activity = timestamp_secs();
}

async fn send_loop<W>(
    mut writer: W,
    peer: String,
    mut outbound: mpsc::Receiver<Vec<u8>>,
    connected: Arc<AtomicBool>,
    stats: Arc<Mutex<TransportStats>>,
    mut shutdown: watch::Receiver<bool>,
) where
    W: AsyncWrite + Unpin,
{
    loop {
        if *shutdown.borrow() || !connected.load(Ordering::SeqCst) {
            break;
        }

        let frame = tokio::select! {
            _ = shutdown.changed() => break,
            next = timeout(SEND_POLL_INTERVAL, outbound.recv()) => match next {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(_) => continue,
            },
        };

        match write_frame(&mut writer, &frame).await {
            Ok(()) => record_write(&stats, frame.len()).await,
            Err(e) => {
                error!("Send error to {}: {}", peer, e);
                stats.lock().await.errors += 1;
            }
        }
    }

    // Flush whatever was queued before a local stop, e.g. a DISCONNECT
    if connected.load(Ordering::SeqCst) {
        while let Ok(frame) = outbound.try_recv() {
            if write_frame(&mut writer, &frame).await.is_err() {
                break;
            }
            record_write(&stats, frame.len()).await;
        }
    }
    let _ = writer.shutdown().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::ActionKind;
    use crate::protocol::unpack_payload;
    use tokio::io::{duplex, split};

    async fn next_event(events: &mut mpsc::UnboundedReceiver<TransportEvent>) -> TransportEvent {
        timeout(Duration::from_secs(2), events.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event channel closed")
    }

    #[tokio::test]
    async fn test_receiver_reassembles_split_reads() {
        let protocol = Arc::new(Protocol::new());
        let frame = protocol.ping().unwrap();

        let reader = tokio_test::io::Builder::new()
            .read(&frame[..4])
            .read(&frame[4..9])
            .read(&frame[9..])
            .build();

        let (connection, mut events) =
            Connection::start(reader, tokio::io::sink(), "mock", 8, Arc::clone(&protocol));

        match next_event(&mut events).await {
            TransportEvent::Message(envelope) => {
                assert_eq!(envelope.message_type, MessageType::Ping)
            }
            other => panic!("expected message, got {:?}", other),
        }
        match next_event(&mut events).await {
            TransportEvent::Disconnected { reason } => {
                assert_eq!(reason, "Connection closed by remote")
            }
            other => panic!("expected disconnect, got {:?}", other),
        }

        assert!(!connection.is_alive());
        let stats = connection.stats().await;
        assert_eq!(stats.messages_received, 1);
        assert_eq!(stats.bytes_received, frame.len() as u64);
        connection.stop().await;
    }

    #[tokio::test]
    async fn test_sender_preserves_order() {
        let protocol = Arc::new(Protocol::new());
        let (local, remote) = duplex(64 * 1024);
        let (reader, writer) = split(local);
        let (connection, _events) =
            Connection::start(reader, writer, "duplex", 16, Arc::clone(&protocol));

        for i in 0..3 {
            let action = Action::with_identity(format!("a{i}"), "p1", 0.0, ActionKind::Stop);
            connection.send_action(&action).unwrap();
        }

        let (mut remote_reader, _remote_writer) = split(remote);
        let mut decoder = FrameDecoder::new();
        let mut ids = Vec::new();
        let mut buffer = [0u8; 1024];
        while ids.len() < 3 {
            let len = timeout(Duration::from_secs(2), remote_reader.read(&mut buffer))
                .await
                .unwrap()
                .unwrap();
            decoder.push(&buffer[..len]);
            while let Some(payload) = decoder.next_payload().unwrap() {
                let envelope = unpack_payload(&payload).unwrap();
                ids.push(envelope.to_action().unwrap().action_id().to_string());
            }
        }
        assert_eq!(ids, vec!["a0", "a1", "a2"]);

        connection.stop().await;
        assert_eq!(connection.stats().await.messages_sent, 3);
    }

    #[tokio::test]
    async fn test_full_queue_rejects_send() {
        let protocol = Arc::new(Protocol::new());
        let (local, _remote) = duplex(1);
        let (reader, writer) = split(local);
        let (connection, _events) = Connection::start(reader, writer, "slow", 1, protocol);

        let results: Vec<_> = (0..5)
            .map(|_| connection.send_message(MessageType::Ping, Map::new(), None))
            .collect();
        assert!(results
            .iter()
            .any(|r| matches!(r, Err(ConnectionError::QueueFull))));

        connection.stop().await;
    }

    #[tokio::test]
    async fn test_send_after_stop_fails() {
        let protocol = Arc::new(Protocol::new());
        let (local, _remote) = duplex(1024);
        let (reader, writer) = split(local);
        let (connection, mut events) = Connection::start(reader, writer, "local", 4, protocol);

        connection.stop().await;
        assert!(!connection.is_alive());
        assert!(matches!(
            connection.send_message(MessageType::Ping, Map::new(), None),
            Err(ConnectionError::NotConnected)
        ));
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_peer_close_is_reported() {
        let protocol = Arc::new(Protocol::new());
        let (local, remote) = duplex(1024);
        let (reader, writer) = split(local);
        let (connection, mut events) = Connection::start(reader, writer, "peer", 4, protocol);

        drop(remote);
        assert!(matches!(
            next_event(&mut events).await,
            TransportEvent::Disconnected { .. }
        ));
        assert!(!connection.is_alive());
        connection.stop().await;
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let result = Connection::connect(
            &addr,
            Duration::from_secs(1),
            DEFAULT_QUEUE_CAPACITY,
            Arc::new(Protocol::new()),
        )
        .await;
        assert!(matches!(
            result,
            Err(ConnectionError::Connect { .. }) | Err(ConnectionError::Timeout { .. })
        ));
    }
}
