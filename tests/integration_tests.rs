//! Integration tests for networked multiplayer components
//!
//! These tests run a real server on an ephemeral port and drive it with real
//! clients over TCP.

use client::{Client, ClientConfig, ClientEvent, ConnectionState, ReconnectPolicy};
use server::{Server, ServerConfig, ServerHandle};
use shared::protocol::{unpack_payload, FrameDecoder};
use shared::{Action, ActionKind, ActionResult, ActionType, ConnectionError, MessageType, Protocol};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};

const WAIT: Duration = Duration::from_secs(3);

async fn start_server(config: ServerConfig) -> (SocketAddr, ServerHandle, JoinHandle<()>) {
    let mut server = Server::bind(ServerConfig {
        port: 0,
        tick_duration: Duration::from_millis(10),
        ..config
    })
    .await
    .expect("Failed to bind server");
    let addr = server.local_addr();
    let handle = server.handle();
    let task = tokio::spawn(async move {
        server.run().await.expect("Server loop failed");
    });
    (addr, handle, task)
}

fn client_config(addr: SocketAddr, name: &str) -> ClientConfig {
    ClientConfig {
        host: addr.ip().to_string(),
        port: addr.port(),
        player_name: name.to_string(),
        reconnect: ReconnectPolicy::disabled(),
        ..ClientConfig::default()
    }
}

async fn stop_server(handle: ServerHandle, task: JoinHandle<()>) {
    handle.shutdown();
    timeout(WAIT, task)
        .await
        .expect("Server did not stop")
        .unwrap();
}

/// CLIENT AND SERVER SESSION TESTS
mod session_tests {
    use super::*;

    /// Crafting goes through the server pipeline and the client registry
    /// records the authoritative result
    #[tokio::test]
    async fn craft_result_reaches_client() {
        let (addr, handle, task) = start_server(ServerConfig::default()).await;
        let mut client = Client::connect(client_config(addr, "alice")).await.unwrap();

        assert_eq!(client.manager().state().await, ConnectionState::Authenticated);
        assert_eq!(client.player_id().await.as_deref(), Some("player_1"));

        let craft = Action::new(
            "",
            ActionKind::CraftItem {
                recipe_id: "wooden_pickaxe".to_string(),
                quantity: 1,
            },
        );
        let action_id = client.send_action(craft).await.unwrap();

        let result = client.wait_for_result(&action_id, WAIT).await.unwrap();
        assert_eq!(result.result, ActionResult::Success);
        assert!(client.action_result(&action_id).await.unwrap().is_success());

        client.disconnect().await;
        stop_server(handle, task).await;
    }

    /// A place request out of reach of the server-side player is refused,
    /// whatever the client believes about its own position
    #[tokio::test]
    async fn out_of_reach_place_is_rejected() {
        let (cx, cy) = shared::tile_center(3, 3);
        let config = ServerConfig {
            spawn_point: (cx + 500.0, cy),
            ..ServerConfig::default()
        };
        let (addr, handle, task) = start_server(config).await;
        let mut client = Client::connect(client_config(addr, "alice")).await.unwrap();

        let place = Action::new(
            "",
            ActionKind::PlaceBlock {
                x: 3,
                y: 3,
                block_id: 7,
            },
        );
        let action_id = client.send_action(place).await.unwrap();

        let result = client.wait_for_result(&action_id, WAIT).await.unwrap();
        assert_eq!(result.result, ActionResult::Invalid);

        client.disconnect().await;
        stop_server(handle, task).await;
    }

    /// A successful world change is replicated to other players but not
    /// echoed back to its author
    #[tokio::test]
    async fn world_changes_are_broadcast() {
        let (addr, handle, task) = start_server(ServerConfig::default()).await;
        let mut alice = Client::connect(client_config(addr, "alice")).await.unwrap();
        let mut bob = Client::connect(client_config(addr, "bob")).await.unwrap();

        let place = Action::new(
            "",
            ActionKind::PlaceBlock {
                x: 1,
                y: 0,
                block_id: 7,
            },
        );
        let action_id = alice.send_action(place).await.unwrap();
        let result = alice.wait_for_result(&action_id, WAIT).await.unwrap();
        assert_eq!(result.result, ActionResult::Success);

        let replicated = timeout(WAIT, async {
            loop {
                match bob.next_event().await {
                    Some(ClientEvent::RemoteAction(action)) => return action,
                    Some(_) => continue,
                    None => panic!("Event stream closed"),
                }
            }
        })
        .await
        .expect("No replicated action received");

        assert_eq!(replicated.action_id(), action_id);
        assert_eq!(replicated.player_id(), "player_1");
        assert_eq!(replicated.action_type(), ActionType::PlaceBlock);

        alice.disconnect().await;
        bob.disconnect().await;
        stop_server(handle, task).await;
    }

    #[tokio::test]
    async fn full_server_rejects_client() {
        let config = ServerConfig {
            max_clients: 1,
            ..ServerConfig::default()
        };
        let (addr, handle, task) = start_server(config).await;
        let first = Client::connect(client_config(addr, "alice")).await.unwrap();

        match Client::connect(client_config(addr, "bob")).await {
            Err(ConnectionError::Authentication(message)) => assert_eq!(message, "Server full"),
            Err(other) => panic!("Unexpected error: {}", other),
            Ok(_) => panic!("Second client should have been rejected"),
        }

        first.disconnect().await;
        stop_server(handle, task).await;
    }

    /// Slots freed by a disconnect are reusable
    #[tokio::test]
    async fn disconnect_frees_slot() {
        let config = ServerConfig {
            max_clients: 1,
            ..ServerConfig::default()
        };
        let (addr, handle, task) = start_server(config).await;

        let first = Client::connect(client_config(addr, "alice")).await.unwrap();
        first.disconnect().await;
        sleep(Duration::from_millis(100)).await;

        let second = Client::connect(client_config(addr, "bob")).await.unwrap();
        assert_eq!(second.player_id().await.as_deref(), Some("player_2"));

        second.disconnect().await;
        stop_server(handle, task).await;
    }

    #[tokio::test]
    async fn connect_to_closed_port_fails() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let config = ClientConfig {
            connect_timeout: Duration::from_millis(500),
            ..client_config(addr, "alice")
        };
        assert!(Client::connect(config).await.is_err());
    }
}

/// WIRE FORMAT TESTS
mod wire_tests {
    use super::*;

    async fn read_envelope(stream: &mut TcpStream, decoder: &mut FrameDecoder) -> shared::Envelope {
        let mut buffer = [0u8; 4096];
        loop {
            if let Some(payload) = decoder.next_payload().unwrap() {
                return unpack_payload(&payload).unwrap();
            }
            let len = timeout(WAIT, stream.read(&mut buffer))
                .await
                .expect("Timed out reading from server")
                .unwrap();
            assert!(len > 0, "Server closed the connection");
            decoder.push(&buffer[..len]);
        }
    }

    /// A frame split across writes is reassembled by the server
    #[tokio::test]
    async fn split_frame_is_reassembled() {
        let (addr, handle, task) = start_server(ServerConfig::default()).await;
        let protocol = Protocol::new();
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let mut decoder = FrameDecoder::new();

        let frame = protocol.connect("alice").unwrap();
        let (head, tail) = frame.split_at(3);
        stream.write_all(head).await.unwrap();
        stream.flush().await.unwrap();
        sleep(Duration::from_millis(50)).await;
        stream.write_all(tail).await.unwrap();

        let response = read_envelope(&mut stream, &mut decoder).await;
        assert_eq!(response.message_type, MessageType::ConnectResponse);
        assert_eq!(response.bool_field("success"), Some(true));
        assert_eq!(
            response.data["server_info"]["protocol_version"],
            shared::protocol::PROTOCOL_VERSION
        );

        stop_server(handle, task).await;
    }

    /// Two frames in one write are both handled, in order
    #[tokio::test]
    async fn coalesced_frames_are_handled_in_order() {
        let (addr, handle, task) = start_server(ServerConfig::default()).await;
        let protocol = Protocol::new();
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let mut decoder = FrameDecoder::new();

        let mut bytes = protocol.connect("alice").unwrap();
        bytes.extend(protocol.ping().unwrap());
        stream.write_all(&bytes).await.unwrap();

        let first = read_envelope(&mut stream, &mut decoder).await;
        let second = read_envelope(&mut stream, &mut decoder).await;
        assert_eq!(first.message_type, MessageType::ConnectResponse);
        assert_eq!(second.message_type, MessageType::Pong);

        stop_server(handle, task).await;
    }

    #[tokio::test]
    async fn malformed_action_reports_error() {
        let (addr, handle, task) = start_server(ServerConfig::default()).await;
        let protocol = Protocol::new();
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let mut decoder = FrameDecoder::new();

        stream.write_all(&protocol.connect("alice").unwrap()).await.unwrap();
        read_envelope(&mut stream, &mut decoder).await;

        // Action message whose payload lacks every required field
        let frame = protocol
            .pack_message(
                MessageType::Action(ActionType::Jump),
                serde_json::Map::new(),
                None,
            )
            .unwrap();
        stream.write_all(&frame).await.unwrap();

        let reply = read_envelope(&mut stream, &mut decoder).await;
        assert_eq!(reply.message_type, MessageType::Error);
        assert_eq!(reply.str_field("error_code"), Some("invalid_action"));

        stop_server(handle, task).await;
    }
}
