use clap::Parser;
use client::{Client, ClientConfig, ClientEvent, ReconnectPolicy};
use log::{error, info, warn};
use serde_json::{Map, Value};
use shared::{Action, ActionKind};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Name sent with the connect request
    #[arg(short, long, default_value = "player")]
    name: String,

    /// Connection timeout in seconds
    #[arg(long, default_value = "5")]
    connect_timeout: u64,

    /// Seconds between pings
    #[arg(long, default_value = "5")]
    ping_interval: u64,

    /// Maximum reconnection attempts after an unexpected disconnect
    #[arg(long, default_value = "5")]
    reconnect_attempts: u32,

    /// Disable automatic reconnection
    #[arg(long)]
    no_reconnect: bool,
}

impl Args {
    fn into_config(self) -> ClientConfig {
        let reconnect = ReconnectPolicy {
            enabled: !self.no_reconnect,
            max_attempts: self.reconnect_attempts,
            ..ReconnectPolicy::default()
        };
        ClientConfig {
            host: self.host,
            port: self.port,
            player_name: self.name,
            connect_timeout: Duration::from_secs(self.connect_timeout),
            ping_interval: Duration::from_secs(self.ping_interval),
            reconnect,
            ..ClientConfig::default()
        }
    }
}

/// Parses one stdin line. A full serialized action keeps its id and
/// timestamp; a bare payload such as `{"action_type": "stop"}` gets fresh ones.
fn parse_action(line: &str) -> Result<Action, Box<dyn std::error::Error>> {
    let data: Map<String, Value> = serde_json::from_str(line)?;
    if data.contains_key("action_id") {
        return Ok(Action::from_serializable_data(&data)?);
    }
    let kind: ActionKind = serde_json::from_value(Value::Object(data))?;
    Ok(Action::new("", kind))
}

fn report(event: ClientEvent) {
    match event {
        ClientEvent::ActionResult { action_id, result } => {
            info!("{} -> {:?}: {}", action_id, result.result, result.message)
        }
        ClientEvent::RemoteAction(action) => info!("Remote action: {}", action),
        ClientEvent::ServerError { code, message } => warn!("Server error {}: {}", code, message),
        ClientEvent::Disconnected { reason } => warn!("Disconnected: {}", reason),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let config = Args::parse().into_config();
    info!("Connecting to {}", config.address());

    let mut client = Client::connect(config).await?;
    if let Some(player_id) = client.player_id().await {
        info!("Playing as {}", player_id);
    }
    info!("Enter one action per line as JSON, e.g. {{\"action_type\": \"jump\", \"jump_strength\": 1.0}}");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match parse_action(line) {
                    Ok(action) => {
                        if let Err(e) = client.send_action(action).await {
                            error!("Failed to send action: {}", e);
                        }
                    }
                    Err(e) => warn!("Invalid action: {}", e),
                }
            }
            event = client.next_event() => match event {
                Some(event) => report(event),
                None => break,
            },
        }
    }

    client.disconnect().await;
    info!("Client stopped");
    Ok(())
}
