use clap::Parser;
use log::info;
use server::{Server, ServerConfig};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Maximum number of connected clients
    #[arg(short, long, default_value = "32")]
    max_clients: usize,

    /// Seconds of silence before a client is dropped
    #[arg(long, default_value = "30")]
    client_timeout: u64,

    /// Tick rate (action batches per second)
    #[arg(short, long, default_value = "20")]
    tick_rate: u32,

    /// Name reported to clients on connect
    #[arg(long, default_value = "craftnet")]
    name: String,
}

impl Args {
    fn into_config(self) -> ServerConfig {
        let tick_rate = self.tick_rate.max(1);
        ServerConfig {
            host: self.host,
            port: self.port,
            max_clients: self.max_clients,
            client_timeout: Duration::from_secs(self.client_timeout),
            tick_duration: Duration::from_secs_f64(1.0 / f64::from(tick_rate)),
            server_name: self.name,
            ..ServerConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let config = Args::parse().into_config();
    info!(
        "Starting server on {} ({} Hz, max {} clients)",
        config.address(),
        (1.0 / config.tick_duration.as_secs_f64()).round(),
        config.max_clients
    );

    let mut server = Server::bind(config).await?;
    let handle = server.handle();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, shutting down gracefully...");
            handle.shutdown();
        }
    });

    server.run().await?;
    Ok(())
}
