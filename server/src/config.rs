use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_clients: usize,
    /// Clients silent for longer than this are dropped
    pub client_timeout: Duration,
    /// Interval at which queued actions are processed
    pub tick_duration: Duration,
    pub queue_capacity: usize,
    pub world_size: u32,
    /// Pixel position new players start at
    pub spawn_point: (f32, f32),
    pub server_name: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            max_clients: 32,
            client_timeout: Duration::from_secs(30),
            tick_duration: Duration::from_millis(50),
            queue_capacity: shared::connection::DEFAULT_QUEUE_CAPACITY,
            world_size: shared::DEFAULT_WORLD_SIZE,
            spawn_point: shared::tile_center(0, 0),
            server_name: "craftnet".to_string(),
        }
    }
}

impl ServerConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
