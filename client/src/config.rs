use rand::Rng;
use std::time::Duration;

/// How the connection manager retries after an unexpected disconnect
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    pub enabled: bool,
    pub max_attempts: u32,
    /// Seconds before the first attempt
    pub initial_delay: f64,
    pub max_delay: f64,
    pub backoff_multiplier: f64,
    /// Scale each delay by a random factor in [0.5, 1.0]
    pub jitter: bool,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 5,
            initial_delay: 1.0,
            max_delay: 30.0,
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl ReconnectPolicy {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Backoff delay in seconds for a 1-based attempt number, before jitter
    pub fn base_delay(&self, attempt: u32) -> f64 {
        let exponent = attempt.saturating_sub(1) as i32;
        let delay = self.initial_delay * self.backoff_multiplier.powi(exponent);
        delay.min(self.max_delay).max(0.0)
    }

    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let mut delay = self.base_delay(attempt);
        if self.jitter {
            delay *= rand::thread_rng().gen_range(0.5..=1.0);
        }
        Duration::try_from_secs_f64(delay).unwrap_or(Duration::ZERO)
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    pub player_name: String,
    pub connect_timeout: Duration,
    /// Bound on the wait for CONNECT_RESPONSE
    pub auth_timeout: Duration,
    pub ping_interval: Duration,
    pub health_check_interval: Duration,
    /// Silence longer than this is treated as a lost connection
    pub timeout_threshold: Duration,
    pub queue_capacity: usize,
    pub reconnect: ReconnectPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            player_name: "player".to_string(),
            connect_timeout: Duration::from_secs(5),
            auth_timeout: Duration::from_secs(5),
            ping_interval: Duration::from_secs(5),
            health_check_interval: Duration::from_secs(5),
            timeout_threshold: Duration::from_secs(10),
            queue_capacity: shared::connection::DEFAULT_QUEUE_CAPACITY,
            reconnect: ReconnectPolicy::default(),
        }
    }
}

impl ClientConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
