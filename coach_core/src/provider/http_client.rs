//! HTTP client construction for provider streaming calls
//!
//! Streaming responses have no predictable total duration, so the client sets
//! no overall request timeout. Instead a read timeout bounds the silence
//! between two chunks of the body.

use reqwest::Client;
use std::time::Duration;

/// Configuration for the streaming HTTP client
#[derive(Debug, Clone)]
pub struct StreamingClientConfig {
    /// Time allowed to establish a connection (default: 30 seconds)
    pub connect_timeout: Duration,
    /// Longest gap between two body reads (default: 30 seconds)
    pub read_timeout: Duration,
    /// Pool idle timeout (default: 90 seconds)
    pub pool_idle_timeout: Duration,
    /// TCP keep-alive (default: 60 seconds)
    pub tcp_keepalive: Duration,
}

impl Default for StreamingClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            read_timeout: Duration::from_secs(30),
            pool_idle_timeout: Duration::from_secs(90),
            tcp_keepalive: Duration::from_secs(60),
        }
    }
}

pub fn create_streaming_client(config: &StreamingClientConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .connect_timeout(config.connect_timeout)
        .read_timeout(config.read_timeout)
        .pool_idle_timeout(config.pool_idle_timeout)
        .pool_max_idle_per_host(4)
        .tcp_keepalive(config.tcp_keepalive)
        .user_agent(format!("interview-coach/{}", env!("CARGO_PKG_VERSION")))
        .build()
}
