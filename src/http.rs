use crate::config::env_or;
use reqwest::Client;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct HttpTimeouts {
    pub request: Duration,
    pub connect: Duration,
}

impl HttpTimeouts {
    pub fn from_env() -> Self {
        Self {
            request: Duration::from_secs(env_or("HTTP_TIMEOUT_SECS", 30)),
            connect: Duration::from_secs(env_or("HTTP_CONNECT_TIMEOUT_SECS", 5)),
        }
    }
}

/// Outbound client for AI providers; generation calls run longer than the
/// usual API round trip, hence the wider default request timeout.
pub fn build_client() -> Client {
    let timeouts = HttpTimeouts::from_env();
    Client::builder()
        .timeout(timeouts.request)
        .connect_timeout(timeouts.connect)
        .build()
        .unwrap_or_else(|_| Client::new())
}
