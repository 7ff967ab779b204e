use std::sync::Arc;
use std::time::Duration;

use crate::config::AppConfig;
use crate::error::GatewayError;
use crate::observability::Tokenizer;
use crate::providers::{QwenClient, ZaiClient};

/// Shared application state accessible to all handlers.
pub struct AppState {
    pub config: AppConfig,
    pub http: reqwest::Client,
    pub tokenizer: Arc<Tokenizer>,
    pub zai: ZaiClient,
    pub qwen: QwenClient,
}

impl AppState {
    /// Build shared state from validated configuration.
    ///
    /// Chat responses stream for an unbounded time, so the shared client
    /// bounds only connection setup, never the full request.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Config`] when the HTTP client cannot be built.
    pub fn new(config: AppConfig) -> Result<Self, GatewayError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|err| GatewayError::Config(format!("http client: {err}")))?;

        Ok(Self {
            config,
            http,
            tokenizer: Arc::new(Tokenizer::new()),
            zai: ZaiClient::new(),
            qwen: QwenClient::new(),
        })
    }
}
