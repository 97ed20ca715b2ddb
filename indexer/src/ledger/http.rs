//! Ledger client over a REST gateway
//!
//! The gateway exposes committed blocks by height and transactions by id.
//! Subscriptions are emulated by polling the next height.

use async_trait::async_trait;
use log::{debug, info, warn};
use reqwest::{Client, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::mpsc;

use medchain_index_core::models::{Block, Transaction};

use super::{BlockEvent, BlockStream, LedgerClient, StartPosition};
use crate::config::LedgerConfig;
use crate::error::{IndexerError, Result};

/// Buffered blocks per subscription
const SUBSCRIPTION_BUFFER: usize = 64;

/// Response for the latest height endpoint
#[derive(Debug, Deserialize)]
struct HeightResponse {
    height: u64,
}

/// API response wrapper
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ApiResponse<T> {
    Success(T),
    Error { error: String },
}

/// Client for a ledger REST gateway
#[derive(Debug, Clone)]
pub struct HttpLedgerClient {
    /// Base URL of the gateway
    base_url: String,

    /// HTTP client for making requests
    client: Client,

    /// Timeout for requests
    timeout: Duration,

    /// Delay between polls for the next block
    poll_interval: Duration,
}

impl HttpLedgerClient {
    /// Create a new ledger client
    pub fn new(config: &LedgerConfig) -> Self {
        Self {
            base_url: config.gateway_url.trim_end_matches('/').to_string(),
            client: Client::new(),
            timeout: config.request_timeout(),
            poll_interval: config.poll_interval(),
        }
    }

    fn block_url(&self, height: u64) -> String {
        format!("{}/api/v1/blocks/{}", self.base_url, height)
    }

    /// Transaction ids are percent-encoded as a single path segment
    fn transaction_url(&self, tx_id: &str) -> Result<Url> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| IndexerError::Ledger(format!("Invalid gateway URL {}: {}", self.base_url, e)))?;
        url.path_segments_mut()
            .map_err(|_| IndexerError::Ledger(format!("Gateway URL {} cannot carry a path", self.base_url)))?
            .pop_if_empty()
            .extend(&["api", "v1", "transactions", tx_id]);
        Ok(url)
    }

    fn latest_height_url(&self) -> String {
        format!("{}/api/v1/blocks/latest/height", self.base_url)
    }

    /// GET a JSON resource; `None` on 404
    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<Option<T>> {
        debug!("Fetching {}", url);
        let response = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| IndexerError::Ledger(format!("Request to {} failed: {}", url, e)))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            let status = response.status();
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            return Err(IndexerError::Ledger(format!("Gateway error: {} - {}", status, text)));
        }

        let body = response.text().await?;
        match serde_json::from_str::<ApiResponse<T>>(&body)? {
            ApiResponse::Success(data) => Ok(Some(data)),
            ApiResponse::Error { error } => Err(IndexerError::Ledger(format!("Gateway error: {}", error))),
        }
    }

    /// Height of the newest committed block
    pub async fn latest_height(&self) -> Result<u64> {
        let response: Option<HeightResponse> = self.get_json(&self.latest_height_url()).await?;
        response
            .map(|r| r.height)
            .ok_or_else(|| IndexerError::Ledger("Gateway has no committed blocks".to_string()))
    }

    /// Fetch one block; `None` if not committed yet
    pub async fn get_block(&self, height: u64) -> Result<Option<Block>> {
        self.get_json(&self.block_url(height)).await
    }

    async fn poll_blocks(self, mut height: u64, sender: mpsc::Sender<BlockEvent>) {
        loop {
            let event = match self.get_block(height).await {
                Ok(Some(block)) => BlockEvent::Block(block),
                Ok(None) => {
                    tokio::time::sleep(self.poll_interval).await;
                    continue;
                }
                // Undecodable payloads are reported and stepped over
                Err(IndexerError::Json(e)) => BlockEvent::Malformed(format!("block {}: {}", height, e)),
                Err(e) => {
                    warn!("Block polling stopped at height {}: {}", height, e);
                    return;
                }
            };

            if sender.send(event).await.is_err() {
                debug!("Block subscription dropped by receiver");
                return;
            }
            height += 1;
        }
    }
}

#[async_trait]
impl LedgerClient for HttpLedgerClient {
    async fn subscribe_blocks(&self, start: StartPosition) -> Result<BlockStream> {
        let height = match start {
            StartPosition::Latest => self.latest_height().await?,
            StartPosition::Height(height) => height,
        };
        info!("Subscribing to blocks from height {} at {}", height, self.base_url);

        let (sender, receiver) = mpsc::channel(SUBSCRIPTION_BUFFER);
        tokio::spawn(self.clone().poll_blocks(height, sender));
        Ok(receiver)
    }

    async fn get_transaction(&self, tx_id: &str) -> Result<Option<Transaction>> {
        let url = self.transaction_url(tx_id)?;
        self.get_json(url.as_str()).await
    }
}
