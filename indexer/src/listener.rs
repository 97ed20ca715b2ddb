//! Block listener
//!
//! Feeds committed blocks to the index builder one at a time. When the
//! block stream closes the listener waits, then resubscribes from the latest
//! block; blocks committed in between are not replayed.

use log::{error, info, warn};
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::builder::IndexBuilder;
use crate::config::ListenerConfig;
use crate::error::{IndexerError, Result};
use crate::ledger::{BlockEvent, BlockStream, LedgerClient, StartPosition};

/// Lifecycle state of the listener
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    /// Not yet subscribed
    Starting,
    /// Consuming a live block stream
    Subscribed,
    /// Waiting to resubscribe after the stream closed
    Reconnecting {
        /// One-based attempt number
        attempt: u32,
    },
    /// No longer indexing
    Stopped,
}

/// Subscribes to the ledger and indexes every delivered block
pub struct BlockListener {
    ledger: Arc<dyn LedgerClient>,
    builder: Arc<IndexBuilder>,
    config: ListenerConfig,
    state: watch::Sender<ListenerState>,
}

impl BlockListener {
    /// Create a new listener
    pub fn new(ledger: Arc<dyn LedgerClient>, builder: Arc<IndexBuilder>, config: ListenerConfig) -> Self {
        let (state, _) = watch::channel(ListenerState::Starting);
        Self {
            ledger,
            builder,
            config,
            state,
        }
    }

    /// Watch state transitions
    pub fn state(&self) -> watch::Receiver<ListenerState> {
        self.state.subscribe()
    }

    fn set_state(&self, state: ListenerState) {
        self.state.send_replace(state);
    }

    /// Run until cancelled or until resubscription fails.
    ///
    /// Returns the number of blocks indexed. A failed initial subscription
    /// is returned as an error.
    pub async fn run(&self, cancel: CancellationToken) -> Result<u64> {
        let start = self.config.start_position()?;
        let mut stream = match self.ledger.subscribe_blocks(start).await {
            Ok(stream) => stream,
            Err(e) => {
                self.set_state(ListenerState::Stopped);
                return Err(IndexerError::Subscription(format!("Failed to subscribe to blocks: {}", e)));
            }
        };
        self.set_state(ListenerState::Subscribed);
        info!("Start listening to ledger blocks from {:?}", start);

        let mut indexed = 0u64;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Block listener cancelled after {} blocks", indexed);
                    self.set_state(ListenerState::Stopped);
                    return Ok(indexed);
                }
                event = stream.recv() => match event {
                    Some(BlockEvent::Block(block)) => {
                        // Failures are logged by the builder; the block is not retried
                        if self.builder.index_block(&block).await.is_ok() {
                            indexed += 1;
                        }
                    }
                    Some(BlockEvent::Malformed(reason)) => {
                        warn!("Invalid block payload, skipping: {}", reason);
                    }
                    None => {
                        warn!("Block channel closed, attempting reconnect...");
                        match self.reconnect(&cancel).await? {
                            Some(next) => stream = next,
                            None => {
                                self.set_state(ListenerState::Stopped);
                                return Ok(indexed);
                            }
                        }
                    }
                }
            }
        }
    }

    /// Resubscribe from the latest block; `None` when cancelled while waiting
    async fn reconnect(&self, cancel: &CancellationToken) -> Result<Option<BlockStream>> {
        let attempts = self.config.max_reconnect_attempts.max(1);

        for attempt in 1..=attempts {
            self.set_state(ListenerState::Reconnecting { attempt });

            tokio::select! {
                _ = cancel.cancelled() => return Ok(None),
                _ = tokio::time::sleep(self.config.reconnect_delay()) => {}
            }

            match self.ledger.subscribe_blocks(StartPosition::Latest).await {
                Ok(stream) => {
                    info!("Reconnected to block subscription");
                    self.set_state(ListenerState::Subscribed);
                    return Ok(Some(stream));
                }
                Err(e) => warn!("Reconnect attempt {}/{} failed: {}", attempt, attempts, e),
            }
        }

        error!("Failed to reconnect after {} attempts, block listener stopped", attempts);
        self.set_state(ListenerState::Stopped);
        Err(IndexerError::Subscription(format!("gave up after {} reconnect attempts", attempts)))
    }
}
