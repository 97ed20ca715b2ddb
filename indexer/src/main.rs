use anyhow::Result;
use clap::Parser;
use log::{error, info};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use medchain_index_indexer::config::IndexerConfig;
use medchain_index_indexer::keys::KeyLayout;
use medchain_index_indexer::ledger::HttpLedgerClient;
use medchain_index_indexer::payload::{MemoryBlobStore, PlaintextDecryptor};
use medchain_index_indexer::service::IndexService;
use medchain_index_indexer::store::{IndexStore, MemoryStore, RedisStore};

#[derive(Parser, Debug)]
#[clap(author, version, about = "MedChain ledger indexer")]
struct Args {
    /// Config file path
    #[clap(short, long, env = "MEDCHAIN_CONFIG")]
    config: Option<String>,

    /// Redis URL of the index store
    #[clap(long, env = "MEDCHAIN_REDIS_URL")]
    redis_url: Option<String>,

    /// Base URL of the ledger gateway
    #[clap(long, env = "MEDCHAIN_LEDGER_URL")]
    ledger_url: Option<String>,

    /// Log level filter
    #[clap(long, env = "MEDCHAIN_LOG_LEVEL")]
    log_level: Option<String>,

    /// Keep the index in process memory instead of Redis
    #[clap(long)]
    memory_store: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Parse command-line arguments
    let args = Args::parse();

    // Load configuration
    let mut config = IndexerConfig::load(args.config.as_deref())?;

    // Override config with command-line arguments
    if let Some(redis_url) = args.redis_url {
        config.redis.url = redis_url;
    }
    if let Some(ledger_url) = args.ledger_url {
        config.ledger.gateway_url = ledger_url;
    }
    if let Some(log_level) = args.log_level {
        config.log_level = log_level;
    }
    if args.memory_store {
        config.memory_store = true;
    }
    config.validate()?;

    // Initialize logging
    env_logger::init_from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, config.log_level.as_str()),
    );

    let store: Arc<dyn IndexStore> = if config.memory_store {
        info!("Using in-memory index store");
        Arc::new(MemoryStore::new())
    } else {
        info!("Connecting to index store at {}", config.redis.url);
        Arc::new(RedisStore::connect(&config.redis).await?)
    };

    let ledger = Arc::new(HttpLedgerClient::new(&config.ledger));
    info!("Ledger gateway: {}", config.ledger.gateway_url);

    // Payload collaborators are supplied by the embedding HTTP service
    let service = IndexService::new(
        store,
        KeyLayout::new(config.redis.key_prefix.clone()),
        ledger,
        Arc::new(MemoryBlobStore::new()),
        Arc::new(PlaintextDecryptor),
    );

    let listener = service.block_listener(config.listener.clone());
    let cancel = CancellationToken::new();
    let mut listener_task = tokio::spawn({
        let cancel = cancel.clone();
        async move { listener.run(cancel).await }
    });

    // Wait for Ctrl+C or the listener giving up
    let finished = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!("Shutdown requested");
            cancel.cancel();
            None
        }
        outcome = &mut listener_task => Some(outcome?),
    };
    let outcome = match finished {
        Some(outcome) => outcome,
        None => listener_task.await?,
    };

    match outcome {
        Ok(indexed) => info!("Indexer stopped after {} blocks", indexed),
        Err(e) => {
            error!("Block listener failed: {}", e);
            return Err(e.into());
        }
    }

    Ok(())
}
