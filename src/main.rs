use clap::Parser;
use miette::{IntoDiagnostic, Result};
use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;
use webhook_ledger::application::engine::{ReconciliationEngine, StoreSet};
use webhook_ledger::config::AppConfig;
use webhook_ledger::domain::ports::{FeeConfigStoreArc, WalletStoreArc};
use webhook_ledger::infrastructure::in_memory::InMemoryStore;
use webhook_ledger::infrastructure::notifier::TracingNotifier;
use webhook_ledger::interfaces::csv::fee_reader::FeeReader;
use webhook_ledger::interfaces::csv::wallet_reader::WalletReader;
use webhook_ledger::interfaces::http;
use webhook_ledger::logging::init_logging;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// YAML configuration file. Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Listen address, overriding `server.bind`.
    #[arg(long)]
    bind: Option<String>,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Wallets CSV to load at start-up.
    #[arg(long)]
    wallets: Option<PathBuf>,

    /// Fee rules CSV to load at start-up.
    #[arg(long)]
    fees: Option<PathBuf>,

    /// Load configuration and seed files, print a summary and exit.
    #[arg(long)]
    check_config: bool,
}

fn open_stores(db_path: Option<PathBuf>) -> Result<(StoreSet, &'static str)> {
    #[cfg(feature = "storage-rocksdb")]
    if let Some(db_path) = db_path {
        let store = webhook_ledger::infrastructure::rocksdb::RocksDbStore::open(db_path)
            .into_diagnostic()?;
        return Ok((StoreSet::shared(Arc::new(store)), "rocksdb"));
    }

    #[cfg(not(feature = "storage-rocksdb"))]
    if db_path.is_some() {
        eprintln!(
            "WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
        );
    }

    Ok((StoreSet::shared(Arc::new(InMemoryStore::new())), "in-memory"))
}

async fn seed_wallets(path: PathBuf, store: &WalletStoreArc) -> Result<usize> {
    let file = File::open(path).into_diagnostic()?;
    let mut loaded = 0;
    for wallet in WalletReader::new(file).wallets() {
        match wallet {
            Ok(wallet) => {
                store.store(wallet).await.into_diagnostic()?;
                loaded += 1;
            }
            Err(e) => eprintln!("Error reading wallet: {}", e),
        }
    }
    Ok(loaded)
}

async fn seed_fees(path: PathBuf, store: &FeeConfigStoreArc) -> Result<usize> {
    let file = File::open(path).into_diagnostic()?;
    let mut loaded = 0;
    for rule in FeeReader::new(file).rules() {
        match rule {
            Ok(rule) => {
                store.store(rule).await.into_diagnostic()?;
                loaded += 1;
            }
            Err(e) => eprintln!("Error reading fee rule: {}", e),
        }
    }
    Ok(loaded)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => AppConfig::load(path).into_diagnostic()?,
        None => {
            let mut config = AppConfig::default();
            config.apply_env_overrides(|key| std::env::var(key).ok());
            config
        }
    };
    if let Some(bind) = cli.bind {
        config.server.bind = bind;
    }

    init_logging(&config.logging);

    let (stores, backend) = open_stores(cli.db_path)?;
    let wallets = match cli.wallets {
        Some(path) => seed_wallets(path, &stores.wallets).await?,
        None => 0,
    };
    let fee_rules = match cli.fees {
        Some(path) => seed_fees(path, &stores.fees).await?,
        None => 0,
    };

    if cli.check_config {
        let signed: Vec<&str> = config
            .providers
            .iter()
            .filter(|(_, c)| c.secret.as_deref().is_some_and(|s| !s.is_empty()))
            .map(|(name, _)| name.as_str())
            .collect();
        println!(
            "configuration ok: mode={:?} bind={} storage={} wallets={} fee_rules={} signed_providers=[{}]",
            config.mode,
            config.server.bind,
            backend,
            wallets,
            fee_rules,
            signed.join(",")
        );
        return Ok(());
    }

    if !config.mode.is_production() {
        tracing::warn!("running in development mode; unsigned webhooks may be accepted");
    }

    let engine = ReconciliationEngine::new(&config, stores).with_notifier(Arc::new(TracingNotifier));
    let app = http::router(Arc::new(engine));

    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .into_diagnostic()?;
    tracing::info!(bind = %config.server.bind, storage = backend, "webhook listener started");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .into_diagnostic()?;

    Ok(())
}
