use bankcore::application::dispatcher::Dispatcher;
use bankcore::application::notifications::NotificationOutbox;
use bankcore::application::Context;
use bankcore::domain::ports::{AccountRepositoryRef, CredentialStoreRef, LedgerStoreRef};
use bankcore::infrastructure::credentials::InMemoryCredentialStore;
use bankcore::infrastructure::in_memory::InMemoryStore;
use bankcore::infrastructure::push::LogNotificationSink;
#[cfg(feature = "storage-rocksdb")]
use bankcore::infrastructure::rocksdb::RocksDBStore;
use bankcore::infrastructure::sessions::InMemorySessionStore;
use bankcore::interfaces::{http, tcp};
use bankcore::settings::Settings;
use clap::{Parser, ValueEnum};
use miette::{IntoDiagnostic, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Serve the HTTP API only
    Http,
    /// Serve the tilde protocol over TCP only
    Tcp,
    /// Serve both transports
    All,
}

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Transports to start
    #[arg(value_enum, default_value_t = Mode::All)]
    mode: Mode,

    /// Settings file (defaults to ./bankcore.toml when present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long)]
    db_path: Option<PathBuf>,
}

type Stores = (AccountRepositoryRef, LedgerStoreRef, CredentialStoreRef);

fn in_memory(pepper: &str) -> Stores {
    let store = Arc::new(InMemoryStore::new());
    let accounts: AccountRepositoryRef = store.clone();
    let ledger: LedgerStoreRef = store;
    let credentials: CredentialStoreRef = Arc::new(InMemoryCredentialStore::new(pepper));
    (accounts, ledger, credentials)
}

#[cfg(feature = "storage-rocksdb")]
fn open_storage(path: Option<&Path>, pepper: &str) -> Result<Stores> {
    match path {
        Some(path) => {
            info!(path = %path.display(), "opening RocksDB storage");
            let store = RocksDBStore::open(path).into_diagnostic()?.with_pepper(pepper);
            let store = Arc::new(store);
            let accounts: AccountRepositoryRef = store.clone();
            let ledger: LedgerStoreRef = store.clone();
            let credentials: CredentialStoreRef = store;
            Ok((accounts, ledger, credentials))
        }
        None => Ok(in_memory(pepper)),
    }
}

#[cfg(not(feature = "storage-rocksdb"))]
fn open_storage(path: Option<&Path>, pepper: &str) -> Result<Stores> {
    if let Some(path) = path {
        tracing::warn!(
            path = %path.display(),
            "built without RocksDB support, falling back to in-memory storage"
        );
    }
    Ok(in_memory(pepper))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref()).into_diagnostic()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&settings.log.level).into_diagnostic()?)
        .with_writer(std::io::stderr)
        .init();

    let db_path = cli.db_path.or_else(|| settings.storage.path.clone());
    let (accounts, ledger, credentials) =
        open_storage(db_path.as_deref(), &settings.bank.password_pepper)?;
    let (outbox, _worker) =
        NotificationOutbox::start(accounts.clone(), Arc::new(LogNotificationSink));

    let ctx = Context {
        accounts,
        ledger,
        sessions: Arc::new(InMemorySessionStore::new()),
        credentials,
        outbox,
        policy: settings.policy().into_diagnostic()?,
    };
    let dispatcher = Arc::new(Dispatcher::bootstrap(ctx).await.into_diagnostic()?);

    let mut tasks = JoinSet::new();
    if matches!(cli.mode, Mode::Http | Mode::All) {
        let listener = TcpListener::bind(settings.http_addr())
            .await
            .into_diagnostic()?;
        tasks.spawn(http::serve(
            listener,
            dispatcher.clone(),
            settings.http.max_in_flight,
        ));
    }
    if matches!(cli.mode, Mode::Tcp | Mode::All) {
        let listener = TcpListener::bind(settings.tcp_addr())
            .await
            .into_diagnostic()?;
        tasks.spawn(tcp::serve(listener, dispatcher.clone(), settings.tcp_config()));
    }
    tasks.spawn(async {
        tokio::signal::ctrl_c().await?;
        info!("shutting down");
        Ok::<_, std::io::Error>(())
    });

    // The first task to finish brings the rest down.
    if let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(error = %e, "listener failed"),
            Err(e) => error!(error = %e, "listener task panicked"),
        }
    }
    tasks.shutdown().await;

    Ok(())
}
