//! Wiring & DI. Entry point: bootstrap adapters, inject into services, run UI.
//! No business logic here; validation and defaulting live in the domain.

use article_intake::adapters::notify::BroadcastNotifier;
use article_intake::adapters::persistence::{FsAttachmentStore, JsonStore, SqliteStore};
use article_intake::adapters::ui::TuiInputPort;
use article_intake::ports::{
    ArticleStore, AttachmentStore, InputPort, NotificationPort, SignatureLookup, TextModuleLookup,
    TicketRepo,
};
use article_intake::shared::config::{AppConfig, Backend};
use article_intake::usecases::{ArticleService, SuggestionService};
use dotenv::dotenv;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// The four store ports, backed by one adapter.
struct Stores {
    tickets: Arc<dyn TicketRepo>,
    articles: Arc<dyn ArticleStore>,
    signatures: Arc<dyn SignatureLookup>,
    modules: Arc<dyn TextModuleLookup>,
}

async fn open_stores(backend: Backend, data_dir: &Path) -> anyhow::Result<Stores> {
    match backend {
        Backend::Sqlite => {
            let store = Arc::new(
                SqliteStore::connect(data_dir)
                    .await
                    .map_err(|e| anyhow::anyhow!("SQLite connect failed: {}", e))?,
            );
            info!(path = %store.path().display(), "using SQLite store");
            Ok(Stores {
                tickets: store.clone(),
                articles: store.clone(),
                signatures: store.clone(),
                modules: store,
            })
        }
        Backend::Json => {
            let path = data_dir.join("store.json");
            let store = Arc::new(JsonStore::new(&path));
            store.load().await.map_err(|e| anyhow::anyhow!("{}", e))?;
            info!(path = %path.display(), "using JSON store");
            Ok(Stores {
                tickets: store.clone(),
                articles: store.clone(),
                signatures: store.clone(),
                modules: store,
            })
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_loaded = dotenv();
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    match &env_loaded {
        Ok(path) => info!(path = %path.display(), "loaded .env"),
        Err(_) => debug!("no .env found"),
    }

    let cfg = AppConfig::load().unwrap_or_else(|e| {
        warn!(error = %e, "config load failed, using defaults");
        AppConfig::default()
    });

    let data_dir = cfg.data_dir_or_default();
    tokio::fs::create_dir_all(&data_dir)
        .await
        .map_err(|e| anyhow::anyhow!("create data dir: {}", e))?;
    info!(path = %data_dir.display(), backend = ?cfg.backend_or_default(), "data directory");

    let stores = open_stores(cfg.backend_or_default(), &data_dir).await?;
    let attachments: Arc<dyn AttachmentStore> =
        Arc::new(FsAttachmentStore::new(cfg.attachments_dir()));

    // --- Notifications: log every ticket event ---
    let notifier = BroadcastNotifier::new(cfg.notify_capacity_or_default());
    let mut events = notifier.subscribe_all();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(ev) => debug!(ticket_id = ev.ticket_id, event = ?ev.event, "ticket event"),
                Err(RecvError::Lagged(n)) => warn!(skipped = n, "event log lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    });
    let notifier: Arc<dyn NotificationPort> = Arc::new(notifier);

    // --- Services ---
    let article_service = Arc::new(
        ArticleService::new(
            Arc::clone(&stores.tickets),
            stores.articles,
            stores.signatures,
            notifier,
        )
        .with_attachments(attachments),
    );
    let suggestion_service = Arc::new(SuggestionService::new(stores.tickets, stores.modules));

    let input_port: Arc<dyn InputPort> = Arc::new(TuiInputPort::new(
        article_service,
        suggestion_service,
        cfg.actor_id,
        cfg.ticket_id,
    ));

    input_port
        .run()
        .await
        .map_err(|e| anyhow::anyhow!("{}", e))?;

    Ok(())
}
