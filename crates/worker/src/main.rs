//! Background worker: expired-session sweeper and security event persistence.
//!
//! This process owns no `SessionService`, so its bus only carries the
//! sweeper's `sessions_expired` events. Request-path events (issue, rotate,
//! reuse alerts) are persisted by the process that embeds the service, by
//! handing the same bus to both sides:
//!
//! ```ignore
//! let bus = Arc::new(EventBus::default());
//! tokio::spawn(EventPersistence::run(pool.clone(), bus.subscribe()));
//! let (service, _worker) = SessionService::start(
//!     SessionServiceDeps { events: bus.clone(), ..deps },
//!     ConcurrencyPolicy::default(),
//! );
//! ```
//!
//! | Env Var                       | Required | Default |
//! |-------------------------------|----------|---------|
//! | `DATABASE_URL`                | yes      | --      |
//! | `SESSION_SWEEP_INTERVAL_SECS` | no       | `300`   |

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tokenward_auth::sweeper;
use tokenward_core::store::SessionStore;
use tokenward_db::PgSessionStore;
use tokenward_events::{EventBus, EventPersistence, SecurityEventSink};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tokenward_worker=debug,tokenward_auth=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
    let sweep_interval = sweep_interval()?;

    // --- Database ---
    let pool = tokenward_db::create_pool(&database_url)
        .await
        .context("Failed to connect to database")?;
    tokenward_db::health_check(&pool)
        .await
        .context("Database health check failed")?;
    tokenward_db::run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;
    tracing::info!("Database ready");

    // --- Event bus ---
    let event_bus = Arc::new(EventBus::default());
    let persistence_handle =
        tokio::spawn(EventPersistence::run(pool.clone(), event_bus.subscribe()));

    // --- Sweeper ---
    let cancel = CancellationToken::new();
    let store: Arc<dyn SessionStore> = Arc::new(PgSessionStore::new(pool));
    let sink: Arc<dyn SecurityEventSink> = event_bus.clone();
    let sweeper_handle = tokio::spawn(sweeper::run(store, sink, sweep_interval, cancel.clone()));

    tracing::info!(
        sweep_interval_secs = sweep_interval.as_secs(),
        "Worker started"
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to install Ctrl-C handler")?;
    tracing::info!("Received SIGINT (Ctrl-C), shutting down");

    cancel.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), sweeper_handle).await;

    // Dropping the last sender closes the channel and ends persistence.
    drop(event_bus);
    let _ = tokio::time::timeout(Duration::from_secs(5), persistence_handle).await;

    tracing::info!("Worker stopped");
    Ok(())
}

fn sweep_interval() -> anyhow::Result<Duration> {
    match std::env::var("SESSION_SWEEP_INTERVAL_SECS") {
        Ok(raw) => {
            let secs: u64 = raw
                .parse()
                .with_context(|| format!("SESSION_SWEEP_INTERVAL_SECS is not a number: {raw}"))?;
            anyhow::ensure!(secs > 0, "SESSION_SWEEP_INTERVAL_SECS must be positive");
            Ok(Duration::from_secs(secs))
        }
        Err(_) => Ok(sweeper::DEFAULT_SWEEP_INTERVAL),
    }
}
