//! Process entry point: load config, connect the database, wire every
//! component, spawn the background loops, and serve HTTP until shutdown
//! (spec.md §6 process env / exit codes, §5 concurrency model).

use crosspost_core::config::Config;
use crosspost_core::{clock, id};
use crosspost_engine::{PublishEngine, PublishEngineConfig};
use crosspost_events::{run_bridge, EventBus, WsRooms};
use crosspost_governor::{RateGovernor, RateLimit};
use crosspost_importer::{ImportRunner, ImportSettings};
use crosspost_providers::ProviderRegistry;
use crosspost_scheduler::{Scheduler, SchedulerConfig};
use crosspost_server::state::AppState;
use crosspost_store::{PgStore, Store};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(error = %err, "failed to load configuration");
            std::process::exit(1);
        }
    };

    let pool = match sqlx::PgPool::connect(&config.database_url).await {
        Ok(pool) => pool,
        Err(err) => {
            tracing::error!(error = %err, "failed to connect to the database");
            std::process::exit(1);
        }
    };

    let pg_store = PgStore::new(pool);
    if let Err(err) = pg_store.migrate().await {
        tracing::error!(error = %err, "failed to run database migrations");
        std::process::exit(1);
    }
    let store: Arc<dyn Store> = Arc::new(pg_store);

    let clock = clock::system();
    let ids = id::system();

    let limits = config
        .providers
        .iter()
        .map(|(&provider, cfg)| {
            (
                provider,
                RateLimit {
                    requests_per_second: cfg.requests_per_second,
                    burst: cfg.burst,
                },
            )
        })
        .collect::<Vec<_>>();
    let governor = Arc::new(RateGovernor::new(limits));

    let registry = Arc::new(ProviderRegistry::production(reqwest::Client::new()));
    let events = EventBus::new();
    let ws_rooms = WsRooms::new();

    let engine = Arc::new(PublishEngine::new(
        store.clone(),
        registry.clone(),
        governor.clone(),
        events.clone(),
        clock.clone(),
        ids.clone(),
        PublishEngineConfig::default(),
    ));

    let cancel = CancellationToken::new();

    let mut tasks = engine.run_workers(cancel.clone());

    let scheduler = Scheduler::new(
        store.clone(),
        engine.clone(),
        clock.clone(),
        SchedulerConfig {
            interval: config.scheduled_posts_interval,
            ..SchedulerConfig::default()
        },
    );
    {
        let cancel = cancel.clone();
        tasks.push(tokio::spawn(async move { scheduler.run(cancel).await }));
    }

    if config.social_import_workers_enabled {
        for &provider in crosspost_core::Provider::ALL {
            let provider_config = config.provider(provider);
            let runner = ImportRunner::new(
                provider,
                store.clone(),
                registry.clone(),
                governor.clone(),
                clock.clone(),
                ImportSettings {
                    interval: provider_config.import_interval,
                    daily_max: provider_config.daily_max,
                },
            );
            let cancel = cancel.clone();
            tasks.push(tokio::spawn(async move { runner.run(cancel).await }));
        }
    }

    {
        let cancel = cancel.clone();
        let bus = events.clone();
        let rooms = ws_rooms.clone();
        let clock = clock.clone();
        tasks.push(tokio::spawn(async move { run_bridge(bus, rooms, clock, cancel).await }));
    }

    let media_root = std::env::var("MEDIA_ROOT")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("./media"));
    if let Err(err) = tokio::fs::create_dir_all(&media_root).await {
        tracing::warn!(error = %err, path = %media_root.display(), "could not ensure media root exists");
    }

    let state = AppState {
        store,
        engine,
        events,
        ws_rooms,
        clock,
        ids,
        internal_ws_secret: config.internal_ws_secret.clone(),
        media_root,
    };

    let app = crosspost_server::build_router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!(error = %err, %addr, "failed to bind HTTP listener");
            std::process::exit(1);
        }
    };
    tracing::info!(%addr, "crosspost-server listening");

    let shutdown_cancel = cancel.clone();
    let server = axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal(shutdown_cancel));

    if let Err(err) = server.await {
        tracing::error!(error = %err, "HTTP server exited with an error");
    }

    cancel.cancel();
    for task in tasks {
        let _ = task.await;
    }
}

/// SIGINT or SIGTERM fires the root cancellation token and tells Axum to
/// stop accepting new connections, with a bounded grace period for
/// in-flight requests (spec.md §5: "~5 s").
async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("shutdown signal received, canceling background work");
    cancel.cancel();
    tokio::time::sleep(Duration::from_secs(5)).await;
}
