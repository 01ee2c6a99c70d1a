use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, patch, post, put};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

mod config;
mod events;
mod models;
mod routes;
mod schema;
mod services;

use config::AppConfig;
use jodi_shared::clients::db::{create_pool, DbPool};
use jodi_shared::clients::rabbitmq::RabbitMQClient;
use services::collaborators::{DocumentStore, EventNotifier, HttpDocumentStore, Notifier};
use services::distributor;

pub struct AppState {
    pub db: DbPool,
    pub config: AppConfig,
    pub rabbitmq: RabbitMQClient,
    pub notifier: Arc<dyn Notifier>,
    pub documents: Arc<dyn DocumentStore>,
    /// Held for the duration of a distribution run; at most one run at
    /// a time, whether periodic or manually triggered.
    pub distribution_lock: tokio::sync::Mutex<()>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    jodi_shared::middleware::init_tracing("jodi-matching");
    let metrics_handle = jodi_shared::middleware::init_metrics();

    let config = AppConfig::load()?;
    let port = config.port;

    let db = create_pool(&config.database_url);
    let rabbitmq = RabbitMQClient::connect(&config.rabbitmq_url).await?;
    // Queues must exist before the first save can enqueue a job.
    rabbitmq
        .declare_work_queue(
            jodi_shared::types::event::queues::RECOMPUTE,
            jodi_shared::types::event::queues::RECOMPUTE_WAIT,
        )
        .await?;
    let notifier: Arc<dyn Notifier> = Arc::new(EventNotifier::new(Arc::new(rabbitmq.clone())));
    let documents: Arc<dyn DocumentStore> =
        Arc::new(HttpDocumentStore::new(config.document_service_url.clone()));

    let state = Arc::new(AppState {
        db,
        config,
        rabbitmq,
        notifier,
        documents,
        distribution_lock: tokio::sync::Mutex::new(()),
    });

    // Recompute worker: consumes the delayed-job queue.
    let worker_state = state.clone();
    tokio::spawn(async move {
        if let Err(e) = events::consumer::run_recompute_worker(worker_state).await {
            tracing::error!(error = %e, "recompute worker failed");
        }
    });

    // Periodic distribution runs. try_lock skips a tick while a manual
    // run is still going.
    let distributor_state = state.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(
            distributor_state.config.distribute_interval_secs,
        ));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let Ok(_guard) = distributor_state.distribution_lock.try_lock() else {
                tracing::warn!("skipping distribution tick, previous run still active");
                continue;
            };
            if let Err(e) = distributor::distribute_all(
                &distributor_state.db,
                distributor_state.notifier.as_ref(),
                distributor_state.documents.as_ref(),
                &distributor_state.rabbitmq,
                &distributor_state.config,
            )
            .await
            {
                tracing::error!(error = %e, "distribution run failed");
            }
        }
    });

    let app = Router::new()
        .route("/health", get(routes::health::health_check))
        .route(
            "/profiles",
            post(routes::profiles::create_profile).get(routes::profiles::list_profiles),
        )
        .route("/profiles/:id", get(routes::profiles::get_profile))
        .route("/profiles/:id/deactivate", patch(routes::profiles::deactivate_profile))
        .route("/profiles/:id/reactivate", patch(routes::profiles::reactivate_profile))
        .route(
            "/profiles/:id/preference",
            put(routes::preferences::save_preference).get(routes::preferences::get_preference),
        )
        .route("/profiles/:id/candidates", get(routes::candidates::find_candidates))
        .route("/internal/distribute", post(routes::distribution::trigger_distribution))
        .route("/castes", get(routes::lookups::list_castes))
        .route("/cities", get(routes::lookups::list_cities))
        .route(
            "/metrics",
            get(move || {
                let handle = metrics_handle.clone();
                async move { handle.render() }
            }),
        )
        .layer(axum::middleware::from_fn(
            jodi_shared::middleware::metrics_middleware,
        ))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = format!("0.0.0.0:{port}");
    tracing::info!(addr = %addr, "jodi-matching starting");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
