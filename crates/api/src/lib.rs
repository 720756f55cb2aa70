//! HTTP front end for the food cart system.
//!
//! Exposes cart commands and queries over REST, with structured logging
//! (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use domain::{CommandDispatcher, DispatcherConfig, EventPublisher};
use event_store::EventStore;
use metrics_exporter_prometheus::PrometheusHandle;
use projections::{
    FoodCartProjector, FoodCartQueryHandler, InMemoryReadModelStore, Projection,
    ProjectionError, ProjectionProcessor,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use routes::foodcarts::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: EventStore + Clone + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::render))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/foodcarts", post(routes::foodcarts::create::<S>))
        .route("/foodcarts/{id}", get(routes::foodcarts::get::<S>))
        .route("/foodcarts/{id}/select", post(routes::foodcarts::select::<S>))
        .route(
            "/foodcarts/{id}/deselect",
            post(routes::foodcarts::deselect::<S>),
        )
        .route(
            "/foodcarts/{id}/confirm",
            post(routes::foodcarts::confirm::<S>),
        )
        .route("/foodcarts/{id}/events", get(routes::foodcarts::events::<S>))
        .route(
            "/projections/rebuild",
            post(routes::projections::rebuild::<S>),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Wires the write and read sides over one event store.
///
/// The read model is caught up with everything already stored before the
/// live subscription starts, so the projector's position never skips an
/// event. Must be called inside a Tokio runtime.
pub async fn create_state<S: EventStore + Clone + 'static>(
    event_store: S,
    config: DispatcherConfig,
) -> Result<Arc<AppState<S>>, ProjectionError> {
    let views = InMemoryReadModelStore::new();
    let projector = FoodCartProjector::new(views.clone());

    let mut processor = ProjectionProcessor::new(event_store.clone());
    processor.register(Box::new(projector) as Box<dyn Projection>);
    let processor = Arc::new(processor);
    processor.run_catch_up().await?;

    let publisher = EventPublisher::new();
    let subscription = publisher.subscribe().await;
    processor.clone().spawn_subscription(subscription);

    let dispatcher = CommandDispatcher::with_config(event_store, publisher, config);

    Ok(Arc::new(AppState {
        dispatcher,
        queries: FoodCartQueryHandler::new(views.clone()),
        views,
        projection_processor: processor,
    }))
}
