//! Read model maintenance endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use event_store::EventStore;
use projections::ReadModelStore;
use serde::Serialize;

use crate::error::ApiError;
use crate::routes::foodcarts::AppState;

#[derive(Debug, Serialize)]
pub struct RebuildResponse {
    /// Number of food cart rows after the rebuild.
    pub food_carts: usize,
}

/// POST /projections/rebuild: reset every view and replay the event store.
#[tracing::instrument(skip(state))]
pub async fn rebuild<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<RebuildResponse>, ApiError> {
    state.projection_processor.rebuild_all().await?;
    let food_carts = state.views.count().await;

    tracing::info!(food_carts, "read models rebuilt");
    Ok(Json(RebuildResponse { food_carts }))
}
