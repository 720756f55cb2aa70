//! Food cart command and query endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::AggregateId;
use domain::{
    CommandDispatcher, CommandResult, ConfirmOrder, CreateFoodCart, DeselectProduct, DomainError,
    FoodCart, FoodCartCommand, SelectProduct,
};
use event_store::EventStore;
use projections::{
    FindFoodCart, FoodCartQueryHandler, FoodCartView, InMemoryReadModelStore, ProjectionProcessor,
};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState<S: EventStore> {
    pub dispatcher: CommandDispatcher<S, FoodCart>,
    pub queries: FoodCartQueryHandler<InMemoryReadModelStore<FoodCartView>>,
    pub views: InMemoryReadModelStore<FoodCartView>,
    pub projection_processor: Arc<ProjectionProcessor<S>>,
}

// -- Request types --

#[derive(Debug, Default, Deserialize)]
pub struct CreateFoodCartRequest {
    /// Caller-chosen identity; a UUID is generated when absent.
    pub food_cart_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ProductQuantityRequest {
    pub product_id: String,
    pub quantity: u32,
}

// -- Response types --

#[derive(Debug, Serialize)]
pub struct CommandResponse {
    pub food_cart_id: String,
    pub version: i64,
    pub events_emitted: usize,
}

impl CommandResponse {
    fn from_result(food_cart_id: &AggregateId, result: &CommandResult<FoodCart>) -> Self {
        Self {
            food_cart_id: food_cart_id.to_string(),
            version: result.new_version.as_i64(),
            events_emitted: result.events.len(),
        }
    }
}

/// Response type for event envelope data.
#[derive(Debug, Serialize)]
pub struct EventEnvelopeResponse {
    pub event_id: String,
    pub event_type: String,
    pub aggregate_id: String,
    pub version: i64,
    pub timestamp: String,
    pub payload: serde_json::Value,
}

// -- Handlers --

/// POST /foodcarts: open a new food cart.
#[tracing::instrument(skip(state, body))]
pub async fn create<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    body: Result<Json<CreateFoodCartRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CommandResponse>), ApiError> {
    let Json(req) = body?;

    let cmd = match req.food_cart_id {
        Some(id) => CreateFoodCart::new(parse_food_cart_id(&id)?),
        None => CreateFoodCart::generate(),
    };
    let food_cart_id = cmd.food_cart_id.clone();
    let result = state.dispatcher.dispatch(cmd.into()).await?;

    Ok((
        StatusCode::CREATED,
        Json(CommandResponse::from_result(&food_cart_id, &result)),
    ))
}

/// POST /foodcarts/{id}/select: add a quantity of a product.
#[tracing::instrument(skip(state, body))]
pub async fn select<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    body: Result<Json<ProductQuantityRequest>, JsonRejection>,
) -> Result<Json<CommandResponse>, ApiError> {
    let Json(req) = body?;
    let food_cart_id = parse_food_cart_id(&id)?;
    let product_id = parse_product_id(&req.product_id)?;

    let cmd = SelectProduct::new(food_cart_id.clone(), product_id, req.quantity);
    dispatch(&state, &food_cart_id, cmd.into()).await
}

/// POST /foodcarts/{id}/deselect: remove a quantity of a product.
#[tracing::instrument(skip(state, body))]
pub async fn deselect<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    body: Result<Json<ProductQuantityRequest>, JsonRejection>,
) -> Result<Json<CommandResponse>, ApiError> {
    let Json(req) = body?;
    let food_cart_id = parse_food_cart_id(&id)?;
    let product_id = parse_product_id(&req.product_id)?;

    let cmd = DeselectProduct::new(food_cart_id.clone(), product_id, req.quantity);
    dispatch(&state, &food_cart_id, cmd.into()).await
}

/// POST /foodcarts/{id}/confirm: confirm the cart's order.
///
/// Confirming twice succeeds with no new events.
#[tracing::instrument(skip(state))]
pub async fn confirm<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<CommandResponse>, ApiError> {
    let food_cart_id = parse_food_cart_id(&id)?;
    let cmd = ConfirmOrder::new(food_cart_id.clone());
    dispatch(&state, &food_cart_id, cmd.into()).await
}

/// GET /foodcarts/{id}: read the cart's view.
///
/// Served from the read model, which may lag a just-accepted command.
#[tracing::instrument(skip(state))]
pub async fn get<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<FoodCartView>, ApiError> {
    let food_cart_id = parse_food_cart_id(&id)?;
    let view = state
        .queries
        .find(&FindFoodCart::new(food_cart_id))
        .await
        .ok_or_else(|| ApiError::NotFound(format!("food cart {id} not found")))?;

    Ok(Json(view))
}

/// GET /foodcarts/{id}/events: list the cart's stored events.
#[tracing::instrument(skip(state))]
pub async fn events<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<EventEnvelopeResponse>>, ApiError> {
    let food_cart_id = parse_food_cart_id(&id)?;

    let envelopes = state
        .dispatcher
        .repository()
        .store()
        .get_events_for_aggregate(&food_cart_id)
        .await
        .map_err(DomainError::from)?;

    if envelopes.is_empty() {
        return Err(ApiError::NotFound(format!("food cart {id} not found")));
    }

    let responses = envelopes
        .into_iter()
        .map(|e| EventEnvelopeResponse {
            event_id: e.event_id.to_string(),
            event_type: e.event_type,
            aggregate_id: e.aggregate_id.to_string(),
            version: e.version.as_i64(),
            timestamp: e.timestamp.to_rfc3339(),
            payload: e.payload,
        })
        .collect();

    Ok(Json(responses))
}

async fn dispatch<S: EventStore>(
    state: &AppState<S>,
    food_cart_id: &AggregateId,
    command: FoodCartCommand,
) -> Result<Json<CommandResponse>, ApiError> {
    let result = state.dispatcher.dispatch(command).await?;
    Ok(Json(CommandResponse::from_result(food_cart_id, &result)))
}

fn parse_food_cart_id(id: &str) -> Result<AggregateId, ApiError> {
    let id = id.trim();
    if id.is_empty() {
        return Err(ApiError::BadRequest("food_cart_id must not be empty".to_string()));
    }
    Ok(AggregateId::from(id))
}

fn parse_product_id(id: &str) -> Result<domain::ProductId, ApiError> {
    let id = id.trim();
    if id.is_empty() {
        return Err(ApiError::BadRequest("product_id must not be empty".to_string()));
    }
    Ok(domain::ProductId::new(id))
}
