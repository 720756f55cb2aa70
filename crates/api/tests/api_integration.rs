//! Integration tests for the API server.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use domain::DispatcherConfig;
use event_store::InMemoryEventStore;
use metrics_exporter_prometheus::PrometheusHandle;
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

async fn setup_with_store() -> (
    axum::Router,
    InMemoryEventStore,
    Arc<api::routes::foodcarts::AppState<InMemoryEventStore>>,
) {
    let store = InMemoryEventStore::new();
    let state = api::create_state(store.clone(), DispatcherConfig::default())
        .await
        .unwrap();
    let app = api::create_app(state.clone(), get_metrics_handle());
    (app, store, state)
}

async fn setup() -> axum::Router {
    setup_with_store().await.0
}

async fn send(app: &axum::Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null)
    };
    (status, json)
}

fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn create_cart(app: &axum::Router, id: &str) {
    let (status, _) = send(
        app,
        post_json("/foodcarts", serde_json::json!({ "food_cart_id": id })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
}

/// Polls the read model until `check` accepts the cart's view.
async fn eventually_view(
    app: &axum::Router,
    id: &str,
    check: impl Fn(&serde_json::Value) -> bool,
) -> serde_json::Value {
    for _ in 0..100 {
        let (status, json) = send(app, get(&format!("/foodcarts/{id}"))).await;
        if status == StatusCode::OK && check(&json) {
            return json;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("view for {id} never reached the expected state");
}

#[tokio::test]
async fn test_health_check() {
    let app = setup().await;

    let (status, json) = send(&app, get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_create_with_generated_id() {
    let app = setup().await;

    let (status, json) = send(&app, post_json("/foodcarts", serde_json::json!({}))).await;

    assert_eq!(status, StatusCode::CREATED);
    assert!(!json["food_cart_id"].as_str().unwrap().is_empty());
    assert_eq!(json["version"], 1);
    assert_eq!(json["events_emitted"], 1);
}

#[tokio::test]
async fn test_select_then_read_view() {
    let app = setup().await;
    create_cart(&app, "cart1").await;

    let (status, json) = send(
        &app,
        post_json(
            "/foodcarts/cart1/select",
            serde_json::json!({ "product_id": "pizza", "quantity": 2 }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["version"], 2);

    let view = eventually_view(&app, "cart1", |v| v["products"]["pizza"] == 2).await;
    assert_eq!(view["food_cart_id"], "cart1");
    assert_eq!(view["version"], 2);
}

#[tokio::test]
async fn test_deselect_more_than_selected_is_unprocessable() {
    let app = setup().await;
    create_cart(&app, "cart1").await;
    send(
        &app,
        post_json(
            "/foodcarts/cart1/select",
            serde_json::json!({ "product_id": "pizza", "quantity": 1 }),
        ),
    )
    .await;

    let (status, json) = send(
        &app,
        post_json(
            "/foodcarts/cart1/deselect",
            serde_json::json!({ "product_id": "pizza", "quantity": 2 }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(json["error"].as_str().is_some());
}

#[tokio::test]
async fn test_deselect_unselected_product_is_unprocessable() {
    let app = setup().await;
    create_cart(&app, "cart1").await;

    let (status, _) = send(
        &app,
        post_json(
            "/foodcarts/cart1/deselect",
            serde_json::json!({ "product_id": "soda", "quantity": 1 }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_unknown_cart_is_not_found() {
    let app = setup().await;

    let (status, _) = send(
        &app,
        post_json(
            "/foodcarts/ghost/select",
            serde_json::json!({ "product_id": "pizza", "quantity": 1 }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, json) = send(&app, get("/foodcarts/ghost")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(json["error"].as_str().unwrap().contains("ghost"));

    let (status, _) = send(&app, get("/foodcarts/ghost/events")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_duplicate_create_conflicts() {
    let (app, store, _) = setup_with_store().await;
    create_cart(&app, "cart1").await;

    let (status, _) = send(
        &app,
        post_json("/foodcarts", serde_json::json!({ "food_cart_id": "cart1" })),
    )
    .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(store.event_count().await, 1);
}

#[tokio::test]
async fn test_malformed_body_is_bad_request() {
    let app = setup().await;
    create_cart(&app, "cart1").await;

    let request = Request::builder()
        .method("POST")
        .uri("/foodcarts/cart1/select")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, json) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().is_some());

    let (status, _) = send(
        &app,
        post_json(
            "/foodcarts/cart1/select",
            serde_json::json!({ "product_id": "pizza", "quantity": -1 }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_empty_product_id_is_bad_request() {
    let app = setup().await;
    create_cart(&app, "cart1").await;

    let (status, _) = send(
        &app,
        post_json(
            "/foodcarts/cart1/select",
            serde_json::json!({ "product_id": "  ", "quantity": 1 }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_confirm_twice_emits_once() {
    let app = setup().await;
    create_cart(&app, "cart1").await;

    let (status, first) = send(
        &app,
        post_json("/foodcarts/cart1/confirm", serde_json::json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["events_emitted"], 1);
    assert_eq!(first["version"], 2);

    let (status, second) = send(
        &app,
        post_json("/foodcarts/cart1/confirm", serde_json::json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["events_emitted"], 0);
    assert_eq!(second["version"], 2);
}

#[tokio::test]
async fn test_events_are_listed_in_order() {
    let app = setup().await;
    create_cart(&app, "cart1").await;
    send(
        &app,
        post_json(
            "/foodcarts/cart1/select",
            serde_json::json!({ "product_id": "pizza", "quantity": 2 }),
        ),
    )
    .await;
    send(
        &app,
        post_json(
            "/foodcarts/cart1/deselect",
            serde_json::json!({ "product_id": "pizza", "quantity": 1 }),
        ),
    )
    .await;

    let (status, json) = send(&app, get("/foodcarts/cart1/events")).await;
    assert_eq!(status, StatusCode::OK);

    let events = json.as_array().unwrap();
    let types: Vec<_> = events
        .iter()
        .map(|e| e["event_type"].as_str().unwrap())
        .collect();
    assert_eq!(
        types,
        ["FoodCartCreated", "ProductSelected", "ProductDeselected"]
    );
    assert_eq!(events[2]["version"], 3);
}

#[tokio::test]
async fn test_rebuild_reports_row_count() {
    let (app, _, state) = setup_with_store().await;
    create_cart(&app, "cart1").await;
    create_cart(&app, "cart2").await;
    eventually_view(&app, "cart2", |_| true).await;

    let (status, json) = send(
        &app,
        post_json("/projections/rebuild", serde_json::json!({})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["food_carts"], 2);
    assert_eq!(state.dispatcher.active_locks(), 0);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let app = setup().await;
    create_cart(&app, "cart1").await;

    let response = app.oneshot(get("/metrics")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("commands_dispatched_total"));
}
