use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use serde_json::json;
use tower::ServiceExt;

fn router() -> axum::Router {
    let mem = Arc::new(storage::MemStorage::new());
    let store = Arc::new(config_store::ConfigStore::new(mem));
    daemon::api::build_router(store)
}

async fn request(
    router: &axum::Router,
    method: Method,
    uri: &str,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(value) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };
    let response = router
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| json!(String::from_utf8_lossy(&bytes).to_string()))
    };
    (status, value)
}

fn purge_body() -> serde_json::Value {
    json!({
        "key": "PURGE",
        "description": "purge settings",
        "value": {
            "age": {"description": "hours to retain", "type": "integer", "default": "72"},
        },
    })
}

#[tokio::test]
async fn category_create_and_read_round_trip() {
    let router = router();

    let (status, body) = request(&router, Method::POST, "/category", Some(purge_body())).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["key"], json!("PURGE"));
    assert_eq!(body["value"]["age"]["value"], json!("72"));

    let (status, body) = request(&router, Method::GET, "/category/PURGE", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["age"]["default"], json!("72"));

    let (status, body) = request(&router, Method::GET, "/category/PURGE/age", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["type"], json!("integer"));

    let (status, _) = request(&router, Method::GET, "/category/MISSING", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = request(&router, Method::GET, "/category/PURGE/missing", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = request(&router, Method::GET, "/category", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["categories"],
        json!([{"key": "PURGE", "description": "purge settings"}])
    );
}

#[tokio::test]
async fn category_names_are_percent_decoded() {
    let router = router();
    let mut body = purge_body();
    body["key"] = json!("MY CAT");

    let (status, _) = request(&router, Method::POST, "/category", Some(body)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = request(&router, Method::GET, "/category/MY%20CAT", None).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["age"]["value"], json!("72"));
}

#[tokio::test]
async fn item_value_set_reset_and_validation() {
    let router = router();
    request(&router, Method::POST, "/category", Some(purge_body())).await;

    let (status, body) = request(
        &router,
        Method::PUT,
        "/category/PURGE/age",
        Some(json!({"value": "24"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["value"], json!("24"));

    // POST behaves as PUT.
    let (status, body) = request(
        &router,
        Method::POST,
        "/category/PURGE/age",
        Some(json!({"value": "48"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["value"], json!("48"));

    let (status, _) = request(
        &router,
        Method::PUT,
        "/category/PURGE/age",
        Some(json!({"value": "not a number"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = request(
        &router,
        Method::PUT,
        "/category/PURGE/age",
        Some(json!({"wrong": "shape"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) =
        request(&router, Method::DELETE, "/category/PURGE/age/value", None).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["value"], json!("72"));
}

#[tokio::test]
async fn bulk_update_through_the_category_route() {
    let router = router();
    request(&router, Method::POST, "/category", Some(purge_body())).await;

    let (status, body) = request(
        &router,
        Method::PUT,
        "/category/PURGE",
        Some(json!({"age": "12"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["age"]["value"], json!("12"));
}

#[tokio::test]
async fn children_routes_manage_edges() {
    let router = router();
    for key in ["A", "B"] {
        let mut body = purge_body();
        body["key"] = json!(key);
        request(&router, Method::POST, "/category", Some(body)).await;
    }

    let (status, body) = request(
        &router,
        Method::POST,
        "/category/A/children",
        Some(json!({"children": ["B"]})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["children"], json!(["B"]));

    let (status, body) = request(&router, Method::GET, "/category/A/children", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["categories"][0]["key"], json!("B"));
    assert_eq!(body["categories"][0]["displayName"], json!("B"));

    let (status, body) = request(&router, Method::GET, "/category?root=true", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["categories"], json!([{"key": "A", "description": "purge settings"}]));

    let (status, body) = request(
        &router,
        Method::DELETE,
        "/category/A/children/B",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["children"], json!([]));

    let (status, _) = request(&router, Method::DELETE, "/category/A/parent", None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = request(
        &router,
        Method::POST,
        "/category/A/children",
        Some(json!({"children": ["GHOST"]})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn recursive_delete_guards_reserved_categories() {
    let router = router();
    for key in ["A", "SCHEDULER"] {
        let mut body = purge_body();
        body["key"] = json!(key);
        request(&router, Method::POST, "/category", Some(body)).await;
    }
    request(
        &router,
        Method::POST,
        "/category/A/children",
        Some(json!({"children": ["SCHEDULER"]})),
    )
    .await;

    let (status, body) = request(&router, Method::DELETE, "/category/A", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");

    // Nothing was removed.
    let (status, _) = request(&router, Method::GET, "/category/A", None).await;
    assert_eq!(status, StatusCode::OK);

    // Without the reserved descendant, the subtree goes away.
    request(&router, Method::DELETE, "/category/A/children/SCHEDULER", None).await;
    let (status, _) = request(&router, Method::DELETE, "/category/A", None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = request(&router, Method::GET, "/category/A", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
