//! Management API tests driven through the router with `oneshot`.

mod common;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use magplane::api::{build_router, dto::CommonResponse, error::ErrorBody};
use magplane::xds::DiscoveryCache;
use serde_json::{json, Value};
use tower::ServiceExt;

use common::{assignment_endpoints, harness, Harness, NODE_ID};

fn app(h: &Harness) -> Router {
    build_router(h.control_plane.clone())
}

async fn send(app: Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Vec<u8>) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(value) => {
            builder = builder.header("content-type", "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };

    let response = app.oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, bytes.to_vec())
}

fn message(bytes: &[u8]) -> String {
    serde_json::from_slice::<CommonResponse>(bytes).unwrap().message
}

fn error(bytes: &[u8]) -> ErrorBody {
    serde_json::from_slice(bytes).unwrap()
}

fn create_body() -> Value {
    json!({
        "cluster": {
            "name": "web",
            "connect_timeout": 5,
            "health_check": {
                "path": "/healthz",
                "timeout": 1,
                "interval": 5,
                "unhealthy_threshold": 3,
                "healthy_threshold": 2
            },
            "healthy_panic_threshold": 50.0,
            "maglev_table_size": 65537
        },
        "listener": {
            "name": "web-l",
            "ip": "0.0.0.0",
            "port": 9000,
            "access_log_path": "/dev/stdout"
        }
    })
}

fn backend(ip: &str, port: u32) -> Value {
    json!({ "cluster_name": "web", "ip": ip, "port": port })
}

#[tokio::test]
async fn health_endpoint_is_ok() {
    let h = harness();
    let (status, body) = send(app(&h), Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    let value: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(value["status"], "ok");
}

#[tokio::test]
async fn create_then_add_backend_publishes_snapshot() {
    let h = harness();

    let (status, body) = send(app(&h), Method::POST, "/cluster", Some(create_body())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(message(&body), "cluster : web is created.");

    let (status, body) =
        send(app(&h), Method::POST, "/backend", Some(backend("10.0.0.1", 8080))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(message(&body), "Backend : 10.0.0.1:8080 is added.");

    let snapshot = h.cache.snapshot(NODE_ID).expect("snapshot");
    assert_eq!(assignment_endpoints(&snapshot, "web"), vec![("10.0.0.1".to_string(), 8080)]);

    let (status, body) = send(app(&h), Method::GET, "/snapshot", None).await;
    assert_eq!(status, StatusCode::OK);
    let view: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(view["node_id"], NODE_ID);
    assert_eq!(view["version"], snapshot.version().to_string());
    assert_eq!(view["clusters"], json!(["web"]));
    assert_eq!(view["listeners"], json!(["web-l"]));
}

#[tokio::test]
async fn duplicate_backend_is_conflict() {
    let h = harness();
    send(app(&h), Method::POST, "/cluster", Some(create_body())).await;
    send(app(&h), Method::POST, "/backend", Some(backend("10.0.0.1", 8080))).await;

    let (status, body) =
        send(app(&h), Method::POST, "/backend", Some(backend("10.0.0.1", 8080))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error(&body).error, "conflict");
}

#[tokio::test]
async fn backend_for_unknown_cluster_is_not_found() {
    let h = harness();
    let (status, body) =
        send(app(&h), Method::POST, "/backend", Some(backend("10.0.0.1", 8080))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error(&body).error, "not_found");
}

#[tokio::test]
async fn removing_missing_backend_is_not_found() {
    let h = harness();
    send(app(&h), Method::POST, "/cluster", Some(create_body())).await;

    let (status, _) =
        send(app(&h), Method::DELETE, "/backend", Some(backend("10.0.0.9", 8080))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn remove_backend_reports_address() {
    let h = harness();
    send(app(&h), Method::POST, "/cluster", Some(create_body())).await;
    send(app(&h), Method::POST, "/backend", Some(backend("10.0.0.1", 8080))).await;

    let (status, body) =
        send(app(&h), Method::DELETE, "/backend", Some(backend("10.0.0.1", 8080))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(message(&body), "Backend : 10.0.0.1:8080 is removed.");
}

#[tokio::test]
async fn invalid_bodies_are_bad_requests() {
    let h = harness();

    let mut body = create_body();
    body["cluster"]["health_check"]["interval"] = json!(0);
    let (status, response) = send(app(&h), Method::POST, "/cluster", Some(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error(&response).error, "validation_error");

    let mut body = create_body();
    body["cluster"]["maglev_table_size"] = json!(65536);
    let (status, _) = send(app(&h), Method::POST, "/cluster", Some(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(app(&h), Method::POST, "/backend", Some(backend("10.0.0.1", 0))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert!(!h.control_plane.exists_cluster("web").await);
}

#[tokio::test]
async fn modify_requires_existing_cluster() {
    let h = harness();
    let body = json!({ "cluster": create_body()["cluster"].clone() });

    let (status, _) = send(app(&h), Method::PUT, "/cluster", Some(body.clone())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    send(app(&h), Method::POST, "/cluster", Some(create_body())).await;
    let (status, response) = send(app(&h), Method::PUT, "/cluster", Some(body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(message(&response), "cluster : web is modified.");
}

#[tokio::test]
async fn delete_cluster_by_query() {
    let h = harness();
    send(app(&h), Method::POST, "/cluster", Some(create_body())).await;

    let (status, _) = send(app(&h), Method::DELETE, "/cluster", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(app(&h), Method::DELETE, "/cluster?name=web", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(message(&body), "cluster : web is deleted.");

    let (status, _) = send(app(&h), Method::DELETE, "/cluster?name=web", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(!h.control_plane.exists_listener("web-l").await);
}

#[tokio::test]
async fn clusters_listing_includes_backends() {
    let h = harness();
    send(app(&h), Method::POST, "/cluster", Some(create_body())).await;
    send(app(&h), Method::POST, "/backend", Some(backend("10.0.0.1", 8080))).await;
    send(app(&h), Method::POST, "/backend", Some(backend("10.0.0.2", 8080))).await;

    let (status, body) = send(app(&h), Method::GET, "/clusters", None).await;
    assert_eq!(status, StatusCode::OK);

    let clusters: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(clusters[0]["name"], "web");
    assert_eq!(clusters[0]["listener"], "web-l");
    assert_eq!(clusters[0]["backends"][1]["ip"], "10.0.0.2");
}

#[tokio::test]
async fn snapshot_before_first_publish_is_not_found() {
    let h = harness();
    let (status, _) = send(app(&h), Method::GET, "/snapshot", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
