mod common;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::{Extension, Router};
use chrono::Utc;
use common::Harness;
use maintenance_contracts::routes::api_routes;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

fn app(harness: &Harness) -> Router {
    api_routes().layer(Extension(harness.engine.clone()))
}

async fn send(app: Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    (status, value)
}

fn contract_payload(client_id: Uuid, base_price: &str) -> Value {
    json!({
        "client_id": client_id,
        "name": "Bechstein upright care",
        "contract_type": "basic",
        "included_services": [
            { "service_type": "tuning", "quantity": 1 },
            { "service_type": "inspection", "unlimited": true }
        ],
        "base_price": base_price,
        "billing_frequency": "annual",
        "start_date": Utc::now().date_naive(),
        "created_by": "front-desk"
    })
}

#[tokio::test]
async fn contract_can_be_created_activated_and_billed_over_http() {
    let harness = Harness::new();
    let client_id = Uuid::new_v4();
    let org = harness.organization_id;

    let (status, created) = send(
        app(&harness),
        Method::POST,
        &format!("/api/organizations/{org}/contracts"),
        Some(contract_payload(client_id, "480")),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["status"], json!("draft"));
    assert_eq!(created["created_by"], json!("front-desk"));
    let contract_id = created["id"].as_str().unwrap().to_string();

    let (status, active) = send(
        app(&harness),
        Method::POST,
        &format!("/api/contracts/{contract_id}/activate"),
        Some(json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(active["status"], json!("active"));

    let (status, _) = send(
        app(&harness),
        Method::POST,
        &format!("/api/contracts/{contract_id}/activate"),
        Some(json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, coverage) = send(
        app(&harness),
        Method::GET,
        &format!("/api/clients/{client_id}/coverage?service_type=inspection"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(coverage["covered"], json!(true));
    assert_eq!(coverage["remaining_quantity"], json!(-1));

    let (status, report) = send(app(&harness), Method::POST, "/api/sweeps/billing", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["succeeded"], json!(1));

    let (status, payments) = send(
        app(&harness),
        Method::GET,
        &format!("/api/contracts/{contract_id}/payments"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let payments = payments.as_array().unwrap();
    assert_eq!(payments.len(), 2);
    assert!(payments
        .iter()
        .any(|payment| payment["status"] == json!("invoiced")));
}

#[tokio::test]
async fn errors_map_to_http_statuses() {
    let harness = Harness::new();
    let org = harness.organization_id;

    let (status, _) = send(
        app(&harness),
        Method::GET,
        &format!("/api/contracts/{}", Uuid::new_v4()),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(
        app(&harness),
        Method::POST,
        &format!("/api/organizations/{org}/contracts"),
        Some(contract_payload(Uuid::new_v4(), "-10")),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.as_str().unwrap().contains("price must not be negative"));

    let (status, created) = send(
        app(&harness),
        Method::POST,
        &format!("/api/organizations/{org}/contracts"),
        Some(contract_payload(Uuid::new_v4(), "100")),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let contract_id = created["id"].as_str().unwrap().to_string();

    let (status, _) = send(
        app(&harness),
        Method::POST,
        &format!("/api/contracts/{contract_id}/usage"),
        Some(json!({ "service_id": Uuid::new_v4(), "service_type": "tuning" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn stats_and_listing_are_scoped_to_the_organization() {
    let harness = Harness::new();
    let org = harness.organization_id;
    for price in ["100", "200"] {
        let (status, _) = send(
            app(&harness),
            Method::POST,
            &format!("/api/organizations/{org}/contracts"),
            Some(contract_payload(Uuid::new_v4(), price)),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, listed) = send(
        app(&harness),
        Method::GET,
        &format!("/api/organizations/{org}/contracts?status=draft"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed.as_array().unwrap().len(), 2);

    let (status, stats) = send(
        app(&harness),
        Method::GET,
        &format!("/api/organizations/{org}/contracts/stats"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["total"], json!(2));
    assert_eq!(stats["draft"], json!(2));

    let (status, empty) = send(
        app(&harness),
        Method::GET,
        &format!("/api/organizations/{}/contracts", Uuid::new_v4()),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(empty.as_array().unwrap().len(), 0);
}
