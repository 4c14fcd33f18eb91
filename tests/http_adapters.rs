use std::time::Duration;

use httpmock::prelude::*;
use maintenance_contracts::contracts::{
    HttpInvoiceIssuer, HttpNotifier, InvoiceIssuer, InvoiceLineItem, InvoiceRequest,
    Notification, Notifier,
};
use rust_decimal::Decimal;
use serde_json::json;
use uuid::Uuid;

fn sample_request() -> InvoiceRequest {
    InvoiceRequest {
        organization_id: Uuid::new_v4(),
        client_id: Uuid::new_v4(),
        idempotency_key: Uuid::new_v4(),
        line_items: vec![InvoiceLineItem {
            description: "Grand piano care - Jan 2025 - Feb 2025".to_string(),
            quantity: 1,
            unit_price: Decimal::new(10, 0),
            total: Decimal::new(10, 0),
        }],
        notes: Some("Contract CTR-2025-0001".to_string()),
    }
}

#[tokio::test]
async fn http_invoice_issuer_sends_idempotency_key_and_token() {
    let server = MockServer::start_async().await;
    let request = sample_request();

    let issue_mock = server.mock(|when, then| {
        when.method(POST)
            .path("/invoices")
            .header("Idempotency-Key", request.idempotency_key.to_string())
            .header("Authorization", "Bearer issuer-token")
            .json_body_partial(
                json!({ "client_id": request.client_id, "notes": "Contract CTR-2025-0001" })
                    .to_string(),
            );
        then.status(201).json_body(json!({ "id": "INV-2025-0042" }));
    });

    let issuer = HttpInvoiceIssuer::new(
        server.base_url(),
        Some("issuer-token".to_string()),
        Duration::from_secs(5),
    )
    .unwrap();
    let issued = issuer.issue(&request).await.unwrap();

    assert_eq!(issued.id, "INV-2025-0042");
    issue_mock.assert();
}

#[tokio::test]
async fn http_invoice_issuer_surfaces_rejections() {
    let server = MockServer::start_async().await;
    let issue_mock = server.mock(|when, then| {
        when.method(POST).path("/invoices");
        then.status(503).body("maintenance window");
    });

    let issuer =
        HttpInvoiceIssuer::new(format!("{}/", server.base_url()), None, Duration::from_secs(5))
            .unwrap();
    let error = issuer.issue(&sample_request()).await.unwrap_err();

    let message = format!("{error:#}");
    assert!(message.contains("invoice issuer rejected invoice request"));
    assert!(message.contains("503"));
    issue_mock.assert();
}

#[tokio::test]
async fn http_invoice_issuer_rejects_malformed_responses() {
    let server = MockServer::start_async().await;
    server.mock(|when, then| {
        when.method(POST).path("/invoices");
        then.status(200).body("not json");
    });

    let issuer = HttpInvoiceIssuer::new(server.base_url(), None, Duration::from_secs(5)).unwrap();
    let error = issuer.issue(&sample_request()).await.unwrap_err();

    assert!(format!("{error:#}").contains("failed to decode invoice issuer response"));
}

#[tokio::test]
async fn http_notifier_posts_notifications() {
    let server = MockServer::start_async().await;
    let recipient = Uuid::new_v4();

    let notify_mock = server.mock(|when, then| {
        when.method(POST)
            .path("/notifications")
            .header("Authorization", "Bearer notify-token")
            .json_body_partial(
                json!({
                    "recipient_id": recipient,
                    "title": "Your maintenance contract renews soon",
                })
                .to_string(),
            );
        then.status(202);
    });

    let notifier = HttpNotifier::new(
        server.base_url(),
        Some("notify-token".to_string()),
        Duration::from_secs(5),
    )
    .unwrap();
    notifier
        .notify(&Notification {
            recipient_id: recipient,
            title: "Your maintenance contract renews soon".to_string(),
            body: "Contract CTR-2025-0001 ends on 2026-01-01.".to_string(),
            metadata: json!({ "contract_number": "CTR-2025-0001" }),
        })
        .await
        .unwrap();

    notify_mock.assert();
}

#[tokio::test]
async fn http_notifier_reports_failures() {
    let server = MockServer::start_async().await;
    server.mock(|when, then| {
        when.method(POST).path("/notifications");
        then.status(500);
    });

    let notifier = HttpNotifier::new(server.base_url(), None, Duration::from_secs(5)).unwrap();
    let error = notifier
        .notify(&Notification {
            recipient_id: Uuid::new_v4(),
            title: "t".to_string(),
            body: "b".to_string(),
            metadata: json!({}),
        })
        .await
        .unwrap_err();

    assert!(format!("{error:#}").contains("notifier rejected notification"));
}
