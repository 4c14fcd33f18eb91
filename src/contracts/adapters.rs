use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceLineItem {
    pub description: String,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub total: Decimal,
}

/// Invoice creation request. `idempotency_key` is the payment id, so a
/// re-submitted request for the same payment must not produce a second invoice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceRequest {
    pub organization_id: Uuid,
    pub client_id: Uuid,
    pub idempotency_key: Uuid,
    pub line_items: Vec<InvoiceLineItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedInvoice {
    pub id: String,
}

/// key: invoice-issuer -> external invoicing
#[async_trait]
pub trait InvoiceIssuer: Send + Sync {
    async fn issue(&self, request: &InvoiceRequest) -> Result<IssuedInvoice>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub recipient_id: Uuid,
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub metadata: Value,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<()>;
}

pub struct HttpInvoiceIssuer {
    client: reqwest::Client,
    base_url: String,
    auth_token: Option<String>,
}

impl HttpInvoiceIssuer {
    pub fn new(
        base_url: impl Into<String>,
        auth_token: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build invoice issuer client")?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            auth_token,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        let path = path.trim_start_matches('/');
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    fn auth(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some(token) = &self.auth_token {
            request.bearer_auth(token)
        } else {
            request
        }
    }
}

#[async_trait]
impl InvoiceIssuer for HttpInvoiceIssuer {
    async fn issue(&self, request: &InvoiceRequest) -> Result<IssuedInvoice> {
        let response = self
            .auth(self.client.post(self.endpoint("invoices")))
            .header("Idempotency-Key", request.idempotency_key.to_string())
            .json(request)
            .send()
            .await
            .context("failed to contact invoice issuer")?
            .error_for_status()
            .context("invoice issuer rejected invoice request")?;

        response
            .json::<IssuedInvoice>()
            .await
            .context("failed to decode invoice issuer response")
    }
}

pub struct HttpNotifier {
    client: reqwest::Client,
    base_url: String,
    auth_token: Option<String>,
}

impl HttpNotifier {
    pub fn new(
        base_url: impl Into<String>,
        auth_token: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build notifier client")?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            auth_token,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        let path = path.trim_start_matches('/');
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn notify(&self, notification: &Notification) -> Result<()> {
        let mut request = self.client.post(self.endpoint("notifications"));
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }
        request
            .json(notification)
            .send()
            .await
            .context("failed to contact notifier")?
            .error_for_status()
            .context("notifier rejected notification")?;
        Ok(())
    }
}

/// Writes notifications to the log. Used when no notification service is configured.
#[derive(Debug, Default, Clone)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(&self, notification: &Notification) -> Result<()> {
        info!(
            recipient = %notification.recipient_id,
            title = %notification.title,
            metadata = %notification.metadata,
            "{}",
            notification.body
        );
        Ok(())
    }
}
