//! Payment processor client
//!
//! Purchases go through hosted checkout sessions. The session carries the
//! course id and the buyer's external user id in its metadata, so either
//! the success redirect or the `checkout.session.completed` webhook can
//! reconcile the enrollment on its own.

use crate::config::PaymentsConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Metadata key holding the purchased course id
pub const METADATA_COURSE_ID: &str = "courseId";
/// Metadata key holding the buyer's external user id
pub const METADATA_USER_ID: &str = "userId";

/// Placeholder the processor substitutes in the success URL
pub const SESSION_ID_PLACEHOLDER: &str = "{CHECKOUT_SESSION_ID}";

/// Who is paying: an existing customer record, or an e-mail to create one
#[derive(Debug, Clone, PartialEq)]
pub enum Payer {
    Customer(String),
    Email(String),
}

/// A single-course purchase
#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutRequest {
    pub course_id: i64,
    pub course_name: String,
    pub course_description: String,
    /// Price in minor units (cents)
    pub unit_amount: i64,
    pub currency: String,
    pub payer: Payer,
    pub user_external_id: String,
    pub success_url: String,
    pub cancel_url: String,
}

impl CheckoutRequest {
    /// Form fields in the processor's bracketed encoding
    fn form_fields(&self) -> Vec<(String, String)> {
        let mut fields: Vec<(String, String)> = vec![
            ("mode".into(), "payment".into()),
            ("allow_promotion_codes".into(), "true".into()),
            ("invoice_creation[enabled]".into(), "true".into()),
            ("line_items[0][quantity]".into(), "1".into()),
            ("line_items[0][price_data][currency]".into(), self.currency.clone()),
            (
                "line_items[0][price_data][unit_amount]".into(),
                self.unit_amount.to_string(),
            ),
            (
                "line_items[0][price_data][product_data][name]".into(),
                self.course_name.clone(),
            ),
            ("success_url".into(), self.success_url.clone()),
            ("cancel_url".into(), self.cancel_url.clone()),
            (
                format!("metadata[{}]", METADATA_COURSE_ID),
                self.course_id.to_string(),
            ),
            (
                format!("metadata[{}]", METADATA_USER_ID),
                self.user_external_id.clone(),
            ),
        ];

        if !self.course_description.is_empty() {
            fields.push((
                "line_items[0][price_data][product_data][description]".into(),
                self.course_description.clone(),
            ));
        }

        match &self.payer {
            Payer::Customer(id) => fields.push(("customer".into(), id.clone())),
            Payer::Email(email) => fields.push(("customer_email".into(), email.clone())),
        }

        fields
    }
}

/// A checkout session as reported by the processor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub customer: Option<String>,
    #[serde(default)]
    pub payment_status: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl CheckoutSession {
    /// Whether the buyer should get access
    pub fn is_paid(&self) -> bool {
        matches!(self.payment_status.as_str(), "paid" | "no_payment_required")
    }

    pub fn course_id(&self) -> Option<i64> {
        self.metadata
            .get(METADATA_COURSE_ID)
            .and_then(|id| id.parse().ok())
    }

    pub fn user_external_id(&self) -> Option<&str> {
        self.metadata
            .get(METADATA_USER_ID)
            .map(String::as_str)
            .filter(|id| !id.is_empty())
    }
}

#[async_trait]
pub trait PaymentProvider: Send + Sync {
    async fn create_checkout_session(&self, request: &CheckoutRequest) -> Result<CheckoutSession>;

    /// Look up a session. Unknown ids yield `None`.
    async fn retrieve_checkout_session(&self, session_id: &str) -> Result<Option<CheckoutSession>>;
}

/// Stripe API client
pub struct StripeClient {
    client: reqwest::Client,
    api_url: String,
    secret_key: String,
}

impl std::fmt::Debug for StripeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeClient")
            .field("api_url", &self.api_url)
            .finish_non_exhaustive()
    }
}

impl StripeClient {
    pub fn new(config: &PaymentsConfig) -> Result<Self> {
        Ok(Self {
            client: super::http_client()?,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            secret_key: config.secret_key.clone(),
        })
    }
}

#[async_trait]
impl PaymentProvider for StripeClient {
    async fn create_checkout_session(&self, request: &CheckoutRequest) -> Result<CheckoutSession> {
        let response = self
            .client
            .post(format!("{}/v1/checkout/sessions", self.api_url))
            .bearer_auth(&self.secret_key)
            .form(&request.form_fields())
            .send()
            .await
            .context("Failed to create checkout session")?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("Payment processor rejected checkout session ({}): {}", status, text);
        }

        response
            .json()
            .await
            .context("Failed to parse checkout session")
    }

    async fn retrieve_checkout_session(&self, session_id: &str) -> Result<Option<CheckoutSession>> {
        let response = self
            .client
            .get(format!(
                "{}/v1/checkout/sessions/{}",
                self.api_url,
                urlencoding::encode(session_id)
            ))
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .context("Failed to retrieve checkout session")?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            anyhow::bail!("Payment processor returned {} for session {}", status, session_id);
        }

        let session = response
            .json()
            .await
            .context("Failed to parse checkout session")?;
        Ok(Some(session))
    }
}

// ============================================================================
// Webhook payloads
// ============================================================================

/// Event type sent when a buyer finishes checkout
pub const CHECKOUT_COMPLETED: &str = "checkout.session.completed";

/// A payment processor webhook delivery
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentWebhookEvent {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: PaymentEventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentEventData {
    pub object: serde_json::Value,
}

impl PaymentWebhookEvent {
    /// The event object as a checkout session, for checkout events
    pub fn checkout_session(&self) -> Option<CheckoutSession> {
        if !self.event_type.starts_with("checkout.session.") {
            return None;
        }
        serde_json::from_value(self.data.object.clone()).ok()
    }
}
