//! Clients for the hosted services the marketplace depends on
//!
//! - `identity`: verifies session tokens issued by the auth provider
//! - `video`: direct uploads and asset management at the video platform
//! - `payments`: checkout sessions at the payment processor
//! - `signature`: the timestamped HMAC scheme both webhooks are signed with

pub mod identity;
pub mod payments;
pub mod signature;
pub mod video;

pub use identity::{IdentityVerifier, SessionClaims, SessionTokenVerifier, TokenError};
pub use payments::{
    CheckoutRequest, CheckoutSession, Payer, PaymentProvider, PaymentWebhookEvent, StripeClient,
};
pub use signature::SignatureError;
pub use video::{DirectUpload, MuxClient, VideoEventData, VideoProvider, VideoWebhookEvent};

use std::time::Duration;

/// Request timeout for provider API calls
pub(crate) const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

pub(crate) fn http_client() -> anyhow::Result<reqwest::Client> {
    use anyhow::Context;

    reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .user_agent(concat!("coursehub/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to build HTTP client")
}
