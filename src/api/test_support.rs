//! Router harness for API tests: the full application router over a
//! [`TestEnv`], with helpers to mint session tokens and send requests.

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

use crate::api::{build_router, AppState};
use crate::config::{AuthConfig, PaymentsConfig};
use crate::providers::{SessionClaims, SessionTokenVerifier};
use crate::services::test_support::TestEnv;
use crate::services::CheckoutService;

pub const VIDEO_WEBHOOK_SECRET: &str = "whsec_video";
pub const PAYMENTS_WEBHOOK_SECRET: &str = "whsec_payments";
pub const STOREFRONT: &str = "http://localhost:3000";

pub struct TestApp {
    pub env: TestEnv,
    pub verifier: SessionTokenVerifier,
    pub state: AppState,
    router: Router,
}

impl TestApp {
    pub async fn new() -> Self {
        let env = TestEnv::new().await;
        let verifier = SessionTokenVerifier::new(&AuthConfig {
            session_secret: "test-session-secret".to_string(),
            ..AuthConfig::default()
        });

        let payments = PaymentsConfig {
            webhook_secret: PAYMENTS_WEBHOOK_SECRET.to_string(),
            dev_refunds: true,
            ..PaymentsConfig::default()
        };
        let state = AppState {
            identity: Arc::new(verifier.clone()),
            user_service: Arc::new(env.user_service()),
            tag_service: Arc::new(env.tag_service()),
            course_service: Arc::new(env.course_service()),
            lesson_service: Arc::new(env.lesson_service()),
            video_service: Arc::new(env.video_service().with_webhook_secret(VIDEO_WEBHOOK_SECRET)),
            checkout_service: Arc::new(CheckoutService::new(
                env.courses.clone(),
                env.lessons.clone(),
                env.users.clone(),
                env.enrollments.clone(),
                env.payments.clone(),
                &payments,
            )),
            public_origin: STOREFRONT.to_string(),
        };

        Self {
            router: build_router(state.clone(), STOREFRONT),
            state,
            env,
            verifier,
        }
    }

    /// A valid session token for `external_id`
    pub fn token(&self, external_id: &str) -> String {
        self.verifier
            .issue(&SessionClaims {
                sub: external_id.to_string(),
                email: format!("{}@example.com", external_id),
                name: Some(external_id.to_string()),
                image_url: None,
                exp: Utc::now().timestamp() + 3600,
                nbf: None,
                iss: None,
            })
            .unwrap()
    }

    pub async fn get(&self, path: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.send(Method::GET, path, token, None).await
    }

    pub async fn send(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(path);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let body = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(serde_json::to_vec(&json).unwrap())
            }
            None => Body::empty(),
        };
        self.call(builder.body(body).unwrap()).await
    }

    /// POST a raw body with extra headers, as webhook senders do
    pub async fn post_raw(&self, path: &str, headers: &[(&str, &str)], body: Vec<u8>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(Method::POST).uri(path);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        self.call(builder.body(Body::from(body)).unwrap()).await
    }

    async fn call(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }
}
