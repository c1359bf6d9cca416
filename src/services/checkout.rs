//! Checkout service
//!
//! Course purchases through hosted checkout. Enrollment is reconciled from
//! the session's metadata, either when the buyer lands back on the success
//! URL or when the processor's `checkout.session.completed` webhook
//! arrives. Both paths converge on the same idempotent insert.

use crate::config::PaymentsConfig;
use crate::db::repositories::{CourseRepository, EnrollmentRepository, LessonRepository, UserRepository};
use crate::models::User;
use crate::providers::payments::{CHECKOUT_COMPLETED, SESSION_ID_PLACEHOLDER};
use crate::providers::signature::{self, SignatureError, DEFAULT_TOLERANCE_SECS};
use crate::providers::{CheckoutRequest, CheckoutSession, Payer, PaymentProvider, PaymentWebhookEvent};
use anyhow::Context;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;

/// Error types for checkout operations
#[derive(Debug, thiserror::Error)]
pub enum CheckoutServiceError {
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Sign in to purchase the course.")]
    SignInRequired,

    #[error("Course not found or not published.")]
    CourseUnavailable,

    #[error("User not found.")]
    UserNotFound,

    #[error("Already enrolled in the course.")]
    AlreadyEnrolled,

    #[error("Failed to create the checkout session.")]
    CreateFailed(#[source] anyhow::Error),

    #[error("Missing checkout session ID.")]
    MissingSessionId,

    #[error("Failed to retrieve the checkout session.")]
    RetrieveFailed(#[source] anyhow::Error),

    #[error("Invalid checkout session.")]
    InvalidSession,

    #[error("Payment has not been completed.")]
    NotPaid,

    #[error("Course not found.")]
    CourseNotFound,

    #[error("Not enrolled in the course.")]
    NotEnrolled,

    #[error("Refunds are not available.")]
    RefundsDisabled,

    #[error("Payment webhook secret is not configured")]
    WebhookNotConfigured,

    #[error("Error occurred")]
    InvalidSignature(#[source] SignatureError),

    #[error("Error occurred")]
    InvalidPayload(#[source] serde_json::Error),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// A freshly created checkout session
#[derive(Debug, Clone, Serialize)]
pub struct CreatedCheckout {
    pub session_id: String,
    pub url: Option<String>,
}

/// Result of reconciling a paid session
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutOutcome {
    pub session: CheckoutSession,
    pub course_slug: String,
    /// First published lesson, where the buyer is sent to start learning
    pub first_lesson_slug: Option<String>,
    /// False when the enrollment already existed
    pub newly_enrolled: bool,
}

/// Checkout service
pub struct CheckoutService {
    courses: Arc<dyn CourseRepository>,
    lessons: Arc<dyn LessonRepository>,
    users: Arc<dyn UserRepository>,
    enrollments: Arc<dyn EnrollmentRepository>,
    payments: Arc<dyn PaymentProvider>,
    currency: String,
    webhook_secret: String,
    dev_refunds: bool,
}

impl CheckoutService {
    pub fn new(
        courses: Arc<dyn CourseRepository>,
        lessons: Arc<dyn LessonRepository>,
        users: Arc<dyn UserRepository>,
        enrollments: Arc<dyn EnrollmentRepository>,
        payments: Arc<dyn PaymentProvider>,
        config: &PaymentsConfig,
    ) -> Self {
        Self {
            courses,
            lessons,
            users,
            enrollments,
            payments,
            currency: config.currency.clone(),
            webhook_secret: config.webhook_secret.clone(),
            dev_refunds: config.dev_refunds,
        }
    }

    /// Start a purchase of `course_id`. `origin` is the storefront base URL
    /// the buyer returns to.
    pub async fn create_checkout_session(
        &self,
        user: Option<&User>,
        course_id: i64,
        origin: &str,
    ) -> Result<CreatedCheckout, CheckoutServiceError> {
        let user = user.ok_or(CheckoutServiceError::SignInRequired)?;

        let course = self
            .courses
            .get_by_id(course_id)
            .await
            .context("Failed to get course")?
            .filter(|c| c.is_published)
            .ok_or(CheckoutServiceError::CourseUnavailable)?;

        // Re-read the buyer so a customer id stored by an earlier purchase is seen
        let user = self
            .users
            .get_by_id(user.id)
            .await
            .context("Failed to get user")?
            .ok_or(CheckoutServiceError::UserNotFound)?;

        let enrolled = self
            .enrollments
            .is_enrolled(user.id, course.id)
            .await
            .context("Failed to check enrollment")?;
        if enrolled {
            return Err(CheckoutServiceError::AlreadyEnrolled);
        }

        let origin = origin.trim_end_matches('/');
        let payer = match user.payment_customer_id.as_deref().filter(|id| !id.is_empty()) {
            Some(customer) => Payer::Customer(customer.to_string()),
            None => Payer::Email(user.email.clone()),
        };
        let request = CheckoutRequest {
            course_id: course.id,
            course_name: course.name.clone(),
            course_description: course.description.clone(),
            unit_amount: course.price_minor_units(),
            currency: self.currency.clone(),
            payer,
            user_external_id: user.external_id.clone(),
            success_url: format!(
                "{}/courses/{}/checkout?sessionId={}",
                origin, course.slug, SESSION_ID_PLACEHOLDER
            ),
            cancel_url: format!("{}/courses/{}", origin, course.slug),
        };

        let session = self
            .payments
            .create_checkout_session(&request)
            .await
            .map_err(CheckoutServiceError::CreateFailed)?;

        tracing::info!(
            "Checkout session {} created for course '{}' by user {}",
            session.id,
            course.slug,
            user.id
        );
        Ok(CreatedCheckout {
            session_id: session.id,
            url: session.url,
        })
    }

    /// Reconcile the session the buyer returned with.
    pub async fn retrieve_checkout_session(
        &self,
        _user: &User,
        session_id: &str,
    ) -> Result<CheckoutOutcome, CheckoutServiceError> {
        let session_id = session_id.trim();
        if session_id.is_empty() {
            return Err(CheckoutServiceError::MissingSessionId);
        }

        let session = self
            .payments
            .retrieve_checkout_session(session_id)
            .await
            .map_err(CheckoutServiceError::RetrieveFailed)?
            .ok_or_else(|| {
                CheckoutServiceError::RetrieveFailed(anyhow::anyhow!(
                    "checkout session {} does not exist",
                    session_id
                ))
            })?;

        self.reconcile(session).await
    }

    /// Verify and apply a raw payment webhook delivery. Returns the
    /// reconciliation for completed checkouts, `None` for other events.
    pub async fn handle_webhook(
        &self,
        signature_header: Option<&str>,
        body: &[u8],
    ) -> Result<Option<CheckoutOutcome>, CheckoutServiceError> {
        self.handle_webhook_at(signature_header, body, Utc::now().timestamp())
            .await
    }

    pub(crate) async fn handle_webhook_at(
        &self,
        signature_header: Option<&str>,
        body: &[u8],
        now: i64,
    ) -> Result<Option<CheckoutOutcome>, CheckoutServiceError> {
        match signature::verify(
            &self.webhook_secret,
            signature_header,
            body,
            now,
            DEFAULT_TOLERANCE_SECS,
        ) {
            Ok(()) => {}
            Err(SignatureError::MissingSecret) => return Err(CheckoutServiceError::WebhookNotConfigured),
            Err(e) => {
                tracing::warn!("Rejected payment webhook: {}", e);
                return Err(CheckoutServiceError::InvalidSignature(e));
            }
        }

        let event: PaymentWebhookEvent =
            serde_json::from_slice(body).map_err(CheckoutServiceError::InvalidPayload)?;
        if event.event_type != CHECKOUT_COMPLETED {
            tracing::debug!("Ignoring payment event {} ({})", event.event_type, event.id);
            return Ok(None);
        }

        let session = event
            .checkout_session()
            .ok_or(CheckoutServiceError::InvalidSession)?;
        self.reconcile(session).await.map(Some)
    }

    /// Remove the caller's enrollment. Development only; no money moves.
    pub async fn refund_course(&self, user: &User, course_id: i64) -> Result<(), CheckoutServiceError> {
        if !self.dev_refunds {
            return Err(CheckoutServiceError::RefundsDisabled);
        }

        let course = self
            .courses
            .get_by_id(course_id)
            .await
            .context("Failed to get course")?
            .ok_or(CheckoutServiceError::CourseNotFound)?;

        let removed = self
            .enrollments
            .remove(user.id, course.id)
            .await
            .context("Failed to remove enrollment")?;
        if !removed {
            return Err(CheckoutServiceError::NotEnrolled);
        }

        tracing::info!("Enrollment of user {} in course '{}' refunded", user.id, course.slug);
        Ok(())
    }

    async fn reconcile(&self, session: CheckoutSession) -> Result<CheckoutOutcome, CheckoutServiceError> {
        let (Some(course_id), Some(external_id)) = (session.course_id(), session.user_external_id())
        else {
            return Err(CheckoutServiceError::InvalidSession);
        };
        if !session.is_paid() {
            return Err(CheckoutServiceError::NotPaid);
        }

        let course = self
            .courses
            .get_by_id(course_id)
            .await
            .context("Failed to get course")?
            .ok_or(CheckoutServiceError::CourseNotFound)?;
        let first_lesson_slug = self
            .lessons
            .list_by_course(course.id, true)
            .await
            .context("Failed to list lessons")?
            .into_iter()
            .next()
            .map(|l| l.lesson.slug);

        let user = self
            .users
            .get_by_external_id(external_id)
            .await
            .context("Failed to get user")?
            .ok_or(CheckoutServiceError::UserNotFound)?;

        let newly_enrolled = self
            .enrollments
            .enroll(user.id, course.id)
            .await
            .context("Failed to enroll user")?;

        if let Some(customer) = session.customer.as_deref().filter(|c| !c.is_empty()) {
            if user.payment_customer_id.as_deref() != Some(customer) {
                self.users
                    .set_payment_customer_id(user.id, customer)
                    .await
                    .context("Failed to store payment customer")?;
            }
        }

        if newly_enrolled {
            tracing::info!("User {} enrolled in course '{}'", user.id, course.slug);
        }
        Ok(CheckoutOutcome {
            session,
            course_slug: course.slug,
            first_lesson_slug,
            newly_enrolled,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Course;
    use crate::services::test_support::TestEnv;
    use std::collections::HashMap;

    struct Fixture {
        env: TestEnv,
        student: User,
        course: Course,
    }

    async fn fixture() -> Fixture {
        let env = TestEnv::new().await;
        let teacher = env.user("teacher").await;
        let student = env.user("student").await;
        let tag = env.tag("Development").await;
        let course = env.course(&teacher, &tag, "paid-course").await;
        let lesson = env.lesson(&course, "welcome").await;
        env.publish_lesson(&lesson, false).await;
        env.publish_course(&course).await;
        Fixture { env, student, course }
    }

    fn paid_session(id: &str, course_id: i64, user: &str) -> CheckoutSession {
        let mut metadata = HashMap::new();
        metadata.insert("courseId".to_string(), course_id.to_string());
        metadata.insert("userId".to_string(), user.to_string());
        CheckoutSession {
            id: id.to_string(),
            url: None,
            customer: Some("cus_42".to_string()),
            payment_status: "paid".to_string(),
            metadata,
        }
    }

    #[tokio::test]
    async fn test_create_checkout_session() {
        let f = fixture().await;
        let service = f.env.checkout_service(false);

        let created = service
            .create_checkout_session(Some(&f.student), f.course.id, "http://localhost:3000/")
            .await
            .unwrap();
        assert_eq!(created.session_id, "cs_test_1");

        let request = f.env.payments.last_request().unwrap();
        assert_eq!(request.unit_amount, 2500);
        assert_eq!(request.payer, Payer::Email("student@example.com".to_string()));
        assert_eq!(request.user_external_id, "student");
        assert_eq!(
            request.success_url,
            "http://localhost:3000/courses/paid-course/checkout?sessionId={CHECKOUT_SESSION_ID}"
        );
        assert_eq!(request.cancel_url, "http://localhost:3000/courses/paid-course");
    }

    #[tokio::test]
    async fn test_create_checkout_session_preconditions() {
        let f = fixture().await;
        let service = f.env.checkout_service(false);

        let anonymous = service.create_checkout_session(None, f.course.id, "http://x").await;
        assert!(matches!(anonymous, Err(CheckoutServiceError::SignInRequired)));

        let missing = service.create_checkout_session(Some(&f.student), 9999, "http://x").await;
        assert!(matches!(missing, Err(CheckoutServiceError::CourseUnavailable)));

        f.env.courses.set_published(f.course.id, false).await.unwrap();
        let draft = service.create_checkout_session(Some(&f.student), f.course.id, "http://x").await;
        assert!(matches!(draft, Err(CheckoutServiceError::CourseUnavailable)));
        f.env.courses.set_published(f.course.id, true).await.unwrap();

        f.env.enrollments.enroll(f.student.id, f.course.id).await.unwrap();
        let again = service.create_checkout_session(Some(&f.student), f.course.id, "http://x").await;
        assert!(matches!(again, Err(CheckoutServiceError::AlreadyEnrolled)));
    }

    #[tokio::test]
    async fn test_retrieve_enrolls_once_and_stores_customer() {
        let f = fixture().await;
        let service = f.env.checkout_service(false);
        f.env.payments.put_session(paid_session("cs_paid", f.course.id, "student"));

        let outcome = service.retrieve_checkout_session(&f.student, "cs_paid").await.unwrap();
        assert!(outcome.newly_enrolled);
        assert_eq!(outcome.course_slug, "paid-course");
        assert_eq!(outcome.first_lesson_slug.as_deref(), Some("welcome"));
        assert!(f.env.enrollments.is_enrolled(f.student.id, f.course.id).await.unwrap());

        let again = service.retrieve_checkout_session(&f.student, "cs_paid").await.unwrap();
        assert!(!again.newly_enrolled);
        assert_eq!(f.env.enrollments.count_for_course(f.course.id).await.unwrap(), 1);

        let user = f.env.users.get_by_id(f.student.id).await.unwrap().unwrap();
        assert_eq!(user.payment_customer_id.as_deref(), Some("cus_42"));
    }

    #[tokio::test]
    async fn test_returning_customer_is_reused() {
        let f = fixture().await;
        f.env.users.set_payment_customer_id(f.student.id, "cus_old").await.unwrap();

        f.env
            .checkout_service(false)
            .create_checkout_session(Some(&f.student), f.course.id, "http://x")
            .await
            .unwrap();

        let request = f.env.payments.last_request().unwrap();
        assert_eq!(request.payer, Payer::Customer("cus_old".to_string()));
    }

    #[tokio::test]
    async fn test_retrieve_failures() {
        let f = fixture().await;
        let service = f.env.checkout_service(false);

        let empty = service.retrieve_checkout_session(&f.student, " ").await;
        assert!(matches!(empty, Err(CheckoutServiceError::MissingSessionId)));

        let unknown = service.retrieve_checkout_session(&f.student, "cs_missing").await;
        assert!(matches!(unknown, Err(CheckoutServiceError::RetrieveFailed(_))));

        let mut unpaid = paid_session("cs_unpaid", f.course.id, "student");
        unpaid.payment_status = "unpaid".to_string();
        f.env.payments.put_session(unpaid);
        let result = service.retrieve_checkout_session(&f.student, "cs_unpaid").await;
        assert!(matches!(result, Err(CheckoutServiceError::NotPaid)));
        assert!(!f.env.enrollments.is_enrolled(f.student.id, f.course.id).await.unwrap());

        let mut bare = paid_session("cs_bare", f.course.id, "student");
        bare.metadata.clear();
        f.env.payments.put_session(bare);
        let result = service.retrieve_checkout_session(&f.student, "cs_bare").await;
        assert!(matches!(result, Err(CheckoutServiceError::InvalidSession)));

        f.env.payments.put_session(paid_session("cs_ghost", f.course.id, "ghost"));
        let result = service.retrieve_checkout_session(&f.student, "cs_ghost").await;
        assert!(matches!(result, Err(CheckoutServiceError::UserNotFound)));

        f.env.payments.put_session(paid_session("cs_gone", 9999, "student"));
        let result = service.retrieve_checkout_session(&f.student, "cs_gone").await;
        assert!(matches!(result, Err(CheckoutServiceError::CourseNotFound)));
    }

    #[tokio::test]
    async fn test_webhook_completes_enrollment() {
        let f = fixture().await;
        let secret = "whsec_payments";
        let config = PaymentsConfig {
            webhook_secret: secret.to_string(),
            ..PaymentsConfig::default()
        };
        let service = CheckoutService::new(
            f.env.courses.clone(),
            f.env.lessons.clone(),
            f.env.users.clone(),
            f.env.enrollments.clone(),
            f.env.payments.clone(),
            &config,
        );
        let body = serde_json::to_vec(&serde_json::json!({
            "id": "evt_1",
            "type": "checkout.session.completed",
            "data": {"object": paid_session("cs_hook", f.course.id, "student")}
        }))
        .unwrap();
        let now = 1_700_000_000;
        let header = signature::sign(secret, &body, now);

        let outcome = service.handle_webhook_at(Some(header.as_str()), &body, now).await.unwrap();
        assert!(outcome.unwrap().newly_enrolled);

        // replayed delivery is a no-op
        let replay = service.handle_webhook_at(Some(header.as_str()), &body, now).await.unwrap();
        assert!(!replay.unwrap().newly_enrolled);

        let stale = service.handle_webhook_at(Some(header.as_str()), &body, now + 600).await;
        assert!(matches!(stale, Err(CheckoutServiceError::InvalidSignature(_))));
    }

    #[tokio::test]
    async fn test_webhook_ignores_other_events_and_needs_secret() {
        let f = fixture().await;
        let secret = "whsec_payments";
        let config = PaymentsConfig {
            webhook_secret: secret.to_string(),
            ..PaymentsConfig::default()
        };
        let service = CheckoutService::new(
            f.env.courses.clone(),
            f.env.lessons.clone(),
            f.env.users.clone(),
            f.env.enrollments.clone(),
            f.env.payments.clone(),
            &config,
        );
        let body = br#"{"id":"evt_2","type":"invoice.paid","data":{"object":{"id":"in_1"}}}"#;
        let header = signature::sign(secret, body, 100);
        assert!(service.handle_webhook_at(Some(header.as_str()), body, 100).await.unwrap().is_none());

        let unconfigured = f.env.checkout_service(false);
        let result = unconfigured.handle_webhook_at(Some(header.as_str()), body, 100).await;
        assert!(matches!(result, Err(CheckoutServiceError::WebhookNotConfigured)));
    }

    #[tokio::test]
    async fn test_refund_course() {
        let f = fixture().await;

        let disabled = f.env.checkout_service(false).refund_course(&f.student, f.course.id).await;
        assert!(matches!(disabled, Err(CheckoutServiceError::RefundsDisabled)));

        let service = f.env.checkout_service(true);
        let not_enrolled = service.refund_course(&f.student, f.course.id).await;
        assert!(matches!(not_enrolled, Err(CheckoutServiceError::NotEnrolled)));

        f.env.enrollments.enroll(f.student.id, f.course.id).await.unwrap();
        service.refund_course(&f.student, f.course.id).await.unwrap();
        assert!(!f.env.enrollments.is_enrolled(f.student.id, f.course.id).await.unwrap());

        let missing = service.refund_course(&f.student, 9999).await;
        assert!(matches!(missing, Err(CheckoutServiceError::CourseNotFound)));
    }
}
