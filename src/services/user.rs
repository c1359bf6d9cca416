//! User service
//!
//! Users live at the identity provider; this service mirrors them locally
//! on every authenticated request and serves the public creator pages.

use crate::cache::{Cache, CacheLayer};
use crate::db::repositories::{EnrollmentRepository, UserRepository};
use crate::models::{Creator, ProfileInput, UpsertUserInput, User, UserWithEnrollments};
use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;

/// Number of creators shown on the home page
pub const TOP_CREATORS_LIMIT: i64 = 5;

const CACHE_KEY_CREATOR_BY_ID: &str = "creator:id:";
const CACHE_KEY_TOP_CREATORS: &str = "creator:top";
pub(crate) const CACHE_PREFIX_CREATOR: &str = "creator:";

/// Error types for user service operations
#[derive(Debug, thiserror::Error)]
pub enum UserServiceError {
    #[error("Unauthorized")]
    Unauthorized,

    #[error("User not found.")]
    NotFound,

    #[error("Form validation error.")]
    ValidationError,

    #[error("Failed to update the profile.")]
    UpdateFailed(#[source] anyhow::Error),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// User service
pub struct UserService {
    users: Arc<dyn UserRepository>,
    enrollments: Arc<dyn EnrollmentRepository>,
    cache: Arc<Cache>,
    cache_ttl: Duration,
}

impl UserService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        enrollments: Arc<dyn EnrollmentRepository>,
        cache: Arc<Cache>,
    ) -> Self {
        let cache_ttl = cache.default_ttl();
        Self {
            users,
            enrollments,
            cache,
            cache_ttl,
        }
    }

    /// Create or refresh the local row for a verified identity.
    pub async fn ensure_user(&self, input: &UpsertUserInput) -> Result<User, UserServiceError> {
        if input.external_id.is_empty() {
            return Err(UserServiceError::ValidationError);
        }
        let user = self
            .users
            .upsert(input)
            .await
            .context("Failed to upsert user")?;
        Ok(user)
    }

    /// Public profile of the user with `external_id`
    pub async fn get_creator_by_id(&self, external_id: &str) -> Result<Option<Creator>, UserServiceError> {
        let cache_key = format!("{}{}", CACHE_KEY_CREATOR_BY_ID, external_id);
        if let Some(creator) = self.cache.get::<Creator>(&cache_key).await.ok().flatten() {
            return Ok(Some(creator));
        }

        let Some(user) = self
            .users
            .get_by_external_id(external_id)
            .await
            .context("Failed to get user")?
        else {
            return Ok(None);
        };
        let course_count = self
            .users
            .course_count(user.id)
            .await
            .context("Failed to count courses")?;

        let creator = Creator::from_user(&user, course_count);
        let _ = self.cache.set(&cache_key, &creator, self.cache_ttl).await;
        Ok(Some(creator))
    }

    /// Users with at least one published course, most courses first
    pub async fn top_creators(&self) -> Result<Vec<Creator>, UserServiceError> {
        if let Some(creators) = self
            .cache
            .get::<Vec<Creator>>(CACHE_KEY_TOP_CREATORS)
            .await
            .ok()
            .flatten()
        {
            return Ok(creators);
        }

        let creators: Vec<Creator> = self
            .users
            .top_creators(TOP_CREATORS_LIMIT)
            .await
            .context("Failed to get top creators")?
            .iter()
            .map(|(user, count)| Creator::from_user(user, *count))
            .collect();

        let _ = self
            .cache
            .set(CACHE_KEY_TOP_CREATORS, &creators, self.cache_ttl)
            .await;
        Ok(creators)
    }

    /// Update the profile of `teacher_external_id`. Only the teacher may
    /// edit their own profile.
    pub async fn update_teacher_profile(
        &self,
        caller: &User,
        teacher_external_id: &str,
        input: &ProfileInput,
    ) -> Result<(), UserServiceError> {
        if caller.external_id != teacher_external_id {
            return Err(UserServiceError::Unauthorized);
        }

        let updated = self
            .users
            .update_profile(caller.id, input)
            .await
            .map_err(UserServiceError::UpdateFailed)?;
        if !updated {
            return Err(UserServiceError::UpdateFailed(anyhow::anyhow!(
                "user {} vanished during profile update",
                caller.id
            )));
        }

        let _ = self.cache.delete_prefix(CACHE_PREFIX_CREATOR).await;
        Ok(())
    }

    /// The user with `external_id` and the courses they are enrolled in
    pub async fn get_user(&self, external_id: &str) -> Result<UserWithEnrollments, UserServiceError> {
        let user = self
            .users
            .get_by_external_id(external_id)
            .await
            .context("Failed to get user")?
            .ok_or(UserServiceError::NotFound)?;
        let enrolled_course_ids = self
            .enrollments
            .course_ids_for_user(user.id)
            .await
            .context("Failed to list enrollments")?;

        Ok(UserWithEnrollments {
            user,
            enrolled_course_ids,
        })
    }
}
