//! User model
//!
//! Users are created lazily from identity-provider claims the first time a
//! session token is seen. Any user can teach; a "creator" is simply a user
//! with at least one published course.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// User entity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    /// Unique identifier
    pub id: i64,
    /// Identity provider user ID (unique)
    pub external_id: String,
    pub email: String,
    pub name: Option<String>,
    pub image_url: Option<String>,
    pub bio: String,
    pub linkedin_url: String,
    pub x_url: String,
    pub github_url: String,
    pub website: String,
    /// Payment provider customer ID, set after the first completed checkout
    #[serde(skip_serializing)]
    pub payment_customer_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Name to show in the UI, falling back to the e-mail address.
    pub fn display_name(&self) -> &str {
        match self.name.as_deref() {
            Some(name) if !name.trim().is_empty() => name,
            _ => &self.email,
        }
    }
}

/// Identity fields copied from a verified session on every sign-in.
#[derive(Debug, Clone, Deserialize)]
pub struct UpsertUserInput {
    pub external_id: String,
    pub email: String,
    pub name: Option<String>,
    pub image_url: Option<String>,
}

/// Teacher profile form. Empty strings clear a field.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct ProfileInput {
    pub bio: String,
    #[serde(alias = "linkedin_url")]
    pub linked_in_url: String,
    #[serde(alias = "x_url")]
    pub x_url: String,
    #[serde(alias = "github_url")]
    pub github_url: String,
    pub website: String,
}

/// Public profile of a teacher
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Creator {
    pub external_id: String,
    pub name: Option<String>,
    pub image_url: Option<String>,
    pub bio: String,
    pub linkedin_url: String,
    pub x_url: String,
    pub github_url: String,
    pub website: String,
    /// Number of courses the creator teaches
    pub course_count: i64,
}

impl Creator {
    pub fn from_user(user: &User, course_count: i64) -> Self {
        Self {
            external_id: user.external_id.clone(),
            name: user.name.clone(),
            image_url: user.image_url.clone(),
            bio: user.bio.clone(),
            linkedin_url: user.linkedin_url.clone(),
            x_url: user.x_url.clone(),
            github_url: user.github_url.clone(),
            website: user.website.clone(),
            course_count,
        }
    }
}

/// A user together with the IDs of the courses they are enrolled in.
#[derive(Debug, Clone, Serialize)]
pub struct UserWithEnrollments {
    #[serde(flatten)]
    pub user: User,
    pub enrolled_course_ids: Vec<i64>,
}

impl UserWithEnrollments {
    pub fn is_enrolled(&self, course_id: i64) -> bool {
        self.enrolled_course_ids.contains(&course_id)
    }
}
