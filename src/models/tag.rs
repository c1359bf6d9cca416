//! Tag model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Catalogue tag. Every course carries exactly one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tag {
    pub id: i64,
    /// URL-friendly slug
    pub slug: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl Tag {
    /// Build an unsaved tag; the ID is assigned on insert.
    pub fn new(slug: String, name: String) -> Self {
        Self {
            id: 0,
            slug,
            name,
            created_at: Utc::now(),
        }
    }
}
