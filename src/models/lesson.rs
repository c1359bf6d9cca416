//! Lesson model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Video;

/// Lesson entity. Slugs are unique within a course.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Lesson {
    pub id: i64,
    pub course_id: i64,
    pub slug: String,
    pub name: String,
    /// Rich-text document produced by the lesson editor
    pub content: Option<serde_json::Value>,
    pub is_published: bool,
    /// Free previews can be watched without enrolling
    pub is_free: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Lesson {
    pub fn new(course_id: i64, slug: String, name: String) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            course_id,
            slug,
            name,
            content: None,
            is_published: false,
            is_free: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply the fields present in `input`.
    pub fn apply(&mut self, input: &UpdateLessonInput) {
        if let Some(ref name) = input.name {
            self.name = name.clone();
        }
        if let Some(ref content) = input.content {
            self.content = Some(content.clone());
        }
        if let Some(is_free) = input.is_free {
            self.is_free = is_free;
        }
        if let Some(is_published) = input.is_published {
            self.is_published = is_published;
        }
    }
}

/// Lesson joined with its video, if one was ever uploaded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LessonWithVideo {
    #[serde(flatten)]
    pub lesson: Lesson,
    pub video: Option<Video>,
}

impl LessonWithVideo {
    pub fn has_ready_video(&self) -> bool {
        self.video.as_ref().is_some_and(Video::is_ready)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateLessonInput {
    pub name: String,
    pub slug: String,
}

/// Partial lesson update
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateLessonInput {
    pub name: Option<String>,
    pub content: Option<serde_json::Value>,
    #[serde(alias = "is_free")]
    pub is_free: Option<bool>,
    #[serde(alias = "is_published")]
    pub is_published: Option<bool>,
}
