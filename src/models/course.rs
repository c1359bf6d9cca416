//! Course and enrollment models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{LessonWithVideo, Tag};

/// Course entity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Course {
    pub id: i64,
    /// Globally unique slug
    pub slug: String,
    pub name: String,
    pub description: String,
    /// Price in whole currency units
    pub price: i64,
    pub is_published: bool,
    pub teacher_id: i64,
    pub tag_id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Course {
    pub fn new(teacher_id: i64, input: &CreateCourseInput) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            slug: input.slug.clone(),
            name: input.name.clone(),
            description: input.description.clone(),
            price: input.price,
            is_published: false,
            teacher_id,
            tag_id: input.tag_id,
            created_at: now,
            updated_at: now,
        }
    }

    /// Price in the payment provider's minor units (cents).
    pub fn price_minor_units(&self) -> i64 {
        self.price * 100
    }

    /// Apply the fields present in `input`.
    pub fn apply(&mut self, input: &UpdateCourseInput) {
        if let Some(ref name) = input.name {
            self.name = name.clone();
        }
        if let Some(ref description) = input.description {
            self.description = description.clone();
        }
        if let Some(price) = input.price {
            self.price = price;
        }
        if let Some(tag_id) = input.tag_id {
            self.tag_id = tag_id;
        }
        if let Some(is_published) = input.is_published {
            self.is_published = is_published;
        }
    }
}

/// The teacher fields shown next to a course.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TeacherSummary {
    pub id: i64,
    pub external_id: String,
    pub name: Option<String>,
    pub image_url: Option<String>,
}

/// Course with its teacher and tag, as listed in the catalogue
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CourseSummary {
    #[serde(flatten)]
    pub course: Course,
    pub teacher: TeacherSummary,
    pub tag: Tag,
}

/// Course page: summary plus its lessons, oldest first.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CourseDetail {
    #[serde(flatten)]
    pub summary: CourseSummary,
    pub lessons: Vec<LessonWithVideo>,
}

impl CourseDetail {
    pub fn course(&self) -> &Course {
        &self.summary.course
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCourseInput {
    pub name: String,
    pub slug: String,
    pub description: String,
    pub price: i64,
    #[serde(alias = "tag_id")]
    pub tag_id: i64,
}

/// Partial course update
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCourseInput {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<i64>,
    #[serde(alias = "tag_id")]
    pub tag_id: Option<i64>,
    #[serde(alias = "is_published")]
    pub is_published: Option<bool>,
}

/// Grants a user access to a course's published lessons.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Enrollment {
    pub user_id: i64,
    pub course_id: i64,
    pub created_at: DateTime<Utc>,
}
