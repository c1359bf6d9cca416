//! Services layer - Business logic
//!
//! One service per entity. Services are responsible for:
//! - Authorization (ownership of courses and lessons)
//! - Validation of action inputs
//! - Coordinating repositories, providers and the cache
//!
//! Error `Display` strings are the messages shown to the user.

pub mod checkout;
pub mod course;
pub mod lesson;
pub mod tag;
pub mod user;
pub mod video;

#[cfg(test)]
pub(crate) mod test_support;

pub use checkout::{CheckoutOutcome, CheckoutService, CheckoutServiceError, CreatedCheckout};
pub use course::{CourseService, CourseServiceError};
pub use lesson::{LessonService, LessonServiceError};
pub use tag::{TagService, TagServiceError};
pub use user::{UserService, UserServiceError};
pub use video::{VideoEventOutcome, VideoService, VideoServiceError};

/// Minimum length of names, slugs and descriptions in action forms
pub(crate) const MIN_FIELD_LEN: usize = 3;

/// Generate a URL-friendly slug: lowercase ASCII alphanumerics separated by
/// single hyphens.
pub fn generate_slug(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_hyphen = false;

    for c in name.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            slug.push(c);
            pending_hyphen = false;
        } else {
            pending_hyphen = true;
        }
    }

    slug
}

/// At least `MIN_FIELD_LEN` characters once surrounding whitespace is removed
pub(crate) fn long_enough(value: &str) -> bool {
    value.trim().chars().count() >= MIN_FIELD_LEN
}
