//! Database repositories
//!
//! One repository per entity. Each exposes an async trait and a
//! `Sqlx*Repository` implementation that dispatches on the configured driver.

pub mod course;
pub mod enrollment;
pub mod lesson;
pub mod tag;
pub mod user;
pub mod video;

pub use course::{CourseFilter, CourseRepository, SqlxCourseRepository};
pub use enrollment::{EnrollmentRepository, SqlxEnrollmentRepository};
pub use lesson::{LessonRepository, SqlxLessonRepository};
pub use tag::{SqlxTagRepository, TagRepository};
pub use user::{SqlxUserRepository, UserRepository};
pub use video::{NewUpload, SqlxVideoRepository, VideoRepository};
