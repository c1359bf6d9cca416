//! Data models
//!
//! Entities stored by the repositories plus the input and view types the
//! services and API exchange:
//! - User (teachers and students are the same entity)
//! - Tag, Course, Lesson, Video, Enrollment

mod course;
mod lesson;
mod tag;
mod user;
mod video;

pub use course::{
    Course, CourseDetail, CourseSummary, CreateCourseInput, Enrollment, TeacherSummary,
    UpdateCourseInput,
};
pub use lesson::{CreateLessonInput, Lesson, LessonWithVideo, UpdateLessonInput};
pub use tag::Tag;
pub use user::{Creator, ProfileInput, UpsertUserInput, User, UserWithEnrollments};
pub use video::{Video, VideoPatch, VideoStatus};
