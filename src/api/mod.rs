//! Remote data client for the Omniwise REST API.

mod cached_client;
mod client;
mod error;
pub mod keys;
mod types;

pub use cached_client::CachedClient;
pub use client::ApiClient;
pub use error::ApiError;
pub use types::{
  Assignment, AssignmentInput, Comment, CommentInput, Course, CourseInput, CourseRef, GradeInput,
  Lecture, LectureInput, Notification, Role, Submission, SubmissionFile, User, UserStatus,
};
