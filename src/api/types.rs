//! Entities exchanged with the Omniwise REST API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::form::FormSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
  Student,
  Teacher,
  Admin,
}

/// Account lifecycle; new registrations wait for an admin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
  Pending,
  Approved,
  Archived,
}

impl UserStatus {
  pub fn as_str(&self) -> &'static str {
    match self {
      UserStatus::Pending => "pending",
      UserStatus::Approved => "approved",
      UserStatus::Archived => "archived",
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
  pub id: u64,
  pub first_name: String,
  pub last_name: String,
  pub email: String,
  pub role: Role,
  pub status: UserStatus,
}

impl User {
  pub fn full_name(&self) -> String {
    format!("{} {}", self.first_name, self.last_name)
  }

  /// Teachers and admins manage course content and grade.
  pub fn can_teach(&self) -> bool {
    matches!(self.role, Role::Teacher | Role::Admin)
  }

  pub fn is_admin(&self) -> bool {
    self.role == Role::Admin
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
  pub id: u64,
  pub name: String,
  #[serde(default)]
  pub description: Option<String>,
  pub owner_id: u64,
}

/// The part of a course kept as the session's current course.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseRef {
  pub id: u64,
  pub name: String,
}

impl From<&Course> for CourseRef {
  fn from(course: &Course) -> Self {
    CourseRef {
      id: course.id,
      name: course.name.clone(),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lecture {
  pub id: u64,
  pub course_id: u64,
  pub title: String,
  #[serde(default)]
  pub content: String,
  pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
  pub id: u64,
  pub course_id: u64,
  pub title: String,
  #[serde(default)]
  pub description: String,
  pub deadline: Option<DateTime<Utc>>,
  pub max_grade: Option<u32>,
}

impl Assignment {
  pub fn is_past_deadline(&self, now: DateTime<Utc>) -> bool {
    self.deadline.is_some_and(|d| now > d)
  }
}

impl FormSource for Assignment {
  type Id = u64;
  type Fields = AssignmentInput;

  fn form_id(&self) -> u64 {
    self.id
  }

  fn form_fields(&self) -> AssignmentInput {
    AssignmentInput {
      title: self.title.clone(),
      description: self.description.clone(),
      deadline: self.deadline,
      max_grade: self.max_grade,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionFile {
  pub id: u64,
  pub name: String,
  pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
  pub id: u64,
  pub assignment_id: u64,
  pub student_id: u64,
  #[serde(default)]
  pub student_name: String,
  pub submitted_at: DateTime<Utc>,
  pub grade: Option<u32>,
  #[serde(default)]
  pub files: Vec<SubmissionFile>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
  pub id: u64,
  pub submission_id: u64,
  pub author_id: u64,
  #[serde(default)]
  pub author_name: String,
  pub content: String,
  pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
  pub id: u64,
  pub message: String,
  #[serde(default)]
  pub read: bool,
  pub created_at: DateTime<Utc>,
}

// ============================================================================
// Request bodies
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseInput {
  pub name: String,
  pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LectureInput {
  pub title: String,
  pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentInput {
  pub title: String,
  pub description: String,
  pub deadline: Option<DateTime<Utc>>,
  pub max_grade: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CommentInput {
  pub content: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct GradeInput {
  pub grade: u32,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct LoginInput<'a> {
  pub email: &'a str,
  pub password: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct TokenResponse {
  pub token: String,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_user_from_api_json() {
    let user: User = serde_json::from_str(
      r#"{"id": 4, "firstName": "Ada", "lastName": "Byron", "email": "ada@uni.edu",
          "role": "teacher", "status": "approved"}"#,
    )
    .unwrap();

    assert_eq!(user.full_name(), "Ada Byron");
    assert!(user.can_teach());
    assert!(!user.is_admin());
  }

  #[test]
  fn test_assignment_defaults_and_form_fields() {
    let assignment: Assignment = serde_json::from_str(
      r#"{"id": 5, "courseId": 9, "title": "Essay", "deadline": null, "maxGrade": 10}"#,
    )
    .unwrap();

    assert_eq!(assignment.description, "");
    assert_eq!(assignment.form_id(), 5);
    let fields = assignment.form_fields();
    assert_eq!(fields.title, "Essay");
    assert_eq!(fields.max_grade, Some(10));
    assert!(!assignment.is_past_deadline(Utc::now()));
  }

  #[test]
  fn test_assignment_input_serializes_camel_case() {
    let input = AssignmentInput {
      title: "Lab".to_string(),
      description: String::new(),
      deadline: None,
      max_grade: Some(20),
    };
    let json = serde_json::to_value(&input).unwrap();
    assert_eq!(json["maxGrade"], 20);
  }

  #[test]
  fn test_user_status_wire_names() {
    let status: UserStatus = serde_json::from_str(r#""pending""#).unwrap();
    assert_eq!(status, UserStatus::Pending);
    assert_eq!(UserStatus::Archived.as_str(), "archived");
  }
}
