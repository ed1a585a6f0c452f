//! Cache keys for API reads and the prefixes each API write invalidates.

use crate::cache::QueryKey;

use super::types::UserStatus;

// ============================================================================
// Read keys
// ============================================================================

pub fn me() -> QueryKey {
  QueryKey::new("me")
}

pub fn courses() -> QueryKey {
  QueryKey::new("courses")
}

pub fn course(id: u64) -> QueryKey {
  QueryKey::new("course").with(id)
}

pub fn lectures(course_id: u64) -> QueryKey {
  QueryKey::new("lectures").with(course_id)
}

pub fn lecture(id: u64) -> QueryKey {
  QueryKey::new("lecture").with(id)
}

pub fn assignments(course_id: u64) -> QueryKey {
  QueryKey::new("assignments").with(course_id)
}

pub fn assignment(id: u64) -> QueryKey {
  QueryKey::new("assignment").with(id)
}

pub fn submissions(assignment_id: u64) -> QueryKey {
  QueryKey::new("submissions").with(assignment_id)
}

pub fn submission(id: u64) -> QueryKey {
  QueryKey::new("submission").with(id)
}

pub fn my_submission(assignment_id: u64) -> QueryKey {
  QueryKey::new("my-submission").with(assignment_id)
}

pub fn comments(submission_id: u64) -> QueryKey {
  QueryKey::new("comments").with(submission_id)
}

pub fn notifications() -> QueryKey {
  QueryKey::new("notifications")
}

/// Every user listing, whatever the status filter.
pub fn all_users() -> QueryKey {
  QueryKey::new("users")
}

pub fn users(status: UserStatus) -> QueryKey {
  all_users().with(status.as_str())
}

// ============================================================================
// Write invalidations
// ============================================================================

/// Key prefixes made stale by each write.
pub mod invalidates {
  use super::*;

  pub fn create_course() -> Vec<QueryKey> {
    vec![courses()]
  }

  pub fn update_course(id: u64) -> Vec<QueryKey> {
    vec![course(id), courses()]
  }

  pub fn delete_course(id: u64) -> Vec<QueryKey> {
    vec![course(id), courses(), lectures(id), assignments(id)]
  }

  pub fn create_lecture(course_id: u64) -> Vec<QueryKey> {
    vec![lectures(course_id)]
  }

  /// Update or delete.
  pub fn change_lecture(id: u64, course_id: u64) -> Vec<QueryKey> {
    vec![lecture(id), lectures(course_id)]
  }

  pub fn create_assignment(course_id: u64) -> Vec<QueryKey> {
    vec![assignments(course_id)]
  }

  pub fn update_assignment(id: u64, course_id: u64) -> Vec<QueryKey> {
    vec![assignment(id), assignments(course_id)]
  }

  pub fn delete_assignment(id: u64, course_id: u64) -> Vec<QueryKey> {
    vec![assignment(id), assignments(course_id), submissions(id)]
  }

  pub fn create_submission(assignment_id: u64) -> Vec<QueryKey> {
    vec![submissions(assignment_id), my_submission(assignment_id)]
  }

  pub fn grade_submission(id: u64, assignment_id: u64) -> Vec<QueryKey> {
    vec![
      submission(id),
      submissions(assignment_id),
      my_submission(assignment_id),
    ]
  }

  /// Add or delete.
  pub fn change_comment(submission_id: u64) -> Vec<QueryKey> {
    vec![comments(submission_id)]
  }

  pub fn mark_notification_read() -> Vec<QueryKey> {
    vec![notifications()]
  }

  /// Approve or archive.
  pub fn change_user_status() -> Vec<QueryKey> {
    vec![all_users()]
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn hits(prefixes: &[QueryKey], key: &QueryKey) -> bool {
    prefixes.iter().any(|p| key.starts_with(p))
  }

  #[test]
  fn test_update_assignment_scope() {
    let prefixes = invalidates::update_assignment(5, 9);

    assert!(hits(&prefixes, &assignment(5)));
    assert!(hits(&prefixes, &assignments(9)));
    assert!(!hits(&prefixes, &course(9)));
    assert!(!hits(&prefixes, &assignment(6)));
    assert!(!hits(&prefixes, &assignments(10)));
  }

  #[test]
  fn test_delete_course_cascades_to_children_lists() {
    let prefixes = invalidates::delete_course(3);

    assert!(hits(&prefixes, &courses()));
    assert!(hits(&prefixes, &lectures(3)));
    assert!(hits(&prefixes, &assignments(3)));
    assert!(!hits(&prefixes, &lectures(4)));
  }

  #[test]
  fn test_grading_refreshes_student_view() {
    let prefixes = invalidates::grade_submission(40, 5);
    assert!(hits(&prefixes, &my_submission(5)));
    assert!(hits(&prefixes, &submission(40)));
    assert!(!hits(&prefixes, &comments(40)));
  }

  #[test]
  fn test_user_status_change_covers_every_filter() {
    let prefixes = invalidates::change_user_status();
    assert!(hits(&prefixes, &users(UserStatus::Pending)));
    assert!(hits(&prefixes, &users(UserStatus::Archived)));
    assert!(!hits(&prefixes, &me()));
  }

  #[test]
  fn test_key_display() {
    assert_eq!(my_submission(5).to_string(), "my-submission:5");
    assert_eq!(users(UserStatus::Pending).to_string(), "users:pending");
  }
}
