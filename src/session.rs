//! Per-session context handed to every view.

use std::sync::Arc;

use crate::api::{CourseRef, User};
use crate::config::Config;

/// Who is logged in and which course they are looking at.
///
/// Built once per session and shared read-only. Switching course builds a
/// new context rather than mutating this one.
#[derive(Debug, Clone)]
pub struct SessionContext {
  pub user: User,
  pub course: Option<CourseRef>,
  pub config: Arc<Config>,
}

impl SessionContext {
  pub fn new(user: User, course: Option<CourseRef>, config: Arc<Config>) -> Arc<Self> {
    Arc::new(Self {
      user,
      course,
      config,
    })
  }

  pub fn with_course(&self, course: CourseRef) -> Arc<Self> {
    Arc::new(Self {
      user: self.user.clone(),
      course: Some(course),
      config: Arc::clone(&self.config),
    })
  }

  pub fn course_id(&self) -> Option<u64> {
    self.course.as_ref().map(|c| c.id)
  }

  pub fn can_teach(&self) -> bool {
    self.user.can_teach()
  }

  pub fn is_admin(&self) -> bool {
    self.user.is_admin()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::{Role, UserStatus};

  fn student() -> User {
    User {
      id: 7,
      first_name: "Sam".to_string(),
      last_name: "Lee".to_string(),
      email: "sam@uni.edu".to_string(),
      role: Role::Student,
      status: UserStatus::Approved,
    }
  }

  #[test]
  fn test_with_course_leaves_original_untouched() {
    let ctx = SessionContext::new(student(), None, Arc::new(Config::default()));
    let switched = ctx.with_course(CourseRef {
      id: 3,
      name: "Physics".to_string(),
    });

    assert_eq!(ctx.course_id(), None);
    assert_eq!(switched.course_id(), Some(3));
    assert_eq!(switched.user, ctx.user);
    assert!(Arc::ptr_eq(&switched.config, &ctx.config));
  }

  #[test]
  fn test_roles() {
    let ctx = SessionContext::new(student(), None, Arc::new(Config::default()));
    assert!(!ctx.can_teach());
    assert!(!ctx.is_admin());
  }
}
