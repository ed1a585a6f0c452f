//! Cached Omniwise client that wraps ApiClient with the shared query cache.

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use crate::cache::{Cached, Mutation, MutationCoordinator, QueryCache, QueryKey};
use crate::config::Config;

use super::client::ApiClient;
use super::error::ApiError;
use super::keys::{self, invalidates};
use super::types::{
  Assignment, AssignmentInput, Comment, Course, CourseInput, Lecture, LectureInput, Notification,
  Submission, User, UserStatus,
};

/// Omniwise client with request deduplication and write invalidation.
///
/// Exposes the same operations as ApiClient. Reads go through the query
/// cache under the keys in `keys`; writes run as mutations that invalidate
/// the prefixes listed in `keys::invalidates` once they succeed. Clones share
/// one cache.
#[derive(Clone)]
pub struct CachedClient {
  inner: ApiClient,
  cache: QueryCache,
  mutations: MutationCoordinator,
  stale_after: Duration,
}

impl CachedClient {
  pub fn new(config: &Config, token: Option<String>) -> color_eyre::Result<Self> {
    let inner = ApiClient::new(&config.api, token)?;
    Ok(Self::from_client(inner, config.cache.stale_after()))
  }

  pub fn from_client(inner: ApiClient, stale_after: Duration) -> Self {
    let cache = QueryCache::new();
    let mutations = MutationCoordinator::new(cache.clone());
    Self {
      inner,
      cache,
      mutations,
      stale_after,
    }
  }

  /// Client for another session. Starts with an empty cache so nothing read
  /// as the previous user leaks into the new one.
  pub fn with_token(&self, token: String) -> Self {
    Self::from_client(self.inner.with_token(token), self.stale_after)
  }

  pub fn cache(&self) -> &QueryCache {
    &self.cache
  }

  /// Last value stored under `key`, fresh or not, without fetching.
  pub fn peek<T>(&self, key: &QueryKey) -> Option<Cached<T>>
  where
    T: Clone + Send + Sync + 'static,
  {
    self.cache.peek(key)
  }

  async fn read<T, F, Fut>(&self, key: QueryKey, fetch: F) -> Result<T, ApiError>
  where
    T: Clone + Send + Sync + 'static,
    F: FnOnce(ApiClient) -> Fut,
    Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
  {
    let inner = self.inner.clone();
    let result = self
      .cache
      .get(&key, self.stale_after, move || fetch(inner))
      .await?;
    Ok(result.into_inner())
  }

  async fn write<T, Fut>(
    &self,
    name: &'static str,
    affected: Vec<QueryKey>,
    operation: Fut,
  ) -> Result<T, ApiError>
  where
    Fut: Future<Output = Result<T, ApiError>>,
  {
    self
      .mutations
      .run(Mutation::new(name, affected), operation)
      .await
  }

  /// Run any write through the coordinator, for callers that need hooks.
  pub async fn mutate<T, Fut>(&self, mutation: Mutation<T, ApiError>, operation: Fut) -> Result<T, ApiError>
  where
    Fut: Future<Output = Result<T, ApiError>>,
  {
    self.mutations.run(mutation, operation).await
  }

  pub fn api(&self) -> &ApiClient {
    &self.inner
  }

  // ==========================================================================
  // Auth
  // ==========================================================================

  /// Not cached; a token is single use for the caller.
  pub async fn login(&self, email: &str, password: &str) -> Result<String, ApiError> {
    self.inner.login(email, password).await
  }

  pub async fn me(&self) -> Result<User, ApiError> {
    self
      .read(keys::me(), |api| async move { api.me().await })
      .await
  }

  // ==========================================================================
  // Courses
  // ==========================================================================

  pub async fn list_courses(&self) -> Result<Vec<Course>, ApiError> {
    self
      .read(keys::courses(), |api| async move { api.list_courses().await })
      .await
  }

  pub async fn get_course(&self, id: u64) -> Result<Course, ApiError> {
    self
      .read(keys::course(id), move |api| async move {
        api.get_course(id).await
      })
      .await
  }

  pub async fn create_course(&self, input: &CourseInput) -> Result<Course, ApiError> {
    self
      .write(
        "create_course",
        invalidates::create_course(),
        self.inner.create_course(input),
      )
      .await
  }

  pub async fn update_course(&self, id: u64, input: &CourseInput) -> Result<Course, ApiError> {
    self
      .write(
        "update_course",
        invalidates::update_course(id),
        self.inner.update_course(id, input),
      )
      .await
  }

  pub async fn delete_course(&self, id: u64) -> Result<(), ApiError> {
    self
      .write(
        "delete_course",
        invalidates::delete_course(id),
        self.inner.delete_course(id),
      )
      .await
  }

  // ==========================================================================
  // Lectures
  // ==========================================================================

  pub async fn list_lectures(&self, course_id: u64) -> Result<Vec<Lecture>, ApiError> {
    self
      .read(keys::lectures(course_id), move |api| async move {
        api.list_lectures(course_id).await
      })
      .await
  }

  pub async fn get_lecture(&self, id: u64) -> Result<Lecture, ApiError> {
    self
      .read(keys::lecture(id), move |api| async move {
        api.get_lecture(id).await
      })
      .await
  }

  pub async fn create_lecture(
    &self,
    course_id: u64,
    input: &LectureInput,
  ) -> Result<Lecture, ApiError> {
    self
      .write(
        "create_lecture",
        invalidates::create_lecture(course_id),
        self.inner.create_lecture(course_id, input),
      )
      .await
  }

  pub async fn update_lecture(
    &self,
    id: u64,
    course_id: u64,
    input: &LectureInput,
  ) -> Result<Lecture, ApiError> {
    self
      .write(
        "update_lecture",
        invalidates::change_lecture(id, course_id),
        self.inner.update_lecture(id, input),
      )
      .await
  }

  pub async fn delete_lecture(&self, id: u64, course_id: u64) -> Result<(), ApiError> {
    self
      .write(
        "delete_lecture",
        invalidates::change_lecture(id, course_id),
        self.inner.delete_lecture(id),
      )
      .await
  }

  // ==========================================================================
  // Assignments
  // ==========================================================================

  pub async fn list_assignments(&self, course_id: u64) -> Result<Vec<Assignment>, ApiError> {
    self
      .read(keys::assignments(course_id), move |api| async move {
        api.list_assignments(course_id).await
      })
      .await
  }

  pub async fn get_assignment(&self, id: u64) -> Result<Assignment, ApiError> {
    self
      .read(keys::assignment(id), move |api| async move {
        api.get_assignment(id).await
      })
      .await
  }

  pub async fn create_assignment(
    &self,
    course_id: u64,
    input: &AssignmentInput,
  ) -> Result<Assignment, ApiError> {
    self
      .write(
        "create_assignment",
        invalidates::create_assignment(course_id),
        self.inner.create_assignment(course_id, input),
      )
      .await
  }

  pub async fn update_assignment(
    &self,
    id: u64,
    course_id: u64,
    input: &AssignmentInput,
  ) -> Result<Assignment, ApiError> {
    self
      .write(
        "update_assignment",
        invalidates::update_assignment(id, course_id),
        self.inner.update_assignment(id, input),
      )
      .await
  }

  pub async fn delete_assignment(&self, id: u64, course_id: u64) -> Result<(), ApiError> {
    self
      .write(
        "delete_assignment",
        invalidates::delete_assignment(id, course_id),
        self.inner.delete_assignment(id),
      )
      .await
  }

  // ==========================================================================
  // Submissions
  // ==========================================================================

  pub async fn list_submissions(&self, assignment_id: u64) -> Result<Vec<Submission>, ApiError> {
    self
      .read(keys::submissions(assignment_id), move |api| async move {
        api.list_submissions(assignment_id).await
      })
      .await
  }

  pub async fn get_submission(&self, id: u64) -> Result<Submission, ApiError> {
    self
      .read(keys::submission(id), move |api| async move {
        api.get_submission(id).await
      })
      .await
  }

  pub async fn my_submission(&self, assignment_id: u64) -> Result<Option<Submission>, ApiError> {
    self
      .read(keys::my_submission(assignment_id), move |api| async move {
        api.my_submission(assignment_id).await
      })
      .await
  }

  pub async fn create_submission(
    &self,
    assignment_id: u64,
    files: &[PathBuf],
  ) -> Result<Submission, ApiError> {
    self
      .write(
        "create_submission",
        invalidates::create_submission(assignment_id),
        self.inner.create_submission(assignment_id, files),
      )
      .await
  }

  /// Every file of `submission`, fetched concurrently. Not cached.
  pub async fn download_files(&self, submission: &Submission) -> Result<Vec<(String, Vec<u8>)>, ApiError> {
    let downloads = submission.files.iter().map(|file| async move {
      let bytes = self.inner.download_file(&file.url).await?;
      Ok::<_, ApiError>((file.name.clone(), bytes))
    });
    futures::future::try_join_all(downloads).await
  }

  pub async fn grade_submission(
    &self,
    id: u64,
    assignment_id: u64,
    grade: u32,
  ) -> Result<Submission, ApiError> {
    self
      .write(
        "grade_submission",
        invalidates::grade_submission(id, assignment_id),
        self.inner.grade_submission(id, grade),
      )
      .await
  }

  // ==========================================================================
  // Comments
  // ==========================================================================

  pub async fn list_comments(&self, submission_id: u64) -> Result<Vec<Comment>, ApiError> {
    self
      .read(keys::comments(submission_id), move |api| async move {
        api.list_comments(submission_id).await
      })
      .await
  }

  pub async fn add_comment(&self, submission_id: u64, content: &str) -> Result<Comment, ApiError> {
    self
      .write(
        "add_comment",
        invalidates::change_comment(submission_id),
        self.inner.add_comment(submission_id, content),
      )
      .await
  }

  pub async fn delete_comment(&self, id: u64, submission_id: u64) -> Result<(), ApiError> {
    self
      .write(
        "delete_comment",
        invalidates::change_comment(submission_id),
        self.inner.delete_comment(id),
      )
      .await
  }

  // ==========================================================================
  // Notifications
  // ==========================================================================

  pub async fn list_notifications(&self) -> Result<Vec<Notification>, ApiError> {
    self
      .read(keys::notifications(), |api| async move {
        api.list_notifications().await
      })
      .await
  }

  pub async fn mark_notification_read(&self, id: u64) -> Result<(), ApiError> {
    self
      .write(
        "mark_notification_read",
        invalidates::mark_notification_read(),
        self.inner.mark_notification_read(id),
      )
      .await
  }

  // ==========================================================================
  // Users (admin)
  // ==========================================================================

  pub async fn list_users(&self, status: UserStatus) -> Result<Vec<User>, ApiError> {
    self
      .read(keys::users(status), move |api| async move {
        api.list_users(status).await
      })
      .await
  }

  pub async fn approve_user(&self, id: u64) -> Result<(), ApiError> {
    self
      .write(
        "approve_user",
        invalidates::change_user_status(),
        self.inner.approve_user(id),
      )
      .await
  }

  pub async fn archive_user(&self, id: u64) -> Result<(), ApiError> {
    self
      .write(
        "archive_user",
        invalidates::change_user_status(),
        self.inner.archive_user(id),
      )
      .await
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::ApiConfig;

  fn offline_client() -> CachedClient {
    // Port 9 (discard) refuses connections, so every request fails fast
    let config = ApiConfig {
      base_url: "http://127.0.0.1:9".to_string(),
      timeout_secs: 2,
    };
    let api = ApiClient::new(&config, None).unwrap();
    CachedClient::from_client(api, Duration::from_secs(60))
  }

  #[tokio::test]
  async fn test_failed_write_invalidates_nothing() {
    let client = offline_client();
    client
      .cache()
      .get(&keys::assignments(9), Duration::from_secs(60), || async {
        Ok::<Vec<Assignment>, ApiError>(Vec::new())
      })
      .await
      .unwrap();

    let err = client.delete_assignment(5, 9).await.unwrap_err();
    assert!(matches!(err, ApiError::Network(_)));

    let cached = client.peek::<Vec<Assignment>>(&keys::assignments(9)).unwrap();
    assert!(cached.is_fresh);
  }

  #[tokio::test]
  async fn test_failed_read_is_not_cached() {
    let client = offline_client();
    assert!(client.list_courses().await.is_err());
    assert!(client.peek::<Vec<Course>>(&keys::courses()).is_none());
  }

  #[tokio::test]
  async fn test_cached_read_skips_network() {
    let client = offline_client();
    let course = Course {
      id: 3,
      name: "Algebra".to_string(),
      description: None,
      owner_id: 1,
    };
    let seeded = course.clone();
    client
      .cache()
      .get(&keys::course(3), Duration::from_secs(60), || async move {
        Ok::<Course, ApiError>(seeded)
      })
      .await
      .unwrap();

    assert_eq!(client.get_course(3).await.unwrap(), course);
  }

  #[tokio::test]
  async fn test_new_session_starts_with_empty_cache() {
    let client = offline_client();
    client
      .cache()
      .get(&keys::me(), Duration::from_secs(60), || async {
        Ok::<u32, ApiError>(1)
      })
      .await
      .unwrap();

    let other = client.with_token("t".to_string());
    assert!(other.cache().is_empty());
    assert!(!client.cache().is_empty());
  }
}
