use crate::api::error::ApiError;
use crate::api::types::{
  Assignment, AssignmentInput, Comment, CommentInput, Course, CourseInput, GradeInput, Lecture,
  LectureInput, LoginInput, Notification, Submission, TokenResponse, User, UserStatus,
};
use crate::config::ApiConfig;
use color_eyre::{eyre::eyre, Result};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{multipart, Method, RequestBuilder};
use serde::{de::DeserializeOwned, Serialize};
use std::path::PathBuf;
use tracing::debug;
use url::Url;

/// Omniwise REST API client
#[derive(Clone)]
pub struct ApiClient {
  http: reqwest::Client,
  base_url: Url,
  token: Option<String>,
}

impl ApiClient {
  pub fn new(config: &ApiConfig, token: Option<String>) -> Result<Self> {
    let base_url = config.base_url()?;

    let http = reqwest::Client::builder()
      .timeout(config.timeout())
      .user_agent(concat!("omniwise/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      http,
      base_url,
      token,
    })
  }

  /// Same client, authenticated with `token`.
  pub fn with_token(&self, token: String) -> Self {
    Self {
      token: Some(token),
      ..self.clone()
    }
  }

  pub fn base_url(&self) -> &Url {
    &self.base_url
  }

  pub fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
    self
      .base_url
      .join(path.trim_start_matches('/'))
      .map_err(|e| ApiError::Network(format!("invalid URL for {}: {}", path, e)))
  }

  fn request(&self, method: Method, url: Url) -> RequestBuilder {
    let req = self
      .http
      .request(method, url)
      .header(ACCEPT, "application/json");
    match &self.token {
      Some(token) => req.bearer_auth(token),
      None => req,
    }
  }

  /// Send and return the body of a successful response.
  async fn send(&self, req: RequestBuilder) -> Result<Vec<u8>, ApiError> {
    let resp = req.send().await?;
    let status = resp.status();
    let body = resp.bytes().await?;

    debug!(status = status.as_u16(), bytes = body.len(), "api response");

    if status.is_success() {
      Ok(body.to_vec())
    } else {
      Err(ApiError::from_status(
        status.as_u16(),
        &String::from_utf8_lossy(&body),
      ))
    }
  }

  async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
    let url = self.endpoint(path)?;
    let body = self.send(self.request(Method::GET, url)).await?;
    Ok(serde_json::from_slice(&body)?)
  }

  async fn send_json<B, T>(&self, method: Method, path: &str, payload: &B) -> Result<T, ApiError>
  where
    B: Serialize,
    T: DeserializeOwned,
  {
    let url = self.endpoint(path)?;
    let payload = serde_json::to_vec(payload)?;
    let req = self
      .request(method, url)
      .header(CONTENT_TYPE, "application/json")
      .body(payload);
    let body = self.send(req).await?;
    Ok(serde_json::from_slice(&body)?)
  }

  /// Request whose response body is ignored.
  async fn send_empty(&self, method: Method, path: &str) -> Result<(), ApiError> {
    let url = self.endpoint(path)?;
    self.send(self.request(method, url)).await?;
    Ok(())
  }

  // ==========================================================================
  // Auth
  // ==========================================================================

  /// Exchange credentials for a session token
  pub async fn login(&self, email: &str, password: &str) -> Result<String, ApiError> {
    let resp: TokenResponse = self
      .send_json(Method::POST, "auth/login", &LoginInput { email, password })
      .await?;
    Ok(resp.token)
  }

  pub async fn me(&self) -> Result<User, ApiError> {
    self.get_json("users/me").await
  }

  // ==========================================================================
  // Courses
  // ==========================================================================

  pub async fn list_courses(&self) -> Result<Vec<Course>, ApiError> {
    self.get_json("courses").await
  }

  pub async fn get_course(&self, id: u64) -> Result<Course, ApiError> {
    self.get_json(&format!("courses/{}", id)).await
  }

  pub async fn create_course(&self, input: &CourseInput) -> Result<Course, ApiError> {
    self.send_json(Method::POST, "courses", input).await
  }

  pub async fn update_course(&self, id: u64, input: &CourseInput) -> Result<Course, ApiError> {
    self
      .send_json(Method::PUT, &format!("courses/{}", id), input)
      .await
  }

  pub async fn delete_course(&self, id: u64) -> Result<(), ApiError> {
    self
      .send_empty(Method::DELETE, &format!("courses/{}", id))
      .await
  }

  // ==========================================================================
  // Lectures
  // ==========================================================================

  pub async fn list_lectures(&self, course_id: u64) -> Result<Vec<Lecture>, ApiError> {
    self
      .get_json(&format!("courses/{}/lectures", course_id))
      .await
  }

  pub async fn get_lecture(&self, id: u64) -> Result<Lecture, ApiError> {
    self.get_json(&format!("lectures/{}", id)).await
  }

  pub async fn create_lecture(
    &self,
    course_id: u64,
    input: &LectureInput,
  ) -> Result<Lecture, ApiError> {
    self
      .send_json(
        Method::POST,
        &format!("courses/{}/lectures", course_id),
        input,
      )
      .await
  }

  pub async fn update_lecture(&self, id: u64, input: &LectureInput) -> Result<Lecture, ApiError> {
    self
      .send_json(Method::PUT, &format!("lectures/{}", id), input)
      .await
  }

  pub async fn delete_lecture(&self, id: u64) -> Result<(), ApiError> {
    self
      .send_empty(Method::DELETE, &format!("lectures/{}", id))
      .await
  }

  // ==========================================================================
  // Assignments
  // ==========================================================================

  pub async fn list_assignments(&self, course_id: u64) -> Result<Vec<Assignment>, ApiError> {
    self
      .get_json(&format!("courses/{}/assignments", course_id))
      .await
  }

  pub async fn get_assignment(&self, id: u64) -> Result<Assignment, ApiError> {
    self.get_json(&format!("assignments/{}", id)).await
  }

  pub async fn create_assignment(
    &self,
    course_id: u64,
    input: &AssignmentInput,
  ) -> Result<Assignment, ApiError> {
    self
      .send_json(
        Method::POST,
        &format!("courses/{}/assignments", course_id),
        input,
      )
      .await
  }

  pub async fn update_assignment(
    &self,
    id: u64,
    input: &AssignmentInput,
  ) -> Result<Assignment, ApiError> {
    self
      .send_json(Method::PUT, &format!("assignments/{}", id), input)
      .await
  }

  pub async fn delete_assignment(&self, id: u64) -> Result<(), ApiError> {
    self
      .send_empty(Method::DELETE, &format!("assignments/{}", id))
      .await
  }

  // ==========================================================================
  // Submissions
  // ==========================================================================

  pub async fn list_submissions(&self, assignment_id: u64) -> Result<Vec<Submission>, ApiError> {
    self
      .get_json(&format!("assignments/{}/submissions", assignment_id))
      .await
  }

  pub async fn get_submission(&self, id: u64) -> Result<Submission, ApiError> {
    self.get_json(&format!("submissions/{}", id)).await
  }

  /// The current user's submission, `None` if they have not submitted.
  pub async fn my_submission(&self, assignment_id: u64) -> Result<Option<Submission>, ApiError> {
    match self
      .get_json(&format!("assignments/{}/submissions/me", assignment_id))
      .await
    {
      Ok(submission) => Ok(Some(submission)),
      Err(e) if e.is_not_found() => Ok(None),
      Err(e) => Err(e),
    }
  }

  /// Upload files as a new submission (multipart, one `files` part each)
  pub async fn create_submission(
    &self,
    assignment_id: u64,
    files: &[PathBuf],
  ) -> Result<Submission, ApiError> {
    let mut form = multipart::Form::new();
    for path in files {
      let data = tokio::fs::read(path)
        .await
        .map_err(|e| ApiError::attachment(path, e))?;
      let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".to_string());
      form = form.part("files", multipart::Part::bytes(data).file_name(name));
    }

    let url = self.endpoint(&format!("assignments/{}/submissions", assignment_id))?;
    let body = self
      .send(self.request(Method::POST, url).multipart(form))
      .await?;
    Ok(serde_json::from_slice(&body)?)
  }

  /// Raw bytes of an uploaded file. `location` is absolute or relative to
  /// the API base; the token is only sent to the API's own origin.
  pub async fn download_file(&self, location: &str) -> Result<Vec<u8>, ApiError> {
    let url = match Url::parse(location) {
      Ok(url) => url,
      Err(_) => self.endpoint(location)?,
    };
    let mut req = self.http.get(url.clone());
    if url.origin() == self.base_url.origin() {
      if let Some(token) = &self.token {
        req = req.bearer_auth(token);
      }
    }
    self.send(req).await
  }

  pub async fn grade_submission(&self, id: u64, grade: u32) -> Result<Submission, ApiError> {
    self
      .send_json(
        Method::PUT,
        &format!("submissions/{}/grade", id),
        &GradeInput { grade },
      )
      .await
  }

  // ==========================================================================
  // Comments
  // ==========================================================================

  pub async fn list_comments(&self, submission_id: u64) -> Result<Vec<Comment>, ApiError> {
    self
      .get_json(&format!("submissions/{}/comments", submission_id))
      .await
  }

  pub async fn add_comment(&self, submission_id: u64, content: &str) -> Result<Comment, ApiError> {
    let input = CommentInput {
      content: content.to_string(),
    };
    self
      .send_json(
        Method::POST,
        &format!("submissions/{}/comments", submission_id),
        &input,
      )
      .await
  }

  pub async fn delete_comment(&self, id: u64) -> Result<(), ApiError> {
    self
      .send_empty(Method::DELETE, &format!("comments/{}", id))
      .await
  }

  // ==========================================================================
  // Notifications
  // ==========================================================================

  pub async fn list_notifications(&self) -> Result<Vec<Notification>, ApiError> {
    self.get_json("notifications").await
  }

  pub async fn mark_notification_read(&self, id: u64) -> Result<(), ApiError> {
    self
      .send_empty(Method::PUT, &format!("notifications/{}/read", id))
      .await
  }

  // ==========================================================================
  // Users (admin)
  // ==========================================================================

  pub async fn list_users(&self, status: UserStatus) -> Result<Vec<User>, ApiError> {
    let mut url = self.endpoint("users")?;
    url
      .query_pairs_mut()
      .append_pair("status", status.as_str());
    let body = self.send(self.request(Method::GET, url)).await?;
    Ok(serde_json::from_slice(&body)?)
  }

  pub async fn approve_user(&self, id: u64) -> Result<(), ApiError> {
    self
      .send_empty(Method::PUT, &format!("users/{}/approve", id))
      .await
  }

  pub async fn archive_user(&self, id: u64) -> Result<(), ApiError> {
    self
      .send_empty(Method::PUT, &format!("users/{}/archive", id))
      .await
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn client(base: &str) -> ApiClient {
    let config = ApiConfig {
      base_url: base.to_string(),
      ..ApiConfig::default()
    };
    ApiClient::new(&config, None).unwrap()
  }

  #[test]
  fn test_endpoint_joins_under_base_path() {
    let api = client("https://lms.example.edu/api");
    assert_eq!(
      api.endpoint("courses/3/assignments").unwrap().as_str(),
      "https://lms.example.edu/api/courses/3/assignments"
    );
    assert_eq!(
      api.endpoint("/users/me").unwrap().as_str(),
      "https://lms.example.edu/api/users/me"
    );
  }

  #[test]
  fn test_with_token_keeps_base() {
    let api = client("http://localhost:8080").with_token("abc".to_string());
    assert_eq!(api.base_url().as_str(), "http://localhost:8080/");
    assert_eq!(api.token.as_deref(), Some("abc"));
  }

  #[tokio::test]
  async fn test_unreadable_attachment_fails_before_sending() {
    let api = client("http://127.0.0.1:9");
    let err = api
      .create_submission(1, &[PathBuf::from("/definitely/not/here.pdf")])
      .await
      .unwrap_err();
    assert!(matches!(err, ApiError::Attachment { .. }));
    assert!(err.is_validation());
  }
}
