mod assignment_detail;
mod assignment_list;
mod comments;
mod course_list;
mod lecture_list;
mod notification_list;
mod pending_users;
mod submission_list;

pub use assignment_detail::AssignmentDetailView;
pub use assignment_list::AssignmentListView;
pub use comments::CommentsView;
pub use course_list::CourseListView;
pub use lecture_list::LectureListView;
pub use notification_list::NotificationListView;
pub use pending_users::PendingUsersView;
pub use submission_list::SubmissionListView;

use crate::api::ApiError;
use crate::query::{Query, QueryState};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, List, ListItem};

/// Pane title with the query's state folded in
fn pane_title<T: Clone + Send + 'static>(label: &str, query: &Query<T>, count: usize) -> String {
  match query.state() {
    QueryState::Loading if query.is_placeholder() => format!(" {} ({}, refreshing...) ", label, count),
    QueryState::Loading => format!(" {} (loading...) ", label),
    QueryState::Error(e) => format!(" {} (error: {}) ", label, e),
    _ => format!(" {} ({}) ", label, count),
  }
}

fn pane_block(title: String) -> Block<'static> {
  Block::default()
    .title(title)
    .title_alignment(Alignment::Center)
    .borders(Borders::ALL)
    .border_style(Style::default().fg(Color::Blue))
}

fn selectable_list<'a>(items: Vec<ListItem<'a>>, block: Block<'a>) -> List<'a> {
  List::new(items)
    .block(block)
    .highlight_style(
      Style::default()
        .bg(Color::DarkGray)
        .add_modifier(Modifier::BOLD),
    )
    .highlight_symbol("> ")
}

/// Text for an empty list pane
fn empty_text(query_failed: bool, what: &str) -> String {
  if query_failed {
    format!("Failed to load {}. Press 'r' to retry.", what)
  } else {
    format!("No {} found.", what)
  }
}

/// One-line outcome of a write, for the view's message line
fn outcome<T>(result: &Result<T, ApiError>, done: &str) -> String {
  match result {
    Ok(_) => done.to_string(),
    Err(e) if e.is_auth() => format!("{} (log in again with `omniwise login`)", e),
    Err(e) => e.to_string(),
  }
}

const SPINNER: [&str; 4] = ["|", "/", "-", "\\"];

fn spinner_frame(tick: usize) -> &'static str {
  SPINNER[tick % SPINNER.len()]
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_outcome_messages() {
    assert_eq!(outcome::<()>(&Ok(()), "Saved"), "Saved");
    assert_eq!(
      outcome::<()>(&Err(ApiError::Forbidden), "Saved"),
      "Not allowed (log in again with `omniwise login`)"
    );
    assert_eq!(
      outcome::<()>(&Err(ApiError::Network("timed out".to_string())), "Saved"),
      "Network error: timed out"
    );
  }

  #[test]
  fn test_spinner_cycles() {
    assert_eq!(spinner_frame(0), spinner_frame(4));
    assert_ne!(spinner_frame(0), spinner_frame(1));
  }
}
