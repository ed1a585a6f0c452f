use std::path::PathBuf;
use std::sync::Arc;

use crate::api::{keys, CachedClient, Submission};
use crate::bundle;
use crate::query::{Pending, Query};
use crate::session::SessionContext;
use crate::ui::components::{KeyResult, Prompt, PromptEvent, SearchInput};
use crate::ui::ensure_valid_selection;
use crate::ui::renderfns::{format_date, grade_label, truncate};
use crate::ui::view::{Shortcut, View, ViewAction};
use crate::ui::views::CommentsView;
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{ListItem, ListState, Paragraph};

use super::{empty_text, outcome, pane_block, pane_title, selectable_list};

/// Submissions to one assignment, for grading
pub struct SubmissionListView {
  ctx: Arc<SessionContext>,
  client: CachedClient,
  assignment_id: u64,
  max_grade: Option<u32>,
  query: Query<Vec<Submission>>,
  list_state: ListState,
  search: SearchInput,
  /// Tag is the submission being graded
  prompt: Prompt<u64>,
  grading: Option<Pending<Submission>>,
  download: Option<Pending<PathBuf>>,
  message: Option<String>,
}

impl SubmissionListView {
  pub fn new(
    ctx: Arc<SessionContext>,
    client: CachedClient,
    assignment_id: u64,
    max_grade: Option<u32>,
  ) -> Self {
    let placeholder = client
      .peek::<Vec<Submission>>(&keys::submissions(assignment_id))
      .map(|c| c.data);
    let fetch_client = client.clone();
    let mut query = Query::new(move || {
      let client = fetch_client.clone();
      async move { client.list_submissions(assignment_id).await }
    })
    .with_placeholder(placeholder)
    .watching(client.cache(), keys::submissions(assignment_id));

    query.fetch();

    Self {
      ctx,
      client,
      assignment_id,
      max_grade,
      query,
      list_state: ListState::default(),
      search: SearchInput::new(),
      prompt: Prompt::new(),
      grading: None,
      download: None,
      message: None,
    }
  }

  fn visible(&self) -> Vec<&Submission> {
    self
      .query
      .data()
      .map(|all| {
        all
          .iter()
          .filter(|s| self.search.matches(&s.student_name))
          .collect()
      })
      .unwrap_or_default()
  }

  fn selected(&self) -> Option<&Submission> {
    self
      .list_state
      .selected()
      .and_then(|idx| self.visible().get(idx).copied())
  }

  fn grade(&mut self, submission_id: u64, value: &str) {
    let grade = match validate_grade(value, self.max_grade) {
      Ok(grade) => grade,
      Err(e) => {
        self.message = Some(e);
        return;
      }
    };
    let client = self.client.clone();
    let assignment_id = self.assignment_id;
    self.message = None;
    self.grading = Some(Pending::spawn(async move {
      client
        .grade_submission(submission_id, assignment_id, grade)
        .await
    }));
  }

  /// Save the selected submission's files as one zip archive.
  fn download_selected(&mut self) {
    let Some(submission) = self.selected().cloned() else {
      return;
    };
    if submission.files.is_empty() {
      self.message = Some("No files to download".to_string());
      return;
    }
    let client = self.client.clone();
    let dir = bundle::download_dir();
    self.message = None;
    self.download = Some(Pending::spawn(async move {
      bundle::save_submission(&client, &submission, &dir).await
    }));
  }

  fn render_list(&mut self, frame: &mut Frame, area: Rect) {
    let len = self.visible().len();
    ensure_valid_selection(&mut self.list_state, len);

    let block = pane_block(pane_title("Submissions", &self.query, len));

    if len == 0 {
      let text = if self.query.is_loading() {
        "Loading submissions...".to_string()
      } else {
        empty_text(self.query.is_error(), "submissions")
      };
      let paragraph = Paragraph::new(text)
        .block(block)
        .style(Style::default().fg(Color::DarkGray));
      frame.render_widget(paragraph, area);
      return;
    }

    let max_grade = self.max_grade;
    let items: Vec<ListItem> = self
      .visible()
      .iter()
      .map(|s| {
        let (grade, color) = grade_label(s.grade, max_grade);
        ListItem::new(Line::from(vec![
          Span::styled(
            format!("{:<28}", truncate(&s.student_name, 28)),
            Style::default().fg(Color::Cyan),
          ),
          Span::raw(format!("{:<18}", format_date(&s.submitted_at))),
          Span::styled(grade, Style::default().fg(color)),
        ]))
      })
      .collect();

    frame.render_stateful_widget(selectable_list(items, block), area, &mut self.list_state);
  }

  fn render_files(&self, frame: &mut Frame, area: Rect) {
    let block = pane_block(" Files ".to_string());
    let lines: Vec<Line> = match self.selected() {
      Some(s) if s.files.is_empty() => vec![Line::from(Span::styled(
        "No files.",
        Style::default().fg(Color::DarkGray),
      ))],
      Some(s) => s
        .files
        .iter()
        .map(|f| {
          Line::from(vec![
            Span::raw(truncate(&f.name, 40)),
            Span::raw("  "),
            Span::styled(f.url.clone(), Style::default().fg(Color::DarkGray)),
          ])
        })
        .collect(),
      None => Vec::new(),
    };
    frame.render_widget(Paragraph::new(lines).block(block), area);
  }
}

/// Grades are whole numbers up to the assignment's max, when it has one.
fn validate_grade(input: &str, max_grade: Option<u32>) -> Result<u32, String> {
  let input = input.trim();
  let grade: u32 = input
    .parse()
    .map_err(|_| format!("Invalid grade '{}'", input))?;
  match max_grade {
    Some(max) if grade > max => Err(format!("Grade must be at most {}", max)),
    _ => Ok(grade),
  }
}

impl View for SubmissionListView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    match self.prompt.handle_key(key) {
      KeyResult::Event(PromptEvent::Submitted(id, value)) => {
        self.grade(id, &value);
        return ViewAction::None;
      }
      KeyResult::Event(PromptEvent::Cancelled) | KeyResult::Handled => return ViewAction::None,
      KeyResult::NotHandled => {}
    }

    match self.search.handle_key(key) {
      KeyResult::Event(_) | KeyResult::Handled => return ViewAction::None,
      KeyResult::NotHandled => {}
    }

    match key.code {
      KeyCode::Char('j') | KeyCode::Down => self.list_state.select_next(),
      KeyCode::Char('k') | KeyCode::Up => self.list_state.select_previous(),
      KeyCode::Char('r') => self.query.reload(),
      KeyCode::Char('g') if self.grading.is_none() => {
        if let Some((id, current)) = self.selected().map(|s| (s.id, s.grade)) {
          let label = match self.max_grade {
            Some(max) => format!("Grade (0-{})", max),
            None => "Grade".to_string(),
          };
          let initial = current.map(|g| g.to_string()).unwrap_or_default();
          self.prompt.open(id, label, &initial);
        }
      }
      KeyCode::Char('z') if self.download.is_none() => self.download_selected(),
      KeyCode::Enter => {
        if let Some(id) = self.selected().map(|s| s.id) {
          return ViewAction::Push(Box::new(CommentsView::new(
            Arc::clone(&self.ctx),
            self.client.clone(),
            id,
          )));
        }
      }
      KeyCode::Char('q') | KeyCode::Esc => return ViewAction::Pop,
      _ => {}
    }
    ViewAction::None
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    let chunks = Layout::default()
      .direction(Direction::Vertical)
      .constraints([
        Constraint::Min(5),
        Constraint::Length(6),
        Constraint::Length(1),
      ])
      .split(area);

    self.render_list(frame, chunks[0]);
    self.render_files(frame, chunks[1]);

    let status = if self.grading.is_some() {
      "Grading...".to_string()
    } else if self.download.is_some() {
      "Downloading...".to_string()
    } else {
      self.message.clone().unwrap_or_default()
    };
    frame.render_widget(
      Paragraph::new(status).style(Style::default().fg(Color::Yellow)),
      chunks[2],
    );

    self.search.render_overlay(frame, area);
    self.prompt.render_overlay(frame, area);
  }

  fn breadcrumb_label(&self) -> String {
    "Submissions".to_string()
  }

  fn tick(&mut self) {
    self.query.poll();

    if let Some(result) = self.grading.as_mut().and_then(|p| p.poll()) {
      self.grading = None;
      self.message = Some(outcome(&result, "Grade saved"));
      if result.is_ok() {
        self.query.refetch();
      }
    }

    if let Some(result) = self.download.as_mut().and_then(|p| p.poll()) {
      self.download = None;
      self.message = Some(match result {
        Ok(path) => format!("Saved {}", path.display()),
        Err(e) => format!("Download failed: {}", e),
      });
    }
  }

  fn is_capturing_input(&self) -> bool {
    self.prompt.is_active() || self.search.is_active()
  }

  fn shortcuts(&self) -> Vec<Shortcut> {
    vec![
      Shortcut::new(":", "command").with_priority(10),
      Shortcut::new("g", "grade").with_priority(15),
      Shortcut::new("/", "filter").with_priority(20),
      Shortcut::new("enter", "comments").with_priority(25),
      Shortcut::new("z", "download zip").with_priority(30),
      Shortcut::new("r", "refresh").with_priority(40),
    ]
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_grade_within_max() {
    assert_eq!(validate_grade("7", Some(10)), Ok(7));
    assert_eq!(validate_grade(" 10 ", Some(10)), Ok(10));
    assert_eq!(validate_grade("0", Some(10)), Ok(0));
  }

  #[test]
  fn test_grade_above_max_rejected() {
    assert_eq!(
      validate_grade("11", Some(10)),
      Err("Grade must be at most 10".to_string())
    );
  }

  #[test]
  fn test_grade_without_max() {
    assert_eq!(validate_grade("250", None), Ok(250));
  }

  #[test]
  fn test_grade_must_be_a_whole_number() {
    assert!(validate_grade("7.5", Some(10)).is_err());
    assert!(validate_grade("-1", None).is_err());
    assert!(validate_grade("", None).is_err());
  }
}
