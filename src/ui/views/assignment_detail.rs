use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Paragraph, Wrap};
use tracing::debug;

use crate::api::{keys, Assignment, AssignmentInput, CachedClient, Submission};
use crate::form::EntityForm;
use crate::gate::SubmitGate;
use crate::query::{Pending, Query};
use crate::session::SessionContext;
use crate::ui::components::{KeyResult, Prompt, PromptEvent};
use crate::ui::renderfns::{format_date, grade_label};
use crate::ui::render_notice;
use crate::ui::view::{Shortcut, View, ViewAction};
use crate::ui::views::SubmissionListView;

use super::{outcome, pane_block, spinner_frame};

const DEADLINE_FORMAT: &str = "%Y-%m-%d %H:%M";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
  Title,
  Description,
  Deadline,
  MaxGrade,
  Attach,
}

/// One assignment. Stays mounted while `[` and `]` walk through the
/// assignments of the list it was opened from.
pub struct AssignmentDetailView {
  ctx: Arc<SessionContext>,
  client: CachedClient,
  siblings: Vec<u64>,
  index: usize,
  query: Query<Assignment>,
  /// The student's own submission; not loaded for teachers
  mine: Option<Query<Option<Submission>>>,
  form: EntityForm<Assignment>,
  gate: SubmitGate,
  /// Writes tagged with the assignment they were started for
  save: Option<(u64, Pending<Assignment>)>,
  upload: Option<(u64, Pending<Submission>)>,
  prompt: Prompt<Field>,
  message: Option<String>,
  ticks: usize,
}

impl AssignmentDetailView {
  pub fn new(ctx: Arc<SessionContext>, client: CachedClient, siblings: Vec<u64>, index: usize) -> Self {
    let index = index.min(siblings.len().saturating_sub(1));
    let id = siblings.get(index).copied().unwrap_or_default();
    let query = assignment_query(&client, id);
    let mine = (!ctx.can_teach()).then(|| my_submission_query(&client, id));
    let gate = SubmitGate::new(ctx.config.submit.spinner_delay());

    Self {
      ctx,
      client,
      siblings,
      index,
      query,
      mine,
      form: EntityForm::new(),
      gate,
      save: None,
      upload: None,
      prompt: Prompt::new(),
      message: None,
      ticks: 0,
    }
  }

  fn current_id(&self) -> u64 {
    self.siblings.get(self.index).copied().unwrap_or_default()
  }

  /// The loaded assignment, if it is the one currently shown
  fn current(&self) -> Option<&Assignment> {
    self.query.data().filter(|a| a.id == self.current_id())
  }

  /// Form fields, only while the form is bound to the shown assignment
  fn current_fields(&self) -> Option<&AssignmentInput> {
    if self.form.bound_id() == Some(&self.current_id()) {
      self.form.fields()
    } else {
      None
    }
  }

  fn go_to(&mut self, index: usize) {
    if index == self.index || index >= self.siblings.len() {
      return;
    }
    self.index = index;
    self.message = None;
    let id = self.current_id();
    debug!(assignment = id, "moving to sibling assignment");
    self.query = assignment_query(&self.client, id);
    if self.mine.is_some() {
      self.mine = Some(my_submission_query(&self.client, id));
    }
  }

  fn handle_prompt(&mut self, field: Field, value: String) {
    if field == Field::Attach {
      self.attach(value.trim());
      return;
    }

    let parsed = match field {
      Field::Deadline => parse_deadline(&value).map(FieldValue::Deadline),
      Field::MaxGrade => parse_max_grade(&value).map(FieldValue::MaxGrade),
      Field::Title if value.trim().is_empty() => Err("Title cannot be empty".to_string()),
      Field::Title => Ok(FieldValue::Title(value.trim().to_string())),
      Field::Description => Ok(FieldValue::Description(value)),
      Field::Attach => return,
    };

    let Some(fields) = self.form.fields_mut() else {
      return;
    };
    match parsed {
      Ok(FieldValue::Title(v)) => fields.title = v,
      Ok(FieldValue::Description(v)) => fields.description = v,
      Ok(FieldValue::Deadline(v)) => fields.deadline = v,
      Ok(FieldValue::MaxGrade(v)) => fields.max_grade = v,
      Err(e) => self.message = Some(e),
    }
  }

  fn attach(&mut self, path: &str) {
    if path.is_empty() {
      return;
    }
    if !Path::new(path).is_file() {
      self.message = Some(format!("Not a file: {}", path));
      return;
    }
    self.form.attach(PathBuf::from(path));
    self.message = None;
  }

  fn open_field(&mut self, field: Field) {
    let Some(fields) = self.current_fields() else {
      return;
    };
    let (label, initial) = match field {
      Field::Title => ("Title", fields.title.clone()),
      Field::Description => ("Description", fields.description.clone()),
      Field::Deadline => (
        "Deadline (YYYY-MM-DD HH:MM, empty for none)",
        fields
          .deadline
          .map(|d| d.with_timezone(&Local).format(DEADLINE_FORMAT).to_string())
          .unwrap_or_default(),
      ),
      Field::MaxGrade => (
        "Max grade (empty for none)",
        fields.max_grade.map(|g| g.to_string()).unwrap_or_default(),
      ),
      Field::Attach => ("File to attach", String::new()),
    };
    self.prompt.open(field, label, &initial);
  }

  fn save(&mut self) {
    if self.gate.is_submitting() {
      return;
    }
    let Some(fields) = self.current_fields().cloned() else {
      return;
    };
    if !self.form.is_dirty() {
      self.form.finish_edit();
      self.message = Some("Nothing to save".to_string());
      return;
    }

    // The list to invalidate is only known from the loaded assignment
    let Some(course_id) = self.current().map(|a| a.course_id) else {
      self.message = Some("Assignment is still loading".to_string());
      return;
    };
    let id = self.current_id();
    let client = self.client.clone();
    self.gate.start();
    self.message = None;
    self.save = Some((
      id,
      Pending::spawn(async move { client.update_assignment(id, course_id, &fields).await }),
    ));
  }

  fn submit_files(&mut self) {
    if self.gate.is_submitting() || self.form.bound_id() != Some(&self.current_id()) {
      return;
    }
    if self.form.attachments().is_empty() {
      self.message = Some("Attach at least one file with 'a'".to_string());
      return;
    }
    if self.current().is_some_and(|a| a.is_past_deadline(Utc::now())) {
      self.message = Some("The deadline has passed".to_string());
      return;
    }

    let id = self.current_id();
    let files = self.form.attachments().to_vec();
    let client = self.client.clone();
    self.gate.start();
    self.message = None;
    self.upload = Some((
      id,
      Pending::spawn(async move { client.create_submission(id, &files).await }),
    ));
  }

  fn poll_writes(&mut self) {
    let current = self.current_id();

    if let Some((id, result)) = self
      .save
      .as_mut()
      .and_then(|(id, p)| p.poll().map(|r| (*id, r)))
    {
      self.save = None;
      self.gate.settle();
      if id != current {
        // Finished after moving on; only report it
        self.message = Some(outcome(&result, &format!("Saved assignment #{}", id)));
      } else {
        self.message = Some(outcome(&result, "Assignment saved"));
        if let Ok(updated) = result {
          self.form.finish_edit();
          self.form.bind(&updated);
          self.query.refetch();
        }
      }
    }

    if let Some((id, result)) = self
      .upload
      .as_mut()
      .and_then(|(id, p)| p.poll().map(|r| (*id, r)))
    {
      self.upload = None;
      self.gate.settle();
      if id != current {
        self.message = Some(outcome(&result, &format!("Submitted assignment #{}", id)));
      } else {
        self.message = Some(outcome(&result, "Submission uploaded"));
        if result.is_ok() {
          self.form.clear_attachments();
          if let Some(mine) = self.mine.as_mut() {
            mine.refetch();
          }
        }
      }
    }
  }

  fn render_assignment(&self, frame: &mut Frame, area: Rect) {
    let editing = self.form.is_editing();
    let title = match (editing, self.form.is_dirty()) {
      (true, true) => " Assignment (editing, modified) ".to_string(),
      (true, false) => " Assignment (editing) ".to_string(),
      _ if self.siblings.len() > 1 => {
        format!(" Assignment {}/{} ", self.index + 1, self.siblings.len())
      }
      _ => " Assignment ".to_string(),
    };
    let block = pane_block(title);
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let Some(fields) = self.current_fields() else {
      match self.query.error() {
        Some(e) => render_notice(frame, inner, &format!("Failed to load assignment: {}", e), Color::Red),
        None => render_notice(frame, inner, "Loading assignment...", Color::DarkGray),
      }
      return;
    };

    let label = Style::default().fg(Color::Yellow);
    let deadline = fields
      .deadline
      .as_ref()
      .map(format_date)
      .unwrap_or_else(|| "none".to_string());
    let max_grade = fields
      .max_grade
      .map(|g| g.to_string())
      .unwrap_or_else(|| "none".to_string());

    let mut lines = vec![
      Line::from(Span::styled(
        fields.title.clone(),
        Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
      )),
      Line::from(""),
      Line::from(vec![Span::styled("Deadline:  ", label), Span::raw(deadline)]),
      Line::from(vec![Span::styled("Max grade: ", label), Span::raw(max_grade)]),
      Line::from(""),
    ];
    if fields.description.is_empty() {
      lines.push(Line::from(Span::styled(
        "No description.",
        Style::default().fg(Color::DarkGray),
      )));
    } else {
      lines.extend(fields.description.lines().map(|l| Line::from(l.to_string())));
    }

    frame.render_widget(Paragraph::new(lines).wrap(Wrap { trim: false }), inner);
  }

  fn render_submission(&self, frame: &mut Frame, area: Rect) {
    let Some(mine) = &self.mine else {
      return;
    };
    let block = pane_block(" Your submission ".to_string());
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let mut lines = Vec::new();
    match (mine.data(), mine.error()) {
      (Some(Some(sub)), _) => {
        let max = self.current().and_then(|a| a.max_grade);
        let (grade, color) = grade_label(sub.grade, max);
        lines.push(Line::from(vec![
          Span::raw(format!("Submitted {}  ", format_date(&sub.submitted_at))),
          Span::styled(grade, Style::default().fg(color)),
        ]));
        lines.extend(
          sub
            .files
            .iter()
            .map(|f| Line::from(format!("  {}", f.name))),
        );
      }
      (Some(None), _) => lines.push(Line::from(Span::styled(
        "Nothing submitted yet.",
        Style::default().fg(Color::DarkGray),
      ))),
      (None, Some(e)) => lines.push(Line::from(Span::styled(
        format!("Failed to load: {}", e),
        Style::default().fg(Color::Red),
      ))),
      (None, None) => lines.push(Line::from("Loading...")),
    }

    let attachments = self.form.attachments();
    if !attachments.is_empty() {
      lines.push(Line::from(""));
      lines.push(Line::from(Span::styled(
        "To upload:",
        Style::default().fg(Color::Yellow),
      )));
      lines.extend(
        attachments
          .iter()
          .map(|p| Line::from(format!("  {}", p.display()))),
      );
    }

    frame.render_widget(Paragraph::new(lines), inner);
  }

  fn render_status(&self, frame: &mut Frame, area: Rect) {
    let text = if self.gate.is_submitting_debounced() {
      format!("{} Submitting...", spinner_frame(self.ticks))
    } else {
      self.message.clone().unwrap_or_default()
    };
    frame.render_widget(
      Paragraph::new(text).style(Style::default().fg(Color::Yellow)),
      area,
    );
  }
}

enum FieldValue {
  Title(String),
  Description(String),
  Deadline(Option<DateTime<Utc>>),
  MaxGrade(Option<u32>),
}

fn assignment_query(client: &CachedClient, id: u64) -> Query<Assignment> {
  let placeholder = client
    .peek::<Assignment>(&keys::assignment(id))
    .map(|c| c.data);
  let fetch_client = client.clone();
  let mut query = Query::new(move || {
    let client = fetch_client.clone();
    async move { client.get_assignment(id).await }
  })
  .with_placeholder(placeholder)
  .watching(client.cache(), keys::assignment(id));
  query.fetch();
  query
}

fn my_submission_query(client: &CachedClient, assignment_id: u64) -> Query<Option<Submission>> {
  let fetch_client = client.clone();
  let mut query = Query::new(move || {
    let client = fetch_client.clone();
    async move { client.my_submission(assignment_id).await }
  })
  .watching(client.cache(), keys::my_submission(assignment_id));
  query.fetch();
  query
}

/// Local "YYYY-MM-DD HH:MM" to UTC; empty input clears the deadline.
fn parse_deadline(input: &str) -> Result<Option<DateTime<Utc>>, String> {
  let input = input.trim();
  if input.is_empty() {
    return Ok(None);
  }
  let naive = NaiveDateTime::parse_from_str(input, DEADLINE_FORMAT)
    .map_err(|_| format!("Invalid deadline '{}', expected YYYY-MM-DD HH:MM", input))?;
  Local
    .from_local_datetime(&naive)
    .earliest()
    .map(|d| Some(d.with_timezone(&Utc)))
    .ok_or_else(|| format!("'{}' does not exist in the local time zone", input))
}

fn parse_max_grade(input: &str) -> Result<Option<u32>, String> {
  let input = input.trim();
  if input.is_empty() {
    return Ok(None);
  }
  match input.parse::<u32>() {
    Ok(0) | Err(_) => Err(format!("Invalid max grade '{}'", input)),
    Ok(g) => Ok(Some(g)),
  }
}

impl View for AssignmentDetailView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    match self.prompt.handle_key(key) {
      KeyResult::Event(PromptEvent::Submitted(field, value)) => {
        self.handle_prompt(field, value);
        return ViewAction::None;
      }
      KeyResult::Event(PromptEvent::Cancelled) | KeyResult::Handled => return ViewAction::None,
      KeyResult::NotHandled => {}
    }

    let teacher = self.ctx.can_teach();
    let editing = self.form.is_editing();
    match key.code {
      KeyCode::Char('[') => self.go_to(self.index.saturating_sub(1)),
      KeyCode::Char(']') => self.go_to(self.index + 1),
      KeyCode::Char('r') => {
        self.query.reload();
        if let Some(mine) = self.mine.as_mut() {
          mine.reload();
        }
      }

      KeyCode::Char('e') if teacher && !editing => self.form.begin_edit(),
      KeyCode::Char('t') if editing => self.open_field(Field::Title),
      KeyCode::Char('d') if editing => self.open_field(Field::Description),
      KeyCode::Char('l') if editing => self.open_field(Field::Deadline),
      KeyCode::Char('m') if editing => self.open_field(Field::MaxGrade),
      KeyCode::Char('s') if editing => self.save(),
      KeyCode::Esc if editing => {
        self.form.discard();
        self.message = Some("Changes discarded".to_string());
      }
      KeyCode::Char('v') if teacher => {
        if let Some(a) = self.current() {
          return ViewAction::Push(Box::new(SubmissionListView::new(
            Arc::clone(&self.ctx),
            self.client.clone(),
            a.id,
            a.max_grade,
          )));
        }
      }

      KeyCode::Char('a') if !teacher => {
        if self.form.bound_id() == Some(&self.current_id()) {
          self.prompt.open(Field::Attach, "File to attach", "");
        }
      }
      KeyCode::Char('x') if !teacher => {
        if let Some(last) = self.form.attachments().last().cloned() {
          self.form.detach(&last);
        }
      }
      KeyCode::Char('s') if !teacher => self.submit_files(),

      KeyCode::Char('q') | KeyCode::Esc => return ViewAction::Pop,
      _ => {}
    }
    ViewAction::None
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    let constraints = if self.mine.is_some() {
      vec![Constraint::Min(6), Constraint::Length(8), Constraint::Length(1)]
    } else {
      vec![Constraint::Min(6), Constraint::Length(0), Constraint::Length(1)]
    };
    let chunks = Layout::default()
      .direction(Direction::Vertical)
      .constraints(constraints)
      .split(area);

    self.render_assignment(frame, chunks[0]);
    self.render_submission(frame, chunks[1]);
    self.render_status(frame, chunks[2]);
    self.prompt.render_overlay(frame, area);
  }

  fn breadcrumb_label(&self) -> String {
    match self.current() {
      Some(a) => a.title.clone(),
      None => format!("Assignment #{}", self.current_id()),
    }
  }

  fn tick(&mut self) {
    self.ticks = self.ticks.wrapping_add(1);
    let changed = self.query.poll();
    if let Some(mine) = self.mine.as_mut() {
      mine.poll();
    }

    // A refetch shows the previous value as placeholder; only bind what
    // actually arrived, or the first value seen for this assignment
    let current = self.current_id();
    let bound_here = self.form.bound_id() == Some(&current);
    match self.query.data() {
      Some(a) if a.id == current && (changed || !bound_here) => {
        self.form.bind(a);
      }
      None if self.query.is_error() && !bound_here => self.form.unbind(),
      _ => {}
    }

    self.poll_writes();
  }

  fn is_capturing_input(&self) -> bool {
    self.prompt.is_active()
  }

  fn shortcuts(&self) -> Vec<Shortcut> {
    let mut shortcuts = vec![
      Shortcut::new("[ ]", "prev/next").with_priority(20),
      Shortcut::new("r", "refresh").with_priority(40),
    ];
    match (self.ctx.can_teach(), self.form.is_editing()) {
      (true, true) => {
        shortcuts.push(Shortcut::new("t/d/l/m", "edit field").with_priority(10));
        shortcuts.push(Shortcut::new("s", "save").with_priority(15));
        shortcuts.push(Shortcut::new("esc", "discard").with_priority(16));
      }
      (true, false) => {
        shortcuts.push(Shortcut::new("e", "edit").with_priority(10));
        shortcuts.push(Shortcut::new("v", "submissions").with_priority(15));
      }
      (false, _) => {
        shortcuts.push(Shortcut::new("a", "attach").with_priority(10));
        shortcuts.push(Shortcut::new("x", "detach"));
        shortcuts.push(Shortcut::new("s", "submit").with_priority(15));
      }
    }
    shortcuts
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::{Role, User, UserStatus};
  use crate::config::Config;
  use chrono::Timelike;

  fn detail_view(role: Role, siblings: Vec<u64>) -> AssignmentDetailView {
    let mut config = Config::default();
    config.api.base_url = "http://127.0.0.1:9/api".to_string();
    let config = Arc::new(config);
    let user = User {
      id: 1,
      first_name: "Grace".to_string(),
      last_name: "Hopper".to_string(),
      email: "grace@uni.edu".to_string(),
      role,
      status: UserStatus::Approved,
    };
    let client = CachedClient::new(&config, Some("token".to_string())).unwrap();
    let ctx = SessionContext::new(user, None, config);
    AssignmentDetailView::new(ctx, client, siblings, 0)
  }

  fn assignment(id: u64) -> Assignment {
    Assignment {
      id,
      course_id: 9,
      title: "Proofs".to_string(),
      description: String::new(),
      deadline: None,
      max_grade: Some(10),
    }
  }

  #[tokio::test]
  async fn test_save_waits_for_loaded_assignment() {
    let mut view = detail_view(Role::Teacher, vec![5]);
    view.form.bind(&assignment(5));
    view.form.begin_edit();
    view.form.fields_mut().unwrap().title = "Induction".to_string();

    // Nothing fetched yet, so the owning course is unknown
    view.save();

    assert!(view.save.is_none());
    assert!(!view.gate.is_submitting());
    assert_eq!(view.message.as_deref(), Some("Assignment is still loading"));
    assert!(view.form.is_editing());
  }

  #[tokio::test]
  async fn test_queries_follow_the_shown_assignment() {
    let mut view = detail_view(Role::Student, vec![5, 6]);
    assert_eq!(view.query.key(), Some(&keys::assignment(5)));
    assert_eq!(
      view.mine.as_ref().and_then(|q| q.key()),
      Some(&keys::my_submission(5))
    );

    view.go_to(1);
    assert_eq!(view.query.key(), Some(&keys::assignment(6)));
    assert_eq!(
      view.mine.as_ref().and_then(|q| q.key()),
      Some(&keys::my_submission(6))
    );
  }

  #[test]
  fn test_parse_deadline_empty_clears() {
    assert_eq!(parse_deadline("   "), Ok(None));
  }

  #[test]
  fn test_parse_deadline_local_time() {
    let parsed = parse_deadline("2026-03-14 09:30").unwrap().unwrap();
    let local = parsed.with_timezone(&Local);
    assert_eq!(local.format("%Y-%m-%d").to_string(), "2026-03-14");
    assert_eq!((local.hour(), local.minute()), (9, 30));
  }

  #[test]
  fn test_parse_deadline_rejects_other_formats() {
    assert!(parse_deadline("14/03/2026").is_err());
    assert!(parse_deadline("2026-03-14").is_err());
  }

  #[test]
  fn test_parse_max_grade() {
    assert_eq!(parse_max_grade(""), Ok(None));
    assert_eq!(parse_max_grade(" 20 "), Ok(Some(20)));
    assert!(parse_max_grade("0").is_err());
    assert!(parse_max_grade("-3").is_err());
    assert!(parse_max_grade("ten").is_err());
  }
}
