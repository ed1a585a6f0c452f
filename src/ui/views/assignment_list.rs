use std::sync::Arc;

use chrono::Utc;

use crate::api::{keys, Assignment, AssignmentInput, CachedClient};
use crate::query::{Pending, Query};
use crate::session::SessionContext;
use crate::ui::components::{KeyResult, Prompt, PromptEvent, SearchInput};
use crate::ui::ensure_valid_selection;
use crate::ui::renderfns::{format_date, truncate};
use crate::ui::view::{Shortcut, View, ViewAction};
use crate::ui::views::AssignmentDetailView;
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{ListItem, ListState, Paragraph};

use super::{empty_text, outcome, pane_block, pane_title, selectable_list};

/// Assignments of one course
pub struct AssignmentListView {
  ctx: Arc<SessionContext>,
  client: CachedClient,
  course_id: u64,
  query: Query<Vec<Assignment>>,
  list_state: ListState,
  search: SearchInput,
  prompt: Prompt<()>,
  action: Option<(&'static str, Pending<()>)>,
  message: Option<String>,
}

impl AssignmentListView {
  pub fn new(ctx: Arc<SessionContext>, client: CachedClient, course_id: u64) -> Self {
    let placeholder = client
      .peek::<Vec<Assignment>>(&keys::assignments(course_id))
      .map(|c| c.data);
    let fetch_client = client.clone();
    let mut query = Query::new(move || {
      let client = fetch_client.clone();
      async move { client.list_assignments(course_id).await }
    })
    .with_placeholder(placeholder)
    .watching(client.cache(), keys::assignments(course_id));

    query.fetch();

    Self {
      ctx,
      client,
      course_id,
      query,
      list_state: ListState::default(),
      search: SearchInput::new(),
      prompt: Prompt::new(),
      action: None,
      message: None,
    }
  }

  fn visible(&self) -> Vec<&Assignment> {
    self
      .query
      .data()
      .map(|all| all.iter().filter(|a| self.search.matches(&a.title)).collect())
      .unwrap_or_default()
  }

  fn selected(&self) -> Option<&Assignment> {
    self
      .list_state
      .selected()
      .and_then(|idx| self.visible().get(idx).copied())
  }

  fn create(&mut self, title: String) {
    let title = title.trim().to_string();
    if title.is_empty() {
      self.message = Some("Title cannot be empty".to_string());
      return;
    }
    let input = AssignmentInput {
      title,
      description: String::new(),
      deadline: None,
      max_grade: None,
    };
    let client = self.client.clone();
    let course_id = self.course_id;
    self.start(
      "Assignment created",
      Pending::spawn(async move {
        client
          .create_assignment(course_id, &input)
          .await
          .map(|_| ())
      }),
    );
  }

  fn delete_selected(&mut self) {
    let Some(id) = self.selected().map(|a| a.id) else {
      return;
    };
    let client = self.client.clone();
    let course_id = self.course_id;
    self.start(
      "Assignment deleted",
      Pending::spawn(async move { client.delete_assignment(id, course_id).await }),
    );
  }

  fn start(&mut self, done: &'static str, pending: Pending<()>) {
    self.message = None;
    self.action = Some((done, pending));
  }

  fn render_list(&mut self, frame: &mut Frame, area: Rect) {
    let len = self.visible().len();
    ensure_valid_selection(&mut self.list_state, len);

    let chunks = Layout::default()
      .direction(Direction::Vertical)
      .constraints([Constraint::Min(1), Constraint::Length(1)])
      .split(area);

    let block = pane_block(pane_title("Assignments", &self.query, len));

    if len == 0 {
      let text = if self.query.is_loading() {
        "Loading assignments...".to_string()
      } else {
        empty_text(self.query.is_error(), "assignments")
      };
      let paragraph = Paragraph::new(text)
        .block(block)
        .style(Style::default().fg(Color::DarkGray));
      frame.render_widget(paragraph, chunks[0]);
    } else {
      let now = Utc::now();
      let items: Vec<ListItem> = self
        .visible()
        .iter()
        .map(|a| {
          let (deadline, color) = match &a.deadline {
            Some(d) if a.is_past_deadline(now) => (format_date(d), Color::Red),
            Some(d) => (format_date(d), Color::Green),
            None => ("no deadline".to_string(), Color::DarkGray),
          };
          ListItem::new(Line::from(vec![
            Span::styled(
              format!("{:<18}", deadline),
              Style::default().fg(color),
            ),
            Span::raw(" "),
            Span::raw(truncate(&a.title, 70)),
          ]))
        })
        .collect();

      frame.render_stateful_widget(
        selectable_list(items, block),
        chunks[0],
        &mut self.list_state,
      );
    }

    let status = if self.action.is_some() {
      "Saving...".to_string()
    } else {
      self.message.clone().unwrap_or_default()
    };
    frame.render_widget(
      Paragraph::new(status).style(Style::default().fg(Color::Yellow)),
      chunks[1],
    );
  }
}

impl View for AssignmentListView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    match self.prompt.handle_key(key) {
      KeyResult::Event(PromptEvent::Submitted((), title)) => {
        self.create(title);
        return ViewAction::None;
      }
      KeyResult::Event(PromptEvent::Cancelled) | KeyResult::Handled => return ViewAction::None,
      KeyResult::NotHandled => {}
    }

    match self.search.handle_key(key) {
      KeyResult::Event(_) | KeyResult::Handled => return ViewAction::None,
      KeyResult::NotHandled => {}
    }

    let busy = self.action.is_some();
    let can_teach = self.ctx.can_teach();
    match key.code {
      KeyCode::Char('j') | KeyCode::Down => self.list_state.select_next(),
      KeyCode::Char('k') | KeyCode::Up => self.list_state.select_previous(),
      KeyCode::Char('r') => self.query.reload(),
      KeyCode::Char('n') if can_teach && !busy => self.prompt.open((), "New assignment title", ""),
      KeyCode::Char('d') if can_teach && !busy => self.delete_selected(),
      KeyCode::Enter => {
        if let Some(idx) = self.list_state.selected() {
          let siblings: Vec<u64> = self.visible().iter().map(|a| a.id).collect();
          if idx < siblings.len() {
            return ViewAction::Push(Box::new(AssignmentDetailView::new(
              Arc::clone(&self.ctx),
              self.client.clone(),
              siblings,
              idx,
            )));
          }
        }
      }
      KeyCode::Char('q') | KeyCode::Esc => return ViewAction::Pop,
      _ => {}
    }
    ViewAction::None
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    self.render_list(frame, area);
    self.search.render_overlay(frame, area);
    self.prompt.render_overlay(frame, area);
  }

  fn breadcrumb_label(&self) -> String {
    match &self.ctx.course {
      Some(course) => format!("Assignments [{}]", course.name),
      None => "Assignments".to_string(),
    }
  }

  fn tick(&mut self) {
    self.query.poll();

    if let Some((done, result)) = self
      .action
      .as_mut()
      .and_then(|(done, p)| p.poll().map(|r| (*done, r)))
    {
      self.action = None;
      self.message = Some(outcome(&result, done));
      if result.is_ok() {
        self.query.refetch();
      }
    }
  }

  fn is_capturing_input(&self) -> bool {
    self.prompt.is_active() || self.search.is_active()
  }

  fn shortcuts(&self) -> Vec<Shortcut> {
    let mut shortcuts = vec![
      Shortcut::new(":", "command").with_priority(10),
      Shortcut::new("/", "filter").with_priority(20),
      Shortcut::new("enter", "open").with_priority(25),
      Shortcut::new("r", "refresh").with_priority(40),
    ];
    if self.ctx.can_teach() {
      shortcuts.push(Shortcut::new("n", "new"));
      shortcuts.push(Shortcut::new("d", "delete"));
    }
    shortcuts
  }
}
