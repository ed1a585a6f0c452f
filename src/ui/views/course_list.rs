use std::future::Future;
use std::sync::Arc;

use crate::api::{keys, ApiError, CachedClient, Course, CourseInput, CourseRef};
use crate::query::{Pending, Query};
use crate::session::SessionContext;
use crate::ui::components::{KeyResult, Prompt, PromptEvent, SearchInput};
use crate::ui::ensure_valid_selection;
use crate::ui::renderfns::truncate;
use crate::ui::view::{Shortcut, View, ViewAction};
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{ListItem, ListState, Paragraph};

use super::{empty_text, outcome, pane_block, pane_title, selectable_list};

#[derive(Debug, Clone, PartialEq, Eq)]
enum CoursePrompt {
  Create,
  Rename(u64),
}

/// All courses visible to the user; Enter makes one the session's course
pub struct CourseListView {
  ctx: Arc<SessionContext>,
  client: CachedClient,
  query: Query<Vec<Course>>,
  list_state: ListState,
  search: SearchInput,
  prompt: Prompt<CoursePrompt>,
  /// Running write and the message shown when it succeeds
  action: Option<(&'static str, Pending<()>)>,
  message: Option<String>,
}

impl CourseListView {
  pub fn new(ctx: Arc<SessionContext>, client: CachedClient) -> Self {
    let placeholder = client.peek::<Vec<Course>>(&keys::courses()).map(|c| c.data);
    let fetch_client = client.clone();
    let mut query = Query::new(move || {
      let client = fetch_client.clone();
      async move { client.list_courses().await }
    })
    .with_placeholder(placeholder)
    .watching(client.cache(), keys::courses());

    query.fetch();

    Self {
      ctx,
      client,
      query,
      list_state: ListState::default(),
      search: SearchInput::new(),
      prompt: Prompt::new(),
      action: None,
      message: None,
    }
  }

  fn visible(&self) -> Vec<&Course> {
    self
      .query
      .data()
      .map(|courses| {
        courses
          .iter()
          .filter(|c| self.search.matches(&c.name))
          .collect()
      })
      .unwrap_or_default()
  }

  fn selected(&self) -> Option<&Course> {
    self
      .list_state
      .selected()
      .and_then(|idx| self.visible().get(idx).copied())
  }

  fn run<Fut>(&mut self, done: &'static str, op: Fut)
  where
    Fut: Future<Output = Result<(), ApiError>> + Send + 'static,
  {
    if self.action.is_some() {
      self.message = Some("Still working on the previous change".to_string());
      return;
    }
    self.message = None;
    self.action = Some((done, Pending::spawn(op)));
  }

  fn handle_prompt(&mut self, tag: CoursePrompt, value: String) {
    let name = value.trim().to_string();
    if name.is_empty() {
      self.message = Some("Course name cannot be empty".to_string());
      return;
    }
    let input = CourseInput {
      name,
      description: None,
    };
    let client = self.client.clone();
    match tag {
      CoursePrompt::Create => self.run("Course created", async move {
        client.create_course(&input).await.map(|_| ())
      }),
      CoursePrompt::Rename(id) => {
        let description = self.selected().and_then(|c| c.description.clone());
        let input = CourseInput { description, ..input };
        self.run("Course renamed", async move {
          client.update_course(id, &input).await.map(|_| ())
        })
      }
    }
  }

  fn render_list(&mut self, frame: &mut Frame, area: Rect) {
    let len = self.visible().len();
    ensure_valid_selection(&mut self.list_state, len);

    let chunks = Layout::default()
      .direction(Direction::Vertical)
      .constraints([Constraint::Min(1), Constraint::Length(1)])
      .split(area);

    let block = pane_block(pane_title("Courses", &self.query, len));

    if len == 0 {
      let text = if self.query.is_loading() {
        "Loading courses...".to_string()
      } else {
        empty_text(self.query.is_error(), "courses")
      };
      let paragraph = Paragraph::new(text)
        .block(block)
        .style(Style::default().fg(Color::DarkGray));
      frame.render_widget(paragraph, chunks[0]);
    } else {
      let current = self.ctx.course_id();
      let items: Vec<ListItem> = self
        .visible()
        .iter()
        .map(|course| {
          let marker = if Some(course.id) == current { "* " } else { "  " };
          ListItem::new(Line::from(vec![
            Span::styled(marker, Style::default().fg(Color::Yellow)),
            Span::styled(
              format!("{:<40}", truncate(&course.name, 40)),
              Style::default().fg(Color::Cyan),
            ),
            Span::styled(
              truncate(course.description.as_deref().unwrap_or(""), 60),
              Style::default().fg(Color::DarkGray),
            ),
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

impl View for CourseListView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    match self.prompt.handle_key(key) {
      KeyResult::Event(PromptEvent::Submitted(tag, value)) => {
        self.handle_prompt(tag, value);
        return ViewAction::None;
      }
      KeyResult::Event(PromptEvent::Cancelled) | KeyResult::Handled => return ViewAction::None,
      KeyResult::NotHandled => {}
    }

    match self.search.handle_key(key) {
      KeyResult::Event(_) | KeyResult::Handled => return ViewAction::None,
      KeyResult::NotHandled => {}
    }

    let can_manage = self.ctx.can_teach();
    match key.code {
      KeyCode::Char('j') | KeyCode::Down => self.list_state.select_next(),
      KeyCode::Char('k') | KeyCode::Up => self.list_state.select_previous(),
      KeyCode::Char('r') => self.query.reload(),
      KeyCode::Char('n') if can_manage => {
        self
          .prompt
          .open(CoursePrompt::Create, "New course name", "")
      }
      KeyCode::Char('e') if can_manage => {
        if let Some((id, name)) = self.selected().map(|c| (c.id, c.name.clone())) {
          self.prompt.open(CoursePrompt::Rename(id), "Rename course", &name);
        }
      }
      KeyCode::Char('d') if can_manage => {
        if let Some(id) = self.selected().map(|c| c.id) {
          let client = self.client.clone();
          self.run("Course deleted", async move { client.delete_course(id).await });
        }
      }
      KeyCode::Enter => {
        if let Some(course) = self.selected() {
          return ViewAction::SwitchCourse(CourseRef::from(course));
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
    "Courses".to_string()
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
      shortcuts.push(Shortcut::new("e", "rename"));
      shortcuts.push(Shortcut::new("d", "delete"));
    }
    shortcuts
  }
}
