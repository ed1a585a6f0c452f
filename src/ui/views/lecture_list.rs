use std::future::Future;
use std::sync::Arc;

use crate::api::{keys, ApiError, CachedClient, Lecture, LectureInput};
use crate::query::{Pending, Query};
use crate::session::SessionContext;
use crate::ui::components::{KeyResult, Prompt, PromptEvent, SearchInput};
use crate::ui::ensure_valid_selection;
use crate::ui::renderfns::{format_date, truncate};
use crate::ui::view::{Shortcut, View, ViewAction};
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{ListItem, ListState, Paragraph, Wrap};

use super::{empty_text, outcome, pane_block, pane_title, selectable_list};

#[derive(Debug, Clone, PartialEq, Eq)]
enum LecturePrompt {
  Create,
  Content(u64),
}

/// Lectures of one course with the selected one's content
pub struct LectureListView {
  ctx: Arc<SessionContext>,
  client: CachedClient,
  course_id: u64,
  query: Query<Vec<Lecture>>,
  list_state: ListState,
  search: SearchInput,
  prompt: Prompt<LecturePrompt>,
  action: Option<(&'static str, Pending<()>)>,
  message: Option<String>,
}

impl LectureListView {
  pub fn new(ctx: Arc<SessionContext>, client: CachedClient, course_id: u64) -> Self {
    let placeholder = client
      .peek::<Vec<Lecture>>(&keys::lectures(course_id))
      .map(|c| c.data);
    let fetch_client = client.clone();
    let mut query = Query::new(move || {
      let client = fetch_client.clone();
      async move { client.list_lectures(course_id).await }
    })
    .with_placeholder(placeholder)
    .watching(client.cache(), keys::lectures(course_id));

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

  fn visible(&self) -> Vec<&Lecture> {
    self
      .query
      .data()
      .map(|all| all.iter().filter(|l| self.search.matches(&l.title)).collect())
      .unwrap_or_default()
  }

  fn selected(&self) -> Option<&Lecture> {
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

  fn handle_prompt(&mut self, tag: LecturePrompt, value: String) {
    let client = self.client.clone();
    let course_id = self.course_id;
    match tag {
      LecturePrompt::Create => {
        let title = value.trim().to_string();
        if title.is_empty() {
          self.message = Some("Title cannot be empty".to_string());
          return;
        }
        let input = LectureInput {
          title,
          content: String::new(),
        };
        self.run("Lecture created", async move {
          client.create_lecture(course_id, &input).await.map(|_| ())
        });
      }
      LecturePrompt::Content(id) => {
        let Some(title) = self.selected().filter(|l| l.id == id).map(|l| l.title.clone()) else {
          return;
        };
        let input = LectureInput {
          title,
          content: value,
        };
        self.run("Lecture updated", async move {
          client.update_lecture(id, course_id, &input).await.map(|_| ())
        });
      }
    }
  }

  fn render_list(&mut self, frame: &mut Frame, area: Rect) {
    let len = self.visible().len();
    ensure_valid_selection(&mut self.list_state, len);

    let block = pane_block(pane_title("Lectures", &self.query, len));

    if len == 0 {
      let text = if self.query.is_loading() {
        "Loading lectures...".to_string()
      } else {
        empty_text(self.query.is_error(), "lectures")
      };
      frame.render_widget(
        Paragraph::new(text)
          .block(block)
          .style(Style::default().fg(Color::DarkGray)),
        area,
      );
      return;
    }

    let items: Vec<ListItem> = self
      .visible()
      .iter()
      .map(|l| {
        ListItem::new(Line::from(vec![
          Span::styled(
            format!("{:<18}", format_date(&l.created_at)),
            Style::default().fg(Color::DarkGray),
          ),
          Span::raw(truncate(&l.title, 50)),
        ]))
      })
      .collect();

    frame.render_stateful_widget(selectable_list(items, block), area, &mut self.list_state);
  }

  fn render_content(&self, frame: &mut Frame, area: Rect) {
    let Some(lecture) = self.selected() else {
      frame.render_widget(pane_block(" Content ".to_string()), area);
      return;
    };
    let block = pane_block(format!(" {} ", truncate(&lecture.title, 40)));
    let text = if lecture.content.is_empty() {
      Text::styled("No content yet.", Style::default().fg(Color::DarkGray))
    } else {
      Text::raw(lecture.content.clone())
    };
    frame.render_widget(
      Paragraph::new(text).block(block).wrap(Wrap { trim: false }),
      area,
    );
  }
}

impl View for LectureListView {
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
          .open(LecturePrompt::Create, "New lecture title", "")
      }
      KeyCode::Char('c') if can_manage => {
        if let Some((id, content)) = self.selected().map(|l| (l.id, l.content.clone())) {
          self
            .prompt
            .open(LecturePrompt::Content(id), "Lecture content", &content);
        }
      }
      KeyCode::Char('d') if can_manage => {
        if let Some(id) = self.selected().map(|l| l.id) {
          let client = self.client.clone();
          let course_id = self.course_id;
          self.run("Lecture deleted", async move {
            client.delete_lecture(id, course_id).await
          });
        }
      }
      KeyCode::Char('q') | KeyCode::Esc => return ViewAction::Pop,
      _ => {}
    }
    ViewAction::None
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    let rows = Layout::default()
      .direction(Direction::Vertical)
      .constraints([Constraint::Min(1), Constraint::Length(1)])
      .split(area);
    let columns = Layout::default()
      .direction(Direction::Horizontal)
      .constraints([Constraint::Percentage(45), Constraint::Percentage(55)])
      .split(rows[0]);

    self.render_list(frame, columns[0]);
    self.render_content(frame, columns[1]);

    let status = if self.action.is_some() {
      "Saving...".to_string()
    } else {
      self.message.clone().unwrap_or_default()
    };
    frame.render_widget(
      Paragraph::new(status).style(Style::default().fg(Color::Yellow)),
      rows[1],
    );

    self.search.render_overlay(frame, area);
    self.prompt.render_overlay(frame, area);
  }

  fn breadcrumb_label(&self) -> String {
    match &self.ctx.course {
      Some(course) => format!("Lectures [{}]", course.name),
      None => "Lectures".to_string(),
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
      Shortcut::new("r", "refresh").with_priority(40),
    ];
    if self.ctx.can_teach() {
      shortcuts.push(Shortcut::new("n", "new"));
      shortcuts.push(Shortcut::new("c", "content"));
      shortcuts.push(Shortcut::new("d", "delete"));
    }
    shortcuts
  }
}
