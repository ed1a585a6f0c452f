use crate::api::{keys, CachedClient, User, UserStatus};
use crate::query::{Pending, Query};
use crate::ui::components::{KeyResult, SearchInput};
use crate::ui::ensure_valid_selection;
use crate::ui::renderfns::truncate;
use crate::ui::view::{Shortcut, View, ViewAction};
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{ListItem, ListState, Paragraph};

use super::{empty_text, outcome, pane_block, pane_title, selectable_list};

/// Registrations waiting for an admin
pub struct PendingUsersView {
  client: CachedClient,
  query: Query<Vec<User>>,
  list_state: ListState,
  search: SearchInput,
  action: Option<(&'static str, Pending<()>)>,
  message: Option<String>,
}

impl PendingUsersView {
  pub fn new(client: CachedClient) -> Self {
    let placeholder = client
      .peek::<Vec<User>>(&keys::users(UserStatus::Pending))
      .map(|c| c.data);
    let fetch_client = client.clone();
    let mut query = Query::new(move || {
      let client = fetch_client.clone();
      async move { client.list_users(UserStatus::Pending).await }
    })
    .with_placeholder(placeholder)
    .watching(client.cache(), keys::users(UserStatus::Pending));

    query.fetch();

    Self {
      client,
      query,
      list_state: ListState::default(),
      search: SearchInput::new(),
      action: None,
      message: None,
    }
  }

  fn visible(&self) -> Vec<&User> {
    self
      .query
      .data()
      .map(|all| {
        all
          .iter()
          .filter(|u| self.search.matches(&u.full_name()) || self.search.matches(&u.email))
          .collect()
      })
      .unwrap_or_default()
  }

  fn selected_id(&self) -> Option<u64> {
    self
      .list_state
      .selected()
      .and_then(|idx| self.visible().get(idx).map(|u| u.id))
  }
}

impl View for PendingUsersView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    match self.search.handle_key(key) {
      KeyResult::Event(_) | KeyResult::Handled => return ViewAction::None,
      KeyResult::NotHandled => {}
    }

    let busy = self.action.is_some();
    match key.code {
      KeyCode::Char('j') | KeyCode::Down => self.list_state.select_next(),
      KeyCode::Char('k') | KeyCode::Up => self.list_state.select_previous(),
      KeyCode::Char('r') => self.query.reload(),
      KeyCode::Char('a') if !busy => {
        if let Some(id) = self.selected_id() {
          let client = self.client.clone();
          self.message = None;
          self.action = Some((
            "User approved",
            Pending::spawn(async move { client.approve_user(id).await }),
          ));
        }
      }
      KeyCode::Char('x') if !busy => {
        if let Some(id) = self.selected_id() {
          let client = self.client.clone();
          self.message = None;
          self.action = Some((
            "User archived",
            Pending::spawn(async move { client.archive_user(id).await }),
          ));
        }
      }
      KeyCode::Char('q') | KeyCode::Esc => return ViewAction::Pop,
      _ => {}
    }
    ViewAction::None
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    let len = self.visible().len();
    ensure_valid_selection(&mut self.list_state, len);

    let chunks = Layout::default()
      .direction(Direction::Vertical)
      .constraints([Constraint::Min(1), Constraint::Length(1)])
      .split(area);

    let block = pane_block(pane_title("Pending users", &self.query, len));

    if len == 0 {
      let text = if self.query.is_loading() {
        "Loading users...".to_string()
      } else {
        empty_text(self.query.is_error(), "pending users")
      };
      frame.render_widget(
        Paragraph::new(text)
          .block(block)
          .style(Style::default().fg(Color::DarkGray)),
        chunks[0],
      );
    } else {
      let items: Vec<ListItem> = self
        .visible()
        .iter()
        .map(|u| {
          ListItem::new(Line::from(vec![
            Span::styled(
              format!("{:<30}", truncate(&u.full_name(), 30)),
              Style::default().fg(Color::Cyan),
            ),
            Span::raw(format!("{:<36}", truncate(&u.email, 36))),
            Span::styled(
              format!("{:?}", u.role).to_lowercase(),
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

    self.search.render_overlay(frame, area);
  }

  fn breadcrumb_label(&self) -> String {
    "Pending users".to_string()
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
    self.search.is_active()
  }

  fn shortcuts(&self) -> Vec<Shortcut> {
    vec![
      Shortcut::new(":", "command").with_priority(10),
      Shortcut::new("a", "approve").with_priority(15),
      Shortcut::new("x", "archive").with_priority(16),
      Shortcut::new("/", "filter").with_priority(20),
      Shortcut::new("r", "refresh").with_priority(40),
    ]
  }
}
