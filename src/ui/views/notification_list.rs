use std::sync::Arc;

use crate::api::{keys, CachedClient, Notification};
use crate::query::{Pending, Query};
use crate::session::SessionContext;
use crate::ui::ensure_valid_selection;
use crate::ui::renderfns::{format_date, truncate};
use crate::ui::view::{Shortcut, View, ViewAction};
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{ListItem, ListState, Paragraph};

use super::{empty_text, outcome, pane_block, pane_title, selectable_list};

pub struct NotificationListView {
  ctx: Arc<SessionContext>,
  client: CachedClient,
  query: Query<Vec<Notification>>,
  list_state: ListState,
  marking: Option<Pending<()>>,
  message: Option<String>,
}

impl NotificationListView {
  pub fn new(ctx: Arc<SessionContext>, client: CachedClient) -> Self {
    let placeholder = client
      .peek::<Vec<Notification>>(&keys::notifications())
      .map(|c| c.data);
    let fetch_client = client.clone();
    let mut query = Query::new(move || {
      let client = fetch_client.clone();
      async move { client.list_notifications().await }
    })
    .with_placeholder(placeholder)
    .watching(client.cache(), keys::notifications())
    .with_stale_time(ctx.config.cache.stale_after());

    query.fetch();

    Self {
      ctx,
      client,
      query,
      list_state: ListState::default(),
      marking: None,
      message: None,
    }
  }

  fn notifications(&self) -> &[Notification] {
    self.query.data().map(Vec::as_slice).unwrap_or_default()
  }

  fn unread(&self) -> usize {
    self.notifications().iter().filter(|n| !n.read).count()
  }

  fn mark_selected(&mut self) {
    if self.marking.is_some() {
      return;
    }
    let Some(n) = self
      .list_state
      .selected()
      .and_then(|idx| self.notifications().get(idx))
    else {
      return;
    };
    if n.read {
      return;
    }
    let id = n.id;
    let client = self.client.clone();
    self.message = None;
    self.marking = Some(Pending::spawn(async move {
      client.mark_notification_read(id).await
    }));
  }
}

impl View for NotificationListView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    match key.code {
      KeyCode::Char('j') | KeyCode::Down => self.list_state.select_next(),
      KeyCode::Char('k') | KeyCode::Up => self.list_state.select_previous(),
      KeyCode::Char('r') => self.query.reload(),
      KeyCode::Char('m') | KeyCode::Enter => self.mark_selected(),
      KeyCode::Char('q') | KeyCode::Esc => return ViewAction::Pop,
      _ => {}
    }
    ViewAction::None
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    let len = self.notifications().len();
    ensure_valid_selection(&mut self.list_state, len);

    let chunks = Layout::default()
      .direction(Direction::Vertical)
      .constraints([Constraint::Min(1), Constraint::Length(1)])
      .split(area);

    let label = format!("Notifications, {} unread", self.unread());
    let block = pane_block(pane_title(&label, &self.query, len));

    if len == 0 {
      let text = if self.query.is_loading() {
        "Loading notifications...".to_string()
      } else {
        empty_text(self.query.is_error(), "notifications")
      };
      frame.render_widget(
        Paragraph::new(text)
          .block(block)
          .style(Style::default().fg(Color::DarkGray)),
        chunks[0],
      );
    } else {
      let items: Vec<ListItem> = self
        .notifications()
        .iter()
        .map(|n| {
          let style = if n.read {
            Style::default().fg(Color::DarkGray)
          } else {
            Style::default().add_modifier(Modifier::BOLD)
          };
          ListItem::new(Line::from(vec![
            Span::styled(if n.read { "  " } else { "* " }, Style::default().fg(Color::Yellow)),
            Span::styled(
              format!("{:<18}", format_date(&n.created_at)),
              Style::default().fg(Color::DarkGray),
            ),
            Span::styled(truncate(&n.message, 80), style),
          ]))
        })
        .collect();
      frame.render_stateful_widget(
        selectable_list(items, block),
        chunks[0],
        &mut self.list_state,
      );
    }

    let status = if self.marking.is_some() {
      "Marking as read...".to_string()
    } else {
      self.message.clone().unwrap_or_default()
    };
    frame.render_widget(
      Paragraph::new(status).style(Style::default().fg(Color::Yellow)),
      chunks[1],
    );
  }

  fn breadcrumb_label(&self) -> String {
    "Notifications".to_string()
  }

  fn tick(&mut self) {
    self.query.poll();

    // Poll the server while open
    if self.query.is_success() && self.query.is_stale() {
      self.query.refetch();
    }

    if let Some(result) = self.marking.as_mut().and_then(|p| p.poll()) {
      self.marking = None;
      if let Err(e) = &result {
        self.message = Some(outcome(&result, ""));
        tracing::warn!(user = self.ctx.user.id, error = %e, "failed to mark notification read");
      } else {
        self.query.refetch();
      }
    }
  }

  fn shortcuts(&self) -> Vec<Shortcut> {
    vec![
      Shortcut::new(":", "command").with_priority(10),
      Shortcut::new("m", "mark read").with_priority(15),
      Shortcut::new("r", "refresh").with_priority(40),
    ]
  }
}
