use std::sync::Arc;

use crate::api::{keys, CachedClient, Comment};
use crate::query::{Pending, Query};
use crate::session::SessionContext;
use crate::ui::components::{KeyResult, Prompt, PromptEvent};
use crate::ui::ensure_valid_selection;
use crate::ui::renderfns::format_date;
use crate::ui::view::{Shortcut, View, ViewAction};
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{ListItem, ListState, Paragraph};

use super::{empty_text, outcome, pane_block, pane_title, selectable_list};

/// Comment thread of one submission
pub struct CommentsView {
  ctx: Arc<SessionContext>,
  client: CachedClient,
  submission_id: u64,
  query: Query<Vec<Comment>>,
  list_state: ListState,
  prompt: Prompt<()>,
  action: Option<(&'static str, Pending<()>)>,
  message: Option<String>,
}

impl CommentsView {
  pub fn new(ctx: Arc<SessionContext>, client: CachedClient, submission_id: u64) -> Self {
    let placeholder = client
      .peek::<Vec<Comment>>(&keys::comments(submission_id))
      .map(|c| c.data);
    let fetch_client = client.clone();
    let mut query = Query::new(move || {
      let client = fetch_client.clone();
      async move { client.list_comments(submission_id).await }
    })
    .with_placeholder(placeholder)
    .watching(client.cache(), keys::comments(submission_id));

    query.fetch();

    Self {
      ctx,
      client,
      submission_id,
      query,
      list_state: ListState::default(),
      prompt: Prompt::new(),
      action: None,
      message: None,
    }
  }

  fn comments(&self) -> &[Comment] {
    self.query.data().map(Vec::as_slice).unwrap_or_default()
  }

  fn selected(&self) -> Option<&Comment> {
    self
      .list_state
      .selected()
      .and_then(|idx| self.comments().get(idx))
  }

  /// Authors manage their own comments; admins any
  fn can_delete(&self, comment: &Comment) -> bool {
    comment.author_id == self.ctx.user.id || self.ctx.is_admin()
  }

  fn add(&mut self, content: String) {
    let content = content.trim().to_string();
    if content.is_empty() {
      return;
    }
    let client = self.client.clone();
    let submission_id = self.submission_id;
    self.message = None;
    self.action = Some((
      "Comment added",
      Pending::spawn(async move {
        client
          .add_comment(submission_id, &content)
          .await
          .map(|_| ())
      }),
    ));
  }

  fn delete_selected(&mut self) {
    let Some(comment) = self.selected() else {
      return;
    };
    if !self.can_delete(comment) {
      self.message = Some("You can only delete your own comments".to_string());
      return;
    }
    let id = comment.id;
    let client = self.client.clone();
    let submission_id = self.submission_id;
    self.message = None;
    self.action = Some((
      "Comment deleted",
      Pending::spawn(async move { client.delete_comment(id, submission_id).await }),
    ));
  }
}

impl View for CommentsView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    match self.prompt.handle_key(key) {
      KeyResult::Event(PromptEvent::Submitted((), content)) => {
        self.add(content);
        return ViewAction::None;
      }
      KeyResult::Event(PromptEvent::Cancelled) | KeyResult::Handled => return ViewAction::None,
      KeyResult::NotHandled => {}
    }

    let busy = self.action.is_some();
    match key.code {
      KeyCode::Char('j') | KeyCode::Down => self.list_state.select_next(),
      KeyCode::Char('k') | KeyCode::Up => self.list_state.select_previous(),
      KeyCode::Char('r') => self.query.reload(),
      KeyCode::Char('a') if !busy => self.prompt.open((), "Comment", ""),
      KeyCode::Char('d') if !busy => self.delete_selected(),
      KeyCode::Char('q') | KeyCode::Esc => return ViewAction::Pop,
      _ => {}
    }
    ViewAction::None
  }

  fn render(&mut self, frame: &mut Frame, area: Rect) {
    let len = self.comments().len();
    ensure_valid_selection(&mut self.list_state, len);

    let chunks = Layout::default()
      .direction(Direction::Vertical)
      .constraints([Constraint::Min(1), Constraint::Length(1)])
      .split(area);

    let block = pane_block(pane_title("Comments", &self.query, len));

    if len == 0 {
      let text = if self.query.is_loading() {
        "Loading comments...".to_string()
      } else {
        empty_text(self.query.is_error(), "comments")
      };
      frame.render_widget(
        Paragraph::new(text)
          .block(block)
          .style(Style::default().fg(Color::DarkGray)),
        chunks[0],
      );
    } else {
      let items: Vec<ListItem> = self
        .comments()
        .iter()
        .map(|c| {
          let mut lines = vec![Line::from(vec![
            Span::styled(c.author_name.clone(), Style::default().fg(Color::Cyan)),
            Span::raw("  "),
            Span::styled(format_date(&c.created_at), Style::default().fg(Color::DarkGray)),
          ])];
          lines.extend(c.content.lines().map(|l| Line::from(format!("  {}", l))));
          ListItem::new(lines)
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

    self.prompt.render_overlay(frame, area);
  }

  fn breadcrumb_label(&self) -> String {
    "Comments".to_string()
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
    self.prompt.is_active()
  }

  fn shortcuts(&self) -> Vec<Shortcut> {
    vec![
      Shortcut::new("a", "add").with_priority(10),
      Shortcut::new("d", "delete").with_priority(15),
      Shortcut::new("r", "refresh").with_priority(40),
      Shortcut::new("q", "back").with_priority(30),
    ]
  }
}
