pub mod components;
pub mod renderfns;
pub mod view;
pub mod views;

use crate::app::App;
use ratatui::prelude::*;
use ratatui::widgets::{ListState, Paragraph, Wrap};

/// Main draw function
pub fn draw(frame: &mut Frame, app: &mut App) {
  let chunks = Layout::default()
    .direction(Direction::Vertical)
    .constraints([
      Constraint::Length(1), // Header
      Constraint::Min(1),    // Main content
      Constraint::Length(1), // Footer
    ])
    .split(frame.area());

  let shortcuts = app.current_shortcuts();
  renderfns::draw_header(
    frame,
    chunks[0],
    app.title(),
    &app.session().user.full_name(),
    app.session().course.as_ref().map(|c| c.name.as_str()),
    &shortcuts,
  );

  let breadcrumb = app.view_breadcrumb();
  if let Some(view) = app.current_view_mut() {
    view.render(frame, chunks[1]);
  }

  renderfns::draw_footer(frame, chunks[2], &breadcrumb, app.message());

  app.command_input().render_overlay(frame, chunks[1]);
}

/// Keep the list selection inside `len` items, selecting the first one when
/// there is something to select.
pub fn ensure_valid_selection(state: &mut ListState, len: usize) {
  match state.selected() {
    _ if len == 0 => state.select(None),
    None => state.select(Some(0)),
    Some(i) if i >= len => state.select(Some(len - 1)),
    Some(_) => {}
  }
}

/// Dimmed, wrapped placeholder text for empty, loading or failed panes
pub fn render_notice(frame: &mut Frame, area: Rect, text: &str, color: Color) {
  let paragraph = Paragraph::new(text.to_string())
    .wrap(Wrap { trim: true })
    .style(Style::default().fg(color));
  frame.render_widget(paragraph, area);
}
