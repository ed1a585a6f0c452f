use super::input::{InputResult, TextInput};
use super::KeyResult;
use crossterm::event::KeyEvent;
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Clear, Paragraph};

/// Events emitted by a prompt that the parent needs to handle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptEvent<T> {
  /// Value entered; carries the tag given to `open`
  Submitted(T, String),
  Cancelled,
}

/// One-line value prompt (grade, comment, file path, field edit).
///
/// Inactive prompts ignore every key. The tag says what the value is for.
#[derive(Debug, Clone)]
pub struct Prompt<T> {
  input: TextInput,
  label: String,
  tag: Option<T>,
}

impl<T> Default for Prompt<T> {
  fn default() -> Self {
    Self {
      input: TextInput::new(),
      label: String::new(),
      tag: None,
    }
  }
}

impl<T: Clone> Prompt<T> {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn is_active(&self) -> bool {
    self.tag.is_some()
  }

  pub fn open(&mut self, tag: T, label: impl Into<String>, initial: &str) {
    self.tag = Some(tag);
    self.label = label.into();
    self.input.set(initial);
  }

  pub fn close(&mut self) {
    self.tag = None;
    self.input.clear();
  }

  pub fn handle_key(&mut self, key: KeyEvent) -> KeyResult<PromptEvent<T>> {
    let Some(tag) = self.tag.clone() else {
      return KeyResult::NotHandled;
    };

    match self.input.handle_key(key) {
      InputResult::Submitted(value) => {
        self.close();
        KeyResult::Event(PromptEvent::Submitted(tag, value))
      }
      InputResult::Cancelled => {
        self.close();
        KeyResult::Event(PromptEvent::Cancelled)
      }
      // Swallow everything else while open
      InputResult::Consumed | InputResult::NotHandled => KeyResult::Handled,
    }
  }

  /// Render the prompt overlay at the bottom of `area` if active
  pub fn render_overlay(&self, frame: &mut Frame, area: Rect) {
    if !self.is_active() || area.height < 3 {
      return;
    }

    let width = (area.width * 80 / 100).max(30).min(area.width);
    let overlay_area = Rect::new(area.x + 1, area.bottom() - 3, width.saturating_sub(2), 3);

    frame.render_widget(Clear, overlay_area);

    let block = Block::default()
      .borders(Borders::ALL)
      .border_style(Style::default().fg(Color::Yellow))
      .title(format!(" {} ", self.label));

    let inner = block.inner(overlay_area);
    frame.render_widget(block, overlay_area);

    let line = Line::from(vec![
      Span::raw(self.input.value()),
      Span::styled("_", Style::default().fg(Color::Yellow)), // Cursor
    ]);
    frame.render_widget(Paragraph::new(line), inner);
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crossterm::event::{KeyCode, KeyModifiers};

  fn key(code: KeyCode) -> KeyEvent {
    KeyEvent::new(code, KeyModifiers::NONE)
  }

  #[derive(Debug, Clone, PartialEq, Eq)]
  enum Field {
    Grade,
  }

  #[test]
  fn test_inactive_passes_keys_through() {
    let mut prompt: Prompt<Field> = Prompt::new();
    assert_eq!(prompt.handle_key(key(KeyCode::Char('g'))), KeyResult::NotHandled);
  }

  #[test]
  fn test_submit_returns_tag_and_value() {
    let mut prompt = Prompt::new();
    prompt.open(Field::Grade, "Grade", "");
    prompt.handle_key(key(KeyCode::Char('9')));

    assert_eq!(
      prompt.handle_key(key(KeyCode::Enter)),
      KeyResult::Event(PromptEvent::Submitted(Field::Grade, "9".to_string()))
    );
    assert!(!prompt.is_active());
  }

  #[test]
  fn test_open_prefills_and_cancel_closes() {
    let mut prompt = Prompt::new();
    prompt.open(Field::Grade, "Grade", "7");
    prompt.handle_key(key(KeyCode::Char('5')));
    assert_eq!(prompt.input.value(), "75");

    assert_eq!(
      prompt.handle_key(key(KeyCode::Esc)),
      KeyResult::Event(PromptEvent::Cancelled)
    );
    assert!(!prompt.is_active());
  }

  #[test]
  fn test_open_prompt_swallows_navigation() {
    let mut prompt = Prompt::new();
    prompt.open(Field::Grade, "Grade", "");
    assert_eq!(prompt.handle_key(key(KeyCode::Up)), KeyResult::Handled);
  }
}
