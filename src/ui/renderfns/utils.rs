use chrono::{DateTime, Local, Utc};
use ratatui::prelude::Color;

/// Truncate a string to at most `max_len` characters, adding "..." if truncated
pub fn truncate(s: &str, max_len: usize) -> String {
  if s.chars().count() <= max_len {
    s.to_string()
  } else {
    let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
    format!("{}...", kept)
  }
}

/// Timestamp in the user's local time, minute precision
pub fn format_date(at: &DateTime<Utc>) -> String {
  at.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
}

/// Grade text and the color to show it in
pub fn grade_label(grade: Option<u32>, max_grade: Option<u32>) -> (String, Color) {
  match (grade, max_grade) {
    (None, _) => ("ungraded".to_string(), Color::DarkGray),
    (Some(g), Some(max)) => {
      let color = if g * 2 >= max { Color::Green } else { Color::Red };
      (format!("{}/{}", g, max), color)
    }
    (Some(g), None) => (g.to_string(), Color::Green),
  }
}
