//! Structured cache keys with segment-wise prefix matching.

use std::fmt;

/// One segment of a [`QueryKey`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeyPart {
  /// Resource name or filter value (e.g. "assignments", "pending")
  Tag(String),
  /// Numeric entity id
  Id(u64),
}

impl From<&str> for KeyPart {
  fn from(tag: &str) -> Self {
    KeyPart::Tag(tag.to_string())
  }
}

impl From<String> for KeyPart {
  fn from(tag: String) -> Self {
    KeyPart::Tag(tag)
  }
}

impl From<u64> for KeyPart {
  fn from(id: u64) -> Self {
    KeyPart::Id(id)
  }
}

impl fmt::Display for KeyPart {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      KeyPart::Tag(tag) => f.write_str(tag),
      KeyPart::Id(id) => write!(f, "{}", id),
    }
  }
}

/// Ordered tuple identifying a cached resource, e.g. `("assignment", 5)`.
///
/// A key is also used as a prefix: every key whose leading segments equal the
/// prefix's segments belongs to the prefix's invalidation group. Matching is
/// per segment, so `assignment` never matches `assignments:9`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct QueryKey {
  parts: Vec<KeyPart>,
}

impl QueryKey {
  /// Start a key from its resource name.
  pub fn new(resource: &str) -> Self {
    Self {
      parts: vec![KeyPart::from(resource)],
    }
  }

  /// Append a segment.
  pub fn with(mut self, part: impl Into<KeyPart>) -> Self {
    self.parts.push(part.into());
    self
  }

  pub fn parts(&self) -> &[KeyPart] {
    &self.parts
  }

  pub fn len(&self) -> usize {
    self.parts.len()
  }

  pub fn is_empty(&self) -> bool {
    self.parts.is_empty()
  }

  /// Whether `prefix` is a leading run of this key's segments.
  ///
  /// The empty key is a prefix of every key.
  pub fn starts_with(&self, prefix: &QueryKey) -> bool {
    self.parts.starts_with(&prefix.parts)
  }
}

impl fmt::Display for QueryKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for (i, part) in self.parts.iter().enumerate() {
      if i > 0 {
        f.write_str(":")?;
      }
      write!(f, "{}", part)?;
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_display_joins_segments() {
    let key = QueryKey::new("assignment").with(5u64);
    assert_eq!(key.to_string(), "assignment:5");

    let key = QueryKey::new("users").with("pending");
    assert_eq!(key.to_string(), "users:pending");
  }

  #[test]
  fn test_prefix_matches_by_segment() {
    let key = QueryKey::new("assignment").with(5u64);

    assert!(key.starts_with(&QueryKey::new("assignment")));
    assert!(key.starts_with(&key.clone()));
    assert!(!key.starts_with(&QueryKey::new("assignment").with(50u64)));
    assert!(!key.starts_with(&QueryKey::new("assignment").with(5u64).with("x")));
  }

  #[test]
  fn test_plural_resource_is_not_a_prefix_match() {
    let list = QueryKey::new("assignments").with(9u64);
    assert!(!list.starts_with(&QueryKey::new("assignment")));
  }

  #[test]
  fn test_tag_and_id_segments_differ() {
    let by_id = QueryKey::new("course").with(9u64);
    let by_tag = QueryKey::new("course").with("9");
    assert_ne!(by_id, by_tag);
    assert!(!by_id.starts_with(&by_tag));
  }

  #[test]
  fn test_empty_prefix_matches_everything() {
    let key = QueryKey::new("notifications");
    assert!(key.starts_with(&QueryKey::default()));
  }
}
