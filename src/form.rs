//! Editable form state bound to one loaded entity at a time.

use std::fmt::Debug;
use std::path::{Path, PathBuf};
use tracing::debug;

/// An entity a form can be derived from.
pub trait FormSource {
  type Id: Clone + PartialEq + Debug;
  type Fields: Clone + PartialEq;

  fn form_id(&self) -> Self::Id;

  /// Editable values as the server currently has them.
  fn form_fields(&self) -> Self::Fields;
}

/// Form state owned by a view that outlives the entity it shows.
///
/// Binding an entity with a different id resets everything: fields, edit
/// mode and selected attachments. Re-binding the same id only refreshes the
/// server values, and the visible fields too when not editing.
pub struct EntityForm<S: FormSource> {
  bound: Option<S::Id>,
  server: Option<S::Fields>,
  fields: Option<S::Fields>,
  editing: bool,
  attachments: Vec<PathBuf>,
}

impl<S: FormSource> EntityForm<S> {
  pub fn new() -> Self {
    Self {
      bound: None,
      server: None,
      fields: None,
      editing: false,
      attachments: Vec::new(),
    }
  }

  /// Observe the loaded entity. Returns `true` when its identity changed and
  /// the form was reset.
  pub fn bind(&mut self, entity: &S) -> bool {
    let id = entity.form_id();
    let server = entity.form_fields();

    if self.bound.as_ref() != Some(&id) {
      debug!(from = ?self.bound, to = ?id, "form bound to new entity, resetting");
      self.bound = Some(id);
      self.fields = Some(server.clone());
      self.server = Some(server);
      self.editing = false;
      self.attachments.clear();
      return true;
    }

    if !self.editing {
      self.fields = Some(server.clone());
    }
    self.server = Some(server);
    false
  }

  /// Drop the binding entirely, e.g. when the entity failed to load.
  pub fn unbind(&mut self) {
    self.bound = None;
    self.server = None;
    self.fields = None;
    self.editing = false;
    self.attachments.clear();
  }

  pub fn bound_id(&self) -> Option<&S::Id> {
    self.bound.as_ref()
  }

  pub fn is_editing(&self) -> bool {
    self.editing
  }

  /// Enter edit mode. Ignored until an entity is bound.
  pub fn begin_edit(&mut self) {
    if self.bound.is_some() {
      self.editing = true;
    }
  }

  /// Leave edit mode without saving: fields go back to the last fetched
  /// server values and attachments are dropped.
  pub fn discard(&mut self) {
    self.fields = self.server.clone();
    self.editing = false;
    self.attachments.clear();
  }

  /// Leave edit mode after a successful save. The fields stay as typed until
  /// the refetched entity is bound.
  pub fn finish_edit(&mut self) {
    self.editing = false;
    self.attachments.clear();
  }

  pub fn fields(&self) -> Option<&S::Fields> {
    self.fields.as_ref()
  }

  pub fn fields_mut(&mut self) -> Option<&mut S::Fields> {
    self.fields.as_mut()
  }

  pub fn server_fields(&self) -> Option<&S::Fields> {
    self.server.as_ref()
  }

  pub fn is_dirty(&self) -> bool {
    self.fields != self.server
  }

  pub fn attach(&mut self, path: impl Into<PathBuf>) {
    let path = path.into();
    if !self.attachments.contains(&path) {
      self.attachments.push(path);
    }
  }

  pub fn detach(&mut self, path: &Path) {
    self.attachments.retain(|p| p != path);
  }

  pub fn attachments(&self) -> &[PathBuf] {
    &self.attachments
  }

  /// Forget selected files, e.g. once they were uploaded.
  pub fn clear_attachments(&mut self) {
    self.attachments.clear();
  }
}

impl<S: FormSource> Default for EntityForm<S> {
  fn default() -> Self {
    Self::new()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[derive(Debug, Clone)]
  struct Doc {
    id: u64,
    title: String,
  }

  impl FormSource for Doc {
    type Id = u64;
    type Fields = String;

    fn form_id(&self) -> u64 {
      self.id
    }

    fn form_fields(&self) -> String {
      self.title.clone()
    }
  }

  fn doc(id: u64, title: &str) -> Doc {
    Doc {
      id,
      title: title.to_string(),
    }
  }

  fn type_into(form: &mut EntityForm<Doc>, text: &str) {
    form.fields_mut().unwrap().push_str(text);
  }

  #[test]
  fn test_identity_change_discards_unsaved_edits() {
    let mut form = EntityForm::new();
    assert!(form.bind(&doc(1, "Essay")));

    form.begin_edit();
    type_into(&mut form, " draft");
    form.attach("/tmp/essay.pdf");
    assert!(form.is_dirty());

    assert!(form.bind(&doc(2, "Lab report")));

    assert_eq!(form.fields().map(String::as_str), Some("Lab report"));
    assert!(!form.is_editing());
    assert!(!form.is_dirty());
    assert!(form.attachments().is_empty());
    assert_eq!(form.bound_id(), Some(&2));
  }

  #[test]
  fn test_discard_restores_server_values() {
    let mut form = EntityForm::new();
    form.bind(&doc(1, "Essay"));
    form.begin_edit();
    type_into(&mut form, "!!!");
    form.attach("notes.txt");

    form.discard();

    assert_eq!(form.fields().map(String::as_str), Some("Essay"));
    assert!(!form.is_editing());
    assert!(form.attachments().is_empty());
  }

  #[test]
  fn test_refetch_of_same_entity_keeps_edits() {
    let mut form = EntityForm::new();
    form.bind(&doc(1, "Essay"));
    form.begin_edit();
    type_into(&mut form, " v2");

    assert!(!form.bind(&doc(1, "Essay (renamed)")));

    assert!(form.is_editing());
    assert_eq!(form.fields().map(String::as_str), Some("Essay v2"));

    // Discard now goes back to the refreshed server value
    form.discard();
    assert_eq!(form.fields().map(String::as_str), Some("Essay (renamed)"));
  }

  #[test]
  fn test_refetch_while_viewing_updates_fields() {
    let mut form = EntityForm::new();
    form.bind(&doc(1, "Essay"));
    form.bind(&doc(1, "Essay (graded)"));
    assert_eq!(form.fields().map(String::as_str), Some("Essay (graded)"));
  }

  #[test]
  fn test_begin_edit_requires_bound_entity() {
    let mut form: EntityForm<Doc> = EntityForm::new();
    form.begin_edit();
    assert!(!form.is_editing());
    assert!(form.fields().is_none());
  }

  #[test]
  fn test_attachments_are_deduplicated() {
    let mut form = EntityForm::new();
    form.bind(&doc(1, "Essay"));
    form.attach("a.pdf");
    form.attach("a.pdf");
    form.attach("b.pdf");
    form.detach(Path::new("a.pdf"));
    assert_eq!(form.attachments(), &[PathBuf::from("b.pdf")]);
  }

  #[test]
  fn test_finish_edit_then_rebind_shows_saved_values() {
    let mut form = EntityForm::new();
    form.bind(&doc(1, "Essay"));
    form.begin_edit();
    type_into(&mut form, " final");
    form.finish_edit();

    form.bind(&doc(1, "Essay final"));
    assert!(!form.is_dirty());
  }
}
