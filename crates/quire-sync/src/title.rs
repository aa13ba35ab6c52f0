//! The editable title field of the open note.
//!
//! The field keeps its own draft while the user types and only follows the
//! note's stored title when not editing. A commit yields the title to rename
//! to; the stored title changes once the rename succeeds and arrives back as
//! an [`TitleEvent::External`] event.

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TitleEvent {
    /// The stored title changed (note switched, rename acknowledged).
    External(String),
    /// The user typed.
    Input(String),
    /// Enter or blur.
    Commit,
    /// Escape.
    Cancel,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TitleField {
    value: String,
    stored: String,
    editing: bool,
}

impl TitleField {
    pub fn new(stored: impl Into<String>) -> Self {
        let stored = stored.into();
        Self {
            value: stored.clone(),
            stored,
            editing: false,
        }
    }

    /// What the field shows.
    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn is_editing(&self) -> bool {
        self.editing
    }

    /// Feed an event. Returns the new title to rename to on a commit that
    /// changes it.
    pub fn reduce(&mut self, event: TitleEvent) -> Option<String> {
        match event {
            TitleEvent::External(title) => {
                if !self.editing {
                    self.value = title.clone();
                }
                self.stored = title;
                None
            }
            TitleEvent::Input(text) => {
                self.value = text;
                self.editing = true;
                None
            }
            TitleEvent::Commit => {
                self.editing = false;
                let trimmed = self.value.trim();
                if trimmed.is_empty() || trimmed == self.stored {
                    self.value = self.stored.clone();
                    return None;
                }
                self.value = trimmed.to_string();
                Some(self.value.clone())
            }
            TitleEvent::Cancel => {
                self.editing = false;
                self.value = self.stored.clone();
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commit_yields_trimmed_title() {
        let mut field = TitleField::new("Old");
        assert_eq!(field.reduce(TitleEvent::Input("  New  ".into())), None);
        assert!(field.is_editing());
        assert_eq!(field.reduce(TitleEvent::Commit), Some("New".to_string()));
        assert_eq!(field.value(), "New");
    }

    #[test]
    fn test_external_change_does_not_clobber_typing() {
        let mut field = TitleField::new("Old");
        field.reduce(TitleEvent::Input("Draft".into()));
        field.reduce(TitleEvent::External("Other".into()));
        assert_eq!(field.value(), "Draft");
        field.reduce(TitleEvent::Cancel);
        assert_eq!(field.value(), "Other");
    }

    #[test]
    fn test_empty_or_unchanged_commit_reverts() {
        let mut field = TitleField::new("Same");
        field.reduce(TitleEvent::Input("   ".into()));
        assert_eq!(field.reduce(TitleEvent::Commit), None);
        assert_eq!(field.value(), "Same");
        field.reduce(TitleEvent::Input("Same ".into()));
        assert_eq!(field.reduce(TitleEvent::Commit), None);
    }

    #[test]
    fn test_follows_external_when_idle() {
        let mut field = TitleField::new("A");
        field.reduce(TitleEvent::External("B".into()));
        assert_eq!(field.value(), "B");
    }
}
