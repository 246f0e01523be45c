use crate::project::{Language, Project};

/// External code-editing widget boundary.
///
/// The playground consumes a widget, it does not implement one: anything
/// that can get/set buffer text, switch language mode, and toggle
/// read-only chrome will do.
pub trait EditorWidget {
    fn buffer(&self) -> &str;
    fn set_buffer(&mut self, text: &str);
    fn set_language(&mut self, language: Language);
    fn set_read_only(&mut self, read_only: bool);
}

/// Minimal in-memory widget used by the CLI session and tests.
#[derive(Debug, Default)]
pub struct PlainBuffer {
    text: String,
    language: Option<Language>,
    read_only: bool,
}

impl PlainBuffer {
    pub fn language(&self) -> Option<Language> {
        self.language
    }

    pub fn read_only(&self) -> bool {
        self.read_only
    }
}

impl EditorWidget for PlainBuffer {
    fn buffer(&self) -> &str {
        &self.text
    }

    fn set_buffer(&mut self, text: &str) {
        self.text = text.to_string();
    }

    fn set_language(&mut self, language: Language) {
        self.language = Some(language);
    }

    fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
    }
}

/// Outcome of an edit attempt on the active buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOutcome {
    /// The edit was written into the active file's content.
    Accepted,
    /// The project is submitted; the buffer was reset to stored content.
    Rejected,
}

/// Keeps the widget buffer synchronized with the project's active file.
pub struct EditorSurface<W: EditorWidget> {
    widget: W,
}

impl<W: EditorWidget> EditorSurface<W> {
    pub fn new(widget: W) -> Self {
        Self { widget }
    }

    pub fn widget(&self) -> &W {
        &self.widget
    }

    /// Loads the project's active file into the widget: content, language
    /// mode, and read-only chrome when the project is submitted.
    pub fn open_active(&mut self, project: &Project) {
        if let Some(file) = project.active_file() {
            self.widget.set_buffer(&file.content);
            self.widget.set_language(file.language);
        }
        self.widget.set_read_only(project.submitted);
    }

    /// Applies an edit to the active file.
    ///
    /// Accepted edits write through to the file's content immediately
    /// (persistence is the caller's debounce). Post-submit edits are
    /// rejected by resetting the buffer to the file's stored content —
    /// an explicit reassertion of immutability, covering the case where
    /// disabling input failed or a stray event fired.
    pub fn apply_edit(&mut self, project: &mut Project, new_text: &str) -> EditOutcome {
        if project.submitted {
            let stored = project
                .active_file()
                .map(|f| f.content.clone())
                .unwrap_or_default();
            self.widget.set_buffer(&stored);
            return EditOutcome::Rejected;
        }
        if let Some(file) = project.active_file_mut() {
            file.content = new_text.to_string();
        }
        self.widget.set_buffer(new_text);
        EditOutcome::Accepted
    }
}
