pub mod store;

use std::fmt;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Syntax/run mode of a project file. Determines the editor language
/// mode and which execution channel a Run is routed to.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Html,
    Css,
    Javascript,
    Python,
}

impl Language {
    /// Infers the language from a file name extension.
    /// Anything that isn't .py / .css / .html is treated as JavaScript.
    pub fn from_file_name(name: &str) -> Self {
        let lower = name.to_lowercase();
        if lower.ends_with(".py") {
            Language::Python
        } else if lower.ends_with(".css") {
            Language::Css
        } else if lower.ends_with(".html") {
            Language::Html
        } else {
            Language::Javascript
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Html => "html",
            Language::Css => "css",
            Language::Javascript => "javascript",
            Language::Python => "python",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One source file in a project.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ProjectFile {
    /// Stable within an editor session; regenerated when starter files
    /// are instantiated.
    pub id: Uuid,
    pub name: String,
    pub language: Language,
    pub content: String,
}

impl ProjectFile {
    pub fn new(name: impl Into<String>, language: Language, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            language,
            content: content.into(),
        }
    }
}

/// A named, user-owned collection of source files edited together.
///
/// Invariant: `active_file_id` always references a file in `files`
/// (loading restores it to the first file when the stored id is stale).
/// Once `submitted` is true the project is read-only.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    /// Creation/display order.
    pub files: Vec<ProjectFile>,
    pub active_file_id: Uuid,
    #[serde(default)]
    pub submitted: bool,
    /// Epoch milliseconds of the last successful save.
    #[serde(default)]
    pub last_edited: i64,
}

impl Project {
    /// A fresh project with the four starter files and fresh ids.
    pub fn starter() -> Self {
        let files = starter_files();
        let active_file_id = files[0].id;
        Self {
            files,
            active_file_id,
            submitted: false,
            last_edited: 0,
        }
    }

    pub fn active_file(&self) -> Option<&ProjectFile> {
        self.files.iter().find(|f| f.id == self.active_file_id)
    }

    pub fn active_file_mut(&mut self) -> Option<&mut ProjectFile> {
        let id = self.active_file_id;
        self.files.iter_mut().find(|f| f.id == id)
    }

    pub fn file_by_name(&self, name: &str) -> Option<&ProjectFile> {
        self.files.iter().find(|f| f.name == name)
    }

    /// First file of the given language, in display order.
    pub fn first_of(&self, language: Language) -> Option<&ProjectFile> {
        self.files.iter().find(|f| f.language == language)
    }

    /// Makes the file with the given id active. Fails if the id does not
    /// reference a file in this project.
    pub fn set_active(&mut self, id: Uuid) -> Result<()> {
        if self.files.iter().any(|f| f.id == id) {
            self.active_file_id = id;
            Ok(())
        } else {
            Err(anyhow!("no file with id {id} in project"))
        }
    }

    /// Appends a new empty file (language inferred from the name) and
    /// makes it active. Rejected while submitted.
    pub fn add_file(&mut self, name: &str) -> Result<Uuid> {
        if self.submitted {
            return Err(anyhow!("project is submitted (read-only)"));
        }
        let file = ProjectFile::new(name, Language::from_file_name(name), "");
        let id = file.id;
        self.files.push(file);
        self.active_file_id = id;
        Ok(id)
    }

    /// Re-establishes the active-file invariant after deserialization:
    /// a stale stored id falls back to the first file.
    pub fn restore_active_invariant(&mut self) {
        if self.files.is_empty() {
            *self = Project::starter();
            return;
        }
        if !self.files.iter().any(|f| f.id == self.active_file_id) {
            self.active_file_id = self.files[0].id;
        }
    }
}

/// The four default files a new project starts with.
fn starter_files() -> Vec<ProjectFile> {
    vec![
        ProjectFile::new(
            "index.html",
            Language::Html,
            "<!doctype html>\n\
             <html>\n\
             \x20 <head>\n\
             \x20   <title>Vertex</title>\n\
             \x20 </head>\n\
             \x20 <body>\n\
             \x20   <main>\n\
             \x20     <h1>Welcome to Vertex</h1>\n\
             \x20     <p>Edit the files, run them, and view the preview.</p>\n\
             \x20     <div id=\"app\"></div>\n\
             \x20   </main>\n\
             \x20 </body>\n\
             </html>",
        ),
        ProjectFile::new(
            "style.css",
            Language::Css,
            "body { font-family: system-ui, sans-serif; padding: 24px; }\n\
             h1 { color: #ff6b35; }\n\
             p { color: #444; }",
        ),
        ProjectFile::new(
            "script.js",
            Language::Javascript,
            "const message = 'Hello from Vertex!';\n\
             document.querySelector('#app').textContent = message;",
        ),
        ProjectFile::new(
            "main.py",
            Language::Python,
            "# Python execution happens in a sandboxed environment.\n\
             print(\"Welcome to Vertex!\")\n\
             for i in range(3):\n\
             \x20   print(\"Line\", i + 1)",
        ),
    ]
}
