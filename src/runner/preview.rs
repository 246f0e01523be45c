use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::project::{Language, Project};

/// Composes the project's HTML, CSS and JS (first file of each language)
/// into a single self-contained document.
pub fn compose_document(project: &Project) -> String {
    let html = content_of(project, Language::Html);
    let css = content_of(project, Language::Css);
    let js = content_of(project, Language::Javascript);
    format!(
        "<!doctype html><html><head><style>{css}</style></head>\
         <body>{html}<script>{js}</script></body></html>"
    )
}

fn content_of(project: &Project, language: Language) -> &str {
    project
        .first_of(language)
        .map(|f| f.content.as_str())
        .unwrap_or("")
}

/// Isolated rendering surface for the composed document.
///
/// Consumed as a black box: any surface that executes the document in
/// isolation from the host (script- and storage-wise) suffices.
pub trait PreviewSurface: Send {
    fn render(&mut self, document: &str) -> Result<()>;
}

/// Surface that writes the document to a file for an external viewer.
pub struct FilePreview {
    path: PathBuf,
}

impl FilePreview {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PreviewSurface for FilePreview {
    fn render(&mut self, document: &str) -> Result<()> {
        fs::write(&self.path, document)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compose_inlines_style_and_script() {
        let project = Project::starter();
        let doc = compose_document(&project);
        assert!(doc.starts_with("<!doctype html>"));
        assert!(doc.contains("<style>body { font-family:"));
        assert!(doc.contains("<h1>Welcome to Vertex</h1>"));
        assert!(doc.contains("<script>const message ="));
        assert!(doc.ends_with("</script></body></html>"));
    }

    #[test]
    fn test_compose_uses_first_file_per_language() {
        let mut project = Project::starter();
        project.add_file("extra.css").unwrap();
        project
            .active_file_mut()
            .unwrap()
            .content = "h1 { display: none; }".to_string();

        let doc = compose_document(&project);
        assert!(doc.contains("color: #ff6b35"));
        assert!(!doc.contains("display: none"));
    }

    #[test]
    fn test_compose_with_missing_languages_leaves_slots_empty() {
        let mut project = Project::starter();
        project.files.retain(|f| f.language == Language::Python);
        project.restore_active_invariant();

        let doc = compose_document(&project);
        assert!(doc.contains("<style></style>"));
        assert!(doc.contains("<script></script>"));
    }

    #[test]
    fn test_file_preview_writes_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("preview.html");
        let mut preview = FilePreview::new(&path);
        preview.render("<!doctype html><html></html>").unwrap();
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "<!doctype html><html></html>"
        );
    }
}
