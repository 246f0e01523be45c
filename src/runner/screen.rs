use regex::Regex;

/// Identifiers that reject a run before it reaches the interpreter:
/// filesystem, process, network, and dynamic-execution access.
///
/// This is a heuristic fast-path for obviously-hostile code, not a
/// security boundary — the isolation boundary is the sandbox worker
/// and its interpreter process.
const DENYLIST: [&str; 22] = [
    "os",
    "sys",
    "subprocess",
    "socket",
    "shutil",
    "pathlib",
    "requests",
    "psutil",
    "urllib",
    "http",
    "ftplib",
    "smtplib",
    "telnetlib",
    "webbrowser",
    "importlib",
    "__import__",
    "eval",
    "exec",
    "open",
    "input",
    "raw_input",
    "file",
];

/// Shown to every role on a denylist match.
pub const REJECTION_MESSAGE: &str = "Unsafe import detected.";

/// Static pre-execution validator: scans source for denylisted tokens
/// as whole words, case-insensitively.
pub struct SourceScreen {
    pattern: Regex,
}

impl SourceScreen {
    pub fn new() -> Self {
        let pattern = Regex::new(&format!(r"(?i)\b(?:{})\b", DENYLIST.join("|")))
            .expect("static denylist pattern is valid");
        Self { pattern }
    }

    /// Returns the first denylisted token found in the source, if any.
    pub fn find_violation(&self, source: &str) -> Option<String> {
        self.pattern
            .find(source)
            .map(|m| m.as_str().to_lowercase())
    }
}

impl Default for SourceScreen {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_import_is_rejected() {
        let screen = SourceScreen::new();
        assert_eq!(screen.find_violation("import os"), Some("os".to_string()));
        assert_eq!(
            screen.find_violation("import subprocess\nprint('x')"),
            Some("subprocess".to_string())
        );
    }

    #[test]
    fn test_matching_is_case_insensitive() {
        let screen = SourceScreen::new();
        assert_eq!(screen.find_violation("Import OS"), Some("os".to_string()));
        assert_eq!(screen.find_violation("EVAL('1')"), Some("eval".to_string()));
    }

    #[test]
    fn test_whole_word_only() {
        let screen = SourceScreen::new();
        // "os" inside a longer identifier is fine
        assert_eq!(screen.find_violation("print('osmosis')"), None);
        assert_eq!(screen.find_violation("cost = 3"), None);
        assert_eq!(screen.find_violation("my_open_thing = 1"), None);
    }

    #[test]
    fn test_dunder_import_is_caught() {
        let screen = SourceScreen::new();
        assert_eq!(
            screen.find_violation("__import__('os')"),
            Some("__import__".to_string())
        );
    }

    #[test]
    fn test_builtins_are_caught() {
        let screen = SourceScreen::new();
        assert!(screen.find_violation("open('/etc/passwd')").is_some());
        assert!(screen.find_violation("exec(code)").is_some());
        assert!(screen.find_violation("x = input()").is_some());
    }

    #[test]
    fn test_benign_source_passes() {
        let screen = SourceScreen::new();
        assert_eq!(screen.find_violation("print('hi')"), None);
        assert_eq!(
            screen.find_violation("for i in range(3):\n    print(i)"),
            None
        );
        assert_eq!(screen.find_violation(""), None);
    }

    #[test]
    fn test_token_in_a_comment_still_rejects() {
        // The scan is deliberately shallow: it does not parse Python,
        // so even a commented-out token rejects the run.
        let screen = SourceScreen::new();
        assert!(screen.find_violation("# import os\nprint('hi')").is_some());
    }
}
