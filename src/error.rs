use std::error::Error;
use std::fmt::{self, Display};

/// The five-level taxonomy from spec.md §7. `Lexical`/`Parse`/`Semantic`
/// errors are fatal before a dialogue starts; `Runtime` aborts only the
/// current turn; `External` wraps a failure inside a collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Lexical,
    Parse,
    Semantic,
    Runtime,
    External,
}

impl ErrorKind {
    fn label(self) -> &'static str {
        match self {
            ErrorKind::Lexical => "lexical error",
            ErrorKind::Parse => "parse error",
            ErrorKind::Semantic => "semantic error",
            ErrorKind::Runtime => "runtime error",
            ErrorKind::External => "external error",
        }
    }
}

/// One diagnostic, line-numbered per spec.md §7 ("all error messages
/// include a line number where the causing node was defined").
#[derive(Debug, Clone)]
pub struct ScriptError {
    pub kind: ErrorKind,
    pub message: String,
    pub line: usize,
}

impl ScriptError {
    pub fn new(kind: ErrorKind, line: usize, message: impl Into<String>) -> Self {
        ScriptError {
            kind,
            message: message.into(),
            line,
        }
    }

    pub fn lexical(line: usize, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Lexical, line, message)
    }

    pub fn parse(line: usize, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Parse, line, message)
    }

    pub fn semantic(line: usize, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Semantic, line, message)
    }

    pub fn runtime(line: usize, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Runtime, line, message)
    }

    pub fn external(line: usize, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::External, line, message)
    }

    /// Renders the diagnostic with up to three lines of surrounding source
    /// context and a `^` caret under the offending line, in the manner of
    /// the teacher's `CompileMessage::rich_format`.
    pub fn render(&self, source: &str) -> String {
        let header = format!("{}: {} (line {})", self.kind.label(), self.message, self.line);
        let lines: Vec<&str> = source.lines().collect();
        let Some(target) = self.line.checked_sub(1).and_then(|i| lines.get(i)) else {
            return header;
        };

        let start = self.line.saturating_sub(2);
        let end = (self.line + 1).min(lines.len());
        let width = end.to_string().len();
        let mut block = String::new();
        for (i, line) in lines[start..end].iter().enumerate() {
            let number = start + i + 1;
            block.push_str(&format!("\n {number:>width$} | {line}"));
            if number == self.line {
                block.push_str(&format!("\n {:width$} | {}", "", "^".repeat(target.len().max(1))));
            }
        }
        format!("{header}{block}")
    }
}

impl Display for ScriptError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: {} (line {})", self.kind.label(), self.message, self.line)
    }
}

impl Error for ScriptError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_kind_and_line() {
        let e = ScriptError::runtime(3, "undefined variable `x`");
        assert_eq!(e.to_string(), "runtime error: undefined variable `x` (line 3)");
    }

    #[test]
    fn render_shows_caret_under_offending_line() {
        let source = "state S initial {\n  say x\n}\n";
        let e = ScriptError::runtime(2, "undefined variable `x`");
        let rendered = e.render(source);
        assert!(rendered.contains("runtime error: undefined variable `x` (line 2)"));
        assert!(rendered.contains("  2 |   say x"));
        assert!(rendered.contains("^"));
    }

    #[test]
    fn render_falls_back_without_matching_line() {
        let e = ScriptError::parse(99, "unexpected token");
        assert_eq!(e.render("short\nfile\n"), "parse error: unexpected token (line 99)");
    }
}
