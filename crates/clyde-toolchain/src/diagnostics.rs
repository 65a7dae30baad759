//! GCC-compatible diagnostic parsing.
//!
//! The only stable surface assumed is the `file:line[:col]: severity:`
//! prefix shared by GCC and Clang. Anything that does not match (caret
//! lines, include traces, colored continuations) is ignored.

use clyde_core::{Diagnostic, Severity};
use regex::Regex;
use std::path::PathBuf;
use std::sync::LazyLock;

static DIAGNOSTIC_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<file>[^:\s][^:]*):(?P<line>\d+):(?:(?P<col>\d+):)?\s*(?P<sev>fatal error|error|warning|note):\s*(?P<msg>.*)$",
    )
    .unwrap()
});

static FLAG_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*\[(?P<flag>-W[A-Za-z0-9=_-]+)\]$").unwrap());

/// Parse compiler stderr into structured diagnostics, sorted by source
/// location (file, then line, then column).
#[must_use]
pub fn parse_diagnostics(stderr: &str) -> Vec<Diagnostic> {
    let mut diagnostics: Vec<Diagnostic> = stderr.lines().filter_map(parse_line).collect();
    diagnostics.sort_by(|a, b| a.location_key().cmp(&b.location_key()));
    diagnostics
}

fn parse_line(line: &str) -> Option<Diagnostic> {
    let captures = DIAGNOSTIC_LINE.captures(line)?;
    let severity = Severity::parse(captures.name("sev")?.as_str())?;
    let mut message = captures.name("msg")?.as_str().to_string();

    let flag = FLAG_SUFFIX.captures(&message).and_then(|flag_captures| {
        flag_captures
            .name("flag")
            .map(|m| m.as_str().to_string())
    });
    if flag.is_some() {
        message = FLAG_SUFFIX.replace(&message, "").into_owned();
    }

    Some(Diagnostic {
        severity,
        file: PathBuf::from(captures.name("file")?.as_str()),
        line: captures.name("line")?.as_str().parse().unwrap_or(0),
        column: captures
            .name("col")
            .and_then(|c| c.as_str().parse().ok())
            .unwrap_or(0),
        flag,
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_error_with_column() {
        let stderr = "src/main.c:3:5: error: expected ';' before 'return'\n    3 |     return 0\n      |     ^~~~~~\n";
        let diagnostics = parse_diagnostics(stderr);
        assert_eq!(diagnostics.len(), 1);
        let d = &diagnostics[0];
        assert_eq!(d.severity, Severity::Error);
        assert_eq!(d.file, PathBuf::from("src/main.c"));
        assert_eq!((d.line, d.column), (3, 5));
        assert_eq!(d.message, "expected ';' before 'return'");
        assert_eq!(d.flag, None);
    }

    #[test]
    fn extracts_warning_flag() {
        let stderr = "lib.c:10:9: warning: unused variable 'tmp' [-Wunused-variable]\n";
        let diagnostics = parse_diagnostics(stderr);
        assert_eq!(diagnostics[0].flag.as_deref(), Some("-Wunused-variable"));
        assert_eq!(diagnostics[0].message, "unused variable 'tmp'");
    }

    #[test]
    fn parses_fatal_error() {
        let stderr = "main.c:1:10: fatal error: missing.h: No such file or directory\n";
        let diagnostics = parse_diagnostics(stderr);
        assert_eq!(diagnostics[0].severity, Severity::Fatal);
    }

    #[test]
    fn handles_missing_column() {
        let stderr = "main.c:7: note: declared here\n";
        let diagnostics = parse_diagnostics(stderr);
        assert_eq!(diagnostics[0].severity, Severity::Note);
        assert_eq!((diagnostics[0].line, diagnostics[0].column), (7, 0));
    }

    #[test]
    fn sorts_by_source_location() {
        let stderr = "\
b.c:2:1: warning: second [-Wunused]
a.c:9:1: warning: third
a.c:4:2: error: first
";
        let files: Vec<_> = parse_diagnostics(stderr)
            .into_iter()
            .map(|d| (d.file, d.line))
            .collect();
        assert_eq!(
            files,
            vec![
                (PathBuf::from("a.c"), 4),
                (PathBuf::from("a.c"), 9),
                (PathBuf::from("b.c"), 2),
            ]
        );
    }

    #[test]
    fn ignores_non_diagnostic_lines() {
        let stderr = "In file included from main.c:1:\ncc1: all warnings being treated as errors\n";
        assert!(parse_diagnostics(stderr).is_empty());
    }
}
