//! Makefile-style dependency file parsing.
//!
//! The compiler writes `object.d` next to each object (`-MMD -MF`). The
//! file lists every header the translation unit actually included; the
//! executor uses it to compute accurate cache keys on subsequent builds.

use std::path::PathBuf;

/// Parse the prerequisites of a `.d` file.
///
/// Handles `\`-continued lines and `\ `-escaped spaces in paths. The first
/// prerequisite is conventionally the source file itself; callers filter it.
#[must_use]
pub fn parse_depfile(contents: &str) -> Vec<PathBuf> {
    let joined = contents.replace("\\\r\n", " ").replace("\\\n", " ");
    let mut deps = Vec::new();
    for rule in joined.lines() {
        let Some((_, prerequisites)) = rule.split_once(':') else {
            continue;
        };
        for token in split_escaped(prerequisites) {
            let path = PathBuf::from(token);
            if !deps.contains(&path) {
                deps.push(path);
            }
        }
    }
    deps
}

/// Split on whitespace, honoring `\ ` escapes inside tokens.
fn split_escaped(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' if chars.peek() == Some(&' ') => {
                current.push(' ');
                chars.next();
            }
            c if c.is_whitespace() => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn simple_rule() {
        let deps = parse_depfile("main.o: src/main.c include/api.h\n");
        assert_eq!(
            deps,
            vec![PathBuf::from("src/main.c"), PathBuf::from("include/api.h")]
        );
    }

    #[test]
    fn continued_lines() {
        let deps = parse_depfile("main.o: src/main.c \\\n  include/a.h \\\n  include/b.h\n");
        assert_eq!(
            deps,
            vec![
                PathBuf::from("src/main.c"),
                PathBuf::from("include/a.h"),
                PathBuf::from("include/b.h"),
            ]
        );
    }

    #[test]
    fn escaped_spaces_in_paths() {
        let deps = parse_depfile("main.o: src/main.c My\\ Headers/api.h\n");
        assert_eq!(
            deps,
            vec![PathBuf::from("src/main.c"), PathBuf::from("My Headers/api.h")]
        );
    }

    #[test]
    fn duplicate_prerequisites_dedup() {
        let deps = parse_depfile("a.o: x.c h.h\nb.o: h.h\n");
        assert_eq!(deps, vec![PathBuf::from("x.c"), PathBuf::from("h.h")]);
    }

    #[test]
    fn empty_input() {
        assert!(parse_depfile("").is_empty());
    }
}
