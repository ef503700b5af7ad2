//! Splitting of script text into single statements
//!
//! The SQL API executes one statement per request, so multi-statement
//! resources are cut on top-level `;`. Separators inside quoted text,
//! quoted identifiers and comments are ignored.

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mode {
    Code,
    SingleQuoted,
    DoubleQuoted,
    LineComment,
    BlockComment,
}

/// Split `script` into trimmed statements, dropping comment-only fragments
pub fn split_statements(script: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut has_code = false;
    let mut mode = Mode::Code;
    let mut chars = script.chars().peekable();

    while let Some(c) = chars.next() {
        match mode {
            Mode::Code => match c {
                ';' => {
                    flush(&mut statements, &mut current, has_code);
                    has_code = false;
                    continue;
                },
                '\'' => mode = Mode::SingleQuoted,
                '"' => mode = Mode::DoubleQuoted,
                '-' if chars.peek() == Some(&'-') => mode = Mode::LineComment,
                '/' if chars.peek() == Some(&'*') => mode = Mode::BlockComment,
                _ => {},
            },
            Mode::SingleQuoted => {
                if c == '\'' {
                    if chars.peek() == Some(&'\'') {
                        current.push(c);
                        if let Some(escaped) = chars.next() {
                            current.push(escaped);
                        }
                        continue;
                    }
                    mode = Mode::Code;
                } else if c == '\\' {
                    current.push(c);
                    if let Some(escaped) = chars.next() {
                        current.push(escaped);
                    }
                    continue;
                }
            },
            Mode::DoubleQuoted => {
                if c == '"' {
                    mode = Mode::Code;
                }
            },
            Mode::LineComment => {
                if c == '\n' {
                    mode = Mode::Code;
                }
            },
            Mode::BlockComment => {
                if c == '*' && chars.peek() == Some(&'/') {
                    current.push(c);
                    if let Some(slash) = chars.next() {
                        current.push(slash);
                    }
                    mode = Mode::Code;
                    continue;
                }
            },
        }

        if matches!(mode, Mode::Code | Mode::SingleQuoted | Mode::DoubleQuoted) && !c.is_whitespace() {
            has_code = true;
        }
        current.push(c);
    }

    flush(&mut statements, &mut current, has_code);
    statements
}

fn flush(statements: &mut Vec<String>, current: &mut String, has_code: bool) {
    let text = current.trim();
    if has_code && !text.is_empty() {
        statements.push(text.to_string());
    }
    current.clear();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_splits_on_top_level_separator() {
        let statements = split_statements("USE ROLE SYSADMIN;\nCREATE SCHEMA IF NOT EXISTS RAW;\n");
        assert_eq!(statements, vec!["USE ROLE SYSADMIN", "CREATE SCHEMA IF NOT EXISTS RAW"]);
    }

    #[test]
    fn test_ignores_separators_in_literals_and_comments() {
        let script = "SELECT 'a;b', \"odd;name\" FROM t; -- trailing; comment\nSELECT 'it''s; fine'; /* x; y */ SELECT 1";
        let statements = split_statements(script);
        assert_eq!(statements.len(), 3);
        assert_eq!(statements[0], "SELECT 'a;b', \"odd;name\" FROM t");
        assert!(statements[1].ends_with("SELECT 'it''s; fine'"));
        assert_eq!(statements[2], "/* x; y */ SELECT 1");
    }

    #[test]
    fn test_drops_comment_only_fragments() {
        let statements = split_statements("-- header only\n;\n  ;\n/* nothing */;SELECT 2;");
        assert_eq!(statements, vec!["SELECT 2"]);
    }

    #[test]
    fn test_last_statement_without_separator() {
        assert_eq!(split_statements("SELECT 1"), vec!["SELECT 1"]);
        assert!(split_statements("").is_empty());
    }
}
