// Copyright 2025 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Line tokenizer for section/keyword text files.
//!
//! Every input line becomes exactly one [`Line`], so line numbers in
//! diagnostics always match the file.  The tokenizer knows nothing
//! about which sections or keys are valid; it only recognizes the
//! shape of a line:
//!
//! - `[Name]` is a section header
//! - `key = value # comment` is a property
//! - a line starting with a comment marker is a comment
//! - anything else without an `=` is a data row (tabular forcing data)
//!
//! Dialect differences (which characters start comments, whether a
//! trailing `\` continues a value) live in [`TokenizerOptions`].

use crate::common::Result;
use crate::format_err;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LineKind {
    SectionHeader(String),
    Property {
        key: String,
        value: String,
        comment: Option<String>,
    },
    /// Value text of a line following a property whose value ended
    /// with `\`.
    Continuation(String),
    Comment(String),
    Blank,
    DataRow(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Line {
    pub number: usize,
    pub kind: LineKind,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TokenizerOptions {
    /// Markers that turn a whole line into a comment when they are the
    /// first non-whitespace character.
    pub line_comment_markers: &'static [char],
    /// Markers that start a trailing comment after a value.
    pub trailing_comment_markers: &'static [char],
    /// Whether a value ending in `\` continues on the next line.
    pub continuation: bool,
}

impl TokenizerOptions {
    /// Boundary-condition, bnd-ext and morphology files.
    pub const INI: TokenizerOptions = TokenizerOptions {
        line_comment_markers: &['#'],
        trailing_comment_markers: &['#'],
        continuation: false,
    };

    /// Model definition files.
    pub const MDU: TokenizerOptions = TokenizerOptions {
        line_comment_markers: &['#', '*'],
        trailing_comment_markers: &['#'],
        continuation: true,
    };

    /// Old-style external forcing files.
    pub const EXT_FORCE: TokenizerOptions = TokenizerOptions {
        line_comment_markers: &['*', '!', '#'],
        trailing_comment_markers: &['#', '!'],
        continuation: false,
    };
}

impl Default for TokenizerOptions {
    fn default() -> Self {
        TokenizerOptions::INI
    }
}

pub fn tokenize(text: &str, opts: &TokenizerOptions) -> Result<Vec<Line>> {
    let mut lines = Vec::new();
    let mut continuing = false;

    for (i, raw) in split_lines(text).enumerate() {
        let number = i + 1;
        let trimmed = raw.trim();

        if continuing {
            if trimmed.is_empty() {
                continuing = false;
                lines.push(Line {
                    number,
                    kind: LineKind::Blank,
                });
                continue;
            }
            let (value, _) = split_trailing_comment(trimmed, opts.trailing_comment_markers);
            let (value, more) = strip_continuation(&value);
            continuing = more;
            lines.push(Line {
                number,
                kind: LineKind::Continuation(value),
            });
            continue;
        }

        let kind = if trimmed.is_empty() {
            LineKind::Blank
        } else if trimmed.starts_with(opts.line_comment_markers) {
            LineKind::Comment(trimmed[1..].to_owned())
        } else if trimmed.starts_with('[') {
            let (header, _) = split_trailing_comment(trimmed, opts.trailing_comment_markers);
            if !header.ends_with(']') {
                return format_err!(BadHeader, number, format!("malformed section header {trimmed}"));
            }
            let name = header[1..header.len() - 1].trim().to_owned();
            LineKind::SectionHeader(name)
        } else if let Some(eq) = find_unescaped(trimmed, &['='], true) {
            let key = unescape(trimmed[..eq].trim());
            if key.is_empty() {
                return format_err!(
                    EmptyPropertyKey,
                    number,
                    "property key cannot be empty".to_owned()
                );
            }
            let rest = trimmed[eq + 1..].trim();
            let (value, comment) = split_trailing_comment(rest, opts.trailing_comment_markers);
            let value = if opts.continuation {
                let (value, more) = strip_continuation(&value);
                continuing = more;
                value
            } else {
                value
            };
            LineKind::Property {
                key,
                value,
                comment,
            }
        } else {
            LineKind::DataRow(trimmed.to_owned())
        };

        lines.push(Line { number, kind });
    }

    Ok(lines)
}

/// Find the first occurrence of any of `targets` that is not escaped
/// with a backslash and, if `respect_quotes`, not inside `"..."`.
pub(crate) fn find_unescaped(text: &str, targets: &[char], respect_quotes: bool) -> Option<usize> {
    let mut in_quotes = false;
    let mut escaped = false;
    for (i, c) in text.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        if c == '\\' {
            escaped = true;
            continue;
        }
        if c == '"' && respect_quotes {
            in_quotes = !in_quotes;
            continue;
        }
        if !in_quotes && targets.contains(&c) {
            return Some(i);
        }
    }
    None
}

fn split_trailing_comment(text: &str, markers: &[char]) -> (String, Option<String>) {
    match find_unescaped(text, markers, true) {
        Some(pos) => {
            let value = unescape(text[..pos].trim());
            let comment = text[pos + 1..].trim();
            let comment = if comment.is_empty() {
                None
            } else {
                Some(comment.to_owned())
            };
            (value, comment)
        }
        None => (unescape(text), None),
    }
}

fn strip_continuation(value: &str) -> (String, bool) {
    match value.strip_suffix('\\') {
        Some(rest) => (rest.trim_end().to_owned(), true),
        None => (value.to_owned(), false),
    }
}

/// Remove the backslash from `\=`, `\#` and `\!`, leaving every other
/// backslash alone (paths on Windows use them).
fn unescape(text: &str) -> String {
    if !text.contains('\\') {
        return text.to_owned();
    }
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(&next) = chars.peek() {
                if next == '=' || next == '#' || next == '!' {
                    out.push(next);
                    chars.next();
                    continue;
                }
            }
        }
        out.push(c);
    }
    out
}

/// Split on LF, CRLF or a lone CR.  A trailing line ending does not
/// produce an extra empty line.
pub fn split_lines(s: &str) -> impl Iterator<Item = &str> {
    let mut remaining = s;
    std::iter::from_fn(move || {
        if remaining.is_empty() {
            return None;
        }
        let end = remaining.find(['\n', '\r']).unwrap_or(remaining.len());
        let line = &remaining[..end];

        remaining = &remaining[end..];
        if remaining.starts_with("\r\n") {
            remaining = &remaining[2..];
        } else if remaining.starts_with('\n') || remaining.starts_with('\r') {
            remaining = &remaining[1..];
        }

        Some(line)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::ErrorCode;

    fn kinds(text: &str) -> Vec<LineKind> {
        tokenize(text, &TokenizerOptions::INI)
            .unwrap()
            .into_iter()
            .map(|l| l.kind)
            .collect()
    }

    fn prop(key: &str, value: &str, comment: Option<&str>) -> LineKind {
        LineKind::Property {
            key: key.to_owned(),
            value: value.to_owned(),
            comment: comment.map(|c| c.to_owned()),
        }
    }

    #[test]
    fn test_section_header() {
        assert_eq!(
            vec![LineKind::SectionHeader("General".to_owned())],
            kinds("  [General]  ")
        );
        assert_eq!(
            vec![LineKind::SectionHeader("forcing".to_owned())],
            kinds("[forcing] # first block")
        );
    }

    #[test]
    fn test_malformed_header() {
        let err = tokenize("\n[General", &TokenizerOptions::INI).unwrap_err();
        assert_eq!(ErrorCode::BadHeader, err.code);
        assert_eq!(Some(2), err.line());
    }

    #[test]
    fn test_property_with_comment() {
        assert_eq!(
            vec![prop("Kmx", "0", Some("Max nr of vertical layers"))],
            kinds("Kmx = 0 # Max nr of vertical layers")
        );
    }

    #[test]
    fn test_property_splits_on_first_equals() {
        assert_eq!(vec![prop("a", "b = c", None)], kinds("a = b = c"));
    }

    #[test]
    fn test_property_without_value() {
        assert_eq!(vec![prop("NetFile", "", None)], kinds("NetFile ="));
    }

    #[test]
    fn test_quoted_value_keeps_hash() {
        assert_eq!(
            vec![prop("name", "\"a # b\"", Some("c"))],
            kinds("name = \"a # b\" # c")
        );
    }

    #[test]
    fn test_escaped_markers() {
        assert_eq!(vec![prop("k=1", "a#b", None)], kinds("k\\=1 = a\\#b"));
    }

    #[test]
    fn test_backslash_path_untouched() {
        assert_eq!(
            vec![prop("NetFile", "grids\\net.nc", None)],
            kinds("NetFile = grids\\net.nc")
        );
    }

    #[test]
    fn test_empty_key() {
        let err = tokenize("a = 1\n = value", &TokenizerOptions::INI).unwrap_err();
        assert_eq!(ErrorCode::EmptyPropertyKey, err.code);
        assert_eq!(Some(2), err.line());
    }

    #[test]
    fn test_data_rows() {
        assert_eq!(
            vec![
                LineKind::DataRow("0 1.5".to_owned()),
                LineKind::DataRow("60\t2.5".to_owned())
            ],
            kinds("0 1.5\n 60\t2.5 ")
        );
    }

    #[test]
    fn test_comments_and_blanks() {
        assert_eq!(
            vec![
                LineKind::Comment(" header".to_owned()),
                LineKind::Blank,
                prop("a", "1", None)
            ],
            kinds("# header\n\na = 1\n")
        );
    }

    #[test]
    fn test_ext_force_markers() {
        let lines = tokenize(
            "* comment\n! other\nQUANTITY=windx ! inline\n",
            &TokenizerOptions::EXT_FORCE,
        )
        .unwrap();
        assert_eq!(LineKind::Comment(" comment".to_owned()), lines[0].kind);
        assert_eq!(LineKind::Comment(" other".to_owned()), lines[1].kind);
        assert_eq!(prop("QUANTITY", "windx", Some("inline")), lines[2].kind);
    }

    #[test]
    fn test_continuation() {
        let lines = tokenize(
            "ObsFile = a.xyn \\\n          b.xyn \\\n   c.xyn # three\nNext = 1",
            &TokenizerOptions::MDU,
        )
        .unwrap();
        assert_eq!(prop("ObsFile", "a.xyn", None), lines[0].kind);
        assert_eq!(LineKind::Continuation("b.xyn".to_owned()), lines[1].kind);
        assert_eq!(LineKind::Continuation("c.xyn".to_owned()), lines[2].kind);
        assert_eq!(prop("Next", "1", None), lines[3].kind);
    }

    #[test]
    fn test_continuation_disabled_in_ini() {
        assert_eq!(vec![prop("a", "b \\", None)], kinds("a = b \\"));
    }

    #[test]
    fn test_line_numbers() {
        let lines = tokenize("[General]\r\nfileVersion = 1.01\r\n\r\n[forcing]", &TokenizerOptions::INI).unwrap();
        let numbers: Vec<usize> = lines.iter().map(|l| l.number).collect();
        assert_eq!(vec![1, 2, 3, 4], numbers);
    }

    #[test]
    fn test_split_lines_mixed_endings() {
        let lines: Vec<&str> = split_lines("a\nb\r\nc\rd").collect();
        assert_eq!(vec!["a", "b", "c", "d"], lines);

        let lines: Vec<&str> = split_lines("a\n").collect();
        assert_eq!(vec!["a"], lines);

        let lines: Vec<&str> = split_lines("").collect();
        assert!(lines.is_empty());
    }
}
