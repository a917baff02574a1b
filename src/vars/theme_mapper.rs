//! Theme configuration mapping
//!
//! Derives utility class names from a build-tool theme configuration
//! (`tailwind.config.js` and friends) and links each class to the custom property it
//! resolves to:
//!
//! ```js
//! module.exports = {
//!   theme: {
//!     extend: {
//!       backgroundColor: { primary: 'var(--brand-primary)' }, // bg-primary -> --brand-primary
//!       spacing: { '4': 'var(--spacing-4)' },                  // 4 -> --spacing-4
//!     },
//!   },
//! };
//! ```
//!
//! The scan is structural, not an evaluator. It balances braces, skips quoted strings
//! and comments, and understands `key: value` entries. Computed keys, spreads, function
//! values and anything produced at runtime are skipped silently. Only sections listed in
//! [`class_prefix`] produce mappings.

use regex::Regex;
use std::sync::OnceLock;

use crate::vars::definition::ClassMapping;

/// Key name of the theme object
pub const THEME_KEY: &str = "theme";
/// Key inside the theme object whose sections extend the defaults
pub const EXTEND_KEY: &str = "extend";
/// Key that names the parent entry itself inside a nested colour object
pub const DEFAULT_KEY: &str = "DEFAULT";

fn variable_reference_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"var\(\s*(--[\w-]+)").expect("variable reference pattern is valid"))
}

/// Class prefix for a theme section, `None` when the section does not produce classes
pub fn class_prefix(section: &str) -> Option<&'static str> {
    let prefix = match section {
        "fontSize" => "text",
        "spacing" => "",
        "colors" => "",
        "backgroundColor" => "bg",
        "textColor" => "text",
        "borderColor" => "border",
        "margin" => "m",
        "padding" => "p",
        "width" => "w",
        "height" => "h",
        "maxWidth" => "max-w",
        "maxHeight" => "max-h",
        "minWidth" => "min-w",
        "minHeight" => "min-h",
        _ => return None,
    };
    Some(prefix)
}

/// Extract class mappings from a theme configuration file.
///
/// Returns an empty list when no theme object can be located. Within one source a
/// class name maps to at most one variable; a later entry for the same class replaces
/// the earlier one.
pub fn extract_theme_mappings(text: &str, source: &str) -> Vec<ClassMapping> {
    let Some(theme_body) = theme_object_body(text) else {
        log::debug!("No theme object found in {}", source);
        return Vec::new();
    };

    let mut mappings = Vec::new();
    for entry in object_entries(theme_body) {
        let ThemeValue::Object(body) = entry.value else {
            continue;
        };
        if entry.key == EXTEND_KEY {
            for section in object_entries(body) {
                if let ThemeValue::Object(section_body) = section.value {
                    collect_section(section.key, section_body, source, &mut mappings);
                }
            }
        } else {
            collect_section(entry.key, body, source, &mut mappings);
        }
    }

    mappings
}

/// Body of the first object bound to the theme key, braces excluded
pub fn theme_object_body(text: &str) -> Option<&str> {
    let open = theme_key_brace(text.as_bytes())?;
    let close = matching_brace(text.as_bytes(), open)?;
    Some(&text[open + 1..close])
}

/// Position of the opening brace of the first `theme: {` outside comments and strings
fn theme_key_brace(bytes: &[u8]) -> Option<usize> {
    let key = THEME_KEY.as_bytes();
    let mut pos = 0;
    while pos < bytes.len() {
        let key_end = match bytes[pos] {
            b'\'' | b'"' | b'`' => {
                let end = skip_string(bytes, pos);
                let quoted = bytes.get(pos + 1..end.saturating_sub(1));
                pos = end;
                if quoted != Some(key) {
                    continue;
                }
                end
            }
            b'/' => match skip_comment(bytes, pos) {
                Some(end) => {
                    pos = end;
                    continue;
                }
                None => {
                    pos += 1;
                    continue;
                }
            },
            _ if bytes[pos..].starts_with(key)
                && (pos == 0 || !is_identifier_byte(bytes[pos - 1]))
                && !bytes.get(pos + key.len()).is_some_and(|&b| is_identifier_byte(b)) =>
            {
                pos += key.len();
                pos
            }
            _ => {
                pos += 1;
                continue;
            }
        };

        let colon = skip_whitespace(bytes, key_end);
        if bytes.get(colon) != Some(&b':') {
            continue;
        }
        let open = skip_whitespace(bytes, colon + 1);
        if bytes.get(open) == Some(&b'{') {
            return Some(open);
        }
    }
    None
}

fn is_identifier_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$'
}

fn collect_section(section: &str, body: &str, source: &str, out: &mut Vec<ClassMapping>) {
    let Some(prefix) = class_prefix(section) else {
        return;
    };
    let mut path = Vec::new();
    collect_entries(prefix, body, &mut path, source, out);
}

fn collect_entries<'a>(
    prefix: &str,
    body: &'a str,
    path: &mut Vec<&'a str>,
    source: &str,
    out: &mut Vec<ClassMapping>,
) {
    for entry in object_entries(body) {
        match entry.value {
            ThemeValue::Object(nested) => {
                path.push(entry.key);
                collect_entries(prefix, nested, path, source, out);
                path.pop();
            }
            ThemeValue::Scalar(value) => {
                let Some(variable) = referenced_variable(value) else {
                    continue;
                };
                let base_name = if entry.key == DEFAULT_KEY && !path.is_empty() {
                    path.join("-")
                } else if path.is_empty() {
                    entry.key.to_string()
                } else {
                    format!("{}-{}", path.join("-"), entry.key)
                };

                let mapping = ClassMapping {
                    prefix: prefix.to_string(),
                    base_name,
                    variable,
                    source: source.to_string(),
                };
                let class_name = mapping.class_name();
                out.retain(|existing| existing.class_name() != class_name);
                out.push(mapping);
            }
        }
    }
}

/// Variable referenced by a quoted scalar value (`'var(--x)'`, `"rgb(var(--x) / 1)"`)
fn referenced_variable(value: &str) -> Option<String> {
    let quote = value.chars().next()?;
    if !matches!(quote, '\'' | '"' | '`') {
        return None;
    }
    variable_reference_regex()
        .captures(value)
        .and_then(|captures| captures.get(1))
        .map(|m| m.as_str().to_string())
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum ThemeValue<'a> {
    /// Object body, braces excluded
    Object(&'a str),
    /// Raw value text, trimmed
    Scalar(&'a str),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct ThemeEntry<'a> {
    pub key: &'a str,
    pub value: ThemeValue<'a>,
}

/// Top-level `key: value` entries of an object body
pub(crate) fn object_entries(body: &str) -> Vec<ThemeEntry<'_>> {
    let bytes = body.as_bytes();
    let mut entries = Vec::new();
    let mut pos = 0;

    while pos < bytes.len() {
        pos = skip_separators(bytes, pos);
        if pos >= bytes.len() {
            break;
        }

        let Some((key, after_key)) = read_key(body, pos) else {
            pos = skip_value(bytes, pos);
            continue;
        };
        let colon = skip_whitespace(bytes, after_key);
        if bytes.get(colon) != Some(&b':') {
            pos = skip_value(bytes, after_key);
            continue;
        }

        let value_start = skip_whitespace(bytes, colon + 1);
        if bytes.get(value_start) == Some(&b'{') {
            let Some(close) = matching_brace(bytes, value_start) else {
                break;
            };
            entries.push(ThemeEntry {
                key,
                value: ThemeValue::Object(&body[value_start + 1..close]),
            });
            pos = close + 1;
        } else {
            let end = skip_value(bytes, value_start);
            entries.push(ThemeEntry {
                key,
                value: ThemeValue::Scalar(body[value_start..end].trim()),
            });
            pos = end;
        }
    }

    entries
}

/// Read an identifier or quoted key starting at `pos`
fn read_key(body: &str, pos: usize) -> Option<(&str, usize)> {
    let bytes = body.as_bytes();
    match bytes[pos] {
        quote @ (b'\'' | b'"') => {
            let end = skip_string(bytes, pos);
            // skip_string lands after the closing quote
            if end <= pos + 1 || bytes.get(end - 1) != Some(&quote) {
                return None;
            }
            Some((&body[pos + 1..end - 1], end))
        }
        _ => {
            let end = bytes[pos..]
                .iter()
                .position(|&b| !(b.is_ascii_alphanumeric() || matches!(b, b'_' | b'$' | b'-' | b'.')))
                .map(|offset| pos + offset)
                .unwrap_or(bytes.len());
            (end > pos).then(|| (&body[pos..end], end))
        }
    }
}

/// Index of the `}` that closes the `{` at `open`
pub(crate) fn matching_brace(bytes: &[u8], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut pos = open;
    while pos < bytes.len() {
        if let Some(next) = skip_trivia(bytes, pos) {
            pos = next;
            continue;
        }
        match bytes[pos] {
            b'{' => depth += 1,
            b'}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(pos);
                }
            }
            _ => {}
        }
        pos += 1;
    }
    None
}

/// Scan to the next top-level `,` (or the end); always makes progress
fn skip_value(bytes: &[u8], start: usize) -> usize {
    let mut depth = 0i32;
    let mut pos = start;
    while pos < bytes.len() {
        if let Some(next) = skip_trivia(bytes, pos) {
            pos = next;
            continue;
        }
        match bytes[pos] {
            b'{' | b'(' | b'[' => depth += 1,
            b'}' | b')' | b']' => depth -= 1,
            b',' if depth <= 0 => return pos.max(start + 1).min(bytes.len()),
            _ => {}
        }
        pos += 1;
    }
    bytes.len()
}

fn skip_separators(bytes: &[u8], mut pos: usize) -> usize {
    loop {
        pos = skip_whitespace(bytes, pos);
        if bytes.get(pos) == Some(&b',') {
            pos += 1;
            continue;
        }
        match skip_comment(bytes, pos) {
            Some(next) => pos = next,
            None => return pos,
        }
    }
}

fn skip_whitespace(bytes: &[u8], mut pos: usize) -> usize {
    while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
        pos += 1;
    }
    pos
}

/// Position after a string literal or comment starting at `pos`, if one starts there
fn skip_trivia(bytes: &[u8], pos: usize) -> Option<usize> {
    match bytes[pos] {
        b'\'' | b'"' | b'`' => Some(skip_string(bytes, pos)),
        b'/' => skip_comment(bytes, pos),
        _ => None,
    }
}

fn skip_string(bytes: &[u8], start: usize) -> usize {
    let quote = bytes[start];
    let mut pos = start + 1;
    while pos < bytes.len() {
        match bytes[pos] {
            b'\\' => pos += 2,
            b if b == quote => return pos + 1,
            _ => pos += 1,
        }
    }
    bytes.len()
}

fn skip_comment(bytes: &[u8], pos: usize) -> Option<usize> {
    if bytes.get(pos) != Some(&b'/') {
        return None;
    }
    match bytes.get(pos + 1) {
        Some(b'/') => Some(
            bytes[pos..]
                .iter()
                .position(|&b| b == b'\n')
                .map(|offset| pos + offset + 1)
                .unwrap_or(bytes.len()),
        ),
        Some(b'*') => Some(
            bytes[pos + 2..]
                .windows(2)
                .position(|window| window == b"*/")
                .map(|offset| pos + 2 + offset + 2)
                .unwrap_or(bytes.len()),
        ),
        _ => None,
    }
}
