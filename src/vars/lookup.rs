//! Lookup engine
//!
//! Works out which variable the cursor is over and collects its definitions.
//! Candidates are generated in priority order and the first one whose range contains
//! the cursor wins:
//!
//! 1. `var(--name)` references anywhere on the line.
//! 2. The identifier under the cursor, if it is a utility class derived from a theme.
//! 3. Otherwise, every known variable whose name (without `--`) occurs inside that
//!    identifier. Longer names come first, then names in lexical order.
//!
//! Ranges are byte offsets into the line and include their end, so a cursor just
//! after the closing `)` still counts as inside the reference.

use regex::Regex;
use std::ops::Range;
use std::sync::OnceLock;

use crate::vars::definition::base_name;
use crate::vars::extractor::{style_regions, template_region};
use crate::vars::index::{group_by_source, SourceGroup, VariableIndex};

/// Language identifiers of documents that embed styles in a larger document
pub const COMPONENT_LANGUAGES: &[&str] = &["vue", "svelte"];

fn reference_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"var\(\s*(--[\w-]+)\s*(?:,[^()]*)?\)").expect("reference pattern is valid")
    })
}

/// How a candidate was found
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchKind {
    /// Explicit `var(--name)` reference
    Reference,
    /// Utility class derived from a theme configuration
    ThemeClass { class_name: String },
    /// Identifier containing a variable's base name
    ClassSubstring,
}

/// A candidate variable and the part of the line it covers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupMatch {
    pub variable: String,
    pub range: Range<usize>,
    pub kind: MatchKind,
}

impl LookupMatch {
    fn contains(&self, offset: usize) -> bool {
        self.range.start <= offset && offset <= self.range.end
    }
}

/// A resolved variable with its definitions grouped by source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub matched: LookupMatch,
    pub groups: Vec<SourceGroup>,
}

/// Resolve the variable under the cursor.
///
/// `cursor` is a byte offset into `line`; `word` is the identifier under the cursor,
/// if any.
pub fn resolve(line: &str, cursor: usize, word: Option<&str>, index: &VariableIndex) -> Option<LookupMatch> {
    let mut candidates = reference_candidates(line);
    if let Some(word) = word {
        candidates.extend(class_candidates(line, word, index));
    }
    candidates.into_iter().find(|candidate| candidate.contains(cursor))
}

/// Every `var(--name)` occurrence on the line
pub fn reference_candidates(line: &str) -> Vec<LookupMatch> {
    reference_regex()
        .captures_iter(line)
        .filter_map(|captures| {
            let whole = captures.get(0)?;
            let name = captures.get(1)?;
            Some(LookupMatch {
                variable: name.as_str().to_string(),
                range: whole.range(),
                kind: MatchKind::Reference,
            })
        })
        .collect()
}

/// Candidates for an identifier treated as a utility class.
///
/// The candidate range is the identifier's first occurrence on the line.
pub fn class_candidates(line: &str, word: &str, index: &VariableIndex) -> Vec<LookupMatch> {
    if word.is_empty() {
        return Vec::new();
    }
    let Some(start) = line.find(word) else {
        return Vec::new();
    };
    let range = start..start + word.len();

    if let Some(mapping) = index.lookup_class(word) {
        return vec![LookupMatch {
            variable: mapping.variable.clone(),
            range,
            kind: MatchKind::ThemeClass {
                class_name: word.to_string(),
            },
        }];
    }

    let mut variables: Vec<&str> = index
        .variable_names()
        .filter(|name| {
            let base = base_name(name);
            !base.is_empty() && word.contains(base)
        })
        .collect();
    variables.sort_by(|a, b| {
        base_name(b)
            .len()
            .cmp(&base_name(a).len())
            .then_with(|| a.cmp(b))
    });

    variables
        .into_iter()
        .map(|variable| LookupMatch {
            variable: variable.to_string(),
            range: range.clone(),
            kind: MatchKind::ClassSubstring,
        })
        .collect()
}

/// The `[\w-]+` run around a byte offset, with its range
pub fn word_at(line: &str, cursor: usize) -> Option<(Range<usize>, &str)> {
    if cursor > line.len() || !line.is_char_boundary(cursor) {
        return None;
    }

    let start = line[..cursor]
        .char_indices()
        .rev()
        .take_while(|(_, ch)| is_word_char(*ch))
        .last()
        .map(|(i, _)| i)
        .unwrap_or(cursor);
    let end = line[cursor..]
        .char_indices()
        .find(|(_, ch)| !is_word_char(*ch))
        .map(|(i, _)| cursor + i)
        .unwrap_or(line.len());

    (end > start).then(|| (start..end, &line[start..end]))
}

/// Resolve the variable at an editor position and collect its definitions.
///
/// `line` is zero-based and `character` counts UTF-16 code units within the line,
/// as LSP positions do. For component documents the position must be inside a
/// `<style>` block or the `<template>` block. Returns `None` when nothing resolves or the variable has no
/// definitions.
pub fn resolve_at(
    text: &str,
    language: &str,
    line: u32,
    character: u32,
    index: &VariableIndex,
) -> Option<Resolution> {
    let (line_start, line_text) = line_at(text, line as usize)?;
    let cursor = utf16_to_byte(line_text, character as usize)?;

    if is_component_language(language) && !in_style_or_template(text, line_start + cursor) {
        return None;
    }

    let word = word_at(line_text, cursor).map(|(_, word)| word);
    let matched = resolve(line_text, cursor, word, index)?;
    let definitions = index.lookup(&matched.variable)?;

    Some(Resolution {
        groups: group_by_source(definitions),
        matched,
    })
}

pub fn is_component_language(language: &str) -> bool {
    COMPONENT_LANGUAGES.contains(&language)
}

fn in_style_or_template(text: &str, offset: usize) -> bool {
    let inside = |range: &Range<usize>| range.start <= offset && offset <= range.end;
    style_regions(text).iter().any(inside) || template_region(text).as_ref().is_some_and(inside)
}

/// Byte offset where the line starts and its text without the line terminator
fn line_at(text: &str, line: usize) -> Option<(usize, &str)> {
    let mut offset = 0;
    for (number, raw) in text.split('\n').enumerate() {
        if number == line {
            return Some((offset, raw.strip_suffix('\r').unwrap_or(raw)));
        }
        offset += raw.len() + 1;
    }
    None
}

/// Byte offset of a UTF-16 column; the column just past the end is allowed.
///
/// Columns that split a surrogate pair or lie beyond the line give `None`.
pub(crate) fn utf16_to_byte(line: &str, character: usize) -> Option<usize> {
    let mut units = 0;
    for (i, ch) in line.char_indices() {
        if units == character {
            return Some(i);
        }
        if units > character {
            return None;
        }
        units += ch.len_utf16();
    }
    (units == character).then_some(line.len())
}

fn is_word_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_' || ch == '-'
}
