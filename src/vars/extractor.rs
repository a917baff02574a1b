//! Variable extraction
//!
//! Pulls custom property definitions (`--name: value;`) out of style text. This is a
//! pattern scan, not a CSS parser:
//!
//! - Unconditional definitions are found anywhere outside a conditional block.
//! - Definitions inside `@media`, `@supports` or `@container` blocks are tagged with the
//!   block's condition. Only one level is recognised: the block body ends at the first
//!   `}`, so a rule nested inside a conditional block cuts the body short and anything
//!   after that brace is treated as unconditional.
//! - Comments and string literals are not special; a definition inside a comment is
//!   still a definition.
//!
//! Component files (`.vue`, `.svelte`) are only scanned inside their `<style>` regions.

use regex::Regex;
use std::ops::Range;
use std::sync::OnceLock;

use crate::source::SourceKind;
use crate::vars::definition::{Definition, ExtractedVariable, VARIABLE_SIGIL};

fn definition_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"--([\w-]+)\s*:\s*([^;{}]+);").expect("definition pattern is valid"))
}

fn conditional_block_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"@(?:media|supports|container)\b([^{;]*)\{([^}]*)\}")
            .expect("conditional block pattern is valid")
    })
}

fn style_block_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<style[^>]*>(.*?)</style>").expect("style block pattern is valid"))
}

fn template_block_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)<template[^>]*>(.*?)</template>").expect("template block pattern is valid")
    })
}

/// Extract every variable definition from style text.
///
/// Unconditional definitions come first in document order, followed by the
/// definitions of each conditional block in block order. Repeated names are kept
/// as separate entries.
pub fn extract(text: &str, source: &str) -> Vec<ExtractedVariable> {
    let mut variables = Vec::new();

    let main_content = conditional_block_regex().replace_all(text, "");
    collect_definitions(&main_content, source, None, &mut variables);

    for captures in conditional_block_regex().captures_iter(text) {
        let condition = captures.get(1).map(|m| m.as_str().trim()).unwrap_or_default();
        let body = captures.get(2).map(|m| m.as_str()).unwrap_or_default();
        collect_definitions(body, source, Some(condition.to_string()), &mut variables);
    }

    variables
}

/// Extract definitions from a whole file, narrowing to style regions where the
/// file format embeds styles inside a larger document.
pub fn extract_for_kind(text: &str, source: &str, kind: SourceKind) -> Vec<ExtractedVariable> {
    match kind {
        SourceKind::Component => extract(&style_content(text), source),
        SourceKind::StyleSheet | SourceKind::ThemeConfig | SourceKind::Registered => {
            extract(text, source)
        }
    }
}

/// Whether the text contains at least one variable definition
pub fn has_variable_definitions(text: &str) -> bool {
    definition_regex()
        .find_iter(text)
        .any(|m| starts_at_boundary(text, m.start()))
}

/// Byte ranges of every `<style>...</style>` block, tags included
pub fn style_regions(text: &str) -> Vec<Range<usize>> {
    style_block_regex().find_iter(text).map(|m| m.range()).collect()
}

/// Byte range of the first `<template>...</template>` block, tags included
pub fn template_region(text: &str) -> Option<Range<usize>> {
    template_block_regex().find(text).map(|m| m.range())
}

/// Inner content of every style block, joined by newlines
pub fn style_content(text: &str) -> String {
    style_block_regex()
        .captures_iter(text)
        .filter_map(|captures| captures.get(1))
        .map(|m| m.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

fn collect_definitions(
    text: &str,
    source: &str,
    scope: Option<String>,
    out: &mut Vec<ExtractedVariable>,
) {
    for captures in definition_regex().captures_iter(text) {
        let Some(whole) = captures.get(0) else {
            continue;
        };
        // `.block--modifier: x;` style text is not a definition
        if !starts_at_boundary(text, whole.start()) {
            continue;
        }
        let (Some(name), Some(value)) = (captures.get(1), captures.get(2)) else {
            continue;
        };
        let value = value.as_str().trim();
        if value.is_empty() {
            continue;
        }

        out.push(ExtractedVariable {
            name: format!("{}{}", VARIABLE_SIGIL, name.as_str()),
            definition: Definition::new(value, source, scope.clone()),
        });
    }
}

fn starts_at_boundary(text: &str, start: usize) -> bool {
    match text[..start].chars().next_back() {
        Some(ch) => !(ch.is_alphanumeric() || ch == '_' || ch == '-'),
        None => true,
    }
}
