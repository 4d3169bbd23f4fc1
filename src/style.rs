//! Style declaration model.
//!
//! Manual styles travel through the system as an ordered list of
//! property/value declarations. The same shape is used in three places:
//! definition defaults, instance overrides, and the `style` attribute of a
//! rendered node. The attribute form is a semicolon-joined string; parsing it
//! back must be lossless for every declaration it can recognize and must
//! ignore fragments it cannot, because frozen markup may have been
//! hand-authored or altered before it is thawed.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

lazy_static! {
    /// One CSS-ish declaration: `property: value`. Property names are
    /// letters, digits and hyphens; the value is everything up to the next
    /// separator, trimmed.
    static ref DECLARATION_RE: Regex =
        Regex::new(r"^\s*(-?[A-Za-z][A-Za-z0-9-]*)\s*:\s*(.+?)\s*$").unwrap();
}

/// A single style declaration, e.g. `color` / `tomato`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StyleDecl {
    pub property: String,
    pub value: String,
}

impl StyleDecl {
    pub fn new(property: &str, value: &str) -> Self {
        StyleDecl {
            property: property.to_string(),
            value: value.to_string(),
        }
    }

    /// Parse one declaration string (`"color: tomato"`). Returns `None` for
    /// fragments that do not look like a declaration.
    pub fn parse(fragment: &str) -> Option<StyleDecl> {
        let caps = DECLARATION_RE.captures(fragment)?;
        Some(StyleDecl {
            property: caps[1].to_string(),
            value: caps[2].to_string(),
        })
    }
}

impl std::fmt::Display for StyleDecl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.property, self.value)
    }
}

/// Parse a semicolon-joined declaration list, in order. Malformed fragments
/// are skipped, never an error.
pub fn parse_declarations(source: &str) -> Vec<StyleDecl> {
    let mut decls = Vec::new();
    for fragment in source.split(';') {
        if fragment.trim().is_empty() {
            continue;
        }
        match StyleDecl::parse(fragment) {
            Some(decl) => decls.push(decl),
            None => {
                tracing::debug!(fragment, "ignoring unrecognized style fragment");
            }
        }
    }
    decls
}

/// Emit the ordered declaration list as a `style` attribute value.
/// `parse_declarations(emit_declarations(d)) == d` for recognized input.
pub fn emit_declarations(decls: &[StyleDecl]) -> String {
    decls
        .iter()
        .map(|d| d.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Append `overrides` to `base` with later-entry-wins semantics: a
/// declaration for an already-present property removes the earlier entry and
/// takes its position at the end of the list.
pub fn merge_declarations(base: &[StyleDecl], overrides: &[StyleDecl]) -> Vec<StyleDecl> {
    let mut merged: Vec<StyleDecl> = Vec::with_capacity(base.len() + overrides.len());
    for decl in base.iter().chain(overrides.iter()) {
        merged.retain(|existing| existing.property != decl.property);
        merged.push(decl.clone());
    }
    merged
}
