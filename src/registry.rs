//! Export registry and renaming-resilient identifier resolution.
//!
//! Frozen markup must reference a definition and two of its entry points by
//! name, and those names must still be correct after an external renaming
//! pass has rewritten every identifier in the deployed artifact. Two modes
//! cover this:
//!
//! 1. **Stable symbols** (primary): registration assigns each definition a
//!    symbolic identifier and stamps it on the definition as a preserved
//!    token. Resolution returns the token directly.
//! 2. **Identity scan** (fallback): when a renaming pass has invalidated the
//!    tokens, resolution enumerates the owner's exports in insertion order
//!    and returns the first key whose bound value is reference-identical to
//!    the member. Identity relationships survive any rename that does not
//!    restructure the export graph, so no name literal is ever consulted.
//!
//! `resolve` returns `None` when neither mode applies; callers must treat
//! that as "this member cannot be safely referenced in generated text".

use std::cell::RefCell;
use std::rc::Rc;

use crate::component::Definition;

/// The two instance/static entry points the reconstruction directive calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Static thaw entry (`from`): markup node -> instance.
    Thaw,
    /// Instance render entry: instance -> rendered node.
    Render,
}

/// An addressable member of a definition's contract. Carries an intrinsic
/// name token while the build is unrenamed; a renaming pass clears it.
#[derive(Debug)]
pub struct EntryPoint {
    kind: EntryKind,
    preserved: RefCell<Option<String>>,
}

impl EntryPoint {
    pub fn new(kind: EntryKind, intrinsic_name: &str) -> Rc<EntryPoint> {
        Rc::new(EntryPoint {
            kind,
            preserved: RefCell::new(Some(intrinsic_name.to_string())),
        })
    }

    pub fn kind(&self) -> EntryKind {
        self.kind
    }

    pub fn preserved_name(&self) -> Option<String> {
        self.preserved.borrow().clone()
    }

    pub(crate) fn clear_preserved(&self) {
        *self.preserved.borrow_mut() = None;
    }
}

/// A value reachable through an export map. Identity is reference identity,
/// never value equality.
#[derive(Debug, Clone)]
pub enum ExportValue {
    Definition(Rc<Definition>),
    Entry(Rc<EntryPoint>),
}

impl ExportValue {
    /// Reference identity between two export values.
    pub fn identical(&self, other: &ExportValue) -> bool {
        match (self, other) {
            (ExportValue::Definition(a), ExportValue::Definition(b)) => Rc::ptr_eq(a, b),
            (ExportValue::Entry(a), ExportValue::Entry(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// The intrinsic, compiler-preserved name token, if the value still has
    /// one. This is the fast path for unrenamed builds.
    pub fn name_token(&self) -> Option<String> {
        match self {
            ExportValue::Definition(def) => def.symbol(),
            ExportValue::Entry(entry) => entry.preserved_name(),
        }
    }

    fn clear_token(&self) {
        match self {
            ExportValue::Definition(def) => def.clear_symbol(),
            ExportValue::Entry(entry) => entry.clear_preserved(),
        }
    }
}

/// Insertion-ordered name -> value map. Order matters: the identity scan
/// returns the first matching key.
#[derive(Debug, Default)]
pub struct ExportMap {
    entries: Vec<(String, ExportValue)>,
}

impl ExportMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name` to `value`, replacing an existing binding of the same name.
    pub fn insert(&mut self, name: &str, value: ExportValue) {
        self.entries.retain(|(existing, _)| existing != name);
        self.entries.push((name.to_string(), value));
    }

    pub fn get(&self, name: &str) -> Option<&ExportValue> {
        self.entries
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ExportValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Re-key a binding while keeping its value, the way an external
    /// minifying pass renames members: the object graph is untouched but any
    /// intrinsic name token is invalidated.
    pub fn rename(&mut self, old: &str, new: &str) -> bool {
        for (key, value) in self.entries.iter_mut() {
            if key == old {
                *key = new.to_string();
                value.clear_token();
                return true;
            }
        }
        false
    }
}

/// Compute a name that re-obtains `member` through `owner` at runtime.
///
/// Fast path: the member's own preserved token. Otherwise the first key in
/// `owner` whose value is reference-identical to `member`. `None` means the
/// member cannot be safely referenced in generated text; this function never
/// fails any other way.
pub fn resolve(owner: &ExportMap, member: &ExportValue) -> Option<String> {
    if let Some(token) = member.name_token() {
        return Some(token);
    }
    owner
        .iter()
        .find(|(_, value)| value.identical(member))
        .map(|(key, _)| key.to_string())
}

/// The explicit replacement for a global mutable namespace: every freezable
/// definition is registered here under a stable symbol, and the freeze
/// encoder resolves definition references against this map only.
#[derive(Debug, Default)]
pub struct ExportRegistry {
    exports: ExportMap,
}

impl ExportRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a definition under a stable symbol. The symbol is stamped on
    /// the definition as its preserved token.
    pub fn register(&mut self, symbol: &str, definition: &Rc<Definition>) {
        definition.set_symbol(symbol);
        self.exports
            .insert(symbol, ExportValue::Definition(definition.clone()));
    }

    pub fn get(&self, symbol: &str) -> Option<&ExportValue> {
        self.exports.get(symbol)
    }

    pub fn definition(&self, symbol: &str) -> Option<Rc<Definition>> {
        match self.exports.get(symbol) {
            Some(ExportValue::Definition(def)) => Some(def.clone()),
            _ => None,
        }
    }

    /// Locate a registered definition by its markup class name (class-list
    /// position 0 of a rendered node). Definition names are stable across
    /// renaming; registry symbols are not.
    pub fn find_by_class(&self, class_name: &str) -> Option<Rc<Definition>> {
        self.exports.iter().find_map(|(_, value)| match value {
            ExportValue::Definition(def) if def.name == class_name => Some(def.clone()),
            _ => None,
        })
    }

    pub fn exports(&self) -> &ExportMap {
        &self.exports
    }

    /// Apply an identity-preserving rename to a registered symbol.
    pub fn rename(&mut self, old: &str, new: &str) -> bool {
        self.exports.rename(old, new)
    }
}
