//! Component model: definitions, resolved defaults, instances.
//!
//! ## Key Invariants
//!
//! 1. **Definitions are immutable templates.** A `Definition` is authored
//!    once; instances never write through it. Functional overrides produce a
//!    new instance configuration, so concurrent instances of the same
//!    definition cannot observe each other's overrides.
//! 2. **Linear ancestry, merged once.** A definition extends at most one
//!    parent. Effective defaults are computed by `merge_defaults` over the
//!    ancestry chain exactly once per definition and cached; there is no
//!    runtime prototype walking.
//! 3. **Class chain order.** The class list of a rendered node starts with
//!    the exact producing definition's name and ends at the root definition's
//!    name. Thaw and stylesheet lookup both depend on position 0.
//! 4. **State is private to its instance.** The state container is created by
//!    `init_state` at most once and is never shared across instances.

use std::cell::{Cell, OnceCell, Ref, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::markup::NodeHandle;
use crate::registry::{EntryKind, EntryPoint, ExportMap, ExportValue};
use crate::render::Phase;
use crate::style::{self, StyleDecl};

/// Mutable key/value state owned by a stateful instance.
pub type StateMap = HashMap<String, Value>;

/// Build hook: pure function of configuration and state to a fresh child
/// instance tree. Must not mutate state or the rendered node.
pub type BuildFn = Rc<dyn Fn(&Instance) -> Result<Vec<Rc<Instance>>, String>>;

/// State initialization hook, invoked once at construction of a stateful
/// instance, before the first build.
pub type InitStateFn = Rc<dyn Fn(&Instance) -> StateMap>;

// ═══════════════════════════════════════════════════════════════════════════════
// DEFINITION
// ═══════════════════════════════════════════════════════════════════════════════

/// An immutable, named component template: default tag, styles, attributes,
/// optional ancestry, and the build/state hooks.
pub struct Definition {
    pub name: String,
    pub tag: String,
    styles: Vec<StyleDecl>,
    attributes: Vec<(String, String)>,
    parent: Option<Rc<Definition>>,
    stateful: bool,
    build: Option<BuildFn>,
    init_state: Option<InitStateFn>,
    thaw_entry: Rc<EntryPoint>,
    render_entry: Rc<EntryPoint>,
    statics: RefCell<ExportMap>,
    members: RefCell<ExportMap>,
    symbol: RefCell<Option<String>>,
    resolved: OnceCell<ResolvedDefaults>,
}

impl Definition {
    pub fn new(name: &str, tag: &str) -> Definition {
        let thaw_entry = EntryPoint::new(EntryKind::Thaw, "from");
        let render_entry = EntryPoint::new(EntryKind::Render, "render");

        let mut statics = ExportMap::new();
        statics.insert("from", ExportValue::Entry(thaw_entry.clone()));
        let mut members = ExportMap::new();
        members.insert("render", ExportValue::Entry(render_entry.clone()));

        Definition {
            name: name.to_string(),
            tag: tag.to_string(),
            styles: Vec::new(),
            attributes: Vec::new(),
            parent: None,
            stateful: false,
            build: None,
            init_state: None,
            thaw_entry,
            render_entry,
            statics: RefCell::new(statics),
            members: RefCell::new(members),
            symbol: RefCell::new(None),
            resolved: OnceCell::new(),
        }
    }

    /// Extend another definition; its defaults become this definition's
    /// inherited defaults and its name joins the class chain.
    pub fn extends(mut self, parent: &Rc<Definition>) -> Definition {
        self.parent = Some(parent.clone());
        self
    }

    /// Add a default style declaration string, e.g. `"color: tomato"`.
    pub fn with_style(mut self, declaration: &str) -> Definition {
        self.styles.extend(StyleDecl::parse(declaration));
        self
    }

    pub fn with_attribute(mut self, name: &str, value: &str) -> Definition {
        self.attributes.retain(|(existing, _)| existing != name);
        self.attributes.push((name.to_string(), value.to_string()));
        self
    }

    /// Mark the definition stateful. Statefulness is also inherited from the
    /// ancestry chain.
    pub fn stateful(mut self) -> Definition {
        self.stateful = true;
        self
    }

    pub fn with_build(mut self, build: BuildFn) -> Definition {
        self.build = Some(build);
        self
    }

    pub fn with_init_state(mut self, init: InitStateFn) -> Definition {
        self.init_state = Some(init);
        self
    }

    pub fn seal(self) -> Rc<Definition> {
        Rc::new(self)
    }

    pub fn is_stateful(&self) -> bool {
        if self.stateful {
            return true;
        }
        self.parent.as_deref().map_or(false, |p| p.is_stateful())
    }

    /// Effective defaults for this definition, computed once and cached.
    pub fn resolved(&self) -> &ResolvedDefaults {
        self.resolved.get_or_init(|| merge_defaults(&self.chain()))
    }

    /// Ancestry chain, most specific first.
    fn chain(&self) -> Vec<&Definition> {
        let mut chain: Vec<&Definition> = vec![self];
        let mut current = self;
        while let Some(parent) = current.parent.as_deref() {
            chain.push(parent);
            current = parent;
        }
        chain
    }

    pub(crate) fn build_hook(&self) -> Option<BuildFn> {
        self.build.clone()
    }

    pub(crate) fn init_state_hook(&self) -> Option<InitStateFn> {
        self.init_state.clone()
    }

    /// Static member map; contains the thaw entry under its current name.
    pub fn statics(&self) -> Ref<'_, ExportMap> {
        self.statics.borrow()
    }

    /// Instance-contract member map; contains the render entry under its
    /// current name.
    pub fn members(&self) -> Ref<'_, ExportMap> {
        self.members.borrow()
    }

    pub fn thaw_entry(&self) -> ExportValue {
        ExportValue::Entry(self.thaw_entry.clone())
    }

    pub fn render_entry(&self) -> ExportValue {
        ExportValue::Entry(self.render_entry.clone())
    }

    /// Rename a static member, identity-preserving (renaming-pass simulation).
    pub fn rename_static(&self, old: &str, new: &str) -> bool {
        self.statics.borrow_mut().rename(old, new)
    }

    /// Rename an instance-contract member, identity-preserving.
    pub fn rename_member(&self, old: &str, new: &str) -> bool {
        self.members.borrow_mut().rename(old, new)
    }

    /// The stable registry symbol, while one is preserved.
    pub fn symbol(&self) -> Option<String> {
        self.symbol.borrow().clone()
    }

    pub(crate) fn set_symbol(&self, symbol: &str) {
        *self.symbol.borrow_mut() = Some(symbol.to_string());
    }

    pub(crate) fn clear_symbol(&self) {
        *self.symbol.borrow_mut() = None;
    }
}

impl std::fmt::Debug for Definition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Definition")
            .field("name", &self.name)
            .field("tag", &self.tag)
            .field("stateful", &self.stateful)
            .field("parent", &self.parent.as_ref().map(|p| &p.name))
            .finish()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RESOLVED DEFAULTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Output of `merge_defaults`: the union of a definition's declarations with
/// all of its ancestors', plus the class chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDefaults {
    /// Most-specific-first: own definition name, ancestors, root last.
    pub class_chain: Vec<String>,
    /// Root-first declaration order so later (more specific) entries win.
    pub styles: Vec<StyleDecl>,
    /// Default attributes; more specific definitions replace by key.
    pub attributes: Vec<(String, String)>,
}

/// Pure merge over an ancestry chain given most-specific first. Computed once
/// per definition at resolution time and cached there.
pub fn merge_defaults(chain: &[&Definition]) -> ResolvedDefaults {
    let class_chain = chain.iter().map(|def| def.name.clone()).collect();

    let mut styles: Vec<StyleDecl> = Vec::new();
    let mut attributes: Vec<(String, String)> = Vec::new();
    for def in chain.iter().rev() {
        styles = style::merge_declarations(&styles, &def.styles);
        for (name, value) in &def.attributes {
            if let Some(slot) = attributes.iter_mut().find(|(key, _)| key == name) {
                slot.1 = value.clone();
            } else {
                attributes.push((name.clone(), value.clone()));
            }
        }
    }

    ResolvedDefaults {
        class_chain,
        styles,
        attributes,
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// INSTANCE
// ═══════════════════════════════════════════════════════════════════════════════

/// Per-instance configuration overrides. Purely data; merging happens at
/// instantiation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Overrides {
    /// Explicit tag override; the only way to change an instance's tag.
    pub tag: Option<String>,
    /// Text content rendered as the node's first child.
    pub text: Option<String>,
    /// Manual style declaration strings, most-specific last.
    pub styles: Vec<String>,
    /// Attribute overrides; replace definition defaults by key.
    pub attributes: Vec<(String, String)>,
}

/// A configured, possibly stateful realization of a definition. Owns at most
/// one rendered node, replaced wholesale on every rebuild.
pub struct Instance {
    pub definition: Rc<Definition>,
    overrides: Overrides,
    manual_styles: Vec<StyleDecl>,
    children: Vec<Rc<Instance>>,
    pub(crate) state: RefCell<Option<StateMap>>,
    pub(crate) phase: Cell<Phase>,
    pub(crate) node: RefCell<Option<NodeHandle>>,
    pub(crate) frozen: Cell<bool>,
}

/// Failures of the component model itself (not of rendering).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComponentError {
    /// The same instance appears at more than one position of the child
    /// tree. Rendered nodes are exclusively owned, so a shared (or, in the
    /// degenerate case, self-containing) subtree is rejected at
    /// instantiation instead of misbehaving at render time.
    SharedSubtree { definition: String },
}

impl std::fmt::Display for ComponentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ComponentError::SharedSubtree { definition } => {
                write!(
                    f,
                    "instance of '{}' appears more than once in the child tree",
                    definition
                )
            }
        }
    }
}

impl std::error::Error for ComponentError {}

/// Create an instance from a definition, overrides and children. Children
/// must form a proper tree: the same instance may not appear twice.
pub fn instantiate(
    definition: &Rc<Definition>,
    overrides: Overrides,
    children: Vec<Rc<Instance>>,
) -> Result<Rc<Instance>, ComponentError> {
    let mut seen: Vec<*const Instance> = Vec::new();
    for child in &children {
        collect_identities(child, &mut seen);
    }
    seen.sort();
    if seen.windows(2).any(|pair| pair[0] == pair[1]) {
        return Err(ComponentError::SharedSubtree {
            definition: definition.name.clone(),
        });
    }
    Ok(Instance::new_unchecked(definition, overrides, children))
}

fn collect_identities(instance: &Rc<Instance>, out: &mut Vec<*const Instance>) {
    out.push(Rc::as_ptr(instance));
    for child in &instance.children {
        collect_identities(child, out);
    }
}

impl Instance {
    /// Construct without the shared-subtree guard. Used internally where the
    /// children are empty or already validated.
    pub(crate) fn new_unchecked(
        definition: &Rc<Definition>,
        overrides: Overrides,
        children: Vec<Rc<Instance>>,
    ) -> Rc<Instance> {
        let manual_styles = overrides
            .styles
            .iter()
            .flat_map(|decl| StyleDecl::parse(decl))
            .collect();
        Rc::new(Instance {
            definition: definition.clone(),
            overrides,
            manual_styles,
            children,
            state: RefCell::new(None),
            phase: Cell::new(Phase::Constructed),
            node: RefCell::new(None),
            frozen: Cell::new(false),
        })
    }

    /// Resolved tag: explicit override, else the definition default.
    pub fn tag(&self) -> &str {
        self.overrides.tag.as_deref().unwrap_or(&self.definition.tag)
    }

    pub fn text(&self) -> Option<&str> {
        self.overrides.text.as_deref()
    }

    /// Merged styles: inherited defaults plus manual overrides, later
    /// entries winning per property.
    pub fn styles(&self) -> Vec<StyleDecl> {
        style::merge_declarations(&self.definition.resolved().styles, &self.manual_styles)
    }

    /// Manual styles only; this is what freeze emits as the node's `style`
    /// attribute (inherited styles stay in the external stylesheet).
    pub fn manual_styles(&self) -> &[StyleDecl] {
        &self.manual_styles
    }

    /// Merged attributes: definition defaults with instance overrides
    /// replacing by key.
    pub fn attributes(&self) -> Vec<(String, String)> {
        let mut merged = self.definition.resolved().attributes.clone();
        for (name, value) in &self.overrides.attributes {
            if let Some(slot) = merged.iter_mut().find(|(key, _)| key == name) {
                slot.1 = value.clone();
            } else {
                merged.push((name.clone(), value.clone()));
            }
        }
        merged
    }

    pub fn attribute(&self, name: &str) -> Option<String> {
        self.attributes()
            .into_iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }

    pub fn configured_children(&self) -> &[Rc<Instance>] {
        &self.children
    }

    pub fn is_stateful(&self) -> bool {
        self.definition.is_stateful()
    }

    /// Snapshot of a state entry. `None` for stateless instances or missing
    /// keys.
    pub fn state_value(&self, key: &str) -> Option<Value> {
        self.state
            .borrow()
            .as_ref()
            .and_then(|state| state.get(key).cloned())
    }

    pub fn rendered_node(&self) -> Option<NodeHandle> {
        self.node.borrow().clone()
    }

    pub fn phase(&self) -> Phase {
        self.phase.get()
    }

    /// Production/static mode marker; set by the freeze encoder.
    pub fn is_frozen(&self) -> bool {
        self.frozen.get()
    }

    /// Functional update: a new instance with additional manual styles.
    /// The receiver's configuration is untouched.
    pub fn with_styles(&self, declarations: &[&str]) -> Rc<Instance> {
        let mut overrides = self.overrides.clone();
        overrides
            .styles
            .extend(declarations.iter().map(|s| s.to_string()));
        Instance::new_unchecked(&self.definition, overrides, self.children.clone())
    }

    /// Functional update: a new instance with attribute overrides applied.
    pub fn with_attributes(&self, attributes: &[(&str, &str)]) -> Rc<Instance> {
        let mut overrides = self.overrides.clone();
        for (name, value) in attributes {
            overrides
                .attributes
                .retain(|(existing, _)| existing != name);
            overrides
                .attributes
                .push((name.to_string(), value.to_string()));
        }
        Instance::new_unchecked(&self.definition, overrides, self.children.clone())
    }

    /// Functional update: a new instance with an explicit tag. This is the
    /// only way to change an instance's tag.
    pub fn with_tag(&self, tag: &str) -> Rc<Instance> {
        let mut overrides = self.overrides.clone();
        overrides.tag = Some(tag.to_string());
        Instance::new_unchecked(&self.definition, overrides, self.children.clone())
    }
}

impl std::fmt::Debug for Instance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instance")
            .field("definition", &self.definition.name)
            .field("tag", &self.tag())
            .field("children", &self.children.len())
            .field("phase", &self.phase.get())
            .field("frozen", &self.frozen.get())
            .finish()
    }
}
