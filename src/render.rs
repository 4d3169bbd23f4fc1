//! Render engine: lifecycle, build, render, setState.
//!
//! ## Lifecycle
//!
//! `Constructed → Initialized → Built → Rendered`, re-entering `Built` on
//! every state change. `init_state` runs once, for stateful instances only.
//! `build` is a pure function of configuration and state; it never touches
//! the live node. `render` replaces the instance's node wholesale — the old
//! node stays attached until the new one is complete, so a failing build
//! leaves the previous markup in place and never a half-built node.
//!
//! `set_state` is synchronous: when it returns, the rendered node reflects
//! the new state. There is no asynchronous gap and no partial node.

use std::rc::Rc;

use crate::component::{Instance, StateMap};
use crate::freeze::{self, FreezeError};
use crate::markup::{self, MarkupNode, NodeHandle, RESERVED_ATTRIBUTES};
use crate::registry::ExportRegistry;

/// Per-instance lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Constructed,
    Initialized,
    Built,
    Rendered,
}

/// Failures raised by the render path. Build failures propagate to whatever
/// triggered the render — construction, `set_state`, or a directive — and
/// are not recovered locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    Build { definition: String, message: String },
    NotStateful { definition: String },
}

impl std::fmt::Display for RenderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RenderError::Build {
                definition,
                message,
            } => {
                write!(f, "build of '{}' failed: {}", definition, message)
            }
            RenderError::NotStateful { definition } => {
                write!(f, "'{}' has no state container", definition)
            }
        }
    }
}

impl std::error::Error for RenderError {}

/// Internal render context. Rendering under a freeze carries the export
/// registry so stateful nodes can append reconstruction directives.
pub(crate) struct RenderContext<'a> {
    pub freeze: Option<&'a ExportRegistry>,
}

impl Instance {
    /// Enter the lifecycle: initialize the state container once for stateful
    /// instances; stateless instances skip straight ahead.
    pub(crate) fn prepare(&self) {
        if self.phase.get() != Phase::Constructed {
            return;
        }
        if self.is_stateful() {
            let state = match self.definition.init_state_hook() {
                Some(init) => init(self),
                None => StateMap::new(),
            };
            *self.state.borrow_mut() = Some(state);
        }
        self.phase.set(Phase::Initialized);
    }

    /// Produce a fresh child tree from the current configuration and state.
    pub fn build(&self) -> Result<Vec<Rc<Instance>>, RenderError> {
        match self.definition.build_hook() {
            Some(hook) => hook(self).map_err(|message| RenderError::Build {
                definition: self.definition.name.clone(),
                message,
            }),
            None => Ok(self.configured_children().to_vec()),
        }
    }

    /// Materialize the latest build output into a detached node tree.
    pub(crate) fn materialize(
        self: &Rc<Self>,
        ctx: &RenderContext<'_>,
    ) -> Result<NodeHandle, FreezeError> {
        self.prepare();
        if ctx.freeze.is_some() {
            self.frozen.set(true);
        }

        let children = self.build().map_err(FreezeError::Render)?;
        self.phase.set(Phase::Built);

        let node = MarkupNode::element(
            self.tag(),
            self.definition.resolved().class_chain.clone(),
            self.manual_styles().to_vec(),
            self.visible_attributes(),
        );
        if let Some(text) = self.text() {
            markup::append(&node, MarkupNode::text(text));
        }
        for child in &children {
            let child_node = child.materialize(ctx)?;
            markup::append(&node, child_node.clone());
            *child.node.borrow_mut() = Some(child_node);
            child.phase.set(Phase::Rendered);
        }

        // Stateless nodes are pure markup; only stateful instances under a
        // freeze get a reconstruction directive, attached last.
        if self.is_stateful() {
            if let Some(registry) = ctx.freeze {
                let directive = freeze::directive_node(&self.definition, registry)?;
                markup::append(&node, directive);
            }
        }

        Ok(node)
    }

    fn visible_attributes(&self) -> Vec<(String, String)> {
        self.attributes()
            .into_iter()
            .filter(|(name, _)| !RESERVED_ATTRIBUTES.contains(name.as_str()))
            .collect()
    }

    /// Materialize and attach. With a `target`, the node is appended under
    /// it; without one, the instance's previous node is replaced in place.
    pub fn render(
        self: &Rc<Self>,
        target: Option<&NodeHandle>,
    ) -> Result<NodeHandle, RenderError> {
        let node = self
            .materialize(&RenderContext { freeze: None })
            .map_err(|err| match err {
                FreezeError::Render(render) => render,
                // Resolution errors require a freeze context; mapped for
                // completeness.
                other => RenderError::Build {
                    definition: self.definition.name.clone(),
                    message: other.to_string(),
                },
            })?;
        self.attach(node.clone(), target);
        Ok(node)
    }

    /// Materialize and swap in for `old` at the same document position.
    /// Used by reconstruction directives to replace their anchor's host.
    pub fn render_replacing(self: &Rc<Self>, old: &NodeHandle) -> Result<NodeHandle, RenderError> {
        let node = self
            .materialize(&RenderContext { freeze: None })
            .map_err(|err| match err {
                FreezeError::Render(render) => render,
                other => RenderError::Build {
                    definition: self.definition.name.clone(),
                    message: other.to_string(),
                },
            })?;
        markup::replace(old, &node);
        *self.node.borrow_mut() = Some(node.clone());
        self.phase.set(Phase::Rendered);
        Ok(node)
    }

    fn attach(&self, node: NodeHandle, target: Option<&NodeHandle>) {
        let previous = self.node.borrow().clone();
        match target {
            Some(target) => {
                if let Some(old) = &previous {
                    markup::detach(old);
                }
                markup::append(target, node.clone());
            }
            None => {
                if let Some(old) = &previous {
                    markup::replace(old, &node);
                }
            }
        }
        *self.node.borrow_mut() = Some(node);
        self.phase.set(Phase::Rendered);
    }

    /// Apply `mutator` to the state container, then rebuild and re-render
    /// synchronously. The previous node stays attached if the rebuild fails.
    pub fn set_state<F>(self: &Rc<Self>, mutator: F) -> Result<NodeHandle, RenderError>
    where
        F: FnOnce(&mut StateMap),
    {
        self.prepare();
        {
            let mut guard = self.state.borrow_mut();
            let Some(state) = guard.as_mut() else {
                return Err(RenderError::NotStateful {
                    definition: self.definition.name.clone(),
                });
            };
            mutator(state);
        }
        self.render(None)
    }

    /// A handle suitable for wiring to external event sources.
    pub fn updater(self: &Rc<Self>) -> UpdateHandle {
        UpdateHandle {
            instance: self.clone(),
        }
    }
}

/// Callable state-update handle bound to one instance.
#[derive(Debug, Clone)]
pub struct UpdateHandle {
    instance: Rc<Instance>,
}

impl UpdateHandle {
    pub fn apply<F>(&self, mutator: F) -> Result<NodeHandle, RenderError>
    where
        F: FnOnce(&mut StateMap),
    {
        self.instance.set_state(mutator)
    }
}
