//! Reconstruction directive runtime.
//!
//! A frozen stateful element carries one deferred script. At load time the
//! script becomes a `Directive`: the three resolved names, an anchor
//! capability pointing back at the script's own element, and the export
//! registry to resolve against. Directives execute on the frame queue, the
//! single cooperative scheduling boundary of the protocol.
//!
//! ## Key Invariants
//!
//! 1. **At most once.** A directive that has run, or decided not to, never
//!    runs again.
//! 2. **Detachment is the only cancellation.** A directive whose anchor no
//!    longer sits in an attached subtree when its frame arrives does nothing.
//!    There is no explicit cancel operation.
//! 3. **Stale references no-op.** A directive whose names no longer resolve
//!    in the registry is skipped silently; reconstruction must never take
//!    down the rest of the document.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::markup::NodeHandle;
use crate::registry::ExportRegistry;
use crate::render::RenderError;

/// The three names a directive needs at execution time, resolved at freeze
/// time to survive renaming.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectiveRefs {
    /// Registry key of the definition.
    pub definition_key: String,
    /// Key of the thaw entry among the definition's statics.
    pub thaw_key: String,
    /// Key of the render entry among the definition's instance members.
    pub render_key: String,
}

/// Injected anchor capability: the one piece of document context a directive
/// receives. The host is the element to reconstruct in place.
pub trait AnchorCapability {
    fn attachment_host(&self) -> Option<NodeHandle>;
}

/// The standard anchor: a directive's own script node. Its host is the
/// script's parent element, so no identifier is needed and duplicated frozen
/// fragments each anchor correctly.
pub struct ScriptAnchor {
    node: NodeHandle,
}

impl ScriptAnchor {
    pub fn new(node: NodeHandle) -> ScriptAnchor {
        ScriptAnchor { node }
    }
}

impl AnchorCapability for ScriptAnchor {
    fn attachment_host(&self) -> Option<NodeHandle> {
        self.node.parent()
    }
}

/// A scheduled reconstruction of one frozen element.
pub struct Directive {
    refs: DirectiveRefs,
    anchor: Box<dyn AnchorCapability>,
    registry: Rc<ExportRegistry>,
    executed: Cell<bool>,
}

impl Directive {
    pub fn new(
        refs: DirectiveRefs,
        anchor: Box<dyn AnchorCapability>,
        registry: Rc<ExportRegistry>,
    ) -> Rc<Directive> {
        Rc::new(Directive {
            refs,
            anchor,
            registry,
            executed: Cell::new(false),
        })
    }

    pub fn refs(&self) -> &DirectiveRefs {
        &self.refs
    }

    /// Execute the reconstruction. Detached anchors and unresolvable names
    /// are silent no-ops; only a failing rebuild is an error.
    pub fn run(&self) -> Result<(), RenderError> {
        if self.executed.replace(true) {
            return Ok(());
        }

        let Some(host) = self.anchor.attachment_host() else {
            tracing::debug!(definition = %self.refs.definition_key, "anchor detached, skipping");
            return Ok(());
        };
        if host.parent().is_none() {
            tracing::debug!(definition = %self.refs.definition_key, "host detached, skipping");
            return Ok(());
        }

        let Some(definition) = self.registry.definition(&self.refs.definition_key) else {
            tracing::debug!(key = %self.refs.definition_key, "definition not registered, skipping");
            return Ok(());
        };
        if definition.statics().get(&self.refs.thaw_key).is_none()
            || definition.members().get(&self.refs.render_key).is_none()
        {
            tracing::debug!(
                definition = %definition.name,
                "entry points no longer bound, skipping"
            );
            return Ok(());
        }

        let instance = definition.from_node(&host);
        instance.render_replacing(&host)?;
        Ok(())
    }
}

/// Cooperative frame scheduler. Directives run in scheduling order, one at a
/// time, when a frame is driven; nothing runs between frames.
#[derive(Default)]
pub struct FrameQueue {
    pending: RefCell<Vec<Rc<Directive>>>,
}

impl FrameQueue {
    pub fn new() -> FrameQueue {
        FrameQueue::default()
    }

    pub fn schedule(&self, directive: Rc<Directive>) {
        self.pending.borrow_mut().push(directive);
    }

    pub fn pending(&self) -> usize {
        self.pending.borrow().len()
    }

    /// Drain the queue in order. The first rebuild failure propagates and
    /// leaves the remaining directives pending for a later frame.
    pub fn run_frame(&self) -> Result<usize, RenderError> {
        let mut ran = 0;
        loop {
            let next = {
                let mut pending = self.pending.borrow_mut();
                if pending.is_empty() {
                    None
                } else {
                    Some(pending.remove(0))
                }
            };
            let Some(directive) = next else {
                break;
            };
            directive.run()?;
            ran += 1;
        }
        Ok(ran)
    }
}

/// Walk a loaded node tree in document order and schedule a directive for
/// every reconstruction script found.
pub fn schedule_tree(root: &NodeHandle, registry: &Rc<ExportRegistry>, queue: &FrameQueue) {
    if let Some(refs) = root.directive_refs() {
        let anchor = ScriptAnchor::new(root.clone());
        queue.schedule(Directive::new(
            refs.clone(),
            Box::new(anchor),
            registry.clone(),
        ));
        return;
    }
    for child in root.children() {
        schedule_tree(&child, registry, queue);
    }
}
