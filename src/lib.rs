//! Glaze: declarative component rendering with a freeze/thaw markup
//! reconstruction protocol.
//!
//! Components are immutable `Definition` templates with linear ancestry,
//! realized as configured `Instance` trees and rendered to an rc-backed
//! markup node tree. A live subtree can be *frozen*: serialized to static
//! markup in which every stateful element carries one deferred
//! reconstruction directive. Loading that markup and driving the frame queue
//! *thaws* it, rebuilding live instances in place from nothing but the
//! markup itself and the export registry.
//!
//! ## Protocol Invariants
//!
//! 1. **Frozen markup is self-describing.** Reconstruction reads only the
//!    frozen element (tag, class chain, style, attributes) and the export
//!    registry; no side-channel state survives a freeze.
//! 2. **Renaming resilience.** Every name a directive emits is computed by
//!    `registry::resolve`: a preserved symbol when one exists, otherwise an
//!    identity scan over the owning export map. A name that cannot be
//!    resolved aborts the freeze rather than emitting a broken directive.
//! 3. **Wholesale node replacement.** Rendering never patches a node in
//!    place; the previous node stays attached until its replacement is
//!    complete, so a failing build leaves the document intact.
//! 4. **Detachment is the only cancellation.** A scheduled directive whose
//!    anchor is no longer attached when its frame arrives is a silent no-op.

pub mod component;
pub mod directive;
pub mod freeze;
pub mod markup;
pub mod registry;
pub mod render;
pub mod style;
pub mod thaw;

#[cfg(test)]
mod protocol_tests;

pub use component::{
    instantiate, merge_defaults, BuildFn, ComponentError, Definition, InitStateFn, Instance,
    Overrides, ResolvedDefaults, StateMap,
};
pub use directive::{
    schedule_tree, AnchorCapability, Directive, DirectiveRefs, FrameQueue, ScriptAnchor,
};
pub use freeze::{freeze, FreezeError};
pub use markup::{MarkupNode, NodeHandle};
pub use registry::{EntryKind, EntryPoint, ExportMap, ExportRegistry, ExportValue};
pub use render::{Phase, RenderError, UpdateHandle};
pub use style::StyleDecl;
pub use thaw::thaw_document;
