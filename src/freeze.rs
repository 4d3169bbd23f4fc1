//! Freeze encoder: serialize a live component subtree to static markup plus
//! the reconstruction directives that revive its stateful parts.
//!
//! A freeze renders the exact node tree a normal render would produce, and
//! for every stateful instance appends one deferred script as the element's
//! last child. The script re-obtains the definition and its entry points by
//! name at execution time, so the emitted names must survive an external
//! renaming pass; they are computed through `registry::resolve` and a
//! resolution failure aborts the whole freeze. Emitting a directive that
//! could throw a reference error at load time is never acceptable.
//!
//! Directive anchor contract: the script addresses its own element via
//! `document.currentScript` and reconstructs from its parent element, so it
//! needs no identifier of its own and survives duplication of the frozen
//! fragment.

use std::rc::Rc;

use crate::component::{Definition, Instance};
use crate::directive::DirectiveRefs;
use crate::markup::{MarkupNode, NodeHandle};
use crate::registry::{self, ExportRegistry};
use crate::render::{RenderContext, RenderError};

/// Failures of the freeze path. `Resolution` means a name needed by a
/// directive could not be computed; nothing is emitted in that case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FreezeError {
    Resolution {
        definition: String,
        member: &'static str,
    },
    Render(RenderError),
}

impl std::fmt::Display for FreezeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FreezeError::Resolution { definition, member } => {
                write!(
                    f,
                    "cannot resolve the {} reference of '{}' for directive emission",
                    member, definition
                )
            }
            FreezeError::Render(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for FreezeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FreezeError::Render(err) => Some(err),
            FreezeError::Resolution { .. } => None,
        }
    }
}

impl From<RenderError> for FreezeError {
    fn from(err: RenderError) -> Self {
        FreezeError::Render(err)
    }
}

/// Freeze `instance`: render it with the freeze marker set, resolving every
/// directive reference against `registry`. Returns the root of the frozen
/// node tree; serialize it with `markup::to_html`.
pub fn freeze(
    instance: &Rc<Instance>,
    registry: &ExportRegistry,
) -> Result<NodeHandle, FreezeError> {
    let node = instance.materialize(&RenderContext {
        freeze: Some(registry),
    })?;
    *instance.node.borrow_mut() = Some(node.clone());
    instance.phase.set(crate::render::Phase::Rendered);
    Ok(node)
}

/// Resolve the three names a reconstruction directive needs: the definition's
/// registry key, its thaw entry among its statics, and its render entry among
/// its instance members. Each resolution is independent; any `None` is a hard
/// failure.
pub fn resolve_references(
    definition: &Rc<Definition>,
    registry: &ExportRegistry,
) -> Result<DirectiveRefs, FreezeError> {
    let definition_key = registry::resolve(
        registry.exports(),
        &registry::ExportValue::Definition(definition.clone()),
    )
    .ok_or(FreezeError::Resolution {
        definition: definition.name.clone(),
        member: "definition",
    })?;

    let thaw_key = registry::resolve(&definition.statics(), &definition.thaw_entry()).ok_or(
        FreezeError::Resolution {
            definition: definition.name.clone(),
            member: "thaw entry",
        },
    )?;

    let render_key = registry::resolve(&definition.members(), &definition.render_entry()).ok_or(
        FreezeError::Resolution {
            definition: definition.name.clone(),
            member: "render entry",
        },
    )?;

    Ok(DirectiveRefs {
        definition_key,
        thaw_key,
        render_key,
    })
}

/// The self-invoking reconstruction program. It captures its own script
/// element immediately (the only moment `document.currentScript` points at
/// it), then defers the actual reconstruction to a frame callback.
pub fn directive_script(refs: &DirectiveRefs) -> String {
    format!(
        "const anchor=document.currentScript;requestAnimationFrame(()=>{{{}.{}(anchor.parentElement).{}();}});",
        refs.definition_key, refs.thaw_key, refs.render_key
    )
}

/// Build the deferred directive script node for one stateful definition.
pub(crate) fn directive_node(
    definition: &Rc<Definition>,
    registry: &ExportRegistry,
) -> Result<NodeHandle, FreezeError> {
    let refs = resolve_references(definition, registry)?;
    let code = directive_script(&refs);
    Ok(MarkupNode::script(code, true, Some(refs)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{instantiate, Overrides, StateMap};
    use crate::markup;
    use serde_json::json;

    fn widget() -> Rc<Definition> {
        Definition::new("Widget", "div").seal()
    }

    fn counter(widget: &Rc<Definition>) -> Rc<Definition> {
        let stateful = Definition::new("StatefulWidget", "div")
            .extends(widget)
            .stateful()
            .seal();
        Definition::new("Counter", "div")
            .extends(&stateful)
            .with_init_state(Rc::new(|_| {
                let mut state = StateMap::new();
                state.insert("count".to_string(), json!(0));
                state
            }))
            .seal()
    }

    #[test]
    fn test_stateless_freeze_matches_plain_render() {
        let widget = widget();
        let mut registry = ExportRegistry::new();
        registry.register("Widget", &widget);

        let frozen = instantiate(&widget, Overrides::default(), vec![]).unwrap();
        let plain = instantiate(&widget, Overrides::default(), vec![]).unwrap();
        let frozen_html = markup::to_html(&freeze(&frozen, &registry).unwrap());
        let plain_html = markup::to_html(&plain.render(None).unwrap());
        assert_eq!(frozen_html, plain_html);
        assert!(!frozen_html.contains("<script"));
    }

    #[test]
    fn test_stateful_freeze_appends_one_directive_last() {
        let widget = widget();
        let counter = counter(&widget);
        let mut registry = ExportRegistry::new();
        registry.register("Counter", &counter);

        let instance = instantiate(&counter, Overrides::default(), vec![]).unwrap();
        let node = freeze(&instance, &registry).unwrap();

        let scripts: Vec<_> = node
            .children()
            .into_iter()
            .filter(|child| child.is_script())
            .collect();
        assert_eq!(scripts.len(), 1);
        assert!(node.children().last().unwrap().is_script());
        assert!(instance.is_frozen());
    }

    #[test]
    fn test_directive_script_text_before_rename() {
        let widget = widget();
        let counter = counter(&widget);
        let mut registry = ExportRegistry::new();
        registry.register("Counter", &counter);

        let refs = resolve_references(&counter, &registry).unwrap();
        assert_eq!(
            directive_script(&refs),
            "const anchor=document.currentScript;\
             requestAnimationFrame(()=>{Counter.from(anchor.parentElement).render();});"
        );
    }

    #[test]
    fn test_directive_references_survive_renaming() {
        let widget = widget();
        let counter = counter(&widget);
        let mut registry = ExportRegistry::new();
        registry.register("Counter", &counter);

        registry.rename("Counter", "k1");
        counter.rename_static("from", "k2");
        counter.rename_member("render", "k3");

        let refs = resolve_references(&counter, &registry).unwrap();
        assert_eq!(refs.definition_key, "k1");
        assert_eq!(refs.thaw_key, "k2");
        assert_eq!(refs.render_key, "k3");
        // The renamed key still reaches the same definition.
        assert!(Rc::ptr_eq(&registry.definition("k1").unwrap(), &counter));
    }

    #[test]
    fn test_unregistered_definition_fails_resolution() {
        let widget = widget();
        let counter = counter(&widget);
        let registry = ExportRegistry::new();

        let instance = instantiate(&counter, Overrides::default(), vec![]).unwrap();
        let err = freeze(&instance, &registry).unwrap_err();
        assert_eq!(
            err,
            FreezeError::Resolution {
                definition: "Counter".to_string(),
                member: "definition",
            }
        );
    }

    #[test]
    fn test_nested_stateful_children_each_get_a_directive() {
        let widget = widget();
        let counter = counter(&widget);
        let mut registry = ExportRegistry::new();
        registry.register("Counter", &counter);

        let child = instantiate(&counter, Overrides::default(), vec![]).unwrap();
        let parent = instantiate(&widget, Overrides::default(), vec![child]).unwrap();
        let node = freeze(&parent, &registry).unwrap();

        // The stateless parent has no directive; its stateful child has one.
        assert!(!node.children().iter().any(|c| c.is_script()));
        let child_node = &node.children()[0];
        assert!(child_node.children().last().unwrap().is_script());
    }
}
