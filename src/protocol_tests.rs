//! End-to-end freeze/thaw protocol tests: full pipelines over concrete
//! component hierarchies rather than single-module behavior.

use std::rc::Rc;

use serde_json::json;

use crate::component::{instantiate, Definition, Instance, Overrides, StateMap};
use crate::directive::{schedule_tree, FrameQueue};
use crate::freeze::freeze;
use crate::markup::{self, to_html};
use crate::registry::ExportRegistry;
use crate::thaw::thaw_document;

struct Fixture {
    link: Rc<Definition>,
    counter: Rc<Definition>,
    registry: Rc<ExportRegistry>,
}

/// The reference hierarchy: Widget at the root, a stateless Link and a
/// stateful Counter (through StatefulWidget) extending it.
fn fixture() -> Fixture {
    let widget = Definition::new("Widget", "div").seal();
    let link = Definition::new("Link", "a").extends(&widget).seal();
    let stateful = Definition::new("StatefulWidget", "div")
        .extends(&widget)
        .stateful()
        .seal();
    let counter = Definition::new("Counter", "div")
        .extends(&stateful)
        .with_init_state(Rc::new(|_| {
            let mut state = StateMap::new();
            state.insert("count".to_string(), json!(0));
            state
        }))
        .with_build(Rc::new(|instance| {
            let count = instance
                .state_value("count")
                .unwrap_or(json!(0))
                .to_string();
            let label = Definition::new("Label", "span").seal();
            Ok(vec![Instance::new_unchecked(
                &label,
                Overrides {
                    text: Some(count),
                    ..Overrides::default()
                },
                vec![],
            )])
        }))
        .seal();

    let mut registry = ExportRegistry::new();
    registry.register("Widget", &widget);
    registry.register("Link", &link);
    registry.register("Counter", &counter);

    Fixture {
        link,
        counter,
        registry: Rc::new(registry),
    }
}

fn link_instance(fx: &Fixture) -> Rc<Instance> {
    instantiate(
        &fx.link,
        Overrides {
            text: Some("docs".to_string()),
            attributes: vec![("href".to_string(), "https://example.com".to_string())],
            ..Overrides::default()
        },
        vec![],
    )
    .unwrap()
}

#[test]
fn test_link_freezes_to_plain_markup() {
    let fx = fixture();
    let node = freeze(&link_instance(&fx), &fx.registry).unwrap();
    assert_eq!(
        to_html(&node),
        "<a class=\"Link Widget\" href=\"https://example.com\">docs</a>"
    );
}

#[test]
fn test_stateless_round_trip_is_lossless() {
    let fx = fixture();
    let first = to_html(&freeze(&link_instance(&fx), &fx.registry).unwrap());

    let thawed = thaw_document(&first, &fx.registry);
    assert_eq!(thawed.len(), 1);
    assert!(Rc::ptr_eq(&thawed[0].definition, &fx.link));

    let second = to_html(&freeze(&thawed[0], &fx.registry).unwrap());
    assert_eq!(first, second);
}

#[test]
fn test_counter_freeze_emits_class_chain_and_directive() {
    let fx = fixture();
    let instance = instantiate(&fx.counter, Overrides::default(), vec![]).unwrap();
    let html = to_html(&freeze(&instance, &fx.registry).unwrap());

    assert!(html.starts_with("<div class=\"Counter StatefulWidget Widget\">"));
    assert_eq!(html.matches("<script").count(), 1);
    assert!(html.contains("Counter.from(anchor.parentElement).render();"));
    assert!(html.ends_with("</script></div>"));
}

#[test]
fn test_frozen_document_round_trips_through_markup_text() {
    let fx = fixture();
    let instance = instantiate(&fx.counter, Overrides::default(), vec![]).unwrap();
    let first = to_html(&freeze(&instance, &fx.registry).unwrap());

    let thawed = thaw_document(&first, &fx.registry);
    assert_eq!(thawed.len(), 1);
    let second = to_html(&freeze(&thawed[0], &fx.registry).unwrap());
    assert_eq!(first, second);
}

#[test]
fn test_renamed_build_still_freezes_and_revives() {
    let fx = fixture();
    // An external renaming pass rewrites every identifier but leaves the
    // export graph intact.
    let mut registry = ExportRegistry::new();
    registry.register("Counter", &fx.counter);
    registry.rename("Counter", "k1");
    fx.counter.rename_static("from", "k2");
    fx.counter.rename_member("render", "k3");
    let registry = Rc::new(registry);

    let instance = instantiate(&fx.counter, Overrides::default(), vec![]).unwrap();
    let node = freeze(&instance, &registry).unwrap();
    let html = to_html(&node);
    assert!(html.contains("k1.k2(anchor.parentElement).k3();"));

    // The renamed directive still reconstructs a live counter.
    let body = markup::MarkupNode::element("body", vec![], vec![], vec![]);
    markup::append(&body, node);
    let queue = FrameQueue::new();
    schedule_tree(&body, &registry, &queue);
    assert_eq!(queue.run_frame().unwrap(), 1);
    let revived = to_html(&body.children()[0]);
    assert!(revived.contains(">0<"), "revived counter shows state: {}", revived);
    assert!(!revived.contains("<script"));
}

#[test]
fn test_revived_counter_accepts_state_updates() {
    let fx = fixture();
    let instance = instantiate(&fx.counter, Overrides::default(), vec![]).unwrap();
    let frozen_html = to_html(&freeze(&instance, &fx.registry).unwrap());

    let thawed = thaw_document(&frozen_html, &fx.registry);
    let revived = &thawed[0];
    revived.render(None).unwrap();
    revived
        .set_state(|state| {
            state.insert("count".to_string(), json!(3));
        })
        .unwrap();
    let html = to_html(&revived.rendered_node().unwrap());
    assert!(html.contains(">3<"), "update reflected: {}", html);
}

#[test]
fn test_mixed_document_thaws_each_frozen_root() {
    let fx = fixture();
    let link_html = to_html(&freeze(&link_instance(&fx), &fx.registry).unwrap());
    let counter = instantiate(&fx.counter, Overrides::default(), vec![]).unwrap();
    let counter_html = to_html(&freeze(&counter, &fx.registry).unwrap());
    let document = format!(
        "<body><header>plain</header>{}<main><p>filler</p>{}</main></body>",
        link_html, counter_html
    );

    let thawed = thaw_document(&document, &fx.registry);
    assert_eq!(thawed.len(), 2);
    assert!(Rc::ptr_eq(&thawed[0].definition, &fx.link));
    assert!(Rc::ptr_eq(&thawed[1].definition, &fx.counter));
}

#[test]
fn test_detached_fragment_is_not_reconstructed() {
    let fx = fixture();
    let instance = instantiate(&fx.counter, Overrides::default(), vec![]).unwrap();
    let node = freeze(&instance, &fx.registry).unwrap();
    let body = markup::MarkupNode::element("body", vec![], vec![], vec![]);
    markup::append(&body, node.clone());

    let queue = FrameQueue::new();
    schedule_tree(&body, &fx.registry, &queue);
    markup::detach(&node);
    queue.run_frame().unwrap();

    assert!(body.children().is_empty());
    // The detached frozen fragment keeps its directive untouched.
    assert!(node.children().last().unwrap().is_script());
}
