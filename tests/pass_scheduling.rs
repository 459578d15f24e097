use std::cell::RefCell;
use std::rc::Rc;

use shader_forge::{
    DeferredPasses, OffscreenRenderPass, PassGraph, PassState, build_pass_graph,
    load_graph_from_str,
};

#[test]
fn chain_schedules_in_dependency_order() {
    let mut graph = PassGraph::new();
    let a = graph.add_pass(OffscreenRenderPass::new("a", 128, 128));
    let b = graph.add_pass(OffscreenRenderPass::new("b", 128, 128));
    let c = graph.add_pass(OffscreenRenderPass::new("c", 128, 128));
    graph.depends_on(b, a).unwrap();
    graph.depends_on(c, b).unwrap();

    let order = graph.execution_order();
    let pos = |id| order.iter().position(|o| *o == id).unwrap();
    assert!(pos(a) < pos(b));
    assert!(pos(b) < pos(c));
}

#[test]
fn document_cycle_fails_before_any_execution_attempt() {
    let doc = load_graph_from_str(
        r#"{
            "version": "1.0",
            "metadata": { "name": "cyclic" },
            "nodes": [ { "id": "out", "type": "OutputColor" } ],
            "passes": [
                { "id": "irradiance", "width": 64, "height": 64, "dependsOn": ["reflection"] },
                { "id": "reflection", "width": 64, "height": 64, "dependsOn": ["irradiance"] }
            ]
        }"#,
    )
    .unwrap();

    let err = build_pass_graph(&doc).unwrap_err();
    assert!(err.to_string().contains("cycle detected in pass dependencies"));
}

#[test]
fn independent_chains_both_precede_their_consumer() {
    let doc = load_graph_from_str(
        r#"{
            "version": "1.0",
            "metadata": { "name": "deferred" },
            "nodes": [ { "id": "out", "type": "OutputColor" } ],
            "passes": [
                { "id": "shadow", "width": 2048, "height": 2048 },
                { "id": "material", "width": 1280, "height": 720 },
                { "id": "lighting", "width": 1280, "height": 720, "dependsOn": ["material", "shadow"] }
            ]
        }"#,
    )
    .unwrap();

    let graph = build_pass_graph(&doc).unwrap();
    let order: Vec<String> = graph
        .execution_order()
        .into_iter()
        .map(|id| graph.pass(id).unwrap().name().to_string())
        .collect();
    let pos = |name: &str| order.iter().position(|n| n == name).unwrap();
    assert!(pos("material") < pos("lighting"));
    assert!(pos("shadow") < pos("lighting"));
}

#[test]
fn group_toggle_cascades_and_fires_callbacks_once() {
    let mut graph = PassGraph::new();
    let mut group = DeferredPasses::new(&mut graph, 1920, 1080).unwrap();

    let deactivations: Rc<RefCell<Vec<&'static str>>> = Rc::new(RefCell::new(Vec::new()));
    let first = deactivations.clone();
    group.on_deactivate(move || first.borrow_mut().push("release-targets"));
    let second = deactivations.clone();
    group.on_deactivate(move || second.borrow_mut().push("notify-scene"));

    group.set_enabled(&mut graph, true);
    for id in group.member_passes() {
        assert_eq!(graph.pass(id).unwrap().state(), PassState::Active);
    }

    group.set_enabled(&mut graph, false);
    for id in group.member_passes() {
        assert_eq!(graph.pass(id).unwrap().state(), PassState::Disabled);
    }
    assert_eq!(*deactivations.borrow(), vec!["release-targets", "notify-scene"]);

    // A redundant disable is a no-op for passes and observers alike.
    group.set_enabled(&mut graph, false);
    assert_eq!(deactivations.borrow().len(), 2);
}

#[test]
fn resize_ignores_non_positive_dimensions() {
    let mut graph = PassGraph::new();
    let group = DeferredPasses::new(&mut graph, 800, 600).unwrap();

    group.check_size(&mut graph, 0, 600);
    group.check_size(&mut graph, 800, -600);
    for id in group.member_passes() {
        assert_eq!(graph.pass(id).unwrap().size(), [800, 600]);
    }

    group.check_size(&mut graph, 640, 480);
    for id in group.member_passes() {
        assert_eq!(graph.pass(id).unwrap().size(), [640, 480]);
    }
}

#[test]
fn teardown_requires_disable_first() {
    let mut graph = PassGraph::new();
    let bloom = graph.add_pass(OffscreenRenderPass::new("bloom", 640, 360));
    graph.pass_mut(bloom).unwrap().enable();

    let err = graph.remove_pass(bloom).unwrap_err();
    assert!(err.to_string().contains("must be disabled"));

    graph.pass_mut(bloom).unwrap().disable();
    graph.remove_pass(bloom).unwrap();
    assert!(graph.pass(bloom).is_none());
}
