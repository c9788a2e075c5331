//! Integration Tests for the Field Engine
//!
//! These tests verify that fields, routes, display caches and the frame
//! clock work together correctly.

use std::cell::Cell;
use std::rc::Rc;
use std::thread;

use fieldflow_core::{
    AccessType, CacheMode, CacheOutcome, CachePolicy, CacheState, CommandList, EngineConfig,
    FieldError, FieldGraph, FieldHandle, NodeId, RenderError, RenderTarget, Scene,
};

// ----------------------------------------------------------------------------
// Test backend
// ----------------------------------------------------------------------------

#[derive(Default)]
struct Counters {
    renders: Cell<u32>,
    compiles: Cell<u32>,
    calls: Cell<u32>,
    releases: Cell<u32>,
}

struct Recorded {
    counters: Rc<Counters>,
}

impl CommandList for Recorded {
    fn call(&self) -> Result<(), RenderError> {
        self.counters.calls.set(self.counters.calls.get() + 1);
        Ok(())
    }
}

impl Drop for Recorded {
    fn drop(&mut self) {
        self.counters.releases.set(self.counters.releases.get() + 1);
    }
}

struct Target {
    counters: Rc<Counters>,
    reject: bool,
}

impl Target {
    fn new() -> Self {
        Self {
            counters: Rc::new(Counters::default()),
            reject: false,
        }
    }
}

impl RenderTarget for Target {
    fn render(&mut self, _graph: &mut FieldGraph) -> Result<(), RenderError> {
        self.counters.renders.set(self.counters.renders.get() + 1);
        Ok(())
    }

    fn compile(&mut self, _graph: &mut FieldGraph) -> Result<Box<dyn CommandList>, RenderError> {
        if self.reject {
            return Err(RenderError::Rejected("out of list memory".into()));
        }
        self.counters.compiles.set(self.counters.compiles.get() + 1);
        Ok(Box::new(Recorded {
            counters: self.counters.clone(),
        }))
    }
}

/// Advance one frame and draw through `list`.
fn frame(
    graph: &mut FieldGraph,
    list: impl FieldHandle,
    target: &mut Target,
) -> CacheOutcome {
    let now = graph.frame() as f64 + 1.0;
    graph.advance_frame(now).unwrap();
    graph.use_cache(list, target).unwrap()
}

// ----------------------------------------------------------------------------
// Propagation
// ----------------------------------------------------------------------------

/// Test that an unread field recomputes at most once however often its
/// input changes.
#[test]
fn unread_field_recomputes_once() {
    let mut graph = FieldGraph::new();
    let runs = Rc::new(Cell::new(0));
    let runs_clone = runs.clone();

    let x = graph.sfield("x", 0).build().unwrap();
    let y = graph
        .sfield("y", 0)
        .compute(move |inputs| {
            runs_clone.set(runs_clone.get() + 1);
            inputs.value::<i32>(0).copied().unwrap_or(0) + 1
        })
        .build()
        .unwrap();
    let z = graph
        .sfield("z", 0)
        .compute(|inputs| inputs.value::<i32>(0).copied().unwrap_or(0) * 10)
        .build()
        .unwrap();
    graph.route(x, y).unwrap();
    graph.route(y, z).unwrap();

    for v in 0..100 {
        graph.set_value(x, v).unwrap();
    }
    assert_eq!(runs.get(), 0);
    assert_eq!(graph.get(z).unwrap(), 1000);
    assert_eq!(runs.get(), 1);
}

/// Index of the first true input, or -1.
fn first_true(xs: &[&bool]) -> i32 {
    xs.iter().position(|x| **x).map(|i| i as i32).unwrap_or(-1)
}

/// Test that a fan-in sees its sources in connection order.
#[test]
fn fan_in_order_follows_connection_order() {
    let mut graph = FieldGraph::new();
    let a = graph.sfield("a", false).build().unwrap();
    let b = graph.sfield("b", true).build().unwrap();
    let c = graph.sfield("c", true).build().unwrap();

    let abc = graph.fan_in("abc", -1, first_true).build().unwrap();
    for src in [a, b, c] {
        graph.route(src, abc).unwrap();
    }
    assert_eq!(graph.get(abc).unwrap(), 1);

    let cba = graph.fan_in("cba", -1, first_true).build().unwrap();
    for src in [c, b, a] {
        graph.route(src, cba).unwrap();
    }
    assert_eq!(graph.get(cba).unwrap(), 0);

    graph.set_value(b, false).unwrap();
    assert_eq!(graph.get(abc).unwrap(), 2);
}

/// Test that a silent route never makes its destination stale, while a
/// read of the destination still reflects the source.
#[test]
fn silent_route_seeds_without_events() {
    let mut graph = FieldGraph::new();
    let trigger = graph.sfield("trigger", 0).build().unwrap();
    let seed = graph.sfield("seed", 1).build().unwrap();
    let sum = graph
        .sfield("sum", 0)
        .compute(|inputs| inputs.values::<i32>().sum())
        .build()
        .unwrap();
    graph.route(trigger, sum).unwrap();
    graph.route_no_event(seed, sum).unwrap();
    assert_eq!(graph.get(sum).unwrap(), 1);

    graph.set_value(seed, 5).unwrap();
    assert!(graph.is_up_to_date(sum).unwrap());
    assert_eq!(graph.get(sum).unwrap(), 5);

    graph.set_value(trigger, 2).unwrap();
    assert!(!graph.is_up_to_date(sum).unwrap());
    assert_eq!(graph.get(sum).unwrap(), 7);
}

/// Test that a plain field behind a silent route takes the source's value
/// on read, including a source that is itself computed lazily.
#[test]
fn silent_route_into_plain_field() {
    let mut graph = FieldGraph::new();
    let seed = graph.sfield("seed", 0).build().unwrap();
    let plain = graph.sfield("plain", -1).build().unwrap();
    graph.route_no_event(seed, plain).unwrap();
    assert!(graph.is_up_to_date(plain).unwrap());
    assert_eq!(graph.get(plain).unwrap(), 0);

    graph.set_value(seed, 7).unwrap();
    assert!(graph.is_up_to_date(plain).unwrap());
    assert_eq!(graph.get(plain).unwrap(), 7);

    let base = graph.sfield("base", 1).build().unwrap();
    let doubled = graph
        .sfield("doubled", 0)
        .compute(|inputs| inputs.value::<i32>(0).copied().unwrap_or(0) * 2)
        .build()
        .unwrap();
    let view = graph.sfield("view", 0).build().unwrap();
    graph.route(base, doubled).unwrap();
    graph.route_no_event(doubled, view).unwrap();

    graph.set_value(base, 3).unwrap();
    assert!(graph.is_up_to_date(view).unwrap());
    assert_eq!(graph.get(view).unwrap(), 6);

    // Once unrouted, the source no longer reaches it.
    graph.unroute(doubled, view).unwrap();
    graph.set_value(base, 4).unwrap();
    assert_eq!(graph.get(view).unwrap(), 6);
}

/// Test that every write propagates, even an unchanged value.
#[test]
fn same_value_write_still_propagates() {
    let mut graph = FieldGraph::new();
    let x = graph.sfield("x", 1).build().unwrap();
    let y = graph.sfield("y", 0).build().unwrap();
    graph.route(x, y).unwrap();
    graph.get(y).unwrap();

    graph.set_value(x, 1).unwrap();
    assert!(!graph.is_up_to_date(y).unwrap());
}

/// Test that a mis-wired route fails when it is made and leaves no trace.
#[test]
fn wiring_errors_fail_fast() {
    let mut graph = FieldGraph::new();
    let flag = graph.sfield("flag", true).build().unwrap();
    let points = graph.mfield("points", vec![0.0_f32]).build().unwrap();

    let err = graph.route(flag, points).unwrap_err();
    assert!(matches!(err, FieldError::TypeMismatch { .. }));
    assert!(graph.routes_out(flag).unwrap().is_empty());

    graph.remove_field(points).unwrap();
    assert!(matches!(
        graph.route(flag, points),
        Err(FieldError::UnknownField(_))
    ));
}

// ----------------------------------------------------------------------------
// Nodes
// ----------------------------------------------------------------------------

/// Test that destroying a routed node leaves no dangling routes behind.
#[test]
fn node_teardown_leaves_no_dangling_routes() {
    let mut graph = FieldGraph::new();
    let outside_in = graph.sfield("in", 0).build().unwrap();
    let outside_out = graph.sfield("out", 0).build().unwrap();
    let group = graph.mfield("children", Vec::<NodeId>::new()).build().unwrap();

    let node = graph.create_node("Transform");
    let translation = graph.sfield("translation", 0).owner(node).build().unwrap();
    let matrix = graph
        .sfield("matrix", 0)
        .owner(node)
        .access(AccessType::Output)
        .build()
        .unwrap();
    let list = graph.create_display_list("displayList", Some(node)).unwrap();
    graph.push(group, node).unwrap();

    graph.route(outside_in, translation).unwrap();
    graph.route_as(node, translation, matrix).unwrap();
    graph.route(matrix, outside_out).unwrap();
    graph.route(translation, list).unwrap();

    graph.destroy_node(node).unwrap();

    for id in [translation.id(), matrix.id(), list.id(), list.probe().id()] {
        assert!(!graph.contains(id));
    }
    assert!(graph.routes_out(outside_in).unwrap().is_empty());
    assert!(graph.routes_in(outside_out).unwrap().is_empty());
    assert!(graph.routes_out(graph.time()).unwrap().is_empty());
    graph.validate().unwrap();

    // Reading what depended on the destroyed node is still safe.
    graph.get(outside_out).unwrap();
}

// ----------------------------------------------------------------------------
// Display caches
// ----------------------------------------------------------------------------

/// Test that a valid cache used many times in one frame builds nothing and
/// counts one activation.
#[test]
fn repeated_use_is_idempotent() {
    let mut graph = FieldGraph::new();
    let list = graph.create_display_list("shape", None).unwrap();
    let mut target = Target::new();

    assert_eq!(frame(&mut graph, list, &mut target), CacheOutcome::Rebuilt);
    for _ in 0..5 {
        assert_eq!(graph.use_cache(list, &mut target).unwrap(), CacheOutcome::Cached);
    }

    let stats = graph.cache_stats(list).unwrap();
    assert_eq!(stats.builds, 1);
    assert_eq!(stats.activations, 1);
    assert_eq!(target.counters.compiles.get(), 1);
    assert_eq!(target.counters.calls.get(), 6);
    assert_eq!(target.counters.renders.get(), 0);
}

/// Test the debounce: invalidations keep the cache uncached until it has
/// seen the configured number of quiet frames.
#[test]
fn debounce_waits_for_quiet_frames() {
    let mut graph = FieldGraph::new();
    let color = graph.sfield("color", 0).build().unwrap();
    let list = graph.create_display_list("shape", None).unwrap();
    graph.set_debounce_frames(list, 3).unwrap();
    let mut target = Target::new();
    assert_eq!(frame(&mut graph, list, &mut target), CacheOutcome::Rebuilt);
    graph.route(color, list).unwrap();

    // Three frames that each change the input.
    for v in 1..=3 {
        graph.advance_frame(graph.frame() as f64 + 1.0).unwrap();
        graph.set_value(color, v).unwrap();
        assert_eq!(graph.use_cache(list, &mut target).unwrap(), CacheOutcome::Uncached);
        assert_eq!(graph.cache_state(list).unwrap(), CacheState::Stale);
    }

    // One or two quiet frames are not enough.
    assert_eq!(frame(&mut graph, list, &mut target), CacheOutcome::Uncached);
    assert_eq!(frame(&mut graph, list, &mut target), CacheOutcome::Uncached);
    // The third quiet frame rebuilds, exactly once.
    assert_eq!(frame(&mut graph, list, &mut target), CacheOutcome::Rebuilt);
    assert_eq!(frame(&mut graph, list, &mut target), CacheOutcome::Cached);
    assert_eq!(graph.cache_stats(list).unwrap().builds, 2);
    assert_eq!(target.counters.compiles.get(), 2);
}

/// Test that every invalidation releases the previous list exactly once.
#[test]
fn lists_are_released_exactly_once() {
    let mut graph = FieldGraph::new();
    let size = graph.sfield("size", 1.0).build().unwrap();
    let list = graph.create_display_list("box", None).unwrap();
    graph.set_debounce_frames(list, 0).unwrap();
    graph.route(size, list).unwrap();
    let mut target = Target::new();

    for v in 0..4 {
        assert_eq!(frame(&mut graph, list, &mut target), CacheOutcome::Rebuilt);
        graph.set_value(size, v as f64).unwrap();
        graph.set_value(size, v as f64 + 0.5).unwrap();
    }
    assert_eq!(target.counters.releases.get(), 4);

    frame(&mut graph, list, &mut target);
    graph.remove_field(list).unwrap();
    assert_eq!(target.counters.releases.get(), 5);
}

/// Test the full path from a source field through a computed field into a
/// cache with a two-frame debounce.
#[test]
fn end_to_end_source_to_cache() {
    let mut graph = FieldGraph::new();
    let x = graph.sfield("x", 0).build().unwrap();
    let y = graph
        .sfield("y", 0)
        .compute(|inputs| inputs.value::<i32>(0).copied().unwrap_or(0) * 2)
        .build()
        .unwrap();
    let z = graph.create_display_list("z", None).unwrap();
    graph.set_debounce_frames(z, 2).unwrap();
    graph.route(x, y).unwrap();
    graph.route(y, z).unwrap();
    let mut target = Target::new();

    graph.set_value(x, 1).unwrap();
    assert!(!graph.is_up_to_date(y).unwrap());
    assert_eq!(graph.get(y).unwrap(), 2);
    assert_eq!(graph.cache_state(z).unwrap(), CacheState::Stale);

    assert_eq!(frame(&mut graph, z, &mut target), CacheOutcome::Uncached);
    assert_eq!(graph.cache_stats(z).unwrap().counter, 1);

    assert_eq!(frame(&mut graph, z, &mut target), CacheOutcome::Rebuilt);
    assert!(graph.caused_by(z, y).unwrap());
    assert!(!graph.caused_by(z, x).unwrap());
    assert_eq!(graph.cache_state(z).unwrap(), CacheState::Valid);

    graph.set_value(x, 1).unwrap();
    assert_eq!(graph.cache_state(z).unwrap(), CacheState::Stale);
    assert_eq!(graph.cache_stats(z).unwrap().counter, 2);
}

/// Test that a backend failure falls back to drawing uncached and waits out
/// the debounce before retrying.
#[test]
fn build_failure_falls_back_to_uncached() {
    let mut graph = FieldGraph::new();
    let list = graph.create_display_list("nurbs", None).unwrap();
    graph.set_debounce_frames(list, 2).unwrap();
    let mut target = Target::new();
    target.reject = true;

    assert_eq!(frame(&mut graph, list, &mut target), CacheOutcome::Uncached);
    assert_eq!(graph.cache_state(list).unwrap(), CacheState::Empty);
    assert_eq!(graph.cache_stats(list).unwrap().failures, 1);
    assert_eq!(target.counters.renders.get(), 1);

    target.reject = false;
    assert_eq!(frame(&mut graph, list, &mut target), CacheOutcome::Uncached);
    assert_eq!(frame(&mut graph, list, &mut target), CacheOutcome::Rebuilt);
}

/// Test that the activity probe reports use since the previous tick and
/// that dormant lists can be released.
#[test]
fn activity_probe_and_dormant_release() {
    let mut graph = FieldGraph::new();
    let list = graph.create_display_list("shape", None).unwrap();
    let mut target = Target::new();

    assert!(!graph.is_active(list).unwrap());
    frame(&mut graph, list, &mut target);
    assert!(graph.is_active(list).unwrap());

    graph.advance_frame(10.0).unwrap();
    assert!(graph.is_active(list).unwrap());
    assert_eq!(graph.release_dormant_caches(), 0);

    graph.advance_frame(11.0).unwrap();
    let probe = graph.activity_probe(list).unwrap();
    assert!(!graph.get(probe).unwrap());
    assert_eq!(graph.release_dormant_caches(), 1);
    assert_eq!(graph.cache_state(list).unwrap(), CacheState::Empty);
    assert_eq!(target.counters.releases.get(), 1);
}

/// Test that the break-all broadcast reaches every cache.
#[test]
fn break_all_caches_invalidates_everything() {
    let mut graph = FieldGraph::new();
    let a = graph.create_display_list("a", None).unwrap();
    let b = graph.create_display_list("b", None).unwrap();
    let mut target = Target::new();
    frame(&mut graph, a, &mut target);
    graph.use_cache(b, &mut target).unwrap();

    graph.break_all_caches();
    for list in [a, b] {
        assert_eq!(graph.cache_state(list).unwrap(), CacheState::Stale);
    }

    graph.set_cache_policy(CachePolicy {
        caching: false,
        delay: 0,
    });
    assert_eq!(frame(&mut graph, a, &mut target), CacheOutcome::Uncached);
    graph.set_cache_mode(b, CacheMode::On).unwrap();
    assert_eq!(graph.use_cache(b, &mut target).unwrap(), CacheOutcome::Rebuilt);
}

/// Test that a parent cache waits for an active child cache to become
/// valid, including children reached through node references.
#[test]
fn parent_waits_for_children() {
    let mut graph = FieldGraph::new();
    let child_node = graph.create_node("Shape");
    let child = graph.create_display_list("shape", Some(child_node)).unwrap();
    graph.set_debounce_frames(child, 2).unwrap();
    let geometry = graph.sfield("geometry", 0).owner(child_node).build().unwrap();
    graph.route(geometry, child).unwrap();

    let children = graph.mfield("children", vec![child_node]).build().unwrap();
    let parent = graph.create_display_list("group", None).unwrap();
    graph.set_debounce_frames(parent, 0).unwrap();
    graph.route(children, parent).unwrap();
    let mut target = Target::new();

    // The child is stale and in use: the parent cannot record it yet.
    assert_eq!(frame(&mut graph, child, &mut target), CacheOutcome::Uncached);
    assert_eq!(graph.use_cache(parent, &mut target).unwrap(), CacheOutcome::Uncached);

    assert_eq!(frame(&mut graph, child, &mut target), CacheOutcome::Rebuilt);
    assert_eq!(graph.use_cache(parent, &mut target).unwrap(), CacheOutcome::Rebuilt);
}

/// Test that a cache fed along two branches of one change records both.
#[test]
fn cache_records_every_branch_as_cause() {
    let mut graph = FieldGraph::new();
    let mut target = Target::new();
    let a = graph.sfield("a", 0).build().unwrap();
    let b = graph.sfield("b", 0).build().unwrap();
    let c = graph.sfield("c", 0).build().unwrap();
    let list = graph.create_display_list("shape", None).unwrap();
    graph.route(a, b).unwrap();
    graph.route(a, c).unwrap();
    graph.route(b, list).unwrap();
    graph.route(c, list).unwrap();
    graph.set_debounce_frames(list, 0).unwrap();
    assert_eq!(frame(&mut graph, list, &mut target), CacheOutcome::Rebuilt);

    graph.set_value(a, 1).unwrap();
    assert_eq!(graph.cache_state(list).unwrap(), CacheState::Stale);
    assert!(graph.caused_by(list, b).unwrap());
    assert!(graph.caused_by(list, c).unwrap());
    assert!(!graph.caused_by(list, a).unwrap());
}

/// Test that a forced invalidation records the cache itself as the cause.
#[test]
fn invalidate_forces_stale() {
    let mut graph = FieldGraph::new();
    let list = graph.create_display_list("text", None).unwrap();
    let mut target = Target::new();
    frame(&mut graph, list, &mut target);

    graph.invalidate(list).unwrap();
    assert_eq!(graph.cache_state(list).unwrap(), CacheState::Stale);
    assert!(graph.caused_by(list, list).unwrap());
    assert!(graph.invalidate(graph.time()).is_err());
}

// ----------------------------------------------------------------------------
// Scene
// ----------------------------------------------------------------------------

/// Test that worker threads only reach the graph through shared fields.
#[test]
fn worker_values_enter_on_tick() {
    let mut scene = Scene::new();
    let graph = scene.graph_mut();
    let node = graph.create_node("Device");
    let position = graph
        .sfield("position", 0.0)
        .owner(node)
        .access(AccessType::Output)
        .build()
        .unwrap();
    let shared = scene.share(position).unwrap();

    let handles: Vec<_> = (1..=4)
        .map(|i| {
            let shared = shared.clone();
            thread::spawn(move || shared.set(i as f64))
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    assert!(shared.has_pending());
    assert_eq!(scene.graph_mut().get(position).unwrap(), 0.0);

    let report = scene.tick(0.016).unwrap();
    assert_eq!(report.transferred, 1);
    let value = scene.graph_mut().get(position).unwrap();
    assert!((1.0..=4.0).contains(&value));
    assert_eq!(shared.get(), value);
}

/// Test that the engine config reaches the graph.
#[test]
fn config_controls_checks_and_caching() {
    let config = EngineConfig::from_json_str(
        r#"{ "caching": false, "cacheDelay": 1, "accessChecks": false }"#,
    )
    .unwrap();
    let mut scene = Scene::with_config(config);
    let graph = scene.graph_mut();
    assert_eq!(
        graph.cache_policy(),
        CachePolicy {
            caching: false,
            delay: 1
        }
    );

    let node = graph.create_node("Sensor");
    let out = graph
        .sfield("value", 0)
        .owner(node)
        .access(AccessType::Output)
        .build()
        .unwrap();
    graph.set_value(out, 3).unwrap();

    let list = graph.create_display_list("shape", None).unwrap();
    let mut target = Target::new();
    assert_eq!(graph.use_cache(list, &mut target).unwrap(), CacheOutcome::Uncached);
    assert_eq!(target.counters.compiles.get(), 0);
}
