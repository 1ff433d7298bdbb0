//! Runtime tests for ember_world
//!
//! Object graph, lifecycle and message routing, exercised through the
//! public API the way a host and its script components use it.

use std::sync::Arc;

use ember_world::prelude::*;
use parking_lot::Mutex;
use serde_json::json;

type Log = Arc<Mutex<Vec<String>>>;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn new_log() -> Log {
    Arc::new(Mutex::new(Vec::new()))
}

fn entries(log: &Log) -> Vec<String> {
    log.lock().clone()
}

// ============================================================================
// Test components and messages
// ============================================================================

/// Records every lifecycle callback and every handled message
#[derive(Default)]
struct Recorder {
    label: String,
    log: Log,
}

impl Recorder {
    fn new(label: &str, log: &Log) -> Self {
        Self {
            label: label.to_string(),
            log: log.clone(),
        }
    }

    fn record(&self, event: &str) {
        self.log.lock().push(format!("{}:{}", self.label, event));
    }
}

impl Component for Recorder {
    fn initialize(&mut self, _ctx: &mut Context<'_>) {
        self.record("initialize");
    }
    fn on_activated(&mut self, _ctx: &mut Context<'_>) {
        self.record("activated");
    }
    fn on_simulation_started(&mut self, _ctx: &mut Context<'_>) {
        self.record("simulation_started");
    }
    fn on_deactivated(&mut self, _ctx: &mut Context<'_>) {
        self.record("deactivated");
    }
    fn deinitialize(&mut self, _ctx: &mut Context<'_>) {
        self.record("deinitialize");
    }
    fn tick(&mut self, _ctx: &mut Context<'_>) {
        self.record("tick");
    }
}

impl ComponentType for Recorder {
    const NAME: &'static str = "Recorder";
}

/// Only reacts to messages; used where lifecycle noise would obscure order
#[derive(Default)]
struct Listener {
    label: String,
    log: Log,
}

impl Listener {
    fn new(label: &str, log: &Log) -> Self {
        Self {
            label: label.to_string(),
            log: log.clone(),
        }
    }
}

impl Component for Listener {}

impl ComponentType for Listener {
    const NAME: &'static str = "Listener";
}

/// Derives from `Listener` for kind-of queries
#[derive(Default)]
struct LoudListener;

impl Component for LoudListener {}

impl ComponentType for LoudListener {
    const NAME: &'static str = "LoudListener";
    const BASE: Option<&'static str> = Some("Listener");
}

#[derive(Clone, Default)]
struct MsgPing {
    deliveries: u32,
}

impl MessageType for MsgPing {
    const NAME: &'static str = "MsgPing";
}

#[derive(Clone, Default)]
struct MsgTryConsume {
    consumed: bool,
}

impl MessageType for MsgTryConsume {
    const NAME: &'static str = "MsgTryConsume";

    fn is_consumed(&self) -> bool {
        self.consumed
    }

    fn set_consumed(&mut self, consumed: bool) {
        self.consumed = consumed;
    }
}

#[derive(Clone)]
struct MsgSelfDestruct;

impl MessageType for MsgSelfDestruct {
    const NAME: &'static str = "MsgSelfDestruct";
}

#[derive(Clone)]
struct MsgSpawnChild;

impl MessageType for MsgSpawnChild {
    const NAME: &'static str = "MsgSpawnChild";
}

/// Messages its own object again, `remaining` more times, then pings it
#[derive(Clone)]
struct MsgEcho {
    remaining: u32,
}

impl MessageType for MsgEcho {
    const NAME: &'static str = "MsgEcho";
}

#[derive(Clone)]
struct MsgSleep;

impl MessageType for MsgSleep {
    const NAME: &'static str = "MsgSleep";
}

fn build_registry() -> SharedRegistry {
    let mut registry = Registry::new();
    registry.register_component::<Recorder>().unwrap();
    registry.register_component::<Listener>().unwrap();
    registry.register_component::<LoudListener>().unwrap();
    registry.register_message::<MsgPing>().unwrap();
    registry.register_message::<MsgTryConsume>().unwrap();
    registry.register_message::<MsgSelfDestruct>().unwrap();
    registry.register_message::<MsgSpawnChild>().unwrap();
    registry.register_message::<MsgEcho>().unwrap();
    registry.register_message::<MsgSleep>().unwrap();
    registry.register_message_type("MsgScripted").unwrap();

    registry.register_handler::<Recorder, MsgPing, _>(|recorder, msg, _| {
        msg.deliveries += 1;
        recorder.record("ping");
    });
    registry.register_handler::<Listener, MsgPing, _>(|listener, msg, _| {
        msg.deliveries += 1;
        listener.log.lock().push(listener.label.clone());
    });
    registry.register_handler::<Listener, MsgTryConsume, _>(|listener, msg, _| {
        if !msg.consumed {
            msg.consumed = true;
            listener.log.lock().push(format!("{} consumed", listener.label));
        }
    });
    registry.register_handler::<Recorder, MsgSelfDestruct, _>(|recorder, _, ctx| {
        recorder.record("self_destruct");
        ctx.destroy_owner_deferred();
    });
    registry.register_handler::<Recorder, MsgSpawnChild, _>(|recorder, _, ctx| {
        let owner = ctx.owner();
        let child = ctx
            .create_object(ObjectDesc::named("spawned").with_parent(owner))
            .unwrap();
        // Creation is visible to the rest of the handler
        if ctx.find_child_by_name(owner, "spawned", false) == Some(child) {
            recorder.record("spawned");
        }
    });
    registry.register_handler::<Recorder, MsgEcho, _>(|recorder, msg, ctx| {
        recorder.record(&format!("echo {}", msg.remaining));
        let owner = ctx.owner();
        let delivered = match msg.remaining {
            0 => ctx.send_message(owner, &mut MsgPing::default()),
            n => ctx.send_message(owner, &mut MsgEcho { remaining: n - 1 }),
        };
        recorder.record(&format!("sent {}", delivered));
    });
    registry.register_handler::<Recorder, MsgSleep, _>(|recorder, _, ctx| {
        recorder.record("sleep");
        let owner = ctx.owner();
        ctx.set_object_active(owner, false);
    });
    registry.register_script_handler::<Listener, _>("MsgScripted", |listener, msg, _| {
        let amount = msg.payload["amount"].as_i64().unwrap_or_default();
        listener.log.lock().push(format!("{} scripted {}", listener.label, amount));
        msg.consumed = true;
    });
    registry.into_shared()
}

fn new_world() -> World {
    init_logging();
    World::with_registry(build_registry())
}

// ============================================================================
// Handles
// ============================================================================

#[test]
fn test_destroyed_handles_become_stale() {
    let mut world = new_world();
    let log = new_log();
    let a = world.create_object(ObjectDesc::named("a")).unwrap();
    let b = world.create_object(ObjectDesc::named("b")).unwrap();
    let a_component = world.add_component(a, Listener::new("a", &log)).unwrap();
    let b_component = world.add_component(b, Listener::new("b", &log)).unwrap();

    world.destroy_object_now(a);

    assert!(!world.is_valid_object(a));
    assert!(!world.is_valid_component(a_component));
    assert!(world.is_valid_object(b));
    assert!(world.is_valid_component(b_component));

    // Every operation tolerates the stale handle
    assert!(!world.send_message(a, &mut MsgPing::default()));
    assert!(!world.send_to_component(a_component, &mut MsgPing::default()));
    assert!(!world.post_message(a, MsgPing::default(), Duration::ZERO));
    assert!(!world.set_tick_interval(a_component, TickInterval::EveryFrame));
    assert_eq!(world.find_child_by_name(a, "x", true), None);
    assert_eq!(world.try_get_component::<Listener>(a), None);
    world.destroy_object_now(a);
    world.destroy_component(a_component);
    world.set_object_active(a, false);
}

#[test]
fn test_reused_slots_hand_out_distinct_handles() {
    let mut world = new_world();
    let mut seen = Vec::new();
    for _ in 0..32 {
        let object = world.create_object(ObjectDesc::named("churn")).unwrap();
        assert!(!seen.contains(&object));
        seen.push(object);
        world.destroy_object_now(object);
    }
    assert!(seen.iter().all(|&handle| !world.is_valid_object(handle)));
    assert_eq!(seen.iter().map(|h| h.index()).max(), Some(0));
}

// ============================================================================
// Dispatch
// ============================================================================

#[test]
fn test_one_handler_call_per_send() {
    let mut world = new_world();
    let log = new_log();
    let object = world.create_object(ObjectDesc::named("target")).unwrap();
    world.add_component(object, Listener::new("only", &log)).unwrap();

    let mut msg = MsgPing::default();
    assert!(world.send_message(object, &mut msg));
    assert_eq!(msg.deliveries, 1);
    assert_eq!(entries(&log), vec!["only"]);
}

#[test]
fn test_unhandled_message_has_no_effect() {
    let mut world = new_world();
    let log = new_log();
    let object = world.create_object(ObjectDesc::named("target")).unwrap();
    world.add_component(object, Listener::new("only", &log)).unwrap();

    assert!(!world.send_message(object, &mut MsgSleep));
    assert!(entries(&log).is_empty());
}

#[test]
fn test_recursive_send_is_depth_first() {
    let mut world = new_world();
    let log = new_log();
    let root = world.create_object(ObjectDesc::named("root")).unwrap();
    let c1 = world.create_object(ObjectDesc::named("c1").with_parent(root)).unwrap();
    let c1a = world.create_object(ObjectDesc::named("c1a").with_parent(c1)).unwrap();
    let c2 = world.create_object(ObjectDesc::named("c2").with_parent(root)).unwrap();
    let c2a = world.create_object(ObjectDesc::named("c2a").with_parent(c2)).unwrap();

    for (object, label) in [(root, "root"), (c1, "c1"), (c1a, "c1a"), (c2, "c2"), (c2a, "c2a")] {
        world.add_component(object, Listener::new(label, &log)).unwrap();
    }

    let mut msg = MsgPing::default();
    world.send_message_recursive(root, &mut msg);
    assert_eq!(entries(&log), vec!["root", "c1", "c1a", "c2", "c2a"]);
    assert_eq!(msg.deliveries, 5);
}

#[test]
fn test_consumed_flag_is_visible_to_caller() {
    let mut world = new_world();
    let log = new_log();
    let object = world.create_object(ObjectDesc::named("pickup")).unwrap();
    world.add_component(object, Listener::new("first", &log)).unwrap();
    world.add_component(object, Listener::new("second", &log)).unwrap();

    let mut msg = MsgTryConsume::default();
    world.send_message(object, &mut msg);
    assert!(msg.consumed);
    assert_eq!(entries(&log), vec!["first consumed"]);
}

#[test]
fn test_script_message_dispatch() {
    let mut world = new_world();
    let log = new_log();
    let object = world.create_object(ObjectDesc::named("scripted")).unwrap();
    world.add_component(object, Listener::new("npc", &log)).unwrap();

    let mut msg = ScriptMessage::new("MsgScripted").with_payload(json!({ "amount": 5 }));
    assert!(world.send_message(object, &mut msg));
    assert!(msg.consumed);
    assert_eq!(entries(&log), vec!["npc scripted 5"]);

    // A script message with an unbound name reaches nobody
    assert!(!world.send_message(object, &mut ScriptMessage::new("MsgUnknown")));
}

#[test]
fn test_derived_component_found_by_base_type() {
    let mut world = new_world();
    let object = world.create_object(ObjectDesc::named("speaker")).unwrap();
    let loud = world.add_component(object, LoudListener).unwrap();

    assert_eq!(world.try_get_component::<Listener>(object), Some(loud));
    assert_eq!(world.try_get_component_of_type(object, TypeHash::of_name("Recorder")), None);
}

#[test]
fn test_send_to_running_component_waits_for_its_handler() {
    let mut world = new_world();
    let log = new_log();
    let object = world.create_object(ObjectDesc::named("echo")).unwrap();
    world.add_component(object, Recorder::new("echo", &log)).unwrap();
    world.add_component(object, Listener::new("ear", &log)).unwrap();
    world.initialize_pending_components();
    log.lock().clear();

    assert!(world.send_message(object, &mut MsgEcho { remaining: 1 }));
    assert_eq!(
        entries(&log),
        vec![
            "echo:echo 1",
            "echo:sent true",
            "echo:echo 0",
            // The idle listener is served at once, the busy recorder afterwards
            "ear",
            "echo:sent true",
            "echo:ping",
        ]
    );
}

#[test]
fn test_base_handlers_reach_derived_kind() {
    init_logging();
    let log = new_log();
    let factory_log = log.clone();
    let mut registry = Registry::new();
    registry.register_component::<Listener>().unwrap();
    registry.register_message::<MsgPing>().unwrap();
    let megaphone = registry
        .register_component_type("Megaphone", Some("Listener"), move || {
            Box::new(Listener::new("megaphone", &factory_log))
        })
        .unwrap();
    let siren = registry
        .register_component_type("Siren", Some("Megaphone"), || Box::new(Listener::default()))
        .unwrap();
    registry.register_handler::<Listener, MsgPing, _>(|listener, msg, _| {
        msg.deliveries += 1;
        listener.log.lock().push(listener.label.clone());
    });
    let override_log = log.clone();
    registry.register_handler_raw(
        siren,
        MsgPing::HASH,
        Arc::new(move |_: &mut dyn Component, _: &mut dyn Message, _: &mut Context<'_>| {
            override_log.lock().push("siren".to_string());
            true
        }),
    );

    let mut world = World::with_registry(registry.into_shared());
    let object = world.create_object(ObjectDesc::named("stage")).unwrap();
    let component = world.create_component(object, megaphone).unwrap();
    world.create_component(object, siren).unwrap();

    let mut ping = MsgPing::default();
    assert!(world.send_message(object, &mut ping));
    assert_eq!(ping.deliveries, 1);
    assert_eq!(entries(&log), vec!["megaphone", "siren"]);
    assert_eq!(world.try_get_component::<Listener>(object), Some(component));
}

// ============================================================================
// Lifecycle
// ============================================================================

#[test]
fn test_lifecycle_order() {
    let mut world = new_world();
    let log = new_log();
    let object = world.create_object(ObjectDesc::named("actor")).unwrap();
    let component = world.add_component(object, Recorder::new("actor", &log)).unwrap();
    assert_eq!(world.component_state(component), Some(LifecycleState::Constructed));

    world.set_tick_interval(component, TickInterval::EveryFrame);
    world.post_message(object, MsgPing::default(), Duration::ZERO);
    world.advance_time(Duration::from_millis(16));
    assert_eq!(world.component_state(component), Some(LifecycleState::Activated));

    world.destroy_object_now(object);
    assert_eq!(
        entries(&log),
        vec![
            "actor:initialize",
            "actor:activated",
            "actor:simulation_started",
            "actor:tick",
            "actor:ping",
            "actor:deactivated",
            "actor:deinitialize",
        ]
    );
}

#[test]
fn test_first_message_initializes_component() {
    let mut world = new_world();
    let log = new_log();
    let object = world.create_object(ObjectDesc::named("eager")).unwrap();
    world.add_component(object, Recorder::new("eager", &log)).unwrap();

    world.send_message(object, &mut MsgPing::default());
    assert_eq!(
        entries(&log),
        vec!["eager:initialize", "eager:activated", "eager:simulation_started", "eager:ping"]
    );

    // Already initialized; the next update does not repeat it
    world.advance_time(Duration::from_millis(16));
    assert_eq!(entries(&log).len(), 4);
}

#[test]
fn test_deactivating_owner_from_handler() {
    let mut world = new_world();
    let log = new_log();
    let object = world.create_object(ObjectDesc::named("sleeper")).unwrap();
    let component = world.add_component(object, Recorder::new("sleeper", &log)).unwrap();
    world.initialize_pending_components();
    log.lock().clear();

    world.send_message(object, &mut MsgSleep);
    assert_eq!(entries(&log), vec!["sleeper:sleep", "sleeper:deactivated"]);
    assert_eq!(world.component_state(component), Some(LifecycleState::Deactivated));
    assert!(!world.send_message(object, &mut MsgPing::default()));
}

#[test]
fn test_destroy_inactive_component_skips_deactivate() {
    let mut world = new_world();
    let log = new_log();
    let object = world.create_object(ObjectDesc::named("off").with_active(false)).unwrap();
    let component = world.add_component(object, Recorder::new("off", &log)).unwrap();
    world.initialize_pending_components();

    world.destroy_component(component);
    assert_eq!(entries(&log), vec!["off:initialize", "off:deinitialize"]);
    assert!(world.object(object).unwrap().components().is_empty());
}

#[test]
fn test_clear_tears_everything_down() {
    let mut world = new_world();
    let log = new_log();
    let root = world.create_object(ObjectDesc::named("root")).unwrap();
    let child = world.create_object(ObjectDesc::named("child").with_parent(root)).unwrap();
    world.add_component(root, Recorder::new("root", &log)).unwrap();
    world.add_component(child, Recorder::new("child", &log)).unwrap();
    world.initialize_pending_components();
    log.lock().clear();

    world.clear();
    assert_eq!(world.object_count(), 0);
    assert_eq!(world.component_count(), 0);
    assert_eq!(
        entries(&log),
        vec!["child:deactivated", "child:deinitialize", "root:deactivated", "root:deinitialize"]
    );
}

// ============================================================================
// Creation and destruction from handlers
// ============================================================================

#[test]
fn test_destruction_from_handler_is_deferred() {
    let mut world = new_world();
    let log = new_log();
    let object = world.create_object(ObjectDesc::named("bomb")).unwrap();
    let component = world.add_component(object, Recorder::new("bomb", &log)).unwrap();
    world.initialize_pending_components();

    world.post_message(object, MsgSelfDestruct, Duration::ZERO);
    world.post_message(object, MsgPing::default(), Duration::ZERO);
    world.advance_time(Duration::from_millis(16));

    // The ping queued behind the destruction request still saw a live object
    let log = entries(&log);
    assert!(log.contains(&"bomb:ping".to_string()));
    assert_eq!(log.last().map(String::as_str), Some("bomb:deinitialize"));
    assert!(!world.is_valid_object(object));
    assert!(!world.is_valid_component(component));
}

#[test]
fn test_pending_delete_is_visible_until_flush() {
    let mut world = new_world();
    let log = new_log();
    let object = world.create_object(ObjectDesc::named("bomb")).unwrap();
    world.add_component(object, Recorder::new("bomb", &log)).unwrap();

    world.send_message(object, &mut MsgSelfDestruct);
    assert!(world.is_valid_object(object));
    assert!(world.object(object).unwrap().is_pending_delete());

    world.advance_time(Duration::ZERO);
    assert!(!world.is_valid_object(object));
}

#[test]
fn test_creation_from_handler_is_immediate() {
    let mut world = new_world();
    let log = new_log();
    let object = world.create_object(ObjectDesc::named("spawner")).unwrap();
    world.add_component(object, Recorder::new("spawner", &log)).unwrap();

    world.send_message(object, &mut MsgSpawnChild);
    assert!(entries(&log).contains(&"spawner:spawned".to_string()));
    assert!(world.find_child_by_name(object, "spawned", false).is_some());
}

// ============================================================================
// Global keys, broadcast and spatial queries
// ============================================================================

#[test]
fn test_global_key_collision_replaces_previous_holder() {
    let mut world = new_world();
    let first = world
        .create_object(ObjectDesc::named("first").with_global_key("Boss"))
        .unwrap();
    let second = world
        .create_object(ObjectDesc::named("second").with_global_key("Boss"))
        .unwrap();

    assert_eq!(world.try_get_object_by_global_key("Boss"), Some(second));
    assert_eq!(world.object(first).unwrap().global_key(), None);
    assert_eq!(world.object(second).unwrap().global_key(), Some("Boss"));

    // Destroying the old holder does not disturb the new mapping
    world.destroy_object_now(first);
    assert_eq!(world.try_get_object_by_global_key("Boss"), Some(second));
}

#[test]
fn test_broadcast_posted_as_event() {
    let mut world = new_world();
    let log = new_log();
    let level = world
        .create_object(ObjectDesc::named("level").as_event_root())
        .unwrap();
    let room = world.create_object(ObjectDesc::named("room").with_parent(level)).unwrap();
    let lever = world.create_object(ObjectDesc::named("lever").with_parent(room)).unwrap();
    let neighbour = world.create_object(ObjectDesc::named("neighbour").with_parent(room)).unwrap();

    for (object, label) in [(level, "level"), (room, "room"), (lever, "lever"), (neighbour, "neighbour")] {
        world.add_component(object, Listener::new(label, &log)).unwrap();
    }

    world.post_message(MessageTarget::Event(lever), MsgPing::default(), Duration::ZERO);
    world.advance_time(Duration::from_millis(16));
    assert_eq!(entries(&log), vec!["lever", "room", "level"]);
}

/// Brute-force spatial index over fixed positions
struct PointCloud(Vec<(ObjectHandle, Vec3)>);

impl SpatialQuery for PointCloud {
    fn find_in_sphere(&self, center: Vec3, radius: f32, visit: &mut dyn FnMut(ObjectHandle) -> bool) {
        for &(handle, position) in &self.0 {
            if position.distance(center) <= radius && !visit(handle) {
                return;
            }
        }
    }

    fn find_in_box(&self, min: Vec3, max: Vec3, visit: &mut dyn FnMut(ObjectHandle) -> bool) {
        for &(handle, position) in &self.0 {
            let inside = position.cmpge(min).all() && position.cmple(max).all();
            if inside && !visit(handle) {
                return;
            }
        }
    }
}

#[test]
fn test_spatial_queries_use_injected_provider() {
    let mut world = new_world();
    let positions = [Vec3::ZERO, Vec3::new(3.0, 0.0, 0.0), Vec3::new(10.0, 0.0, 0.0)];
    let mut cloud = Vec::new();
    for (i, position) in positions.into_iter().enumerate() {
        let object = world
            .create_object(ObjectDesc::named(format!("point{i}")).with_position(position))
            .unwrap();
        cloud.push((object, world.global_transform(object).unwrap().position));
    }
    let handles: Vec<ObjectHandle> = cloud.iter().map(|(h, _)| *h).collect();
    world.set_spatial_query(PointCloud(cloud));

    assert_eq!(world.collect_objects_in_sphere(Vec3::ZERO, 5.0), vec![handles[0], handles[1]]);

    world.destroy_object_now(handles[1]);
    let mut in_box = Vec::new();
    world.find_objects_in_box(Vec3::splat(-1.0), Vec3::splat(20.0), |handle| {
        in_box.push(handle);
        true
    });
    assert_eq!(in_box, vec![handles[0], handles[2]]);
}
