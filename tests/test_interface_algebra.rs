//! Composition laws of the variable registry.

use pretty_assertions::assert_eq;
use rms::{allocate_array, allocate_scalar, Interface, RmsError, Slot};
use std::sync::Arc;

fn same_binding(a: &Interface, a_name: &str, b: &Interface, b_name: &str) -> bool {
    let (slot_a, gate_a) = a.get(a_name).unwrap();
    let (slot_b, gate_b) = b.get(b_name).unwrap();
    slot_a.same_storage(slot_b) && Arc::ptr_eq(&gate_a, &gate_b)
}

fn robot() -> Interface {
    Interface::new(vec![
        ("pose", allocate_array(&[3], "float").unwrap()),
        ("speed", allocate_scalar(0.0, "float").unwrap()),
        ("enabled", allocate_scalar(1.0, "bool").unwrap()),
    ])
}

fn camera() -> Interface {
    Interface::new(vec![
        ("frame", allocate_array(&[4, 4], "uint8").unwrap()),
        ("speed", allocate_scalar(0.0, "float").unwrap()),
    ])
}

#[test]
fn test_concat_resolves_like_inputs() {
    let a = robot();
    let b = camera();
    let c = a.concat(&b);

    for name in a.names() {
        assert!(same_binding(&c, name, &a, name), "{} should resolve to A", name);
    }
    for name in b.names().filter(|n| !a.contains(n)) {
        assert!(same_binding(&c, name, &b, name), "{} should resolve to B", name);
    }
    // the colliding name belongs to A and B's slot is unreachable by it
    assert!(same_binding(&c, "speed", &a, "speed"));
    assert!(!same_binding(&c, "speed", &b, "speed"));
    assert_eq!(c.storage_len(), a.storage_len() + b.storage_len());
}

#[test]
fn test_accumulate_equals_concat() {
    let a = robot();
    let b = camera();
    let concatenated = &a + &b;
    let mut accumulated = a.clone();
    accumulated += b;
    assert_eq!(accumulated.lookup(), concatenated.lookup());
    for name in concatenated.names() {
        assert!(same_binding(&accumulated, name, &concatenated, name));
    }
}

#[test]
fn test_wrap_then_use_is_identity() {
    let a = robot() + camera();
    let round_trip = a.wrap("ns").use_namespace("ns");
    assert_eq!(round_trip.lookup(), a.lookup());
    for name in a.names() {
        assert!(same_binding(&round_trip, name, &a, name));
    }
}

#[test]
fn test_nested_namespaces() {
    let arm = robot().wrap("arm");
    let base = robot().wrap("base");
    let world = (arm + base).wrap("world");

    assert!(world.contains("world.arm.pose"));
    assert!(world.contains("world.base.enabled"));

    let base_view = world.use_namespace("world").use_namespace("base");
    assert!(base_view.contains("pose"));
    assert!(base_view.contains("arm.pose"));
    assert!(same_binding(&base_view, "speed", &world, "world.base.speed"));
}

#[test]
fn test_use_collision_is_first_seen() {
    // "speed" is declared before "drive.speed", so it keeps the name
    let iface = Interface::new(vec![
        ("speed", Slot::scalar(1.0f64)),
        ("drive.speed", Slot::scalar(2.0f64)),
    ]);
    let used = iface.use_namespace("drive");
    assert_eq!(used.len(), 1);
    assert_eq!(used.slot("speed").unwrap().get::<f64>().unwrap(), 1.0);

    // reversed declaration order flips the winner
    let iface = Interface::new(vec![
        ("drive.speed", Slot::scalar(2.0f64)),
        ("speed", Slot::scalar(1.0f64)),
    ]);
    let used = iface.use_namespace("drive");
    assert_eq!(used.slot("speed").unwrap().get::<f64>().unwrap(), 2.0);
}

#[test]
fn test_remap_collision_is_first_seen() {
    let iface = Interface::new(vec![
        ("left", Slot::scalar(1i64)),
        ("right", Slot::scalar(2i64)),
        ("wheel", Slot::scalar(3i64)),
    ]);
    let remapped = iface.remap([("right", "wheel")]);
    // "right" claims "wheel" before the original "wheel" is visited
    assert_eq!(remapped.names().collect::<Vec<_>>(), vec!["left", "wheel"]);
    assert_eq!(remapped.slot("wheel").unwrap().get::<i64>().unwrap(), 2);
}

#[test]
fn test_composition_shares_storage() {
    let a = robot();
    let view = a.wrap("r").remap([("r.speed", "v")]);
    view.slot("v").unwrap().set(4.5f64).unwrap();
    assert_eq!(a.slot("speed").unwrap().get::<f64>().unwrap(), 4.5);
}

#[test]
fn test_lookup_errors() {
    let a = robot();
    assert!(matches!(a.slot("frame"), Err(RmsError::UnknownVariable { .. })));
    assert!(matches!(a.wrap("x").gate("pose"), Err(RmsError::UnknownVariable { .. })));
}
