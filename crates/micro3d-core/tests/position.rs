use micro3d_core::{Axis, Position};

#[test]
fn test_serde_round_trip() {
    let p = Position::new(103.0, 150.0, 10.0);
    let json = serde_json::to_string(&p).unwrap();
    assert_eq!(json, r#"{"x":103.0,"y":150.0,"z":10.0}"#);
    let back: Position = serde_json::from_str(&json).unwrap();
    assert_eq!(back, p);
}

#[test]
fn test_steps_accumulate_without_drift_in_wire_format() {
    let mut p = Position::new(0.0, 0.0, 0.0);
    for _ in 0..10 {
        p = p.offset(Axis::X, 0.1);
    }
    for _ in 0..10 {
        p = p.offset(Axis::X, -0.1);
    }
    // Floating point leaves a tiny residue; the wire format must not show it.
    assert!(p.x.abs() < 1e-9);
    assert_eq!(p.to_gcode(), "G1 X0.00 Y0.00 Z0.00");
}

#[test]
fn test_distance() {
    let a = Position::new(0.0, 0.0, 0.0);
    let b = Position::new(3.0, 4.0, 0.0);
    assert!((a.distance_to(&b) - 5.0).abs() < 1e-12);
}
