use crate::flow::weighted_round_robin;
use crate::net::NodeId;
use crate::sfc::{SCHEDULE_TOLERANCE, Schedule};
use std::collections::BTreeMap;

#[test]
fn normalize_scales_vectors_to_one() {
    let mut s = Schedule::new();
    s.set(NodeId(0), "sfc", "a", NodeId(1), 2.0);
    s.set(NodeId(0), "sfc", "a", NodeId(2), 6.0);
    assert!(s.validate(SCHEDULE_TOLERANCE).is_err());

    s.normalize();
    let w = s.weights(NodeId(0), "sfc", "a").expect("weights");
    assert!((w[&NodeId(1)] - 0.25).abs() < 1e-12);
    assert!((w[&NodeId(2)] - 0.75).abs() < 1e-12);
    assert!(s.validate(1e-9).is_ok());
}

#[test]
fn normalizing_a_normalized_schedule_is_identity() {
    let mut s = Schedule::new();
    s.set(NodeId(0), "sfc", "a", NodeId(1), 0.1);
    s.set(NodeId(0), "sfc", "a", NodeId(2), 0.2);
    s.set(NodeId(0), "sfc", "a", NodeId(3), 0.7);
    s.normalize();
    let once = s.clone();
    s.normalize();
    assert_eq!(s, once);
}

#[test]
fn validate_rejects_negative_probabilities() {
    let mut s = Schedule::new();
    s.set(NodeId(0), "sfc", "a", NodeId(1), 1.5);
    s.set(NodeId(0), "sfc", "a", NodeId(2), -0.5);
    let err = s.validate(SCHEDULE_TOLERANCE).expect_err("negative probability");
    assert!(err.contains("invalid probability"), "{err}");
}

#[test]
fn has_rule_is_per_source_and_sfc() {
    let mut s = Schedule::new();
    s.set(NodeId(0), "sfc_1", "a", NodeId(0), 1.0);
    assert!(s.has_rule(NodeId(0), "sfc_1"));
    assert!(!s.has_rule(NodeId(0), "sfc_2"));
    assert!(!s.has_rule(NodeId(1), "sfc_1"));
}

#[test]
fn weighted_round_robin_tracks_probabilities() {
    let weights = BTreeMap::from([(NodeId(1), 0.7), (NodeId(2), 0.3), (NodeId(3), 0.0)]);
    let mut counts: BTreeMap<NodeId, u64> = BTreeMap::new();
    for _ in 0..1000 {
        let dst = weighted_round_robin(&weights, Some(&counts)).expect("destination");
        *counts.entry(dst).or_default() += 1;
    }
    let to_1 = counts.get(&NodeId(1)).copied().unwrap_or(0);
    assert!((699..=701).contains(&to_1), "{to_1}");
    assert_eq!(to_1 + counts.get(&NodeId(2)).copied().unwrap_or(0), 1000);
    assert_eq!(counts.get(&NodeId(3)), None);
}

#[test]
fn weighted_round_robin_breaks_ties_by_first_destination() {
    let weights = BTreeMap::from([(NodeId(4), 0.5), (NodeId(5), 0.5)]);
    assert_eq!(weighted_round_robin(&weights, None), Some(NodeId(4)));
    let zero = BTreeMap::from([(NodeId(4), 0.0)]);
    assert_eq!(weighted_round_robin(&zero, None), None);
}
