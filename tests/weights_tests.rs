use std::collections::BTreeMap;

use fuelcast::error::ForecastError;
use fuelcast::weights::{normalize_weights, WeightRegistry, WEIGHT_SUM_TOLERANCE};

fn statics() -> BTreeMap<String, f64> {
    BTreeMap::from([
        ("dubai_crude".to_string(), 0.5),
        ("usd_krw".to_string(), 0.3),
        ("fuel_tax".to_string(), 0.2),
    ])
}

#[test]
/// Verifies normalization lands within tolerance for awkward inputs.
fn normalized_weights_sum_to_one() {
    let cases = [
        vec![0.1, 0.2, 0.3],
        vec![1.0 / 3.0, 1.0 / 3.0, 1.0 / 3.0],
        vec![1e-9, 7.0, 13.0, 0.333],
        vec![0.0, 0.0],
        vec![-0.2, 0.4],
    ];
    for raw in cases {
        let map: BTreeMap<String, f64> =
            raw.iter().enumerate().map(|(i, w)| (format!("f{i}"), *w)).collect();
        let out = normalize_weights(&map);
        let sum: f64 = out.values().sum();
        assert!((sum - 1.0).abs() < WEIGHT_SUM_TOLERANCE, "{raw:?} -> {sum}");
        assert!(out.values().all(|w| *w >= 0.0));
    }
}

#[test]
fn zero_mass_is_split_evenly() {
    let map = BTreeMap::from([("a".to_string(), 0.0), ("b".to_string(), 0.0)]);
    let out = normalize_weights(&map);
    assert!((out["a"] - 0.5).abs() < 1e-12);
}

#[test]
fn registry_rejects_invalid_statics() {
    let mut bad = statics();
    bad.insert("cpi".to_string(), 0.1);
    assert!(matches!(
        WeightRegistry::new(bad, 0.7),
        Err(ForecastError::InvalidConfiguration(_))
    ));
    assert!(matches!(
        WeightRegistry::new(BTreeMap::new(), 0.7),
        Err(ForecastError::NoActiveFactors)
    ));
    assert!(WeightRegistry::new(statics(), 1.5).is_err());
}

#[test]
/// Verifies copy-on-write publication: earlier snapshots keep their values.
fn publish_swaps_in_a_new_generation() {
    let registry = WeightRegistry::new(statics(), 0.7).unwrap();
    let initial = registry.snapshot();
    assert_eq!(initial.generation, 0);
    assert!(initial.is_normalized());

    let scores = BTreeMap::from([
        ("dubai_crude".to_string(), 1.0 / (1.0 + 4.0)),
        ("usd_krw".to_string(), 1.0 / (1.0 + 0.5)),
    ]);
    let next = registry.publish(&scores);

    assert_eq!(next.generation, 1);
    assert!(next.is_normalized());
    assert!(next.get("dubai_crude") < 0.5);
    assert!(next.get("usd_krw") > 0.3);
    assert!((next.get("fuel_tax") - 0.2).abs() < 1e-12);
    assert!((initial.get("dubai_crude") - 0.5).abs() < 1e-12);
    assert_eq!(registry.snapshot().generation, 1);
}

#[test]
/// Unscored factors keep their static weight in the dynamic component.
fn dynamic_weights_preserve_unscored_mass() {
    let registry = WeightRegistry::new(statics(), 0.0).unwrap();
    let dynamic = registry.dynamic_weights(&BTreeMap::from([
        ("dubai_crude".to_string(), 0.2),
        ("usd_krw".to_string(), 0.6),
    ]));
    assert!((dynamic["dubai_crude"] - 0.2).abs() < 1e-12);
    assert!((dynamic["usd_krw"] - 0.6).abs() < 1e-12);
    assert!((dynamic["fuel_tax"] - 0.2).abs() < 1e-12);
}

#[test]
fn restore_drops_unknown_factors() {
    let registry = WeightRegistry::new(statics(), 0.7).unwrap();
    let mut foreign = (*registry.snapshot()).clone();
    foreign.generation = 9;
    foreign.weights.insert("retired".to_string(), 0.5);
    let restored = registry.restore(&foreign);
    assert_eq!(restored.generation, 9);
    assert!(!restored.weights.contains_key("retired"));
    assert!(restored.is_normalized());
}
