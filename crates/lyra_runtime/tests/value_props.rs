use proptest::prelude::*;

use lyra_runtime::{Compare, Value};

fn scalar() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Int),
        (-1.0e9f64..1.0e9f64).prop_map(Value::Real),
        "[a-z]{0,8}".prop_map(|s| Value::Text(s.into())),
    ]
}

fn value() -> impl Strategy<Value = Value> {
    scalar().prop_recursive(3, 32, 8, |inner| {
        prop::collection::vec(inner, 0..6).prop_map(Value::Array)
    })
}

fn flipped(res: Compare) -> Compare {
    match res {
        Compare::Less => Compare::Greater,
        Compare::Greater => Compare::Less,
        other => other,
    }
}

proptest! {
    #[test]
    fn comparison_is_antisymmetric(a in value(), b in value()) {
        prop_assert_eq!(a.compare(&b), flipped(b.compare(&a)));
    }
}

proptest! {
    #[test]
    fn comparison_is_reflexive_without_nan(a in value()) {
        // The strategy only generates finite reals, so every generated
        // value is equal to itself.
        prop_assert_eq!(a.compare(&a), Compare::Equal);
    }
}

proptest! {
    #[test]
    fn null_precedes_every_other_value(a in value()) {
        let expected = if a.is_null() { Compare::Equal } else { Compare::Less };
        prop_assert_eq!(Value::Null.compare(&a), expected);
    }
}

proptest! {
    #[test]
    fn clones_compare_equal_and_dump_identically(a in value()) {
        let b = a.clone();
        prop_assert_eq!(a.compare(&b), Compare::Equal);
        prop_assert_eq!(a.to_string(), b.to_string());
    }
}
