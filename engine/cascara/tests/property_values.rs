use proptest::prelude::*;

use cascara::value::{fuzzy_equals, List, ListSeparator, Number, Value, EPSILON};
use cascara::Span;

const LENGTH_UNITS: &[&str] = &["px", "in", "cm", "mm", "q", "pt", "pc"];
const ANGLE_UNITS: &[&str] = &["deg", "grad", "rad", "turn"];
const TIME_UNITS: &[&str] = &["s", "ms"];

fn unit_pair() -> impl Strategy<Value = (&'static str, &'static str)> {
    prop_oneof![
        (
            prop::sample::select(LENGTH_UNITS),
            prop::sample::select(LENGTH_UNITS)
        ),
        (
            prop::sample::select(ANGLE_UNITS),
            prop::sample::select(ANGLE_UNITS)
        ),
        (
            prop::sample::select(TIME_UNITS),
            prop::sample::select(TIME_UNITS)
        ),
    ]
}

fn magnitude() -> impl Strategy<Value = f64> {
    -100.0..100.0f64
}

proptest! {
    #[test]
    fn addition_commutes_across_compatible_units(
        (unit_a, unit_b) in unit_pair(),
        a in magnitude(),
        b in magnitude(),
    ) {
        let left = Number::with_unit(a, unit_a);
        let right = Number::with_unit(b, unit_b);
        let forward = left.add(&right).expect("compatible");
        let backward = right.add(&left).expect("compatible");
        prop_assert_eq!(forward, backward);
    }

    #[test]
    fn addition_then_subtraction_round_trips(
        (unit_a, unit_b) in unit_pair(),
        a in magnitude(),
        b in magnitude(),
    ) {
        let left = Number::with_unit(a, unit_a);
        let right = Number::with_unit(b, unit_b);
        let sum = left.add(&right).expect("compatible");
        let back = sum.subtract(&right).expect("compatible");
        prop_assert!(back.is_comparable_to(&left));
        let coerced = left.coerced_value(&back).expect("compatible");
        prop_assert!(
            (coerced - left.value).abs() < EPSILON,
            "({a}{unit_a} + {b}{unit_b}) - {b}{unit_b} deviated by {}",
            (coerced - left.value).abs()
        );
    }

    #[test]
    fn negative_indices_mirror_positive_ones(
        elements in prop::collection::vec(-100i64..100, 1..6),
        seed in 0usize..5,
    ) {
        let length = elements.len();
        let index = (seed % length) + 1;
        let list = Value::List(List::new(
            elements
                .into_iter()
                .map(|n| Value::Number(Number::new(n as f64)))
                .collect(),
            ListSeparator::Comma,
        ));
        let positive = list
            .sass_index_to_list_index(
                &Value::Number(Number::new(index as f64)),
                None,
                Span::default(),
                |_| {},
            )
            .expect("in range");
        let mirrored = list
            .sass_index_to_list_index(
                &Value::Number(Number::new(index as f64 - length as f64 - 1.0)),
                None,
                Span::default(),
                |_| {},
            )
            .expect("in range");
        prop_assert_eq!(positive, mirrored);
    }

    #[test]
    fn equality_is_preserved_by_unit_conversion(
        (unit_a, unit_b) in unit_pair(),
        a in magnitude(),
    ) {
        let original = Number::with_unit(a, unit_a);
        let converted = Number::with_unit(
            Number::with_unit(0.0, unit_b)
                .coerced_value(&original)
                .expect("compatible"),
            unit_b,
        );
        prop_assert_eq!(&original, &converted);
        prop_assert!(fuzzy_equals(
            original.coerced_value(&converted).expect("compatible"),
            original.value
        ));
    }
}
