use std::fmt::Write;
use std::hash::{Hash, Hasher};

use ordered_float::OrderedFloat;

/// Tolerance inside which two numbers are the same number, and a number is
/// an integer. Matches the reference implementation's epsilon.
pub const EPSILON: f64 = 1e-11;

pub fn fuzzy_equals(a: f64, b: f64) -> bool {
    (a - b).abs() < EPSILON
}

fn fuzzy_as_int(value: f64) -> Option<i64> {
    let rounded = value.round();
    fuzzy_equals(value, rounded).then_some(rounded as i64)
}

/// The dimension a convertible unit measures.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Dimension {
    Length,
    Angle,
    Time,
    Frequency,
    Resolution,
}

/// Conversion table from the reference implementation: for each unit, the
/// dimension and the number of canonical units (px, deg, ms, Hz, dpi) one of
/// it equals. Units outside the table are retained symbolically.
fn conversion(unit: &str) -> Option<(Dimension, f64)> {
    use std::f64::consts::PI;
    Some(match unit {
        "px" => (Dimension::Length, 1.0),
        "in" => (Dimension::Length, 96.0),
        "cm" => (Dimension::Length, 96.0 / 2.54),
        "mm" => (Dimension::Length, 96.0 / 25.4),
        "q" => (Dimension::Length, 96.0 / 101.6),
        "pt" => (Dimension::Length, 96.0 / 72.0),
        "pc" => (Dimension::Length, 16.0),
        "deg" => (Dimension::Angle, 1.0),
        "grad" => (Dimension::Angle, 0.9),
        "rad" => (Dimension::Angle, 180.0 / PI),
        "turn" => (Dimension::Angle, 360.0),
        "s" => (Dimension::Time, 1000.0),
        "ms" => (Dimension::Time, 1.0),
        "Hz" => (Dimension::Frequency, 1.0),
        "kHz" => (Dimension::Frequency, 1000.0),
        "dpi" => (Dimension::Resolution, 1.0),
        "dpcm" => (Dimension::Resolution, 2.54),
        "dppx" => (Dimension::Resolution, 96.0),
        _ => return None,
    })
}

/// How many `to` units one `from` unit equals, when the two are convertible.
fn factor_between(from: &str, to: &str) -> Option<f64> {
    if from == to {
        return Some(1.0);
    }
    let (from_dim, from_factor) = conversion(from)?;
    let (to_dim, to_factor) = conversion(to)?;
    (from_dim == to_dim).then(|| from_factor / to_factor)
}

/// A SassScript number: a float together with a unit vector of numerator and
/// denominator units.
#[derive(Clone, Debug, Default)]
pub struct Number {
    pub value: f64,
    pub numerator_units: Vec<String>,
    pub denominator_units: Vec<String>,
    /// When the number came from `a/b` on two literal numbers, the operands,
    /// so the declaration round-trips as written. Arithmetic clears it.
    as_slash: Option<Box<(Number, Number)>>,
}

impl Number {
    pub fn new(value: f64) -> Self {
        Self {
            value,
            ..Default::default()
        }
    }

    pub fn with_unit(value: f64, unit: impl Into<String>) -> Self {
        Self {
            value,
            numerator_units: vec![unit.into()],
            ..Default::default()
        }
    }

    pub fn with_units(
        value: f64,
        numerator_units: Vec<String>,
        denominator_units: Vec<String>,
    ) -> Self {
        let mut number = Self {
            value,
            numerator_units,
            denominator_units,
            as_slash: None,
        };
        number.cancel_units();
        number
    }

    pub fn is_unitless(&self) -> bool {
        self.numerator_units.is_empty() && self.denominator_units.is_empty()
    }

    pub fn is_int(&self) -> bool {
        fuzzy_as_int(self.value).is_some()
    }

    pub fn as_int(&self) -> Option<i64> {
        fuzzy_as_int(self.value)
    }

    pub fn as_slash(&self) -> Option<&(Number, Number)> {
        self.as_slash.as_deref()
    }

    pub(crate) fn with_slash(mut self, numerator: Number, denominator: Number) -> Self {
        self.as_slash = Some(Box::new((numerator, denominator)));
        self
    }

    /// `px`, `px/s`, `px*px/s*s`, or the empty string when unitless.
    pub fn unit_string(&self) -> String {
        let mut out = String::new();
        for (index, unit) in self.numerator_units.iter().enumerate() {
            if index > 0 {
                out.push('*');
            }
            out.push_str(unit);
        }
        if !self.denominator_units.is_empty() {
            if self.numerator_units.is_empty() {
                // A purely-inverse unit has no css spelling; render the way
                // inspect() does.
                out.push_str("(none)");
            }
            out.push('/');
            for (index, unit) in self.denominator_units.iter().enumerate() {
                if index > 0 {
                    out.push('*');
                }
                out.push_str(unit);
            }
        }
        out
    }

    /// Whether the other number's units can be converted into this one's.
    /// Unitless numbers are compatible with everything.
    pub fn is_comparable_to(&self, other: &Number) -> bool {
        if self.is_unitless() || other.is_unitless() {
            return true;
        }
        self.factor_from(other).is_some()
    }

    /// The factor converting a value in `other`'s units into this number's
    /// units, if the unit vectors are convertible pairwise.
    fn factor_from(&self, other: &Number) -> Option<f64> {
        let numerator = units_factor(&other.numerator_units, &self.numerator_units)?;
        let denominator = units_factor(&other.denominator_units, &self.denominator_units)?;
        Some(numerator / denominator)
    }

    /// The other number's value expressed in this number's units. `None`
    /// when the units are incompatible.
    pub fn coerced_value(&self, other: &Number) -> Option<f64> {
        if other.is_unitless() || self.is_unitless() {
            return Some(other.value);
        }
        self.factor_from(other).map(|factor| other.value * factor)
    }

    fn result_units(&self, other: &Number) -> (Vec<String>, Vec<String>) {
        if self.is_unitless() {
            (
                other.numerator_units.clone(),
                other.denominator_units.clone(),
            )
        } else {
            (self.numerator_units.clone(), self.denominator_units.clone())
        }
    }

    pub fn add(&self, other: &Number) -> Option<Number> {
        let coerced = self.coerced_value(other)?;
        let (numerator, denominator) = self.result_units(other);
        Some(Number::with_units(self.value + coerced, numerator, denominator))
    }

    pub fn subtract(&self, other: &Number) -> Option<Number> {
        let coerced = self.coerced_value(other)?;
        let (numerator, denominator) = self.result_units(other);
        Some(Number::with_units(self.value - coerced, numerator, denominator))
    }

    pub fn multiply(&self, other: &Number) -> Number {
        let mut numerator = self.numerator_units.clone();
        numerator.extend(other.numerator_units.iter().cloned());
        let mut denominator = self.denominator_units.clone();
        denominator.extend(other.denominator_units.iter().cloned());
        Number::with_units(self.value * other.value, numerator, denominator)
    }

    pub fn divide(&self, other: &Number) -> Number {
        let mut numerator = self.numerator_units.clone();
        numerator.extend(other.denominator_units.iter().cloned());
        let mut denominator = self.denominator_units.clone();
        denominator.extend(other.numerator_units.iter().cloned());
        Number::with_units(self.value / other.value, numerator, denominator)
    }

    /// Modulo carrying the left operand's unit. The result takes the sign of
    /// the right operand, as css `mod()` and the reference implementation do.
    pub fn modulo(&self, other: &Number) -> Option<Number> {
        let coerced = self.coerced_value(other)?;
        let (numerator, denominator) = self.result_units(other);
        let remainder = self.value.rem_euclid(coerced.abs());
        let value = if coerced < 0.0 && remainder != 0.0 {
            remainder + coerced
        } else {
            remainder
        };
        Some(Number::with_units(value, numerator, denominator))
    }

    pub fn compare(&self, other: &Number) -> Option<std::cmp::Ordering> {
        let coerced = self.coerced_value(other)?;
        if fuzzy_equals(self.value, coerced) {
            return Some(std::cmp::Ordering::Equal);
        }
        self.value.partial_cmp(&coerced)
    }

    pub fn negate(&self) -> Number {
        Number::with_units(
            -self.value,
            self.numerator_units.clone(),
            self.denominator_units.clone(),
        )
    }

    /// Remove numerator/denominator pairs that reduce to the dimensionless
    /// factor 1, converting the value as pairs cancel.
    fn cancel_units(&mut self) {
        let mut remaining_denominators: Vec<Option<String>> =
            self.denominator_units.drain(..).map(Some).collect();
        let mut numerators = Vec::with_capacity(self.numerator_units.len());
        for numerator in self.numerator_units.drain(..) {
            let mut cancelled = false;
            for slot in remaining_denominators.iter_mut() {
                if let Some(denominator) = slot {
                    if let Some(factor) = factor_between(&numerator, denominator) {
                        self.value *= factor;
                        *slot = None;
                        cancelled = true;
                        break;
                    }
                }
            }
            if !cancelled {
                numerators.push(numerator);
            }
        }
        self.numerator_units = numerators;
        self.denominator_units = remaining_denominators.into_iter().flatten().collect();
    }

    /// The value converted to canonical units with the unit names sorted,
    /// the basis for cross-unit equality and hashing.
    fn canonical_form(&self) -> (f64, Vec<String>, Vec<String>) {
        let mut value = self.value;
        let mut numerator: Vec<String> = self
            .numerator_units
            .iter()
            .map(|unit| match conversion(unit) {
                Some((dimension, factor)) => {
                    value *= factor;
                    canonical_unit(dimension).to_string()
                }
                None => unit.clone(),
            })
            .collect();
        let mut denominator: Vec<String> = self
            .denominator_units
            .iter()
            .map(|unit| match conversion(unit) {
                Some((dimension, factor)) => {
                    value /= factor;
                    canonical_unit(dimension).to_string()
                }
                None => unit.clone(),
            })
            .collect();
        numerator.sort();
        denominator.sort();
        (value, numerator, denominator)
    }

    /// Format the float part the way css does: integers without a point,
    /// at most ten decimal digits, no trailing zeros.
    pub fn write_value(&self, out: &mut String, compressed: bool) {
        if let Some(int) = fuzzy_as_int(self.value) {
            write!(out, "{int}").expect("string writer");
            return;
        }
        let mut rendered = format!("{:.10}", self.value);
        while rendered.ends_with('0') {
            rendered.pop();
        }
        if rendered.ends_with('.') {
            rendered.pop();
        }
        if compressed {
            if let Some(stripped) = rendered.strip_prefix("0.") {
                rendered = format!(".{stripped}");
            } else if let Some(stripped) = rendered.strip_prefix("-0.") {
                rendered = format!("-.{stripped}");
            }
        }
        out.push_str(&rendered);
    }
}

fn canonical_unit(dimension: Dimension) -> &'static str {
    match dimension {
        Dimension::Length => "px",
        Dimension::Angle => "deg",
        Dimension::Time => "ms",
        Dimension::Frequency => "Hz",
        Dimension::Resolution => "dpi",
    }
}

/// Factor converting a multiset of units into another, matching units up
/// pairwise. `None` when the multisets cannot be matched.
fn units_factor(from: &[String], to: &[String]) -> Option<f64> {
    if from.len() != to.len() {
        return None;
    }
    let mut remaining: Vec<Option<&String>> = to.iter().map(Some).collect();
    let mut factor = 1.0;
    for unit in from {
        let mut matched = false;
        for slot in remaining.iter_mut() {
            if let Some(target) = slot {
                if let Some(pair_factor) = factor_between(unit, target) {
                    factor *= pair_factor;
                    *slot = None;
                    matched = true;
                    break;
                }
            }
        }
        if !matched {
            return None;
        }
    }
    Some(factor)
}

impl PartialEq for Number {
    fn eq(&self, other: &Self) -> bool {
        if self.is_unitless() != other.is_unitless() {
            return false;
        }
        if self.is_unitless() {
            return fuzzy_equals(self.value, other.value);
        }
        let (a_value, a_num, a_den) = self.canonical_form();
        let (b_value, b_num, b_den) = other.canonical_form();
        a_num == b_num && a_den == b_den && fuzzy_equals(a_value, b_value)
    }
}

impl Eq for Number {}

impl Hash for Number {
    fn hash<H: Hasher>(&self, state: &mut H) {
        let (value, numerator, denominator) = self.canonical_form();
        // Round onto the equality tolerance grid so hash stays consistent
        // with cross-unit equality.
        OrderedFloat((value / EPSILON).round()).hash(state);
        numerator.hash(state);
        denominator.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cross_unit_addition_uses_left_units() {
        let inches = Number::with_unit(1.0, "in");
        let pixels = Number::with_unit(48.0, "px");
        let sum = inches.add(&pixels).expect("compatible");
        assert_eq!(sum.unit_string(), "in");
        assert!(fuzzy_equals(sum.value, 1.5));
    }

    #[test]
    fn incompatible_units_do_not_add() {
        let seconds = Number::with_unit(1.0, "s");
        let pixels = Number::with_unit(1.0, "px");
        assert!(seconds.add(&pixels).is_none());
    }

    #[test]
    fn multiplication_cancels_convertible_units() {
        let speed = Number::with_units(10.0, vec!["px".into()], vec!["s".into()]);
        let time = Number::with_unit(2000.0, "ms");
        let distance = speed.multiply(&time);
        assert_eq!(distance.unit_string(), "px");
        assert!(fuzzy_equals(distance.value, 20.0));
    }

    #[test]
    fn equality_converts_units() {
        assert_eq!(Number::with_unit(1.0, "in"), Number::with_unit(96.0, "px"));
        assert_eq!(Number::with_unit(1.0, "s"), Number::with_unit(1000.0, "ms"));
        assert_ne!(Number::with_unit(1.0, "s"), Number::with_unit(1.0, "px"));
        assert_ne!(Number::new(1.0), Number::with_unit(1.0, "px"));
    }

    #[test]
    fn hash_is_consistent_with_cross_unit_equality() {
        use std::collections::hash_map::DefaultHasher;

        let hash = |number: &Number| {
            let mut hasher = DefaultHasher::new();
            number.hash(&mut hasher);
            hasher.finish()
        };
        assert_eq!(
            hash(&Number::with_unit(1.0, "in")),
            hash(&Number::with_unit(96.0, "px"))
        );
    }

    #[test]
    fn integers_detect_within_tolerance() {
        assert!(Number::new(2.0 + 1e-12).is_int());
        assert!(!Number::new(2.5).is_int());
        assert_eq!(Number::new(3.0 - 1e-12).as_int(), Some(3));
    }
}
