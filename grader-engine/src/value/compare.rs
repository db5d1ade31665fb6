use super::Value;

pub const DEFAULT_TOLERANCE: f64 = 1e-3;

/// Type-aware structural equivalence.
///
/// Integers and floats compare numerically within `tolerance`; every other
/// pair of differing variants is unequal. Sequences and tuples are
/// order-sensitive, mappings are not.
pub fn equivalent(actual: &Value, expected: &Value, tolerance: f64) -> bool {
    use Value::*;

    match (actual, expected) {
        (None, None) => true,
        (Integer(a), Integer(b)) => ((*a as i128 - *b as i128) as f64).abs() < tolerance,
        (Integer(a), Float(b)) => (*a as f64 - b).abs() < tolerance,
        (Float(a), Integer(b)) => (a - *b as f64).abs() < tolerance,
        (Float(a), Float(b)) => (a - b).abs() < tolerance,
        (String(a), String(b)) => a == b,
        (Boolean(a), Boolean(b)) => a == b,
        (Sequence(a), Sequence(b)) | (Tuple(a), Tuple(b)) => {
            a.len() == b.len()
                && a.iter()
                    .zip(b.iter())
                    .all(|(x, y)| equivalent(x, y, tolerance))
        }
        (Mapping(a), Mapping(b)) => {
            a.len() == b.len()
                && a.iter().all(|(key, value)| {
                    b.iter()
                        .find(|(k, _)| k == key)
                        .map_or(false, |(_, v)| equivalent(value, v, tolerance))
                })
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ints(xs: &[i64]) -> Value {
        Value::Sequence(xs.iter().map(|&x| Value::Integer(x)).collect())
    }

    fn map(entries: &[(&str, i64)]) -> Value {
        Value::Mapping(
            entries
                .iter()
                .map(|&(k, v)| (Value::String(k.into()), Value::Integer(v)))
                .collect(),
        )
    }

    #[test]
    fn numeric_tolerance() {
        let t = DEFAULT_TOLERANCE;
        assert!(equivalent(&Value::Float(6.0), &Value::Float(5.9995), t));
        assert!(!equivalent(&Value::Float(6.0), &Value::Float(6.01), t));
        assert!(equivalent(&Value::Integer(6), &Value::Float(6.0004), t));
        assert!(equivalent(&Value::Float(6.0), &Value::Integer(6), t));
        assert!(!equivalent(&Value::Integer(6), &Value::Integer(7), t));
        assert!(!equivalent(&Value::Float(f64::NAN), &Value::Float(f64::NAN), t));
    }

    #[test]
    fn no_cross_type_coercion() {
        let t = DEFAULT_TOLERANCE;
        assert!(!equivalent(&Value::Integer(1), &Value::String("1".into()), t));
        assert!(!equivalent(&Value::Boolean(true), &Value::Integer(1), t));
        assert!(!equivalent(&ints(&[1, 2]), &Value::Tuple(vec![Value::Integer(1), Value::Integer(2)]), t));
        assert!(!equivalent(&Value::None, &Value::String("None".into()), t));
        assert!(equivalent(&Value::None, &Value::None, t));
    }

    #[test]
    fn sequences_are_ordered() {
        let t = DEFAULT_TOLERANCE;
        assert!(equivalent(&ints(&[1, 2, 3]), &ints(&[1, 2, 3]), t));
        assert!(!equivalent(&ints(&[1, 2, 3]), &ints(&[1, 2]), t));
        assert!(!equivalent(&ints(&[1, 2, 3]), &ints(&[3, 2, 1]), t));
    }

    #[test]
    fn mappings_ignore_key_order() {
        let t = DEFAULT_TOLERANCE;
        assert!(equivalent(&map(&[("a", 1), ("b", 2)]), &map(&[("b", 2), ("a", 1)]), t));
        assert!(!equivalent(&map(&[("a", 1), ("b", 2)]), &map(&[("a", 1), ("c", 2)]), t));
        assert!(!equivalent(&map(&[("a", 1)]), &map(&[("a", 1), ("b", 2)]), t));
        assert!(!equivalent(&map(&[("a", 1), ("b", 2)]), &map(&[("a", 1), ("b", 3)]), t));
    }

    #[test]
    fn nested_values_use_tolerance() {
        let t = DEFAULT_TOLERANCE;
        let a = Value::Tuple(vec![Value::Integer(70), Value::Float(52.5)]);
        let b = Value::Tuple(vec![Value::Float(70.0), Value::Float(52.5004)]);
        assert!(equivalent(&a, &b, t));
    }
}
