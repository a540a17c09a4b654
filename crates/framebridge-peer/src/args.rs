//! Conversion of typed Rust values into positional payload values.

use serde::Serialize;
use serde_json::Value;

use crate::error::Result;

/// Serialize `args` into positional values.
///
/// Sequences and tuples become one value per element, `()` becomes no
/// values, and anything else becomes a single value. Values that cannot be
/// represented fail here rather than deep inside a flush.
pub fn to_positional<A: Serialize>(args: A) -> Result<Vec<Value>> {
    Ok(match serde_json::to_value(args)? {
        Value::Null => Vec::new(),
        Value::Array(values) => values,
        other => vec![other],
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use serde_json::json;

    use super::*;

    #[test]
    fn tuples_spread_into_positions() {
        assert_eq!(to_positional((2, "x")).unwrap(), vec![json!(2), json!("x")]);
    }

    #[test]
    fn unit_means_no_arguments() {
        assert!(to_positional(()).unwrap().is_empty());
    }

    #[test]
    fn scalars_and_maps_are_single_arguments() {
        assert_eq!(to_positional(7).unwrap(), vec![json!(7)]);
        let map = HashMap::from([("k", 1)]);
        assert_eq!(to_positional(&map).unwrap(), vec![json!({"k": 1})]);
    }

    #[test]
    fn unrepresentable_values_are_rejected() {
        let bad: HashMap<(u8, u8), u8> = HashMap::from([((1, 2), 3)]);
        assert!(to_positional(&bad).is_err());
    }
}
