//! Helpers for reading typed settings from a `serde_json::Value` object.
//!
//! Each helper takes a JSON value, a key name, and a default. If the key is
//! missing or the value has the wrong type or range, the default is returned.
//! Configuration loaded this way is always usable.

use serde_json::Value;

/// Extracts a `usize` from `params[name]`, returning `default` if missing or wrong type.
///
/// Only non-negative integers succeed.
pub fn param_usize(params: &Value, name: &str, default: usize) -> usize {
    params
        .get(name)
        .and_then(Value::as_u64)
        .and_then(|v| usize::try_from(v).ok())
        .unwrap_or(default)
}

/// Extracts an `i32` from `params[name]`, returning `default` if missing,
/// wrong type, or out of range.
pub fn param_i32(params: &Value, name: &str, default: i32) -> i32 {
    params
        .get(name)
        .and_then(Value::as_i64)
        .and_then(|v| i32::try_from(v).ok())
        .unwrap_or(default)
}

/// Extracts a `bool` from `params[name]`, returning `default` if missing or wrong type.
pub fn param_bool(params: &Value, name: &str, default: bool) -> bool {
    params.get(name).and_then(Value::as_bool).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn param_usize_extracts_existing_value() {
        let params = json!({"max_devices": 4});
        assert_eq!(param_usize(&params, "max_devices", 8), 4);
    }

    #[test]
    fn param_usize_rejects_negative_and_float() {
        let params = json!({"a": -1, "b": 2.5});
        assert_eq!(param_usize(&params, "a", 8), 8);
        assert_eq!(param_usize(&params, "b", 8), 8);
    }

    #[test]
    fn param_i32_extracts_negative() {
        let params = json!({"offset": -3});
        assert_eq!(param_i32(&params, "offset", 0), -3);
    }

    #[test]
    fn param_i32_returns_default_when_out_of_range() {
        let params = json!({"depth_size": 1_u64 << 40});
        assert_eq!(param_i32(&params, "depth_size", 8), 8);
    }

    #[test]
    fn param_bool_returns_default_when_wrong_type() {
        let params = json!({"unset_display": "yes"});
        assert!(param_bool(&params, "unset_display", true));
        let params = json!({"unset_display": false});
        assert!(!param_bool(&params, "unset_display", true));
    }

    #[test]
    fn helpers_return_default_for_non_object() {
        let params = json!([1, 2, 3]);
        assert_eq!(param_usize(&params, "max_devices", 8), 8);
        assert_eq!(param_i32(&params, "red_size", 8), 8);
        assert!(!param_bool(&params, "flag", false));
    }
}
