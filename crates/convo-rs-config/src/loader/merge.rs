//! JSON merge helper for layered configuration.

use serde_json::Value;

/// Merge `overlay` into `base`, recursing through objects.
///
/// Scalars and arrays replace what is below them. An explicit `null` removes
/// the key, so a higher layer can restore the built-in default for a field
/// that a lower layer set.
pub(super) fn merge_json_values(base: &mut Value, overlay: &Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                if value.is_null() {
                    base_map.remove(key);
                    continue;
                }
                match base_map.get_mut(key) {
                    Some(existing) => merge_json_values(existing, value),
                    None => {
                        let mut value = value.clone();
                        strip_nulls(&mut value);
                        base_map.insert(key.clone(), value);
                    }
                }
            }
        }
        (base_slot, overlay_value) => {
            *base_slot = overlay_value.clone();
        }
    }
}

/// Remove `null` members from every object in `value`.
pub(super) fn strip_nulls(value: &mut Value) {
    if let Value::Object(map) = value {
        map.retain(|_, member| !member.is_null());
        map.values_mut().for_each(strip_nulls);
    }
}

#[cfg(test)]
mod tests {
    use super::merge_json_values;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn nested_keys_override_and_siblings_survive() {
        let mut base = json!({ "memory": { "path": "a", "expire_days": 3 }, "server": { "port": 1 } });
        merge_json_values(&mut base, &json!({ "memory": { "path": "b" } }));
        assert_eq!(
            base,
            json!({ "memory": { "path": "b", "expire_days": 3 }, "server": { "port": 1 } })
        );
    }

    #[test]
    fn null_removes_lower_layer_value() {
        let mut base = json!({ "memory": { "path": "a", "expire_days": 3 } });
        merge_json_values(&mut base, &json!({ "memory": { "expire_days": null } }));
        assert_eq!(base, json!({ "memory": { "path": "a" } }));
    }

    #[test]
    fn null_inside_new_subtree_is_dropped() {
        let mut base = json!({});
        merge_json_values(&mut base, &json!({ "sweep": { "interval_secs": null } }));
        assert_eq!(base, json!({ "sweep": {} }));
    }
}
