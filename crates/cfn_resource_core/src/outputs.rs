use std::collections::BTreeMap;

use serde_json::Value;

pub const SCALAR_RESULT_KEY: &str = "result";

/// Attribute map exposed to `Fn::GetAtt`. Sorted so payloads serialize the
/// same way every time.
pub type ResourceOutputs = BTreeMap<String, Value>;

/// Fold an operation's return value into the accumulated outputs.
///
/// Objects merge key by key, `null` and absent results change nothing, and
/// any other value lands under `result`.
pub fn merge_operation_result(outputs: &mut ResourceOutputs, result: Option<Value>) {
    match result {
        None | Some(Value::Null) => {}
        Some(Value::Object(map)) => outputs.extend(map),
        Some(other) => {
            outputs.insert(SCALAR_RESULT_KEY.to_string(), other);
        }
    }
}

/// Render every non-string value as its JSON text.
pub fn stringify_values(outputs: &ResourceOutputs) -> ResourceOutputs {
    outputs
        .iter()
        .map(|(key, value)| {
            let rendered = match value {
                Value::String(_) => value.clone(),
                other => Value::String(other.to_string()),
            };
            (key.clone(), rendered)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn object_results_merge_into_existing_outputs() {
        let mut outputs = ResourceOutputs::from([("arn".to_string(), json!("arn:1"))]);
        merge_operation_result(&mut outputs, Some(json!({"sum": 5.0})));

        assert_eq!(outputs.get("sum"), Some(&json!(5.0)));
        assert_eq!(outputs.get("arn"), Some(&json!("arn:1")));
    }

    #[test]
    fn scalars_are_wrapped_and_null_is_ignored() {
        let mut outputs = ResourceOutputs::new();
        merge_operation_result(&mut outputs, Some(Value::Null));
        merge_operation_result(&mut outputs, None);
        assert!(outputs.is_empty());

        merge_operation_result(&mut outputs, Some(json!(42)));
        assert_eq!(outputs, ResourceOutputs::from([("result".to_string(), json!(42))]));
    }

    #[test]
    fn stringify_keeps_strings_and_renders_the_rest() {
        let outputs = ResourceOutputs::from([
            ("name".to_string(), json!("plain")),
            ("sum".to_string(), json!(5.0)),
            ("tags".to_string(), json!(["a", "b"])),
        ]);

        let rendered = stringify_values(&outputs);
        assert_eq!(rendered["name"], json!("plain"));
        assert_eq!(rendered["sum"], json!("5.0"));
        assert_eq!(rendered["tags"], json!("[\"a\",\"b\"]"));
    }
}
