use schemars::{schema_for, JsonSchema};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

/// Types that can be requested as strict OpenAI structured output.
///
/// Blanket-implemented for every `JsonSchema + DeserializeOwned` type.
pub trait StructuredOutput: JsonSchema + DeserializeOwned + Send {
    /// Strict-mode JSON schema for this type.
    ///
    /// Strict mode rejects schemas unless every object closes its property set
    /// (`additionalProperties: false`), lists every property as required
    /// (nullable ones included) and carries no `$ref`.
    fn openai_schema() -> Value {
        let root = serde_json::to_value(schema_for!(Self)).unwrap_or_default();
        let definitions = root
            .get("definitions")
            .cloned()
            .unwrap_or_else(|| Value::Object(Map::new()));

        let mut schema = root;
        if let Value::Object(map) = &mut schema {
            map.remove("definitions");
            map.remove("$schema");
        }
        strictify(&mut schema, &definitions);
        schema
    }

    fn type_name() -> String {
        <Self as JsonSchema>::schema_name()
    }

    /// `type_name` in the `^[a-zA-Z0-9_-]+$` form the API accepts, snake_cased.
    fn schema_name_for_wire() -> String {
        let mut out = String::new();
        for (i, ch) in Self::type_name().chars().enumerate() {
            if ch.is_ascii_uppercase() {
                if i > 0 {
                    out.push('_');
                }
                out.push(ch.to_ascii_lowercase());
            } else if ch.is_ascii_alphanumeric() || ch == '_' || ch == '-' {
                out.push(ch);
            } else {
                out.push('_');
            }
        }
        out
    }
}

impl<T: JsonSchema + DeserializeOwned + Send> StructuredOutput for T {}

/// Inline references and close every object schema, depth first.
fn strictify(value: &mut Value, definitions: &Value) {
    match value {
        Value::Object(map) => {
            if let Some(Value::String(path)) = map.get("$ref").cloned() {
                let name = path.trim_start_matches("#/definitions/");
                if let Some(def) = definitions.get(name) {
                    *value = def.clone();
                    strictify(value, definitions);
                    return;
                }
            }

            // schemars wraps documented references in a single-element allOf.
            if let Some(Value::Array(all_of)) = map.get("allOf").cloned() {
                if all_of.len() == 1 {
                    let mut inner = all_of[0].clone();
                    strictify(&mut inner, definitions);
                    if let (Value::Object(inner_map), Some(desc)) =
                        (&mut inner, map.get("description").cloned())
                    {
                        inner_map
                            .entry("description")
                            .or_insert(desc);
                    }
                    *value = inner;
                    return;
                }
            }

            if map.get("type") == Some(&Value::String("object".into())) {
                map.insert("additionalProperties".into(), Value::Bool(false));
                let required: Vec<Value> = match map.get("properties") {
                    Some(Value::Object(props)) => {
                        props.keys().map(|k| Value::String(k.clone())).collect()
                    }
                    _ => Vec::new(),
                };
                map.insert("required".into(), Value::Array(required));
            }

            for child in map.values_mut() {
                strictify(child, definitions);
            }
        }
        Value::Array(items) => {
            for item in items.iter_mut() {
                strictify(item, definitions);
            }
        }
        _ => {}
    }
}
