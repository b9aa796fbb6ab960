//! HTML entity handling for component payloads. String values inside
//! `data-layer-data` arrive entity-encoded by the server-side renderer.

use std::borrow::Cow;

use serde_json::{Map, Value};

/// Escape the characters that are reserved in HTML attribute values.
pub fn encode_html_entities(text: &str) -> String {
    html_escape::encode_safe(text).into_owned()
}

/// Decode named entities from the full HTML5 table (`&amp;`, `&rarr;`),
/// plus decimal (`&#39;`) and hex (`&#x27;`) references. Unknown sequences
/// are kept verbatim.
pub fn decode_html_entities(text: &str) -> Cow<'_, str> {
    html_escape::decode_html_entities(text)
}

/// Deep copy of `value` with every string leaf (object keys excluded)
/// entity-decoded. Arrays keep their shape; non-string scalars pass through.
pub fn decode_recursive(value: &Value) -> Value {
    map_strings(value, &|s: &str| decode_html_entities(s).into_owned())
}

/// Inverse of [`decode_recursive`], as the server-side renderer emits it.
pub fn encode_recursive(value: &Value) -> Value {
    map_strings(value, &encode_html_entities)
}

fn map_strings(value: &Value, f: &dyn Fn(&str) -> String) -> Value {
    match value {
        Value::String(s) => Value::String(f(s)),
        Value::Array(items) => Value::Array(items.iter().map(|v| map_strings(v, f)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), map_strings(v, f)))
                .collect::<Map<String, Value>>(),
        ),
        other => other.clone(),
    }
}
