use bytes::Bytes;
use serde_json::Value;

use super::{Codec, CodecError, Destination};
use crate::values::Values;

/// `application/x-www-form-urlencoded` bodies.
///
/// Encodes maps and structs whose fields are scalars or lists of scalars.
/// A string is treated as an already encoded form and normalized. Decoding
/// always produces a map of string lists, so destinations should look like
/// `BTreeMap<String, Vec<String>>`, [`Values`], or a struct of `Vec<String>`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FormCodec;

fn scalar(key: &str, value: &Value) -> Result<Option<String>, CodecError> {
    match value {
        Value::Null => Ok(None),
        Value::Bool(value) => Ok(Some(value.to_string())),
        Value::Number(value) => Ok(Some(value.to_string())),
        Value::String(value) => Ok(Some(value.clone())),
        Value::Array(_) | Value::Object(_) => Err(CodecError::Form(format!(
            "field {key} is nested and cannot be form encoded"
        ))),
    }
}

fn to_values(value: Value) -> Result<Values, CodecError> {
    match value {
        Value::Object(fields) => {
            let mut values = Values::new();
            for (key, field) in fields {
                match field {
                    Value::Array(items) => {
                        for item in &items {
                            if let Some(item) = scalar(&key, item)? {
                                values.append(key.as_str(), item);
                            }
                        }
                    }
                    field => {
                        if let Some(field) = scalar(&key, &field)? {
                            values.append(key, field);
                        }
                    }
                }
            }
            Ok(values)
        }
        Value::String(encoded) => Ok(Values::parse(&encoded)),
        other => Err(CodecError::Form(format!(
            "expected a map, struct or encoded string, found {}",
            kind(&other)
        ))),
    }
}

/// Reject `%` escapes which are not followed by two hex digits.
fn check_escapes(text: &str) -> Result<(), CodecError> {
    let bytes = text.as_bytes();
    for (index, _) in text.match_indices('%') {
        let escape = bytes.get(index + 1..index + 3);
        if !escape.is_some_and(|digits| digits.iter().all(u8::is_ascii_hexdigit)) {
            let end = text.len().min(index + 3);
            return Err(CodecError::Form(format!(
                "invalid escape {:?} at byte {index}",
                text.get(index..end).unwrap_or("%")
            )));
        }
    }
    Ok(())
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a sequence",
        Value::Object(_) => "a map",
    }
}

impl Codec for FormCodec {
    fn marshal(&self, value: &dyn erased_serde::Serialize) -> Result<Bytes, CodecError> {
        let value = serde_json::to_value(value)?;
        Ok(to_values(value)?.encode().into())
    }

    fn unmarshal(
        &self,
        data: &[u8],
        destination: &mut dyn Destination,
    ) -> Result<(), CodecError> {
        let text = std::str::from_utf8(data)?;
        check_escapes(text)?;
        let values = Values::parse(text);
        let object: serde_json::Map<String, Value> = values
            .into_iter()
            .map(|(key, items)| {
                let items = items.into_iter().map(Value::String).collect();
                (key, Value::Array(items))
            })
            .collect();

        destination.fill(&mut <dyn erased_serde::Deserializer>::erase(Value::Object(
            object,
        )))?;
        Ok(())
    }
}
