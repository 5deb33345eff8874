use serde_json::Value;

use crate::dataverse::entity::{Entity, Value as RowValue};

/// Parse one record of a Dataverse list response. Nested values (expanded
/// navigation properties, arrays) are left out of the entity.
pub(crate) fn parse_entity(record_value: &Value) -> Result<Entity, String> {
    let record = record_value
        .as_object()
        .ok_or_else(|| "Invalid response from Dataverse".to_string())?;

    let mut entity = Entity::new();
    for (key, value) in record {
        match scalar(value) {
            Some(row_value) => {
                entity.attributes.insert(key.clone(), row_value);
            }
            None => log::debug!("Skipping attribute {} with unsupported value", key),
        }
    }

    Ok(entity)
}

fn scalar(value: &Value) -> Option<RowValue> {
    match value {
        Value::Null => Some(RowValue::Null),
        Value::Bool(b) => Some(RowValue::Boolean(*b)),
        Value::String(s) => Some(RowValue::String(s.clone())),
        Value::Number(n) => n
            .as_i64()
            .map(RowValue::Int)
            .or_else(|| n.as_f64().map(RowValue::Float)),
        Value::Array(_) | Value::Object(_) => None,
    }
}
