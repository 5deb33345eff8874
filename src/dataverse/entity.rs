use std::collections::HashMap;

/// Represents a Dataverse attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Signed 64-bit integer.
    Int(i64),
    /// Floating point value.
    Float(f64),
    /// String value.
    String(String),
    /// Boolean value.
    Boolean(bool),
    /// Null value.
    Null,
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(value) => Some(value),
            _ => None,
        }
    }

    /// Render scalar values the way Dataverse setting columns store them.
    pub fn to_setting_string(&self) -> Option<String> {
        match self {
            Value::Int(value) => Some(value.to_string()),
            Value::Float(value) => Some(value.to_string()),
            Value::String(value) => Some(value.clone()),
            Value::Boolean(value) => Some(value.to_string()),
            Value::Null => None,
        }
    }
}

/// Attribute logical name.
pub type Attribute = String;

/// Dataverse entity record with attribute values.
#[derive(Debug, Default)]
pub struct Entity {
    /// Attribute map keyed by logical names.
    pub attributes: HashMap<Attribute, Value>,
}

impl Entity {
    /// Create a new empty entity.
    pub fn new() -> Self {
        Entity {
            attributes: HashMap::new(),
        }
    }

    pub fn get(&self, attribute: &str) -> Option<&Value> {
        self.attributes.get(attribute)
    }

    /// String attribute, `None` when missing, null or not a string.
    pub fn string(&self, attribute: &str) -> Option<&str> {
        self.get(attribute).and_then(Value::as_str)
    }
}
