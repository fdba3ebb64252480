//! Property values stored on nodes and relationships

use chrono::NaiveDateTime;
use std::collections::HashMap;

/// Typed property value.
///
/// `DateTime` is the store's native temporal type; imported timestamps are
/// parsed into it rather than kept as text.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Integer(i64),
    Float(f64),
    DateTime(NaiveDateTime),
}

impl From<i64> for PropertyValue {
    fn from(i: i64) -> Self {
        PropertyValue::Integer(i)
    }
}

pub type PropertyMap = HashMap<String, PropertyValue>;
