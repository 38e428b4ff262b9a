//! Mapping between `dataunit_core::Value` and SQLite storage classes.
//!
//! | Value | SQLite |
//! |-------|--------|
//! | `Bool` | INTEGER (0/1) |
//! | `Int`, `BigInt` | INTEGER |
//! | `Double` | REAL |
//! | `Text` | TEXT |
//! | `Bytes` | BLOB |
//! | `Uuid` | TEXT (hyphenated) |
//! | `Json` | TEXT |

use dataunit_core::Value;
use rusqlite::types::{Value as SqliteValue, ValueRef};

pub(crate) fn to_sqlite(value: &Value) -> SqliteValue {
    match value {
        Value::Null => SqliteValue::Null,
        Value::Bool(v) => SqliteValue::Integer(i64::from(*v)),
        Value::Int(v) => SqliteValue::Integer(i64::from(*v)),
        Value::BigInt(v) => SqliteValue::Integer(*v),
        Value::Double(v) => SqliteValue::Real(*v),
        Value::Text(v) => SqliteValue::Text(v.clone()),
        Value::Bytes(v) => SqliteValue::Blob(v.clone()),
        Value::Uuid(v) => SqliteValue::Text(v.hyphenated().to_string()),
        Value::Json(v) => SqliteValue::Text(v.to_string()),
    }
}

pub(crate) fn from_sqlite(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(v) => Value::BigInt(v),
        ValueRef::Real(v) => Value::Double(v),
        ValueRef::Text(v) => Value::Text(String::from_utf8_lossy(v).into_owned()),
        ValueRef::Blob(v) => Value::Bytes(v.to_vec()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn uuid_and_json_bind_as_text() {
        let id = Uuid::new_v4();
        assert_eq!(
            to_sqlite(&Value::Uuid(id)),
            SqliteValue::Text(id.to_string())
        );
        assert_eq!(
            to_sqlite(&Value::Json(serde_json::json!({"a": 1}))),
            SqliteValue::Text("{\"a\":1}".to_string())
        );
        assert_eq!(to_sqlite(&Value::Bool(true)), SqliteValue::Integer(1));
    }

    #[test]
    fn storage_classes_map_back() {
        assert_eq!(from_sqlite(ValueRef::Integer(3)), Value::BigInt(3));
        assert_eq!(from_sqlite(ValueRef::Text(b"hi")), Value::Text("hi".into()));
        assert_eq!(from_sqlite(ValueRef::Null), Value::Null);
    }
}
