//! Records held in tracked collections.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::borrow::Cow;

/// Field holding a record's identity.
pub const ID_FIELD: &str = "id";

/// Field holding a record's last mutation time (epoch millis).
pub const UPDATED_AT_FIELD: &str = "updatedAt";

/// A single entity of a tracked collection.
///
/// A record is an open JSON object: the sync layer only interprets the
/// `id` and `updatedAt` fields and carries every other field through
/// untouched.
///
/// # Identity
///
/// A record's id is its `id` field when that field is a non-empty string
/// or an integer (integers are compared by their decimal form). Records
/// without a usable id are invalid and never survive a merge.
///
/// # Example
///
/// ```rust
/// use partsync_protocol::Record;
/// use serde_json::json;
///
/// let record = Record::from_value(json!({"id": "u1", "updatedAt": 42, "name": "Ana"})).unwrap();
/// assert_eq!(record.id().as_deref(), Some("u1"));
/// assert_eq!(record.updated_at(), 42);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    /// Creates an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a record with the given id.
    pub fn with_id(id: impl Into<String>) -> Self {
        let mut record = Self::new();
        record.insert(ID_FIELD, Value::String(id.into()));
        record
    }

    /// Wraps an existing JSON object.
    pub fn from_map(map: Map<String, Value>) -> Self {
        Self(map)
    }

    /// Converts a JSON value into a record.
    ///
    /// Returns `None` for anything that is not a JSON object.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    /// Returns the record's id, if it has a usable one.
    pub fn id(&self) -> Option<Cow<'_, str>> {
        match self.0.get(ID_FIELD)? {
            Value::String(s) if !s.is_empty() => Some(Cow::Borrowed(s.as_str())),
            Value::Number(n) if n.is_i64() || n.is_u64() => Some(Cow::Owned(n.to_string())),
            _ => None,
        }
    }

    /// Returns true if the record carries a usable id.
    pub fn has_id(&self) -> bool {
        self.id().is_some()
    }

    /// Returns the last mutation time in whole epoch millis.
    ///
    /// A missing or non-numeric `updatedAt` reads as `0`, the oldest
    /// possible version. Fractional values are truncated; version
    /// comparisons go through [`Record::is_newer_than`], which does not.
    pub fn updated_at(&self) -> i64 {
        match self.0.get(UPDATED_AT_FIELD) {
            Some(Value::Number(n)) => {
                if let Some(v) = n.as_i64() {
                    v
                } else if n.as_u64().is_some() {
                    i64::MAX
                } else {
                    n.as_f64()
                        .filter(|f| f.is_finite())
                        .map(|f| f as i64)
                        .unwrap_or(0)
                }
            }
            _ => 0,
        }
    }

    /// Returns true if this version's `updatedAt` is strictly greater than
    /// `other`'s, comparing the raw numbers.
    pub fn is_newer_than(&self, other: &Record) -> bool {
        self.version() > other.version()
    }

    fn version(&self) -> f64 {
        match self.0.get(UPDATED_AT_FIELD) {
            Some(Value::Number(n)) => n.as_f64().filter(|f| !f.is_nan()).unwrap_or(0.0),
            _ => 0.0,
        }
    }

    /// Stamps `updatedAt` with the given time.
    pub fn touch(&mut self, now_ms: i64) {
        self.insert(UPDATED_AT_FIELD, Value::from(now_ms));
    }

    /// Builder form of [`Record::touch`].
    pub fn touched(mut self, now_ms: i64) -> Self {
        self.touch(now_ms);
        self
    }

    /// Returns a field value.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Sets a field value, returning the previous one.
    pub fn insert(&mut self, field: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(field.into(), value)
    }

    /// Builder form of [`Record::insert`].
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(field, value.into());
        self
    }

    /// Borrows the underlying JSON object.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Converts the record into a JSON value.
    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl From<Record> for Value {
    fn from(record: Record) -> Self {
        record.into_value()
    }
}

/// Decodes a remote or persisted collection value into records.
///
/// Accepts the shapes a realtime database hands back for a list:
/// - `null` (no data) decodes to an empty list
/// - an array of objects
/// - an object keyed by id or index, whose values are the records
///
/// Entries that are not JSON objects are dropped. Id-less objects are kept
/// here; the merge engine is where they get filtered out.
pub fn decode_records(value: &Value) -> Vec<Record> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| Record::from_value(item.clone()))
            .collect(),
        Value::Object(map) => map
            .values()
            .filter_map(|item| Record::from_value(item.clone()))
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        Record::from_value(value).unwrap()
    }

    #[test]
    fn string_and_integer_ids() {
        assert_eq!(record(json!({"id": "abc"})).id().as_deref(), Some("abc"));
        assert_eq!(record(json!({"id": 17})).id().as_deref(), Some("17"));
    }

    #[test]
    fn unusable_ids() {
        assert!(record(json!({"id": ""})).id().is_none());
        assert!(record(json!({"id": null})).id().is_none());
        assert!(record(json!({"id": 1.5})).id().is_none());
        assert!(record(json!({"id": ["x"]})).id().is_none());
        assert!(record(json!({"username": "x"})).id().is_none());
    }

    #[test]
    fn updated_at_defaults_to_zero() {
        assert_eq!(record(json!({"id": "1"})).updated_at(), 0);
        assert_eq!(record(json!({"id": "1", "updatedAt": "yesterday"})).updated_at(), 0);
        assert_eq!(record(json!({"id": "1", "updatedAt": null})).updated_at(), 0);
    }

    #[test]
    fn updated_at_numeric_forms() {
        assert_eq!(record(json!({"updatedAt": 1_700_000_000_000_i64})).updated_at(), 1_700_000_000_000);
        assert_eq!(record(json!({"updatedAt": 12.9})).updated_at(), 12);
        assert_eq!(record(json!({"updatedAt": -5})).updated_at(), -5);
        assert_eq!(record(json!({"updatedAt": u64::MAX})).updated_at(), i64::MAX);
    }

    #[test]
    fn fractional_versions_compare_exactly() {
        let newer = record(json!({"id": "1", "updatedAt": 12.9}));
        let older = record(json!({"id": "1", "updatedAt": 12.5}));
        assert!(newer.is_newer_than(&older));
        assert!(!older.is_newer_than(&newer));
        assert!(!newer.is_newer_than(&newer.clone()));
        assert!(record(json!({"updatedAt": 1})).is_newer_than(&record(json!({"id": "x"}))));
        assert!(!record(json!({"updatedAt": "soon"})).is_newer_than(&record(json!({}))));
    }

    #[test]
    fn touch_stamps_timestamp() {
        let r = Record::with_id("p1").with("codigo", "CS124").touched(99);
        assert_eq!(r.updated_at(), 99);
        assert_eq!(r.get("codigo"), Some(&json!("CS124")));
    }

    #[test]
    fn from_value_rejects_non_objects() {
        assert!(Record::from_value(json!([1, 2])).is_none());
        assert!(Record::from_value(json!("id")).is_none());
        assert!(Record::from_value(Value::Null).is_none());
    }

    #[test]
    fn decode_array_and_object_shapes() {
        let array = json!([{"id": "a"}, 7, {"id": "b"}, null]);
        let ids: Vec<_> = decode_records(&array)
            .iter()
            .filter_map(|r| r.id().map(|id| id.into_owned()))
            .collect();
        assert_eq!(ids, vec!["a", "b"]);

        let object = json!({"a": {"id": "a"}, "b": "junk"});
        assert_eq!(decode_records(&object).len(), 1);

        assert!(decode_records(&Value::Null).is_empty());
        assert!(decode_records(&json!(42)).is_empty());
    }

    #[test]
    fn serde_is_transparent() {
        let r = Record::with_id("x").with("v", 1);
        let text = serde_json::to_string(&r).unwrap();
        assert_eq!(text, r#"{"id":"x","v":1}"#);
        let back: Record = serde_json::from_str(&text).unwrap();
        assert_eq!(back, r);
    }
}
