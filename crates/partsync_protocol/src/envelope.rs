//! Remote storage layout for a collection.

use crate::error::ProtocolResult;
use crate::key::CollectionKey;
use crate::record::{decode_records, Record};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The value stored at a collection's remote path.
///
/// ```json
/// { "data": [ ...records ], "updatedAt": 1700000000000,
///   "updatedBy": "device_…", "opId": "op:device_…:users:…" }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteEnvelope {
    /// The collection's records.
    pub data: Vec<Record>,
    /// Time of the write, epoch millis.
    #[serde(default)]
    pub updated_at: i64,
    /// Device that performed the write.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<String>,
    /// Idempotency token of the write.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub op_id: Option<String>,
}

impl RemoteEnvelope {
    /// Creates an envelope for a write performed by `device_id`.
    pub fn new(
        data: Vec<Record>,
        updated_at: i64,
        device_id: impl Into<String>,
        op_id: impl Into<String>,
    ) -> Self {
        Self {
            data,
            updated_at,
            updated_by: Some(device_id.into()),
            op_id: Some(op_id.into()),
        }
    }

    /// Encodes the envelope as a JSON value.
    pub fn to_value(&self) -> ProtocolResult<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

/// A decoded remote value for one collection, from a pull or a push.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemoteSnapshot {
    /// Whether the remote path held any value.
    pub exists: bool,
    /// Records found at the path.
    pub records: Vec<Record>,
    /// Envelope timestamp, `0` when absent.
    pub updated_at: i64,
    /// Device that wrote the value, if recorded.
    pub updated_by: Option<String>,
    /// Operation id of the write, if recorded.
    pub op_id: Option<String>,
}

impl RemoteSnapshot {
    /// Decodes whatever the remote holds at a collection path.
    ///
    /// Accepts an envelope (object with a `data` array or envelope
    /// metadata), a bare array of records, or an object keyed by id. Anything else decodes to an empty
    /// record list.
    pub fn decode(value: Option<&Value>) -> Self {
        let value = match value {
            None | Some(Value::Null) => return Self::default(),
            Some(value) => value,
        };

        if let Value::Object(map) = value {
            if let Some(data) = map.get("data").filter(|data| is_envelope(map, data)) {
                return Self {
                    exists: true,
                    records: decode_records(data),
                    updated_at: map.get("updatedAt").and_then(Value::as_i64).unwrap_or(0),
                    updated_by: map
                        .get("updatedBy")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                    op_id: map.get("opId").and_then(Value::as_str).map(str::to_string),
                };
            }
        }

        Self {
            exists: true,
            records: decode_records(value),
            ..Self::default()
        }
    }

    /// Returns true if this snapshot is the echo of a write with `op_id`
    /// made by `device_id`.
    pub fn is_echo_of(&self, device_id: &str, op_id: &str) -> bool {
        self.updated_by.as_deref() == Some(device_id) && self.op_id.as_deref() == Some(op_id)
    }
}

/// An object is an envelope when its `data` is a record array or it also
/// carries envelope metadata; otherwise `data` is just a record id.
fn is_envelope(map: &Map<String, Value>, data: &Value) -> bool {
    data.is_array()
        || map.get("updatedAt").is_some_and(Value::is_number)
        || map.get("updatedBy").is_some_and(Value::is_string)
        || map.get("opId").is_some_and(Value::is_string)
}

/// Generates an idempotency token for a write of `key` by `device_id`.
pub fn new_op_id(device_id: &str, key: &CollectionKey) -> String {
    format!("op:{}:{}:{}", device_id, key, uuid::Uuid::new_v4().simple())
}
