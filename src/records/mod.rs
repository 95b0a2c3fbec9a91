//! Canonical record model
//!
//! Every resource instance the SDK touches is normalized into the generic
//! [`Record`] shape: an opaque identifier, a map from attribute name to a
//! list of values carrying provenance, and created/updated timestamps.
//! Resource-specific payloads (tasks, list entries) are canonicalized at the
//! boundary and never used as internal representation.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{Result, ServiceError};

/// Opaque record identifier. Immutable once a record has been created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordId {
    /// The upstream record identifier
    pub record_id: String,

    /// Object slug the record belongs to, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object: Option<String>,
}

impl RecordId {
    pub fn new(record_id: impl Into<String>) -> Self {
        Self {
            record_id: record_id.into(),
            object: None,
        }
    }

    pub fn for_object(record_id: impl Into<String>, object: impl Into<String>) -> Self {
        Self {
            record_id: record_id.into(),
            object: Some(object.into()),
        }
    }
}

/// One attribute value with its provenance, not just a scalar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordValue {
    /// The value itself
    pub value: Value,

    /// When this value became active upstream
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_from: Option<DateTime<Utc>>,

    /// Upstream attribute type (select, text, record-reference, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute_type: Option<String>,
}

impl RecordValue {
    /// Wrap a bare scalar with no provenance
    pub fn scalar(value: Value) -> Self {
        Self {
            value,
            active_from: None,
            attribute_type: None,
        }
    }

    /// Parse one entry of an upstream values array.
    ///
    /// Entries normally look like `{"value": ..., "active_from": ...}`; a
    /// few attribute types inline their payload instead, in which case the
    /// whole entry is kept as the value.
    pub fn from_api_entry(entry: &Value) -> Self {
        let active_from = entry
            .get("active_from")
            .and_then(|v| v.as_str())
            .and_then(parse_timestamp);
        let attribute_type = entry
            .get("attribute_type")
            .and_then(|v| v.as_str())
            .map(String::from);
        let value = entry.get("value").cloned().unwrap_or_else(|| entry.clone());

        Self {
            value,
            active_from,
            attribute_type,
        }
    }
}

/// Canonical generic representation of any resource instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Opaque identifier, immutable post-creation
    pub id: RecordId,

    /// Attribute name to value list. Keys are schema-dependent and not
    /// statically enumerable.
    #[serde(default)]
    pub values: BTreeMap<String, Vec<RecordValue>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,

    /// Flat compatibility fields emitted by some canonicalizations (tasks).
    /// Output-only mirrors; never consulted as primary representation.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Record {
    /// Create an empty record with the given identifier
    pub fn new(id: RecordId) -> Self {
        Self {
            id,
            values: BTreeMap::new(),
            created_at: None,
            updated_at: None,
            extra: BTreeMap::new(),
        }
    }

    /// Parse a record from the upstream envelope (one entry under `data`)
    pub fn from_api_value(raw: &Value) -> Result<Record> {
        let id = parse_record_id(raw)
            .ok_or_else(|| ServiceError::parsing("Record envelope is missing an identifier"))?;

        let mut record = Record::new(id);
        // List entries ship their attributes under `entry_values`.
        let values = raw.get("values").or_else(|| raw.get("entry_values"));
        if let Some(values) = values.and_then(|v| v.as_object()) {
            for (name, entries) in values {
                let parsed = match entries {
                    Value::Array(items) => items.iter().map(RecordValue::from_api_entry).collect(),
                    other => vec![RecordValue::scalar(other.clone())],
                };
                record.values.insert(name.clone(), parsed);
            }
        }

        record.created_at = raw
            .get("created_at")
            .and_then(|v| v.as_str())
            .and_then(parse_timestamp);
        record.updated_at = raw
            .get("updated_at")
            .and_then(|v| v.as_str())
            .and_then(parse_timestamp);

        Ok(record)
    }

    /// Set a single-valued attribute
    pub fn set_value(&mut self, name: impl Into<String>, value: RecordValue) {
        self.values.insert(name.into(), vec![value]);
    }

    /// First value of an attribute, if present
    pub fn first_value(&self, name: &str) -> Option<&Value> {
        self.values.get(name)?.first().map(|v| &v.value)
    }

    /// First value of an attribute as a string
    pub fn first_str(&self, name: &str) -> Option<&str> {
        self.first_value(name)?.as_str()
    }
}

fn parse_record_id(raw: &Value) -> Option<RecordId> {
    match raw.get("id") {
        Some(Value::Object(id)) => {
            let record_id = id
                .get("record_id")
                .or_else(|| id.get("entry_id"))
                .or_else(|| id.get("list_id"))
                .or_else(|| id.get("task_id"))?
                .as_str()?;
            let object = id.get("object_id").and_then(|v| v.as_str()).map(String::from);
            Some(RecordId {
                record_id: record_id.to_string(),
                object,
            })
        }
        Some(Value::String(s)) => Some(RecordId::new(s.clone())),
        _ => None,
    }
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// The three identifier shapes the task API has shipped over time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TaskIdentifier {
    /// `{"task_id": "..."}`
    TaskId { task_id: String },
    /// `{"id": "..."}`
    Generic { id: String },
    /// A bare string
    Bare(String),
}

impl TaskIdentifier {
    /// The canonical identifier value, regardless of shape
    pub fn value(&self) -> &str {
        match self {
            TaskIdentifier::TaskId { task_id } => task_id,
            TaskIdentifier::Generic { id } => id,
            TaskIdentifier::Bare(id) => id,
        }
    }
}

/// A task as returned by the upstream API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiTask {
    pub id: TaskIdentifier,

    #[serde(default, alias = "content_plaintext")]
    pub content: Option<String>,

    #[serde(default)]
    pub status: Option<String>,

    #[serde(default, alias = "deadline_at")]
    pub due_date: Option<String>,

    #[serde(default)]
    pub assignee: Option<Value>,

    #[serde(default)]
    pub created_at: Option<String>,
}

impl ApiTask {
    /// Canonicalize into a [`Record`].
    ///
    /// Lossless with respect to both representations: the structured
    /// `values` arrays and the flat mirror fields (`content`, `status`,
    /// `due_date`, `assignee`) are both emitted.
    pub fn to_record(&self) -> Record {
        let mut record = Record::new(RecordId::for_object(self.id.value(), "tasks"));

        if let Some(content) = &self.content {
            record.set_value("content", RecordValue::scalar(json!(content)));
            record.extra.insert("content".into(), json!(content));
        }
        if let Some(status) = &self.status {
            record.set_value("status", RecordValue::scalar(json!(status)));
            record.extra.insert("status".into(), json!(status));
        }
        if let Some(due_date) = &self.due_date {
            record.set_value("due_date", RecordValue::scalar(json!(due_date)));
            record.extra.insert("due_date".into(), json!(due_date));
        }
        if let Some(assignee) = &self.assignee {
            record.set_value("assignee", RecordValue::scalar(assignee.clone()));
            record.extra.insert("assignee".into(), assignee.clone());
        }

        record.created_at = self.created_at.as_deref().and_then(parse_timestamp);
        record
    }

    /// Rebuild the task view from a canonical record.
    ///
    /// Reads the structured values first and falls back to the flat mirror
    /// fields, so either representation alone is sufficient.
    pub fn from_record(record: &Record) -> ApiTask {
        let field = |name: &str| -> Option<String> {
            record
                .first_str(name)
                .map(String::from)
                .or_else(|| record.extra.get(name)?.as_str().map(String::from))
        };

        ApiTask {
            id: TaskIdentifier::TaskId {
                task_id: record.id.record_id.clone(),
            },
            content: field("content"),
            status: field("status"),
            due_date: field("due_date"),
            assignee: record
                .first_value("assignee")
                .cloned()
                .or_else(|| record.extra.get("assignee").cloned()),
            created_at: record.created_at.map(|dt| dt.to_rfc3339()),
        }
    }
}

/// Canonicalize a raw list entry into a [`Record`].
///
/// Scoping identifier precedence: the top-level `parent_record_id` wins
/// whenever the key is present with a non-null value, including the empty
/// string, which is a legitimate value that must survive. The nested copy
/// under `entry_values` only fills in when the top-level key is absent or
/// null. This precedence guards a previously shipped field-loss defect.
pub fn canonicalize_list_entry(raw: &Value) -> Result<Record> {
    let mut record = Record::from_api_value(raw)?;
    record.id.object = Some("lists".to_string());

    let top_level = match raw.get("parent_record_id") {
        Some(Value::Null) | None => None,
        Some(v) => Some(v.clone()),
    };
    let nested = raw
        .get("entry_values")
        .and_then(|ev| ev.get("parent_record_id"))
        .and_then(|v| match v {
            Value::Null => None,
            Value::Array(items) => items
                .first()
                .map(|entry| entry.get("value").cloned().unwrap_or_else(|| entry.clone())),
            other => Some(other.clone()),
        });

    if let Some(parent) = top_level.or(nested) {
        record.set_value("parent_record_id", RecordValue::scalar(parent));
    }

    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_record_envelope() {
        let raw = json!({
            "id": {"record_id": "rec_1", "object_id": "companies"},
            "values": {
                "name": [{"value": "Acme", "active_from": "2024-03-01T00:00:00Z"}],
                "domains": [{"value": "acme.com"}, {"value": "acme.io"}]
            },
            "created_at": "2024-03-01T00:00:00Z"
        });

        let record = Record::from_api_value(&raw).unwrap();
        assert_eq!(record.id.record_id, "rec_1");
        assert_eq!(record.first_str("name"), Some("Acme"));
        assert_eq!(record.values["domains"].len(), 2);
        assert!(record.values["name"][0].active_from.is_some());
        assert!(record.created_at.is_some());
    }

    #[test]
    fn task_identifier_accepts_all_three_shapes() {
        let a: TaskIdentifier = serde_json::from_value(json!({"task_id": "t1"})).unwrap();
        let b: TaskIdentifier = serde_json::from_value(json!({"id": "t2"})).unwrap();
        let c: TaskIdentifier = serde_json::from_value(json!("t3")).unwrap();

        assert_eq!(a.value(), "t1");
        assert_eq!(b.value(), "t2");
        assert_eq!(c.value(), "t3");
    }

    #[test]
    fn task_round_trip_preserves_both_representations() {
        let task = ApiTask {
            id: TaskIdentifier::Bare("t9".into()),
            content: Some("Follow up with Acme".into()),
            status: Some("open".into()),
            due_date: Some("2024-06-01".into()),
            assignee: Some(json!({"id": "member_1"})),
            created_at: None,
        };

        let record = task.to_record();

        // Both the structured values and the flat mirrors are present.
        assert_eq!(record.first_str("content"), Some("Follow up with Acme"));
        assert_eq!(record.extra["content"], json!("Follow up with Acme"));
        assert_eq!(record.first_str("status"), Some("open"));
        assert_eq!(record.extra["due_date"], json!("2024-06-01"));

        let back = ApiTask::from_record(&record);
        assert_eq!(back.id.value(), "t9");
        assert_eq!(back.content.as_deref(), Some("Follow up with Acme"));
        assert_eq!(back.status.as_deref(), Some("open"));
        assert_eq!(back.due_date.as_deref(), Some("2024-06-01"));
    }

    #[test]
    fn task_view_rebuilds_from_flat_mirrors_alone() {
        let mut record = Record::new(RecordId::for_object("t5", "tasks"));
        record.extra.insert("content".into(), json!("mirror only"));
        record.extra.insert("status".into(), json!("done"));

        let task = ApiTask::from_record(&record);
        assert_eq!(task.content.as_deref(), Some("mirror only"));
        assert_eq!(task.status.as_deref(), Some("done"));
    }

    #[test]
    fn list_scoping_prefers_top_level_even_when_empty() {
        let raw = json!({
            "id": {"entry_id": "e1"},
            "parent_record_id": "",
            "entry_values": {"parent_record_id": [{"value": "nested_id"}]}
        });

        let record = canonicalize_list_entry(&raw).unwrap();
        assert_eq!(record.first_value("parent_record_id"), Some(&json!("")));
    }

    #[test]
    fn list_scoping_falls_back_to_nested_on_null_or_absent() {
        for raw in [
            json!({
                "id": {"entry_id": "e2"},
                "parent_record_id": null,
                "entry_values": {"parent_record_id": [{"value": "nested_id"}]}
            }),
            json!({
                "id": {"entry_id": "e3"},
                "entry_values": {"parent_record_id": [{"value": "nested_id"}]}
            }),
        ] {
            let record = canonicalize_list_entry(&raw).unwrap();
            assert_eq!(
                record.first_value("parent_record_id"),
                Some(&json!("nested_id"))
            );
        }
    }

    #[test]
    fn list_scoping_left_unset_when_neither_exists() {
        let raw = json!({"id": {"entry_id": "e4"}, "entry_values": {}});
        let record = canonicalize_list_entry(&raw).unwrap();
        assert!(record.first_value("parent_record_id").is_none());
    }
}
