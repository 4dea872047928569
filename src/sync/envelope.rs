use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::model::PodMetadataBundle;

pub const ENVELOPE_VERSION: &str = "1.2";
pub const LEGACY_VERSION: &str = "legacy";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
    pub version: u64,
    pub hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionFingerprints {
    pub students: Fingerprint,
    pub pods: Fingerprint,
}

impl CollectionFingerprints {
    /// Content equality; write counters are informational.
    pub fn same_content(&self, other: &CollectionFingerprints) -> bool {
        self.students.hash == other.students.hash && self.pods.hash == other.pods.hash
    }
}

/// The single document exchanged with the remote replica. Student and pod
/// records are carried exactly as stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudEnvelope {
    pub students: Vec<Value>,
    #[serde(default)]
    pub pods: Vec<Value>,
    #[serde(default)]
    pub pod_metadata: BTreeMap<String, PodMetadataBundle>,
    #[serde(default)]
    pub last_sync: Option<String>,
    #[serde(default)]
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprints: Option<CollectionFingerprints>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyEnvelope {
    data: Vec<Value>,
    #[serde(default)]
    last_sync: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeShape {
    Current,
    Legacy,
}

impl EnvelopeShape {
    pub fn as_str(self) -> &'static str {
        match self {
            EnvelopeShape::Current => "current",
            EnvelopeShape::Legacy => "legacy",
        }
    }
}

/// Reads either the current shape or the students-only legacy shape.
pub fn parse_remote(doc: Value) -> Result<(CloudEnvelope, EnvelopeShape), serde_json::Error> {
    if doc.get("students").map_or(false, Value::is_array) {
        let envelope: CloudEnvelope = serde_json::from_value(doc)?;
        return Ok((envelope, EnvelopeShape::Current));
    }
    let legacy: LegacyEnvelope = serde_json::from_value(doc)?;
    Ok((
        CloudEnvelope {
            students: legacy.data,
            pods: Vec::new(),
            pod_metadata: BTreeMap::new(),
            last_sync: legacy.last_sync,
            version: LEGACY_VERSION.to_string(),
            fingerprints: None,
            device_id: None,
        },
        EnvelopeShape::Legacy,
    ))
}

/// SHA-256 over the canonical JSON form of a collection.
pub fn content_hash<T: Serialize>(items: &[T]) -> String {
    // Round-tripping through Value sorts object keys.
    let canonical = serde_json::to_value(items)
        .map(|v| v.to_string())
        .unwrap_or_default();
    format!("{:x}", Sha256::digest(canonical.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn current_shape_parses() {
        let doc = json!({
            "students": [{ "id": "s1", "name": "Ada" }],
            "pods": [{ "id": "p1", "name": "Blue", "studentIds": ["s1"] }],
            "podMetadata": { "p1": { "plan": { "title": "Fractions" } } },
            "lastSync": "2026-03-01T10:00:00.000Z",
            "version": "1.2"
        });
        let (env, shape) = parse_remote(doc).expect("parse");
        assert_eq!(shape, EnvelopeShape::Current);
        assert_eq!(env.pods[0]["studentIds"], json!(["s1"]));
        assert!(env.pod_metadata["p1"].plan.is_some());
        assert!(env.fingerprints.is_none());
    }

    #[test]
    fn legacy_shape_falls_back() {
        let doc = json!({ "data": [{ "id": "s1" }, { "id": "s2" }], "lastSync": "2025-01-01T00:00:00Z" });
        let (env, shape) = parse_remote(doc).expect("parse");
        assert_eq!(shape, EnvelopeShape::Legacy);
        assert_eq!(env.students.len(), 2);
        assert!(env.pods.is_empty());
        assert_eq!(env.version, LEGACY_VERSION);
    }

    #[test]
    fn loosely_typed_records_survive_unchanged() {
        let students = json!([
            { "id": "s1", "assessmentScore": "85", "archived": null },
            { "id": "s2", "assessmentScore": 72, "name": "Bo" }
        ]);
        let pods = json!([{ "id": "p1", "name": 4, "studentIds": ["s1", 2] }]);
        let doc = json!({ "students": students, "pods": pods, "version": "1.2" });
        let (env, _) = parse_remote(doc).expect("parse");
        assert_eq!(json!(env.students), students);
        assert_eq!(json!(env.pods), pods);
        let back = serde_json::to_value(&env).expect("serialize");
        assert_eq!(back["students"][1]["assessmentScore"], json!(72));
        assert!(back["students"][1].get("archived").is_none());
    }

    #[test]
    fn unknown_shape_is_an_error() {
        assert!(parse_remote(json!({ "hello": "world" })).is_err());
    }

    #[test]
    fn hash_ignores_key_order() {
        let a = vec![json!({ "id": "s1", "name": "Ada" })];
        let b: Vec<Value> = vec![serde_json::from_str(r#"{"name":"Ada","id":"s1"}"#).expect("json")];
        assert_eq!(content_hash(&a), content_hash(&b));
        assert_ne!(content_hash(&a), content_hash::<Value>(&[]));
    }
}
