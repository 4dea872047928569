use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const STUDENTS: &str = "students";
pub const PODS: &str = "pods";

pub const STUDENT_ID_PREFIX: &str = "student_";
pub const POD_ID_PREFIX: &str = "pod_";

/// Id prefix used when upserting into a named collection.
pub fn id_prefix_for(collection: &str) -> &'static str {
    match collection {
        STUDENTS => STUDENT_ID_PREFIX,
        PODS => POD_ID_PREFIX,
        _ => "item_",
    }
}

/// Student and pod records stay untyped JSON objects end to end. The UI owns
/// their profile fields; this engine only reads the id.
pub fn record_id<'a>(record: &'a Value, id_field: &str) -> Option<&'a str> {
    record
        .get(id_field)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionStatus {
    #[serde(default)]
    pub executed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executed_at: Option<String>,
    #[serde(default)]
    pub feedback_complete: bool,
}

/// Per-pod artifacts stored outside the pod collection. Each field is independent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodMetadataBundle {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_history: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution: Option<ExecutionStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<Vec<Value>>,
}

impl PodMetadataBundle {
    /// True when no field carries data worth syncing.
    pub fn is_empty(&self) -> bool {
        let plan_empty = match &self.plan {
            None | Some(Value::Null) => true,
            Some(Value::Object(m)) => m.is_empty(),
            Some(_) => false,
        };
        plan_empty
            && self.plan_history.as_ref().map_or(true, |h| h.is_empty())
            && self.execution.is_none()
            && self.feedback.as_ref().map_or(true, |f| f.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupSnapshot {
    pub ts: String,
    pub data: Vec<Value>,
}
