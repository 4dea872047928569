use serde_json::Value;

use super::keys::PodMetaField;
use super::{now_iso, LocalStore};
use crate::model::{ExecutionStatus, PodMetadataBundle};

impl LocalStore {
    pub fn pod_metadata(&self, pod_id: &str) -> PodMetadataBundle {
        PodMetadataBundle {
            plan: self
                .get_json::<Value>(&PodMetaField::Plan.key(pod_id))
                .filter(|v| !v.is_null()),
            plan_history: self.get_json(&PodMetaField::PlanHistory.key(pod_id)),
            execution: self.get_json(&PodMetaField::Execution.key(pod_id)),
            feedback: self.get_json(&PodMetaField::Feedback.key(pod_id)),
        }
    }

    /// Writes every field present in `bundle`; absent fields are left as stored.
    pub fn write_pod_metadata(&self, pod_id: &str, bundle: &PodMetadataBundle) -> bool {
        let mut ok = true;
        if let Some(plan) = &bundle.plan {
            ok &= self.set_json(&PodMetaField::Plan.key(pod_id), plan);
        }
        if let Some(history) = &bundle.plan_history {
            ok &= self.set_json(&PodMetaField::PlanHistory.key(pod_id), history);
        }
        if let Some(execution) = &bundle.execution {
            ok &= self.set_json(&PodMetaField::Execution.key(pod_id), execution);
        }
        if let Some(feedback) = &bundle.feedback {
            ok &= self.set_json(&PodMetaField::Feedback.key(pod_id), feedback);
        }
        ok
    }

    pub fn save_plan(&self, pod_id: &str, plan: &Value) -> bool {
        self.set_json(&PodMetaField::Plan.key(pod_id), plan)
    }

    /// Plan history is append-only.
    pub fn append_plan_history(&self, pod_id: &str, entry: Value) -> usize {
        let key = PodMetaField::PlanHistory.key(pod_id);
        let mut history: Vec<Value> = self.get_json(&key).unwrap_or_default();
        history.push(entry);
        if self.set_json(&key, &history) {
            history.len()
        } else {
            history.len() - 1
        }
    }

    pub fn set_execution(&self, pod_id: &str, mut status: ExecutionStatus) -> Option<ExecutionStatus> {
        if status.executed && status.executed_at.is_none() {
            status.executed_at = Some(now_iso());
        }
        self.set_json(&PodMetaField::Execution.key(pod_id), &status)
            .then_some(status)
    }

    /// Keeps at most one entry per `studentId`, replacing it in place.
    pub fn submit_feedback(&self, pod_id: &str, entry: Value) -> bool {
        let key = PodMetaField::Feedback.key(pod_id);
        let mut entries: Vec<Value> = self.get_json(&key).unwrap_or_default();
        let student_id = entry.get("studentId").and_then(|v| v.as_str()).map(str::to_string);
        let slot = student_id.as_deref().and_then(|sid| {
            entries
                .iter()
                .position(|e| e.get("studentId").and_then(|v| v.as_str()) == Some(sid))
        });
        match slot {
            Some(idx) => entries[idx] = entry,
            None => entries.push(entry),
        }
        self.set_json(&key, &entries)
    }
}
