//! The task context strict-mode checks evaluate against.
//!
//! Tasks carry their checklist, evidence links, docs flag and override
//! grant in the open-world `metadata` blob; [`PolicyContext::from_task`]
//! lifts the known keys into typed form and ignores the rest.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use warden_core::{GovApproval, GovTask, TaskType};

/// One definition-of-done checklist item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DodItem {
    /// The checklist text.
    pub item: String,
    /// Whether the item is complete.
    #[serde(default)]
    pub done: bool,
}

/// An override grant attached to a task.
///
/// All four fields must be present for the override to be usable;
/// each absent field produces its own error code.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OverrideGrant {
    /// Who authorised the override.
    #[serde(default)]
    pub by: Option<String>,
    /// Why the gate is being bypassed.
    #[serde(default)]
    pub reason: Option<String>,
    /// Explicit acknowledgement of the accepted risk.
    #[serde(default, rename = "acceptedRisk")]
    pub accepted_risk: Option<String>,
    /// ISO-8601 deadline for the post-hoc review.
    #[serde(default, rename = "reviewDeadlineIso")]
    pub review_deadline_iso: Option<String>,
}

impl OverrideGrant {
    /// Whether every required field is present and non-empty.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        let filled = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.is_empty());
        filled(&self.by)
            && filled(&self.reason)
            && filled(&self.accepted_risk)
            && filled(&self.review_deadline_iso)
    }
}

/// Everything strict mode needs to know about a task.
#[derive(Debug, Clone, Default)]
pub struct PolicyContext {
    /// Work classification, for the docs-updated check.
    pub task_type: Option<TaskType>,
    /// The definition-of-done checklist.
    pub dod_checklist: Vec<DodItem>,
    /// Whether the evidence-required flag was explicitly set.
    pub evidence_required: Option<bool>,
    /// Evidence links attached to the task or its approvals.
    pub evidence_links: Vec<String>,
    /// Whether docs were updated.
    pub docs_updated: bool,
    /// Whether the task's gate (if any) has been approved.
    pub gate_approved: bool,
    /// Whether the task carries a gate at all.
    pub has_gate: bool,
    /// Override grant, if one is being used.
    pub override_grant: Option<OverrideGrant>,
}

impl PolicyContext {
    /// Build a context from a task row and its recorded approvals.
    ///
    /// Metadata keys read: `dod` (`{checklist, evidenceRequired}`),
    /// `evidence` (array of links), `docsUpdated` (bool), `override`
    /// (the grant object). Unknown keys are left untouched.
    #[must_use]
    pub fn from_task(task: &GovTask, approvals: &[GovApproval]) -> Self {
        let dod = task.metadata.get("dod");
        let dod_checklist = dod
            .and_then(|d| d.get("checklist"))
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| serde_json::from_value(v.clone()).ok())
                    .collect()
            })
            .unwrap_or_default();
        let evidence_required = dod
            .and_then(|d| d.get("evidenceRequired"))
            .and_then(Value::as_bool);

        let mut evidence_links: Vec<String> = task
            .metadata
            .get("evidence")
            .and_then(Value::as_array)
            .map(|links| {
                links
                    .iter()
                    .filter_map(Value::as_str)
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();
        // Per-approval evidence counts too.
        evidence_links.extend(
            approvals
                .iter()
                .filter_map(|a| a.notes.clone())
                .filter(|n| !n.is_empty()),
        );

        let docs_updated = task
            .metadata
            .get("docsUpdated")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        let gate_approved = match task.gate {
            Some(gate) => approvals.iter().any(|a| a.gate == gate),
            None => false,
        };

        let override_grant = task
            .metadata
            .get("override")
            .and_then(|v| serde_json::from_value(v.clone()).ok());

        Self {
            task_type: Some(task.task_type),
            dod_checklist,
            evidence_required,
            evidence_links,
            docs_updated,
            gate_approved,
            has_gate: task.gate.is_some(),
            override_grant,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use warden_core::{GateType, Priority, TaskId, TaskScope, TaskState};

    fn task_with_metadata(metadata: serde_json::Value) -> GovTask {
        let Value::Object(metadata) = metadata else {
            panic!("metadata fixture must be an object")
        };
        GovTask {
            id: TaskId::from("T1"),
            title: "t".into(),
            description: String::new(),
            task_type: TaskType::Feature,
            priority: Priority::P1,
            state: TaskState::Review,
            gate: Some(GateType::Security),
            scope: TaskScope::Company,
            product_id: None,
            assigned_group: None,
            executor: None,
            created_by: "test".into(),
            dod_required: true,
            metadata,
            version: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_context_lifts_dod_and_evidence() {
        let task = task_with_metadata(json!({
            "dod": {
                "checklist": [{"item": "tests pass", "done": true}],
                "evidenceRequired": true
            },
            "evidence": ["https://ci.example/run/1"],
            "docsUpdated": true
        }));
        let ctx = PolicyContext::from_task(&task, &[]);
        assert_eq!(ctx.dod_checklist.len(), 1);
        assert!(ctx.dod_checklist[0].done);
        assert_eq!(ctx.evidence_required, Some(true));
        assert_eq!(ctx.evidence_links, vec!["https://ci.example/run/1"]);
        assert!(ctx.docs_updated);
        assert!(!ctx.gate_approved);
    }

    #[test]
    fn test_gate_approved_from_approvals() {
        let task = task_with_metadata(json!({}));
        let approval = GovApproval {
            task_id: task.id.clone(),
            gate: GateType::Security,
            approved_by: "security".into(),
            approved_at: Utc::now(),
            notes: None,
        };
        let ctx = PolicyContext::from_task(&task, std::slice::from_ref(&approval));
        assert!(ctx.gate_approved);
    }

    #[test]
    fn test_override_completeness() {
        let complete = OverrideGrant {
            by: Some("main".into()),
            reason: Some("hotfix".into()),
            accepted_risk: Some("regression window".into()),
            review_deadline_iso: Some("2026-09-01T00:00:00Z".into()),
        };
        assert!(complete.is_complete());

        let partial = OverrideGrant {
            by: Some("main".into()),
            ..OverrideGrant::default()
        };
        assert!(!partial.is_complete());
    }
}
