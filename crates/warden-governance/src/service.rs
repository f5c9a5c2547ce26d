//! The governance service: task CRUD, transitions, approvals, override.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{Map, Value};
use tracing::info;

use warden_core::{
    ActivityAction, ErrorCode, GateType, GovApproval, GovTask, GroupId, Priority, ProductId,
    TaskId, TaskPatch, TaskScope, TaskState, TaskType,
};
use warden_policy::{ApproverMap, PolicyContext, TransitionCheck, validate_transition};
use warden_store::GovStore;

use crate::error::{ActionError, ActionResult};

/// Input for task creation.
#[derive(Debug, Clone)]
pub struct NewTask {
    /// Opaque stable id minted by the inbound channel or admin.
    pub id: TaskId,
    /// Short human title.
    pub title: String,
    /// Longer description.
    pub description: String,
    /// Work classification.
    pub task_type: TaskType,
    /// Priority.
    pub priority: Priority,
    /// Required approval gate, if any.
    pub gate: Option<GateType>,
    /// Company or product scope.
    pub scope: TaskScope,
    /// Product, required when product-scoped.
    pub product_id: Option<ProductId>,
    /// Assigned worker group.
    pub assigned_group: Option<GroupId>,
    /// Creating principal.
    pub created_by: String,
    /// Whether a definition-of-done is required.
    pub dod_required: bool,
    /// Initial metadata.
    pub metadata: Map<String, Value>,
}

/// A successful transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionOutcome {
    /// State before.
    pub from: TaskState,
    /// State after.
    pub to: TaskState,
    /// The task's new version.
    pub version: u64,
}

/// The one write path for governance state.
pub struct Governance {
    store: Arc<GovStore>,
    approvers: ApproverMap,
    strict: bool,
}

impl Governance {
    /// Build over the shared store.
    #[must_use]
    pub fn new(store: Arc<GovStore>, approvers: ApproverMap, strict: bool) -> Self {
        Self {
            store,
            approvers,
            strict,
        }
    }

    /// The shared store, for read paths that bypass the service.
    #[must_use]
    pub fn store(&self) -> &Arc<GovStore> {
        &self.store
    }

    /// The deployment's gate routing.
    #[must_use]
    pub fn approvers(&self) -> &ApproverMap {
        &self.approvers
    }

    /// Create a task in INBOX and log the `create` activity.
    ///
    /// # Errors
    ///
    /// Denies with `FORBIDDEN` when the scope invariant is violated
    /// (PRODUCT scope without a product id) or when the id is taken.
    pub async fn create_task(&self, new: NewTask) -> ActionResult<GovTask> {
        if new.scope == TaskScope::Product && new.product_id.is_none() {
            return Err(ActionError::denied(ErrorCode::Forbidden));
        }
        let now = Utc::now();
        let task = GovTask {
            id: new.id,
            title: new.title,
            description: new.description,
            task_type: new.task_type,
            priority: new.priority,
            state: TaskState::Inbox,
            gate: new.gate,
            scope: new.scope,
            product_id: new.product_id,
            assigned_group: new.assigned_group,
            executor: None,
            created_by: new.created_by.clone(),
            dod_required: new.dod_required,
            metadata: new.metadata,
            version: 0,
            created_at: now,
            updated_at: now,
        };
        if !self.store.create_task(&task).await? {
            return Err(ActionError::denied(ErrorCode::Forbidden));
        }
        self.store
            .append_activity(
                &task.id,
                ActivityAction::Create,
                None,
                Some(task.state),
                &new.created_by,
                None,
            )
            .await?;
        info!(task = %task.id, "task created");
        Ok(task)
    }

    /// Transition a task, consulting the policy engine and writing under
    /// the optimistic version check.
    ///
    /// `expected_version` is optional: when omitted the current version
    /// is read and one attempt is made — a racing writer still surfaces
    /// `VERSION_CONFLICT`, there is no silent retry.
    ///
    /// # Errors
    ///
    /// `Denied` with policy codes, or with `VERSION_CONFLICT` plus the
    /// current row coordinates when the conditional write loses.
    pub async fn transition(
        &self,
        task_id: &TaskId,
        to: TaskState,
        actor: &str,
        reason: Option<String>,
        expected_version: Option<u64>,
    ) -> ActionResult<TransitionOutcome> {
        let task = self
            .store
            .get_task(task_id)
            .await?
            .ok_or_else(|| ActionError::NotFound(task_id.clone()))?;

        let approvals = self.store.approvals_for(task_id).await?;
        let ctx = PolicyContext::from_task(&task, &approvals);
        if let TransitionCheck::Rejected(codes) =
            validate_transition(task.state, to, Some(&ctx), self.strict)
        {
            return Err(ActionError::Denied {
                codes,
                current_state: Some(task.state),
                current_version: Some(task.version),
            });
        }

        let expected = expected_version.unwrap_or(task.version);
        self.apply_transition(&task, to, expected, actor, reason).await
    }

    /// The dispatch loop's transition path: actor `system`, expected
    /// version taken from the row the loop already holds.
    ///
    /// # Errors
    ///
    /// Same shape as [`transition`](Self::transition).
    pub async fn dispatch_transition(
        &self,
        task: &GovTask,
        to: TaskState,
    ) -> ActionResult<TransitionOutcome> {
        let approvals = self.store.approvals_for(&task.id).await?;
        let ctx = PolicyContext::from_task(task, &approvals);
        if let TransitionCheck::Rejected(codes) =
            validate_transition(task.state, to, Some(&ctx), self.strict)
        {
            return Err(ActionError::Denied {
                codes,
                current_state: Some(task.state),
                current_version: Some(task.version),
            });
        }
        self.apply_transition(task, to, task.version, "system", None)
            .await
    }

    async fn apply_transition(
        &self,
        task: &GovTask,
        to: TaskState,
        expected_version: u64,
        actor: &str,
        reason: Option<String>,
    ) -> ActionResult<TransitionOutcome> {
        let patch = TaskPatch::to_state(to);
        if !self.store.update_task(&task.id, expected_version, &patch).await? {
            // Lost the race; report where the row actually is.
            let current = self.store.get_task(&task.id).await?;
            return Err(ActionError::Denied {
                codes: vec![ErrorCode::VersionConflict],
                current_state: current.as_ref().map(|t| t.state),
                current_version: current.as_ref().map(|t| t.version),
            });
        }

        self.store
            .append_activity(
                &task.id,
                ActivityAction::Transition,
                Some(task.state),
                Some(to),
                actor,
                reason,
            )
            .await?;

        Ok(TransitionOutcome {
            from: task.state,
            to,
            version: expected_version + 1,
        })
    }

    /// Record a gate approval. Idempotent on (task, gate): re-approving
    /// succeeds without a second row or activity.
    ///
    /// # Errors
    ///
    /// `FORBIDDEN` when the actor is not the routed approver group (main
    /// overrides) or when the executing group approves itself.
    pub async fn approve(
        &self,
        task_id: &TaskId,
        gate: GateType,
        actor_group: &GroupId,
        notes: Option<String>,
    ) -> ActionResult<()> {
        let task = self
            .store
            .get_task(task_id)
            .await?
            .ok_or_else(|| ActionError::NotFound(task_id.clone()))?;

        if let Err(code) =
            self.approvers
                .check_approver(gate, actor_group, task.assigned_group.as_ref())
        {
            return Err(ActionError::denied(code));
        }

        let approval = GovApproval {
            task_id: task_id.clone(),
            gate,
            approved_by: actor_group.to_string(),
            approved_at: Utc::now(),
            notes,
        };
        if self.store.create_approval(&approval).await? {
            self.store
                .append_activity(
                    task_id,
                    ActivityAction::Approve,
                    None,
                    None,
                    actor_group.as_str(),
                    Some(format!("gate {gate} approved")),
                )
                .await?;
        }
        Ok(())
    }

    /// Force a task to DONE with an override grant.
    ///
    /// Only allowed from REVIEW or APPROVAL, and only with all four
    /// override fields present; the grant is persisted in metadata so
    /// the post-hoc review has it on record.
    ///
    /// # Errors
    ///
    /// `Denied` with `INVALID_TRANSITION` from other states, one
    /// `OVERRIDE_MISSING_*` per absent field, or `VERSION_CONFLICT`.
    pub async fn override_to_done(
        &self,
        task_id: &TaskId,
        by: &str,
        reason: &str,
        accepted_risk: &str,
        review_deadline_iso: &str,
    ) -> ActionResult<TransitionOutcome> {
        let task = self
            .store
            .get_task(task_id)
            .await?
            .ok_or_else(|| ActionError::NotFound(task_id.clone()))?;

        if !matches!(task.state, TaskState::Review | TaskState::Approval) {
            return Err(ActionError::Denied {
                codes: vec![ErrorCode::InvalidTransition],
                current_state: Some(task.state),
                current_version: Some(task.version),
            });
        }

        let mut codes = Vec::new();
        if by.is_empty() {
            codes.push(ErrorCode::OverrideMissingBy);
        }
        if reason.is_empty() {
            codes.push(ErrorCode::OverrideMissingReason);
        }
        if accepted_risk.is_empty() {
            codes.push(ErrorCode::OverrideMissingAcceptedRisk);
        }
        if review_deadline_iso.is_empty() {
            codes.push(ErrorCode::OverrideMissingReviewDeadline);
        }
        if !codes.is_empty() {
            return Err(ActionError::Denied {
                codes,
                current_state: Some(task.state),
                current_version: Some(task.version),
            });
        }

        let mut metadata = Map::new();
        metadata.insert(
            "override".to_string(),
            serde_json::json!({
                "by": by,
                "reason": reason,
                "acceptedRisk": accepted_risk,
                "reviewDeadlineIso": review_deadline_iso,
            }),
        );
        let patch = TaskPatch {
            state: Some(TaskState::Done),
            metadata: Some(metadata),
            ..TaskPatch::default()
        };
        if !self.store.update_task(task_id, task.version, &patch).await? {
            let current = self.store.get_task(task_id).await?;
            return Err(ActionError::Denied {
                codes: vec![ErrorCode::VersionConflict],
                current_state: current.as_ref().map(|t| t.state),
                current_version: current.as_ref().map(|t| t.version),
            });
        }

        self.store
            .append_activity(
                task_id,
                ActivityAction::Override,
                Some(task.state),
                Some(TaskState::Done),
                by,
                Some(reason.to_string()),
            )
            .await?;

        info!(task = %task_id, by, "gate overridden to DONE");
        Ok(TransitionOutcome {
            from: task.state,
            to: TaskState::Done,
            version: task.version + 1,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn governance() -> Governance {
        Governance::new(Arc::new(GovStore::in_memory()), ApproverMap::default(), false)
    }

    fn new_task(id: &str) -> NewTask {
        NewTask {
            id: TaskId::from(id),
            title: "a task".into(),
            description: String::new(),
            task_type: TaskType::Feature,
            priority: Priority::P2,
            gate: None,
            scope: TaskScope::Company,
            product_id: None,
            assigned_group: Some(GroupId::from("developer")),
            created_by: "admin".into(),
            dod_required: false,
            metadata: Map::new(),
        }
    }

    #[tokio::test]
    async fn test_create_logs_activity() {
        let gov = governance();
        let task = gov.create_task(new_task("T1")).await.unwrap();
        assert_eq!(task.state, TaskState::Inbox);
        assert_eq!(task.version, 0);

        let activities = gov.store().activities_for(&task.id).await.unwrap();
        assert_eq!(activities.len(), 1);
        assert_eq!(activities[0].action, ActivityAction::Create);
    }

    #[tokio::test]
    async fn test_product_scope_requires_product() {
        let gov = governance();
        let mut input = new_task("T1");
        input.scope = TaskScope::Product;
        let err = gov.create_task(input).await.unwrap_err();
        assert_eq!(err.codes(), &[ErrorCode::Forbidden]);
    }

    #[tokio::test]
    async fn test_transition_walks_graph_and_bumps_version() {
        let gov = governance();
        let task = gov.create_task(new_task("T1")).await.unwrap();

        let outcome = gov
            .transition(&task.id, TaskState::Triaged, "admin", None, None)
            .await
            .unwrap();
        assert_eq!(outcome.from, TaskState::Inbox);
        assert_eq!(outcome.version, 1);

        let err = gov
            .transition(&task.id, TaskState::Done, "admin", None, None)
            .await
            .unwrap_err();
        assert_eq!(err.codes(), &[ErrorCode::InvalidTransition]);
    }

    #[tokio::test]
    async fn test_stale_expected_version_is_conflict() {
        let gov = governance();
        let task = gov.create_task(new_task("T1")).await.unwrap();
        gov.transition(&task.id, TaskState::Triaged, "admin", None, None)
            .await
            .unwrap();

        let err = gov
            .transition(&task.id, TaskState::Ready, "admin", None, Some(0))
            .await
            .unwrap_err();
        assert_eq!(err.codes(), &[ErrorCode::VersionConflict]);
        let ActionError::Denied { current_version, current_state, .. } = err else {
            panic!("expected denial")
        };
        assert_eq!(current_version, Some(1));
        assert_eq!(current_state, Some(TaskState::Triaged));
    }

    #[tokio::test]
    async fn test_approve_is_idempotent_with_one_activity() {
        let gov = governance();
        let mut input = new_task("T1");
        input.gate = Some(GateType::Security);
        let task = gov.create_task(input).await.unwrap();

        let security = GroupId::from("security");
        gov.approve(&task.id, GateType::Security, &security, None).await.unwrap();
        gov.approve(&task.id, GateType::Security, &security, None).await.unwrap();

        let approvals = gov.store().approvals_for(&task.id).await.unwrap();
        assert_eq!(approvals.len(), 1);
        let approve_activities: Vec<_> = gov
            .store()
            .activities_for(&task.id)
            .await
            .unwrap()
            .into_iter()
            .filter(|a| a.action == ActivityAction::Approve)
            .collect();
        assert_eq!(approve_activities.len(), 1);
    }

    #[tokio::test]
    async fn test_wrong_group_cannot_approve() {
        let gov = governance();
        let mut input = new_task("T1");
        input.gate = Some(GateType::Security);
        let task = gov.create_task(input).await.unwrap();

        let err = gov
            .approve(&task.id, GateType::Security, &GroupId::from("developer"), None)
            .await
            .unwrap_err();
        assert_eq!(err.codes(), &[ErrorCode::Forbidden]);
    }

    #[tokio::test]
    async fn test_override_from_review_reaches_done() {
        let gov = governance();
        let task = gov.create_task(new_task("T1")).await.unwrap();
        for (i, state) in [
            TaskState::Triaged,
            TaskState::Ready,
            TaskState::Doing,
            TaskState::Review,
        ]
        .iter()
        .enumerate()
        {
            gov.transition(&task.id, *state, "admin", None, Some(i as u64))
                .await
                .unwrap();
        }

        let outcome = gov
            .override_to_done(&task.id, "main", "deadline", "known regression risk", "2026-09-01T00:00:00Z")
            .await
            .unwrap();
        assert_eq!(outcome.to, TaskState::Done);

        let stored = gov.store().get_task(&task.id).await.unwrap().unwrap();
        assert_eq!(stored.state, TaskState::Done);
        assert!(stored.metadata.contains_key("override"));
    }

    #[tokio::test]
    async fn test_override_requires_all_fields() {
        let gov = governance();
        let task = gov.create_task(new_task("T1")).await.unwrap();
        for (i, state) in [
            TaskState::Triaged,
            TaskState::Ready,
            TaskState::Doing,
            TaskState::Review,
        ]
        .iter()
        .enumerate()
        {
            gov.transition(&task.id, *state, "admin", None, Some(i as u64))
                .await
                .unwrap();
        }

        let err = gov
            .override_to_done(&task.id, "main", "", "", "")
            .await
            .unwrap_err();
        let codes = err.codes();
        assert!(codes.contains(&ErrorCode::OverrideMissingReason));
        assert!(codes.contains(&ErrorCode::OverrideMissingAcceptedRisk));
        assert!(codes.contains(&ErrorCode::OverrideMissingReviewDeadline));
    }

    #[tokio::test]
    async fn test_override_rejected_outside_review_or_approval() {
        let gov = governance();
        let task = gov.create_task(new_task("T1")).await.unwrap();
        let err = gov
            .override_to_done(&task.id, "main", "r", "ar", "2026-09-01T00:00:00Z")
            .await
            .unwrap_err();
        assert_eq!(err.codes(), &[ErrorCode::InvalidTransition]);
    }
}
