//! The context pack builder.
//!
//! A context pack is the deterministic text bundle handed to approval
//! prompts and cross-agent handoffs: the latest cross-agent activities,
//! every gate approval, and every external call logged against the
//! task. Line format is stable — regenerating the pack for the same
//! rows yields byte-identical output.

use warden_core::{GovActivity, TaskId};

use crate::error::ActionResult;
use crate::service::Governance;

/// How many recent cross-agent activities a pack carries by default.
pub const DEFAULT_PACK_ACTIVITIES: usize = 20;

impl Governance {
    /// Render the context pack for a task.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn context_pack(&self, task_id: &TaskId) -> ActionResult<String> {
        self.context_pack_with_limit(task_id, DEFAULT_PACK_ACTIVITIES)
            .await
    }

    /// Render the context pack keeping at most `limit` activities.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn context_pack_with_limit(
        &self,
        task_id: &TaskId,
        limit: usize,
    ) -> ActionResult<String> {
        let activities = self.store().activities_for(task_id).await?;
        let approvals = self.store().approvals_for(task_id).await?;
        let ext_calls = self.store().ext_calls_for(task_id).await?;

        let cross_agent: Vec<&GovActivity> = activities
            .iter()
            .filter(|a| a.action.is_cross_agent())
            .collect();
        let recent = &cross_agent[cross_agent.len().saturating_sub(limit)..];

        let mut pack = String::new();
        pack.push_str(&format!("# Context: task {task_id}\n"));

        pack.push_str("## Recent activity\n");
        if recent.is_empty() {
            pack.push_str("(none)\n");
        }
        for activity in recent {
            let states = match (activity.from_state, activity.to_state) {
                (Some(from), Some(to)) => format!(" {from}->{to}"),
                (None, Some(to)) => format!(" ->{to}"),
                _ => String::new(),
            };
            let reason = activity
                .reason
                .as_deref()
                .map(|r| format!(": {r}"))
                .unwrap_or_default();
            pack.push_str(&format!(
                "- #{} {}{} by {}{}\n",
                activity.seq,
                activity.action,
                states,
                activity.actor,
                reason
            ));
        }

        pack.push_str("## Gate approvals\n");
        if approvals.is_empty() {
            pack.push_str("(none)\n");
        }
        for approval in &approvals {
            pack.push_str(&format!(
                "- {} approved by {} at {}\n",
                approval.gate,
                approval.approved_by,
                approval.approved_at.to_rfc3339()
            ));
        }

        pack.push_str("## External calls\n");
        if ext_calls.is_empty() {
            pack.push_str("(none)\n");
        }
        for call in &ext_calls {
            pack.push_str(&format!(
                "- {}:{} {} at {}\n",
                call.provider,
                call.action,
                if call.ok { "ok" } else { "failed" },
                call.at.to_rfc3339()
            ));
        }

        Ok(pack)
    }
}
