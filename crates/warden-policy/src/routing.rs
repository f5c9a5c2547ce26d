//! Gate → approver-group routing.
//!
//! Every gate maps to exactly one approver group; the mapping is fixed
//! per deployment and loaded at startup. Two rules guard the mapping:
//! only the mapped group (or main) may approve, and the executing group
//! may never approve its own work.

use std::collections::HashMap;

use warden_core::{ErrorCode, GateType, GroupId};

/// The static gate → approver mapping for one deployment.
#[derive(Debug, Clone)]
pub struct ApproverMap {
    map: HashMap<GateType, GroupId>,
}

impl ApproverMap {
    /// Build a map from explicit entries.
    #[must_use]
    pub fn new(entries: impl IntoIterator<Item = (GateType, GroupId)>) -> Self {
        Self {
            map: entries.into_iter().collect(),
        }
    }

    /// The approver group for a gate, if the deployment routes it.
    #[must_use]
    pub fn approver(&self, gate: GateType) -> Option<&GroupId> {
        self.map.get(&gate)
    }

    /// Check whether `actor` may approve `gate` on work executed by
    /// `executor`.
    ///
    /// - The actor must be the mapped approver group; `main` overrides.
    /// - The executor group may not approve its own work, even if it is
    ///   the mapped approver (`main` again overrides).
    ///
    /// Returns the denial code on failure.
    pub fn check_approver(
        &self,
        gate: GateType,
        actor: &GroupId,
        executor: Option<&GroupId>,
    ) -> Result<(), ErrorCode> {
        if actor.is_main() {
            return Ok(());
        }
        let Some(approver) = self.approver(gate) else {
            return Err(ErrorCode::Forbidden);
        };
        if actor != approver {
            return Err(ErrorCode::Forbidden);
        }
        if executor.is_some_and(|e| e == actor) {
            return Err(ErrorCode::Forbidden);
        }
        Ok(())
    }
}

impl Default for ApproverMap {
    /// The conventional deployment mapping: each gate is approved by the
    /// group folder of the same name.
    fn default() -> Self {
        Self::new([
            (GateType::Security, GroupId::from("security")),
            (GateType::RevOps, GroupId::from("revops")),
            (GateType::Claims, GroupId::from("claims")),
            (GateType::Product, GroupId::from("product")),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mapped_approver_passes() {
        let map = ApproverMap::default();
        assert!(
            map.check_approver(
                GateType::Security,
                &GroupId::from("security"),
                Some(&GroupId::from("developer"))
            )
            .is_ok()
        );
    }

    #[test]
    fn test_wrong_group_is_forbidden() {
        let map = ApproverMap::default();
        assert_eq!(
            map.check_approver(GateType::Security, &GroupId::from("developer"), None),
            Err(ErrorCode::Forbidden)
        );
    }

    #[test]
    fn test_main_overrides() {
        let map = ApproverMap::default();
        assert!(map.check_approver(GateType::Claims, &GroupId::main(), None).is_ok());
    }

    #[test]
    fn test_executor_cannot_self_approve() {
        let map = ApproverMap::default();
        // security executed the task; security is also the mapped approver.
        assert_eq!(
            map.check_approver(
                GateType::Security,
                &GroupId::from("security"),
                Some(&GroupId::from("security"))
            ),
            Err(ErrorCode::Forbidden)
        );
    }

    #[test]
    fn test_unrouted_gate_is_forbidden() {
        let map = ApproverMap::new([]);
        assert_eq!(
            map.check_approver(GateType::Product, &GroupId::from("product"), None),
            Err(ErrorCode::Forbidden)
        );
    }
}
