//! The external-provider capability registry.
//!
//! Workers never call providers directly; they read their group's
//! `ext_capabilities.json` snapshot to learn which provider actions the
//! broker would execute for them and at what access level. The registry
//! here is the CP-side source of that snapshot.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use warden_core::GroupId;

/// Whether an action is usable by the group the snapshot is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionStatus {
    /// Usable at the group's current level.
    #[serde(rename = "available")]
    Available,
    /// Exists, but the group's level is too low.
    #[serde(rename = "requires_higher_level")]
    RequiresHigherLevel,
    /// Explicitly denied to this group.
    #[serde(rename = "DENIED")]
    Denied,
}

/// One provider action as the worker sees it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionInfo {
    /// Access level the action requires (1..=3).
    pub level: u8,
    /// Human description.
    pub description: String,
    /// Usability for the snapshot's group.
    pub status: ActionStatus,
}

/// One provider entry in the capability snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderCapability {
    /// Provider name.
    pub provider: String,
    /// The group's access level for this provider.
    pub access_level: u8,
    /// Explicit allow-list, when configured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_actions: Option<Vec<String>>,
    /// Explicit deny-list, when configured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub denied_actions: Option<Vec<String>>,
    /// Expiry of a temporary grant.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
    /// Action name → details. Ordered map keeps snapshots byte-stable.
    pub actions: BTreeMap<String, ActionInfo>,
}

/// Registry entry: one action a provider offers.
#[derive(Debug, Clone)]
struct RegisteredAction {
    name: &'static str,
    level: u8,
    description: &'static str,
}

/// CP-side provider registry with per-group access levels.
#[derive(Debug, Clone)]
pub struct CapabilityRegistry {
    providers: Vec<(&'static str, Vec<RegisteredAction>)>,
    /// Group folder → access level; absent groups default to level 1.
    group_levels: BTreeMap<String, u8>,
}

impl CapabilityRegistry {
    /// The built-in provider catalogue.
    #[must_use]
    pub fn with_defaults() -> Self {
        let action = |name, level, description| RegisteredAction {
            name,
            level,
            description,
        };
        Self {
            providers: vec![
                (
                    "github",
                    vec![
                        action("list_issues", 1, "List repository issues"),
                        action("create_issue", 2, "Open a new issue"),
                        action("merge_pr", 3, "Merge a pull request"),
                    ],
                ),
                (
                    "calendar",
                    vec![
                        action("list_events", 1, "List upcoming events"),
                        action("create_event", 2, "Create a calendar event"),
                    ],
                ),
                (
                    "trello",
                    vec![
                        action("list_cards", 1, "List board cards"),
                        action("move_card", 2, "Move a card between lists"),
                    ],
                ),
            ],
            group_levels: BTreeMap::new(),
        }
    }

    /// Set a group's access level (1..=3).
    #[must_use]
    pub fn with_group_level(mut self, group: &GroupId, level: u8) -> Self {
        self.group_levels.insert(group.to_string(), level);
        self
    }

    /// The access level for a group: configured, or 3 for main, or 1.
    #[must_use]
    pub fn level_for(&self, group: &GroupId) -> u8 {
        self.group_levels
            .get(group.as_str())
            .copied()
            .unwrap_or(if group.is_main() { 3 } else { 1 })
    }

    /// Provider names in the registry.
    #[must_use]
    pub fn provider_names(&self) -> Vec<String> {
        self.providers.iter().map(|(name, _)| (*name).to_string()).collect()
    }

    /// Build the capability view for one group.
    #[must_use]
    pub fn capabilities_for(&self, group: &GroupId) -> Vec<ProviderCapability> {
        let access_level = self.level_for(group);
        self.providers
            .iter()
            .map(|(provider, actions)| {
                let actions = actions
                    .iter()
                    .map(|a| {
                        let status = if a.level <= access_level {
                            ActionStatus::Available
                        } else {
                            ActionStatus::RequiresHigherLevel
                        };
                        (
                            a.name.to_string(),
                            ActionInfo {
                                level: a.level,
                                description: a.description.to_string(),
                                status,
                            },
                        )
                    })
                    .collect();
                ProviderCapability {
                    provider: (*provider).to_string(),
                    access_level,
                    allowed_actions: None,
                    denied_actions: None,
                    expires_at: None,
                    actions,
                }
            })
            .collect()
    }
}

impl Default for CapabilityRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_main_gets_full_access() {
        let registry = CapabilityRegistry::with_defaults();
        let caps = registry.capabilities_for(&GroupId::main());
        let github = caps.iter().find(|c| c.provider == "github").unwrap();
        assert_eq!(github.access_level, 3);
        assert_eq!(github.actions["merge_pr"].status, ActionStatus::Available);
    }

    #[test]
    fn test_default_group_is_level_one() {
        let registry = CapabilityRegistry::with_defaults();
        let caps = registry.capabilities_for(&GroupId::from("developer"));
        let github = caps.iter().find(|c| c.provider == "github").unwrap();
        assert_eq!(github.actions["list_issues"].status, ActionStatus::Available);
        assert_eq!(
            github.actions["create_issue"].status,
            ActionStatus::RequiresHigherLevel
        );
    }

    #[test]
    fn test_configured_level_wins() {
        let group = GroupId::from("developer");
        let registry = CapabilityRegistry::with_defaults().with_group_level(&group, 2);
        let caps = registry.capabilities_for(&group);
        let github = caps.iter().find(|c| c.provider == "github").unwrap();
        assert_eq!(github.actions["create_issue"].status, ActionStatus::Available);
        assert_eq!(
            github.actions["merge_pr"].status,
            ActionStatus::RequiresHigherLevel
        );
    }
}
