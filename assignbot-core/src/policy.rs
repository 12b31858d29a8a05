use indexmap::IndexMap;
use serde::{Deserialize, Deserializer};
use thiserror::Error;

/// Named candidate groups, keyed by group name.
///
/// `IndexMap` preserves the order groups are declared in the policy file;
/// group selection iterates in that order.
pub type Groups = IndexMap<String, Vec<String>>;

/// Configuration errors that abort handling of the whole pull request event.
///
/// The messages are the exact strings users of the original configuration
/// format see, so they are kept verbatim.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Error in configuration file to do with using review groups. Expected 'reviewGroups' variable to be set because the variable 'useReviewGroups' = true.")]
    MissingReviewGroups,
    #[error("Error in configuration file to do with using review groups. Expected 'assigneeGroups' variable to be set because the variable 'useAssigneeGroups' = true.")]
    MissingAssigneeGroups,
}

/// The declarative reviewer/assignee policy, loaded from the repository's
/// `.github/auto_assign.yml` (or the configured path) once per PR event.
///
/// Field names follow the camelCase schema of the policy file. Every field
/// has a default so a partial policy file parses; the flags decide which
/// feature paths actually run.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Policy {
    pub add_reviewers: bool,
    pub add_assignees: bool,
    pub add_version_policy_reviewers: bool,
    pub reviewers: Vec<String>,
    pub assignees: Vec<String>,
    pub major_reviewers: Vec<String>,
    pub minor_reviewers: Vec<String>,
    pub patch_reviewers: Vec<String>,
    #[serde(deserialize_with = "clamped_count")]
    pub number_of_reviewers: u32,
    /// Absent means "borrow `numberOfReviewers`"; see
    /// [`Policy::resolved_assignee_count`].
    #[serde(deserialize_with = "clamped_count_opt")]
    pub number_of_assignees: Option<u32>,
    pub skip_keywords: Vec<String>,
    pub use_review_groups: bool,
    pub use_assignee_groups: bool,
    pub review_groups: Option<Groups>,
    pub assignee_groups: Option<Groups>,
}

/// Accept a signed count and clamp negatives to 0, which selection treats
/// as "select everyone".
fn clamped_count<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = i64::deserialize(deserializer)?;
    Ok(value.clamp(0, i64::from(u32::MAX)) as u32)
}

fn clamped_count_opt<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<i64>::deserialize(deserializer)?;
    Ok(value.map(|v| v.clamp(0, i64::from(u32::MAX)) as u32))
}

impl Policy {
    /// Check that every enabled group mode actually has its group map.
    ///
    /// A group flag set to true with the corresponding map missing is a
    /// configuration error fatal to the event; a *present but empty* map is
    /// fine and degrades to flat selection.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.use_review_groups && self.review_groups.is_none() {
            return Err(ConfigError::MissingReviewGroups);
        }
        if self.use_assignee_groups && self.assignee_groups.is_none() {
            return Err(ConfigError::MissingAssigneeGroups);
        }
        Ok(())
    }

    /// The per-output assignee count: `numberOfAssignees` when configured
    /// (including an explicit 0, which means "everyone"), otherwise
    /// `numberOfReviewers`.
    pub fn resolved_assignee_count(&self) -> u32 {
        self.number_of_assignees
            .unwrap_or(self.number_of_reviewers)
    }

    /// Review groups, when group mode is enabled and at least one group is
    /// declared. `None` means "use the flat reviewer pool".
    pub fn active_review_groups(&self) -> Option<&Groups> {
        if !self.use_review_groups {
            return None;
        }
        self.review_groups.as_ref().filter(|g| !g.is_empty())
    }

    /// Assignee groups, symmetric to [`Policy::active_review_groups`].
    pub fn active_assignee_groups(&self) -> Option<&Groups> {
        if !self.use_assignee_groups {
            return None;
        }
        self.assignee_groups.as_ref().filter(|g| !g.is_empty())
    }
}
