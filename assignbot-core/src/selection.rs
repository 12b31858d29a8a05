//! Reviewer and assignee selection.
//!
//! Four cooperating pure functions: the skip filter, flat selection over a
//! single candidate pool, per-group selection, and version-tier selection.
//! All randomness comes from the caller-supplied generator, so concurrent
//! PR events never share sampling state and tests can seed the draw.

use rand::seq::SliceRandom;
use rand::Rng;
use thiserror::Error;

use crate::policy::{Groups, Policy};

/// A selection candidate, routed to the matching output channel.
///
/// Policy files write team entries as `org/team-slug`; the review-request
/// API wants the bare slug, so the org prefix is dropped at parse time.
/// Everything without a slash is a user login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Candidate {
    User(String),
    Team(String),
}

impl Candidate {
    pub fn parse(identifier: &str) -> Self {
        match identifier.rsplit_once('/') {
            Some((_, slug)) => Candidate::Team(slug.to_string()),
            None => Candidate::User(identifier.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Candidate::User(login) => login,
            Candidate::Team(slug) => slug,
        }
    }

    fn is_author(&self, author: &str) -> bool {
        matches!(self, Candidate::User(login) if login == author)
    }
}

/// Reviewers split into the two channels the review-request API takes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionResult {
    pub reviewers: Vec<String>,
    pub team_reviewers: Vec<String>,
}

impl SelectionResult {
    fn from_candidates(candidates: Vec<Candidate>) -> Self {
        let mut result = SelectionResult::default();
        for candidate in candidates {
            match candidate {
                Candidate::User(login) => result.reviewers.push(login),
                Candidate::Team(slug) => result.team_reviewers.push(slug),
            }
        }
        result
    }

    pub fn is_empty(&self) -> bool {
        self.reviewers.is_empty() && self.team_reviewers.is_empty()
    }
}

/// The PR carries none of the `Major`/`Minor`/`Patch` labels.
///
/// Fatal to version-tier selection only; the reviewer and assignee paths
/// proceed regardless.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("no version label found: expected one of 'Major', 'Minor' or 'Patch'")]
pub struct VersionLabelError;

/// Which of the three disjoint version reviewer pools applies to a PR.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionTier {
    Major,
    Minor,
    Patch,
}

impl VersionTier {
    /// Derive the tier from the PR's label names, checked in priority order:
    /// a mislabeled PR carrying several version labels resolves to the
    /// highest tier.
    pub fn from_labels(labels: &[String]) -> Result<Self, VersionLabelError> {
        for tier in [VersionTier::Major, VersionTier::Minor, VersionTier::Patch] {
            if labels.iter().any(|label| label == tier.label()) {
                return Ok(tier);
            }
        }
        Err(VersionLabelError)
    }

    pub fn label(&self) -> &'static str {
        match self {
            VersionTier::Major => "Major",
            VersionTier::Minor => "Minor",
            VersionTier::Patch => "Patch",
        }
    }
}

/// Whether the PR title opts out of automation.
///
/// Case-insensitive substring match: true iff the title is non-empty, at
/// least one keyword is configured, and some keyword occurs in the title.
pub fn should_skip(title: &str, keywords: &[String]) -> bool {
    if title.is_empty() || keywords.is_empty() {
        return false;
    }
    let title = title.to_lowercase();
    keywords
        .iter()
        .any(|keyword| title.contains(&keyword.to_lowercase()))
}

/// Draw `count` distinct elements uniformly without replacement, or clone
/// everything when `count` is 0 ("notify everyone").
fn sample<R: Rng, T: Clone>(rng: &mut R, candidates: &[T], count: u32) -> Vec<T> {
    if count == 0 {
        return candidates.to_vec();
    }
    let take = (count as usize).min(candidates.len());
    candidates.choose_multiple(rng, take).cloned().collect()
}

/// Parse a pool into candidates, dropping the PR author.
fn eligible(author: &str, pool: &[String]) -> Vec<Candidate> {
    pool.iter()
        .map(|identifier| Candidate::parse(identifier))
        .filter(|candidate| !candidate.is_author(author))
        .collect()
}

/// Select from a flat pool of identifiers, never including the author.
///
/// An empty result (e.g. when the pool contains only the author) is a
/// normal "nothing to do" outcome, not an error.
pub fn select_flat<R: Rng>(
    rng: &mut R,
    author: &str,
    pool: &[String],
    count: u32,
) -> Vec<Candidate> {
    sample(rng, &eligible(author, pool), count)
}

/// Flat selection restricted to user logins, for the assignee channel.
///
/// Team entries are dropped before sampling, so a configured count is
/// still filled from the remaining users.
fn select_users<R: Rng>(rng: &mut R, author: &str, pool: &[String], count: u32) -> Vec<String> {
    let users: Vec<Candidate> = eligible(author, pool)
        .into_iter()
        .filter(|candidate| matches!(candidate, Candidate::User(_)))
        .collect();
    sample(rng, &users, count)
        .into_iter()
        .map(|candidate| candidate.name().to_string())
        .collect()
}

/// Select `count` members independently from each group, in the order the
/// groups are declared, and concatenate the picks.
///
/// Groups are sampled independently: a login appearing in several groups can
/// be selected once per group, and the combined list is not deduplicated.
pub fn select_from_groups<R: Rng>(
    rng: &mut R,
    author: &str,
    groups: &Groups,
    count: u32,
) -> Vec<Candidate> {
    let mut picked = Vec::new();
    for members in groups.values() {
        picked.extend(select_flat(rng, author, members, count));
    }
    picked
}

/// Reviewer selection for the `addReviewers` path.
///
/// Uses group selection when review groups are enabled and at least one
/// group is declared, otherwise the flat `reviewers` pool.
pub fn choose_reviewers<R: Rng>(rng: &mut R, author: &str, policy: &Policy) -> SelectionResult {
    let picked = match policy.active_review_groups() {
        Some(groups) => select_from_groups(rng, author, groups, policy.number_of_reviewers),
        None => select_flat(rng, author, &policy.reviewers, policy.number_of_reviewers),
    };
    SelectionResult::from_candidates(picked)
}

/// Assignee selection for the `addAssignees` path.
///
/// The assignee pool defaults to the reviewer pool when `assignees` is not
/// configured, and the count defaults to `numberOfReviewers` when
/// `numberOfAssignees` is absent. When the borrowed reviewer pool contains
/// only the author, the result is empty and no assignees are added.
/// Issues take user assignees only, so `org/team-slug` entries reaching
/// the assignee pool are never selected.
pub fn choose_assignees<R: Rng>(rng: &mut R, author: &str, policy: &Policy) -> Vec<String> {
    let count = policy.resolved_assignee_count();
    match policy.active_assignee_groups() {
        Some(groups) => {
            let mut picked = Vec::new();
            for members in groups.values() {
                picked.extend(select_users(rng, author, members, count));
            }
            picked
        }
        None => {
            let pool = if policy.assignees.is_empty() {
                &policy.reviewers
            } else {
                &policy.assignees
            };
            select_users(rng, author, pool, count)
        }
    }
}

/// Reviewer selection for the `addVersionPolicyReviewers` path: sample the
/// pool matching the PR's version tier with the configured reviewer count.
pub fn choose_version_reviewers<R: Rng>(
    rng: &mut R,
    author: &str,
    tier: VersionTier,
    policy: &Policy,
) -> SelectionResult {
    let pool = match tier {
        VersionTier::Major => &policy.major_reviewers,
        VersionTier::Minor => &policy.minor_reviewers,
        VersionTier::Patch => &policy.patch_reviewers,
    };
    SelectionResult::from_candidates(select_flat(
        rng,
        author,
        pool,
        policy.number_of_reviewers,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(42)
    }

    fn logins(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn groups(entries: &[(&str, &[&str])]) -> Groups {
        entries
            .iter()
            .map(|(name, members)| (name.to_string(), logins(members)))
            .collect()
    }

    #[test]
    fn test_should_skip_matches_keyword() {
        assert!(should_skip("wip: fix bug", &logins(&["wip"])));
    }

    #[test]
    fn test_should_skip_is_case_insensitive() {
        assert!(should_skip("WIP: fix bug", &logins(&["wip"])));
        assert!(should_skip("do not merge", &logins(&["DO NOT MERGE"])));
    }

    #[test]
    fn test_should_skip_matches_substring_anywhere() {
        assert!(should_skip("fix bug [wip]", &logins(&["wip"])));
    }

    #[test]
    fn test_should_skip_false_without_keywords() {
        assert!(!should_skip("wip: fix bug", &[]));
    }

    #[test]
    fn test_should_skip_false_for_empty_title() {
        assert!(!should_skip("", &logins(&["wip"])));
    }

    #[test]
    fn test_should_skip_false_when_no_keyword_matches() {
        assert!(!should_skip("fix bug", &logins(&["wip", "draft"])));
    }

    #[test]
    fn test_select_flat_count_zero_returns_everyone() {
        let pool = logins(&["r1", "r2", "r3"]);
        let mut picked: Vec<String> = select_flat(&mut rng(), "r4", &pool, 0)
            .into_iter()
            .map(|c| c.name().to_string())
            .collect();
        picked.sort();
        assert_eq!(picked, logins(&["r1", "r2", "r3"]));
    }

    #[test]
    fn test_select_flat_excludes_author() {
        let pool = logins(&["r1", "r2", "r3", "author"]);
        let picked = select_flat(&mut rng(), "author", &pool, 2);
        assert_eq!(picked.len(), 2);
        for candidate in &picked {
            assert_ne!(candidate.name(), "author");
        }
    }

    #[test]
    fn test_select_flat_caps_at_pool_size() {
        let pool = logins(&["r1", "r2"]);
        let picked = select_flat(&mut rng(), "author", &pool, 5);
        assert_eq!(picked.len(), 2);
    }

    #[test]
    fn test_select_flat_pool_of_only_author_is_empty() {
        let pool = logins(&["author"]);
        assert!(select_flat(&mut rng(), "author", &pool, 0).is_empty());
        assert!(select_flat(&mut rng(), "author", &pool, 3).is_empty());
    }

    #[test]
    fn test_select_flat_empty_pool_is_empty() {
        assert!(select_flat(&mut rng(), "author", &[], 2).is_empty());
    }

    #[test]
    fn test_select_flat_no_duplicates() {
        let pool = logins(&["r1", "r2", "r3", "r4", "r5"]);
        for seed in 0..20 {
            let mut rng = StdRng::seed_from_u64(seed);
            let picked = select_flat(&mut rng, "author", &pool, 3);
            let mut names: Vec<&str> = picked.iter().map(|c| c.name()).collect();
            names.sort();
            names.dedup();
            assert_eq!(names.len(), 3);
        }
    }

    #[test]
    fn test_team_identifiers_route_to_team_channel() {
        let pool = logins(&["org/team-a", "user1"]);
        let result =
            SelectionResult::from_candidates(select_flat(&mut rng(), "author", &pool, 0));
        assert_eq!(result.reviewers, logins(&["user1"]));
        assert_eq!(result.team_reviewers, logins(&["team-a"]));
    }

    #[test]
    fn test_select_from_groups_sums_per_group_minimum() {
        // min(2, 3) from A plus min(2, 1) from B.
        let groups = groups(&[("A", &["g1a", "g1b", "g1c"]), ("B", &["g2a"])]);
        let picked = select_from_groups(&mut rng(), "author", &groups, 2);
        assert_eq!(picked.len(), 3);
        let names: Vec<&str> = picked.iter().map(|c| c.name()).collect();
        assert!(names.contains(&"g2a"), "B's sole member must be included");
    }

    #[test]
    fn test_select_from_groups_preserves_group_order() {
        let groups = groups(&[("A", &["g1a", "g1b"]), ("B", &["g2a", "g2b"])]);
        let picked = select_from_groups(&mut rng(), "author", &groups, 1);
        assert_eq!(picked.len(), 2);
        assert!(picked[0].name().starts_with("g1"));
        assert!(picked[1].name().starts_with("g2"));
    }

    #[test]
    fn test_select_from_groups_excludes_author_per_group() {
        let groups = groups(&[("A", &["author", "g1a"]), ("B", &["author"])]);
        let picked = select_from_groups(&mut rng(), "author", &groups, 0);
        let names: Vec<&str> = picked.iter().map(|c| c.name()).collect();
        assert_eq!(names, ["g1a"]);
    }

    #[test]
    fn test_select_from_groups_keeps_duplicates_across_groups() {
        // Independent per-group sampling: membership in two groups yields
        // two picks.
        let groups = groups(&[("A", &["dup"]), ("B", &["dup"])]);
        let picked = select_from_groups(&mut rng(), "author", &groups, 1);
        let names: Vec<&str> = picked.iter().map(|c| c.name()).collect();
        assert_eq!(names, ["dup", "dup"]);
    }

    #[test]
    fn test_choose_reviewers_flat() {
        let policy = Policy {
            reviewers: logins(&["r1", "r2", "r3"]),
            number_of_reviewers: 0,
            ..Policy::default()
        };
        let mut result = choose_reviewers(&mut rng(), "r4", &policy);
        result.reviewers.sort();
        assert_eq!(result.reviewers, logins(&["r1", "r2", "r3"]));
        assert!(result.team_reviewers.is_empty());
    }

    #[test]
    fn test_choose_reviewers_uses_groups_when_enabled() {
        let policy = Policy {
            use_review_groups: true,
            review_groups: Some(groups(&[
                ("A", &["group1-user1", "group1-user2", "group1-user3"]),
                ("B", &["group2-user1", "group2-user2", "group2-user3"]),
            ])),
            number_of_reviewers: 1,
            ..Policy::default()
        };
        let result = choose_reviewers(&mut rng(), "author", &policy);
        assert_eq!(result.reviewers.len(), 2);
        assert!(result.reviewers[0].starts_with("group1"));
        assert!(result.reviewers[1].starts_with("group2"));
    }

    #[test]
    fn test_choose_reviewers_empty_group_map_falls_back_to_flat() {
        let policy = Policy {
            use_review_groups: true,
            review_groups: Some(Groups::new()),
            reviewers: logins(&["r1", "r2", "r3"]),
            number_of_reviewers: 1,
            ..Policy::default()
        };
        let result = choose_reviewers(&mut rng(), "author", &policy);
        assert_eq!(result.reviewers.len(), 1);
        assert!(result.reviewers[0].starts_with("r"));
    }

    #[test]
    fn test_choose_assignees_defaults_to_reviewer_pool() {
        let policy = Policy {
            reviewers: logins(&["r1", "r2", "r3", "author"]),
            number_of_reviewers: 0,
            ..Policy::default()
        };
        let mut assignees = choose_assignees(&mut rng(), "author", &policy);
        assignees.sort();
        assert_eq!(assignees, logins(&["r1", "r2", "r3"]));
    }

    #[test]
    fn test_choose_assignees_explicit_pool_wins() {
        let policy = Policy {
            reviewers: logins(&["r1", "r2", "r3"]),
            assignees: logins(&["assignee1", "author"]),
            number_of_reviewers: 0,
            number_of_assignees: Some(2),
            ..Policy::default()
        };
        let assignees = choose_assignees(&mut rng(), "author", &policy);
        assert_eq!(assignees, logins(&["assignee1"]));
    }

    #[test]
    fn test_choose_assignees_borrows_reviewer_count() {
        let policy = Policy {
            assignees: logins(&["a1", "a2", "a3"]),
            number_of_reviewers: 2,
            number_of_assignees: None,
            ..Policy::default()
        };
        let assignees = choose_assignees(&mut rng(), "author", &policy);
        assert_eq!(assignees.len(), 2);
    }

    #[test]
    fn test_choose_assignees_empty_when_reviewers_only_contain_author() {
        // Borrowed reviewer pool holding only the PR author means there is
        // nobody to assign; the orchestrator treats this as a no-op.
        let policy = Policy {
            reviewers: logins(&["author"]),
            number_of_reviewers: 0,
            ..Policy::default()
        };
        assert!(choose_assignees(&mut rng(), "author", &policy).is_empty());
    }

    #[test]
    fn test_choose_assignees_skips_team_entries() {
        // Teams can review but cannot be assigned to an issue.
        let policy = Policy {
            reviewers: logins(&["org/platform-team", "user1", "author"]),
            number_of_reviewers: 0,
            ..Policy::default()
        };
        let assignees = choose_assignees(&mut rng(), "author", &policy);
        assert_eq!(assignees, logins(&["user1"]));
    }

    #[test]
    fn test_choose_assignees_team_entries_do_not_consume_count() {
        let policy = Policy {
            assignees: logins(&["org/platform-team", "u1", "u2"]),
            number_of_assignees: Some(2),
            ..Policy::default()
        };
        let mut assignees = choose_assignees(&mut rng(), "author", &policy);
        assignees.sort();
        assert_eq!(assignees, logins(&["u1", "u2"]));
    }

    #[test]
    fn test_choose_assignees_skips_team_entries_in_groups() {
        let policy = Policy {
            use_assignee_groups: true,
            number_of_assignees: Some(2),
            assignee_groups: Some(groups(&[("A", &["org/platform-team", "u1"])])),
            ..Policy::default()
        };
        let assignees = choose_assignees(&mut rng(), "author", &policy);
        assert_eq!(assignees, logins(&["u1"]));
    }

    #[test]
    fn test_choose_assignees_from_groups() {
        let policy = Policy {
            use_assignee_groups: true,
            number_of_assignees: Some(1),
            number_of_reviewers: 2,
            assignee_groups: Some(groups(&[
                ("A", &["group1-user1", "group1-user2", "group1-user3"]),
                ("B", &["group2-user1"]),
                ("C", &["group3-user1", "group3-user2", "group3-user3"]),
            ])),
            ..Policy::default()
        };
        let assignees = choose_assignees(&mut rng(), "author", &policy);
        assert_eq!(assignees.len(), 3);
        assert!(assignees[0].starts_with("group1"));
        assert_eq!(assignees[1], "group2-user1");
        assert!(assignees[2].starts_with("group3"));
    }

    #[test]
    fn test_version_tier_from_labels() {
        assert_eq!(
            VersionTier::from_labels(&logins(&["bug", "Minor"])),
            Ok(VersionTier::Minor)
        );
        assert_eq!(
            VersionTier::from_labels(&logins(&["Patch"])),
            Ok(VersionTier::Patch)
        );
    }

    #[test]
    fn test_version_tier_major_wins_on_mislabeled_pr() {
        assert_eq!(
            VersionTier::from_labels(&logins(&["Patch", "Major", "Minor"])),
            Ok(VersionTier::Major)
        );
    }

    #[test]
    fn test_version_tier_labels_are_exact_match() {
        assert_eq!(
            VersionTier::from_labels(&logins(&["major", "patchwork"])),
            Err(VersionLabelError)
        );
    }

    #[test]
    fn test_version_tier_missing_label_is_an_error() {
        assert_eq!(VersionTier::from_labels(&[]), Err(VersionLabelError));
    }

    #[test]
    fn test_choose_version_reviewers_picks_tier_pool() {
        let policy = Policy {
            major_reviewers: logins(&["maj1", "maj2"]),
            minor_reviewers: logins(&["min1"]),
            patch_reviewers: logins(&["pat1"]),
            number_of_reviewers: 0,
            ..Policy::default()
        };
        let mut result =
            choose_version_reviewers(&mut rng(), "author", VersionTier::Major, &policy);
        result.reviewers.sort();
        assert_eq!(result.reviewers, logins(&["maj1", "maj2"]));

        let result = choose_version_reviewers(&mut rng(), "author", VersionTier::Patch, &policy);
        assert_eq!(result.reviewers, logins(&["pat1"]));
    }

    #[test]
    fn test_choose_version_reviewers_excludes_author_and_routes_teams() {
        let policy = Policy {
            minor_reviewers: logins(&["author", "user1", "org/minor-team"]),
            number_of_reviewers: 0,
            ..Policy::default()
        };
        let result = choose_version_reviewers(&mut rng(), "author", VersionTier::Minor, &policy);
        assert_eq!(result.reviewers, logins(&["user1"]));
        assert_eq!(result.team_reviewers, logins(&["minor-team"]));
    }
}
