//! Core selection logic for the auto-assign bot.
//!
//! Everything in this crate is pure and synchronous: given a parsed
//! [`policy::Policy`] and the pull request author's login, the functions in
//! [`selection`] produce the lists of reviewers, team reviewers, and
//! assignees that the server crate submits to GitHub. Randomness is supplied
//! by the caller, so selection is reentrant and seedable in tests.

pub mod policy;
pub mod selection;

pub use policy::{ConfigError, Policy};
pub use selection::{
    choose_assignees, choose_reviewers, choose_version_reviewers, should_skip, Candidate,
    SelectionResult, VersionLabelError, VersionTier,
};
