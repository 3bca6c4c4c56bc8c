//! Client code for the catalogue server.
//!
//! This crate provides the GitHub-backed catalogue source: conditional
//! fetches of the raw catalogue file, commit-date lookup, and interpretation
//! of GitHub's rate-limit headers.

pub mod github;

pub use github::{GitHubConfig, GitHubSource, rate_limit::next_allowed_call};
