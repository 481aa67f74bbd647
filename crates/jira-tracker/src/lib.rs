//! Jira backend for the CI triage engine.
//!
//! [`JiraClient`] implements [`triage_core::IssueTracker`] over the REST v2
//! API. Searches are rendered to JQL by [`jql::render`], and transient
//! failures are retried according to [`RetryPolicy`].

mod client;
mod config;
mod error;
pub mod jql;
pub mod payload;
pub mod retry;

pub use client::{JiraClient, SEARCH_PAGE_SIZE};
pub use config::{
    read_token, JiraConfig, CLOSE_TRANSITION, DEFAULT_EPIC_LINK_FIELD, ENV_SERVER, ENV_TOKEN,
};
pub use error::{JiraError, Result};
pub use retry::RetryPolicy;
