//! Jira connection settings.

use std::fmt;
use std::path::Path;

use crate::error::{JiraError, Result};
use crate::retry::RetryPolicy;

pub const ENV_SERVER: &str = "JIRA_SERVER";
pub const ENV_TOKEN: &str = "JIRA_TOKEN";

/// Epic link field on Jira Server/Data Center instances using the
/// Jira Software defaults.
pub const DEFAULT_EPIC_LINK_FIELD: &str = "customfield_12311140";

/// Transition applied to issues created with `close` set.
pub const CLOSE_TRANSITION: &str = "Closed";

#[derive(Clone)]
pub struct JiraConfig {
    /// Base URL, e.g. `https://issues.example.com`
    pub server_url: String,
    /// Personal access token sent as a bearer token
    pub token: String,
    pub epic_link_field: String,
    pub retry: RetryPolicy,
}

impl fmt::Debug for JiraConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JiraConfig")
            .field("server_url", &self.server_url)
            .field("token", &"<redacted>")
            .field("epic_link_field", &self.epic_link_field)
            .field("retry", &self.retry)
            .finish()
    }
}

impl JiraConfig {
    pub fn new(server_url: impl Into<String>, token: impl Into<String>) -> Self {
        JiraConfig {
            server_url: server_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            epic_link_field: DEFAULT_EPIC_LINK_FIELD.to_string(),
            retry: RetryPolicy::default(),
        }
    }

    /// Read `JIRA_SERVER` and `JIRA_TOKEN`.
    pub fn from_env() -> Result<Self> {
        let server = std::env::var(ENV_SERVER)
            .map_err(|_| JiraError::InvalidConfig(format!("{ENV_SERVER} is not set")))?;
        let token = std::env::var(ENV_TOKEN)
            .map_err(|_| JiraError::InvalidConfig(format!("{ENV_TOKEN} is not set")))?;
        Ok(Self::new(server, token))
    }

    /// Use the token stored in `path` (surrounding whitespace ignored).
    pub fn with_token_file(server_url: impl Into<String>, path: &Path) -> Result<Self> {
        Ok(Self::new(server_url, read_token(path)?))
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_epic_link_field(mut self, field: impl Into<String>) -> Self {
        self.epic_link_field = field.into();
        self
    }
}

pub fn read_token(path: &Path) -> Result<String> {
    let raw = std::fs::read_to_string(path).map_err(|source| JiraError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let token = raw.trim();
    if token.is_empty() {
        return Err(JiraError::InvalidConfig(format!(
            "token file {} is empty",
            path.display()
        )));
    }
    Ok(token.to_string())
}
