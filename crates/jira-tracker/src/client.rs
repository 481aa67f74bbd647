//! Jira REST client
//!
//! Implements [`IssueTracker`] against the Jira Server / Data Center REST v2
//! API. Every HTTP call goes through the configured [`RetryPolicy`]; the
//! engine sees only the final outcome.
//!
//! [`RetryPolicy`]: crate::retry::RetryPolicy

use std::path::Path;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Method, Response, Url};
use serde_json::Value;
use tracing::{debug, info, warn};
use triage_core::{IssueKey, IssueQuery, IssueTracker, NewIssue, TrackerError, TrackerResult};

use crate::config::{JiraConfig, CLOSE_TRANSITION};
use crate::error::{JiraError, Result};
use crate::{jql, payload};

/// Page size for unbounded searches.
pub const SEARCH_PAGE_SIZE: usize = 100;

const USER_AGENT: &str = concat!("ci-triage/", env!("CARGO_PKG_VERSION"));

pub struct JiraClient {
    config: JiraConfig,
    http_client: reqwest::Client,
}

impl JiraClient {
    pub fn new(config: JiraConfig) -> Result<Self> {
        Url::parse(&config.server_url).map_err(|e| {
            JiraError::InvalidConfig(format!("server URL {}: {e}", config.server_url))
        })?;
        let http_client = reqwest::Client::builder().user_agent(USER_AGENT).build()?;

        Ok(JiraClient {
            config,
            http_client,
        })
    }

    pub fn config(&self) -> &JiraConfig {
        &self.config
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/rest/api/2/{}", self.config.server_url, path)
    }

    /// JSON call with retries. Empty bodies come back as `Value::Null`.
    async fn call(
        &self,
        what: &str,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&Value>,
    ) -> Result<Value> {
        let url = self.api_url(path);
        debug!(call = what, %method, url = %url, "Jira request");
        self.config
            .retry
            .run(what, || async {
                let mut request = self
                    .http_client
                    .request(method.clone(), &url)
                    .bearer_auth(&self.config.token);
                if !query.is_empty() {
                    request = request.query(query);
                }
                if let Some(body) = body {
                    request = request.json(body);
                }
                read_json(request.send().await?).await
            })
            .await
    }

    async fn lookup_user(&self, email: &str) -> Result<Option<String>> {
        let found = self
            .call(
                "user_search",
                Method::GET,
                "user/search",
                &[("username", email)],
                None,
            )
            .await?;
        Ok(payload::first_user_name(&found))
    }

    async fn attach(&self, key: &IssueKey, path: &Path) -> Result<()> {
        let bytes = tokio::fs::read(path).await.map_err(|source| JiraError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "attachment".to_string());
        let url = self.api_url(&format!("issue/{key}/attachments"));

        self.config
            .retry
            .run("attach", || async {
                let form = Form::new().part(
                    "file",
                    Part::bytes(bytes.clone()).file_name(file_name.clone()),
                );
                let response = self
                    .http_client
                    .post(&url)
                    .bearer_auth(&self.config.token)
                    .header("X-Atlassian-Token", "no-check")
                    .multipart(form)
                    .send()
                    .await?;
                read_json(response).await.map(|_| ())
            })
            .await
    }

    async fn create(&self, issue: NewIssue) -> Result<IssueKey> {
        let assignee = match &issue.assignee {
            Some(email) => match self.lookup_user(email).await {
                Ok(Some(name)) => Some(name),
                Ok(None) => {
                    warn!(assignee = %email, "no Jira user for assignee, leaving unassigned");
                    None
                }
                Err(e) => {
                    warn!(
                        assignee = %email,
                        error = %e,
                        "assignee lookup failed, leaving unassigned"
                    );
                    None
                }
            },
            None => None,
        };

        let body =
            payload::create_issue(&issue, assignee.as_deref(), &self.config.epic_link_field);
        let created = self
            .call("create_issue", Method::POST, "issue", &[], Some(&body))
            .await?;
        let key = payload::created_key(&created)?;
        info!(issue = %key, project = %issue.project, "created Jira issue");

        for path in &issue.attachments {
            if let Err(e) = self.attach(&key, path).await {
                warn!(issue = %key, file = %path.display(), error = %e, "attachment upload failed");
            }
        }

        if issue.close {
            let comment = "Filed as a record only; closing on creation.";
            match self.transition(&key, CLOSE_TRANSITION, comment).await {
                Ok(true) => debug!(issue = %key, "closed on creation"),
                Ok(false) => warn!(
                    issue = %key,
                    transition = CLOSE_TRANSITION,
                    "transition not offered, issue left open"
                ),
                Err(e) => warn!(issue = %key, error = %e, "closing new issue failed"),
            }
        }

        Ok(key)
    }

    async fn search(&self, query: &IssueQuery) -> Result<Vec<IssueKey>> {
        let jql = jql::render(query);
        let page_size = query.limit.unwrap_or(SEARCH_PAGE_SIZE);
        let mut keys = Vec::new();

        loop {
            let body = payload::search(&jql, keys.len(), page_size);
            let response = self
                .call("search_issues", Method::POST, "search", &[], Some(&body))
                .await?;
            let (page, total) = payload::search_page(&response)?;
            let page_len = page.len();
            keys.extend(page);

            if query.limit.is_some() || !more_pages(page_len, keys.len(), total) {
                break;
            }
        }

        debug!(jql = %jql, found = keys.len(), "Jira search");
        Ok(keys)
    }

    async fn transition(&self, key: &IssueKey, name: &str, comment: &str) -> Result<bool> {
        let path = format!("issue/{key}/transitions");
        let available = self
            .call("list_transitions", Method::GET, &path, &[], None)
            .await?;
        let Some(id) = payload::find_transition(&available, name)? else {
            return Ok(false);
        };
        let body = payload::transition(&id, comment);
        self.call("transition_issue", Method::POST, &path, &[], Some(&body))
            .await?;
        Ok(true)
    }
}

/// Jira may return fewer results than `maxResults` asked for, so only an
/// empty page or the reported total ends an unbounded search.
fn more_pages(page_len: usize, collected: usize, total: usize) -> bool {
    page_len > 0 && collected < total
}

async fn read_json(response: Response) -> Result<Value> {
    let status = response.status();
    let text = response.text().await?;
    if !status.is_success() {
        return Err(JiraError::Status {
            status: status.as_u16(),
            body: text,
        });
    }
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&text).map_err(|e| JiraError::InvalidResponse(e.to_string()))
}

#[async_trait]
impl IssueTracker for JiraClient {
    async fn create_issue(&self, issue: NewIssue) -> TrackerResult<IssueKey> {
        Ok(self.create(issue).await?)
    }

    async fn search_issues(&self, query: &IssueQuery) -> TrackerResult<Vec<IssueKey>> {
        Ok(self.search(query).await?)
    }

    fn search_url(&self, query: &IssueQuery) -> String {
        let base = format!("{}/issues/", self.config.server_url);
        let jql = jql::render(query);
        Url::parse_with_params(&base, &[("jql", jql.as_str())])
            .map(String::from)
            .unwrap_or(base)
    }

    async fn comment(&self, issue: &IssueKey, body: &str) -> TrackerResult<()> {
        let path = format!("issue/{issue}/comment");
        self.call("comment", Method::POST, &path, &[], Some(&payload::comment(body)))
            .await?;
        Ok(())
    }

    async fn add_labels(&self, issue: &IssueKey, labels: &[String]) -> TrackerResult<()> {
        let path = format!("issue/{issue}");
        self.call(
            "add_labels",
            Method::PUT,
            &path,
            &[],
            Some(&payload::add_labels(labels)),
        )
        .await?;
        Ok(())
    }

    async fn relate_issues(&self, a: &IssueKey, b: &IssueKey) -> TrackerResult<bool> {
        let body = payload::relate(a, b);
        match self
            .call("relate_issues", Method::POST, "issueLink", &[], Some(&body))
            .await
        {
            Ok(_) => Ok(true),
            Err(JiraError::Status { status, body })
                if (400..500).contains(&status) && status != 429 =>
            {
                warn!(a = %a, b = %b, status, body = %body, "Jira refused issue link");
                Ok(false)
            }
            Err(e) => Err(TrackerError::from(e)),
        }
    }

    async fn transition_issue(
        &self,
        issue: &IssueKey,
        transition: &str,
        comment: &str,
    ) -> TrackerResult<bool> {
        Ok(self.transition(issue, transition, comment).await?)
    }
}
