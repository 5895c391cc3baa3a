use reqwest::blocking::Client as HttpClient;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::error::{RagError, Result};

pub const VAGUE_STORY: &str =
    "Vague user story: missing title, description, and acceptance criteria.";

/// Title, description and acceptance criteria of one tracker work item.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkItem {
    pub title: String,
    pub description: String,
    pub acceptance_criteria: String,
}

impl WorkItem {
    /// The non-empty parts joined by newlines.
    pub fn story_text(&self) -> String {
        let parts: Vec<&str> = [&self.title, &self.description, &self.acceptance_criteria]
            .into_iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .collect();
        if parts.is_empty() {
            warn!("The fetched work item has no title, description, or acceptance criteria.");
            return VAGUE_STORY.to_string();
        }
        parts.join("\n")
    }
}

pub trait WorkItemSource {
    /// `Ok(None)` when the tracker has no such item.
    fn fetch_work_item(&self, id: &str) -> Result<Option<WorkItem>>;
}

/// Azure DevOps work-item client using basic auth with a personal access token.
pub struct AdoClient {
    client: HttpClient,
    org_url: String,
    username: String,
    pat: String,
}

#[derive(Deserialize)]
struct WorkItemResponse {
    #[serde(default)]
    fields: WorkItemFields,
}

#[derive(Deserialize, Default)]
struct WorkItemFields {
    #[serde(rename = "System.Title", default)]
    title: Option<String>,
    #[serde(rename = "System.Description", default)]
    description: Option<String>,
    #[serde(rename = "Microsoft.VSTS.Common.AcceptanceCriteria", default)]
    acceptance_criteria: Option<String>,
}

impl AdoClient {
    pub fn new(org_url: &str, username: &str, pat: &str, timeout: Duration) -> Result<Self> {
        if org_url.trim().is_empty() || pat.trim().is_empty() {
            return Err(RagError::Config(
                "missing ADO configuration; set ADO_ORG_URL and ADO_PAT".to_string(),
            ));
        }
        let client = HttpClient::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            org_url: org_url.trim_end_matches('/').to_string(),
            username: username.to_string(),
            pat: pat.to_string(),
        })
    }

    fn work_item_url(&self, id: &str) -> String {
        format!(
            "{}/_apis/wit/workItems/{}?$expand=All&api-version=7.1-preview.3",
            self.org_url, id
        )
    }
}

impl WorkItemSource for AdoClient {
    fn fetch_work_item(&self, id: &str) -> Result<Option<WorkItem>> {
        if id.trim().is_empty() || !id.trim().chars().all(|c| c.is_ascii_digit()) {
            return Err(RagError::Config(format!("invalid work item id '{}'", id)));
        }

        let url = self.work_item_url(id.trim());
        debug!("Fetching work item from {}", url);
        let response = self
            .client
            .get(url)
            .basic_auth(&self.username, Some(&self.pat))
            .send()?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            let status = response.status();
            error!("Error fetching work item {}: {}", id, status);
            return Err(RagError::Upstream(format!(
                "work item {} request failed ({})",
                id, status
            )));
        }

        let body: WorkItemResponse = response.json()?;
        Ok(Some(WorkItem {
            title: body.fields.title.unwrap_or_default(),
            description: body.fields.description.unwrap_or_default(),
            acceptance_criteria: body.fields.acceptance_criteria.unwrap_or_default(),
        }))
    }
}
