use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use swarm_core::ProjectId;
use tracing::{info, warn};
use url::Url;

const SUBMIT_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct ContactInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zip_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ProjectDetails {
    pub raw_description: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SubmissionRequest {
    pub project_id: String,
    pub contact_info: ContactInfo,
    pub project_details: ProjectDetails,
}

impl SubmissionRequest {
    /// Builds a request with a fresh v4 project id.
    pub fn new(
        contact_info: ContactInfo,
        description: &str,
        attachments: Vec<String>,
    ) -> Result<Self> {
        let raw_description = description.trim();
        if raw_description.is_empty() {
            bail!("project description must not be empty");
        }
        Ok(Self {
            project_id: uuid::Uuid::new_v4().to_string(),
            contact_info,
            project_details: ProjectDetails {
                raw_description: raw_description.to_string(),
                attachments,
            },
        })
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct SubmissionResponse {
    #[serde(default)]
    pub message: String,
    #[serde(rename = "projectId")]
    pub project_id: String,
    #[serde(rename = "messageId", default)]
    pub message_id: Option<String>,
}

pub fn submit_endpoint(api_url: &Url) -> Result<Url> {
    let mut url = api_url.clone();
    url.path_segments_mut()
        .map_err(|_| anyhow::anyhow!("api url cannot be a base: {api_url}"))?
        .pop_if_empty()
        .push("projects")
        .push("submit");
    Ok(url)
}

/// Posts the submission and returns the project id the backend accepted.
pub async fn submit_project(
    api_url: &Url,
    request: &SubmissionRequest,
) -> Result<(ProjectId, SubmissionResponse)> {
    let endpoint = submit_endpoint(api_url)?;
    let client = reqwest::Client::builder()
        .timeout(SUBMIT_TIMEOUT)
        .build()
        .context("build http client")?;
    info!(
        event = "submit_start",
        endpoint = %endpoint,
        project_id = %request.project_id
    );
    let response = client
        .post(endpoint.clone())
        .json(request)
        .send()
        .await
        .with_context(|| format!("post {endpoint}"))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        warn!(event = "submit_rejected", status = status.as_u16());
        bail!("submission failed with {status}: {body}");
    }

    let parsed: SubmissionResponse = response
        .json()
        .await
        .context("decode submission response")?;
    let Some(project_id) = ProjectId::parse(&parsed.project_id) else {
        bail!("submission response carried an empty projectId");
    };
    info!(
        event = "submit_accepted",
        project_id = %project_id,
        message_id = parsed.message_id.as_deref().unwrap_or("")
    );
    Ok((project_id, parsed))
}
