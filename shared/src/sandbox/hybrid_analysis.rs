/// Falcon Sandbox (Hybrid Analysis v2) client
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder};
use tracing::{debug, error, info};

use super::parse::{parse_report_summary, parse_submit_file};
use super::SandboxClient;
use crate::config::SandboxConfig;
use crate::types::{JobId, JobStatus, PipelineError, PipelineResult};

const API_KEY_HEADER: &str = "api-key";

pub struct HybridAnalysisClient {
    http_client: Client,
    config: SandboxConfig,
}

impl HybridAnalysisClient {
    pub fn new(config: SandboxConfig) -> Result<Self> {
        info!(
            base_url = %config.base_url,
            environment_id = %config.environment_id,
            "Initializing sandbox client"
        );

        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(config.user_agent.clone())
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http_client,
            config,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header(API_KEY_HEADER, &self.config.api_key)
            .header(ACCEPT, "application/json")
    }

    /// Raw `POST /submit/file` response body
    pub async fn submit_file(&self, file_name: &str, data: &[u8]) -> PipelineResult<String> {
        let form = Form::new()
            .text("environment_id", self.config.environment_id.clone())
            .part(
                "file",
                Part::bytes(data.to_vec()).file_name(file_name.to_string()),
            );

        let url = self.url("/submit/file");
        debug!(%url, file_name, size = data.len(), "Submitting file to sandbox");

        let response = self
            .authorized(self.http_client.post(&url))
            .multipart(form)
            .send()
            .await
            .map_err(|e| PipelineError::Submission(format!("failed to send request: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| PipelineError::Submission(format!("failed to read response: {}", e)))?;
        debug!(%status, body = %body, "Sandbox submit response");

        if !status.is_success() {
            error!(%status, "Sandbox submit failed");
            return Err(PipelineError::Submission(format!(
                "non 2XX HTTP status code; {}",
                status
            )));
        }
        Ok(body)
    }

    /// Raw `GET /report/{job_id}/summary` response body
    pub async fn report_summary(&self, job_id: &JobId) -> PipelineResult<String> {
        let url = self.url(&format!("/report/{}/summary", job_id));
        debug!(%url, "Requesting report summary");

        let response = self
            .authorized(self.http_client.get(&url))
            .send()
            .await
            .map_err(|e| PipelineError::Poll(format!("failed to send request: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| PipelineError::Poll(format!("failed to read response: {}", e)))?;
        debug!(%status, body = %body, "Sandbox summary response");

        if !status.is_success() {
            error!(%status, job_id = %job_id, "Sandbox summary failed");
            return Err(PipelineError::Poll(format!(
                "non 2XX HTTP status code; {}",
                status
            )));
        }
        Ok(body)
    }
}

#[async_trait]
impl SandboxClient for HybridAnalysisClient {
    async fn submit(&self, file_name: &str, data: &[u8]) -> PipelineResult<JobId> {
        let body = self.submit_file(file_name, data).await?;
        parse_submit_file(&body)
    }

    async fn poll_status(&self, job_id: &JobId) -> PipelineResult<JobStatus> {
        let body = self.report_summary(job_id).await?;
        parse_report_summary(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::JobState;
    use mockito::Matcher;

    const SHA: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";

    fn client_for(server: &mockito::ServerGuard) -> HybridAnalysisClient {
        HybridAnalysisClient::new(SandboxConfig {
            api_key: "test-key".to_string(),
            base_url: server.url(),
            ..SandboxConfig::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_submit_sends_multipart_with_auth() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/submit/file")
            .match_header("api-key", "test-key")
            .match_header("user-agent", "Falcon Sandbox")
            .match_body(Matcher::AllOf(vec![
                Matcher::Regex(r#"name="environment_id""#.to_string()),
                Matcher::Regex(r#"filename="sample.exe""#.to_string()),
                Matcher::Regex("hello".to_string()),
            ]))
            .with_status(201)
            .with_header("content-type", "application/json")
            .with_body(format!(r#"{{"job_id":"J1","sha256":"{}"}}"#, SHA))
            .create_async()
            .await;

        let job_id = client_for(&server).submit("sample.exe", b"hello").await.unwrap();

        assert_eq!(job_id.as_str(), "J1");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_submit_non_success_is_submission_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/submit/file")
            .with_status(429)
            .with_body(r#"{"message":"rate limited"}"#)
            .create_async()
            .await;

        let err = client_for(&server).submit("sample.exe", b"hello").await.unwrap_err();
        assert!(matches!(err, PipelineError::Submission(_)));
    }

    #[tokio::test]
    async fn test_poll_status_reads_summary() {
        let mut server = mockito::Server::new_async().await;
        let body = format!(r#"{{"state":"SUCCESS","verdict":"no specific threat","sha256":"{}"}}"#, SHA);
        let mock = server
            .mock("GET", "/report/J1/summary")
            .match_header("api-key", "test-key")
            .with_status(200)
            .with_body(body.clone())
            .create_async()
            .await;

        let job_id = JobId::new("J1").unwrap();
        let status = client_for(&server).poll_status(&job_id).await.unwrap();

        assert_eq!(status.state, JobState::Terminal("SUCCESS".to_string()));
        assert_eq!(status.content_hash.unwrap().as_str(), SHA);
        assert_eq!(status.report_body, body);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_poll_status_not_found_is_poll_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/report/missing/summary")
            .with_status(404)
            .create_async()
            .await;

        let job_id = JobId::new("missing").unwrap();
        let err = client_for(&server).poll_status(&job_id).await.unwrap_err();
        assert!(matches!(err, PipelineError::Poll(_)));
    }

    #[tokio::test]
    async fn test_poll_status_garbage_is_parse_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/report/J1/summary")
            .with_status(200)
            .with_body("not json")
            .create_async()
            .await;

        let job_id = JobId::new("J1").unwrap();
        let err = client_for(&server).poll_status(&job_id).await.unwrap_err();
        assert!(matches!(err, PipelineError::Parse(_)));
    }
}
