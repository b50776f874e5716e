//! 3D pipeline endpoints

use super::{AuthenticatedClient, ClientError, PublicClient, include_credentials, send_checked};
use crate::types::HealthStatus;
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use reqwest::{Method, Response};
use serde_json::Value as JsonValue;

/// Payload uploaded to the pipeline as the multipart `file` field
#[derive(Debug, Clone)]
pub struct Upload {
    pub filename: String,
    pub bytes: Vec<u8>,
    pub mime: String,
}

impl Upload {
    /// Zip archive upload, the only format the pipeline accepts
    pub fn zip(filename: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            bytes: bytes.into(),
            mime: "application/zip".to_string(),
        }
    }

    /// Override the content type of the part
    #[must_use]
    pub fn with_mime(mut self, mime: impl Into<String>) -> Self {
        self.mime = mime.into();
        self
    }

    fn into_form(self) -> Result<Form, ClientError> {
        let part = Part::bytes(self.bytes)
            .file_name(self.filename)
            .mime_str(&self.mime)?;
        Ok(Form::new().part("file", part))
    }
}

impl AuthenticatedClient {
    /// Start a pipeline run
    ///
    /// Returns once response headers arrive; the body is the event stream
    /// and is left unread for the caller.
    pub async fn run_pipeline(&self, upload: Upload) -> Result<Response, ClientError> {
        tracing::info!(
            filename = %upload.filename,
            size = upload.bytes.len(),
            "uploading pipeline payload"
        );
        let request = self
            .request(Method::POST, "/run-pipeline/")
            .multipart(upload.into_form()?);
        send_checked(include_credentials(request)).await
    }

    /// Directory listing of a job's workspace
    pub async fn job_files(&self, job_id: &str) -> Result<JsonValue, ClientError> {
        let request = self.request(Method::GET, &format!("/jobs/{job_id}/files"));
        self.execute(include_credentials(request)).await
    }
}

impl PublicClient {
    /// Download the artifact of a finished job from the artifact server
    ///
    /// The artifact server trusts the job id alone; no credential is sent.
    /// An empty body is returned as-is.
    pub async fn download_artifact(&self, job_id: &str) -> Result<Bytes, ClientError> {
        let request = self.artifact_request(Method::GET, &format!("/download/{job_id}"));
        Ok(send_checked(request).await?.bytes().await?)
    }

    /// Ask the backend whether the GPU server is reachable
    pub async fn pipeline_health(&self) -> Result<HealthStatus, ClientError> {
        let request = self.request(Method::GET, "/pipeline/health");
        self.execute(request).await
    }
}
