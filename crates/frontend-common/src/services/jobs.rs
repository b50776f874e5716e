//! Pipeline job submission and artifact retrieval

use crate::lock;
use crate::session::SessionStore;
use crate::stream::{StreamDispatcher, StreamOutcome};
use bonsai_core::{Job, JobMessage, JobOutcome};
use bonsai_http::types::HealthStatus;
use bonsai_http::{AuthenticatedClient, ClientError, PublicClient, Upload};
use bytes::Bytes;
use serde_json::Value as JsonValue;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors from job operations
#[derive(Debug, Error)]
pub enum JobError {
    /// No usable credential, even after a refresh attempt
    #[error("User not authenticated")]
    AuthenticationRequired,

    /// The request failed or the server answered with an error status
    #[error(transparent)]
    Transport(#[from] ClientError),

    /// The artifact server returned no bytes
    #[error("Downloaded artifact for job {job_id} is empty")]
    EmptyArtifact { job_id: String },
}

/// Receives pipeline events while a job streams
///
/// Progress, error and finished lines go to [`on_message`](Self::on_message)
/// verbatim. Closures taking `&str` implement this trait.
pub trait JobObserver {
    fn on_message(&mut self, text: &str);

    fn on_file_tree(&mut self, _tree: &JsonValue) {}

    fn on_complete(&mut self, _job_id: &str) {}
}

impl<F> JobObserver for F
where
    F: FnMut(&str),
{
    fn on_message(&mut self, text: &str) {
        self(text);
    }
}

fn notify<O: JobObserver + ?Sized>(observer: &mut O, message: &JobMessage) {
    match message {
        JobMessage::FileTree(tree) => observer.on_file_tree(tree),
        JobMessage::JobComplete(job_id) => observer.on_complete(job_id),
        JobMessage::Progress(_) | JobMessage::Error(_) | JobMessage::Finished => {
            if let Some(text) = message.display_text() {
                observer.on_message(text);
            }
        }
    }
}

/// Line reported to the observer when a job cannot proceed
fn error_line(err: &ClientError) -> String {
    if err.is_connect() {
        return "ERROR: Connection error: please check if the server is running".to_string();
    }
    match (err.status(), err.message()) {
        (Some(status), Some(message)) => format!("ERROR: Server error ({status}): {message}"),
        _ => format!("ERROR: {err}"),
    }
}

/// Client for the 3D pipeline
///
/// Tracks a single job at a time; starting a new upload resets the record.
#[derive(Clone, Debug)]
pub struct JobClient {
    session: SessionStore,
    http: PublicClient,
    job: Arc<Mutex<Job>>,
}

impl JobClient {
    pub fn new(session: SessionStore, http: PublicClient) -> Self {
        Self {
            session,
            http,
            job: Arc::new(Mutex::new(Job::default())),
        }
    }

    pub const fn session(&self) -> &SessionStore {
        &self.session
    }

    /// Snapshot of the current (or most recent) job
    pub fn job(&self) -> Job {
        lock(&self.job).clone()
    }

    async fn authorized(&self) -> Result<AuthenticatedClient, JobError> {
        if !self.session.ensure_fresh().await || !self.session.is_authenticated() {
            return Err(JobError::AuthenticationRequired);
        }
        self.session
            .credential()
            .map(|token| self.http.authenticate(token))
            .ok_or(JobError::AuthenticationRequired)
    }

    /// Upload `upload` and follow the job until the server finishes it
    ///
    /// Returns `Ok` when the stream ends, with or without the finished
    /// sentinel. On a transport failure or an error status one `ERROR:` line
    /// is reported to the observer before the error is returned.
    pub async fn submit<O>(&self, upload: Upload, observer: &mut O) -> Result<JobOutcome, JobError>
    where
        O: JobObserver + ?Sized,
    {
        let client = self.authorized().await?;
        *lock(&self.job) = Job::uploading();

        let response = match client.run_pipeline(upload).await {
            Ok(response) => response,
            Err(err) => return Err(self.fail(err, observer)),
        };
        lock(&self.job).begin_streaming();
        tracing::info!("pipeline accepted upload, streaming progress");

        let job = Arc::clone(&self.job);
        let streamed = StreamDispatcher::new()
            .drive(response.bytes_stream(), |message| {
                lock(&job).record(message.clone());
                notify(observer, &message);
            })
            .await;

        match streamed {
            Ok(StreamOutcome::Finished) => {}
            Ok(StreamOutcome::Ended) => {
                tracing::warn!("pipeline stream closed before the finished sentinel");
                lock(&self.job).interrupt();
            }
            Err(err) => return Err(self.fail(err.into(), observer)),
        }

        let outcome = lock(&self.job).outcome().unwrap_or(JobOutcome::Incomplete);
        tracing::info!(?outcome, "pipeline job ended");
        Ok(outcome)
    }

    fn fail<O: JobObserver + ?Sized>(&self, err: ClientError, observer: &mut O) -> JobError {
        tracing::warn!(error = %err, "pipeline job failed");
        let line = error_line(&err);
        lock(&self.job).fail(line.clone());
        observer.on_message(&line);
        JobError::Transport(err)
    }

    /// Download the artifact produced by `job_id`
    ///
    /// The artifact server does not take a credential.
    pub async fn fetch_artifact(&self, job_id: &str) -> Result<Bytes, JobError> {
        tracing::info!(job_id, "downloading artifact");
        let bytes = self.http.download_artifact(job_id).await?;
        if bytes.is_empty() {
            return Err(JobError::EmptyArtifact {
                job_id: job_id.to_string(),
            });
        }
        tracing::info!(job_id, size = bytes.len(), "artifact downloaded");
        Ok(bytes)
    }

    /// Directory listing of a job's workspace
    pub async fn list_files(&self, job_id: &str) -> Result<JsonValue, JobError> {
        let client = self.authorized().await?;
        Ok(client.job_files(job_id).await?)
    }

    /// Pipeline health; failures are reported in the status, never returned
    pub async fn check_health(&self) -> HealthStatus {
        match self.http.pipeline_health().await {
            Ok(status) => status,
            Err(err) => {
                tracing::warn!(error = %err, "pipeline health check failed");
                HealthStatus::unreachable(err.to_string())
            }
        }
    }
}
