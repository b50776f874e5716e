//! CLI commands

use anyhow::{Context, Result, bail};
use bonsai_core::JobOutcome;
use bonsai_frontend_common::{ClientConfig, JobClient, JobObserver, SessionStore};
use bonsai_http::{PublicClient, Upload};
use clap::{Args, Subcommand};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::info;

/// Account credentials
#[derive(Args, Debug)]
pub struct Credentials {
    /// Account email
    #[arg(long, env = "BONSAI_EMAIL")]
    pub email: String,

    /// Account password
    #[arg(long, env = "BONSAI_PASSWORD", hide_env_values = true)]
    pub password: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a customer account
    Register {
        #[command(flatten)]
        credentials: Credentials,
    },

    /// Upload a zip of photos and follow the pipeline until it finishes
    Run {
        /// Zip archive to upload
        archive: PathBuf,

        #[command(flatten)]
        credentials: Credentials,

        /// Download the resulting artifact into this directory
        #[arg(long)]
        download: Option<PathBuf>,
    },

    /// Show the files a job produced
    Files {
        /// Job identifier
        job_id: String,

        #[command(flatten)]
        credentials: Credentials,
    },

    /// Download the artifact of a finished job
    Download {
        /// Job identifier
        job_id: String,

        /// Output file (defaults to photogrammetry_results_<job-id>.zip)
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,
    },

    /// Check whether the pipeline's GPU server is reachable
    Health,
}

impl Commands {
    pub async fn execute(self, config: ClientConfig) -> Result<()> {
        let http = config.public_client()?;
        let session = SessionStore::builder(http.clone())
            .refresh_ahead(config.refresh_ahead_secs)
            .build();
        let jobs = JobClient::new(session.clone(), http.clone());

        let result = match self {
            Self::Register { credentials } => register(&http, &credentials).await,
            Self::Run {
                archive,
                credentials,
                download,
            } => run(&jobs, &archive, &credentials, download.as_deref()).await,
            Self::Files {
                job_id,
                credentials,
            } => files(&jobs, &job_id, &credentials).await,
            Self::Download { job_id, output } => {
                let output = output.unwrap_or_else(|| PathBuf::from(artifact_file_name(&job_id)));
                download(&jobs, &job_id, &output).await
            }
            Self::Health => health(&jobs).await,
        };

        session.teardown();
        result
    }
}

/// Prints pipeline events as they arrive
struct ProgressPrinter;

impl JobObserver for ProgressPrinter {
    fn on_message(&mut self, text: &str) {
        println!("{text}");
    }

    fn on_file_tree(&mut self, tree: &Value) {
        println!("{tree:#}");
    }

    fn on_complete(&mut self, job_id: &str) {
        println!("Job id: {job_id}");
    }
}

fn artifact_file_name(job_id: &str) -> String {
    format!("photogrammetry_results_{job_id}.zip")
}

async fn register(http: &PublicClient, credentials: &Credentials) -> Result<()> {
    http.register(&credentials.email, &credentials.password)
        .await
        .context("Registration failed")?;
    println!("Registered {}", credentials.email);
    Ok(())
}

async fn sign_in(jobs: &JobClient, credentials: &Credentials) -> Result<()> {
    jobs.session()
        .login(&credentials.email, &credentials.password)
        .await
        .context("Login failed")
}

async fn run(
    jobs: &JobClient,
    archive: &Path,
    credentials: &Credentials,
    download_dir: Option<&Path>,
) -> Result<()> {
    let bytes = tokio::fs::read(archive)
        .await
        .with_context(|| format!("Failed to read {}", archive.display()))?;
    let filename = archive
        .file_name()
        .map_or_else(|| "upload.zip".to_string(), |name| name.to_string_lossy().into_owned());

    sign_in(jobs, credentials).await?;
    let submitted = jobs
        .submit(Upload::zip(filename, bytes), &mut ProgressPrinter)
        .await;
    jobs.session().logout().await;

    match submitted? {
        JobOutcome::Completed { job_id } => {
            println!("Job {job_id} completed");
            if let Some(dir) = download_dir {
                download(jobs, &job_id, &dir.join(artifact_file_name(&job_id))).await?;
            }
        }
        JobOutcome::FinishedWithoutId => {
            println!("Pipeline finished without reporting a job id; nothing to download");
        }
        JobOutcome::Incomplete => bail!("Pipeline stream closed before the job finished"),
    }
    Ok(())
}

async fn files(jobs: &JobClient, job_id: &str, credentials: &Credentials) -> Result<()> {
    sign_in(jobs, credentials).await?;
    let listing = jobs.list_files(job_id).await;
    jobs.session().logout().await;

    println!("{}", serde_json::to_string_pretty(&listing?)?);
    Ok(())
}

async fn download(jobs: &JobClient, job_id: &str, output: &Path) -> Result<()> {
    let bytes = jobs.fetch_artifact(job_id).await?;
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(output, &bytes)
        .await
        .with_context(|| format!("Failed to write {}", output.display()))?;

    info!(job_id, size = bytes.len(), "artifact saved");
    println!("Saved {} ({} bytes)", output.display(), bytes.len());
    Ok(())
}

async fn health(jobs: &JobClient) -> Result<()> {
    let status = jobs.check_health().await;
    println!("Pipeline: {}", status.status);
    if let Some(gpu) = &status.gpu_server {
        println!("GPU server: {gpu}");
    }
    if status.is_healthy() {
        Ok(())
    } else {
        bail!(
            "Pipeline is not healthy: {}",
            status.error.as_deref().unwrap_or("no details")
        )
    }
}
