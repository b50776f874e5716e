//! Frontend configuration

use bonsai_http::{ClientError, PublicClient, TypedClientBuilder};
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Authentication configuration
pub struct AuthConfig;

impl AuthConfig {
    /// Remaining validity below which a credential is refreshed ahead of use
    pub const REFRESH_AHEAD_SECS: i64 = 60;

    /// Environment variable prefix for [`ClientConfig`] overrides
    pub const ENV_PREFIX: &'static str = "BONSAI";
}

/// Endpoints and timing used by the clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Storefront backend (session and pipeline endpoints)
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Artifact server serving `/download/{job_id}`
    #[serde(default = "default_artifact_url")]
    pub artifact_url: String,
    /// Upper bound for a whole request, including a pipeline stream
    ///
    /// Unset means no limit, so long reconstructions run to completion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    /// Upper bound for establishing a connection
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// See [`AuthConfig::REFRESH_AHEAD_SECS`]
    #[serde(default = "default_refresh_ahead_secs")]
    pub refresh_ahead_secs: i64,
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_artifact_url() -> String {
    "http://localhost:8090".to_string()
}

const fn default_connect_timeout_secs() -> u64 {
    30
}

const fn default_refresh_ahead_secs() -> i64 {
    AuthConfig::REFRESH_AHEAD_SECS
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            artifact_url: default_artifact_url(),
            timeout_secs: None,
            connect_timeout_secs: default_connect_timeout_secs(),
            refresh_ahead_secs: default_refresh_ahead_secs(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from defaults and `BONSAI__*` environment variables
    pub fn load() -> Result<Self, ConfigError> {
        Self::builder(None)?.build()?.try_deserialize()
    }

    /// Load configuration from a specific file, with environment overrides
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::builder(Some(path.as_ref()))?
            .build()?
            .try_deserialize()
    }

    fn builder(
        path: Option<&Path>,
    ) -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }

        Ok(builder.add_source(
            Environment::with_prefix(AuthConfig::ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        ))
    }

    /// Overall request timeout, if one is configured
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Build the HTTP client these settings describe
    pub fn public_client(&self) -> Result<PublicClient, ClientError> {
        let mut builder = TypedClientBuilder::new()
            .base_url(&self.base_url)
            .artifact_url(&self.artifact_url)
            .connect_timeout(self.connect_timeout());
        if let Some(timeout) = self.timeout() {
            builder = builder.timeout(timeout);
        }
        builder.build_public()
    }
}
