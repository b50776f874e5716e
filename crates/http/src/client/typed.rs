//! Type-safe API clients that enforce authentication requirements at compile time

use super::{ClientError, USER_AGENT, join_url, normalize_base, send_checked};
use reqwest::{Client, ClientBuilder, header};
use std::time::Duration;

/// Client for public endpoints that don't require a bearer credential
#[derive(Clone, Debug)]
pub struct PublicClient {
    client: Client,
    base_url: String,
    artifact_url: String,
}

/// Client for endpoints that require a bearer credential
#[derive(Clone)]
pub struct AuthenticatedClient {
    client: Client,
    base_url: String,
    artifact_url: String,
    token: String,
}

impl std::fmt::Debug for AuthenticatedClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthenticatedClient")
            .field("base_url", &self.base_url)
            .field("artifact_url", &self.artifact_url)
            .finish_non_exhaustive()
    }
}

fn build_http_client(
    timeout: Option<Duration>,
    connect_timeout: Option<Duration>,
) -> Result<Client, ClientError> {
    #[cfg(not(target_arch = "wasm32"))]
    let client = {
        let mut builder = ClientBuilder::new()
            .user_agent(USER_AGENT)
            .cookie_store(true);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(connect_timeout) = connect_timeout {
            builder = builder.connect_timeout(connect_timeout);
        }
        builder.build()?
    };

    #[cfg(target_arch = "wasm32")]
    let client = {
        let _ = (timeout, connect_timeout); // Timeouts not supported on WASM
        ClientBuilder::new().user_agent(USER_AGENT).build()?
    };

    Ok(client)
}

impl PublicClient {
    /// Create a new public client; artifacts are served from `base_url` too
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        TypedClientBuilder::new().base_url(base_url).build_public()
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Get the artifact server URL
    pub fn artifact_url(&self) -> &str {
        &self.artifact_url
    }

    /// Create a request builder against the backend, without authentication
    pub fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client.request(method, join_url(&self.base_url, path))
    }

    /// Create a request builder against the artifact server
    pub fn artifact_request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client.request(method, join_url(&self.artifact_url, path))
    }

    /// Execute a request and handle common errors
    pub async fn execute<T: serde::de::DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, ClientError> {
        Ok(send_checked(request).await?.json().await?)
    }

    /// Attach a bearer credential to get an authenticated client
    ///
    /// The underlying connection pool and cookie store are shared.
    pub fn authenticate(&self, token: impl Into<String>) -> AuthenticatedClient {
        AuthenticatedClient {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            artifact_url: self.artifact_url.clone(),
            token: token.into(),
        }
    }
}

impl AuthenticatedClient {
    /// Create a new authenticated client
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Result<Self, ClientError> {
        TypedClientBuilder::new()
            .base_url(base_url)
            .build_authenticated(token)
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Create a request builder with the bearer header
    pub fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, join_url(&self.base_url, path))
            .header(header::AUTHORIZATION, format!("Bearer {}", self.token))
    }

    /// Execute a request and handle common errors
    pub async fn execute<T: serde::de::DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, ClientError> {
        Ok(send_checked(request).await?.json().await?)
    }

    /// Create a public client (useful for calling public endpoints)
    pub fn to_public(&self) -> PublicClient {
        PublicClient {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            artifact_url: self.artifact_url.clone(),
        }
    }
}

fn validate_url(field: &str, value: &str) -> Result<(), ClientError> {
    let url = url::Url::parse(value)
        .map_err(|e| ClientError::Configuration(format!("invalid {field} '{value}': {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(ClientError::Configuration(format!(
            "unsupported {field} scheme '{scheme}'"
        ))),
    }
}

/// Type-safe builder that creates the appropriate client type
#[derive(Debug, Default)]
pub struct TypedClientBuilder {
    base_url: Option<String>,
    artifact_url: Option<String>,
    timeout: Option<Duration>,
    connect_timeout: Option<Duration>,
}

impl TypedClientBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the backend base URL
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set the artifact server URL (defaults to the base URL)
    pub fn artifact_url(mut self, url: impl Into<String>) -> Self {
        self.artifact_url = Some(url.into());
        self
    }

    /// Set the overall request timeout
    ///
    /// This bounds the whole request including the streamed body, so a
    /// pipeline run longer than it is cut off. Unset by default.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the timeout for establishing a connection
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    fn urls(&self) -> Result<(String, String), ClientError> {
        let base_url = self
            .base_url
            .clone()
            .ok_or_else(|| ClientError::Configuration("base_url is required".into()))?;
        let base_url = normalize_base(base_url);
        let artifact_url = self
            .artifact_url
            .clone()
            .map_or_else(|| base_url.clone(), normalize_base);
        validate_url("base_url", &base_url)?;
        validate_url("artifact_url", &artifact_url)?;
        Ok((base_url, artifact_url))
    }

    /// Build a public client
    pub fn build_public(self) -> Result<PublicClient, ClientError> {
        let (base_url, artifact_url) = self.urls()?;
        Ok(PublicClient {
            client: build_http_client(self.timeout, self.connect_timeout)?,
            base_url,
            artifact_url,
        })
    }

    /// Build an authenticated client
    pub fn build_authenticated(
        self,
        token: impl Into<String>,
    ) -> Result<AuthenticatedClient, ClientError> {
        Ok(self.build_public()?.authenticate(token))
    }
}
