//! Bonsai HTTP client

pub mod auth;
pub mod error;
pub mod pipeline;
pub mod typed;

pub use error::ClientError;
pub use pipeline::Upload;
pub use typed::{AuthenticatedClient, PublicClient, TypedClientBuilder};

use reqwest::{RequestBuilder, Response};

/// User agent sent by every client
pub const USER_AGENT: &str = concat!("bonsai-client/", env!("CARGO_PKG_VERSION"));

/// Send a request and turn non-success statuses into [`ClientError`]
///
/// The error carries the response body text so callers can surface what
/// the server said.
pub(crate) async fn send_checked(request: RequestBuilder) -> Result<Response, ClientError> {
    let response = request.send().await?;
    let status = response.status();

    if status.is_success() {
        Ok(response)
    } else {
        let message = response.text().await.unwrap_or_else(|_| status.to_string());
        tracing::debug!(status = status.as_u16(), %message, "request rejected");
        Err(ClientError::from_status(status, message))
    }
}

/// Attach browser cookies to a request.
///
/// Native builds keep cookies in the client's cookie store instead.
pub(crate) fn include_credentials(request: RequestBuilder) -> RequestBuilder {
    #[cfg(target_arch = "wasm32")]
    {
        request.fetch_credentials_include()
    }

    #[cfg(not(target_arch = "wasm32"))]
    {
        request
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!("{base}{path}")
}

fn normalize_base(url: impl Into<String>) -> String {
    url.into().trim_end_matches('/').to_string()
}
