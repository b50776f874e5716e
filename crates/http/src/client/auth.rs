//! Session endpoints
//!
//! These rely on the HTTP-only refresh cookie set by `/login`, never on a
//! bearer header.

use super::{ClientError, PublicClient, include_credentials, send_checked};
use crate::types::{RegisterRequest, TokenResponse};
use reqwest::Method;
use reqwest::multipart::Form;

impl PublicClient {
    /// Exchange email and password for an access token
    ///
    /// The server also sets the refresh cookie used by [`Self::refresh`].
    pub async fn login(&self, email: &str, password: &str) -> Result<TokenResponse, ClientError> {
        let form = Form::new()
            .text("username", email.to_string())
            .text("password", password.to_string());
        let request = include_credentials(self.request(Method::POST, "/login").multipart(form));
        self.execute(request).await
    }

    /// Create a customer account
    pub async fn register(&self, email: &str, password: &str) -> Result<(), ClientError> {
        let request = self.request(Method::POST, "/register").json(&RegisterRequest {
            email: email.to_string(),
            password: password.to_string(),
        });
        send_checked(request).await?;
        Ok(())
    }

    /// Obtain a new access token using the refresh cookie
    pub async fn refresh(&self) -> Result<TokenResponse, ClientError> {
        let request = include_credentials(self.request(Method::POST, "/refresh"));
        self.execute(request).await
    }

    /// Invalidate the refresh cookie server-side
    pub async fn logout(&self) -> Result<(), ClientError> {
        let request = include_credentials(self.request(Method::POST, "/logout"));
        send_checked(request).await?;
        Ok(())
    }
}
