//! Server side of the session

use async_trait::async_trait;
use bonsai_http::{ClientError, PublicClient};

/// Session endpoints the store talks to
#[async_trait]
pub trait SessionBackend: Send + Sync {
    /// Exchange email and password for a raw access token
    async fn login(&self, email: &str, password: &str) -> Result<String, ClientError>;

    /// Obtain a new raw access token from the refresh cookie
    async fn refresh(&self) -> Result<String, ClientError>;

    /// Invalidate the session server-side
    async fn logout(&self) -> Result<(), ClientError>;
}

#[async_trait]
impl SessionBackend for PublicClient {
    async fn login(&self, email: &str, password: &str) -> Result<String, ClientError> {
        Ok(Self::login(self, email, password).await?.access_token)
    }

    async fn refresh(&self) -> Result<String, ClientError> {
        Ok(Self::refresh(self).await?.access_token)
    }

    async fn logout(&self) -> Result<(), ClientError> {
        Self::logout(self).await
    }
}

// Mock implementation for testing
#[cfg(test)]
pub mod mock {
    use super::*;
    use mockall::mock;

    mock! {
        pub SessionBackend {}

        #[async_trait]
        impl SessionBackend for SessionBackend {
            async fn login(&self, email: &str, password: &str) -> Result<String, ClientError>;
            async fn refresh(&self) -> Result<String, ClientError>;
            async fn logout(&self) -> Result<(), ClientError>;
        }
    }
}
