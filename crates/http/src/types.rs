//! Request and response bodies

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Body returned by `/login` and `/refresh`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
}

/// Body sent to `/register`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
}

/// Pipeline health as reported by `/pipeline/health`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpu_server: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HealthStatus {
    /// Status reported when the backend could not be asked
    #[must_use]
    pub fn unreachable(error: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            gpu_server: None,
            error: Some(error.into()),
        }
    }

    /// Check if the backend reports a healthy pipeline
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}
