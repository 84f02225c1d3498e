use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

use crate::services::identity::{AuthError, IdentityProvider};

/// Errors that can occur when interacting with Appwrite
#[derive(Debug, Error)]
pub enum AppwriteError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("API returned error: {0}")]
    ApiError(String),

    #[error("Unauthorized: session is invalid or expired")]
    Unauthorized,

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),
}

impl From<AppwriteError> for AuthError {
    fn from(value: AppwriteError) -> Self {
        match value {
            AppwriteError::Unauthorized => AuthError::Rejected(value.to_string()),
            other => AuthError::Unavailable(other.to_string()),
        }
    }
}

/// Appwrite account client
///
/// Resolves client session JWTs (including anonymous sessions) to the
/// account id by calling `GET /account` on behalf of the session.
pub struct AppwriteClient {
    base_url: String,
    project_id: String,
    client: Client,
}

impl AppwriteClient {
    /// Create a new Appwrite client
    pub fn new(base_url: String, project_id: String) -> Result<Self, AppwriteError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            base_url,
            project_id,
            client,
        })
    }

    /// Fetch the account id owning the given session JWT
    pub async fn account_id(&self, jwt: &str) -> Result<String, AppwriteError> {
        let url = format!("{}/account", self.base_url.trim_end_matches('/'));

        tracing::debug!("Resolving Appwrite session via {}", url);

        let response = self
            .client
            .get(&url)
            .header("X-Appwrite-Project", &self.project_id)
            .header("X-Appwrite-JWT", jwt)
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => {}
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(AppwriteError::Unauthorized);
            }
            status => {
                let body = response.text().await.unwrap_or_else(|_| "Unable to read body".to_string());
                tracing::error!("Appwrite account lookup failed: {} - {}", status, body);
                return Err(AppwriteError::ApiError(format!(
                    "Failed to resolve session: {}",
                    status
                )));
            }
        }

        let json: Value = response.json().await?;

        json.get("$id")
            .and_then(|id| id.as_str())
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .ok_or_else(|| AppwriteError::InvalidResponse("Missing $id in account".into()))
    }
}

#[async_trait]
impl IdentityProvider for AppwriteClient {
    async fn resolve(&self, token: &str) -> Result<String, AuthError> {
        self.account_id(token).await.map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_account_id_from_session() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/account")
            .match_header("X-Appwrite-Project", "test_project")
            .match_header("X-Appwrite-JWT", "session-token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"$id":"anon-123","name":""}"#)
            .create_async()
            .await;

        let client = AppwriteClient::new(server.url(), "test_project".to_string()).unwrap();
        let user_id = client.resolve("session-token").await.unwrap();

        assert_eq!(user_id, "anon-123");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_expired_session_is_rejected() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/account")
            .with_status(401)
            .with_body(r#"{"message":"expired"}"#)
            .create_async()
            .await;

        let client = AppwriteClient::new(server.url(), "test_project".to_string()).unwrap();
        let result = client.resolve("stale").await;

        assert!(matches!(result, Err(AuthError::Rejected(_))));
    }

    #[tokio::test]
    async fn test_server_error_is_unavailable() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/account")
            .with_status(500)
            .create_async()
            .await;

        let client = AppwriteClient::new(format!("{}/", server.url()), "p".to_string()).unwrap();
        let result = client.resolve("token").await;

        assert!(matches!(result, Err(AuthError::Unavailable(_))));
    }
}
