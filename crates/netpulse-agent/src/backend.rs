//! Registration/authorization exchange with the backend.

use async_trait::async_trait;
use netpulse_core::ports::BackendClient;
use netpulse_core::{Error, Result};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct AuthResponse {
    token: String,
}

/// HTTP backend client.
pub struct HttpBackendClient {
    base_url: String,
    http: reqwest::Client,
}

impl HttpBackendClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl BackendClient for HttpBackendClient {
    async fn register(&self, login: &str, password: &str) -> Result<()> {
        let url = format!("{}/v1/agents/register", self.base_url);
        debug!(%url, "Registering agent");

        let response = self
            .http
            .post(&url)
            .json(&json!({ "login": login, "password": password }))
            .send()
            .await
            .map_err(|e| Error::Backend(e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            let status = response.status();
            let reason = response.text().await.unwrap_or_default();
            Err(Error::Backend(format!("register failed ({status}): {reason}")))
        }
    }

    async fn authorize(&self, login: &str, password: &str) -> Result<String> {
        let url = format!("{}/v1/agents/authorize", self.base_url);
        debug!(%url, "Authorizing agent");

        let response = self
            .http
            .post(&url)
            .json(&json!({ "login": login, "password": password }))
            .send()
            .await
            .map_err(|e| Error::Backend(e.to_string()))?;

        if response.status().is_success() {
            let body: AuthResponse = response
                .json()
                .await
                .map_err(|e| Error::Backend(e.to_string()))?;
            Ok(body.token)
        } else {
            let status = response.status();
            let reason = response.text().await.unwrap_or_default();
            Err(Error::AuthorizationDenied(format!("({status}): {reason}")))
        }
    }
}

/// Backend used when no backend URL is configured: accepts any non-blank
/// credentials without a network round trip.
pub struct OfflineBackendClient;

#[async_trait]
impl BackendClient for OfflineBackendClient {
    async fn register(&self, login: &str, password: &str) -> Result<()> {
        if login.trim().is_empty() || password.trim().is_empty() {
            return Err(Error::Backend("Missing credentials".to_string()));
        }
        Ok(())
    }

    async fn authorize(&self, login: &str, password: &str) -> Result<String> {
        self.register(login, password).await?;
        Ok(format!("offline-token-{login}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn offline_backend_rejects_blank_credentials() {
        let client = OfflineBackendClient;
        assert!(client.register("", "secret").await.is_err());
        assert!(client.register("agent", " ").await.is_err());
        assert!(client.register("agent", "secret").await.is_ok());
    }

    #[tokio::test]
    async fn offline_token_is_stable_per_login() {
        let client = OfflineBackendClient;
        let token = client.authorize("agent", "secret").await.unwrap();
        assert_eq!(token, client.authorize("agent", "secret").await.unwrap());
    }
}
