use async_trait::async_trait;
use anyhow::Context;
use chrono::{DateTime, Utc};
use reqwest::{Client as ReqwestClient, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use super::{AppLink, AuthnFactor, AuthnResult, IdpClient, IdpSession};
use crate::error::{Error, Result};
use crate::saml::extract_saml_response;

/// Okta API client speaking the authn, sessions and users endpoints
#[derive(Debug, Clone)]
pub struct OktaClient {
    base_url: String,
    client: ReqwestClient,
}

#[derive(Debug, Deserialize)]
struct AuthnResponse {
    status: String,
    #[serde(rename = "stateToken")]
    state_token: Option<String>,
    #[serde(rename = "sessionToken")]
    session_token: Option<String>,
    #[serde(rename = "_embedded")]
    embedded: Option<AuthnEmbedded>,
}

#[derive(Debug, Deserialize)]
struct AuthnEmbedded {
    #[serde(default)]
    factors: Vec<AuthnFactor>,
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    id: String,
    #[serde(rename = "userId")]
    user_id: String,
    login: String,
    #[serde(rename = "expiresAt")]
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct MeResponse {
    #[serde(rename = "userId")]
    user_id: String,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(rename = "errorSummary")]
    error_summary: String,
}

impl OktaClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: ReqwestClient::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn session_cookie(session_id: &str) -> String {
        format!("sid={session_id}")
    }

    /// Turn a non-success authn response into an Authentication error with
    /// the provider's own summary when one is present
    async fn authn_failure(response: reqwest::Response) -> Error {
        let status = response.status();
        match response.json::<ApiError>().await {
            Ok(api_error) => Error::Authentication(api_error.error_summary),
            Err(_) => Error::Authentication(format!("identity provider returned {status}")),
        }
    }

    async fn post_authn(&self, path: &str, body: serde_json::Value) -> Result<AuthnResponse> {
        let response = self.client.post(self.url(path)).json(&body).send().await?;

        if !response.status().is_success() {
            return Err(Self::authn_failure(response).await);
        }

        let parsed = response
            .json::<AuthnResponse>()
            .await
            .context("Failed to parse authentication response")?;
        Ok(parsed)
    }
}

#[async_trait]
impl IdpClient for OktaClient {
    async fn authenticate(&self, username: &str, password: &str) -> Result<AuthnResult> {
        info!("Authenticating {} against {}", username, self.base_url);

        let parsed = self
            .post_authn(
                "/api/v1/authn",
                json!({ "username": username, "password": password }),
            )
            .await?;

        match parsed.status.as_str() {
            "SUCCESS" => Ok(AuthnResult::Success {
                session_token: parsed
                    .session_token
                    .context("authentication succeeded without a session token")?,
            }),
            "MFA_REQUIRED" => Ok(AuthnResult::MfaRequired {
                state_token: parsed
                    .state_token
                    .context("MFA challenge without a state token")?,
                factors: parsed.embedded.map(|e| e.factors).unwrap_or_default(),
            }),
            other => Err(Error::Authentication(format!(
                "unexpected authentication status: {other}"
            ))),
        }
    }

    async fn issue_factor_challenge(&self, state_token: &str, factor_id: &str) -> Result<()> {
        debug!("Issuing challenge for factor {}", factor_id);
        self.post_authn(
            &format!("/api/v1/authn/factors/{factor_id}/verify"),
            json!({ "stateToken": state_token }),
        )
        .await?;
        Ok(())
    }

    async fn verify_factor(
        &self,
        state_token: &str,
        factor_id: &str,
        pass_code: &str,
    ) -> Result<String> {
        let parsed = self
            .post_authn(
                &format!("/api/v1/authn/factors/{factor_id}/verify"),
                json!({ "stateToken": state_token, "passCode": pass_code }),
            )
            .await?;

        match parsed.status.as_str() {
            "SUCCESS" => parsed
                .session_token
                .context("factor verification succeeded without a session token")
                .map_err(Error::from),
            other => Err(Error::Authentication(format!(
                "factor verification returned status: {other}"
            ))),
        }
    }

    async fn create_session(&self, session_token: &str) -> Result<IdpSession> {
        let response = self
            .client
            .post(self.url("/api/v1/sessions"))
            .json(&json!({ "sessionToken": session_token }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::authn_failure(response).await);
        }

        let parsed = response
            .json::<SessionResponse>()
            .await
            .context("Failed to parse session response")?;
        Ok(IdpSession {
            id: parsed.id,
            user_id: parsed.user_id,
            login: parsed.login,
            expires_at: parsed.expires_at,
        })
    }

    async fn validate_session(&self, session_id: &str) -> Result<Option<String>> {
        let response = self
            .client
            .get(self.url("/api/v1/sessions/me"))
            .header(reqwest::header::COOKIE, Self::session_cookie(session_id))
            .send()
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Ok(None),
            status if status.is_success() => {
                let parsed = response
                    .json::<MeResponse>()
                    .await
                    .context("Failed to parse session lookup response")?;
                Ok(Some(parsed.user_id))
            }
            _ => {
                response.error_for_status()?;
                Ok(None)
            }
        }
    }

    async fn list_app_links(&self, session_id: &str, user_id: &str) -> Result<Vec<AppLink>> {
        let response = self
            .client
            .get(self.url(&format!("/api/v1/users/{user_id}/appLinks")))
            .header(reqwest::header::COOKIE, Self::session_cookie(session_id))
            .send()
            .await?
            .error_for_status()?;

        let links = response
            .json::<Vec<AppLink>>()
            .await
            .context("Failed to parse application links")?;
        Ok(links)
    }

    async fn fetch_saml_assertion(&self, session_id: &str, app_url: &str) -> Result<String> {
        debug!("Fetching SAML assertion from {}", app_url);
        let response = self
            .client
            .get(app_url)
            .header(reqwest::header::COOKIE, Self::session_cookie(session_id))
            .send()
            .await?
            .error_for_status()?;

        let html = response.text().await?;
        extract_saml_response(&html)
    }
}
