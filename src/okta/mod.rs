use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub mod client;
pub mod session;

pub use client::OktaClient;
pub use session::SessionCache;

/// One MFA factor offered during login
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AuthnFactor {
    pub id: String,
    #[serde(rename = "factorType")]
    pub factor_type: String,
    #[serde(default)]
    pub provider: Option<String>,
}

/// Outcome of a primary authentication call
#[derive(Debug, Clone)]
pub enum AuthnResult {
    Success {
        session_token: String,
    },
    MfaRequired {
        state_token: String,
        factors: Vec<AuthnFactor>,
    },
}

/// An established IdP session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdpSession {
    pub id: String,
    pub user_id: String,
    pub login: String,
    pub expires_at: DateTime<Utc>,
}

/// One application link on the user's IdP dashboard
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AppLink {
    pub label: String,
    #[serde(rename = "appName")]
    pub app_type: String,
    #[serde(rename = "linkUrl")]
    pub url: String,
}

/// Identity-provider collaborator contract. The production implementation is
/// [`OktaClient`]; tests substitute deterministic doubles.
#[async_trait]
pub trait IdpClient {
    /// Primary authentication with username and password
    async fn authenticate(&self, username: &str, password: &str) -> Result<AuthnResult>;

    /// Trigger an out-of-band challenge (e.g. send the SMS code) for a factor
    async fn issue_factor_challenge(&self, state_token: &str, factor_id: &str) -> Result<()>;

    /// Submit a factor response; returns the one-time session token
    async fn verify_factor(
        &self,
        state_token: &str,
        factor_id: &str,
        pass_code: &str,
    ) -> Result<String>;

    /// Exchange a session token for a full session
    async fn create_session(&self, session_token: &str) -> Result<IdpSession>;

    /// Check whether a cached session id is still alive; returns the owning
    /// user id if so
    async fn validate_session(&self, session_id: &str) -> Result<Option<String>>;

    /// List the user's application links
    async fn list_app_links(&self, session_id: &str, user_id: &str) -> Result<Vec<AppLink>>;

    /// Fetch the Base64 SAML assertion for an application using the active
    /// session
    async fn fetch_saml_assertion(&self, session_id: &str, app_url: &str) -> Result<String>;
}
