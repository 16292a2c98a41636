use std::rc::Rc;

use tracing::{info, warn};

use crate::constants::{AWS_APP_TYPE, DEFAULT_DURATION_SECONDS, SUPPORTED_FACTORS};
use crate::creds::AwsCredentials;
use crate::error::{Error, Result};
use crate::okta::{AppLink, AuthnFactor, AuthnResult, IdpClient, IdpSession, SessionCache};
use crate::okta::session::CachedSession;
use crate::prompt::{Chooser, Prompter};
use crate::saml::{SamlAssertion, SamlRole};
use crate::sts::CredentialIssuer;

/// Knobs for one resolution run. Process-wide constants (supported factors,
/// service URL) are injected here rather than read from global state.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Username to log in as; prompted for when absent
    pub username: Option<String>,
    /// Account (application label) to auto-select when it matches exactly one
    /// candidate case-insensitively
    pub target_account: Option<String>,
    /// Bare role name to auto-select under the same policy
    pub target_role: Option<String>,
    /// Requested credential lifetime
    pub duration_seconds: i32,
    /// Cap on login attempts. None retries without bound, which is the
    /// interactive default; tests inject a finite cap.
    pub max_attempts: Option<u32>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            username: None,
            target_account: None,
            target_role: None,
            duration_seconds: DEFAULT_DURATION_SECONDS,
            max_attempts: None,
        }
    }
}

/// Drives a login through the identity provider to a freshly issued
/// credential set: session (cached or interactive, MFA included) →
/// application → SAML assertion → role → issuance.
///
/// Authentication and transport failures restart the flow from the login
/// step; everything else aborts it.
pub struct RoleResolver {
    config: ResolverConfig,
    idp: Box<dyn IdpClient>,
    issuer: Box<dyn CredentialIssuer>,
    prompter: Rc<dyn Prompter>,
    chooser: Rc<dyn Chooser>,
    sessions: SessionCache,
}

impl RoleResolver {
    pub fn new(
        config: ResolverConfig,
        idp: Box<dyn IdpClient>,
        issuer: Box<dyn CredentialIssuer>,
        prompter: Rc<dyn Prompter>,
        chooser: Rc<dyn Chooser>,
        sessions: SessionCache,
    ) -> Self {
        Self {
            config,
            idp,
            issuer,
            prompter,
            chooser,
            sessions,
        }
    }

    /// Obtain fresh credentials, re-prompting until the identity provider
    /// accepts (bounded only by the configured attempt cap)
    pub async fn resolve(&self) -> Result<AwsCredentials> {
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            match self.attempt().await {
                Ok(creds) => return Ok(creds),
                Err(e) if e.is_recoverable() => {
                    warn!("Login attempt {} failed: {}", attempts, e);
                    eprintln!("{e}");
                    if let Some(cap) = self.config.max_attempts {
                        if attempts >= cap {
                            return Err(e);
                        }
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn attempt(&self) -> Result<AwsCredentials> {
        let session = self.establish_session().await?;
        let app = self.select_application(&session).await?;

        let encoded = self.idp.fetch_saml_assertion(&session.id, &app.url).await?;
        let assertion = SamlAssertion::from_base64(&encoded)?;

        let role = self.select_role(&app.label, assertion.aws_roles()?)?;

        let keys = self
            .issuer
            .assume_role(
                &role.principal_arn,
                &role.role_arn,
                assertion.encoded(),
                self.config.duration_seconds,
            )
            .await?;

        Ok(AwsCredentials::new(keys, app.label, &role.role_arn))
    }

    /// Reuse a cached IdP session when its owner matches the requested
    /// username (any owner when none was requested); otherwise log in
    /// interactively
    async fn establish_session(&self) -> Result<IdpSession> {
        let cached = match &self.config.username {
            Some(username) => self.sessions.find(username),
            None => self.sessions.load().into_iter().next(),
        };

        if let Some(cached) = cached {
            if let Some(user_id) = self.idp.validate_session(&cached.session_id).await? {
                info!("Reusing cached IdP session for {}", cached.username);
                return Ok(IdpSession {
                    id: cached.session_id,
                    user_id,
                    login: cached.username,
                    expires_at: cached.expires_at,
                });
            }
            self.sessions.remove(&cached.username)?;
        }

        let username = match &self.config.username {
            Some(username) => username.clone(),
            None => self.prompter.prompt_username()?,
        };
        let password = self.prompter.prompt_password()?;

        let session_token = match self.idp.authenticate(&username, &password).await? {
            AuthnResult::Success { session_token } => session_token,
            AuthnResult::MfaRequired {
                state_token,
                factors,
            } => self.complete_mfa(&state_token, factors).await?,
        };

        let session = self.idp.create_session(&session_token).await?;
        self.sessions.save(CachedSession {
            username,
            session_id: session.id.clone(),
            user_id: session.user_id.clone(),
            expires_at: session.expires_at,
        })?;
        Ok(session)
    }

    /// Pick and satisfy one factor from the supported allow-list. SMS needs
    /// the out-of-band code sent before prompting for it.
    async fn complete_mfa(
        &self,
        state_token: &str,
        offered: Vec<AuthnFactor>,
    ) -> Result<String> {
        let supported: Vec<AuthnFactor> = offered
            .iter()
            .filter(|f| SUPPORTED_FACTORS.contains(&f.factor_type.as_str()))
            .cloned()
            .collect();

        if supported.is_empty() {
            return Err(Error::UnsupportedFactor {
                supported: SUPPORTED_FACTORS.iter().map(ToString::to_string).collect(),
                offered: offered.into_iter().map(|f| f.factor_type).collect(),
            });
        }

        let labels: Vec<String> = supported.iter().map(|f| f.factor_type.clone()).collect();
        let index = self.chooser.choose("Available MFA factors:", &labels)?;
        let factor = supported
            .get(index)
            .ok_or_else(|| Error::Selection(format!("factor index {index} out of range")))?;

        if factor.factor_type == "sms" {
            self.idp
                .issue_factor_challenge(state_token, &factor.id)
                .await?;
        }

        let code = self.prompter.prompt_mfa_code(&factor.factor_type)?;
        self.idp.verify_factor(state_token, &factor.id, &code).await
    }

    /// AWS-type application links, label-sorted for a deterministic menu
    async fn select_application(&self, session: &IdpSession) -> Result<AppLink> {
        let mut links: Vec<AppLink> = self
            .idp
            .list_app_links(&session.id, &session.user_id)
            .await?
            .into_iter()
            .filter(|link| link.app_type == AWS_APP_TYPE)
            .collect();
        links.sort_by(|a, b| a.label.cmp(&b.label));

        if links.is_empty() {
            return Err(Error::Selection(
                "No AWS applications available on this account".to_string(),
            ));
        }

        self.select(
            links,
            self.config.target_account.as_deref(),
            "Available AWS accounts:",
            |link| &link.label,
        )
    }

    fn select_role(&self, app_label: &str, roles: Vec<SamlRole>) -> Result<SamlRole> {
        self.select(
            roles,
            self.config.target_role.as_deref(),
            &format!("Available roles in {app_label}:"),
            |role| &role.name,
        )
    }

    /// A requested name matching exactly one candidate case-insensitively
    /// short-circuits the menu; otherwise the chooser decides
    fn select<T>(
        &self,
        mut candidates: Vec<T>,
        requested: Option<&str>,
        title: &str,
        name: impl Fn(&T) -> &str,
    ) -> Result<T> {
        if let Some(requested) = requested {
            let matches: Vec<usize> = candidates
                .iter()
                .enumerate()
                .filter(|(_, c)| name(c).eq_ignore_ascii_case(requested))
                .map(|(i, _)| i)
                .collect();
            if let [index] = matches[..] {
                return Ok(candidates.swap_remove(index));
            }
        }

        let labels: Vec<String> = candidates.iter().map(|c| name(c).to_string()).collect();
        let index = self.chooser.choose(title, &labels)?;
        if index >= candidates.len() {
            return Err(Error::Selection(format!(
                "selection index {index} out of range"
            )));
        }
        Ok(candidates.swap_remove(index))
    }
}
