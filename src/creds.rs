use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// One set of temporary AWS API keys as stored in the cache document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySet {
    #[serde(rename = "AccessKeyId")]
    pub access_key_id: String,
    #[serde(rename = "SecretAccessKey")]
    pub secret_access_key: String,
    #[serde(rename = "SessionToken")]
    pub session_token: String,
    #[serde(rename = "Expiration", skip_serializing_if = "Option::is_none")]
    pub expiration: Option<String>,
}

/// Expiration as received from a collaborator: either already a string or a
/// concrete instant that needs stringifying
#[derive(Debug, Clone)]
pub enum Expiration {
    Iso(String),
    Instant(DateTime<Utc>),
}

/// The (account, role) pair behind `meta.default`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultReference {
    pub account: String,
    pub role: String,
}

/// Normalized temporary credential set for one account/role pair.
/// Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AwsCredentials {
    account: String,
    role: String,
    keys: KeySet,
}

impl KeySet {
    pub fn new(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        session_token: impl Into<String>,
        expiration: Option<Expiration>,
    ) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token: session_token.into(),
            expiration: expiration.map(normalize_expiration),
        }
    }
}

impl AwsCredentials {
    pub fn new(keys: KeySet, account: impl Into<String>, role_arn: &str) -> Self {
        Self {
            account: account.into(),
            role: extract_role_name(role_arn).to_string(),
            keys,
        }
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    pub fn role(&self) -> &str {
        &self.role
    }

    pub fn keys(&self) -> &KeySet {
        &self.keys
    }

    /// The (account, role) pair used for default-pointer bookkeeping
    pub fn principal(&self) -> DefaultReference {
        DefaultReference {
            account: self.account.clone(),
            role: self.role.clone(),
        }
    }

    /// True iff an expiration is present and lies at or before now (UTC).
    /// The boundary counts as expired.
    pub fn have_expired(&self) -> bool {
        match &self.keys.expiration {
            Some(expiration) => expiration_passed(expiration),
            None => false,
        }
    }
}

/// Returns the substring after the last `role/` segment, or the input
/// unchanged if no such segment exists
pub fn extract_role_name(role_arn: &str) -> &str {
    match role_arn.rfind("role/") {
        Some(idx) => &role_arn[idx + "role/".len()..],
        None => role_arn,
    }
}

/// Stringify a timestamp-typed expiration; pass string expirations through
/// untouched
pub fn normalize_expiration(expiration: Expiration) -> String {
    match expiration {
        Expiration::Iso(s) => s,
        Expiration::Instant(dt) => dt.to_rfc3339_opts(SecondsFormat::Secs, false),
    }
}

/// Whether an ISO-8601 expiration string lies at or before now (UTC).
/// Strings that fail to parse are treated as not yet expired; the next
/// issuance round-trip settles the question.
pub fn expiration_passed(expiration: &str) -> bool {
    match DateTime::parse_from_rfc3339(expiration) {
        Ok(parsed) => parsed.with_timezone(&Utc) <= Utc::now(),
        Err(e) => {
            warn!("Unparseable expiration '{}': {}", expiration, e);
            false
        }
    }
}
