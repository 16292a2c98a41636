use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::constants::{CREDENTIALS_VERSION, SECURE_DIR_MODE, SECURE_FILE_MODE};
use crate::creds::{AwsCredentials, DefaultReference, KeySet, expiration_passed};
use crate::error::{Error, Result};

/// On-disk credential cache document. Key-set and default-pointer fields are
/// optional so that validation can enumerate everything that is missing
/// instead of failing at deserialization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialDocument {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<Meta>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credentials: Option<BTreeMap<String, BTreeMap<String, StoredKeySet>>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<StoredDefault>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredDefault {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredKeySet {
    #[serde(rename = "AccessKeyId", skip_serializing_if = "Option::is_none")]
    pub access_key_id: Option<String>,
    #[serde(rename = "SecretAccessKey", skip_serializing_if = "Option::is_none")]
    pub secret_access_key: Option<String>,
    #[serde(rename = "SessionToken", skip_serializing_if = "Option::is_none")]
    pub session_token: Option<String>,
    #[serde(rename = "Expiration", skip_serializing_if = "Option::is_none")]
    pub expiration: Option<String>,
}

impl StoredKeySet {
    fn from_keys(keys: &KeySet) -> Self {
        Self {
            access_key_id: Some(keys.access_key_id.clone()),
            secret_access_key: Some(keys.secret_access_key.clone()),
            session_token: Some(keys.session_token.clone()),
            expiration: keys.expiration.clone(),
        }
    }

    fn to_keys(&self) -> Option<KeySet> {
        Some(KeySet {
            access_key_id: self.access_key_id.clone()?,
            secret_access_key: self.secret_access_key.clone()?,
            session_token: self.session_token.clone()?,
            expiration: self.expiration.clone(),
        })
    }
}

/// Owns the cache document: validates, queries, mutates, prunes and persists
/// it. Loaded fresh on every command invocation.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    doc: CredentialDocument,
}

impl CredentialStore {
    /// Read the document from `path` if the file exists, otherwise start from
    /// an empty document. Validates before wrapping.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No credential cache at {}, starting empty", path.display());
            return Ok(Self {
                doc: CredentialDocument::default(),
            });
        }

        let contents = fs::read_to_string(path)?;
        if contents.trim().is_empty() {
            return Ok(Self {
                doc: CredentialDocument::default(),
            });
        }

        let doc: CredentialDocument = serde_yaml::from_str(&contents)
            .map_err(|e| Error::SchemaValidation(vec![format!("unparseable document: {e}")]))?;
        Self::from_document(doc)
    }

    /// Wrap an in-memory document, validating it first
    pub fn from_document(doc: CredentialDocument) -> Result<Self> {
        validate(&doc)?;
        Ok(Self { doc })
    }

    pub fn document(&self) -> &CredentialDocument {
        &self.doc
    }

    /// Look up a cached key-set. Both account and role must be given, or
    /// neither (resolving the default reference). Expired entries are never
    /// handed back.
    pub fn get_credentials(
        &self,
        account: Option<&str>,
        role: Option<&str>,
    ) -> Result<Option<AwsCredentials>> {
        let Some((account, role)) = self.resolve_target(account, role)? else {
            return Ok(None);
        };

        let stored = self
            .doc
            .credentials
            .as_ref()
            .and_then(|accounts| accounts.get(&account))
            .and_then(|roles| roles.get(&role));

        let Some(stored) = stored else {
            return Ok(None);
        };

        let keys = stored.to_keys().ok_or_else(|| {
            Error::SchemaValidation(vec![format!(
                "credentials.{account}.{role} is missing mandatory key fields"
            )])
        })?;

        let creds = AwsCredentials::new(keys, account, &role);
        if creds.have_expired() {
            debug!(
                "Cached credentials for {}/{} have expired",
                creds.account(),
                creds.role()
            );
            return Ok(None);
        }
        Ok(Some(creds))
    }

    /// Upsert a credential set and point `meta.default` at it
    pub fn put_credentials(&mut self, creds: &AwsCredentials) -> Result<()> {
        let principal = creds.principal();
        self.doc.meta.get_or_insert_with(Meta::default).default = Some(StoredDefault {
            account: Some(principal.account.clone()),
            role: Some(principal.role.clone()),
        });

        self.doc
            .credentials
            .get_or_insert_with(BTreeMap::new)
            .entry(principal.account)
            .or_default()
            .insert(principal.role, StoredKeySet::from_keys(creds.keys()));

        validate(&self.doc)
    }

    /// Remove the targeted entry (default reference when neither account nor
    /// role is given), collapsing emptied containers and clearing a default
    /// pointer that referenced it. Returns the removed credentials, or None
    /// if nothing matched.
    pub fn remove_credentials(
        &mut self,
        account: Option<&str>,
        role: Option<&str>,
    ) -> Result<Option<AwsCredentials>> {
        let Some((account, role)) = self.resolve_target(account, role)? else {
            return Ok(None);
        };

        let Some(accounts) = self.doc.credentials.as_mut() else {
            return Ok(None);
        };

        let removed = match accounts.get_mut(&account) {
            Some(roles) => roles.remove(&role),
            None => None,
        };
        let Some(removed) = removed else {
            return Ok(None);
        };

        if accounts.get(&account).is_some_and(BTreeMap::is_empty) {
            accounts.remove(&account);
        }
        if accounts.is_empty() {
            self.doc.credentials = None;
        }

        self.clear_default_if_references(&account, &role);

        let keys = removed.to_keys().ok_or_else(|| {
            Error::SchemaValidation(vec![format!(
                "credentials.{account}.{role} is missing mandatory key fields"
            )])
        })?;
        Ok(Some(AwsCredentials::new(keys, account, &role)))
    }

    /// Drop every entry whose expiration has passed, then collapse emptied
    /// containers and a default pointer left dangling. Runs before every
    /// write.
    pub fn prune(&mut self) {
        if let Some(accounts) = self.doc.credentials.as_mut() {
            for roles in accounts.values_mut() {
                roles.retain(|_, keys| {
                    !keys
                        .expiration
                        .as_deref()
                        .is_some_and(expiration_passed)
                });
            }
            accounts.retain(|_, roles| !roles.is_empty());
            if accounts.is_empty() {
                self.doc.credentials = None;
            }
        }

        let dangling = self.default_reference().is_some_and(|default| {
            !self
                .doc
                .credentials
                .as_ref()
                .and_then(|accounts| accounts.get(&default.account))
                .is_some_and(|roles| roles.contains_key(&default.role))
        });
        if dangling {
            if let Some(meta) = self.doc.meta.as_mut() {
                meta.default = None;
            }
        }

        if self.doc.meta.as_ref().is_some_and(|m| m.default.is_none()) {
            self.doc.meta = None;
        }
    }

    /// Stamp the supported version, prune, validate and persist through a
    /// scoped secure file handle (0600 file in a lazily created 0770
    /// directory)
    pub fn write(&mut self, path: &Path) -> Result<()> {
        self.doc.version = Some(CREDENTIALS_VERSION.to_string());
        self.prune();
        validate(&self.doc)?;

        let file = open_path_secure(path)?;
        serde_yaml::to_writer(&file, &self.doc)
            .map_err(|e| Error::Other(anyhow::anyhow!("failed to write cache document: {e}")))?;
        Ok(())
    }

    /// The current default reference, if one is fully specified
    pub fn default_reference(&self) -> Option<DefaultReference> {
        let default = self.doc.meta.as_ref()?.default.as_ref()?;
        Some(DefaultReference {
            account: default.account.clone()?,
            role: default.role.clone()?,
        })
    }

    fn resolve_target(
        &self,
        account: Option<&str>,
        role: Option<&str>,
    ) -> Result<Option<(String, String)>> {
        match (account, role) {
            (Some(account), Some(role)) => Ok(Some((account.to_string(), role.to_string()))),
            (None, None) => Ok(self
                .default_reference()
                .map(|default| (default.account, default.role))),
            _ => Err(Error::ContractViolation),
        }
    }

    fn clear_default_if_references(&mut self, account: &str, role: &str) {
        let matches = self
            .default_reference()
            .is_some_and(|default| default.account == account && default.role == role);
        if matches {
            if let Some(meta) = self.doc.meta.as_mut() {
                meta.default = None;
            }
        }
        if self.doc.meta.as_ref().is_some_and(|m| m.default.is_none()) {
            self.doc.meta = None;
        }
    }
}

/// Structural check of the whole document, collecting every violation
fn validate(doc: &CredentialDocument) -> Result<()> {
    let mut violations = Vec::new();

    if let Some(version) = &doc.version {
        if version != CREDENTIALS_VERSION {
            violations.push(format!(
                "unsupported version '{version}' (supported: {CREDENTIALS_VERSION})"
            ));
        }
    }

    if let Some(default) = doc.meta.as_ref().and_then(|m| m.default.as_ref()) {
        if default.account.is_none() {
            violations.push("meta.default is missing 'account'".to_string());
        }
        if default.role.is_none() {
            violations.push("meta.default is missing 'role'".to_string());
        }
    }

    if let Some(accounts) = &doc.credentials {
        for (account, roles) in accounts {
            for (role, keys) in roles {
                for (field, value) in [
                    ("AccessKeyId", &keys.access_key_id),
                    ("SecretAccessKey", &keys.secret_access_key),
                    ("SessionToken", &keys.session_token),
                ] {
                    if value.is_none() {
                        violations
                            .push(format!("credentials.{account}.{role} is missing '{field}'"));
                    }
                }
            }
        }
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(Error::SchemaValidation(violations))
    }
}

/// Truncate-and-rewrite open of a cache file with owner-only permissions,
/// creating the parent directory with group-restricted permissions if missing
pub(crate) fn open_path_secure(path: &Path) -> Result<fs::File> {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            let mut builder = fs::DirBuilder::new();
            builder.recursive(true);
            #[cfg(unix)]
            {
                use std::os::unix::fs::DirBuilderExt;
                builder.mode(SECURE_DIR_MODE);
            }
            builder.create(parent)?;
            // DirBuilder's mode is subject to the process umask; re-apply it
            // so the directory ends up 0770 regardless
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                fs::set_permissions(parent, fs::Permissions::from_mode(SECURE_DIR_MODE))?;
            }
        }
    }

    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(SECURE_FILE_MODE);
    }
    Ok(options.open(path)?)
}
