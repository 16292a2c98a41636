use anyhow::Context;
use clap::Args;
use ini::Ini;
use tokio::fs;
use tracing::info;

use super::TargetArgs;
use crate::constants;
use crate::creds::AwsCredentials;
use crate::error::Result;
use crate::fetch;

/// Write broker-managed credentials into the AWS shared credentials file so
/// that tools without subprocess wrapping can pick them up
#[derive(Debug, Clone, Args)]
pub struct WriteCommand {
    #[command(flatten)]
    pub target: TargetArgs,
}

impl WriteCommand {
    pub async fn execute(self, profile: &str) -> Result<()> {
        let cache_path = super::cache_path()?;
        let resolver = super::build_resolver(profile, &self.target).await?;

        let creds = fetch::fetch_credentials(
            &cache_path,
            self.target.account.as_deref(),
            self.target.role.as_deref(),
            &resolver,
        )
        .await?;

        save_shared_credentials(profile, &creds).await?;

        println!("AWS credentials saved to {profile} profile.");
        if let Some(expiration) = &creds.keys().expiration {
            println!("Credentials will expire at: {expiration}");
        }
        Ok(())
    }
}

/// Upsert one profile section of the AWS shared credentials ini, leaving
/// other profiles untouched
pub(crate) async fn save_shared_credentials(profile: &str, creds: &AwsCredentials) -> Result<()> {
    let path =
        constants::aws_credentials_path().context("Failed to determine AWS credentials path")?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let mut ini = path
        .exists()
        .then(|| Ini::load_from_file(&path).ok())
        .flatten()
        .unwrap_or_else(Ini::new);

    let keys = creds.keys();
    ini.with_section(Some(profile))
        .set("aws_access_key_id", &keys.access_key_id)
        .set("aws_secret_access_key", &keys.secret_access_key)
        .set("aws_session_token", &keys.session_token)
        .set(
            "aws_session_expiration",
            keys.expiration.as_deref().unwrap_or("unknown"),
        );

    ini.write_to_file(&path)
        .context("Failed to write credentials file")?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let metadata = fs::metadata(&path).await?;
        let mut permissions = metadata.permissions();
        permissions.set_mode(0o600);
        fs::set_permissions(&path, permissions).await?;
    }

    info!("Credentials saved to profile: {}", profile);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::creds::{Expiration, KeySet};
    use chrono::{TimeZone, Utc};
    use serial_test::serial;
    use std::env;
    use tempfile::TempDir;

    fn creds() -> AwsCredentials {
        let expiration = Expiration::Instant(Utc.with_ymd_and_hms(2026, 8, 28, 12, 0, 0).unwrap());
        AwsCredentials::new(
            KeySet::new("AKIATEST", "secret", "token", Some(expiration)),
            "Prod",
            "arn:aws:iam::1:role/Admin",
        )
    }

    #[tokio::test]
    #[serial]
    async fn test_save_writes_profile_section() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("credentials");
        unsafe { env::set_var("AWS_SHARED_CREDENTIALS_FILE", &path) };

        save_shared_credentials("default", &creds()).await.unwrap();

        let ini = Ini::load_from_file(&path).unwrap();
        let section = ini.section(Some("default")).unwrap();
        assert_eq!(section.get("aws_access_key_id"), Some("AKIATEST"));
        assert_eq!(section.get("aws_secret_access_key"), Some("secret"));
        assert_eq!(section.get("aws_session_token"), Some("token"));
        assert_eq!(
            section.get("aws_session_expiration"),
            Some("2026-08-28T12:00:00+00:00")
        );

        unsafe { env::remove_var("AWS_SHARED_CREDENTIALS_FILE") };
    }

    #[tokio::test]
    #[serial]
    async fn test_save_preserves_other_profiles() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("credentials");
        unsafe { env::set_var("AWS_SHARED_CREDENTIALS_FILE", &path) };

        let mut existing = Ini::new();
        existing
            .with_section(Some("other"))
            .set("aws_access_key_id", "AKIAOTHER");
        existing.write_to_file(&path).unwrap();

        save_shared_credentials("default", &creds()).await.unwrap();

        let ini = Ini::load_from_file(&path).unwrap();
        assert_eq!(
            ini.section(Some("other")).unwrap().get("aws_access_key_id"),
            Some("AKIAOTHER")
        );
        assert!(ini.section(Some("default")).is_some());

        unsafe { env::remove_var("AWS_SHARED_CREDENTIALS_FILE") };
    }

    #[cfg(unix)]
    #[tokio::test]
    #[serial]
    async fn test_save_restricts_file_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("credentials");
        unsafe { env::set_var("AWS_SHARED_CREDENTIALS_FILE", &path) };

        save_shared_credentials("default", &creds()).await.unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);

        unsafe { env::remove_var("AWS_SHARED_CREDENTIALS_FILE") };
    }
}
