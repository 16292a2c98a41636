use anyhow::Context;
use clap::{Args, ValueEnum};

use super::TargetArgs;
use crate::creds::AwsCredentials;
use crate::error::Result;
use crate::fetch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Raw credential object as JSON
    Json,
    /// `export` lines for POSIX shells
    Bash,
    /// `$env:` assignments for PowerShell
    Powershell,
}

/// Print broker-managed credentials to stdout for consumption by other tools
#[derive(Debug, Clone, Args)]
pub struct PrintCommand {
    #[command(flatten)]
    pub target: TargetArgs,

    #[arg(short, long, value_enum, default_value_t = OutputFormat::Json)]
    pub format: OutputFormat,
}

impl PrintCommand {
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

        println!("{}", render(&creds, self.format)?);
        Ok(())
    }
}

fn render(creds: &AwsCredentials, format: OutputFormat) -> Result<String> {
    let keys = creds.keys();
    Ok(match format {
        OutputFormat::Json => {
            serde_json::to_string_pretty(keys).context("Failed to serialize credentials")?
        }
        OutputFormat::Bash => format!(
            "export AWS_ACCESS_KEY_ID='{}'\nexport AWS_SECRET_ACCESS_KEY='{}'\nexport AWS_SESSION_TOKEN='{}'",
            keys.access_key_id, keys.secret_access_key, keys.session_token
        ),
        OutputFormat::Powershell => format!(
            "$env:AWS_ACCESS_KEY_ID = '{}'\n$env:AWS_SECRET_ACCESS_KEY = '{}'\n$env:AWS_SESSION_TOKEN = '{}'",
            keys.access_key_id, keys.secret_access_key, keys.session_token
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::creds::KeySet;

    fn creds() -> AwsCredentials {
        AwsCredentials::new(
            KeySet::new("AKIATEST", "secret", "token", None),
            "Prod",
            "arn:aws:iam::1:role/Admin",
        )
    }

    #[test]
    fn test_json_format_uses_wire_field_names() {
        let out = render(&creds(), OutputFormat::Json).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed["AccessKeyId"], "AKIATEST");
        assert_eq!(parsed["SecretAccessKey"], "secret");
        assert_eq!(parsed["SessionToken"], "token");
        assert!(parsed.get("Expiration").is_none());
    }

    #[test]
    fn test_bash_format() {
        let out = render(&creds(), OutputFormat::Bash).unwrap();
        assert!(out.contains("export AWS_ACCESS_KEY_ID='AKIATEST'"));
        assert!(out.contains("export AWS_SECRET_ACCESS_KEY='secret'"));
        assert!(out.contains("export AWS_SESSION_TOKEN='token'"));
    }

    #[test]
    fn test_powershell_format() {
        let out = render(&creds(), OutputFormat::Powershell).unwrap();
        assert!(out.contains("$env:AWS_ACCESS_KEY_ID = 'AKIATEST'"));
        assert!(out.contains("$env:AWS_SESSION_TOKEN = 'token'"));
    }
}
