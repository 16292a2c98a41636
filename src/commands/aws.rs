use std::process::ExitCode;

use clap::Args;
use tracing::info;

use super::TargetArgs;
use crate::error::Result;
use crate::fetch;
use crate::renew::{AwsCliRunner, RenewalWrapper};

/// Run an AWS CLI command under broker-managed credentials. Credentials come
/// from the cache when live, from a fresh login otherwise, and are renewed
/// transparently when the CLI rejects them as expired.
#[derive(Debug, Clone, Args)]
pub struct AwsCommand {
    #[command(flatten)]
    pub target: TargetArgs,

    #[arg(
        trailing_var_arg = true,
        allow_hyphen_values = true,
        required = true,
        help = "Arguments passed to the aws CLI, e.g. `sabre aws s3 ls`"
    )]
    pub args: Vec<String>,
}

impl AwsCommand {
    pub async fn execute(self, profile: &str) -> Result<ExitCode> {
        let cache_path = super::cache_path()?;
        let resolver = super::build_resolver(profile, &self.target).await?;

        let creds = fetch::fetch_credentials(
            &cache_path,
            self.target.account.as_deref(),
            self.target.role.as_deref(),
            &resolver,
        )
        .await?;

        info!(
            "Delegating to aws CLI as {}/{}",
            creds.account(),
            creds.role()
        );

        let wrapper =
            RenewalWrapper::new(Box::new(AwsCliRunner), Box::new(resolver), cache_path);
        let code = wrapper.run(&self.args, creds).await?;

        Ok(ExitCode::from(u8::try_from(code).unwrap_or(1)))
    }
}
