use std::path::PathBuf;
use std::rc::Rc;

use anyhow::Context;

use crate::config;
use crate::constants;
use crate::error::Result;
use crate::okta::{OktaClient, SessionCache};
use crate::prompt::ConsolePrompter;
use crate::resolver::{ResolverConfig, RoleResolver};
use crate::sts::StsIssuer;

pub mod aws;
pub mod configure;
pub mod print;
pub mod remove;
pub mod write;

pub use aws::AwsCommand;
pub use configure::ConfigureCommand;
pub use print::PrintCommand;
pub use remove::RemoveCommand;
pub use write::WriteCommand;

/// Account/role/username selectors shared by the credential-fetching commands
#[derive(Debug, Clone, clap::Args)]
pub struct TargetArgs {
    #[arg(short, long, help = "AWS account (application label) to use")]
    pub account: Option<String>,

    #[arg(short, long, help = "IAM role name to assume")]
    pub role: Option<String>,

    #[arg(short, long, help = "Okta username to log in as")]
    pub username: Option<String>,

    #[arg(short, long, help = "Requested credential lifetime in seconds")]
    pub duration: Option<i32>,
}

pub(crate) fn cache_path() -> Result<PathBuf> {
    Ok(constants::credentials_path().context("Failed to determine credential cache path")?)
}

/// Wire up a resolver against the real IdP, STS and console
pub(crate) async fn build_resolver(profile: &str, target: &TargetArgs) -> Result<RoleResolver> {
    let config = config::load(profile).await.with_context(|| {
        format!("Failed to load configuration for profile '{profile}'. Please run 'sabre configure' first.")
    })?;

    let sessions_path =
        constants::sessions_path().context("Failed to determine session cache path")?;
    let console = Rc::new(ConsolePrompter);

    Ok(RoleResolver::new(
        ResolverConfig {
            username: target.username.clone().or(config.username),
            target_account: target.account.clone(),
            target_role: target.role.clone(),
            duration_seconds: target.duration.unwrap_or(config.default_duration_seconds),
            max_attempts: None,
        },
        Box::new(OktaClient::new(&config.okta_base_url)),
        Box::new(StsIssuer),
        console.clone(),
        console,
        SessionCache::new(sessions_path),
    ))
}
