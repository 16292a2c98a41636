use clap::Args;

use crate::config;
use crate::error::Result;

/// Interactively create or update the broker configuration
#[derive(Debug, Clone, Args)]
pub struct ConfigureCommand {}

impl ConfigureCommand {
    pub async fn execute(self, profile: &str) -> Result<()> {
        config::configure_interactive(profile).await
    }
}
