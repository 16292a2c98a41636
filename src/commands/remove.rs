use clap::Args;
use tracing::info;

use crate::error::Result;
use crate::store::CredentialStore;

/// Drop a credential set from the cache (the recorded default when no
/// account/role pair is given)
#[derive(Debug, Clone, Args)]
pub struct RemoveCommand {
    #[arg(short, long, help = "AWS account (application label) to remove")]
    pub account: Option<String>,

    #[arg(short, long, help = "IAM role name to remove")]
    pub role: Option<String>,
}

impl RemoveCommand {
    pub async fn execute(self) -> Result<()> {
        let cache_path = super::cache_path()?;
        let mut store = CredentialStore::load(&cache_path)?;

        let removed =
            store.remove_credentials(self.account.as_deref(), self.role.as_deref())?;

        match removed {
            Some(creds) => {
                store.write(&cache_path)?;
                info!("Removed credentials for {}/{}", creds.account(), creds.role());
                println!("Removed credentials for {}/{}.", creds.account(), creds.role());
            }
            None => println!("No matching cached credentials."),
        }
        Ok(())
    }
}
