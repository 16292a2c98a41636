use std::path::Path;

use tracing::debug;

use crate::creds::AwsCredentials;
use crate::error::Result;
use crate::renew::CredentialRenewer;
use crate::store::CredentialStore;

/// Cache-first credential fetch: a live cached entry for the requested
/// account/role pair (or the recorded default when neither is given) is
/// served as-is; anything else runs a full login and persists the result.
pub async fn fetch_credentials(
    cache_path: &Path,
    account: Option<&str>,
    role: Option<&str>,
    renewer: &dyn CredentialRenewer,
) -> Result<AwsCredentials> {
    let mut store = CredentialStore::load(cache_path)?;

    if let Some(creds) = store.get_credentials(account, role)? {
        debug!(
            "Serving cached credentials for {}/{}",
            creds.account(),
            creds.role()
        );
        return Ok(creds);
    }

    let creds = renewer.renew().await?;
    store.put_credentials(&creds)?;
    store.write(cache_path)?;
    Ok(creds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::creds::{Expiration, KeySet};
    use async_trait::async_trait;
    use chrono::{Duration, Utc};
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct CountingRenewer {
        calls: Mutex<u32>,
    }

    impl CountingRenewer {
        fn new() -> Self {
            Self {
                calls: Mutex::new(0),
            }
        }
    }

    #[async_trait(?Send)]
    impl CredentialRenewer for CountingRenewer {
        async fn renew(&self) -> Result<AwsCredentials> {
            *self.calls.lock().unwrap() += 1;
            Ok(AwsCredentials::new(
                KeySet::new("AKIA-FRESH", "secret", "token", None),
                "Prod",
                "arn:aws:iam::1:role/Admin",
            ))
        }
    }

    fn seed(path: &Path, expiration: Option<Expiration>) {
        let mut store = CredentialStore::load(path).unwrap();
        store
            .put_credentials(&AwsCredentials::new(
                KeySet::new("AKIA-CACHED", "secret", "token", expiration),
                "Prod",
                "arn:aws:iam::1:role/Admin",
            ))
            .unwrap();
        store.write(path).unwrap();
    }

    #[tokio::test]
    async fn test_live_cached_entry_is_served() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("credentials");
        seed(
            &path,
            Some(Expiration::Instant(Utc::now() + Duration::hours(1))),
        );
        let renewer = CountingRenewer::new();

        let creds = fetch_credentials(&path, Some("Prod"), Some("Admin"), &renewer)
            .await
            .unwrap();

        assert_eq!(creds.keys().access_key_id, "AKIA-CACHED");
        assert_eq!(*renewer.calls.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_cache_miss_runs_login_and_persists() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("credentials");
        let renewer = CountingRenewer::new();

        let creds = fetch_credentials(&path, Some("Prod"), Some("Admin"), &renewer)
            .await
            .unwrap();

        assert_eq!(creds.keys().access_key_id, "AKIA-FRESH");
        assert_eq!(*renewer.calls.lock().unwrap(), 1);

        // a second fetch is served from the now-populated cache
        let again = fetch_credentials(&path, Some("Prod"), Some("Admin"), &renewer)
            .await
            .unwrap();
        assert_eq!(again.keys().access_key_id, "AKIA-FRESH");
        assert_eq!(*renewer.calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_expired_cached_entry_triggers_login() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("credentials");
        seed(
            &path,
            Some(Expiration::Instant(Utc::now() - Duration::hours(1))),
        );
        let renewer = CountingRenewer::new();

        let creds = fetch_credentials(&path, Some("Prod"), Some("Admin"), &renewer)
            .await
            .unwrap();

        assert_eq!(creds.keys().access_key_id, "AKIA-FRESH");
        assert_eq!(*renewer.calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_default_reference_resolves_without_names() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("credentials");
        seed(
            &path,
            Some(Expiration::Instant(Utc::now() + Duration::hours(1))),
        );
        let renewer = CountingRenewer::new();

        let creds = fetch_credentials(&path, None, None, &renewer).await.unwrap();

        assert_eq!(creds.account(), "Prod");
        assert_eq!(creds.role(), "Admin");
        assert_eq!(*renewer.calls.lock().unwrap(), 0);
    }
}
