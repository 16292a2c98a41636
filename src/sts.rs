use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_sts::Client as StsClient;
use aws_smithy_types::date_time::Format;
use tracing::{debug, info};

use crate::constants::DEFAULT_AWS_REGION;
use crate::creds::{Expiration, KeySet};
use crate::error::{Error, Result};

/// Credential-issuance collaborator contract: exchange a SAML assertion for
/// one temporary key-set. Failures here are fatal by design.
#[async_trait]
pub trait CredentialIssuer {
    async fn assume_role(
        &self,
        principal_arn: &str,
        role_arn: &str,
        assertion: &str,
        duration_seconds: i32,
    ) -> Result<KeySet>;
}

/// AWS STS implementation using AssumeRoleWithSAML
#[derive(Debug, Default)]
pub struct StsIssuer;

#[async_trait]
impl CredentialIssuer for StsIssuer {
    async fn assume_role(
        &self,
        principal_arn: &str,
        role_arn: &str,
        assertion: &str,
        duration_seconds: i32,
    ) -> Result<KeySet> {
        info!("Calling AWS STS AssumeRoleWithSAML");
        debug!("Role ARN: {}", role_arn);
        debug!("Principal ARN: {}", principal_arn);
        debug!("Duration: {} seconds", duration_seconds);

        // Region priority: ENV vars -> config file -> DEFAULT_AWS_REGION
        let config = {
            let loaded = aws_config::defaults(BehaviorVersion::latest()).load().await;
            match loaded.region() {
                Some(region) => {
                    debug!("Using region: {}", region);
                    loaded
                }
                None => {
                    debug!("No region configured, using {} for STS", DEFAULT_AWS_REGION);
                    aws_config::defaults(BehaviorVersion::latest())
                        .region(Region::new(DEFAULT_AWS_REGION))
                        .load()
                        .await
                }
            }
        };

        let client = StsClient::new(&config);

        let response = client
            .assume_role_with_saml()
            .role_arn(role_arn)
            .principal_arn(principal_arn)
            .saml_assertion(assertion)
            .duration_seconds(duration_seconds)
            .send()
            .await
            .map_err(|e| Error::Issuance(e.to_string()))?;

        let sts_creds = response
            .credentials()
            .ok_or_else(|| Error::Issuance("AWS STS returned no credentials".to_string()))?;

        let expiration = sts_creds
            .expiration()
            .fmt(Format::DateTime)
            .ok()
            .map(Expiration::Iso);

        info!("Successfully obtained AWS credentials");
        Ok(KeySet::new(
            sts_creds.access_key_id(),
            sts_creds.secret_access_key(),
            sts_creds.session_token(),
            expiration,
        ))
    }
}
