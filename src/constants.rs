use std::{env, path::PathBuf};

use dirs;

/// Directory under the user's home holding the credential cache and sessions
pub const SABRE_DIR_NAME: &str = ".sabre";

/// Credential cache document file name
pub const CREDENTIALS_FILE_NAME: &str = "credentials";

/// Cached IdP session file name
pub const SESSIONS_FILE_NAME: &str = "sessions.json";

/// Tool configuration file name (ini)
pub const CONFIG_FILE_NAME: &str = "config";

/// Supported credential cache document version
pub const CREDENTIALS_VERSION: &str = "1.0.0";

/// MFA factor types the interactive login flow can handle
pub const SUPPORTED_FACTORS: [&str; 2] = ["sms", "token:software:totp"];

/// Okta application type for AWS account links
pub const AWS_APP_TYPE: &str = "amazon_aws";

/// SAML attribute carrying the principal/role ARN pairs
pub const AWS_ROLE_ATTRIBUTE: &str = "https://aws.amazon.com/SAML/Attributes/Role";

/// Default requested credential lifetime in seconds
pub const DEFAULT_DURATION_SECONDS: i32 = 3600;

/// STS bounds on the requested credential lifetime
pub const MIN_DURATION_SECONDS: i32 = 900;
pub const MAX_DURATION_SECONDS: i32 = 43200;

/// Default AWS region for STS operations when no region is configured
pub const DEFAULT_AWS_REGION: &str = "us-east-1";

/// Generic failure exit code of the delegated AWS CLI
pub const AWS_CLI_FAILURE_CODE: i32 = 255;

/// AWS configuration directory name
pub const AWS_CONFIG_DIR_NAME: &str = ".aws";

/// Mode for the cache directory (owner plus group, no world access)
pub const SECURE_DIR_MODE: u32 = 0o770;

/// Mode for cache and session files (owner only)
pub const SECURE_FILE_MODE: u32 = 0o600;

fn home_dir() -> Option<PathBuf> {
    dirs::home_dir().or_else(|| {
        env::var("HOME")
            .or_else(|_| env::var("USERPROFILE"))
            .ok()
            .map(PathBuf::from)
    })
}

/// Get the broker state directory path, `~/.sabre`
/// Respects the SABRE_DIR environment variable if set
pub fn sabre_dir() -> Option<PathBuf> {
    if let Ok(path) = env::var("SABRE_DIR") {
        return Some(PathBuf::from(path));
    }

    home_dir().map(|home| home.join(SABRE_DIR_NAME))
}

/// Get the credential cache document path
pub fn credentials_path() -> Option<PathBuf> {
    sabre_dir().map(|dir| dir.join(CREDENTIALS_FILE_NAME))
}

/// Get the cached IdP session file path
pub fn sessions_path() -> Option<PathBuf> {
    sabre_dir().map(|dir| dir.join(SESSIONS_FILE_NAME))
}

/// Get the tool configuration file path
pub fn config_path() -> Option<PathBuf> {
    sabre_dir().map(|dir| dir.join(CONFIG_FILE_NAME))
}

/// Get the AWS shared credentials file path
/// Respects AWS_SHARED_CREDENTIALS_FILE environment variable if set
pub fn aws_credentials_path() -> Option<PathBuf> {
    if let Ok(path) = env::var("AWS_SHARED_CREDENTIALS_FILE") {
        return Some(PathBuf::from(path));
    }

    home_dir().map(|home| home.join(AWS_CONFIG_DIR_NAME).join("credentials"))
}
