use thiserror::Error;

/// Broker error taxonomy. The resolver's retry loop recovers from
/// `Authentication` and `Transport`; everything else is fatal.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed credential cache document. Carries every violated field,
    /// not just the first.
    #[error("invalid credential cache document:\n{}", format_violations(.0))]
    SchemaValidation(Vec<String>),

    /// Exactly one of account/role was supplied where both or neither is
    /// required.
    #[error("account and role must be given together or not at all")]
    ContractViolation,

    /// The identity provider rejected the credentials or the MFA response.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Network failure talking to the identity provider.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// MFA is required but none of the offered factors has a handler.
    #[error("MFA required, but no supported factor available. Supported: {supported:?}, offered: {offered:?}")]
    UnsupportedFactor {
        supported: Vec<String>,
        offered: Vec<String>,
    },

    /// Nothing to select from (no AWS applications, no roles in the
    /// assertion). Retrying the login cannot change the outcome.
    #[error("{0}")]
    Selection(String),

    /// The credential issuance service refused the exchange. Never retried.
    #[error("credential issuance failed: {0}")]
    Issuance(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Whether the resolver's interactive loop may retry after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::Authentication(_) | Error::Transport(_))
    }
}

fn format_violations(violations: &[String]) -> String {
    violations
        .iter()
        .map(|v| format!("   - {v}"))
        .collect::<Vec<_>>()
        .join("\n")
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
