pub mod cli;
pub mod commands;
pub mod config;
pub mod constants;
pub mod creds;
pub mod error;
pub mod fetch;
pub mod okta;
pub mod prompt;
pub mod renew;
pub mod resolver;
pub mod saml;
pub mod store;
pub mod sts;
