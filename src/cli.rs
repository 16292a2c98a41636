use std::process::ExitCode;

use clap::{ArgAction, Parser, Subcommand};

use crate::commands::{AwsCommand, ConfigureCommand, PrintCommand, RemoveCommand, WriteCommand};
use crate::error::Result;

#[derive(Debug, Clone, Parser)]
#[command(
    name = "sabre",
    version,
    about = "AWS credential broker for Okta SAML federation",
    long_about = None
)]
pub struct Cli {
    #[arg(
        short = 'p',
        long,
        global = true,
        default_value = "default",
        help = "Configuration profile name"
    )]
    pub profile: String,

    #[arg(short = 'v', long, global = true, action = ArgAction::Count, help = "Increase verbosity (-v info, -vv debug, -vvv trace)")]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    #[command(about = "Run an aws CLI command with brokered credentials, renewing on expiry")]
    Aws(AwsCommand),
    #[command(about = "Write brokered credentials to the AWS shared credentials file")]
    Write(WriteCommand),
    #[command(about = "Print brokered credentials to stdout")]
    Print(PrintCommand),
    #[command(about = "Remove cached credentials")]
    Remove(RemoveCommand),
    #[command(about = "Configure the Okta organization and defaults")]
    Configure(ConfigureCommand),
}

impl Cli {
    pub async fn execute(self) -> Result<ExitCode> {
        let profile = self.profile;

        match self.command {
            Commands::Aws(cmd) => cmd.execute(&profile).await,
            Commands::Write(cmd) => {
                cmd.execute(&profile).await?;
                Ok(ExitCode::SUCCESS)
            }
            Commands::Print(cmd) => {
                cmd.execute(&profile).await?;
                Ok(ExitCode::SUCCESS)
            }
            Commands::Remove(cmd) => {
                cmd.execute().await?;
                Ok(ExitCode::SUCCESS)
            }
            Commands::Configure(cmd) => {
                cmd.execute(&profile).await?;
                Ok(ExitCode::SUCCESS)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::print::OutputFormat;

    #[test]
    fn test_profile_default_value() {
        let cli = Cli::try_parse_from(["sabre", "print"]).unwrap();
        assert_eq!(cli.profile, "default");
    }

    #[test]
    fn test_profile_custom_value() {
        let cli = Cli::try_parse_from(["sabre", "--profile", "production", "print"]).unwrap();
        assert_eq!(cli.profile, "production");
    }

    #[test]
    fn test_aws_command_collects_trailing_args() {
        let cli = Cli::try_parse_from(["sabre", "aws", "s3", "ls", "--recursive"]).unwrap();
        match cli.command {
            Commands::Aws(cmd) => {
                assert_eq!(cmd.args, vec!["s3", "ls", "--recursive"]);
                assert_eq!(cmd.target.account, None);
            }
            _ => panic!("Expected Aws command"),
        }
    }

    #[test]
    fn test_aws_command_requires_delegated_args() {
        assert!(Cli::try_parse_from(["sabre", "aws"]).is_err());
    }

    #[test]
    fn test_aws_command_with_targets() {
        let cli = Cli::try_parse_from([
            "sabre", "aws", "--account", "Prod", "--role", "Admin", "sts", "get-caller-identity",
        ])
        .unwrap();
        match cli.command {
            Commands::Aws(cmd) => {
                assert_eq!(cmd.target.account.as_deref(), Some("Prod"));
                assert_eq!(cmd.target.role.as_deref(), Some("Admin"));
                assert_eq!(cmd.args, vec!["sts", "get-caller-identity"]);
            }
            _ => panic!("Expected Aws command"),
        }
    }

    #[test]
    fn test_print_format_defaults_to_json() {
        let cli = Cli::try_parse_from(["sabre", "print"]).unwrap();
        match cli.command {
            Commands::Print(cmd) => assert_eq!(cmd.format, OutputFormat::Json),
            _ => panic!("Expected Print command"),
        }
    }

    #[test]
    fn test_print_format_bash() {
        let cli = Cli::try_parse_from(["sabre", "print", "--format", "bash"]).unwrap();
        match cli.command {
            Commands::Print(cmd) => assert_eq!(cmd.format, OutputFormat::Bash),
            _ => panic!("Expected Print command"),
        }
    }

    #[test]
    fn test_verbose_flag_counts() {
        let cli = Cli::try_parse_from(["sabre", "-vv", "print"]).unwrap();
        assert_eq!(cli.verbose, 2);
    }
}
