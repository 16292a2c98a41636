use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::Context;
use async_trait::async_trait;
use tracing::info;

use crate::constants::AWS_CLI_FAILURE_CODE;
use crate::creds::AwsCredentials;
use crate::error::Result;
use crate::resolver::RoleResolver;
use crate::store::CredentialStore;

/// Captured outcome of one delegated invocation
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub code: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

/// Runs the delegated command with credentials injected through the
/// environment, capturing both output streams
#[async_trait]
pub trait CommandRunner {
    async fn run(&self, args: &[String], env: &[(String, String)]) -> Result<CommandOutput>;
}

/// Spawns the real `aws` binary via tokio
#[derive(Debug, Default)]
pub struct AwsCliRunner;

#[async_trait]
impl CommandRunner for AwsCliRunner {
    async fn run(&self, args: &[String], env: &[(String, String)]) -> Result<CommandOutput> {
        let output = tokio::process::Command::new("aws")
            .args(args)
            .envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .output()
            .await
            .context("Failed to invoke the aws CLI")?;

        Ok(CommandOutput {
            // terminated-by-signal has no code; treat it as a plain failure
            code: output.status.code().unwrap_or(1),
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}

/// Source of replacement credentials once the active set stops working
#[async_trait(?Send)]
pub trait CredentialRenewer {
    async fn renew(&self) -> Result<AwsCredentials>;
}

#[async_trait(?Send)]
impl CredentialRenewer for RoleResolver {
    async fn renew(&self) -> Result<AwsCredentials> {
        self.resolve().await
    }
}

/// Re-runs a delegated AWS CLI command across credential expiry: an
/// invocation that fails with the CLI's expiry signature triggers a renewal
/// and a transparent re-run. Any other outcome, success or failure, is final
/// and its streams are replayed verbatim.
pub struct RenewalWrapper {
    runner: Box<dyn CommandRunner>,
    renewer: Box<dyn CredentialRenewer>,
    cache_path: PathBuf,
}

impl RenewalWrapper {
    pub fn new(
        runner: Box<dyn CommandRunner>,
        renewer: Box<dyn CredentialRenewer>,
        cache_path: PathBuf,
    ) -> Self {
        Self {
            runner,
            renewer,
            cache_path,
        }
    }

    /// Run to completion and return the delegated command's exit code
    pub async fn run(&self, args: &[String], initial: AwsCredentials) -> Result<i32> {
        let mut creds = initial;
        loop {
            let output = self.runner.run(args, &credential_env(&creds)).await?;

            if requires_renewal(&output) {
                eprintln!("AWS credentials have expired. Renewing them...");
                creds = self.renewer.renew().await?;
                self.persist(&creds)?;
                info!("Credentials renewed for {}/{}", creds.account(), creds.role());
                continue;
            }

            replay(&output, &mut io::stderr(), &mut io::stdout())?;
            return Ok(output.code);
        }
    }

    fn persist(&self, creds: &AwsCredentials) -> Result<()> {
        let mut store = CredentialStore::load(&self.cache_path)?;
        store.put_credentials(creds)?;
        store.write(&self.cache_path)
    }
}

fn credential_env(creds: &AwsCredentials) -> Vec<(String, String)> {
    let keys = creds.keys();
    vec![
        ("AWS_ACCESS_KEY_ID".to_string(), keys.access_key_id.clone()),
        (
            "AWS_SECRET_ACCESS_KEY".to_string(),
            keys.secret_access_key.clone(),
        ),
        ("AWS_SESSION_TOKEN".to_string(), keys.session_token.clone()),
    ]
}

/// The AWS CLI reports expired or otherwise unusable credentials with exit
/// code 255 and a stderr message naming the problem
fn requires_renewal(output: &CommandOutput) -> bool {
    if output.code != AWS_CLI_FAILURE_CODE {
        return false;
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    stderr.contains("ExpiredToken") || stderr.contains("credentials")
}

/// Replay the captured streams, stderr first. Streams that carry nothing but
/// whitespace are suppressed entirely.
fn replay(output: &CommandOutput, stderr: &mut impl Write, stdout: &mut impl Write) -> Result<()> {
    if !String::from_utf8_lossy(&output.stderr).trim().is_empty() {
        stderr.write_all(&output.stderr)?;
    }
    if !String::from_utf8_lossy(&output.stdout).trim().is_empty() {
        stdout.write_all(&output.stdout)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::creds::KeySet;
    use std::sync::Mutex;
    use tempfile::TempDir;

    fn creds(access_key: &str) -> AwsCredentials {
        AwsCredentials::new(
            KeySet::new(access_key, "secret", "token", None),
            "Prod",
            "arn:aws:iam::1:role/Admin",
        )
    }

    fn expired_output() -> CommandOutput {
        CommandOutput {
            code: AWS_CLI_FAILURE_CODE,
            stdout: vec![],
            stderr: b"An error occurred (ExpiredToken) when calling the ListBuckets operation"
                .to_vec(),
        }
    }

    fn success_output() -> CommandOutput {
        CommandOutput {
            code: 0,
            stdout: b"bucket-list\n".to_vec(),
            stderr: vec![],
        }
    }

    struct FakeRunner {
        script: Mutex<Vec<CommandOutput>>,
        seen_env: Mutex<Vec<Vec<(String, String)>>>,
    }

    impl FakeRunner {
        fn new(script: Vec<CommandOutput>) -> Self {
            Self {
                script: Mutex::new(script),
                seen_env: Mutex::new(vec![]),
            }
        }
    }

    #[async_trait]
    impl CommandRunner for FakeRunner {
        async fn run(&self, _args: &[String], env: &[(String, String)]) -> Result<CommandOutput> {
            self.seen_env.lock().unwrap().push(env.to_vec());
            Ok(self.script.lock().unwrap().remove(0))
        }
    }

    struct FakeRenewer {
        calls: Mutex<u32>,
    }

    impl FakeRenewer {
        fn new() -> Self {
            Self {
                calls: Mutex::new(0),
            }
        }
    }

    #[async_trait(?Send)]
    impl CredentialRenewer for FakeRenewer {
        async fn renew(&self) -> Result<AwsCredentials> {
            *self.calls.lock().unwrap() += 1;
            Ok(creds("AKIA-RENEWED"))
        }
    }

    fn wrapper(runner: FakeRunner, dir: &TempDir) -> (RenewalWrapper, std::rc::Rc<FakeRenewer>) {
        let renewer = std::rc::Rc::new(FakeRenewer::new());

        struct RenewerRef(std::rc::Rc<FakeRenewer>);
        #[async_trait(?Send)]
        impl CredentialRenewer for RenewerRef {
            async fn renew(&self) -> Result<AwsCredentials> {
                self.0.renew().await
            }
        }

        let wrapper = RenewalWrapper::new(
            Box::new(runner),
            Box::new(RenewerRef(std::rc::Rc::clone(&renewer))),
            dir.path().join("credentials"),
        );
        (wrapper, renewer)
    }

    #[test]
    fn test_replay_writes_stderr_then_stdout() {
        let output = CommandOutput {
            code: 0,
            stdout: b"result\n".to_vec(),
            stderr: b"warning: slow\n".to_vec(),
        };
        let mut stderr = Vec::new();
        let mut stdout = Vec::new();

        replay(&output, &mut stderr, &mut stdout).unwrap();

        assert_eq!(stderr, b"warning: slow\n");
        assert_eq!(stdout, b"result\n");
    }

    #[test]
    fn test_replay_suppresses_whitespace_only_streams() {
        let output = CommandOutput {
            code: 0,
            stdout: b"  \n\t\n".to_vec(),
            stderr: b"   \n".to_vec(),
        };
        let mut stderr = Vec::new();
        let mut stdout = Vec::new();

        replay(&output, &mut stderr, &mut stdout).unwrap();

        assert!(stderr.is_empty());
        assert!(stdout.is_empty());
    }

    #[test]
    fn test_replay_keeps_content_with_surrounding_whitespace() {
        let output = CommandOutput {
            code: 1,
            stdout: vec![],
            stderr: b"\n  error: denied  \n".to_vec(),
        };
        let mut stderr = Vec::new();
        let mut stdout = Vec::new();

        replay(&output, &mut stderr, &mut stdout).unwrap();

        // content is replayed verbatim once the stream qualifies
        assert_eq!(stderr, b"\n  error: denied  \n");
        assert!(stdout.is_empty());
    }

    #[tokio::test]
    async fn test_success_passes_through_without_renewal() {
        let dir = TempDir::new().unwrap();
        let (wrapper, renewer) = wrapper(FakeRunner::new(vec![success_output()]), &dir);

        let code = wrapper
            .run(&["s3".to_string(), "ls".to_string()], creds("AKIA-ORIG"))
            .await
            .unwrap();

        assert_eq!(code, 0);
        assert_eq!(*renewer.calls.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_expiry_renews_once_then_reruns() {
        let dir = TempDir::new().unwrap();
        let runner = FakeRunner::new(vec![expired_output(), success_output()]);
        let (wrapper, renewer) = wrapper(runner, &dir);

        let code = wrapper
            .run(&["s3".to_string(), "ls".to_string()], creds("AKIA-ORIG"))
            .await
            .unwrap();

        assert_eq!(code, 0);
        assert_eq!(*renewer.calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_rerun_uses_renewed_keys() {
        let dir = TempDir::new().unwrap();
        let runner = FakeRunner::new(vec![expired_output(), success_output()]);
        let (wrapper, _renewer) = wrapper(runner, &dir);

        let cache_path = dir.path().join("credentials");
        wrapper
            .run(&["sts".to_string()], creds("AKIA-ORIG"))
            .await
            .unwrap();

        let store = CredentialStore::load(&cache_path).unwrap();
        let renewed = store
            .get_credentials(Some("Prod"), Some("Admin"))
            .unwrap()
            .unwrap();
        assert_eq!(renewed.keys().access_key_id, "AKIA-RENEWED");
    }

    #[tokio::test]
    async fn test_unrelated_failure_is_final() {
        let dir = TempDir::new().unwrap();
        let output = CommandOutput {
            code: 254,
            stdout: vec![],
            stderr: b"ExpiredToken".to_vec(),
        };
        let (wrapper, renewer) = wrapper(FakeRunner::new(vec![output]), &dir);

        let code = wrapper
            .run(&["s3".to_string()], creds("AKIA-ORIG"))
            .await
            .unwrap();

        assert_eq!(code, 254);
        assert_eq!(*renewer.calls.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_255_without_credential_message_is_final() {
        let dir = TempDir::new().unwrap();
        let output = CommandOutput {
            code: AWS_CLI_FAILURE_CODE,
            stdout: vec![],
            stderr: b"An error occurred (AccessDenied): not authorized".to_vec(),
        };
        let (wrapper, renewer) = wrapper(FakeRunner::new(vec![output]), &dir);

        let code = wrapper
            .run(&["s3".to_string()], creds("AKIA-ORIG"))
            .await
            .unwrap();

        assert_eq!(code, AWS_CLI_FAILURE_CODE);
        assert_eq!(*renewer.calls.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_env_injection_per_invocation() {
        let dir = TempDir::new().unwrap();
        let runner = std::sync::Arc::new(FakeRunner::new(vec![expired_output(), success_output()]));

        struct RunnerRef(std::sync::Arc<FakeRunner>);
        #[async_trait]
        impl CommandRunner for RunnerRef {
            async fn run(
                &self,
                args: &[String],
                env: &[(String, String)],
            ) -> Result<CommandOutput> {
                self.0.run(args, env).await
            }
        }

        let renewer = FakeRenewer::new();
        let wrapper = RenewalWrapper::new(
            Box::new(RunnerRef(std::sync::Arc::clone(&runner))),
            Box::new(renewer),
            dir.path().join("credentials"),
        );

        wrapper
            .run(&["s3".to_string()], creds("AKIA-ORIG"))
            .await
            .unwrap();

        let seen = runner.seen_env.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(
            seen[0][0],
            ("AWS_ACCESS_KEY_ID".to_string(), "AKIA-ORIG".to_string())
        );
        assert_eq!(
            seen[1][0],
            ("AWS_ACCESS_KEY_ID".to_string(), "AKIA-RENEWED".to_string())
        );
    }
}
