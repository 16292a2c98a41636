use anyhow::Context;
use dialoguer::{Input, Password, theme::ColorfulTheme};

use crate::error::Result;

/// Interactive value prompts (username, password, MFA code)
pub trait Prompter {
    fn prompt_username(&self) -> Result<String>;
    fn prompt_password(&self) -> Result<String>;
    fn prompt_mfa_code(&self, factor_name: &str) -> Result<String>;
}

/// Blocking indexed-menu read: ordered candidates in, selected index out.
/// Swappable for a deterministic double in tests.
pub trait Chooser {
    /// Returns the 0-based index of the selected item. A single candidate is
    /// selected without prompting.
    fn choose(&self, title: &str, items: &[String]) -> Result<usize>;
}

/// Console implementation backed by dialoguer
#[derive(Debug, Default)]
pub struct ConsolePrompter;

impl Prompter for ConsolePrompter {
    fn prompt_username(&self) -> Result<String> {
        let username = Input::<String>::with_theme(&ColorfulTheme::default())
            .with_prompt("Okta username")
            .interact_text()
            .context("Failed to read username")?;
        Ok(username)
    }

    fn prompt_password(&self) -> Result<String> {
        let password = Password::with_theme(&ColorfulTheme::default())
            .with_prompt("Okta password")
            .interact()
            .context("Failed to read password")?;
        Ok(password)
    }

    fn prompt_mfa_code(&self, factor_name: &str) -> Result<String> {
        let code = Input::<String>::with_theme(&ColorfulTheme::default())
            .with_prompt(format!("{factor_name} code"))
            .interact_text()
            .context("Failed to read MFA code")?;
        Ok(code)
    }
}

impl Chooser for ConsolePrompter {
    fn choose(&self, title: &str, items: &[String]) -> Result<usize> {
        if items.len() == 1 {
            return Ok(0);
        }

        println!("\n{title}");
        for (i, item) in items.iter().enumerate() {
            println!("{:>2}: {}", i + 1, item);
        }

        let count = items.len();
        // dialoguer re-prompts until the validator accepts, which bounds the
        // input to [1, N]
        let index = Input::<usize>::with_theme(&ColorfulTheme::default())
            .with_prompt("Index")
            .validate_with(move |input: &usize| {
                if (1..=count).contains(input) {
                    Ok(())
                } else {
                    Err(format!("Please enter a value between 1 and {count}"))
                }
            })
            .interact_text()
            .context("Failed to read menu selection")?;

        Ok(index - 1)
    }
}
