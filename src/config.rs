use crate::constants::{self, DEFAULT_DURATION_SECONDS, MAX_DURATION_SECONDS, MIN_DURATION_SECONDS};
use crate::error::Result;
use anyhow::Context;
use dialoguer::{Input, theme::ColorfulTheme};
use ini::{Ini, Properties};
use tokio::fs;

/// Settings read from the ini config file (`~/.sabre/config`)
#[derive(Debug, Clone)]
pub struct Config {
    /// Okta organization URL, e.g. `https://acme.okta.com`
    pub okta_base_url: String,
    /// Username to log in as; prompted for when empty
    pub username: Option<String>,
    pub default_duration_seconds: i32,
}

impl Config {
    fn from_ini_section(section: &Properties) -> Self {
        Self {
            okta_base_url: section.get("okta_base_url").unwrap_or("").to_string(),
            username: section
                .get("username")
                .filter(|s| !s.is_empty())
                .map(ToString::to_string),
            default_duration_seconds: section
                .get("default_duration_seconds")
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_DURATION_SECONDS),
        }
    }

    fn save_to_ini(&self, ini: &mut Ini, profile: &str) {
        ini.with_section(Some(section_name(profile)))
            .set("okta_base_url", &self.okta_base_url)
            .set("username", self.username.as_deref().unwrap_or(""))
            .set(
                "default_duration_seconds",
                self.default_duration_seconds.to_string(),
            );
    }
}

fn section_name(profile: &str) -> String {
    if profile == "default" {
        profile.to_string()
    } else {
        format!("profile {profile}")
    }
}

pub async fn load(profile: &str) -> Result<Config> {
    let path = constants::config_path().context("Failed to determine config file path")?;
    let ini = Ini::load_from_file(&path)
        .context("Failed to load config file. Please run `sabre configure` first")?;

    let section = ini
        .section(Some(section_name(profile)))
        .with_context(|| format!("Profile '{profile}' not found in config"))?;

    Ok(Config::from_ini_section(section))
}

pub async fn save(profile: &str, config: &Config) -> Result<()> {
    let path = constants::config_path().context("Failed to determine config file path")?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let mut ini = if path.exists() {
        Ini::load_from_file(&path).unwrap_or_else(|_| Ini::new())
    } else {
        Ini::new()
    };

    config.save_to_ini(&mut ini, profile);

    ini.write_to_file(&path)
        .with_context(|| format!("Failed to write config to {}", path.display()))?;

    Ok(())
}

pub async fn configure_interactive(profile: &str) -> Result<()> {
    println!("Configuring sabre for profile: {profile}");

    let existing_config = load(profile).await.ok();

    if existing_config.is_some() {
        println!("Press Enter to keep current values, or type new values.");
    }
    println!();

    let theme = ColorfulTheme::default();

    let default_config = existing_config.unwrap_or(Config {
        okta_base_url: String::new(),
        username: None,
        default_duration_seconds: DEFAULT_DURATION_SECONDS,
    });

    let okta_base_url = Input::<String>::with_theme(&theme)
        .with_prompt("Okta organization URL")
        .default(default_config.okta_base_url.clone())
        .allow_empty(!default_config.okta_base_url.is_empty())
        .validate_with(|input: &String| {
            if input.is_empty() {
                Err("Okta organization URL is required")
            } else if !input.starts_with("https://") {
                Err("Okta organization URL must start with https://")
            } else {
                Ok(())
            }
        })
        .interact_text()
        .context("Failed to read Okta organization URL")?;

    let username = Input::<String>::with_theme(&theme)
        .with_prompt("Okta username (optional)")
        .default(default_config.username.unwrap_or_default())
        .allow_empty(true)
        .interact_text()
        .context("Failed to read username")?;

    let default_duration_seconds = Input::<i32>::with_theme(&theme)
        .with_prompt("Default session duration seconds (900-43200)")
        .default(default_config.default_duration_seconds)
        .validate_with(|input: &i32| {
            if (MIN_DURATION_SECONDS..=MAX_DURATION_SECONDS).contains(input) {
                Ok(())
            } else {
                Err("Please enter a value between 900 and 43200")
            }
        })
        .interact_text()
        .context("Failed to read session duration")?;

    let config = Config {
        okta_base_url,
        username: Some(username).filter(|s| !s.is_empty()),
        default_duration_seconds,
    };

    save(profile, &config).await?;

    println!("\nConfiguration saved successfully.");
    Ok(())
}
