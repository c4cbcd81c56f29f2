use {anyhow::Result, clap::Subcommand};

use clinic_config::{ClinicConfig, discover_and_load, find_or_default_config_path, save_config};

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration as JSON.
    Show,
    /// Write a default config file if none exists yet.
    Init {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
    /// Print the path of the config file in use.
    Path,
}

pub fn handle_config(action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = redacted(discover_and_load());
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        },
        ConfigAction::Init { force } => init(force),
        ConfigAction::Path => {
            println!("{}", find_or_default_config_path().display());
            Ok(())
        },
    }
}

const REDACTED: &str = "[REDACTED]";

/// Mask secrets before the config is printed.
fn redacted(mut config: ClinicConfig) -> ClinicConfig {
    if config.auth.token.is_some() {
        config.auth.token = Some(REDACTED.into());
    }
    config
}

fn init(force: bool) -> Result<()> {
    let path = find_or_default_config_path();
    if path.exists() && !force {
        anyhow::bail!(
            "config already exists at {} (use --force to overwrite)",
            path.display()
        );
    }
    save_config(&ClinicConfig::default(), &path)?;
    println!("Wrote {}", path.display());
    Ok(())
}
