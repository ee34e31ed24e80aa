//! CLI subcommand handlers.

use crate::{Commands, ConfigAction};
use cadence_core::FrameworkConfig;
use std::path::Path;

/// Handle a CLI subcommand.
pub async fn handle_command(command: Commands, config_path: Option<&Path>) -> anyhow::Result<()> {
    match command {
        Commands::Config { action } => handle_config(action, config_path),
        Commands::List => handle_list(config_path),
    }
}

fn handle_config(action: ConfigAction, config_path: Option<&Path>) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init { path } => {
            if path.exists() {
                println!("Configuration file already exists at: {}", path.display());
                return Ok(());
            }
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let toml_str = toml::to_string_pretty(&FrameworkConfig::default())?;
            std::fs::write(&path, &toml_str)?;
            println!("Created default configuration at: {}", path.display());
            Ok(())
        }
        ConfigAction::Show => {
            let config = cadence_core::load_config(config_path)
                .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;
            println!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
        ConfigAction::Validate => {
            let config = cadence_core::load_config(config_path)
                .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;
            let warnings = config.validate();
            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                for warning in &warnings {
                    println!("warning: {}", warning);
                }
            }
            Ok(())
        }
    }
}

fn handle_list(config_path: Option<&Path>) -> anyhow::Result<()> {
    let config = cadence_core::load_config(config_path)
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;
    let stores = crate::demo::DemoStores::seeded();
    let (registry, _) = crate::demo::build_registry(&stores)?;

    for node in registry.list() {
        let def = node.definition();
        let aliases = if def.aliases.is_empty() {
            String::new()
        } else {
            format!(" (aliases: {})", def.aliases.join(", "))
        };
        println!(
            "{}{:<24} {}{}",
            config.prefix,
            node.friendly_name_with_parent(),
            def.description,
            aliases
        );
    }
    Ok(())
}
