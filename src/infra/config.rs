use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::cli::{AppContext, InitArgs};

#[derive(Debug, Serialize, Deserialize)]
pub struct Config {
    /// Default workspace root; `~` and env vars are expanded. Falls back to
    /// the current directory when unset.
    pub workspace_root: Option<String>,

    /// Apply defaults
    pub apply: ApplyConfig,

    /// Preview defaults
    pub preview: PreviewConfig,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApplyConfig {
    /// Back up existing files into a session before overwriting.
    pub backup: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PreviewConfig {
    /// Total column budget for side-by-side output.
    pub width: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workspace_root: None,
            apply: ApplyConfig { backup: true },
            preview: PreviewConfig { width: 120 },
        }
    }
}

pub fn load_config() -> Result<Config> {
    let mut builder = config::Config::builder();

    // Load from config files in priority order
    let config_paths = ["stagehand.toml", ".stagehand.toml"];
    for path in &config_paths {
        if Path::new(path).exists() {
            builder = builder.add_source(config::File::with_name(path));
            break;
        }
    }

    // Add environment variables with STAGEHAND_ prefix
    builder = builder.add_source(config::Environment::with_prefix("STAGEHAND").separator("_"));

    let cfg = builder.build().context("Failed to load configuration")?;
    let parsed: Config = cfg
        .try_deserialize()
        .context("Failed to parse configuration")?;

    Ok(parsed)
}

/// Resolve the workspace root: explicit flag first, then config, then the
/// current directory. User paths are tilde/env expanded.
pub fn resolve_workspace_root(explicit: Option<&Path>, config: &Config) -> Result<PathBuf> {
    if let Some(root) = explicit {
        let expanded = shellexpand::tilde(&root.to_string_lossy()).into_owned();
        return Ok(PathBuf::from(expanded));
    }
    if let Some(root) = &config.workspace_root {
        let expanded = shellexpand::full(root).context("expand configured workspace_root")?;
        return Ok(PathBuf::from(expanded.into_owned()));
    }
    std::env::current_dir().context("resolve current directory")
}

pub fn init(args: InitArgs, ctx: &AppContext) -> Result<()> {
    let config_path = args.path.join("stagehand.toml");

    if config_path.exists() && !args.force {
        anyhow::bail!(
            "Config file already exists at {}. Use --force to overwrite.",
            config_path.display()
        );
    }

    let config = Config::default();
    let toml_string =
        toml::to_string_pretty(&config).context("Failed to serialize default config")?;

    std::fs::write(&config_path, toml_string).context("Failed to write config file")?;

    if !ctx.quiet {
        println!("Created config file at {}", config_path.display());
    }
    Ok(())
}
