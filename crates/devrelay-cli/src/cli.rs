use anyhow::Result;
use clap::Parser;
use devrelay_core::RelayConfig;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "devrelay")]
#[command(about = "Relay a demo counter store over stdin/stdout JSON lines", long_about = None)]
pub struct Cli {
    /// Relay config file (.toml or .json).
    #[arg(short, long, env = "DEVRELAY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Instance id (random when omitted).
    #[arg(short, long)]
    pub instance_id: Option<String>,

    /// Display name of the instance.
    #[arg(short, long)]
    pub name: Option<String>,

    /// Cap on recorded actions (0 disables capping).
    #[arg(long)]
    pub max_age: Option<usize>,

    /// Start with local dispatches blocked.
    #[arg(long)]
    pub start_locked: bool,
}

impl Cli {
    /// Config file values overridden by command-line flags.
    pub fn relay_config(&self) -> Result<RelayConfig> {
        let mut config = match &self.config {
            Some(path) if path.exists() => RelayConfig::from_file(path)?,
            Some(path) => {
                tracing::warn!("Config file not found, using defaults: {}", path.display());
                RelayConfig::default()
            }
            None => RelayConfig::default(),
        };
        if let Some(id) = &self.instance_id {
            config.instance_id = Some(id.clone());
        }
        if let Some(name) = &self.name {
            config.name = Some(name.clone());
        }
        if let Some(max_age) = self.max_age {
            config.max_age = Some(max_age);
        }
        if self.start_locked {
            config.should_start_locked = true;
        }
        Ok(config)
    }
}
