use anyhow::Result;
use std::path::PathBuf;

use crate::config::SlotkeeperConfig;

pub struct ConfigCommand {
    pub save: Option<PathBuf>,
}

impl ConfigCommand {
    pub fn new(save: Option<PathBuf>) -> Self {
        Self { save }
    }

    pub fn execute(&self, config: &SlotkeeperConfig) -> Result<()> {
        print!("{}", config.to_toml()?);

        if let Some(path) = &self.save {
            config.save_to_file(path)?;
            eprintln!("💾 Configuration written to {}", path.display());
        }
        Ok(())
    }
}
