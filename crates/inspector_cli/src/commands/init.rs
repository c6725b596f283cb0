use anyhow::Result;
use camino::Utf8PathBuf;
use clap::Parser;
use inspector_config::Config;
use tracing::info;

#[derive(Debug, Clone, Parser)]
pub(crate) struct InitCmd {
    /// Overwrite an existing config file
    #[arg(long)]
    pub(crate) force: bool,
}

impl InitCmd {
    pub(crate) fn handle(&self, path: &Utf8PathBuf) -> Result<Config> {
        if path.exists() && !self.force {
            anyhow::bail!("Config already exists at {path}, use --force to overwrite it");
        }

        let cfg = Config::default().with_path(path);
        cfg.save()?;
        info!("Wrote default config to {path}");

        Ok(cfg)
    }
}
