use clap::Parser;
use lumen_core::{ConfigSource, LoaderConfig, LoaderConfigBuilder};
use std::path::PathBuf;

mod commands;
mod decoder;
mod logging;

use commands::Commands;

#[derive(Parser)]
#[command(name = "lumen")]
#[command(about = "Load, cache and inspect images through the lumen pipeline", long_about = None)]
#[command(version)]
struct Cli {
    /// Durable cache directory
    #[arg(long, global = true, value_name = "DIR")]
    cache_dir: Option<PathBuf>,

    /// Memory tier budget in decoded bytes
    #[arg(long, global = true, value_name = "BYTES")]
    memory_budget: Option<u64>,

    /// Number of loads allowed to run at once
    #[arg(long, global = true)]
    workers: Option<usize>,

    /// JSON configuration file
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    /// Defaults, then the config file, then `LUMEN_*` variables, then flags
    fn loader_config(&self) -> eyre::Result<LoaderConfig> {
        let (base, source) = match &self.config {
            Some(path) => (
                LoaderConfig::from_file(path)?,
                ConfigSource::ConfigFile(path.clone()),
            ),
            None => (LoaderConfig::default(), ConfigSource::Default),
        };

        let mut builder = LoaderConfigBuilder::from_config(base.apply_env()?, source);
        if let Some(dir) = &self.cache_dir {
            builder = builder.with_cache_dir(dir);
        }
        if let Some(budget) = self.memory_budget {
            builder = builder.with_memory_budget(budget);
        }
        if let Some(workers) = self.workers {
            builder = builder.with_workers(workers);
        }

        tracing::debug!(source = ?builder.source(), "Resolved configuration");
        Ok(builder.build()?)
    }
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    logging::init()?;

    let config = cli.loader_config()?;
    cli.command.execute(&config).await
}
