use clap::Subcommand;
use lumen_core::LoaderConfig;

pub mod cache;
pub mod load;

#[derive(Subcommand)]
pub enum Commands {
    /// Load images through the dispatcher and report each result
    #[command(visible_alias = "l")]
    Load {
        /// Paths or file:// URLs
        #[arg(required = true)]
        locators: Vec<String>,

        /// Fade in images that were not already in memory
        #[arg(long)]
        fade: bool,

        /// Deliver on worker threads instead of the main event loop
        #[arg(long)]
        plain: bool,

        /// Print cache and dispatcher statistics as JSON afterwards
        #[arg(long)]
        stats: bool,
    },

    /// Remove images from both cache tiers
    Invalidate {
        #[arg(required = true)]
        locators: Vec<String>,
    },

    /// Show durable cache usage and effective configuration
    Stats,

    /// Print the cache key derived for a locator
    Key {
        locator: String,

        /// Also print the canonical form the key is hashed from
        #[arg(short, long)]
        verbose: bool,
    },
}

impl Commands {
    pub async fn execute(self, config: &LoaderConfig) -> eyre::Result<()> {
        match self {
            Commands::Load {
                locators,
                fade,
                plain,
                stats,
            } => {
                let options = load::LoadOptions { fade, plain, stats };
                load::execute(config, locators, options).await
            }
            Commands::Invalidate { locators } => cache::invalidate(config, &locators).await,
            Commands::Stats => cache::stats(config).await,
            Commands::Key { locator, verbose } => {
                cache::key(&locator, verbose);
                Ok(())
            }
        }
    }
}
