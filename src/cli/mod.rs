use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

mod commands;

pub use commands::{handle_command, summary_table};

#[derive(Parser, Debug)]
#[command(name = "kingdomscout")]
#[command(version)]
#[command(about = "Scrapes Saudi real-estate listings and scores them as deals", long_about = None)]
pub struct Cli {
    /// Path to configuration file (defaults to kingdomscout.toml)
    #[arg(short, long, env = "KS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Scrape listings, analyze them and update the catalog
    Scrape(ScrapeArgs),
    /// Serve the image API
    Serve {
        /// Address to listen on, overrides the configuration
        #[arg(long)]
        bind: Option<String>,
    },
    /// Image cache maintenance
    Images {
        #[command(subcommand)]
        action: ImageCommand,
    },
    /// Write every stored property as JSON
    Export {
        /// Output directory
        #[arg(long, default_value = "export")]
        out: PathBuf,
    },
    /// List the cities the scraper knows
    Cities,
    /// Manage saved searches
    Searches {
        #[command(subcommand)]
        action: SearchCommand,
    },
}

#[derive(Args, Debug)]
pub struct ScrapeArgs {
    /// City to scrape (Arabic name, English name or slug); repeat for several.
    /// All known cities when omitted.
    #[arg(long = "city")]
    pub cities: Vec<String>,

    /// Max result pages per city
    #[arg(long)]
    pub pages: Option<u32>,

    /// Skip the per-listing details pages
    #[arg(long)]
    pub no_details: bool,

    /// Render pages with headless Chrome
    #[arg(long)]
    pub browser: bool,

    /// Keep running, scraping every --interval hours
    #[arg(long)]
    pub continuous: bool,

    /// Hours between runs in continuous mode
    #[arg(long, default_value_t = 4, requires = "continuous")]
    pub interval: u64,
}

#[derive(Subcommand, Debug)]
pub enum ImageCommand {
    /// Download images for properties that have no local copy
    Batch {
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
    /// Cache a single image URL and print its local URL
    Fetch { url: String },
}

#[derive(Subcommand, Debug)]
pub enum SearchCommand {
    /// Add or replace saved searches from a JSON file (one object or an array)
    Import { file: PathBuf },
    /// Show saved searches
    List,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_scrape_flags() {
        let cli = Cli::try_parse_from([
            "kingdomscout",
            "scrape",
            "--city",
            "الرياض",
            "--city",
            "jeddah",
            "--pages",
            "3",
            "--no-details",
        ])
        .unwrap();
        let Commands::Scrape(args) = cli.command else {
            panic!("expected scrape");
        };
        assert_eq!(args.cities, vec!["الرياض", "jeddah"]);
        assert_eq!(args.pages, Some(3));
        assert!(args.no_details);
        assert!(!args.continuous);
        assert_eq!(args.interval, 4);
    }

    #[test]
    fn interval_requires_continuous() {
        assert!(Cli::try_parse_from(["kingdomscout", "scrape", "--interval", "2"]).is_err());
        assert!(
            Cli::try_parse_from(["kingdomscout", "scrape", "--continuous", "--interval", "2"]).is_ok()
        );
    }

    #[test]
    fn parses_image_commands() {
        let cli = Cli::try_parse_from(["kingdomscout", "images", "batch"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Images {
                action: ImageCommand::Batch { limit: 50 }
            }
        ));
    }
}
