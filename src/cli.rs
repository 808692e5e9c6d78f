//! CLI shell (A2)
//! Mission: parse operator intent into a typed command, in the shape of
//! the donor's `clap::Parser` binaries (`Args::parse()`, then a `match`
//! that builds the runtime and hands off to async logic).

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "buffarb", about = "Cross-market cosmetic item arbitrage scraper")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the scraping pipeline.
    Scrape(ScrapeArgs),
    /// Print the effective configuration and exit.
    TestConfig,
    /// Read accepted items for one item name from the store.
    History(HistoryArgs),
    /// Exit 0 if the store is reachable, 1 otherwise.
    Health,
}

#[derive(Debug, Parser)]
pub struct ScrapeArgs {
    #[arg(long, conflicts_with = "visible")]
    pub headless: bool,
    #[arg(long)]
    pub visible: bool,

    #[arg(long = "concurrent", value_name = "N")]
    pub concurrent: Option<usize>,

    #[arg(long = "save-db", conflicts_with = "no_db")]
    pub save_db: bool,
    #[arg(long = "no-db")]
    pub no_db: bool,

    #[arg(long, value_name = "PATH")]
    pub output: Option<String>,

    #[arg(long, value_name = "K")]
    pub limit: Option<usize>,

    #[arg(long = "exclude", value_name = "PREFIX")]
    pub exclude: Vec<String>,

    #[arg(long)]
    pub quiet: bool,

    #[arg(long = "no-async-storage")]
    pub no_async_storage: bool,
}

impl ScrapeArgs {
    /// `None` when neither flag was given, meaning "use the config file's
    /// `scraper.headless` value".
    pub fn headless_override(&self) -> Option<bool> {
        if self.headless {
            Some(true)
        } else if self.visible {
            Some(false)
        } else {
            None
        }
    }

    pub fn save_db_override(&self) -> Option<bool> {
        if self.save_db {
            Some(true)
        } else if self.no_db {
            Some(false)
        } else {
            None
        }
    }
}

#[derive(Debug, Parser)]
pub struct HistoryArgs {
    #[arg(long = "item", value_name = "NAME")]
    pub item: String,
    #[arg(long, default_value_t = 20)]
    pub limit: usize,
}
