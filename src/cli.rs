use clap::{Args, Parser, Subcommand};

use crate::logging::LogFormat;

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    /// Log output format (written to stderr).
    #[arg(long, value_enum, global = true, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print the provider categories as JSON lines.
    Categories(CategoriesArgs),
    /// Crawl pages of contents and print them as JSON lines.
    Contents(ContentsArgs),
    /// Fetch one content by its canonical URL and print it as JSON.
    Content(ContentArgs),
}

#[derive(Debug, Args)]
pub struct CrawlerArgs {
    /// Crawler configuration file (YAML or JSON).
    #[arg(long)]
    pub config: String,

    /// Feed host for Blogger per-blog feeds.
    #[arg(long)]
    pub blogger_feed_base: Option<String>,
}

#[derive(Debug, Args)]
pub struct CategoriesArgs {
    #[command(flatten)]
    pub crawler: CrawlerArgs,
}

#[derive(Debug, Args)]
pub struct ContentsArgs {
    #[command(flatten)]
    pub crawler: CrawlerArgs,

    /// Page URL to continue from (default: the first page).
    #[arg(long)]
    pub url: Option<String>,

    /// Maximum pages to fetch (default: `max_pages` from the config).
    #[arg(long)]
    pub pages: Option<usize>,

    /// Skip the normalizing adapter.
    #[arg(long, default_value_t = false)]
    pub raw: bool,
}

#[derive(Debug, Args)]
pub struct ContentArgs {
    #[command(flatten)]
    pub crawler: CrawlerArgs,

    /// Canonical fetch URL of the content.
    #[arg(long)]
    pub url: String,

    /// Skip the normalizing adapter.
    #[arg(long, default_value_t = false)]
    pub raw: bool,
}
