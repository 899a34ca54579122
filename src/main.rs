use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser as _;

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    let cli = portal_crawlers::cli::Cli::parse();
    portal_crawlers::logging::init(cli.log_format).context("init logging")?;
    tracing::debug!(?cli, "parsed cli");

    match cli.command {
        portal_crawlers::cli::Command::Categories(args) => {
            portal_crawlers::crawl::categories(args)
                .await
                .context("categories")?;
        }
        portal_crawlers::cli::Command::Contents(args) => {
            portal_crawlers::crawl::contents(args)
                .await
                .context("contents")?;
        }
        portal_crawlers::cli::Command::Content(args) => {
            portal_crawlers::crawl::content(args)
                .await
                .context("content")?;
        }
    }

    Ok(())
}
