use std::io::Write as _;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context as _;
use serde::Serialize;

use crate::adapter::NormalizingAdapter;
use crate::cli::{CategoriesArgs, ContentArgs, ContentsArgs, CrawlerArgs};
use crate::crawler::{BloggerCrawler, ContentNormalizer, Crawler, create_crawler, crawl_pages};
use crate::http::{HttpConfig, ReqwestFetcher};
use crate::model::{CrawlSession, CrawlerInfo, CrawlerType};

pub async fn categories(args: CategoriesArgs) -> anyhow::Result<()> {
    let crawler = build_crawler(&args.crawler, None)?;
    let mut session = CrawlSession::default();
    let categories = crawler.fetch_categories(&mut session).await?;
    tracing::info!(count = categories.len(), "fetched categories");
    write_json_lines(&categories)
}

pub async fn contents(args: ContentsArgs) -> anyhow::Result<()> {
    let mut crawler = build_crawler(&args.crawler, args.pages)?;
    let normalizer = normalizer_for(crawler.info(), args.raw);

    let mut session = CrawlSession {
        web_url: args.url.clone(),
        ..CrawlSession::default()
    };
    let contents = crawl_pages(
        &mut *crawler,
        &mut session,
        normalizer.as_ref().map(|n| n as &dyn ContentNormalizer),
    )
    .await?;

    tracing::info!(
        count = contents.len(),
        next = session.web_url.as_deref().unwrap_or_default(),
        "crawl finished"
    );
    write_json_lines(&contents)
}

pub async fn content(args: ContentArgs) -> anyhow::Result<()> {
    let mut crawler = build_crawler(&args.crawler, None)?;
    if crawler.info().categories.is_empty() {
        let mut session = CrawlSession::default();
        let categories = crawler
            .fetch_categories(&mut session)
            .await
            .context("fetch categories")?;
        crawler.set_categories(categories);
    }
    let normalizer = normalizer_for(crawler.info(), args.raw);

    let content = crawler
        .fetch_content(
            &args.url,
            normalizer.as_ref().map(|n| n as &dyn ContentNormalizer),
        )
        .await
        .with_context(|| format!("fetch content: {}", args.url))?;
    write_json_lines(std::slice::from_ref(&content))
}

fn build_crawler(args: &CrawlerArgs, pages: Option<usize>) -> anyhow::Result<Box<dyn Crawler>> {
    let mut info = CrawlerInfo::load(Path::new(&args.config))?;
    if let Some(pages) = pages {
        info.max_pages = pages;
    }
    tracing::debug!(url = %info.url, crawler_type = ?info.crawler_type, "loaded crawler config");

    let fetcher = Arc::new(
        ReqwestFetcher::new(HttpConfig::from_env().context("load http config")?)
            .context("build http fetcher")?,
    );

    match (&info.crawler_type, &args.blogger_feed_base) {
        (CrawlerType::Blogger, Some(feed_base)) => {
            Ok(Box::new(BloggerCrawler::new(info, fetcher).with_feed_base(feed_base)))
        }
        _ => create_crawler(info, fetcher),
    }
}

fn normalizer_for(info: &CrawlerInfo, raw: bool) -> Option<NormalizingAdapter> {
    (!raw && info.normalize).then(|| NormalizingAdapter::for_crawler(info))
}

fn write_json_lines<T: Serialize>(items: &[T]) -> anyhow::Result<()> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for item in items {
        serde_json::to_writer(&mut out, item).context("serialize json line")?;
        out.write_all(b"\n").context("write newline")?;
    }
    out.flush().context("flush stdout")?;
    Ok(())
}
