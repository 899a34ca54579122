use std::sync::Arc;

use anyhow::Context as _;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;

use crate::content::Content;
use crate::http::HttpFetcher;
use crate::identity::generate_uuid;
use crate::model::{Category, CrawlSession, CrawlerInfo, CrawlerType};

pub mod blogger;
pub mod wordpress;

pub use blogger::BloggerCrawler;
pub use wordpress::WordPressCrawler;

/// Number of items requested per page from every provider.
pub const PAGE_SIZE: usize = 20;

/// Post-processing applied to each fetched content.
#[async_trait]
pub trait ContentNormalizer: Send + Sync {
    async fn normalize(&self, content: &mut Content, crawler: &CrawlerInfo) -> anyhow::Result<()>;
}

#[async_trait]
pub trait Crawler: Send + Sync {
    fn info(&self) -> &CrawlerInfo;

    /// Replaces the resolved provider categories used to map contents.
    fn set_categories(&mut self, categories: Vec<Category>);

    /// Provider categories sorted by title.
    async fn fetch_categories(&self, session: &mut CrawlSession) -> anyhow::Result<Vec<Category>>;

    /// One page of contents, newest-modified first. `url` defaults to the
    /// first page. Any failure yields an empty page; `session.web_url` holds
    /// the next page afterwards, if any.
    async fn fetch_contents(
        &self,
        session: &mut CrawlSession,
        url: Option<&str>,
        normalizer: Option<&dyn ContentNormalizer>,
    ) -> Vec<Content>;

    async fn fetch_content(
        &self,
        url: &str,
        normalizer: Option<&dyn ContentNormalizer>,
    ) -> anyhow::Result<Content>;

    /// Maps one raw provider item.
    async fn get_content(
        &self,
        raw: &Value,
        normalizer: Option<&dyn ContentNormalizer>,
    ) -> anyhow::Result<Content>;
}

pub fn create_crawler(
    info: CrawlerInfo,
    fetcher: Arc<dyn HttpFetcher>,
) -> anyhow::Result<Box<dyn Crawler>> {
    match info.crawler_type {
        CrawlerType::WordPress => Ok(Box::new(WordPressCrawler::new(info, fetcher))),
        CrawlerType::Blogger => Ok(Box::new(BloggerCrawler::new(info, fetcher))),
        other => anyhow::bail!("crawler type is not supported: {other:?}"),
    }
}

/// Runs one crawl session: resolves categories when the configuration has
/// none, then follows pages until `max_pages`, an empty page, or the end of
/// the feed. Continues from `session.web_url` when it is set.
pub async fn crawl_pages(
    crawler: &mut dyn Crawler,
    session: &mut CrawlSession,
    normalizer: Option<&dyn ContentNormalizer>,
) -> anyhow::Result<Vec<Content>> {
    if crawler.info().categories.is_empty() {
        let categories = crawler
            .fetch_categories(session)
            .await
            .context("fetch categories")?;
        tracing::info!(count = categories.len(), "resolved provider categories");
        crawler.set_categories(categories);
    }

    let max_pages = crawler.info().max_pages.max(1);
    let mut url = session.web_url.clone();
    let mut contents = Vec::new();

    for page in 1..=max_pages {
        let items = crawler
            .fetch_contents(session, url.as_deref(), normalizer)
            .await;
        tracing::info!(page, count = items.len(), "fetched page");
        if items.is_empty() {
            break;
        }
        contents.extend(items);

        let Some(next) = session.web_url.clone() else {
            break;
        };
        url = Some(next);
    }

    Ok(contents)
}

/// Runs `normalizer` over a copy of `content`; on failure the raw content is
/// kept and the error logged.
pub(crate) async fn finish_content(
    content: Content,
    crawler: &CrawlerInfo,
    normalizer: Option<&dyn ContentNormalizer>,
) -> Content {
    let Some(normalizer) = normalizer else {
        return content;
    };

    let mut normalized = content.clone();
    match normalizer.normalize(&mut normalized, crawler).await {
        Ok(()) => normalized,
        Err(err) => {
            tracing::warn!(
                source_uri = content.source_uri.as_deref().unwrap_or_default(),
                error = %format!("{err:#}"),
                "normalize content failed; keeping raw content"
            );
            content
        }
    }
}

/// Newest modification first, ties broken by newest publication.
pub(crate) fn sort_contents(contents: &mut [Content]) {
    contents.sort_by(|a, b| {
        b.last_modified
            .cmp(&a.last_modified)
            .then_with(|| b.published_time.cmp(&a.published_time))
    });
}

/// Maps provider category keys onto the crawler's resolved categories. The
/// first recognized key becomes the primary category.
pub(crate) fn assign_categories<I>(content: &mut Content, crawler: &CrawlerInfo, provider_keys: I)
where
    I: IntoIterator<Item = String>,
{
    let mut recognized: Vec<String> = Vec::new();
    for key in provider_keys {
        let id = generate_uuid(&key);
        if crawler.find_category(&id).is_some() && !recognized.contains(&id) {
            recognized.push(id);
        }
    }

    let mut recognized = recognized.into_iter();
    content.category_id = recognized.next();
    content.other_categories = recognized.collect();
}

pub(crate) fn parse_time(raw: Option<&str>) -> Option<DateTime<Utc>> {
    let raw = raw?.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

pub(crate) fn source_name(crawler: &CrawlerInfo) -> String {
    if !crawler.title.trim().is_empty() {
        return crawler.title.trim().to_owned();
    }
    url::Url::parse(crawler.base_url())
        .ok()
        .and_then(|url| url.host_str().map(str::to_owned))
        .unwrap_or_else(|| crawler.base_url().to_owned())
}

pub(crate) async fn fetch_json(fetcher: &dyn HttpFetcher, url: &str) -> anyhow::Result<Value> {
    let body = fetcher.fetch(url).await?;
    serde_json::from_str(&body).with_context(|| format!("parse json: {url}"))
}
