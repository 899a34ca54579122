//! Blogger crawler over the public JSON feeds (`alt=json`).

use std::sync::Arc;

use anyhow::Context as _;
use async_trait::async_trait;
use serde_json::Value;
use url::Url;

use super::{
    ContentNormalizer, Crawler, PAGE_SIZE, assign_categories, fetch_json, finish_content,
    parse_time, sort_contents, source_name,
};
use crate::content::Content;
use crate::http::HttpFetcher;
use crate::identity::generate_uuid;
use crate::model::{Category, CrawlSession, CrawlerInfo};
use crate::tags::{decode_html, first_image_source};

pub const DEFAULT_FEED_BASE: &str = "https://www.blogger.com/feeds";

pub struct BloggerCrawler {
    info: CrawlerInfo,
    fetcher: Arc<dyn HttpFetcher>,
    feed_base: String,
}

impl BloggerCrawler {
    pub fn new(info: CrawlerInfo, fetcher: Arc<dyn HttpFetcher>) -> Self {
        Self {
            info,
            fetcher,
            feed_base: DEFAULT_FEED_BASE.to_owned(),
        }
    }

    /// Overrides the feed host used for per-blog feeds.
    pub fn with_feed_base(mut self, feed_base: impl Into<String>) -> Self {
        self.feed_base = feed_base.into().trim_end_matches('/').to_owned();
        self
    }

    fn summary_url(&self) -> String {
        format!(
            "{}/feeds/posts/summary?alt=json&max-results=0",
            self.info.base_url()
        )
    }

    pub fn contents_url(&self, web_id: &str) -> String {
        format!(
            "{}/{web_id}/posts/default?alt=json&max-results={PAGE_SIZE}",
            self.feed_base
        )
    }

    fn label_url(&self, label: &str) -> String {
        let Ok(mut url) = Url::parse(self.info.base_url()) else {
            return format!("{}/search/label/{label}", self.info.base_url());
        };
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend(["search", "label", label]);
        }
        url.to_string()
    }

    async fn ensure_web_id(&self, session: &mut CrawlSession) -> anyhow::Result<String> {
        if let Some(web_id) = session.web_id.clone() {
            return Ok(web_id);
        }
        self.fetch_categories(session)
            .await
            .context("resolve blogger blog id")?;
        session
            .web_id
            .clone()
            .ok_or_else(|| anyhow::anyhow!("blogger feed has no blog id: {}", self.summary_url()))
    }

    async fn try_fetch_contents(
        &self,
        session: &mut CrawlSession,
        url: Option<&str>,
        normalizer: Option<&dyn ContentNormalizer>,
    ) -> anyhow::Result<(Vec<Content>, Option<String>)> {
        let url = match url {
            Some(url) => url.to_owned(),
            None => {
                let web_id = self.ensure_web_id(session).await?;
                self.contents_url(&web_id)
            }
        };

        let raw = fetch_json(self.fetcher.as_ref(), &url).await?;
        let feed = raw
            .get("feed")
            .ok_or_else(|| anyhow::anyhow!("response has no feed: {url}"))?;
        let next = link_href(feed, "next");

        let mut contents = Vec::new();
        for entry in feed
            .get("entry")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default()
        {
            contents.push(self.get_content(entry, normalizer).await?);
        }
        Ok((contents, next))
    }
}

#[async_trait]
impl Crawler for BloggerCrawler {
    fn info(&self) -> &CrawlerInfo {
        &self.info
    }

    fn set_categories(&mut self, categories: Vec<Category>) {
        self.info.categories = categories;
    }

    async fn fetch_categories(&self, session: &mut CrawlSession) -> anyhow::Result<Vec<Category>> {
        let url = self.summary_url();
        let raw = fetch_json(self.fetcher.as_ref(), &url)
            .await
            .context("fetch blogger categories")?;
        let feed = raw
            .get("feed")
            .ok_or_else(|| anyhow::anyhow!("response has no feed: {url}"))?;

        if session.web_id.is_none() {
            session.web_id = text(feed, "id").as_deref().and_then(blog_id);
        }

        let mut categories = labels(feed)
            .into_iter()
            .map(|label| Category {
                id: generate_uuid(&label),
                url: self.label_url(&label),
                title: label,
            })
            .collect::<Vec<_>>();
        categories.sort_by(|a, b| a.title.cmp(&b.title));
        Ok(categories)
    }

    async fn fetch_contents(
        &self,
        session: &mut CrawlSession,
        url: Option<&str>,
        normalizer: Option<&dyn ContentNormalizer>,
    ) -> Vec<Content> {
        session.web_url = None;

        match self.try_fetch_contents(session, url, normalizer).await {
            Ok((mut contents, next)) => {
                session.web_url = next;
                sort_contents(&mut contents);
                contents
            }
            Err(err) => {
                tracing::warn!(
                    url = url.unwrap_or("<default>"),
                    error = %format!("{err:#}"),
                    "fetch blogger contents failed"
                );
                Vec::new()
            }
        }
    }

    async fn fetch_content(
        &self,
        url: &str,
        normalizer: Option<&dyn ContentNormalizer>,
    ) -> anyhow::Result<Content> {
        let raw = fetch_json(self.fetcher.as_ref(), url).await?;
        let entry = raw.get("entry").unwrap_or(&raw);
        self.get_content(entry, normalizer).await
    }

    async fn get_content(
        &self,
        raw: &Value,
        normalizer: Option<&dyn ContentNormalizer>,
    ) -> anyhow::Result<Content> {
        let entry_id = text(raw, "id").ok_or_else(|| anyhow::anyhow!("blogger entry has no id"))?;

        let source_uri = match link_href(raw, "self") {
            Some(href) => with_alt_json(&href),
            None => {
                let (blog, post) = post_ids(&entry_id)
                    .ok_or_else(|| anyhow::anyhow!("unrecognized blogger entry id: {entry_id}"))?;
                format!("{}/{blog}/posts/default/{post}?alt=json", self.feed_base)
            }
        };

        let details = text(raw, "content")
            .or_else(|| text(raw, "summary"))
            .map(|html| decode_html(&html));
        let entry_labels = labels(raw);

        let mut content = Content {
            title: text(raw, "title").map(|title| decode_html(&title)),
            summary: text(raw, "summary").map(|summary| decode_html(&summary)),
            source_url: link_href(raw, "alternate"),
            source_uri: Some(source_uri),
            published_time: parse_time(text(raw, "published").as_deref()),
            last_modified: parse_time(text(raw, "updated").as_deref()),
            tags: (!entry_labels.is_empty()).then(|| entry_labels.join(",")),
            thumbnail_url: raw
                .get("media$thumbnail")
                .and_then(|thumb| thumb.get("url"))
                .and_then(Value::as_str)
                .map(str::to_owned)
                .or_else(|| details.as_deref().and_then(first_image_source)),
            details,
            ..Content::default()
        };

        assign_categories(&mut content, &self.info, entry_labels);

        if self.info.set_author {
            content.author = raw
                .get("author")
                .and_then(Value::as_array)
                .and_then(|authors| authors.first())
                .and_then(|author| text(author, "name"));
        }
        if self.info.set_source {
            content.source = Some(source_name(&self.info));
        }

        Ok(finish_content(content, &self.info, normalizer).await)
    }
}

/// `value[key]["$t"]` as text.
fn text(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)?
        .get("$t")?
        .as_str()
        .map(str::to_owned)
        .filter(|s| !s.trim().is_empty())
}

fn labels(value: &Value) -> Vec<String> {
    value
        .get("category")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.get("term").and_then(Value::as_str))
                .map(|term| term.trim().to_owned())
                .filter(|term| !term.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

fn link_href(value: &Value, rel: &str) -> Option<String> {
    value
        .get("link")?
        .as_array()?
        .iter()
        .find(|link| link.get("rel").and_then(Value::as_str) == Some(rel))
        .and_then(|link| link.get("href"))
        .and_then(Value::as_str)
        .map(str::to_owned)
}

/// Blog ID from a feed ID such as `tag:blogger.com,1999:blog-123`.
fn blog_id(feed_id: &str) -> Option<String> {
    let (_, rest) = feed_id.split_once("blog-")?;
    let id = rest.split('.').next()?.trim();
    (!id.is_empty()).then(|| id.to_owned())
}

/// Blog and post IDs from an entry ID such as
/// `tag:blogger.com,1999:blog-123.post-456`.
fn post_ids(entry_id: &str) -> Option<(String, String)> {
    let blog = blog_id(entry_id)?;
    let (_, post) = entry_id.split_once(".post-")?;
    let post = post.trim();
    (!post.is_empty()).then(|| (blog, post.to_owned()))
}

fn with_alt_json(href: &str) -> String {
    let Ok(mut url) = Url::parse(href) else {
        return href.to_owned();
    };
    if !url.query_pairs().any(|(key, _)| key == "alt") {
        url.query_pairs_mut().append_pair("alt", "json");
    }
    url.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_parsed_from_feed_identifiers() {
        assert_eq!(
            blog_id("tag:blogger.com,1999:blog-123").as_deref(),
            Some("123")
        );
        assert_eq!(
            post_ids("tag:blogger.com,1999:blog-123.post-456"),
            Some(("123".to_owned(), "456".to_owned()))
        );
        assert_eq!(blog_id("tag:example.com,1999:site-1"), None);
        assert_eq!(post_ids("tag:blogger.com,1999:blog-123"), None);
    }

    #[test]
    fn with_alt_json_appends_once() {
        assert_eq!(
            with_alt_json("https://www.blogger.com/feeds/1/posts/default/2"),
            "https://www.blogger.com/feeds/1/posts/default/2?alt=json"
        );
        assert_eq!(
            with_alt_json("https://www.blogger.com/feeds/1/posts/default/2?alt=json"),
            "https://www.blogger.com/feeds/1/posts/default/2?alt=json"
        );
    }

    #[test]
    fn link_href_selects_by_rel() {
        let feed = serde_json::json!({ "link": [
            { "rel": "self", "href": "https://a/self" },
            { "rel": "next", "href": "https://a/next" }
        ] });
        assert_eq!(link_href(&feed, "next").as_deref(), Some("https://a/next"));
        assert_eq!(link_href(&feed, "alternate"), None);
    }
}
