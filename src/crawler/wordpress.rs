//! WordPress REST API (`/wp-json/wp/v2`) crawler.

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

pub struct WordPressCrawler {
    info: CrawlerInfo,
    fetcher: Arc<dyn HttpFetcher>,
}

impl WordPressCrawler {
    pub fn new(info: CrawlerInfo, fetcher: Arc<dyn HttpFetcher>) -> Self {
        Self { info, fetcher }
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/wp-json/wp/v2/{path}", self.info.base_url())
    }

    pub fn page_url(&self, page: usize) -> String {
        self.api_url(&format!("posts?per_page={PAGE_SIZE}&page={page}"))
    }

    async fn try_fetch_contents(
        &self,
        url: &str,
        normalizer: Option<&dyn ContentNormalizer>,
    ) -> anyhow::Result<Vec<Content>> {
        let page = fetch_json(self.fetcher.as_ref(), url).await?;
        let items = page
            .as_array()
            .ok_or_else(|| anyhow::anyhow!("posts response is not an array: {url}"))?;

        let mut contents = Vec::with_capacity(items.len());
        for item in items {
            contents.push(self.get_content(item, normalizer).await?);
        }
        Ok(contents)
    }

    async fn fetch_tag_names(&self, tag_ids: &[u64]) -> anyhow::Result<Option<String>> {
        if tag_ids.is_empty() {
            return Ok(None);
        }
        let include = tag_ids
            .iter()
            .map(u64::to_string)
            .collect::<Vec<_>>()
            .join(",");
        let url = self.api_url(&format!("tags?include={include}&per_page=100"));
        let tags = fetch_json(self.fetcher.as_ref(), &url).await?;
        let names = tags
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|tag| tag.get("name").and_then(Value::as_str))
                    .map(decode_html)
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        Ok((!names.is_empty()).then(|| names.join(",")))
    }

    async fn fetch_author_name(&self, author_id: u64) -> anyhow::Result<Option<String>> {
        let url = self.api_url(&format!("users/{author_id}"));
        let user = fetch_json(self.fetcher.as_ref(), &url).await?;
        Ok(user.get("name").and_then(Value::as_str).map(decode_html))
    }

    async fn fetch_media_url(&self, media_id: u64) -> anyhow::Result<Option<String>> {
        let url = self.api_url(&format!("media/{media_id}"));
        let media = fetch_json(self.fetcher.as_ref(), &url).await?;
        Ok(media
            .get("source_url")
            .and_then(Value::as_str)
            .map(str::to_owned))
    }
}

#[async_trait]
impl Crawler for WordPressCrawler {
    fn info(&self) -> &CrawlerInfo {
        &self.info
    }

    fn set_categories(&mut self, categories: Vec<Category>) {
        self.info.categories = categories;
    }

    async fn fetch_categories(&self, _session: &mut CrawlSession) -> anyhow::Result<Vec<Category>> {
        let url = self.api_url("categories?per_page=100");
        let raw = fetch_json(self.fetcher.as_ref(), &url)
            .await
            .context("fetch wordpress categories")?;
        let items = raw
            .as_array()
            .ok_or_else(|| anyhow::anyhow!("categories response is not an array: {url}"))?;

        let mut categories = items
            .iter()
            .filter_map(|item| {
                let id = id_text(item.get("id")?)?;
                Some(Category {
                    id: generate_uuid(&id),
                    title: decode_html(item.get("name").and_then(Value::as_str).unwrap_or(&id)),
                    url: item
                        .get("link")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_owned(),
                })
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
        let url = url.map_or_else(|| self.page_url(1), str::to_owned);
        session.web_url = None;

        match self.try_fetch_contents(&url, normalizer).await {
            Ok(mut contents) => {
                if contents.len() >= PAGE_SIZE {
                    session.web_url = next_page_url(&url);
                }
                sort_contents(&mut contents);
                contents
            }
            Err(err) => {
                tracing::warn!(url = %url, error = %format!("{err:#}"), "fetch wordpress contents failed");
                Vec::new()
            }
        }
    }

    async fn fetch_content(
        &self,
        url: &str,
        normalizer: Option<&dyn ContentNormalizer>,
    ) -> anyhow::Result<Content> {
        let item = fetch_json(self.fetcher.as_ref(), url).await?;
        self.get_content(&item, normalizer).await
    }

    async fn get_content(
        &self,
        raw: &Value,
        normalizer: Option<&dyn ContentNormalizer>,
    ) -> anyhow::Result<Content> {
        let id = raw
            .get("id")
            .and_then(id_text)
            .ok_or_else(|| anyhow::anyhow!("wordpress post has no id"))?;
        let rendered = |key: &str| {
            raw.get(key)
                .and_then(|v| v.get("rendered"))
                .and_then(Value::as_str)
                .map(decode_html)
        };
        let text = |key: &str| raw.get(key).and_then(Value::as_str);

        let mut content = Content {
            title: rendered("title"),
            summary: rendered("excerpt"),
            details: rendered("content"),
            source_url: text("link").map(str::to_owned),
            source_uri: Some(self.api_url(&format!("posts/{id}"))),
            published_time: parse_time(text("date_gmt").or_else(|| text("date"))),
            last_modified: parse_time(text("modified_gmt").or_else(|| text("modified"))),
            ..Content::default()
        };

        let category_ids = id_list(raw.get("categories"));
        let tag_ids = id_list(raw.get("tags"));
        assign_categories(
            &mut content,
            &self.info,
            category_ids.iter().chain(&tag_ids).map(u64::to_string),
        );

        content.tags = self
            .fetch_tag_names(&tag_ids)
            .await
            .with_context(|| format!("fetch tags of wordpress post {id}"))?;

        let media_id = raw.get("featured_media").and_then(Value::as_u64).unwrap_or(0);
        if media_id > 0 {
            content.thumbnail_url = self
                .fetch_media_url(media_id)
                .await
                .with_context(|| format!("fetch featured media of wordpress post {id}"))?;
        }
        if content.thumbnail_url.is_none() {
            content.thumbnail_url = content.details.as_deref().and_then(first_image_source);
        }

        if self.info.set_author {
            let author_id = raw.get("author").and_then(Value::as_u64).unwrap_or(0);
            if author_id > 0 {
                content.author = self
                    .fetch_author_name(author_id)
                    .await
                    .with_context(|| format!("fetch author of wordpress post {id}"))?;
            }
        }
        if self.info.set_source {
            content.source = Some(source_name(&self.info));
        }

        Ok(finish_content(content, &self.info, normalizer).await)
    }
}

fn id_text(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_owned()),
        _ => None,
    }
}

fn id_list(value: Option<&Value>) -> Vec<u64> {
    value
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(Value::as_u64).collect())
        .unwrap_or_default()
}

fn next_page_url(url: &str) -> Option<String> {
    let mut parsed = Url::parse(url).ok()?;
    let page = parsed
        .query_pairs()
        .find(|(key, _)| key == "page")
        .and_then(|(_, value)| value.parse::<usize>().ok())
        .unwrap_or(1);
    let pairs = parsed
        .query_pairs()
        .filter(|(key, _)| key != "page")
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect::<Vec<_>>();

    parsed
        .query_pairs_mut()
        .clear()
        .extend_pairs(pairs)
        .append_pair("page", &(page + 1).to_string());
    Some(parsed.to_string())
}
