use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identity::{ansi_uri, generate_uuid, random_uuid};
use crate::model::CrawlerInfo;
use crate::tags::{decode_html, strip_tags};

/// Canonical article record produced by the crawlers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Content {
    pub id: Option<String>,
    pub title: Option<String>,
    pub summary: Option<String>,
    pub details: Option<String>,
    pub author: Option<String>,
    pub source: Option<String>,
    pub source_url: Option<String>,
    /// Comma-joined tag names.
    pub tags: Option<String>,
    pub status: Option<String>,
    pub alias: Option<String>,
    pub category_id: Option<String>,
    pub other_categories: Vec<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub published_time: Option<DateTime<Utc>>,
    pub last_modified: Option<DateTime<Utc>>,
    /// Canonical per-item fetch URL; the identity seed.
    pub source_uri: Option<String>,
    pub thumbnail_url: Option<String>,
    pub system_id: Option<String>,
    pub repository_id: Option<String>,
    pub repository_entity_id: Option<String>,
}

impl Content {
    /// Derives identity, alias and tenant stamps, and optionally remaps the
    /// provider categories onto local ones.
    pub fn normalize(&mut self, crawler: &CrawlerInfo, normalize_categories: bool) {
        if self.id.as_deref().is_none_or(|id| id.trim().is_empty()) {
            self.id = Some(match non_blank(self.source_uri.as_deref()) {
                Some(uri) => generate_uuid(uri),
                None => random_uuid(),
            });
        }

        self.title = self.title.as_deref().map(|title| decode_html(title).trim().to_owned());
        self.summary = self
            .summary
            .as_deref()
            .map(|summary| strip_tags(&decode_html(summary)));

        if non_blank(self.start_date.as_deref()).is_none() {
            let published = self.published_time.unwrap_or_else(Utc::now);
            self.start_date = Some(published.format("%Y/%m/%d").to_string());
        }

        let start_date = self.start_date.as_deref().unwrap_or_default();
        let title = self.title.as_deref().unwrap_or_default();
        self.alias = Some(ansi_uri(&format!("{start_date}-{title}")));

        self.status = Some(crawler.status.clone());
        self.system_id = Some(crawler.system_id.clone());
        self.repository_id = Some(crawler.repository_id.clone());
        self.repository_entity_id = Some(crawler.repository_entity_id.clone());

        if normalize_categories {
            self.category_id = self
                .category_id
                .as_deref()
                .and_then(|id| crawler.map_category(id))
                .or_else(|| crawler.default_category_id.clone());
            self.other_categories = self
                .other_categories
                .iter()
                .filter_map(|id| crawler.map_category(id))
                .collect();
        }
    }

    /// Current value of a field addressed by name (case-insensitive).
    pub fn field(&self, name: &str) -> Option<&str> {
        self.text_field(name)?.as_deref()
    }

    /// The text field addressed by name, `None` when no such field exists.
    pub(crate) fn text_field(&self, name: &str) -> Option<&Option<String>> {
        let value = match name.to_ascii_lowercase().as_str() {
            "title" => &self.title,
            "summary" => &self.summary,
            "details" => &self.details,
            "author" => &self.author,
            "source" => &self.source,
            "sourceurl" | "source_url" => &self.source_url,
            "tags" => &self.tags,
            "alias" => &self.alias,
            "startdate" | "start_date" => &self.start_date,
            "enddate" | "end_date" => &self.end_date,
            "thumbnailurl" | "thumbnail_url" => &self.thumbnail_url,
            "categoryid" | "category_id" => &self.category_id,
            _ => return None,
        };
        Some(value)
    }

    /// Assigns a field addressed by name. Returns false for unknown fields.
    pub fn set_field(&mut self, name: &str, value: Option<String>) -> bool {
        let slot = match name.to_ascii_lowercase().as_str() {
            "title" => &mut self.title,
            "summary" => &mut self.summary,
            "details" => &mut self.details,
            "author" => &mut self.author,
            "source" => &mut self.source,
            "sourceurl" | "source_url" => &mut self.source_url,
            "tags" => &mut self.tags,
            "alias" => &mut self.alias,
            "startdate" | "start_date" => &mut self.start_date,
            "enddate" | "end_date" => &mut self.end_date,
            "thumbnailurl" | "thumbnail_url" => &mut self.thumbnail_url,
            "categoryid" | "category_id" => &mut self.category_id,
            _ => return false,
        };
        *slot = value;
        true
    }
}

pub(crate) fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}
