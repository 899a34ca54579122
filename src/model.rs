use std::path::Path;

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub title: String,
    pub url: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CrawlerType {
    #[default]
    #[serde(alias = "wordpress", alias = "Wordpress")]
    WordPress,
    #[serde(alias = "blogger")]
    Blogger,
    #[serde(alias = "wix")]
    Wix,
    #[serde(alias = "custom")]
    Custom,
}

/// Tenant-scoped crawler configuration. Read-only for the crawlers; the
/// pagination cursor lives in [`CrawlSession`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlerInfo {
    pub id: String,
    pub title: String,
    pub system_id: String,
    pub repository_id: String,
    pub repository_entity_id: String,
    pub url: String,
    pub crawler_type: CrawlerType,
    pub max_pages: usize,
    /// Minutes between scheduled crawls.
    pub interval: u32,
    /// Approval status stamped on every crawled content.
    pub status: String,
    /// `"providerCategoryID:localCategoryID"` pairs.
    pub category_mappings: Vec<String>,
    pub default_category_id: Option<String>,
    /// Raw JSON rule document for the normalizing adapter.
    pub options: Option<String>,
    /// Provider categories resolved by a previous `fetch_categories`.
    pub categories: Vec<Category>,
    pub set_author: bool,
    pub set_source: bool,
    /// Run the normalizing adapter over fetched contents.
    pub normalize: bool,
}

impl Default for CrawlerInfo {
    fn default() -> Self {
        Self {
            id: String::new(),
            title: String::new(),
            system_id: String::new(),
            repository_id: String::new(),
            repository_entity_id: String::new(),
            url: String::new(),
            crawler_type: CrawlerType::default(),
            max_pages: 1,
            interval: 720,
            status: "Pending".to_owned(),
            category_mappings: Vec::new(),
            default_category_id: None,
            options: None,
            categories: Vec::new(),
            set_author: false,
            set_source: false,
            normalize: true,
        }
    }
}

impl CrawlerInfo {
    /// Loads a configuration file. YAML and JSON are both accepted.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read crawler config: {}", path.display()))?;
        let info: Self = serde_yaml::from_str(&raw)
            .with_context(|| format!("parse crawler config: {}", path.display()))?;
        if info.url.trim().is_empty() {
            anyhow::bail!("crawler config must set `url`: {}", path.display());
        }
        Ok(info)
    }

    /// Site URL without trailing slashes.
    pub fn base_url(&self) -> &str {
        self.url.trim().trim_end_matches('/')
    }

    /// Local category mapped from a provider category ID.
    pub fn map_category(&self, provider_id: &str) -> Option<String> {
        self.category_mappings.iter().find_map(|mapping| {
            let (from, to) = mapping.split_once(':')?;
            (from.trim() == provider_id && !to.trim().is_empty()).then(|| to.trim().to_owned())
        })
    }

    pub fn find_category(&self, id: &str) -> Option<&Category> {
        self.categories.iter().find(|category| category.id == id)
    }
}

/// Pagination state of one crawl session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlSession {
    /// Provider site identity (the Blogger blog ID).
    pub web_id: Option<String>,
    /// URL of the next page, `None` once the provider has no more pages.
    pub web_url: Option<String>,
}
