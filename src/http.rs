use std::time::Duration;

use anyhow::Context as _;
use async_trait::async_trait;
use reqwest::header::{ACCEPT, REFERER, USER_AGENT};

const DEFAULT_USER_AGENT: &str = "portal-crawlers/0.1";

/// Raw HTTP GET returning the response body.
#[async_trait]
pub trait HttpFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> anyhow::Result<String>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    Bearer(String),
    Basic { username: String, password: String },
}

#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub user_agent: String,
    pub referer: Option<String>,
    pub timeout: Duration,
    pub credentials: Option<Credentials>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            referer: None,
            timeout: Duration::from_secs(30),
            credentials: None,
        }
    }
}

impl HttpConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let mut config = Self::default();

        if let Some(user_agent) = env_value("PORTAL_CRAWLERS_USER_AGENT") {
            config.user_agent = user_agent;
        }
        config.referer = env_value("PORTAL_CRAWLERS_REFERER");

        if let Some(raw) = env_value("PORTAL_CRAWLERS_TIMEOUT_SECS") {
            let secs: u64 = raw
                .parse()
                .with_context(|| format!("invalid PORTAL_CRAWLERS_TIMEOUT_SECS={raw:?}"))?;
            config.timeout = Duration::from_secs(secs);
        }

        if let Some(token) = env_value("PORTAL_CRAWLERS_BEARER_TOKEN") {
            config.credentials = Some(Credentials::Bearer(token));
        } else if let Some(raw) = env_value("PORTAL_CRAWLERS_BASIC_AUTH") {
            let (username, password) = raw
                .split_once(':')
                .ok_or_else(|| anyhow::anyhow!("PORTAL_CRAWLERS_BASIC_AUTH must be user:password"))?;
            config.credentials = Some(Credentials::Basic {
                username: username.to_owned(),
                password: password.to_owned(),
            });
        }

        Ok(config)
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

#[derive(Debug, Clone)]
pub struct ReqwestFetcher {
    client: reqwest::Client,
    config: HttpConfig,
}

impl ReqwestFetcher {
    pub fn new(config: HttpConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .context("build crawler http client")?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl HttpFetcher for ReqwestFetcher {
    async fn fetch(&self, url: &str) -> anyhow::Result<String> {
        let mut request = self
            .client
            .get(url)
            .header(USER_AGENT, &self.config.user_agent)
            .header(ACCEPT, "application/json,text/html;q=0.9,*/*;q=0.8");
        if let Some(referer) = &self.config.referer {
            request = request.header(REFERER, referer);
        }
        request = match &self.config.credentials {
            Some(Credentials::Bearer(token)) => request.bearer_auth(token),
            Some(Credentials::Basic { username, password }) => {
                request.basic_auth(username, Some(password))
            }
            None => request,
        };

        tracing::debug!(url, "GET");
        let response = request
            .send()
            .await
            .with_context(|| format!("GET {url}"))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .with_context(|| format!("read response body: {url}"))?;
        if !status.is_success() {
            anyhow::bail!("GET {url} failed ({status})");
        }
        Ok(body)
    }
}
