//! HTTP client and HTML extraction for the news site.
//!
//! The markup selectors here follow the site's current layout and are the
//! part most likely to need updating after a redesign. Everything above this
//! module only sees [`NewsSource`].

use crate::config;
use crate::model::{ArticleContent, CandidateItem};
use anyhow::{Context, Result};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use rand::seq::IndexedRandom;
use regex::Regex;
use reqwest::{Client, StatusCode, Url};
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0";

static LISTING_ROOT: Lazy<Selector> =
    Lazy::new(|| Selector::parse("#realtime-articles-by-web-category").expect("valid selector"));
static LISTING_ITEM: Lazy<Selector> =
    Lazy::new(|| Selector::parse("ul > li").expect("valid selector"));
static ITEM_LINK: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").expect("valid selector"));
static ITEM_TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("h2").expect("valid selector"));
static ARTICLE_TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("h1").expect("valid selector"));
static ARTICLE_PARAGRAPH: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div.articleBody p").expect("valid selector"));
static ARTICLE_TAG: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div.max-h-max a").expect("valid selector"));
static THUMBNAIL_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""thumbnailUrl":\s*"(.*?)""#).expect("valid regex"));

#[derive(Debug, Error)]
pub enum ListingError {
    #[error("listing request failed: {0}")]
    Network(String),
    #[error("listing returned HTTP {0}")]
    Status(u16),
    #[error("listing markup not recognized: {0}")]
    Unrecognized(&'static str),
}

#[derive(Debug, Error)]
pub enum ArticleError {
    #[error("article not found")]
    NotFound,
    #[error("article markup not recognized: {0}")]
    ParseFailure(&'static str),
    #[error("article request failed: {0}")]
    NetworkFailure(String),
}

/// Where candidates and their content come from.
#[async_trait]
pub trait NewsSource: Send + Sync {
    /// All candidates on the index page, in discovery order. A failure means
    /// no usable listing at all; partial lists are never returned.
    async fn fetch_listing(&self) -> Result<Vec<CandidateItem>, ListingError>;

    async fn fetch_article(&self, item: &CandidateItem) -> Result<ArticleContent, ArticleError>;
}

#[derive(Debug, Clone)]
pub struct SiteClient {
    http: Client,
    base_url: Url,
    listing_path: String,
}

impl SiteClient {
    pub fn from_config(site: &config::Site) -> Result<Self> {
        let user_agent = load_user_agent(Path::new(&site.user_agents_file));
        let base_url = Url::parse(&site.base_url)
            .with_context(|| format!("invalid site.base_url: {}", site.base_url))?;
        Self::new(
            base_url,
            site.listing_path.clone(),
            &user_agent,
            Duration::from_secs(site.timeout_secs),
        )
    }

    pub fn new(base_url: Url, listing_path: String, user_agent: &str, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .context("failed to build site http client")?;
        Ok(Self {
            http,
            base_url,
            listing_path,
        })
    }

    /// Join a site-relative path onto the base URL, refusing anything that
    /// would leave the configured host.
    fn resolve(&self, path: &str) -> Result<Url, String> {
        if !is_site_relative(path) {
            return Err(format!("not a site-relative path: {}", path));
        }
        let url = self.base_url.join(path).map_err(|e| e.to_string())?;
        if url.host_str() != self.base_url.host_str() || url.port() != self.base_url.port() {
            return Err(format!("path {} resolves off-site to {}", path, url));
        }
        Ok(url)
    }
}

#[async_trait]
impl NewsSource for SiteClient {
    #[instrument(skip_all)]
    async fn fetch_listing(&self) -> Result<Vec<CandidateItem>, ListingError> {
        let url = self
            .resolve(&self.listing_path)
            .map_err(ListingError::Network)?;
        info!(%url, "fetching listing");
        let res = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| ListingError::Network(e.to_string()))?;
        if !res.status().is_success() {
            return Err(ListingError::Status(res.status().as_u16()));
        }
        let body = res
            .text()
            .await
            .map_err(|e| ListingError::Network(e.to_string()))?;
        let items = parse_listing(&body)?;
        info!(count = items.len(), "listing parsed");
        Ok(items)
    }

    #[instrument(skip_all, fields(id = %item.id))]
    async fn fetch_article(&self, item: &CandidateItem) -> Result<ArticleContent, ArticleError> {
        let url = self
            .resolve(&item.id)
            .map_err(ArticleError::NetworkFailure)?;
        debug!(%url, "fetching article");
        let res = self
            .http
            .get(url.clone())
            .send()
            .await
            .map_err(|e| ArticleError::NetworkFailure(e.to_string()))?;
        match res.status() {
            StatusCode::NOT_FOUND => return Err(ArticleError::NotFound),
            s if !s.is_success() => {
                return Err(ArticleError::NetworkFailure(format!("HTTP {}", s)))
            }
            _ => {}
        }
        let body = res
            .text()
            .await
            .map_err(|e| ArticleError::NetworkFailure(e.to_string()))?;
        let article = parse_article(&body, url.as_str())?;
        info!(title = %article.title, "article fetched");
        Ok(article)
    }
}

/// Extract `(path, title)` pairs from the realtime index page.
///
/// Entries without a site-relative link or a title are skipped. A page
/// without the listing container is rejected outright.
pub fn parse_listing(html: &str) -> Result<Vec<CandidateItem>, ListingError> {
    let document = Html::parse_document(html);
    let root = document
        .select(&LISTING_ROOT)
        .next()
        .ok_or(ListingError::Unrecognized(
            "missing #realtime-articles-by-web-category",
        ))?;

    let mut items = Vec::new();
    for li in root.select(&LISTING_ITEM) {
        let href = li
            .select(&ITEM_LINK)
            .next()
            .and_then(|a| a.value().attr("href"));
        let title = li.select(&ITEM_TITLE).next().map(element_text);
        match (href, title) {
            (Some(href), Some(title)) if is_site_relative(href) && !title.is_empty() => {
                items.push(CandidateItem::new(href, title));
            }
            (Some(href), Some(_)) if !is_site_relative(href) => {
                warn!(href, "skipping listing entry with non-relative link");
            }
            _ => warn!("skipping listing entry without link or title"),
        }
    }
    Ok(items)
}

/// `/path` but not `//host/path` or `/\host`, which browsers and
/// `Url::join` treat as another origin.
pub fn is_site_relative(href: &str) -> bool {
    href.starts_with('/') && !href.starts_with("//") && !href.starts_with("/\\")
}

/// Parse an article page. Only the `<h1>` title is mandatory.
pub fn parse_article(html: &str, url: &str) -> Result<ArticleContent, ArticleError> {
    let document = Html::parse_document(html);
    let title = document
        .select(&ARTICLE_TITLE)
        .next()
        .map(element_text)
        .filter(|t| !t.is_empty())
        .ok_or(ArticleError::ParseFailure("missing <h1> title"))?;

    let image_url = THUMBNAIL_URL
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().replace("\\/", "/"))
        .filter(|u| !u.is_empty());
    if image_url.is_none() {
        debug!(url, "article has no thumbnail");
    }

    let rendered_body = document
        .select(&ARTICLE_PARAGRAPH)
        .map(element_text)
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n");

    let mut seen = HashSet::new();
    let tags = document
        .select(&ARTICLE_TAG)
        .map(element_text)
        .filter(|t| !t.is_empty() && seen.insert(t.clone()))
        .collect();

    Ok(ArticleContent {
        url: url.to_string(),
        title,
        rendered_body,
        image_url,
        tags,
    })
}

fn element_text(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

/// Pick a random user agent from a JSON array file, or the default one.
pub fn load_user_agent(path: &Path) -> String {
    let agents: Vec<String> = match std::fs::read_to_string(path)
        .map_err(anyhow::Error::from)
        .and_then(|raw| serde_json::from_str(&raw).map_err(anyhow::Error::from))
    {
        Ok(list) => list,
        Err(err) => {
            warn!(?err, path = %path.display(), "cannot load user agents; using default");
            return DEFAULT_USER_AGENT.to_string();
        }
    };
    match agents.choose(&mut rand::rng()) {
        Some(ua) => ua.clone(),
        None => {
            warn!(path = %path.display(), "user agent list is empty; using default");
            DEFAULT_USER_AGENT.to_string()
        }
    }
}
