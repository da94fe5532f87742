#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;
use zaobao_relay::dedup::DedupStore;
use zaobao_relay::delivery::{MessageSink, SendError};
use zaobao_relay::model::{ArticleContent, CandidateItem};
use zaobao_relay::site::{ArticleError, ListingError, NewsSource};

pub async fn setup_store() -> DedupStore {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    DedupStore::from_pool(pool)
}

pub fn article(id: &str, image: bool) -> ArticleContent {
    ArticleContent {
        url: format!("https://www.zaobao.com.sg{}", id),
        title: format!("Title for {}", id),
        rendered_body: "Body paragraph.".into(),
        image_url: image.then(|| format!("https://img.example.com{}.jpg", id)),
        tags: vec!["tag".into()],
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkCall {
    Media { image_url: String, caption: String },
    Text { html: String, suppress_preview: bool },
}

/// Sink that records every call and answers from a scripted queue
/// (defaulting to success once the queue is empty).
#[derive(Clone, Default)]
pub struct RecordingSink {
    responses: Arc<Mutex<VecDeque<Result<(), SendError>>>>,
    calls: Arc<Mutex<Vec<SinkCall>>>,
}

impl RecordingSink {
    pub fn with_responses(responses: Vec<Result<(), SendError>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(VecDeque::from(responses))),
            ..Default::default()
        }
    }

    async fn pop_response(&self) -> Result<(), SendError> {
        let mut guard = self.responses.lock().await;
        guard.pop_front().unwrap_or(Ok(()))
    }

    pub async fn calls(&self) -> Vec<SinkCall> {
        self.calls.lock().await.clone()
    }
}

#[async_trait]
impl MessageSink for RecordingSink {
    async fn send_media(&self, image_url: &str, caption_html: &str) -> Result<(), SendError> {
        self.calls.lock().await.push(SinkCall::Media {
            image_url: image_url.to_string(),
            caption: caption_html.to_string(),
        });
        self.pop_response().await
    }

    async fn send_text(&self, html: &str, suppress_preview: bool) -> Result<(), SendError> {
        self.calls.lock().await.push(SinkCall::Text {
            html: html.to_string(),
            suppress_preview,
        });
        self.pop_response().await
    }
}

pub fn rejected(status: u16) -> Result<(), SendError> {
    Err(SendError::Rejected {
        status: Some(status),
        description: "Bad Request".into(),
    })
}

pub fn transport() -> Result<(), SendError> {
    Err(SendError::Transport("connection reset".into()))
}

/// Source with a fixed listing and per-id article results.
pub struct StaticSource {
    listing: std::sync::Mutex<Option<Result<Vec<CandidateItem>, ListingError>>>,
    articles: HashMap<String, ArticleContent>,
    fetched: std::sync::Mutex<Vec<String>>,
}

impl StaticSource {
    pub fn new(listing: Vec<CandidateItem>, articles: Vec<ArticleContent>) -> Self {
        let articles = articles
            .into_iter()
            .map(|a| {
                let id = a.url.trim_start_matches("https://www.zaobao.com.sg").to_string();
                (id, a)
            })
            .collect();
        Self {
            listing: std::sync::Mutex::new(Some(Ok(listing))),
            articles,
            fetched: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn failing(err: ListingError) -> Self {
        Self {
            listing: std::sync::Mutex::new(Some(Err(err))),
            articles: HashMap::new(),
            fetched: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }
}

#[async_trait]
impl NewsSource for StaticSource {
    async fn fetch_listing(&self) -> Result<Vec<CandidateItem>, ListingError> {
        self.listing
            .lock()
            .unwrap()
            .take()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn fetch_article(&self, item: &CandidateItem) -> Result<ArticleContent, ArticleError> {
        self.fetched.lock().unwrap().push(item.id.clone());
        self.articles
            .get(&item.id)
            .cloned()
            .ok_or(ArticleError::NotFound)
    }
}
