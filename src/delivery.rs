//! Ordered fallback chain for pushing one article to the channel.
//!
//! Strategies are tried in order (photo with caption, formatted text, bare
//! link) and the first success wins. A strategy failure of any kind is
//! logged and the next one is tried.

use crate::model::{ArticleContent, DeliveryOutcome, DeliveryReport, Strategy};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use teloxide::utils::html::escape;
use thiserror::Error;
use tracing::{info, instrument, warn};

pub const DEFAULT_TEXT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_MEDIA_TIMEOUT: Duration = Duration::from_secs(20);
/// Telegram's photo caption limit, counted after entity parsing.
pub const CAPTION_LIMIT: usize = 1024;

#[derive(Debug, Error)]
pub enum SendError {
    /// No usable response from the remote.
    #[error("transport error: {0}")]
    Transport(String),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    /// The remote answered but refused the message.
    #[error("rejected{}: {description}", .status.map(|s| format!(" ({})", s)).unwrap_or_default())]
    Rejected {
        status: Option<u16>,
        description: String,
    },
}

impl SendError {
    pub fn status(&self) -> Option<u16> {
        match self {
            SendError::Rejected { status, .. } => *status,
            _ => None,
        }
    }
}

/// Destination channel. Both calls target the configured chat.
#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn send_media(&self, image_url: &str, caption_html: &str) -> Result<(), SendError>;

    async fn send_text(&self, html: &str, suppress_preview: bool) -> Result<(), SendError>;
}

/// One way of getting an article into the channel.
#[async_trait]
pub trait DeliveryStrategy: Send + Sync {
    fn kind(&self) -> Strategy;

    /// Whether this strategy can handle `content` at all.
    fn applies(&self, _content: &ArticleContent) -> bool {
        true
    }

    async fn attempt(&self, sink: &dyn MessageSink, content: &ArticleContent) -> DeliveryOutcome;
}

pub struct MediaDelivery {
    pub timeout: Duration,
}

pub struct PlainTextDelivery {
    pub timeout: Duration,
}

pub struct LinkFallbackDelivery {
    pub timeout: Duration,
}

#[async_trait]
impl DeliveryStrategy for MediaDelivery {
    fn kind(&self) -> Strategy {
        Strategy::Media
    }

    fn applies(&self, content: &ArticleContent) -> bool {
        content.image_url.is_some()
    }

    async fn attempt(&self, sink: &dyn MessageSink, content: &ArticleContent) -> DeliveryOutcome {
        let Some(image_url) = content.image_url.as_deref() else {
            return DeliveryOutcome::failure(self.kind(), None, "no image".into());
        };
        let caption = render_caption(content, CAPTION_LIMIT);
        outcome(
            self.kind(),
            tokio::time::timeout(self.timeout, sink.send_media(image_url, &caption)).await,
            self.timeout,
        )
    }
}

#[async_trait]
impl DeliveryStrategy for PlainTextDelivery {
    fn kind(&self) -> Strategy {
        Strategy::PlainText
    }

    async fn attempt(&self, sink: &dyn MessageSink, content: &ArticleContent) -> DeliveryOutcome {
        let text = render_full(content);
        outcome(
            self.kind(),
            tokio::time::timeout(self.timeout, sink.send_text(&text, true)).await,
            self.timeout,
        )
    }
}

#[async_trait]
impl DeliveryStrategy for LinkFallbackDelivery {
    fn kind(&self) -> Strategy {
        Strategy::LinkFallback
    }

    async fn attempt(&self, sink: &dyn MessageSink, content: &ArticleContent) -> DeliveryOutcome {
        let text = render_link_only(content);
        // Preview on: the channel renders its own card since the rich sends failed.
        outcome(
            self.kind(),
            tokio::time::timeout(self.timeout, sink.send_text(&text, false)).await,
            self.timeout,
        )
    }
}

fn outcome(
    strategy: Strategy,
    res: Result<Result<(), SendError>, tokio::time::error::Elapsed>,
    timeout: Duration,
) -> DeliveryOutcome {
    match res {
        Ok(Ok(())) => DeliveryOutcome::success(strategy),
        Ok(Err(err)) => DeliveryOutcome::failure(strategy, err.status(), err.to_string()),
        Err(_) => DeliveryOutcome::failure(strategy, None, SendError::Timeout(timeout).to_string()),
    }
}

pub struct DeliveryPipeline {
    sink: Arc<dyn MessageSink>,
    strategies: Vec<Box<dyn DeliveryStrategy>>,
}

impl DeliveryPipeline {
    pub fn new(sink: Arc<dyn MessageSink>, strategies: Vec<Box<dyn DeliveryStrategy>>) -> Self {
        Self { sink, strategies }
    }

    /// Media, then plain text, then link-only.
    pub fn standard(sink: Arc<dyn MessageSink>, text_timeout: Duration, media_timeout: Duration) -> Self {
        Self::new(
            sink,
            vec![
                Box::new(MediaDelivery {
                    timeout: media_timeout,
                }),
                Box::new(PlainTextDelivery {
                    timeout: text_timeout,
                }),
                Box::new(LinkFallbackDelivery {
                    timeout: text_timeout,
                }),
            ],
        )
    }

    /// Run the chain for one article, stopping at the first success.
    #[instrument(skip_all, fields(id = %id))]
    pub async fn deliver(&self, id: &str, content: &ArticleContent) -> DeliveryReport {
        let mut report = DeliveryReport::default();
        for strategy in &self.strategies {
            if !strategy.applies(content) {
                continue;
            }
            let outcome = strategy.attempt(self.sink.as_ref(), content).await;
            let succeeded = outcome.succeeded;
            if succeeded {
                info!(id, strategy = %outcome.strategy, "article delivered");
            } else {
                warn!(
                    id,
                    strategy = %outcome.strategy,
                    status = ?outcome.http_status,
                    detail = outcome.detail.as_deref().unwrap_or_default(),
                    "delivery strategy failed"
                );
            }
            report.attempts.push(outcome);
            if succeeded {
                break;
            }
        }
        report
    }
}

/// Title as a bold link to the article.
pub fn title_link(content: &ArticleContent) -> String {
    format!(
        "<a href=\"{}\"><b>{}</b></a>",
        escape(&content.url),
        escape(&content.title)
    )
}

fn tag_words(tags: &[String]) -> String {
    tags.iter()
        .map(|t| t.split_whitespace().collect::<String>())
        .filter(|t| !t.is_empty())
        .map(|t| format!("#{}", t))
        .collect::<Vec<_>>()
        .join(" ")
}

/// `#tag` words separated by spaces.
pub fn hashtags(tags: &[String]) -> String {
    escape(&tag_words(tags))
}

/// Title link, body and tags, blank-line separated, empty parts omitted.
pub fn render_full(content: &ArticleContent) -> String {
    let body = escape(content.rendered_body.trim());
    let tags = hashtags(&content.tags);
    [title_link(content), body, tags]
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Like [`render_full`], but the body is cut with `…` so the visible text
/// stays within `limit` UTF-16 units. Title and tags are never cut.
pub fn render_caption(content: &ArticleContent, limit: usize) -> String {
    let tags = tag_words(&content.tags);
    let mut fixed = utf16_len(&content.title);
    if !tags.is_empty() {
        fixed += utf16_len(&tags) + 2;
    }
    let budget = limit.saturating_sub(fixed + 2);

    let body = content.rendered_body.trim();
    let body = if utf16_len(body) <= budget {
        body.to_string()
    } else if budget <= 1 {
        String::new()
    } else {
        let mut used = 0;
        let mut cut: String = body
            .chars()
            .take_while(|c| {
                used += c.len_utf16();
                used < budget
            })
            .collect();
        cut.truncate(cut.trim_end().len());
        cut.push('…');
        cut
    };

    [title_link(content), escape(&body), escape(&tags)]
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn utf16_len(s: &str) -> usize {
    s.encode_utf16().count()
}

pub fn render_link_only(content: &ArticleContent) -> String {
    let tags = hashtags(&content.tags);
    if tags.is_empty() {
        title_link(content)
    } else {
        format!("{} {}", title_link(content), tags)
    }
}
