use serde::{Deserialize, Serialize};
use std::fmt;

/// A listing entry discovered on the realtime index, not yet confirmed new.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateItem {
    /// Site-relative path, e.g. `/realtime/china/story20240101-123`.
    pub id: String,
    pub title: String,
}

impl CandidateItem {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
        }
    }
}

/// Parsed article, alive only for one pass through the delivery pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ArticleContent {
    /// Absolute article URL used for the title link.
    pub url: String,
    pub title: String,
    /// Plain body text; paragraphs separated by blank lines.
    pub rendered_body: String,
    pub image_url: Option<String>,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Strategy {
    Media,
    PlainText,
    LinkFallback,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Media => "media",
            Strategy::PlainText => "plain_text",
            Strategy::LinkFallback => "link_fallback",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one strategy attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryOutcome {
    pub strategy: Strategy,
    pub succeeded: bool,
    pub http_status: Option<u16>,
    pub detail: Option<String>,
}

impl DeliveryOutcome {
    pub fn success(strategy: Strategy) -> Self {
        Self {
            strategy,
            succeeded: true,
            http_status: Some(200),
            detail: None,
        }
    }

    pub fn failure(strategy: Strategy, http_status: Option<u16>, detail: String) -> Self {
        Self {
            strategy,
            succeeded: false,
            http_status,
            detail: Some(detail),
        }
    }
}

/// Ordered outcomes of every strategy tried for one article.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub attempts: Vec<DeliveryOutcome>,
}

impl DeliveryReport {
    /// Strategy that got the article through, if any.
    pub fn delivered_by(&self) -> Option<Strategy> {
        self.attempts
            .iter()
            .find(|o| o.succeeded)
            .map(|o| o.strategy)
    }

    pub fn is_delivered(&self) -> bool {
        self.delivered_by().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_picks_successful_strategy() {
        let report = DeliveryReport {
            attempts: vec![
                DeliveryOutcome::failure(Strategy::Media, Some(400), "bad photo".into()),
                DeliveryOutcome::success(Strategy::PlainText),
            ],
        };
        assert_eq!(report.delivered_by(), Some(Strategy::PlainText));
        assert!(report.is_delivered());
    }

    #[test]
    fn empty_report_is_undelivered() {
        let report = DeliveryReport::default();
        assert_eq!(report.delivered_by(), None);
        assert!(!report.is_delivered());
    }
}
