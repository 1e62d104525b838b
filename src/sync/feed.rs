//! Feed-backed source syncing: fetch raw feed text, parse it into event
//! records and replace the source's events in the store.

use crate::calendar::{CalendarSource, EventDraft};
use crate::config::SyncConfig;
use crate::error::{EngineError, Result};
use crate::store::EventStore;
use crate::sync::source::SourceSyncer;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Retrieves raw calendar-feed text.
#[async_trait]
pub trait FeedFetcher: Send + Sync {
    async fn fetch(&self, url: &str, bearer_token: Option<&str>) -> Result<String>;
}

/// Turns raw feed text into normalized event records.
///
/// Individual records that cannot be parsed are skipped. An error means
/// the feed as a whole was unreadable.
pub trait FeedParser: Send + Sync {
    fn parse(&self, raw: &str) -> Result<Vec<EventDraft>>;
}

/// Supplies access tokens for sources with write-back credentials.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn access_token(&self, source: &CalendarSource) -> Result<String>;
}

/// Rewrite `webcal://` subscriptions to `https://` and reject anything that
/// is not an http(s) URL.
pub fn normalize_feed_url(raw: &str) -> Result<url::Url> {
    let trimmed = raw.trim();
    let rewritten = match trimmed.get(..9) {
        Some(prefix) if prefix.eq_ignore_ascii_case("webcal://") => {
            format!("https://{}", &trimmed[9..])
        }
        _ => trimmed.to_owned(),
    };

    let url = url::Url::parse(&rewritten)
        .map_err(|e| EngineError::Fetch(format!("invalid feed url {raw:?}: {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(EngineError::Fetch(format!(
            "unsupported feed url scheme {other:?}"
        ))),
    }
}

/// [`FeedFetcher`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpFeedFetcher {
    client: reqwest::Client,
}

impl HttpFeedFetcher {
    pub fn new(config: &SyncConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.fetch_timeout_secs))
            .build()
            .unwrap_or_default();
        Self { client }
    }
}

#[async_trait]
impl FeedFetcher for HttpFeedFetcher {
    async fn fetch(&self, url: &str, bearer_token: Option<&str>) -> Result<String> {
        let url = normalize_feed_url(url)?;
        let mut request = self.client.get(url.clone());
        if let Some(token) = bearer_token {
            request = request.bearer_auth(token);
        }

        let resp = request
            .send()
            .await
            .map_err(|e| EngineError::Fetch(format!("GET {url} failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let detail: String = body.chars().take(200).collect();
            return Err(EngineError::Fetch(if detail.is_empty() {
                format!("HTTP {}", status.as_u16())
            } else {
                format!("HTTP {}: {detail}", status.as_u16())
            }));
        }

        resp.text()
            .await
            .map_err(|e| EngineError::Fetch(format!("reading feed body from {url}: {e}")))
    }
}

/// [`FeedParser`] for feeds that are already a JSON array of event records.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonFeedParser;

impl FeedParser for JsonFeedParser {
    fn parse(&self, raw: &str) -> Result<Vec<EventDraft>> {
        let records: Vec<serde_json::Value> = serde_json::from_str(raw)
            .map_err(|e| EngineError::Sync(format!("feed is not a JSON array: {e}")))?;

        let total = records.len();
        let drafts: Vec<EventDraft> = records
            .into_iter()
            .filter_map(|record| serde_json::from_value(record).ok())
            .collect();
        if drafts.len() < total {
            debug!(
                skipped = total - drafts.len(),
                "skipped unparseable feed records"
            );
        }
        Ok(drafts)
    }
}

/// [`SourceSyncer`] that fetches, parses and stores one feed.
pub struct FeedSourceSyncer {
    fetcher: Arc<dyn FeedFetcher>,
    parser: Arc<dyn FeedParser>,
    events: Arc<dyn EventStore>,
    credentials: Option<Arc<dyn CredentialProvider>>,
}

impl FeedSourceSyncer {
    pub fn new(
        fetcher: Arc<dyn FeedFetcher>,
        parser: Arc<dyn FeedParser>,
        events: Arc<dyn EventStore>,
    ) -> Self {
        Self {
            fetcher,
            parser,
            events,
            credentials: None,
        }
    }

    /// Use `provider` for sources flagged with credentials.
    #[must_use]
    pub fn with_credentials(mut self, provider: Arc<dyn CredentialProvider>) -> Self {
        self.credentials = Some(provider);
        self
    }

    async fn token_for(&self, source: &CalendarSource) -> Result<Option<String>> {
        if !source.has_credentials {
            return Ok(None);
        }
        match &self.credentials {
            Some(provider) => provider.access_token(source).await.map(Some),
            None => Err(EngineError::Credentials(format!(
                "source {} requires credentials but no provider is configured",
                source.name
            ))),
        }
    }
}

#[async_trait]
impl SourceSyncer for FeedSourceSyncer {
    async fn sync_source(&self, source: &CalendarSource) -> Result<usize> {
        let token = self.token_for(source).await?;
        let raw = self.fetcher.fetch(&source.url, token.as_deref()).await?;
        let drafts = self.parser.parse(&raw)?;
        let count = self.events.replace_source_events(source.id, drafts).await?;
        debug!(source = %source.name, kind = source.kind.as_str(), count, "source synced");
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::calendar::{SourceId, SourceKind};
    use crate::store::MemoryEventStore;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const FEED: &str = r#"[
        {"title": "Standup", "start": "2026-03-02T09:00:00Z", "reminders": ["5 minutes before"]},
        {"title": "broken", "start": "not a date"},
        {"title": "Review", "start": "2026-03-02T14:00:00Z"}
    ]"#;

    struct FixedToken;

    #[async_trait]
    impl CredentialProvider for FixedToken {
        async fn access_token(&self, _source: &CalendarSource) -> Result<String> {
            Ok("secret-token".to_owned())
        }
    }

    #[test]
    fn webcal_is_rewritten_to_https() {
        let url = normalize_feed_url("webcal://calendar.example.com/feed.ics").unwrap();
        assert_eq!(url.as_str(), "https://calendar.example.com/feed.ics");

        let url = normalize_feed_url("WEBCAL://Example.com/a").unwrap();
        assert_eq!(url.scheme(), "https");
    }

    #[test]
    fn non_http_schemes_are_rejected() {
        assert!(matches!(
            normalize_feed_url("ftp://example.com/feed.ics"),
            Err(EngineError::Fetch(_))
        ));
        assert!(normalize_feed_url("not a url").is_err());
    }

    #[test]
    fn json_parser_skips_bad_records() {
        let drafts = JsonFeedParser.parse(FEED).unwrap();
        let titles: Vec<&str> = drafts.iter().map(|d| d.title.as_str()).collect();
        assert_eq!(titles, vec!["Standup", "Review"]);
        assert_eq!(drafts[0].reminders, vec!["5 minutes before"]);
    }

    #[test]
    fn json_parser_rejects_non_array_feed() {
        assert!(matches!(
            JsonFeedParser.parse("{\"oops\": true}"),
            Err(EngineError::Sync(_))
        ));
    }

    #[tokio::test]
    async fn http_fetcher_sends_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/private.json"))
            .and(header("authorization", "Bearer secret-token"))
            .respond_with(ResponseTemplate::new(200).set_body_string(FEED))
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = HttpFeedFetcher::new(&SyncConfig::default());
        let body = fetcher
            .fetch(&format!("{}/private.json", server.uri()), Some("secret-token"))
            .await
            .unwrap();
        assert!(body.contains("Standup"));
    }

    #[tokio::test]
    async fn http_fetcher_maps_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gone.ics"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let fetcher = HttpFeedFetcher::new(&SyncConfig::default());
        let err = fetcher
            .fetch(&format!("{}/gone.ics", server.uri()), None)
            .await
            .unwrap_err();
        match err {
            EngineError::Fetch(message) => assert!(message.contains("404"), "{message}"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn feed_syncer_replaces_source_events() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/team.json"))
            .respond_with(ResponseTemplate::new(200).set_body_string(FEED))
            .mount(&server)
            .await;

        let store = Arc::new(MemoryEventStore::new());
        let syncer = FeedSourceSyncer::new(
            Arc::new(HttpFeedFetcher::new(&SyncConfig::default())),
            Arc::new(JsonFeedParser),
            Arc::clone(&store) as Arc<dyn EventStore>,
        );
        let source = CalendarSource::new(
            SourceId(4),
            "team",
            format!("{}/team.json", server.uri()),
            SourceKind::Ical,
        );

        assert_eq!(syncer.sync_source(&source).await.unwrap(), 2);
        assert_eq!(syncer.sync_source(&source).await.unwrap(), 2);

        let events = store.list().await.unwrap();
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.source_id == Some(SourceId(4))));
    }

    #[tokio::test]
    async fn credentialed_source_without_provider_fails() {
        let store = Arc::new(MemoryEventStore::new());
        let syncer = FeedSourceSyncer::new(
            Arc::new(HttpFeedFetcher::new(&SyncConfig::default())),
            Arc::new(JsonFeedParser),
            store,
        );
        let mut source = CalendarSource::new(
            SourceId(1),
            "google",
            "https://example.invalid/cal",
            SourceKind::Google,
        );
        source.has_credentials = true;

        assert!(matches!(
            syncer.sync_source(&source).await,
            Err(EngineError::Credentials(_))
        ));
    }

    #[tokio::test]
    async fn credentialed_source_uses_provider_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("authorization", "Bearer secret-token"))
            .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
            .expect(1)
            .mount(&server)
            .await;

        let syncer = FeedSourceSyncer::new(
            Arc::new(HttpFeedFetcher::new(&SyncConfig::default())),
            Arc::new(JsonFeedParser),
            Arc::new(MemoryEventStore::new()),
        )
        .with_credentials(Arc::new(FixedToken));
        let mut source = CalendarSource::new(
            SourceId(2),
            "google",
            format!("{}/calendar", server.uri()),
            SourceKind::Google,
        );
        source.has_credentials = true;

        assert_eq!(syncer.sync_source(&source).await.unwrap(), 0);
    }
}
