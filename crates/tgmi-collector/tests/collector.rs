//! Collector behavior against a scripted in-memory source.
//!
//! Rate-limit tests run on tokio's paused clock so the requested waits are
//! observed without real sleeping.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use tgmi_collector::{
    snapshot_path, ChannelRequest, CollectorError, CollectorSettings, MediaRef, MessageSource,
    PageRequest, RateLimitedCollector, SourceError, SourceMessage,
};
use tgmi_core::ChannelIdentity;

#[derive(Default)]
struct ScriptedSource {
    /// Newest first, ids strictly descending.
    items: Vec<SourceMessage>,
    /// Zero-based page-call indices that answer with a rate-limit signal.
    rate_limit_calls: HashSet<usize>,
    rate_limit_secs: u64,
    always_rate_limited: bool,
    failing_channels: HashSet<String>,
    failing_media: HashSet<String>,
    page_calls: AtomicUsize,
    requests: Mutex<Vec<PageRequest>>,
}

impl ScriptedSource {
    fn with_items(n: i64) -> Self {
        let items = (1..=n)
            .rev()
            .map(|id| SourceMessage {
                id,
                date: Some(Utc.with_ymd_and_hms(2025, 1, 14, 0, 0, 0).unwrap()),
                text: Some(format!("post {id}")),
                media: None,
                views: Some(id * 10),
                forwards: None,
            })
            .collect();
        Self {
            items,
            ..Self::default()
        }
    }
}

#[async_trait]
impl MessageSource for ScriptedSource {
    async fn fetch_page(
        &self,
        channel: &ChannelIdentity,
        request: PageRequest,
    ) -> Result<Vec<SourceMessage>, SourceError> {
        if self.failing_channels.contains(channel.as_str()) {
            return Err(SourceError::ChannelNotFound {
                channel: channel.to_string(),
            });
        }
        let call = self.page_calls.fetch_add(1, Ordering::SeqCst);
        if self.always_rate_limited || self.rate_limit_calls.contains(&call) {
            return Err(SourceError::RateLimited {
                channel: channel.to_string(),
                retry_after_secs: self.rate_limit_secs,
            });
        }
        self.requests.lock().unwrap().push(request);
        Ok(self
            .items
            .iter()
            .filter(|m| request.before_id.is_none_or(|b| m.id < b))
            .take(request.limit)
            .cloned()
            .collect())
    }

    async fn fetch_media(
        &self,
        _channel: &ChannelIdentity,
        media: &MediaRef,
    ) -> Result<Vec<u8>, SourceError> {
        if self.failing_media.contains(&media.file_id) {
            return Err(SourceError::UnexpectedStatus {
                status: 410,
                url: format!("http://source/media/{}", media.file_id),
            });
        }
        Ok(media.file_id.as_bytes().to_vec())
    }
}

fn settings(root: &std::path::Path, page_size: usize) -> CollectorSettings {
    CollectorSettings {
        page_size,
        max_rate_limit_waits: 3,
        snapshots_root: root.join("telegram_messages"),
        images_root: root.join("images"),
    }
}

fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 1, 14).unwrap()
}

#[tokio::test(start_paused = true)]
async fn rate_limit_mid_collection_waits_then_keeps_every_item() {
    let dir = tempfile::tempdir().unwrap();
    let mut source = ScriptedSource::with_items(7);
    source.rate_limit_calls.insert(1);
    source.rate_limit_secs = 30;
    let source = Arc::new(source);
    let collector = RateLimitedCollector::new(Arc::clone(&source), settings(dir.path(), 3));
    let channel = ChannelIdentity::new("tikvahpharma");

    let started = tokio::time::Instant::now();
    let collection = collector.collect_on(&channel, 7, day()).await.unwrap();

    assert!(started.elapsed() >= Duration::from_secs(30));
    let ids: Vec<i64> = collection
        .snapshot
        .messages
        .iter()
        .map(|m| m.message_id)
        .collect();
    assert_eq!(ids, vec![7, 6, 5, 4, 3, 2, 1]);

    // Resumed from the cursor instead of restarting the channel.
    let requests = source.requests.lock().unwrap().clone();
    assert_eq!(requests[0].before_id, None);
    assert_eq!(requests[1].before_id, Some(5));
    assert_eq!(requests[2].before_id, Some(2));
}

#[tokio::test(start_paused = true)]
async fn persistent_rate_limit_fails_channel_without_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let source = ScriptedSource {
        always_rate_limited: true,
        rate_limit_secs: 5,
        ..ScriptedSource::with_items(3)
    };
    let collector = RateLimitedCollector::new(source, settings(dir.path(), 10));
    let channel = ChannelIdentity::new("EAHPA");

    let err = collector.collect_on(&channel, 3, day()).await.unwrap_err();
    assert!(matches!(
        err,
        CollectorError::RateLimitExhausted { waits: 3, .. }
    ));
    let path = snapshot_path(&dir.path().join("telegram_messages"), day(), &channel);
    assert!(!path.exists());
}

#[tokio::test]
async fn stops_at_max_messages_keeping_newest_in_source_order() {
    let dir = tempfile::tempdir().unwrap();
    let collector = RateLimitedCollector::new(ScriptedSource::with_items(10), settings(dir.path(), 3));
    let collection = collector
        .collect_on(&ChannelIdentity::new("yetenaweg"), 4, day())
        .await
        .unwrap();

    let ids: Vec<i64> = collection
        .snapshot
        .messages
        .iter()
        .map(|m| m.message_id)
        .collect();
    assert_eq!(ids, vec![10, 9, 8, 7]);
    assert_eq!(collection.snapshot.messages[0].view_count, 100);
    assert_eq!(collection.snapshot.messages[0].forward_count, 0);
}

#[tokio::test]
async fn short_channel_yields_what_exists() {
    let dir = tempfile::tempdir().unwrap();
    let collector = RateLimitedCollector::new(ScriptedSource::with_items(2), settings(dir.path(), 50));
    let collection = collector
        .collect_on(&ChannelIdentity::new("CheMed123"), 100, day())
        .await
        .unwrap();
    assert_eq!(collection.snapshot.messages.len(), 2);
    assert!(collection.snapshot.path.exists());
}

#[tokio::test]
async fn media_failure_degrades_only_that_item() {
    let dir = tempfile::tempdir().unwrap();
    let mut source = ScriptedSource::with_items(3);
    source.items[0].media = Some(MediaRef {
        file_id: "ok-3".to_string(),
    });
    source.items[1].media = Some(MediaRef {
        file_id: "gone-2".to_string(),
    });
    source.failing_media.insert("gone-2".to_string());
    let collector = RateLimitedCollector::new(source, settings(dir.path(), 10));

    let collection = collector
        .collect_on(&ChannelIdentity::new("lobelia4cosmetics"), 3, day())
        .await
        .unwrap();

    assert_eq!(collection.media_failures, 1);
    let msgs = &collection.snapshot.messages;
    assert_eq!(msgs.len(), 3);

    assert!(msgs[0].has_media);
    let stored = msgs[0].media_path.as_deref().unwrap();
    assert!(stored.ends_with("lobelia4cosmetics/3.jpg"));
    assert_eq!(std::fs::read(stored).unwrap(), b"ok-3");

    assert!(!msgs[1].has_media);
    assert!(msgs[1].media_path.is_none());
    assert!(msgs.iter().all(tgmi_core::CollectedMessage::media_is_consistent));
}

#[tokio::test]
async fn failing_channel_is_isolated_from_siblings() {
    let dir = tempfile::tempdir().unwrap();
    let mut source = ScriptedSource::with_items(4);
    source.failing_channels.insert("broken_channel".to_string());
    let collector = RateLimitedCollector::new(source, settings(dir.path(), 10));

    let requests = vec![
        ChannelRequest {
            channel: ChannelIdentity::new("broken_channel"),
            max_messages: 4,
        },
        ChannelRequest {
            channel: ChannelIdentity::new("tikvahpharma"),
            max_messages: 4,
        },
    ];
    let outcomes = collector.collect_all(&requests, 2, day()).await;

    assert_eq!(outcomes.len(), 2);
    assert_eq!(outcomes[0].channel.as_str(), "broken_channel");
    assert!(matches!(
        outcomes[0].result,
        Err(CollectorError::Source(SourceError::ChannelNotFound { .. }))
    ));
    let ok = outcomes[1].result.as_ref().unwrap();
    assert_eq!(ok.snapshot.messages.len(), 4);

    let snapshots = tgmi_collector::discover_snapshots(&dir.path().join("telegram_messages"), None)
        .await
        .unwrap();
    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0].channel.as_str(), "tikvahpharma");
}

#[tokio::test(start_paused = true)]
async fn rate_limit_budget_spans_every_page_of_a_channel() {
    let dir = tempfile::tempdir().unwrap();
    let mut source = ScriptedSource::with_items(7);
    // Every other page call is rate limited; each page on its own would
    // stay within the bound of 3.
    source.rate_limit_calls = [0, 2, 4, 6].into_iter().collect();
    source.rate_limit_secs = 1;
    let collector = RateLimitedCollector::new(source, settings(dir.path(), 2));
    let channel = ChannelIdentity::new("tikvahpharma");

    let err = collector.collect_on(&channel, 7, day()).await.unwrap_err();
    assert!(matches!(
        err,
        CollectorError::RateLimitExhausted { waits: 3, .. }
    ));
    let path = snapshot_path(&dir.path().join("telegram_messages"), day(), &channel);
    assert!(!path.exists());
}

/// Source that tracks how many channel fetches are in flight at once and can
/// hold one channel behind a long rate limit.
struct ConcurrencySource {
    items: Vec<SourceMessage>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    /// Channel answered with a rate limit on its first page call.
    throttled_channel: Option<String>,
    throttle_secs: u64,
    throttled_once: Mutex<bool>,
    /// Snapshot of the sibling channel, checked when the throttled channel
    /// resumes.
    sibling_snapshot: Option<std::path::PathBuf>,
    sibling_done_on_resume: Mutex<Option<bool>>,
}

impl ConcurrencySource {
    fn new(items: i64) -> Self {
        Self {
            items: ScriptedSource::with_items(items).items,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            throttled_channel: None,
            throttle_secs: 0,
            throttled_once: Mutex::new(false),
            sibling_snapshot: None,
            sibling_done_on_resume: Mutex::new(None),
        }
    }
}

#[async_trait]
impl MessageSource for ConcurrencySource {
    async fn fetch_page(
        &self,
        channel: &ChannelIdentity,
        request: PageRequest,
    ) -> Result<Vec<SourceMessage>, SourceError> {
        if self.throttled_channel.as_deref() == Some(channel.as_str()) {
            let first = !std::mem::replace(&mut *self.throttled_once.lock().unwrap(), true);
            if first {
                return Err(SourceError::RateLimited {
                    channel: channel.to_string(),
                    retry_after_secs: self.throttle_secs,
                });
            }
            let done = self.sibling_snapshot.as_ref().map(|p| p.exists());
            *self.sibling_done_on_resume.lock().unwrap() = done;
        }

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        Ok(self
            .items
            .iter()
            .filter(|m| request.before_id.is_none_or(|b| m.id < b))
            .take(request.limit)
            .cloned()
            .collect())
    }

    async fn fetch_media(
        &self,
        _channel: &ChannelIdentity,
        media: &MediaRef,
    ) -> Result<Vec<u8>, SourceError> {
        Ok(media.file_id.as_bytes().to_vec())
    }
}

#[tokio::test(start_paused = true)]
async fn collect_all_never_exceeds_max_concurrent_channels() {
    let dir = tempfile::tempdir().unwrap();
    let source = Arc::new(ConcurrencySource::new(6));
    let collector = RateLimitedCollector::new(Arc::clone(&source), settings(dir.path(), 2));

    let requests: Vec<ChannelRequest> = [
        "CheMed123",
        "lobelia4cosmetics",
        "tikvahpharma",
        "yetenaweg",
        "EAHPA",
    ]
    .into_iter()
    .map(|name| ChannelRequest {
        channel: ChannelIdentity::new(name),
        max_messages: 6,
    })
    .collect();
    let outcomes = collector.collect_all(&requests, 2, day()).await;

    assert!(outcomes.iter().all(tgmi_collector::ChannelOutcome::succeeded));
    assert_eq!(source.peak.load(Ordering::SeqCst), 2);
    assert_eq!(source.in_flight.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn rate_limited_channel_does_not_block_its_sibling() {
    let dir = tempfile::tempdir().unwrap();
    let snapshots_root = dir.path().join("telegram_messages");
    let sibling = ChannelIdentity::new("yetenaweg");

    let mut source = ConcurrencySource::new(4);
    source.throttled_channel = Some("EAHPA".to_string());
    source.throttle_secs = 600;
    source.sibling_snapshot = Some(snapshot_path(&snapshots_root, day(), &sibling));
    let source = Arc::new(source);
    let collector = RateLimitedCollector::new(Arc::clone(&source), settings(dir.path(), 2));

    let requests = vec![
        ChannelRequest {
            channel: ChannelIdentity::new("EAHPA"),
            max_messages: 4,
        },
        ChannelRequest {
            channel: sibling.clone(),
            max_messages: 4,
        },
    ];
    let started = tokio::time::Instant::now();
    let outcomes = collector.collect_all(&requests, 2, day()).await;

    assert!(started.elapsed() >= Duration::from_secs(600));
    assert!(outcomes.iter().all(tgmi_collector::ChannelOutcome::succeeded));
    // The sibling's snapshot was already on disk when the throttled channel
    // came back from its wait.
    assert_eq!(*source.sibling_done_on_resume.lock().unwrap(), Some(true));
}
