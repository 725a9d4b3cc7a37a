//! Per-channel collection into the lake.

use std::collections::HashSet;
use std::path::PathBuf;

use chrono::{NaiveDate, Utc};
use futures::stream::{self, StreamExt};
use tgmi_core::{AppConfig, ChannelIdentity, CollectedMessage};

use crate::error::CollectorError;
use crate::lake::{self, LakeSnapshot};
use crate::rate_limit::{suspend_while_rate_limited, WaitBudget};
use crate::source::{MessageSource, PageRequest, SourceMessage};

/// Knobs for a [`RateLimitedCollector`].
#[derive(Debug, Clone)]
pub struct CollectorSettings {
    /// Items requested per source call.
    pub page_size: usize,
    /// Rate-limit suspensions tolerated per channel collection, across all
    /// page and media calls.
    pub max_rate_limit_waits: u32,
    pub snapshots_root: PathBuf,
    pub images_root: PathBuf,
}

impl CollectorSettings {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            page_size: config.collector_page_size.max(1),
            max_rate_limit_waits: config.collector_max_rate_limit_waits,
            snapshots_root: config.snapshots_root(),
            images_root: config.images_root(),
        }
    }
}

/// Result of one successful channel collection.
#[derive(Debug, Clone)]
pub struct ChannelCollection {
    pub snapshot: LakeSnapshot,
    /// Items whose media could not be downloaded and were degraded to
    /// `has_media = false`.
    pub media_failures: usize,
}

/// A channel plus the number of recent items to collect from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelRequest {
    pub channel: ChannelIdentity,
    pub max_messages: usize,
}

/// Terminal outcome for one channel in a multi-channel run.
#[derive(Debug)]
pub struct ChannelOutcome {
    pub channel: ChannelIdentity,
    pub result: Result<ChannelCollection, CollectorError>,
}

impl ChannelOutcome {
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.result.is_ok()
    }
}

/// Pulls recent channel content from a [`MessageSource`] and writes one
/// snapshot per `(capture_date, channel)`.
///
/// A rate-limit signal suspends only the affected channel's task for the
/// requested duration; collection then resumes from the same cursor. Any
/// other fetch error fails the channel and no snapshot is written for it.
pub struct RateLimitedCollector<S> {
    source: S,
    settings: CollectorSettings,
}

impl<S: MessageSource> RateLimitedCollector<S> {
    pub fn new(source: S, settings: CollectorSettings) -> Self {
        Self { source, settings }
    }

    #[must_use]
    pub fn settings(&self) -> &CollectorSettings {
        &self.settings
    }

    /// Collects up to `max_messages` most recent items into today's partition.
    ///
    /// # Errors
    ///
    /// Returns [`CollectorError`] if the channel cannot be fetched, stays
    /// rate limited past the configured bound, or the snapshot cannot be
    /// written.
    pub async fn collect(
        &self,
        channel: &ChannelIdentity,
        max_messages: usize,
    ) -> Result<ChannelCollection, CollectorError> {
        self.collect_on(channel, max_messages, Utc::now().date_naive())
            .await
    }

    /// Like [`collect`](Self::collect) with an explicit partition date.
    ///
    /// # Errors
    ///
    /// See [`collect`](Self::collect).
    pub async fn collect_on(
        &self,
        channel: &ChannelIdentity,
        max_messages: usize,
        capture_date: NaiveDate,
    ) -> Result<ChannelCollection, CollectorError> {
        let mut budget = WaitBudget::new(self.settings.max_rate_limit_waits);
        let items = self.fetch_recent(channel, max_messages, &mut budget).await?;
        let (messages, media_failures) = self.materialize(channel, items, &mut budget).await;

        let count = messages.len();
        let snapshot =
            lake::write_snapshot(&self.settings.snapshots_root, capture_date, channel, messages)
                .await?;

        tracing::info!(
            channel = %channel,
            messages = count,
            media_failures,
            rate_limit_waits = budget.used(),
            path = %snapshot.path.display(),
            "channel snapshot written"
        );

        Ok(ChannelCollection {
            snapshot,
            media_failures,
        })
    }

    /// Pages backwards through the channel until `max_messages` items are held
    /// or the source runs dry.
    async fn fetch_recent(
        &self,
        channel: &ChannelIdentity,
        max_messages: usize,
        budget: &mut WaitBudget,
    ) -> Result<Vec<SourceMessage>, CollectorError> {
        let mut items: Vec<SourceMessage> = Vec::new();
        let mut seen: HashSet<i64> = HashSet::new();
        let mut cursor: Option<i64> = None;

        while items.len() < max_messages {
            let request = PageRequest {
                before_id: cursor,
                limit: (max_messages - items.len()).min(self.settings.page_size),
            };
            let page = suspend_while_rate_limited(channel.as_str(), budget, || {
                self.source.fetch_page(channel, request)
            })
            .await?;

            let received = page.len();
            let mut progressed = false;
            for item in page {
                if items.len() >= max_messages {
                    break;
                }
                if seen.insert(item.id) {
                    cursor = Some(cursor.map_or(item.id, |c| c.min(item.id)));
                    items.push(item);
                    progressed = true;
                }
            }

            tracing::debug!(
                channel = %channel,
                received,
                held = items.len(),
                before_id = ?request.before_id,
                "fetched page"
            );

            if received < request.limit || !progressed {
                break;
            }
        }

        Ok(items)
    }

    /// Downloads media and converts source items into lake records.
    async fn materialize(
        &self,
        channel: &ChannelIdentity,
        items: Vec<SourceMessage>,
        budget: &mut WaitBudget,
    ) -> (Vec<CollectedMessage>, usize) {
        let collected_at = Utc::now();
        let mut messages = Vec::with_capacity(items.len());
        let mut media_failures = 0usize;

        for item in items {
            let mut message = CollectedMessage::new(
                item.id,
                channel,
                item.date.unwrap_or(collected_at),
                item.text,
                item.views.unwrap_or(0),
                item.forwards.unwrap_or(0),
            );

            if let Some(media) = item.media {
                match self.download_media(channel, item.id, &media, budget).await {
                    Ok(path) => message = message.with_media(path.to_string_lossy()),
                    Err(e) => {
                        media_failures += 1;
                        tracing::warn!(
                            channel = %channel,
                            message_id = item.id,
                            error = %e,
                            "media download failed; keeping message without media"
                        );
                    }
                }
            }

            messages.push(message);
        }

        (messages, media_failures)
    }

    async fn download_media(
        &self,
        channel: &ChannelIdentity,
        message_id: i64,
        media: &crate::source::MediaRef,
        budget: &mut WaitBudget,
    ) -> Result<PathBuf, CollectorError> {
        let bytes = suspend_while_rate_limited(channel.as_str(), budget, || {
            self.source.fetch_media(channel, media)
        })
        .await?;
        let path = lake::write_media(&self.settings.images_root, channel, message_id, &bytes).await?;
        Ok(path)
    }

    /// Collects every requested channel with at most `max_concurrent` in
    /// flight. One channel's failure never affects another's.
    ///
    /// Outcomes are returned in request order.
    pub async fn collect_all(
        &self,
        requests: &[ChannelRequest],
        max_concurrent: usize,
        capture_date: NaiveDate,
    ) -> Vec<ChannelOutcome> {
        let mut indexed: Vec<(usize, ChannelOutcome)> = stream::iter(requests.iter().enumerate())
            .map(|(idx, req)| async move {
                let result = self
                    .collect_on(&req.channel, req.max_messages, capture_date)
                    .await;
                if let Err(e) = &result {
                    tracing::error!(channel = %req.channel, error = %e, "channel collection failed");
                }
                (
                    idx,
                    ChannelOutcome {
                        channel: req.channel.clone(),
                        result,
                    },
                )
            })
            .buffer_unordered(max_concurrent.max(1))
            .collect()
            .await;

        indexed.sort_by_key(|(idx, _)| *idx);
        let outcomes: Vec<ChannelOutcome> = indexed.into_iter().map(|(_, o)| o).collect();

        let failed = outcomes.iter().filter(|o| !o.succeeded()).count();
        if failed > 0 {
            tracing::warn!(
                failed_channels = failed,
                total_channels = outcomes.len(),
                "some channels failed during collection"
            );
        }

        outcomes
    }
}
