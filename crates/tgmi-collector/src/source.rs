//! The external messaging source as seen by the collector.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tgmi_core::ChannelIdentity;

use crate::error::SourceError;

/// Reference to a media blob attached to a message.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MediaRef {
    /// Source-side identifier used to download the blob.
    pub file_id: String,
}

/// One content item as returned by the source, before it is written to the lake.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SourceMessage {
    pub id: i64,
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub media: Option<MediaRef>,
    #[serde(default)]
    pub views: Option<i64>,
    #[serde(default)]
    pub forwards: Option<i64>,
}

/// Cursor for one page of a channel's history.
///
/// Pages run newest-first; `before_id` asks for items strictly older than the
/// last one already seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub before_id: Option<i64>,
    pub limit: usize,
}

/// A source of channel content.
///
/// Implementations report a back-off request as
/// [`SourceError::RateLimited`]; the collector owns the waiting.
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Returns up to `request.limit` items, newest first.
    async fn fetch_page(
        &self,
        channel: &ChannelIdentity,
        request: PageRequest,
    ) -> Result<Vec<SourceMessage>, SourceError>;

    /// Downloads the blob behind `media`.
    async fn fetch_media(
        &self,
        channel: &ChannelIdentity,
        media: &MediaRef,
    ) -> Result<Vec<u8>, SourceError>;
}

#[async_trait]
impl<T: MessageSource + ?Sized> MessageSource for std::sync::Arc<T> {
    async fn fetch_page(
        &self,
        channel: &ChannelIdentity,
        request: PageRequest,
    ) -> Result<Vec<SourceMessage>, SourceError> {
        (**self).fetch_page(channel, request).await
    }

    async fn fetch_media(
        &self,
        channel: &ChannelIdentity,
        media: &MediaRef,
    ) -> Result<Vec<u8>, SourceError> {
        (**self).fetch_media(channel, media).await
    }
}
