use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Opaque handle to a source channel, taken verbatim from configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelIdentity(String);

impl ChannelIdentity {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ChannelIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(&self.0)
    }
}

impl From<&str> for ChannelIdentity {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// One collected message as it is stored in a lake snapshot.
///
/// Field names on the wire follow the snapshot file format
/// (`message_date`, `message_text`, `image_path`, `views`, `forwards`), which
/// is also the warehouse column naming consumed downstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectedMessage {
    /// Source-assigned id, unique within a channel.
    pub message_id: i64,
    pub channel_name: String,
    /// Timestamp recorded for the message at collection time: the source's
    /// post time when it reports one, otherwise the collection instant.
    #[serde(rename = "message_date")]
    pub captured_at: DateTime<Utc>,
    #[serde(rename = "message_text", default)]
    pub text: Option<String>,
    #[serde(default)]
    pub has_media: bool,
    /// Set iff `has_media`; relative or absolute path of the downloaded media.
    #[serde(rename = "image_path", default)]
    pub media_path: Option<String>,
    #[serde(rename = "views", default, deserialize_with = "null_as_zero")]
    pub view_count: i64,
    #[serde(rename = "forwards", default, deserialize_with = "null_as_zero")]
    pub forward_count: i64,
}

fn null_as_zero<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<i64>::deserialize(deserializer)?.unwrap_or_default())
}

impl CollectedMessage {
    /// Builds a message without media. Negative counters are clamped to zero.
    #[must_use]
    pub fn new(
        message_id: i64,
        channel: &ChannelIdentity,
        captured_at: DateTime<Utc>,
        text: Option<String>,
        view_count: i64,
        forward_count: i64,
    ) -> Self {
        Self {
            message_id,
            channel_name: channel.as_str().to_string(),
            captured_at,
            text,
            has_media: false,
            media_path: None,
            view_count: view_count.max(0),
            forward_count: forward_count.max(0),
        }
    }

    /// Attaches successfully downloaded media.
    #[must_use]
    pub fn with_media(mut self, media_path: impl Into<String>) -> Self {
        self.has_media = true;
        self.media_path = Some(media_path.into());
        self
    }

    /// Returns `true` when `has_media` and `media_path` agree.
    #[must_use]
    pub fn media_is_consistent(&self) -> bool {
        self.has_media == self.media_path.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> CollectedMessage {
        CollectedMessage::new(
            42,
            &ChannelIdentity::new("tikvahpharma"),
            Utc.with_ymd_and_hms(2025, 1, 14, 9, 30, 0).unwrap(),
            Some("Paracetamol 500mg in stock".to_string()),
            1200,
            3,
        )
    }

    #[test]
    fn serializes_with_snapshot_field_names() {
        let value = serde_json::to_value(sample().with_media("data/raw/images/tikvahpharma/42.jpg"))
            .unwrap();
        assert_eq!(value["message_id"], 42);
        assert_eq!(value["channel_name"], "tikvahpharma");
        assert_eq!(value["message_date"], "2025-01-14T09:30:00Z");
        assert_eq!(value["message_text"], "Paracetamol 500mg in stock");
        assert_eq!(value["has_media"], true);
        assert_eq!(value["image_path"], "data/raw/images/tikvahpharma/42.jpg");
        assert_eq!(value["views"], 1200);
        assert_eq!(value["forwards"], 3);
    }

    #[test]
    fn counters_default_to_zero_when_absent() {
        let msg: CollectedMessage = serde_json::from_str(
            r#"{"message_id": 7, "channel_name": "EAHPA", "message_date": "2025-01-14T09:30:00+03:00"}"#,
        )
        .unwrap();
        assert_eq!(msg.view_count, 0);
        assert_eq!(msg.forward_count, 0);
        assert!(!msg.has_media);
        assert!(msg.text.is_none());
        assert_eq!(msg.captured_at.to_rfc3339(), "2025-01-14T06:30:00+00:00");
    }

    #[test]
    fn null_counters_read_as_zero() {
        let msg: CollectedMessage = serde_json::from_str(
            r#"{"message_id": 8, "channel_name": "EAHPA", "message_date": "2025-01-14T09:30:00Z",
                "views": null, "forwards": null}"#,
        )
        .unwrap();
        assert_eq!(msg.view_count, 0);
        assert_eq!(msg.forward_count, 0);
    }

    #[test]
    fn negative_counters_are_clamped() {
        let msg = CollectedMessage::new(
            1,
            &ChannelIdentity::new("EAHPA"),
            Utc::now(),
            None,
            -5,
            -1,
        );
        assert_eq!(msg.view_count, 0);
        assert_eq!(msg.forward_count, 0);
    }

    #[test]
    fn media_consistency() {
        assert!(sample().media_is_consistent());
        assert!(sample().with_media("x.jpg").media_is_consistent());
        let mut broken = sample();
        broken.has_media = true;
        assert!(!broken.media_is_consistent());
    }
}
