//! HTTP implementation of [`MessageSource`] for the channel bridge API.
//!
//! Endpoints:
//!
//! - `GET {base}/channels/{channel}/messages?limit=N[&before_id=X]` returns
//!   `{"messages": [...]}` newest first.
//! - `GET {base}/media/{file_id}` returns the raw blob.

use std::time::Duration;

use async_trait::async_trait;
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use tgmi_core::{AppConfig, ChannelIdentity};

use crate::error::SourceError;
use crate::rate_limit::retry_with_backoff;
use crate::source::{MediaRef, MessageSource, PageRequest, SourceMessage};

/// Wait applied when a 429 carries no usable `Retry-After` header.
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

#[derive(Debug, Deserialize)]
struct MessagesPage {
    #[serde(default)]
    messages: Vec<SourceMessage>,
}

/// Source client over HTTP.
///
/// 429 responses become [`SourceError::RateLimited`] and are never retried
/// here. Timeouts, connection failures, and 5xx responses are retried with
/// jittered exponential backoff up to `max_retries` extra attempts.
pub struct HttpMessageSource {
    client: Client,
    base_url: String,
    api_token: Option<String>,
    max_retries: u32,
    backoff_base_ms: u64,
}

impl HttpMessageSource {
    /// # Errors
    ///
    /// Returns [`SourceError::InvalidUrl`] if `base_url` does not parse, or
    /// [`SourceError::Http`] if the client cannot be built.
    pub fn new(
        base_url: &str,
        api_token: Option<String>,
        timeout_secs: u64,
        user_agent: &str,
        max_retries: u32,
        backoff_base_ms: u64,
    ) -> Result<Self, SourceError> {
        reqwest::Url::parse(base_url).map_err(|e| SourceError::InvalidUrl {
            url: base_url.to_owned(),
            reason: e.to_string(),
        })?;

        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(user_agent)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
            api_token,
            max_retries,
            backoff_base_ms,
        })
    }

    /// Builds a source from the collector settings in [`AppConfig`].
    ///
    /// # Errors
    ///
    /// See [`HttpMessageSource::new`].
    pub fn from_app_config(config: &AppConfig) -> Result<Self, SourceError> {
        Self::new(
            &config.source_base_url,
            config.source_api_token.clone(),
            config.collector_request_timeout_secs,
            &config.collector_user_agent,
            config.collector_max_retries,
            config.collector_retry_backoff_base_ms,
        )
    }

    fn messages_url(&self, channel: &ChannelIdentity, request: PageRequest) -> String {
        let encoded = utf8_percent_encode(channel.as_str(), NON_ALPHANUMERIC);
        let mut url = format!(
            "{}/channels/{encoded}/messages?limit={}",
            self.base_url, request.limit
        );
        if let Some(before_id) = request.before_id {
            url.push_str(&format!("&before_id={before_id}"));
        }
        url
    }

    fn media_url(&self, media: &MediaRef) -> String {
        let encoded = utf8_percent_encode(&media.file_id, NON_ALPHANUMERIC);
        format!("{}/media/{encoded}", self.base_url)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Maps non-success statuses onto typed errors.
    fn check_status(
        response: Response,
        channel: &ChannelIdentity,
        url: &str,
    ) -> Result<Response, SourceError> {
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.trim().parse::<u64>().ok())
                .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
            return Err(SourceError::RateLimited {
                channel: channel.to_string(),
                retry_after_secs,
            });
        }

        if status == StatusCode::NOT_FOUND {
            return Err(SourceError::ChannelNotFound {
                channel: channel.to_string(),
            });
        }

        if !status.is_success() {
            return Err(SourceError::UnexpectedStatus {
                status: status.as_u16(),
                url: url.to_owned(),
            });
        }

        Ok(response)
    }
}

#[async_trait]
impl MessageSource for HttpMessageSource {
    async fn fetch_page(
        &self,
        channel: &ChannelIdentity,
        request: PageRequest,
    ) -> Result<Vec<SourceMessage>, SourceError> {
        let url = self.messages_url(channel, request);

        retry_with_backoff(self.max_retries, self.backoff_base_ms, || {
            let url = url.clone();
            async move {
                let response = self
                    .authorized(self.client.get(&url))
                    .header(reqwest::header::ACCEPT, "application/json")
                    .send()
                    .await?;
                let response = Self::check_status(response, channel, &url)?;

                let body = response.text().await?;
                let page = serde_json::from_str::<MessagesPage>(&body).map_err(|e| {
                    SourceError::Deserialize {
                        context: format!("messages page for {channel}"),
                        source: e,
                    }
                })?;
                Ok(page.messages)
            }
        })
        .await
    }

    async fn fetch_media(
        &self,
        channel: &ChannelIdentity,
        media: &MediaRef,
    ) -> Result<Vec<u8>, SourceError> {
        let url = self.media_url(media);

        retry_with_backoff(self.max_retries, self.backoff_base_ms, || {
            let url = url.clone();
            async move {
                let response = self.authorized(self.client.get(&url)).send().await?;
                let response = Self::check_status(response, channel, &url)?;
                Ok(response.bytes().await?.to_vec())
            }
        })
        .await
    }
}
