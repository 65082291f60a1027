use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use thiserror::Error;

use super::{FeedSource, MediaItem, MediaKind, Post, Timeline};
use crate::snowflake::Snowflake;

pub struct TwitterClient {
    client: Client,
    base_url: String,
    token: String,
    /// Posts per page. The API accepts 5..=100.
    pub limit: u8,
}

#[derive(Debug, Error)]
pub enum TwitterError {
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Scheme(#[from] serde_json::Error),
    #[error("API returned error {status}: {title}: {detail}")]
    Server {
        status: StatusCode,
        title: String,
        detail: String,
    },
    #[error(
        "ratelimited{}",
        .retry_after
            .map(|d| format!(" for {:.1} seconds", d.as_secs_f64()))
            .unwrap_or_default()
    )]
    RateLimited { retry_after: Option<Duration> },
}

#[derive(Deserialize)]
struct TimelineResponse {
    #[serde(default)]
    data: Vec<RawPost>,
    #[serde(default)]
    includes: Option<Includes>,
    #[serde(default)]
    errors: Vec<Problem>,
}
#[derive(Deserialize)]
struct RawPost {
    id: Snowflake,
    text: String,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    referenced_tweets: Vec<Reference>,
    #[serde(default)]
    attachments: Option<Attachments>,
}
#[derive(Deserialize)]
struct Reference {
    #[allow(dead_code)]
    r#type: String,
}
#[derive(Deserialize)]
struct Attachments {
    #[serde(default)]
    media_keys: Vec<String>,
}
#[derive(Deserialize)]
struct Includes {
    #[serde(default)]
    media: Vec<RawMedia>,
}
#[derive(Deserialize)]
struct RawMedia {
    media_key: String,
    r#type: String,
    #[serde(default)]
    url: Option<String>,
}
#[derive(Deserialize, Default)]
struct Problem {
    #[serde(default)]
    title: String,
    #[serde(default)]
    detail: String,
}

impl TwitterClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            token: token.into(),
            limit: 5,
        }
    }

    pub fn with_limit(mut self, limit: u8) -> Self {
        self.limit = limit;
        self
    }
}

fn retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    let reset: i64 = headers
        .get("x-rate-limit-reset")?
        .to_str()
        .ok()?
        .parse()
        .ok()?;
    let wait = reset - Utc::now().timestamp();
    Some(Duration::from_secs(wait.max(0).unsigned_abs()))
}

#[async_trait]
impl FeedSource for TwitterClient {
    async fn fetch_posts(&self, user_id: &str) -> Result<Timeline, TwitterError> {
        let res = self
            .client
            .get(format!("{}/2/users/{user_id}/tweets", self.base_url))
            .bearer_auth(&self.token)
            .query(&[
                ("max_results", self.limit.to_string().as_str()),
                ("tweet.fields", "created_at,referenced_tweets,attachments"),
                ("expansions", "attachments.media_keys"),
                ("media.fields", "url,type"),
            ])
            .send()
            .await?;

        let status = res.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(TwitterError::RateLimited {
                retry_after: retry_after(res.headers()),
            });
        }

        let body = res.text().await?;
        if !status.is_success() {
            let Problem { title, detail } = serde_json::from_str(&body).unwrap_or_default();
            return Err(TwitterError::Server {
                status,
                title,
                detail,
            });
        }

        let raw: TimelineResponse = serde_json::from_str(&body)?;
        if raw.data.is_empty() {
            if let Some(Problem { title, detail }) = raw.errors.into_iter().next() {
                return Err(TwitterError::Server {
                    status,
                    title,
                    detail,
                });
            }
        }

        let media = raw
            .includes
            .map(|i| i.media)
            .unwrap_or_default()
            .into_iter()
            .map(|m| {
                let kind = match m.r#type.as_str() {
                    "photo" => MediaKind::Photo,
                    _ => MediaKind::Other,
                };
                (
                    m.media_key.clone(),
                    MediaItem {
                        key: m.media_key,
                        kind,
                        url: m.url,
                    },
                )
            })
            .collect();

        let posts = raw
            .data
            .into_iter()
            .map(|p| Post {
                id: p.id,
                text: p.text,
                created_at: p.created_at,
                is_reply_or_repost: !p.referenced_tweets.is_empty(),
                media_keys: p.attachments.map(|a| a.media_keys).unwrap_or_default(),
            })
            .collect();

        Ok(Timeline { posts, media })
    }
}
