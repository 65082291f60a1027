use std::{future::Future, time::Duration};

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::{snowflake::Snowflake, sources::Post};

/// Embed colour used for relayed posts.
pub const EMBED_BLUE: u32 = 0x3498db;
/// Reactions added to every relayed post, in order.
pub const POST_REACTIONS: [&str; 3] = ["❤️", "🔁", "🔴"];
/// Longest server-requested wait honoured by [`retry_ratelimited`].
pub const MAX_RETRY_WAIT: Duration = Duration::from_secs(60);
/// Assumed wait when a 429 carries no readable `retry_after`.
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(5);

/// Channel operations the background loops need from the chat platform.
#[async_trait]
pub trait ChatTarget: Send + Sync {
    /// Fails with [`DiscordError::NotFound`] unless `channel_id` exists and
    /// belongs to `guild_id`.
    async fn guild_channel(&self, guild_id: u64, channel_id: u64) -> Result<(), DiscordError>;
    async fn rename_channel(&self, channel_id: u64, name: &str) -> Result<(), DiscordError>;
    /// Returns the created message id.
    async fn send_post(&self, channel_id: u64, message: &PostMessage)
        -> Result<u64, DiscordError>;
    async fn add_reaction(
        &self,
        channel_id: u64,
        message_id: u64,
        emoji: &str,
    ) -> Result<(), DiscordError>;
}

/// Runs `op`, and once more after the requested wait if it was rate limited.
/// Waits longer than [`MAX_RETRY_WAIT`] are returned as errors instead.
pub async fn retry_ratelimited<T, F, Fut>(mut op: F) -> Result<T, DiscordError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, DiscordError>>,
{
    match op().await {
        Err(DiscordError::RateLimited { timeout }) if timeout <= MAX_RETRY_WAIT => {
            warn!("Ratelimited, retrying in {:.1} seconds", timeout.as_secs_f64());
            tokio::time::sleep(timeout).await;
            op().await
        }
        res => res,
    }
}

pub struct DiscordClient {
    client: Client,
    base_url: String,
    token: String,
}

#[derive(Debug, Error)]
pub enum DiscordError {
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Scheme(#[from] serde_json::Error),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("API returned error {status} (code {code}): {message}")]
    Server {
        status: StatusCode,
        code: u32,
        message: String,
    },
    #[error("ratelimited for {:.1} seconds", .timeout.as_secs_f64())]
    RateLimited { timeout: Duration },
}

/// Relay message: one embed plus a row of link buttons.
#[derive(Debug, Clone, PartialEq)]
pub struct PostMessage {
    pub title: String,
    pub description: String,
    pub url: String,
    pub footer: String,
    pub image: Option<String>,
    pub buttons: Vec<LinkButton>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinkButton {
    pub label: String,
    pub url: String,
}

#[derive(Serialize)]
struct CreateMessage<'a> {
    embeds: [Embed<'a>; 1],
    components: Vec<ActionRow<'a>>,
}
#[derive(Serialize)]
struct Embed<'a> {
    title: &'a str,
    description: &'a str,
    url: &'a str,
    color: u32,
    footer: Footer<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<Image<'a>>,
}
#[derive(Serialize)]
struct Footer<'a> {
    text: &'a str,
}
#[derive(Serialize)]
struct Image<'a> {
    url: &'a str,
}
#[derive(Serialize)]
struct ActionRow<'a> {
    r#type: u8,
    components: Vec<Button<'a>>,
}
#[derive(Serialize)]
struct Button<'a> {
    r#type: u8,
    style: u8,
    label: &'a str,
    url: &'a str,
}

#[derive(Serialize)]
struct ModifyChannel<'a> {
    name: &'a str,
}

#[derive(Deserialize)]
struct Channel {
    #[serde(default)]
    guild_id: Option<Snowflake>,
}
#[derive(Deserialize)]
struct Message {
    id: Snowflake,
}
#[derive(Deserialize, Default)]
struct ApiError {
    #[serde(default)]
    code: u32,
    #[serde(default)]
    message: String,
}
#[derive(Deserialize)]
struct RateLimit {
    retry_after: f64,
}

impl PostMessage {
    /// Builds the relay message for a post of `username`, optionally showing
    /// `photo` as the embed image.
    pub fn by_post(post: &Post, photo: Option<&str>, username: &str) -> Self {
        let url = format!("https://twitter.com/{username}/status/{}", post.id);

        Self {
            title: "📢 New tweet!".to_owned(),
            description: post.text.clone(),
            footer: username.to_owned(),
            image: photo.map(str::to_owned),
            buttons: vec![
                LinkButton {
                    label: "Open in Twitter".to_owned(),
                    url: url.clone(),
                },
                LinkButton {
                    label: "🔁 Retweet".to_owned(),
                    url: format!("https://twitter.com/intent/retweet?tweet_id={}", post.id),
                },
            ],
            url,
        }
    }

    fn as_request(&self) -> CreateMessage<'_> {
        CreateMessage {
            embeds: [Embed {
                title: &self.title,
                description: &self.description,
                url: &self.url,
                color: EMBED_BLUE,
                footer: Footer { text: &self.footer },
                image: self.image.as_deref().map(|url| Image { url }),
            }],
            components: vec![ActionRow {
                r#type: 1,
                components: self
                    .buttons
                    .iter()
                    .map(|b| Button {
                        r#type: 2,
                        style: 5,
                        label: &b.label,
                        url: &b.url,
                    })
                    .collect(),
            }],
        }
    }
}

impl DiscordClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            token: token.into(),
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{path}", self.base_url))
            .header("Authorization", format!("Bot {}", self.token))
    }

    /// Sends the request and returns the body of a successful response.
    async fn execute(&self, req: RequestBuilder) -> Result<String, DiscordError> {
        let res = req.send().await?;
        let status = res.status();
        let body = res.text().await?;

        if status.is_success() {
            return Ok(body);
        }
        if status == StatusCode::TOO_MANY_REQUESTS {
            let timeout = match serde_json::from_str::<RateLimit>(&body) {
                Ok(RateLimit { retry_after }) => {
                    Duration::try_from_secs_f64(retry_after.max(0.0)).unwrap_or(Duration::MAX)
                }
                Err(_) => DEFAULT_RETRY_AFTER,
            };
            return Err(DiscordError::RateLimited { timeout });
        }

        let ApiError { code, message } = serde_json::from_str(&body).unwrap_or_default();
        if status == StatusCode::NOT_FOUND {
            Err(DiscordError::NotFound(message))
        } else {
            Err(DiscordError::Server {
                status,
                code,
                message,
            })
        }
    }
}

#[async_trait]
impl ChatTarget for DiscordClient {
    async fn guild_channel(&self, guild_id: u64, channel_id: u64) -> Result<(), DiscordError> {
        let body = self
            .execute(self.request(Method::GET, &format!("/channels/{channel_id}")))
            .await?;
        let channel: Channel = serde_json::from_str(&body)?;

        match channel.guild_id {
            Some(id) if id == guild_id => Ok(()),
            _ => Err(DiscordError::NotFound(format!(
                "channel {channel_id} is not in guild {guild_id}"
            ))),
        }
    }

    async fn rename_channel(&self, channel_id: u64, name: &str) -> Result<(), DiscordError> {
        self.execute(
            self.request(Method::PATCH, &format!("/channels/{channel_id}"))
                .json(&ModifyChannel { name }),
        )
        .await
        .map(drop)
    }

    async fn send_post(
        &self,
        channel_id: u64,
        message: &PostMessage,
    ) -> Result<u64, DiscordError> {
        let body = self
            .execute(
                self.request(Method::POST, &format!("/channels/{channel_id}/messages"))
                    .json(&message.as_request()),
            )
            .await?;
        let Message { id } = serde_json::from_str(&body)?;

        id.as_number()
            .ok_or_else(|| DiscordError::NotFound(format!("message id {id} is not numeric")))
    }

    async fn add_reaction(
        &self,
        channel_id: u64,
        message_id: u64,
        emoji: &str,
    ) -> Result<(), DiscordError> {
        let path = format!(
            "/channels/{channel_id}/messages/{message_id}/reactions/{}/@me",
            urlencoding::encode(emoji)
        );
        self.execute(self.request(Method::PUT, &path).header("Content-Length", "0"))
            .await
            .map(drop)
    }
}
