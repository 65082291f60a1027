use std::{collections::HashMap, sync::Arc};

use anyhow::Context;
use async_trait::async_trait;
use tracing::{debug, error, info};

use crate::{
    discord::{retry_ratelimited, ChatTarget, PostMessage, POST_REACTIONS},
    error::CycleError,
    scheduler::Cycle,
    snowflake::Snowflake,
    sources::{FeedSource, MediaItem, Post},
    store::{CursorKind, CursorStore},
};

/// A post selected for relay, with its resolved photo.
#[derive(Debug)]
pub struct Relayed<'a> {
    pub post: &'a Post,
    pub photo: Option<&'a str>,
}

#[derive(Debug)]
pub struct RelayPlan<'a> {
    /// Oldest first.
    pub to_send: Vec<Relayed<'a>>,
    /// Highest relayed id, or the input cursor when nothing qualifies.
    pub cursor: Option<Snowflake>,
}

/// Selects the posts newer than `cursor`, oldest first.
///
/// `posts` is expected newest first, as the feed returns it. Replies and
/// reposts are skipped without touching the cursor. Each candidate is
/// compared against the running cursor, so the result is strictly
/// increasing by id even if the feed order is off.
pub fn relay<'a>(
    posts: &'a [Post],
    media: &'a HashMap<String, MediaItem>,
    cursor: Option<&Snowflake>,
) -> RelayPlan<'a> {
    let mut cursor = cursor.cloned();
    let mut to_send = Vec::new();

    for post in posts.iter().rev() {
        if post.is_reply_or_repost {
            continue;
        }
        if cursor.as_ref().is_some_and(|c| post.id <= *c) {
            continue;
        }

        cursor = Some(post.id.clone());
        to_send.push(Relayed {
            post,
            photo: post.photo(media),
        });
    }

    RelayPlan { to_send, cursor }
}

/// Feed relay loop state: the adapters plus the in-memory cursor.
pub struct FeedRelay {
    feed: Arc<dyn FeedSource>,
    chat: Arc<dyn ChatTarget>,
    store: CursorStore,

    guild_id: u64,
    channel_id: u64,
    user_id: Option<String>,
    username: String,

    cursor: Option<Snowflake>,
}

impl FeedRelay {
    /// Restores the cursor from `store`.
    pub fn new(
        feed: Arc<dyn FeedSource>,
        chat: Arc<dyn ChatTarget>,
        store: CursorStore,
        guild_id: u64,
        channel_id: u64,
        user_id: Option<String>,
        username: String,
    ) -> Self {
        let cursor = store.load(CursorKind::Post);
        Self {
            feed,
            chat,
            store,
            guild_id,
            channel_id,
            user_id,
            username,
            cursor,
        }
    }

    pub fn cursor(&self) -> Option<&Snowflake> {
        self.cursor.as_ref()
    }

    fn user_id(&self) -> Result<&str, CycleError> {
        self.user_id
            .as_deref()
            .ok_or_else(|| CycleError::TargetMissing("TWITTER_USER_ID is not set".to_owned()))
    }

    /// Fetches once and relays every new post. Returns how many were sent.
    ///
    /// The cursor is persisted after each post's message and reactions
    /// succeed. A rate limited call is retried once; the first failure
    /// aborts the rest of the batch.
    pub async fn run_cycle(&mut self) -> Result<usize, CycleError> {
        let timeline = self.feed.fetch_posts(self.user_id()?).await?;

        let plan = relay(&timeline.posts, &timeline.media, self.cursor.as_ref());
        if plan.to_send.is_empty() {
            info!(fetched = timeline.posts.len(), "No new posts");
            return Ok(0);
        }

        self.chat.guild_channel(self.guild_id, self.channel_id).await?;

        let chat = &self.chat;
        let channel_id = self.channel_id;
        let mut sent = 0;
        for Relayed { post, photo } in plan.to_send {
            let message = PostMessage::by_post(post, photo, &self.username);
            let message = &message;
            let message_id = retry_ratelimited(|| chat.send_post(channel_id, message)).await?;
            for emoji in POST_REACTIONS {
                retry_ratelimited(|| chat.add_reaction(channel_id, message_id, emoji)).await?;
            }

            self.cursor = Some(post.id.clone());
            if let Err(e) = self.store.save(CursorKind::Post, &post.id) {
                error!(post_id = %post.id, "Failed to persist post cursor: {e}");
            }
            sent += 1;
            info!(post_id = %post.id, message_id, "Relayed post");
        }

        Ok(sent)
    }

    /// Advances and persists the cursor to the newest eligible post without
    /// relaying anything.
    pub async fn populate(&mut self) -> anyhow::Result<Option<Snowflake>> {
        let timeline = self.feed.fetch_posts(self.user_id()?).await?;
        let plan = relay(&timeline.posts, &timeline.media, self.cursor.as_ref());
        debug!(skipped = plan.to_send.len(), "Populating post cursor");

        if plan.cursor != self.cursor {
            if let Some(id) = &plan.cursor {
                self.store
                    .save(CursorKind::Post, id)
                    .context("Failed to persist post cursor")?;
            }
            self.cursor = plan.cursor;
        }

        Ok(self.cursor.clone())
    }
}

#[async_trait]
impl Cycle for FeedRelay {
    async fn run(&mut self) -> Result<(), CycleError> {
        self.run_cycle().await.map(drop)
    }
}
