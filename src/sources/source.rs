use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::snowflake::Snowflake;

/// Foreign post, as fetched from the feed.
#[derive(Debug, Clone)]
pub struct Post {
    /// Post ID. Unique and ordered by publication.
    pub id: Snowflake,
    /// Post text. May be empty
    pub text: String,
    pub created_at: Option<DateTime<Utc>>,
    /// Set when the post replies to, quotes or reposts another post.
    pub is_reply_or_repost: bool,
    /// Keys into [`Timeline::media`], in attachment order.
    pub media_keys: Vec<String>,
}

/// Foreign media info
#[derive(Debug, Clone)]
pub struct MediaItem {
    pub key: String,
    pub kind: MediaKind,
    /// Only photos are guaranteed to carry a URL.
    pub url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    /// JPEG, PNG, etc. NOT GIF
    Photo,
    /// Videos, animated GIFs and anything else.
    Other,
}

/// One page of a user's posts plus the media they reference.
#[derive(Debug, Clone, Default)]
pub struct Timeline {
    /// Newest first, as the feed returns them.
    pub posts: Vec<Post>,
    pub media: HashMap<String, MediaItem>,
}

impl Post {
    /// First attached photo that resolves to a URL. Photos without one are
    /// skipped.
    pub fn photo<'a>(&self, media: &'a HashMap<String, MediaItem>) -> Option<&'a str> {
        self.media_keys
            .iter()
            .filter_map(|key| media.get(key))
            .filter(|m| m.kind == MediaKind::Photo)
            .find_map(|m| m.url.as_deref())
    }
}
