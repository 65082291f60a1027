use async_trait::async_trait;
use rust_decimal::Decimal;

pub mod coingecko;
mod source;
pub mod twitter;

pub use source::{MediaItem, MediaKind, Post, Timeline};

use self::{coingecko::PriceError, twitter::TwitterError};

/// Quote for one fixed asset/currency pair.
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Current price, rounded to 2 fractional digits.
    async fn fetch_price(&self) -> Result<Decimal, PriceError>;
}

/// Recent posts of a single account.
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch_posts(&self, user_id: &str) -> Result<Timeline, TwitterError>;
}
