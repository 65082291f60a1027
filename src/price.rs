use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::{error, info};

use crate::{
    discord::ChatTarget,
    error::CycleError,
    namer::{compute_label, Direction},
    scheduler::Cycle,
    sources::PriceSource,
    store::{CursorKind, CursorStore},
};

/// Price loop state: renames the price channel after every successful fetch.
pub struct PriceUpdater {
    price: Arc<dyn PriceSource>,
    chat: Arc<dyn ChatTarget>,
    store: CursorStore,

    guild_id: u64,
    channel_id: u64,

    previous: Option<Decimal>,
}

impl PriceUpdater {
    /// Restores the previous price from `store`.
    pub fn new(
        price: Arc<dyn PriceSource>,
        chat: Arc<dyn ChatTarget>,
        store: CursorStore,
        guild_id: u64,
        channel_id: u64,
    ) -> Self {
        let previous = store.load(CursorKind::Price);
        Self {
            price,
            chat,
            store,
            guild_id,
            channel_id,
            previous,
        }
    }

    pub fn previous(&self) -> Option<Decimal> {
        self.previous
    }

    pub async fn run_cycle(&mut self) -> Result<Direction, CycleError> {
        let current = self.price.fetch_price().await?;
        self.chat.guild_channel(self.guild_id, self.channel_id).await?;

        let (label, direction) = compute_label(current, self.previous);
        self.chat.rename_channel(self.channel_id, &label).await?;
        info!(%direction, "Price channel renamed to {label}");

        self.previous = Some(current);
        if let Err(e) = self.store.save(CursorKind::Price, format!("{current:.2}")) {
            error!("Failed to persist price: {e}");
        }

        Ok(direction)
    }
}

#[async_trait]
impl Cycle for PriceUpdater {
    async fn run(&mut self) -> Result<(), CycleError> {
        self.run_cycle().await.map(drop)
    }
}

#[cfg(test)]
mod tests {
    use std::{str::FromStr, sync::Mutex};

    use tempfile::TempDir;

    use super::*;
    use crate::{
        discord::{DiscordError, PostMessage},
        sources::coingecko::PriceError,
    };

    struct FixedPrice(Option<&'static str>);

    #[async_trait]
    impl PriceSource for FixedPrice {
        async fn fetch_price(&self) -> Result<Decimal, PriceError> {
            self.0
                .map(|p| Decimal::from_str(p).unwrap())
                .ok_or(PriceError::Value(f64::NAN))
        }
    }

    #[derive(Default)]
    struct Channel {
        names: Mutex<Vec<String>>,
        rate_limited: bool,
        in_guild: bool,
    }

    #[async_trait]
    impl ChatTarget for Channel {
        async fn guild_channel(&self, _: u64, channel_id: u64) -> Result<(), DiscordError> {
            if self.in_guild {
                Ok(())
            } else {
                Err(DiscordError::NotFound(format!("channel {channel_id}")))
            }
        }
        async fn rename_channel(&self, _: u64, name: &str) -> Result<(), DiscordError> {
            if self.rate_limited {
                return Err(DiscordError::RateLimited {
                    timeout: std::time::Duration::from_secs(600),
                });
            }
            self.names.lock().unwrap().push(name.to_owned());
            Ok(())
        }
        async fn send_post(&self, _: u64, _: &PostMessage) -> Result<u64, DiscordError> {
            unreachable!()
        }
        async fn add_reaction(&self, _: u64, _: u64, _: &str) -> Result<(), DiscordError> {
            unreachable!()
        }
    }

    fn store(dir: &TempDir) -> CursorStore {
        CursorStore::new(dir.path().join("price.txt"), dir.path().join("post.txt"))
    }

    fn channel() -> Arc<Channel> {
        Arc::new(Channel {
            in_guild: true,
            ..Channel::default()
        })
    }

    #[tokio::test]
    async fn first_cycle_is_initial_and_persists() {
        let dir = TempDir::new().unwrap();
        let chat = channel();
        let price = Arc::new(FixedPrice(Some("67890.12")));
        let mut updater = PriceUpdater::new(price, chat.clone(), store(&dir), 1, 2);

        assert_eq!(updater.run_cycle().await.unwrap(), Direction::Initial);
        assert_eq!(*chat.names.lock().unwrap(), ["🟡 BTC: $ 67890.12"]);
        assert_eq!(std::fs::read_to_string(dir.path().join("price.txt")).unwrap(), "67890.12");
    }

    #[tokio::test]
    async fn unchanged_price_is_flat() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("price.txt"), "30000.00").unwrap();
        let chat = channel();
        let price = Arc::new(FixedPrice(Some("30000.00")));
        let mut updater = PriceUpdater::new(price, chat.clone(), store(&dir), 1, 2);

        assert_eq!(updater.run_cycle().await.unwrap(), Direction::Flat);
        assert_eq!(*chat.names.lock().unwrap(), ["⚪ BTC: $ 30000.00"]);
    }

    #[tokio::test]
    async fn rate_limit_keeps_previous_price() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("price.txt"), "30000").unwrap();
        let chat = Arc::new(Channel {
            rate_limited: true,
            in_guild: true,
            ..Channel::default()
        });
        let mut updater =
            PriceUpdater::new(Arc::new(FixedPrice(Some("31000"))), chat, store(&dir), 1, 2);

        assert_eq!(updater.run_cycle().await.unwrap_err().kind(), "rate_limited");
        assert_eq!(updater.previous(), Some(Decimal::from(30000)));
    }

    #[tokio::test]
    async fn missing_channel_aborts_before_rename() {
        let dir = TempDir::new().unwrap();
        let chat = Arc::new(Channel::default());
        let mut updater =
            PriceUpdater::new(Arc::new(FixedPrice(Some("1"))), chat.clone(), store(&dir), 1, 2);

        assert_eq!(updater.run_cycle().await.unwrap_err().kind(), "target_missing");
        assert!(chat.names.lock().unwrap().is_empty());
        assert_eq!(updater.previous(), None);
    }

    #[tokio::test]
    async fn source_failure_skips_cycle() {
        let dir = TempDir::new().unwrap();
        let chat = channel();
        let price = Arc::new(FixedPrice(None));
        let mut updater = PriceUpdater::new(price, chat.clone(), store(&dir), 1, 2);

        assert_eq!(updater.run_cycle().await.unwrap_err().kind(), "source_unavailable");
        assert!(chat.names.lock().unwrap().is_empty());
        assert!(!dir.path().join("price.txt").exists());
    }
}
