use std::{env, path::PathBuf, time::Duration};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing environment variables: {}", .0.join(", "))]
    Missing(Vec<&'static str>),
    #[error("invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub discord_token: String,
    pub guild_id: u64,
    pub price_channel_id: u64,
    pub feed_channel_id: u64,

    pub twitter_token: String,
    pub twitter_user_id: Option<String>,
    pub twitter_username: String,
    pub feed_page_size: u8,

    pub price_command_channel_id: u64,
    pub roll_command_channel_id: u64,

    pub price_interval: Duration,
    pub feed_interval: Duration,

    pub price_cursor_path: PathBuf,
    pub post_cursor_path: PathBuf,

    pub background_path: PathBuf,
    pub font_path: PathBuf,
    pub price_image_path: PathBuf,

    pub log_file: PathBuf,
    pub port: u16,

    pub coingecko_api_url: String,
    pub twitter_api_url: String,
    pub discord_api_url: String,
}

/// Collects every missing required name instead of stopping at the first.
struct Reader<F> {
    lookup: F,
    missing: Vec<&'static str>,
}

impl<F: Fn(&str) -> Option<String>> Reader<F> {
    fn optional(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.trim().is_empty())
    }

    fn or(&self, name: &str, default: &str) -> String {
        self.optional(name).unwrap_or_else(|| default.to_owned())
    }

    fn required(&mut self, name: &'static str) -> String {
        self.optional(name).unwrap_or_else(|| {
            self.missing.push(name);
            String::new()
        })
    }

    fn required_id(&mut self, name: &'static str) -> Result<u64, ConfigError> {
        match self.optional(name) {
            Some(v) => parse(name, &v),
            None => {
                self.missing.push(name);
                Ok(0)
            }
        }
    }

    fn parsed<T: std::str::FromStr>(
        &self,
        name: &'static str,
        default: T,
    ) -> Result<T, ConfigError> {
        self.optional(name)
            .map(|v| parse(name, &v))
            .unwrap_or(Ok(default))
    }
}

fn parse<T: std::str::FromStr>(name: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid {
        name,
        value: value.to_owned(),
    })
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut r = Reader {
            lookup,
            missing: Vec::new(),
        };

        let discord_token = r.required("DISCORD_TOKEN");
        let guild_id = r.required_id("GUILD_ID")?;
        let price_channel_id = r.required_id("BTC_CHANNEL_ID")?;
        let feed_channel_id = r.required_id("TWITTER_CHANNEL_ID")?;
        let twitter_token = r.required("TWITTER_BEARER_TOKEN");
        let price_command_channel_id = r.required_id("PRICE_COMMAND_CHANNEL_ID")?;
        let roll_command_channel_id = r.required_id("ROLL_COMMAND_CHANNEL_ID")?;

        if !r.missing.is_empty() {
            return Err(ConfigError::Missing(r.missing));
        }

        let feed_page_size = r.parsed("FEED_PAGE_SIZE", 5u8)?;
        if !(5..=100).contains(&feed_page_size) {
            return Err(ConfigError::Invalid {
                name: "FEED_PAGE_SIZE",
                value: feed_page_size.to_string(),
            });
        }

        Ok(Self {
            discord_token,
            guild_id,
            price_channel_id,
            feed_channel_id,

            twitter_token,
            twitter_user_id: r.optional("TWITTER_USER_ID"),
            twitter_username: r.or("TWITTER_USERNAME", "Red_Planet_Dao"),
            feed_page_size,

            price_command_channel_id,
            roll_command_channel_id,

            price_interval: Duration::from_secs(r.parsed("PRICE_INTERVAL_SECS", 600)?),
            feed_interval: Duration::from_secs(r.parsed("FEED_INTERVAL_SECS", 1200)?),

            price_cursor_path: r.or("PRICE_CURSOR_PATH", "last_price.txt").into(),
            post_cursor_path: r.or("POST_CURSOR_PATH", "last_tweet.txt").into(),

            background_path: r.or("BACKGROUND_PATH", "background.jpg").into(),
            font_path: r.or("FONT_PATH", "SpicyRice-Regular.ttf").into(),
            price_image_path: r.or("PRICE_IMAGE_PATH", "btc_price_output.jpg").into(),

            log_file: r.or("LOG_FILE", "logs.txt").into(),
            port: r.parsed("PORT", 8080)?,

            coingecko_api_url: r.or("COINGECKO_API_URL", "https://api.coingecko.com"),
            twitter_api_url: r.or("TWITTER_API_URL", "https://api.twitter.com"),
            discord_api_url: r.or("DISCORD_API_URL", "https://discord.com/api/v10"),
        })
    }
}
