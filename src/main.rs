use std::{
    path::{Path, PathBuf},
    process::ExitCode,
    sync::Arc,
};

use anyhow::{Context as _, Result};
use clap::Parser;
use poise::serenity_prelude::{self as serenity, GuildId};
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use pricewatch::{
    commands::{self, Data},
    config::Config,
    discord::{ChatTarget, DiscordClient},
    keepalive,
    price::PriceUpdater,
    relay::FeedRelay,
    render::PriceCard,
    scheduler::{readiness, spawn_loop},
    sources::{coingecko::CoinGeckoClient, twitter::TwitterClient, FeedSource, PriceSource},
    store::CursorStore,
};

#[derive(Parser)]
#[command(version, about)]
struct Args {
    /// Path to an env file loaded before reading the environment.
    #[arg(long, default_value = ".env")]
    env_file: PathBuf,

    /// Advance the post cursor to the newest post without relaying, then exit.
    #[arg(long)]
    populate: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let Args {
        env_file,
        populate,
    } = Args::parse();

    if let Err(e) = load_env_file(&env_file) {
        eprintln!("❌ Failed to load {}: {e}", env_file.display());
        return ExitCode::FAILURE;
    }

    let cfg = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("❌ {e}");
            return ExitCode::FAILURE;
        }
    };

    let _guard = match init_tracing(&cfg) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = run(cfg, populate).await {
        error!("Fatal error: {e:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

/// Loads `path` into the environment. A missing file is fine, the
/// environment may already be set.
fn load_env_file(path: &Path) -> Result<(), dotenvy::Error> {
    match dotenvy::from_path(path) {
        Err(e) if e.not_found() => Ok(()),
        res => res,
    }
}

fn init_tracing(cfg: &Config) -> Result<WorkerGuard> {
    let dir = cfg
        .log_file
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    let file_name = cfg
        .log_file
        .file_name()
        .context("LOG_FILE has no file name")?;

    let (file_writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file_name));
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stdout))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false),
        )
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;

    Ok(guard)
}

async fn run(cfg: Config, populate: bool) -> Result<()> {
    let store = CursorStore::new(&cfg.price_cursor_path, &cfg.post_cursor_path);
    let price: Arc<dyn PriceSource> = Arc::new(CoinGeckoClient::new(&cfg.coingecko_api_url));
    let feed: Arc<dyn FeedSource> = Arc::new(
        TwitterClient::new(&cfg.twitter_api_url, &cfg.twitter_token).with_limit(cfg.feed_page_size),
    );
    let chat: Arc<dyn ChatTarget> =
        Arc::new(DiscordClient::new(&cfg.discord_api_url, &cfg.discord_token));

    let mut relay = FeedRelay::new(
        feed,
        chat.clone(),
        store.clone(),
        cfg.guild_id,
        cfg.feed_channel_id,
        cfg.twitter_user_id.clone(),
        cfg.twitter_username.clone(),
    );

    if populate {
        let cursor = relay.populate().await.context("Failed to populate post cursor")?;
        match cursor {
            Some(id) => info!(post_id = %id, "Post cursor populated"),
            None => info!("No posts to populate the cursor with"),
        }
        return Ok(());
    }

    keepalive::spawn(cfg.port);

    let (signal, ready) = readiness();
    let updater = PriceUpdater::new(
        price.clone(),
        chat,
        store,
        cfg.guild_id,
        cfg.price_channel_id,
    );
    spawn_loop("price", cfg.price_interval, ready.clone(), updater);
    spawn_loop("feed", cfg.feed_interval, ready, relay);

    let data = Data {
        price,
        card: PriceCard::new(&cfg.background_path, &cfg.font_path, &cfg.price_image_path),
        price_channel: cfg.price_command_channel_id,
        roll_channel: cfg.roll_command_channel_id,
    };
    let guild_id = GuildId::new(cfg.guild_id);

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: commands::all(),
            ..Default::default()
        })
        .setup(move |ctx, ready, framework| {
            Box::pin(async move {
                info!(user = %ready.user.name, "✅ Logged in");
                poise::builtins::register_in_guild(ctx, &framework.options().commands, guild_id)
                    .await?;
                signal.fire();
                Ok(data)
            })
        })
        .build();

    let intents = serenity::GatewayIntents::GUILDS;
    let mut client = serenity::ClientBuilder::new(&cfg.discord_token, intents)
        .framework(framework)
        .await
        .context("Failed to build gateway client")?;

    client.start().await.context("Gateway connection failed")
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn missing_env_file_is_ignored() {
        let dir = TempDir::new().unwrap();
        assert!(load_env_file(&dir.path().join(".env")).is_ok());
    }

    #[test]
    fn malformed_env_file_is_reported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(&path, "BROKEN LINE\n").unwrap();

        let err = load_env_file(&path).unwrap_err();
        assert!(matches!(err, dotenvy::Error::LineParse(..)));
    }
}
