use std::{path::PathBuf, time::Duration};

use thiserror::Error;
use tracing::{error, warn};

use crate::{
    discord::DiscordError,
    sources::{coingecko::PriceError, twitter::TwitterError},
};

/// Why a background cycle or a command gave up.
#[derive(Debug, Error)]
pub enum CycleError {
    /// Price or feed API failed at the network or parse level.
    #[error("{service} unavailable: {reason}")]
    SourceUnavailable {
        service: &'static str,
        reason: String,
    },
    /// A configured guild, channel or account could not be resolved.
    #[error("target missing: {0}")]
    TargetMissing(String),
    #[error(
        "{service} ratelimited{}",
        .retry_after
            .map(|d| format!(" for {:.1} seconds", d.as_secs_f64()))
            .unwrap_or_default()
    )]
    RateLimited {
        service: &'static str,
        retry_after: Option<Duration>,
    },
    #[error("asset missing: {}", .0.display())]
    AssetMissing(PathBuf),
    /// Any other rejection from the chat platform.
    #[error("chat platform error: {0}")]
    Platform(String),
}

impl CycleError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SourceUnavailable { .. } => "source_unavailable",
            Self::TargetMissing(_) => "target_missing",
            Self::RateLimited { .. } => "rate_limited",
            Self::AssetMissing(_) => "asset_missing",
            Self::Platform(_) => "platform",
        }
    }

    /// Logs at the level the kind calls for. Rate limiting is expected
    /// back-pressure and only warns.
    pub fn log(&self, task: &str) {
        match self {
            Self::RateLimited { .. } => warn!(task, kind = self.kind(), "{self}"),
            _ => error!(task, kind = self.kind(), "{self}"),
        }
    }
}

impl From<PriceError> for CycleError {
    fn from(e: PriceError) -> Self {
        Self::SourceUnavailable {
            service: "price",
            reason: e.to_string(),
        }
    }
}

impl From<TwitterError> for CycleError {
    fn from(e: TwitterError) -> Self {
        match e {
            TwitterError::RateLimited { retry_after } => Self::RateLimited {
                service: "twitter",
                retry_after,
            },
            e => Self::SourceUnavailable {
                service: "twitter",
                reason: e.to_string(),
            },
        }
    }
}

impl From<DiscordError> for CycleError {
    fn from(e: DiscordError) -> Self {
        match e {
            DiscordError::RateLimited { timeout } => Self::RateLimited {
                service: "discord",
                retry_after: Some(timeout),
            },
            DiscordError::NotFound(what) => Self::TargetMissing(what),
            e => Self::Platform(e.to_string()),
        }
    }
}
