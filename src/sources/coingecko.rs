use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use serde::Deserialize;
use thiserror::Error;

use super::PriceSource;

pub struct CoinGeckoClient {
    client: Client,
    base_url: String,
    /// CoinGecko coin id, e.g. `bitcoin`.
    pub coin: String,
    /// Quote currency, e.g. `usd`.
    pub currency: String,
}

#[derive(Debug, Error)]
pub enum PriceError {
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Scheme(#[from] serde_json::Error),
    #[error("API returned status {0}")]
    Status(StatusCode),
    #[error("API response has no {coin}/{currency} quote")]
    Content { coin: String, currency: String },
    #[error("quote {0} is not a finite decimal")]
    Value(f64),
}

#[derive(Deserialize)]
#[serde(transparent)]
struct SimplePrice(std::collections::HashMap<String, std::collections::HashMap<String, f64>>);

impl CoinGeckoClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            coin: "bitcoin".to_owned(),
            currency: "usd".to_owned(),
        }
    }
}

#[async_trait]
impl PriceSource for CoinGeckoClient {
    async fn fetch_price(&self) -> Result<Decimal, PriceError> {
        let res = self
            .client
            .get(format!("{}/api/v3/simple/price", self.base_url))
            .query(&[
                ("ids", self.coin.as_str()),
                ("vs_currencies", self.currency.as_str()),
            ])
            .send()
            .await?;

        if !res.status().is_success() {
            return Err(PriceError::Status(res.status()));
        }

        let SimplePrice(quotes) = serde_json::from_str(&res.text().await?)?;
        let quote = quotes
            .get(&self.coin)
            .and_then(|q| q.get(&self.currency))
            .copied()
            .ok_or_else(|| PriceError::Content {
                coin: self.coin.clone(),
                currency: self.currency.clone(),
            })?;

        let price = Decimal::try_from(quote).map_err(|_| PriceError::Value(quote))?;
        Ok(price.round_dp(2))
    }
}
