//! Portfolio data service - wallet holdings fetched once per cycle

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{EngineError, Result};
use crate::types::{PortfolioSnapshot, PortfolioToken};

const SERVICE: &str = "portfolio";

/// `0x` followed by exactly 40 hex digits
pub fn is_valid_wallet_address(address: &str) -> bool {
    match address.strip_prefix("0x") {
        Some(hex) => hex.len() == 40 && hex.chars().all(|c| c.is_ascii_hexdigit()),
        None => false,
    }
}

/// Source of wallet holdings
#[async_trait]
pub trait PortfolioSource: Send + Sync {
    async fn fetch(&self, wallet_address: &str) -> Result<PortfolioSnapshot>;
}

/// Octav portfolio API client
pub struct OctavPortfolioClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl OctavPortfolioClient {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| EngineError::transport(SERVICE, e))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.trim().to_string(),
        })
    }

    /// Remaining API credits, logged at startup
    pub async fn credits(&self) -> Result<serde_json::Value> {
        let url = format!("{}/v1/credits", self.base_url);

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| EngineError::transport(SERVICE, e))?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(EngineError::http_status(SERVICE, status, &text));
        }

        serde_json::from_str(&text).map_err(|e| EngineError::Parse {
            service: SERVICE,
            message: e.to_string(),
            raw: text,
        })
    }
}

#[async_trait]
impl PortfolioSource for OctavPortfolioClient {
    async fn fetch(&self, wallet_address: &str) -> Result<PortfolioSnapshot> {
        if !is_valid_wallet_address(wallet_address) {
            return Err(EngineError::InvalidWallet(wallet_address.to_string()));
        }

        let url = format!("{}/v1/portfolio", self.base_url);
        debug!("Fetching portfolio for {}", wallet_address);

        let response = self
            .client
            .get(&url)
            .query(&[("addresses", wallet_address)])
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| EngineError::transport(SERVICE, e))?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(EngineError::http_status(SERVICE, status, &text));
        }

        let body: OctavPortfolio = serde_json::from_str(&text).map_err(|e| EngineError::Parse {
            service: SERVICE,
            message: format!("malformed portfolio: {}", e),
            raw: text.clone(),
        })?;

        info!(
            "💼 Portfolio: ${} across {} tokens",
            body.total_balance_usd.round_dp(2),
            body.tokens.len()
        );

        Ok(PortfolioSnapshot {
            wallet_address: wallet_address.to_string(),
            total_balance_usd: body.total_balance_usd,
            tokens: body.tokens,
            chains: body.chains,
            fetched_at: Utc::now(),
        })
    }
}

/// Missing fields default to empty, as the service omits them for empty wallets
#[derive(Debug, Deserialize)]
struct OctavPortfolio {
    #[serde(default)]
    total_balance_usd: Decimal,
    #[serde(default)]
    tokens: Vec<PortfolioToken>,
    #[serde(default)]
    chains: Vec<String>,
}

/// Balances arrive as either JSON strings or numbers
pub(crate) fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Null => Ok(String::new()),
        other => Ok(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wallet_address_format() {
        assert!(is_valid_wallet_address(
            "0x52908400098527886E0F7030069857D2E4169EE7"
        ));
        assert!(!is_valid_wallet_address(
            "52908400098527886E0F7030069857D2E4169EE7"
        ));
        assert!(!is_valid_wallet_address("0x1234"));
        assert!(!is_valid_wallet_address(
            "0xZZ908400098527886E0F7030069857D2E4169EE7"
        ));
        assert!(!is_valid_wallet_address(
            "0x52908400098527886E0F7030069857D2E4169EE71"
        ));
    }

    #[test]
    fn test_octav_body_tolerates_missing_fields() {
        let body: OctavPortfolio = serde_json::from_str(r#"{"tokens": [
            {"token_symbol": "ETH", "balance": 0.25, "balance_usd": 500.5, "price_usd": 2002}
        ]}"#)
        .unwrap();

        assert_eq!(body.total_balance_usd, Decimal::ZERO);
        assert!(body.chains.is_empty());
        assert_eq!(body.tokens[0].balance, "0.25");
        assert_eq!(body.tokens[0].balance_usd, Decimal::from_str_exact("500.5").unwrap());
    }
}
