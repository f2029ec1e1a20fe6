//! Exchange signing capability
//!
//! The engine never holds keys. Orders are handed to an `OrderSigner`,
//! either the in-process paper signer or an HTTP bridge to a host wallet.

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{EngineError, Result};
use crate::types::{ExecutionOutcome, OrderParams};

/// Arbitrum One
pub const ARBITRUM_ONE_CHAIN_ID: u64 = 42161;

const SERVICE: &str = "signer";

/// Signs and submits one order on the exchange
#[async_trait]
pub trait OrderSigner: Send + Sync {
    /// Network the signer is connected to
    async fn chain_id(&self) -> Result<u64>;

    /// Place one limit order. A rejected order is a failed outcome, not an error.
    async fn sign_and_submit(&self, order: &OrderParams) -> Result<ExecutionOutcome>;
}

/// Simulated fills for paper trading
pub struct PaperSigner {
    chain_id: u64,
    submitted: AtomicU64,
}

impl PaperSigner {
    pub fn new(chain_id: u64) -> Self {
        Self {
            chain_id,
            submitted: AtomicU64::new(0),
        }
    }

    /// Orders accepted so far
    pub fn submitted(&self) -> u64 {
        self.submitted.load(Ordering::Relaxed)
    }
}

impl Default for PaperSigner {
    fn default() -> Self {
        Self::new(ARBITRUM_ONE_CHAIN_ID)
    }
}

#[async_trait]
impl OrderSigner for PaperSigner {
    async fn chain_id(&self) -> Result<u64> {
        Ok(self.chain_id)
    }

    async fn sign_and_submit(&self, order: &OrderParams) -> Result<ExecutionOutcome> {
        if order.size <= Decimal::ZERO {
            return Ok(ExecutionOutcome::failed(format!(
                "size {} is not positive",
                order.size
            )));
        }
        if order.limit_price <= Decimal::ZERO {
            return Ok(ExecutionOutcome::failed(format!(
                "limit price {} is not positive",
                order.limit_price
            )));
        }

        self.submitted.fetch_add(1, Ordering::Relaxed);
        let order_id = format!("paper-{}", Uuid::new_v4());

        info!(
            "📝 PAPER {} {} {} @ {} -> {}",
            if order.is_buy { "BUY" } else { "SELL" },
            order.size,
            order.asset,
            order.limit_price,
            order_id
        );

        Ok(ExecutionOutcome::placed(order_id))
    }
}

/// HTTP bridge to a wallet that holds the keys
pub struct SignerBridgeClient {
    client: Client,
    base_url: String,
}

impl SignerBridgeClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| EngineError::transport(SERVICE, e))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct NetworkResponse {
    chain_id: u64,
}

#[async_trait]
impl OrderSigner for SignerBridgeClient {
    async fn chain_id(&self) -> Result<u64> {
        let url = format!("{}/v1/network", self.base_url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| EngineError::transport(SERVICE, e))?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(EngineError::http_status(SERVICE, status, &text));
        }

        let network: NetworkResponse = serde_json::from_str(&text).map_err(|e| EngineError::Parse {
            service: SERVICE,
            message: e.to_string(),
            raw: text.clone(),
        })?;

        debug!("Signer bridge on chain {}", network.chain_id);
        Ok(network.chain_id)
    }

    async fn sign_and_submit(&self, order: &OrderParams) -> Result<ExecutionOutcome> {
        let url = format!("{}/v1/orders", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(order)
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
