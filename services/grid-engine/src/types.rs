//! Core types for the grid strategy engine
//!
//! These types define the contract between the engine, the two advisory
//! services, the portfolio data service and the exchange signer.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Side of a grid order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "buy"),
            OrderSide::Sell => write!(f, "sell"),
        }
    }
}

/// Market condition hint passed to the strategy generator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MarketCondition {
    Bull,
    Bear,
    #[default]
    Neutral,
}

impl std::fmt::Display for MarketCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MarketCondition::Bull => write!(f, "bull"),
            MarketCondition::Bear => write!(f, "bear"),
            MarketCondition::Neutral => write!(f, "neutral"),
        }
    }
}

/// Risk classification attached to a strategy by the generator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "low"),
            RiskLevel::Medium => write!(f, "medium"),
            RiskLevel::High => write!(f, "high"),
        }
    }
}

/// One level of a grid ladder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridOrder {
    /// Buy or sell
    #[serde(rename = "type")]
    pub side: OrderSide,
    /// Limit price in USD
    pub price: Decimal,
    /// Notional committed at this level in USD
    pub amount_usd: Decimal,
    /// Human readable trigger description
    #[serde(default)]
    pub trigger_condition: String,
}

/// Strategy proposed by the generation service
///
/// Superseded (never mutated) by the next cycle's draft.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyDraft {
    pub strategy_type: String,
    #[serde(default)]
    pub market_analysis: String,
    pub recommended_token: String,
    pub grid_orders: Vec<GridOrder>,
    pub risk_level: RiskLevel,
    #[serde(default)]
    pub expected_return: String,
    #[serde(default)]
    pub rationale: String,
    #[serde(default)]
    pub warnings: Vec<String>,
    /// When the draft was produced
    #[serde(default = "now")]
    pub generated_at: DateTime<Utc>,
    /// Model that produced the draft
    #[serde(default)]
    pub model: Option<String>,
}

impl StrategyDraft {
    /// Sum of `amount_usd` across all grid orders, `None` on overflow
    pub fn total_allocation_usd(&self) -> Option<Decimal> {
        crate::guard::total_amount_usd(&self.grid_orders)
    }
}

/// Verdict of the independent review service on exactly one draft
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewResult {
    pub approved: bool,
    /// 0 - 100
    pub confidence_score: f64,
    #[serde(default)]
    pub risk_assessment: String,
    #[serde(default)]
    pub identified_risks: Vec<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub approval_rationale: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_changes: Option<Vec<String>>,
    #[serde(default = "now")]
    pub reviewed_at: DateTime<Utc>,
    #[serde(default)]
    pub reviewer_model: Option<String>,
}

/// A token held in the wallet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioToken {
    pub token_symbol: String,
    #[serde(default)]
    pub token_name: String,
    /// Raw balance as reported by the data service
    #[serde(default, deserialize_with = "crate::portfolio::string_or_number")]
    pub balance: String,
    #[serde(default)]
    pub balance_usd: Decimal,
    #[serde(default)]
    pub price_usd: Decimal,
    #[serde(default)]
    pub chain: String,
}

/// Wallet holdings fetched once per cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    pub wallet_address: String,
    pub total_balance_usd: Decimal,
    pub tokens: Vec<PortfolioToken>,
    #[serde(default)]
    pub chains: Vec<String>,
    pub fetched_at: DateTime<Utc>,
}

/// Exchange-native limit order derived from one grid order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderParams {
    pub asset: String,
    pub is_buy: bool,
    /// Size in tokens, 6 decimal places
    pub size: Decimal,
    /// Limit price in USD, 2 decimal places
    pub limit_price: Decimal,
    pub reduce_only: bool,
}

/// Result of submitting a single order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecutionOutcome {
    pub fn placed(order_id: impl Into<String>) -> Self {
        Self {
            success: true,
            order_id: Some(order_id.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            order_id: None,
            error: Some(error.into()),
        }
    }
}

/// Engine lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EngineStatus {
    /// Waiting for the next tick
    #[default]
    Idle,
    /// Cycle started, checking the circuit breaker
    Monitoring,
    /// Fetching portfolio, generating and reviewing
    Analyzing,
    /// Submitting orders
    Executing,
    /// Last step failed
    Error,
}

impl std::fmt::Display for EngineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineStatus::Idle => write!(f, "idle"),
            EngineStatus::Monitoring => write!(f, "monitoring"),
            EngineStatus::Analyzing => write!(f, "analyzing"),
            EngineStatus::Executing => write!(f, "executing"),
            EngineStatus::Error => write!(f, "error"),
        }
    }
}
