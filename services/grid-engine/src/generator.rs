//! Strategy generation gateway

use async_trait::async_trait;
use chrono::Utc;
use std::fmt::Write as _;
use tracing::info;

use crate::advisor::{AdvisoryClient, AdvisoryParams};
use crate::error::{EngineError, Result};
use crate::types::{MarketCondition, PortfolioSnapshot, StrategyDraft};

const SERVICE: &str = "generator";

/// Inputs for one generation call
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub portfolio: PortfolioSnapshot,
    pub market_condition: MarketCondition,
    /// Forces the strategy onto this token when set
    pub preferred_token: Option<String>,
}

/// Produces a grid strategy draft for a portfolio
#[async_trait]
pub trait StrategyGenerator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<StrategyDraft>;
}

/// Generator backed by the advisory model
pub struct AdvisoryGenerator {
    client: AdvisoryClient,
}

impl AdvisoryGenerator {
    pub const MAX_TOKENS: u32 = 2048;
    pub const TEMPERATURE: f32 = 0.7;

    pub fn new(base_url: &str, api_key: &str, model: &str) -> Result<Self> {
        let client = AdvisoryClient::new(
            SERVICE,
            base_url,
            api_key,
            AdvisoryParams {
                model: model.to_string(),
                max_tokens: Self::MAX_TOKENS,
                temperature: Self::TEMPERATURE,
            },
        )?;
        Ok(Self { client })
    }
}

#[async_trait]
impl StrategyGenerator for AdvisoryGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<StrategyDraft> {
        info!(
            "🧠 Generating {} strategy for {}",
            request.market_condition, request.portfolio.wallet_address
        );

        let prompt = build_generation_prompt(request);
        let text = self.client.complete(&prompt).await?;
        let mut draft: StrategyDraft = crate::advisor::parse_advisory_json(SERVICE, &text)?;

        validate_draft(&draft, request.preferred_token.as_deref(), &text)?;

        draft.generated_at = Utc::now();
        draft.model = Some(self.client.model().to_string());

        info!(
            "🧠 Generated '{}' on {} with {} levels",
            draft.strategy_type,
            draft.recommended_token,
            draft.grid_orders.len()
        );
        Ok(draft)
    }
}

/// Structural checks the model output must pass before it becomes a draft
pub fn validate_draft(draft: &StrategyDraft, preferred_token: Option<&str>, raw: &str) -> Result<()> {
    if draft.grid_orders.is_empty() {
        return Err(EngineError::Parse {
            service: SERVICE,
            message: "strategy has no grid orders".to_string(),
            raw: raw.to_string(),
        });
    }

    if draft.total_allocation_usd().is_none() {
        return Err(EngineError::Parse {
            service: SERVICE,
            message: "grid order amounts overflow".to_string(),
            raw: raw.to_string(),
        });
    }

    if let Some(token) = preferred_token {
        if !draft.recommended_token.eq_ignore_ascii_case(token) {
            return Err(EngineError::Parse {
                service: SERVICE,
                message: format!(
                    "strategy uses {} but {} was required",
                    draft.recommended_token, token
                ),
                raw: raw.to_string(),
            });
        }
    }

    Ok(())
}

fn grid_direction(condition: MarketCondition) -> &'static str {
    match condition {
        MarketCondition::Bear => "cascading BUY orders that accumulate on dips",
        MarketCondition::Bull => "cascading SELL orders that take profit on rises",
        MarketCondition::Neutral => "both buy and sell levels around the current price",
    }
}

/// Prompt for the generation model
pub fn build_generation_prompt(request: &GenerationRequest) -> String {
    let portfolio = &request.portfolio;

    let mut holdings = String::new();
    for t in &portfolio.tokens {
        let _ = writeln!(
            holdings,
            "- {} ({}): {} tokens @ ${} = ${}",
            t.token_symbol,
            t.token_name,
            t.balance,
            t.price_usd,
            t.balance_usd.round_dp(2)
        );
    }

    let token_instruction = match &request.preferred_token {
        Some(token) => format!(
            "You MUST build the strategy on {}. The user requested this token.",
            token
        ),
        None => "Pick ONE token from the holdings, favouring liquidity and volatility.".to_string(),
    };

    format!(
        r#"You are a DeFi grid trading strategist working to institutional risk standards.

PORTFOLIO
Wallet: {wallet}
Total balance: ${total}
Market condition: {condition}

Holdings:
{holdings}
REQUIREMENTS
1. Grid direction: build {direction}.
2. Use 5-7 price levels spaced 2-5% apart. Each level needs type (buy/sell), price, amount_usd and trigger_condition.
3. Total allocation must stay at or below 30% of the portfolio.
4. Classify risk as low, medium or high, give an expected return range and list warnings.
5. Token: {token_instruction}
6. Be conservative. Prices are in USD and orders must be executable on Hyperliquid.

Reply with JSON only, in this shape:
{{
  "strategy_type": "Grid Trading - Bear/Bull/Neutral",
  "market_analysis": "2-3 sentences",
  "recommended_token": "SYMBOL",
  "grid_orders": [
    {{"type": "buy", "price": 0.00, "amount_usd": 0.00, "trigger_condition": "When price reaches X"}}
  ],
  "risk_level": "low",
  "expected_return": "X-Y%",
  "rationale": "2-3 sentences",
  "warnings": ["..."]
}}"#,
        wallet = portfolio.wallet_address,
        total = portfolio.total_balance_usd.round_dp(2),
        condition = request.market_condition,
        holdings = holdings,
        direction = grid_direction(request.market_condition),
        token_instruction = token_instruction,
    )
}
