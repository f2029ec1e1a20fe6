//! Strategy review gateway
//!
//! Independent second opinion on a draft. The reviewer runs on its own
//! advisory client with a cooler temperature than the generator.

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::fmt::Write as _;
use tracing::info;

use crate::advisor::{parse_advisory_json, AdvisoryClient, AdvisoryParams};
use crate::error::{EngineError, Result};
use crate::guard::allocation_percent;
use crate::types::{ReviewResult, StrategyDraft};

const SERVICE: &str = "reviewer";

/// Inputs for one review call
#[derive(Debug, Clone)]
pub struct ReviewRequest {
    pub draft: StrategyDraft,
    pub wallet_address: String,
    pub total_balance_usd: Decimal,
}

/// Approves or rejects a draft with a confidence score
#[async_trait]
pub trait StrategyReviewer: Send + Sync {
    async fn review(&self, request: &ReviewRequest) -> Result<ReviewResult>;
}

pub struct AdvisoryReviewer {
    client: AdvisoryClient,
}

impl AdvisoryReviewer {
    pub const MAX_TOKENS: u32 = 1500;
    pub const TEMPERATURE: f32 = 0.3;

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
impl StrategyReviewer for AdvisoryReviewer {
    async fn review(&self, request: &ReviewRequest) -> Result<ReviewResult> {
        info!(
            "🔍 Reviewing '{}' on {}",
            request.draft.strategy_type, request.draft.recommended_token
        );

        let prompt = build_review_prompt(request);
        let text = self.client.complete(&prompt).await?;
        let mut review: ReviewResult = parse_advisory_json(SERVICE, &text)?;

        validate_score(review.confidence_score, &text)?;

        review.reviewed_at = Utc::now();
        review.reviewer_model = Some(self.client.model().to_string());

        info!(
            "🔍 Review: approved={} confidence={}",
            review.approved, review.confidence_score
        );
        Ok(review)
    }
}

/// Confidence must be a finite value in 0..=100
pub fn validate_score(score: f64, raw: &str) -> Result<()> {
    if score.is_finite() && (0.0..=100.0).contains(&score) {
        return Ok(());
    }
    Err(EngineError::Parse {
        service: SERVICE,
        message: format!("confidence_score {} is outside 0-100", score),
        raw: raw.to_string(),
    })
}

/// Prompt for the review model
pub fn build_review_prompt(request: &ReviewRequest) -> String {
    let draft = &request.draft;
    let total = draft
        .total_allocation_usd()
        .map(|t| t.round_dp(2).to_string())
        .unwrap_or_else(|| "unknown".to_string());
    let allocation = allocation_percent(&draft.grid_orders, request.total_balance_usd)
        .map(|p| format!("{}%", p.round_dp(1).normalize()))
        .unwrap_or_else(|| "unknown".to_string());

    let mut levels = String::new();
    for (i, order) in draft.grid_orders.iter().enumerate() {
        let _ = writeln!(
            levels,
            "{}. {} at ${} for ${} - {}",
            i + 1,
            order.side.to_string().to_uppercase(),
            order.price,
            order.amount_usd,
            order.trigger_condition
        );
    }

    let mut warnings = String::new();
    for (i, w) in draft.warnings.iter().enumerate() {
        let _ = writeln!(warnings, "{}. {}", i + 1, w);
    }

    format!(
        r#"You are a senior risk analyst at a digital asset fund. Approve or reject the strategy below against institutional risk standards.

STRATEGY
Type: {strategy_type}
Token: {token}
Risk level: {risk}
Expected return: {expected}
Wallet: {wallet}

Market analysis:
{analysis}

Rationale:
{rationale}

GRID ORDERS (total ${total} = {allocation} of a ${balance} portfolio):
{levels}
Stated warnings:
{warnings}
AUTO-REJECT RULES
- allocation above 30% of the portfolio
- risk level "high" with allocation above 15%
- unrealistic price levels or spacing
- expected return above 50%
When in doubt, reject.

Reply with JSON only:
{{
  "approved": true,
  "confidence_score": 0,
  "risk_assessment": "2-3 sentences",
  "identified_risks": ["..."],
  "recommendations": ["..."],
  "approval_rationale": "2-3 sentences",
  "required_changes": ["only when rejected"]
}}"#,
        strategy_type = draft.strategy_type,
        token = draft.recommended_token,
        risk = draft.risk_level,
        expected = draft.expected_return,
        wallet = request.wallet_address,
        analysis = draft.market_analysis,
        rationale = draft.rationale,
        total = total,
        allocation = allocation,
        balance = request.total_balance_usd.round_dp(2),
        levels = levels,
        warnings = warnings,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{GridOrder, OrderSide, RiskLevel};

    fn request() -> ReviewRequest {
        ReviewRequest {
            draft: StrategyDraft {
                strategy_type: "Grid Trading - Bear".to_string(),
                market_analysis: "Downtrend".to_string(),
                recommended_token: "ETH".to_string(),
                grid_orders: vec![
                    GridOrder {
                        side: OrderSide::Buy,
                        price: Decimal::from(1900),
                        amount_usd: Decimal::from(60),
                        trigger_condition: "dip".to_string(),
                    },
                    GridOrder {
                        side: OrderSide::Buy,
                        price: Decimal::from(1850),
                        amount_usd: Decimal::from(40),
                        trigger_condition: "deeper dip".to_string(),
                    },
                ],
                risk_level: RiskLevel::Medium,
                expected_return: "4%".to_string(),
                rationale: "Accumulate".to_string(),
                warnings: vec!["Further downside".to_string()],
                generated_at: Utc::now(),
                model: None,
            },
            wallet_address: "0xabcabcabcabcabcabcabcabcabcabcabcabcabca".to_string(),
            total_balance_usd: Decimal::from(1000),
        }
    }

    #[test]
    fn test_prompt_carries_computed_allocation() {
        let prompt = build_review_prompt(&request());
        assert!(prompt.contains("total $100 = 10% of a $1000 portfolio"));
        assert!(prompt.contains("1. BUY at $1900 for $60 - dip"));
        assert!(prompt.contains("1. Further downside"));
        assert!(prompt.contains("allocation above 30%"));
    }

    #[test]
    fn test_prompt_survives_oversized_amounts() {
        let mut request = request();
        for order in &mut request.draft.grid_orders {
            order.amount_usd = Decimal::from_str_exact("50000000000000000000000000000").unwrap();
        }
        let prompt = build_review_prompt(&request);
        assert!(prompt.contains("total $unknown = unknown of a $1000 portfolio"));
    }

    #[test]
    fn test_score_bounds() {
        validate_score(0.0, "").unwrap();
        validate_score(100.0, "").unwrap();
        assert!(validate_score(100.5, "").is_err());
        assert!(validate_score(-1.0, "").is_err());
        assert!(validate_score(f64::NAN, "").is_err());
    }
}
