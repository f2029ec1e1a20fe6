//! Execution plan preview
//!
//! A read-only summary of what executing the held strategy would do:
//! per-order token estimates, funds required including fees, operator
//! instructions and warnings. Building a plan never submits anything.

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::config::ConfidenceGates;
use crate::guard::{check_confidence, ExecutionPath, GuardRejection};
use crate::translator::{round_dp, SIZE_DECIMALS};
use crate::types::{OrderSide, ReviewResult, StrategyDraft};

/// Estimated network fee per order in USD
pub fn fee_per_order_usd() -> Decimal {
    Decimal::new(50, 2)
}

#[derive(Debug, Clone, Serialize)]
pub struct PlannedOrder {
    pub order_number: usize,
    #[serde(rename = "type")]
    pub side: OrderSide,
    pub price: Decimal,
    pub amount_usd: Decimal,
    pub estimated_tokens: Decimal,
    pub trigger_condition: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecutionPlan {
    pub execution_id: String,
    pub wallet_address: String,
    pub token: String,
    pub orders: Vec<PlannedOrder>,
    pub total_usd_required: Decimal,
    pub estimated_fee_usd: Decimal,
    pub execution_instructions: Vec<String>,
    pub ready_to_execute: bool,
    pub warnings: Vec<String>,
}

/// Build the plan for an approved draft
///
/// Requires approval and the plan-acceptance confidence gate.
pub fn build_execution_plan(
    draft: &StrategyDraft,
    review: &ReviewResult,
    wallet_address: &str,
    gates: &ConfidenceGates,
    chain_id: u64,
) -> Result<ExecutionPlan, GuardRejection> {
    check_confidence(gates, ExecutionPath::PlanPreview, review)?;

    if draft.grid_orders.is_empty() {
        return Err(GuardRejection::EmptyGrid);
    }

    let mut orders = Vec::with_capacity(draft.grid_orders.len());
    for (index, order) in draft.grid_orders.iter().enumerate() {
        if order.price <= Decimal::ZERO {
            return Err(GuardRejection::InvalidOrder {
                index,
                reason: format!("price {} is not positive", order.price),
            });
        }
        let tokens = order
            .amount_usd
            .checked_div(order.price)
            .ok_or_else(|| GuardRejection::InvalidOrder {
                index,
                reason: format!(
                    "{} USD at price {} is too large to estimate",
                    order.amount_usd, order.price
                ),
            })?;
        orders.push(PlannedOrder {
            order_number: index + 1,
            side: order.side,
            price: order.price,
            amount_usd: order.amount_usd,
            estimated_tokens: round_dp(tokens, SIZE_DECIMALS),
            trigger_condition: order.trigger_condition.clone(),
        });
    }

    let total = draft
        .total_allocation_usd()
        .ok_or(GuardRejection::AmountOverflow)?;
    let fees = fee_per_order_usd() * Decimal::from(orders.len());
    let required = total
        .checked_add(fees)
        .ok_or(GuardRejection::AmountOverflow)?;
    let count = orders.len();

    let execution_instructions = vec![
        format!(
            "Hold at least ${} in the wallet (${} orders + ${} fees)",
            required.round_dp(2),
            total.round_dp(2),
            fees.round_dp(2)
        ),
        format!("Confirm the signer is on chain id {}", chain_id),
        format!("Review all {} grid orders before confirming", count),
        "Each order is signed and submitted separately".to_string(),
        "Orders are placed as limit orders on Hyperliquid".to_string(),
        "Grid orders fill automatically when their price is reached".to_string(),
    ];

    let mut warnings = vec![
        "Trading digital assets carries significant risk of loss".to_string(),
        "Grid trading suits ranging markets; strong trends can cause losses".to_string(),
        "High volatility may fill several levels in quick succession".to_string(),
        format!("This strategy allocates ${} of the portfolio", total.round_dp(2)),
    ];
    warnings.extend(draft.warnings.iter().cloned());

    Ok(ExecutionPlan {
        execution_id: execution_id(),
        wallet_address: wallet_address.to_string(),
        token: draft.recommended_token.clone(),
        orders,
        total_usd_required: total,
        estimated_fee_usd: fees,
        execution_instructions,
        ready_to_execute: true,
        warnings,
    })
}

fn execution_id() -> String {
    let suffix: String = Uuid::new_v4().simple().to_string().chars().take(9).collect();
    format!("EXEC_{}_{}", Utc::now().timestamp_millis(), suffix)
}
