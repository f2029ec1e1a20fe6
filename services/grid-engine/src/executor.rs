//! Execution submitter - turns an approved draft into placed orders

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::error::{EngineError, Result};
use crate::exchange::OrderSigner;
use crate::guard::GuardRejection;
use crate::translator::translate_orders;
use crate::types::{ExecutionOutcome, StrategyDraft};

/// Per-order results of one submission batch
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionReport {
    pub asset: String,
    /// Same order as the draft's grid
    pub outcomes: Vec<ExecutionOutcome>,
    pub succeeded: u64,
    pub failed: u64,
    pub total_usd: Decimal,
    pub submitted_at: DateTime<Utc>,
}

impl ExecutionReport {
    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }
}

/// Submits orders one at a time through an `OrderSigner`
pub struct ExecutionSubmitter {
    signer: Arc<dyn OrderSigner>,
    expected_chain_id: u64,
    order_delay: Duration,
}

impl ExecutionSubmitter {
    pub fn new(signer: Arc<dyn OrderSigner>, expected_chain_id: u64, order_delay: Duration) -> Self {
        Self {
            signer,
            expected_chain_id,
            order_delay,
        }
    }

    /// Check network, translate, then submit sequentially
    ///
    /// Nothing is submitted if the network is wrong or any level fails to
    /// translate. Once submission starts, one failed order never stops the
    /// rest.
    pub async fn submit(&self, draft: &StrategyDraft) -> Result<ExecutionReport> {
        let actual = self.signer.chain_id().await?;
        if actual != self.expected_chain_id {
            return Err(EngineError::NetworkMismatch {
                expected: self.expected_chain_id,
                actual,
            });
        }

        let asset = draft.recommended_token.clone();
        let orders = translate_orders(&draft.grid_orders, &asset)?;
        let total_usd = draft
            .total_allocation_usd()
            .ok_or(GuardRejection::AmountOverflow)?;

        info!("🚀 Submitting {} {} orders", orders.len(), asset);

        let mut outcomes = Vec::with_capacity(orders.len());
        for (i, order) in orders.iter().enumerate() {
            if i > 0 && !self.order_delay.is_zero() {
                tokio::time::sleep(self.order_delay).await;
            }

            let outcome = match self.signer.sign_and_submit(order).await {
                Ok(outcome) => outcome,
                Err(e) => ExecutionOutcome::failed(e.to_string()),
            };

            if !outcome.success {
                warn!(
                    "Order #{} ({} @ {}) failed: {}",
                    i + 1,
                    order.size,
                    order.limit_price,
                    outcome.error.as_deref().unwrap_or("unknown error")
                );
            }
            outcomes.push(outcome);
        }

        let succeeded = outcomes.iter().filter(|o| o.success).count() as u64;
        let failed = outcomes.len() as u64 - succeeded;

        Ok(ExecutionReport {
            asset,
            outcomes,
            succeeded,
            failed,
            total_usd,
            submitted_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::PaperSigner;
    use crate::translator::TranslationError;
    use crate::types::{GridOrder, OrderSide, RiskLevel};

    fn draft(prices: &[i64]) -> StrategyDraft {
        StrategyDraft {
            strategy_type: "Grid Trading - Bear".to_string(),
            market_analysis: String::new(),
            recommended_token: "ETH".to_string(),
            grid_orders: prices
                .iter()
                .map(|p| GridOrder {
                    side: OrderSide::Buy,
                    price: Decimal::from(*p),
                    amount_usd: Decimal::from(25),
                    trigger_condition: String::new(),
                })
                .collect(),
            risk_level: RiskLevel::Low,
            expected_return: String::new(),
            rationale: String::new(),
            warnings: vec![],
            generated_at: Utc::now(),
            model: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_sequential_submission_with_delay() {
        let signer = Arc::new(PaperSigner::default());
        let submitter = ExecutionSubmitter::new(signer.clone(), 42161, Duration::from_millis(1000));

        let started = tokio::time::Instant::now();
        let report = submitter.submit(&draft(&[2000, 1950, 1900])).await.unwrap();

        assert_eq!(report.succeeded, 3);
        assert_eq!(report.failed, 0);
        assert_eq!(report.total_usd, Decimal::from(75));
        assert_eq!(signer.submitted(), 3);
        // delay between orders only
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(2000));
        assert!(elapsed < Duration::from_millis(3000));
    }

    #[tokio::test]
    async fn test_wrong_network_submits_nothing() {
        let signer = Arc::new(PaperSigner::new(1));
        let submitter = ExecutionSubmitter::new(signer.clone(), 42161, Duration::ZERO);

        match submitter.submit(&draft(&[2000])).await {
            Err(EngineError::NetworkMismatch { expected, actual }) => {
                assert_eq!(expected, 42161);
                assert_eq!(actual, 1);
            }
            other => panic!("expected network mismatch, got {:?}", other),
        }
        assert_eq!(signer.submitted(), 0);
    }

    #[tokio::test]
    async fn test_bad_price_submits_nothing() {
        let signer = Arc::new(PaperSigner::default());
        let submitter = ExecutionSubmitter::new(signer.clone(), 42161, Duration::ZERO);

        let err = submitter.submit(&draft(&[2000, 0])).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::Translation(TranslationError::NonPositivePrice { index: 1, .. })
        ));
        assert_eq!(signer.submitted(), 0);
    }

    #[tokio::test]
    async fn test_overflowing_total_submits_nothing() {
        let signer = Arc::new(PaperSigner::default());
        let submitter = ExecutionSubmitter::new(signer.clone(), 42161, Duration::ZERO);

        let mut draft = draft(&[2000, 1900]);
        for order in &mut draft.grid_orders {
            order.amount_usd = Decimal::from_str_exact("50000000000000000000000000000").unwrap();
        }

        let err = submitter.submit(&draft).await.unwrap_err();
        assert!(matches!(err, EngineError::Guard(GuardRejection::AmountOverflow)));
        assert_eq!(signer.submitted(), 0);
    }
}
