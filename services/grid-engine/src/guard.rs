//! Risk guard - deterministic checks between review and execution
//!
//! Nothing here talks to the network. The controller consults the guard
//! before a cycle starts (circuit breaker) and before any order is
//! submitted (allocation, confidence gates).

use rust_decimal::Decimal;
use serde::Serialize;

use crate::config::{ConfidenceGates, EngineSettings};
use crate::types::{GridOrder, ReviewResult};

/// Policy refusals. These are outcomes, not faults.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GuardRejection {
    #[error("allocation {allocation_percent}% exceeds limit {limit_percent}%")]
    AllocationExceeded {
        allocation_percent: Decimal,
        limit_percent: Decimal,
    },

    #[error("portfolio balance is zero or negative")]
    NonPositiveBalance,

    #[error("grid order #{index} is invalid: {reason}")]
    InvalidOrder { index: usize, reason: String },

    #[error("strategy has no grid orders")]
    EmptyGrid,

    #[error("grid order amounts overflow")]
    AmountOverflow,

    #[error("circuit breaker tripped: daily loss {loss} reached limit {max_loss}")]
    CircuitBreakerTripped { loss: Decimal, max_loss: Decimal },

    #[error("strategy was not approved by review")]
    NotApproved,

    #[error("review confidence {score} is below the required {threshold}")]
    ConfidenceBelowGate { score: f64, threshold: f64 },
}

/// Passing allocation check
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AllocationCheck {
    pub total_usd: Decimal,
    pub allocation_percent: Decimal,
}

/// Which path is asking to execute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionPath {
    /// Inside a cycle with `auto_execute` on
    Auto,
    /// Operator confirmation of the held strategy
    Manual,
    /// Execution plan preview
    PlanPreview,
}

/// `Σ amount_usd`, `None` on overflow
pub fn total_amount_usd(orders: &[GridOrder]) -> Option<Decimal> {
    orders
        .iter()
        .try_fold(Decimal::ZERO, |total, o| total.checked_add(o.amount_usd))
}

/// `100 * Σ amount_usd / balance`
///
/// `None` when the balance is not positive or the arithmetic overflows.
pub fn allocation_percent(orders: &[GridOrder], total_balance_usd: Decimal) -> Option<Decimal> {
    if total_balance_usd <= Decimal::ZERO {
        return None;
    }
    total_amount_usd(orders)?
        .checked_mul(Decimal::ONE_HUNDRED)?
        .checked_div(total_balance_usd)
}

/// Reject if the grid commits more of the portfolio than allowed
///
/// Applies regardless of how confident the review was.
pub fn check_allocation(
    orders: &[GridOrder],
    total_balance_usd: Decimal,
    settings: &EngineSettings,
) -> Result<AllocationCheck, GuardRejection> {
    if orders.is_empty() {
        return Err(GuardRejection::EmptyGrid);
    }

    for (index, order) in orders.iter().enumerate() {
        if order.price <= Decimal::ZERO {
            return Err(GuardRejection::InvalidOrder {
                index,
                reason: format!("price {} is not positive", order.price),
            });
        }
        if order.amount_usd <= Decimal::ZERO {
            return Err(GuardRejection::InvalidOrder {
                index,
                reason: format!("amount_usd {} is not positive", order.amount_usd),
            });
        }
    }

    if total_balance_usd <= Decimal::ZERO {
        return Err(GuardRejection::NonPositiveBalance);
    }

    let total_usd = total_amount_usd(orders).ok_or(GuardRejection::AmountOverflow)?;
    // a percentage too large to represent is over any limit
    let Some(allocation) = allocation_percent(orders, total_balance_usd) else {
        return Err(GuardRejection::AllocationExceeded {
            allocation_percent: Decimal::MAX,
            limit_percent: settings.max_allocation_percent,
        });
    };

    if allocation > settings.max_allocation_percent {
        return Err(GuardRejection::AllocationExceeded {
            allocation_percent: allocation.round_dp(2),
            limit_percent: settings.max_allocation_percent,
        });
    }

    Ok(AllocationCheck {
        total_usd,
        allocation_percent: allocation,
    })
}

/// Trip when today's loss reaches `max_daily_loss_percent` of the balance
///
/// A gain, or a loss strictly under the limit, passes.
pub fn evaluate_circuit_breaker(
    daily_pnl: Decimal,
    reference_balance_usd: Decimal,
    settings: &EngineSettings,
) -> Result<(), GuardRejection> {
    if daily_pnl >= Decimal::ZERO {
        return Ok(());
    }

    let fraction = settings.max_daily_loss_percent / Decimal::ONE_HUNDRED;
    let loss = daily_pnl.abs();
    // a limit too large to represent cannot be reached
    let Some(max_loss) = reference_balance_usd.checked_mul(fraction) else {
        return Ok(());
    };

    if loss >= max_loss {
        return Err(GuardRejection::CircuitBreakerTripped { loss, max_loss });
    }

    Ok(())
}

/// Check approval plus the confidence threshold for the given path
pub fn check_confidence(
    gates: &ConfidenceGates,
    path: ExecutionPath,
    review: &ReviewResult,
) -> Result<(), GuardRejection> {
    if !review.approved {
        return Err(GuardRejection::NotApproved);
    }

    let threshold = match path {
        ExecutionPath::Auto => gates.auto_execute_min,
        ExecutionPath::Manual => gates.manual_execute_min,
        ExecutionPath::PlanPreview => gates.plan_acceptance_min,
    };

    if review.confidence_score < threshold {
        return Err(GuardRejection::ConfidenceBelowGate {
            score: review.confidence_score,
            threshold,
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::OrderSide;
    use chrono::Utc;

    fn order(price: i64, amount: i64) -> GridOrder {
        GridOrder {
            side: OrderSide::Buy,
            price: Decimal::from(price),
            amount_usd: Decimal::from(amount),
            trigger_condition: String::new(),
        }
    }

    fn review(approved: bool, score: f64) -> ReviewResult {
        ReviewResult {
            approved,
            confidence_score: score,
            risk_assessment: String::new(),
            identified_risks: vec![],
            recommendations: vec![],
            approval_rationale: String::new(),
            required_changes: None,
            reviewed_at: Utc::now(),
            reviewer_model: None,
        }
    }

    #[test]
    fn test_allocation_percent() {
        let orders = vec![order(100, 50), order(90, 50)];
        assert_eq!(
            allocation_percent(&orders, Decimal::from(1000)),
            Some(Decimal::from(10))
        );
        assert_eq!(allocation_percent(&orders, Decimal::ZERO), None);
    }

    #[test]
    fn test_allocation_limit_is_inclusive() {
        let settings = EngineSettings::default(); // 10%
        let at_limit = vec![order(100, 60), order(95, 40)];
        let check = check_allocation(&at_limit, Decimal::from(1000), &settings).unwrap();
        assert_eq!(check.total_usd, Decimal::from(100));
        assert_eq!(check.allocation_percent, Decimal::from(10));

        let over = vec![order(100, 60), order(95, 41)];
        match check_allocation(&over, Decimal::from(1000), &settings) {
            Err(GuardRejection::AllocationExceeded {
                allocation_percent,
                limit_percent,
            }) => {
                assert_eq!(allocation_percent, Decimal::from_str_exact("10.1").unwrap());
                assert_eq!(limit_percent, Decimal::from(10));
            }
            other => panic!("expected allocation rejection, got {:?}", other),
        }
    }

    #[test]
    fn test_allocation_rejects_bad_inputs() {
        let settings = EngineSettings::default();
        assert_eq!(
            check_allocation(&[], Decimal::from(1000), &settings),
            Err(GuardRejection::EmptyGrid)
        );
        assert_eq!(
            check_allocation(&[order(100, 10)], Decimal::ZERO, &settings),
            Err(GuardRejection::NonPositiveBalance)
        );
        assert!(matches!(
            check_allocation(&[order(100, 10), order(0, 10)], Decimal::from(1000), &settings),
            Err(GuardRejection::InvalidOrder { index: 1, .. })
        ));
        assert!(matches!(
            check_allocation(&[order(100, 0)], Decimal::from(1000), &settings),
            Err(GuardRejection::InvalidOrder { index: 0, .. })
        ));
    }

    #[test]
    fn test_circuit_breaker_boundary() {
        let settings = EngineSettings::default(); // 5%
        let balance = Decimal::from(1000);

        // -50 on 1000 at 5% is exactly the limit
        assert_eq!(
            evaluate_circuit_breaker(Decimal::from(-50), balance, &settings),
            Err(GuardRejection::CircuitBreakerTripped {
                loss: Decimal::from(50),
                max_loss: Decimal::from(50),
            })
        );
        assert!(evaluate_circuit_breaker(Decimal::from(-49), balance, &settings).is_ok());
        assert!(evaluate_circuit_breaker(Decimal::from(500), balance, &settings).is_ok());
        assert!(evaluate_circuit_breaker(Decimal::ZERO, balance, &settings).is_ok());
    }

    #[test]
    fn test_oversized_amounts_are_refused() {
        let settings = EngineSettings::default();
        let huge = Decimal::from_str_exact("50000000000000000000000000000").unwrap();
        let mut orders = vec![order(1850, 10), order(1900, 10)];
        orders[0].amount_usd = huge;
        orders[1].amount_usd = huge;

        assert_eq!(total_amount_usd(&orders), None);
        assert_eq!(allocation_percent(&orders, Decimal::from(1000)), None);
        assert_eq!(
            check_allocation(&orders, Decimal::from(1000), &settings),
            Err(GuardRejection::AmountOverflow)
        );

        // the sum fits but the percentage does not
        orders.truncate(1);
        assert!(matches!(
            check_allocation(&orders, Decimal::from(1000), &settings),
            Err(GuardRejection::AllocationExceeded { .. })
        ));
    }

    #[test]
    fn test_circuit_breaker_on_huge_balance() {
        let settings = EngineSettings::default();
        let balance = Decimal::MAX;

        assert!(evaluate_circuit_breaker(Decimal::from(-1_000_000), balance, &settings).is_ok());
        assert!(matches!(
            evaluate_circuit_breaker(Decimal::MIN, balance, &settings),
            Err(GuardRejection::CircuitBreakerTripped { .. })
        ));
    }

    #[test]
    fn test_confidence_gates_per_path() {
        let gates = ConfidenceGates::default();

        assert_eq!(
            check_confidence(&gates, ExecutionPath::Auto, &review(true, 69.0)),
            Err(GuardRejection::ConfidenceBelowGate {
                score: 69.0,
                threshold: 70.0
            })
        );
        assert!(check_confidence(&gates, ExecutionPath::Auto, &review(true, 70.0)).is_ok());
        assert!(check_confidence(&gates, ExecutionPath::Manual, &review(true, 5.0)).is_ok());
        assert!(check_confidence(&gates, ExecutionPath::PlanPreview, &review(true, 59.9)).is_err());
        assert_eq!(
            check_confidence(&gates, ExecutionPath::Manual, &review(false, 99.0)),
            Err(GuardRejection::NotApproved)
        );
    }
}
