//! Grid order to exchange order translation

use rust_decimal::{Decimal, RoundingStrategy};

use crate::types::{GridOrder, OrderParams, OrderSide};

/// Order size precision (tokens)
pub const SIZE_DECIMALS: u32 = 6;

/// Limit price precision (USD)
pub const PRICE_DECIMALS: u32 = 2;

/// Translation refusals
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TranslationError {
    #[error("grid order #{index} has non-positive price {price}")]
    NonPositivePrice { index: usize, price: Decimal },

    #[error("grid order #{index} size overflows ({amount_usd} USD at {price})")]
    Overflow {
        index: usize,
        amount_usd: Decimal,
        price: Decimal,
    },
}

/// Round half away from zero, matching fixed-point display rounding
pub fn round_dp(value: Decimal, dp: u32) -> Decimal {
    value.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero)
}

/// Translate a single grid order
pub fn translate_order(order: &GridOrder, asset: &str) -> Result<OrderParams, TranslationError> {
    translate_at(0, order, asset)
}

/// Translate a grid into exchange orders, preserving order
///
/// Any order with `price <= 0` refuses the whole batch; nothing is emitted.
pub fn translate_orders(
    orders: &[GridOrder],
    asset: &str,
) -> Result<Vec<OrderParams>, TranslationError> {
    orders
        .iter()
        .enumerate()
        .map(|(index, order)| translate_at(index, order, asset))
        .collect()
}

fn translate_at(index: usize, order: &GridOrder, asset: &str) -> Result<OrderParams, TranslationError> {
    if order.price <= Decimal::ZERO {
        return Err(TranslationError::NonPositivePrice {
            index,
            price: order.price,
        });
    }

    let size = order
        .amount_usd
        .checked_div(order.price)
        .ok_or(TranslationError::Overflow {
            index,
            amount_usd: order.amount_usd,
            price: order.price,
        })?;

    Ok(OrderParams {
        asset: asset.to_string(),
        is_buy: order.side == OrderSide::Buy,
        size: round_dp(size, SIZE_DECIMALS),
        limit_price: round_dp(order.price, PRICE_DECIMALS),
        reduce_only: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(side: OrderSide, price: &str, amount: &str) -> GridOrder {
        GridOrder {
            side,
            price: Decimal::from_str_exact(price).unwrap(),
            amount_usd: Decimal::from_str_exact(amount).unwrap(),
            trigger_condition: String::new(),
        }
    }

    #[test]
    fn test_size_and_price_rounding() {
        let params = translate_order(&order(OrderSide::Buy, "1850", "100"), "ETH").unwrap();
        // 100 / 1850 = 0.05405405...
        assert_eq!(params.size, Decimal::from_str_exact("0.054054").unwrap());
        assert_eq!(params.limit_price, Decimal::from(1850));
        assert!(params.is_buy);
        assert!(!params.reduce_only);
        assert_eq!(params.asset, "ETH");

        let params = translate_order(&order(OrderSide::Sell, "1850.555", "100"), "ETH").unwrap();
        assert_eq!(params.limit_price, Decimal::from_str_exact("1850.56").unwrap());
        assert!(!params.is_buy);

        let params = translate_order(&order(OrderSide::Buy, "3", "2"), "ARB").unwrap();
        // 0.6666666... rounds up at the sixth place
        assert_eq!(params.size, Decimal::from_str_exact("0.666667").unwrap());
    }

    #[test]
    fn test_non_positive_price_refused() {
        let err = translate_order(&order(OrderSide::Buy, "0", "100"), "ETH").unwrap_err();
        assert_eq!(
            err,
            TranslationError::NonPositivePrice {
                index: 0,
                price: Decimal::ZERO
            }
        );

        assert!(translate_order(&order(OrderSide::Sell, "-5", "100"), "ETH").is_err());
    }

    #[test]
    fn test_batch_preserves_order_and_refuses_bad_level() {
        let grid = vec![
            order(OrderSide::Buy, "100", "10"),
            order(OrderSide::Buy, "95", "10"),
            order(OrderSide::Sell, "110", "10"),
        ];
        let params = translate_orders(&grid, "SOL").unwrap();
        assert_eq!(params.len(), 3);
        assert_eq!(params[1].limit_price, Decimal::from(95));
        assert!(!params[2].is_buy);

        let mut bad = grid.clone();
        bad[2].price = Decimal::ZERO;
        match translate_orders(&bad, "SOL") {
            Err(TranslationError::NonPositivePrice { index, .. }) => assert_eq!(index, 2),
            other => panic!("expected refusal, got {:?}", other),
        }
    }
}
