//! Cart totals: items subtotal, tiered shipping and flat-rate tax.
//!
//! Carts and orders both derive their totals from [`cart_totals`].

use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

use crate::models::CartLine;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricingConfig {
    /// Subtotal at or above which shipping is free.
    pub free_shipping_threshold: Decimal,
    /// Shipping charged below the threshold.
    pub flat_shipping: Decimal,
    /// Tax rate applied to the items subtotal, e.g. `0.18`.
    pub tax_rate: Decimal,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            free_shipping_threshold: Decimal::new(100, 0),
            flat_shipping: Decimal::new(10, 0),
            tax_rate: Decimal::new(18, 2),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct CartTotals {
    pub items_price: Decimal,
    pub shipping_price: Decimal,
    pub tax_price: Decimal,
    pub total_price: Decimal,
}

impl CartTotals {
    pub fn zero() -> Self {
        Self {
            items_price: Decimal::ZERO,
            shipping_price: Decimal::ZERO,
            tax_price: Decimal::ZERO,
            total_price: Decimal::ZERO,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PricingError {
    #[error("quantity must be greater than 0, got {0}")]
    InvalidQuantity(i32),

    #[error("price must not be negative, got {0}")]
    NegativePrice(Decimal),
}

pub fn round2(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

pub fn shipping_for(items_price: Decimal, config: &PricingConfig) -> Decimal {
    if items_price.is_zero() || items_price >= config.free_shipping_threshold {
        Decimal::ZERO
    } else {
        config.flat_shipping
    }
}

pub fn cart_totals<'a, I>(lines: I, config: &PricingConfig) -> Result<CartTotals, PricingError>
where
    I: IntoIterator<Item = &'a CartLine>,
{
    let mut subtotal = Decimal::ZERO;
    for line in lines {
        if line.quantity <= 0 {
            return Err(PricingError::InvalidQuantity(line.quantity));
        }
        if line.price < Decimal::ZERO {
            return Err(PricingError::NegativePrice(line.price));
        }
        subtotal += line.price * Decimal::from(line.quantity);
    }

    let items_price = round2(subtotal);
    let shipping_price = shipping_for(items_price, config);
    let tax_price = round2(items_price * config.tax_rate);

    Ok(CartTotals {
        items_price,
        shipping_price,
        tax_price,
        total_price: items_price + shipping_price + tax_price,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn line(price: Decimal, quantity: i32) -> CartLine {
        CartLine {
            product_id: Uuid::new_v4(),
            size_id: None,
            name: "Oak bed frame".into(),
            slug: "oak-bed-frame".into(),
            size_label: None,
            image: None,
            price,
            quantity,
        }
    }

    #[test]
    fn empty_cart_costs_nothing() {
        let lines: Vec<CartLine> = Vec::new();
        let totals = cart_totals(&lines, &PricingConfig::default()).unwrap();
        assert_eq!(totals, CartTotals::zero());
    }

    #[test]
    fn small_order_pays_flat_shipping() {
        let lines = [line(Decimal::new(2550, 2), 2)];
        let totals = cart_totals(&lines, &PricingConfig::default()).unwrap();
        assert_eq!(totals.items_price, Decimal::new(5100, 2));
        assert_eq!(totals.shipping_price, Decimal::new(10, 0));
        assert_eq!(totals.tax_price, Decimal::new(918, 2));
        assert_eq!(totals.total_price, Decimal::new(7018, 2));
    }

    #[test]
    fn threshold_subtotal_ships_free() {
        let lines = [line(Decimal::new(50, 0), 2)];
        let totals = cart_totals(&lines, &PricingConfig::default()).unwrap();
        assert_eq!(totals.shipping_price, Decimal::ZERO);
        assert_eq!(totals.tax_price, Decimal::new(18, 0));
        assert_eq!(totals.total_price, Decimal::new(118, 0));
    }

    #[test]
    fn tax_rounds_half_away_from_zero() {
        // 0.25 * 0.18 = 0.045
        let lines = [line(Decimal::new(25, 2), 1)];
        let totals = cart_totals(&lines, &PricingConfig::default()).unwrap();
        assert_eq!(totals.tax_price, Decimal::new(5, 2));
    }

    #[test]
    fn rejects_invalid_lines() {
        let config = PricingConfig::default();
        assert_eq!(
            cart_totals(&[line(Decimal::ONE, 0)], &config),
            Err(PricingError::InvalidQuantity(0))
        );
        assert_eq!(
            cart_totals(&[line(Decimal::NEGATIVE_ONE, 1)], &config),
            Err(PricingError::NegativePrice(Decimal::NEGATIVE_ONE))
        );
    }

    #[test]
    fn custom_config_is_honoured() {
        let config = PricingConfig {
            free_shipping_threshold: Decimal::new(500, 0),
            flat_shipping: Decimal::new(25, 0),
            tax_rate: Decimal::ZERO,
        };
        let totals = cart_totals(&[line(Decimal::new(200, 0), 1)], &config).unwrap();
        assert_eq!(totals.shipping_price, Decimal::new(25, 0));
        assert_eq!(totals.total_price, Decimal::new(225, 0));
    }
}
