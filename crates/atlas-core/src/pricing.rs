//! # Pricing Calculator
//!
//! Pure order pricing: subtotal, tier discount, tax, total.
//!
//! ## Calculation Order
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  subtotal  = Σ (unit_price × quantity)                                  │
//! │  discount  = round(subtotal × tier_discount)                            │
//! │  tax       = round((subtotal − discount) × tax_rate)                    │
//! │  total     = subtotal − discount + tax                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Discount is applied BEFORE tax: the customer is taxed on what they
//! actually pay. Rounding is half-up, applied once per derived amount,
//! in integer math (see [`Money::apply_rate_bps`]).
//!
//! No side effects, no I/O. Input quantities are assumed validated
//! (positive); validation happens before invocation.

use serde::{Deserialize, Serialize};

use crate::money::Money;
use crate::types::{DiscountRate, TaxRate};

/// One line of pricing input: a quantity at a unit price.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineInput {
    pub quantity: i64,
    pub unit_price: Money,
}

impl LineInput {
    /// Creates a pricing line.
    pub const fn new(quantity: i64, unit_price: Money) -> Self {
        LineInput {
            quantity,
            unit_price,
        }
    }

    /// Line total before any discount.
    #[inline]
    pub const fn line_total(&self) -> Money {
        self.unit_price.multiply_quantity(self.quantity)
    }
}

/// The computed price components of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceBreakdown {
    /// Sum of line totals, before discount.
    pub subtotal: Money,
    /// Tier discount amount.
    pub discount: Money,
    /// Tax on the discounted subtotal.
    pub tax: Money,
    /// What the customer pays: subtotal − discount + tax.
    pub total: Money,
}

impl PriceBreakdown {
    /// A breakdown with every component at zero.
    pub const fn zero() -> Self {
        PriceBreakdown {
            subtotal: Money::zero(),
            discount: Money::zero(),
            tax: Money::zero(),
            total: Money::zero(),
        }
    }
}

/// Prices an order.
///
/// ## Example
/// ```rust
/// use atlas_core::money::Money;
/// use atlas_core::pricing::{price_order, LineInput};
/// use atlas_core::types::{DiscountRate, TaxRate};
///
/// // One 55in TV at 85000.00, Gold tier (10%), 18% tax
/// let lines = [LineInput::new(1, Money::from_cents(8_500_000))];
/// let breakdown = price_order(&lines, DiscountRate::from_bps(1000), TaxRate::from_bps(1800));
///
/// assert_eq!(breakdown.subtotal.cents(), 8_500_000); // 85000.00
/// assert_eq!(breakdown.discount.cents(), 850_000);   //  8500.00
/// assert_eq!(breakdown.tax.cents(), 1_377_000);      // 13770.00
/// assert_eq!(breakdown.total.cents(), 9_027_000);    // 90270.00
/// ```
pub fn price_order(
    lines: &[LineInput],
    tier_discount: DiscountRate,
    tax_rate: TaxRate,
) -> PriceBreakdown {
    let mut subtotal = Money::zero();
    for line in lines {
        subtotal += line.line_total();
    }

    let discount = subtotal.apply_rate_bps(tier_discount.bps());
    let taxable = subtotal - discount;
    let tax = taxable.apply_rate_bps(tax_rate.bps());
    let total = taxable + tax;

    PriceBreakdown {
        subtotal,
        discount,
        tax,
        total,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
