//! Promotional ROI comparison.
//!
//! Marketing copy compares the two payment routes more aggressively than
//! the operational engine: advertising paid informally is a non-deductible
//! expense, which costs the client an extra 25% of the informal total at
//! income-tax time. The local-billing side counts only the pre-IVA
//! subtotal, since formally billed IVA returns as a tax credit.
//!
//! This is a distinct business scenario from [`crate::engine`], not an
//! alternative implementation of it; keep the two independent.

use serde::{Deserialize, Serialize};

use localbill_core::ValueObject;

use crate::engine::billing_breakdown;

/// Extra burden of a non-deductible expense, as a share of the informal total.
pub const HIDDEN_EXPENSE_RATE: f64 = 0.25;

/// Figures for the promotional savings message.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromotionalComparison {
    pub requested_amount: f64,
    /// Informal route total before the hidden layer (ISD + IVA applied).
    pub informal_total: f64,
    /// The hidden 25% non-deductible-expense tax on the informal total.
    pub hidden_expense_tax: f64,
    /// Informal total plus the hidden layer.
    pub effective_informal_cost: f64,
    /// Local-billing pre-IVA subtotal (IVA is recoverable, so excluded).
    pub deductible_cost: f64,
    pub projected_savings: f64,
}

impl ValueObject for PromotionalComparison {}

/// Compute the promotional route comparison for a requested spend.
///
/// Pure; same input contract as the engine (caller validates the amount).
pub fn promotional_comparison(amount: f64) -> PromotionalComparison {
    let breakdown = billing_breakdown(amount);

    let informal_total = breakdown.informal.total;
    let hidden_expense_tax = informal_total * HIDDEN_EXPENSE_RATE;
    let effective_informal_cost = informal_total + hidden_expense_tax;
    let deductible_cost = breakdown.local.subtotal;

    PromotionalComparison {
        requested_amount: amount,
        informal_total,
        hidden_expense_tax,
        effective_informal_cost,
        deductible_cost,
        projected_savings: effective_informal_cost - deductible_cost,
    }
}
