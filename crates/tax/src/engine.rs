//! Canonical billing tax engine.
//!
//! Given a requested advertising spend, projects the cost of paying the
//! platform directly from abroad ("informal": ISD on the way out, IVA on
//! top) against routing the spend through the intermediary's local invoice
//! ("local billing": commission, then IVA), and derives the savings.
//!
//! Savings compare the informal **total** against the local **subtotal**:
//! IVA billed through the formal channel comes back as a tax credit, so it
//! is not a cost to the client.

use serde::{Deserialize, Serialize};

use localbill_core::ValueObject;

/// Exit-of-foreign-currency tax applied to direct/foreign payments.
pub const ISD_RATE: f64 = 0.05;

/// Value-added tax.
pub const IVA_RATE: f64 = 0.15;

/// Intermediary commission on the requested spend (canonical engine rate).
pub const COMMISSION_RATE: f64 = 0.10;

/// Requested amounts must be strictly below this cap.
pub const MAX_BILLABLE_AMOUNT: f64 = 1_000_000.0;

/// True when `amount` is acceptable input for the engine and for opening a
/// recharge request: finite and in `(0, MAX_BILLABLE_AMOUNT)`.
///
/// [`billing_breakdown`] performs no validation of its own; callers check
/// this first.
pub fn is_billable_amount(amount: f64) -> bool {
    amount.is_finite() && amount > 0.0 && amount < MAX_BILLABLE_AMOUNT
}

/// Cost projection for routing the spend through the local invoice.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalBillingCost {
    pub commission: f64,
    /// Amount plus commission (the pre-IVA invoice value).
    pub subtotal: f64,
    pub iva: f64,
    pub total: f64,
}

/// Cost projection for paying the platform directly from abroad.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct InformalCost {
    pub isd: f64,
    pub subtotal: f64,
    pub iva: f64,
    pub total: f64,
}

/// Both projections for one requested amount, plus the derived savings.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillingBreakdown {
    pub requested_amount: f64,
    pub local: LocalBillingCost,
    pub informal: InformalCost,
    /// `informal.total - local.subtotal` (formal-channel IVA is recoverable).
    pub savings: f64,
}

impl ValueObject for LocalBillingCost {}
impl ValueObject for InformalCost {}
impl ValueObject for BillingBreakdown {}

/// Compute both cost projections for a requested spend.
///
/// Pure and deterministic: same input, bit-identical output. No rounding —
/// display layers format to two decimals. The caller must have validated
/// `amount` with [`is_billable_amount`]; this function does not.
pub fn billing_breakdown(amount: f64) -> BillingBreakdown {
    let commission = amount * COMMISSION_RATE;
    let local_subtotal = amount + commission;
    let local_iva = local_subtotal * IVA_RATE;
    let local_total = local_subtotal + local_iva;

    let isd = amount * ISD_RATE;
    let informal_subtotal = amount + isd;
    let informal_iva = informal_subtotal * IVA_RATE;
    let informal_total = informal_subtotal + informal_iva;

    BillingBreakdown {
        requested_amount: amount,
        local: LocalBillingCost {
            commission,
            subtotal: local_subtotal,
            iva: local_iva,
            total: local_total,
        },
        informal: InformalCost {
            isd,
            subtotal: informal_subtotal,
            iva: informal_iva,
            total: informal_total,
        },
        savings: informal_total - local_subtotal,
    }
}
