//! Administrative quick-calculation mode.
//!
//! The admin console carries a quick estimator that runs at a 5.5%
//! commission rate instead of the engine's 10%. The two rates coexist in
//! the product and are intentionally kept as separately named computations
//! rather than unified; which one is authoritative is an open product
//! question (see DESIGN.md).

use serde::{Deserialize, Serialize};

use localbill_core::ValueObject;

use crate::engine::IVA_RATE;

/// Commission rate used by the quick estimator only.
pub const QUICK_COMMISSION_RATE: f64 = 0.055;

/// Quick-estimate figures for an amount at the reduced commission rate.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuickEstimate {
    pub requested_amount: f64,
    pub commission: f64,
    pub subtotal: f64,
    pub iva: f64,
    pub total: f64,
}

impl ValueObject for QuickEstimate {}

/// Estimate local-billing cost at the 5.5% commission rate.
///
/// Pure; no validation, no rounding (same contract as the engine).
pub fn quick_estimate(amount: f64) -> QuickEstimate {
    let commission = amount * QUICK_COMMISSION_RATE;
    let subtotal = amount + commission;
    let iva = subtotal * IVA_RATE;

    QuickEstimate {
        requested_amount: amount,
        commission,
        subtotal,
        iva,
        total: subtotal + iva,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimate_uses_reduced_commission() {
        let e = quick_estimate(10_000.0);
        assert!((e.commission - 550.0).abs() < 1e-9);
        assert!((e.subtotal - 10_550.0).abs() < 1e-9);
        assert!((e.iva - 1_582.5).abs() < 1e-6);
        assert!((e.total - 12_132.5).abs() < 1e-6);
    }

    #[test]
    fn estimate_differs_from_engine_rate() {
        let e = quick_estimate(1_000.0);
        let b = crate::engine::billing_breakdown(1_000.0);
        assert!(e.total < b.local.total);
    }
}
