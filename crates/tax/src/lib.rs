//! `localbill-tax` — jurisdictional tax computations for local billing.
//!
//! Everything in this crate is a pure function over `f64` amounts producing
//! value objects. No rounding happens here; callers format for display
//! (see [`display::format_usd`]).
//!
//! Three distinct computations live side by side:
//!
//! - [`engine::billing_breakdown`] — the canonical engine (10% commission)
//!   backing the administrator's calculation step.
//! - [`estimate::quick_estimate`] — the admin quick-calculation mode (5.5%
//!   commission). The two rates are deliberately *not* reconciled; see the
//!   module docs.
//! - [`promo::promotional_comparison`] — the marketing ROI figure, which
//!   layers the hidden non-deductible-expense tax on the informal route.

pub mod display;
pub mod engine;
pub mod estimate;
pub mod promo;

pub use display::format_usd;
pub use engine::{
    BillingBreakdown, COMMISSION_RATE, ISD_RATE, IVA_RATE, InformalCost, LocalBillingCost,
    MAX_BILLABLE_AMOUNT, billing_breakdown, is_billable_amount,
};
pub use estimate::{QUICK_COMMISSION_RATE, QuickEstimate, quick_estimate};
pub use promo::{HIDDEN_EXPENSE_RATE, PromotionalComparison, promotional_comparison};
