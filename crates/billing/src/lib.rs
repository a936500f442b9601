//! Billing-request domain module (event-sourced).
//!
//! This crate contains the business rules for a recharge request's lifecycle,
//! implemented purely as deterministic domain logic (no IO, no HTTP, no
//! storage).

pub mod request;

pub use request::{
    ActorRole, AdPlatform, ApproveCalculation, BillingStatus, CalculationApproved,
    CalculationCommitted, CommitCalculation, CompleteRequest, EmitInvoice, ExecuteRecharge,
    FailRequest, InvoiceEmitted, OpenRequest, PaymentRegistered, RechargeCommand, RechargeEvent,
    RechargeExecuted, RechargeRequest, RechargeRequestId, RegisterPayment, RequestCompleted,
    RequestFailed, RequestOpened, TaxFigures,
};
