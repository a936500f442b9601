use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use localbill_core::{Aggregate, AggregateId, AggregateRoot, CompanyId, DomainError, ValueObject};
use localbill_events::Event;
use localbill_tax::{BillingBreakdown, MAX_BILLABLE_AMOUNT, is_billable_amount};

/// Recharge request identifier (company-scoped via `company_id` fields in
/// events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RechargeRequestId(pub AggregateId);

impl RechargeRequestId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for RechargeRequestId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Advertising platform a recharge targets. One per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdPlatform {
    Meta,
    TikTok,
    Google,
    LinkedIn,
}

impl core::fmt::Display for AdPlatform {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            AdPlatform::Meta => "Meta",
            AdPlatform::TikTok => "TikTok",
            AdPlatform::Google => "Google",
            AdPlatform::LinkedIn => "LinkedIn",
        };
        f.write_str(name)
    }
}

/// Who is attempting a transition. Role gating is part of the transition
/// contract: each command names its issuer and handlers reject the wrong role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActorRole {
    Client,
    Admin,
    System,
}

impl core::fmt::Display for ActorRole {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            ActorRole::Client => "client",
            ActorRole::Admin => "administrator",
            ActorRole::System => "system",
        };
        f.write_str(name)
    }
}

/// Recharge request status lifecycle.
///
/// The happy path is strictly ordered; `Error` is reachable from any
/// non-terminal status. `Completed` and `Error` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingStatus {
    RequestCreated,
    Calculated,
    ApprovedByClient,
    Invoiced,
    Paid,
    RechargeExecuted,
    Completed,
    Error,
}

impl BillingStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, BillingStatus::Completed | BillingStatus::Error)
    }
}

impl core::fmt::Display for BillingStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            BillingStatus::RequestCreated => "request_created",
            BillingStatus::Calculated => "calculated",
            BillingStatus::ApprovedByClient => "approved_by_client",
            BillingStatus::Invoiced => "invoiced",
            BillingStatus::Paid => "paid",
            BillingStatus::RechargeExecuted => "recharge_executed",
            BillingStatus::Completed => "completed",
            BillingStatus::Error => "error",
        };
        f.write_str(name)
    }
}

/// The administrator-committed calculation for a request.
///
/// `base` is the taxable base of the local invoice (requested amount plus
/// commission, pre-IVA); `total` is the amount payable.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TaxFigures {
    pub base: f64,
    pub commission: f64,
    pub total: f64,
}

impl TaxFigures {
    /// The engine's suggested figures for a requested amount.
    pub fn from_breakdown(breakdown: &BillingBreakdown) -> Self {
        Self {
            base: breakdown.local.subtotal,
            commission: breakdown.local.commission,
            total: breakdown.local.total,
        }
    }

    fn is_payable(&self) -> bool {
        self.base.is_finite()
            && self.commission.is_finite()
            && self.total.is_finite()
            && self.base > 0.0
            && self.commission >= 0.0
            && self.total > 0.0
    }
}

impl ValueObject for TaxFigures {}

/// Aggregate root: RechargeRequest.
///
/// Never deleted; the full event stream is the audit trail.
#[derive(Debug, Clone, PartialEq)]
pub struct RechargeRequest {
    id: RechargeRequestId,
    company_id: Option<CompanyId>,
    platform: Option<AdPlatform>,
    requested_amount: f64,
    figures: Option<TaxFigures>,
    status: BillingStatus,
    invoice_number: Option<String>,
    invoice_document_ref: Option<String>,
    payment_proof_ref: Option<String>,
    error_message: Option<String>,
    created_at: Option<DateTime<Utc>>,
    calculated_at: Option<DateTime<Utc>>,
    approved_at: Option<DateTime<Utc>>,
    invoiced_at: Option<DateTime<Utc>>,
    paid_at: Option<DateTime<Utc>>,
    recharge_executed_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl RechargeRequest {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: RechargeRequestId) -> Self {
        Self {
            id,
            company_id: None,
            platform: None,
            requested_amount: 0.0,
            figures: None,
            status: BillingStatus::RequestCreated,
            invoice_number: None,
            invoice_document_ref: None,
            payment_proof_ref: None,
            error_message: None,
            created_at: None,
            calculated_at: None,
            approved_at: None,
            invoiced_at: None,
            paid_at: None,
            recharge_executed_at: None,
            completed_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> RechargeRequestId {
        self.id
    }

    pub fn company_id(&self) -> Option<CompanyId> {
        self.company_id
    }

    pub fn platform(&self) -> Option<AdPlatform> {
        self.platform
    }

    pub fn requested_amount(&self) -> f64 {
        self.requested_amount
    }

    pub fn figures(&self) -> Option<&TaxFigures> {
        self.figures.as_ref()
    }

    pub fn status(&self) -> BillingStatus {
        self.status
    }

    pub fn invoice_number(&self) -> Option<&str> {
        self.invoice_number.as_deref()
    }

    pub fn invoice_document_ref(&self) -> Option<&str> {
        self.invoice_document_ref.as_deref()
    }

    pub fn payment_proof_ref(&self) -> Option<&str> {
        self.payment_proof_ref.as_deref()
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn calculated_at(&self) -> Option<DateTime<Utc>> {
        self.calculated_at
    }

    pub fn approved_at(&self) -> Option<DateTime<Utc>> {
        self.approved_at
    }

    pub fn invoiced_at(&self) -> Option<DateTime<Utc>> {
        self.invoiced_at
    }

    pub fn paid_at(&self) -> Option<DateTime<Utc>> {
        self.paid_at
    }

    pub fn recharge_executed_at(&self) -> Option<DateTime<Utc>> {
        self.recharge_executed_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn exists(&self) -> bool {
        self.created
    }

    /// Figures may be committed while the request is freshly created and
    /// revised while calculated; they freeze once the client approves.
    pub fn is_calculation_revisable(&self) -> bool {
        matches!(
            self.status,
            BillingStatus::RequestCreated | BillingStatus::Calculated
        )
    }

    pub fn is_invoice_allowed(&self) -> bool {
        matches!(self.status, BillingStatus::ApprovedByClient)
    }
}

impl AggregateRoot for RechargeRequest {
    type Id = RechargeRequestId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: OpenRequest (client declares ad spend to be billed locally).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenRequest {
    pub company_id: CompanyId,
    pub request_id: RechargeRequestId,
    pub platform: AdPlatform,
    pub amount: f64,
    pub actor: ActorRole,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CommitCalculation (admin commits or revises the tax figures).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitCalculation {
    pub company_id: CompanyId,
    pub request_id: RechargeRequestId,
    pub figures: TaxFigures,
    pub actor: ActorRole,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ApproveCalculation (client accepts the committed figures).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApproveCalculation {
    pub company_id: CompanyId,
    pub request_id: RechargeRequestId,
    pub actor: ActorRole,
    pub occurred_at: DateTime<Utc>,
}

/// Command: EmitInvoice (admin issues the local invoice).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmitInvoice {
    pub company_id: CompanyId,
    pub request_id: RechargeRequestId,
    pub invoice_number: String,
    /// Opaque reference from the invoice-document collaborator, if any.
    pub document_ref: Option<String>,
    pub actor: ActorRole,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RegisterPayment (admin records the client's payment).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterPayment {
    pub company_id: CompanyId,
    pub request_id: RechargeRequestId,
    /// Opaque reference to payment evidence, if any.
    pub proof_ref: Option<String>,
    pub actor: ActorRole,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ExecuteRecharge (admin credits the ad-platform account).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecuteRecharge {
    pub company_id: CompanyId,
    pub request_id: RechargeRequestId,
    pub actor: ActorRole,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CompleteRequest (admin closes a recharged request).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompleteRequest {
    pub company_id: CompanyId,
    pub request_id: RechargeRequestId,
    pub actor: ActorRole,
    pub occurred_at: DateTime<Utc>,
}

/// Command: FailRequest (operational failure; designed outcome, not a crash).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailRequest {
    pub company_id: CompanyId,
    pub request_id: RechargeRequestId,
    pub message: String,
    pub actor: ActorRole,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RechargeCommand {
    OpenRequest(OpenRequest),
    CommitCalculation(CommitCalculation),
    ApproveCalculation(ApproveCalculation),
    EmitInvoice(EmitInvoice),
    RegisterPayment(RegisterPayment),
    ExecuteRecharge(ExecuteRecharge),
    CompleteRequest(CompleteRequest),
    FailRequest(FailRequest),
}

impl RechargeCommand {
    pub fn company_id(&self) -> CompanyId {
        match self {
            RechargeCommand::OpenRequest(c) => c.company_id,
            RechargeCommand::CommitCalculation(c) => c.company_id,
            RechargeCommand::ApproveCalculation(c) => c.company_id,
            RechargeCommand::EmitInvoice(c) => c.company_id,
            RechargeCommand::RegisterPayment(c) => c.company_id,
            RechargeCommand::ExecuteRecharge(c) => c.company_id,
            RechargeCommand::CompleteRequest(c) => c.company_id,
            RechargeCommand::FailRequest(c) => c.company_id,
        }
    }

    pub fn request_id(&self) -> RechargeRequestId {
        match self {
            RechargeCommand::OpenRequest(c) => c.request_id,
            RechargeCommand::CommitCalculation(c) => c.request_id,
            RechargeCommand::ApproveCalculation(c) => c.request_id,
            RechargeCommand::EmitInvoice(c) => c.request_id,
            RechargeCommand::RegisterPayment(c) => c.request_id,
            RechargeCommand::ExecuteRecharge(c) => c.request_id,
            RechargeCommand::CompleteRequest(c) => c.request_id,
            RechargeCommand::FailRequest(c) => c.request_id,
        }
    }
}

impl localbill_events::Command for RechargeCommand {
    fn target_aggregate_id(&self) -> AggregateId {
        self.request_id().0
    }
}

/// Event: RequestOpened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestOpened {
    pub company_id: CompanyId,
    pub request_id: RechargeRequestId,
    pub platform: AdPlatform,
    pub amount: f64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: CalculationCommitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculationCommitted {
    pub company_id: CompanyId,
    pub request_id: RechargeRequestId,
    pub figures: TaxFigures,
    pub occurred_at: DateTime<Utc>,
}

/// Event: CalculationApproved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculationApproved {
    pub company_id: CompanyId,
    pub request_id: RechargeRequestId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: InvoiceEmitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceEmitted {
    pub company_id: CompanyId,
    pub request_id: RechargeRequestId,
    pub invoice_number: String,
    pub document_ref: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PaymentRegistered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRegistered {
    pub company_id: CompanyId,
    pub request_id: RechargeRequestId,
    pub proof_ref: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RechargeExecuted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RechargeExecuted {
    pub company_id: CompanyId,
    pub request_id: RechargeRequestId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RequestCompleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestCompleted {
    pub company_id: CompanyId,
    pub request_id: RechargeRequestId,
    /// The frozen calculated total; the revenue metric accrues exactly this.
    pub total: f64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RequestFailed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestFailed {
    pub company_id: CompanyId,
    pub request_id: RechargeRequestId,
    pub message: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RechargeEvent {
    RequestOpened(RequestOpened),
    CalculationCommitted(CalculationCommitted),
    CalculationApproved(CalculationApproved),
    InvoiceEmitted(InvoiceEmitted),
    PaymentRegistered(PaymentRegistered),
    RechargeExecuted(RechargeExecuted),
    RequestCompleted(RequestCompleted),
    RequestFailed(RequestFailed),
}

impl RechargeEvent {
    pub fn company_id(&self) -> CompanyId {
        match self {
            RechargeEvent::RequestOpened(e) => e.company_id,
            RechargeEvent::CalculationCommitted(e) => e.company_id,
            RechargeEvent::CalculationApproved(e) => e.company_id,
            RechargeEvent::InvoiceEmitted(e) => e.company_id,
            RechargeEvent::PaymentRegistered(e) => e.company_id,
            RechargeEvent::RechargeExecuted(e) => e.company_id,
            RechargeEvent::RequestCompleted(e) => e.company_id,
            RechargeEvent::RequestFailed(e) => e.company_id,
        }
    }

    pub fn request_id(&self) -> RechargeRequestId {
        match self {
            RechargeEvent::RequestOpened(e) => e.request_id,
            RechargeEvent::CalculationCommitted(e) => e.request_id,
            RechargeEvent::CalculationApproved(e) => e.request_id,
            RechargeEvent::InvoiceEmitted(e) => e.request_id,
            RechargeEvent::PaymentRegistered(e) => e.request_id,
            RechargeEvent::RechargeExecuted(e) => e.request_id,
            RechargeEvent::RequestCompleted(e) => e.request_id,
            RechargeEvent::RequestFailed(e) => e.request_id,
        }
    }
}

impl Event for RechargeEvent {
    fn event_type(&self) -> &'static str {
        match self {
            RechargeEvent::RequestOpened(_) => "billing.request.opened",
            RechargeEvent::CalculationCommitted(_) => "billing.request.calculation_committed",
            RechargeEvent::CalculationApproved(_) => "billing.request.calculation_approved",
            RechargeEvent::InvoiceEmitted(_) => "billing.request.invoice_emitted",
            RechargeEvent::PaymentRegistered(_) => "billing.request.payment_registered",
            RechargeEvent::RechargeExecuted(_) => "billing.request.recharge_executed",
            RechargeEvent::RequestCompleted(_) => "billing.request.completed",
            RechargeEvent::RequestFailed(_) => "billing.request.failed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            RechargeEvent::RequestOpened(e) => e.occurred_at,
            RechargeEvent::CalculationCommitted(e) => e.occurred_at,
            RechargeEvent::CalculationApproved(e) => e.occurred_at,
            RechargeEvent::InvoiceEmitted(e) => e.occurred_at,
            RechargeEvent::PaymentRegistered(e) => e.occurred_at,
            RechargeEvent::RechargeExecuted(e) => e.occurred_at,
            RechargeEvent::RequestCompleted(e) => e.occurred_at,
            RechargeEvent::RequestFailed(e) => e.occurred_at,
        }
    }
}

impl Aggregate for RechargeRequest {
    type Command = RechargeCommand;
    type Event = RechargeEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            RechargeEvent::RequestOpened(e) => {
                self.id = e.request_id;
                self.company_id = Some(e.company_id);
                self.platform = Some(e.platform);
                self.requested_amount = e.amount;
                self.status = BillingStatus::RequestCreated;
                self.created_at = Some(e.occurred_at);
                self.created = true;
            }
            RechargeEvent::CalculationCommitted(e) => {
                self.figures = Some(e.figures);
                // A revision while already calculated replaces the figures but
                // keeps the original transition timestamp.
                if self.status != BillingStatus::Calculated {
                    self.calculated_at = Some(e.occurred_at);
                }
                self.status = BillingStatus::Calculated;
            }
            RechargeEvent::CalculationApproved(e) => {
                self.status = BillingStatus::ApprovedByClient;
                self.approved_at = Some(e.occurred_at);
            }
            RechargeEvent::InvoiceEmitted(e) => {
                self.invoice_number = Some(e.invoice_number.clone());
                self.invoice_document_ref = e.document_ref.clone();
                self.status = BillingStatus::Invoiced;
                self.invoiced_at = Some(e.occurred_at);
            }
            RechargeEvent::PaymentRegistered(e) => {
                self.payment_proof_ref = e.proof_ref.clone();
                self.status = BillingStatus::Paid;
                self.paid_at = Some(e.occurred_at);
            }
            RechargeEvent::RechargeExecuted(e) => {
                self.status = BillingStatus::RechargeExecuted;
                self.recharge_executed_at = Some(e.occurred_at);
            }
            RechargeEvent::RequestCompleted(e) => {
                self.status = BillingStatus::Completed;
                self.completed_at = Some(e.occurred_at);
            }
            RechargeEvent::RequestFailed(e) => {
                self.status = BillingStatus::Error;
                self.error_message = Some(e.message.clone());
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            RechargeCommand::OpenRequest(cmd) => self.handle_open(cmd),
            RechargeCommand::CommitCalculation(cmd) => self.handle_commit_calculation(cmd),
            RechargeCommand::ApproveCalculation(cmd) => self.handle_approve(cmd),
            RechargeCommand::EmitInvoice(cmd) => self.handle_emit_invoice(cmd),
            RechargeCommand::RegisterPayment(cmd) => self.handle_register_payment(cmd),
            RechargeCommand::ExecuteRecharge(cmd) => self.handle_execute_recharge(cmd),
            RechargeCommand::CompleteRequest(cmd) => self.handle_complete(cmd),
            RechargeCommand::FailRequest(cmd) => self.handle_fail(cmd),
        }
    }
}

impl RechargeRequest {
    fn ensure_company(&self, company_id: CompanyId) -> Result<(), DomainError> {
        if !self.created {
            return Ok(());
        }
        if self.company_id != Some(company_id) {
            return Err(DomainError::precondition("company mismatch"));
        }
        Ok(())
    }

    fn ensure_request_id(&self, request_id: RechargeRequestId) -> Result<(), DomainError> {
        if self.id != request_id {
            return Err(DomainError::precondition("request_id mismatch"));
        }
        Ok(())
    }

    fn ensure_exists(&self) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        Ok(())
    }

    fn ensure_role(&self, actor: ActorRole, allowed: &[ActorRole]) -> Result<(), DomainError> {
        if !allowed.contains(&actor) {
            return Err(DomainError::precondition(format!(
                "action not permitted for {actor}"
            )));
        }
        Ok(())
    }

    fn ensure_not_terminal(&self) -> Result<(), DomainError> {
        if self.status.is_terminal() {
            return Err(DomainError::terminal(format!(
                "no transitions allowed from status '{}'",
                self.status
            )));
        }
        Ok(())
    }

    fn ensure_status(&self, expected: BillingStatus) -> Result<(), DomainError> {
        if self.status != expected {
            return Err(DomainError::state(expected, self.status));
        }
        Ok(())
    }

    fn handle_open(&self, cmd: &OpenRequest) -> Result<Vec<RechargeEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("recharge request already exists"));
        }
        self.ensure_role(cmd.actor, &[ActorRole::Client])?;

        if !cmd.amount.is_finite() {
            return Err(DomainError::validation(
                "requested amount must be a finite number",
            ));
        }
        if cmd.amount <= 0.0 {
            return Err(DomainError::validation(
                "requested amount must be greater than $0",
            ));
        }
        if cmd.amount >= MAX_BILLABLE_AMOUNT {
            return Err(DomainError::validation(
                "requested amount must be below $1,000,000",
            ));
        }
        debug_assert!(is_billable_amount(cmd.amount));

        Ok(vec![RechargeEvent::RequestOpened(RequestOpened {
            company_id: cmd.company_id,
            request_id: cmd.request_id,
            platform: cmd.platform,
            amount: cmd.amount,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_commit_calculation(
        &self,
        cmd: &CommitCalculation,
    ) -> Result<Vec<RechargeEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_company(cmd.company_id)?;
        self.ensure_request_id(cmd.request_id)?;
        self.ensure_role(cmd.actor, &[ActorRole::Admin])?;
        self.ensure_not_terminal()?;

        if !self.is_calculation_revisable() {
            return Err(DomainError::state(
                "request_created or calculated",
                self.status,
            ));
        }

        if !cmd.figures.is_payable() {
            return Err(DomainError::validation(
                "calculated figures must be finite and positive",
            ));
        }

        Ok(vec![RechargeEvent::CalculationCommitted(
            CalculationCommitted {
                company_id: cmd.company_id,
                request_id: cmd.request_id,
                figures: cmd.figures,
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_approve(
        &self,
        cmd: &ApproveCalculation,
    ) -> Result<Vec<RechargeEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_company(cmd.company_id)?;
        self.ensure_request_id(cmd.request_id)?;
        self.ensure_role(cmd.actor, &[ActorRole::Client])?;
        self.ensure_not_terminal()?;
        self.ensure_status(BillingStatus::Calculated)?;

        if self.figures.is_none() {
            return Err(DomainError::precondition(
                "cannot approve before a calculation is committed",
            ));
        }

        Ok(vec![RechargeEvent::CalculationApproved(
            CalculationApproved {
                company_id: cmd.company_id,
                request_id: cmd.request_id,
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_emit_invoice(&self, cmd: &EmitInvoice) -> Result<Vec<RechargeEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_company(cmd.company_id)?;
        self.ensure_request_id(cmd.request_id)?;
        self.ensure_role(cmd.actor, &[ActorRole::Admin])?;
        self.ensure_not_terminal()?;

        if !self.is_invoice_allowed() {
            return Err(DomainError::state(BillingStatus::ApprovedByClient, self.status));
        }

        let payable = self.figures.as_ref().is_some_and(|f| f.total > 0.0);
        if !payable {
            return Err(DomainError::validation(
                "cannot emit an invoice without a positive calculated total",
            ));
        }

        if cmd.invoice_number.trim().is_empty() {
            return Err(DomainError::validation("invoice number must not be empty"));
        }

        Ok(vec![RechargeEvent::InvoiceEmitted(InvoiceEmitted {
            company_id: cmd.company_id,
            request_id: cmd.request_id,
            invoice_number: cmd.invoice_number.clone(),
            document_ref: cmd.document_ref.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_register_payment(
        &self,
        cmd: &RegisterPayment,
    ) -> Result<Vec<RechargeEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_company(cmd.company_id)?;
        self.ensure_request_id(cmd.request_id)?;
        self.ensure_role(cmd.actor, &[ActorRole::Admin])?;
        self.ensure_not_terminal()?;
        self.ensure_status(BillingStatus::Invoiced)?;

        Ok(vec![RechargeEvent::PaymentRegistered(PaymentRegistered {
            company_id: cmd.company_id,
            request_id: cmd.request_id,
            proof_ref: cmd.proof_ref.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_execute_recharge(
        &self,
        cmd: &ExecuteRecharge,
    ) -> Result<Vec<RechargeEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_company(cmd.company_id)?;
        self.ensure_request_id(cmd.request_id)?;
        self.ensure_role(cmd.actor, &[ActorRole::Admin])?;
        self.ensure_not_terminal()?;
        self.ensure_status(BillingStatus::Paid)?;

        Ok(vec![RechargeEvent::RechargeExecuted(RechargeExecuted {
            company_id: cmd.company_id,
            request_id: cmd.request_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_complete(&self, cmd: &CompleteRequest) -> Result<Vec<RechargeEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_company(cmd.company_id)?;
        self.ensure_request_id(cmd.request_id)?;
        self.ensure_role(cmd.actor, &[ActorRole::Admin])?;
        self.ensure_not_terminal()?;
        self.ensure_status(BillingStatus::RechargeExecuted)?;

        let figures = self.figures.as_ref().ok_or_else(|| {
            DomainError::precondition("cannot complete without committed figures")
        })?;

        Ok(vec![RechargeEvent::RequestCompleted(RequestCompleted {
            company_id: cmd.company_id,
            request_id: cmd.request_id,
            total: figures.total,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_fail(&self, cmd: &FailRequest) -> Result<Vec<RechargeEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_company(cmd.company_id)?;
        self.ensure_request_id(cmd.request_id)?;
        self.ensure_role(cmd.actor, &[ActorRole::Admin, ActorRole::System])?;
        self.ensure_not_terminal()?;

        if cmd.message.trim().is_empty() {
            return Err(DomainError::validation("failure message must not be empty"));
        }

        Ok(vec![RechargeEvent::RequestFailed(RequestFailed {
            company_id: cmd.company_id,
            request_id: cmd.request_id,
            message: cmd.message.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}
