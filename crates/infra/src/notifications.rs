//! Typed notifications emitted after committed transitions.
//!
//! One closed tagged type per event kind, each carrying the post-transition
//! snapshot of the record. The transport (long-lived connection, polling,
//! queue) is an external collaborator behind the `EventBus` abstraction;
//! delivery is best-effort and never blocks or rolls back a transition.

use serde::{Deserialize, Serialize};

use localbill_core::CompanyId;
use localbill_events::CompanyScoped;

use crate::projections::RequestSnapshot;

pub const TOPIC_NEW_REQUEST: &str = "new-request";
pub const TOPIC_STATUS_CHANGED: &str = "status-changed";
pub const TOPIC_GENERIC_UPDATE: &str = "generic-update";

/// A billing notification with its updated record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "request", rename_all = "kebab-case")]
pub enum Notification {
    /// A client opened a new recharge request.
    NewRequest(RequestSnapshot),
    /// A transition moved the request to a new status.
    StatusChanged(RequestSnapshot),
    /// The record changed without a status transition (e.g. a calculation
    /// revision while still calculated).
    GenericUpdate(RequestSnapshot),
}

impl Notification {
    pub fn topic(&self) -> &'static str {
        match self {
            Notification::NewRequest(_) => TOPIC_NEW_REQUEST,
            Notification::StatusChanged(_) => TOPIC_STATUS_CHANGED,
            Notification::GenericUpdate(_) => TOPIC_GENERIC_UPDATE,
        }
    }

    pub fn request(&self) -> &RequestSnapshot {
        match self {
            Notification::NewRequest(snapshot)
            | Notification::StatusChanged(snapshot)
            | Notification::GenericUpdate(snapshot) => snapshot,
        }
    }
}

impl CompanyScoped for Notification {
    fn company_id(&self) -> CompanyId {
        self.request().company_id
    }
}
