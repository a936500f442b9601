use localbill_core::AggregateId;

/// A command targets a specific aggregate (command abstraction).
///
/// Commands represent **intent** — a request to perform an action on an
/// aggregate. They are transient (not persisted) and are transformed into
/// events (which are persisted). A command is rejected if invalid; an event
/// represents an accepted change.
///
/// Each command targets exactly one aggregate via `target_aggregate_id()`,
/// which is also the transaction boundary: transitions on different records
/// proceed independently, while transitions on the same record are
/// serialized by the store's version check.
///
/// Company scoping is enforced at the event level (envelopes), not here;
/// commands stay focused on business intent.
pub trait Command: Clone + core::fmt::Debug + Send + Sync + 'static {
    fn target_aggregate_id(&self) -> AggregateId;
}
