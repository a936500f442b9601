//! `localbill-events` — event abstractions (mechanics only, no business rules).
//!
//! Events are the source of truth for a billing request's history; everything
//! else (the current record, metrics, directories) is a disposable read model
//! rebuilt from them.

pub mod bus;
pub mod command;
pub mod company;
pub mod envelope;
pub mod event;
pub mod handler;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use command::Command;
pub use company::CompanyScoped;
pub use envelope::EventEnvelope;
pub use event::Event;
pub use handler::execute;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
