//! Keyed session state: records, broadcast hub, and the façade that ties
//! merge, validation, persistence of notes, and publishing together.

pub mod facade;
pub mod hub;
pub mod record;

pub use facade::SessionService;
pub use hub::{BroadcastHub, Subscription, DEFAULT_SUBSCRIBER_CAPACITY};
pub use record::{SessionListEntry, SessionRecord, SessionSnapshot, UpdateEnvelope};
