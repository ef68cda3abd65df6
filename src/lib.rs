//! formsync: accident-report form state synchronization service.
//!
//! Keeps one authoritative session document per conversation key in sync
//! across a conversational agent, a manual wizard UI, and any number of
//! live stream observers, and fronts a CRUD surface for submitted
//! applications with attachments.

pub mod analysis;
pub mod config;
pub mod error;
pub mod form;
pub mod server;
pub mod session;
pub mod store;

pub use error::{FormsyncError, Result};
