//! `integrations` crate: contracts for the collaborators the approval engine
//! talks to but does not own.
//!
//! * [`Notifier`] delivers notifications (email, in-app, …). Best-effort.
//! * [`ApproverResolver`] turns a step's [`ApproverRule`] into concrete user IDs.
//!
//! The engine crate dispatches through these trait objects and never encodes
//! org-chart or delivery logic itself.

pub mod error;
pub mod traits;
pub mod directory;
pub mod log;
pub mod mock;

pub use error::ResolveError;
pub use traits::{ApproverResolver, ApproverRule, DeliveryStatus, Notifier, ResolutionContext};
pub use directory::DirectoryResolver;
pub use log::LogNotifier;
