//! Admission webhook surface.
//!
//! The server answers every admission call with "allowed" and feeds the body
//! to the event pipeline in the background. Drop policies decide which
//! events reach the queue:
//! - Dry-run requests are never forwarded
//! - Events from excluded namespaces are never forwarded

mod in_flight;
pub mod policies;
mod server;

pub use in_flight::InFlight;
pub use policies::{DropReason, ExcludedNamespaces, FilterResult, PolicyFilter};
pub use server::{
    AdmissionAllowed, WEBHOOK_PORT, WebhookError, WebhookState, create_app,
    create_webhook_router, run_webhook_server,
};
