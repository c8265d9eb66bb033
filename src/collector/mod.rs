//! Server side of diagnostic reporting.
//!
//! Checkout pages POST `{token, diag}` when a widget is blocked. The
//! collector checks the shared token, caps the diagnostic and keeps only the
//! most recent one, which the back office displays read-only.

mod endpoint;
mod server;
mod store;

pub use endpoint::{
    cap_diagnostic, DiagnosticEndpoint, EndpointOutcome, EndpointResponse, MAX_FIELDS, MAX_STORED_BYTES,
};
pub use server::{CollectorBuilder, CollectorHandle, RunningCollector};
pub use store::{DiagnosticStore, FileStore, MemoryStore, StoredDiagnostic};
