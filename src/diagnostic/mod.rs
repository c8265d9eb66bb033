//! Diagnostic recording: snapshots of blocked verdicts, the one-shot report
//! to the collector, and clipboard copy of the summary.

mod clipboard;
mod reporter;
mod snapshot;

pub use clipboard::{copy_with_fallback, Clipboard, MemoryClipboard, NoClipboard};
pub use reporter::{DiagnosticReporter, HttpReporter, NoopReporter};
pub use snapshot::{DiagnosticSnapshot, PageContext, SnapshotExtras, MAX_REPORT_BYTES};
