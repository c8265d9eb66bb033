//! Clipboard access for the copy button.

use tracing::{debug, warn};

/// A clipboard the host exposes.
pub trait Clipboard: Send {
    /// Write text.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Clipboard`] when the write is refused.
    fn write_text(&mut self, text: &str) -> crate::Result<()>;
}

/// Clipboard that refuses every write. Used when the host has none.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoClipboard;

impl Clipboard for NoClipboard {
    fn write_text(&mut self, _text: &str) -> crate::Result<()> {
        Err(crate::Error::Clipboard("no clipboard available".to_string()))
    }
}

/// Clipboard that keeps the last written text in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryClipboard {
    contents: Option<String>,
}

impl MemoryClipboard {
    /// Last written text.
    #[must_use]
    pub fn contents(&self) -> Option<&str> {
        self.contents.as_deref()
    }
}

impl Clipboard for MemoryClipboard {
    fn write_text(&mut self, text: &str) -> crate::Result<()> {
        self.contents = Some(text.to_string());
        Ok(())
    }
}

/// Try the primary clipboard, then the fallback. Returns whether either
/// accepted the text.
pub fn copy_with_fallback(
    primary: &mut dyn Clipboard,
    fallback: &mut dyn Clipboard,
    text: &str,
) -> bool {
    match primary.write_text(text) {
        Ok(()) => true,
        Err(e) => {
            debug!("primary clipboard failed, trying fallback: {e}");
            match fallback.write_text(text) {
                Ok(()) => true,
                Err(e) => {
                    warn!("clipboard copy failed: {e}");
                    false
                }
            }
        }
    }
}
