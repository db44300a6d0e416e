use crate::block::Block;
use crate::error::Result;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

/// Buffers keystrokes for one block and commits them as a single change
/// once typing pauses for the debounce window.
///
/// Reads through [`ContentDraft::content`] flush first, and dropping the
/// draft commits whatever is still pending.
pub struct ContentDraft {
    block: Block,
    debounce: Duration,
    pending: Option<String>,
    last_edit: Option<Instant>,
}

impl ContentDraft {
    pub fn new(block: Block, debounce: Duration) -> Self {
        Self {
            block,
            debounce,
            pending: None,
            last_edit: None,
        }
    }

    pub fn block(&self) -> &Block {
        &self.block
    }

    pub fn is_dirty(&self) -> bool {
        self.pending.is_some()
    }

    pub fn update(&mut self, text: impl Into<String>, now: Instant) {
        self.pending = Some(text.into());
        self.last_edit = Some(now);
    }

    /// Commits the pending text if the debounce window has elapsed.
    pub fn tick(&mut self, now: Instant) -> Result<bool> {
        match self.last_edit {
            Some(last) if now.saturating_duration_since(last) >= self.debounce => self.flush(),
            _ => Ok(false),
        }
    }

    /// Commits the pending text. The text stays pending when the block
    /// cannot be read or written.
    pub fn flush(&mut self) -> Result<bool> {
        let Some(text) = self.pending.clone() else {
            self.last_edit = None;
            return Ok(false);
        };
        let changed = self.block.content()? != text;
        if changed {
            debug!(block = %self.block.id(), "committing draft");
            self.block.set_content(text)?;
        }
        self.pending = None;
        self.last_edit = None;
        Ok(changed)
    }

    pub fn content(&mut self) -> Result<String> {
        self.flush()?;
        self.block.content()
    }

    pub fn is_empty(&mut self) -> Result<bool> {
        Ok(self.content()?.is_empty())
    }
}

impl Drop for ContentDraft {
    fn drop(&mut self) {
        if let Err(err) = self.flush() {
            warn!(block = %self.block.id(), error = %err, "failed to flush draft");
        }
    }
}
