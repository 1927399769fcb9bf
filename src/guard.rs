//! Navigation guard for an editing surface with unsaved changes.

/// What the editor should do when the user asks to cancel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelDecision {
    /// Unsaved changes exist; the confirmation prompt is now open.
    ConfirmRequired,
    /// Nothing to lose; close immediately.
    Close,
}

#[derive(Debug, Default, Clone)]
pub struct DirtyGuard {
    cancel_confirm_open: bool,
    saved: bool,
    bypass_next: bool,
}

impl DirtyGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block navigation iff no cancel confirmation is open, nothing was just
    /// saved, and the surface reports unsaved changes.
    pub fn should_block(&self, is_dirty: impl FnOnce() -> bool) -> bool {
        if self.cancel_confirm_open || self.saved {
            return false;
        }
        is_dirty()
    }

    /// Called at navigation-intercept time. Consumes a confirmed-cancel bypass.
    pub fn intercept_navigation(&mut self, is_dirty: impl FnOnce() -> bool) -> bool {
        if std::mem::take(&mut self.bypass_next) {
            return false;
        }
        self.should_block(is_dirty)
    }

    /// Set immediately before invoking the save action. Never cleared.
    pub fn mark_saved(&mut self) {
        self.saved = true;
    }

    pub fn is_saved(&self) -> bool {
        self.saved
    }

    pub fn is_cancel_confirm_open(&self) -> bool {
        self.cancel_confirm_open
    }

    pub fn request_cancel(&mut self, is_dirty: impl FnOnce() -> bool) -> CancelDecision {
        if is_dirty() {
            self.cancel_confirm_open = true;
            CancelDecision::ConfirmRequired
        } else {
            CancelDecision::Close
        }
    }

    /// User confirmed discarding edits: the next navigation passes unguarded.
    pub fn confirm_cancel(&mut self) {
        self.cancel_confirm_open = false;
        self.bypass_next = true;
    }

    /// User backed out of the confirmation and keeps editing.
    pub fn dismiss_cancel(&mut self) {
        self.cancel_confirm_open = false;
    }
}
