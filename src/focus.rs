/*
 * Remembers which child control had the keyboard focus when a window was
 * deactivated (or disabled by a modal), and puts it back on reactivation.
 * See https://devblogs.microsoft.com/oldnewthing/20140521-00/?p=943
 */
use std::cell::Cell;

use crate::native::NativeLayer;
use crate::types::WindowHandle;

#[derive(Debug, Default)]
pub struct FocusMemory {
    saved: Cell<Option<WindowHandle>>,
}

impl FocusMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn saved(&self) -> Option<WindowHandle> {
        self.saved.get()
    }

    /// Record `control` unconditionally (used by modals for their owner's focus).
    pub fn remember(&self, control: Option<WindowHandle>) {
        self.saved.set(control.and_then(WindowHandle::non_null));
    }

    /// On deactivation: remember the focused control if it belongs to `owner`.
    pub fn save_if_descendant(&self, native: &dyn NativeLayer, owner: WindowHandle) -> bool {
        match native.get_focus() {
            Some(focused) if native.is_child(owner, focused) => {
                log::trace!("FocusMemory: saving {focused:?} for {owner:?}");
                self.saved.set(Some(focused));
                true
            }
            _ => false,
        }
    }

    /*
     * Consumes the saved control. Focus is only moved when the control still
     * exists and is `owner` itself or one of its descendants; a stale or
     * reused handle is dropped silently.
     */
    pub fn restore(&self, native: &dyn NativeLayer, owner: WindowHandle) -> bool {
        let Some(control) = self.saved.take() else {
            return false;
        };
        if !native.is_window(control) {
            log::debug!("FocusMemory: {control:?} no longer exists, nothing to restore");
            return false;
        }
        if control != owner && !native.is_child(owner, control) {
            log::debug!("FocusMemory: {control:?} no longer belongs to {owner:?}, not restoring");
            return false;
        }
        log::trace!("FocusMemory: restoring focus to {control:?}");
        native.set_focus(control);
        true
    }

    /// Drops the saved control if it is `destroyed`.
    pub fn forget(&self, destroyed: WindowHandle) {
        if self.saved.get() == Some(destroyed) {
            log::trace!("FocusMemory: forgetting destroyed {destroyed:?}");
            self.saved.set(None);
        }
    }
}
