/*
 * Per-window table mapping an `EventKey` to exactly one handler. The framework
 * installs its default handlers with `register_default`, which never displaces
 * a handler the application registered itself; application registrations use
 * `register` and always win (last write wins).
 *
 * Handlers are stored as `Rc` so dispatch can clone the handler out of the
 * table and release the borrow before invoking it. Handlers routinely cause
 * re-entrant messages (destroying a window, moving focus) that come straight
 * back into the same registry.
 */
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::error::Result as PlatformResult;
use crate::message::{Message, NotifyHeader, hiword, loword, wm};
use crate::types::{CommandId, ControlId};

/// A message handler. `Ok(None)` asks for default native processing,
/// `Ok(Some(r))` returns `r` to the native caller.
pub type Handler = dyn Fn(&Message) -> PlatformResult<Option<isize>>;

/// Composite dispatch key: message kind plus an optional discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKey {
    Message(u32),
    Command { id: CommandId, code: u16 },
    Notify { id: ControlId, code: i32 },
    Timer(usize),
}

impl EventKey {
    /// The discriminated key for `msg`, if its kind has one.
    pub fn specific(msg: &Message, notify: Option<&NotifyHeader>) -> Option<EventKey> {
        match msg.msg {
            // Control notifications (lparam != 0) carry arbitrary codes; menus
            // and accelerators use 0 and 1.
            wm::COMMAND => Some(EventKey::Command {
                id: CommandId(loword(msg.wparam)),
                code: hiword(msg.wparam),
            }),
            wm::NOTIFY => notify.map(|hdr| EventKey::Notify {
                id: hdr.id_from,
                code: hdr.code,
            }),
            wm::TIMER => Some(EventKey::Timer(msg.wparam)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerOrigin {
    /// Supplied by the window controller (focus tracking, quit on destroy, ...).
    Default,
    /// Supplied by application code.
    User,
}

#[derive(Clone)]
pub struct HandlerEntry {
    pub handler: Rc<Handler>,
    pub origin: HandlerOrigin,
}

impl fmt::Debug for HandlerEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerEntry")
            .field("origin", &self.origin)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default)]
pub struct EventRegistry {
    entries: HashMap<EventKey, HandlerEntry>,
    released: bool,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Application registration: replaces whatever was there.
    pub fn register(&mut self, key: EventKey, handler: Rc<Handler>) {
        self.insert(key, handler, HandlerOrigin::User);
    }

    /// Framework registration: only fills keys the application has not claimed.
    /// Returns whether the handler was installed.
    pub fn register_default(&mut self, key: EventKey, handler: Rc<Handler>) -> bool {
        if let Some(existing) = self.entries.get(&key) {
            if existing.origin == HandlerOrigin::User {
                log::trace!("EventRegistry: default for {key:?} skipped, user handler present");
                return false;
            }
        }
        self.insert(key, handler, HandlerOrigin::Default)
    }

    fn insert(&mut self, key: EventKey, handler: Rc<Handler>, origin: HandlerOrigin) -> bool {
        if self.released {
            log::warn!("EventRegistry: ignoring {origin:?} registration of {key:?} after release");
            return false;
        }
        if self
            .entries
            .insert(key, HandlerEntry { handler, origin })
            .is_some()
        {
            log::trace!("EventRegistry: {key:?} overwritten by {origin:?} handler");
        }
        true
    }

    pub fn resolve(&self, key: &EventKey) -> Option<Rc<Handler>> {
        self.entries.get(key).map(|entry| Rc::clone(&entry.handler))
    }

    pub fn origin(&self, key: &EventKey) -> Option<HandlerOrigin> {
        self.entries.get(key).map(|entry| entry.origin)
    }

    pub fn contains(&self, key: &EventKey) -> bool {
        self.entries.contains_key(key)
    }

    /*
     * Resolves a native message: the discriminated key first (a specific
     * command id, notification or timer), then the bare message kind.
     */
    pub fn resolve_message(
        &self,
        msg: &Message,
        notify: Option<&NotifyHeader>,
    ) -> Option<Rc<Handler>> {
        EventKey::specific(msg, notify)
            .and_then(|key| self.resolve(&key))
            .or_else(|| self.resolve(&EventKey::Message(msg.msg)))
    }

    /// Resolves and invokes. Handler errors are returned as-is.
    pub fn dispatch(&self, key: &EventKey, msg: &Message) -> PlatformResult<Option<isize>> {
        match self.resolve(key) {
            Some(handler) => handler(msg),
            None => Ok(None),
        }
    }

    /// Drops every handler. Closures capturing their window are freed here.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        log::debug!("EventRegistry: releasing {} handlers", self.entries.len());
        self.entries.clear();
        self.released = true;
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
