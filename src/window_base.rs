/*
 * State and message routing shared by every window kind. `WindowCore` is the
 * `MessageTarget` the native layer calls for each message of its window: it
 * looks the message up in the window's `EventRegistry`, runs the handler
 * inside a panic boundary, and on WM_NCDESTROY tears the window's side of the
 * lifecycle down (registry released, handle cleared, teardown hook run).
 *
 * Handler failures can't unwind through the native window procedure, so they
 * are parked in a thread-local fault slot and picked up by the message loop
 * right after the dispatch that raised them.
 */
use std::any::Any;
use std::cell::{Cell, RefCell};
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};

use crate::error::{PlatformError, Result as PlatformResult};
use crate::event_registry::{EventKey, EventRegistry, Handler};
use crate::focus::FocusMemory;
use crate::lifecycle::{Lifecycle, WindowState};
use crate::message::{ActivateEvent, Message, WmActivate, loword, wm};
use crate::native::{CreateParams, MessageTarget, NativeLayer};
use crate::types::WindowHandle;

thread_local! {
    static PENDING_FAULT: RefCell<Option<PlatformError>> = const { RefCell::new(None) };
}

/// Parks a handler failure for the message loop. The first fault wins.
pub(crate) fn raise_fault(err: PlatformError) {
    PENDING_FAULT.with(|slot| {
        let mut slot = slot.borrow_mut();
        if slot.is_some() {
            log::error!("Discarding handler fault, another one is already pending: {err}");
        } else {
            *slot = Some(err);
        }
    });
}

pub(crate) fn take_fault() -> Option<PlatformError> {
    PENDING_FAULT.with(|slot| slot.borrow_mut().take())
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Wraps a closure as a registry handler.
pub(crate) fn handler(
    f: impl Fn(&Message) -> PlatformResult<Option<isize>> + 'static,
) -> Rc<Handler> {
    Rc::new(f)
}

pub(crate) struct WindowCore {
    kind: &'static str,
    native: Rc<dyn NativeLayer>,
    hwnd: Cell<WindowHandle>,
    registry: RefCell<EventRegistry>,
    lifecycle: RefCell<Lifecycle>,
    focus: FocusMemory,
    teardown_hook: RefCell<Option<Box<dyn FnOnce()>>>,
}

impl WindowCore {
    /// A configured window: options accepted, nothing native exists yet.
    pub(crate) fn new(kind: &'static str, native: Rc<dyn NativeLayer>) -> Rc<Self> {
        Rc::new(Self {
            kind,
            native,
            hwnd: Cell::new(WindowHandle::NULL),
            registry: RefCell::new(EventRegistry::new()),
            lifecycle: RefCell::new(Lifecycle::configured()),
            focus: FocusMemory::new(),
            teardown_hook: RefCell::new(None),
        })
    }

    pub(crate) fn kind(&self) -> &'static str {
        self.kind
    }

    pub(crate) fn native(&self) -> &Rc<dyn NativeLayer> {
        &self.native
    }

    pub(crate) fn hwnd(&self) -> WindowHandle {
        self.hwnd.get()
    }

    pub(crate) fn state(&self) -> WindowState {
        self.lifecycle.borrow().state()
    }

    pub(crate) fn history(&self) -> Vec<WindowState> {
        self.lifecycle.borrow().history().to_vec()
    }

    pub(crate) fn advance(&self, next: WindowState) -> PlatformResult<()> {
        self.lifecycle.borrow_mut().advance(next)
    }

    /// Fails unless the window is still waiting to be created.
    pub(crate) fn expect_configured(&self) -> PlatformResult<()> {
        match self.state() {
            WindowState::Configured => Ok(()),
            from => Err(PlatformError::InvalidTransition {
                from,
                to: WindowState::Created,
            }),
        }
    }

    pub(crate) fn register(&self, key: EventKey, handler: Rc<Handler>) {
        self.registry.borrow_mut().register(key, handler);
    }

    pub(crate) fn register_default(&self, key: EventKey, handler: Rc<Handler>) -> bool {
        self.registry.borrow_mut().register_default(key, handler)
    }

    #[cfg(test)]
    pub(crate) fn registry_released(&self) -> bool {
        self.registry.borrow().is_released()
    }

    pub(crate) fn set_teardown_hook(&self, hook: Box<dyn FnOnce()>) {
        *self.teardown_hook.borrow_mut() = Some(hook);
    }

    /*
     * Creates the native window with this core as its message target and
     * moves the lifecycle to Created. On failure the state stays Configured.
     */
    pub(crate) fn create(
        self: &Rc<Self>,
        params: &CreateParams<'_>,
    ) -> PlatformResult<WindowHandle> {
        let target: Rc<dyn MessageTarget> = Rc::clone(self) as Rc<dyn MessageTarget>;
        let hwnd = match self.native.create_window(params, target) {
            Ok(hwnd) => hwnd,
            Err(e) => {
                log::error!("{}: window creation failed: {e}", self.kind);
                self.hwnd.set(WindowHandle::NULL);
                return Err(e);
            }
        };
        self.hwnd.set(hwnd);
        self.advance(WindowState::Created)?;
        log::debug!("{}: created {hwnd:?}", self.kind);
        Ok(hwnd)
    }

    /*
     * Focus handling every window kind shares: WM_SETFOCUS on the window
     * itself moves the focus to its first tab stop, and WM_ACTIVATE saves the
     * focused child on deactivation and puts it back on reactivation. Neither
     * happens while minimized.
     */
    pub(crate) fn install_focus_defaults(self: &Rc<Self>) {
        let weak = Rc::downgrade(self);
        self.register_default(
            EventKey::Message(wm::SETFOCUS),
            handler(move |msg| {
                let Some(core) = weak.upgrade() else {
                    return Ok(None);
                };
                let native = core.native();
                if native.get_focus() == Some(msg.hwnd) {
                    if let Some(first) = native.first_tab_child(msg.hwnd) {
                        native.set_focus(first);
                    }
                }
                Ok(Some(0))
            }),
        );

        let weak = Rc::downgrade(self);
        self.register_default(
            EventKey::Message(wm::ACTIVATE),
            handler(move |msg| {
                let Some(core) = weak.upgrade() else {
                    return Ok(None);
                };
                let view = WmActivate::new(*msg);
                if view.is_minimized() {
                    return Ok(None);
                }
                match view.event() {
                    ActivateEvent::Inactive => {
                        core.focus.save_if_descendant(core.native().as_ref(), msg.hwnd);
                        Ok(Some(0))
                    }
                    ActivateEvent::Active | ActivateEvent::ClickActive => {
                        // Nothing restored: let the default processing focus the window.
                        if core.focus.restore(core.native().as_ref(), msg.hwnd) {
                            Ok(Some(0))
                        } else {
                            Ok(None)
                        }
                    }
                }
            }),
        );

        let weak: Weak<WindowCore> = Rc::downgrade(self);
        self.register_default(
            EventKey::Message(wm::PARENTNOTIFY),
            handler(move |msg| {
                if let Some(core) = weak.upgrade() {
                    if u32::from(loword(msg.wparam)) == wm::DESTROY {
                        core.focus.forget(WindowHandle(msg.lparam as usize));
                    }
                }
                Ok(Some(0))
            }),
        );
    }

    /*
     * Ends the window's lifecycle: releases the registry and runs the
     * teardown hook, once. A window that never got past Configured (failed
     * creation) only loses its handle.
     */
    pub(crate) fn finish(&self) {
        let destroyed = self.lifecycle.borrow_mut().mark_destroyed();
        self.hwnd.set(WindowHandle::NULL);
        if !destroyed {
            return;
        }
        // Handlers are dropped outside the borrow; their captures may re-enter.
        let mut registry = std::mem::take(&mut *self.registry.borrow_mut());
        registry.release();
        *self.registry.borrow_mut() = registry;
        if let Some(hook) = self.teardown_hook.borrow_mut().take() {
            hook();
        }
        log::debug!("{}: torn down", self.kind);
    }

    fn invoke(&self, handler: &Handler, msg: &Message) -> Option<isize> {
        match panic::catch_unwind(AssertUnwindSafe(|| handler(msg))) {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                log::error!("{}: handler for {:#06x} failed: {e}", self.kind, msg.msg);
                raise_fault(e);
                None
            }
            Err(payload) => {
                let reason = panic_message(payload.as_ref());
                log::error!(
                    "{}: handler for {:#06x} panicked: {reason}",
                    self.kind,
                    msg.msg
                );
                raise_fault(PlatformError::HandlerPanicked(reason));
                None
            }
        }
    }
}

impl MessageTarget for WindowCore {
    fn handle_message(&self, msg: &Message) -> Option<isize> {
        // The handle is known from the first message, before create_window
        // returns. Messages after teardown must not bring it back.
        if self.hwnd.get().is_null()
            && msg.msg != wm::NCDESTROY
            && self.state() != WindowState::Destroyed
        {
            self.hwnd.set(msg.hwnd);
        }
        log::trace!("{}: {:#06x} for {:?}", self.kind, msg.msg, msg.hwnd);

        let notify = if msg.msg == wm::NOTIFY {
            self.native.decode_notify(msg)
        } else {
            None
        };
        let handler = self.registry.borrow().resolve_message(msg, notify.as_ref());
        let result = handler.and_then(|h| self.invoke(h.as_ref(), msg));

        if msg.msg == wm::NCDESTROY {
            self.finish();
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::headless::HeadlessNative;
    use crate::native::{Background, Cursor, WindowClass};
    use crate::types::{Rect, WindowStyle, WindowStyleEx};

    fn create(native: &Rc<HeadlessNative>, core: &Rc<WindowCore>) -> WindowHandle {
        let class = WindowClass::new(
            None,
            Default::default(),
            Cursor::Arrow,
            Background::ButtonFace,
            None,
        );
        native.register_class(&class).expect("class");
        core.create(&CreateParams {
            kind: "Test",
            class_name: &class.name,
            title: "core",
            styles: WindowStyle::CAPTION,
            ex_styles: WindowStyleEx::empty(),
            frame: Rect::new(0, 0, 100, 100),
            parent: None,
            menu: None,
        })
        .expect("create")
    }

    #[test]
    fn handler_error_is_parked_as_fault() {
        // Arrange
        let native = Rc::new(HeadlessNative::new());
        let core = WindowCore::new("Test", native.clone());
        core.register(
            EventKey::Message(wm::APP),
            handler(|_| Err(PlatformError::handler("boom"))),
        );
        let hwnd = create(&native, &core);

        // Act
        let result = native.send(hwnd, wm::APP, 0, 0);

        // Assert
        assert_eq!(result, 0);
        assert!(matches!(take_fault(), Some(PlatformError::HandlerFailed(r)) if r == "boom"));
        assert!(take_fault().is_none());
    }

    #[test]
    fn handler_panic_is_caught_and_first_fault_wins() {
        let native = Rc::new(HeadlessNative::new());
        let core = WindowCore::new("Test", native.clone());
        core.register(
            EventKey::Message(wm::APP),
            handler(|_| panic!("handler exploded")),
        );
        core.register(
            EventKey::Message(wm::APP + 1),
            handler(|_| Err(PlatformError::handler("second"))),
        );
        let hwnd = create(&native, &core);

        native.send(hwnd, wm::APP, 0, 0);
        native.send(hwnd, wm::APP + 1, 0, 0);

        match take_fault() {
            Some(PlatformError::HandlerPanicked(reason)) => assert_eq!(reason, "handler exploded"),
            other => panic!("expected panic fault, got {other:?}"),
        }
        assert!(take_fault().is_none());
    }

    #[test]
    fn nc_destroy_releases_registry_and_runs_hook_once() {
        let native = Rc::new(HeadlessNative::new());
        let core = WindowCore::new("Test", native.clone());
        let hook_runs = Rc::new(Cell::new(0));
        let counter = hook_runs.clone();
        core.set_teardown_hook(Box::new(move || counter.set(counter.get() + 1)));
        let hwnd = create(&native, &core);
        core.advance(WindowState::Running).expect("run");

        native.destroy_window(hwnd).expect("destroy");
        core.finish();

        assert_eq!(core.state(), WindowState::Destroyed);
        assert_eq!(core.hwnd(), WindowHandle::NULL);
        assert!(core.registry_released());
        assert_eq!(hook_runs.get(), 1);
    }

    #[test]
    fn failed_creation_keeps_configured_state() {
        let native = Rc::new(HeadlessNative::new());
        let core = WindowCore::new("Test", native.clone());
        core.register(EventKey::Message(wm::CREATE), handler(|_| Ok(Some(-1))));

        let class = WindowClass::new(
            None,
            Default::default(),
            Cursor::Arrow,
            Background::None,
            None,
        );
        native.register_class(&class).expect("class");
        let result = core.create(&CreateParams {
            kind: "Test",
            class_name: &class.name,
            title: "",
            styles: WindowStyle::CAPTION,
            ex_styles: WindowStyleEx::empty(),
            frame: Rect::new(0, 0, 10, 10),
            parent: None,
            menu: None,
        });

        assert!(result.is_err());
        assert_eq!(core.state(), WindowState::Configured);
        assert!(!core.registry_released());
        assert_eq!(core.hwnd(), WindowHandle::NULL);
        assert_eq!(native.window_count(), 0);
    }

    #[test]
    fn set_focus_on_window_moves_to_first_tab_stop() {
        let native = Rc::new(HeadlessNative::new());
        let core = WindowCore::new("Test", native.clone());
        core.install_focus_defaults();
        let hwnd = create(&native, &core);
        let first = native.spawn_window(Some(hwnd), Rect::new(0, 0, 10, 10));
        let _second = native.spawn_window(Some(hwnd), Rect::new(0, 20, 10, 30));

        native.set_focus(hwnd);

        assert_eq!(native.get_focus(), Some(first));
    }

    #[test]
    fn minimizing_does_not_remember_the_focused_control() {
        let native = Rc::new(HeadlessNative::new());
        let core = WindowCore::new("Test", native.clone());
        core.install_focus_defaults();
        let hwnd = create(&native, &core);
        let first = native.spawn_window(Some(hwnd), Rect::new(0, 0, 10, 10));
        let second = native.spawn_window(Some(hwnd), Rect::new(0, 20, 10, 30));
        native.activate(hwnd);
        native.set_focus(second);

        native.minimize(hwnd);
        native.activate(hwnd);

        assert_eq!(native.get_focus(), Some(first));
    }
}
