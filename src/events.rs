/*
 * Typed registration front end over a window's `EventRegistry`, returned by
 * `WindowMain::on()` and `WindowModal::on()`. Each method decodes the raw
 * message parameters for its handler and registers with user origin, so it
 * replaces both earlier registrations and the window's built-in default for
 * the same message.
 */
use std::rc::Rc;

use crate::error::Result as PlatformResult;
use crate::event_registry::EventKey;
use crate::message::{
    COMMAND_CODE_ACCELERATOR, COMMAND_CODE_MENU, Message, NotifyHeader, WmActivate, WmCommand,
    WmSize, wm,
};
use crate::types::{CommandId, ControlId, WindowHandle};
use crate::window_base::{WindowCore, handler};

pub struct Events<'a> {
    core: &'a WindowCore,
}

impl<'a> Events<'a> {
    pub(crate) fn new(core: &'a WindowCore) -> Self {
        Self { core }
    }

    /// Raw handler for any message id. Return `Ok(None)` for default processing.
    pub fn wm(
        &self,
        msg: u32,
        f: impl Fn(&Message) -> PlatformResult<Option<isize>> + 'static,
    ) -> &Self {
        self.core.register(EventKey::Message(msg), handler(f));
        self
    }

    /// `WM_CREATE`. Returning `-1` aborts the window creation.
    pub fn wm_create(&self, f: impl Fn(&Message) -> PlatformResult<isize> + 'static) -> &Self {
        self.wm(wm::CREATE, move |msg| f(msg).map(Some))
    }

    /// `WM_CLOSE`. Replaces the default, so the handler decides whether to destroy.
    pub fn wm_close(&self, f: impl Fn() -> PlatformResult<()> + 'static) -> &Self {
        self.wm(wm::CLOSE, move |_| f().map(|()| Some(0)))
    }

    pub fn wm_destroy(&self, f: impl Fn() -> PlatformResult<()> + 'static) -> &Self {
        self.wm(wm::DESTROY, move |_| f().map(|()| Some(0)))
    }

    /// `WM_NCDESTROY`. On a main window this replaces the default that ends the loop.
    pub fn wm_nc_destroy(&self, f: impl Fn() -> PlatformResult<()> + 'static) -> &Self {
        self.wm(wm::NCDESTROY, move |_| f().map(|()| Some(0)))
    }

    pub fn wm_activate(&self, f: impl Fn(WmActivate) -> PlatformResult<()> + 'static) -> &Self {
        self.wm(wm::ACTIVATE, move |msg| {
            f(WmActivate::new(*msg)).map(|()| Some(0))
        })
    }

    /// `WM_SETFOCUS`; the argument is the window that lost the focus.
    pub fn wm_set_focus(
        &self,
        f: impl Fn(Option<WindowHandle>) -> PlatformResult<()> + 'static,
    ) -> &Self {
        self.wm(wm::SETFOCUS, move |msg| {
            f(WindowHandle(msg.wparam).non_null()).map(|()| Some(0))
        })
    }

    pub fn wm_size(&self, f: impl Fn(WmSize) -> PlatformResult<()> + 'static) -> &Self {
        self.wm(wm::SIZE, move |msg| f(WmSize::new(*msg)).map(|()| Some(0)))
    }

    /// `WM_TIMER` of one timer id, see `WindowMain::set_timer`.
    pub fn wm_timer(&self, timer_id: usize, f: impl Fn() -> PlatformResult<()> + 'static) -> &Self {
        self.core
            .register(EventKey::Timer(timer_id), handler(move |_| f().map(|()| Some(0))));
        self
    }

    /// `WM_COMMAND` for one `(id, notification code)` pair.
    pub fn wm_command(
        &self,
        id: CommandId,
        code: u16,
        f: impl Fn(WmCommand) -> PlatformResult<()> + 'static,
    ) -> &Self {
        self.core.register(
            EventKey::Command { id, code },
            handler(move |msg| f(WmCommand::new(*msg)).map(|()| Some(0))),
        );
        self
    }

    /// `WM_COMMAND` from a menu item or an accelerator with the same id.
    pub fn wm_command_accel_menu(
        &self,
        id: CommandId,
        f: impl Fn(WmCommand) -> PlatformResult<()> + 'static,
    ) -> &Self {
        let shared = handler(move |msg| f(WmCommand::new(*msg)).map(|()| Some(0)));
        self.core.register(
            EventKey::Command {
                id,
                code: COMMAND_CODE_MENU,
            },
            Rc::clone(&shared),
        );
        self.core.register(
            EventKey::Command {
                id,
                code: COMMAND_CODE_ACCELERATOR,
            },
            shared,
        );
        self
    }

    /// `WM_NOTIFY` from control `id` with notification `code`.
    pub fn wm_notify(
        &self,
        id: ControlId,
        code: i32,
        f: impl Fn(NotifyHeader) -> PlatformResult<isize> + 'static,
    ) -> &Self {
        let native = Rc::clone(self.core.native());
        self.core.register(
            EventKey::Notify { id, code },
            handler(move |msg| match native.decode_notify(msg) {
                Some(header) => f(header).map(Some),
                None => Ok(None),
            }),
        );
        self
    }
}
