/*
 * The native message record that flows through the loop, the handful of
 * window message ids the core consumes, and typed read-only views over the
 * raw `wparam`/`lparam` of the messages the default handlers interpret.
 */
use crate::types::{CommandId, ControlId, Point, Size, WindowHandle};

/// Window message ids used by the core. Values are the Win32 `WM_*` constants.
pub mod wm {
    pub const NULL: u32 = 0x0000;
    pub const CREATE: u32 = 0x0001;
    pub const DESTROY: u32 = 0x0002;
    pub const SIZE: u32 = 0x0005;
    pub const ACTIVATE: u32 = 0x0006;
    pub const SETFOCUS: u32 = 0x0007;
    pub const KILLFOCUS: u32 = 0x0008;
    pub const CLOSE: u32 = 0x0010;
    pub const QUIT: u32 = 0x0012;
    pub const NOTIFY: u32 = 0x004E;
    pub const NCCREATE: u32 = 0x0081;
    pub const NCDESTROY: u32 = 0x0082;
    pub const KEYDOWN: u32 = 0x0100;
    pub const KEYUP: u32 = 0x0101;
    pub const CHAR: u32 = 0x0102;
    pub const SYSKEYDOWN: u32 = 0x0104;
    pub const SYSKEYUP: u32 = 0x0105;
    pub const COMMAND: u32 = 0x0111;
    pub const TIMER: u32 = 0x0113;
    pub const PARENTNOTIFY: u32 = 0x0210;
    pub const APP: u32 = 0x8000;
}

/// Notification code carried in the high word of `WM_COMMAND` for menu items.
pub const COMMAND_CODE_MENU: u16 = 0;
/// Notification code carried in the high word of `WM_COMMAND` for accelerators.
pub const COMMAND_CODE_ACCELERATOR: u16 = 1;

/// One retrieved (or synchronously sent) native message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Message {
    pub hwnd: WindowHandle,
    pub msg: u32,
    pub wparam: usize,
    pub lparam: isize,
    pub time: u32,
    pub pt: Point,
}

impl Message {
    pub fn new(hwnd: WindowHandle, msg: u32, wparam: usize, lparam: isize) -> Self {
        Self {
            hwnd,
            msg,
            wparam,
            lparam,
            ..Default::default()
        }
    }
}

/// What `get_message` hands back: a message to process, or the quit signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retrieved {
    Message(Message),
    Quit(i32),
}

#[inline]
pub fn loword(value: usize) -> u16 {
    (value & 0xFFFF) as u16
}

#[inline]
pub fn hiword(value: usize) -> u16 {
    ((value >> 16) & 0xFFFF) as u16
}

#[inline]
pub fn make_wparam(low: u16, high: u16) -> usize {
    (low as usize) | ((high as usize) << 16)
}

#[inline]
pub fn make_lparam(low: u16, high: u16) -> isize {
    ((low as u32) | ((high as u32) << 16)) as i32 as isize
}

/// Activation state reported by `WM_ACTIVATE` (`WA_*`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivateEvent {
    Inactive,
    Active,
    ClickActive,
}

/// View over `WM_ACTIVATE` parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WmActivate {
    raw: Message,
}

impl WmActivate {
    pub const WA_INACTIVE: u16 = 0;
    pub const WA_ACTIVE: u16 = 1;
    pub const WA_CLICKACTIVE: u16 = 2;

    pub fn new(raw: Message) -> Self {
        Self { raw }
    }

    pub fn event(&self) -> ActivateEvent {
        match loword(self.raw.wparam) {
            Self::WA_INACTIVE => ActivateEvent::Inactive,
            Self::WA_CLICKACTIVE => ActivateEvent::ClickActive,
            _ => ActivateEvent::Active,
        }
    }

    pub fn is_minimized(&self) -> bool {
        hiword(self.raw.wparam) != 0
    }

    /// The window being deactivated or activated in exchange, if any.
    pub fn other_window(&self) -> Option<WindowHandle> {
        WindowHandle(self.raw.lparam as usize).non_null()
    }
}

/// View over `WM_COMMAND` parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WmCommand {
    raw: Message,
}

impl WmCommand {
    pub fn new(raw: Message) -> Self {
        Self { raw }
    }

    pub fn id(&self) -> CommandId {
        CommandId(loword(self.raw.wparam))
    }

    /// 0 for menus, 1 for accelerators, otherwise the control's notification code.
    pub fn code(&self) -> u16 {
        hiword(self.raw.wparam)
    }

    pub fn is_from_accelerator(&self) -> bool {
        self.control().is_none() && self.code() == COMMAND_CODE_ACCELERATOR
    }

    pub fn is_from_menu(&self) -> bool {
        self.control().is_none() && self.code() == COMMAND_CODE_MENU
    }

    pub fn control(&self) -> Option<WindowHandle> {
        WindowHandle(self.raw.lparam as usize).non_null()
    }
}

/// View over `WM_SIZE` parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WmSize {
    raw: Message,
}

impl WmSize {
    pub fn new(raw: Message) -> Self {
        Self { raw }
    }

    /// `SIZE_*` request type (restored, minimized, maximized, ...).
    pub fn request(&self) -> usize {
        self.raw.wparam
    }

    pub fn client_area(&self) -> Size {
        let lp = self.raw.lparam as usize;
        Size::new(loword(lp) as i32, hiword(lp) as i32)
    }
}

/// Decoded `NMHDR` of a `WM_NOTIFY`, produced by the native layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotifyHeader {
    pub hwnd_from: WindowHandle,
    pub id_from: ControlId,
    pub code: i32,
}
