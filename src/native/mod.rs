/*
 * The seam between the window core and the operating system. Every native
 * service the core consumes (class registration, window creation, focus,
 * geometry queries, the message queue, accelerator resources) goes through
 * `NativeLayer`, so the lifecycle and loop logic is written once and runs
 * unchanged over `Win32Native` or the in-memory `HeadlessNative`.
 *
 * All methods take `&self`: implementations are single-threaded and use
 * interior mutability, because handlers re-enter the native layer while a
 * native call is still on the stack (DestroyWindow -> WM_DESTROY -> SetFocus).
 */
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use crate::accelerator::NativeAccel;
use crate::error::Result as PlatformResult;
use crate::menu::Menu;
use crate::message::{Message, NotifyHeader, Retrieved};
use crate::types::{
    AccelHandle, ClassStyle, CommandId, MenuHandle, Point, Rect, ShowCommand, Size, WindowHandle,
    WindowStyle, WindowStyleEx,
};

pub mod headless;
#[cfg(target_os = "windows")]
pub mod win32;

/// Receives the messages of one native window. Implemented by the window core.
pub trait MessageTarget {
    /// `None` requests default native processing.
    fn handle_message(&self, msg: &Message) -> Option<isize>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Cursor {
    #[default]
    Arrow,
    IBeam,
    Wait,
    Hand,
}

/// System colour used for the class background brush (`COLOR_*`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Background {
    #[default]
    ButtonFace,
    Window,
    /// No background brush; the window paints everything itself.
    None,
}

/// Parameters for window class registration.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WindowClass {
    pub name: String,
    pub styles: ClassStyle,
    pub cursor: Cursor,
    pub background: Background,
    /// Icon resource id in the executable, if any.
    pub icon_id: Option<u16>,
}

impl WindowClass {
    /*
     * Builds the class description, naming it after a hash of its other
     * fields when no name is given. Windows with identical class parameters
     * then share one registration.
     */
    pub fn new(
        name: Option<&str>,
        styles: ClassStyle,
        cursor: Cursor,
        background: Background,
        icon_id: Option<u16>,
    ) -> Self {
        let name = match name {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => {
                let mut hasher = DefaultHasher::new();
                (styles, cursor, background, icon_id).hash(&mut hasher);
                format!("WNDCLASS.{:016x}", hasher.finish())
            }
        };
        Self {
            name,
            styles,
            cursor,
            background,
            icon_id,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CreateParams<'a> {
    /// "WindowMain", "WindowModal", ... for diagnostics.
    pub kind: &'static str,
    pub class_name: &'a str,
    pub title: &'a str,
    pub styles: WindowStyle,
    pub ex_styles: WindowStyleEx,
    /// Outer rectangle in screen coordinates (client coordinates for children).
    pub frame: Rect,
    /// Parent for `WS_CHILD` windows, owner otherwise.
    pub parent: Option<WindowHandle>,
    pub menu: Option<MenuHandle>,
}

pub trait NativeLayer {
    /// Process-wide preparation (DPI awareness, common controls). Idempotent.
    fn prepare_process(&self) -> PlatformResult<()> {
        Ok(())
    }

    /// Registers `class` unless a class with that name already exists.
    fn register_class(&self, class: &WindowClass) -> PlatformResult<()>;

    /// Creates a window whose messages are delivered to `target`. The target
    /// already receives the creation messages before this call returns.
    fn create_window(
        &self,
        params: &CreateParams<'_>,
        target: Rc<dyn MessageTarget>,
    ) -> PlatformResult<WindowHandle>;

    fn destroy_window(&self, hwnd: WindowHandle) -> PlatformResult<()>;
    fn show_window(&self, hwnd: WindowHandle, cmd: ShowCommand);
    fn update_window(&self, hwnd: WindowHandle);
    fn enable_window(&self, hwnd: WindowHandle, enable: bool);

    fn is_window(&self, hwnd: WindowHandle) -> bool;
    fn is_window_enabled(&self, hwnd: WindowHandle) -> bool;
    /// Whether `hwnd` is a child or deeper descendant of `parent`.
    fn is_child(&self, parent: WindowHandle, hwnd: WindowHandle) -> bool;
    fn owner(&self, hwnd: WindowHandle) -> Option<WindowHandle>;

    fn get_focus(&self) -> Option<WindowHandle>;
    fn set_focus(&self, hwnd: WindowHandle);
    /// First control in the tab order of `hwnd`, if any.
    fn first_tab_child(&self, hwnd: WindowHandle) -> Option<WindowHandle>;

    fn window_rect(&self, hwnd: WindowHandle) -> PlatformResult<Rect>;
    /// Moves without resizing or changing the Z order.
    fn set_window_pos(&self, hwnd: WindowHandle, pos: Point) -> PlatformResult<()>;

    fn system_dpi(&self) -> u32;
    fn screen_size(&self) -> Size;
    fn work_area(&self) -> Rect;
    /// Grows a client rectangle by the non-client chrome of the given styles.
    fn adjust_window_rect(
        &self,
        client: Rect,
        styles: WindowStyle,
        ex_styles: WindowStyleEx,
        has_menu: bool,
    ) -> PlatformResult<Rect>;

    fn create_menu(&self, menu: &Menu) -> PlatformResult<MenuHandle>;
    fn is_menu(&self, menu: MenuHandle) -> bool;
    /// Only for menus no window owns; a window destroys its own menu bar.
    fn destroy_menu(&self, menu: MenuHandle) -> PlatformResult<()>;
    /// Enables or greys out the entry for `command` anywhere in `menu`, the
    /// live menu bar of `hwnd`. Returns whether the entry exists.
    fn enable_menu_item(
        &self,
        hwnd: WindowHandle,
        menu: MenuHandle,
        command: CommandId,
        enable: bool,
    ) -> PlatformResult<bool>;

    fn create_accelerator_table(&self, entries: &[NativeAccel]) -> PlatformResult<AccelHandle>;
    fn destroy_accelerator_table(&self, table: AccelHandle) -> PlatformResult<()>;

    /// Blocks until a message or the quit signal is available.
    fn get_message(&self) -> PlatformResult<Retrieved>;
    /// If `msg` matches an entry of `table`, delivers the resulting
    /// `WM_COMMAND` to `hwnd` and returns `true`.
    fn translate_accelerator(&self, hwnd: WindowHandle, table: AccelHandle, msg: &Message)
    -> bool;
    /// Offers `msg` to the dialog manager of its top-level window (Tab
    /// navigation, Esc as `IDCANCEL`). Returns `true` if it was consumed.
    fn is_dialog_message(&self, msg: &Message) -> bool;
    fn translate_message(&self, msg: &Message);
    fn dispatch_message(&self, msg: &Message) -> isize;
    fn default_window_proc(&self, msg: &Message) -> isize;
    fn send_message(&self, msg: &Message) -> isize;
    fn post_message(&self, msg: &Message) -> PlatformResult<()>;
    fn post_quit_message(&self, exit_code: i32);

    fn set_timer(&self, hwnd: WindowHandle, timer_id: usize, interval_ms: u32)
    -> PlatformResult<()>;
    fn kill_timer(&self, hwnd: WindowHandle, timer_id: usize) -> PlatformResult<()>;

    /// Reads the `NMHDR` of a `WM_NOTIFY` while it is being dispatched.
    fn decode_notify(&self, _msg: &Message) -> Option<NotifyHeader> {
        None
    }

    /// Blocking, modal error notification.
    fn show_error_dialog(&self, owner: Option<WindowHandle>, title: &str, text: &str);
}

/// The native layer of the current platform.
#[cfg(target_os = "windows")]
pub fn platform() -> PlatformResult<Rc<dyn NativeLayer>> {
    Ok(Rc::new(win32::Win32Native::new()?))
}
