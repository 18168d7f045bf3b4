/*
 * `NativeLayer` over the real Win32 API. All `unsafe` of the crate lives
 * here. Windows created through this layer share one window procedure,
 * `window_proc_router`, which looks the window's `MessageTarget` up in a
 * thread-local table: the target handed to `create_window` is parked before
 * `CreateWindowExW` and adopted by the first message the new window receives
 * (WM_GETMINMAXINFO or WM_NCCREATE), and it is dropped after WM_NCDESTROY.
 */
#![allow(unsafe_code)]

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::ffi::c_void;
use std::rc::Rc;

use windows::Win32::{
    Foundation::{
        ERROR_INVALID_WINDOW_HANDLE, GetLastError, HINSTANCE, HWND, LPARAM, LRESULT, POINT, RECT,
        WPARAM,
    },
    Graphics::Gdi::{COLOR_BTNFACE, COLOR_WINDOW, GetSysColorBrush, HBRUSH, UpdateWindow},
    System::LibraryLoader::GetModuleHandleW,
    UI::Controls::{ICC_WIN95_CLASSES, INITCOMMONCONTROLSEX, InitCommonControlsEx, NMHDR},
    UI::HiDpi::GetDpiForSystem,
    UI::Input::KeyboardAndMouse::{EnableWindow, GetFocus, IsWindowEnabled, SetFocus},
    UI::WindowsAndMessaging::*,
};
use windows::core::{HSTRING, PCWSTR};

use crate::accelerator::{AccelModifiers, MatchKey, NativeAccel};
use crate::error::{PlatformError, Result as PlatformResult};
use crate::menu::{Menu, MenuItem};
use crate::message::{Message, NotifyHeader, Retrieved, wm};
use crate::native::{Background, CreateParams, Cursor, MessageTarget, NativeLayer, WindowClass};
use crate::types::{
    AccelHandle, CommandId, ControlId, MenuHandle, Point, Rect, ShowCommand, Size, WindowHandle,
    WindowStyle, WindowStyleEx,
};

thread_local! {
    // Target of the window currently inside CreateWindowExW.
    static PENDING_TARGET: RefCell<Option<Rc<dyn MessageTarget>>> = const { RefCell::new(None) };
    static TARGETS: RefCell<HashMap<usize, Rc<dyn MessageTarget>>> = RefCell::new(HashMap::new());
}

/// Clears the parked target when `create_window` returns, whatever happened.
struct PendingTargetGuard;

impl PendingTargetGuard {
    fn park(target: Rc<dyn MessageTarget>) -> Self {
        PENDING_TARGET.with(|slot| *slot.borrow_mut() = Some(target));
        Self
    }
}

impl Drop for PendingTargetGuard {
    fn drop(&mut self) {
        PENDING_TARGET.with(|slot| slot.borrow_mut().take());
    }
}

fn hwnd_of(handle: WindowHandle) -> HWND {
    HWND(handle.0 as *mut c_void)
}

fn hmenu_of(menu: MenuHandle) -> HMENU {
    HMENU(menu.0 as *mut c_void)
}

fn handle_of(hwnd: HWND) -> WindowHandle {
    WindowHandle(hwnd.0 as usize)
}

fn to_rect(rc: RECT) -> Rect {
    Rect::new(rc.left, rc.top, rc.right, rc.bottom)
}

fn to_msg(msg: &Message) -> MSG {
    MSG {
        hwnd: hwnd_of(msg.hwnd),
        message: msg.msg,
        wParam: WPARAM(msg.wparam),
        lParam: LPARAM(msg.lparam),
        time: msg.time,
        pt: POINT {
            x: msg.pt.x,
            y: msg.pt.y,
        },
    }
}

fn from_msg(msg: &MSG) -> Message {
    Message {
        hwnd: handle_of(msg.hwnd),
        msg: msg.message,
        wparam: msg.wParam.0,
        lparam: msg.lParam.0,
        time: msg.time,
        pt: Point::new(msg.pt.x, msg.pt.y),
    }
}

/// Wraps the current `GetLastError()` value. Call right after the failing function.
fn last_error(function: &'static str) -> PlatformError {
    let code = unsafe { GetLastError() };
    PlatformError::Native {
        function,
        code: code.0,
    }
}

fn target_for(hwnd: HWND) -> Option<Rc<dyn MessageTarget>> {
    let key = hwnd.0 as usize;
    if let Some(target) = TARGETS.with(|targets| targets.borrow().get(&key).cloned()) {
        return Some(target);
    }
    let adopted = PENDING_TARGET.with(|slot| slot.borrow_mut().take())?;
    TARGETS.with(|targets| targets.borrow_mut().insert(key, Rc::clone(&adopted)));
    Some(adopted)
}

/*
 * Window procedure shared by every class this layer registers. The target is
 * cloned out of the table before the call, so handlers may create and
 * destroy other windows.
 */
unsafe extern "system" fn window_proc_router(
    hwnd: HWND,
    msg: u32,
    wparam: WPARAM,
    lparam: LPARAM,
) -> LRESULT {
    let Some(target) = target_for(hwnd) else {
        return unsafe { DefWindowProcW(hwnd, msg, wparam, lparam) };
    };
    let message = Message::new(handle_of(hwnd), msg, wparam.0, lparam.0);
    let result = match target.handle_message(&message) {
        Some(result) => LRESULT(result),
        None => unsafe { DefWindowProcW(hwnd, msg, wparam, lparam) },
    };
    if msg == WM_NCDESTROY {
        TARGETS.with(|targets| targets.borrow_mut().remove(&(hwnd.0 as usize)));
    }
    result
}

pub struct Win32Native {
    instance: HINSTANCE,
    prepared: Cell<bool>,
}

impl Win32Native {
    pub fn new() -> PlatformResult<Self> {
        let module = unsafe { GetModuleHandleW(None) }?;
        Ok(Self {
            instance: HINSTANCE(module.0),
            prepared: Cell::new(false),
        })
    }

    fn cursor(&self, cursor: Cursor) -> PlatformResult<HCURSOR> {
        let id = match cursor {
            Cursor::Arrow => IDC_ARROW,
            Cursor::IBeam => IDC_IBEAM,
            Cursor::Wait => IDC_WAIT,
            Cursor::Hand => IDC_HAND,
        };
        Ok(unsafe { LoadCursorW(None, id) }?)
    }

    fn icon(&self, icon_id: Option<u16>) -> PlatformResult<HICON> {
        if let Some(id) = icon_id {
            // MAKEINTRESOURCEW
            let resource = PCWSTR(usize::from(id) as *const u16);
            match unsafe { LoadIconW(Some(self.instance), resource) } {
                Ok(icon) => return Ok(icon),
                Err(e) => log::warn!("Win32Native: icon resource {id} not found: {e}"),
            }
        }
        Ok(unsafe { LoadIconW(None, IDI_APPLICATION) }?)
    }

    fn build_menu(&self, menu: &Menu, popup: bool) -> PlatformResult<HMENU> {
        let hmenu = if popup {
            unsafe { CreatePopupMenu() }?
        } else {
            unsafe { CreateMenu() }?
        };
        for item in menu.items() {
            match item {
                MenuItem::Entry {
                    command,
                    text,
                    enabled,
                } => {
                    let flags = if *enabled {
                        MF_STRING
                    } else {
                        MF_STRING | MF_GRAYED
                    };
                    let text = HSTRING::from(text.as_str());
                    unsafe { AppendMenuW(hmenu, flags, usize::from(command.raw()), &text) }?;
                }
                MenuItem::Separator => {
                    unsafe { AppendMenuW(hmenu, MF_SEPARATOR, 0, PCWSTR::null()) }?;
                }
                MenuItem::Submenu { text, menu } => {
                    let sub = self.build_menu(menu, true)?;
                    let text = HSTRING::from(text.as_str());
                    unsafe { AppendMenuW(hmenu, MF_POPUP, sub.0 as usize, &text) }?;
                }
            }
        }
        Ok(hmenu)
    }
}

impl NativeLayer for Win32Native {
    fn prepare_process(&self) -> PlatformResult<()> {
        if self.prepared.replace(true) {
            return Ok(());
        }
        unsafe {
            if !SetProcessDPIAware().as_bool() {
                log::warn!("Win32Native: SetProcessDPIAware failed");
            }
            let icc = INITCOMMONCONTROLSEX {
                dwSize: std::mem::size_of::<INITCOMMONCONTROLSEX>() as u32,
                dwICC: ICC_WIN95_CLASSES,
            };
            if !InitCommonControlsEx(&icc).as_bool() {
                return Err(last_error("InitCommonControlsEx"));
            }
        }
        log::debug!("Win32Native: process prepared");
        Ok(())
    }

    fn register_class(&self, class: &WindowClass) -> PlatformResult<()> {
        let name = HSTRING::from(class.name.as_str());
        let name_pcwstr = PCWSTR(name.as_ptr());
        unsafe {
            let mut existing = WNDCLASSEXW::default();
            if GetClassInfoExW(Some(self.instance), name_pcwstr, &mut existing).is_ok() {
                log::debug!("Win32Native: class '{}' already registered", class.name);
                return Ok(());
            }
        }

        let background = match class.background {
            Background::ButtonFace => unsafe { GetSysColorBrush(COLOR_BTNFACE) },
            Background::Window => unsafe { GetSysColorBrush(COLOR_WINDOW) },
            Background::None => HBRUSH::default(),
        };
        let icon = self.icon(class.icon_id)?;
        let wc = WNDCLASSEXW {
            cbSize: std::mem::size_of::<WNDCLASSEXW>() as u32,
            style: WNDCLASS_STYLES(class.styles.bits()),
            lpfnWndProc: Some(window_proc_router),
            cbClsExtra: 0,
            cbWndExtra: 0,
            hInstance: self.instance,
            hIcon: icon,
            hCursor: self.cursor(class.cursor)?,
            hbrBackground: background,
            lpszMenuName: PCWSTR::null(),
            lpszClassName: name_pcwstr,
            hIconSm: icon,
        };
        if unsafe { RegisterClassExW(&wc) } == 0 {
            let err = last_error("RegisterClassExW");
            log::error!("Win32Native: registering '{}' failed: {err}", class.name);
            return Err(err);
        }
        log::debug!("Win32Native: class '{}' registered", class.name);
        Ok(())
    }

    fn create_window(
        &self,
        params: &CreateParams<'_>,
        target: Rc<dyn MessageTarget>,
    ) -> PlatformResult<WindowHandle> {
        let _pending = PendingTargetGuard::park(target);
        let frame = params.frame;
        let hwnd = unsafe {
            CreateWindowExW(
                WINDOW_EX_STYLE(params.ex_styles.bits()),
                &HSTRING::from(params.class_name),
                &HSTRING::from(params.title),
                WINDOW_STYLE(params.styles.bits()),
                frame.left,
                frame.top,
                frame.width(),
                frame.height(),
                params.parent.map(hwnd_of),
                params.menu.map(hmenu_of),
                Some(self.instance),
                None,
            )
        };
        match hwnd {
            Ok(hwnd) => Ok(handle_of(hwnd)),
            Err(e) => {
                log::error!("Win32Native: CreateWindowExW for {} failed: {e}", params.kind);
                Err(PlatformError::InitializationFailed(format!(
                    "{}: CreateWindowExW failed: {e}",
                    params.kind
                )))
            }
        }
    }

    fn destroy_window(&self, hwnd: WindowHandle) -> PlatformResult<()> {
        if unsafe { DestroyWindow(hwnd_of(hwnd)) }.is_ok() {
            return Ok(());
        }
        let code = unsafe { GetLastError() };
        if code == ERROR_INVALID_WINDOW_HANDLE {
            log::debug!("Win32Native: {hwnd:?} was already destroyed");
            return Err(PlatformError::InvalidHandle(format!(
                "{hwnd:?} is not a window"
            )));
        }
        Err(PlatformError::Native {
            function: "DestroyWindow",
            code: code.0,
        })
    }

    fn show_window(&self, hwnd: WindowHandle, cmd: ShowCommand) {
        unsafe {
            let _ = ShowWindow(hwnd_of(hwnd), SHOW_WINDOW_CMD(cmd.raw()));
        }
    }

    fn update_window(&self, hwnd: WindowHandle) {
        unsafe {
            let _ = UpdateWindow(hwnd_of(hwnd));
        }
    }

    fn enable_window(&self, hwnd: WindowHandle, enable: bool) {
        // The return value is the previous state, not an error indicator.
        unsafe {
            let _ = EnableWindow(hwnd_of(hwnd), enable);
        }
    }

    fn is_window(&self, hwnd: WindowHandle) -> bool {
        !hwnd.is_null() && unsafe { IsWindow(Some(hwnd_of(hwnd))) }.as_bool()
    }

    fn is_window_enabled(&self, hwnd: WindowHandle) -> bool {
        !hwnd.is_null() && unsafe { IsWindowEnabled(hwnd_of(hwnd)) }.as_bool()
    }

    fn is_child(&self, parent: WindowHandle, hwnd: WindowHandle) -> bool {
        unsafe { IsChild(hwnd_of(parent), hwnd_of(hwnd)) }.as_bool()
    }

    fn owner(&self, hwnd: WindowHandle) -> Option<WindowHandle> {
        unsafe { GetWindow(hwnd_of(hwnd), GW_OWNER) }
            .ok()
            .map(handle_of)
            .and_then(WindowHandle::non_null)
    }

    fn get_focus(&self) -> Option<WindowHandle> {
        handle_of(unsafe { GetFocus() }).non_null()
    }

    fn set_focus(&self, hwnd: WindowHandle) {
        if let Err(e) = unsafe { SetFocus(Some(hwnd_of(hwnd))) } {
            log::debug!("Win32Native: SetFocus({hwnd:?}) failed: {e}");
        }
    }

    fn first_tab_child(&self, hwnd: WindowHandle) -> Option<WindowHandle> {
        let next = unsafe { GetNextDlgTabItem(hwnd_of(hwnd), None, false) }.ok()?;
        let next = handle_of(next);
        (next != hwnd && self.is_child(hwnd, next)).then_some(next)
    }

    fn window_rect(&self, hwnd: WindowHandle) -> PlatformResult<Rect> {
        let mut rc = RECT::default();
        unsafe { GetWindowRect(hwnd_of(hwnd), &mut rc) }?;
        Ok(to_rect(rc))
    }

    fn set_window_pos(&self, hwnd: WindowHandle, pos: Point) -> PlatformResult<()> {
        unsafe {
            SetWindowPos(
                hwnd_of(hwnd),
                None,
                pos.x,
                pos.y,
                0,
                0,
                SWP_NOZORDER | SWP_NOSIZE,
            )
        }?;
        Ok(())
    }

    fn system_dpi(&self) -> u32 {
        match unsafe { GetDpiForSystem() } {
            0 => crate::geometry::BASE_DPI,
            dpi => dpi,
        }
    }

    fn screen_size(&self) -> Size {
        unsafe { Size::new(GetSystemMetrics(SM_CXSCREEN), GetSystemMetrics(SM_CYSCREEN)) }
    }

    fn work_area(&self) -> Rect {
        let mut rc = RECT::default();
        let queried = unsafe {
            SystemParametersInfoW(
                SPI_GETWORKAREA,
                0,
                Some(&mut rc as *mut RECT as *mut c_void),
                SYSTEM_PARAMETERS_INFO_UPDATE_FLAGS(0),
            )
        };
        match queried {
            Ok(()) => to_rect(rc),
            Err(e) => {
                log::warn!("Win32Native: SPI_GETWORKAREA failed, using the screen: {e}");
                let screen = self.screen_size();
                Rect::new(0, 0, screen.cx, screen.cy)
            }
        }
    }

    fn adjust_window_rect(
        &self,
        client: Rect,
        styles: WindowStyle,
        ex_styles: WindowStyleEx,
        has_menu: bool,
    ) -> PlatformResult<Rect> {
        let mut rc = RECT {
            left: client.left,
            top: client.top,
            right: client.right,
            bottom: client.bottom,
        };
        unsafe {
            AdjustWindowRectEx(
                &mut rc,
                WINDOW_STYLE(styles.bits()),
                has_menu,
                WINDOW_EX_STYLE(ex_styles.bits()),
            )
        }?;
        Ok(to_rect(rc))
    }

    fn create_menu(&self, menu: &Menu) -> PlatformResult<MenuHandle> {
        let hmenu = self.build_menu(menu, false)?;
        Ok(MenuHandle(hmenu.0 as usize))
    }

    fn is_menu(&self, menu: MenuHandle) -> bool {
        unsafe { IsMenu(hmenu_of(menu)) }.as_bool()
    }

    fn destroy_menu(&self, menu: MenuHandle) -> PlatformResult<()> {
        unsafe { DestroyMenu(hmenu_of(menu)) }.map_err(|_| last_error("DestroyMenu"))
    }

    fn enable_menu_item(
        &self,
        hwnd: WindowHandle,
        menu: MenuHandle,
        command: CommandId,
        enable: bool,
    ) -> PlatformResult<bool> {
        let state = if enable { MF_ENABLED } else { MF_GRAYED };
        // -1 when no entry has this id; MF_BYCOMMAND also searches the popups.
        let previous = unsafe {
            EnableMenuItem(
                hmenu_of(menu),
                u32::from(command.raw()),
                MF_BYCOMMAND | state,
            )
        };
        if previous.0 == -1 {
            return Ok(false);
        }
        unsafe { DrawMenuBar(hwnd_of(hwnd)) }.map_err(|_| last_error("DrawMenuBar"))?;
        Ok(true)
    }

    fn create_accelerator_table(&self, entries: &[NativeAccel]) -> PlatformResult<AccelHandle> {
        let accels: Vec<ACCEL> = entries
            .iter()
            .map(|entry| {
                let (virt, key) = match entry.key {
                    MatchKey::Virtual(vk) => (FVIRTKEY.0, vk),
                    MatchKey::Char(ch) => (0, ch),
                };
                let mut flags = virt;
                if entry.modifiers.contains(AccelModifiers::SHIFT) {
                    flags |= FSHIFT.0;
                }
                if entry.modifiers.contains(AccelModifiers::CONTROL) {
                    flags |= FCONTROL.0;
                }
                if entry.modifiers.contains(AccelModifiers::ALT) {
                    flags |= FALT.0;
                }
                ACCEL {
                    fVirt: ACCEL_VIRT_FLAGS(flags),
                    key,
                    cmd: entry.command.raw(),
                }
            })
            .collect();
        let table = unsafe { CreateAcceleratorTableW(&accels) }?;
        Ok(AccelHandle(table.0 as usize))
    }

    fn destroy_accelerator_table(&self, table: AccelHandle) -> PlatformResult<()> {
        if unsafe { DestroyAcceleratorTable(HACCEL(table.0 as *mut c_void)) }.as_bool() {
            Ok(())
        } else {
            Err(last_error("DestroyAcceleratorTable"))
        }
    }

    fn get_message(&self) -> PlatformResult<Retrieved> {
        let mut msg = MSG::default();
        match unsafe { GetMessageW(&mut msg, None, 0, 0) }.0 {
            -1 => Err(last_error("GetMessageW")),
            0 => Ok(Retrieved::Quit(msg.wParam.0 as i32)),
            _ => Ok(Retrieved::Message(from_msg(&msg))),
        }
    }

    fn translate_accelerator(
        &self,
        hwnd: WindowHandle,
        table: AccelHandle,
        msg: &Message,
    ) -> bool {
        let native = to_msg(msg);
        unsafe { TranslateAcceleratorW(hwnd_of(hwnd), HACCEL(table.0 as *mut c_void), &native) }
            != 0
    }

    fn is_dialog_message(&self, msg: &Message) -> bool {
        if msg.hwnd.is_null() {
            return false;
        }
        unsafe {
            let root = GetAncestor(hwnd_of(msg.hwnd), GA_ROOT);
            if root.is_invalid() {
                return false;
            }
            IsDialogMessageW(root, &to_msg(msg)).as_bool()
        }
    }

    fn translate_message(&self, msg: &Message) {
        unsafe {
            let _ = TranslateMessage(&to_msg(msg));
        }
    }

    fn dispatch_message(&self, msg: &Message) -> isize {
        unsafe { DispatchMessageW(&to_msg(msg)) }.0
    }

    fn default_window_proc(&self, msg: &Message) -> isize {
        unsafe {
            DefWindowProcW(
                hwnd_of(msg.hwnd),
                msg.msg,
                WPARAM(msg.wparam),
                LPARAM(msg.lparam),
            )
        }
        .0
    }

    fn send_message(&self, msg: &Message) -> isize {
        unsafe {
            SendMessageW(
                hwnd_of(msg.hwnd),
                msg.msg,
                Some(WPARAM(msg.wparam)),
                Some(LPARAM(msg.lparam)),
            )
        }
        .0
    }

    fn post_message(&self, msg: &Message) -> PlatformResult<()> {
        unsafe {
            PostMessageW(
                msg.hwnd.non_null().map(hwnd_of),
                msg.msg,
                WPARAM(msg.wparam),
                LPARAM(msg.lparam),
            )
        }?;
        Ok(())
    }

    fn post_quit_message(&self, exit_code: i32) {
        unsafe { PostQuitMessage(exit_code) };
    }

    fn set_timer(
        &self,
        hwnd: WindowHandle,
        timer_id: usize,
        interval_ms: u32,
    ) -> PlatformResult<()> {
        if unsafe { SetTimer(Some(hwnd_of(hwnd)), timer_id, interval_ms, None) } == 0 {
            return Err(last_error("SetTimer"));
        }
        Ok(())
    }

    fn kill_timer(&self, hwnd: WindowHandle, timer_id: usize) -> PlatformResult<()> {
        unsafe { KillTimer(Some(hwnd_of(hwnd)), timer_id) }
            .map_err(|_| last_error("KillTimer"))
    }

    fn decode_notify(&self, msg: &Message) -> Option<NotifyHeader> {
        if msg.msg != wm::NOTIFY || msg.lparam == 0 {
            return None;
        }
        // lParam points at the sender's NMHDR for the duration of the send.
        let header = unsafe { &*(msg.lparam as *const NMHDR) };
        Some(NotifyHeader {
            hwnd_from: handle_of(header.hwndFrom),
            id_from: ControlId(header.idFrom as u16),
            code: header.code as i32,
        })
    }

    fn show_error_dialog(&self, owner: Option<WindowHandle>, title: &str, text: &str) {
        unsafe {
            let _ = MessageBoxW(
                owner.map(hwnd_of),
                &HSTRING::from(text),
                &HSTRING::from(title),
                MB_OK | MB_ICONERROR,
            );
        }
    }
}
