/*
 * In-memory window manager implementing `NativeLayer` without a display.
 *
 * It keeps the parts of USER32 behaviour the window core depends on: a posted
 * message queue with WM_QUIT delivered last, synchronous sends, parent/owner
 * relations, focus with WM_KILLFOCUS/WM_SETFOCUS, activation with
 * WM_ACTIVATE, the WM_DESTROY/WM_NCDESTROY destruction order, enablement,
 * window rectangles, DPI and work area, plus the Esc and Tab handling of the
 * dialog manager. Test code drives it like a user would (`press_key`,
 * `activate`, `fire_timer`) and inspects the result.
 *
 * All state lives in one `RefCell`, and no borrow is held while a message
 * target runs, since targets call straight back into the layer.
 */
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use super::{CreateParams, MessageTarget, NativeLayer, WindowClass};
use crate::accelerator::{AccelModifiers, MatchKey, NativeAccel, VirtualKey};
use crate::error::{PlatformError, Result as PlatformResult};
use crate::menu::Menu;
use crate::message::{
    COMMAND_CODE_ACCELERATOR, Message, NotifyHeader, Retrieved, WmActivate, hiword, loword,
    make_wparam, wm,
};
use crate::types::{
    AccelHandle, CommandId, MenuHandle, Point, Rect, ShowCommand, Size, WindowHandle,
    WindowStyle, WindowStyleEx,
};

/// Width of the sizing border added on the left, right and bottom.
pub const FRAME_BORDER: i32 = 8;
/// Height of the caption, top border included.
pub const CAPTION_HEIGHT: i32 = 31;
pub const MENU_BAR_HEIGHT: i32 = 20;

/// An error dialog the core asked the layer to show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorDialog {
    pub owner: Option<WindowHandle>,
    pub title: String,
    pub text: String,
}

struct HeadlessWindow {
    class_name: String,
    title: String,
    styles: WindowStyle,
    ex_styles: WindowStyleEx,
    rect: Rect,
    parent: Option<WindowHandle>,
    owner: Option<WindowHandle>,
    enabled: bool,
    visible: bool,
    menu: Option<MenuHandle>,
    target: Option<Rc<dyn MessageTarget>>,
    destroying: bool,
}

struct State {
    last_handle: usize,
    windows: HashMap<WindowHandle, HeadlessWindow>,
    classes: HashMap<String, WindowClass>,
    focus: Option<WindowHandle>,
    active: Option<WindowHandle>,
    queue: VecDeque<Message>,
    quit: Option<i32>,
    clock: u32,
    key_modifiers: HashMap<u32, AccelModifiers>,
    accel_tables: HashMap<AccelHandle, Vec<NativeAccel>>,
    destroyed_tables: usize,
    menus: HashMap<MenuHandle, Menu>,
    timers: HashMap<(WindowHandle, usize), u32>,
    notifies: HashMap<isize, NotifyHeader>,
    dialogs: Vec<ErrorDialog>,
    delivered: Vec<Message>,
    dpi: u32,
    screen: Size,
    work_area: Rect,
    process_prepared: bool,
    fail_next_create: bool,
}

impl State {
    fn next_handle(&mut self) -> usize {
        self.last_handle += 1;
        self.last_handle
    }

    fn tick(&mut self) -> u32 {
        self.clock += 1;
        self.clock
    }

    fn is_descendant(&self, ancestor: WindowHandle, hwnd: WindowHandle) -> bool {
        let mut cursor = self.windows.get(&hwnd).and_then(|w| w.parent);
        while let Some(current) = cursor {
            if current == ancestor {
                return true;
            }
            cursor = self.windows.get(&current).and_then(|w| w.parent);
        }
        false
    }

    /// `hwnd` followed by its descendants, parents before children.
    fn subtree(&self, hwnd: WindowHandle) -> Vec<WindowHandle> {
        let mut out = vec![hwnd];
        let mut index = 0;
        while index < out.len() {
            let current = out[index];
            let mut children: Vec<WindowHandle> = self
                .windows
                .iter()
                .filter(|(_, w)| w.parent == Some(current))
                .map(|(h, _)| *h)
                .collect();
            children.sort_by_key(|h| h.0);
            out.extend(children);
            index += 1;
        }
        out
    }

    fn root_of(&self, hwnd: WindowHandle) -> Option<WindowHandle> {
        let mut current = hwnd;
        let mut window = self.windows.get(&current)?;
        while let Some(parent) = window.parent {
            current = parent;
            window = self.windows.get(&current)?;
        }
        Some(current)
    }

    /// Visible, enabled `TABSTOP` descendants of `root` in creation order.
    fn tab_stops(&self, root: WindowHandle) -> Vec<WindowHandle> {
        let mut stops: Vec<WindowHandle> = self
            .subtree(root)
            .into_iter()
            .skip(1)
            .filter(|h| {
                self.windows.get(h).is_some_and(|w| {
                    w.visible && w.enabled && w.styles.contains(WindowStyle::TABSTOP)
                })
            })
            .collect();
        stops.sort_by_key(|h| h.0);
        stops
    }

    fn next_tab_stop(&self, root: WindowHandle, backward: bool) -> Option<WindowHandle> {
        let stops = self.tab_stops(root);
        let len = stops.len();
        if len == 0 {
            return None;
        }
        let current = self.focus.and_then(|f| stops.iter().position(|h| *h == f));
        let index = match (current, backward) {
            (Some(i), false) => (i + 1) % len,
            (Some(i), true) => (i + len - 1) % len,
            (None, false) => 0,
            (None, true) => len - 1,
        };
        Some(stops[index])
    }

    fn owned_by(&self, owner: WindowHandle) -> Vec<WindowHandle> {
        let mut owned: Vec<WindowHandle> = self
            .windows
            .iter()
            .filter(|(_, w)| w.owner == Some(owner))
            .map(|(h, _)| *h)
            .collect();
        owned.sort_by_key(|h| h.0);
        owned
    }

    fn enqueue(&mut self, mut msg: Message) -> u32 {
        msg.time = self.tick();
        self.queue.push_back(msg);
        msg.time
    }
}

pub struct HeadlessNative {
    state: RefCell<State>,
}

impl Default for HeadlessNative {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessNative {
    /// A 96 DPI, 1920x1080 display with a 40 px taskbar at the bottom.
    pub fn new() -> Self {
        Self::with_display(
            96,
            Size::new(1920, 1080),
            Rect::new(0, 0, 1920, 1040),
        )
    }

    pub fn with_display(dpi: u32, screen: Size, work_area: Rect) -> Self {
        Self {
            state: RefCell::new(State {
                last_handle: 0,
                windows: HashMap::new(),
                classes: HashMap::new(),
                focus: None,
                active: None,
                queue: VecDeque::new(),
                quit: None,
                clock: 0,
                key_modifiers: HashMap::new(),
                accel_tables: HashMap::new(),
                destroyed_tables: 0,
                menus: HashMap::new(),
                timers: HashMap::new(),
                notifies: HashMap::new(),
                dialogs: Vec::new(),
                delivered: Vec::new(),
                dpi,
                screen,
                work_area,
                process_prepared: false,
                fail_next_create: false,
            }),
        }
    }

    pub fn set_dpi(&self, dpi: u32) {
        self.state.borrow_mut().dpi = dpi;
    }

    pub fn set_work_area(&self, work_area: Rect) {
        self.state.borrow_mut().work_area = work_area;
    }

    // ---- test driver ---------------------------------------------------

    /*
     * Creates a window with no message target, standing in for a child
     * control (`parent` given) or a foreign top-level window. Children are
     * visible tab stops.
     */
    pub fn spawn_window(&self, parent: Option<WindowHandle>, rect: Rect) -> WindowHandle {
        let mut state = self.state.borrow_mut();
        let hwnd = WindowHandle(state.next_handle());
        let styles = match parent {
            Some(_) => WindowStyle::CHILD | WindowStyle::VISIBLE | WindowStyle::TABSTOP,
            None => WindowStyle::OVERLAPPEDWINDOW | WindowStyle::VISIBLE,
        };
        state.windows.insert(
            hwnd,
            HeadlessWindow {
                class_name: String::from("Static"),
                title: String::new(),
                styles,
                ex_styles: WindowStyleEx::empty(),
                rect,
                parent,
                owner: None,
                enabled: true,
                visible: true,
                menu: None,
                target: None,
                destroying: false,
            },
        );
        log::trace!("HeadlessNative: spawned {hwnd:?} under {parent:?}");
        hwnd
    }

    /// Posts a key press to the focused window, with `modifiers` held.
    pub fn press_key(&self, key: VirtualKey, modifiers: AccelModifiers) {
        let msg_kind = if modifiers.contains(AccelModifiers::ALT) {
            wm::SYSKEYDOWN
        } else {
            wm::KEYDOWN
        };
        let mut state = self.state.borrow_mut();
        let target = state.focus.or(state.active).unwrap_or(WindowHandle::NULL);
        let time = state.enqueue(Message::new(target, msg_kind, usize::from(key.0), 1));
        state.key_modifiers.insert(time, modifiers);
    }

    /// Makes the next `create_window` fail before any message is sent, as
    /// `CreateWindowExW` does when it runs out of resources.
    pub fn fail_next_window_creation(&self) {
        self.state.borrow_mut().fail_next_create = true;
    }

    /// Posts the `WM_CHAR` a keyboard layout would produce for `ch`.
    pub fn type_char(&self, ch: char) {
        let mut state = self.state.borrow_mut();
        let target = state.focus.or(state.active).unwrap_or(WindowHandle::NULL);
        state.enqueue(Message::new(target, wm::CHAR, ch as usize, 1));
    }

    /*
     * Makes `hwnd` the active top-level window. The previously active window
     * receives WM_ACTIVATE(WA_INACTIVE) first and loses the focus if it was
     * inside it.
     */
    pub fn activate(&self, hwnd: WindowHandle) {
        let previous = {
            let state = self.state.borrow();
            if !state.windows.contains_key(&hwnd) || state.active == Some(hwnd) {
                return;
            }
            state.active
        };
        if let Some(previous) = previous {
            self.send_activate(previous, WmActivate::WA_INACTIVE, false, Some(hwnd));
        }
        self.state.borrow_mut().active = Some(hwnd);
        self.send_activate(hwnd, WmActivate::WA_ACTIVE, false, previous);
    }

    /// Deactivates `hwnd` without activating anything else (focus left the app).
    pub fn deactivate(&self, hwnd: WindowHandle) {
        self.leave(hwnd, false);
    }

    /// Deactivation caused by minimizing `hwnd`.
    pub fn minimize(&self, hwnd: WindowHandle) {
        self.leave(hwnd, true);
    }

    fn leave(&self, hwnd: WindowHandle, minimized: bool) {
        {
            let mut state = self.state.borrow_mut();
            if state.active == Some(hwnd) {
                state.active = None;
            }
        }
        self.send_activate(hwnd, WmActivate::WA_INACTIVE, minimized, None);
    }

    fn send_activate(
        &self,
        hwnd: WindowHandle,
        event: u16,
        minimized: bool,
        other: Option<WindowHandle>,
    ) {
        let wparam = make_wparam(event, u16::from(minimized));
        let lparam = other.map_or(0, |h| h.0 as isize);
        self.send_message(&Message::new(hwnd, wm::ACTIVATE, wparam, lparam));
        if event == WmActivate::WA_INACTIVE {
            let lost = {
                let mut state = self.state.borrow_mut();
                match state.focus {
                    Some(focus) if focus == hwnd || state.is_descendant(hwnd, focus) => {
                        state.focus = None;
                        Some(focus)
                    }
                    _ => None,
                }
            };
            if let Some(lost) = lost {
                self.send_message(&Message::new(lost, wm::KILLFOCUS, 0, 0));
            }
        }
    }

    /// Posts a message, as `PostMessageW` would.
    pub fn post(
        &self,
        hwnd: WindowHandle,
        msg: u32,
        wparam: usize,
        lparam: isize,
    ) -> PlatformResult<()> {
        self.post_message(&Message::new(hwnd, msg, wparam, lparam))
    }

    /// Sends a message synchronously, as `SendMessageW` would.
    pub fn send(&self, hwnd: WindowHandle, msg: u32, wparam: usize, lparam: isize) -> isize {
        self.send_message(&Message::new(hwnd, msg, wparam, lparam))
    }

    /// Posts a `WM_NOTIFY` from a child control carrying `header`.
    pub fn post_notify(&self, hwnd: WindowHandle, header: NotifyHeader) -> PlatformResult<()> {
        let token = {
            let mut state = self.state.borrow_mut();
            let token = state.tick() as isize;
            state.notifies.insert(token, header);
            token
        };
        self.post(hwnd, wm::NOTIFY, usize::from(header.id_from.raw()), token)
    }

    /// Posts the `WM_TIMER` of a running timer. Returns `false` if no such timer is set.
    pub fn fire_timer(&self, hwnd: WindowHandle, timer_id: usize) -> bool {
        let mut state = self.state.borrow_mut();
        if !state.timers.contains_key(&(hwnd, timer_id)) {
            return false;
        }
        state.enqueue(Message::new(hwnd, wm::TIMER, timer_id, 0));
        true
    }

    // ---- inspection ----------------------------------------------------

    pub fn window_count(&self) -> usize {
        self.state.borrow().windows.len()
    }

    pub fn is_visible(&self, hwnd: WindowHandle) -> bool {
        self.state
            .borrow()
            .windows
            .get(&hwnd)
            .is_some_and(|w| w.visible)
    }

    pub fn window_title(&self, hwnd: WindowHandle) -> Option<String> {
        self.state.borrow().windows.get(&hwnd).map(|w| w.title.clone())
    }

    pub fn window_class(&self, hwnd: WindowHandle) -> Option<String> {
        self.state
            .borrow()
            .windows
            .get(&hwnd)
            .map(|w| w.class_name.clone())
    }

    pub fn window_styles(&self, hwnd: WindowHandle) -> Option<(WindowStyle, WindowStyleEx)> {
        self.state
            .borrow()
            .windows
            .get(&hwnd)
            .map(|w| (w.styles, w.ex_styles))
    }

    /// The menu model attached to `hwnd`, if any.
    pub fn window_menu(&self, hwnd: WindowHandle) -> Option<Menu> {
        let state = self.state.borrow();
        let handle = state.windows.get(&hwnd)?.menu?;
        state.menus.get(&handle).cloned()
    }

    /// Native menus not yet destroyed, attached to a window or not.
    pub fn live_menus(&self) -> usize {
        self.state.borrow().menus.len()
    }

    pub fn registered_classes(&self) -> Vec<String> {
        let mut names: Vec<String> = self.state.borrow().classes.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn active_window(&self) -> Option<WindowHandle> {
        self.state.borrow().active
    }

    pub fn live_accelerator_tables(&self) -> usize {
        self.state.borrow().accel_tables.len()
    }

    pub fn destroyed_accelerator_tables(&self) -> usize {
        self.state.borrow().destroyed_tables
    }

    pub fn timer_interval(&self, hwnd: WindowHandle, timer_id: usize) -> Option<u32> {
        self.state.borrow().timers.get(&(hwnd, timer_id)).copied()
    }

    pub fn pending_messages(&self) -> usize {
        self.state.borrow().queue.len()
    }

    pub fn dialogs(&self) -> Vec<ErrorDialog> {
        self.state.borrow().dialogs.clone()
    }

    /// How many times `msg` was delivered to the target of `hwnd`.
    pub fn delivered_count(&self, hwnd: WindowHandle, msg: u32) -> usize {
        self.state
            .borrow()
            .delivered
            .iter()
            .filter(|m| m.hwnd == hwnd && m.msg == msg)
            .count()
    }

    pub fn process_prepared(&self) -> bool {
        self.state.borrow().process_prepared
    }

    // ---- internals -----------------------------------------------------

    fn deliver(&self, msg: &Message) -> isize {
        let target = {
            let mut state = self.state.borrow_mut();
            let Some(window) = state.windows.get(&msg.hwnd) else {
                log::trace!("HeadlessNative: dropping {:#06x} for dead {:?}", msg.msg, msg.hwnd);
                return 0;
            };
            let target = window.target.clone();
            state.delivered.push(*msg);
            target
        };
        match target.and_then(|t| t.handle_message(msg)) {
            Some(result) => result,
            None => self.default_window_proc(msg),
        }
    }

    fn focus_within(&self, hwnd: WindowHandle) -> bool {
        let state = self.state.borrow();
        match state.focus {
            Some(focus) => focus == hwnd || state.is_descendant(hwnd, focus),
            None => false,
        }
    }
}

impl NativeLayer for HeadlessNative {
    fn prepare_process(&self) -> PlatformResult<()> {
        self.state.borrow_mut().process_prepared = true;
        Ok(())
    }

    fn register_class(&self, class: &WindowClass) -> PlatformResult<()> {
        let mut state = self.state.borrow_mut();
        if state.classes.contains_key(&class.name) {
            log::debug!("HeadlessNative: class '{}' already registered", class.name);
            return Ok(());
        }
        log::debug!("HeadlessNative: registering class '{}'", class.name);
        state.classes.insert(class.name.clone(), class.clone());
        Ok(())
    }

    fn create_window(
        &self,
        params: &CreateParams<'_>,
        target: Rc<dyn MessageTarget>,
    ) -> PlatformResult<WindowHandle> {
        let hwnd = {
            let mut state = self.state.borrow_mut();
            if !state.classes.contains_key(params.class_name) {
                return Err(PlatformError::InitializationFailed(format!(
                    "{}: window class '{}' is not registered",
                    params.kind, params.class_name
                )));
            }
            if let Some(parent) = params.parent {
                if !state.windows.contains_key(&parent) {
                    return Err(PlatformError::InvalidHandle(format!(
                        "{}: parent {parent:?} is not a window",
                        params.kind
                    )));
                }
            }
            if std::mem::take(&mut state.fail_next_create) {
                return Err(PlatformError::Native {
                    function: "CreateWindowExW",
                    code: 8,
                });
            }
            let hwnd = WindowHandle(state.next_handle());
            let is_child = params.styles.contains(WindowStyle::CHILD);
            state.windows.insert(
                hwnd,
                HeadlessWindow {
                    class_name: params.class_name.to_string(),
                    title: params.title.to_string(),
                    styles: params.styles,
                    ex_styles: params.ex_styles,
                    rect: params.frame,
                    parent: if is_child { params.parent } else { None },
                    owner: if is_child { None } else { params.parent },
                    enabled: !params.styles.contains(WindowStyle::DISABLED),
                    visible: params.styles.contains(WindowStyle::VISIBLE),
                    menu: params.menu,
                    target: Some(target),
                    destroying: false,
                },
            );
            hwnd
        };
        log::debug!("HeadlessNative: created {} {hwnd:?}", params.kind);

        if self.send(hwnd, wm::NCCREATE, 0, 0) == 0 {
            self.destroy_window(hwnd)?;
            return Err(PlatformError::InitializationFailed(format!(
                "{}: WM_NCCREATE rejected",
                params.kind
            )));
        }
        if self.send(hwnd, wm::CREATE, 0, 0) == -1 {
            self.destroy_window(hwnd)?;
            return Err(PlatformError::InitializationFailed(format!(
                "{}: WM_CREATE aborted creation",
                params.kind
            )));
        }
        Ok(hwnd)
    }

    /*
     * Owned windows go first. Then the parent is notified, every window of
     * the subtree gets WM_DESTROY parent-first and WM_NCDESTROY child-first,
     * and each window disappears right after its WM_NCDESTROY.
     */
    fn destroy_window(&self, hwnd: WindowHandle) -> PlatformResult<()> {
        let (owned, parent) = {
            let state = self.state.borrow();
            let Some(window) = state.windows.get(&hwnd) else {
                return Err(PlatformError::InvalidHandle(format!(
                    "{hwnd:?} is not a window"
                )));
            };
            if window.destroying {
                return Ok(());
            }
            let notify_parent = !window.ex_styles.contains(WindowStyleEx::NOPARENTNOTIFY);
            (
                state.owned_by(hwnd),
                window.parent.filter(|_| notify_parent),
            )
        };
        for owned in owned {
            if let Err(e) = self.destroy_window(owned) {
                log::warn!("HeadlessNative: destroying owned {owned:?} failed: {e}");
            }
        }
        if let Some(parent) = parent {
            self.send(
                parent,
                wm::PARENTNOTIFY,
                make_wparam(wm::DESTROY as u16, 0),
                hwnd.0 as isize,
            );
        }

        let (subtree, owner, was_active) = {
            let mut state = self.state.borrow_mut();
            let subtree = state.subtree(hwnd);
            for h in &subtree {
                if let Some(w) = state.windows.get_mut(h) {
                    w.destroying = true;
                }
            }
            let was_active = state.active == Some(hwnd);
            let owner = state.windows.get(&hwnd).and_then(|w| w.owner);
            (subtree, owner, was_active)
        };
        for h in &subtree {
            self.send(*h, wm::DESTROY, 0, 0);
        }
        for h in subtree.iter().rev() {
            self.send(*h, wm::NCDESTROY, 0, 0);
            let removed = {
                let mut state = self.state.borrow_mut();
                if state.focus == Some(*h) {
                    state.focus = None;
                }
                if state.active == Some(*h) {
                    state.active = None;
                }
                state.timers.retain(|(timer_hwnd, _), _| timer_hwnd != h);
                state.windows.remove(h)
            };
            if let Some(window) = removed {
                if let Some(menu) = window.menu {
                    self.state.borrow_mut().menus.remove(&menu);
                }
                drop(window);
            }
        }
        log::debug!("HeadlessNative: destroyed {hwnd:?}");

        // Closing the active owned window hands activation back to its owner.
        if was_active {
            if let Some(owner) = owner {
                if self.is_window(owner) && self.is_window_enabled(owner) {
                    self.activate(owner);
                }
            }
        }
        Ok(())
    }

    fn show_window(&self, hwnd: WindowHandle, cmd: ShowCommand) {
        let top_level = {
            let mut state = self.state.borrow_mut();
            let Some(window) = state.windows.get_mut(&hwnd) else {
                return;
            };
            window.visible = cmd != ShowCommand::Hide;
            window.parent.is_none()
        };
        let activates = matches!(
            cmd,
            ShowCommand::Show | ShowCommand::Normal | ShowCommand::Maximized
        );
        if top_level && activates {
            self.activate(hwnd);
        }
    }

    fn update_window(&self, _hwnd: WindowHandle) {}

    fn enable_window(&self, hwnd: WindowHandle, enable: bool) {
        if let Some(window) = self.state.borrow_mut().windows.get_mut(&hwnd) {
            window.enabled = enable;
        }
    }

    fn is_window(&self, hwnd: WindowHandle) -> bool {
        self.state.borrow().windows.contains_key(&hwnd)
    }

    fn is_window_enabled(&self, hwnd: WindowHandle) -> bool {
        self.state
            .borrow()
            .windows
            .get(&hwnd)
            .is_some_and(|w| w.enabled)
    }

    fn is_child(&self, parent: WindowHandle, hwnd: WindowHandle) -> bool {
        self.state.borrow().is_descendant(parent, hwnd)
    }

    fn owner(&self, hwnd: WindowHandle) -> Option<WindowHandle> {
        self.state.borrow().windows.get(&hwnd).and_then(|w| w.owner)
    }

    fn get_focus(&self) -> Option<WindowHandle> {
        self.state.borrow().focus
    }

    fn set_focus(&self, hwnd: WindowHandle) {
        let previous = {
            let mut state = self.state.borrow_mut();
            if !state.windows.contains_key(&hwnd) || state.focus == Some(hwnd) {
                return;
            }
            state.focus.replace(hwnd)
        };
        if let Some(previous) = previous {
            self.send(previous, wm::KILLFOCUS, hwnd.0, 0);
        }
        self.send(hwnd, wm::SETFOCUS, previous.map_or(0, |h| h.0), 0);
    }

    fn first_tab_child(&self, hwnd: WindowHandle) -> Option<WindowHandle> {
        let state = self.state.borrow();
        state
            .windows
            .iter()
            .filter(|(_, w)| {
                w.parent == Some(hwnd)
                    && w.visible
                    && w.enabled
                    && w.styles.contains(WindowStyle::TABSTOP)
            })
            .map(|(h, _)| *h)
            .min_by_key(|h| h.0)
    }

    fn window_rect(&self, hwnd: WindowHandle) -> PlatformResult<Rect> {
        self.state
            .borrow()
            .windows
            .get(&hwnd)
            .map(|w| w.rect)
            .ok_or_else(|| PlatformError::InvalidHandle(format!("{hwnd:?} is not a window")))
    }

    fn set_window_pos(&self, hwnd: WindowHandle, pos: Point) -> PlatformResult<()> {
        let mut state = self.state.borrow_mut();
        let window = state
            .windows
            .get_mut(&hwnd)
            .ok_or_else(|| PlatformError::InvalidHandle(format!("{hwnd:?} is not a window")))?;
        let rc = window.rect;
        window.rect = rc.offset(pos.x - rc.left, pos.y - rc.top);
        Ok(())
    }

    fn system_dpi(&self) -> u32 {
        self.state.borrow().dpi
    }

    fn screen_size(&self) -> Size {
        self.state.borrow().screen
    }

    fn work_area(&self) -> Rect {
        self.state.borrow().work_area
    }

    fn adjust_window_rect(
        &self,
        client: Rect,
        styles: WindowStyle,
        _ex_styles: WindowStyleEx,
        has_menu: bool,
    ) -> PlatformResult<Rect> {
        let top = if styles.contains(WindowStyle::CAPTION) {
            CAPTION_HEIGHT
        } else {
            FRAME_BORDER
        };
        let menu = if has_menu { MENU_BAR_HEIGHT } else { 0 };
        Ok(Rect::new(
            client.left - FRAME_BORDER,
            client.top - top - menu,
            client.right + FRAME_BORDER,
            client.bottom + FRAME_BORDER,
        ))
    }

    fn create_menu(&self, menu: &Menu) -> PlatformResult<MenuHandle> {
        let mut state = self.state.borrow_mut();
        let handle = MenuHandle(state.next_handle());
        state.menus.insert(handle, menu.clone());
        Ok(handle)
    }

    fn is_menu(&self, menu: MenuHandle) -> bool {
        self.state.borrow().menus.contains_key(&menu)
    }

    fn destroy_menu(&self, menu: MenuHandle) -> PlatformResult<()> {
        match self.state.borrow_mut().menus.remove(&menu) {
            Some(_) => Ok(()),
            None => Err(PlatformError::InvalidHandle(format!("{menu:?} is not a menu"))),
        }
    }

    fn enable_menu_item(
        &self,
        hwnd: WindowHandle,
        menu: MenuHandle,
        command: CommandId,
        enable: bool,
    ) -> PlatformResult<bool> {
        let mut state = self.state.borrow_mut();
        if !state.windows.contains_key(&hwnd) {
            return Err(PlatformError::InvalidHandle(format!("{hwnd:?} is not a window")));
        }
        let model = state
            .menus
            .get_mut(&menu)
            .ok_or_else(|| PlatformError::InvalidHandle(format!("{menu:?} is not a menu")))?;
        Ok(model.set_enabled(command, enable))
    }

    fn create_accelerator_table(&self, entries: &[NativeAccel]) -> PlatformResult<AccelHandle> {
        if entries.is_empty() {
            return Err(PlatformError::OperationFailed(
                "CreateAcceleratorTableW needs at least one entry".to_string(),
            ));
        }
        let mut state = self.state.borrow_mut();
        let handle = AccelHandle(state.next_handle());
        state.accel_tables.insert(handle, entries.to_vec());
        Ok(handle)
    }

    fn destroy_accelerator_table(&self, table: AccelHandle) -> PlatformResult<()> {
        let mut state = self.state.borrow_mut();
        match state.accel_tables.remove(&table) {
            Some(_) => {
                state.destroyed_tables += 1;
                Ok(())
            }
            None => Err(PlatformError::InvalidHandle(format!(
                "{table:?} is not an accelerator table"
            ))),
        }
    }

    /// Never blocks: an empty queue without a pending quit is an error, since
    /// nothing could ever wake the loop up.
    fn get_message(&self) -> PlatformResult<Retrieved> {
        let mut state = self.state.borrow_mut();
        if let Some(msg) = state.queue.pop_front() {
            return Ok(Retrieved::Message(msg));
        }
        match state.quit.take() {
            Some(code) => Ok(Retrieved::Quit(code)),
            None => Err(PlatformError::OperationFailed(
                "message queue is empty and no quit is pending".to_string(),
            )),
        }
    }

    fn translate_accelerator(
        &self,
        hwnd: WindowHandle,
        table: AccelHandle,
        msg: &Message,
    ) -> bool {
        let key = match msg.msg {
            wm::KEYDOWN | wm::SYSKEYDOWN => MatchKey::Virtual(loword(msg.wparam)),
            wm::CHAR => MatchKey::Char(loword(msg.wparam)),
            _ => return false,
        };
        let command = {
            let state = self.state.borrow();
            if !state.windows.contains_key(&hwnd) {
                return false;
            }
            let modifiers = state
                .key_modifiers
                .get(&msg.time)
                .copied()
                .unwrap_or_default();
            let Some(entries) = state.accel_tables.get(&table) else {
                log::warn!("HeadlessNative: translate with unknown {table:?}");
                return false;
            };
            entries
                .iter()
                .find(|a| a.key == key && a.modifiers == modifiers)
                .map(|a| a.command)
        };
        match command {
            Some(command) => {
                self.send(
                    hwnd,
                    wm::COMMAND,
                    make_wparam(command.raw(), COMMAND_CODE_ACCELERATOR),
                    0,
                );
                true
            }
            None => false,
        }
    }

    /*
     * Esc sends WM_COMMAND(IDCANCEL) to the top-level window, Tab and
     * Shift+Tab cycle the focus through its tab stops. Every other message is
     * left to the regular dispatch.
     */
    fn is_dialog_message(&self, msg: &Message) -> bool {
        if msg.msg != wm::KEYDOWN {
            return false;
        }
        let key = loword(msg.wparam);
        let (root, modifiers) = {
            let state = self.state.borrow();
            let Some(root) = state.root_of(msg.hwnd) else {
                return false;
            };
            let modifiers = state
                .key_modifiers
                .get(&msg.time)
                .copied()
                .unwrap_or_default();
            (root, modifiers)
        };
        if key == VirtualKey::ESCAPE.0 {
            self.send(root, wm::COMMAND, make_wparam(CommandId::CANCEL.raw(), 0), 0);
            true
        } else if key == VirtualKey::TAB.0 {
            let backward = modifiers.contains(AccelModifiers::SHIFT);
            let next = self.state.borrow().next_tab_stop(root, backward);
            if let Some(next) = next {
                self.set_focus(next);
            }
            true
        } else {
            false
        }
    }

    fn translate_message(&self, _msg: &Message) {}

    fn dispatch_message(&self, msg: &Message) -> isize {
        if msg.hwnd.is_null() {
            return 0;
        }
        self.deliver(msg)
    }

    fn default_window_proc(&self, msg: &Message) -> isize {
        match msg.msg {
            wm::NCCREATE => 1,
            wm::CLOSE => {
                if let Err(e) = self.destroy_window(msg.hwnd) {
                    log::warn!("HeadlessNative: default WM_CLOSE could not destroy: {e}");
                }
                0
            }
            wm::ACTIVATE => {
                let active = loword(msg.wparam) != WmActivate::WA_INACTIVE;
                let minimized = hiword(msg.wparam) != 0;
                if active && !minimized && !self.focus_within(msg.hwnd) {
                    self.set_focus(msg.hwnd);
                }
                0
            }
            _ => 0,
        }
    }

    fn send_message(&self, msg: &Message) -> isize {
        self.deliver(msg)
    }

    fn post_message(&self, msg: &Message) -> PlatformResult<()> {
        let mut state = self.state.borrow_mut();
        if !msg.hwnd.is_null() && !state.windows.contains_key(&msg.hwnd) {
            return Err(PlatformError::InvalidHandle(format!(
                "cannot post {:#06x} to {:?}",
                msg.msg, msg.hwnd
            )));
        }
        state.enqueue(*msg);
        Ok(())
    }

    fn post_quit_message(&self, exit_code: i32) {
        log::debug!("HeadlessNative: quit requested with code {exit_code}");
        self.state.borrow_mut().quit = Some(exit_code);
    }

    fn set_timer(
        &self,
        hwnd: WindowHandle,
        timer_id: usize,
        interval_ms: u32,
    ) -> PlatformResult<()> {
        let mut state = self.state.borrow_mut();
        if !state.windows.contains_key(&hwnd) {
            return Err(PlatformError::InvalidHandle(format!(
                "cannot set timer {timer_id} on {hwnd:?}"
            )));
        }
        state.timers.insert((hwnd, timer_id), interval_ms);
        Ok(())
    }

    fn kill_timer(&self, hwnd: WindowHandle, timer_id: usize) -> PlatformResult<()> {
        match self.state.borrow_mut().timers.remove(&(hwnd, timer_id)) {
            Some(_) => Ok(()),
            None => Err(PlatformError::Native {
                function: "KillTimer",
                code: 0,
            }),
        }
    }

    fn decode_notify(&self, msg: &Message) -> Option<NotifyHeader> {
        if msg.msg != wm::NOTIFY {
            return None;
        }
        self.state.borrow().notifies.get(&msg.lparam).copied()
    }

    fn show_error_dialog(&self, owner: Option<WindowHandle>, title: &str, text: &str) {
        log::error!("HeadlessNative: error dialog '{title}': {text}");
        self.state.borrow_mut().dialogs.push(ErrorDialog {
            owner,
            title: title.to_string(),
            text: text.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::menu::MenuItem;

    /// Records every message it receives and never handles any.
    #[derive(Default)]
    struct Recorder {
        seen: RefCell<Vec<(WindowHandle, u32)>>,
    }

    impl MessageTarget for Recorder {
        fn handle_message(&self, msg: &Message) -> Option<isize> {
            self.seen.borrow_mut().push((msg.hwnd, msg.msg));
            None
        }
    }

    fn register(native: &HeadlessNative) -> WindowClass {
        let class = WindowClass::new(
            Some("Test"),
            Default::default(),
            Default::default(),
            Default::default(),
            None,
        );
        native.register_class(&class).expect("register");
        class
    }

    fn params<'a>(class: &'a WindowClass, parent: Option<WindowHandle>) -> CreateParams<'a> {
        CreateParams {
            kind: "Test",
            class_name: &class.name,
            title: "t",
            styles: WindowStyle::CAPTION,
            ex_styles: WindowStyleEx::empty(),
            frame: Rect::new(0, 0, 100, 100),
            parent,
            menu: None,
        }
    }

    #[test]
    fn creation_requires_a_registered_class() {
        let native = HeadlessNative::new();
        let class = WindowClass::new(
            Some("Missing"),
            Default::default(),
            Default::default(),
            Default::default(),
            None,
        );
        let result = native.create_window(&params(&class, None), Rc::new(Recorder::default()));
        assert!(matches!(result, Err(PlatformError::InitializationFailed(_))));
    }

    #[test]
    fn creation_and_destruction_message_order() {
        // Arrange
        let native = HeadlessNative::new();
        let class = register(&native);
        let recorder = Rc::new(Recorder::default());
        let hwnd = native
            .create_window(&params(&class, None), recorder.clone())
            .expect("create");
        let child = native.spawn_window(Some(hwnd), Rect::new(0, 0, 10, 10));

        // Act
        native.destroy_window(hwnd).expect("destroy");

        // Assert
        let seen: Vec<u32> = recorder.seen.borrow().iter().map(|(_, m)| *m).collect();
        assert_eq!(seen, vec![wm::NCCREATE, wm::CREATE, wm::DESTROY, wm::NCDESTROY]);
        assert!(!native.is_window(hwnd));
        assert!(!native.is_window(child));
    }

    #[test]
    fn destroying_a_child_notifies_the_parent() {
        let native = HeadlessNative::new();
        let class = register(&native);
        let recorder = Rc::new(Recorder::default());
        let hwnd = native
            .create_window(&params(&class, None), recorder.clone())
            .expect("create");
        let child = native.spawn_window(Some(hwnd), Rect::new(0, 0, 10, 10));
        native.set_focus(child);

        native.destroy_window(child).expect("destroy");

        assert!(recorder.seen.borrow().contains(&(hwnd, wm::PARENTNOTIFY)));
        assert_eq!(native.get_focus(), None);
        assert!(native.is_window(hwnd));
    }

    #[test]
    fn owned_windows_are_destroyed_with_their_owner() {
        let native = HeadlessNative::new();
        let class = register(&native);
        let owner = native
            .create_window(&params(&class, None), Rc::new(Recorder::default()))
            .expect("owner");
        let owned = native
            .create_window(&params(&class, Some(owner)), Rc::new(Recorder::default()))
            .expect("owned");
        assert_eq!(native.owner(owned), Some(owner));
        assert!(!native.is_child(owner, owned));

        native.destroy_window(owner).expect("destroy");

        assert_eq!(native.window_count(), 0);
    }

    #[test]
    fn quit_is_retrieved_after_pending_messages() {
        let native = HeadlessNative::new();
        let hwnd = native.spawn_window(None, Rect::new(0, 0, 10, 10));
        native.post_quit_message(3);
        native.post(hwnd, wm::APP, 0, 0).expect("post");

        assert!(matches!(native.get_message(), Ok(Retrieved::Message(m)) if m.msg == wm::APP));
        assert_eq!(native.get_message().ok(), Some(Retrieved::Quit(3)));
        assert!(native.get_message().is_err());
    }

    #[test]
    fn accelerator_matches_key_and_modifiers() {
        let native = HeadlessNative::new();
        let class = register(&native);
        let recorder = Rc::new(Recorder::default());
        let hwnd = native
            .create_window(&params(&class, None), recorder.clone())
            .expect("create");
        let table = native
            .create_accelerator_table(&[NativeAccel {
                key: MatchKey::Virtual(u16::from(b'O')),
                modifiers: AccelModifiers::CONTROL,
                command: CommandId(20000),
            }])
            .expect("table");
        native.set_focus(hwnd);
        native.press_key(VirtualKey(u16::from(b'O')), AccelModifiers::NONE);
        native.press_key(VirtualKey(u16::from(b'O')), AccelModifiers::CONTROL);

        let Ok(Retrieved::Message(plain)) = native.get_message() else {
            panic!("expected key message");
        };
        let Ok(Retrieved::Message(ctrl)) = native.get_message() else {
            panic!("expected key message");
        };

        assert!(!native.translate_accelerator(hwnd, table, &plain));
        assert!(native.translate_accelerator(hwnd, table, &ctrl));
        assert_eq!(native.delivered_count(hwnd, wm::COMMAND), 1);
    }

    #[test]
    fn activation_moves_focus_between_top_levels() {
        let native = HeadlessNative::new();
        let a = native.spawn_window(None, Rect::new(0, 0, 10, 10));
        let b = native.spawn_window(None, Rect::new(0, 0, 10, 10));

        native.activate(a);
        assert_eq!(native.get_focus(), Some(a));
        native.activate(b);
        assert_eq!(native.get_focus(), Some(b));
        assert_eq!(native.active_window(), Some(b));

        native.deactivate(b);
        assert_eq!(native.get_focus(), None);
        assert_eq!(native.active_window(), None);
    }

    #[test]
    fn timers_fire_only_while_set() {
        let native = HeadlessNative::new();
        let hwnd = native.spawn_window(None, Rect::new(0, 0, 10, 10));
        native.set_timer(hwnd, 7, 250).expect("set");
        assert_eq!(native.timer_interval(hwnd, 7), Some(250));
        assert!(native.fire_timer(hwnd, 7));

        native.kill_timer(hwnd, 7).expect("kill");
        assert!(!native.fire_timer(hwnd, 7));
        assert!(native.kill_timer(hwnd, 7).is_err());
        assert_eq!(native.pending_messages(), 1);
    }

    #[test]
    fn typed_characters_match_plain_character_accelerators() {
        let native = HeadlessNative::new();
        let class = register(&native);
        let recorder = Rc::new(Recorder::default());
        let hwnd = native
            .create_window(&params(&class, None), recorder.clone())
            .expect("create");
        assert_eq!(native.window_title(hwnd).as_deref(), Some("t"));
        assert_eq!(native.window_class(hwnd).as_deref(), Some("Test"));
        assert!(!native.is_visible(hwnd));
        native.show_window(hwnd, ShowCommand::Show);
        assert!(native.is_visible(hwnd));
        let table = native
            .create_accelerator_table(&[NativeAccel {
                key: MatchKey::Char(u16::from(b'?')),
                modifiers: AccelModifiers::NONE,
                command: CommandId(20001),
            }])
            .expect("table");

        native.type_char('?');
        let Ok(Retrieved::Message(typed)) = native.get_message() else {
            panic!("expected WM_CHAR");
        };

        assert_eq!((typed.hwnd, typed.msg), (hwnd, wm::CHAR));
        assert!(native.translate_accelerator(hwnd, table, &typed));
    }

    #[test]
    fn escape_and_tab_are_handled_by_the_dialog_manager() {
        // Arrange
        let native = HeadlessNative::new();
        let class = register(&native);
        let recorder = Rc::new(Recorder::default());
        let hwnd = native
            .create_window(&params(&class, None), recorder.clone())
            .expect("create");
        let first = native.spawn_window(Some(hwnd), Rect::new(0, 0, 10, 10));
        let second = native.spawn_window(Some(hwnd), Rect::new(0, 20, 10, 30));
        native.set_focus(first);
        native.press_key(VirtualKey::TAB, AccelModifiers::NONE);
        native.press_key(VirtualKey::TAB, AccelModifiers::NONE);
        native.press_key(VirtualKey::TAB, AccelModifiers::SHIFT);
        native.press_key(VirtualKey::ESCAPE, AccelModifiers::NONE);
        native.press_key(VirtualKey::F1, AccelModifiers::NONE);

        // Act / Assert
        let next = || match native.get_message() {
            Ok(Retrieved::Message(msg)) => msg,
            other => panic!("expected a key message, got {other:?}"),
        };
        assert!(native.is_dialog_message(&next()));
        assert_eq!(native.get_focus(), Some(second));
        assert!(native.is_dialog_message(&next()));
        assert_eq!(native.get_focus(), Some(first));
        assert!(native.is_dialog_message(&next()));
        assert_eq!(native.get_focus(), Some(second));

        assert!(native.is_dialog_message(&next()));
        assert_eq!(native.delivered_count(hwnd, wm::COMMAND), 1);
        assert!(!native.is_dialog_message(&next()));
    }

    #[test]
    fn menu_items_are_enabled_on_the_live_menu() {
        let native = HeadlessNative::new();
        let class = register(&native);
        let mut bar = Menu::new();
        bar.add_item(CommandId(20000), "&Open");
        let menu = native.create_menu(&bar).expect("menu");
        let mut with_menu = params(&class, None);
        with_menu.menu = Some(menu);
        let hwnd = native
            .create_window(&with_menu, Rc::new(Recorder::default()))
            .expect("create");

        assert_eq!(native.enable_menu_item(hwnd, menu, CommandId(20000), false).ok(), Some(true));
        assert_eq!(native.enable_menu_item(hwnd, menu, CommandId(4242), false).ok(), Some(false));
        let live = native.window_menu(hwnd).expect("attached");
        assert!(matches!(
            live.find(CommandId(20000)),
            Some(MenuItem::Entry { enabled: false, .. })
        ));

        native.destroy_window(hwnd).expect("destroy");
        assert!(!native.is_menu(menu));
        assert_eq!(native.live_menus(), 0);
    }

    #[test]
    fn failed_creation_sends_no_message() {
        let native = HeadlessNative::new();
        let class = register(&native);
        let recorder = Rc::new(Recorder::default());
        native.fail_next_window_creation();

        let result = native.create_window(&params(&class, None), recorder.clone());

        assert!(matches!(result, Err(PlatformError::Native { .. })));
        assert!(recorder.seen.borrow().is_empty());
        assert!(native.create_window(&params(&class, None), recorder).is_ok());
    }

    #[test]
    fn adjust_adds_caption_border_and_menu() {
        let native = HeadlessNative::new();
        let client = Rect::new(100, 100, 200, 200);
        let framed = native
            .adjust_window_rect(client, WindowStyle::CAPTION, WindowStyleEx::empty(), true)
            .expect("adjust");
        assert_eq!(framed, Rect::new(92, 49, 208, 208));
    }
}
