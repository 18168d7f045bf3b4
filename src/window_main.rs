/*
 * The application's top-level window. It owns the main menu, the accelerator
 * table and the control id allocator, and runs the message loop: `run()`
 * creates the window, shows it, pumps until WM_QUIT and tears everything down
 * again, also when a handler fails.
 */
use std::cell::{Cell, RefCell, RefMut};
use std::rc::Rc;

use crate::accelerator::AcceleratorTable;
use crate::error::{PlatformError, Result as PlatformResult};
use crate::event_registry::EventKey;
use crate::events::Events;
use crate::geometry::{self, WindowGeometry};
use crate::id_allocator::IdAllocator;
use crate::lifecycle::WindowState;
use crate::menu::{MainMenu, Menu};
use crate::message::{Message, wm};
use crate::message_loop;
use crate::native::{Background, CreateParams, Cursor, NativeLayer, WindowClass};
use crate::types::{
    ClassStyle, MenuHandle, ShowCommand, Size, WindowHandle, WindowStyle, WindowStyleEx,
};
use crate::window_base::{WindowCore, handler, take_fault};

/// Creation options of a `WindowMain`.
#[derive(Debug)]
pub struct WindowMainOptions {
    /// Registered class name. Defaults to a hash of the class parameters.
    pub class_name: Option<String>,
    /// Defaults to `CS_DBLCLKS`.
    pub class_styles: ClassStyle,
    pub cursor: Cursor,
    pub background: Background,
    /// Icon resource id in the executable.
    pub icon_id: Option<u16>,
    /// Defaults to `WS_CAPTION | WS_SYSMENU | WS_CLIPCHILDREN | WS_BORDER | WS_VISIBLE`.
    pub styles: WindowStyle,
    pub ex_styles: WindowStyleEx,
    pub title: String,
    /// Client area at 96 DPI; scaled to the system DPI at creation. Defaults to 500x400.
    pub client_area: Size,
    pub show: ShowCommand,
    pub accel_table: AcceleratorTable,
    pub menu: Menu,
}

impl Default for WindowMainOptions {
    fn default() -> Self {
        Self {
            class_name: None,
            class_styles: ClassStyle::DBLCLKS,
            cursor: Cursor::Arrow,
            background: Background::ButtonFace,
            icon_id: None,
            styles: WindowStyle::CAPTION
                | WindowStyle::SYSMENU
                | WindowStyle::CLIPCHILDREN
                | WindowStyle::BORDER
                | WindowStyle::VISIBLE,
            ex_styles: WindowStyleEx::empty(),
            title: String::new(),
            client_area: Size::new(500, 400),
            show: ShowCommand::Show,
            accel_table: AcceleratorTable::new(),
            menu: Menu::new(),
        }
    }
}

impl WindowMainOptions {
    pub fn class_name(mut self, name: impl Into<String>) -> Self {
        self.class_name = Some(name.into());
        self
    }

    pub fn class_styles(mut self, styles: ClassStyle) -> Self {
        self.class_styles = styles;
        self
    }

    pub fn cursor(mut self, cursor: Cursor) -> Self {
        self.cursor = cursor;
        self
    }

    pub fn background(mut self, background: Background) -> Self {
        self.background = background;
        self
    }

    pub fn icon_id(mut self, id: u16) -> Self {
        self.icon_id = Some(id);
        self
    }

    pub fn styles(mut self, styles: WindowStyle) -> Self {
        self.styles = styles;
        self
    }

    pub fn ex_styles(mut self, ex_styles: WindowStyleEx) -> Self {
        self.ex_styles = ex_styles;
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn client_area(mut self, size: Size) -> Self {
        self.client_area = size;
        self
    }

    pub fn show(mut self, cmd: ShowCommand) -> Self {
        self.show = cmd;
        self
    }

    pub fn accel_table(mut self, table: AcceleratorTable) -> Self {
        self.accel_table = table;
        self
    }

    pub fn menu(mut self, menu: Menu) -> Self {
        self.menu = menu;
        self
    }
}

pub struct WindowMain {
    core: Rc<WindowCore>,
    class: WindowClass,
    title: String,
    styles: WindowStyle,
    ex_styles: WindowStyleEx,
    client_area: Size,
    show: ShowCommand,
    menu: RefCell<Menu>,
    live_menu: Cell<Option<MenuHandle>>,
    accel_table: RefCell<AcceleratorTable>,
    ids: IdAllocator,
    geometry: Cell<Option<WindowGeometry>>,
    // Set once the loop has returned; teardown must not post another WM_QUIT.
    loop_ended: Rc<Cell<bool>>,
}

impl WindowMain {
    pub fn new(native: Rc<dyn NativeLayer>, opts: WindowMainOptions) -> Self {
        let class = WindowClass::new(
            opts.class_name.as_deref(),
            opts.class_styles,
            opts.cursor,
            opts.background,
            opts.icon_id,
        );
        log::debug!("WindowMain: configured with class '{}'", class.name);
        Self {
            core: WindowCore::new("WindowMain", native),
            class,
            title: opts.title,
            styles: opts.styles,
            ex_styles: opts.ex_styles,
            client_area: opts.client_area,
            show: opts.show,
            menu: RefCell::new(opts.menu),
            live_menu: Cell::new(None),
            accel_table: RefCell::new(opts.accel_table),
            ids: IdAllocator::default(),
            geometry: Cell::new(None),
            loop_ended: Rc::new(Cell::new(false)),
        }
    }

    /// Event registration. Handlers registered here override the built-in defaults.
    pub fn on(&self) -> Events<'_> {
        Events::new(&self.core)
    }

    /// The native handle; null before `run()` and after destruction.
    pub fn hwnd(&self) -> WindowHandle {
        self.core.hwnd()
    }

    pub fn state(&self) -> WindowState {
        self.core.state()
    }

    /// Every lifecycle state visited so far, in order.
    pub fn state_history(&self) -> Vec<WindowState> {
        self.core.history()
    }

    /// Placement computed at creation.
    pub fn geometry(&self) -> Option<WindowGeometry> {
        self.geometry.get()
    }

    pub fn native(&self) -> &Rc<dyn NativeLayer> {
        self.core.native()
    }

    /// The menu bar. Its structure is fixed once the window exists; entries
    /// can still be enabled and disabled.
    pub fn main_menu(&self) -> MainMenu<'_> {
        MainMenu::new(
            &self.menu,
            self.native().as_ref(),
            self.hwnd(),
            self.live_menu.get(),
        )
    }

    /// The keyboard shortcuts, editable until the loop starts.
    pub fn accel_table(&self) -> RefMut<'_, AcceleratorTable> {
        self.accel_table.borrow_mut()
    }

    /// Control ids for the children of this window.
    pub fn ids(&self) -> &IdAllocator {
        &self.ids
    }

    /// Asks the window to close, as the system menu would.
    pub fn close(&self) {
        let hwnd = self.hwnd();
        if !hwnd.is_null() {
            self.native().send_message(&Message::new(hwnd, wm::CLOSE, 0, 0));
        }
    }

    /// Starts a native timer delivering `WM_TIMER`, see `Events::wm_timer`.
    pub fn set_timer(&self, timer_id: usize, interval_ms: u32) -> PlatformResult<()> {
        let hwnd = self.live_hwnd()?;
        self.native().set_timer(hwnd, timer_id, interval_ms)
    }

    pub fn kill_timer(&self, timer_id: usize) -> PlatformResult<()> {
        let hwnd = self.live_hwnd()?;
        self.native().kill_timer(hwnd, timer_id)
    }

    fn live_hwnd(&self) -> PlatformResult<WindowHandle> {
        self.hwnd().non_null().ok_or_else(|| {
            PlatformError::InvalidHandle("WindowMain has no native window".to_string())
        })
    }

    /*
     * Creates the window and runs the main loop until WM_QUIT. Returns the
     * quit code, or the error that aborted creation or the loop. In every
     * case the window is gone, its registry released and the accelerator
     * table destroyed when this returns.
     */
    pub fn run(&self) -> PlatformResult<i32> {
        self.core.expect_configured()?;
        // Stale faults from an earlier window on this thread are not ours.
        if let Some(stale) = take_fault() {
            log::warn!("WindowMain: discarding stale fault before run: {stale}");
        }
        let native = Rc::clone(self.native());
        native.prepare_process()?;

        let accel = self.accel_table.borrow_mut().build(native.as_ref())?;

        // Creation errors are returned as they are; only faults of running
        // handlers reach the user as a dialog.
        let result = self.create_and_show(native.as_ref()).and_then(|()| {
            let pumped = match take_fault() {
                Some(fault) => Err(fault),
                None => message_loop::run(native.as_ref(), || self.core.hwnd(), accel),
            };
            pumped.map_err(|e| self.report(native.as_ref(), e))
        });

        self.loop_ended.set(true);
        self.teardown(native.as_ref());
        result
    }

    fn create_and_show(&self, native: &dyn NativeLayer) -> PlatformResult<()> {
        native.register_class(&self.class)?;

        let has_menu = !self.menu.borrow().is_empty();
        let geometry = geometry::main_window_geometry(
            self.client_area,
            native.system_dpi(),
            native.screen_size(),
            native.work_area(),
            |client| native.adjust_window_rect(client, self.styles, self.ex_styles, has_menu),
        )?;
        self.geometry.set(Some(geometry));
        log::debug!("WindowMain: geometry {geometry:?}");

        let menu = if has_menu {
            Some(native.create_menu(&self.menu.borrow())?)
        } else {
            None
        };

        self.install_defaults();
        let created = self.core.create(&CreateParams {
            kind: self.core.kind(),
            class_name: &self.class.name,
            title: &self.title,
            styles: self.styles,
            ex_styles: self.ex_styles,
            frame: geometry.frame,
            parent: None,
            menu,
        });
        let hwnd = match created {
            Ok(hwnd) => hwnd,
            Err(e) => {
                // A menu no window took ownership of is ours to free.
                if let Some(menu) = menu.filter(|m| native.is_menu(*m)) {
                    if let Err(cleanup) = native.destroy_menu(menu) {
                        log::warn!("WindowMain: freeing orphaned menu {menu:?} failed: {cleanup}");
                    }
                }
                return Err(e);
            }
        };
        self.live_menu.set(menu);

        self.core.advance(WindowState::Running)?;
        native.show_window(hwnd, self.show);
        native.update_window(hwnd);
        Ok(())
    }

    fn install_defaults(&self) {
        let weak = Rc::downgrade(&self.core);
        let loop_ended = Rc::clone(&self.loop_ended);
        self.core.register_default(
            EventKey::Message(wm::NCDESTROY),
            handler(move |_| {
                // A window that never finished creating doesn't end the loop,
                // and neither does one destroyed after the loop returned.
                if let Some(core) = weak.upgrade() {
                    if core.state().is_alive() && !loop_ended.get() {
                        core.native().post_quit_message(0);
                    }
                }
                Ok(Some(0))
            }),
        );
        self.core.install_focus_defaults();
    }

    fn report(&self, native: &dyn NativeLayer, err: PlatformError) -> PlatformError {
        log::error!("WindowMain: {err}");
        let title = match &err {
            PlatformError::HandlerPanicked(_) => "Panic",
            _ => "Unhandled error",
        };
        native.show_error_dialog(self.hwnd().non_null(), title, &err.to_string());
        err
    }

    /// Destroys the window if it still exists, then the accelerator table.
    fn teardown(&self, native: &dyn NativeLayer) {
        let hwnd = self.hwnd();
        if !hwnd.is_null() && native.is_window(hwnd) {
            if let Err(e) = native.destroy_window(hwnd) {
                log::warn!("WindowMain: destroying {hwnd:?} failed: {e}");
            }
        }
        self.core.finish();
        self.live_menu.set(None);
        if let Some(late) = take_fault() {
            log::warn!("WindowMain: discarding fault raised during teardown: {late}");
        }
        self.accel_table.borrow_mut().destroy(native);
        log::debug!("WindowMain: teardown complete");
    }
}
