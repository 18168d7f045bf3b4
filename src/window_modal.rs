/*
 * Modal popup. `show()` disables the owner, creates the popup centred over the
 * owner and returns; the popup's messages then flow through the owner's
 * message loop. Closing re-enables the owner before the popup is destroyed,
 * so activation goes back to it, and the owner's previously focused control
 * gets the focus again.
 * See https://devblogs.microsoft.com/oldnewthing/20040227-00/?p=40463
 */
use std::cell::Cell;
use std::rc::Rc;

use crate::error::{PlatformError, Result as PlatformResult};
use crate::event_registry::EventKey;
use crate::events::Events;
use crate::focus::FocusMemory;
use crate::geometry::{self, WindowGeometry};
use crate::lifecycle::WindowState;
use crate::message::{Message, wm};
use crate::native::{Background, CreateParams, Cursor, NativeLayer, WindowClass};
use crate::types::{
    ClassStyle, Point, Rect, ShowCommand, Size, WindowHandle, WindowStyle, WindowStyleEx,
};
use crate::window_base::{WindowCore, handler};

#[derive(Debug, Clone)]
pub struct WindowModalOptions {
    pub class_name: Option<String>,
    pub class_styles: ClassStyle,
    pub cursor: Cursor,
    pub background: Background,
    pub title: String,
    /// Outer size at 96 DPI. Defaults to 500x400.
    pub size: Size,
    pub styles: WindowStyle,
    pub ex_styles: WindowStyleEx,
}

impl Default for WindowModalOptions {
    fn default() -> Self {
        Self {
            class_name: None,
            class_styles: ClassStyle::DBLCLKS,
            cursor: Cursor::Arrow,
            background: Background::ButtonFace,
            title: String::new(),
            size: Size::new(500, 400),
            styles: WindowStyle::CAPTION
                | WindowStyle::SYSMENU
                | WindowStyle::CLIPCHILDREN
                | WindowStyle::BORDER
                | WindowStyle::VISIBLE,
            ex_styles: WindowStyleEx::empty(),
        }
    }
}

impl WindowModalOptions {
    pub fn class_name(mut self, name: impl Into<String>) -> Self {
        self.class_name = Some(name.into());
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn size(mut self, size: Size) -> Self {
        self.size = size;
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
}

/// The owner side of a modal: disabled while the modal lives, focus remembered.
struct OwnerLink {
    native: Rc<dyn NativeLayer>,
    hwnd: Cell<WindowHandle>,
    disabled: Cell<bool>,
    focus: FocusMemory,
}

impl OwnerLink {
    fn disable(&self, owner: WindowHandle) {
        self.hwnd.set(owner);
        self.focus.remember(self.native.get_focus());
        self.native.enable_window(owner, false);
        self.disabled.set(true);
    }

    /// Re-enables the owner. Only the first call after `disable` does anything.
    fn release(&self) {
        if self.disabled.replace(false) {
            let owner = self.hwnd.get();
            log::debug!("WindowModal: re-enabling owner {owner:?}");
            self.native.enable_window(owner, true);
        }
    }

    fn restore_focus(&self) {
        self.focus.restore(self.native.as_ref(), self.hwnd.get());
    }
}

pub struct WindowModal {
    core: Rc<WindowCore>,
    class: WindowClass,
    title: String,
    size: Size,
    styles: WindowStyle,
    ex_styles: WindowStyleEx,
    owner: Rc<OwnerLink>,
    geometry: Cell<Option<WindowGeometry>>,
}

impl WindowModal {
    pub fn new(native: Rc<dyn NativeLayer>, opts: WindowModalOptions) -> Self {
        let class = WindowClass::new(
            opts.class_name.as_deref(),
            opts.class_styles,
            opts.cursor,
            opts.background,
            None,
        );
        let owner = Rc::new(OwnerLink {
            native: Rc::clone(&native),
            hwnd: Cell::new(WindowHandle::NULL),
            disabled: Cell::new(false),
            focus: FocusMemory::new(),
        });
        Self {
            core: WindowCore::new("WindowModal", native),
            class,
            title: opts.title,
            size: opts.size,
            styles: opts.styles,
            ex_styles: opts.ex_styles,
            owner,
            geometry: Cell::new(None),
        }
    }

    pub fn on(&self) -> Events<'_> {
        Events::new(&self.core)
    }

    pub fn hwnd(&self) -> WindowHandle {
        self.core.hwnd()
    }

    pub fn state(&self) -> WindowState {
        self.core.state()
    }

    pub fn state_history(&self) -> Vec<WindowState> {
        self.core.history()
    }

    pub fn geometry(&self) -> Option<WindowGeometry> {
        self.geometry.get()
    }

    /// The window this modal disabled, once shown.
    pub fn owner(&self) -> Option<WindowHandle> {
        self.owner.hwnd.get().non_null()
    }

    /// Control that had the owner's focus when the modal was shown.
    pub fn owner_focus(&self) -> Option<WindowHandle> {
        self.owner.focus.saved()
    }

    /// Sends `WM_CLOSE`, which by default re-enables the owner and destroys the modal.
    pub fn close(&self) {
        let hwnd = self.hwnd();
        if !hwnd.is_null() {
            self.core
                .native()
                .send_message(&Message::new(hwnd, wm::CLOSE, 0, 0));
        }
    }

    /*
     * Disables `owner`, creates the modal at the origin with its DPI-scaled
     * size, then moves it over the owner. Returns once the modal is visible;
     * the owner's message loop keeps running it. Any failure re-enables the
     * owner before returning.
     */
    pub fn show(&self, owner: WindowHandle) -> PlatformResult<()> {
        self.core.expect_configured()?;
        let native = Rc::clone(self.core.native());
        if !native.is_window(owner) {
            return Err(PlatformError::InvalidHandle(format!(
                "WindowModal owner {owner:?} is not a window"
            )));
        }
        native.register_class(&self.class)?;

        self.owner.disable(owner);
        match self.create_over(native.as_ref(), owner) {
            Ok(hwnd) => {
                native.show_window(hwnd, ShowCommand::Show);
                Ok(())
            }
            Err(e) => {
                log::error!("WindowModal: show failed: {e}");
                let hwnd = self.hwnd();
                if !hwnd.is_null() && native.is_window(hwnd) {
                    if let Err(destroy_err) = native.destroy_window(hwnd) {
                        log::warn!("WindowModal: destroying {hwnd:?} failed: {destroy_err}");
                    }
                }
                self.owner.release();
                self.owner.restore_focus();
                Err(e)
            }
        }
    }

    fn create_over(
        &self,
        native: &dyn NativeLayer,
        owner: WindowHandle,
    ) -> PlatformResult<WindowHandle> {
        let dpi = native.system_dpi();
        let physical = geometry::scale_size(self.size, dpi);

        self.install_defaults();
        let hwnd = self.core.create(&CreateParams {
            kind: self.core.kind(),
            class_name: &self.class.name,
            title: &self.title,
            styles: self.styles,
            ex_styles: self.ex_styles,
            frame: Rect::from_origin_size(Point::new(0, 0), physical),
            parent: Some(owner),
            menu: None,
        })?;

        // WM_CREATE has already run at the origin.
        let rc = native.window_rect(hwnd)?;
        let owner_rc = native.window_rect(owner)?;
        let pos = geometry::modal_position(rc, owner_rc, native.work_area());
        native.set_window_pos(hwnd, pos)?;
        self.geometry.set(Some(WindowGeometry {
            dpi,
            logical_client: self.size,
            physical_client: physical,
            frame: Rect::from_origin_size(pos, rc.size()),
        }));
        self.core.advance(WindowState::Running)?;
        log::debug!("WindowModal: {hwnd:?} shown at {pos:?} over {owner:?}");
        Ok(hwnd)
    }

    fn install_defaults(&self) {
        let owner = Rc::clone(&self.owner);
        let weak = Rc::downgrade(&self.core);
        self.core.register_default(
            EventKey::Message(wm::CLOSE),
            handler(move |msg| {
                // The owner must be enabled before the modal goes away, or
                // activation moves to some other application.
                owner.release();
                if let Some(core) = weak.upgrade() {
                    core.native().destroy_window(msg.hwnd)?;
                }
                Ok(Some(0))
            }),
        );
        self.core.install_focus_defaults();

        let owner = Rc::clone(&self.owner);
        self.core.set_teardown_hook(Box::new(move || {
            owner.release();
            owner.restore_focus();
        }));
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::accelerator::{AccelModifiers, AcceleratorTable, VirtualKey};
    use crate::native::headless::HeadlessNative;
    use crate::types::CommandId;
    use crate::window_main::{WindowMain, WindowMainOptions};

    fn owner_with_control(native: &HeadlessNative) -> (WindowHandle, WindowHandle) {
        let owner = native.spawn_window(None, Rect::new(100, 100, 500, 400));
        let control = native.spawn_window(Some(owner), Rect::new(10, 10, 90, 30));
        native.activate(owner);
        native.set_focus(control);
        (owner, control)
    }

    #[test]
    fn modal_is_centred_over_owner_and_restores_it() {
        // Arrange
        let native = Rc::new(HeadlessNative::new());
        let (owner, control) = owner_with_control(&native);
        let modal = WindowModal::new(
            native.clone(),
            WindowModalOptions::default().size(Size::new(200, 150)),
        );

        // Act
        modal.show(owner).expect("show");

        // Assert: placed and owner disabled
        let hwnd = modal.hwnd();
        let rc = native.window_rect(hwnd).expect("rect");
        assert_eq!(rc.origin(), Point::new(200, 175));
        assert_eq!(rc.size(), Size::new(200, 150));
        assert!(!native.is_window_enabled(owner));
        assert_eq!(native.owner(hwnd), Some(owner));
        assert_eq!(modal.owner_focus(), Some(control));
        assert_eq!(modal.state(), WindowState::Running);

        // Act
        modal.close();

        // Assert: owner back in charge with its focus
        assert!(!native.is_window(hwnd));
        assert!(native.is_window_enabled(owner));
        assert_eq!(native.get_focus(), Some(control));
        assert_eq!(modal.state(), WindowState::Destroyed);
        assert_eq!(modal.hwnd(), WindowHandle::NULL);
    }

    #[test]
    fn modal_is_clamped_into_the_work_area() {
        let native = Rc::new(HeadlessNative::new());
        let owner = native.spawn_window(None, Rect::new(1700, 900, 1900, 1000));
        let modal = WindowModal::new(
            native.clone(),
            WindowModalOptions::default().size(Size::new(300, 200)),
        );

        modal.show(owner).expect("show");

        let rc = native.window_rect(modal.hwnd()).expect("rect");
        assert_eq!(rc.origin(), Point::new(1620, 840));
        modal.close();
    }

    #[test]
    fn scaled_size_follows_dpi() {
        let native = Rc::new(HeadlessNative::new());
        native.set_dpi(144);
        let (owner, _) = owner_with_control(&native);
        let modal = WindowModal::new(
            native.clone(),
            WindowModalOptions::default().size(Size::new(200, 150)),
        );

        modal.show(owner).expect("show");

        let geometry = modal.geometry().expect("geometry");
        assert_eq!(geometry.physical_client, Size::new(300, 225));
        let rc = native.window_rect(modal.hwnd()).expect("rect");
        assert_eq!(rc.size(), Size::new(300, 225));
        modal.close();
    }

    #[test]
    fn focus_is_not_restored_to_a_destroyed_control() {
        let native = Rc::new(HeadlessNative::new());
        let (owner, control) = owner_with_control(&native);
        let modal = WindowModal::new(native.clone(), WindowModalOptions::default());
        modal.show(owner).expect("show");

        native.destroy_window(control).expect("destroy control");
        modal.close();

        assert!(native.is_window_enabled(owner));
        assert_ne!(native.get_focus(), Some(control));
    }

    #[test]
    fn failed_creation_re_enables_owner() {
        let native = Rc::new(HeadlessNative::new());
        let (owner, control) = owner_with_control(&native);
        let modal = WindowModal::new(native.clone(), WindowModalOptions::default());
        modal.on().wm_create(|_| Ok(-1));

        let result = modal.show(owner);

        assert!(result.is_err());
        assert!(native.is_window_enabled(owner));
        assert_eq!(native.get_focus(), Some(control));
        assert_eq!(modal.state(), WindowState::Configured);
    }

    #[test]
    fn user_close_handler_replaces_default() {
        let native = Rc::new(HeadlessNative::new());
        let (owner, _) = owner_with_control(&native);
        let modal = WindowModal::new(native.clone(), WindowModalOptions::default());
        let asked = Rc::new(Cell::new(false));
        let sink = asked.clone();
        modal.on().wm_close(move || {
            sink.set(true);
            Ok(())
        });
        modal.show(owner).expect("show");

        modal.close();

        assert!(asked.get());
        assert!(native.is_window(modal.hwnd()));
        assert!(!native.is_window_enabled(owner));
    }

    #[test]
    fn owner_destruction_tears_the_modal_down() {
        let native = Rc::new(HeadlessNative::new());
        let (owner, _) = owner_with_control(&native);
        let modal = WindowModal::new(native.clone(), WindowModalOptions::default());
        modal.show(owner).expect("show");

        native.destroy_window(owner).expect("destroy owner");

        assert_eq!(modal.state(), WindowState::Destroyed);
        assert_eq!(native.window_count(), 0);
    }

    #[test]
    fn shortcuts_pause_while_modal_runs_in_main_loop() {
        // Arrange: main window with Ctrl+O, a modal opened from a message handler
        let native = Rc::new(HeadlessNative::new());
        let mut accel = AcceleratorTable::new();
        accel.add_char('O', AccelModifiers::CONTROL, CommandId(20000));
        let main = Rc::new(WindowMain::new(
            native.clone(),
            WindowMainOptions::default().accel_table(accel),
        ));
        let modal = Rc::new(WindowModal::new(
            native.clone(),
            WindowModalOptions::default().size(Size::new(200, 150)),
        ));
        let opened = Rc::new(Cell::new(0));
        let trace = Rc::new(RefCell::new(Vec::new()));

        let driver = native.clone();
        main.on().wm_create(move |msg| {
            driver.post_message(&Message::new(msg.hwnd, wm::APP, 0, 0))?;
            Ok(0)
        });
        let sink = opened.clone();
        main.on().wm_command_accel_menu(CommandId(20000), move |_| {
            sink.set(sink.get() + 1);
            Ok(())
        });
        let (driver, shown, log) = (native.clone(), modal.clone(), trace.clone());
        main.on().wm(wm::APP, move |msg| {
            shown.show(msg.hwnd)?;
            log.borrow_mut().push(driver.is_window_enabled(msg.hwnd));
            driver.press_key(VirtualKey(u16::from(b'O')), AccelModifiers::CONTROL);
            driver.post_message(&Message::new(msg.hwnd, wm::APP + 1, 0, 0))?;
            Ok(Some(0))
        });
        let (driver, shown, log) = (native.clone(), modal.clone(), trace.clone());
        main.on().wm(wm::APP + 1, move |msg| {
            shown.close();
            log.borrow_mut().push(driver.is_window_enabled(msg.hwnd));
            driver.press_key(VirtualKey(u16::from(b'O')), AccelModifiers::CONTROL);
            driver.post_quit_message(0);
            Ok(Some(0))
        });

        // Act
        let code = main.run();

        // Assert
        assert_eq!(code.ok(), Some(0));
        assert_eq!(*trace.borrow(), vec![false, true]);
        assert_eq!(opened.get(), 1);
        assert_eq!(modal.state(), WindowState::Destroyed);
    }
}
