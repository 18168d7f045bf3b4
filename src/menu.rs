/*
 * Menu bar model. The window's menu is edited as plain data before creation
 * and materialized by the native layer when the window is created; the native
 * menu is destroyed together with its window. Afterwards `MainMenu` keeps the
 * model and the live menu in step.
 */
use std::cell::{Ref, RefCell, RefMut};

use crate::error::{PlatformError, Result as PlatformResult};
use crate::native::NativeLayer;
use crate::types::{CommandId, MenuHandle, WindowHandle};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MenuItem {
    Entry {
        command: CommandId,
        text: String,
        enabled: bool,
    },
    Separator,
    Submenu {
        text: String,
        menu: Menu,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Menu {
    items: Vec<MenuItem>,
}

impl Menu {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_item(&mut self, command: CommandId, text: impl Into<String>) -> &mut Self {
        self.items.push(MenuItem::Entry {
            command,
            text: text.into(),
            enabled: true,
        });
        self
    }

    pub fn add_separator(&mut self) -> &mut Self {
        self.items.push(MenuItem::Separator);
        self
    }

    pub fn add_submenu(&mut self, text: impl Into<String>, menu: Menu) -> &mut Self {
        self.items.push(MenuItem::Submenu {
            text: text.into(),
            menu,
        });
        self
    }

    pub fn items(&self) -> &[MenuItem] {
        &self.items
    }

    /// Top-level items; a non-empty menu bar changes the non-client height.
    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Enables or disables the entry for `command`, searching submenus.
    /// Returns whether it was found.
    pub fn set_enabled(&mut self, command: CommandId, enable: bool) -> bool {
        for item in &mut self.items {
            match item {
                MenuItem::Entry {
                    command: cmd,
                    enabled,
                    ..
                } if *cmd == command => {
                    *enabled = enable;
                    return true;
                }
                MenuItem::Submenu { menu, .. } => {
                    if menu.set_enabled(command, enable) {
                        return true;
                    }
                }
                _ => {}
            }
        }
        false
    }

    pub fn find(&self, command: CommandId) -> Option<&MenuItem> {
        self.items.iter().find_map(|item| match item {
            MenuItem::Entry { command: cmd, .. } if *cmd == command => Some(item),
            MenuItem::Submenu { menu, .. } => menu.find(command),
            _ => None,
        })
    }
}

/// The menu bar of a `WindowMain`, as returned by `WindowMain::main_menu`.
pub struct MainMenu<'a> {
    model: &'a RefCell<Menu>,
    native: &'a dyn NativeLayer,
    hwnd: WindowHandle,
    live: Option<MenuHandle>,
}

impl<'a> MainMenu<'a> {
    pub(crate) fn new(
        model: &'a RefCell<Menu>,
        native: &'a dyn NativeLayer,
        hwnd: WindowHandle,
        live: Option<MenuHandle>,
    ) -> Self {
        Self {
            model,
            native,
            hwnd,
            live,
        }
    }

    pub fn model(&self) -> Ref<'a, Menu> {
        self.model.borrow()
    }

    /// Structural edits. Only possible while the window does not exist yet.
    pub fn edit(&self) -> PlatformResult<RefMut<'a, Menu>> {
        if !self.hwnd.is_null() {
            return Err(PlatformError::OperationFailed(
                "the menu bar can only be restructured before the window is created".to_string(),
            ));
        }
        Ok(self.model.borrow_mut())
    }

    pub fn is_enabled(&self, command: CommandId) -> Option<bool> {
        match self.model.borrow().find(command) {
            Some(MenuItem::Entry { enabled, .. }) => Some(*enabled),
            _ => None,
        }
    }

    /// Enables or greys out the entry for `command`, on the live menu too
    /// once the window exists. Returns whether the entry was found.
    pub fn set_enabled(&self, command: CommandId, enable: bool) -> PlatformResult<bool> {
        let found = self.model.borrow_mut().set_enabled(command, enable);
        match (self.hwnd.non_null(), self.live) {
            (Some(hwnd), Some(menu)) => self.native.enable_menu_item(hwnd, menu, command, enable),
            _ => Ok(found),
        }
    }
}
