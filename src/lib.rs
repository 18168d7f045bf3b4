/*
 * Entry point of the windshell crate: the window lifecycle and message
 * dispatch core of a Win32 desktop application. A `WindowMain` owns the
 * message loop, `WindowModal` popups run inside it, and every message is
 * routed through a per-window `EventRegistry` whose user handlers replace the
 * built-in defaults (quit on destruction, focus memory, modal close).
 *
 * The OS sits behind the `NativeLayer` trait. `Win32Native` is compiled on
 * Windows only; `HeadlessNative` is an in-memory window manager available
 * everywhere, so lifecycle, accelerator and focus behaviour is testable on any
 * host.
 */
pub mod accelerator;
pub mod error;
pub mod event_registry;
pub mod events;
pub mod focus;
pub mod geometry;
pub mod id_allocator;
pub mod lifecycle;
pub mod menu;
pub mod message;
mod message_loop;
pub mod native;
pub mod types;
mod window_base;
pub mod window_main;
pub mod window_modal;

pub use accelerator::{AccelKey, AccelModifiers, AcceleratorEntry, AcceleratorTable, VirtualKey};
pub use error::{PlatformError, Result as PlatformResult};
pub use event_registry::{EventKey, EventRegistry, HandlerOrigin};
pub use events::Events;
pub use geometry::WindowGeometry;
pub use id_allocator::{ControlIdGuard, IdAllocator};
pub use lifecycle::WindowState;
pub use menu::{MainMenu, Menu, MenuItem};
pub use message::{Message, NotifyHeader, WmActivate, WmCommand, WmSize, wm};
pub use native::headless::HeadlessNative;
#[cfg(target_os = "windows")]
pub use native::win32::Win32Native;
pub use native::{Background, Cursor, NativeLayer};
pub use types::{
    ClassStyle, CommandId, ControlId, Point, Rect, ShowCommand, Size, WindowHandle, WindowStyle,
    WindowStyleEx,
};
pub use window_main::{WindowMain, WindowMainOptions};
pub use window_modal::{WindowModal, WindowModalOptions};
