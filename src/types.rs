/*
 * Platform-agnostic value types shared by the core and every `NativeLayer`
 * implementation: opaque handles, application ids, plain geometry records and
 * the style flag sets passed to class registration and window creation.
 * Nothing here touches the OS, so the types compile and test on any target.
 */
use std::fmt;

use bitflags::bitflags;

/// Opaque identifier of a native window. `NULL` means "no window".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct WindowHandle(pub usize);

impl WindowHandle {
    pub const NULL: WindowHandle = WindowHandle(0);

    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    /// `None` for the null handle, which is how the native layer reports "nothing".
    pub fn non_null(self) -> Option<WindowHandle> {
        (!self.is_null()).then_some(self)
    }
}

/// Compiled accelerator resource owned by an `AcceleratorTable`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AccelHandle(pub usize);

/// Native menu materialized from a `Menu` model; destroyed with its window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MenuHandle(pub usize);

/// Application-defined command identifier (menu click, shortcut, control notification).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommandId(pub u16);

impl CommandId {
    /// Sent by the dialog manager for Esc; the playback sample closes on it.
    pub const CANCEL: CommandId = CommandId(2);

    pub fn raw(self) -> u16 {
        self.0
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a child control within its parent window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ControlId(pub u16);

impl ControlId {
    pub fn raw(self) -> u16 {
        self.0
    }

    /// Controls post `WM_COMMAND` with their id in the low word.
    pub fn as_command(self) -> CommandId {
        CommandId(self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Size {
    pub cx: i32,
    pub cy: i32,
}

impl Size {
    pub const fn new(cx: i32, cy: i32) -> Self {
        Self { cx, cy }
    }
}

/// Screen or client rectangle; `right`/`bottom` are exclusive, as in Win32.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Rect {
    pub const fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn from_origin_size(origin: Point, size: Size) -> Self {
        Self::new(origin.x, origin.y, origin.x + size.cx, origin.y + size.cy)
    }

    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }

    pub fn origin(&self) -> Point {
        Point::new(self.left, self.top)
    }

    pub fn size(&self) -> Size {
        Size::new(self.width(), self.height())
    }

    pub fn offset(&self, dx: i32, dy: i32) -> Rect {
        Rect::new(
            self.left + dx,
            self.top + dy,
            self.right + dx,
            self.bottom + dy,
        )
    }
}

bitflags! {
    /// Window styles (`WS_*`), passed to window creation.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct WindowStyle: u32 {
        const OVERLAPPED = 0x0000_0000;
        const POPUP = 0x8000_0000;
        const CHILD = 0x4000_0000;
        const MINIMIZE = 0x2000_0000;
        const VISIBLE = 0x1000_0000;
        const DISABLED = 0x0800_0000;
        const CLIPSIBLINGS = 0x0400_0000;
        const CLIPCHILDREN = 0x0200_0000;
        const MAXIMIZE = 0x0100_0000;
        const CAPTION = 0x00C0_0000;
        const BORDER = 0x0080_0000;
        const DLGFRAME = 0x0040_0000;
        const VSCROLL = 0x0020_0000;
        const HSCROLL = 0x0010_0000;
        const SYSMENU = 0x0008_0000;
        const SIZEBOX = 0x0004_0000;
        const MINIMIZEBOX = 0x0002_0000;
        const MAXIMIZEBOX = 0x0001_0000;
        const TABSTOP = 0x0001_0000;
        const GROUP = 0x0002_0000;
        const OVERLAPPEDWINDOW = 0x00CF_0000;
    }
}

bitflags! {
    /// Extended window styles (`WS_EX_*`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct WindowStyleEx: u32 {
        const DLGMODALFRAME = 0x0000_0001;
        const NOPARENTNOTIFY = 0x0000_0004;
        const TOPMOST = 0x0000_0008;
        const ACCEPTFILES = 0x0000_0010;
        const TOOLWINDOW = 0x0000_0080;
        const WINDOWEDGE = 0x0000_0100;
        const CLIENTEDGE = 0x0000_0200;
        const CONTROLPARENT = 0x0001_0000;
        const APPWINDOW = 0x0004_0000;
    }
}

bitflags! {
    /// Window class styles (`CS_*`), passed to class registration.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ClassStyle: u32 {
        const VREDRAW = 0x0001;
        const HREDRAW = 0x0002;
        const DBLCLKS = 0x0008;
        const OWNDC = 0x0020;
        const CLASSDC = 0x0040;
        const PARENTDC = 0x0080;
        const NOCLOSE = 0x0200;
        const SAVEBITS = 0x0800;
    }
}

/// Initial exhibition state passed to `ShowWindow`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ShowCommand {
    Hide,
    Normal,
    #[default]
    Show,
    Minimized,
    Maximized,
    NoActivate,
}

impl ShowCommand {
    /// The `SW_*` value of this command.
    pub fn raw(self) -> i32 {
        match self {
            Self::Hide => 0,
            Self::Normal => 1,
            Self::Minimized => 2,
            Self::Maximized => 3,
            Self::NoActivate => 4,
            Self::Show => 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rect_dimensions_and_offset() {
        let rc = Rect::new(100, 100, 500, 400);
        assert_eq!(rc.width(), 400);
        assert_eq!(rc.height(), 300);
        assert_eq!(rc.offset(-100, 5), Rect::new(0, 105, 400, 405));
        assert_eq!(
            Rect::from_origin_size(Point::new(3, 4), Size::new(10, 20)),
            Rect::new(3, 4, 13, 24)
        );
    }

    #[test]
    fn null_handle_has_no_value() {
        assert!(WindowHandle::NULL.is_null());
        assert_eq!(WindowHandle::NULL.non_null(), None);
        assert_eq!(WindowHandle(7).non_null(), Some(WindowHandle(7)));
    }

    #[test]
    fn show_command_maps_to_sw_values() {
        assert_eq!(ShowCommand::Hide.raw(), 0);
        assert_eq!(ShowCommand::Show.raw(), 5);
        assert_eq!(ShowCommand::default(), ShowCommand::Show);
    }
}
