/*
 * The blocking message pump of the main window. `get_message` is the only
 * place the thread waits. Every retrieved message is offered to the
 * accelerator table first (only while the main window exists and is enabled,
 * so shortcuts stay silent behind a modal), then to the dialog manager of its
 * top-level window (Tab, Esc), and otherwise translated and dispatched. A
 * fault parked by a handler during the dispatch ends the loop
 * with that error; the caller owns the recovery (dialog, teardown).
 */
use crate::error::Result as PlatformResult;
use crate::message::Retrieved;
use crate::native::NativeLayer;
use crate::types::{AccelHandle, WindowHandle};
use crate::window_base::take_fault;

/// Pumps until `WM_QUIT` and returns its exit code.
pub(crate) fn run(
    native: &dyn NativeLayer,
    main: impl Fn() -> WindowHandle,
    accel: Option<AccelHandle>,
) -> PlatformResult<i32> {
    log::debug!("Message loop: entering, accelerators {accel:?}");
    loop {
        let msg = match native.get_message()? {
            Retrieved::Quit(code) => {
                log::debug!("Message loop: WM_QUIT with exit code {code}");
                return Ok(code);
            }
            Retrieved::Message(msg) => msg,
        };

        let hwnd = main();
        let translated = match accel {
            Some(table) if !hwnd.is_null() && native.is_window_enabled(hwnd) => {
                native.translate_accelerator(hwnd, table, &msg)
            }
            _ => false,
        };
        if !translated && !native.is_dialog_message(&msg) {
            native.translate_message(&msg);
            native.dispatch_message(&msg);
        }

        if let Some(fault) = take_fault() {
            log::error!("Message loop: aborting on handler fault: {fault}");
            return Err(fault);
        }
    }
}
