/*
 * Central error type for the window core. Native calls, configuration problems
 * and event handler failures all surface as `PlatformError`; nothing in the
 * library panics to signal a failed Win32 call.
 */
use crate::lifecycle::WindowState;

#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("Initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Invalid handle: {0}")]
    InvalidHandle(String),

    #[error("Operation failed: {0}")]
    OperationFailed(String),

    /// A Win32 call reported failure. `code` is the `GetLastError()` value or HRESULT bits.
    #[error("{function} failed (error {code:#010x})")]
    Native { function: &'static str, code: u32 },

    #[error("Duplicate accelerator {shortcut} bound to commands {first} and {second}")]
    DuplicateAccelerator {
        shortcut: String,
        first: u16,
        second: u16,
    },

    #[error("Malformed accelerator: {0}")]
    MalformedAccelerator(String),

    #[error("Invalid window state transition from {from:?} to {to:?}")]
    InvalidTransition { from: WindowState, to: WindowState },

    #[error("Event handler failed: {0}")]
    HandlerFailed(String),

    #[error("Event handler panicked: {0}")]
    HandlerPanicked(String),

    #[error("Control id space exhausted after id {0}")]
    IdSpaceExhausted(u16),
}

impl PlatformError {
    /// Convenience for handler code that wants to abort the loop with a message.
    pub fn handler(reason: impl Into<String>) -> Self {
        Self::HandlerFailed(reason.into())
    }
}

// Lets `?` work directly on `windows::core::Result<T>` inside the Win32 layer.
#[cfg(target_os = "windows")]
impl From<windows::core::Error> for PlatformError {
    fn from(e: windows::core::Error) -> Self {
        Self::Native {
            function: "windows",
            code: e.code().0 as u32,
        }
    }
}

pub type Result<T> = std::result::Result<T, PlatformError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn native_error_formats_hex_code() {
        let err = PlatformError::Native {
            function: "CreateWindowExW",
            code: 0x578,
        };
        assert_eq!(err.to_string(), "CreateWindowExW failed (error 0x00000578)");
    }

    #[test]
    fn duplicate_accelerator_names_both_commands() {
        let err = PlatformError::DuplicateAccelerator {
            shortcut: "Ctrl+O".to_string(),
            first: 20000,
            second: 20001,
        };
        let text = err.to_string();
        assert!(text.contains("Ctrl+O"));
        assert!(text.contains("20000"));
        assert!(text.contains("20001"));
    }
}
