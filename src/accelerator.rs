/*
 * Keyboard shortcut table. Entries are collected in order, validated and
 * compiled into a native accelerator resource once, right before the message
 * loop starts, and released once after the loop has exited.
 */
use std::collections::HashMap;
use std::fmt;

use bitflags::bitflags;

use crate::error::{PlatformError, Result as PlatformResult};
use crate::native::NativeLayer;
use crate::types::{AccelHandle, CommandId};

bitflags! {
    /// Modifier keys of an accelerator. Values match the `ACCEL.fVirt` bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct AccelModifiers: u8 {
        const SHIFT = 0x04;
        const CONTROL = 0x08;
        const ALT = 0x10;
    }
}

impl AccelModifiers {
    pub const NONE: AccelModifiers = AccelModifiers::empty();
}

/// Virtual-key code (`VK_*`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VirtualKey(pub u16);

impl VirtualKey {
    pub const BACK: VirtualKey = VirtualKey(0x08);
    pub const TAB: VirtualKey = VirtualKey(0x09);
    pub const RETURN: VirtualKey = VirtualKey(0x0D);
    pub const ESCAPE: VirtualKey = VirtualKey(0x1B);
    pub const SPACE: VirtualKey = VirtualKey(0x20);
    pub const LEFT: VirtualKey = VirtualKey(0x25);
    pub const UP: VirtualKey = VirtualKey(0x26);
    pub const RIGHT: VirtualKey = VirtualKey(0x27);
    pub const DOWN: VirtualKey = VirtualKey(0x28);
    pub const DELETE: VirtualKey = VirtualKey(0x2E);
    pub const F1: VirtualKey = VirtualKey(0x70);
    pub const F2: VirtualKey = VirtualKey(0x71);
    pub const F3: VirtualKey = VirtualKey(0x72);
    pub const F4: VirtualKey = VirtualKey(0x73);
    pub const F5: VirtualKey = VirtualKey(0x74);
    pub const F10: VirtualKey = VirtualKey(0x79);
    pub const F11: VirtualKey = VirtualKey(0x7A);
    pub const F12: VirtualKey = VirtualKey(0x7B);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccelKey {
    Char(char),
    Virtual(VirtualKey),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AcceleratorEntry {
    pub key: AccelKey,
    pub modifiers: AccelModifiers,
    pub command: CommandId,
}

/// What the native layer matches on after normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchKey {
    /// Matched against `WM_KEYDOWN`/`WM_SYSKEYDOWN` plus the modifier state.
    Virtual(u16),
    /// Matched against `WM_CHAR`, no modifiers.
    Char(u16),
}

/// A validated entry, ready to be compiled by the native layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeAccel {
    pub key: MatchKey,
    pub modifiers: AccelModifiers,
    pub command: CommandId,
}

impl AcceleratorEntry {
    /*
     * A character with modifiers can't be delivered as WM_CHAR (Ctrl+O arrives
     * as a control character), so it is matched by its virtual key instead;
     * letters and digits share their uppercase ASCII code with the VK code.
     */
    pub fn normalize(&self) -> PlatformResult<NativeAccel> {
        let key = match self.key {
            AccelKey::Virtual(vk) => MatchKey::Virtual(vk.0),
            AccelKey::Char(ch) if self.modifiers.is_empty() => {
                let code = u16::try_from(ch as u32).map_err(|_| {
                    PlatformError::MalformedAccelerator(format!(
                        "character {ch:?} for command {} is outside the basic multilingual plane",
                        self.command
                    ))
                })?;
                MatchKey::Char(code)
            }
            AccelKey::Char(ch) if ch.is_ascii_alphanumeric() => {
                MatchKey::Virtual(ch.to_ascii_uppercase() as u16)
            }
            AccelKey::Char(ch) => {
                return Err(PlatformError::MalformedAccelerator(format!(
                    "character {ch:?} for command {} cannot be combined with modifiers; use a virtual key",
                    self.command
                )));
            }
        };
        Ok(NativeAccel {
            key,
            modifiers: self.modifiers,
            command: self.command,
        })
    }
}

impl fmt::Display for AcceleratorEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.modifiers.contains(AccelModifiers::CONTROL) {
            f.write_str("Ctrl+")?;
        }
        if self.modifiers.contains(AccelModifiers::ALT) {
            f.write_str("Alt+")?;
        }
        if self.modifiers.contains(AccelModifiers::SHIFT) {
            f.write_str("Shift+")?;
        }
        match self.key {
            AccelKey::Char(ch) => write!(f, "{}", ch.to_ascii_uppercase()),
            AccelKey::Virtual(vk) => match vk.0 {
                0x70..=0x87 => write!(f, "F{}", vk.0 - 0x70 + 1),
                code => write!(f, "VK {code:#04x}"),
            },
        }
    }
}

#[derive(Debug, Default)]
pub struct AcceleratorTable {
    entries: Vec<AcceleratorEntry>,
    compiled: Option<AccelHandle>,
}

impl AcceleratorTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_char(
        &mut self,
        ch: char,
        modifiers: AccelModifiers,
        command: CommandId,
    ) -> &mut Self {
        self.push(AcceleratorEntry {
            key: AccelKey::Char(ch),
            modifiers,
            command,
        })
    }

    pub fn add_key(
        &mut self,
        key: VirtualKey,
        modifiers: AccelModifiers,
        command: CommandId,
    ) -> &mut Self {
        self.push(AcceleratorEntry {
            key: AccelKey::Virtual(key),
            modifiers,
            command,
        })
    }

    pub fn push(&mut self, entry: AcceleratorEntry) -> &mut Self {
        if self.compiled.is_some() {
            log::warn!("AcceleratorTable: {entry} added after the table was compiled; it will not be active");
        }
        self.entries.push(entry);
        self
    }

    pub fn entries(&self) -> &[AcceleratorEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn handle(&self) -> Option<AccelHandle> {
        self.compiled
    }

    /*
     * Normalizes every entry and rejects duplicate shortcuts. Matching is by
     * (key, modifiers), so two entries with the same tuple can never both fire.
     */
    pub fn validate(&self) -> PlatformResult<Vec<NativeAccel>> {
        let mut seen: HashMap<(MatchKey, AccelModifiers), (&AcceleratorEntry, CommandId)> =
            HashMap::with_capacity(self.entries.len());
        let mut compiled = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            let native = entry.normalize()?;
            if let Some((first, first_cmd)) =
                seen.insert((native.key, native.modifiers), (entry, entry.command))
            {
                return Err(PlatformError::DuplicateAccelerator {
                    shortcut: first.to_string(),
                    first: first_cmd.raw(),
                    second: entry.command.raw(),
                });
            }
            compiled.push(native);
        }
        Ok(compiled)
    }

    /// Compiles the table once. An empty table has nothing to consult and yields `None`.
    pub fn build(&mut self, native: &dyn NativeLayer) -> PlatformResult<Option<AccelHandle>> {
        if let Some(handle) = self.compiled {
            return Ok(Some(handle));
        }
        if self.entries.is_empty() {
            log::debug!("AcceleratorTable: no entries, nothing to compile");
            return Ok(None);
        }
        let compiled = self.validate()?;
        let handle = native.create_accelerator_table(&compiled)?;
        log::debug!(
            "AcceleratorTable: compiled {} entries into {handle:?}",
            compiled.len()
        );
        self.compiled = Some(handle);
        Ok(Some(handle))
    }

    /// Releases the compiled resource. Safe to call any number of times.
    pub fn destroy(&mut self, native: &dyn NativeLayer) {
        if let Some(handle) = self.compiled.take() {
            match native.destroy_accelerator_table(handle) {
                Ok(()) => log::debug!("AcceleratorTable: destroyed {handle:?}"),
                Err(e) => log::warn!("AcceleratorTable: destroying {handle:?} failed: {e}"),
            }
        }
    }
}

impl Drop for AcceleratorTable {
    fn drop(&mut self) {
        if let Some(handle) = self.compiled {
            log::warn!("AcceleratorTable dropped while {handle:?} was still compiled");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::headless::HeadlessNative;

    #[test]
    fn char_with_modifier_matches_by_virtual_key() {
        let entry = AcceleratorEntry {
            key: AccelKey::Char('o'),
            modifiers: AccelModifiers::CONTROL,
            command: CommandId(20000),
        };
        let native = entry.normalize().expect("valid entry");
        assert_eq!(native.key, MatchKey::Virtual(u16::from(b'O')));
        assert_eq!(entry.to_string(), "Ctrl+O");
    }

    #[test]
    fn bare_char_matches_wm_char() {
        let entry = AcceleratorEntry {
            key: AccelKey::Char('+'),
            modifiers: AccelModifiers::NONE,
            command: CommandId(1),
        };
        assert_eq!(
            entry.normalize().expect("valid entry").key,
            MatchKey::Char(u16::from(b'+'))
        );
    }

    #[test]
    fn punctuation_with_modifier_is_malformed() {
        let entry = AcceleratorEntry {
            key: AccelKey::Char('+'),
            modifiers: AccelModifiers::CONTROL,
            command: CommandId(1),
        };
        assert!(matches!(
            entry.normalize(),
            Err(PlatformError::MalformedAccelerator(_))
        ));
    }

    #[test]
    fn duplicate_shortcuts_fail_validation() {
        let mut table = AcceleratorTable::new();
        table
            .add_char('O', AccelModifiers::CONTROL, CommandId(20000))
            .add_key(VirtualKey(u16::from(b'O')), AccelModifiers::CONTROL, CommandId(20001));

        match table.validate() {
            Err(PlatformError::DuplicateAccelerator { first, second, .. }) => {
                assert_eq!(first, 20000);
                assert_eq!(second, 20001);
            }
            other => panic!("expected duplicate error, got {other:?}"),
        }
    }

    #[test]
    fn same_key_with_different_modifiers_is_allowed() {
        let mut table = AcceleratorTable::new();
        table
            .add_key(VirtualKey::F5, AccelModifiers::NONE, CommandId(1))
            .add_key(VirtualKey::F5, AccelModifiers::SHIFT, CommandId(2));
        assert_eq!(table.validate().expect("distinct tuples").len(), 2);
    }

    #[test]
    fn build_is_lazy_once_and_destroy_is_idempotent() {
        let native = HeadlessNative::new();
        let mut table = AcceleratorTable::new();
        table.add_key(VirtualKey::F1, AccelModifiers::NONE, CommandId(20001));

        let first = table.build(&native).expect("build").expect("handle");
        let second = table.build(&native).expect("build").expect("handle");
        assert_eq!(first, second);
        assert_eq!(native.live_accelerator_tables(), 1);

        table.destroy(&native);
        table.destroy(&native);
        assert_eq!(table.handle(), None);
        assert_eq!(native.live_accelerator_tables(), 0);
        assert_eq!(native.destroyed_accelerator_tables(), 1);
    }

    #[test]
    fn empty_table_compiles_to_nothing() {
        let native = HeadlessNative::new();
        let mut table = AcceleratorTable::new();
        assert_eq!(table.build(&native).expect("build"), None);
        assert_eq!(native.live_accelerator_tables(), 0);
    }

    #[test]
    fn failed_build_leaves_no_compiled_table() {
        let native = HeadlessNative::new();
        let mut table = AcceleratorTable::new();
        table
            .add_key(VirtualKey::F1, AccelModifiers::NONE, CommandId(1))
            .add_key(VirtualKey::F1, AccelModifiers::NONE, CommandId(2));

        assert!(table.build(&native).is_err());
        assert_eq!(table.handle(), None);
        assert_eq!(native.live_accelerator_tables(), 0);
    }

    #[test]
    fn function_keys_display_by_name() {
        let entry = AcceleratorEntry {
            key: AccelKey::Virtual(VirtualKey::F1),
            modifiers: AccelModifiers::SHIFT,
            command: CommandId(1),
        };
        assert_eq!(entry.to_string(), "Shift+F1");
    }
}
