//! Key codes, mouse buttons and media keys.
//!
//! Keyboard codes use the single-byte space common to Arduino HID
//! libraries, which is also what clients send as numeric `code` values:
//!
//! | Range       | Meaning                                   |
//! |-------------|-------------------------------------------|
//! | `0x00-0x7F` | ASCII character, mapped to a usage + shift |
//! | `0x80-0x87` | Modifier bit `code - 0x80`                 |
//! | `0x88-0xFF` | Raw HID usage `code - 0x88`                |

pub const KEY_LEFT_CTRL: u8 = 0x80;
pub const KEY_LEFT_SHIFT: u8 = 0x81;
pub const KEY_LEFT_ALT: u8 = 0x82;
pub const KEY_LEFT_GUI: u8 = 0x83;
pub const KEY_RIGHT_CTRL: u8 = 0x84;
pub const KEY_RIGHT_SHIFT: u8 = 0x85;
pub const KEY_RIGHT_ALT: u8 = 0x86;
pub const KEY_RIGHT_GUI: u8 = 0x87;

pub const KEY_UP_ARROW: u8 = 0xDA;
pub const KEY_DOWN_ARROW: u8 = 0xD9;
pub const KEY_LEFT_ARROW: u8 = 0xD8;
pub const KEY_RIGHT_ARROW: u8 = 0xD7;
pub const KEY_BACKSPACE: u8 = 0xB2;
pub const KEY_TAB: u8 = 0xB3;
pub const KEY_RETURN: u8 = 0xB0;
pub const KEY_ESC: u8 = 0xB1;
pub const KEY_INSERT: u8 = 0xD1;
pub const KEY_DELETE: u8 = 0xD4;
pub const KEY_PAGE_UP: u8 = 0xD3;
pub const KEY_PAGE_DOWN: u8 = 0xD6;
pub const KEY_HOME: u8 = 0xD2;
pub const KEY_END: u8 = 0xD5;
pub const KEY_CAPS_LOCK: u8 = 0xC1;
pub const KEY_F1: u8 = 0xC2;
pub const KEY_F13: u8 = 0xF0;

/// First code of the raw-usage range.
const USAGE_OFFSET: u8 = 0x88;
const MODIFIER_BASE: u8 = 0x80;

/// Code for function key `F<n>`, `n` in 1..=24.
pub fn function_key(n: u8) -> Option<u8> {
    match n {
        1..=12 => Some(KEY_F1 + (n - 1)),
        13..=24 => Some(KEY_F13 + (n - 13)),
        _ => None,
    }
}

/// What a key code does to a keyboard report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    /// Set or clear a modifier bit.
    Modifier(u8),
    /// Add or remove a usage in the key array, optionally with shift.
    Usage { usage: u8, shift: bool },
}

/// Resolve a key code. `None` for ASCII characters with no key.
pub fn decode(code: u8) -> Option<KeyAction> {
    if code >= USAGE_OFFSET {
        return Some(KeyAction::Usage {
            usage: code - USAGE_OFFSET,
            shift: false,
        });
    }
    if code >= MODIFIER_BASE {
        return Some(KeyAction::Modifier(1 << (code - MODIFIER_BASE)));
    }
    ascii_usage(code).map(|(usage, shift)| KeyAction::Usage { usage, shift })
}

/// US layout usage for an ASCII character.
fn ascii_usage(c: u8) -> Option<(u8, bool)> {
    let plain = |u: u8| Some((u, false));
    let shifted = |u: u8| Some((u, true));
    match c {
        b'a'..=b'z' => plain(0x04 + (c - b'a')),
        b'A'..=b'Z' => shifted(0x04 + (c - b'A')),
        b'1'..=b'9' => plain(0x1E + (c - b'1')),
        b'0' => plain(0x27),
        0x08 => plain(0x2A),
        b'\t' => plain(0x2B),
        b'\n' => plain(0x28),
        b' ' => plain(0x2C),
        b'!' => shifted(0x1E),
        b'@' => shifted(0x1F),
        b'#' => shifted(0x20),
        b'$' => shifted(0x21),
        b'%' => shifted(0x22),
        b'^' => shifted(0x23),
        b'&' => shifted(0x24),
        b'*' => shifted(0x25),
        b'(' => shifted(0x26),
        b')' => shifted(0x27),
        b'-' => plain(0x2D),
        b'_' => shifted(0x2D),
        b'=' => plain(0x2E),
        b'+' => shifted(0x2E),
        b'[' => plain(0x2F),
        b'{' => shifted(0x2F),
        b']' => plain(0x30),
        b'}' => shifted(0x30),
        b'\\' => plain(0x31),
        b'|' => shifted(0x31),
        b';' => plain(0x33),
        b':' => shifted(0x33),
        b'\'' => plain(0x34),
        b'"' => shifted(0x34),
        b'`' => plain(0x35),
        b'~' => shifted(0x35),
        b',' => plain(0x36),
        b'<' => shifted(0x36),
        b'.' => plain(0x37),
        b'>' => shifted(0x37),
        b'/' => plain(0x38),
        b'?' => shifted(0x38),
        _ => None,
    }
}

pub mod mouse {
    pub const LEFT: u8 = 0x01;
    pub const RIGHT: u8 = 0x02;
    pub const MIDDLE: u8 = 0x04;
    pub const BACK: u8 = 0x08;
    pub const FORWARD: u8 = 0x10;
    pub const ALL: u8 = LEFT | RIGHT | MIDDLE | BACK | FORWARD;
}

/// Consumer-control bits of the 16-bit media report.
pub mod media {
    pub const NEXT_TRACK: u16 = 1 << 0;
    pub const PREVIOUS_TRACK: u16 = 1 << 1;
    pub const STOP: u16 = 1 << 2;
    pub const PLAY_PAUSE: u16 = 1 << 3;
    pub const MUTE: u16 = 1 << 4;
    pub const VOLUME_UP: u16 = 1 << 5;
    pub const VOLUME_DOWN: u16 = 1 << 6;
    pub const WWW_HOME: u16 = 1 << 7;
    pub const LOCAL_MACHINE_BROWSER: u16 = 1 << 8;
    pub const CALCULATOR: u16 = 1 << 9;
    pub const WWW_BOOKMARKS: u16 = 1 << 10;
    pub const WWW_SEARCH: u16 = 1 << 11;
    pub const WWW_STOP: u16 = 1 << 12;
    pub const WWW_BACK: u16 = 1 << 13;
    pub const CONSUMER_CONTROL_CONFIGURATION: u16 = 1 << 14;
    pub const EMAIL_READER: u16 = 1 << 15;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii_letters_and_shift() {
        assert_eq!(
            decode(b'a'),
            Some(KeyAction::Usage {
                usage: 0x04,
                shift: false
            })
        );
        assert_eq!(
            decode(b'Z'),
            Some(KeyAction::Usage {
                usage: 0x1D,
                shift: true
            })
        );
        assert_eq!(
            decode(b'?'),
            Some(KeyAction::Usage {
                usage: 0x38,
                shift: true
            })
        );
    }

    #[test]
    fn test_modifier_and_usage_ranges() {
        assert_eq!(decode(KEY_LEFT_SHIFT), Some(KeyAction::Modifier(0x02)));
        assert_eq!(decode(KEY_RIGHT_GUI), Some(KeyAction::Modifier(0x80)));
        // Return is usage 0x28
        assert_eq!(
            decode(KEY_RETURN),
            Some(KeyAction::Usage {
                usage: 0x28,
                shift: false
            })
        );
    }

    #[test]
    fn test_unmapped_control_characters() {
        assert_eq!(decode(0x00), None);
        assert_eq!(decode(b'\r'), None);
        assert_eq!(decode(0x7F), None);
    }

    #[test]
    fn test_function_keys() {
        assert_eq!(function_key(1), Some(KEY_F1));
        assert_eq!(function_key(12), Some(0xCD));
        assert_eq!(function_key(13), Some(KEY_F13));
        assert_eq!(function_key(24), Some(0xFB));
        assert_eq!(function_key(0), None);
        assert_eq!(function_key(25), None);
    }
}
