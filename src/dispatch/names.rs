//! Name tables for keys, mouse buttons and media keys.
//!
//! Lookups take upper-case tokens.

use crate::ble::keys::{self, media, mouse};

const KEY_NAMES: &[(&str, u8)] = &[
    ("KEY_RETURN", keys::KEY_RETURN),
    ("RETURN", keys::KEY_RETURN),
    ("ENTER", keys::KEY_RETURN),
    ("KEY_ESC", keys::KEY_ESC),
    ("ESC", keys::KEY_ESC),
    ("ESCAPE", keys::KEY_ESC),
    ("KEY_BACKSPACE", keys::KEY_BACKSPACE),
    ("BACKSPACE", keys::KEY_BACKSPACE),
    ("KEY_TAB", keys::KEY_TAB),
    ("TAB", keys::KEY_TAB),
    ("KEY_DELETE", keys::KEY_DELETE),
    ("DELETE", keys::KEY_DELETE),
    ("DEL", keys::KEY_DELETE),
    ("KEY_INSERT", keys::KEY_INSERT),
    ("INSERT", keys::KEY_INSERT),
    ("INS", keys::KEY_INSERT),
    ("KEY_PAGE_UP", keys::KEY_PAGE_UP),
    ("PAGE_UP", keys::KEY_PAGE_UP),
    ("PGUP", keys::KEY_PAGE_UP),
    ("KEY_PAGE_DOWN", keys::KEY_PAGE_DOWN),
    ("PAGE_DOWN", keys::KEY_PAGE_DOWN),
    ("PGDN", keys::KEY_PAGE_DOWN),
    ("KEY_HOME", keys::KEY_HOME),
    ("HOME", keys::KEY_HOME),
    ("KEY_END", keys::KEY_END),
    ("END", keys::KEY_END),
    ("KEY_RIGHT_ARROW", keys::KEY_RIGHT_ARROW),
    ("RIGHT", keys::KEY_RIGHT_ARROW),
    ("KEY_LEFT_ARROW", keys::KEY_LEFT_ARROW),
    ("LEFT", keys::KEY_LEFT_ARROW),
    ("KEY_UP_ARROW", keys::KEY_UP_ARROW),
    ("UP", keys::KEY_UP_ARROW),
    ("KEY_DOWN_ARROW", keys::KEY_DOWN_ARROW),
    ("DOWN", keys::KEY_DOWN_ARROW),
    ("KEY_CAPS_LOCK", keys::KEY_CAPS_LOCK),
    ("CAPS_LOCK", keys::KEY_CAPS_LOCK),
    ("CAPSLOCK", keys::KEY_CAPS_LOCK),
    ("KEY_LEFT_CTRL", keys::KEY_LEFT_CTRL),
    ("LEFT_CTRL", keys::KEY_LEFT_CTRL),
    ("CTRL", keys::KEY_LEFT_CTRL),
    ("CONTROL", keys::KEY_LEFT_CTRL),
    ("KEY_RIGHT_CTRL", keys::KEY_RIGHT_CTRL),
    ("RIGHT_CTRL", keys::KEY_RIGHT_CTRL),
    ("KEY_LEFT_SHIFT", keys::KEY_LEFT_SHIFT),
    ("LEFT_SHIFT", keys::KEY_LEFT_SHIFT),
    ("SHIFT", keys::KEY_LEFT_SHIFT),
    ("KEY_RIGHT_SHIFT", keys::KEY_RIGHT_SHIFT),
    ("RIGHT_SHIFT", keys::KEY_RIGHT_SHIFT),
    ("KEY_LEFT_ALT", keys::KEY_LEFT_ALT),
    ("LEFT_ALT", keys::KEY_LEFT_ALT),
    ("ALT", keys::KEY_LEFT_ALT),
    ("KEY_RIGHT_ALT", keys::KEY_RIGHT_ALT),
    ("RIGHT_ALT", keys::KEY_RIGHT_ALT),
    ("ALTGR", keys::KEY_RIGHT_ALT),
    ("KEY_LEFT_GUI", keys::KEY_LEFT_GUI),
    ("LEFT_GUI", keys::KEY_LEFT_GUI),
    ("LGUI", keys::KEY_LEFT_GUI),
    ("GUI", keys::KEY_LEFT_GUI),
    ("WIN", keys::KEY_LEFT_GUI),
    ("WINDOWS", keys::KEY_LEFT_GUI),
    ("COMMAND", keys::KEY_LEFT_GUI),
    ("KEY_RIGHT_GUI", keys::KEY_RIGHT_GUI),
    ("RIGHT_GUI", keys::KEY_RIGHT_GUI),
    ("RGUI", keys::KEY_RIGHT_GUI),
    ("SPACE", b' '),
    ("SPACEBAR", b' '),
];

const BUTTON_NAMES: &[(&str, u8)] = &[
    ("LEFT", mouse::LEFT),
    ("MOUSE_LEFT", mouse::LEFT),
    ("BUTTON1", mouse::LEFT),
    ("RIGHT", mouse::RIGHT),
    ("MOUSE_RIGHT", mouse::RIGHT),
    ("BUTTON2", mouse::RIGHT),
    ("MIDDLE", mouse::MIDDLE),
    ("SCROLL", mouse::MIDDLE),
    ("WHEEL", mouse::MIDDLE),
    ("BUTTON3", mouse::MIDDLE),
    ("BACK", mouse::BACK),
    ("BUTTON4", mouse::BACK),
    ("FORWARD", mouse::FORWARD),
    ("BUTTON5", mouse::FORWARD),
];

const MEDIA_NAMES: &[(&str, u16)] = &[
    ("KEY_MEDIA_PLAY_PAUSE", media::PLAY_PAUSE),
    ("MEDIA_PLAY_PAUSE", media::PLAY_PAUSE),
    ("PLAY_PAUSE", media::PLAY_PAUSE),
    ("KEY_MEDIA_STOP", media::STOP),
    ("MEDIA_STOP", media::STOP),
    ("KEY_MEDIA_NEXT_TRACK", media::NEXT_TRACK),
    ("MEDIA_NEXT", media::NEXT_TRACK),
    ("NEXT_TRACK", media::NEXT_TRACK),
    ("KEY_MEDIA_PREVIOUS_TRACK", media::PREVIOUS_TRACK),
    ("MEDIA_PREVIOUS", media::PREVIOUS_TRACK),
    ("MEDIA_PREV", media::PREVIOUS_TRACK),
    ("PREVIOUS_TRACK", media::PREVIOUS_TRACK),
    ("KEY_MEDIA_VOLUME_UP", media::VOLUME_UP),
    ("VOLUME_UP", media::VOLUME_UP),
    ("KEY_MEDIA_VOLUME_DOWN", media::VOLUME_DOWN),
    ("VOLUME_DOWN", media::VOLUME_DOWN),
    ("KEY_MEDIA_MUTE", media::MUTE),
    ("MUTE", media::MUTE),
    ("KEY_MEDIA_WWW_HOME", media::WWW_HOME),
    ("WWW_HOME", media::WWW_HOME),
    ("KEY_MEDIA_EMAIL_READER", media::EMAIL_READER),
    ("EMAIL", media::EMAIL_READER),
    ("KEY_MEDIA_CALCULATOR", media::CALCULATOR),
    ("CALCULATOR", media::CALCULATOR),
    ("KEY_MEDIA_WWW_SEARCH", media::WWW_SEARCH),
    ("WWW_SEARCH", media::WWW_SEARCH),
    ("KEY_MEDIA_WWW_STOP", media::WWW_STOP),
    ("WWW_STOP", media::WWW_STOP),
    ("KEY_MEDIA_WWW_BACK", media::WWW_BACK),
    ("WWW_BACK", media::WWW_BACK),
    ("KEY_MEDIA_WWW_BOOKMARKS", media::WWW_BOOKMARKS),
    ("WWW_BOOKMARKS", media::WWW_BOOKMARKS),
];

fn find<T: Copy>(table: &[(&str, T)], token: &str) -> Option<T> {
    table.iter().find(|(name, _)| *name == token).map(|(_, v)| *v)
}

/// Resolve a key token: single character, `0x` hex code, name, or `F1`-`F24`.
pub fn key_code(token: &str) -> Option<u8> {
    let token = token.trim();
    if token.is_empty() {
        return None;
    }
    if token.len() == 1 {
        return Some(token.as_bytes()[0]);
    }
    if let Some(hex) = token
        .strip_prefix("0x")
        .or_else(|| token.strip_prefix("0X"))
    {
        if let Ok(code) = u8::from_str_radix(hex, 16) {
            return Some(code);
        }
    }

    let upper = token.to_ascii_uppercase();
    if let Some(code) = find(KEY_NAMES, &upper) {
        return Some(code);
    }
    let short = upper.strip_prefix("KEY_");
    if let Some(code) = short.and_then(|s| find(KEY_NAMES, s)) {
        return Some(code);
    }
    short
        .unwrap_or(&upper)
        .strip_prefix('F')
        .and_then(|n| n.parse::<u8>().ok())
        .and_then(keys::function_key)
}

pub fn button_mask(token: &str) -> Option<u8> {
    find(BUTTON_NAMES, &token.trim().to_ascii_uppercase())
}

pub fn media_key(token: &str) -> Option<u16> {
    find(MEDIA_NAMES, &token.trim().to_ascii_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_tokens() {
        assert_eq!(key_code("a"), Some(b'a'));
        assert_eq!(key_code(" A "), Some(b'A'));
        assert_eq!(key_code("enter"), Some(keys::KEY_RETURN));
        assert_eq!(key_code("KEY_ESC"), Some(keys::KEY_ESC));
        assert_eq!(key_code("key_pgup"), Some(keys::KEY_PAGE_UP));
        assert_eq!(key_code("0xB0"), Some(keys::KEY_RETURN));
        assert_eq!(key_code("space"), Some(b' '));
    }

    #[test]
    fn test_function_key_tokens() {
        assert_eq!(key_code("F5"), keys::function_key(5));
        assert_eq!(key_code("KEY_F24"), keys::function_key(24));
        assert_eq!(key_code("F25"), None);
        assert_eq!(key_code("FOO"), None);
    }

    #[test]
    fn test_unknown_and_empty_tokens() {
        assert_eq!(key_code(""), None);
        assert_eq!(key_code("   "), None);
        assert_eq!(key_code("HYPER"), None);
        assert_eq!(key_code("0x1FF"), None);
    }

    #[test]
    fn test_button_and_media_names() {
        assert_eq!(button_mask("right"), Some(mouse::RIGHT));
        assert_eq!(button_mask("button5"), Some(mouse::FORWARD));
        assert_eq!(button_mask("thumb"), None);
        assert_eq!(media_key("volume_up"), Some(media::VOLUME_UP));
        assert_eq!(media_key("KEY_MEDIA_MUTE"), Some(media::MUTE));
        assert_eq!(media_key("EJECT"), None);
    }
}
