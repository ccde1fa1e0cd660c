use super::{names, CommandError, Context};
use crate::ble::HidDevice;
use serde_json::Value;

/// Keys accepted in one combo.
pub const MAX_KEY_COMBO: usize = 8;

const DEFAULT_CHAR_DELAY_MS: i64 = 6;
const DEFAULT_HOLD_MS: i64 = 20;

const CHAR_DELAY_FIELDS: &[&str] = &[
    "charDelayMs",
    "char_delay_ms",
    "interKeyDelayMs",
    "inter_key_delay_ms",
    "delayMs",
    "delay_ms",
];

pub(super) fn handle(ctx: &Context<'_>, hid: &mut HidDevice) -> Result<(), CommandError> {
    if !hid.is_connected() {
        return Err(CommandError::KeyboardNotConnected);
    }

    match ctx.action("press") {
        action @ ("write" | "print" | "println") => write(ctx, hid, action == "println"),
        "releaseAll" | "release_all" => Ok(hid.release_all()?),
        "press" => {
            for code in key_codes(ctx)? {
                hid.press(code)?;
            }
            Ok(())
        }
        "release" => {
            for code in key_codes(ctx)? {
                hid.release(code)?;
            }
            Ok(())
        }
        "tap" | "click" => {
            let codes = key_codes(ctx)?;
            let hold = ctx.delay(&["hold_ms", "holdMs"], DEFAULT_HOLD_MS);
            for &code in &codes {
                hid.press(code)?;
            }
            ctx.pause(hold);
            for &code in codes.iter().rev() {
                hid.release(code)?;
            }
            Ok(())
        }
        other => Err(CommandError::UnknownAction {
            device: "keyboard",
            action: other.to_string(),
        }),
    }
}

/// Type text, a newline, or a key sequence.
fn write(ctx: &Context<'_>, hid: &mut HidDevice, println: bool) -> Result<(), CommandError> {
    let repeat = ctx.repeat();
    let newline = println || ctx.flag("newline");
    let char_delay = ctx.delay(CHAR_DELAY_FIELDS, DEFAULT_CHAR_DELAY_MS);

    if let Some(text) = ctx.command.get("text").and_then(Value::as_str) {
        for _ in 0..repeat {
            // Non-ASCII bytes would decode as modifiers
            for byte in text.bytes().filter(u8::is_ascii) {
                hid.write(byte)?;
                ctx.pause(char_delay);
            }
            if newline {
                hid.write(b'\n')?;
                ctx.pause(char_delay);
            }
        }
        return Ok(());
    }

    if newline {
        for _ in 0..repeat {
            hid.write(b'\n')?;
            ctx.pause(char_delay);
        }
        return Ok(());
    }

    let codes = key_codes(ctx)?;
    for _ in 0..repeat {
        for &code in &codes {
            hid.write(code)?;
        }
    }
    Ok(())
}

/// Codes from `keys`, `key` or `code`, first present wins.
fn key_codes(ctx: &Context<'_>) -> Result<Vec<u8>, CommandError> {
    let source = ctx
        .field(&["keys", "key", "code"])
        .ok_or(CommandError::KeyRequired)?;
    match source {
        Value::Array(items) => {
            if items.is_empty() {
                return Err(CommandError::KeyRequired);
            }
            let mut codes = Vec::with_capacity(items.len().min(MAX_KEY_COMBO));
            for item in items {
                if codes.len() >= MAX_KEY_COMBO {
                    return Err(CommandError::TooManyKeys);
                }
                codes.push(key_code(item)?);
            }
            Ok(codes)
        }
        single => Ok(vec![key_code(single)?]),
    }
}

fn key_code(value: &Value) -> Result<u8, CommandError> {
    match value {
        Value::Number(n) => match n.as_i64() {
            Some(code @ 0..=255) => Ok(code as u8),
            Some(code) => Err(CommandError::InvalidKeyCode(code)),
            None => Err(CommandError::InvalidKeyEntry),
        },
        Value::String(s) => names::key_code(s).ok_or_else(|| CommandError::UnknownKey(s.clone())),
        _ => Err(CommandError::InvalidKeyEntry),
    }
}

#[cfg(test)]
mod tests {
    use crate::ble::keys::{KEY_LEFT_CTRL, KEY_RETURN};
    use crate::ble::{HidCall, KeyboardReport};
    use crate::clock::{Clock, ManualClock};
    use crate::dispatch::test_support::*;
    use crate::dispatch::CommandDispatcher;
    use std::sync::Arc;

    fn run(text: &str) -> (String, Vec<HidCall>, ManualClock) {
        let clock = ManualClock::new();
        let dispatcher = CommandDispatcher::new(Arc::new(clock.clone()));
        let (mut dev, hid) = device(true);
        let reply = dispatcher.dispatch(text, &mut dev).unwrap();
        (reply, hid.take_calls(), clock)
    }

    fn keyboard(calls: &[HidCall]) -> Vec<KeyboardReport> {
        calls
            .iter()
            .filter_map(|c| match c {
                HidCall::Keyboard(r) => Some(*r),
                _ => None,
            })
            .collect()
    }

    // ==================== Tap Tests ====================

    #[test]
    fn test_tap_presses_then_releases() {
        let (reply, calls, clock) = run(r#"{"device":"keyboard","action":"tap","key":"A"}"#);
        assert!(is_ok(&reply));
        let reports = keyboard(&calls);
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].keys[0], 0x04);
        assert_eq!(reports[1], KeyboardReport::default());
        assert_eq!(clock.now_ms(), 20);
    }

    #[test]
    fn test_combo_releases_in_reverse() {
        let (reply, calls, _) = run(
            r#"{"device":"keyboard","action":"tap","keys":["CTRL","c"],"hold_ms":0}"#,
        );
        assert!(is_ok(&reply));
        let reports = keyboard(&calls);
        assert_eq!(reports.len(), 4);
        assert_eq!(reports[1].modifiers, 0x01);
        assert_eq!(reports[1].keys[0], 0x06);
        // c released first, ctrl still held
        assert_eq!(reports[2].modifiers, 0x01);
        assert_eq!(reports[2].keys[0], 0);
        assert_eq!(reports[3], KeyboardReport::default());
    }

    #[test]
    fn test_hold_clamped() {
        let (_, _, clock) = run(r#"{"device":"keyboard","action":"tap","key":"a","holdMs":99999}"#);
        assert_eq!(clock.now_ms(), 1000);
    }

    #[test]
    fn test_default_action_is_press() {
        let (reply, calls, _) = run(&format!(
            r#"{{"device":"keyboard","code":{}}}"#,
            KEY_LEFT_CTRL
        ));
        assert!(is_ok(&reply));
        assert_eq!(keyboard(&calls)[0].modifiers, 0x01);
    }

    // ==================== Write Tests ====================

    #[test]
    fn test_write_text_with_newline_and_repeat() {
        let (reply, calls, clock) =
            run(r#"{"device":"keyboard","action":"println","text":"hi","repeat":2}"#);
        assert!(is_ok(&reply));
        // 3 characters per round, press + release each
        assert_eq!(keyboard(&calls).len(), 12);
        assert_eq!(clock.now_ms(), 6 * 6);
    }

    #[test]
    fn test_write_char_delay_zero() {
        let (_, _, clock) =
            run(r#"{"device":"keyboard","action":"write","text":"abc","charDelayMs":0}"#);
        assert_eq!(clock.now_ms(), 0);
    }

    #[test]
    fn test_write_key_codes_without_text() {
        let (reply, calls, _) = run(&format!(
            r#"{{"device":"keyboard","action":"write","keys":["0x{:X}","x"]}}"#,
            KEY_RETURN
        ));
        assert!(is_ok(&reply));
        let reports = keyboard(&calls);
        assert_eq!(reports[0].keys[0], 0x28);
        assert_eq!(reports[2].keys[0], 0x1B);
    }

    // ==================== Error Tests ====================

    #[test]
    fn test_unknown_action() {
        let (reply, _, _) = run(r#"{"device":"keyboard","action":"mash","key":"a"}"#);
        assert_eq!(message(&reply), "Unknown keyboard action: mash");
    }

    #[test]
    fn test_key_errors() {
        let (reply, _, _) = run(r#"{"device":"keyboard","action":"tap","key":"HYPER"}"#);
        assert_eq!(message(&reply), "Unknown key: HYPER");

        let (reply, _, _) = run(r#"{"device":"keyboard","action":"tap","key":300}"#);
        assert_eq!(message(&reply), "Invalid key code: 300");

        let (reply, _, _) = run(r#"{"device":"keyboard","action":"tap","key":{"x":1}}"#);
        assert_eq!(message(&reply), "Invalid key entry");

        let (reply, calls, _) = run(r#"{"device":"keyboard","action":"tap"}"#);
        assert_eq!(message(&reply), "keyboard action requires key(s) or code");
        assert!(calls.is_empty());
    }

    #[test]
    fn test_too_many_keys() {
        let (reply, calls, _) = run(
            r#"{"device":"keyboard","action":"press","keys":["a","b","c","d","e","f","g","h","i"]}"#,
        );
        assert_eq!(message(&reply), "Too many keys in combo");
        assert!(calls.is_empty());
    }
}
