use super::{as_int, names, CommandError, Context};
use crate::ble::keys::mouse as buttons;
use crate::ble::{HidDevice, Motion};
use serde_json::Value;
use std::time::Duration;

const DEFAULT_HOLD_MS: i64 = 20;
const MOVE_STEP_DELAY: Duration = Duration::from_millis(5);

pub(super) fn handle(ctx: &Context<'_>, hid: &mut HidDevice) -> Result<(), CommandError> {
    if !hid.is_connected() {
        return Err(CommandError::MouseNotConnected);
    }

    let action = ctx.action("move");
    let repeat = ctx.repeat();
    let motion = Motion {
        x: ctx.int(&["x", "dx"], 0) as i32,
        y: ctx.int(&["y", "dy"], 0) as i32,
        wheel: ctx.int(&["wheel", "scroll"], 0) as i32,
        pan: ctx.int(&["pan", "hWheel", "h_scroll"], 0) as i32,
    };
    let mask = match ctx.field(&["buttons", "button"]) {
        Some(value) => Some(button_mask(value)?),
        None => None,
    };

    match action {
        "click" => {
            let mask = mask.unwrap_or(buttons::LEFT);
            let hold = ctx.delay(&["hold_ms", "holdMs"], DEFAULT_HOLD_MS);
            for i in 0..repeat {
                hid.mouse_press(mask)?;
                ctx.pause(hold);
                hid.mouse_release(mask)?;
                if i + 1 < repeat {
                    ctx.pause(hold);
                }
            }
            Ok(())
        }
        "scroll" => {
            if motion.is_zero() {
                return Err(CommandError::MovementRequired("scroll"));
            }
            let scroll = Motion {
                wheel: motion.wheel,
                pan: motion.pan,
                ..Motion::default()
            };
            for _ in 0..repeat {
                hid.mouse_move(scroll)?;
            }
            Ok(())
        }
        "move" => {
            if motion.is_zero() {
                return Err(CommandError::MovementRequired("move"));
            }
            for i in 0..repeat {
                hid.mouse_move(motion)?;
                if i + 1 < repeat {
                    ctx.pause(MOVE_STEP_DELAY);
                }
            }
            Ok(())
        }
        "press" => {
            let mask = mask.ok_or(CommandError::ButtonsRequired("press"))?;
            Ok(hid.mouse_press(mask)?)
        }
        "release" => {
            let mask = mask.ok_or(CommandError::ButtonsRequired("release"))?;
            Ok(hid.mouse_release(mask)?)
        }
        "releaseAll" | "release_all" => Ok(hid.mouse_release(buttons::ALL)?),
        other => Err(CommandError::UnknownAction {
            device: "mouse",
            action: other.to_string(),
        }),
    }
}

/// Button set from a name, a numeric mask, or an array of either.
fn button_mask(value: &Value) -> Result<u8, CommandError> {
    match value {
        Value::Array(items) => {
            let mut mask = 0u8;
            for item in items {
                mask |= single_button(item)?;
            }
            if mask == 0 {
                return Err(CommandError::InvalidButtonEntry);
            }
            Ok(mask)
        }
        other => single_button(other),
    }
}

fn single_button(value: &Value) -> Result<u8, CommandError> {
    match value {
        Value::String(s) => {
            names::button_mask(s).ok_or_else(|| CommandError::UnknownButton(s.clone()))
        }
        Value::Number(_) => match as_int(value) {
            mask @ 1..=255 => Ok(mask as u8),
            mask => Err(CommandError::InvalidButtonMask(mask)),
        },
        _ => Err(CommandError::InvalidButtonEntry),
    }
}

#[cfg(test)]
mod tests {
    use crate::ble::keys::mouse;
    use crate::ble::{HidCall, MouseReport};
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

    fn mouse_reports(calls: &[HidCall]) -> Vec<MouseReport> {
        calls
            .iter()
            .filter_map(|c| match c {
                HidCall::Mouse(r) => Some(*r),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_not_connected_message() {
        let dispatcher = CommandDispatcher::new(Arc::new(ManualClock::new()));
        let (mut dev, _hid) = device(false);
        let reply = dispatcher
            .dispatch(r#"{"device":"mouse","x":5}"#, &mut dev)
            .unwrap();
        assert_eq!(message(&reply), "BLE connection not established");
    }

    // ==================== Movement Tests ====================

    #[test]
    fn test_move_with_aliases() {
        let (reply, calls, _) = run(r#"{"device":"mouse","dx":10,"dy":-4,"scroll":1,"pan":2}"#);
        assert!(is_ok(&reply));
        assert_eq!(
            mouse_reports(&calls),
            vec![MouseReport {
                buttons: 0,
                x: 10,
                y: -4,
                wheel: 1,
                pan: 2
            }]
        );
    }

    #[test]
    fn test_move_repeat_paces_steps() {
        let (_, calls, clock) = run(r#"{"device":"mouse","action":"move","x":1,"repeat":3}"#);
        assert_eq!(mouse_reports(&calls).len(), 3);
        assert_eq!(clock.now_ms(), 10);
    }

    #[test]
    fn test_move_requires_movement() {
        let (reply, calls, _) = run(r#"{"device":"mouse","action":"move"}"#);
        assert_eq!(message(&reply), "mouse move requires movement");
        assert!(calls.is_empty());
    }

    #[test]
    fn test_scroll_ignores_pointer_axes() {
        let (reply, calls, _) = run(r#"{"device":"mouse","action":"scroll","x":9,"wheel":-2}"#);
        assert!(is_ok(&reply));
        assert_eq!(
            mouse_reports(&calls),
            vec![MouseReport {
                wheel: -2,
                ..Default::default()
            }]
        );

        let (reply, _, _) = run(r#"{"device":"mouse","action":"scroll"}"#);
        assert_eq!(message(&reply), "mouse scroll requires movement");
    }

    // ==================== Button Tests ====================

    #[test]
    fn test_click_defaults_to_left() {
        let (reply, calls, clock) = run(r#"{"device":"mouse","action":"click"}"#);
        assert!(is_ok(&reply));
        let reports = mouse_reports(&calls);
        assert_eq!(reports[0].buttons, mouse::LEFT);
        assert_eq!(reports[1].buttons, 0);
        assert_eq!(clock.now_ms(), 20);
    }

    #[test]
    fn test_double_click_with_named_buttons() {
        let (reply, calls, clock) = run(
            r#"{"device":"mouse","action":"click","buttons":["right","MIDDLE"],"repeat":2,"holdMs":10}"#,
        );
        assert!(is_ok(&reply));
        let reports = mouse_reports(&calls);
        assert_eq!(reports.len(), 4);
        assert_eq!(reports[0].buttons, mouse::RIGHT | mouse::MIDDLE);
        assert_eq!(clock.now_ms(), 30);
    }

    #[test]
    fn test_press_and_release_need_buttons() {
        let (reply, _, _) = run(r#"{"device":"mouse","action":"press"}"#);
        assert_eq!(message(&reply), "mouse press requires button(s)");
        let (reply, _, _) = run(r#"{"device":"mouse","action":"release"}"#);
        assert_eq!(message(&reply), "mouse release requires button(s)");
    }

    #[test]
    fn test_button_errors() {
        let (reply, _, _) = run(r#"{"device":"mouse","action":"press","button":"thumb"}"#);
        assert_eq!(message(&reply), "Unknown mouse button: thumb");
        let (reply, _, _) = run(r#"{"device":"mouse","action":"press","button":0}"#);
        assert_eq!(message(&reply), "Invalid mouse button mask: 0");
        let (reply, _, _) = run(r#"{"device":"mouse","action":"press","buttons":[true]}"#);
        assert_eq!(message(&reply), "Invalid mouse button entry");
    }

    #[test]
    fn test_release_all() {
        let (reply, calls, _) = run(r#"{"device":"mouse","action":"releaseAll"}"#);
        assert!(is_ok(&reply));
        assert_eq!(mouse_reports(&calls), vec![MouseReport::default()]);
    }

    #[test]
    fn test_unknown_action() {
        let (reply, _, _) = run(r#"{"device":"mouse","action":"wiggle"}"#);
        assert_eq!(message(&reply), "Unknown mouse action: wiggle");
    }
}
