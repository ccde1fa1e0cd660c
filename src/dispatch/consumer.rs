use super::{names, CommandError, Context};
use crate::ble::HidDevice;
use serde_json::Value;

/// Media keys accepted in one command.
pub const MAX_CONSUMER_KEYS: usize = 8;

const DEFAULT_GAP_MS: i64 = 5;

pub(super) fn handle(ctx: &Context<'_>, hid: &mut HidDevice) -> Result<(), CommandError> {
    if !hid.is_connected() {
        return Err(CommandError::KeyboardNotConnected);
    }

    let source = ctx
        .field(&["keys", "key", "code"])
        .ok_or(CommandError::ConsumerKeyRequired)?;
    let keys = media_keys(source)?;
    let repeat = ctx.repeat();
    let gap = ctx.delay(&["gap_ms", "gapMs"], DEFAULT_GAP_MS);

    for _ in 0..repeat {
        for &key in &keys {
            hid.write_media(key)?;
            ctx.pause(gap);
        }
    }
    Ok(())
}

fn media_keys(source: &Value) -> Result<Vec<u16>, CommandError> {
    match source {
        Value::Array(items) => {
            let mut keys = Vec::with_capacity(items.len().min(MAX_CONSUMER_KEYS));
            for item in items {
                if !item.is_string() {
                    return Err(CommandError::InvalidConsumerEntry);
                }
                if keys.len() >= MAX_CONSUMER_KEYS {
                    return Err(CommandError::TooManyConsumerKeys);
                }
                keys.push(media_key(item)?);
            }
            if keys.is_empty() {
                return Err(CommandError::ConsumerKeyRequired);
            }
            Ok(keys)
        }
        single => Ok(vec![media_key(single)?]),
    }
}

fn media_key(value: &Value) -> Result<u16, CommandError> {
    match value {
        Value::String(s) => {
            names::media_key(s).ok_or_else(|| CommandError::UnknownConsumerKey(s.clone()))
        }
        _ => Err(CommandError::InvalidConsumerEntry),
    }
}

#[cfg(test)]
mod tests {
    use crate::ble::keys::media;
    use crate::ble::HidCall;
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

    #[test]
    fn test_single_key_taps() {
        let (reply, calls, clock) = run(r#"{"device":"consumer","key":"play_pause"}"#);
        assert!(is_ok(&reply));
        assert_eq!(
            calls,
            vec![HidCall::Media(media::PLAY_PAUSE), HidCall::Media(0)]
        );
        assert_eq!(clock.now_ms(), 5);
    }

    #[test]
    fn test_media_alias_with_repeat_and_gap() {
        let (reply, calls, clock) =
            run(r#"{"type":"media","keys":["VOLUME_UP","MUTE"],"repeat":2,"gap_ms":0}"#);
        assert!(is_ok(&reply));
        assert_eq!(
            count(&calls, |c| *c == HidCall::Media(media::VOLUME_UP)),
            2
        );
        assert_eq!(count(&calls, |c| *c == HidCall::Media(media::MUTE)), 2);
        assert_eq!(clock.now_ms(), 0);
    }

    #[test]
    fn test_consumer_errors() {
        let (reply, _, _) = run(r#"{"device":"consumer"}"#);
        assert_eq!(message(&reply), "consumer action requires key");

        let (reply, _, _) = run(r#"{"device":"consumer","keys":[]}"#);
        assert_eq!(message(&reply), "consumer action requires key");

        let (reply, _, _) = run(r#"{"device":"consumer","key":"EJECT"}"#);
        assert_eq!(message(&reply), "Unknown consumer key: EJECT");

        let (reply, _, _) = run(r#"{"device":"consumer","keys":[5]}"#);
        assert_eq!(message(&reply), "Invalid consumer key entry");

        let (reply, calls, _) = run(
            r#"{"device":"media","keys":["MUTE","MUTE","MUTE","MUTE","MUTE","MUTE","MUTE","MUTE","MUTE"]}"#,
        );
        assert_eq!(message(&reply), "Too many consumer keys");
        assert!(calls.is_empty());
    }

    #[test]
    fn test_not_connected() {
        let dispatcher = CommandDispatcher::new(Arc::new(ManualClock::new()));
        let (mut dev, _hid) = device(false);
        let reply = dispatcher
            .dispatch(r#"{"device":"media","key":"MUTE"}"#, &mut dev)
            .unwrap();
        assert_eq!(message(&reply), "BLE keyboard not connected");
    }
}
