//! CGEventTap backend for the input listener

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use core_foundation::runloop::{kCFRunLoopCommonModes, kCFRunLoopDefaultMode, CFRunLoop};
use core_graphics::event::{
    CGEvent, CGEventTap, CGEventTapLocation, CGEventTapOptions, CGEventTapPlacement,
    CGEventTapProxy, CGEventType, EventField,
};
use tokio::sync::mpsc;
use tracing::{info, trace, warn};

use super::capture::ClickCapture;
use super::keys::{key_name, modifier_pressed};
use super::listener::{HotkeyError, InputEvent, ReadySender};
use crate::store::Point;

/// What the tap callback hands to the loop; kept minimal so the callback
/// stays fast
enum RawInput {
    KeyDown(u16),
    FlagsChanged(u16, u64),
    LeftMouseDown(Point),
    TapDisabled,
}

/// Run the CFRunLoop with the event tap
pub(super) fn run_event_loop(
    event_tx: mpsc::Sender<InputEvent>,
    running: Arc<AtomicBool>,
    capture: ClickCapture,
    ready_tx: ReadySender,
) -> Result<(), HotkeyError> {
    let (callback_tx, callback_rx) = std::sync::mpsc::channel::<RawInput>();

    // CGEventTap callback - must be fast and non-blocking
    let callback = move |_proxy: CGEventTapProxy,
                         event_type: CGEventType,
                         event: &CGEvent|
          -> Option<CGEvent> {
        let raw = match event_type {
            CGEventType::KeyDown => {
                let repeat = event.get_integer_value_field(EventField::KEYBOARD_EVENT_AUTOREPEAT);
                if repeat == 0 {
                    let code =
                        event.get_integer_value_field(EventField::KEYBOARD_EVENT_KEYCODE) as u16;
                    Some(RawInput::KeyDown(code))
                } else {
                    None
                }
            }
            CGEventType::FlagsChanged => {
                let code =
                    event.get_integer_value_field(EventField::KEYBOARD_EVENT_KEYCODE) as u16;
                Some(RawInput::FlagsChanged(code, event.get_flags().bits()))
            }
            CGEventType::LeftMouseDown if capture.take() => {
                let location = event.location();
                Some(RawInput::LeftMouseDown(Point::new(
                    location.x.round() as i32,
                    location.y.round() as i32,
                )))
            }
            CGEventType::TapDisabledByTimeout | CGEventType::TapDisabledByUserInput => {
                Some(RawInput::TapDisabled)
            }
            _ => None,
        };

        if let Some(raw) = raw {
            let _ = callback_tx.send(raw);
        }
        Some(event.clone())
    };

    let tap = CGEventTap::new(
        CGEventTapLocation::Session,
        CGEventTapPlacement::HeadInsertEventTap,
        CGEventTapOptions::ListenOnly,
        vec![
            CGEventType::KeyDown,
            CGEventType::FlagsChanged,
            CGEventType::LeftMouseDown,
        ],
        callback,
    )
    .map_err(|_| HotkeyError::EventTapCreation)?;

    tap.enable();

    let run_loop_source = tap
        .mach_port
        .create_runloop_source(0)
        .map_err(|_| HotkeyError::RunLoopSource)?;
    let run_loop = CFRunLoop::get_current();

    unsafe {
        run_loop.add_source(&run_loop_source, kCFRunLoopCommonModes);
    }

    info!("event tap created and enabled");
    let _ = ready_tx.send(Ok(()));

    while running.load(Ordering::SeqCst) {
        // Run the loop for a short interval, then drain what the callback saw
        unsafe {
            CFRunLoop::run_in_mode(kCFRunLoopDefaultMode, Duration::from_millis(100), true);
        }

        while let Ok(raw) = callback_rx.try_recv() {
            let event = match raw {
                RawInput::KeyDown(code) => {
                    let key = key_name(code);
                    trace!(code, %key, "key pressed");
                    InputEvent::KeyPressed(key)
                }
                RawInput::FlagsChanged(code, flags) => {
                    let Some(key) = modifier_pressed(code, flags) else {
                        continue;
                    };
                    trace!(code, %key, "modifier pressed");
                    InputEvent::KeyPressed(key)
                }
                RawInput::LeftMouseDown(point) => {
                    trace!(%point, "click captured");
                    InputEvent::MouseClicked(point)
                }
                RawInput::TapDisabled => {
                    warn!("event tap disabled by the system, re-enabling");
                    tap.enable();
                    InputEvent::TapDisabled
                }
            };

            // Not in an async context, so block until the controller has room
            if event_tx.blocking_send(event).is_err() {
                warn!("failed to send input event - channel closed?");
                return Ok(());
            }
        }
    }

    // Tap and run loop source are released when they go out of scope
    Ok(())
}
