//! CoreGraphics desktop backend
//!
//! Mouse events are posted at the HID tap location so they look like real
//! hardware input to the target application.

use core_foundation::array::CFArray;
use core_foundation::base::TCFType;
use core_foundation::dictionary::CFDictionary;
use core_foundation::number::CFNumber;
use core_foundation::string::CFString;
use core_graphics::display::CGDisplay;
use core_graphics::event::{CGEvent, CGEventTapLocation, CGEventType, CGMouseButton};
use core_graphics::event_source::{CGEventSource, CGEventSourceStateID};
use core_graphics::geometry::CGPoint;
use core_graphics::window::{
    kCGNullWindowID, kCGWindowListExcludeDesktopElements, kCGWindowListOptionOnScreenOnly,
    CGWindowListCopyWindowInfo,
};

use super::{ActionError, ForegroundWindow, Pointer};
use crate::store::Point;

fn event_source() -> Result<CGEventSource, ActionError> {
    CGEventSource::new(CGEventSourceStateID::HIDSystemState).map_err(|_| ActionError::EventSource)
}

fn cg_point(point: Point) -> CGPoint {
    CGPoint::new(point.x as f64, point.y as f64)
}

fn post_mouse_event(
    event_type: CGEventType,
    point: Point,
    name: &'static str,
) -> Result<(), ActionError> {
    let event = CGEvent::new_mouse_event(
        event_source()?,
        event_type,
        cg_point(point),
        CGMouseButton::Left,
    )
    .map_err(|_| ActionError::EventCreation(name))?;
    event.post(CGEventTapLocation::HID);
    Ok(())
}

pub struct CoreGraphicsPointer;

impl Pointer for CoreGraphicsPointer {
    fn position(&self) -> Result<Point, ActionError> {
        let event =
            CGEvent::new(event_source()?).map_err(|_| ActionError::EventCreation("null"))?;
        let location = event.location();
        Ok(Point::new(location.x.round() as i32, location.y.round() as i32))
    }

    fn move_to(&self, point: Point) -> Result<(), ActionError> {
        CGDisplay::warp_mouse_cursor_position(cg_point(point)).map_err(ActionError::CursorWarp)?;
        // Warping alone does not generate a move event; hover effects need one
        post_mouse_event(CGEventType::MouseMoved, point, "mouse moved")
    }

    fn left_click(&self, point: Point) -> Result<(), ActionError> {
        post_mouse_event(CGEventType::LeftMouseDown, point, "mouse down")?;
        post_mouse_event(CGEventType::LeftMouseUp, point, "mouse up")
    }
}

/// Frontmost normal-layer window from the on-screen window list
pub struct FrontmostWindow;

impl ForegroundWindow for FrontmostWindow {
    fn title(&self) -> Result<Option<String>, ActionError> {
        let options = kCGWindowListOptionOnScreenOnly | kCGWindowListExcludeDesktopElements;
        let list_ref = unsafe { CGWindowListCopyWindowInfo(options, kCGNullWindowID) };
        if list_ref.is_null() {
            return Ok(None);
        }
        let window_list: CFArray = unsafe { CFArray::wrap_under_create_rule(list_ref) };

        // The list is ordered front to back; layer 0 skips the menu bar and
        // other system overlays
        for item in window_list.iter() {
            let dict: CFDictionary =
                unsafe { CFDictionary::wrap_under_get_rule(*item as *const _) };

            if get_number(&dict, "kCGWindowLayer").and_then(|n| n.to_i32()) != Some(0) {
                continue;
            }

            let owner = get_string(&dict, "kCGWindowOwnerName").unwrap_or_default();
            // Window names need Screen Recording permission and are often absent
            let title = match get_string(&dict, "kCGWindowName") {
                Some(name) if !name.is_empty() => format!("{owner} - {name}"),
                _ => owner,
            };
            return Ok(Some(title));
        }

        Ok(None)
    }
}

fn get_number(dict: &CFDictionary, key: &str) -> Option<CFNumber> {
    let key = CFString::new(key);
    unsafe {
        let value = dict.find(key.as_concrete_TypeRef() as *const _)?;
        Some(CFNumber::wrap_under_get_rule(*value as *const _))
    }
}

fn get_string(dict: &CFDictionary, key: &str) -> Option<String> {
    let key = CFString::new(key);
    unsafe {
        let value = dict.find(key.as_concrete_TypeRef() as *const _)?;
        let cf_str = CFString::wrap_under_get_rule(*value as *const _);
        Some(cf_str.to_string())
    }
}
