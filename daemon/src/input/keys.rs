//! Key naming
//!
//! Converts macOS virtual key codes (ANSI layout) into the lowercase names
//! stored in the mapping file. Names match what earlier config files used:
//! printable keys are the character itself, named keys use words such as
//! `f1`, `space` or `page_up`, and anything unknown becomes `vk_<code>`.
//!
//! Modifiers do not produce key-down events; the tap sees them as flag
//! changes and [`modifier_pressed`] turns the ones that went down into
//! names such as `ctrl_l` or `cmd_r`.

/// Device-dependent modifier bits of `CGEventFlags` (IOKit `NX_DEVICE*KEYMASK`)
mod device_flags {
    pub const LEFT_CONTROL: u64 = 0x0000_0001;
    pub const LEFT_SHIFT: u64 = 0x0000_0002;
    pub const RIGHT_SHIFT: u64 = 0x0000_0004;
    pub const LEFT_COMMAND: u64 = 0x0000_0008;
    pub const RIGHT_COMMAND: u64 = 0x0000_0010;
    pub const LEFT_OPTION: u64 = 0x0000_0020;
    pub const RIGHT_OPTION: u64 = 0x0000_0040;
    pub const RIGHT_CONTROL: u64 = 0x0000_2000;
}

const CAPS_LOCK: u16 = 0x39;

/// Name for a virtual key code
pub fn key_name(code: u16) -> String {
    match static_name(code) {
        Some(name) => name.to_string(),
        None => format!("vk_{code}"),
    }
}

/// Name of the modifier behind a flags-changed event, if it was pressed
///
/// A flags-changed event fires on both press and release; the key went
/// down when its device bit is set afterwards. Caps Lock toggles its flag
/// on every press, so each of its events counts as a press.
pub fn modifier_pressed(code: u16, flags: u64) -> Option<String> {
    if code == CAPS_LOCK {
        return Some("caps_lock".to_string());
    }
    let (name, mask) = modifier(code)?;
    (flags & mask != 0).then(|| name.to_string())
}

fn modifier(code: u16) -> Option<(&'static str, u64)> {
    use device_flags::*;
    let modifier = match code {
        0x3B => ("ctrl_l", LEFT_CONTROL),
        0x3E => ("ctrl_r", RIGHT_CONTROL),
        0x38 => ("shift", LEFT_SHIFT),
        0x3C => ("shift_r", RIGHT_SHIFT),
        0x3A => ("alt_l", LEFT_OPTION),
        0x3D => ("alt_r", RIGHT_OPTION),
        0x37 => ("cmd", LEFT_COMMAND),
        0x36 => ("cmd_r", RIGHT_COMMAND),
        _ => return None,
    };
    Some(modifier)
}

fn static_name(code: u16) -> Option<&'static str> {
    let name = match code {
        // Letters
        0x00 => "a",
        0x0B => "b",
        0x08 => "c",
        0x02 => "d",
        0x0E => "e",
        0x03 => "f",
        0x05 => "g",
        0x04 => "h",
        0x22 => "i",
        0x26 => "j",
        0x28 => "k",
        0x25 => "l",
        0x2E => "m",
        0x2D => "n",
        0x1F => "o",
        0x23 => "p",
        0x0C => "q",
        0x0F => "r",
        0x01 => "s",
        0x11 => "t",
        0x20 => "u",
        0x09 => "v",
        0x0D => "w",
        0x07 => "x",
        0x10 => "y",
        0x06 => "z",
        // Digits
        0x12 => "1",
        0x13 => "2",
        0x14 => "3",
        0x15 => "4",
        0x17 => "5",
        0x16 => "6",
        0x1A => "7",
        0x1C => "8",
        0x19 => "9",
        0x1D => "0",
        // Punctuation
        0x1B => "-",
        0x18 => "=",
        0x21 => "[",
        0x1E => "]",
        0x2A => "\\",
        0x29 => ";",
        0x27 => "'",
        0x2B => ",",
        0x2F => ".",
        0x2C => "/",
        0x32 => "`",
        // Editing and navigation
        0x24 => "enter",
        0x4C => "enter",
        0x30 => "tab",
        0x31 => "space",
        0x33 => "backspace",
        0x75 => "delete",
        0x35 => "esc",
        0x72 => "insert",
        0x73 => "home",
        0x77 => "end",
        0x74 => "page_up",
        0x79 => "page_down",
        0x7B => "left",
        0x7C => "right",
        0x7D => "down",
        0x7E => "up",
        // Function keys
        0x7A => "f1",
        0x78 => "f2",
        0x63 => "f3",
        0x76 => "f4",
        0x60 => "f5",
        0x61 => "f6",
        0x62 => "f7",
        0x64 => "f8",
        0x65 => "f9",
        0x6D => "f10",
        0x67 => "f11",
        0x6F => "f12",
        0x69 => "f13",
        0x6B => "f14",
        0x71 => "f15",
        0x6A => "f16",
        0x40 => "f17",
        0x4F => "f18",
        0x50 => "f19",
        0x5A => "f20",
        // Media
        0x48 => "media_volume_up",
        0x49 => "media_volume_down",
        0x4A => "media_volume_mute",
        _ => return None,
    };
    Some(name)
}
