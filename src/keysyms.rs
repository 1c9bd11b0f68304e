//! A small hand-rolled keysym table.
//!
//! We only ever need to recognise a handful of keys (digits, letters,
//! editing keys, the function-key hotkeys), so rather than pull in a full
//! keysym crate we resolve keycodes ourselves via `GetKeyboardMapping` and
//! match the handful of keysym values we care about.

use anyhow::{Context, Result};
use x11rb::connection::Connection;
use x11rb::protocol::xproto::ConnectionExt;

// X11 keysym values (from <X11/keysymdef.h>). These are stable protocol
// constants, not an API surface that could drift between crate versions.
pub const XK_BACKSPACE: u32 = 0xff08;
pub const XK_DELETE: u32 = 0xffff;
pub const XK_RETURN: u32 = 0xff0d;
pub const XK_KP_ENTER: u32 = 0xff8d;
pub const XK_ESCAPE: u32 = 0xff1b;
pub const XK_UP: u32 = 0xff52;
pub const XK_DOWN: u32 = 0xff54;
pub const XK_F1: u32 = 0xffbe;
pub const XK_F2: u32 = 0xffbf;
pub const XK_F3: u32 = 0xffc0;
pub const XK_F4: u32 = 0xffc1;
pub const XK_F5: u32 = 0xffc2;
// Lowercase ASCII letters and digits share their keysym value with the
// ASCII code point, so `XK_0..=XK_9` and `XK_A..=XK_Z` need no constants.

/// Maps X keycodes to their primary (group 0, shift level 0) keysym.
///
/// Built once at startup via `GetKeyboardMapping`; cheap to keep around for
/// the life of the process since keyboard mappings practically never change
/// while we're running.
pub struct KeyboardMapping {
    min_keycode: u8,
    keysyms_per_keycode: u8,
    keysyms: Vec<u32>,
}

impl KeyboardMapping {
    pub fn query<C: Connection>(conn: &C) -> Result<Self> {
        let setup = conn.setup();
        let min_keycode = setup.min_keycode;
        let max_keycode = setup.max_keycode;
        let count = max_keycode - min_keycode + 1;
        let reply = conn
            .get_keyboard_mapping(min_keycode, count)
            .context("GetKeyboardMapping request")?
            .reply()
            .context("GetKeyboardMapping reply")?;
        Ok(KeyboardMapping {
            min_keycode,
            keysyms_per_keycode: reply.keysyms_per_keycode,
            keysyms: reply.keysyms,
        })
    }

    /// Returns the unshifted keysym for `keycode`, or `None` if it is out of
    /// the queried range.
    pub fn keysym(&self, keycode: u8) -> Option<u32> {
        if keycode < self.min_keycode {
            return None;
        }
        let row = (keycode - self.min_keycode) as usize;
        let stride = self.keysyms_per_keycode as usize;
        let idx = row * stride;
        self.keysyms.get(idx).copied().filter(|&ks| ks != 0)
    }
}

/// Classification of a resolved keysym into the actions this program cares
/// about (spec section 4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Digit(u8),  // '1'..'9' -> 1..9
    Letter(u8), // 'a'..'z' -> 0..25
    Up,
    Down,
    Return,
    Backspace,
    Delete,
    Escape,
    F1,
    F2,
    F3,
    F4,
    F5,
    Other,
}

pub fn classify(keysym: u32) -> Key {
    match keysym {
        k @ 0x31..=0x39 => Key::Digit((k - 0x30) as u8), // '1'..'9'
        k @ 0x61..=0x7a => Key::Letter((k - 0x61) as u8), // 'a'..'z'
        XK_UP => Key::Up,
        XK_DOWN => Key::Down,
        XK_RETURN | XK_KP_ENTER => Key::Return,
        XK_BACKSPACE => Key::Backspace,
        XK_DELETE => Key::Delete,
        XK_ESCAPE => Key::Escape,
        XK_F1 => Key::F1,
        XK_F2 => Key::F2,
        XK_F3 => Key::F3,
        XK_F4 => Key::F4,
        XK_F5 => Key::F5,
        _ => Key::Other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digit_and_letter_keysyms_classify() {
        assert_eq!(classify(0x31), Key::Digit(1));
        assert_eq!(classify(0x39), Key::Digit(9));
        assert_eq!(classify(0x61), Key::Letter(0));
        assert_eq!(classify(0x7a), Key::Letter(25));
    }

    #[test]
    fn editing_keys_classify() {
        assert_eq!(classify(XK_BACKSPACE), Key::Backspace);
        assert_eq!(classify(XK_F5), Key::F5);
        assert_eq!(classify(0x1234), Key::Other);
    }
}
