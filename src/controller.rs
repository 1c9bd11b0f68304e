//! `InteractionController`: turns X events (keys, clicks, hotkeys) into
//! selection-list mutations and `ProtocolEngine` transitions, and drives the
//! click-mode focus/pointer choreography (spec section 4.4).

use anyhow::{Context, Result};
use tracing::info;
use x11rb::connection::Connection;
use x11rb::protocol::xproto::{
    ConnectionExt, InputFocus, BUTTON_PRESS_EVENT, BUTTON_RELEASE_EVENT, MOTION_NOTIFY_EVENT,
};
use x11rb::connection::RequestConnection as _;
use x11rb::protocol::xtest::ConnectionExt as _;

use crate::keysyms::Key;
use crate::selection_list::SelectionList;
use crate::xconn::XConn;

/// What a dispatched key press should do, independent of any X I/O -
/// exercised directly in unit tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerAction {
    Pick(usize),
    MoveCursor(isize),
    Capture,
    RemoveAt(usize),
    RemoveLast,
    Clear,
    ClearAndExit,
    Cancel,
    Refuse,
    None,
}

/// Maps a classified key to the action it causes (spec section 4.3).
/// `cursor` is the list's current cursor, needed for Backspace/Delete and
/// for Return/KP_Enter.
pub fn dispatch_key(key: Key, cursor: Option<usize>, immediate: bool) -> ControllerAction {
    match key {
        Key::Digit(d) => ControllerAction::Pick(d as usize - 1),
        Key::Letter(l) => letter_alias(l).unwrap_or(ControllerAction::Pick(9 + l as usize)),
        Key::Up => {
            if immediate {
                ControllerAction::Pick(cursor.map(|c| c.wrapping_sub(1)).unwrap_or(0))
            } else {
                ControllerAction::MoveCursor(-1)
            }
        }
        Key::Down => {
            if immediate {
                ControllerAction::Pick(cursor.map(|c| c + 1).unwrap_or(0))
            } else {
                ControllerAction::MoveCursor(1)
            }
        }
        Key::Return => match cursor {
            Some(c) => ControllerAction::Pick(c),
            None => ControllerAction::None,
        },
        Key::Backspace | Key::Delete => match cursor {
            Some(c) => ControllerAction::RemoveAt(c),
            None => ControllerAction::None,
        },
        Key::F3 => ControllerAction::RemoveLast,
        Key::F4 => ControllerAction::Clear,
        Key::F5 => ControllerAction::ClearAndExit,
        Key::F2 => ControllerAction::Capture,
        Key::Escape => ControllerAction::Cancel,
        Key::F1 | Key::Other => ControllerAction::Refuse,
    }
}

/// `z`, `s`, `d`, `q` are the letter-key aliases for F2/F3/F4/F5 (spec
/// section 4.3); checked before the generic a-z pick mapping.
fn letter_alias(letter_index: u8) -> Option<ControllerAction> {
    match letter_index {
        25 => Some(ControllerAction::Capture),     // 'z'
        18 => Some(ControllerAction::RemoveLast),  // 's'
        3 => Some(ControllerAction::Clear),        // 'd'
        16 => Some(ControllerAction::ClearAndExit), // 'q'
        _ => None,
    }
}

pub struct InteractionController {
    pub click_mode: bool,
    pub immediate: bool,
    pub force: bool,
    pub exitnext: bool,
    saved_pointer: Option<(i16, i16)>,
    saved_focus: Option<u32>,
}

impl InteractionController {
    pub fn new(click_mode: bool, immediate: bool, force: bool) -> Self {
        InteractionController {
            click_mode,
            immediate,
            force,
            exitnext: false,
            saved_pointer: None,
            saved_focus: None,
        }
    }

    /// The focus window saved by `on_menu_will_show`, if any - the closest
    /// thing to a "requestor" a hotkey-opened, click-mode menu has when no
    /// real `SelectionRequest` is pending (used by the external helper).
    pub fn saved_focus(&self) -> Option<u32> {
        self.saved_focus
    }

    /// Called right before the menu is mapped: remember where the pointer
    /// and focus currently are so a click-mode pick can restore them.
    pub fn on_menu_will_show(&mut self, xconn: &XConn) -> Result<()> {
        if !self.click_mode {
            return Ok(());
        }
        let root = xconn.root();
        let pointer = xconn
            .conn
            .query_pointer(root)
            .context("QueryPointer")?
            .reply()
            .context("QueryPointer (reply)")?;
        self.saved_pointer = Some((pointer.root_x, pointer.root_y));

        let focus = xconn
            .conn
            .get_input_focus()
            .context("GetInputFocus")?
            .reply()
            .context("GetInputFocus (reply)")?
            .focus;
        self.saved_focus = Some(focus);
        Ok(())
    }

    /// After a pick, in click mode: restore focus, warp the pointer back to
    /// where it was, and fake a middle-button click there. This provokes the
    /// original requestor to issue a fresh `SelectionRequest`, which
    /// `ProtocolEngine` now answers immediately (rule 4.2.2.7).
    ///
    /// Grounded on the `paste()` choreography in the example pack's
    /// `memoni` selection module: restore pointer -> fake BUTTON_PRESS/
    /// BUTTON_RELEASE (code 2) -> restore original pointer position.
    pub fn replay_middle_click(&mut self, xconn: &XConn) -> Result<()> {
        let Some((x, y)) = self.saved_pointer else {
            return Ok(());
        };
        let root = xconn.root();
        let conn = &xconn.conn;

        if let Some(focus) = self.saved_focus {
            conn.set_input_focus(InputFocus::POINTER_ROOT, focus, x11rb::CURRENT_TIME)
                .context("restore focus")?;
        }

        let current = conn
            .query_pointer(root)
            .context("QueryPointer")?
            .reply()
            .context("QueryPointer (reply)")?;

        conn.xtest_fake_input(MOTION_NOTIFY_EVENT, 0, x11rb::CURRENT_TIME, root, x, y, 0)
            .context("xtest warp to saved pointer")?;

        conn.xtest_fake_input(BUTTON_PRESS_EVENT, 2, x11rb::CURRENT_TIME, root, 0, 0, 0)
            .context("xtest fake middle press")?;
        conn.xtest_fake_input(BUTTON_RELEASE_EVENT, 2, x11rb::CURRENT_TIME, root, 0, 0, 0)
            .context("xtest fake middle release")?;

        conn.xtest_fake_input(
            MOTION_NOTIFY_EVENT,
            0,
            x11rb::CURRENT_TIME,
            root,
            current.root_x,
            current.root_y,
            0,
        )
        .context("xtest restore pointer")?;

        conn.flush().context("flush")?;
        info!("replayed middle-click for requestor");
        self.saved_pointer = None;
        self.saved_focus = None;
        Ok(())
    }

    /// Applies `action` to `list`, returning whether a pick occurred (and
    /// at which index) for the caller to feed into the protocol engine.
    pub fn apply(&mut self, action: ControllerAction, list: &mut SelectionList) -> Option<usize> {
        match action {
            ControllerAction::Pick(i) if list.view(i).is_some() => {
                list.set_cursor(i);
                Some(i)
            }
            ControllerAction::Pick(_) => None,
            ControllerAction::MoveCursor(delta) => {
                list.move_cursor(delta);
                None
            }
            ControllerAction::RemoveAt(i) => {
                list.remove(i);
                None
            }
            ControllerAction::RemoveLast => {
                list.remove_last();
                None
            }
            ControllerAction::Clear => {
                list.clear();
                None
            }
            ControllerAction::ClearAndExit => {
                list.clear();
                self.exitnext = true;
                None
            }
            ControllerAction::Capture | ControllerAction::Cancel | ControllerAction::Refuse | ControllerAction::None => {
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keysyms::Key;

    #[test]
    fn digits_pick_first_nine_rows() {
        assert_eq!(dispatch_key(Key::Digit(1), None, false), ControllerAction::Pick(0));
        assert_eq!(dispatch_key(Key::Digit(9), None, false), ControllerAction::Pick(8));
    }

    #[test]
    fn letters_pick_extended_range() {
        assert_eq!(dispatch_key(Key::Letter(0), None, false), ControllerAction::Pick(9));
        assert_eq!(dispatch_key(Key::Letter(1), None, false), ControllerAction::Pick(10));
    }

    #[test]
    fn letter_aliases_override_plain_pick() {
        assert_eq!(dispatch_key(Key::Letter(25), None, false), ControllerAction::Capture); // 'z'
        assert_eq!(dispatch_key(Key::Letter(16), None, false), ControllerAction::ClearAndExit); // 'q'
    }

    #[test]
    fn unmapped_key_refuses() {
        assert_eq!(dispatch_key(Key::Other, None, false), ControllerAction::Refuse);
    }

    #[test]
    fn return_without_cursor_is_noop() {
        assert_eq!(dispatch_key(Key::Return, None, false), ControllerAction::None);
    }

    #[test]
    fn return_with_cursor_picks_it() {
        assert_eq!(dispatch_key(Key::Return, Some(2), false), ControllerAction::Pick(2));
    }

    #[test]
    fn immediate_mode_turns_cursor_moves_into_picks() {
        assert_eq!(dispatch_key(Key::Down, Some(0), true), ControllerAction::Pick(1));
    }

    #[test]
    fn apply_pick_rejects_out_of_range_index() {
        let mut controller = InteractionController::new(false, false, false);
        let mut list = SelectionList::new(None);
        list.add("only-one");
        assert_eq!(controller.apply(ControllerAction::Pick(5), &mut list), None);
        assert_eq!(controller.apply(ControllerAction::Pick(0), &mut list), Some(0));
    }

    #[test]
    fn clear_and_exit_sets_flag() {
        let mut controller = InteractionController::new(false, false, false);
        let mut list = SelectionList::new(None);
        list.add("x");
        controller.apply(ControllerAction::ClearAndExit, &mut list);
        assert!(controller.exitnext);
        assert!(list.is_empty());
    }
}
