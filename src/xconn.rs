//! Connection lifecycle: open the display once at startup, intern atoms,
//! resolve the keyboard mapping, and make sure everything is torn down on
//! every exit path via `Drop`.

use anyhow::{Context, Result};
use tracing::debug;
use x11rb::connection::Connection;
use x11rb::protocol::xproto::{ConnectionExt, PropMode, Screen};
use x11rb::protocol::Event;
use x11rb::xcb_ffi::XCBConnection;

use crate::atoms::Atoms;
use crate::keysyms::KeyboardMapping;

/// All of the long-lived X state the rest of the program needs. Owned once,
/// by `Bootstrap`, and threaded through everything else by reference -
/// mirroring the teacher's single `Application` handle, just without the
/// `Arc`/multi-window bookkeeping this single-window program does not need.
pub struct XConn {
    pub conn: XCBConnection,
    pub screen_num: usize,
    pub atoms: Atoms,
    pub keyboard: KeyboardMapping,
}

impl XConn {
    pub fn connect() -> Result<Self> {
        let (conn, screen_num) =
            XCBConnection::connect(None).context("failed to open connection to the X server")?;
        let atoms = Atoms::new(&conn)
            .context("interning atoms")?
            .reply()
            .context("interning atoms (reply)")?;
        let keyboard = KeyboardMapping::query(&conn).context("querying keyboard mapping")?;
        Ok(XConn {
            conn,
            screen_num,
            atoms,
            keyboard,
        })
    }

    pub fn screen(&self) -> &Screen {
        &self.conn.setup().roots[self.screen_num]
    }

    pub fn root(&self) -> u32 {
        self.screen().root
    }

    /// The classic "time-for-now" trick: append zero bytes to a private
    /// property on `window` (which must have `PROPERTY_CHANGE` selected) and
    /// read the server timestamp off the `PropertyNotify` this provokes.
    ///
    /// Any other events that arrive on the connection while we wait are not
    /// dropped: they are collected and returned so the caller can feed them
    /// back through its normal dispatch path, preserving the event loop's
    /// ordering guarantee (section 5).
    pub fn current_time(&self, window: u32) -> Result<(u32, Vec<Event>)> {
        self.conn
            .change_property8(
                PropMode::APPEND,
                window,
                self.atoms._MULTISELECT_TIME,
                self.atoms.STRING,
                &[],
            )
            .context("append zero-length property for time-for-now")?;
        self.conn.flush().context("flush")?;

        let mut deferred = Vec::new();
        loop {
            let event = self
                .conn
                .wait_for_event()
                .context("waiting for PropertyNotify")?;
            if let Event::PropertyNotify(ref pn) = event {
                if pn.window == window && pn.atom == self.atoms._MULTISELECT_TIME {
                    return Ok((pn.time, deferred));
                }
            }
            deferred.push(event);
        }
    }
}

impl Drop for XConn {
    fn drop(&mut self) {
        debug!("closing X connection");
        let _ = x11rb::connection::Connection::flush(&self.conn);
    }
}
