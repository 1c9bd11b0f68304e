//! Enforcement of the "one instance at a time" rule (spec section 4.6).
//!
//! We scan the root window's direct children for one already carrying our
//! WM_CLASS sentinel name. There is an inherent TOCTOU gap between this scan
//! and our own window's creation, same as in the teacher's property-query
//! idiom (`application.rs`'s root/property queries); acceptable here since
//! a human launching this tool twice in the same instant is not a case we
//! need to defend against.

use anyhow::{Context, Result};
use x11rb::connection::Connection;
use x11rb::protocol::xproto::{AtomEnum, ConnectionExt};

use crate::xconn::XConn;

/// Returns `true` if a window with WM_CLASS instance `sentinel` already
/// exists among the root window's children.
pub fn already_running(xconn: &XConn, sentinel: &str) -> Result<bool> {
    let conn = &xconn.conn;
    let tree = conn
        .query_tree(xconn.root())
        .context("QueryTree")?
        .reply()
        .context("QueryTree (reply)")?;

    for child in tree.children {
        let prop = conn
            .get_property(false, child, xconn.atoms.WM_CLASS, AtomEnum::STRING, 0, 1024)
            .context("GetProperty(WM_CLASS)")?
            .reply();
        let Ok(prop) = prop else { continue };
        if prop.value.is_empty() {
            continue;
        }
        // WM_CLASS is two NUL-terminated strings; the instance name is the
        // first.
        let instance_end = prop.value.iter().position(|&b| b == 0).unwrap_or(prop.value.len());
        if &prop.value[..instance_end] == sentinel.as_bytes() {
            return Ok(true);
        }
    }
    Ok(false)
}
