//! Creation of the two override-redirect windows this program owns: the
//! interactive menu and the non-interactive flash/confirmation window.

use anyhow::{Context, Result};
use x11rb::connection::Connection;
use x11rb::protocol::xproto::{
    ColormapAlloc, ConnectionExt, CreateWindowAux, EventMask, PropMode, WindowClass,
};

use crate::xconn::XConn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowRole {
    Menu,
    Flash,
}

impl WindowRole {
    /// The WM_CLASS/_NET_WM_NAME instance name, also used by `singleton.rs`
    /// to detect an already-running instance.
    pub fn sentinel_name(self, daemon: bool) -> &'static str {
        match (self, daemon) {
            (WindowRole::Menu, false) => "multiselect",
            (WindowRole::Menu, true) => "multiselectd",
            (WindowRole::Flash, _) => "multiselect-flash",
        }
    }
}

/// Creates an override-redirect, input/output window for `role` at `(x, y)`
/// sized `(width, height)`. Both our windows skip window-manager decoration
/// and placement entirely, following the teacher's `DropDown`/`Tooltip`
/// window-level handling.
pub fn create(
    xconn: &XConn,
    role: WindowRole,
    daemon: bool,
    x: i16,
    y: i16,
    width: u16,
    height: u16,
) -> Result<u32> {
    let conn = &xconn.conn;
    let screen = xconn.screen();
    let id = conn.generate_id().context("generate_id")?;

    let event_mask = match role {
        WindowRole::Menu => {
            EventMask::EXPOSURE
                | EventMask::KEY_PRESS
                | EventMask::BUTTON_PRESS
                | EventMask::BUTTON_RELEASE
                | EventMask::FOCUS_CHANGE
                | EventMask::LEAVE_WINDOW
                | EventMask::PROPERTY_CHANGE
        }
        WindowRole::Flash => EventMask::EXPOSURE,
    };

    let colormap = conn.generate_id().context("generate_id (colormap)")?;
    conn.create_colormap(
        ColormapAlloc::NONE,
        colormap,
        screen.root,
        screen.root_visual,
    )
    .context("create_colormap")?;

    let cw_values = CreateWindowAux::new()
        .event_mask(event_mask)
        .override_redirect(1)
        .colormap(colormap)
        .border_pixel(screen.black_pixel)
        .background_pixel(screen.white_pixel);

    conn.create_window(
        screen.root_depth,
        id,
        screen.root,
        x,
        y,
        width,
        height,
        0,
        WindowClass::INPUT_OUTPUT,
        screen.root_visual,
        &cw_values,
    )
    .context("create_window")?
    .check()
    .context("create_window (check)")?;

    conn.free_colormap(colormap).context("free_colormap")?;

    set_wm_class(xconn, id, role.sentinel_name(daemon))?;

    let window_type_atom = match role {
        WindowRole::Menu => xconn.atoms._NET_WM_WINDOW_TYPE_DROPDOWN_MENU,
        WindowRole::Flash => xconn.atoms._NET_WM_WINDOW_TYPE_TOOLTIP,
    };
    conn.change_property32(
        PropMode::REPLACE,
        id,
        xconn.atoms._NET_WM_WINDOW_TYPE,
        xconn.atoms.ATOM,
        &[window_type_atom],
    )
    .context("set _NET_WM_WINDOW_TYPE")?;

    conn.change_property32(
        PropMode::REPLACE,
        id,
        xconn.atoms.WM_PROTOCOLS,
        xconn.atoms.ATOM,
        &[xconn.atoms.WM_DELETE_WINDOW],
    )
    .context("set WM_PROTOCOLS")?;

    Ok(id)
}

/// Sets a *disabled* (all-zero-mask) override-redirect flag back off for
/// windows that, despite being override-redirect, should still be movable by
/// `configure_window` (both of ours are, to track the pointer in click mode).
pub fn reposition(xconn: &XConn, id: u32, x: i16, y: i16) -> Result<()> {
    use x11rb::protocol::xproto::ConfigureWindowAux;
    xconn
        .conn
        .configure_window(
            id,
            &ConfigureWindowAux::new().x(x as i32).y(y as i32),
        )
        .context("configure_window")?;
    Ok(())
}

fn set_wm_class(xconn: &XConn, id: u32, name: &str) -> Result<()> {
    let conn = &xconn.conn;
    // ICCCM 4.1.2.5: WM_CLASS is two consecutive NUL-terminated strings,
    // instance then class.
    let mut wm_class = Vec::with_capacity(2 * (name.len() + 1));
    wm_class.extend_from_slice(name.as_bytes());
    wm_class.push(0);
    wm_class.extend_from_slice(name.as_bytes());
    wm_class.push(0);
    conn.change_property8(
        PropMode::REPLACE,
        id,
        xconn.atoms.WM_CLASS,
        xconn.atoms.STRING,
        &wm_class,
    )
    .context("set WM_CLASS")?;
    Ok(())
}
