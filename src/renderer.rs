//! Drawing the menu and flash windows.
//!
//! This is explicitly out of scope as far as design effort goes (see
//! SPEC_FULL.md section 1): no wrapping, no DPI awareness, no theming. The
//! `Renderer` trait is the real seam; `XcbRenderer` exists only so the
//! binary is actually runnable, using plain X11 core fonts the way a
//! minimal, pre-Pango X client would.

use anyhow::{Context, Result};
use tracing::warn;
use x11rb::connection::Connection;
use x11rb::protocol::xproto::{
    ConnectionExt, Fontable, Gcontext, GetGeometryReply, GraphicsContext, Rectangle, Screen,
};

use crate::xconn::XConn;

pub const ROW_HEIGHT: i16 = 18;
pub const MENU_WIDTH: u16 = 240;
const PADDING: i16 = 4;

/// One row of the menu, ready to draw: the label a user sees, and whether
/// it is the currently highlighted (cursor) row.
pub struct MenuRow<'a> {
    pub label: &'a str,
    pub highlighted: bool,
}

pub struct MenuView<'a> {
    pub rows: Vec<MenuRow<'a>>,
}

pub struct FlashView<'a> {
    pub lines: Vec<&'a str>,
}

/// The seam between the protocol/controller logic and actually putting
/// pixels on the screen. `Bootstrap` only ever talks to this trait; swapping
/// in a themed, DPI-aware, Pango-backed renderer later means implementing
/// this trait and nothing else.
pub trait Renderer {
    fn draw_menu(&mut self, xconn: &XConn, window: u32, view: &MenuView) -> Result<()>;
    fn draw_flash(&mut self, xconn: &XConn, window: u32, view: &FlashView) -> Result<()>;
}

/// Minimal core-font renderer: one filled background rectangle plus an
/// `ImageText8` call per row.
pub struct XcbRenderer {
    gc: Gcontext,
    gc_highlight: Gcontext,
}

impl XcbRenderer {
    pub fn new(xconn: &XConn) -> Result<Self> {
        let conn = &xconn.conn;
        let screen = xconn.screen();

        let font = conn.generate_id().context("generate_id (font)")?;
        if conn.open_font(font, b"fixed").is_err() {
            warn!("could not open font 'fixed', falling back to '*'");
            conn.open_font(font, b"*").context("OpenFont fallback")?;
        }

        let gc = conn.generate_id().context("generate_id (gc)")?;
        conn.create_gc(
            gc,
            screen.root,
            &x11rb::protocol::xproto::CreateGCAux::new()
                .foreground(screen.black_pixel)
                .background(screen.white_pixel)
                .font(Fontable::from(font)),
        )
        .context("CreateGC")?;

        let gc_highlight = conn.generate_id().context("generate_id (gc highlight)")?;
        conn.create_gc(
            gc_highlight,
            screen.root,
            &x11rb::protocol::xproto::CreateGCAux::new()
                .foreground(screen.white_pixel)
                .background(screen.black_pixel)
                .font(Fontable::from(font)),
        )
        .context("CreateGC (highlight)")?;

        conn.close_font(font).context("CloseFont")?;

        Ok(XcbRenderer { gc, gc_highlight })
    }

    fn geometry(xconn: &XConn, window: u32) -> Result<GetGeometryReply> {
        xconn
            .conn
            .get_geometry(window)
            .context("GetGeometry")?
            .reply()
            .context("GetGeometry (reply)")
    }

    fn fill(
        xconn: &XConn,
        window: u32,
        gc: GraphicsContext,
        rect: Rectangle,
    ) -> Result<()> {
        xconn
            .conn
            .poly_fill_rectangle(window, gc, &[rect])
            .context("PolyFillRectangle")?;
        Ok(())
    }
}

impl Renderer for XcbRenderer {
    fn draw_menu(&mut self, xconn: &XConn, window: u32, view: &MenuView) -> Result<()> {
        let geom = Self::geometry(xconn, window)?;
        Self::fill(
            xconn,
            window,
            self.gc,
            Rectangle {
                x: 0,
                y: 0,
                width: geom.width,
                height: geom.height,
            },
        )?;

        for (i, row) in view.rows.iter().enumerate() {
            let y = i as i16 * ROW_HEIGHT;
            let gc = if row.highlighted {
                Self::fill(
                    xconn,
                    window,
                    self.gc_highlight,
                    Rectangle {
                        x: 0,
                        y,
                        width: geom.width,
                        height: ROW_HEIGHT as u16,
                    },
                )?;
                self.gc_highlight
            } else {
                self.gc
            };
            xconn
                .conn
                .image_text8(window, gc, PADDING, y + ROW_HEIGHT - PADDING, row.label.as_bytes())
                .context("ImageText8")?;
        }
        xconn.conn.flush().context("flush")?;
        Ok(())
    }

    fn draw_flash(&mut self, xconn: &XConn, window: u32, view: &FlashView) -> Result<()> {
        let geom = Self::geometry(xconn, window)?;
        Self::fill(
            xconn,
            window,
            self.gc,
            Rectangle {
                x: 0,
                y: 0,
                width: geom.width,
                height: geom.height,
            },
        )?;
        for (i, line) in view.lines.iter().enumerate() {
            let y = i as i16 * ROW_HEIGHT + ROW_HEIGHT - PADDING;
            xconn
                .conn
                .image_text8(window, self.gc, PADDING, y, line.as_bytes())
                .context("ImageText8")?;
        }
        xconn.conn.flush().context("flush")?;
        Ok(())
    }
}

impl XcbRenderer {
    /// Suggested window height in pixels for a menu with `rows` entries.
    pub fn menu_height(rows: usize) -> u16 {
        (rows.max(1) as u16) * ROW_HEIGHT as u16
    }

    pub fn menu_width() -> u16 {
        MENU_WIDTH
    }

    /// Clamp a proposed menu position so it stays on-screen.
    pub fn clamp_to_screen(screen: &Screen, x: i16, y: i16, width: u16, height: u16) -> (i16, i16) {
        let max_x = (screen.width_in_pixels as i16 - width as i16).max(0);
        let max_y = (screen.height_in_pixels as i16 - height as i16).max(0);
        (x.clamp(0, max_x), y.clamp(0, max_y))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn menu_height_scales_with_rows() {
        assert_eq!(XcbRenderer::menu_height(0), ROW_HEIGHT as u16);
        assert_eq!(XcbRenderer::menu_height(3), 3 * ROW_HEIGHT as u16);
    }

    #[test]
    fn clamp_keeps_window_on_screen() {
        let screen = Screen {
            root: 0,
            default_colormap: 0,
            white_pixel: 0,
            black_pixel: 0,
            current_input_masks: x11rb::protocol::xproto::EventMask::default(),
            width_in_pixels: 100,
            height_in_pixels: 100,
            width_in_millimeters: 0,
            height_in_millimeters: 0,
            min_installed_maps: 0,
            max_installed_maps: 0,
            root_visual: 0,
            backing_stores: x11rb::protocol::xproto::BackingStore::NOT_USEFUL,
            save_unders: 0,
            root_depth: 24,
            allowed_depths: vec![],
        };
        let (x, y) = XcbRenderer::clamp_to_screen(&screen, 90, 90, 50, 50);
        assert_eq!((x, y), (50, 50));
    }
}
