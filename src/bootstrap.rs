//! Process startup order and the main event loop (spec section 4.11).
//!
//! Grounded on `AppInner::run_inner`'s overall shape (pull one event,
//! dispatch by variant) from the teacher, simplified down to a plain
//! blocking `wait_for_event` loop since this program has no animation/idle
//! work: the only thing it ever waits on besides X events is the
//! synchronous flash-window sleep (section 4.3), which is a deliberate,
//! bounded stall, not a second event source.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::{debug, info, warn};
use x11rb::connection::Connection;
use x11rb::protocol::xproto::{ButtonPressEvent, ConnectionExt, KeyPressEvent};
use x11rb::protocol::Event;

use crate::cli::{ingest_strings, Cli, ModeFlags};
use crate::controller::{dispatch_key, ControllerAction, InteractionController};
use crate::error::MultiselectError;
use crate::external_helper::ExternalHelper;
use crate::keysyms::classify;
use crate::protocol_engine::{ClearAction, Decision, IncomingRequest, ProtocolEngine};
use crate::renderer::{MenuRow, MenuView, Renderer, XcbRenderer};
use crate::selection_list::SelectionList;
use crate::singleton;
use crate::window::{self, WindowRole};
use crate::xconn::XConn;

const FLASH_HIDE_STARTUP: Duration = Duration::from_micros(200_000);
const FLASH_HIDE_CHANGE: Duration = Duration::from_micros(500_000);
const FLASH_HIDE_MESSAGE: Duration = Duration::from_micros(800_000);

pub struct Bootstrap {
    xconn: XConn,
    engine: ProtocolEngine,
    controller: InteractionController,
    list: SelectionList,
    renderer: XcbRenderer,
    menu_window: u32,
    flash_window: u32,
    menu_visible: bool,
    flags: ModeFlags,
    helper: Option<ExternalHelper>,
    pending_events: VecDeque<Event>,
}

impl Bootstrap {
    pub fn run(cli: Cli) -> Result<()> {
        let flags = ModeFlags::from_cli(&cli);
        let separator = cli.separator.map(|c| c as u8);
        let mut list = SelectionList::new(separator);
        for s in ingest_strings(&cli.strings).context("ingesting initial strings")? {
            list.add(s);
        }

        let xconn = XConn::connect().map_err(|_| MultiselectError::DisplayOpen)?;

        let sentinel = WindowRole::Menu.sentinel_name(flags.daemon);
        if singleton::already_running(&xconn, sentinel).context("checking for a running instance")? {
            return Err(MultiselectError::SingletonClash.into());
        }

        let screen = xconn.screen();
        let menu_window = window::create(&xconn, WindowRole::Menu, flags.daemon, 0, 0, 240, 18)
            .context("creating menu window")?;
        let flash_window = window::create(
            &xconn,
            WindowRole::Flash,
            flags.daemon,
            0,
            0,
            screen.width_in_pixels / 2,
            24,
        )
        .context("creating flash window")?;

        let renderer = XcbRenderer::new(&xconn).context("initializing renderer")?;

        let mut engine = ProtocolEngine::new(menu_window);
        let mut pending_events = VecDeque::new();

        let owner = xconn
            .conn
            .get_selection_owner(xconn.atoms.PRIMARY)
            .context("GetSelectionOwner")?
            .reply()
            .context("GetSelectionOwner (reply)")?
            .owner;

        if cli.continuous && owner != x11rb::NONE && owner != menu_window {
            request_capture(&xconn, menu_window)?;
        } else {
            let deferred = engine
                .acquire(&xconn)
                .map_err(|_| MultiselectError::OwnershipDenied)?;
            pending_events.extend(deferred);
        }

        grab_hotkeys(&xconn, &flags);

        let mut bootstrap = Bootstrap {
            xconn,
            engine,
            controller: InteractionController::new(flags.click, flags.immediate, flags.force),
            list,
            renderer,
            menu_window,
            flash_window,
            menu_visible: false,
            flags,
            helper: cli.external_helper.map(ExternalHelper::new),
            pending_events,
        };

        bootstrap.flash(&["multiselect ready"], FLASH_HIDE_STARTUP)?;
        bootstrap.event_loop()
    }

    fn event_loop(&mut self) -> Result<()> {
        loop {
            let event = match self.pending_events.pop_front() {
                Some(event) => event,
                None => self
                    .xconn
                    .conn
                    .wait_for_event()
                    .context("waiting for X event")?,
            };

            if let Err(err) = self.handle_event(event) {
                warn!(error = %err, "error handling event, continuing");
            }

            if self.controller.exitnext && self.engine.pending().is_none() {
                if self.engine.is_owner() {
                    self.engine.disown_selection(&self.xconn)?;
                }
                return Ok(());
            }
        }
    }

    fn handle_event(&mut self, event: Event) -> Result<()> {
        match event {
            Event::SelectionRequest(ev) => self.on_selection_request(ev),
            Event::SelectionClear(_) => self.on_selection_clear(),
            Event::SelectionNotify(ev) => self.on_selection_notify(ev),
            Event::KeyPress(ev) if ev.event == self.menu_window => self.on_key_press(ev),
            Event::ButtonPress(ev) if ev.event == self.menu_window => self.on_button_press(ev),
            Event::Expose(ref ev) if ev.window == self.menu_window => self.redraw_menu(),
            Event::Expose(ref ev) if ev.window == self.flash_window => Ok(()),
            _ => Ok(()),
        }
    }

    fn on_selection_request(&mut self, ev: x11rb::protocol::xproto::SelectionRequestEvent) -> Result<()> {
        let req = IncomingRequest::from_event(&self.xconn.atoms, &ev);
        let decision = self.engine.on_selection_request(
            req,
            self.flags.click,
            self.menu_visible,
            Instant::now(),
        );
        self.apply_decision(decision, req)
    }

    fn apply_decision(&mut self, decision: Decision, req: IncomingRequest) -> Result<()> {
        match decision {
            Decision::Refuse => self.engine.send_refusal(&self.xconn, &req),
            Decision::ReplyTargets => self.engine.send_targets(&self.xconn, &req),
            Decision::ReplyPayload(index) => {
                self.engine.send_payload(&self.xconn, &req, &self.list, index)
            }
            Decision::RepeatPrevious => {
                let repeat = self.engine.repeat_answer();
                self.apply_decision(repeat, req)
            }
            Decision::OpenMenu => self.show_menu(),
            Decision::RefuseAndOpenMenu => {
                self.engine.send_refusal(&self.xconn, &req)?;
                self.show_menu()
            }
        }
    }

    fn show_menu(&mut self) -> Result<()> {
        self.controller.on_menu_will_show(&self.xconn)?;

        let pointer = self
            .xconn
            .conn
            .query_pointer(self.xconn.root())
            .context("QueryPointer")?
            .reply()
            .context("QueryPointer (reply)")?;
        let height = XcbRenderer::menu_height(self.list.len());
        let width = XcbRenderer::menu_width();
        let (x, y) = XcbRenderer::clamp_to_screen(
            self.xconn.screen(),
            pointer.root_x,
            pointer.root_y,
            width,
            height,
        );
        window::reposition(&self.xconn, self.menu_window, x, y)
            .context("position menu near pointer")?;

        self.xconn
            .conn
            .map_window(self.menu_window)
            .context("map menu window")?;
        self.xconn.conn.flush().context("flush")?;
        self.menu_visible = true;
        self.redraw_menu()
    }

    fn hide_menu(&mut self) -> Result<()> {
        self.xconn
            .conn
            .unmap_window(self.menu_window)
            .context("unmap menu window")?;
        self.xconn.conn.flush().context("flush")?;
        self.menu_visible = false;
        Ok(())
    }

    fn redraw_menu(&mut self) -> Result<()> {
        let height = XcbRenderer::menu_height(self.list.len());
        let width = XcbRenderer::menu_width();
        self.xconn
            .conn
            .configure_window(
                self.menu_window,
                &x11rb::protocol::xproto::ConfigureWindowAux::new()
                    .width(width as u32)
                    .height(height as u32),
            )
            .context("resize menu window")?;

        let cursor = self.list.cursor();
        let labels: Vec<(String, bool)> = (0..self.list.len())
            .map(|i| {
                let (display, _) = self.list.view(i).expect("index in range");
                (display.to_string(), Some(i) == cursor)
            })
            .collect();
        let rows: Vec<MenuRow> = labels
            .iter()
            .map(|(label, highlighted)| MenuRow {
                label,
                highlighted: *highlighted,
            })
            .collect();
        self.renderer
            .draw_menu(&self.xconn, self.menu_window, &MenuView { rows })
    }

    fn on_selection_clear(&mut self) -> Result<()> {
        match self
            .engine
            .on_selection_clear(self.flags.daemon, self.flags.continuous)
        {
            ClearAction::ScheduleExit => {
                self.controller.exitnext = true;
                Ok(())
            }
            ClearAction::RequestCapture => request_capture(&self.xconn, self.menu_window),
            ClearAction::Ignore => Ok(()),
        }
    }

    fn on_selection_notify(&mut self, ev: x11rb::protocol::xproto::SelectionNotifyEvent) -> Result<()> {
        if ev.requestor != self.menu_window || ev.selection != self.xconn.atoms.PRIMARY {
            return Ok(());
        }
        if ev.property == x11rb::NONE {
            info!("no other PRIMARY owner to capture from");
            return self.flash(&["no selection to capture"], FLASH_HIDE_MESSAGE);
        }

        let prop = self
            .xconn
            .conn
            .get_property(
                true,
                self.menu_window,
                ev.property,
                x11rb::protocol::xproto::AtomEnum::NONE,
                0,
                u32::MAX / 4,
            )
            .context("GetProperty(capture)")?
            .reply();
        let Ok(prop) = prop else {
            warn!("failed to read back captured selection property");
            return Ok(());
        };
        let mut text = String::from_utf8_lossy(&prop.value).into_owned();
        while text.ends_with('\0') {
            text.pop();
        }
        if !text.is_empty() {
            let added = self.list.add(text);
            if !added {
                warn!("capture arrived but the list is already full");
            } else {
                self.flash(&["captured a new string"], FLASH_HIDE_CHANGE)?;
            }
        }

        if self.list.len() >= 2 || self.flags.continuous {
            if !self.engine.is_owner() {
                let deferred = self
                    .engine
                    .acquire(&self.xconn)
                    .map_err(|_| MultiselectError::OwnershipDenied)?;
                self.pending_events.extend(deferred);
            }
        }
        Ok(())
    }

    fn on_key_press(&mut self, ev: KeyPressEvent) -> Result<()> {
        let Some(keysym) = self.xconn.keyboard.keysym(ev.detail) else {
            return Ok(());
        };
        let key = classify(keysym);
        let action = dispatch_key(key, self.list.cursor(), self.flags.immediate);
        self.handle_controller_action(action)
    }

    fn on_button_press(&mut self, ev: ButtonPressEvent) -> Result<()> {
        let row = (ev.event_y / crate::renderer::ROW_HEIGHT) as usize;
        self.handle_controller_action(ControllerAction::Pick(row))
    }

    fn handle_controller_action(&mut self, action: ControllerAction) -> Result<()> {
        match action {
            ControllerAction::Capture => {
                if self.list.is_full() {
                    return Ok(());
                }
                let owner = self
                    .xconn
                    .conn
                    .get_selection_owner(self.xconn.atoms.PRIMARY)
                    .context("GetSelectionOwner")?
                    .reply()
                    .context("GetSelectionOwner (reply)")?
                    .owner;
                if owner == x11rb::NONE || owner == self.menu_window {
                    return self.flash(&["select a string first"], FLASH_HIDE_MESSAGE);
                }
                request_capture(&self.xconn, self.menu_window)
            }
            ControllerAction::Cancel | ControllerAction::Refuse => {
                if let Some(pending) = self.engine.take_pending() {
                    self.engine.send_refusal(&self.xconn, &pending)?;
                }
                self.hide_menu()
            }
            ControllerAction::None => Ok(()),
            other => {
                // An out-of-range pick (spec section 4.3: "any other key:
                // picked key = -1, refuse the pending request") must not be
                // a silent no-op: the requestor is still owed a reply.
                let is_pick_attempt = matches!(other, ControllerAction::Pick(_));
                let changes_list = matches!(
                    other,
                    ControllerAction::RemoveAt(_)
                        | ControllerAction::RemoveLast
                        | ControllerAction::Clear
                        | ControllerAction::ClearAndExit
                );

                let picked = self.controller.apply(other, &mut self.list);

                if is_pick_attempt && picked.is_none() {
                    if let Some(pending) = self.engine.take_pending() {
                        self.engine.send_refusal(&self.xconn, &pending)?;
                    }
                    return self.hide_menu();
                }

                self.redraw_menu()?;
                if changes_list {
                    self.flash(&["list changed"], FLASH_HIDE_CHANGE)?;
                }
                match picked {
                    Some(index) => self.on_pick(index),
                    None => Ok(()),
                }
            }
        }
    }

    fn on_pick(&mut self, index: usize) -> Result<()> {
        self.engine.record_choice(index);
        self.hide_menu()?;

        if let Some(helper) = &self.helper {
            if let Some((_, payload)) = self.list.view(index) {
                let requestor = self
                    .engine
                    .pending()
                    .map(|r| r.requestor)
                    .or_else(|| self.controller.saved_focus())
                    .unwrap_or(self.menu_window);
                let requestor_hex = format!("{requestor:#x}");
                if helper.test(&requestor_hex, payload) {
                    helper.paste(&requestor_hex, payload);
                    self.engine.take_pending();
                    self.engine.clear_choice();
                    return Ok(());
                }
            }
        }

        if self.flags.click {
            // The answer is sent on the request the synthetic click
            // provokes (decision rule 4.2.2.7); nothing to send here.
            if self.engine.pending().is_some() || self.flags.force {
                self.controller.replay_middle_click(&self.xconn)?;
            } else {
                self.engine.clear_choice();
            }
            return Ok(());
        }

        if let Some(req) = self.engine.take_pending() {
            self.engine.send_payload(&self.xconn, &req, &self.list, index)?;
        } else if self.flags.force {
            let fabricated = self.fabricate_request();
            self.engine.send_payload(&self.xconn, &fabricated, &self.list, index)?;
        }
        Ok(())
    }

    /// `-f`: build a request as if the currently focused window had asked
    /// for STRING, with no destination property (section 4.4). Its `time`
    /// is `CurrentTime`, which `ProtocolEngine::send_payload`'s staleness
    /// check always treats as valid (DESIGN.md open question 3).
    fn fabricate_request(&self) -> IncomingRequest {
        IncomingRequest {
            requestor: self.menu_window,
            selection: self.xconn.atoms.PRIMARY,
            target: self.xconn.atoms.STRING,
            target_kind: crate::protocol_engine::TargetKind::Str,
            property: None,
            time: 0,
        }
    }

    fn flash(&mut self, lines: &[&str], hide_after: Duration) -> Result<()> {
        let pointer = self
            .xconn
            .conn
            .query_pointer(self.xconn.root())
            .context("QueryPointer")?
            .reply()
            .context("QueryPointer (reply)")?;
        window::reposition(&self.xconn, self.flash_window, pointer.root_x, pointer.root_y)
            .context("position flash window near pointer")?;

        self.xconn
            .conn
            .map_window(self.flash_window)
            .context("map flash window")?;
        self.xconn.conn.flush().context("flush")?;
        self.renderer.draw_flash(
            &self.xconn,
            self.flash_window,
            &crate::renderer::FlashView { lines: lines.to_vec() },
        )?;
        std::thread::sleep(hide_after);
        self.xconn
            .conn
            .unmap_window(self.flash_window)
            .context("unmap flash window")?;
        self.xconn.conn.flush().context("flush")?;
        Ok(())
    }
}

fn request_capture(xconn: &XConn, menu_window: u32) -> Result<()> {
    xconn
        .conn
        .convert_selection(
            menu_window,
            xconn.atoms.PRIMARY,
            xconn.atoms.STRING,
            xconn.atoms._MULTISELECT_CAPTURE,
            x11rb::CURRENT_TIME,
        )
        .context("ConvertSelection")?;
    xconn.conn.flush().context("flush")?;
    Ok(())
}

fn grab_hotkeys(xconn: &XConn, flags: &ModeFlags) {
    use x11rb::protocol::xproto::{GrabMode, ModMask};

    let keysym_for = |ks: u32| -> Option<u8> {
        // Linear scan over the keyboard mapping; fine for the handful of
        // hotkeys this program ever grabs.
        (8..=255u8).find(|&kc| xconn.keyboard.keysym(kc) == Some(ks))
    };

    let mut grabs: Vec<(u8, ModMask)> = Vec::new();
    if flags.daemon {
        if let Some(kc) = keysym_for(b'z' as u32) {
            grabs.push((kc, ModMask::CONTROL | ModMask::SHIFT));
        }
    }
    for (enabled, keysym) in [
        (flags.hotkey_f1, crate::keysyms::XK_F1),
        (flags.hotkey_f2, crate::keysyms::XK_F2),
        (flags.hotkey_f5, crate::keysyms::XK_F5),
    ] {
        if enabled {
            if let Some(kc) = keysym_for(keysym) {
                grabs.push((kc, ModMask::default()));
            }
        }
    }

    for (keycode, modifiers) in grabs {
        let result = xconn.conn.grab_key(
            true,
            xconn.root(),
            modifiers,
            keycode,
            GrabMode::ASYNC,
            GrabMode::ASYNC,
        );
        if result.is_err() {
            warn!(keycode, "failed to grab hotkey");
        }
    }
    debug!("hotkey grabbing complete");
}
