//! The ICCCM selection-owner state machine (spec section 4.2).
//!
//! The decision tree (`on_selection_request`) is kept free of any X I/O so
//! it can be exercised with hand-built requests in unit tests, the way the
//! scenarios in spec section 8 are written. Everything that actually talks
//! to the server - acquiring ownership, writing replies - lives in the
//! second `impl` block below and takes an `&XConn`.

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::{debug, info, warn};
use x11rb::connection::Connection;
use x11rb::protocol::xproto::{
    AtomEnum, ConnectionExt, EventMask, PropMode, SelectionNotifyEvent, SelectionRequestEvent,
};

use crate::atoms::Atoms;
use crate::selection_list::SelectionList;
use crate::xconn::XConn;

/// Grace period within which a repeated request gets the same answer as its
/// predecessor (spec section 4.2.2, rule 8). Some requestors (xterm, opera,
/// firefox) are known to fire a duplicate request immediately.
pub const SHORT_INTERVAL: Duration = Duration::from_millis(80);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    Str,
    Utf8Str,
    Targets,
    FirefoxSentinel,
    Unsupported,
}

pub fn classify_target(atoms: &Atoms, target: u32) -> TargetKind {
    if target == atoms.TARGETS {
        TargetKind::Targets
    } else if target == atoms.STRING {
        TargetKind::Str
    } else if target == atoms.UTF8_STRING {
        TargetKind::Utf8Str
    } else if target == atoms.FIREFOX_SENTINEL {
        TargetKind::FirefoxSentinel
    } else {
        TargetKind::Unsupported
    }
}

/// A `SelectionRequest` reduced to the fields the decision tree cares about.
/// Built from the raw `x11rb` event at the call site so the decision tree
/// itself has no X dependency.
#[derive(Debug, Clone, Copy)]
pub struct IncomingRequest {
    pub requestor: u32,
    pub selection: u32,
    pub target: u32,
    pub target_kind: TargetKind,
    /// `None` means the requestor left `property` unset (`NONE`), the
    /// obsolete-client case handled by the destination-property fallback.
    pub property: Option<u32>,
    /// `0` means `CurrentTime`.
    pub time: u32,
}

impl IncomingRequest {
    pub fn from_event(atoms: &Atoms, event: &SelectionRequestEvent) -> Self {
        let target_kind = classify_target(atoms, event.target);
        IncomingRequest {
            requestor: event.requestor,
            selection: event.selection,
            target: event.target,
            target_kind,
            property: (event.property != x11rb::NONE).then_some(event.property),
            time: event.time,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Answer {
    Refused,
    Payload(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Refuse the request outright; no menu involved.
    Refuse,
    /// Answer with the fixed `{STRING, UTF8_STRING}` TARGETS list.
    ReplyTargets,
    /// Answer immediately by sending `SelectionList` entry `index`.
    ReplyPayload(usize),
    /// Resend whatever we answered last time, verbatim.
    RepeatPrevious,
    /// Store the request as pending and pop the menu open.
    OpenMenu,
    /// Refuse this specific request (click mode answers on the *next*,
    /// synthetic-click-provoked request) but still pop the menu open.
    RefuseAndOpenMenu,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnershipState {
    NotOwner,
    Owner { since: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearAction {
    ScheduleExit,
    RequestCapture,
    Ignore,
}

/// The state machine itself. Holds everything from spec section 3 except
/// `SelectionList`, which is owned separately and passed in where needed.
pub struct ProtocolEngine {
    self_window: u32,
    ownership: OwnershipState,
    pending: Option<IncomingRequest>,
    last_served_at: Option<Instant>,
    last_answer: Option<Answer>,
    /// Set when a pre-paste sentinel request (Firefox's
    /// `text/x-moz-text-internal` probe) has been seen and not yet resolved.
    firefox: bool,
    /// The index the user picked, consumed by the next request that can use
    /// it (click-mode synthetic-click answer, or the firefox second-request
    /// answer).
    choice: Option<usize>,
}

impl ProtocolEngine {
    pub fn new(self_window: u32) -> Self {
        ProtocolEngine {
            self_window,
            ownership: OwnershipState::NotOwner,
            pending: None,
            last_served_at: None,
            last_answer: None,
            firefox: false,
            choice: None,
        }
    }

    pub fn ownership(&self) -> OwnershipState {
        self.ownership
    }

    pub fn is_owner(&self) -> bool {
        matches!(self.ownership, OwnershipState::Owner { .. })
    }

    pub fn pending(&self) -> Option<&IncomingRequest> {
        self.pending.as_ref()
    }

    pub fn take_pending(&mut self) -> Option<IncomingRequest> {
        self.pending.take()
    }

    /// Called once the user has picked an entry in the menu (any mode).
    pub fn record_choice(&mut self, index: usize) {
        self.choice = Some(index);
    }

    pub fn clear_choice(&mut self) {
        self.choice = None;
    }

    /// The core decision tree, spec section 4.2.2. `menu_visible` reflects
    /// whether the menu window is currently mapped (a previous request is
    /// still awaiting a human decision).
    pub fn on_selection_request(
        &mut self,
        req: IncomingRequest,
        click_mode: bool,
        menu_visible: bool,
        now: Instant,
    ) -> Decision {
        // 1. never serve ourselves.
        if req.requestor == self.self_window {
            return Decision::Refuse;
        }

        // 2. TARGETS is always answered, and doesn't touch the repeat cache.
        if req.target_kind == TargetKind::Targets {
            return Decision::ReplyTargets;
        }

        // 3. firefox sentinel: latch, then fall through to the unsupported
        // refusal below (the sentinel itself is never STRING/UTF8).
        if !click_mode && req.target_kind == TargetKind::FirefoxSentinel {
            self.firefox = true;
        }

        // 4. unsupported targets (including the sentinel we just latched).
        if !matches!(req.target_kind, TargetKind::Str | TargetKind::Utf8Str) {
            return self.record_answer(Answer::Refused, now);
        }

        // 5. a previous request is still awaiting a human decision.
        if menu_visible {
            return Decision::Refuse;
        }

        // 6. firefox's second (real) request: answer with what was chosen
        // for its first, sentinel-only, probe.
        if self.firefox {
            self.firefox = false;
            if let Some(index) = self.choice.take() {
                return self.record_answer(Answer::Payload(index), now);
            }
        }

        // 7. click mode: the synthetic middle-click has provoked a fresh
        // request; answer it with whatever the user already picked.
        if click_mode {
            if let Some(index) = self.choice.take() {
                self.pending = None;
                return self.record_answer(Answer::Payload(index), now);
            }
        }

        // 8. repeat-within-window: duplicate requests get identical answers.
        if let Some(last) = self.last_served_at {
            if now.saturating_duration_since(last) <= SHORT_INTERVAL {
                return Decision::RepeatPrevious;
            }
        }

        // 9. nothing to answer with yet: remember the request and pop the
        // menu open. In click mode we must also refuse this specific
        // request; the real answer arrives on the request the synthetic
        // click provokes.
        self.pending = Some(req);
        if click_mode {
            Decision::RefuseAndOpenMenu
        } else {
            Decision::OpenMenu
        }
    }

    fn record_answer(&mut self, answer: Answer, now: Instant) -> Decision {
        self.last_served_at = Some(now);
        self.last_answer = Some(answer);
        match answer {
            Answer::Refused => Decision::Refuse,
            Answer::Payload(index) => Decision::ReplyPayload(index),
        }
    }

    /// What to repeat for `Decision::RepeatPrevious`.
    pub fn repeat_answer(&self) -> Decision {
        match self.last_answer {
            Some(Answer::Refused) | None => Decision::Refuse,
            Some(Answer::Payload(index)) => Decision::ReplyPayload(index),
        }
    }

    /// SelectionClear handling (spec section 4.2.5). See DESIGN.md open
    /// question 2 for why `continuous` is checked first.
    pub fn on_selection_clear(&mut self, daemon: bool, continuous: bool) -> ClearAction {
        self.ownership = OwnershipState::NotOwner;
        self.pending = None;
        if continuous {
            ClearAction::RequestCapture
        } else if daemon {
            ClearAction::Ignore
        } else {
            ClearAction::ScheduleExit
        }
    }

    pub fn set_owner(&mut self, since: u32) {
        self.ownership = OwnershipState::Owner { since };
    }

    pub fn disown(&mut self) {
        self.ownership = OwnershipState::NotOwner;
    }
}

// ---------------------------------------------------------------------
// X I/O: acquiring ownership and writing actual replies.
// ---------------------------------------------------------------------

impl ProtocolEngine {
    /// Acquires PRIMARY, verifies we actually got it, stamps `since` via the
    /// time-for-now trick, and clears `CUT_BUFFER0` (section 6.2) so clients
    /// that fall back to cut buffers after a refusal don't see stale data.
    pub fn acquire(
        &mut self,
        xconn: &XConn,
    ) -> Result<Vec<x11rb::protocol::Event>> {
        let (time, deferred) = xconn.current_time(self.self_window)?;
        xconn
            .conn
            .set_selection_owner(self.self_window, xconn.atoms.PRIMARY, time)
            .context("SetSelectionOwner")?
            .check()
            .context("SetSelectionOwner (check)")?;

        let owner = xconn
            .conn
            .get_selection_owner(xconn.atoms.PRIMARY)
            .context("GetSelectionOwner")?
            .reply()
            .context("GetSelectionOwner (reply)")?
            .owner;
        if owner != self.self_window {
            return Err(crate::error::MultiselectError::OwnershipDenied.into());
        }

        xconn
            .conn
            .delete_property(xconn.root(), xconn.atoms.CUT_BUFFER0)
            .context("clear CUT_BUFFER0")?;

        self.set_owner(time);
        info!(since = time, "acquired PRIMARY selection");
        Ok(deferred)
    }

    pub fn disown_selection(&mut self, xconn: &XConn) -> Result<()> {
        xconn
            .conn
            .set_selection_owner(x11rb::NONE, xconn.atoms.PRIMARY, x11rb::CURRENT_TIME)
            .context("SetSelectionOwner(None)")?;
        self.disown();
        Ok(())
    }

    pub fn send_targets(&mut self, xconn: &XConn, req: &IncomingRequest) -> Result<()> {
        let property = destination_property(xconn, req);
        let targets = [xconn.atoms.STRING, xconn.atoms.UTF8_STRING];
        xconn
            .conn
            .change_property32(
                PropMode::REPLACE,
                req.requestor,
                property,
                xconn.atoms.ATOM,
                &targets,
            )
            .context("write TARGETS property")?;
        notify(xconn, req, Some(property))
    }

    pub fn send_payload(
        &mut self,
        xconn: &XConn,
        req: &IncomingRequest,
        list: &SelectionList,
        index: usize,
    ) -> Result<()> {
        if req.time != 0 {
            if let OwnershipState::Owner { since } = self.ownership {
                if req.time < since {
                    debug!(requestor = req.requestor, "refusing stale request");
                    return self.send_refusal(xconn, req);
                }
            }
        }

        let Some((_, payload)) = list.view(index) else {
            return self.send_refusal(xconn, req);
        };
        let property = destination_property(xconn, req);
        let type_atom = if req.target_kind == TargetKind::Utf8Str {
            xconn.atoms.UTF8_STRING
        } else {
            AtomEnum::STRING.into()
        };
        xconn
            .conn
            .change_property8(
                PropMode::REPLACE,
                req.requestor,
                property,
                type_atom,
                payload.as_bytes(),
            )
            .context("write selection payload")?;
        notify(xconn, req, Some(property))?;
        self.record_answer(Answer::Payload(index), Instant::now());
        Ok(())
    }

    /// Every real serve (send or refuse) feeds the repeat cache, not just the
    /// synchronous answers `on_selection_request` records inline (rules 2,
    /// 4, 6, 7): a duplicate request arriving right after a *deferred*
    /// answer - sent once the user finally picks, or once an invalid key
    /// refuses the pending request - must still get rule 8's repeat
    /// treatment instead of falling through to rule 9 and reopening the
    /// menu.
    pub fn send_refusal(&mut self, xconn: &XConn, req: &IncomingRequest) -> Result<()> {
        warn!(requestor = req.requestor, target = req.target, "refusing selection request");
        notify(xconn, req, None)?;
        self.record_answer(Answer::Refused, Instant::now());
        Ok(())
    }
}

/// Resolves the destination property per the three-tier fallback in spec
/// section 4.2.3: the requestor's chosen property, else its target atom,
/// else the legacy `_XT_SELECTION_1` atom for ancient Xt clients that supply
/// neither.
fn destination_property(xconn: &XConn, req: &IncomingRequest) -> u32 {
    match req.property {
        Some(p) => p,
        None if req.target != x11rb::NONE => req.target,
        None => xconn.atoms._XT_SELECTION_1,
    }
}

fn notify(xconn: &XConn, req: &IncomingRequest, property: Option<u32>) -> Result<()> {
    let event = SelectionNotifyEvent {
        response_type: x11rb::protocol::xproto::SELECTION_NOTIFY_EVENT,
        sequence: 0,
        time: req.time,
        requestor: req.requestor,
        selection: req.selection,
        target: req.target,
        property: property.unwrap_or(x11rb::NONE),
    };
    xconn
        .conn
        .send_event(false, req.requestor, EventMask::NO_EVENT, &event)
        .context("send SelectionNotify")?;
    xconn.conn.flush().context("flush")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(requestor: u32, kind: TargetKind, time: u32) -> IncomingRequest {
        IncomingRequest {
            requestor,
            selection: 1,
            target: 2,
            target_kind: kind,
            property: Some(3),
            time,
        }
    }

    #[test]
    fn refuses_requests_from_self() {
        let mut engine = ProtocolEngine::new(42);
        let d = engine.on_selection_request(req(42, TargetKind::Str, 0), false, false, Instant::now());
        assert_eq!(d, Decision::Refuse);
    }

    #[test]
    fn targets_always_answered_and_not_cached() {
        let mut engine = ProtocolEngine::new(42);
        let d = engine.on_selection_request(req(7, TargetKind::Targets, 0), false, false, Instant::now());
        assert_eq!(d, Decision::ReplyTargets);
        assert!(engine.last_served_at.is_none());
    }

    #[test]
    fn unsupported_target_is_refused_and_cached() {
        let mut engine = ProtocolEngine::new(42);
        let now = Instant::now();
        let d = engine.on_selection_request(req(7, TargetKind::Unsupported, 0), false, false, now);
        assert_eq!(d, Decision::Refuse);

        // repeat within the short window gets the same refusal
        let d2 = engine.on_selection_request(
            req(7, TargetKind::Unsupported, 0),
            false,
            false,
            now + Duration::from_millis(10),
        );
        assert_eq!(d2, Decision::RepeatPrevious);
        assert_eq!(engine.repeat_answer(), Decision::Refuse);
    }

    #[test]
    fn first_request_opens_menu_and_is_pending() {
        let mut engine = ProtocolEngine::new(42);
        let d = engine.on_selection_request(req(7, TargetKind::Str, 0), false, false, Instant::now());
        assert_eq!(d, Decision::OpenMenu);
        assert!(engine.pending().is_some());
    }

    #[test]
    fn click_mode_defers_and_refuses_first_request() {
        let mut engine = ProtocolEngine::new(42);
        let d = engine.on_selection_request(req(7, TargetKind::Str, 0), true, false, Instant::now());
        assert_eq!(d, Decision::RefuseAndOpenMenu);
    }

    #[test]
    fn click_mode_answers_provoked_request_with_choice() {
        let mut engine = ProtocolEngine::new(42);
        let now = Instant::now();
        let _ = engine.on_selection_request(req(7, TargetKind::Str, 0), true, false, now);
        engine.record_choice(3);
        let d = engine.on_selection_request(
            req(7, TargetKind::Str, 0),
            true,
            false,
            now + Duration::from_millis(200),
        );
        assert_eq!(d, Decision::ReplyPayload(3));
    }

    #[test]
    fn firefox_sentinel_latches_then_answers_second_request() {
        let mut engine = ProtocolEngine::new(42);
        let now = Instant::now();
        let d1 = engine.on_selection_request(
            req(7, TargetKind::FirefoxSentinel, 0),
            false,
            false,
            now,
        );
        assert_eq!(d1, Decision::Refuse);
        engine.record_choice(1);
        let d2 = engine.on_selection_request(
            req(7, TargetKind::Str, 0),
            false,
            false,
            now + Duration::from_millis(500),
        );
        assert_eq!(d2, Decision::ReplyPayload(1));
    }

    #[test]
    fn menu_visible_refuses_new_requests() {
        let mut engine = ProtocolEngine::new(42);
        let d = engine.on_selection_request(req(7, TargetKind::Str, 0), false, true, Instant::now());
        assert_eq!(d, Decision::Refuse);
    }

    #[test]
    fn selection_clear_continuous_overrides_non_daemon_exit() {
        let mut engine = ProtocolEngine::new(42);
        engine.set_owner(100);
        assert_eq!(engine.on_selection_clear(false, true), ClearAction::RequestCapture);
    }

    #[test]
    fn selection_clear_daemon_ignores() {
        let mut engine = ProtocolEngine::new(42);
        engine.set_owner(100);
        assert_eq!(engine.on_selection_clear(true, false), ClearAction::Ignore);
    }

    #[test]
    fn selection_clear_plain_schedules_exit() {
        let mut engine = ProtocolEngine::new(42);
        engine.set_owner(100);
        assert_eq!(engine.on_selection_clear(false, false), ClearAction::ScheduleExit);
    }
}
