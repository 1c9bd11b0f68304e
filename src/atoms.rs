//! Interned X atoms used by the selection protocol.

x11rb::atom_manager! {
    pub Atoms: AtomsCookie {
        PRIMARY,
        STRING,
        UTF8_STRING,
        TARGETS,
        ATOM,
        CARDINAL,
        CURSOR,
        CUT_BUFFER0,
        WM_CLASS,
        WM_PROTOCOLS,
        WM_DELETE_WINDOW,
        WM_NAME,
        _NET_WM_PID,
        _NET_WM_NAME,
        _NET_WM_WINDOW_TYPE,
        _NET_WM_WINDOW_TYPE_DROPDOWN_MENU,
        _NET_WM_WINDOW_TYPE_TOOLTIP,

        // Firefox (and some other Mozilla-derived clients) probe this target
        // before the real one, as a sentinel for "do you support plain text".
        FIREFOX_SENTINEL: b"text/x-moz-text-internal",

        // Legacy Xt clients that never set a destination property rely on
        // this well-known fallback atom instead.
        _XT_SELECTION_1,

        // Private property used only for the zero-length-append
        // "time-for-now" trick (see xconn::XConn::current_time).
        _MULTISELECT_TIME,

        // Destination property for our own outgoing ConvertSelection
        // requests when capturing another owner's selection (section 4.5).
        _MULTISELECT_CAPTURE,
    }
}
