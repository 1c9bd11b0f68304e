//! The ordered list of captured strings (spec section 3, section 4.1).

use static_assertions::const_assert;

/// Hard cap on the number of entries. `z`/`F2` capture and CLI ingestion both
/// refuse to grow the list past this.
pub const MAX: usize = 20;

const_assert!(MAX <= 26 + 9); // must fit the a-z/1-9 keyindex space, see keysyms.rs

/// One captured string. `raw` is exactly what the user supplied (or what was
/// captured from another selection owner); `payload` is the suffix after the
/// first occurrence of the configured separator byte, or `raw` itself if no
/// separator is configured or none is present in `raw`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    raw: String,
    payload_start: usize,
}

impl Entry {
    fn new(raw: String, separator: Option<u8>) -> Self {
        let payload_start = match separator {
            Some(sep) => raw
                .as_bytes()
                .iter()
                .position(|&b| b == sep)
                .map(|i| i + 1)
                .unwrap_or(0),
            None => 0,
        };
        Entry { raw, payload_start }
    }

    /// The full string as the user entered it; always what gets displayed.
    pub fn display(&self) -> &str {
        &self.raw
    }

    /// The substring actually transmitted to a requestor.
    pub fn payload(&self) -> &str {
        &self.raw[self.payload_start..]
    }
}

#[derive(Debug, Default)]
pub struct SelectionList {
    entries: Vec<Entry>,
    separator: Option<u8>,
    cursor: Option<usize>,
}

impl SelectionList {
    pub fn new(separator: Option<u8>) -> Self {
        SelectionList {
            entries: Vec::new(),
            separator,
            cursor: None,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= MAX
    }

    /// Appends a new entry. Returns `false` (and does nothing) if the list is
    /// already at `MAX`.
    pub fn add(&mut self, raw: impl Into<String>) -> bool {
        if self.is_full() {
            return false;
        }
        self.entries.push(Entry::new(raw.into(), self.separator));
        self.clamp_cursor();
        true
    }

    /// Removes the entry at `index`, if any. A no-op for an out-of-range
    /// index (this is how the a-z keyindex gap beyond `MAX` stays inert, see
    /// DESIGN.md open question 1).
    pub fn remove(&mut self, index: usize) {
        if index < self.entries.len() {
            self.entries.remove(index);
            self.clamp_cursor();
        }
    }

    pub fn remove_last(&mut self) {
        self.entries.pop();
        self.clamp_cursor();
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.cursor = None;
    }

    /// Returns `(display, payload)` for `index`, or `None` if out of range.
    pub fn view(&self, index: usize) -> Option<(&str, &str)> {
        self.entries.get(index).map(|e| (e.display(), e.payload()))
    }

    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    pub fn set_cursor(&mut self, index: usize) {
        if index < self.entries.len() {
            self.cursor = Some(index);
        }
    }

    /// Moves the cursor by one row, wrapping modulo length. A no-op on an
    /// empty list.
    pub fn move_cursor(&mut self, delta: isize) {
        if self.entries.is_empty() {
            self.cursor = None;
            return;
        }
        let len = self.entries.len() as isize;
        let current = self.cursor.map(|c| c as isize).unwrap_or(0);
        let next = (current + delta).rem_euclid(len);
        self.cursor = Some(next as usize);
    }

    fn clamp_cursor(&mut self) {
        match (self.cursor, self.entries.len()) {
            (_, 0) => self.cursor = None,
            (Some(c), len) if c >= len => self.cursor = Some(len - 1),
            (None, _) => {}
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_equals_raw_without_separator() {
        let mut list = SelectionList::new(None);
        list.add("hello");
        assert_eq!(list.view(0), Some(("hello", "hello")));
    }

    #[test]
    fn payload_splits_on_first_separator() {
        let mut list = SelectionList::new(Some(b':'));
        list.add("k: v");
        assert_eq!(list.view(0), Some(("k: v", " v")));
    }

    #[test]
    fn payload_falls_back_to_raw_when_separator_absent_in_string() {
        let mut list = SelectionList::new(Some(b':'));
        list.add("no-colon-here");
        assert_eq!(list.view(0), Some(("no-colon-here", "no-colon-here")));
    }

    #[test]
    fn add_refuses_past_max() {
        let mut list = SelectionList::new(None);
        for i in 0..MAX {
            assert!(list.add(format!("entry{i}")));
        }
        assert!(!list.add("overflow"));
        assert_eq!(list.len(), MAX);
    }

    #[test]
    fn cursor_clamps_after_removal() {
        let mut list = SelectionList::new(None);
        list.add("a");
        list.add("b");
        list.add("c");
        list.set_cursor(2);
        list.remove(2);
        assert_eq!(list.cursor(), Some(1));
        list.remove(0);
        list.remove(0);
        assert_eq!(list.cursor(), None);
    }

    #[test]
    fn move_cursor_wraps() {
        let mut list = SelectionList::new(None);
        list.add("a");
        list.add("b");
        list.set_cursor(0);
        list.move_cursor(-1);
        assert_eq!(list.cursor(), Some(1));
        list.move_cursor(1);
        assert_eq!(list.cursor(), Some(0));
    }

    #[test]
    fn out_of_range_remove_is_noop() {
        let mut list = SelectionList::new(None);
        list.add("a");
        list.remove(5);
        assert_eq!(list.len(), 1);
    }
}
