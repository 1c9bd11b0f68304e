//! Typed errors for the conditions the rest of the program needs to branch
//! on. Everything else travels as `anyhow::Error` with `.context(..)`
//! attached at the call site, matching the teacher's plumbing style.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MultiselectError {
    #[error("failed to open X display")]
    DisplayOpen,

    #[error("another instance is already running")]
    SingletonClash,

    #[error("could not acquire the PRIMARY selection")]
    OwnershipDenied,

    #[error("unsupported selection target requested")]
    UnsupportedTarget,

    #[error("request predates our ownership")]
    StaleTimestamp,

    #[error("failed to read back a selection property")]
    PropertyReadFailed,

    #[error("selection list is full")]
    ListFull,

    #[error("no other owner to capture a selection from")]
    NoOwnerToCapture,

    #[error("failed to grab a hotkey")]
    GrabFailed,
}

impl MultiselectError {
    /// Process exit code for the fatal variants (spec section 6.1). Non-fatal
    /// variants never reach `main`'s top level; they are handled where they
    /// occur and this mapping is only provided for completeness/testing.
    pub fn exit_code(&self) -> i32 {
        match self {
            MultiselectError::DisplayOpen => 2,
            MultiselectError::SingletonClash => 3,
            MultiselectError::OwnershipDenied => 4,
            _ => 1,
        }
    }

    /// True for the error kinds that are fatal at startup; everything else is
    /// handled inline by the caller and the process keeps running.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            MultiselectError::DisplayOpen
                | MultiselectError::SingletonClash
                | MultiselectError::OwnershipDenied
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_kinds_have_distinct_nonzero_codes() {
        assert_eq!(MultiselectError::DisplayOpen.exit_code(), 2);
        assert_eq!(MultiselectError::SingletonClash.exit_code(), 3);
        assert_eq!(MultiselectError::OwnershipDenied.exit_code(), 4);
        assert!(MultiselectError::DisplayOpen.is_fatal());
        assert!(!MultiselectError::ListFull.is_fatal());
    }
}
