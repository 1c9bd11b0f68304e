//! Wrapper around the optional `-e PROG` external helper (spec section 6.3).
//!
//! `PROG` is invoked as a probe (`test`) and, if it agrees to handle the
//! paste, as an action (`paste`). Neither invocation is allowed to take the
//! process down: a missing or non-executable program is logged and treated
//! as "helper declined", matching the non-fatal `GrabFailed`-style policy
//! spec section 7 applies to optional collaborators.

use std::process::Command;

use tracing::warn;

pub struct ExternalHelper {
    program: String,
}

impl ExternalHelper {
    pub fn new(program: impl Into<String>) -> Self {
        ExternalHelper {
            program: program.into(),
        }
    }

    /// Probes whether the helper wants to handle this paste. `false` means
    /// "decline, fall back to normal X send" - including when the program
    /// cannot be run at all.
    pub fn test(&self, requestor_hex: &str, payload: &str) -> bool {
        match Command::new(&self.program)
            .arg("test")
            .arg(requestor_hex)
            .arg(payload)
            .status()
        {
            Ok(status) => status.success(),
            Err(err) => {
                warn!(program = %self.program, error = %err, "external helper probe failed to start");
                false
            }
        }
    }

    /// Fire-and-forget action invocation; its exit status is ignored
    /// (spec section 6.3).
    pub fn paste(&self, requestor_hex: &str, payload: &str) {
        if let Err(err) = Command::new(&self.program)
            .arg("paste")
            .arg(requestor_hex)
            .arg(payload)
            .status()
        {
            warn!(program = %self.program, error = %err, "external helper paste action failed to start");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_program_declines_rather_than_panicking() {
        let helper = ExternalHelper::new("/nonexistent/multiselect-helper-probe");
        assert!(!helper.test("0x1", "payload"));
    }

    #[test]
    fn probe_accepting_true_returns_success() {
        let helper = ExternalHelper::new("true");
        assert!(helper.test("0x1", "payload"));
    }

    #[test]
    fn probe_false_declines() {
        let helper = ExternalHelper::new("false");
        assert!(!helper.test("0x1", "payload"));
    }
}
