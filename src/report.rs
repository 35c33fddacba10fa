//! Operator-facing status reporting.
//!
//! Provisioning runs take minutes, so the orchestrator narrates each phase
//! through an injected [`Reporter`] rather than staying silent until the
//! final result. Tests swap in a recording reporter to assert on the lines.

use std::io::{self, Write};

/// Sink for operator-visible progress lines.
pub trait Reporter {
    /// Emits a single status line.
    fn emit(&self, line: &str);
}

/// Reporter that writes each line to standard output.
#[derive(Clone, Copy, Debug, Default)]
pub struct ConsoleReporter;

impl Reporter for ConsoleReporter {
    fn emit(&self, line: &str) {
        writeln!(io::stdout(), "{line}").ok();
    }
}

/// Reporter that discards every line.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn emit(&self, _line: &str) {}
}
