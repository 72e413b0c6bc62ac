//! User-facing output for the installer CLI.
//!
//! Diagnostics go through `log`; these helpers cover the few lines written
//! straight to the terminal, such as a distro's success or failure message.

use std::fmt::Display;
use std::io::Write;

/// Write one line, ignoring write failures.
pub fn write_line(out: &mut dyn Write, message: impl Display) {
    if writeln!(out, "{message}").is_err() {
        // Best-effort output; a closed terminal is not an install failure.
    }
}

/// Write a distro message preceded by a blank line. Empty messages are
/// skipped.
///
/// # Examples
///
/// ```
/// use cast_installer::output::write_distro_message;
///
/// let mut out = Vec::new();
/// write_distro_message(&mut out, "SIFT is ready. Reboot to finish.");
/// write_distro_message(&mut out, "");
/// assert_eq!(out, b"\nSIFT is ready. Reboot to finish.\n");
/// ```
pub fn write_distro_message(out: &mut dyn Write, message: &str) {
    if message.is_empty() {
        return;
    }
    write_line(out, "");
    write_line(out, message);
}
