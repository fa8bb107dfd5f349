//! Diagnostic output for instrumentation failures
//!
//! Every failure in the capture path (cache load/save, wrapping, recording) is
//! non-fatal. It is reported on stderr with a fixed tag so it can be told apart
//! from the host program's own output, and mirrored to `tracing` at warn level.
//! Status lines such as the startup notice use the same tag at info level.

/// Tag prefixed to every diagnostic line
pub const TAG: &str = "[muestreo]";

/// Report a non-fatal failure on stderr
pub fn report(message: impl AsRef<str>) {
    let message = message.as_ref();
    eprintln!("{}", format_line(message));
    tracing::warn!(target: "muestreo", "{}", message);
}

/// Print a tagged status line on stderr
pub fn notice(message: impl AsRef<str>) {
    let message = message.as_ref();
    eprintln!("{}", format_line(message));
    tracing::info!(target: "muestreo", "{}", message);
}

/// Format a diagnostic line without printing it
pub fn format_line(message: &str) -> String {
    format!("{} {}", TAG, message)
}
