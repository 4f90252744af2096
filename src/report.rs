//! Pass/fail check lines.

use tracing::{error, info};

/// Column width the check labels are padded to.
pub const LABEL_WIDTH: usize = 35;

/// Returns the marker printed after a check label.
#[must_use]
pub const fn marker(passed: bool) -> &'static str {
    if passed { "[PASS]" } else { "[FAIL]" }
}

/// Formats a check line with the label padded to [`LABEL_WIDTH`].
///
/// ```
/// use offsite::report::check_line;
///
/// assert_eq!(check_line("Rsync installed", true), format!("{:<35}[PASS]", "Rsync installed"));
/// ```
#[must_use]
pub fn check_line(label: &str, passed: bool) -> String {
    format!("{label:<LABEL_WIDTH$}{}", marker(passed))
}

/// Logs a check line, at error level when the check failed.
pub fn log_check(label: &str, passed: bool) {
    let line = check_line(label, passed);
    if passed {
        info!("{line}");
    } else {
        error!("{line}");
    }
}
