//! Backend-specific identities derived from a logical service name.
//!
//! New installs always use the current scheme. Lookups also consider the
//! legacy launchd label written by earlier releases so those jobs stay
//! controllable until they are uninstalled.

use crate::error::{Result, ServiceError};

pub const LAUNCHD_PREFIX: &str = "com.checkpoint.";
pub const LEGACY_LAUNCHD_PREFIX: &str = "com.claudecode.backup.";
pub const SYSTEMD_PREFIX: &str = "checkpoint-";
pub const CRON_MARKER_PREFIX: &str = "# checkpoint:";

/// Reject names that cannot be embedded safely in labels, unit names and
/// crontab markers.
pub fn validate_service_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(ServiceError::InvalidServiceName(name.to_string()))
    }
}

#[inline]
pub fn launchd_label(name: &str) -> String {
    format!("{LAUNCHD_PREFIX}{name}")
}

#[inline]
pub fn legacy_launchd_label(name: &str) -> String {
    format!("{LEGACY_LAUNCHD_PREFIX}{name}")
}

#[inline]
pub fn systemd_service_unit(name: &str) -> String {
    format!("{SYSTEMD_PREFIX}{name}.service")
}

#[inline]
pub fn systemd_timer_unit(name: &str) -> String {
    format!("{SYSTEMD_PREFIX}{name}.timer")
}

#[inline]
pub fn cron_marker(name: &str) -> String {
    format!("{CRON_MARKER_PREFIX}{name}")
}

/// Which launchd naming scheme an artifact was found under
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelScheme {
    Current,
    Legacy,
}

impl LabelScheme {
    pub fn label(self, name: &str) -> String {
        match self {
            LabelScheme::Current => launchd_label(name),
            LabelScheme::Legacy => legacy_launchd_label(name),
        }
    }
}

/// Pick the launchd label to operate on.
///
/// The current label wins when present; the legacy label is used only when
/// it is the sole one present.
pub fn resolve_launchd_label(name: &str, present: impl Fn(&str) -> bool) -> Option<LabelScheme> {
    if present(&launchd_label(name)) {
        Some(LabelScheme::Current)
    } else if present(&legacy_launchd_label(name)) {
        Some(LabelScheme::Legacy)
    } else {
        None
    }
}

/// Service name carried by a crontab line's trailing marker, if any
pub fn cron_marker_name(line: &str) -> Option<&str> {
    let (_, tail) = line.rsplit_once(CRON_MARKER_PREFIX)?;
    let name = tail.trim_end();
    (!name.is_empty() && !name.contains(char::is_whitespace)).then_some(name)
}

/// Recover the logical service name from one raw `list` line.
///
/// Accepted shapes: `com.checkpoint.X`, `com.claudecode.backup.X`,
/// `checkpoint-X[.service|.timer]` and `... # checkpoint:X`.
pub fn parse_service_name(line: &str) -> Result<String> {
    let unrecognized = || ServiceError::ParseFailed(line.trim().to_string());

    if let Some(name) = cron_marker_name(line) {
        return Ok(name.to_string());
    }

    for token in line.split_whitespace() {
        let name = if let Some(rest) = token.strip_prefix(LEGACY_LAUNCHD_PREFIX) {
            rest
        } else if let Some(rest) = token.strip_prefix(LAUNCHD_PREFIX) {
            rest
        } else if let Some(rest) = token.strip_prefix(SYSTEMD_PREFIX) {
            rest.strip_suffix(".service")
                .or_else(|| rest.strip_suffix(".timer"))
                .unwrap_or(rest)
        } else {
            continue;
        };
        return if validate_service_name(name).is_ok() {
            Ok(name.to_string())
        } else {
            Err(unrecognized())
        };
    }

    Err(unrecognized())
}
