//! Stage fixtures built on `sh`.

use crate::core::CommandSpec;
use std::path::Path;

/// A stage running `script` under `sh -c`.
#[must_use]
pub fn sh(script: impl Into<String>) -> CommandSpec {
    CommandSpec::new("sh").arg("-c").arg(script)
}

/// A stage that sleeps for `secs` seconds and exits successfully.
#[must_use]
pub fn sleep_stage(secs: f64) -> CommandSpec {
    CommandSpec::new("sleep").arg(secs.to_string())
}

/// A stage that writes `message` to stderr and exits with `code`.
#[must_use]
pub fn failing_stage(code: i32, message: &str) -> CommandSpec {
    sh(format!("printf '%s' '{}' >&2; exit {code}", message.replace('\'', r"'\''")))
}

/// A stage that sleeps for `secs` seconds and then creates `marker`.
///
/// If the marker never appears, the stage was terminated before it finished.
#[must_use]
pub fn marker_stage(secs: f64, marker: &Path) -> CommandSpec {
    sh(format!(
        "sleep {secs}; touch '{}'",
        marker.display().to_string().replace('\'', r"'\''")
    ))
}

/// A stage that copies stdin to stdout.
#[must_use]
pub fn cat() -> CommandSpec {
    CommandSpec::new("cat")
}
