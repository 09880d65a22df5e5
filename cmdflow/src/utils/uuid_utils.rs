//! UUID generation for run identifiers.

use uuid::Uuid;

/// Generates a new UUID v7 (time-ordered).
///
/// Run ids sort by start time, which keeps log lines from consecutive runs
/// in order.
#[must_use]
pub fn generate_run_id() -> Uuid {
    Uuid::now_v7()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_id_is_v7() {
        assert_eq!(generate_run_id().get_version_num(), 7);
    }

    #[test]
    fn test_run_ids_are_unique() {
        assert_ne!(generate_run_id(), generate_run_id());
    }
}
