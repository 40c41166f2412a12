//! Stable exit codes for pipeline CLI commands.

use crate::core::types::RunStatus;

/// Command succeeded.
pub const OK: i32 = 0;
/// Command failed (configuration, repository, branch, hosting or completion error).
pub const ERROR: i32 = 1;
/// Change committed but a downstream step (push, publish, description) did not complete.
pub const DEGRADED: i32 = 2;

/// Exit code for a run's terminal status.
pub fn for_status(status: RunStatus) -> i32 {
    match status {
        RunStatus::Success => OK,
        RunStatus::Degraded => DEGRADED,
        RunStatus::Error => ERROR,
    }
}
