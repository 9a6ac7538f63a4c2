//! Scheduler lifecycle states and the transition rules between them.

use serde::{Deserialize, Serialize};

use crate::error::CrawlerError;
use crate::scheduler::gen_error;

/// Lifecycle state of a scheduler. The numeric codes are part of the public
/// surface and stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Uninitialized = 0,
    Initializing = 1,
    Initialized = 2,
    Starting = 3,
    Started = 4,
    Stopping = 5,
    Stopped = 6,
}

impl Status {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn description(self) -> &'static str {
        match self {
            Status::Uninitialized => "uninitialized",
            Status::Initializing => "initializing",
            Status::Initialized => "initialized",
            Status::Starting => "starting",
            Status::Started => "started",
            Status::Stopping => "stopping",
            Status::Stopped => "stopped",
        }
    }
}

/// Validates a transition from `current` towards the transient `wanted`
/// state. Rules:
///   1. No external transition while in any `*ing` state.
///   2. `wanted` must itself be one of the `*ing` states.
///   3. An uninitialized scheduler can only move towards initialization.
///   4. A started scheduler can only move towards stopping.
///   5. Stopping requires the scheduler to be started.
pub(crate) fn check_status(current: Status, wanted: Status) -> Result<(), CrawlerError> {
    match current {
        Status::Initializing => return Err(gen_error("the scheduler is being initialized!")),
        Status::Starting => return Err(gen_error("the scheduler is being started!")),
        Status::Stopping => return Err(gen_error("the scheduler is being stopped!")),
        _ => {}
    }
    if current == Status::Uninitialized
        && (wanted == Status::Starting || wanted == Status::Stopping)
    {
        return Err(gen_error("the scheduler has not yet been initialized!"));
    }
    match wanted {
        Status::Initializing | Status::Starting => {
            if current == Status::Started {
                return Err(gen_error("the scheduler has been started!"));
            }
        }
        Status::Stopping => {
            if current != Status::Started {
                return Err(gen_error("the scheduler has not been started!"));
            }
        }
        _ => {
            return Err(gen_error(format!(
                "unsupported wanted status for check! (wantedStatus: {})",
                wanted.code()
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(Status::Uninitialized.code(), 0);
        assert_eq!(Status::Initializing.code(), 1);
        assert_eq!(Status::Initialized.code(), 2);
        assert_eq!(Status::Starting.code(), 3);
        assert_eq!(Status::Started.code(), 4);
        assert_eq!(Status::Stopping.code(), 5);
        assert_eq!(Status::Stopped.code(), 6);
    }

    #[test]
    fn transitions_follow_the_lifecycle_table() {
        use Status::*;
        // Allowed.
        for (current, wanted) in [
            (Uninitialized, Initializing),
            (Initialized, Initializing),
            (Stopped, Initializing),
            (Initialized, Starting),
            (Stopped, Starting),
            (Started, Stopping),
        ] {
            assert!(
                check_status(current, wanted).is_ok(),
                "{:?} -> {:?} should be allowed",
                current,
                wanted
            );
        }
        // Rejected.
        for (current, wanted) in [
            (Uninitialized, Starting),
            (Uninitialized, Stopping),
            (Started, Starting),
            (Started, Initializing),
            (Initialized, Stopping),
            (Stopped, Stopping),
            (Initializing, Initializing),
            (Starting, Stopping),
            (Stopping, Initializing),
            (Initialized, Started),
        ] {
            assert!(
                check_status(current, wanted).is_err(),
                "{:?} -> {:?} should be rejected",
                current,
                wanted
            );
        }
    }
}
