//! ============================================================================
//! Poll Policy - Retry/Terminate Decisions for the Result Loop
//! ============================================================================
//! Pure decision function over one actuator poll result. The budget is
//! deliberately strict: both a pending operation and a jammed motor get
//! exactly one retry before the call is closed with a spoken message, which
//! bounds call duration at the cost of sometimes telling an impatient caller
//! to contact a human.
//! ============================================================================

use tracing::error;

use crate::prompts;
use crate::types::{ActuationResult, Completion, LockAction};

/// Actuator error code for a mechanically obstructed lock motor.
pub const JAM_ERROR_CODE: &str = "42";

/// Delay before re-polling after a jam report.
pub const JAM_RETRY_DELAY_SECS: u32 = 10;

/// Delay before re-polling a still-pending operation.
pub const PENDING_RETRY_DELAY_SECS: u32 = 5;

/// What the call flow should do with a poll result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollDecision {
    /// Speak `message`, then hang up.
    Terminate { message: String, was_success: bool },
    /// Speak `message`, pause `delay_secs`, redirect back to the poll step
    /// carrying `next_is_final` in the continuation token.
    Retry {
        delay_secs: u32,
        next_is_final: bool,
        message: String,
    },
}

impl PollDecision {
    fn terminate(message: &str, was_success: bool) -> Self {
        PollDecision::Terminate {
            message: message.to_string(),
            was_success,
        }
    }

    fn retry(delay_secs: u32, message: &str) -> Self {
        PollDecision::Retry {
            delay_secs,
            // Both retryable causes get a single extra attempt.
            next_is_final: true,
            message: message.to_string(),
        }
    }
}

/// Decide the next step for one poll result. First matching rule wins.
pub fn decide(result: &ActuationResult, is_final_attempt: bool) -> PollDecision {
    match result.completed {
        Completion::Success => {
            PollDecision::terminate(prompts::operation_succeeded(result.action), true)
        }

        Completion::Failed => {
            let jammed = result.error_code.as_deref() == Some(JAM_ERROR_CODE);
            match (jammed, result.action) {
                // Jam while locking: eligible for one retry.
                (true, Some(LockAction::Lock)) => {
                    if is_final_attempt {
                        PollDecision::terminate(prompts::JAM_FINAL, false)
                    } else {
                        PollDecision::retry(JAM_RETRY_DELAY_SECS, prompts::JAM_RETRY)
                    }
                }
                // Non-jam failures are not transient, no retry.
                (false, _) => PollDecision::terminate(prompts::OPERATION_FAILED, false),
                // Jam code outside a lock operation should not happen.
                (true, action) => {
                    error!(
                        error_code = JAM_ERROR_CODE,
                        ?action,
                        "invariant violation: jam code on a non-lock result"
                    );
                    PollDecision::terminate(prompts::GENERIC_APOLOGY, false)
                }
            }
        }

        Completion::Pending => {
            if is_final_attempt {
                PollDecision::terminate(prompts::LOCK_NOT_RESPONDING, false)
            } else {
                PollDecision::retry(PENDING_RETRY_DELAY_SECS, prompts::WAITING)
            }
        }
    }
}
