//! ============================================================================
//! Core Types for the Portier Call Flow
//! ============================================================================
//! Defines the data carried across webhook callbacks: the per-request call
//! context, the lock action selected by the caller, and the normalized
//! actuator results. None of this is persisted — every callback rebuilds its
//! context from the request alone.
//! ============================================================================

/// Physical action the caller asked for. Wire values match the actuator API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockAction {
    Unlock = 1,
    Lock = 2,
}

impl LockAction {
    /// Parse the `action` query/menu value ("1" or "2").
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "1" => Some(LockAction::Unlock),
            "2" => Some(LockAction::Lock),
            _ => None,
        }
    }

    /// Numeric code sent to the actuator API.
    pub fn code(&self) -> u8 {
        *self as u8
    }
}

/// Tri-state completion reported by the actuator for one actuation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Success,
    Failed,
    Pending,
}

/// Outcome of one status poll, normalized from the actuator's response.
/// Built fresh on every poll; never cached between callbacks.
#[derive(Debug, Clone)]
pub struct ActuationResult {
    /// Whether the actuator accepted the status request at all.
    pub dispatch_succeeded: bool,
    /// Completion state of the underlying lock operation.
    pub completed: Completion,
    /// Actuator error code, e.g. "42" for a jammed motor.
    pub error_code: Option<String>,
    /// Action echoed back by the actuator, used for message wording.
    pub action: Option<LockAction>,
}

impl ActuationResult {
    /// Result shape used when the poll round trip itself fails: the
    /// operation may still complete, so it reads as Pending and feeds the
    /// normal retry budget.
    pub fn pending_after_transport_error(error: String) -> Self {
        Self {
            dispatch_succeeded: false,
            completed: Completion::Pending,
            error_code: Some(error),
            action: None,
        }
    }
}

/// Everything the state machine knows about the current callback.
///
/// The telephony platform keeps no session for us; all call progression is
/// threaded through the redirect URL and the posted form. A `CallContext` is
/// therefore fully reconstructible from one inbound request.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    /// Caller identifier (`From` form field).
    pub from: Option<String>,
    /// Callee identifier (`To` form field).
    pub to: Option<String>,
    /// Raw keypad input for the current step (`Digits` form field).
    pub digits: Option<String>,
    /// Action code from the `action` query parameter.
    pub action: Option<String>,
    /// Actuation request id from `requestId`/`requestIdLast`.
    pub request_id: Option<String>,
    /// True once the poll retry budget is exhausted. Encoded on the wire by
    /// the query parameter name: `requestIdLast` instead of `requestId`.
    pub is_final_attempt: bool,
}

impl CallContext {
    /// Decode the continuation token from one callback's query parameters
    /// and posted form fields.
    pub fn from_params(query: &[(String, String)], form: &[(String, String)]) -> Self {
        let field = |pairs: &[(String, String)], key: &str| {
            pairs
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.clone())
        };

        let (request_id, is_final_attempt) = match field(query, "requestIdLast") {
            Some(id) => (Some(id), true),
            None => (field(query, "requestId"), false),
        };

        Self {
            from: field(form, "From"),
            to: field(form, "To"),
            digits: field(form, "Digits"),
            action: field(query, "action"),
            request_id,
            is_final_attempt,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_action_codes() {
        assert_eq!(LockAction::from_code("1"), Some(LockAction::Unlock));
        assert_eq!(LockAction::from_code("2"), Some(LockAction::Lock));
        assert_eq!(LockAction::from_code("3"), None);
        assert_eq!(LockAction::from_code(""), None);

        assert_eq!(LockAction::Unlock.code(), 1);
        assert_eq!(LockAction::Lock.code(), 2);
    }

    fn pairs(raw: &[(&str, &str)]) -> Vec<(String, String)> {
        raw.iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_context_from_form_fields() {
        let form = pairs(&[("From", "+1555"), ("To", "+1999"), ("Digits", "1")]);
        let ctx = CallContext::from_params(&[], &form);

        assert_eq!(ctx.from.as_deref(), Some("+1555"));
        assert_eq!(ctx.to.as_deref(), Some("+1999"));
        assert_eq!(ctx.digits.as_deref(), Some("1"));
        assert_eq!(ctx.request_id, None);
        assert!(!ctx.is_final_attempt);
    }

    #[test]
    fn test_context_request_id_escalation() {
        let first = pairs(&[("requestId", "42")]);
        let ctx = CallContext::from_params(&first, &[]);
        assert_eq!(ctx.request_id.as_deref(), Some("42"));
        assert!(!ctx.is_final_attempt);

        let last = pairs(&[("requestIdLast", "42")]);
        let ctx = CallContext::from_params(&last, &[]);
        assert_eq!(ctx.request_id.as_deref(), Some("42"));
        assert!(ctx.is_final_attempt);
    }

    #[test]
    fn test_context_action_comes_from_query() {
        let query = pairs(&[("action", "2")]);
        let ctx = CallContext::from_params(&query, &[]);
        assert_eq!(ctx.action.as_deref(), Some("2"));
    }

    #[test]
    fn test_transport_error_reads_as_pending() {
        let result = ActuationResult::pending_after_transport_error("timeout".into());
        assert_eq!(result.completed, Completion::Pending);
        assert!(!result.dispatch_succeeded);
        assert_eq!(result.error_code.as_deref(), Some("timeout"));
    }
}
