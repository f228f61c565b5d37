//! ============================================================================
//! Call Flow State Machine
//! ============================================================================
//! Maps each webhook callback to the directive document the telephony
//! platform should execute next. All call progression is carried in the
//! redirect URLs (continuation token), so every handler is a pure function
//! of its `CallContext` plus one actuator round trip:
//!
//!   Entry -> Ask -> Action -> ActionRequest -> CheckActionResult* -> Hangup
//!
//! The platform itself drives the poll loop: we answer with Pause + Redirect
//! and it calls back after the delay. This process never sleeps.
//! ============================================================================

use anyhow::Result;
use std::sync::Arc;
use tracing::{info, warn};
use url::form_urlencoded;

use crate::actuator::Actuator;
use crate::poll_policy::{self, PollDecision};
use crate::prompts;
use crate::twiml::{GatherSpec, VoiceResponse};
use crate::types::{CallContext, LockAction};

/// One step of the flow, named by the webhook path that reaches it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Entry,
    Ask,
    Action,
    ActionRequest,
    CheckActionResult,
    Version,
}

impl Step {
    /// Webhook path answering this step.
    pub fn path(&self) -> &'static str {
        match self {
            Step::Entry => "/",
            Step::Ask => "/ask",
            Step::Action => "/action",
            Step::ActionRequest => "/actionRequest",
            Step::CheckActionResult => "/checkActionResult",
            Step::Version => "/version",
        }
    }
}

/// Orchestrates the flow. Holds no per-call state.
pub struct CallFlow {
    actuator: Arc<dyn Actuator>,
    version_tag: String,
}

impl CallFlow {
    pub fn new(actuator: Arc<dyn Actuator>, version_tag: &str) -> Self {
        Self {
            actuator,
            version_tag: version_tag.to_string(),
        }
    }

    /// Answer one callback. Errors only on internal invariant violations;
    /// the HTTP layer turns those into [`CallFlow::fallback_apology`].
    pub async fn handle(&self, step: Step, ctx: &CallContext) -> Result<VoiceResponse> {
        match step {
            Step::Entry => self.entry(ctx).await,
            Step::Ask => self.ask(),
            Step::Action => self.action(ctx),
            Step::ActionRequest => self.action_request(ctx).await,
            Step::CheckActionResult => self.check_action_result(ctx).await,
            Step::Version => self.version(),
        }
    }

    /// Terminal document for paths that failed outside the flow proper.
    /// The caller must always hear a closing message, never silence.
    pub fn fallback_apology() -> VoiceResponse {
        VoiceResponse::closing_message(prompts::GENERIC_APOLOGY)
    }

    /// Entry: greet the caller once the actuator acknowledged the call.
    async fn entry(&self, ctx: &CallContext) -> Result<VoiceResponse> {
        let mut response = VoiceResponse::new();

        // Body presence is validated before any dispatch happens.
        let (Some(from), Some(to)) = (ctx.from.as_deref(), ctx.to.as_deref()) else {
            warn!("entry callback without From/To");
            response.say_and_hangup(prompts::GENERIC_APOLOGY)?;
            return Ok(response);
        };

        let outcome = self.actuator.dispatch(from, to).await;
        if !outcome.success {
            let message = outcome
                .error_message
                .as_deref()
                .unwrap_or(prompts::GENERIC_APOLOGY);
            response.say_and_hangup(message)?;
            return Ok(response);
        }

        info!(from, to, "call accepted");
        response.say(prompts::GREETING)?;
        response.gather(GatherSpec {
            num_digits: 1,
            timeout_secs: 2,
            action: Step::Action.path().to_string(),
            action_on_empty_result: false,
        })?;
        response.redirect(Step::Ask.path())?;
        Ok(response)
    }

    /// Ask: menu prompt. An empty gather still posts back, so the caller
    /// is never stranded without a next callback.
    fn ask(&self) -> Result<VoiceResponse> {
        let mut response = VoiceResponse::new();
        response.say(prompts::MENU)?;
        response.gather(GatherSpec {
            num_digits: 1,
            timeout_secs: 5,
            action: Step::Action.path().to_string(),
            action_on_empty_result: true,
        })?;
        Ok(response)
    }

    /// Action: branch on the caller's keypress.
    fn action(&self, ctx: &CallContext) -> Result<VoiceResponse> {
        let mut response = VoiceResponse::new();
        let digits = ctx.digits.as_deref().unwrap_or("");

        match digits {
            "1" | "2" => {
                // from_code cannot fail on these two values
                let action = LockAction::from_code(digits)
                    .ok_or_else(|| anyhow::anyhow!("unreachable digit mapping"))?;
                let url = format!("{}?action={}", Step::ActionRequest.path(), action.code());
                response.say_and_redirect(prompts::choice_confirmed(action), &url)?;
            }
            "" => {
                response.say_and_redirect(prompts::NO_INPUT, Step::Ask.path())?;
            }
            "9" => {
                response.redirect(Step::Version.path())?;
            }
            other => {
                info!(digits = other, "unrecognized menu option");
                response.say_and_hangup(prompts::OPTION_NOT_RECOGNIZED)?;
            }
        }
        Ok(response)
    }

    /// ActionRequest: submit the chosen action, then hand the caller to the
    /// poll loop. Submission is never retried; only polling is.
    async fn action_request(&self, ctx: &CallContext) -> Result<VoiceResponse> {
        let mut response = VoiceResponse::new();

        let Some(action) = ctx.action.as_deref().and_then(LockAction::from_code) else {
            warn!(action = ?ctx.action, "unrecognized action parameter");
            response.say_and_hangup(prompts::ACTION_NOT_RECOGNIZED)?;
            return Ok(response);
        };
        let (Some(from), Some(to)) = (ctx.from.as_deref(), ctx.to.as_deref()) else {
            warn!("action request without From/To");
            response.say_and_hangup(prompts::GENERIC_APOLOGY)?;
            return Ok(response);
        };

        let outcome = self.actuator.request_action(action, from, to).await;
        match outcome.request_id {
            Some(id) if outcome.success => {
                response.say(prompts::COMMAND_SENT)?;
                response.pause(3)?;
                response.redirect(&poll_url(&id, false))?;
            }
            _ => {
                let message = outcome
                    .error_message
                    .as_deref()
                    .unwrap_or(prompts::GENERIC_APOLOGY);
                response.say_and_hangup(message)?;
            }
        }
        Ok(response)
    }

    /// CheckActionResult: one poll, one decision. Retries re-enter this
    /// step through the platform's redirect, with the final-attempt flag
    /// escalated in the continuation token.
    async fn check_action_result(&self, ctx: &CallContext) -> Result<VoiceResponse> {
        let mut response = VoiceResponse::new();

        let Some(request_id) = ctx.request_id.as_deref() else {
            // A missing id means the redirect chain is broken; there is
            // nothing left to poll for.
            warn!("check result callback without request id");
            response.say_and_hangup(prompts::GENERIC_APOLOGY)?;
            return Ok(response);
        };

        let result = self.actuator.poll(request_id).await;
        match poll_policy::decide(&result, ctx.is_final_attempt) {
            PollDecision::Terminate {
                message,
                was_success,
            } => {
                info!(request_id, was_success, "poll loop finished");
                response.say_and_hangup(&message)?;
            }
            PollDecision::Retry {
                delay_secs,
                next_is_final,
                message,
            } => {
                response.say(&message)?;
                response.pause(delay_secs)?;
                response.redirect(&poll_url(request_id, next_is_final))?;
            }
        }
        Ok(response)
    }

    /// Version: speak the deployed tag, mostly a deployment smoke check.
    fn version(&self) -> Result<VoiceResponse> {
        let mut response = VoiceResponse::new();
        response.say_and_hangup(&prompts::version_report(&self.version_tag))?;
        Ok(response)
    }
}

/// Poll-step URL carrying the continuation token. The final-attempt flag is
/// encoded in the parameter name itself: `requestIdLast` marks the budget
/// as spent.
fn poll_url(request_id: &str, is_final_attempt: bool) -> String {
    let key = if is_final_attempt {
        "requestIdLast"
    } else {
        "requestId"
    };
    let query: String = form_urlencoded::Serializer::new(String::new())
        .append_pair(key, request_id)
        .finish();
    format!("{}?{}", Step::CheckActionResult.path(), query)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuator::{ActionOutcome, DispatchOutcome};
    use crate::twiml::VoiceDirective;
    use crate::types::{ActuationResult, Completion};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    /// Scripted actuator double: fixed dispatch/action outcomes plus a
    /// queue of poll results consumed in order.
    struct MockActuator {
        dispatch_outcome: DispatchOutcome,
        action_outcome: ActionOutcome,
        poll_results: Mutex<VecDeque<ActuationResult>>,
        dispatch_called: AtomicBool,
    }

    impl MockActuator {
        fn new() -> Self {
            Self {
                dispatch_outcome: DispatchOutcome {
                    success: true,
                    error_message: None,
                },
                action_outcome: ActionOutcome {
                    success: true,
                    request_id: Some("42".to_string()),
                    error_message: None,
                },
                poll_results: Mutex::new(VecDeque::new()),
                dispatch_called: AtomicBool::new(false),
            }
        }

        fn with_dispatch(mut self, outcome: DispatchOutcome) -> Self {
            self.dispatch_outcome = outcome;
            self
        }

        fn with_action(mut self, outcome: ActionOutcome) -> Self {
            self.action_outcome = outcome;
            self
        }

        fn with_polls(self, results: Vec<ActuationResult>) -> Self {
            *self.poll_results.lock().unwrap() = results.into();
            self
        }
    }

    #[async_trait]
    impl Actuator for MockActuator {
        async fn dispatch(&self, _from: &str, _to: &str) -> DispatchOutcome {
            self.dispatch_called.store(true, Ordering::SeqCst);
            self.dispatch_outcome.clone()
        }

        async fn request_action(
            &self,
            _action: LockAction,
            _from: &str,
            _to: &str,
        ) -> ActionOutcome {
            self.action_outcome.clone()
        }

        async fn poll(&self, _request_id: &str) -> ActuationResult {
            self.poll_results
                .lock()
                .unwrap()
                .pop_front()
                .expect("unexpected poll call")
        }
    }

    fn flow_with(mock: MockActuator) -> (CallFlow, Arc<MockActuator>) {
        let mock = Arc::new(mock);
        (CallFlow::new(mock.clone(), "test"), mock)
    }

    fn entry_ctx() -> CallContext {
        CallContext {
            from: Some("+1555".to_string()),
            to: Some("+1999".to_string()),
            ..Default::default()
        }
    }

    fn say_text(directive: &VoiceDirective) -> &str {
        match directive {
            VoiceDirective::Say { text, .. } => text,
            other => panic!("expected Say, got {:?}", other),
        }
    }

    fn redirect_url(directive: &VoiceDirective) -> &str {
        match directive {
            VoiceDirective::Redirect { url, .. } => url,
            other => panic!("expected Redirect, got {:?}", other),
        }
    }

    fn assert_apology_hangup(response: &VoiceResponse) {
        let directives = response.directives();
        assert_eq!(directives.len(), 2);
        assert_eq!(say_text(&directives[0]), prompts::GENERIC_APOLOGY);
        assert_eq!(directives[1], VoiceDirective::Hangup);
    }

    #[tokio::test]
    async fn test_entry_success_produces_greeting_gather_redirect() {
        let (flow, _) = flow_with(MockActuator::new());
        let response = flow.handle(Step::Entry, &entry_ctx()).await.unwrap();

        let directives = response.directives();
        assert_eq!(directives.len(), 3);
        assert!(say_text(&directives[0]).starts_with("Bienvenue"));
        match &directives[1] {
            VoiceDirective::Gather {
                num_digits,
                timeout_secs,
                action,
                action_on_empty_result,
                ..
            } => {
                assert_eq!(*num_digits, 1);
                assert_eq!(*timeout_secs, 2);
                assert_eq!(action, "/action");
                assert!(!action_on_empty_result);
            }
            other => panic!("expected Gather, got {:?}", other),
        }
        assert_eq!(redirect_url(&directives[2]), "/ask");
    }

    #[tokio::test]
    async fn test_entry_without_caller_fields_skips_dispatch() {
        let (flow, mock) = flow_with(MockActuator::new());
        let ctx = CallContext::default();

        let response = flow.handle(Step::Entry, &ctx).await.unwrap();
        assert_apology_hangup(&response);
        assert!(!mock.dispatch_called.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_entry_speaks_actuator_rejection_verbatim() {
        let mock = MockActuator::new().with_dispatch(DispatchOutcome {
            success: false,
            error_message: Some("Numéro inconnu.".to_string()),
        });
        let (flow, _) = flow_with(mock);

        let response = flow.handle(Step::Entry, &entry_ctx()).await.unwrap();
        let directives = response.directives();
        assert_eq!(directives.len(), 2);
        assert_eq!(say_text(&directives[0]), "Numéro inconnu.");
        assert_eq!(directives[1], VoiceDirective::Hangup);
    }

    #[tokio::test]
    async fn test_entry_network_failure_uses_generic_apology() {
        let mock = MockActuator::new().with_dispatch(DispatchOutcome {
            success: false,
            error_message: None,
        });
        let (flow, _) = flow_with(mock);

        let response = flow.handle(Step::Entry, &entry_ctx()).await.unwrap();
        assert_apology_hangup(&response);
    }

    #[tokio::test]
    async fn test_ask_prompts_and_gathers_on_empty() {
        let (flow, _) = flow_with(MockActuator::new());
        let response = flow.handle(Step::Ask, &CallContext::default()).await.unwrap();

        let directives = response.directives();
        assert_eq!(directives.len(), 2);
        assert_eq!(say_text(&directives[0]), prompts::MENU);
        match &directives[1] {
            VoiceDirective::Gather {
                timeout_secs,
                action,
                action_on_empty_result,
                ..
            } => {
                assert_eq!(*timeout_secs, 5);
                assert_eq!(action, "/action");
                assert!(action_on_empty_result);
            }
            other => panic!("expected Gather, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_action_digit_selects_and_redirects() {
        let (flow, _) = flow_with(MockActuator::new());

        for (digits, code, wording) in
            [("1", 1, "déverrouiller"), ("2", 2, "verrouiller")]
        {
            let ctx = CallContext {
                digits: Some(digits.to_string()),
                ..Default::default()
            };
            let response = flow.handle(Step::Action, &ctx).await.unwrap();

            let directives = response.directives();
            assert_eq!(directives.len(), 2);
            assert!(say_text(&directives[0]).contains(wording));
            assert_eq!(
                redirect_url(&directives[1]),
                &format!("/actionRequest?action={}", code)
            );
        }
    }

    #[tokio::test]
    async fn test_action_empty_input_returns_to_menu() {
        let (flow, _) = flow_with(MockActuator::new());
        let ctx = CallContext {
            digits: Some("".to_string()),
            ..Default::default()
        };

        let response = flow.handle(Step::Action, &ctx).await.unwrap();
        let directives = response.directives();
        assert_eq!(directives.len(), 2);
        assert_eq!(say_text(&directives[0]), prompts::NO_INPUT);
        assert_eq!(redirect_url(&directives[1]), "/ask");
    }

    #[tokio::test]
    async fn test_action_nine_redirects_to_version() {
        let (flow, _) = flow_with(MockActuator::new());
        let ctx = CallContext {
            digits: Some("9".to_string()),
            ..Default::default()
        };

        let response = flow.handle(Step::Action, &ctx).await.unwrap();
        let directives = response.directives();
        assert_eq!(directives.len(), 1);
        assert_eq!(redirect_url(&directives[0]), "/version");
    }

    #[tokio::test]
    async fn test_action_rejects_every_other_digit() {
        let (flow, _) = flow_with(MockActuator::new());

        for digits in ["0", "3", "4", "5", "6", "7", "8", "*", "#", "12"] {
            let ctx = CallContext {
                digits: Some(digits.to_string()),
                ..Default::default()
            };
            let response = flow.handle(Step::Action, &ctx).await.unwrap();

            let directives = response.directives();
            assert_eq!(directives.len(), 2, "digits {:?}", digits);
            assert_eq!(say_text(&directives[0]), prompts::OPTION_NOT_RECOGNIZED);
            assert_eq!(directives[1], VoiceDirective::Hangup, "digits {:?}", digits);
        }
    }

    #[tokio::test]
    async fn test_action_request_success_enters_poll_loop() {
        let (flow, _) = flow_with(MockActuator::new());
        let ctx = CallContext {
            action: Some("1".to_string()),
            ..entry_ctx()
        };

        let response = flow.handle(Step::ActionRequest, &ctx).await.unwrap();
        let directives = response.directives();
        assert_eq!(directives.len(), 3);
        assert_eq!(say_text(&directives[0]), prompts::COMMAND_SENT);
        assert_eq!(directives[1], VoiceDirective::Pause { length_secs: 3 });
        assert_eq!(
            redirect_url(&directives[2]),
            "/checkActionResult?requestId=42"
        );
    }

    #[tokio::test]
    async fn test_action_request_rejects_unknown_action() {
        let (flow, _) = flow_with(MockActuator::new());

        for action in [None, Some("0"), Some("3"), Some("abc")] {
            let ctx = CallContext {
                action: action.map(|s| s.to_string()),
                ..entry_ctx()
            };
            let response = flow.handle(Step::ActionRequest, &ctx).await.unwrap();

            let directives = response.directives();
            assert_eq!(say_text(&directives[0]), prompts::ACTION_NOT_RECOGNIZED);
            assert_eq!(directives[1], VoiceDirective::Hangup);
        }
    }

    #[tokio::test]
    async fn test_action_request_failure_hangs_up_verbatim() {
        let mock = MockActuator::new().with_action(ActionOutcome {
            success: false,
            request_id: None,
            error_message: Some("Accès refusé.".to_string()),
        });
        let (flow, _) = flow_with(mock);
        let ctx = CallContext {
            action: Some("2".to_string()),
            ..entry_ctx()
        };

        let response = flow.handle(Step::ActionRequest, &ctx).await.unwrap();
        let directives = response.directives();
        assert_eq!(say_text(&directives[0]), "Accès refusé.");
        assert_eq!(directives[1], VoiceDirective::Hangup);
    }

    #[tokio::test]
    async fn test_check_result_without_request_id_is_terminal() {
        let (flow, _) = flow_with(MockActuator::new());
        let response = flow
            .handle(Step::CheckActionResult, &CallContext::default())
            .await
            .unwrap();
        assert_apology_hangup(&response);
    }

    #[tokio::test]
    async fn test_check_result_pending_then_success() {
        // First poll pending, second poll success: one escalated redirect,
        // then a success message and hangup.
        let mock = MockActuator::new().with_polls(vec![
            ActuationResult {
                dispatch_succeeded: true,
                completed: Completion::Pending,
                error_code: None,
                action: Some(LockAction::Unlock),
            },
            ActuationResult {
                dispatch_succeeded: true,
                completed: Completion::Success,
                error_code: None,
                action: Some(LockAction::Unlock),
            },
        ]);
        let (flow, _) = flow_with(mock);

        let first_ctx = CallContext {
            request_id: Some("42".to_string()),
            is_final_attempt: false,
            ..Default::default()
        };
        let first = flow
            .handle(Step::CheckActionResult, &first_ctx)
            .await
            .unwrap();
        let directives = first.directives();
        assert_eq!(directives.len(), 3);
        assert_eq!(say_text(&directives[0]), prompts::WAITING);
        assert_eq!(directives[1], VoiceDirective::Pause { length_secs: 5 });
        assert_eq!(
            redirect_url(&directives[2]),
            "/checkActionResult?requestIdLast=42"
        );

        let second_ctx = CallContext {
            request_id: Some("42".to_string()),
            is_final_attempt: true,
            ..Default::default()
        };
        let second = flow
            .handle(Step::CheckActionResult, &second_ctx)
            .await
            .unwrap();
        let directives = second.directives();
        assert_eq!(directives.len(), 2);
        assert!(say_text(&directives[0]).contains("déverrouillée"));
        assert_eq!(directives[1], VoiceDirective::Hangup);
    }

    #[tokio::test]
    async fn test_check_result_final_pending_never_redirects() {
        let mock = MockActuator::new().with_polls(vec![ActuationResult {
            dispatch_succeeded: true,
            completed: Completion::Pending,
            error_code: None,
            action: Some(LockAction::Lock),
        }]);
        let (flow, _) = flow_with(mock);

        let ctx = CallContext {
            request_id: Some("42".to_string()),
            is_final_attempt: true,
            ..Default::default()
        };
        let response = flow.handle(Step::CheckActionResult, &ctx).await.unwrap();

        let directives = response.directives();
        assert_eq!(directives.len(), 2);
        assert_eq!(say_text(&directives[0]), prompts::LOCK_NOT_RESPONDING);
        assert_eq!(directives[1], VoiceDirective::Hangup);
        assert!(!directives
            .iter()
            .any(|d| matches!(d, VoiceDirective::Redirect { .. })));
    }

    #[tokio::test]
    async fn test_check_result_jam_retry_uses_ten_seconds() {
        let jam = ActuationResult {
            dispatch_succeeded: true,
            completed: Completion::Failed,
            error_code: Some("42".to_string()),
            action: Some(LockAction::Lock),
        };
        let mock = MockActuator::new().with_polls(vec![jam.clone(), jam]);
        let (flow, _) = flow_with(mock);

        let ctx = CallContext {
            request_id: Some("7".to_string()),
            is_final_attempt: false,
            ..Default::default()
        };
        let first = flow.handle(Step::CheckActionResult, &ctx).await.unwrap();
        let directives = first.directives();
        assert_eq!(say_text(&directives[0]), prompts::JAM_RETRY);
        assert_eq!(directives[1], VoiceDirective::Pause { length_secs: 10 });
        assert_eq!(
            redirect_url(&directives[2]),
            "/checkActionResult?requestIdLast=7"
        );

        let final_ctx = CallContext {
            is_final_attempt: true,
            ..ctx
        };
        let second = flow
            .handle(Step::CheckActionResult, &final_ctx)
            .await
            .unwrap();
        let directives = second.directives();
        assert_eq!(say_text(&directives[0]), prompts::JAM_FINAL);
        assert_eq!(directives[1], VoiceDirective::Hangup);
    }

    #[tokio::test]
    async fn test_version_speaks_tag_and_hangs_up() {
        let (flow, _) = flow_with(MockActuator::new());
        let response = flow
            .handle(Step::Version, &CallContext::default())
            .await
            .unwrap();

        let directives = response.directives();
        assert_eq!(directives.len(), 2);
        assert_eq!(say_text(&directives[0]), "Version test.");
        assert_eq!(directives[1], VoiceDirective::Hangup);
    }

    #[test]
    fn test_fallback_apology_is_well_formed() {
        let response = CallFlow::fallback_apology();
        assert_apology_hangup(&response);
        assert!(response.is_terminated());
    }

    #[test]
    fn test_poll_url_encodes_opaque_ids() {
        assert_eq!(poll_url("42", false), "/checkActionResult?requestId=42");
        assert_eq!(poll_url("42", true), "/checkActionResult?requestIdLast=42");
        assert_eq!(
            poll_url("a b&c", false),
            "/checkActionResult?requestId=a+b%26c"
        );
    }
}
