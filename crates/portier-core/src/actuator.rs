//! ============================================================================
//! Actuator Client - Lock-Control Service Binding
//! ============================================================================
//! Talks to the external actuator service that physically operates the lock:
//! - Announces an incoming call (`/api/phone`)
//! - Requests an unlock/lock action (`/api/phone/action`)
//! - Polls an action's completion status (`/api/requests/{id}`)
//!
//! Transport failures are normalized here: dispatch/request failures become
//! failure outcomes, poll failures read as Pending so the retry budget
//! governs termination. Callers never see a raw reqwest error.
//! ============================================================================

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::types::{ActuationResult, Completion, LockAction};

/// Round-trip budget for one actuator call. Hitting it is handled exactly
/// like a network failure.
const ACTUATOR_TIMEOUT: Duration = Duration::from_secs(5);

/// Result of announcing the call to the actuator.
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    pub success: bool,
    /// Actuator-reported message, safe to speak to the caller verbatim.
    pub error_message: Option<String>,
}

/// Result of submitting an unlock/lock action.
#[derive(Debug, Clone)]
pub struct ActionOutcome {
    pub success: bool,
    /// Opaque id used for all subsequent polling.
    pub request_id: Option<String>,
    pub error_message: Option<String>,
}

/// Interface the call flow depends on, mockable in tests.
#[async_trait]
pub trait Actuator: Send + Sync {
    /// Announce call metadata before the caller hears the greeting.
    async fn dispatch(&self, from: &str, to: &str) -> DispatchOutcome;

    /// Submit the chosen action. Never retried here: a repeat submission
    /// would operate the lock twice.
    async fn request_action(&self, action: LockAction, from: &str, to: &str) -> ActionOutcome;

    /// Fetch the current status of one actuation request.
    async fn poll(&self, request_id: &str) -> ActuationResult;
}

/// HTTP implementation of [`Actuator`].
pub struct ActuatorClient {
    client: reqwest::Client,
    base_url: String,
    api_secret: String,
}

impl ActuatorClient {
    pub fn new(base_url: &str, api_secret: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(ACTUATOR_TIMEOUT)
            .build()
            .context("failed to build actuator HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_secret: api_secret.to_string(),
        })
    }

    async fn post_form<B: Serialize>(&self, path: &str, body: &B) -> Result<ApiEnvelope> {
        let url = format!("{}{}", self.base_url, path);
        debug!("POST {}", url);

        let response = self
            .client
            .post(&url)
            .form(body)
            .send()
            .await
            .map_err(|e| anyhow!("actuator unreachable: {}", e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("actuator returned HTTP {}", status));
        }

        response
            .json::<ApiEnvelope>()
            .await
            .map_err(|e| anyhow!("unparseable actuator response: {}", e))
    }
}

#[async_trait]
impl Actuator for ActuatorClient {
    async fn dispatch(&self, from: &str, to: &str) -> DispatchOutcome {
        let body = PhoneBody {
            from,
            to,
            api_secret: &self.api_secret,
        };

        match self.post_form("/api/phone", &body).await {
            Ok(envelope) if envelope.success => {
                info!(from, to, "actuator accepted call dispatch");
                DispatchOutcome {
                    success: true,
                    error_message: None,
                }
            }
            Ok(envelope) => {
                // Business rejection: the actuator's message is meant for
                // the caller's ears.
                let message = envelope.error.and_then(|e| e.message);
                warn!(from, to, ?message, "actuator rejected call dispatch");
                DispatchOutcome {
                    success: false,
                    error_message: message,
                }
            }
            Err(e) => {
                warn!(from, to, "call dispatch failed: {}", e);
                DispatchOutcome {
                    success: false,
                    error_message: None,
                }
            }
        }
    }

    async fn request_action(&self, action: LockAction, from: &str, to: &str) -> ActionOutcome {
        let body = ActionBody {
            action: action.code(),
            from,
            to,
            api_secret: &self.api_secret,
        };

        match self.post_form("/api/phone/action", &body).await {
            Ok(envelope) if envelope.success => {
                let request_id = envelope.request.and_then(|r| r.id_string());
                match request_id {
                    Some(id) => {
                        info!(?action, request_id = %id, "actuator accepted action request");
                        ActionOutcome {
                            success: true,
                            request_id: Some(id),
                            error_message: None,
                        }
                    }
                    None => {
                        warn!(?action, "actuator accepted action but returned no request id");
                        ActionOutcome {
                            success: false,
                            request_id: None,
                            error_message: None,
                        }
                    }
                }
            }
            Ok(envelope) => {
                let message = envelope.error.and_then(|e| e.message);
                warn!(?action, ?message, "actuator rejected action request");
                ActionOutcome {
                    success: false,
                    request_id: None,
                    error_message: message,
                }
            }
            Err(e) => {
                warn!(?action, "action request failed: {}", e);
                ActionOutcome {
                    success: false,
                    request_id: None,
                    error_message: None,
                }
            }
        }
    }

    async fn poll(&self, request_id: &str) -> ActuationResult {
        let body = StatusBody {
            api_secret: &self.api_secret,
        };
        let path = format!("/api/requests/{}", request_id);

        let envelope = match self.post_form(&path, &body).await {
            Ok(envelope) => envelope,
            Err(e) => {
                // The operation may still complete; let the poll budget
                // decide when to give up.
                warn!(request_id, "status poll failed: {}", e);
                return ActuationResult::pending_after_transport_error(e.to_string());
            }
        };

        let dispatch_succeeded = envelope.success;
        let request = envelope.request.unwrap_or_default();
        let completed = match request.success {
            Some(true) => Completion::Success,
            Some(false) => Completion::Failed,
            None => Completion::Pending,
        };
        let action = request.action.and_then(|code| match code {
            1 => Some(LockAction::Unlock),
            2 => Some(LockAction::Lock),
            _ => None,
        });

        debug!(request_id, ?completed, "status poll result");
        ActuationResult {
            dispatch_succeeded,
            completed,
            error_code: request.error,
            action,
        }
    }
}

// ============================================================================
// Actuator API Wire Types
// ============================================================================

#[derive(Debug, Serialize)]
struct PhoneBody<'a> {
    from: &'a str,
    to: &'a str,
    #[serde(rename = "apiSecret")]
    api_secret: &'a str,
}

#[derive(Debug, Serialize)]
struct ActionBody<'a> {
    action: u8,
    from: &'a str,
    to: &'a str,
    #[serde(rename = "apiSecret")]
    api_secret: &'a str,
}

#[derive(Debug, Serialize)]
struct StatusBody<'a> {
    #[serde(rename = "apiSecret")]
    api_secret: &'a str,
}

#[derive(Debug, Deserialize)]
struct ApiEnvelope {
    success: bool,
    #[serde(default)]
    error: Option<ApiErrorBody>,
    #[serde(default)]
    request: Option<RequestBody>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RequestBody {
    /// The actuator issues numeric ids but the format is opaque to us.
    #[serde(default)]
    id: Option<serde_json::Value>,
    #[serde(default)]
    action: Option<u8>,
    /// Tri-state: true = done, false = failed, null/absent = pending.
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    error: Option<String>,
}

impl RequestBody {
    fn id_string(self) -> Option<String> {
        match self.id? {
            serde_json::Value::String(s) => Some(s),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}
