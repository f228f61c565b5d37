//! ============================================================================
//! PORTIER-CORE: Call-Flow Brain
//! ============================================================================
//! This crate handles all call-flow logic for the Portier lock service:
//! - The stateless webhook state machine (flow)
//! - The actuator service client and its trait seam (actuator)
//! - The bounded poll retry policy (poll_policy)
//! - The voice response document builder (twiml)
//! - Webhook signature validation (auth) and env configuration (config)
//! ============================================================================

pub mod actuator;
pub mod auth;
pub mod config;
pub mod flow;
pub mod poll_policy;
pub mod prompts;
pub mod twiml;
pub mod types;

// Re-export main types for convenience
pub use actuator::{Actuator, ActuatorClient};
pub use auth::RequestAuthenticator;
pub use config::Config;
pub use flow::{CallFlow, Step};
pub use poll_policy::PollDecision;
pub use twiml::{VoiceDirective, VoiceResponse};
pub use types::{ActuationResult, CallContext, Completion, LockAction};
