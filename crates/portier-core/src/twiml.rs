//! ============================================================================
//! Voice Response Builder - TwiML Document Assembly
//! ============================================================================
//! Append-only builder for the ordered directive sequence returned to the
//! telephony platform on every webhook callback:
//! - Say / Gather / Pause / Redirect / Hangup directives
//! - Seals the document after a terminal directive (Hangup or Redirect);
//!   later appends are rejected instead of silently dropped
//! - Serializes to the platform's XML wire format
//! ============================================================================

use thiserror::Error;

/// Voice used for spoken prompts.
pub const DEFAULT_VOICE: &str = "alice";

/// Language used for spoken prompts.
pub const DEFAULT_LANGUAGE: &str = "fr-FR";

/// HTTP method the platform uses for gather/redirect callbacks.
const CALLBACK_METHOD: &str = "POST";

/// Error raised when a branch tries to extend an already-terminated document.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TwimlError {
    #[error("cannot append a directive after <{0}>")]
    SealedDocument(&'static str),
}

/// One instruction in the response document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoiceDirective {
    Say {
        text: String,
        voice: String,
        language: String,
    },
    Gather {
        input: String,
        num_digits: u8,
        timeout_secs: u8,
        action: String,
        method: String,
        action_on_empty_result: bool,
    },
    Pause {
        length_secs: u32,
    },
    Redirect {
        url: String,
        method: String,
    },
    Hangup,
}

/// Keypad gather parameters. The call flow only ever collects DTMF digits.
#[derive(Debug, Clone)]
pub struct GatherSpec {
    pub num_digits: u8,
    pub timeout_secs: u8,
    pub action: String,
    /// Whether an empty gather (caller pressed nothing) still posts to
    /// `action`. When false the document needs its own fallback directive.
    pub action_on_empty_result: bool,
}

/// Ordered voice directive sequence plus XML serialization.
#[derive(Debug, Default)]
pub struct VoiceResponse {
    directives: Vec<VoiceDirective>,
    sealed_by: Option<&'static str>,
}

impl VoiceResponse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Complete "speak one closing message, then hang up" document.
    /// Infallible, for failure paths that must not themselves fail.
    pub fn closing_message(text: &str) -> Self {
        Self {
            directives: vec![
                VoiceDirective::Say {
                    text: text.to_string(),
                    voice: DEFAULT_VOICE.to_string(),
                    language: DEFAULT_LANGUAGE.to_string(),
                },
                VoiceDirective::Hangup,
            ],
            sealed_by: Some("Hangup"),
        }
    }

    /// Directives appended so far, in emission order.
    pub fn directives(&self) -> &[VoiceDirective] {
        &self.directives
    }

    /// Whether the document already ends the call or hands it off.
    pub fn is_terminated(&self) -> bool {
        self.sealed_by.is_some()
    }

    fn push(&mut self, directive: VoiceDirective) -> Result<(), TwimlError> {
        if let Some(terminal) = self.sealed_by {
            return Err(TwimlError::SealedDocument(terminal));
        }
        self.sealed_by = match directive {
            VoiceDirective::Hangup => Some("Hangup"),
            VoiceDirective::Redirect { .. } => Some("Redirect"),
            _ => None,
        };
        self.directives.push(directive);
        Ok(())
    }

    /// Speak `text` with the default voice parameters.
    pub fn say(&mut self, text: &str) -> Result<(), TwimlError> {
        self.push(VoiceDirective::Say {
            text: text.to_string(),
            voice: DEFAULT_VOICE.to_string(),
            language: DEFAULT_LANGUAGE.to_string(),
        })
    }

    /// Collect keypad digits and post them to `spec.action`.
    pub fn gather(&mut self, spec: GatherSpec) -> Result<(), TwimlError> {
        self.push(VoiceDirective::Gather {
            input: "dtmf".to_string(),
            num_digits: spec.num_digits,
            timeout_secs: spec.timeout_secs,
            action: spec.action,
            method: CALLBACK_METHOD.to_string(),
            action_on_empty_result: spec.action_on_empty_result,
        })
    }

    /// Silent wait. The platform sleeps, not this process.
    pub fn pause(&mut self, length_secs: u32) -> Result<(), TwimlError> {
        self.push(VoiceDirective::Pause { length_secs })
    }

    /// Hand the call off to the next step. Terminates the document.
    pub fn redirect(&mut self, url: &str) -> Result<(), TwimlError> {
        self.push(VoiceDirective::Redirect {
            url: url.to_string(),
            method: CALLBACK_METHOD.to_string(),
        })
    }

    /// End the call. Terminates the document.
    pub fn hangup(&mut self) -> Result<(), TwimlError> {
        self.push(VoiceDirective::Hangup)
    }

    /// Terminal branch composite: speak a closing message, then hang up.
    pub fn say_and_hangup(&mut self, text: &str) -> Result<(), TwimlError> {
        self.say(text)?;
        self.hangup()
    }

    /// Continuation composite: speak a message, then redirect to `url`.
    pub fn say_and_redirect(&mut self, text: &str, url: &str) -> Result<(), TwimlError> {
        self.say(text)?;
        self.redirect(url)
    }

    /// Serialize to the XML wire document expected by the platform.
    pub fn to_xml(&self) -> String {
        let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?><Response>");
        for directive in &self.directives {
            match directive {
                VoiceDirective::Say {
                    text,
                    voice,
                    language,
                } => {
                    xml.push_str(&format!(
                        "<Say voice=\"{}\" language=\"{}\">{}</Say>",
                        escape_xml(voice),
                        escape_xml(language),
                        escape_xml(text)
                    ));
                }
                VoiceDirective::Gather {
                    input,
                    num_digits,
                    timeout_secs,
                    action,
                    method,
                    action_on_empty_result,
                } => {
                    xml.push_str(&format!(
                        "<Gather input=\"{}\" numDigits=\"{}\" timeout=\"{}\" action=\"{}\" method=\"{}\" actionOnEmptyResult=\"{}\"/>",
                        escape_xml(input),
                        num_digits,
                        timeout_secs,
                        escape_xml(action),
                        escape_xml(method),
                        action_on_empty_result
                    ));
                }
                VoiceDirective::Pause { length_secs } => {
                    xml.push_str(&format!("<Pause length=\"{}\"/>", length_secs));
                }
                VoiceDirective::Redirect { url, method } => {
                    xml.push_str(&format!(
                        "<Redirect method=\"{}\">{}</Redirect>",
                        escape_xml(method),
                        escape_xml(url)
                    ));
                }
                VoiceDirective::Hangup => xml.push_str("<Hangup/>"),
            }
        }
        xml.push_str("</Response>");
        xml
    }
}

/// Escape text and attribute values for XML.
fn escape_xml(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
